// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! View composition.
//!
//! [`Composition::resolve`] starts at a root document, loads it, and
//! recursively discovers everything it depends on: partials referenced with
//! `{{> name}}` and the layout named by its `layout` attribute. Once resolved
//! a composition is immutable and can be shared across concurrent renders.
//!
//! # Render order
//!
//! [`Composition::render_order`] is a depth-first post-order walk of the
//! dependency graph: a document's partials come before it, its layout comes
//! after its partials but still before the document itself, and a document
//! reachable along several paths is emitted once.
//!
//! ```text
//! root -> [a, b], a -> [c], b -> [c]      order: c, a, b, root
//! ```

use crate::ast::{Document, Node, Template};
use crate::document::{self, is_section_source};
use crate::error::{Result, SkeinError};
use crate::loader::DocumentLoader;
use crate::markup;
use crate::renderer::{PartialResolver, PartialSource};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace};

/// One resolved unit of a composition.
#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    /// A section-structured document.
    Document(Document),
    /// A bare markup fragment, used as a partial.
    Fragment(Template),
}

impl Component {
    /// The markup nodes rendered for this component.
    pub fn nodes(&self) -> &[Node] {
        match self {
            Component::Document(doc) => doc.template_nodes(),
            Component::Fragment(template) => &template.nodes,
        }
    }

    /// The parsed document, unless this is a bare fragment.
    pub fn document(&self) -> Option<&Document> {
        match self {
            Component::Document(doc) => Some(doc),
            Component::Fragment(_) => None,
        }
    }

    /// The layout this component declares.
    pub fn layout(&self) -> Option<&str> {
        self.document().and_then(Document::layout)
    }

    /// The raw markup text, used for dependency discovery.
    fn markup_text<'a>(&'a self, source: &'a str) -> &'a str {
        match self {
            Component::Document(doc) => &doc.template.raw,
            Component::Fragment(_) => source,
        }
    }
}

/// A fully resolved, immutable dependency graph rooted at one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    root: String,
    components: HashMap<String, Component>,
    sources: BTreeMap<String, String>,
    dependencies: HashMap<String, Vec<String>>,
    order: Vec<String>,
}

impl Composition {
    /// Resolves `root` and everything it depends on.
    ///
    /// # Errors
    ///
    /// - [`SkeinError::TemplateNotFound`] if the loader returns nothing for a
    ///   name, or fails
    /// - [`SkeinError::CircularDependency`] if a name is reached again while
    ///   it is still being resolved
    /// - [`SkeinError::Parse`] if a loaded source is malformed
    pub fn resolve(root: &str, loader: &dyn DocumentLoader) -> Result<Self> {
        let mut resolver = Resolver {
            loader,
            components: HashMap::new(),
            sources: BTreeMap::new(),
            dependencies: HashMap::new(),
            in_progress: Vec::new(),
        };
        resolver.resolve(root)?;

        let order = render_order(root, &resolver.dependencies);
        debug!(root, documents = order.len(), "composition resolved");

        Ok(Self {
            root: root.to_string(),
            components: resolver.components,
            sources: resolver.sources,
            dependencies: resolver.dependencies,
            order,
        })
    }

    /// The root document name.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// The root component.
    pub fn root_component(&self) -> Option<&Component> {
        self.components.get(&self.root)
    }

    /// Looks up a resolved component.
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.get(name)
    }

    /// The loaded source text of a component.
    pub fn source(&self, name: &str) -> Option<&str> {
        self.sources.get(name).map(String::as_str)
    }

    /// Direct dependencies of `name`: its partials in encounter order, then
    /// its layout.
    pub fn dependencies(&self, name: &str) -> &[String] {
        self.dependencies.get(name).map_or(&[], Vec::as_slice)
    }

    /// Every resolved name in render order.
    pub fn render_order(&self) -> &[String] {
        &self.order
    }

    /// Iterates components in render order.
    pub fn each_document_in_render_order(&self) -> impl Iterator<Item = (&str, &Component)> {
        self.order.iter().filter_map(|name| {
            self.components
                .get(name)
                .map(|component| (name.as_str(), component))
        })
    }

    /// The root's layout, that layout's layout, and so on, innermost first.
    pub fn layout_chain(&self) -> Vec<&str> {
        let mut chain: Vec<&str> = Vec::new();
        let mut current = self.root_component().and_then(Component::layout);
        while let Some(name) = current {
            if chain.contains(&name) {
                break;
            }
            chain.push(name);
            current = self.component(name).and_then(Component::layout);
        }
        chain
    }

    /// Number of resolved components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the composition is empty. Never true for a resolved one.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// SHA-256 over the sorted `(name, source)` pairs, hex encoded.
    ///
    /// Stable loader results produce identical fingerprints.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, source) in &self.sources {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(source.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}

impl PartialResolver for Composition {
    fn resolve_partial(&self, name: &str) -> Option<PartialSource<'_>> {
        self.component(name)
            .map(|component| PartialSource::Parsed(component.nodes()))
    }
}

struct Resolver<'l> {
    loader: &'l dyn DocumentLoader,
    components: HashMap<String, Component>,
    sources: BTreeMap<String, String>,
    dependencies: HashMap<String, Vec<String>>,
    in_progress: Vec<String>,
}

impl Resolver<'_> {
    fn resolve(&mut self, name: &str) -> Result<()> {
        if self.in_progress.iter().any(|n| n == name) {
            let mut chain = self.in_progress.clone();
            chain.push(name.to_string());
            return Err(SkeinError::CircularDependency { chain });
        }
        if self.components.contains_key(name) {
            trace!(name, "already resolved");
            return Ok(());
        }

        self.in_progress.push(name.to_string());
        let result = self.load(name);
        self.in_progress.pop();
        result
    }

    fn load(&mut self, name: &str) -> Result<()> {
        let source = match self.loader.load(name) {
            Ok(Some(source)) => source,
            Ok(None) => {
                debug!(name, "loader returned nothing");
                return Err(SkeinError::TemplateNotFound {
                    name: name.to_string(),
                    reason: None,
                });
            }
            Err(e) => {
                debug!(name, error = %e, "loader failed");
                return Err(SkeinError::TemplateNotFound {
                    name: name.to_string(),
                    reason: Some(e.to_string()),
                });
            }
        };

        let component = if is_section_source(&source) {
            Component::Document(document::parse(&source)?)
        } else {
            Component::Fragment(markup::parse(&source)?)
        };

        let mut deps = markup::extract_partial_names(component.markup_text(&source))?;
        let layout = component.layout().map(str::to_string);
        trace!(name, partials = ?deps, layout = ?layout, "discovered dependencies");

        self.components.insert(name.to_string(), component);
        self.sources.insert(name.to_string(), source);

        for dep in &deps {
            self.resolve(dep)?;
        }
        if let Some(layout) = layout {
            self.resolve(&layout)?;
            if !deps.contains(&layout) {
                deps.push(layout);
            }
        }

        self.dependencies.insert(name.to_string(), deps);
        Ok(())
    }
}

fn render_order(root: &str, dependencies: &HashMap<String, Vec<String>>) -> Vec<String> {
    fn visit(
        name: &str,
        dependencies: &HashMap<String, Vec<String>>,
        visited: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) {
        if !visited.insert(name.to_string()) {
            return;
        }
        for dep in dependencies.get(name).into_iter().flatten() {
            visit(dep, dependencies, visited, order);
        }
        order.push(name.to_string());
    }

    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(root, dependencies, &mut visited, &mut order);
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;

    fn doc(template: &str) -> String {
        format!("<data>{{}}</data><template>{}</template>", template)
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_diamond_visits_shared_dependency_once() {
        let loader = MemoryLoader::new()
            .with("root", doc("{{> a}}{{> b}}"))
            .with("a", doc("A{{> c}}"))
            .with("b", doc("B{{> c}}"))
            .with("c", doc("C"));

        let composition = Composition::resolve("root", &loader).unwrap();
        let order = composition.render_order();

        assert_eq!(order.len(), 4);
        assert_eq!(order.iter().filter(|n| *n == "c").count(), 1);
        assert!(position(order, "c") < position(order, "a"));
        assert!(position(order, "c") < position(order, "b"));
        assert!(position(order, "a") < position(order, "root"));
        assert!(position(order, "b") < position(order, "root"));
        assert_eq!(composition.dependencies("root"), ["a", "b"]);
    }

    #[test]
    fn test_cycle_names_chain() {
        let loader = MemoryLoader::new()
            .with("root", doc("{{> a}}"))
            .with("a", doc("{{> root}}"));

        let err = Composition::resolve("root", &loader).unwrap_err();
        match err {
            SkeinError::CircularDependency { chain } => {
                assert_eq!(chain, vec!["root", "a", "root"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_layout_cycle_detected() {
        let loader = MemoryLoader::new()
            .with("page", "<data layout=\"shell\">{}</data><template>p</template>")
            .with("shell", "<data layout=\"page\">{}</data><template>s</template>");
        assert!(matches!(
            Composition::resolve("page", &loader),
            Err(SkeinError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_missing_template() {
        let loader = MemoryLoader::new().with("root", doc("{{> ghost}}"));
        let err = Composition::resolve("root", &loader).unwrap_err();
        assert!(matches!(
            err,
            SkeinError::TemplateNotFound { ref name, reason: None } if name == "ghost"
        ));
    }

    #[test]
    fn test_failing_loader_is_template_not_found() {
        struct Failing;
        impl DocumentLoader for Failing {
            fn load(&self, _name: &str) -> Result<Option<String>> {
                Err(SkeinError::Validation("backend down".into()))
            }
        }

        let err = Composition::resolve("root", &Failing).unwrap_err();
        match err {
            SkeinError::TemplateNotFound { name, reason } => {
                assert_eq!(name, "root");
                assert!(reason.unwrap().contains("backend down"));
            }
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[test]
    fn test_layout_visited_before_root() {
        let loader = MemoryLoader::new()
            .with(
                "page",
                "<data layout=\"shell\">{}</data><template>{{> nav}}body</template>",
            )
            .with("shell", doc("<main>{{{content}}}</main>"))
            .with("nav", "<nav>{{title}}</nav>");

        let composition = Composition::resolve("page", &loader).unwrap();
        assert_eq!(composition.render_order(), ["nav", "shell", "page"]);
        assert_eq!(composition.dependencies("page"), ["nav", "shell"]);
        assert_eq!(composition.layout_chain(), vec!["shell"]);
        assert!(matches!(
            composition.component("nav"),
            Some(Component::Fragment(_))
        ));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let loader = MemoryLoader::new()
            .with("root", doc("{{> a}}"))
            .with("a", "fragment {{x}}");

        let first = Composition::resolve("root", &loader).unwrap();
        let second = Composition::resolve("root", &loader).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(first.fingerprint().len(), 64);

        loader.add("a", "changed");
        let third = Composition::resolve("root", &loader).unwrap();
        assert_ne!(first.fingerprint(), third.fingerprint());
    }

    #[test]
    fn test_serves_parsed_partials() {
        let loader = MemoryLoader::new()
            .with("root", doc("{{> a}}"))
            .with("a", "hi");
        let composition = Composition::resolve("root", &loader).unwrap();

        match composition.resolve_partial("a") {
            Some(PartialSource::Parsed(nodes)) => assert_eq!(nodes.len(), 1),
            other => panic!("expected parsed nodes, got {other:?}"),
        }
        assert!(composition.resolve_partial("zzz").is_none());
    }

    #[test]
    fn test_parse_errors_propagate() {
        let loader = MemoryLoader::new().with("root", doc("{{#if x}}"));
        assert!(matches!(
            Composition::resolve("root", &loader),
            Err(SkeinError::Parse(_))
        ));
    }
}
