// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Render pipeline.
//!
//! Rendering a [`Composition`] happens in four steps:
//!
//! 1. **Data aggregation.** Each document's data section is rendered as a
//!    markup fragment against the context built so far and decoded as JSON,
//!    in render order. A section with a `window` attribute claims that
//!    attribute in the [`HydrationRegistry`] and lands in the client layer;
//!    a section without one is merged into the server layer and never
//!    leaves the server. A `<schema window="x">` section claims `x` and
//!    hydrates the value already present under `x` in the server or request
//!    layer.
//! 2. **Template.** The root template renders against the enriched context,
//!    with the composition resolving partials.
//! 3. **Layouts.** Each layout in the chain renders with the child's output
//!    bound to `content` (emit it with `{{{content}}}`).
//! 4. **Hydration.** If anything was claimed, the artifact for the claimed
//!    windows is spliced in by the [`Injector`].

use crate::ast::{Document, Node};
use crate::composition::Composition;
use crate::context::{Bindings, Context, Layer};
use crate::error::{Result, SkeinError};
use crate::hydration::{
    HydrationPayload, HydrationRegistry, InjectionPosition, Injector, MergeStrategy,
    SourceLocation,
};
use crate::markup;
use crate::renderer::{Escape, Renderer};
use serde_json::{Map, Value};
use tracing::{debug, trace};

/// The output of one view render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedView {
    /// The final HTML.
    pub html: String,
    /// The client layer after data aggregation.
    pub client_data: Map<String, Value>,
    /// Where the hydration artifact went; `None` when nothing was claimed or
    /// no safe position existed.
    pub injection: Option<InjectionPosition>,
}

/// Renders compositions into hydrated HTML.
#[derive(Debug, Clone, Default)]
pub struct ViewRenderer {
    renderer: Renderer,
    injector: Injector,
}

impl ViewRenderer {
    /// Creates a pipeline from its renderer and injector.
    pub fn new(renderer: Renderer, injector: Injector) -> Self {
        Self { renderer, injector }
    }

    /// The template renderer.
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// The hydration injector.
    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    /// Renders `composition` against `context`.
    ///
    /// Claims are recorded in `registry`; `nonce` is put on every emitted
    /// script element.
    ///
    /// # Errors
    ///
    /// - [`SkeinError::Render`] / [`SkeinError::PartialNotFound`] from
    ///   template rendering
    /// - [`SkeinError::DataSection`] when a data section is not JSON
    /// - [`SkeinError::Collision`] when a window attribute is claimed twice
    ///   without a merge strategy
    /// - [`SkeinError::Validation`] for an unknown `merge` value or a
    ///   window-less data section that is not a JSON object
    pub fn render(
        &self,
        composition: &Composition,
        context: &Context,
        registry: &mut HydrationRegistry,
        nonce: Option<&str>,
    ) -> Result<RenderedView> {
        let mut layers = DataLayers {
            request: context.layer(Layer::Request),
            server: context.layer(Layer::Server).clone(),
            client: context.layer(Layer::Client).clone(),
            claimed: Vec::new(),
        };

        for (name, component) in composition.each_document_in_render_order() {
            if let Some(document) = component.document() {
                let source = composition.source(name).unwrap_or(document.data.raw.as_str());
                self.aggregate(name, source, document, context, &mut layers, registry)?;
            }
        }

        let DataLayers {
            server,
            client,
            claimed,
            ..
        } = layers;
        let enriched = context.with_server(server).with_client(client);

        let root = composition.root_component().ok_or_else(|| {
            SkeinError::render(format!("root '{}' is not resolved", composition.root()))
        })?;
        let mut html = self
            .renderer
            .render_nodes(root.nodes(), &enriched, Some(composition))?;

        for layout in composition.layout_chain() {
            let component = composition.component(layout).ok_or_else(|| {
                SkeinError::render(format!("layout '{}' is not resolved", layout))
            })?;
            let scope = Bindings::new(&enriched).bind("content", html);
            html = self
                .renderer
                .render_nodes(component.nodes(), &scope, Some(composition))?;
            trace!(layout, "layout applied");
        }

        let client_data = enriched.layer(Layer::Client).clone();
        let mut payload = HydrationPayload::new();
        for window in &claimed {
            if let Some(value) = client_data.get(window) {
                payload.insert(window.clone(), value.clone());
            }
        }

        let mut injection = None;
        if !payload.is_empty() {
            let markup = payload.to_html(nonce)?;
            let outcome = self
                .injector
                .inject(&html, &markup, Some(composition.root()));
            html = outcome.html;
            injection = outcome.position;
            debug!(
                root = composition.root(),
                windows = payload.len(),
                injected = injection.is_some(),
                "hydration payload processed"
            );
        }

        Ok(RenderedView {
            html,
            client_data,
            injection,
        })
    }

    fn aggregate(
        &self,
        name: &str,
        source: &str,
        document: &Document,
        context: &Context,
        layers: &mut DataLayers<'_>,
        registry: &mut HydrationRegistry,
    ) -> Result<()> {
        let merge = match document.merge_attribute() {
            Some(raw) => Some(MergeStrategy::parse(raw).ok_or_else(|| {
                SkeinError::Validation(format!(
                    "unknown merge strategy '{}' in '{}', expected deep or shallow",
                    raw, name
                ))
            })?),
            None => None,
        };
        let location = SourceLocation::new(
            name,
            document.data.location.line,
            document.data.location.column,
        );

        if document.is_schema() {
            let Some(window) = document.window() else {
                return Ok(());
            };
            registry.register(window, location, merge)?;
            match layers.server.get(window).or_else(|| layers.request.get(window)) {
                Some(value) => {
                    let value = value.clone();
                    layers.place_client(window, value, merge);
                }
                None => debug!(document = name, window, "schema window has no server value"),
            }
            return Ok(());
        }

        if document.data.raw.trim().is_empty() {
            return Ok(());
        }

        let value = self.evaluate_data(name, source, document, context, layers)?;
        match document.window() {
            Some(window) => {
                registry.register(window, location, merge)?;
                layers.place_client(window, value, merge);
            }
            None => match value {
                Value::Object(map) => {
                    let strategy = merge.unwrap_or(MergeStrategy::Shallow);
                    for (key, value) in map {
                        match layers.server.get_mut(&key) {
                            Some(slot) => strategy.merge(slot, value),
                            None => {
                                layers.server.insert(key, value);
                            }
                        }
                    }
                }
                _ => {
                    return Err(SkeinError::Validation(format!(
                        "data section of '{}' has no window attribute and is not a JSON object",
                        name
                    )))
                }
            },
        }
        Ok(())
    }

    /// Renders a data section as markup and decodes it.
    fn evaluate_data(
        &self,
        name: &str,
        source: &str,
        document: &Document,
        context: &Context,
        layers: &DataLayers<'_>,
    ) -> Result<Value> {
        let origin = document
            .data
            .content
            .first()
            .map_or(document.data.location, |node| *node.location());
        let nodes: Vec<Node> = markup::parse_at(&document.data.raw, origin)
            .map_err(|e| SkeinError::from(e.with_source(source)).into_render())?
            .nodes;

        let scope = context
            .with_server(layers.server.clone())
            .with_client(layers.client.clone());
        let rendered = self
            .renderer
            .with_escape(Escape::JsonString)
            .render_nodes(&nodes, &scope, None)?;
        trace!(document = name, "data section rendered");

        serde_json::from_str(&rendered).map_err(|source| SkeinError::DataSection {
            document: name.to_string(),
            source,
        })
    }
}

struct DataLayers<'c> {
    request: &'c Map<String, Value>,
    server: Map<String, Value>,
    client: Map<String, Value>,
    claimed: Vec<String>,
}

impl DataLayers<'_> {
    fn place_client(&mut self, window: &str, value: Value, merge: Option<MergeStrategy>) {
        match (merge, self.client.get_mut(window)) {
            (Some(strategy), Some(existing)) => strategy.merge(existing, value),
            _ => {
                self.client.insert(window.to_string(), value);
            }
        }
        if !self.claimed.iter().any(|w| w == window) {
            self.claimed.push(window.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydration::{InjectionStrategy, Placement};
    use crate::loader::MemoryLoader;
    use serde_json::json;

    fn compose(loader: &MemoryLoader, root: &str) -> Composition {
        Composition::resolve(root, loader).unwrap()
    }

    fn context(server: Value, client: Value) -> Context {
        Context::builder()
            .server(server)
            .client(client)
            .build()
            .unwrap()
    }

    fn page_loader() -> MemoryLoader {
        MemoryLoader::new()
            .with(
                "page",
                concat!(
                    "<data window=\"page\" layout=\"shell\">{\"title\": \"{{site}}: Home\"}</data>\n",
                    "<template><h1>{{page.title}}</h1>{{> footer}}</template>"
                ),
            )
            .with(
                "shell",
                concat!(
                    "<data>{\"site\": \"ignored\"}</data>",
                    "<template><html><head><title>{{page.title}}</title></head>",
                    "<body>{{{content}}}</body></html></template>"
                ),
            )
            .with("footer", "<footer>{{site}}</footer>")
    }

    #[test]
    fn test_full_pipeline() {
        let loader = page_loader();
        let composition = compose(&loader, "page");
        let ctx = context(json!({ "site": "Skein" }), json!({}));
        let mut registry = HydrationRegistry::new();

        let view = ViewRenderer::default()
            .render(&composition, &ctx, &mut registry, Some("n0nce"))
            .unwrap();

        assert_eq!(view.client_data["page"], json!({ "title": "ignored: Home" }));
        assert!(view.html.starts_with("<html><head><title>ignored: Home</title>"));
        assert!(view
            .html
            .contains("<body><h1>ignored: Home</h1><footer>ignored</footer></body>"));
        assert!(view.html.contains(r#"<script type="application/json" id="skein-data-page" nonce="n0nce">"#));

        let position = view.injection.unwrap();
        assert_eq!(position.placement, Placement::Early);
        assert_eq!(view.html.find("<script").unwrap(), position.offset);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_data_section_values_survive_verbatim() {
        let loader = MemoryLoader::new().with(
            "page",
            concat!(
                "<data window=\"page\">{\"owner\": \"{{owner}}\", \"path\": \"{{path}}\", ",
                "\"bio\": \"{{bio}}\", \"count\": {{count}} }</data>",
                "<template><p>{{page.owner}}</p></template>"
            ),
        );
        let composition = compose(&loader, "page");
        let ctx = context(
            json!({
                "owner": "O'Brien & \"Co\" <ltd>",
                "path": "C:\\dir",
                "bio": "line one\nline two",
                "count": 2
            }),
            json!({}),
        );
        let mut registry = HydrationRegistry::new();

        let view = ViewRenderer::default()
            .render(&composition, &ctx, &mut registry, None)
            .unwrap();

        assert_eq!(
            view.client_data["page"],
            json!({
                "owner": "O'Brien & \"Co\" <ltd>",
                "path": "C:\\dir",
                "bio": "line one\nline two",
                "count": 2
            })
        );
        assert!(view.html.starts_with("<p>O&#39;Brien &amp; &quot;Co&quot; &lt;ltd&gt;</p>"));
    }

    #[test]
    fn test_data_without_window_stays_on_server() {
        let loader = MemoryLoader::new().with(
            "secret",
            "<data>{\"token\": \"abc\"}</data><template><p>{{token}}</p></template>",
        );
        let composition = compose(&loader, "secret");
        let mut registry = HydrationRegistry::new();
        let view = ViewRenderer::default()
            .render(&composition, &Context::default(), &mut registry, None)
            .unwrap();

        assert_eq!(view.html, "<p>abc</p>");
        assert!(view.client_data.is_empty());
        assert!(view.injection.is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_collision_between_documents() {
        let loader = MemoryLoader::new()
            .with(
                "page",
                "<data window=\"state\">{\"a\": 1}</data><template>{{> widget}}</template>",
            )
            .with(
                "widget",
                "<data window=\"state\">{\"b\": 2}</data><template>w</template>",
            );
        let composition = compose(&loader, "page");
        let mut registry = HydrationRegistry::new();

        let err = ViewRenderer::default()
            .render(&composition, &Context::default(), &mut registry, None)
            .unwrap_err();
        match err {
            SkeinError::Collision { first, second, .. } => {
                assert_eq!(first.document, "widget");
                assert_eq!(second.document, "page");
            }
            other => panic!("expected collision, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_attribute_combines_claims() {
        let loader = MemoryLoader::new()
            .with(
                "page",
                "<data window=\"state\" merge=\"deep\">{\"user\": {\"b\": 2}}</data><template>{{> widget}}</template>",
            )
            .with(
                "widget",
                "<data window=\"state\">{\"user\": {\"a\": 1}}</data><template>w</template>",
            );
        let composition = compose(&loader, "page");
        let mut registry = HydrationRegistry::new();

        let view = ViewRenderer::default()
            .render(&composition, &Context::default(), &mut registry, None)
            .unwrap();
        assert_eq!(view.client_data["state"], json!({ "user": { "a": 1, "b": 2 } }));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unknown_merge_value_is_rejected() {
        let loader = MemoryLoader::new().with(
            "page",
            "<data window=\"s\" merge=\"sideways\">{}</data><template></template>",
        );
        let composition = compose(&loader, "page");
        let err = ViewRenderer::default()
            .render(&composition, &Context::default(), &mut HydrationRegistry::new(), None)
            .unwrap_err();
        assert!(matches!(err, SkeinError::Validation(_)));
    }

    #[test]
    fn test_schema_hydrates_server_value() {
        let loader = MemoryLoader::new().with(
            "page",
            "<schema lang=\"json\" window=\"user\">{\"type\": \"object\"}</schema><template>{{user.name}}</template>",
        );
        let composition = compose(&loader, "page");
        let ctx = context(json!({ "user": { "name": "Ada" } }), json!({}));
        let mut registry = HydrationRegistry::new();

        let view = ViewRenderer::default()
            .render(&composition, &ctx, &mut registry, None)
            .unwrap();
        assert_eq!(view.client_data["user"], json!({ "name": "Ada" }));
        assert!(view.html.starts_with("Ada"));
        assert!(view.html.contains("skein-data-user"));
        assert_eq!(view.injection.unwrap().placement, Placement::Late);
    }

    #[test]
    fn test_invalid_json_names_document() {
        let loader = MemoryLoader::new().with(
            "page",
            "<data window=\"x\">{not json}</data><template></template>",
        );
        let composition = compose(&loader, "page");
        let err = ViewRenderer::default()
            .render(&composition, &Context::default(), &mut HydrationRegistry::new(), None)
            .unwrap_err();
        assert!(matches!(err, SkeinError::DataSection { ref document, .. } if document == "page"));
    }

    #[test]
    fn test_dropped_hydration_keeps_render() {
        let loader = MemoryLoader::new().with(
            "page",
            "<data window=\"x\">{\"a\": 1}</data><template><p>no mount</p><!-- open</template>",
        );
        let composition = compose(&loader, "page");
        let pipeline = ViewRenderer::new(
            Renderer::new(),
            Injector::new(InjectionStrategy::Mount).with_fallback_when_unsafe(false),
        );
        let view = pipeline
            .render(&composition, &Context::default(), &mut HydrationRegistry::new(), None)
            .unwrap();
        assert_eq!(view.html, "<p>no mount</p><!-- open");
        assert!(view.injection.is_none());
        assert_eq!(view.client_data["x"], json!({ "a": 1 }));
    }
}
