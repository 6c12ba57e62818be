// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Template engine.
//!
//! Walks a markup AST against a [`Lookup`] scope and produces output text.
//! Partials are resolved through an injected [`PartialResolver`] and render
//! against the caller's scope; they never get a data scope of their own.
//!
//! ```
//! use serde_json::json;
//! use skein::context::Context;
//! use skein::renderer::render;
//!
//! let ctx = Context::builder()
//!     .client(json!({ "a": "x", "b": "<y>" }))
//!     .build()
//!     .unwrap();
//! assert_eq!(render("{{a}} {{b}}", &ctx, None).unwrap(), "x &lt;y&gt;");
//! ```

use crate::ast::{Location, Node};
use crate::context::{LoopScope, Lookup};
use crate::document::{self, is_section_source};
use crate::error::{Result, SkeinError};
use crate::markup;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;

/// Default cap on nested partial inclusion.
pub const DEFAULT_MAX_PARTIAL_DEPTH: usize = 64;

/// What a [`PartialResolver`] hands back for a partial name.
#[derive(Debug, Clone)]
pub enum PartialSource<'a> {
    /// Source text, either a bare fragment or a section-structured document.
    Text(Cow<'a, str>),
    /// Nodes that were already parsed.
    Parsed(&'a [Node]),
}

/// Capability for resolving `{{> name}}` references.
pub trait PartialResolver {
    /// Returns the partial registered under `name`, or `None` if unknown.
    fn resolve_partial(&self, name: &str) -> Option<PartialSource<'_>>;
}

impl<F> PartialResolver for F
where
    F: Fn(&str) -> Option<String>,
{
    fn resolve_partial(&self, name: &str) -> Option<PartialSource<'_>> {
        self(name).map(|text| PartialSource::Text(Cow::Owned(text)))
    }
}

impl PartialResolver for HashMap<String, String> {
    fn resolve_partial(&self, name: &str) -> Option<PartialSource<'_>> {
        self.get(name)
            .map(|text| PartialSource::Text(Cow::Borrowed(text.as_str())))
    }
}

/// How `{{name}}` output is escaped. `{{{name}}}` is never escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Escape {
    /// HTML text and attribute values, see [`html_escape`].
    #[default]
    Html,
    /// The inside of a JSON string literal, see [`json_string_escape`].
    JsonString,
}

impl Escape {
    fn apply<'a>(self, text: &'a str) -> Cow<'a, str> {
        match self {
            Escape::Html => Cow::Owned(html_escape(text)),
            Escape::JsonString => json_string_escape(text),
        }
    }
}

/// AST-walking renderer.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    max_partial_depth: usize,
    escape: Escape,
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            max_partial_depth: DEFAULT_MAX_PARTIAL_DEPTH,
            escape: Escape::Html,
        }
    }
}

impl Renderer {
    /// Creates a renderer with the default partial depth cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum partial nesting depth.
    pub fn with_max_partial_depth(mut self, depth: usize) -> Self {
        self.max_partial_depth = depth;
        self
    }

    /// The configured partial nesting cap.
    pub fn max_partial_depth(&self) -> usize {
        self.max_partial_depth
    }

    /// Sets how escaped variables are written.
    pub fn with_escape(mut self, escape: Escape) -> Self {
        self.escape = escape;
        self
    }

    /// The escaping applied to `{{name}}`.
    pub fn escape(&self) -> Escape {
        self.escape
    }

    /// Renders source text.
    ///
    /// Section-structured sources are parsed as documents and only their
    /// `<template>` section is rendered; anything else is parsed as a bare
    /// markup fragment.
    ///
    /// # Errors
    ///
    /// Every failure is reported as [`SkeinError::Render`], except an
    /// unresolvable partial which is [`SkeinError::PartialNotFound`].
    pub fn render(
        &self,
        source: &str,
        scope: &dyn Lookup,
        partials: Option<&dyn PartialResolver>,
    ) -> Result<String> {
        let nodes = parse_source(source).map_err(SkeinError::into_render)?;
        self.render_nodes(&nodes, scope, partials)
    }

    /// Renders already-parsed nodes.
    pub fn render_nodes(
        &self,
        nodes: &[Node],
        scope: &dyn Lookup,
        partials: Option<&dyn PartialResolver>,
    ) -> Result<String> {
        let walk = Walk {
            partials,
            max_depth: self.max_partial_depth,
            escape: self.escape,
        };
        let mut out = String::new();
        walk.nodes(nodes, scope, &mut out, 0)
            .map_err(SkeinError::into_render)?;
        Ok(out)
    }
}

/// Renders `source` with a default [`Renderer`].
pub fn render(
    source: &str,
    scope: &dyn Lookup,
    partials: Option<&dyn PartialResolver>,
) -> Result<String> {
    Renderer::default().render(source, scope, partials)
}

/// Parses either a document (keeping its template nodes) or a fragment.
fn parse_source(source: &str) -> Result<Vec<Node>> {
    if is_section_source(source) {
        Ok(document::parse(source)?.template.content)
    } else {
        Ok(markup::parse(source)?.nodes)
    }
}

struct Walk<'r> {
    partials: Option<&'r dyn PartialResolver>,
    max_depth: usize,
    escape: Escape,
}

impl Walk<'_> {
    fn nodes(&self, nodes: &[Node], scope: &dyn Lookup, out: &mut String, depth: usize) -> Result<()> {
        for node in nodes {
            self.node(node, scope, out, depth)?;
        }
        Ok(())
    }

    fn node(&self, node: &Node, scope: &dyn Lookup, out: &mut String, depth: usize) -> Result<()> {
        match node {
            Node::Text { content, .. } => out.push_str(content),
            Node::Variable { name, raw, .. } => {
                if let Some(value) = scope.lookup(name) {
                    let text = stringify(&value);
                    if *raw {
                        out.push_str(&text);
                    } else {
                        out.push_str(&self.escape.apply(&text));
                    }
                }
            }
            Node::Partial { name, location } => {
                self.partial(name, location, scope, out, depth)?;
            }
            Node::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let branch = if is_truthy(scope.lookup(condition).as_deref()) {
                    then_branch
                } else {
                    else_branch
                };
                self.nodes(branch, scope, out, depth)?;
            }
            Node::Unless {
                condition, body, ..
            } => {
                if !is_truthy(scope.lookup(condition).as_deref()) {
                    self.nodes(body, scope, out, depth)?;
                }
            }
            Node::Each {
                collection, body, ..
            } => {
                let Some(target) = scope.lookup(collection) else {
                    return Ok(());
                };
                match target.as_ref() {
                    Value::Array(items) => {
                        for (index, item) in items.iter().enumerate() {
                            let child = LoopScope::new(scope, item, index, items.len());
                            self.nodes(body, &child, out, depth)?;
                        }
                    }
                    Value::Object(map) => {
                        for (index, (key, item)) in map.iter().enumerate() {
                            let child = LoopScope::new(scope, item, index, map.len()).with_key(key);
                            self.nodes(body, &child, out, depth)?;
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn partial(
        &self,
        name: &str,
        location: &Location,
        scope: &dyn Lookup,
        out: &mut String,
        depth: usize,
    ) -> Result<()> {
        if depth >= self.max_depth {
            return Err(SkeinError::render(format!(
                "partial '{}' at line {}, column {} exceeds the maximum nesting depth of {}",
                name, location.line, location.column, self.max_depth
            )));
        }

        let not_found = || SkeinError::PartialNotFound {
            name: name.to_string(),
            location: *location,
        };
        let resolver = self.partials.ok_or_else(not_found)?;

        match resolver.resolve_partial(name).ok_or_else(not_found)? {
            PartialSource::Parsed(nodes) => self.nodes(nodes, scope, out, depth + 1),
            PartialSource::Text(text) => {
                let nodes = parse_source(&text)?;
                self.nodes(&nodes, scope, out, depth + 1)
            }
        }
    }
}

/// Converts a value to output text.
///
/// `null` is empty, strings are verbatim, numbers and booleans use their
/// JSON text, sequences and mappings render as compact JSON.
pub fn stringify(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(""),
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}

/// Truthiness predicate used by `if` and `unless`.
///
/// Absent values, `null`, `false`, `""`, any casing of `"false"`, numeric
/// zero and empty sequences or mappings are falsy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
        Some(Value::Number(n)) => n.as_f64().map_or(true, |f| f != 0.0),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

/// Escapes `& < > " '` for HTML text and attribute values.
pub fn html_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Escapes text for the inside of a JSON string literal: quotes,
/// backslashes and control characters.
pub fn json_string_escape(input: &str) -> Cow<'_, str> {
    if !input.chars().any(|c| c == '"' || c == '\\' || c.is_control()) {
        return Cow::Borrowed(input);
    }
    let quoted = Value::String(input.to_string()).to_string();
    Cow::Owned(quoted[1..quoted.len() - 1].to_string())
}
