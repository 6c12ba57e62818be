// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Evaluation context.
//!
//! A [`Context`] holds three immutable layers of JSON data:
//!
//! - **request**: values supplied with the incoming request
//! - **server**: server-only values, never hydrated
//! - **client**: values exposed to the browser through hydration
//!
//! Unqualified lookups search the layers in the order client, server,
//! request. Paths may be dotted and may index into sequences
//! (`items.0.name`). A path whose first segment is a layer name
//! (`server.secret`) addresses that layer directly when no layer owns that
//! key itself.
//!
//! Loop bodies are evaluated against a [`LoopScope`], which shadows the
//! parent for `this`, `@index` and the keys of the current item, and
//! delegates every other lookup to its parent.

use crate::error::{Result, SkeinError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::Arc;

/// Capability for resolving lookup paths.
///
/// Implemented by the base [`Context`] and by overlays. An overlay answers
/// the names it owns and delegates everything else to its parent.
pub trait Lookup {
    /// Resolves a lookup path, or `None` when nothing answers to it.
    fn lookup(&self, path: &str) -> Option<Cow<'_, Value>>;

    /// The element of the innermost active loop.
    fn current_item(&self) -> Option<&Value> {
        None
    }

    /// The zero-based index of the innermost active loop.
    fn current_index(&self) -> Option<usize> {
        None
    }
}

/// One of the three context layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Request-supplied values.
    Request,
    /// Server-only values.
    Server,
    /// Client-exposed values.
    Client,
}

impl Layer {
    /// Lookup order for unqualified paths.
    pub const MERGE_ORDER: [Layer; 3] = [Layer::Client, Layer::Server, Layer::Request];

    /// The qualifier used in lookup paths.
    pub fn name(self) -> &'static str {
        match self {
            Layer::Request => "request",
            Layer::Server => "server",
            Layer::Client => "client",
        }
    }

    /// Parses a path qualifier.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "request" => Some(Layer::Request),
            "server" => Some(Layer::Server),
            "client" => Some(Layer::Client),
            _ => None,
        }
    }
}

/// Splits a dotted path into its first segment and the remainder.
fn split_first(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((first, rest)) => (first, Some(rest)),
        None => (path, None),
    }
}

/// Walks `segments` from `root`. Objects are indexed by key, sequences by
/// a decimal index; anything else ends the walk.
pub fn resolve_path<'v, 's>(
    root: &'v Value,
    segments: impl IntoIterator<Item = &'s str>,
) -> Option<&'v Value> {
    let mut current = root;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn resolve_in_map<'v>(map: &'v Map<String, Value>, path: &str) -> Option<&'v Value> {
    let (first, rest) = split_first(path);
    let value = map.get(first)?;
    match rest {
        Some(rest) => resolve_path(value, rest.split('.')),
        None => Some(value),
    }
}

/// Immutable three-layer variable namespace.
///
/// Cloning is cheap: layers are shared behind [`Arc`]s. Deriving a context
/// with a replaced layer never touches the original.
#[derive(Debug, Clone, Default)]
pub struct Context {
    request: Arc<Map<String, Value>>,
    server: Arc<Map<String, Value>>,
    client: Arc<Map<String, Value>>,
}

impl Context {
    /// Creates a context from the three layers.
    pub fn new(
        request: Map<String, Value>,
        server: Map<String, Value>,
        client: Map<String, Value>,
    ) -> Self {
        Self {
            request: Arc::new(request),
            server: Arc::new(server),
            client: Arc::new(client),
        }
    }

    /// Starts building a context from serializable values.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Borrows one layer.
    pub fn layer(&self, layer: Layer) -> &Map<String, Value> {
        match layer {
            Layer::Request => &self.request,
            Layer::Server => &self.server,
            Layer::Client => &self.client,
        }
    }

    /// Returns a new context with the server layer replaced.
    pub fn with_server(&self, server: Map<String, Value>) -> Self {
        Self {
            server: Arc::new(server),
            ..self.clone()
        }
    }

    /// Returns a new context with the client layer replaced.
    pub fn with_client(&self, client: Map<String, Value>) -> Self {
        Self {
            client: Arc::new(client),
            ..self.clone()
        }
    }

    /// Resolves a path within a single layer.
    pub fn lookup_in(&self, layer: Layer, path: &str) -> Option<&Value> {
        resolve_in_map(self.layer(layer), path)
    }

    fn lookup_merged(&self, path: &str) -> Option<&Value> {
        let (first, _) = split_first(path);
        Layer::MERGE_ORDER
            .iter()
            .find(|layer| self.layer(**layer).contains_key(first))
            .and_then(|layer| self.lookup_in(*layer, path))
    }
}

impl Lookup for Context {
    fn lookup(&self, path: &str) -> Option<Cow<'_, Value>> {
        let path = path.trim();
        if path.is_empty() || path == "this" || path == "." || path.starts_with('@') {
            return None;
        }
        if let Some(value) = self.lookup_merged(path) {
            return Some(Cow::Borrowed(value));
        }

        let (first, rest) = split_first(path);
        let layer = Layer::from_name(first)?;
        match rest {
            Some(rest) => self.lookup_in(layer, rest).map(Cow::Borrowed),
            None => Some(Cow::Owned(Value::Object(self.layer(layer).clone()))),
        }
    }
}

/// Builder for [`Context`] accepting any serializable layer values.
#[derive(Debug, Default)]
pub struct ContextBuilder {
    request: Option<Value>,
    server: Option<Value>,
    client: Option<Value>,
    error: Option<String>,
}

impl ContextBuilder {
    fn encode<T: Serialize>(&mut self, value: T) -> Option<Value> {
        match serde_json::to_value(value) {
            Ok(value) => Some(value),
            Err(e) => {
                self.error.get_or_insert(e.to_string());
                None
            }
        }
    }

    /// Sets the request layer.
    pub fn request<T: Serialize>(mut self, value: T) -> Self {
        self.request = self.encode(value);
        self
    }

    /// Sets the server layer.
    pub fn server<T: Serialize>(mut self, value: T) -> Self {
        self.server = self.encode(value);
        self
    }

    /// Sets the client layer.
    pub fn client<T: Serialize>(mut self, value: T) -> Self {
        self.client = self.encode(value);
        self
    }

    /// Builds the context.
    ///
    /// # Errors
    ///
    /// Returns [`SkeinError::Validation`] if a value failed to serialize or
    /// does not encode to a JSON object (`null` counts as empty).
    pub fn build(self) -> Result<Context> {
        if let Some(error) = self.error {
            return Err(SkeinError::Validation(format!(
                "context value failed to serialize: {}",
                error
            )));
        }
        Ok(Context::new(
            into_layer(Layer::Request, self.request)?,
            into_layer(Layer::Server, self.server)?,
            into_layer(Layer::Client, self.client)?,
        ))
    }
}

fn into_layer(layer: Layer, value: Option<Value>) -> Result<Map<String, Value>> {
    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(SkeinError::Validation(format!(
            "the {} layer must be a JSON object, got {}",
            layer.name(),
            json_type_name(&other)
        ))),
    }
}

/// A short name for a JSON value's type.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Per-iteration overlay used inside `{{#each}}` bodies.
///
/// Owns `this`, `.`, `this.<path>`, `@index`, `@first`, `@last`, `@key`
/// and, when the item is a mapping, the item's own keys. Everything else
/// is delegated to the parent.
pub struct LoopScope<'a> {
    parent: &'a dyn Lookup,
    item: &'a Value,
    index: usize,
    length: usize,
    key: Option<&'a str>,
}

impl<'a> LoopScope<'a> {
    /// Creates the overlay for one iteration.
    pub fn new(parent: &'a dyn Lookup, item: &'a Value, index: usize, length: usize) -> Self {
        Self {
            parent,
            item,
            index,
            length,
            key: None,
        }
    }

    /// Binds `@key` for iterations over a mapping.
    pub fn with_key(mut self, key: &'a str) -> Self {
        self.key = Some(key);
        self
    }

    /// Whether this is the first iteration.
    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    /// Whether this is the last iteration.
    pub fn is_last(&self) -> bool {
        self.index + 1 == self.length
    }
}

impl Lookup for LoopScope<'_> {
    fn lookup(&self, path: &str) -> Option<Cow<'_, Value>> {
        let path = path.trim();
        match path {
            "this" | "." => return Some(Cow::Borrowed(self.item)),
            "@index" => return Some(Cow::Owned(Value::from(self.index))),
            "@first" => return Some(Cow::Owned(Value::Bool(self.is_first()))),
            "@last" => return Some(Cow::Owned(Value::Bool(self.is_last()))),
            "@key" => {
                return match self.key {
                    Some(key) => Some(Cow::Owned(Value::String(key.to_string()))),
                    None => self.parent.lookup(path),
                }
            }
            _ => {}
        }

        if let Some(rest) = path.strip_prefix("this.") {
            return resolve_path(self.item, rest.split('.')).map(Cow::Borrowed);
        }

        let (first, _) = split_first(path);
        if let Value::Object(map) = self.item {
            if map.contains_key(first) {
                return resolve_in_map(map, path).map(Cow::Borrowed);
            }
        }

        self.parent.lookup(path)
    }

    fn current_item(&self) -> Option<&Value> {
        Some(self.item)
    }

    fn current_index(&self) -> Option<usize> {
        Some(self.index)
    }
}

/// Overlay binding a fixed set of names, delegating the rest.
///
/// Used to hand a layout the rendered output of its child as `content`.
pub struct Bindings<'a> {
    parent: &'a dyn Lookup,
    values: Map<String, Value>,
}

impl<'a> Bindings<'a> {
    /// Creates an empty overlay over `parent`.
    pub fn new(parent: &'a dyn Lookup) -> Self {
        Self {
            parent,
            values: Map::new(),
        }
    }

    /// Binds `name` to `value`.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl Lookup for Bindings<'_> {
    fn lookup(&self, path: &str) -> Option<Cow<'_, Value>> {
        let path = path.trim();
        let (first, _) = split_first(path);
        if self.values.contains_key(first) {
            return resolve_in_map(&self.values, path).map(Cow::Borrowed);
        }
        self.parent.lookup(path)
    }

    fn current_item(&self) -> Option<&Value> {
        self.parent.current_item()
    }

    fn current_index(&self) -> Option<usize> {
        self.parent.current_index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> Context {
        Context::builder()
            .request(json!({ "path": "/home", "shared": "request" }))
            .server(json!({ "secret": "s3cr3t", "shared": "server" }))
            .client(json!({
                "shared": "client",
                "user": { "name": "Ada", "tags": ["a", "b"] },
                "items": [{ "name": "first" }, { "name": "second" }]
            }))
            .build()
            .unwrap()
    }

    fn get(scope: &dyn Lookup, path: &str) -> Option<Value> {
        scope.lookup(path).map(Cow::into_owned)
    }

    #[test]
    fn test_merged_lookup_order() {
        let ctx = context();
        assert_eq!(get(&ctx, "shared"), Some(json!("client")));
        assert_eq!(get(&ctx, "secret"), Some(json!("s3cr3t")));
        assert_eq!(get(&ctx, "path"), Some(json!("/home")));
        assert_eq!(get(&ctx, "missing"), None);
    }

    #[test]
    fn test_nested_paths() {
        let ctx = context();
        assert_eq!(get(&ctx, "user.name"), Some(json!("Ada")));
        assert_eq!(get(&ctx, "user.tags.1"), Some(json!("b")));
        assert_eq!(get(&ctx, "items.0.name"), Some(json!("first")));
        assert_eq!(get(&ctx, "items.9.name"), None);
        assert_eq!(get(&ctx, "user.name.first"), None);
    }

    #[test]
    fn test_qualified_lookup() {
        let ctx = context();
        assert_eq!(get(&ctx, "server.shared"), Some(json!("server")));
        assert_eq!(get(&ctx, "request.shared"), Some(json!("request")));
        assert_eq!(get(&ctx, "client.user.name"), Some(json!("Ada")));
        assert_eq!(ctx.lookup_in(Layer::Server, "secret"), Some(&json!("s3cr3t")));
    }

    #[test]
    fn test_special_names_need_a_loop() {
        let ctx = context();
        assert_eq!(get(&ctx, "this"), None);
        assert_eq!(get(&ctx, "@index"), None);
        assert!(ctx.current_item().is_none());
    }

    #[test]
    fn test_with_client_leaves_original_untouched() {
        let ctx = context();
        let mut client = Map::new();
        client.insert("shared".into(), json!("replaced"));
        let derived = ctx.with_client(client);

        assert_eq!(get(&derived, "shared"), Some(json!("replaced")));
        assert_eq!(get(&ctx, "shared"), Some(json!("client")));
        assert_eq!(get(&derived, "secret"), Some(json!("s3cr3t")));
    }

    #[test]
    fn test_loop_scope_shadows_and_delegates() {
        let ctx = context();
        let item = json!({ "name": "inner", "shared": "item" });
        let scope = LoopScope::new(&ctx, &item, 1, 3);

        assert_eq!(get(&scope, "name"), Some(json!("inner")));
        assert_eq!(get(&scope, "shared"), Some(json!("item")));
        assert_eq!(get(&scope, "this.name"), Some(json!("inner")));
        assert_eq!(get(&scope, "secret"), Some(json!("s3cr3t")));
        assert_eq!(get(&scope, "@index"), Some(json!(1)));
        assert_eq!(get(&scope, "@first"), Some(json!(false)));
        assert_eq!(get(&scope, "@last"), Some(json!(false)));
        assert_eq!(scope.current_index(), Some(1));
        assert_eq!(scope.current_item(), Some(&item));
    }

    #[test]
    fn test_nested_loop_scopes() {
        let ctx = context();
        let outer_item = json!({ "group": "g1" });
        let outer = LoopScope::new(&ctx, &outer_item, 0, 1).with_key("first-key");
        let inner_item = json!("leaf");
        let inner = LoopScope::new(&outer, &inner_item, 2, 3);

        assert_eq!(get(&inner, "this"), Some(json!("leaf")));
        assert_eq!(get(&inner, "group"), Some(json!("g1")));
        assert_eq!(get(&inner, "@key"), Some(json!("first-key")));
        assert_eq!(get(&inner, "@last"), Some(json!(true)));
    }

    #[test]
    fn test_bindings_overlay() {
        let ctx = context();
        let scope = Bindings::new(&ctx).bind("content", "<p>child</p>");
        assert_eq!(get(&scope, "content"), Some(json!("<p>child</p>")));
        assert_eq!(get(&scope, "user.name"), Some(json!("Ada")));
    }

    #[test]
    fn test_builder_rejects_non_objects() {
        let err = Context::builder().client(json!([1, 2])).build().unwrap_err();
        assert!(matches!(err, SkeinError::Validation(msg) if msg.contains("client")));

        let ctx = Context::builder().server(Value::Null).build().unwrap();
        assert!(ctx.layer(Layer::Server).is_empty());
    }
}
