// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Skein engine for composing and rendering documents.
//!
//! This module provides the [`Engine`] type that handles the complete
//! lifecycle of a page: loading, parsing, composition, caching, rendering
//! and hydration.
//!
//! # Quick Start
//!
//! ```
//! use skein::{Context, Engine, MemoryLoader};
//!
//! let loader = MemoryLoader::new().with(
//!     "hello",
//!     r#"<data window="greeting">{"name": "{{name}}"}</data>
//! <template><p>Hello, {{greeting.name}}!</p></template>"#,
//! );
//! let engine = Engine::with_memory_cache(loader, 100)?;
//!
//! let context = Context::builder()
//!     .server(serde_json::json!({ "name": "World" }))
//!     .build()?;
//! let view = engine.render_page("hello", &context)?;
//! assert!(view.html.starts_with("<p>Hello, World!</p>"));
//! # Ok::<(), skein::SkeinError>(())
//! ```
//!
//! # Architecture
//!
//! The engine coordinates several subsystems:
//!
//! - **Loader**: Locates document sources by name (filesystem or memory)
//! - **Composition**: Resolves partials and layouts into one graph
//! - **Cache**: Stores compositions for reuse
//! - **View**: Aggregates data, renders templates and layouts
//! - **Injector**: Splices the hydration artifact into the HTML
//!
//! # Thread Safety
//!
//! An engine is `Send + Sync` when its loader is; compositions are shared
//! read-only as `Arc<Composition>`. The [`HydrationRegistry`] is the only
//! mutable render state and belongs to one request.

use crate::cache::{CompositionCache, MemoryCache, NoOpCache};
use crate::composition::Composition;
use crate::config::Config;
use crate::context::Context;
use crate::error::Result;
use crate::hydration::{generate_nonce, HydrationRegistry};
use crate::loader::DocumentLoader;
use crate::view::{RenderedView, ViewRenderer};
use std::sync::Arc;
use tracing::{debug, trace};

#[cfg(feature = "filesystem")]
use crate::loader::FileSystemLoader;

/// Main skein engine.
///
/// The engine is generic over the loader type `L`, allowing different
/// document loading strategies (filesystem, memory, network, etc.).
///
/// # Examples
///
/// ```
/// use skein::{Config, Engine, MemoryLoader, NoOpCache};
///
/// let loader = MemoryLoader::new();
/// loader.add("hello", "<p>Hello, {{name}}!</p>");
///
/// let engine = Engine::new(loader, Box::new(NoOpCache::new()), Config::default())?;
/// # Ok::<(), skein::SkeinError>(())
/// ```
#[derive(Debug)]
pub struct Engine<L: DocumentLoader> {
    loader: L,
    cache: Box<dyn CompositionCache>,
    view: ViewRenderer,
    config: Config,
}

impl<L: DocumentLoader> Engine<L> {
    /// Creates a new engine.
    ///
    /// # Errors
    ///
    /// [`crate::SkeinError::Config`] if the hydration settings are invalid.
    pub fn new(loader: L, cache: Box<dyn CompositionCache>, config: Config) -> Result<Self> {
        let view = ViewRenderer::new(config.renderer(), config.injector()?);
        Ok(Self {
            loader,
            cache,
            view,
            config,
        })
    }

    /// Creates a new engine with an in-memory LRU cache and default
    /// configuration.
    pub fn with_memory_cache(loader: L, cache_size: usize) -> Result<Self> {
        let cache = Box::new(MemoryCache::new(cache_size));
        Self::new(loader, cache, Config::default())
    }

    /// Returns a reference to the loader used by this engine.
    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// The configuration the engine was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The render pipeline.
    pub fn view(&self) -> &ViewRenderer {
        &self.view
    }

    /// Resolves the composition rooted at `root`, consulting the cache.
    ///
    /// # Errors
    ///
    /// Resolution errors from [`Composition::resolve`], or
    /// [`crate::SkeinError::Cache`] if the cache is unusable.
    pub fn compose(&self, root: &str) -> Result<Arc<Composition>> {
        if let Some(cached) = self.cache.get(root)? {
            trace!(root, "composition cache hit");
            return Ok(cached);
        }

        debug!(root, "composition cache miss, resolving");
        let composition = Arc::new(Composition::resolve(root, &self.loader)?);
        self.cache.set(root, composition.clone())?;
        Ok(composition)
    }

    /// Drops the cached composition for `root`.
    ///
    /// Compositions that include `root` as a partial or layout are cached
    /// under their own root name; call [`Engine::clear_cache`] after editing
    /// a shared document.
    pub fn invalidate(&self, root: &str) -> Result<()> {
        self.cache.remove(root)
    }

    /// Checks if a composition is in the cache.
    pub fn cache_contains(&self, root: &str) -> bool {
        self.cache.contains_key(root)
    }

    /// Clears all cached compositions.
    pub fn clear_cache(&self) -> Result<()> {
        self.cache.clear()
    }

    /// Renders `root` for one request.
    ///
    /// Claims are recorded in `registry`, which the caller owns for the
    /// duration of the request.
    pub fn render(
        &self,
        root: &str,
        context: &Context,
        registry: &mut HydrationRegistry,
        nonce: Option<&str>,
    ) -> Result<RenderedView> {
        let composition = self.compose(root)?;
        self.view.render(&composition, context, registry, nonce)
    }

    /// Renders `root` with a fresh registry, generating a nonce when the
    /// configuration asks for one.
    pub fn render_page(&self, root: &str, context: &Context) -> Result<RenderedView> {
        let mut registry = HydrationRegistry::new();
        let nonce = self.config.hydration.nonce.then(generate_nonce);
        self.render(root, context, &mut registry, nonce.as_deref())
    }

    /// Renders standalone source text, resolving partials through the
    /// loader.
    ///
    /// Only the template is rendered; data sections and layouts are not
    /// processed.
    pub fn render_source(&self, source: &str, context: &Context) -> Result<String> {
        let partials = |name: &str| match self.loader.load(name) {
            Ok(found) => found,
            Err(e) => {
                debug!(partial = name, error = %e, "partial failed to load");
                None
            }
        };
        self.view.renderer().render(source, context, Some(&partials))
    }
}

#[cfg(feature = "filesystem")]
impl Engine<FileSystemLoader> {
    /// Creates an engine over `config.templates.root_dir`.
    ///
    /// A `cache_size` of 0 disables composition caching.
    pub fn from_config(config: Config) -> Result<Self> {
        let loader = FileSystemLoader::new(&config.templates.root_dir)
            .with_extension(config.templates.extension.clone());
        let cache: Box<dyn CompositionCache> = match config.templates.cache_size {
            0 => Box::new(NoOpCache::new()),
            size => Box::new(MemoryCache::new(size)),
        };
        Self::new(loader, cache, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SkeinError;
    use crate::loader::MemoryLoader;
    use serde_json::json;

    fn engine() -> Engine<MemoryLoader> {
        let loader = MemoryLoader::new()
            .with(
                "home",
                "<data window=\"page\" layout=\"base\">{\"title\": \"Home\"}</data><template><main>{{page.title}}</main></template>",
            )
            .with(
                "base",
                "<data></data><template><html><head></head><body>{{{content}}}</body></html></template>",
            );
        Engine::with_memory_cache(loader, 10).unwrap()
    }

    #[test]
    fn test_compose_is_cached() {
        let engine = engine();
        assert!(!engine.cache_contains("home"));
        let first = engine.compose("home").unwrap();
        assert!(engine.cache_contains("home"));
        let second = engine.compose("home").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        engine.invalidate("home").unwrap();
        assert!(!engine.cache_contains("home"));
    }

    #[test]
    fn test_cache_serves_stale_until_invalidated() {
        let engine = engine();
        engine.compose("home").unwrap();
        engine.loader().add(
            "home",
            "<data></data><template>changed</template>",
        );

        let view = engine.render_page("home", &Context::default()).unwrap();
        assert!(view.html.contains("<main>Home</main>"));

        engine.clear_cache().unwrap();
        let view = engine.render_page("home", &Context::default()).unwrap();
        assert_eq!(view.html, "changed");
    }

    #[test]
    fn test_render_page_uses_fresh_registry_and_nonce() {
        let engine = engine();
        let ctx = Context::default();
        let first = engine.render_page("home", &ctx).unwrap();
        let second = engine.render_page("home", &ctx).unwrap();

        assert!(first.html.contains("<body><main>Home</main></body>"));
        assert!(first.html.contains(" nonce=\""));
        assert_ne!(first.html, second.html);
        assert_eq!(first.client_data["page"], json!({ "title": "Home" }));
    }

    #[test]
    fn test_registry_outlives_one_render() {
        let engine = engine();
        let mut registry = HydrationRegistry::new();
        engine
            .render("home", &Context::default(), &mut registry, None)
            .unwrap();
        let err = engine
            .render("home", &Context::default(), &mut registry, None)
            .unwrap_err();
        assert!(matches!(err, SkeinError::Collision { .. }));
    }

    #[test]
    fn test_missing_root() {
        let err = engine().render_page("nope", &Context::default()).unwrap_err();
        assert!(matches!(err, SkeinError::TemplateNotFound { ref name, .. } if name == "nope"));
    }

    #[test]
    fn test_render_source_uses_loader_for_partials() {
        let loader = MemoryLoader::new().with("name", "<b>{{who}}</b>");
        let engine = Engine::with_memory_cache(loader, 1).unwrap();
        let ctx = Context::builder().request(json!({ "who": "you" })).build().unwrap();
        let html = engine.render_source("Hi {{> name}}", &ctx).unwrap();
        assert_eq!(html, "Hi <b>you</b>");
    }

    #[cfg(feature = "filesystem")]
    #[test]
    fn test_from_config_without_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("p.sfc"), "<p>{{x}}</p>").unwrap();

        let mut config = Config::default();
        config.templates.root_dir = dir.path().to_string_lossy().into_owned();
        config.templates.cache_size = 0;
        let engine = Engine::from_config(config).unwrap();

        let ctx = Context::builder().server(json!({ "x": 1 })).build().unwrap();
        assert_eq!(engine.render_page("p", &ctx).unwrap().html, "<p>1</p>");
        assert!(!engine.cache_contains("p"));
    }
}
