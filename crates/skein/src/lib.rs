// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

// SkeinError carries source snippets and both collision locations.
#![allow(clippy::result_large_err)]

//! # Skein
//!
//! Server-side single-file-component templates with safe hydration.
//!
//! A skein document bundles a data section, a markup template and an
//! optional logic section in one file:
//!
//! ```text
//! <data window="page" layout="base">{"title": "{{site}}"}</data>
//! <template>
//!   <h1>{{page.title}}</h1>
//!   {{#each posts}}{{> post-card}}{{/each}}
//! </template>
//! ```
//!
//! ## Features
//!
//! - Hand-rolled document and markup grammars with precise error locations
//! - Layered request/server/client evaluation context
//! - Partials and layouts resolved into a cycle-checked composition
//! - Hydration of `window` data into the rendered HTML, spliced only where
//!   it cannot corrupt a script, style, comment or tag
//! - Built-in composition caching
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skein::{Config, Context, Engine};
//!
//! let engine = Engine::from_config(Config::load_or_default(".")?)?;
//! let context = Context::builder()
//!     .request(serde_json::json!({ "path": "/" }))
//!     .build()?;
//! let view = engine.render_page("pages/home", &context)?;
//! println!("{}", view.html);
//! # Ok::<(), skein::SkeinError>(())
//! ```

/// Abstract Syntax Tree types for documents and markup.
pub mod ast;
/// Composition caching.
pub mod cache;
/// Resolution of partials and layouts into one graph.
pub mod composition;
/// Configuration loading.
pub mod config;
/// Layered evaluation context.
pub mod context;
/// Document (section) grammar.
pub mod document;
/// Main engine facade.
pub mod engine;
/// Error types and reporting.
pub mod error;
/// Hydration registry, HTML safety analysis and injection.
pub mod hydration;
/// Document loading (filesystem, memory).
pub mod loader;
/// Tracing subscriber setup.
pub mod logging;
/// Markup grammar.
pub mod markup;
/// AST-walking template renderer.
pub mod renderer;
/// Render pipeline from composition to hydrated HTML.
pub mod view;


pub use ast::{Document, Location, Node, Section, SectionKind, Template};
pub use cache::{CompositionCache, MemoryCache, NoOpCache};
pub use composition::{Component, Composition};
pub use config::Config;
pub use context::{Context, ContextBuilder, Layer, Lookup};
pub use engine::Engine;
pub use error::{ParseError, ParseErrorKind, Result, SkeinError, SourceContext};
pub use hydration::{
    HtmlSpans, HydrationPayload, HydrationRegistry, InjectionStrategy, Injector, MergeStrategy,
    SourceLocation,
};
#[cfg(feature = "filesystem")]
pub use loader::FileSystemLoader;
pub use loader::{DocumentLoader, MemoryLoader};
pub use renderer::{render, Escape, PartialResolver, PartialSource, Renderer};
pub use view::{RenderedView, ViewRenderer};
