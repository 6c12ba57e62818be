// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Skein configuration.
//!
//! Configuration is loaded from `skein.toml`. Every key is optional.
//!
//! # Example Configuration
//!
//! ```toml
//! log_level = "info"
//!
//! [templates]
//! root_dir = "templates"
//! extension = "sfc"
//! cache_size = 100
//!
//! [render]
//! max_partial_depth = 64
//!
//! [hydration]
//! strategy = "early"      # early | late | mount
//! mount_id = "app"
//! fallback_when_unsafe = true
//! exclude = ["admin/**"]
//! nonce = true
//! ```

use crate::error::{Result, SkeinError};
use crate::hydration::{InjectionStrategy, Injector};
use crate::renderer::{Renderer, DEFAULT_MAX_PARTIAL_DEPTH};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Name of the configuration file looked up by [`Config::load_or_default`].
pub const CONFIG_FILE_NAME: &str = "skein.toml";

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// Template loading settings.
    #[serde(default)]
    pub templates: TemplatesConfig,
    /// Rendering settings.
    #[serde(default)]
    pub render: RenderConfig,
    /// Hydration settings.
    #[serde(default)]
    pub hydration: HydrationConfig,
    /// Tracing filter directive (default: "warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Where and how documents are loaded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TemplatesConfig {
    /// Directory containing documents (default: "templates").
    #[serde(default = "default_root_dir")]
    pub root_dir: String,
    /// Extension appended to extension-less names (default: "sfc").
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Compositions kept in the LRU cache; 0 disables caching (default: 100).
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

/// Rendering limits.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RenderConfig {
    /// Maximum partial nesting depth (default: 64).
    #[serde(default = "default_max_partial_depth")]
    pub max_partial_depth: usize,
}

/// Hydration injection settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HydrationConfig {
    /// Injection strategy (default: early).
    #[serde(default)]
    pub strategy: InjectionStrategy,
    /// Mount element id for the mount strategy (default: "app").
    #[serde(default = "default_mount_id")]
    pub mount_id: String,
    /// Fall back to late injection when no safe position exists
    /// (default: true).
    #[serde(default = "default_true")]
    pub fallback_when_unsafe: bool,
    /// Glob patterns of root document names that always inject late.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Generate a nonce when the caller supplies none (default: true).
    #[serde(default = "default_true")]
    pub nonce: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_root_dir() -> String {
    "templates".to_string()
}

fn default_extension() -> String {
    "sfc".to_string()
}

fn default_cache_size() -> usize {
    100
}

fn default_max_partial_depth() -> usize {
    DEFAULT_MAX_PARTIAL_DEPTH
}

fn default_mount_id() -> String {
    Injector::DEFAULT_MOUNT_ID.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            templates: TemplatesConfig::default(),
            render: RenderConfig::default(),
            hydration: HydrationConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            extension: default_extension(),
            cache_size: default_cache_size(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_partial_depth: default_max_partial_depth(),
        }
    }
}

impl Default for HydrationConfig {
    fn default() -> Self {
        Self {
            strategy: InjectionStrategy::default(),
            mount_id: default_mount_id(),
            fallback_when_unsafe: true,
            exclude: Vec::new(),
            nonce: true,
        }
    }
}

impl Config {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// [`SkeinError::Config`] if the text is not valid configuration.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SkeinError::Config(e.to_string()))
    }

    /// Loads configuration from a file.
    ///
    /// # Errors
    ///
    /// [`SkeinError::Io`] if the file cannot be read, [`SkeinError::Config`]
    /// if it cannot be parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Loads `skein.toml` from `dir`, or the defaults if there is none.
    pub fn load_or_default<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let config_path = dir.as_ref().join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Ok(Config::default());
        }
        Self::load(config_path)
    }

    /// Builds the renderer described by `[render]`.
    pub fn renderer(&self) -> Renderer {
        Renderer::new().with_max_partial_depth(self.render.max_partial_depth)
    }

    /// Builds the injector described by `[hydration]`.
    ///
    /// # Errors
    ///
    /// [`SkeinError::Config`] for an invalid exclude pattern.
    pub fn injector(&self) -> Result<Injector> {
        Injector::new(self.hydration.strategy)
            .with_mount_id(self.hydration.mount_id.clone())
            .with_fallback_when_unsafe(self.hydration.fallback_when_unsafe)
            .with_exclude(&self.hydration.exclude)
    }
}
