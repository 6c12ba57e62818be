// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Document loading.
//!
//! This module provides the [`DocumentLoader`] trait consumed by view
//! composition, and two implementations:
//!
//! - [`FileSystemLoader`]: reads `<root>/<name>.<extension>` from disk
//! - [`MemoryLoader`]: serves sources registered in memory (tests, embedding)
//!
//! Any `Fn(&str) -> Option<String>` closure is a loader too.
//!
//! A loader answers `Ok(None)` for an unknown name. An `Err` means the
//! loader itself failed; composition reports both as a missing template.

use crate::error::{Result, SkeinError};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[cfg(feature = "filesystem")]
use std::path::{Component, Path, PathBuf};

/// Capability for loading document sources by name.
pub trait DocumentLoader: Send + Sync {
    /// Returns the source registered under `name`, or `None` if unknown.
    fn load(&self, name: &str) -> Result<Option<String>>;
}

impl<F> DocumentLoader for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn load(&self, name: &str) -> Result<Option<String>> {
        Ok(self(name))
    }
}

impl<L: DocumentLoader + ?Sized> DocumentLoader for Arc<L> {
    fn load(&self, name: &str) -> Result<Option<String>> {
        (**self).load(name)
    }
}

/// Filesystem-backed loader.
///
/// A name maps to `<root_dir>/<name>`, with `.<extension>` appended when
/// the name has no extension of its own. Names that climb out of the root
/// (`..`) or are absolute are rejected.
///
/// # Examples
///
/// ```rust,ignore
/// use skein::FileSystemLoader;
///
/// let loader = FileSystemLoader::new("./templates");
/// // "pages/home" loads ./templates/pages/home.sfc
/// let source = loader.load("pages/home")?;
/// ```
#[cfg(feature = "filesystem")]
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    root_dir: PathBuf,
    extension: String,
}

#[cfg(feature = "filesystem")]
impl FileSystemLoader {
    /// Default file extension for documents.
    pub const DEFAULT_EXTENSION: &'static str = "sfc";

    /// Creates a loader rooted at `root_dir`.
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Self {
        Self {
            root_dir: root_dir.as_ref().to_path_buf(),
            extension: Self::DEFAULT_EXTENSION.to_string(),
        }
    }

    /// Sets the extension appended to extension-less names.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    /// The root directory.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Maps a document name to its path.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if name.trim().is_empty() || escapes {
            return Err(SkeinError::Validation(format!(
                "invalid document name '{}'",
                name
            )));
        }

        let mut path = self.root_dir.join(relative);
        if path.extension().is_none() && !self.extension.is_empty() {
            path.set_extension(&self.extension);
        }
        Ok(path)
    }
}

#[cfg(feature = "filesystem")]
impl DocumentLoader for FileSystemLoader {
    fn load(&self, name: &str) -> Result<Option<String>> {
        let path = self.path_for(name)?;
        match std::fs::read_to_string(&path) {
            Ok(source) => Ok(Some(source)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(name, path = %path.display(), "document not found on disk");
                Ok(None)
            }
            Err(e) => Err(SkeinError::Io(e)),
        }
    }
}

/// In-memory loader.
///
/// Clones share the same storage, so sources added through one handle are
/// visible to every engine holding another.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    documents: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a document source.
    pub fn add(&self, name: impl Into<String>, source: impl Into<String>) {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), source.into());
    }

    /// Builder-style [`add`](Self::add).
    pub fn with(self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.add(name, source);
        self
    }

    /// Removes a document source.
    pub fn remove(&self, name: &str) -> Option<String> {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Removes every document source.
    pub fn clear(&self) {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no source is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentLoader for MemoryLoader {
    fn load(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned())
    }
}
