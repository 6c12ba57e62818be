// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Hydration registry.
//!
//! Request-scoped bookkeeping of which data sections claimed which window
//! attribute. The registry is owned by the caller and passed by `&mut`
//! into a render; one registry per in-flight request.

use crate::error::{Result, SkeinError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Where a claim was made: `<document>:<line>:<column>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// The document name.
    pub document: String,
    /// 1-indexed line.
    pub line: usize,
    /// 1-indexed column.
    pub column: usize,
}

impl SourceLocation {
    /// Creates a source location.
    pub fn new(document: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            document: document.into(),
            line,
            column,
        }
    }

    fn is_present(&self) -> bool {
        !self.document.trim().is_empty() && self.line > 0 && self.column > 0
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.document, self.line, self.column)
    }
}

/// How a later claim combines its data with an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Nested mappings are merged recursively.
    Deep,
    /// Only top-level keys are merged; nested values are replaced.
    Shallow,
}

impl MergeStrategy {
    /// Parses a `merge` attribute value, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "deep" => Some(Self::Deep),
            "shallow" => Some(Self::Shallow),
            _ => None,
        }
    }

    /// Merges `incoming` into `target`.
    ///
    /// Two mappings are combined key by key, later values winning; any other
    /// combination replaces `target`.
    pub fn merge(self, target: &mut Value, incoming: Value) {
        match (target, incoming) {
            (Value::Object(existing), Value::Object(incoming)) => {
                for (key, value) in incoming {
                    match (self, existing.get_mut(&key)) {
                        (MergeStrategy::Deep, Some(slot)) => self.merge(slot, value),
                        _ => {
                            existing.insert(key, value);
                        }
                    }
                }
            }
            (target, incoming) => *target = incoming,
        }
    }
}

/// One registration of a window attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HydrationClaim {
    /// The window attribute claimed.
    pub window_attribute: String,
    /// Where the claim was made.
    pub location: SourceLocation,
    /// Merge strategy declared by the claiming section, if any.
    pub merge: Option<MergeStrategy>,
}

impl HydrationClaim {
    /// Creates a claim, validating its inputs.
    ///
    /// # Errors
    ///
    /// [`SkeinError::Validation`] for an empty window attribute or a source
    /// location without a document name or position.
    pub fn new(
        window_attribute: impl Into<String>,
        location: SourceLocation,
        merge: Option<MergeStrategy>,
    ) -> Result<Self> {
        let window_attribute = window_attribute.into();
        if window_attribute.trim().is_empty() {
            return Err(SkeinError::Validation(
                "window attribute must not be empty".to_string(),
            ));
        }
        if !location.is_present() {
            return Err(SkeinError::Validation(format!(
                "claim for '{}' has no source location",
                window_attribute
            )));
        }
        Ok(Self {
            window_attribute,
            location,
            merge,
        })
    }
}

/// Request-scoped window attribute registry.
#[derive(Debug, Clone, Default)]
pub struct HydrationRegistry {
    claims: Vec<HydrationClaim>,
    first_claim: HashMap<String, usize>,
}

impl HydrationRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a claim on `window_attribute`.
    ///
    /// A repeated claim is accepted only when it declares a merge strategy.
    ///
    /// # Errors
    ///
    /// - [`SkeinError::Validation`] for malformed inputs
    /// - [`SkeinError::Collision`] for a second claim without a merge
    ///   strategy, carrying both locations
    pub fn register(
        &mut self,
        window_attribute: &str,
        location: SourceLocation,
        merge: Option<MergeStrategy>,
    ) -> Result<()> {
        let claim = HydrationClaim::new(window_attribute, location, merge)?;

        if let Some(&index) = self.first_claim.get(&claim.window_attribute) {
            if claim.merge.is_none() {
                return Err(SkeinError::Collision {
                    window_attribute: claim.window_attribute,
                    first: self.claims[index].location.clone(),
                    second: claim.location,
                });
            }
        } else {
            self.first_claim
                .insert(claim.window_attribute.clone(), self.claims.len());
        }

        tracing::trace!(
            window = %claim.window_attribute,
            at = %claim.location,
            "hydration claim registered"
        );
        self.claims.push(claim);
        Ok(())
    }

    /// Every accepted claim, in registration order.
    pub fn claims(&self) -> &[HydrationClaim] {
        &self.claims
    }

    /// Distinct claimed window attributes, in first-claim order.
    pub fn window_attributes(&self) -> Vec<&str> {
        let mut names: Vec<(usize, &str)> = self
            .first_claim
            .iter()
            .map(|(name, index)| (*index, name.as_str()))
            .collect();
        names.sort_unstable();
        names.into_iter().map(|(_, name)| name).collect()
    }

    /// Whether `window_attribute` has been claimed.
    pub fn is_claimed(&self, window_attribute: &str) -> bool {
        self.first_claim.contains_key(window_attribute)
    }

    /// Number of accepted claims.
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Whether nothing has been claimed.
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Forgets every claim, ready for the next request.
    pub fn clear(&mut self) {
        self.claims.clear();
        self.first_claim.clear();
    }
}
