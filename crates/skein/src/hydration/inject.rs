// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Choosing the splice point and inserting the hydration markup.
//!
//! An [`Injector`] never fails. When no safe position exists for the
//! configured strategy it either falls back to late injection or leaves
//! the document untouched; it never writes into a script, style, comment
//! or tag.

use super::mount::find_mount_point;
use super::safety::{HtmlSpans, SpanKind};
use crate::error::{Result, SkeinError};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use tracing::{debug, warn};

/// Where hydration markup should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionStrategy {
    /// As early as possible in `<head>`, or right before `<body>`.
    #[default]
    Early,
    /// Before the closing `</body>`.
    Late,
    /// Right before the mount element.
    Mount,
}

impl FromStr for InjectionStrategy {
    type Err = SkeinError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "early" => Ok(Self::Early),
            "late" => Ok(Self::Late),
            "mount" => Ok(Self::Mount),
            other => Err(SkeinError::Config(format!(
                "unknown injection strategy '{}', expected early, late or mount",
                other
            ))),
        }
    }
}

impl fmt::Display for InjectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Early => "early",
            Self::Late => "late",
            Self::Mount => "mount",
        })
    }
}

/// Which rule produced the insertion point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// Head section or before `<body>`.
    Early,
    /// Before the mount element.
    Mount,
    /// Before `</body>`, `</html>`, or at the end.
    Late,
}

/// Where the markup was inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InjectionPosition {
    /// Byte offset in the original document.
    pub offset: usize,
    /// Which rule chose it.
    pub placement: Placement,
}

/// Result of an injection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionOutcome {
    /// The resulting document; the original when nothing was injected.
    pub html: String,
    /// Where the markup went, or `None` if hydration was dropped.
    pub position: Option<InjectionPosition>,
}

impl InjectionOutcome {
    /// Whether markup was inserted.
    pub fn injected(&self) -> bool {
        self.position.is_some()
    }
}

/// Inserts `markup` at `offset`. Every other byte is preserved.
pub fn splice(html: &str, offset: usize, markup: &str) -> String {
    let mut out = String::with_capacity(html.len() + markup.len());
    out.push_str(&html[..offset]);
    out.push_str(markup);
    out.push_str(&html[offset..]);
    out
}

/// Finds the earliest safe insertion point.
///
/// Inside `<head>` the candidates, in priority order, are: after the last
/// `<link>`, after the last `<meta>`, after the first `<script>` element,
/// and before `</head>`. Each candidate that is not itself safe is moved to
/// the nearest safe offset before it, then after it, as long as that offset
/// stays inside the head. Without a `<head>`, the point right before
/// `<body>` is used.
pub fn earliest_injection_point(spans: &HtmlSpans<'_>) -> Option<usize> {
    let Some(head) = spans.tags("head").find(|t| !t.closing) else {
        return spans
            .tags("body")
            .find(|t| !t.closing)
            .map(|body| body.span.start)
            .filter(|offset| spans.is_safe(*offset));
    };

    let region_start = head.span.end;
    let head_close = spans
        .tags("head")
        .find(|t| t.closing && t.span.start >= region_start);
    let region_end = match head_close {
        Some(close) => close.span.start,
        None => spans
            .tags("body")
            .find(|t| !t.closing && t.span.start >= region_start)
            .map_or(spans.html().len(), |body| body.span.start),
    };
    let region = region_start..=region_end;
    let in_head = |offset: &usize| region.contains(offset);

    let last_end = |name: &str| {
        spans
            .tags(name)
            .filter(|t| !t.closing && in_head(&t.span.start))
            .last()
            .map(|t| t.span.end)
    };
    let first_script_end = spans
        .of_kind(SpanKind::Script)
        .find(|s| s.closed && in_head(&s.start))
        .map(|s| s.end);

    let candidates = [
        last_end("link"),
        last_end("meta"),
        first_script_end,
        head_close.map(|close| close.span.start),
    ];

    first_settled(spans, candidates.into_iter().flatten(), &region)
}

/// Returns the first candidate that is safe, or that can be moved to a safe
/// offset inside `region`: the nearest one before it, else after it.
fn first_settled(
    spans: &HtmlSpans<'_>,
    candidates: impl IntoIterator<Item = usize>,
    region: &RangeInclusive<usize>,
) -> Option<usize> {
    candidates.into_iter().find_map(|candidate| {
        if spans.is_safe(candidate) {
            return Some(candidate);
        }
        spans
            .nearest_safe_before(candidate)
            .filter(|offset| region.contains(offset))
            .or_else(|| {
                spans
                    .nearest_safe_after(candidate)
                    .filter(|offset| region.contains(offset))
            })
    })
}

/// Finds the late insertion point: before the last `</body>`, else before
/// the last `</html>`, else the end of the document if that is safe.
pub fn late_injection_point(spans: &HtmlSpans<'_>) -> Option<usize> {
    let last_closing = |name: &str| {
        spans
            .tags(name)
            .filter(|t| t.closing && spans.is_safe(t.span.start))
            .last()
            .map(|t| t.span.start)
    };
    last_closing("body")
        .or_else(|| last_closing("html"))
        .or_else(|| {
            let end = spans.html().len();
            spans.is_safe(end).then_some(end)
        })
}

/// Splices hydration markup into rendered documents.
#[derive(Debug, Clone)]
pub struct Injector {
    strategy: InjectionStrategy,
    mount_id: String,
    fallback_when_unsafe: bool,
    exclude: GlobSet,
}

impl Default for Injector {
    fn default() -> Self {
        Self::new(InjectionStrategy::default())
    }
}

impl Injector {
    /// Default mount element id.
    pub const DEFAULT_MOUNT_ID: &'static str = "app";

    /// Creates an injector with fallback enabled and no exclusions.
    pub fn new(strategy: InjectionStrategy) -> Self {
        Self {
            strategy,
            mount_id: Self::DEFAULT_MOUNT_ID.to_string(),
            fallback_when_unsafe: true,
            exclude: GlobSet::empty(),
        }
    }

    /// Sets the mount element id used by [`InjectionStrategy::Mount`].
    pub fn with_mount_id(mut self, id: impl Into<String>) -> Self {
        self.mount_id = id.into();
        self
    }

    /// Enables or disables falling back to late injection.
    pub fn with_fallback_when_unsafe(mut self, fallback: bool) -> Self {
        self.fallback_when_unsafe = fallback;
        self
    }

    /// Sets glob patterns of document names that always inject late.
    ///
    /// # Errors
    ///
    /// [`SkeinError::Config`] for an invalid pattern.
    pub fn with_exclude<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern.as_ref()).map_err(|e| {
                SkeinError::Config(format!(
                    "invalid exclude pattern '{}': {}",
                    pattern.as_ref(),
                    e
                ))
            })?;
            builder.add(glob);
        }
        self.exclude = builder
            .build()
            .map_err(|e| SkeinError::Config(format!("invalid exclude patterns: {}", e)))?;
        Ok(self)
    }

    /// The configured strategy.
    pub fn strategy(&self) -> InjectionStrategy {
        self.strategy
    }

    /// The configured mount id.
    pub fn mount_id(&self) -> &str {
        &self.mount_id
    }

    /// Whether `document` matches an exclusion pattern.
    pub fn is_excluded(&self, document: &str) -> bool {
        self.exclude.is_match(document)
    }

    /// Inserts `markup` into `html`.
    ///
    /// `document` is the root document name, checked against the exclusion
    /// list.
    pub fn inject(&self, html: &str, markup: &str, document: Option<&str>) -> InjectionOutcome {
        let spans = HtmlSpans::scan(html);
        let excluded = document.map_or(false, |d| self.is_excluded(d));

        let preferred = if excluded {
            debug!(document, "document excluded from early injection");
            None
        } else {
            match self.strategy {
                InjectionStrategy::Early => earliest_injection_point(&spans)
                    .map(|offset| (offset, Placement::Early)),
                InjectionStrategy::Mount => find_mount_point(&spans, &self.mount_id)
                    .filter(|mount| mount.safe)
                    .map(|mount| (mount.offset, Placement::Mount)),
                InjectionStrategy::Late => {
                    late_injection_point(&spans).map(|offset| (offset, Placement::Late))
                }
            }
        };

        let chosen = preferred.or_else(|| {
            let fallback = excluded
                || self.fallback_when_unsafe
                || self.strategy == InjectionStrategy::Late;
            if !fallback {
                return None;
            }
            if !excluded && self.strategy != InjectionStrategy::Late {
                warn!(strategy = %self.strategy, "no safe position for hydration, injecting late");
            }
            late_injection_point(&spans).map(|offset| (offset, Placement::Late))
        });

        match chosen {
            Some((offset, placement)) => InjectionOutcome {
                html: splice(html, offset, markup),
                position: Some(InjectionPosition { offset, placement }),
            },
            None => {
                warn!(strategy = %self.strategy, "no safe position for hydration, dropping it");
                InjectionOutcome {
                    html: html.to_string(),
                    position: None,
                }
            }
        }
    }
}
