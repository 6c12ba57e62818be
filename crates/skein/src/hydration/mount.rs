// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Mount-point detection.

use super::safety::{HtmlSpans, SpanKind};
use regex::Regex;
use serde::Serialize;

/// Where the element carrying the mount id starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountPoint {
    /// The mount id searched for.
    pub id: String,
    /// Byte offset of the element's opening `<`, or of the id text itself
    /// when it was only found inside a script, style or comment.
    pub offset: usize,
    /// Whether `offset` is a lexically safe insertion point.
    pub safe: bool,
}

/// Finds the element whose `id` attribute equals `id`.
///
/// The first occurrence in a real tag wins. Occurrences inside a script,
/// style or comment are reported as unsafe, and only when no real tag
/// carries the id.
pub fn find_mount_point(spans: &HtmlSpans<'_>, id: &str) -> Option<MountPoint> {
    if id.is_empty() {
        return None;
    }
    let pattern = format!(
        r#"(?i:\sid)\s*=\s*(?:"{id}"|'{id}'|{id}(?:[\s/>]|$))"#,
        id = regex::escape(id)
    );
    // the id is escaped, so the pattern always compiles
    let re = Regex::new(&pattern).ok()?;

    let mut unsafe_hit: Option<MountPoint> = None;
    for hit in re.find_iter(spans.html()) {
        match spans.span_at(hit.start() + 1) {
            Some(span) if span.kind == SpanKind::TagAttribute => {
                return Some(MountPoint {
                    id: id.to_string(),
                    offset: span.start,
                    safe: spans.is_safe(span.start),
                });
            }
            Some(_) if unsafe_hit.is_none() => {
                unsafe_hit = Some(MountPoint {
                    id: id.to_string(),
                    offset: hit.start(),
                    safe: false,
                });
            }
            _ => {}
        }
    }
    unsafe_hit
}
