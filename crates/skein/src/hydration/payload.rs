// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The hydration artifact.
//!
//! For every claimed window attribute the artifact carries a
//! `<script type="application/json">` block with the data, followed by a
//! script assigning the parsed value to `window[<attribute>]`:
//!
//! ```html
//! <script type="application/json" id="skein-data-page" nonce="...">{"title":"Home"}</script>
//! <script nonce="...">window["page"]=JSON.parse(document.getElementById("skein-data-page").textContent);</script>
//! ```

use crate::error::Result;
use crate::renderer::html_escape;
use serde_json::Value;

/// Prefix of the id given to each JSON data block.
pub const DATA_ELEMENT_PREFIX: &str = "skein-data-";

/// Length of generated nonces.
pub const NONCE_LENGTH: usize = 22;

/// Generates a URL-safe random CSP nonce.
pub fn generate_nonce() -> String {
    nanoid::nanoid!(NONCE_LENGTH)
}

/// Escapes serialized JSON for embedding inside a `<script>` element.
///
/// `<`, `>` and `&` become `\u003c`, `\u003e` and `\u0026` so the text can
/// neither close the element nor open a comment; U+2028 and U+2029 are
/// escaped for older JavaScript parsers. The result is still valid JSON.
pub fn escape_json_for_script(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Client data collected for one response, in claim order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HydrationPayload {
    windows: Vec<(String, Value)>,
}

impl HydrationPayload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the value for a window attribute.
    pub fn insert(&mut self, window_attribute: impl Into<String>, value: Value) {
        let window_attribute = window_attribute.into();
        match self
            .windows
            .iter_mut()
            .find(|(name, _)| *name == window_attribute)
        {
            Some((_, slot)) => *slot = value,
            None => self.windows.push((window_attribute, value)),
        }
    }

    /// Window attributes with their values.
    pub fn windows(&self) -> &[(String, Value)] {
        &self.windows
    }

    /// Whether there is nothing to hydrate.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Number of window attributes.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Renders the artifact markup.
    ///
    /// # Errors
    ///
    /// [`crate::SkeinError::Json`] if a value fails to serialize.
    pub fn to_html(&self, nonce: Option<&str>) -> Result<String> {
        let nonce_attr = nonce
            .map(|n| format!(" nonce=\"{}\"", html_escape(n)))
            .unwrap_or_default();

        let mut html = String::new();
        for (name, value) in &self.windows {
            let element_id = format!("{}{}", DATA_ELEMENT_PREFIX, name);
            let data = escape_json_for_script(&serde_json::to_string(value)?);
            let name_literal = escape_json_for_script(&serde_json::to_string(name)?);
            let id_literal = escape_json_for_script(&serde_json::to_string(&element_id)?);

            html.push_str(&format!(
                "<script type=\"application/json\" id=\"{}\"{}>{}</script>",
                html_escape(&element_id),
                nonce_attr,
                data
            ));
            html.push_str(&format!(
                "<script{}>window[{}]=JSON.parse(document.getElementById({}).textContent);</script>",
                nonce_attr, name_literal, id_literal
            ));
        }
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydration::safety::{HtmlSpans, SpanKind};
    use serde_json::json;

    #[test]
    fn test_artifact_shape() {
        let mut payload = HydrationPayload::new();
        payload.insert("page", json!({ "title": "Home" }));
        let html = payload.to_html(Some("abc")).unwrap();

        assert_eq!(
            html,
            concat!(
                r#"<script type="application/json" id="skein-data-page" nonce="abc">{"title":"Home"}</script>"#,
                r#"<script nonce="abc">window["page"]=JSON.parse(document.getElementById("skein-data-page").textContent);</script>"#
            )
        );
    }

    #[test]
    fn test_hostile_values_cannot_escape_the_script() {
        let mut payload = HydrationPayload::new();
        payload.insert("x", json!({ "bio": "</script><script>alert(1)</script><!--" }));
        let html = payload.to_html(Some("\"><script>")).unwrap();

        assert!(!html.contains("</script><script>alert"));
        assert!(html.contains("nonce=\"&quot;&gt;&lt;script&gt;\""));

        let spans = HtmlSpans::scan(&html);
        assert_eq!(spans.of_kind(SpanKind::Script).count(), 2);
        assert_eq!(spans.of_kind(SpanKind::Comment).count(), 0);
    }

    #[test]
    fn test_escaped_json_still_decodes() {
        let value = json!({ "s": "<a & b>\u{2028}" });
        let escaped = escape_json_for_script(&serde_json::to_string(&value).unwrap());
        assert!(!escaped.contains('<'));
        assert!(!escaped.contains('\u{2028}'));
        let decoded: Value = serde_json::from_str(&escaped).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut payload = HydrationPayload::new();
        payload.insert("a", json!(1));
        payload.insert("b", json!(2));
        payload.insert("a", json!(3));
        assert_eq!(payload.windows(), &[("a".to_string(), json!(3)), ("b".to_string(), json!(2))]);
    }

    #[test]
    fn test_generate_nonce() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_eq!(a.len(), NONCE_LENGTH);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    }
}
