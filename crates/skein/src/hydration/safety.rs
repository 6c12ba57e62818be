// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Safe-injection validation.
//!
//! [`HtmlSpans::scan`] classifies an HTML string in one left-to-right pass
//! into spans that must never be split by an insertion:
//!
//! - whole `<script>..</script>` and `<style>..</style>` elements, with or
//!   without a self-closing slash on the opening tag
//! - whole `<title>` and `<textarea>` elements, whose content is text
//! - `<!-- .. -->` comments
//! - every other tag, from `<` to its closing `>`, quoted attribute values
//!   included
//!
//! Offsets are insertion points between bytes. An offset is safe when no
//! span strictly contains it, so a span's own start and end are safe. An
//! unterminated script, style or comment swallows the rest of the document,
//! end included.

use serde::{Deserialize, Serialize};

/// Classification of a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpanKind {
    /// Ordinary text content.
    Plain,
    /// A `<script>` element.
    Script,
    /// A `<style>` element.
    Style,
    /// A `<title>` or `<textarea>` element, whose content is text.
    TextElement,
    /// An HTML comment.
    Comment,
    /// A tag, including its attributes.
    TagAttribute,
}

/// A classified byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexicalSpan {
    /// Byte offset of the first byte.
    pub start: usize,
    /// Byte offset one past the last byte.
    pub end: usize,
    /// What the range contains.
    pub kind: SpanKind,
    /// False when the construct runs off the end of the document.
    pub closed: bool,
}

impl LexicalSpan {
    /// Whether inserting at `offset` would split this span.
    pub fn splits_at(&self, offset: usize) -> bool {
        self.start < offset && (offset < self.end || !self.closed)
    }
}

/// The unsafe spans of one HTML document.
#[derive(Debug, Clone)]
pub struct HtmlSpans<'a> {
    html: &'a str,
    spans: Vec<LexicalSpan>,
}

impl<'a> HtmlSpans<'a> {
    /// Scans `html` into its ordered, non-overlapping unsafe spans.
    pub fn scan(html: &'a str) -> Self {
        Self {
            html,
            spans: Scanner::new(html).run(),
        }
    }

    /// The scanned document.
    pub fn html(&self) -> &'a str {
        self.html
    }

    /// The unsafe spans, in document order.
    pub fn spans(&self) -> &[LexicalSpan] {
        &self.spans
    }

    /// Every byte of the document covered by a span, the gaps as
    /// [`SpanKind::Plain`].
    pub fn all_spans(&self) -> Vec<LexicalSpan> {
        let mut all = Vec::with_capacity(self.spans.len() * 2 + 1);
        let mut cursor = 0;
        for span in &self.spans {
            if span.start > cursor {
                all.push(plain(cursor, span.start));
            }
            all.push(*span);
            cursor = span.end;
        }
        if cursor < self.html.len() {
            all.push(plain(cursor, self.html.len()));
        }
        all
    }

    /// The unsafe span strictly containing `offset`, if any.
    pub fn span_at(&self, offset: usize) -> Option<&LexicalSpan> {
        let index = self.spans.partition_point(|s| s.start < offset);
        index
            .checked_sub(1)
            .map(|i| &self.spans[i])
            .filter(|span| span.splits_at(offset))
    }

    /// Classification of the insertion point `offset`.
    pub fn kind_at(&self, offset: usize) -> SpanKind {
        self.span_at(offset).map_or(SpanKind::Plain, |span| span.kind)
    }

    /// Whether inserting at `offset` leaves every span intact.
    ///
    /// Offsets past the end or inside a multi-byte character are unsafe.
    pub fn is_safe(&self, offset: usize) -> bool {
        self.html.is_char_boundary(offset) && self.span_at(offset).is_none()
    }

    /// The closest safe offset at or before `offset`.
    pub fn nearest_safe_before(&self, offset: usize) -> Option<usize> {
        let mut offset = offset.min(self.html.len());
        loop {
            if let Some(span) = self.span_at(offset) {
                offset = span.start;
            }
            if self.html.is_char_boundary(offset) {
                return Some(offset);
            }
            offset = offset.checked_sub(1)?;
        }
    }

    /// The closest safe offset at or after `offset`.
    pub fn nearest_safe_after(&self, offset: usize) -> Option<usize> {
        let mut offset = offset;
        loop {
            if offset > self.html.len() {
                return None;
            }
            if let Some(span) = self.span_at(offset) {
                if !span.closed {
                    return None;
                }
                offset = span.end;
            }
            if self.html.is_char_boundary(offset) {
                return Some(offset);
            }
            offset += 1;
        }
    }

    /// Spans that are tags named `name` (ASCII case-insensitive).
    pub fn tags<'s>(&'s self, name: &'s str) -> impl Iterator<Item = Tag<'a>> + 's {
        let html = self.html;
        self.spans
            .iter()
            .filter(|span| span.kind == SpanKind::TagAttribute)
            .filter_map(move |span| Tag::from_span(html, *span))
            .filter(move |tag| tag.name.eq_ignore_ascii_case(name))
    }

    /// Spans of the given kind.
    pub fn of_kind(&self, kind: SpanKind) -> impl Iterator<Item = &LexicalSpan> {
        self.spans.iter().filter(move |span| span.kind == kind)
    }
}

fn plain(start: usize, end: usize) -> LexicalSpan {
    LexicalSpan {
        start,
        end,
        kind: SpanKind::Plain,
        closed: true,
    }
}

/// A tag span with its name decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag<'a> {
    /// The tag name as written.
    pub name: &'a str,
    /// Whether this is an end tag (`</name>`).
    pub closing: bool,
    /// The underlying span.
    pub span: LexicalSpan,
}

impl<'a> Tag<'a> {
    fn from_span(html: &'a str, span: LexicalSpan) -> Option<Self> {
        let text = &html[span.start..span.end];
        let rest = text.strip_prefix('<')?;
        let (closing, rest) = match rest.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };
        let len = tag_name_len(rest.as_bytes());
        if len == 0 {
            return None;
        }
        Some(Self {
            name: &rest[..len],
            closing,
            span,
        })
    }
}

fn tag_name_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'-' || **b == b':')
        .count()
}

/// Byte-level single pass. All delimiters are ASCII, so byte offsets found
/// here always fall on character boundaries.
struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    spans: Vec<LexicalSpan>,
}

impl<'a> Scanner<'a> {
    fn new(html: &'a str) -> Self {
        Self {
            bytes: html.as_bytes(),
            pos: 0,
            spans: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<LexicalSpan> {
        while self.pos < self.bytes.len() {
            if self.bytes[self.pos] != b'<' {
                self.pos += 1;
                continue;
            }
            if self.starts_with(self.pos, b"<!--") {
                self.comment();
            } else if self.is_tag_start(self.pos) {
                self.tag();
            } else {
                self.pos += 1;
            }
        }
        self.spans
    }

    fn starts_with(&self, at: usize, prefix: &[u8]) -> bool {
        self.bytes.get(at..at + prefix.len()) == Some(prefix)
    }

    fn starts_with_ignore_case(&self, at: usize, prefix: &[u8]) -> bool {
        self.bytes
            .get(at..at + prefix.len())
            .map_or(false, |s| s.eq_ignore_ascii_case(prefix))
    }

    fn is_tag_start(&self, at: usize) -> bool {
        match self.bytes.get(at + 1) {
            Some(b) if b.is_ascii_alphabetic() || *b == b'!' || *b == b'?' => true,
            Some(b'/') => self
                .bytes
                .get(at + 2)
                .map_or(false, |b| b.is_ascii_alphabetic()),
            _ => false,
        }
    }

    fn find(&self, from: usize, needle: &[u8]) -> Option<usize> {
        self.bytes
            .get(from..)?
            .windows(needle.len())
            .position(|w| w == needle)
            .map(|i| from + i)
    }

    fn push(&mut self, start: usize, end: Option<usize>, kind: SpanKind) {
        let (end, closed) = match end {
            Some(end) => (end, true),
            None => (self.bytes.len(), false),
        };
        self.spans.push(LexicalSpan {
            start,
            end,
            kind,
            closed,
        });
        self.pos = end;
    }

    fn comment(&mut self) {
        let start = self.pos;
        let end = self.find(start + 4, b"-->").map(|i| i + 3);
        self.push(start, end, SpanKind::Comment);
    }

    /// Offset one past the `>` closing the tag opened at `start`, skipping
    /// quoted attribute values.
    ///
    /// A quote opens a value only as the first non-whitespace byte after
    /// `=`; elsewhere it is an ordinary byte of an unquoted value or name.
    fn tag_end(&self, start: usize) -> Option<usize> {
        let mut quote: Option<u8> = None;
        let mut after_equals = false;
        let mut i = start + 1;
        while i < self.bytes.len() {
            let b = self.bytes[i];
            match quote {
                Some(q) if b == q => quote = None,
                Some(_) => {}
                None if b == b'>' => return Some(i + 1),
                None if after_equals && (b == b'"' || b == b'\'') => {
                    quote = Some(b);
                    after_equals = false;
                }
                None if b == b'=' => after_equals = true,
                None if b.is_ascii_whitespace() => {}
                None => after_equals = false,
            }
            i += 1;
        }
        None
    }

    fn tag(&mut self) {
        let start = self.pos;
        let Some(end) = self.tag_end(start) else {
            self.push(start, None, SpanKind::TagAttribute);
            return;
        };

        let name_start = start + 1;
        let name_len = tag_name_len(&self.bytes[name_start..]);
        let name = &self.bytes[name_start..name_start + name_len];

        // The self-closing slash is ignored on these elements: their text
        // always runs to the matching end tag.
        let raw_text = if name.eq_ignore_ascii_case(b"script") {
            Some((SpanKind::Script, b"</script".as_slice()))
        } else if name.eq_ignore_ascii_case(b"style") {
            Some((SpanKind::Style, b"</style".as_slice()))
        } else if name.eq_ignore_ascii_case(b"title") {
            Some((SpanKind::TextElement, b"</title".as_slice()))
        } else if name.eq_ignore_ascii_case(b"textarea") {
            Some((SpanKind::TextElement, b"</textarea".as_slice()))
        } else {
            None
        };

        match raw_text {
            Some((kind, closer)) => {
                let element_end = self.raw_text_end(end, closer);
                self.push(start, element_end, kind);
            }
            None => self.push(start, Some(end), SpanKind::TagAttribute),
        }
    }

    /// End of a script, style, title or textarea element whose opening tag
    /// ends at `from`: one past the `>` of the first matching end tag.
    fn raw_text_end(&self, from: usize, closer: &[u8]) -> Option<usize> {
        let mut at = from;
        while at + closer.len() <= self.bytes.len() {
            if self.starts_with_ignore_case(at, closer) {
                let after = at + closer.len();
                match self.bytes.get(after) {
                    Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => {
                        return self.find(after, b">").map(|i| i + 1);
                    }
                    None => return None,
                    _ => {}
                }
            }
            at += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = concat!(
        "<html><head><title>T</title>",
        "<script>var a = '</div>'; if (a < b) {}</script>",
        "<style>p > a { color: red }</style>",
        "</head><body><!-- <div id=\"app\"> -->",
        "<div id=\"app\" title=\"a > b\">x</div></body></html>"
    );

    fn span_of(spans: &HtmlSpans<'_>, kind: SpanKind) -> LexicalSpan {
        *spans.of_kind(kind).next().unwrap()
    }

    #[test]
    fn test_script_style_comment_interiors_are_unsafe() {
        let spans = HtmlSpans::scan(PAGE);
        for kind in [SpanKind::Script, SpanKind::Style, SpanKind::Comment] {
            let span = span_of(&spans, kind);
            for offset in span.start + 1..span.end {
                assert!(!spans.is_safe(offset), "{kind:?} offset {offset}");
                assert_eq!(spans.kind_at(offset), kind);
            }
            assert!(spans.is_safe(span.start), "{kind:?} start");
            assert!(spans.is_safe(span.end), "{kind:?} end");
        }
    }

    #[test]
    fn test_script_span_covers_whole_element() {
        let spans = HtmlSpans::scan(PAGE);
        let script = span_of(&spans, SpanKind::Script);
        assert!(PAGE[script.start..script.end].starts_with("<script>"));
        assert!(PAGE[script.start..script.end].ends_with("</script>"));
    }

    #[test]
    fn test_quoted_gt_stays_inside_tag() {
        let spans = HtmlSpans::scan(PAGE);
        let inside = PAGE.find("a > b").unwrap() + 2;
        assert_eq!(spans.kind_at(inside), SpanKind::TagAttribute);
        assert!(!spans.is_safe(inside));
    }

    #[test]
    fn test_tags_inside_comments_and_scripts_are_not_tags() {
        let spans = HtmlSpans::scan(PAGE);
        let divs: Vec<_> = spans.tags("div").filter(|t| !t.closing).collect();
        assert_eq!(divs.len(), 1);
        assert!(PAGE[divs[0].span.start..].starts_with("<div id=\"app\" title"));
    }

    #[test]
    fn test_nearest_safe_never_splits() {
        let spans = HtmlSpans::scan(PAGE);
        for offset in 0..=PAGE.len() {
            if let Some(before) = spans.nearest_safe_before(offset) {
                assert!(before <= offset);
                assert!(spans.is_safe(before));
            }
            if let Some(after) = spans.nearest_safe_after(offset) {
                assert!(after >= offset);
                assert!(spans.is_safe(after));
            }
        }
        let script = span_of(&spans, SpanKind::Script);
        assert_eq!(spans.nearest_safe_before(script.start + 3), Some(script.start));
        assert_eq!(spans.nearest_safe_after(script.start + 3), Some(script.end));
    }

    #[test]
    fn test_unterminated_comment_swallows_the_end() {
        let html = "<p>ok</p><!-- never closed";
        let spans = HtmlSpans::scan(html);
        assert!(!spans.is_safe(html.len()));
        assert_eq!(spans.nearest_safe_after(12), None);
        assert_eq!(spans.nearest_safe_before(html.len()), Some(9));
    }

    #[test]
    fn test_case_insensitive_script_end() {
        let html = "<SCRIPT type=\"x\">a</Script >b";
        let spans = HtmlSpans::scan(html);
        let script = span_of(&spans, SpanKind::Script);
        assert_eq!(&html[script.end..], "b");
    }

    #[test]
    fn test_multibyte_offsets() {
        let html = "<p>héllo</p>";
        let spans = HtmlSpans::scan(html);
        let e = html.find('é').unwrap();
        assert!(!spans.is_safe(e + 1));
        assert_eq!(spans.nearest_safe_before(e + 1), Some(e));
        assert_eq!(spans.nearest_safe_after(e + 1), Some(e + 2));
        assert!(!spans.is_safe(html.len() + 1));
    }

    #[test]
    fn test_all_spans_cover_document() {
        let spans = HtmlSpans::scan(PAGE);
        let all = spans.all_spans();
        assert_eq!(all.first().unwrap().start, 0);
        assert_eq!(all.last().unwrap().end, PAGE.len());
        for pair in all.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_lone_less_than_is_text() {
        let html = "a < b <3 </ c";
        let spans = HtmlSpans::scan(html);
        assert!(spans.spans().is_empty());
        assert!((0..=html.len()).all(|o| spans.is_safe(o)));
    }

    #[test]
    fn test_quote_outside_value_does_not_open_string() {
        let html = "<html><head><meta name=author content=it's><script>var s='</head>';</script></head><body></body></html>";
        let spans = HtmlSpans::scan(html);
        let meta = spans.tags("meta").next().unwrap();
        assert_eq!(&html[meta.span.start..meta.span.end], "<meta name=author content=it's>");

        let script = span_of(&spans, SpanKind::Script);
        assert!(html[script.start..script.end].ends_with("</script>"));
        let head_close = spans.tags("head").find(|t| t.closing).unwrap();
        assert_eq!(head_close.span.start, script.end);
    }

    #[test]
    fn test_quoted_value_after_equals_with_spaces() {
        let html = "<a title = 'x > y' href=\"/\">ok</a>";
        let spans = HtmlSpans::scan(html);
        let a = spans.tags("a").next().unwrap();
        assert_eq!(&html[a.span.end..], "ok</a>");
    }

    #[test]
    fn test_self_closed_script_runs_to_end_tag() {
        let html = r#"<head><script src="a.js"/><link rel="x"></script></head>"#;
        let spans = HtmlSpans::scan(html);
        let script = span_of(&spans, SpanKind::Script);
        assert_eq!(&html[script.start..script.end], r#"<script src="a.js"/><link rel="x"></script>"#);
        assert_eq!(spans.tags("link").count(), 0);

        let style = "<style/>p > a {}</style><p>";
        let spans = HtmlSpans::scan(style);
        assert_eq!(span_of(&spans, SpanKind::Style).end, style.find("<p>").unwrap());
    }

    #[test]
    fn test_title_and_textarea_content_is_text() {
        let html = "<title>a <b> c</title><textarea><div id=\"app\"></textarea><p>";
        let spans = HtmlSpans::scan(html);
        let texts: Vec<_> = spans.of_kind(SpanKind::TextElement).collect();
        assert_eq!(texts.len(), 2);
        assert_eq!(&html[texts[0].start..texts[0].end], "<title>a <b> c</title>");
        assert!(html[texts[1].start..texts[1].end].ends_with("</textarea>"));
        assert_eq!(spans.tags("b").count(), 0);
        assert_eq!(spans.tags("div").count(), 0);
        assert_eq!(spans.tags("p").count(), 1);
        assert!(!spans.is_safe(html.find(" c").unwrap()));
    }

}
