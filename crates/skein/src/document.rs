// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Document grammar.
//!
//! Parses the outer section structure of a single-file component:
//!
//! ```text
//! <data window="page" layout="main">{ "title": "{{title}}" }</data>
//! <template><h1>{{title}}</h1></template>
//! <logic>free text, never evaluated</logic>
//! ```
//!
//! Sections may appear in any order. The top-level scan is delegated to a
//! [`SectionTokenizer`]; [`TagScanner`] is the default backend. The
//! `<template>` section is handed to the markup grammar, every other
//! section keeps its raw text.

use crate::ast::{Document, Location, Node, Section, SectionKind};
use crate::error::{ParseError, ParseErrorKind};
use crate::markup;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

type ParseResult<T> = std::result::Result<T, ParseError>;

lazy_static! {
    static ref ATTRIBUTE: Regex =
        Regex::new(r#"([A-Za-z_][A-Za-z0-9_:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("attribute pattern is valid");
    static ref SECTION_START: Regex = Regex::new(r"^\s*<(?:data|schema|template|logic)[\s>]")
        .expect("section start pattern is valid");
}

/// A section as produced by a [`SectionTokenizer`], before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSection {
    /// The tag name as written.
    pub tag: String,
    /// Attributes of the opening tag.
    pub attributes: BTreeMap<String, String>,
    /// Text between the opening and closing tags.
    pub content: String,
    /// Location of the whole section, opening tag to closing tag.
    pub location: Location,
    /// Location where `content` starts.
    pub content_location: Location,
}

/// Top-level section scanner.
///
/// Implement this trait to plug in an alternative tokenizer backend.
pub trait SectionTokenizer {
    /// Splits `source` into its top-level sections.
    fn tokenize(&self, source: &str) -> ParseResult<Vec<RawSection>>;
}

/// Default hand-rolled section scanner.
///
/// Tag names are alphabetic, attribute values are single- or double-quoted
/// strings without escape processing, and a section runs until the first
/// literal matching closing tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagScanner;

impl SectionTokenizer for TagScanner {
    fn tokenize(&self, source: &str) -> ParseResult<Vec<RawSection>> {
        let mut sections = Vec::new();
        let mut pos = 0;

        loop {
            let rest = &source[pos..];
            pos += rest.len() - rest.trim_start().len();
            if pos >= source.len() {
                break;
            }

            let rest = &source[pos..];
            if rest.starts_with("<!--") {
                let Some(end) = rest.find("-->") else {
                    return Err(malformed("unterminated comment", locate(source, pos)));
                };
                pos += end + 3;
                continue;
            }
            if !rest.starts_with('<') {
                return Err(ParseError::new(
                    ParseErrorKind::StrayContent,
                    locate(source, pos),
                ));
            }

            let section = scan_section(source, pos)?;
            pos = section.location.end_offset;
            sections.push(section);
        }

        Ok(sections)
    }
}

/// Scans one `<tag ...>...</tag>` section starting at `start`.
fn scan_section(source: &str, start: usize) -> ParseResult<RawSection> {
    let location = locate(source, start);
    let Some(tag_end) = find_tag_end(&source[start..]) else {
        return Err(malformed("unterminated opening tag", location));
    };
    let inside = &source[start + 1..start + tag_end];

    let name_len = inside
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(inside.len());
    let (tag, attribute_text) = inside.split_at(name_len);
    if tag.is_empty() || !attribute_text.chars().next().map_or(true, char::is_whitespace) {
        return Err(malformed("section tag names must be alphabetic", location));
    }
    let attributes = parse_attributes(tag, attribute_text, location)?;

    let content_start = start + tag_end + 1;
    let closing = format!("</{}>", tag);
    let Some(content_len) = source[content_start..].find(&closing) else {
        return Err(ParseError::new(
            ParseErrorKind::UnclosedSection {
                tag: tag.to_string(),
            },
            location,
        ));
    };
    let content_end = content_start + content_len;

    Ok(RawSection {
        tag: tag.to_string(),
        attributes,
        content: source[content_start..content_end].to_string(),
        location: location.until(content_end + closing.len()),
        content_location: locate(source, content_start).until(content_end),
    })
}

/// Byte index of the `>` closing an opening tag, skipping quoted values.
/// A quote opens a value only as the first non-blank character after `=`.
fn find_tag_end(tag: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut after_equals = false;
    for (i, c) in tag.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '>') => return Some(i),
            (None, '"' | '\'') if after_equals => {
                quote = Some(c);
                after_equals = false;
            }
            (None, '=') => after_equals = true,
            (None, c) if c.is_whitespace() => {}
            (None, _) => after_equals = false,
        }
    }
    None
}

fn parse_attributes(
    tag: &str,
    text: &str,
    location: Location,
) -> ParseResult<BTreeMap<String, String>> {
    let mut attributes = BTreeMap::new();
    let mut last = 0;

    for caps in ATTRIBUTE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let gap = &text[last..whole.start()];
        if !gap.trim().is_empty() {
            return Err(malformed(
                &format!("unexpected '{}' in <{}> attributes", gap.trim(), tag),
                location,
            ));
        }
        last = whole.end();

        let name = caps[1].to_string();
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map_or("", |m| m.as_str())
            .to_string();
        if attributes.insert(name.clone(), value).is_some() {
            return Err(malformed(
                &format!("duplicate attribute '{}' on <{}>", name, tag),
                location,
            ));
        }
    }

    let tail = text[last..].trim();
    if !tail.is_empty() {
        return Err(malformed(
            &format!("unexpected '{}' in <{}> attributes", tail, tag),
            location,
        ));
    }

    Ok(attributes)
}

fn malformed(message: &str, location: Location) -> ParseError {
    ParseError::new(
        ParseErrorKind::MalformedTag {
            message: message.to_string(),
        },
        location,
    )
}

/// Computes the line/column location of a byte offset.
pub(crate) fn locate(source: &str, offset: usize) -> Location {
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count() + 1;
    Location::new(line, column, offset, offset)
}

/// Whether `text` starts with a recognised section opening tag.
///
/// Used to tell section-structured sources from bare markup fragments.
pub fn is_section_source(text: &str) -> bool {
    SECTION_START.is_match(text)
}

/// Parses a document with the default [`TagScanner`].
///
/// # Errors
///
/// Returns a located [`ParseError`] for an empty source, malformed section
/// tags, markup errors inside `<template>`, and missing, duplicate or
/// unknown sections.
pub fn parse(text: &str) -> ParseResult<Document> {
    parse_with(&TagScanner, text)
}

/// Parses a document with the given tokenizer backend.
pub fn parse_with(tokenizer: &dyn SectionTokenizer, text: &str) -> ParseResult<Document> {
    if text.trim().is_empty() {
        return Err(ParseError::new(
            ParseErrorKind::EmptyDocument,
            Location::start(),
        ));
    }

    let raw_sections = tokenizer
        .tokenize(text)
        .map_err(|e| e.with_source(text))?;
    build_document(raw_sections, text).map_err(|e| e.with_source(text))
}

fn build_document(raw_sections: Vec<RawSection>, text: &str) -> ParseResult<Document> {
    validate_sections(&raw_sections, text)?;

    let mut data = None;
    let mut template = None;
    let mut logic = None;

    for raw in raw_sections {
        // validated above: every tag is recognised
        let Some(kind) = SectionKind::from_tag(&raw.tag) else {
            continue;
        };
        let content = match kind {
            SectionKind::Template => markup::parse_at(&raw.content, raw.content_location)?.nodes,
            _ => vec![Node::Text {
                content: raw.content.clone(),
                location: raw.content_location,
            }],
        };
        let section = Section {
            kind,
            attributes: raw.attributes,
            raw: raw.content,
            content,
            location: raw.location,
        };
        match kind {
            SectionKind::Data | SectionKind::Schema => data = Some(section),
            SectionKind::Template => template = Some(section),
            SectionKind::Logic => logic = Some(section),
        }
    }

    match (data, template) {
        (Some(data), Some(template)) => Ok(Document {
            data,
            template,
            logic,
        }),
        _ => Err(ParseError::new(
            ParseErrorKind::MissingSections {
                tags: vec!["data".to_string(), "template".to_string()],
            },
            Location::start(),
        )),
    }
}

/// Checks for unknown, duplicate and missing sections, in that order.
fn validate_sections(sections: &[RawSection], text: &str) -> ParseResult<()> {
    let unknown: Vec<&RawSection> = sections
        .iter()
        .filter(|s| SectionKind::from_tag(&s.tag).is_none())
        .collect();
    if let Some(first) = unknown.first() {
        let mut tags: Vec<String> = Vec::new();
        for section in &unknown {
            if !tags.contains(&section.tag) {
                tags.push(section.tag.clone());
            }
        }
        return Err(ParseError::new(
            ParseErrorKind::UnknownSections { tags },
            first.location,
        ));
    }

    let mut seen: Vec<SectionKind> = Vec::new();
    let mut duplicates: Vec<String> = Vec::new();
    let mut first_duplicate: Option<Location> = None;
    for section in sections {
        let Some(kind) = SectionKind::from_tag(&section.tag) else {
            continue;
        };
        let slot_taken = seen.iter().any(|s| same_slot(*s, kind));
        if slot_taken {
            let tag = if seen.contains(&kind) {
                kind.tag().to_string()
            } else {
                "data/schema".to_string()
            };
            if !duplicates.contains(&tag) {
                duplicates.push(tag);
            }
            first_duplicate.get_or_insert(section.location);
        }
        seen.push(kind);
    }
    if let Some(location) = first_duplicate {
        return Err(ParseError::new(
            ParseErrorKind::DuplicateSections { tags: duplicates },
            location,
        ));
    }

    let mut missing = Vec::new();
    if !seen.iter().any(|k| matches!(k, SectionKind::Data | SectionKind::Schema)) {
        missing.push("data".to_string());
    }
    if !seen.contains(&SectionKind::Template) {
        missing.push("template".to_string());
    }
    if !missing.is_empty() {
        return Err(ParseError::new(
            ParseErrorKind::MissingSections { tags: missing },
            locate(text, text.len()),
        ));
    }

    Ok(())
}

fn same_slot(a: SectionKind, b: SectionKind) -> bool {
    let slot = |k: SectionKind| match k {
        SectionKind::Schema => SectionKind::Data,
        other => other,
    };
    slot(a) == slot(b)
}
