// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree (AST) types for single-file component documents.
//!
//! The AST is produced by the markup grammar ([`crate::markup`]) and the
//! document grammar ([`crate::document`]) and consumed by the renderer.
//!
//! # Structure
//!
//! A component [`Document`] is made of sections:
//! - a required data section (`<data>` or `<schema>`)
//! - a required `<template>` section, parsed into [`Node`]s
//! - an optional `<logic>` section, kept as raw text
//!
//! # Node Types
//!
//! The [`Node`] enum covers every markup construct:
//! - literal text
//! - escaped `{{name}}` and raw `{{{name}}}` variables
//! - partial references `{{> name}}`
//! - control flow blocks (`{{#if}}`, `{{#unless}}`, `{{#each}}`)

use crate::hydration::registry::MergeStrategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Source location information for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// 1-indexed line number.
    pub line: usize,
    /// 1-indexed column number, counted in characters.
    pub column: usize,
    /// Byte offset of the start.
    pub offset: usize,
    /// Byte offset of the end (exclusive).
    pub end_offset: usize,
}

impl Location {
    /// Creates a new source location.
    pub fn new(line: usize, column: usize, offset: usize, end_offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
            end_offset,
        }
    }

    /// The very start of a source.
    pub fn start() -> Self {
        Self::new(1, 1, 0, 0)
    }

    /// Returns a copy of this location ending at `end_offset`.
    pub fn until(self, end_offset: usize) -> Self {
        Self { end_offset, ..self }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::start()
    }
}

/// The kind of a control flow block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    /// `{{#if}}`
    If,
    /// `{{#unless}}`
    Unless,
    /// `{{#each}}`
    Each,
}

impl BlockKind {
    /// Parses a block keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "if" => Some(Self::If),
            "unless" => Some(Self::Unless),
            "each" => Some(Self::Each),
            _ => None,
        }
    }

    /// The keyword as written in markup.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Unless => "unless",
            Self::Each => "each",
        }
    }
}

/// AST node types representing markup structure.
///
/// Children are exclusively owned by their parent; the tree never shares
/// sub-trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Literal text, emitted verbatim.
    Text {
        /// The text content, preserving whitespace.
        content: String,
        /// Source location.
        location: Location,
    },
    /// A variable lookup, `{{name}}` or `{{{name}}}`.
    Variable {
        /// The (trimmed) lookup path.
        name: String,
        /// If true the value is emitted without HTML escaping.
        raw: bool,
        /// Source location.
        location: Location,
    },
    /// A partial reference `{{> name}}`.
    Partial {
        /// The partial name.
        name: String,
        /// Source location.
        location: Location,
    },
    /// `{{#if cond}}...{{else}}...{{/if}}`.
    If {
        /// The lookup path evaluated for truthiness.
        condition: String,
        /// Nodes rendered when the condition is truthy.
        then_branch: Vec<Node>,
        /// Nodes rendered when the condition is falsy.
        else_branch: Vec<Node>,
        /// Source location of the opener.
        location: Location,
    },
    /// `{{#unless cond}}...{{/unless}}`.
    Unless {
        /// The lookup path evaluated for truthiness.
        condition: String,
        /// Nodes rendered when the condition is falsy.
        body: Vec<Node>,
        /// Source location of the opener.
        location: Location,
    },
    /// `{{#each collection}}...{{/each}}`.
    Each {
        /// The lookup path of the collection.
        collection: String,
        /// Nodes rendered once per element.
        body: Vec<Node>,
        /// Source location of the opener.
        location: Location,
    },
}

impl Node {
    /// Source location of this node.
    pub fn location(&self) -> &Location {
        match self {
            Node::Text { location, .. }
            | Node::Variable { location, .. }
            | Node::Partial { location, .. }
            | Node::If { location, .. }
            | Node::Unless { location, .. }
            | Node::Each { location, .. } => location,
        }
    }

    /// Whether this node is a control flow block.
    pub fn is_block(&self) -> bool {
        matches!(self, Node::If { .. } | Node::Unless { .. } | Node::Each { .. })
    }

    /// The block kind, for block nodes.
    pub fn block_kind(&self) -> Option<BlockKind> {
        match self {
            Node::If { .. } => Some(BlockKind::If),
            Node::Unless { .. } => Some(BlockKind::Unless),
            Node::Each { .. } => Some(BlockKind::Each),
            _ => None,
        }
    }

    /// Direct children of this node, in document order.
    pub fn children(&self) -> impl Iterator<Item = &Node> {
        let (first, second): (&[Node], &[Node]) = match self {
            Node::If {
                then_branch,
                else_branch,
                ..
            } => (then_branch.as_slice(), else_branch.as_slice()),
            Node::Unless { body, .. } | Node::Each { body, .. } => (body.as_slice(), &[]),
            _ => (&[], &[]),
        };
        first.iter().chain(second.iter())
    }
}

/// A parsed markup fragment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Template {
    /// Top-level nodes.
    pub nodes: Vec<Node>,
}

impl Template {
    /// Creates a template from its top-level nodes.
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Variable names referenced anywhere in the tree, deduplicated, in
    /// encounter order.
    pub fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        walk(&self.nodes, &mut |node| {
            if let Node::Variable { name, .. } = node {
                push_unique(&mut names, name.as_str());
            }
        });
        names
    }

    /// Partial names referenced anywhere in the tree, deduplicated, in
    /// encounter order.
    pub fn partials(&self) -> Vec<&str> {
        let mut names = Vec::new();
        walk(&self.nodes, &mut |node| {
            if let Node::Partial { name, .. } = node {
                push_unique(&mut names, name.as_str());
            }
        });
        names
    }

    /// Every block node in document order, nested blocks included.
    pub fn blocks(&self) -> Vec<&Node> {
        let mut blocks = Vec::new();
        walk(&self.nodes, &mut |node| {
            if node.is_block() {
                blocks.push(node);
            }
        });
        blocks
    }
}

fn push_unique<'a>(names: &mut Vec<&'a str>, name: &'a str) {
    if !names.contains(&name) {
        names.push(name);
    }
}

/// Pre-order walk over a node list.
fn walk<'a>(nodes: &'a [Node], visit: &mut dyn FnMut(&'a Node)) {
    for node in nodes {
        visit(node);
        for child in node.children() {
            walk(std::slice::from_ref(child), visit);
        }
    }
}

/// The recognised section tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SectionKind {
    /// `<data>`: JSON-shaped data, may contain markup expressions.
    Data,
    /// `<schema>`: a data contract standing in for `<data>`.
    Schema,
    /// `<template>`: the markup section.
    Template,
    /// `<logic>`: free text, never evaluated.
    Logic,
}

impl SectionKind {
    /// Parses a section tag name.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "data" => Some(Self::Data),
            "schema" => Some(Self::Schema),
            "template" => Some(Self::Template),
            "logic" => Some(Self::Logic),
            _ => None,
        }
    }

    /// The tag name as written.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Schema => "schema",
            Self::Template => "template",
            Self::Logic => "logic",
        }
    }
}

/// One section of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Which section this is.
    pub kind: SectionKind,
    /// Attributes from the opening tag.
    pub attributes: BTreeMap<String, String>,
    /// The raw text between the opening and closing tags.
    pub raw: String,
    /// Parsed content. For `<template>` this is the markup AST; other
    /// sections hold their raw text as a single text node.
    pub content: Vec<Node>,
    /// Location of the opening tag.
    pub location: Location,
}

impl Section {
    /// Looks up an attribute of the opening tag.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Complete representation of a parsed single-file component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The `<data>` or `<schema>` section.
    pub data: Section,
    /// The `<template>` section.
    pub template: Section,
    /// The optional `<logic>` section.
    pub logic: Option<Section>,
}

impl Document {
    /// Looks up an attribute on the data section, then the template section.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.data
            .attribute(name)
            .or_else(|| self.template.attribute(name))
    }

    /// The window attribute under which this document's data is hydrated.
    pub fn window(&self) -> Option<&str> {
        self.attribute("window").filter(|w| !w.is_empty())
    }

    /// The layout this document is rendered inside of.
    pub fn layout(&self) -> Option<&str> {
        self.attribute("layout").filter(|l| !l.is_empty())
    }

    /// The raw `merge` attribute of the data section.
    pub fn merge_attribute(&self) -> Option<&str> {
        self.data.attribute("merge")
    }

    /// The merge strategy declared with `merge="deep"` or `merge="shallow"`.
    ///
    /// `None` when the attribute is absent or not a known strategy.
    pub fn merge_strategy(&self) -> Option<MergeStrategy> {
        self.merge_attribute().and_then(MergeStrategy::parse)
    }

    /// Whether the data section is a `<schema>` contract.
    pub fn is_schema(&self) -> bool {
        self.data.kind == SectionKind::Schema
    }

    /// The template section's markup nodes.
    pub fn template_nodes(&self) -> &[Node] {
        &self.template.content
    }
}
