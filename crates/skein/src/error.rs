// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Error types for the skein template compiler.
//!
//! This module defines [`SkeinError`], the main error enum, and
//! [`ParseError`], the located error produced by both grammars.
//!
//! # Error Categories
//!
//! - **Parse errors**: malformed markup or section structure, always located
//! - **Render errors**: failures while evaluating an AST
//! - **Composition errors**: missing templates and dependency cycles
//! - **Hydration errors**: window attribute collisions and invalid claims
//!
//! # Source Context
//!
//! Parse errors may carry a [`SourceContext`] for rich error messages
//! showing the problematic lines with a caret under the error column.

use crate::ast::Location;
use crate::hydration::registry::SourceLocation;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lines of source around an error, with a caret under the column.
///
/// ```text
///    4 | <template>
///    5 |   {{#each items}
///      |   ^
///    6 | </template>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContext {
    /// Number of the first line in `lines` (1-indexed).
    pub first_line: usize,
    /// Up to two lines either side of the error line.
    pub lines: Vec<String>,
    /// Error line (1-indexed).
    pub line: usize,
    /// Error column (1-indexed).
    pub column: usize,
}

impl SourceContext {
    /// Cuts the snippet around `line` and `column` out of `source`.
    pub fn from_source(source: &str, line: usize, column: usize) -> Self {
        let first_line = line.saturating_sub(2).max(1);
        let lines = source
            .lines()
            .skip(first_line - 1)
            .take(line + 3 - first_line)
            .map(str::to_string)
            .collect();
        Self {
            first_line,
            lines,
            line,
            column,
        }
    }
}

impl fmt::Display for SourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (number, text) in (self.first_line..).zip(&self.lines) {
            writeln!(f, "{:4} | {}", number, text)?;
            if number == self.line {
                writeln!(f, "     | {:>width$}", "^", width = self.column.max(1))?;
            }
        }
        Ok(())
    }
}

/// What went wrong while parsing markup or section structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseErrorKind {
    /// The document source was empty.
    EmptyDocument,
    /// A `{{` or `{{{` tag was never closed.
    UnclosedExpression {
        /// The delimiter that was expected (`}}` or `}}}`).
        expected: String,
    },
    /// An expression tag had nothing inside it.
    EmptyExpression,
    /// A partial reference with an empty or malformed name.
    InvalidPartialName {
        /// The offending name as written.
        name: String,
    },
    /// `{{#keyword}}` with a keyword that is not `if`, `unless` or `each`.
    UnknownBlock {
        /// The unrecognised keyword.
        keyword: String,
    },
    /// A block opener without its argument, e.g. `{{#if}}`.
    MissingBlockArgument {
        /// The block kind.
        block: String,
    },
    /// A block opener that reached end of input without its closer.
    UnclosedBlock {
        /// The block kind.
        block: String,
        /// Where the block was opened.
        opened_at: Location,
    },
    /// A closer that does not match any open block.
    UnexpectedCloser {
        /// The block kind named by the closer.
        block: String,
    },
    /// `{{else}}` outside of an `if` block, or a second `{{else}}`.
    UnexpectedElse,
    /// A malformed section opening tag.
    MalformedTag {
        /// Description of the problem.
        message: String,
    },
    /// A section whose closing tag was never found.
    UnclosedSection {
        /// The section tag name.
        tag: String,
    },
    /// Non-whitespace text between sections.
    StrayContent,
    /// Required sections are missing.
    MissingSections {
        /// The missing section names.
        tags: Vec<String>,
    },
    /// Sections that appear more than once.
    DuplicateSections {
        /// The duplicated section names.
        tags: Vec<String>,
    },
    /// Sections with unrecognised tag names.
    UnknownSections {
        /// The unrecognised tag names.
        tags: Vec<String>,
    },
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyDocument => write!(f, "document is empty"),
            Self::UnclosedExpression { expected } => {
                write!(f, "unclosed expression, expected '{}'", expected)
            }
            Self::EmptyExpression => write!(f, "empty expression"),
            Self::InvalidPartialName { name } => write!(f, "invalid partial name '{}'", name),
            Self::UnknownBlock { keyword } => write!(f, "unknown block '#{}'", keyword),
            Self::MissingBlockArgument { block } => {
                write!(f, "block '#{}' requires an argument", block)
            }
            Self::UnclosedBlock { block, opened_at } => write!(
                f,
                "unclosed '{{{{#{}}}}}' block opened at line {}, column {}",
                block, opened_at.line, opened_at.column
            ),
            Self::UnexpectedCloser { block } => {
                write!(f, "unexpected closing tag '{{{{/{}}}}}'", block)
            }
            Self::UnexpectedElse => write!(f, "unexpected '{{{{else}}}}'"),
            Self::MalformedTag { message } => write!(f, "malformed section tag: {}", message),
            Self::UnclosedSection { tag } => {
                write!(f, "unclosed section <{}>, expected '</{}>'", tag, tag)
            }
            Self::StrayContent => write!(f, "unexpected content outside of a section"),
            Self::MissingSections { tags } => {
                write!(f, "missing required section(s): {}", tags.join(", "))
            }
            Self::DuplicateSections { tags } => {
                write!(f, "duplicate section(s): {}", tags.join(", "))
            }
            Self::UnknownSections { tags } => {
                write!(f, "unknown section(s): {}", tags.join(", "))
            }
        }
    }
}

/// A located grammar error.
///
/// Produced by both the markup grammar and the document grammar. The
/// location is absolute within the source handed to the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// What went wrong.
    pub kind: ParseErrorKind,
    /// Where it went wrong.
    pub location: Location,
    /// Source snippet, attached once the full source is known.
    pub source_context: Option<SourceContext>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parse error: {} at line {}, column {} (offset {})",
            self.kind, self.location.line, self.location.column, self.location.offset
        )?;
        match &self.source_context {
            Some(context) => write!(f, "\n{}", context),
            None => Ok(()),
        }
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    /// Creates a parse error without source context.
    pub fn new(kind: ParseErrorKind, location: Location) -> Self {
        Self {
            kind,
            location,
            source_context: None,
        }
    }

    /// Attaches a snippet of `source` around the error location.
    pub fn with_source(mut self, source: &str) -> Self {
        self.source_context = Some(SourceContext::from_source(
            source,
            self.location.line,
            self.location.column,
        ));
        self
    }

    /// 1-indexed line of the error.
    pub fn line(&self) -> usize {
        self.location.line
    }

    /// 1-indexed column of the error.
    pub fn column(&self) -> usize {
        self.location.column
    }

    /// Byte offset of the error.
    pub fn offset(&self) -> usize {
        self.location.offset
    }
}

/// The main error type for skein operations.
#[derive(Error, Debug)]
pub enum SkeinError {
    /// Markup or document syntax is invalid.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Rendering failed.
    #[error("Render error: {message}")]
    Render {
        /// Human-readable description.
        message: String,
        /// The underlying failure, if any.
        source: Option<Box<SkeinError>>,
    },

    /// A `{{> partial}}` reference could not be resolved.
    #[error("Partial not found: '{name}' at line {}, column {}", .location.line, .location.column)]
    PartialNotFound {
        /// The partial name.
        name: String,
        /// Where the partial was referenced.
        location: Location,
    },

    /// The loader returned nothing (or failed) for a template name.
    #[error("Template not found: '{name}'{}", format_reason(.reason))]
    TemplateNotFound {
        /// The requested template name.
        name: String,
        /// Loader failure description, if the loader raised.
        reason: Option<String>,
    },

    /// A template depends on itself through its partials or layouts.
    #[error("Circular dependency: {}", .chain.join(" -> "))]
    CircularDependency {
        /// The in-progress resolution chain, closed by the repeated name.
        chain: Vec<String>,
    },

    /// Two sections claimed the same window attribute.
    #[error(
        "Hydration collision on window attribute '{window_attribute}': claimed at {first} and again at {second}. \
         Rename one of the window attributes, or add merge=\"deep\" (or merge=\"shallow\") \
         to the later section to merge the data explicitly"
    )]
    Collision {
        /// The contested window attribute.
        window_attribute: String,
        /// The first claim.
        first: SourceLocation,
        /// The rejected claim.
        second: SourceLocation,
    },

    /// Invalid input to a hydration or configuration API.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A data section did not decode as JSON.
    #[error("Invalid data section in '{document}': {source}")]
    DataSection {
        /// The document owning the data section.
        document: String,
        /// The decode failure.
        source: serde_json::Error,
    },

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// Cache operation failed.
    #[error("Cache error: {0}")]
    Cache(String),
}

fn format_reason(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(" ({})", reason),
        None => String::new(),
    }
}

impl SkeinError {
    /// Wraps any error raised while rendering into a [`SkeinError::Render`].
    ///
    /// Grammar errors keep their message; render errors and missing partials
    /// pass through unchanged.
    pub fn into_render(self) -> Self {
        match self {
            err @ (SkeinError::Render { .. } | SkeinError::PartialNotFound { .. }) => err,
            other => SkeinError::Render {
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }

    /// Creates a render error without an underlying cause.
    pub fn render(message: impl Into<String>) -> Self {
        SkeinError::Render {
            message: message.into(),
            source: None,
        }
    }
}

/// Convenience type alias for Results with [`SkeinError`].
pub type Result<T> = std::result::Result<T, SkeinError>;
