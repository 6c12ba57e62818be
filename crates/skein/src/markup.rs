// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Markup grammar.
//!
//! Turns markup text into a [`Template`] AST. The grammar is split into a
//! tag [`Lexer`], which knows the expression syntax, and a recursive-descent
//! parser, which matches block openers with their closers.
//!
//! # Syntax
//!
//! ```text
//! {{name}}                 escaped variable
//! {{{name}}}               raw variable
//! {{> partial}}            partial reference
//! {{#if c}}..{{else}}..{{/if}}
//! {{#unless c}}..{{/unless}}
//! {{#each items}}..{{/each}}
//! ```
//!
//! Anything else is literal text up to the next `{{`.
//!
//! Dependency discovery ([`extract_partial_names`]) runs the same lexer
//! without block matching, so composition and rendering always agree on
//! what a partial reference looks like.

use crate::ast::{BlockKind, Location, Node, Template};
use crate::error::{ParseError, ParseErrorKind};

type ParseResult<T> = std::result::Result<T, ParseError>;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const RAW_OPEN: &str = "{{{";
const RAW_CLOSE: &str = "}}}";
const PARTIAL_SIGIL: char = '>';
const BLOCK_SIGIL: char = '#';
const CLOSER_SIGIL: char = '/';
const ELSE_KEYWORD: &str = "else";

/// A lexical token of the markup grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Literal text.
    Text(String),
    /// `{{name}}` or `{{{name}}}`.
    Variable {
        /// Trimmed lookup path.
        name: String,
        /// Triple-brace form.
        raw: bool,
    },
    /// `{{> name}}`.
    Partial(String),
    /// `{{#kind argument}}`.
    Open {
        /// The block kind.
        block: BlockKind,
        /// The trimmed block argument.
        argument: String,
    },
    /// `{{else}}`.
    Else,
    /// `{{/kind}}`.
    Close(BlockKind),
}

/// A token with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// What was lexed.
    pub kind: TokenKind,
    /// Where it was lexed.
    pub location: Location,
}

/// Whether `name` is acceptable as a partial name.
///
/// Partial names are non-empty and contain no whitespace or braces.
pub fn is_partial_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || c == '{' || c == '}')
}

/// Tag lexer over an immutable input buffer.
///
/// Line and column are advanced per character; a newline increments the
/// line and resets the column.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    base_offset: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer whose locations start at `origin`.
    pub fn new(input: &'a str, origin: Location) -> Self {
        Self {
            input,
            pos: 0,
            line: origin.line,
            column: origin.column,
            base_offset: origin.offset,
        }
    }

    #[inline]
    fn here(&self) -> Location {
        let offset = self.base_offset + self.pos;
        Location::new(self.line, self.column, offset, offset)
    }

    #[inline]
    fn absolute(&self, pos: usize) -> usize {
        self.base_offset + pos
    }

    fn error_at(&self, kind: ParseErrorKind, location: Location) -> ParseError {
        ParseError::new(kind, location)
    }

    /// Moves the cursor to `target`, updating line and column.
    fn advance_to(&mut self, target: usize) {
        for ch in self.input[self.pos..target].chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.pos = target;
    }

    /// Returns the next token, or `None` at end of input.
    ///
    /// # Errors
    ///
    /// Unclosed tags, empty expressions, malformed partial names and unknown
    /// block keywords are reported at the tag's opening delimiter.
    pub fn next_token(&mut self) -> ParseResult<Option<Token>> {
        if self.pos >= self.input.len() {
            return Ok(None);
        }

        let rest = &self.input[self.pos..];
        let token = if rest.starts_with(RAW_OPEN) {
            self.lex_tag(RAW_OPEN, RAW_CLOSE)?
        } else if rest.starts_with(OPEN) {
            self.lex_tag(OPEN, CLOSE)?
        } else {
            self.lex_text()
        };
        Ok(Some(token))
    }

    fn lex_text(&mut self) -> Token {
        let start = self.here();
        let end = self.input[self.pos..]
            .find(OPEN)
            .map_or(self.input.len(), |i| self.pos + i);
        let content = self.input[self.pos..end].to_string();
        self.advance_to(end);
        Token {
            kind: TokenKind::Text(content),
            location: start.until(self.absolute(end)),
        }
    }

    fn lex_tag(&mut self, open: &str, close: &str) -> ParseResult<Token> {
        let start = self.here();
        let inner_start = self.pos + open.len();
        let Some(close_idx) = self.input[inner_start..].find(close) else {
            return Err(self.error_at(
                ParseErrorKind::UnclosedExpression {
                    expected: close.to_string(),
                },
                start,
            ));
        };
        let inner = &self.input[inner_start..inner_start + close_idx];
        let end = inner_start + close_idx + close.len();
        let location = start.until(self.absolute(end));

        let kind = if open == RAW_OPEN {
            let name = inner.trim();
            if name.is_empty() {
                return Err(self.error_at(ParseErrorKind::EmptyExpression, start));
            }
            TokenKind::Variable {
                name: name.to_string(),
                raw: true,
            }
        } else {
            self.classify(inner.trim(), start)?
        };

        self.advance_to(end);
        Ok(Token { kind, location })
    }

    fn classify(&self, inner: &str, start: Location) -> ParseResult<TokenKind> {
        if inner.is_empty() {
            return Err(self.error_at(ParseErrorKind::EmptyExpression, start));
        }

        if let Some(rest) = inner.strip_prefix(PARTIAL_SIGIL) {
            let name = rest.trim();
            if !is_partial_name(name) {
                return Err(self.error_at(
                    ParseErrorKind::InvalidPartialName {
                        name: name.to_string(),
                    },
                    start,
                ));
            }
            return Ok(TokenKind::Partial(name.to_string()));
        }

        if let Some(rest) = inner.strip_prefix(BLOCK_SIGIL) {
            let rest = rest.trim_start();
            let (keyword, argument) = rest
                .split_once(char::is_whitespace)
                .map_or((rest, ""), |(k, a)| (k, a.trim()));
            let Some(block) = BlockKind::from_keyword(keyword) else {
                return Err(self.error_at(
                    ParseErrorKind::UnknownBlock {
                        keyword: keyword.to_string(),
                    },
                    start,
                ));
            };
            if argument.is_empty() {
                return Err(self.error_at(
                    ParseErrorKind::MissingBlockArgument {
                        block: keyword.to_string(),
                    },
                    start,
                ));
            }
            return Ok(TokenKind::Open {
                block,
                argument: argument.to_string(),
            });
        }

        if inner == ELSE_KEYWORD {
            return Ok(TokenKind::Else);
        }

        if let Some(rest) = inner.strip_prefix(CLOSER_SIGIL) {
            let keyword = rest.trim();
            return match BlockKind::from_keyword(keyword) {
                Some(block) => Ok(TokenKind::Close(block)),
                None => Err(self.error_at(
                    ParseErrorKind::UnexpectedCloser {
                        block: keyword.to_string(),
                    },
                    start,
                )),
            };
        }

        Ok(TokenKind::Variable {
            name: inner.to_string(),
            raw: false,
        })
    }
}

/// Why a node sequence ended.
enum Stop {
    Eof,
    Else(Location),
    Close(BlockKind, Location),
}

struct Parser<'a> {
    lexer: Lexer<'a>,
}

impl Parser<'_> {
    /// Parses nodes until end of input, `{{else}}`, or a closer. Closers and
    /// `{{else}}` are handed back to the enclosing frame.
    fn parse_sequence(&mut self) -> ParseResult<(Vec<Node>, Stop)> {
        let mut nodes = Vec::new();

        while let Some(token) = self.lexer.next_token()? {
            let location = token.location;
            match token.kind {
                TokenKind::Text(content) => nodes.push(Node::Text { content, location }),
                TokenKind::Variable { name, raw } => nodes.push(Node::Variable {
                    name,
                    raw,
                    location,
                }),
                TokenKind::Partial(name) => nodes.push(Node::Partial { name, location }),
                TokenKind::Open { block, argument } => {
                    nodes.push(self.parse_block(block, argument, location)?);
                }
                TokenKind::Else => return Ok((nodes, Stop::Else(location))),
                TokenKind::Close(block) => return Ok((nodes, Stop::Close(block, location))),
            }
        }

        Ok((nodes, Stop::Eof))
    }

    fn parse_block(
        &mut self,
        block: BlockKind,
        argument: String,
        opened_at: Location,
    ) -> ParseResult<Node> {
        let (body, stop) = self.parse_sequence()?;

        let (else_branch, end) = match stop {
            Stop::Close(kind, at) if kind == block => (Vec::new(), at.end_offset),
            Stop::Else(_) if block == BlockKind::If => {
                let (else_body, stop) = self.parse_sequence()?;
                match stop {
                    Stop::Close(BlockKind::If, at) => (else_body, at.end_offset),
                    other => return Err(unmatched(other, block, opened_at)),
                }
            }
            other => return Err(unmatched(other, block, opened_at)),
        };

        let location = opened_at.until(end);
        Ok(match block {
            BlockKind::If => Node::If {
                condition: argument,
                then_branch: body,
                else_branch,
                location,
            },
            BlockKind::Unless => Node::Unless {
                condition: argument,
                body,
                location,
            },
            BlockKind::Each => Node::Each {
                collection: argument,
                body,
                location,
            },
        })
    }
}

/// Error for a frame that stopped on something other than its own closer.
fn unmatched(stop: Stop, block: BlockKind, opened_at: Location) -> ParseError {
    match stop {
        Stop::Eof => ParseError::new(
            ParseErrorKind::UnclosedBlock {
                block: block.keyword().to_string(),
                opened_at,
            },
            opened_at,
        ),
        Stop::Else(at) => ParseError::new(ParseErrorKind::UnexpectedElse, at),
        Stop::Close(kind, at) => ParseError::new(
            ParseErrorKind::UnexpectedCloser {
                block: kind.keyword().to_string(),
            },
            at,
        ),
    }
}

/// Parses a markup fragment.
///
/// Errors carry a source snippet of `text`.
///
/// # Examples
///
/// ```
/// let template = skein::markup::parse("Hello {{name}}!").unwrap();
/// assert_eq!(template.variables(), vec!["name"]);
/// ```
pub fn parse(text: &str) -> ParseResult<Template> {
    parse_at(text, Location::start()).map_err(|e| e.with_source(text))
}

/// Parses a fragment embedded in a larger source starting at `origin`.
///
/// All node and error locations are absolute in the enclosing source.
pub fn parse_at(text: &str, origin: Location) -> ParseResult<Template> {
    let mut parser = Parser {
        lexer: Lexer::new(text, origin),
    };

    let (nodes, stop) = parser.parse_sequence()?;
    match stop {
        Stop::Eof => Ok(Template::new(nodes)),
        Stop::Else(at) => Err(ParseError::new(ParseErrorKind::UnexpectedElse, at)),
        Stop::Close(kind, at) => Err(ParseError::new(
            ParseErrorKind::UnexpectedCloser {
                block: kind.keyword().to_string(),
            },
            at,
        )),
    }
}

/// Lists the partial names referenced in `text`, deduplicated, in encounter
/// order.
///
/// This is a lexical scan: block structure is not checked, only the tag
/// syntax shared with [`parse`].
pub fn extract_partial_names(text: &str) -> ParseResult<Vec<String>> {
    let mut lexer = Lexer::new(text, Location::start());
    let mut names: Vec<String> = Vec::new();

    while let Some(token) = lexer.next_token()? {
        if let TokenKind::Partial(name) = token.kind {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }

    Ok(names)
}
