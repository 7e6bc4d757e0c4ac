use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::ast::Span;

/// Why the lexer rejected a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LexErrorKind {
    /// The pattern ended in the middle of an escape sequence.
    UnterminatedEscape,
    /// A `[` without a matching `]`.
    UnterminatedClass,
    /// An escape the dialect does not know, or one encoding an invalid codepoint.
    InvalidEscape,
    /// A bracket range whose endpoints are out of order or not single characters.
    InvalidClassRange,
    /// A malformed `(?<name>` / `\k<name>` group name.
    InvalidGroupName,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at offset {offset}: {message}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub offset: usize,
    pub message: String,
}

impl LexError {
    pub fn new(kind: LexErrorKind, offset: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            offset,
            message: message.into(),
        }
    }
}

/// Why the parser rejected an otherwise well-lexed pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseErrorKind {
    DuplicateGroupName,
    InvalidRepetitionBounds,
    MaxDepthExceeded,
    UnbalancedGroup,
    UnexpectedToken,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at offset {offset}: {message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, offset: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            offset,
            message: message.into(),
        }
    }
}

/// Fatal failure of a single `parse` call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
}

impl Error {
    pub fn offset(&self) -> usize {
        match self {
            Error::Lex(err) => err.offset,
            Error::Parse(err) => err.offset,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Error::Lex(err) => &err.message,
            Error::Parse(err) => &err.message,
        }
    }

    pub fn lex_kind(&self) -> Option<LexErrorKind> {
        match self {
            Error::Lex(err) => Some(err.kind),
            Error::Parse(_) => None,
        }
    }

    pub fn parse_kind(&self) -> Option<ParseErrorKind> {
        match self {
            Error::Lex(_) => None,
            Error::Parse(err) => Some(err.kind),
        }
    }
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LexErrorKind::UnterminatedEscape => "unterminated escape",
            LexErrorKind::UnterminatedClass => "unterminated character class",
            LexErrorKind::InvalidEscape => "invalid escape",
            LexErrorKind::InvalidClassRange => "invalid class range",
            LexErrorKind::InvalidGroupName => "invalid group name",
        };
        f.write_str(name)
    }
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParseErrorKind::DuplicateGroupName => "duplicate group name",
            ParseErrorKind::InvalidRepetitionBounds => "invalid repetition bounds",
            ParseErrorKind::MaxDepthExceeded => "maximum nesting depth exceeded",
            ParseErrorKind::UnbalancedGroup => "unbalanced group",
            ParseErrorKind::UnexpectedToken => "unexpected token",
        };
        f.write_str(name)
    }
}

/// Non-fatal findings attached to a successfully parsed pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    UnresolvedBackreference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub span: Span,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}: {}", self.span.start, self.span.end, self.message)
    }
}
