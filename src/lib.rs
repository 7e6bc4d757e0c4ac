//! Regular-expression parser that builds an arena parse tree of typed terms,
//! plus read-only structural consistency checks over such trees.
//!
//! ```text
//! pattern string ─► lexer ─► parser ─► Pattern (tree) ─► consistency checks
//! ```

pub mod ast;
pub mod consistency;
pub mod dialect;
pub mod error;
pub mod lexer;
pub mod parser;

pub use ast::{
    AnchorKind, Backreference, CharacterClass, ChildSlot, ClassRange, Group, NamedBackreference,
    Pattern, Repetition, Span, Term, TermId, TermKind, TermTag, TreeBuilder,
};
pub use consistency::{
    check_consistency, check_pattern, cyclic_terms, non_consecutive_indices, non_unique_children,
    PatternViolation, Violation, ViolationKind,
};
pub use dialect::{ClassSyntax, DialectConfig};
pub use error::{Diagnostic, DiagnosticKind, Error, LexError, LexErrorKind, ParseError, ParseErrorKind};
pub use parser::parse;
