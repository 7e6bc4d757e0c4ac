use std::collections::HashSet;

use tracing::debug;

use crate::ast::{
    Backreference, Group, NamedBackreference, Pattern, Repetition, Span, TermId, TermKind,
    TreeBuilder,
};
use crate::dialect::DialectConfig;
use crate::error::{Diagnostic, DiagnosticKind, Error, ParseError, ParseErrorKind};
use crate::lexer::{tokenize, GroupOpen, Lexer, Token, TokenKind};

/// Parse `pattern` under `dialect` into a `Pattern` tree.
///
/// Fails on the first lexical or structural error; no partial tree is returned.
pub fn parse(pattern: &str, dialect: &DialectConfig) -> Result<Pattern, Error> {
    Parser::new(pattern, dialect).parse()
}

/// Regular-expression parser.
///
/// The `Parser` pulls tokens from the lexer one at a time, tracks group
/// numbering and nesting depth, and writes terms into a `TreeBuilder` arena.
/// Open groups live on a heap stack of frames, so nesting is bounded by
/// `max_nesting_depth` rather than by the thread's stack.
pub struct Parser<'a> {
    pattern: &'a str,
    dialect: &'a DialectConfig,
    lexer: Lexer<'a>,
    lookahead: Option<Token<'a>>,
    last_end: usize,
    next_group_number: u32,
    group_names: HashSet<String>,
    builder: TreeBuilder,
}

/// The branches and items read so far at one nesting level.
struct GroupFrame {
    alt_start: usize,
    seq_start: usize,
    branches: Vec<TermId>,
    items: Vec<TermId>,
}

impl GroupFrame {
    fn new(start: usize) -> Self {
        Self {
            alt_start: start,
            seq_start: start,
            branches: Vec::new(),
            items: Vec::new(),
        }
    }
}

/// A group whose `)` has not been seen yet, with the frame it interrupted.
struct OpenGroup {
    outer: GroupFrame,
    group: Group,
    span: Span,
}

impl<'a> Parser<'a> {
    /// Create a new parser for the given pattern.
    pub fn new(pattern: &'a str, dialect: &'a DialectConfig) -> Self {
        Self {
            pattern,
            dialect,
            lexer: tokenize(pattern, dialect),
            lookahead: None,
            last_end: 0,
            next_group_number: 1,
            group_names: HashSet::new(),
            builder: TreeBuilder::new(),
        }
    }

    /// Allocate the next capturing group number.
    fn alloc_group_number(&mut self) -> u32 {
        let number = self.next_group_number;
        self.next_group_number += 1;
        number
    }

    /// Peek at the next token without consuming it.
    fn peek(&mut self) -> Result<Option<&Token<'a>>, Error> {
        if self.lookahead.is_none() {
            self.lookahead = self.lexer.next().transpose()?;
        }
        Ok(self.lookahead.as_ref())
    }

    fn peek_kind(&mut self) -> Result<Option<&TokenKind>, Error> {
        Ok(self.peek()?.map(|token| &token.kind))
    }

    /// Consume the next token and return it.
    fn advance(&mut self) -> Result<Option<Token<'a>>, Error> {
        self.peek()?;
        let token = self.lookahead.take();
        if let Some(token) = &token {
            self.last_end = token.span.end;
        }
        Ok(token)
    }

    /// Byte offset where the next token starts.
    fn offset(&mut self) -> Result<usize, Error> {
        let len = self.pattern.len();
        Ok(self.peek()?.map_or(len, |token| token.span.start))
    }

    /// Entry point: parses the whole pattern, then resolves backreferences.
    ///
    /// Example:
    /// - Pattern: `a|b` → Alternation[Literal('a'), Literal('b')]
    pub fn parse(mut self) -> Result<Pattern, Error> {
        let root = self.parse_alt()?;
        self.resolve_backreferences();

        let pattern = self.builder.finish(self.pattern, root);
        debug!(
            pattern = self.pattern,
            terms = pattern.len(),
            groups = pattern.group_count(),
            diagnostics = pattern.diagnostics().len(),
            "parsed pattern"
        );
        Ok(pattern)
    }

    /// Parse alternation (`|`), concatenation and groups down to the atoms.
    ///
    /// `(` pushes a frame and `)` pops it; every other token becomes an item
    /// of the innermost frame's current branch.
    ///
    /// Example:
    /// - Pattern: `ab|cd`   → Alternation[Concatenation(ab), Concatenation(cd)]
    /// - Pattern: `a(b|c)d` → Concatenation[Literal('a'), Group, Literal('d')]
    /// - Pattern: `a`       → Literal('a')
    /// - Pattern: ``        → Concatenation[]
    fn parse_alt(&mut self) -> Result<TermId, Error> {
        let start = self.offset()?;
        let mut current = GroupFrame::new(start);
        let mut open_groups: Vec<OpenGroup> = Vec::new();
        loop {
            let end = self.last_end;
            let Some(token) = self.advance()? else {
                if let Some(innermost) = open_groups.last() {
                    return Err(ParseError::new(
                        ParseErrorKind::UnbalancedGroup,
                        innermost.span.start,
                        "group is never closed",
                    )
                    .into());
                }
                return Ok(self.close_alt(current, end));
            };
            match token.kind {
                TokenKind::Pipe => {
                    self.close_seq(&mut current, end);
                    current.seq_start = self.offset()?;
                }
                TokenKind::GroupClose => {
                    let Some(closed) = open_groups.pop() else {
                        return Err(ParseError::new(
                            ParseErrorKind::UnbalancedGroup,
                            token.span.start,
                            format!("unmatched `{}`", token.text),
                        )
                        .into());
                    };
                    let body = std::mem::replace(&mut current, closed.outer);
                    let body = self.close_alt(body, end);
                    let group = self.close_group(closed.group, closed.span, body);
                    let item = self.parse_repeat(group)?;
                    current.items.push(item);
                }
                TokenKind::GroupOpen(open) => {
                    let group = self.open_group(open, token.span, open_groups.len() + 1)?;
                    let start = self.offset()?;
                    let outer = std::mem::replace(&mut current, GroupFrame::new(start));
                    open_groups.push(OpenGroup {
                        outer,
                        group,
                        span: token.span,
                    });
                }
                kind => {
                    let atom = self.parse_atom(kind, token.span, token.text)?;
                    let item = self.parse_repeat(atom)?;
                    current.items.push(item);
                }
            }
        }
    }

    /// Ends the frame's current branch at `end` and files it as a branch.
    fn close_seq(&mut self, frame: &mut GroupFrame, end: usize) {
        let items = std::mem::take(&mut frame.items);
        if let [single] = items[..] {
            frame.branches.push(single);
            return;
        }

        let span = if items.is_empty() {
            Span::empty(frame.seq_start)
        } else {
            Span::new(frame.seq_start, end)
        };
        let seq = self.builder.push(TermKind::Concatenation, span);
        for item in items {
            self.builder.attach(seq, item);
        }
        frame.branches.push(seq);
    }

    /// Ends the frame's last branch and joins the branches into its body.
    fn close_alt(&mut self, mut frame: GroupFrame, end: usize) -> TermId {
        self.close_seq(&mut frame, end);
        if let [single] = frame.branches[..] {
            return single;
        }

        let alt = self
            .builder
            .push(TermKind::Alternation, Span::new(frame.alt_start, end));
        for branch in frame.branches {
            self.builder.attach(alt, branch);
        }
        alt
    }

    /// Parse a repetition suffix (`*`, `+`, `?`, `{m,n}`, optionally lazy) after an atom.
    ///
    /// Example:
    /// - Pattern: `a*`     → Repetition { min: 0, max: None } [Literal('a')]
    /// - Pattern: `b{2,}?` → Repetition { min: 2, max: None, greedy: false } [Literal('b')]
    /// - Pattern: `c`      → Literal('c')
    fn parse_repeat(&mut self, atom: TermId) -> Result<TermId, Error> {
        let Some(token) = self.peek()? else {
            return Ok(atom);
        };
        let (min, max) = match &token.kind {
            TokenKind::Star => (0, None),
            TokenKind::Plus => (1, None),
            TokenKind::Question => (0, Some(1)),
            TokenKind::Counted => counted_bounds(token.text, token.span.start)?,
            _ => return Ok(atom),
        };
        self.advance()?;

        let greedy = !matches!(self.peek_kind()?, Some(TokenKind::Question));
        if !greedy {
            self.advance()?;
        }
        if let Some(token) = self.peek()? {
            if token.kind.is_quantifier() {
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedToken,
                    token.span.start,
                    format!("`{}` cannot follow another repetition", token.text),
                )
                .into());
            }
        }

        let span = self.builder.span(atom).to(Span::empty(self.last_end));
        let repetition = self
            .builder
            .push(TermKind::Repetition(Repetition { min, max, greedy }), span);
        self.builder.attach(repetition, atom);
        Ok(repetition)
    }

    /// Parse a single non-group atom: class, anchor, dot, backreference or literal.
    ///
    /// Examples:
    /// - Pattern: `[a-c]` → CharacterClass { ranges: ['a'-'c'] }
    /// - Pattern: `\d`    → CharacterClass { ranges: ['0'-'9'] }
    /// - Pattern: `\1`    → Backreference { number: 1 }
    /// - Pattern: `^`     → Anchor(StartLine)
    fn parse_atom(&mut self, kind: TokenKind, span: Span, text: &str) -> Result<TermId, Error> {
        let kind = match kind {
            TokenKind::Literal(c) => TermKind::Literal(c),
            TokenKind::Dot => TermKind::Dot,
            TokenKind::Anchor(anchor) => TermKind::Anchor(anchor),
            TokenKind::Class(class) => TermKind::CharacterClass(class),
            TokenKind::Backreference(number) => TermKind::Backreference(Backreference {
                number,
                resolved: false,
            }),
            TokenKind::NamedBackreference(name) => {
                TermKind::NamedBackreference(NamedBackreference {
                    name,
                    number: None,
                    resolved: false,
                })
            }
            TokenKind::Star | TokenKind::Plus | TokenKind::Question | TokenKind::Counted => {
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedToken,
                    span.start,
                    format!("`{text}` has nothing to repeat"),
                )
                .into())
            }
            TokenKind::Pipe | TokenKind::GroupOpen(_) | TokenKind::GroupClose => {
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedToken,
                    span.start,
                    format!("unexpected `{text}`"),
                )
                .into())
            }
        };
        Ok(self.builder.push(kind, span))
    }

    /// Check a group opener at nesting level `depth` and give it its number.
    ///
    /// Capturing groups take their number when the opener is seen, so
    /// `(a)(b(c))` numbers `(a)`, `(b(c))`, `(c)` as 1, 2, 3.
    fn open_group(
        &mut self,
        open: GroupOpen,
        open_span: Span,
        depth: usize,
    ) -> Result<Group, Error> {
        if depth > self.dialect.max_nesting_depth {
            return Err(ParseError::new(
                ParseErrorKind::MaxDepthExceeded,
                open_span.start,
                format!(
                    "groups nested deeper than {}",
                    self.dialect.max_nesting_depth
                ),
            )
            .into());
        }

        let group = match open {
            GroupOpen::Capturing => Group {
                number: Some(self.alloc_group_number()),
                name: None,
            },
            GroupOpen::NonCapturing => Group {
                number: None,
                name: None,
            },
            GroupOpen::Named(name) => {
                if !self.group_names.insert(name.clone())
                    && !self.dialect.allow_duplicate_group_names
                {
                    return Err(ParseError::new(
                        ParseErrorKind::DuplicateGroupName,
                        open_span.start,
                        format!("group name `{name}` is already defined"),
                    )
                    .into());
                }
                Group {
                    number: Some(self.alloc_group_number()),
                    name: Some(name),
                }
            }
        };
        Ok(group)
    }

    /// Build the group term around `body` once its `)` has been consumed.
    fn close_group(&mut self, group: Group, open_span: Span, body: TermId) -> TermId {
        let number = group.number;
        let name = group.name.clone();
        let id = self
            .builder
            .push(TermKind::Group(group), open_span.to(Span::empty(self.last_end)));
        self.builder.attach(id, body);
        if let Some(number) = number {
            self.builder.declare_group(number, id, name.as_deref());
        }
        id
    }

    /// Post-pass: mark each backreference resolved or not against the final group table.
    fn resolve_backreferences(&mut self) {
        let ids: Vec<TermId> = self.builder.terms().collect();
        for id in ids {
            let target = match self.builder.kind(id) {
                TermKind::Backreference(back) => {
                    self.builder.has_group(back.number).then_some(back.number)
                }
                TermKind::NamedBackreference(back) => {
                    self.builder.group_numbers_named(&back.name).first().copied()
                }
                _ => continue,
            };

            let message = match self.builder.kind_mut(id) {
                TermKind::Backreference(back) => {
                    back.resolved = target.is_some();
                    format!("backreference to undefined group {}", back.number)
                }
                TermKind::NamedBackreference(back) => {
                    back.number = target;
                    back.resolved = target.is_some();
                    format!("backreference to undefined group `{}`", back.name)
                }
                _ => continue,
            };
            if target.is_none() {
                let span = self.builder.span(id);
                debug!(start = span.start, end = span.end, "{message}");
                self.builder.diagnose(Diagnostic {
                    kind: DiagnosticKind::UnresolvedBackreference,
                    span,
                    message,
                });
            }
        }
    }
}

/// Reads `{m}`, `{m,}` or `{m,n}` token text into `(min, max)`.
fn counted_bounds(text: &str, offset: usize) -> Result<(u32, Option<u32>), ParseError> {
    let inner = &text[1..text.len() - 1];
    let count = |digits: &str| {
        digits.parse::<u32>().map_err(|_| {
            ParseError::new(
                ParseErrorKind::InvalidRepetitionBounds,
                offset,
                format!("repetition count {digits} is too large"),
            )
        })
    };
    let (min, max) = match inner.split_once(',') {
        None => {
            let exact = count(inner)?;
            (exact, Some(exact))
        }
        Some((min, "")) => (count(min)?, None),
        Some((min, max)) => (count(min)?, Some(count(max)?)),
    };
    if let Some(max) = max {
        if max < min {
            return Err(ParseError::new(
                ParseErrorKind::InvalidRepetitionBounds,
                offset,
                format!("`{text}` has an upper bound below its lower bound"),
            ));
        }
    }
    Ok((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AnchorKind, TermTag};

    fn parse_default(pattern: &str) -> Pattern {
        parse(pattern, &DialectConfig::default()).unwrap()
    }

    fn tags(pattern: &Pattern, id: TermId) -> Vec<TermTag> {
        pattern
            .children(id)
            .map(|child| pattern.term(child).tag())
            .collect()
    }

    #[test]
    fn counted_bounds_forms() {
        assert_eq!(counted_bounds("{3}", 0).unwrap(), (3, Some(3)));
        assert_eq!(counted_bounds("{3,}", 0).unwrap(), (3, None));
        assert_eq!(counted_bounds("{1,4}", 0).unwrap(), (1, Some(4)));
        assert_eq!(
            counted_bounds("{3,1}", 5).unwrap_err().kind,
            ParseErrorKind::InvalidRepetitionBounds
        );
        assert_eq!(
            counted_bounds("{99999999999}", 0).unwrap_err().kind,
            ParseErrorKind::InvalidRepetitionBounds
        );
    }

    #[test]
    fn alternation_binds_loosest() {
        let pattern = parse_default("ab|cd");
        let root = pattern.root();

        assert_eq!(pattern.term(root).tag(), TermTag::Alternation);
        assert_eq!(
            tags(&pattern, root),
            vec![TermTag::Concatenation, TermTag::Concatenation]
        );
        let branches: Vec<_> = pattern.children(root).map(|id| pattern.text(id)).collect();
        assert_eq!(branches, vec!["ab", "cd"]);
    }

    #[test]
    fn repetition_binds_to_preceding_atom_only() {
        let pattern = parse_default("ab*");
        let root = pattern.root();

        assert_eq!(
            tags(&pattern, root),
            vec![TermTag::Literal, TermTag::Repetition]
        );
        let star = pattern.get_child(root, 1).unwrap();
        assert_eq!(pattern.text(star), "b*");
    }

    #[test]
    fn lazy_suffix_clears_greedy() {
        let pattern = parse_default("a+?");
        let TermKind::Repetition(rep) = pattern.term(pattern.root()).kind() else {
            panic!("expected a repetition");
        };
        assert_eq!((rep.min, rep.max, rep.greedy), (1, None, false));
        assert_eq!(pattern.text(pattern.root()), "a+?");
    }

    #[test]
    fn anchors_and_dot_are_leaves() {
        let pattern = parse_default(r"^.\b$");
        let kinds: Vec<_> = pattern
            .children(pattern.root())
            .map(|id| pattern.term(id).kind().clone())
            .collect();
        assert_eq!(
            kinds,
            vec![
                TermKind::Anchor(AnchorKind::StartLine),
                TermKind::Dot,
                TermKind::Anchor(AnchorKind::WordBoundary),
                TermKind::Anchor(AnchorKind::EndLine),
            ]
        );
    }

    #[test]
    fn empty_branches_are_empty_concatenations() {
        let pattern = parse_default("a|");
        let root = pattern.root();
        let empty = pattern.get_child(root, 1).unwrap();

        assert_eq!(pattern.term(empty).tag(), TermTag::Concatenation);
        assert_eq!(pattern.term(empty).span(), Span::empty(2));
        assert_eq!(pattern.text(root), "a|");
    }

    #[test]
    fn stray_close_paren_is_unbalanced() {
        let err = parse("a)b", &DialectConfig::default()).unwrap_err();
        assert_eq!(err.parse_kind(), Some(ParseErrorKind::UnbalancedGroup));
        assert_eq!(err.offset(), 1);
    }

    #[test]
    fn unclosed_group_reports_its_opener() {
        let err = parse("x(a(b)", &DialectConfig::default()).unwrap_err();
        assert_eq!(err.parse_kind(), Some(ParseErrorKind::UnbalancedGroup));
        assert_eq!(err.offset(), 1);
    }

    #[test]
    fn nothing_to_repeat() {
        for pattern in ["*a", "a|+", "(?=a)", "a**", "a{2}{3}"] {
            let err = parse(pattern, &DialectConfig::default()).unwrap_err();
            assert_eq!(
                err.parse_kind(),
                Some(ParseErrorKind::UnexpectedToken),
                "{pattern}"
            );
        }
    }

    #[test]
    fn lex_errors_surface_through_parse() {
        let err = parse("[ab", &DialectConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Lex(_)));
        assert_eq!(err.offset(), 0);
    }
}
