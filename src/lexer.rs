use std::iter::FusedIterator;

use crate::ast::{AnchorKind, CharacterClass, ClassRange, Span};
use crate::dialect::{ClassSyntax, DialectConfig};
use crate::error::{LexError, LexErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOpen {
    /// `(`
    Capturing,
    /// `(?:`
    NonCapturing,
    /// `(?<name>`, `(?P<name>` or `(?'name'`
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Literal(char),
    Dot,
    Anchor(AnchorKind),
    /// A bracket expression or a Perl class escape such as `\d`.
    Class(CharacterClass),
    Pipe,
    Star,
    Plus,
    Question,
    /// `{m}`, `{m,}` or `{m,n}`; the bounds are read from the token text.
    Counted,
    GroupOpen(GroupOpen),
    GroupClose,
    Backreference(u32),
    NamedBackreference(String),
}

impl TokenKind {
    pub fn is_quantifier(&self) -> bool {
        matches!(
            self,
            TokenKind::Star | TokenKind::Plus | TokenKind::Question | TokenKind::Counted
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub span: Span,
}

/// Single forward pass over a pattern. Stops for good after the first error.
#[derive(Debug)]
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    class_syntax: ClassSyntax,
    done: bool,
}

pub fn tokenize<'a>(pattern: &'a str, dialect: &DialectConfig) -> Lexer<'a> {
    Lexer::new(pattern, dialect.class_syntax)
}

enum ClassItem {
    Char(char),
    Set(Vec<ClassRange>),
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, class_syntax: ClassSyntax) -> Self {
        Self {
            source,
            pos: 0,
            class_syntax,
            done: false,
        }
    }

    fn rest(&self) -> &'a str {
        let source: &'a str = self.source;
        &source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn lex_token(&mut self, start: usize, c: char) -> Result<TokenKind, LexError> {
        let kind = match c {
            '.' => TokenKind::Dot,
            '^' => TokenKind::Anchor(AnchorKind::StartLine),
            '$' => TokenKind::Anchor(AnchorKind::EndLine),
            '|' => TokenKind::Pipe,
            '*' => TokenKind::Star,
            '+' => TokenKind::Plus,
            '?' => TokenKind::Question,
            '(' => TokenKind::GroupOpen(self.group_open(start)?),
            ')' => TokenKind::GroupClose,
            '[' => TokenKind::Class(self.bracket_class(start)?),
            '{' if self.counted_quantifier() => TokenKind::Counted,
            '\\' => self.escape(start)?,
            c => TokenKind::Literal(c),
        };
        Ok(kind)
    }

    /// Consumes `m}`, `m,}` or `m,n}` after a `{`; leaves input alone otherwise.
    fn counted_quantifier(&mut self) -> bool {
        let bytes = self.rest().as_bytes();
        let mut i = skip_digits(bytes, 0);
        if i == 0 {
            return false;
        }
        if bytes.get(i) == Some(&b',') {
            i = skip_digits(bytes, i + 1);
        }
        if bytes.get(i) != Some(&b'}') {
            return false;
        }
        self.pos += i + 1;
        true
    }

    fn group_open(&mut self, start: usize) -> Result<GroupOpen, LexError> {
        if !self.eat('?') {
            return Ok(GroupOpen::Capturing);
        }
        let rest = self.rest();
        if self.eat(':') {
            Ok(GroupOpen::NonCapturing)
        } else if rest.starts_with("P<") {
            self.pos += 2;
            Ok(GroupOpen::Named(self.group_name('>', start)?))
        } else if rest.starts_with('<') && !rest.starts_with("<=") && !rest.starts_with("<!") {
            self.pos += 1;
            Ok(GroupOpen::Named(self.group_name('>', start)?))
        } else if self.eat('\'') {
            Ok(GroupOpen::Named(self.group_name('\'', start)?))
        } else {
            // Unsupported `(?` forms: the `?` is lexed on its own and rejected
            // by the parser as a quantifier with nothing to repeat.
            self.pos = start + 1;
            Ok(GroupOpen::Capturing)
        }
    }

    fn group_name(&mut self, close: char, start: usize) -> Result<String, LexError> {
        let name_start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let source: &'a str = self.source;
        let name = &source[name_start..self.pos];
        let valid_start = name
            .chars()
            .next()
            .is_some_and(|c| !c.is_ascii_digit());
        if !valid_start {
            return Err(LexError::new(
                LexErrorKind::InvalidGroupName,
                start,
                format!("group name must start with a letter or `_`, found {name:?}"),
            ));
        }
        if !self.eat(close) {
            return Err(LexError::new(
                LexErrorKind::InvalidGroupName,
                start,
                format!("group name `{name}` is not closed by `{close}`"),
            ));
        }
        Ok(name.to_owned())
    }

    fn escape(&mut self, start: usize) -> Result<TokenKind, LexError> {
        let Some(c) = self.bump() else {
            return Err(LexError::new(
                LexErrorKind::UnterminatedEscape,
                start,
                "pattern ends with a lone backslash",
            ));
        };
        let kind = match c {
            'd' | 'D' | 'w' | 'W' | 's' | 'S' => TokenKind::Class(CharacterClass {
                negated: c.is_ascii_uppercase(),
                ranges: perl_class(c.to_ascii_lowercase()),
            }),
            'b' => TokenKind::Anchor(AnchorKind::WordBoundary),
            'B' => TokenKind::Anchor(AnchorKind::NotWordBoundary),
            'A' => TokenKind::Anchor(AnchorKind::StartText),
            'z' => TokenKind::Anchor(AnchorKind::EndText),
            'Z' => TokenKind::Anchor(AnchorKind::EndTextOptionalNewline),
            '1'..='9' => {
                let digits_start = self.pos - 1;
                self.pos += skip_digits(self.rest().as_bytes(), 0);
                let digits = &self.source[digits_start..self.pos];
                let number = digits.parse::<u32>().map_err(|_| {
                    LexError::new(
                        LexErrorKind::InvalidEscape,
                        start,
                        format!("backreference number {digits} is too large"),
                    )
                })?;
                TokenKind::Backreference(number)
            }
            'k' => {
                let close = match self.bump() {
                    Some('<') => '>',
                    Some('\'') => '\'',
                    Some('{') => '}',
                    Some(other) => {
                        return Err(LexError::new(
                            LexErrorKind::InvalidEscape,
                            start,
                            format!("`\\k` must be followed by a group name, found `{other}`"),
                        ))
                    }
                    None => {
                        return Err(LexError::new(
                            LexErrorKind::UnterminatedEscape,
                            start,
                            "pattern ends inside `\\k`",
                        ))
                    }
                };
                TokenKind::NamedBackreference(self.group_name(close, start)?)
            }
            c => TokenKind::Literal(self.char_escape(c, start)?),
        };
        Ok(kind)
    }

    /// Escapes that stand for a single character; `c` follows the backslash.
    fn char_escape(&mut self, c: char, start: usize) -> Result<char, LexError> {
        let ch = match c {
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'f' => '\x0C',
            'v' => '\x0B',
            'a' => '\x07',
            'e' => '\x1B',
            '0' => '\0',
            'x' if self.eat('{') => self.braced_hex(start)?,
            'x' => self.fixed_hex(2, start)?,
            'u' => self.fixed_hex(4, start)?,
            c if c.is_ascii_alphanumeric() => {
                return Err(LexError::new(
                    LexErrorKind::InvalidEscape,
                    start,
                    format!("unknown escape `\\{c}`"),
                ))
            }
            c => c,
        };
        Ok(ch)
    }

    fn fixed_hex(&mut self, width: usize, start: usize) -> Result<char, LexError> {
        let mut value = 0u32;
        for _ in 0..width {
            value = value * 16 + self.hex_digit(start)?;
        }
        codepoint(value, start)
    }

    fn braced_hex(&mut self, start: usize) -> Result<char, LexError> {
        let mut value = 0u32;
        let mut width = 0;
        while !self.eat('}') {
            value = value.saturating_mul(16).saturating_add(self.hex_digit(start)?);
            width += 1;
        }
        if width == 0 {
            return Err(LexError::new(
                LexErrorKind::InvalidEscape,
                start,
                "empty `\\x{}` escape",
            ));
        }
        codepoint(value, start)
    }

    fn hex_digit(&mut self, start: usize) -> Result<u32, LexError> {
        match self.bump() {
            Some(c) => c.to_digit(16).ok_or_else(|| {
                LexError::new(
                    LexErrorKind::InvalidEscape,
                    start,
                    format!("`{c}` is not a hexadecimal digit"),
                )
            }),
            None => Err(LexError::new(
                LexErrorKind::UnterminatedEscape,
                start,
                "pattern ends inside a hexadecimal escape",
            )),
        }
    }

    fn bracket_class(&mut self, start: usize) -> Result<CharacterClass, LexError> {
        let negated = self.eat('^');
        let mut ranges = Vec::new();
        let mut first = true;
        loop {
            let item_start = self.pos;
            let Some(c) = self.bump() else {
                return Err(unterminated_class(start));
            };
            if c == ']' && !first {
                break;
            }
            first = false;
            let lo = match self.class_item(c, item_start)? {
                ClassItem::Set(set) => {
                    ranges.extend(set);
                    continue;
                }
                ClassItem::Char(lo) => lo,
            };
            let rest = self.rest();
            if !rest.starts_with('-') || rest.len() == 1 || rest[1..].starts_with(']') {
                ranges.push(ClassRange::single(lo));
                continue;
            }
            self.pos += 1;
            let hi_start = self.pos;
            let Some(c) = self.bump() else {
                return Err(unterminated_class(start));
            };
            let hi = match self.class_item(c, hi_start)? {
                ClassItem::Char(hi) => hi,
                ClassItem::Set(_) => {
                    return Err(LexError::new(
                        LexErrorKind::InvalidClassRange,
                        item_start,
                        "a class cannot be the end of a range",
                    ))
                }
            };
            if hi < lo {
                return Err(LexError::new(
                    LexErrorKind::InvalidClassRange,
                    item_start,
                    format!("range {lo:?}-{hi:?} is out of order"),
                ));
            }
            ranges.push(ClassRange::new(lo, hi));
        }
        Ok(CharacterClass { negated, ranges })
    }

    fn class_item(&mut self, c: char, item_start: usize) -> Result<ClassItem, LexError> {
        match c {
            '[' if self.rest().starts_with(':') => self.posix_class(item_start),
            '\\' if self.class_syntax == ClassSyntax::Pcre => self.class_escape(item_start),
            c => Ok(ClassItem::Char(c)),
        }
    }

    fn class_escape(&mut self, start: usize) -> Result<ClassItem, LexError> {
        let Some(c) = self.bump() else {
            return Err(LexError::new(
                LexErrorKind::UnterminatedEscape,
                start,
                "pattern ends inside a class escape",
            ));
        };
        let item = match c {
            'd' | 'w' | 's' => ClassItem::Set(perl_class(c)),
            'D' | 'W' | 'S' => ClassItem::Set(negate_ranges(&perl_class(c.to_ascii_lowercase()))),
            'b' => ClassItem::Char('\x08'),
            c => ClassItem::Char(self.char_escape(c, start)?),
        };
        Ok(item)
    }

    /// `[:name:]` inside a bracket expression; a `[` not followed by a
    /// well-formed name is an ordinary character.
    fn posix_class(&mut self, item_start: usize) -> Result<ClassItem, LexError> {
        let rest = &self.rest()[1..];
        let Some(end) = rest.find(":]") else {
            return Ok(ClassItem::Char('['));
        };
        let name = &rest[..end];
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_lowercase()) {
            return Ok(ClassItem::Char('['));
        }
        let ranges = posix_class(name).ok_or_else(|| {
            LexError::new(
                LexErrorKind::InvalidClassRange,
                item_start,
                format!("unknown POSIX class `[:{name}:]`"),
            )
        })?;
        self.pos += 1 + end + 2;
        Ok(ClassItem::Set(ranges))
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let start = self.pos;
        let Some(c) = self.bump() else {
            self.done = true;
            return None;
        };
        let source: &'a str = self.source;
        match self.lex_token(start, c) {
            Ok(kind) => Some(Ok(Token {
                kind,
                text: &source[start..self.pos],
                span: Span::new(start, self.pos),
            })),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl FusedIterator for Lexer<'_> {}

fn skip_digits(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(u8::is_ascii_digit) {
        i += 1;
    }
    i
}

fn codepoint(value: u32, start: usize) -> Result<char, LexError> {
    char::from_u32(value).ok_or_else(|| {
        LexError::new(
            LexErrorKind::InvalidEscape,
            start,
            format!("U+{value:X} is not a valid codepoint"),
        )
    })
}

fn unterminated_class(start: usize) -> LexError {
    LexError::new(
        LexErrorKind::UnterminatedClass,
        start,
        "character class is missing its closing `]`",
    )
}

fn ranges(pairs: &[(char, char)]) -> Vec<ClassRange> {
    pairs.iter().map(|&(lo, hi)| ClassRange::new(lo, hi)).collect()
}

fn perl_class(c: char) -> Vec<ClassRange> {
    match c {
        'd' => ranges(&[('0', '9')]),
        'w' => ranges(&[('0', '9'), ('A', 'Z'), ('_', '_'), ('a', 'z')]),
        _ => ranges(&[('\t', '\r'), (' ', ' ')]),
    }
}

fn posix_class(name: &str) -> Option<Vec<ClassRange>> {
    let set = match name {
        "alnum" => ranges(&[('0', '9'), ('A', 'Z'), ('a', 'z')]),
        "alpha" => ranges(&[('A', 'Z'), ('a', 'z')]),
        "ascii" => ranges(&[('\0', '\x7F')]),
        "blank" => ranges(&[('\t', '\t'), (' ', ' ')]),
        "cntrl" => ranges(&[('\0', '\x1F'), ('\x7F', '\x7F')]),
        "digit" => ranges(&[('0', '9')]),
        "graph" => ranges(&[('!', '~')]),
        "lower" => ranges(&[('a', 'z')]),
        "print" => ranges(&[(' ', '~')]),
        "punct" => ranges(&[('!', '/'), (':', '@'), ('[', '`'), ('{', '~')]),
        "space" => ranges(&[('\t', '\r'), (' ', ' ')]),
        "upper" => ranges(&[('A', 'Z')]),
        "word" => ranges(&[('0', '9'), ('A', 'Z'), ('_', '_'), ('a', 'z')]),
        "xdigit" => ranges(&[('0', '9'), ('A', 'F'), ('a', 'f')]),
        _ => return None,
    };
    Some(set)
}

/// Complement of `set` over all Unicode scalar values.
fn negate_ranges(set: &[ClassRange]) -> Vec<ClassRange> {
    let mut sorted: Vec<(u32, u32)> = set.iter().map(|r| (r.lo as u32, r.hi as u32)).collect();
    sorted.sort_unstable();

    let mut gaps = Vec::new();
    let mut next = 0u32;
    for (lo, hi) in sorted {
        if lo > next {
            push_scalar_range(&mut gaps, next, lo - 1);
        }
        next = next.max(hi + 1);
    }
    push_scalar_range(&mut gaps, next, char::MAX as u32);
    gaps
}

/// Pushes `lo..=hi`, splitting around the surrogate block.
fn push_scalar_range(out: &mut Vec<ClassRange>, lo: u32, hi: u32) {
    const SURROGATES: (u32, u32) = (0xD800, 0xDFFF);
    let pieces = [
        (lo, hi.min(SURROGATES.0 - 1)),
        (lo.max(SURROGATES.1 + 1), hi),
    ];
    for (lo, hi) in pieces {
        if lo > hi {
            continue;
        }
        if let (Some(lo), Some(hi)) = (char::from_u32(lo), char::from_u32(hi)) {
            out.push(ClassRange::new(lo, hi));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(pattern: &str) -> Vec<TokenKind> {
        tokenize(pattern, &DialectConfig::default())
            .map(|token| token.unwrap().kind)
            .collect()
    }

    fn lex_error(pattern: &str) -> LexError {
        tokenize(pattern, &DialectConfig::default())
            .find_map(Result::err)
            .expect("pattern should not lex")
    }

    #[test]
    fn tokens_carry_text_and_span() {
        let tokens: Vec<_> = tokenize(r"a\d{2,3}?", &DialectConfig::default())
            .collect::<Result<_, _>>()
            .unwrap();

        let texts: Vec<_> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["a", r"\d", "{2,3}", "?"]);
        assert_eq!(tokens[2].span, Span::new(3, 8));
        assert_eq!(tokens[2].kind, TokenKind::Counted);
    }

    #[test]
    fn brace_without_counts_is_literal() {
        assert_eq!(
            kinds("a{x}"),
            vec![
                TokenKind::Literal('a'),
                TokenKind::Literal('{'),
                TokenKind::Literal('x'),
                TokenKind::Literal('}'),
            ]
        );
        assert_eq!(kinds("{,3}")[0], TokenKind::Literal('{'));
    }

    #[test]
    fn group_openers() {
        assert_eq!(kinds("(")[0], TokenKind::GroupOpen(GroupOpen::Capturing));
        assert_eq!(kinds("(?:")[0], TokenKind::GroupOpen(GroupOpen::NonCapturing));
        for opener in ["(?<year>", "(?P<year>", "(?'year'"] {
            assert_eq!(
                kinds(opener)[0],
                TokenKind::GroupOpen(GroupOpen::Named("year".into()))
            );
        }
        assert_eq!(
            kinds("(?=")[..2],
            [TokenKind::GroupOpen(GroupOpen::Capturing), TokenKind::Question]
        );
    }

    #[test]
    fn backreference_escapes() {
        assert_eq!(kinds(r"\12")[0], TokenKind::Backreference(12));
        assert_eq!(
            kinds(r"\k<word>\k{x}"),
            vec![
                TokenKind::NamedBackreference("word".into()),
                TokenKind::NamedBackreference("x".into()),
            ]
        );
    }

    #[test]
    fn character_escapes() {
        assert_eq!(
            kinds(r"\n\x41\x{263A}é\.\0"),
            vec![
                TokenKind::Literal('\n'),
                TokenKind::Literal('A'),
                TokenKind::Literal('\u{263A}'),
                TokenKind::Literal('é'),
                TokenKind::Literal('.'),
                TokenKind::Literal('\0'),
            ]
        );
    }

    #[test]
    fn bracket_class_ranges() {
        let TokenKind::Class(class) = &kinds("[^a-c_x-]")[0] else {
            panic!("expected a class");
        };
        assert!(class.negated);
        assert_eq!(
            class.ranges,
            vec![
                ClassRange::new('a', 'c'),
                ClassRange::single('_'),
                ClassRange::single('x'),
                ClassRange::single('-'),
            ]
        );
    }

    #[test]
    fn leading_bracket_is_literal_and_posix_names_expand() {
        let TokenKind::Class(class) = &kinds("[]a[:digit:]]")[0] else {
            panic!("expected a class");
        };
        assert_eq!(
            class.ranges,
            vec![
                ClassRange::single(']'),
                ClassRange::single('a'),
                ClassRange::new('0', '9'),
            ]
        );
    }

    #[test]
    fn negated_escape_inside_class_is_complemented() {
        let TokenKind::Class(class) = &kinds(r"[\D]")[0] else {
            panic!("expected a class");
        };
        assert!(!class.negated);
        assert_eq!(
            class.ranges,
            vec![
                ClassRange::new('\0', '/'),
                ClassRange::new(':', '\u{D7FF}'),
                ClassRange::new('\u{E000}', char::MAX),
            ]
        );
    }

    #[test]
    fn posix_syntax_keeps_backslash_literal_in_class() {
        let posix = DialectConfig::default().with_class_syntax(ClassSyntax::Posix);
        let tokens: Vec<_> = tokenize(r"[\d]", &posix).map(|t| t.unwrap().kind).collect();
        let TokenKind::Class(class) = &tokens[0] else {
            panic!("expected a class");
        };
        assert_eq!(
            class.ranges,
            vec![ClassRange::single('\\'), ClassRange::single('d')]
        );
    }

    #[test]
    fn unterminated_constructs() {
        let err = lex_error(r"ab\");
        assert_eq!(err.kind, LexErrorKind::UnterminatedEscape);
        assert_eq!(err.offset, 2);

        let err = lex_error("x[abc");
        assert_eq!(err.kind, LexErrorKind::UnterminatedClass);
        assert_eq!(err.offset, 1);

        assert_eq!(lex_error(r"\x4").kind, LexErrorKind::UnterminatedEscape);
    }

    #[test]
    fn malformed_escapes() {
        assert_eq!(lex_error(r"\q").kind, LexErrorKind::InvalidEscape);
        assert_eq!(lex_error(r"\xZZ").kind, LexErrorKind::InvalidEscape);
        assert_eq!(lex_error(r"\x{D800}").kind, LexErrorKind::InvalidEscape);
        assert_eq!(lex_error(r"\k-").kind, LexErrorKind::InvalidEscape);
        assert_eq!(lex_error("[z-a]").kind, LexErrorKind::InvalidClassRange);
        assert_eq!(lex_error(r"[a-\d]").kind, LexErrorKind::InvalidClassRange);
        assert_eq!(lex_error("(?<1x>a)").kind, LexErrorKind::InvalidGroupName);
        assert_eq!(lex_error("(?<name").kind, LexErrorKind::InvalidGroupName);
    }

    #[test]
    fn lexer_is_fused_after_error() {
        let mut lexer = tokenize(r"a\qb", &DialectConfig::default());
        assert!(matches!(lexer.next(), Some(Ok(_))));
        assert!(matches!(lexer.next(), Some(Err(_))));
        assert!(lexer.next().is_none());
        assert!(lexer.next().is_none());
    }
}
