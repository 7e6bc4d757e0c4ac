use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::Diagnostic;

/// Half-open byte range `[start, end)` into the pattern source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start {start} after end {end}");
        Self { start, end }
    }

    pub fn empty(at: usize) -> Self {
        Self { start: at, end: at }
    }

    /// Span running from the start of `self` to the end of `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start, other.end)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Stable handle of a term inside its `Pattern` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TermId(usize);

impl TermId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Payload-free discriminant of a `TermKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TermTag {
    Literal,
    CharacterClass,
    Anchor,
    Dot,
    Group,
    Alternation,
    Concatenation,
    Repetition,
    Backreference,
    NamedBackreference,
}

impl fmt::Display for TermTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AnchorKind {
    /// `^`
    StartLine,
    /// `$`
    EndLine,
    /// `\b`
    WordBoundary,
    /// `\B`
    NotWordBoundary,
    /// `\A`
    StartText,
    /// `\z`
    EndText,
    /// `\Z`
    EndTextOptionalNewline,
}

/// Inclusive codepoint range `lo..=hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ClassRange {
    pub lo: char,
    pub hi: char,
}

impl ClassRange {
    pub fn new(lo: char, hi: char) -> Self {
        debug_assert!(lo <= hi);
        Self { lo, hi }
    }

    pub fn single(c: char) -> Self {
        Self { lo: c, hi: c }
    }
}

/// Ranges keep source order; overlap between them is allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacterClass {
    pub negated: bool,
    pub ranges: Vec<ClassRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    /// Present iff the group captures.
    pub number: Option<u32>,
    pub name: Option<String>,
}

impl Group {
    pub fn is_capturing(&self) -> bool {
        self.number.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Repetition {
    pub min: u32,
    /// `None` means unbounded.
    pub max: Option<u32>,
    pub greedy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Backreference {
    pub number: u32,
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedBackreference {
    pub name: String,
    /// Lowest-numbered group carrying `name`, once resolved.
    pub number: Option<u32>,
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TermKind {
    Literal(char),
    CharacterClass(CharacterClass),
    Anchor(AnchorKind),
    Dot,
    Group(Group),
    Alternation,
    Concatenation,
    Repetition(Repetition),
    Backreference(Backreference),
    NamedBackreference(NamedBackreference),
}

impl TermKind {
    pub fn tag(&self) -> TermTag {
        match self {
            TermKind::Literal(_) => TermTag::Literal,
            TermKind::CharacterClass(_) => TermTag::CharacterClass,
            TermKind::Anchor(_) => TermTag::Anchor,
            TermKind::Dot => TermTag::Dot,
            TermKind::Group(_) => TermTag::Group,
            TermKind::Alternation => TermTag::Alternation,
            TermKind::Concatenation => TermTag::Concatenation,
            TermKind::Repetition(_) => TermTag::Repetition,
            TermKind::Backreference(_) => TermTag::Backreference,
            TermKind::NamedBackreference(_) => TermTag::NamedBackreference,
        }
    }
}

/// One `(index, child)` edge out of a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChildSlot {
    pub index: usize,
    pub term: TermId,
}

#[derive(Debug, Clone)]
pub struct Term {
    kind: TermKind,
    span: Span,
    parent: Option<TermId>,
    child_index: Option<usize>,
    children: Vec<ChildSlot>,
}

impl Term {
    pub fn kind(&self) -> &TermKind {
        &self.kind
    }

    pub fn tag(&self) -> TermTag {
        self.kind.tag()
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn parent(&self) -> Option<TermId> {
        self.parent
    }

    /// Position among the parent's children; `None` for the root.
    pub fn child_index(&self) -> Option<usize> {
        self.child_index
    }

    /// Raw child edges in attachment order.
    pub fn slots(&self) -> &[ChildSlot] {
        &self.children
    }
}

/// A parsed regular expression: the source text and the tree built from it.
///
/// Terms live in an arena and refer to each other by `TermId`, so the upward
/// `parent` link is a plain id lookup. A `Pattern` is never mutated after
/// `TreeBuilder::finish` returns it.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    terms: Vec<Term>,
    root: TermId,
    groups: BTreeMap<u32, TermId>,
    names: BTreeMap<String, Vec<u32>>,
    diagnostics: Vec<Diagnostic>,
}

impl Pattern {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> TermId {
        self.root
    }

    /// # Panics
    ///
    /// If `id` was not issued for this pattern.
    pub fn term(&self, id: TermId) -> &Term {
        &self.terms[id.0]
    }

    pub fn get(&self, id: TermId) -> Option<&Term> {
        self.terms.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = (TermId, &Term)> + '_ {
        self.terms.iter().enumerate().map(|(i, term)| (TermId(i), term))
    }

    /// Source text covered by a term.
    pub fn text(&self, id: TermId) -> &str {
        let span = self.term(id).span;
        &self.source[span.start..span.end]
    }

    pub fn get_child(&self, id: TermId, index: usize) -> Option<TermId> {
        self.term(id)
            .children
            .iter()
            .find(|slot| slot.index == index)
            .map(|slot| slot.term)
    }

    pub fn child_count(&self, id: TermId) -> usize {
        self.term(id).children.len()
    }

    pub fn parent(&self, id: TermId) -> Option<TermId> {
        self.term(id).parent
    }

    pub fn children(&self, id: TermId) -> impl Iterator<Item = TermId> + '_ {
        self.term(id).children.iter().map(|slot| slot.term)
    }

    /// Pre-order walk below `id`, excluding `id` itself.
    ///
    /// Only terminates on acyclic trees; use the consistency checker on
    /// trees that did not come out of the parser.
    pub fn descendants(&self, id: TermId) -> Descendants<'_> {
        let mut stack: Vec<TermId> = self.children(id).collect();
        stack.reverse();
        Descendants {
            pattern: self,
            stack,
        }
    }

    pub fn group(&self, number: u32) -> Option<TermId> {
        self.groups.get(&number).copied()
    }

    /// Capturing groups ordered by number.
    pub fn groups(&self) -> impl Iterator<Item = (u32, TermId)> + '_ {
        self.groups.iter().map(|(number, id)| (*number, *id))
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn group_numbers_named(&self, name: &str) -> &[u32] {
        self.names.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn group_named(&self, name: &str) -> Option<TermId> {
        self.group_numbers_named(name)
            .first()
            .and_then(|number| self.group(*number))
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn tree_view(&self) -> TreeView<'_> {
        TreeView { pattern: self }
    }
}

pub struct Descendants<'p> {
    pattern: &'p Pattern,
    stack: Vec<TermId>,
}

impl Iterator for Descendants<'_> {
    type Item = TermId;

    fn next(&mut self) -> Option<TermId> {
        let id = self.stack.pop()?;
        let start = self.stack.len();
        self.stack.extend(self.pattern.children(id));
        self.stack[start..].reverse();
        Some(id)
    }
}

/// Builds a `Pattern` arena.
///
/// `attach` keeps child indices contiguous; `attach_at` writes a raw edge
/// with no checks at all and exists so builder defects can be reproduced.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    terms: Vec<Term>,
    groups: BTreeMap<u32, TermId>,
    names: BTreeMap<String, Vec<u32>>,
    diagnostics: Vec<Diagnostic>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: TermKind, span: Span) -> TermId {
        let id = TermId(self.terms.len());
        self.terms.push(Term {
            kind,
            span,
            parent: None,
            child_index: None,
            children: Vec::new(),
        });
        id
    }

    /// Appends `child` at the next free index of `parent` and returns that index.
    pub fn attach(&mut self, parent: TermId, child: TermId) -> usize {
        let index = self.terms[parent.0].children.len();
        self.attach_at(parent, index, child);
        index
    }

    pub fn attach_at(&mut self, parent: TermId, index: usize, child: TermId) {
        self.terms[parent.0].children.push(ChildSlot { index, term: child });
        let term = &mut self.terms[child.0];
        term.parent = Some(parent);
        term.child_index = Some(index);
    }

    pub fn kind(&self, id: TermId) -> &TermKind {
        &self.terms[id.0].kind
    }

    pub fn kind_mut(&mut self, id: TermId) -> &mut TermKind {
        &mut self.terms[id.0].kind
    }

    pub fn span(&self, id: TermId) -> Span {
        self.terms[id.0].span
    }

    pub fn terms(&self) -> impl Iterator<Item = TermId> {
        (0..self.terms.len()).map(TermId)
    }

    pub fn declare_group(&mut self, number: u32, term: TermId, name: Option<&str>) {
        self.groups.insert(number, term);
        if let Some(name) = name {
            self.names.entry(name.to_owned()).or_default().push(number);
        }
    }

    pub fn has_group(&self, number: u32) -> bool {
        self.groups.contains_key(&number)
    }

    pub fn group_numbers_named(&self, name: &str) -> &[u32] {
        self.names.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn diagnose(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn finish(self, source: impl Into<String>, root: TermId) -> Pattern {
        Pattern {
            source: source.into(),
            terms: self.terms,
            root,
            groups: self.groups,
            names: self.names,
            diagnostics: self.diagnostics,
        }
    }
}

/// Indented rendering of a pattern's tree, one term per line.
pub struct TreeView<'p> {
    pattern: &'p Pattern,
}

impl TreeView<'_> {
    fn write_term(
        &self,
        f: &mut fmt::Formatter<'_>,
        id: TermId,
        depth: usize,
        seen: &mut HashSet<TermId>,
    ) -> fmt::Result {
        let term = self.pattern.term(id);
        write!(f, "{:indent$}", "", indent = depth * 2)?;
        write_label(f, term.kind())?;
        write!(
            f,
            " {}..{} {:?}",
            term.span.start,
            term.span.end,
            self.pattern.text(id)
        )?;
        if !seen.insert(id) {
            return writeln!(f, " (revisited)");
        }
        writeln!(f)?;
        for child in self.pattern.children(id) {
            self.write_term(f, child, depth + 1, seen)?;
        }
        Ok(())
    }
}

impl fmt::Display for TreeView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut seen = HashSet::new();
        self.write_term(f, self.pattern.root, 0, &mut seen)
    }
}

fn write_label(f: &mut fmt::Formatter<'_>, kind: &TermKind) -> fmt::Result {
    match kind {
        TermKind::Literal(c) => write!(f, "Literal {c:?}"),
        TermKind::CharacterClass(class) => {
            f.write_str("CharacterClass")?;
            if class.negated {
                f.write_str(" negated")?;
            }
            for range in &class.ranges {
                if range.lo == range.hi {
                    write!(f, " {:?}", range.lo)?;
                } else {
                    write!(f, " {:?}-{:?}", range.lo, range.hi)?;
                }
            }
            Ok(())
        }
        TermKind::Anchor(anchor) => write!(f, "Anchor {anchor:?}"),
        TermKind::Dot => f.write_str("Dot"),
        TermKind::Group(group) => {
            f.write_str("Group")?;
            match group.number {
                Some(number) => write!(f, " {number}")?,
                None => f.write_str(" non-capturing")?,
            }
            if let Some(name) = &group.name {
                write!(f, " <{name}>")?;
            }
            Ok(())
        }
        TermKind::Alternation => f.write_str("Alternation"),
        TermKind::Concatenation => f.write_str("Concatenation"),
        TermKind::Repetition(rep) => {
            match rep.max {
                Some(max) => write!(f, "Repetition {{{},{}}}", rep.min, max)?,
                None => write!(f, "Repetition {{{},}}", rep.min)?,
            }
            if !rep.greedy {
                f.write_str(" lazy")?;
            }
            Ok(())
        }
        TermKind::Backreference(back) => {
            write!(f, "Backreference {}", back.number)?;
            if !back.resolved {
                f.write_str(" unresolved")?;
            }
            Ok(())
        }
        TermKind::NamedBackreference(back) => {
            write!(f, "NamedBackreference <{}>", back.name)?;
            if !back.resolved {
                f.write_str(" unresolved")?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Pattern, [TermId; 4]) {
        // "a(b)" as Concatenation[Literal a, Group[Literal b]]
        let mut builder = TreeBuilder::new();
        let a = builder.push(TermKind::Literal('a'), Span::new(0, 1));
        let b = builder.push(TermKind::Literal('b'), Span::new(2, 3));
        let group = builder.push(
            TermKind::Group(Group {
                number: Some(1),
                name: None,
            }),
            Span::new(1, 4),
        );
        builder.attach(group, b);
        builder.declare_group(1, group, None);
        let root = builder.push(TermKind::Concatenation, Span::new(0, 4));
        builder.attach(root, a);
        builder.attach(root, group);
        (builder.finish("a(b)", root), [a, b, group, root])
    }

    #[test]
    fn child_and_parent_lookups_agree() {
        let (pattern, [a, b, group, root]) = sample();

        assert_eq!(pattern.child_count(root), 2);
        assert_eq!(pattern.get_child(root, 0), Some(a));
        assert_eq!(pattern.get_child(root, 1), Some(group));
        assert_eq!(pattern.get_child(root, 2), None);
        assert_eq!(pattern.parent(b), Some(group));
        assert_eq!(pattern.parent(root), None);
        assert_eq!(pattern.term(root).child_index(), None);
        assert_eq!(pattern.term(group).child_index(), Some(1));
        assert_eq!(pattern.group(1), Some(group));
    }

    #[test]
    fn descendants_are_pre_order() {
        let (pattern, [a, b, group, root]) = sample();

        let order: Vec<_> = pattern.descendants(root).collect();
        assert_eq!(order, vec![a, group, b]);
        assert_eq!(pattern.descendants(a).count(), 0);
    }

    #[test]
    fn text_slices_source_by_span() {
        let (pattern, [_, b, group, _]) = sample();

        assert_eq!(pattern.text(group), "(b)");
        assert_eq!(pattern.text(b), "b");
    }

    #[test]
    fn tree_view_renders_every_term() {
        let (pattern, _) = sample();

        let rendered = pattern.tree_view().to_string();
        assert_eq!(
            rendered,
            "Concatenation 0..4 \"a(b)\"\n  Literal 'a' 0..1 \"a\"\n  Group 1 1..4 \"(b)\"\n    Literal 'b' 2..3 \"b\"\n"
        );
    }

    #[test]
    fn tree_view_stops_at_revisited_terms() {
        let mut builder = TreeBuilder::new();
        let outer = builder.push(TermKind::Concatenation, Span::new(0, 0));
        let inner = builder.push(TermKind::Concatenation, Span::new(0, 0));
        builder.attach(outer, inner);
        builder.attach(inner, outer);
        let pattern = builder.finish("", outer);

        let rendered = pattern.tree_view().to_string();
        assert_eq!(rendered.lines().count(), 3);
        assert!(rendered.ends_with("(revisited)\n"));
    }
}
