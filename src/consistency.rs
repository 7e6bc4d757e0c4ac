//! Structural checks over built pattern trees.
//!
//! These catch defects in whatever built the tree, not mistakes in the
//! regular expression itself. Every check only reads the `Pattern`.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use tracing::{debug, trace};

use crate::ast::{Pattern, TermId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ViolationKind {
    NonUniqueChild,
    Cyclic,
    NonConsecutive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind")]
pub enum Violation {
    /// More than one distinct term is registered at `parent`'s slot `index`;
    /// `child` is the first one that conflicts with the slot's earlier occupant.
    NonUniqueChild {
        parent: TermId,
        index: usize,
        child: TermId,
    },
    /// `term` is its own descendant.
    Cyclic { term: TermId },
    /// `parent` has a child at `index` but none at `index - 1`.
    NonConsecutive { parent: TermId, index: usize },
}

impl Violation {
    pub fn kind(&self) -> ViolationKind {
        match self {
            Violation::NonUniqueChild { .. } => ViolationKind::NonUniqueChild,
            Violation::Cyclic { .. } => ViolationKind::Cyclic,
            Violation::NonConsecutive { .. } => ViolationKind::NonConsecutive,
        }
    }

    /// The parent the violation is about; for a cycle, the cyclic term itself.
    pub fn parent(&self) -> TermId {
        match *self {
            Violation::NonUniqueChild { parent, .. } | Violation::NonConsecutive { parent, .. } => {
                parent
            }
            Violation::Cyclic { term } => term,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match *self {
            Violation::NonUniqueChild { index, .. } | Violation::NonConsecutive { index, .. } => {
                Some(index)
            }
            Violation::Cyclic { .. } => None,
        }
    }

    pub fn child(&self) -> Option<TermId> {
        match *self {
            Violation::NonUniqueChild { child, .. } => Some(child),
            Violation::Cyclic { term } => Some(term),
            Violation::NonConsecutive { .. } => None,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NonUniqueChild {
                parent,
                index,
                child,
            } => write!(
                f,
                "{parent} has more than one child at index {index} ({child} conflicts)"
            ),
            Violation::Cyclic { term } => write!(f, "{term} is its own descendant"),
            Violation::NonConsecutive { parent, index } => {
                let missing = index.saturating_sub(1);
                write!(f, "{parent} has a child at index {index} but none at {missing}")
            }
        }
    }
}

/// A violation together with the position of its pattern in the checked batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PatternViolation {
    pub pattern: usize,
    pub violation: Violation,
}

pub fn non_unique_children(pattern: &Pattern) -> impl Iterator<Item = Violation> + '_ {
    pattern.terms().flat_map(|(parent, term)| {
        let mut by_index: BTreeMap<usize, Vec<TermId>> = BTreeMap::new();
        for slot in term.slots() {
            let occupants = by_index.entry(slot.index).or_default();
            if !occupants.contains(&slot.term) {
                occupants.push(slot.term);
            }
        }
        by_index.into_iter().filter_map(move |(index, occupants)| {
            occupants.get(1).map(|&child| Violation::NonUniqueChild {
                parent,
                index,
                child,
            })
        })
    })
}

pub fn cyclic_terms(pattern: &Pattern) -> impl Iterator<Item = Violation> + '_ {
    pattern
        .terms()
        .filter(move |(id, _)| reaches_itself(pattern, *id))
        .map(|(term, _)| Violation::Cyclic { term })
}

pub fn non_consecutive_indices(pattern: &Pattern) -> impl Iterator<Item = Violation> + '_ {
    pattern.terms().flat_map(|(parent, term)| {
        let indices: BTreeSet<usize> = term.slots().iter().map(|slot| slot.index).collect();
        indices
            .iter()
            .filter(|&&index| index > 0 && !indices.contains(&(index - 1)))
            .map(|&index| Violation::NonConsecutive { parent, index })
            .collect::<Vec<_>>()
    })
}

/// All three checks over one pattern.
pub fn check_pattern(pattern: &Pattern) -> impl Iterator<Item = Violation> + '_ {
    non_unique_children(pattern)
        .chain(cyclic_terms(pattern))
        .chain(non_consecutive_indices(pattern))
}

/// Runs every check over every pattern; an empty result means all trees are well formed.
pub fn check_consistency<'p, I>(patterns: I) -> Vec<PatternViolation>
where
    I: IntoIterator<Item = &'p Pattern>,
{
    let mut report = Vec::new();
    for (index, pattern) in patterns.into_iter().enumerate() {
        let before = report.len();
        report.extend(check_pattern(pattern).map(|violation| {
            trace!(pattern = index, %violation, "consistency violation");
            PatternViolation {
                pattern: index,
                violation,
            }
        }));
        debug!(
            pattern = index,
            terms = pattern.len(),
            violations = report.len() - before,
            "checked pattern tree"
        );
    }
    report
}

/// Depth-first search from `start`'s children with a visited set, so it
/// terminates on any graph.
fn reaches_itself(pattern: &Pattern, start: TermId) -> bool {
    let mut visited = HashSet::new();
    let mut stack: Vec<TermId> = pattern.children(start).collect();
    while let Some(id) = stack.pop() {
        if id == start {
            return true;
        }
        if visited.insert(id) {
            stack.extend(pattern.children(id));
        }
    }
    false
}
