//! Fact storage and the counting queries the miner issues against it.
//!
//! The miner never touches facts directly: it asks a [`FactIndex`] how many
//! distinct bindings a conjunctive query has. [`KnowledgeBase`] is the
//! in-memory implementation shipped with the crate.

pub mod index;
pub mod loader;
pub mod query;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::rule::atom::{Atom, Position, Var};
use crate::symbol::SymbolId;

pub use index::KnowledgeBase;
pub use loader::{LoadStats, load_tsv, load_tsv_files};

/// A ground fact `relation(subject, object)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fact {
    pub subject: SymbolId,
    pub relation: SymbolId,
    pub object: SymbolId,
}

impl Fact {
    pub fn new(subject: SymbolId, relation: SymbolId, object: SymbolId) -> Self {
        Self {
            subject,
            relation,
            object,
        }
    }

    /// The fact as a `[subject, relation, object]` row.
    pub fn row(&self) -> [SymbolId; 3] {
        [self.subject, self.relation, self.object]
    }
}

/// Read-only query interface consumed by the mining core.
///
/// Implementations must be safe for unsynchronized concurrent reads: every
/// worker thread issues queries against the same index.
pub trait FactIndex: Send + Sync {
    /// Total number of facts.
    fn size(&self) -> usize;

    /// All relations that occur in at least one fact.
    fn relations(&self) -> Vec<SymbolId>;

    /// Number of facts with the given relation.
    fn relation_cardinality(&self, relation: SymbolId) -> usize;

    /// Distinct subjects divided by facts for `relation` (1.0 = functional).
    fn functionality(&self, relation: SymbolId) -> f64;

    /// Distinct objects divided by facts for `relation`.
    fn inverse_functionality(&self, relation: SymbolId) -> f64;

    /// Distinct bindings of `var` satisfying every atom.
    fn count_distinct(&self, var: Var, atoms: &[Atom]) -> usize;

    /// Distinct `(a, b)` binding pairs satisfying every atom.
    fn count_distinct_pairs(&self, a: Var, b: Var, atoms: &[Atom]) -> usize;

    /// For every binding of `target` in `head ∧ body`, the number of distinct
    /// bindings of the head variables (pairs when the head has two).
    fn count_projection_bindings(&self, head: &Atom, body: &[Atom], target: Var) -> BindingCounts;

    /// For every binding of `var`, the number of distinct bindings of
    /// `counting` satisfying every atom.
    fn frequent_bindings_of(&self, var: Var, counting: Var, atoms: &[Atom]) -> BindingCounts;

    /// Locate an expensive `r(z,x) r(z,y)` / `r(y,z) r(x,z)` join.
    fn identify_hard_query_pattern(&self, atoms: &[Atom]) -> Option<HardPattern> {
        identify_hard_pattern(atoms)
    }

    /// ID of a label, if the index knows it.
    fn lookup(&self, label: &str) -> Option<SymbolId>;

    /// Human-readable label of `id`.
    fn resolve_label(&self, id: SymbolId) -> String;
}

// ---------------------------------------------------------------------------
// Binding counts
// ---------------------------------------------------------------------------

/// Per-value counts returned by projection queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingCounts {
    counts: HashMap<SymbolId, usize>,
}

impl BindingCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `by` to the count of `value`.
    pub fn increment(&mut self, value: SymbolId, by: usize) {
        *self.counts.entry(value).or_insert(0) += by;
    }

    pub fn get(&self, value: SymbolId) -> usize {
        self.counts.get(&value).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Entries ordered by count, highest first; ties break on the symbol ID
    /// so enumeration is deterministic.
    pub fn descending(&self) -> Vec<(SymbolId, usize)> {
        let mut entries: Vec<(SymbolId, usize)> =
            self.counts.iter().map(|(&id, &n)| (id, n)).collect();
        entries.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        entries
    }
}

impl FromIterator<(SymbolId, usize)> for BindingCounts {
    fn from_iter<I: IntoIterator<Item = (SymbolId, usize)>>(iter: I) -> Self {
        let mut counts = Self::new();
        for (value, n) in iter {
            counts.increment(value, n);
        }
        counts
    }
}

// ---------------------------------------------------------------------------
// Hard query patterns
// ---------------------------------------------------------------------------

/// Two atoms over the same relation that share exactly one argument
/// variable, e.g. `r(?z, ?x) r(?z, ?y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardPattern {
    /// Position of the shared variable in both atoms.
    pub shared: Position,
    /// Position of the unshared variable in both atoms.
    pub free: Position,
    /// Index of the first atom of the pair.
    pub first: usize,
    /// Index of the second atom of the pair.
    pub second: usize,
}

/// Find the first pair of atoms forming a hard pattern.
///
/// Both atoms must have the same concrete relation and two variable
/// arguments, and agree on exactly one of subject/object. Pairs that do not
/// match are skipped; the scan continues with the next pair.
pub fn identify_hard_pattern(atoms: &[Atom]) -> Option<HardPattern> {
    for (i, a) in atoms.iter().enumerate() {
        let Some(relation) = a.relation_id() else {
            continue;
        };
        if a.variable_count() != 2 {
            continue;
        }
        for (j, b) in atoms.iter().enumerate().skip(i + 1) {
            if b.relation_id() != Some(relation) || b.variable_count() != 2 {
                continue;
            }
            let same_subject = a.subject == b.subject;
            let same_object = a.object == b.object;
            let (shared, free) = match (same_subject, same_object) {
                (true, false) => (Position::Subject, Position::Object),
                (false, true) => (Position::Object, Position::Subject),
                _ => continue,
            };
            return Some(HardPattern {
                shared,
                free,
                first: i,
                second: j,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(id: u64) -> SymbolId {
        SymbolId::new(id).unwrap()
    }

    #[test]
    fn descending_orders_by_count_then_id() {
        let counts: BindingCounts = [(sym(3), 5), (sym(1), 7), (sym(2), 5)].into_iter().collect();
        assert_eq!(
            counts.descending(),
            vec![(sym(1), 7), (sym(2), 5), (sym(3), 5)]
        );
        assert_eq!(counts.get(sym(9)), 0);
    }

    #[test]
    fn hard_pattern_shared_subject() {
        let r = sym(10);
        let atoms = [
            Atom::new(Var(0), sym(11), Var(1)),
            Atom::new(Var(2), r, Var(0)),
            Atom::new(Var(2), r, Var(1)),
        ];
        let hp = identify_hard_pattern(&atoms).unwrap();
        assert_eq!(hp.shared, Position::Subject);
        assert_eq!(hp.free, Position::Object);
        assert_eq!((hp.first, hp.second), (1, 2));
    }

    #[test]
    fn hard_pattern_shared_object() {
        let r = sym(10);
        let atoms = [Atom::new(Var(1), r, Var(2)), Atom::new(Var(0), r, Var(2))];
        let hp = identify_hard_pattern(&atoms).unwrap();
        assert_eq!(hp.shared, Position::Object);
        assert_eq!(hp.free, Position::Subject);
    }

    #[test]
    fn hard_pattern_skips_non_matching_pairs() {
        let r = sym(10);
        let atoms = [
            Atom::new(Var(0), r, Var(1)),
            // identical atom: shares both positions
            Atom::new(Var(0), r, Var(1)),
            Atom::new(Var(0), r, Var(3)),
        ];
        let hp = identify_hard_pattern(&atoms).unwrap();
        assert_eq!((hp.first, hp.second), (0, 2));
    }

    #[test]
    fn no_hard_pattern_with_constants_or_distinct_relations() {
        let atoms = [
            Atom::new(Var(0), sym(10), sym(4)),
            Atom::new(Var(0), sym(10), Var(1)),
            Atom::new(Var(0), sym(12), Var(2)),
        ];
        assert!(identify_hard_pattern(&atoms).is_none());
    }
}
