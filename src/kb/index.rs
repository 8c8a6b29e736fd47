//! In-memory fact store with triple indexing.
//!
//! Every fact is indexed three ways (subject → relation → objects,
//! relation → object → subjects, object → subject → relations) in `DashMap`s
//! so that any pattern with at least one bound position is answered without a
//! full scan, and loaders can insert from several threads through `&self`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::error::KbResult;
use crate::rule::atom::{Atom, Var};
use crate::symbol::{SymbolId, SymbolTable};

use super::query::Evaluator;
use super::{BindingCounts, Fact, FactIndex};

type Nested = DashMap<SymbolId, HashMap<SymbolId, HashSet<SymbolId>>>;

/// In-memory knowledge base implementing [`FactIndex`].
pub struct KnowledgeBase {
    symbols: SymbolTable,
    /// subject → relation → objects.
    spo: Nested,
    /// relation → object → subjects.
    pos: Nested,
    /// object → subject → relations.
    osp: Nested,
    /// Facts per relation.
    relation_sizes: DashMap<SymbolId, usize>,
    /// Total fact count.
    fact_count: AtomicUsize,
}

impl KnowledgeBase {
    /// Create an empty knowledge base.
    pub fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
            spo: DashMap::new(),
            pos: DashMap::new(),
            osp: DashMap::new(),
            relation_sizes: DashMap::new(),
            fact_count: AtomicUsize::new(0),
        }
    }

    /// The label table shared by entities and relations.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Intern the labels and insert the fact. Returns `true` if it was new.
    pub fn add_fact(&self, subject: &str, relation: &str, object: &str) -> KbResult<bool> {
        let fact = Fact::new(
            self.symbols.intern(subject)?,
            self.symbols.intern(relation)?,
            self.symbols.intern(object)?,
        );
        Ok(self.insert_fact(fact))
    }

    /// Insert an already interned fact. Returns `true` if it was new.
    pub fn insert_fact(&self, fact: Fact) -> bool {
        let Fact {
            subject,
            relation,
            object,
        } = fact;
        // The subject index decides novelty; the others follow it.
        let fresh = self
            .spo
            .entry(subject)
            .or_default()
            .entry(relation)
            .or_default()
            .insert(object);
        if !fresh {
            return false;
        }
        self.pos
            .entry(relation)
            .or_default()
            .entry(object)
            .or_default()
            .insert(subject);
        self.osp
            .entry(object)
            .or_default()
            .entry(subject)
            .or_default()
            .insert(relation);
        *self.relation_sizes.entry(relation).or_insert(0) += 1;
        self.fact_count.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Whether the exact fact is stored.
    pub fn contains(&self, fact: &Fact) -> bool {
        self.spo
            .get(&fact.subject)
            .and_then(|by_rel| by_rel.get(&fact.relation).map(|objs| objs.contains(&fact.object)))
            .unwrap_or(false)
    }

    /// All stored facts matching the constants of `atom`.
    ///
    /// Variables are not checked for consistency here; callers unify each
    /// row against the atom.
    pub fn matching(&self, atom: &Atom) -> Vec<[SymbolId; 3]> {
        let s = atom.subject.as_const();
        let r = atom.relation.as_const();
        let o = atom.object.as_const();
        let mut rows = Vec::new();
        match (s, r, o) {
            (Some(s), Some(r), Some(o)) => {
                let fact = Fact::new(s, r, o);
                if self.contains(&fact) {
                    rows.push(fact.row());
                }
            }
            (Some(s), Some(r), None) => {
                if let Some(by_rel) = self.spo.get(&s) {
                    if let Some(objects) = by_rel.get(&r) {
                        rows.extend(objects.iter().map(|&o| [s, r, o]));
                    }
                }
            }
            (Some(s), None, Some(o)) => {
                if let Some(by_subj) = self.osp.get(&o) {
                    if let Some(relations) = by_subj.get(&s) {
                        rows.extend(relations.iter().map(|&r| [s, r, o]));
                    }
                }
            }
            (None, Some(r), Some(o)) => {
                if let Some(by_obj) = self.pos.get(&r) {
                    if let Some(subjects) = by_obj.get(&o) {
                        rows.extend(subjects.iter().map(|&s| [s, r, o]));
                    }
                }
            }
            (Some(s), None, None) => {
                if let Some(by_rel) = self.spo.get(&s) {
                    for (&r, objects) in by_rel.iter() {
                        rows.extend(objects.iter().map(|&o| [s, r, o]));
                    }
                }
            }
            (None, Some(r), None) => {
                if let Some(by_obj) = self.pos.get(&r) {
                    for (&o, subjects) in by_obj.iter() {
                        rows.extend(subjects.iter().map(|&s| [s, r, o]));
                    }
                }
            }
            (None, None, Some(o)) => {
                if let Some(by_subj) = self.osp.get(&o) {
                    for (&s, relations) in by_subj.iter() {
                        rows.extend(relations.iter().map(|&r| [s, r, o]));
                    }
                }
            }
            (None, None, None) => {
                for entry in self.spo.iter() {
                    let s = *entry.key();
                    for (&r, objects) in entry.value().iter() {
                        rows.extend(objects.iter().map(|&o| [s, r, o]));
                    }
                }
            }
        }
        rows
    }

    /// Upper bound on the number of rows [`matching`](Self::matching) returns.
    pub fn estimate(&self, atom: &Atom) -> usize {
        let s = atom.subject.as_const();
        let r = atom.relation.as_const();
        let o = atom.object.as_const();
        let nested_len = |map: &Nested, outer: SymbolId, inner: SymbolId| {
            map.get(&outer)
                .and_then(|m| m.get(&inner).map(HashSet::len))
                .unwrap_or(0)
        };
        let outer_len = |map: &Nested, outer: SymbolId| {
            map.get(&outer)
                .map(|m| m.values().map(HashSet::len).sum::<usize>())
                .unwrap_or(0)
        };
        match (s, r, o) {
            (Some(_), Some(_), Some(_)) => 1,
            (Some(s), Some(r), None) => nested_len(&self.spo, s, r),
            (Some(s), None, Some(o)) => nested_len(&self.osp, o, s),
            (None, Some(r), Some(o)) => nested_len(&self.pos, r, o),
            (Some(s), None, None) => outer_len(&self.spo, s),
            (None, Some(r), None) => self.relation_cardinality(r),
            (None, None, Some(o)) => outer_len(&self.osp, o),
            (None, None, None) => self.size(),
        }
    }

    fn distinct_in_relation(&self, relation: SymbolId, subjects: bool) -> usize {
        let Some(by_obj) = self.pos.get(&relation) else {
            return 0;
        };
        if !subjects {
            return by_obj.len();
        }
        let distinct: HashSet<SymbolId> = by_obj.values().flatten().copied().collect();
        distinct.len()
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl FactIndex for KnowledgeBase {
    fn size(&self) -> usize {
        self.fact_count.load(Ordering::Relaxed)
    }

    fn relations(&self) -> Vec<SymbolId> {
        let mut relations: Vec<SymbolId> = self.relation_sizes.iter().map(|e| *e.key()).collect();
        relations.sort_unstable();
        relations
    }

    fn relation_cardinality(&self, relation: SymbolId) -> usize {
        self.relation_sizes.get(&relation).map(|n| *n).unwrap_or(0)
    }

    fn functionality(&self, relation: SymbolId) -> f64 {
        let facts = self.relation_cardinality(relation);
        if facts == 0 {
            return 0.0;
        }
        self.distinct_in_relation(relation, true) as f64 / facts as f64
    }

    fn inverse_functionality(&self, relation: SymbolId) -> f64 {
        let facts = self.relation_cardinality(relation);
        if facts == 0 {
            return 0.0;
        }
        self.distinct_in_relation(relation, false) as f64 / facts as f64
    }

    fn count_distinct(&self, var: Var, atoms: &[Atom]) -> usize {
        Evaluator::new(self).select_distinct(&[var], atoms).len()
    }

    fn count_distinct_pairs(&self, a: Var, b: Var, atoms: &[Atom]) -> usize {
        Evaluator::new(self).select_distinct(&[a, b], atoms).len()
    }

    fn count_projection_bindings(&self, head: &Atom, body: &[Atom], target: Var) -> BindingCounts {
        let mut projection = vec![target];
        projection.extend(head.argument_vars().into_iter().filter(|v| *v != target));
        let mut atoms = Vec::with_capacity(body.len() + 1);
        atoms.push(*head);
        atoms.extend_from_slice(body);
        Evaluator::new(self).group_count(&projection, &atoms)
    }

    fn frequent_bindings_of(&self, var: Var, counting: Var, atoms: &[Atom]) -> BindingCounts {
        let projection: Vec<Var> = if var == counting {
            vec![var]
        } else {
            vec![var, counting]
        };
        Evaluator::new(self).group_count(&projection, atoms)
    }

    fn lookup(&self, label: &str) -> Option<SymbolId> {
        self.symbols.lookup(label)
    }

    fn resolve_label(&self, id: SymbolId) -> String {
        self.symbols.resolve_label(id)
    }
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("facts", &self.size())
            .field("relations", &self.relation_sizes.len())
            .field("symbols", &self.symbols.len())
            .finish()
    }
}
