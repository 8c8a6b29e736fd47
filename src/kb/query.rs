//! Conjunctive query evaluation over a [`KnowledgeBase`].
//!
//! Queries are lists of atoms joined on shared variables. Evaluation is a
//! backtracking join: pick the most selective remaining atom, enumerate its
//! matching facts, substitute the induced bindings into the other atoms and
//! recurse. Projections stop enumerating as soon as every projected variable
//! is bound and only check that the rest of the query has a solution.

use std::collections::HashSet;

use crate::rule::atom::{Atom, Term, Var};
use crate::symbol::SymbolId;

use super::{BindingCounts, Fact};
use super::index::KnowledgeBase;

/// Stateless query evaluator borrowing a knowledge base.
pub struct Evaluator<'a> {
    kb: &'a KnowledgeBase,
}

impl<'a> Evaluator<'a> {
    pub fn new(kb: &'a KnowledgeBase) -> Self {
        Self { kb }
    }

    /// Whether the conjunction has at least one solution.
    pub fn exists(&self, atoms: &[Atom]) -> bool {
        match self.bind(atoms, &[]) {
            Some(atoms) => self.exists_bound(&atoms),
            None => false,
        }
    }

    /// Distinct tuples of bindings for `projection` over all solutions.
    pub fn select_distinct(&self, projection: &[Var], atoms: &[Atom]) -> HashSet<Vec<SymbolId>> {
        let mut out = HashSet::new();
        if let Some(atoms) = self.bind(atoms, &[]) {
            let mut bindings = Vec::new();
            self.project(projection, atoms, &mut bindings, &mut out);
        }
        out
    }

    /// Group the distinct projection tuples by their first column and count
    /// the tuples in each group.
    pub fn group_count(&self, projection: &[Var], atoms: &[Atom]) -> BindingCounts {
        self.select_distinct(projection, atoms)
            .into_iter()
            .filter_map(|tuple| tuple.first().map(|&value| (value, 1)))
            .collect()
    }

    fn exists_bound(&self, atoms: &[Atom]) -> bool {
        let Some(idx) = self.most_selective(atoms, |_| true) else {
            return true;
        };
        let atom = atoms[idx];
        let rest = without(atoms, idx);
        self.kb.matching(&atom).into_iter().any(|row| {
            atom.unify(row)
                .and_then(|new| self.bind(&rest, &new))
                .is_some_and(|next| self.exists_bound(&next))
        })
    }

    fn project(
        &self,
        projection: &[Var],
        atoms: Vec<Atom>,
        bindings: &mut Vec<(Var, SymbolId)>,
        out: &mut HashSet<Vec<SymbolId>>,
    ) {
        let pending: Vec<Var> = projection
            .iter()
            .copied()
            .filter(|v| lookup(bindings, *v).is_none())
            .collect();

        if pending.is_empty() {
            let key: Vec<SymbolId> = projection
                .iter()
                .filter_map(|v| lookup(bindings, *v))
                .collect();
            if !out.contains(&key) && self.exists_bound(&atoms) {
                out.insert(key);
            }
            return;
        }

        // A projected variable that no atom mentions has no bindings.
        let Some(idx) = self.most_selective(&atoms, |a| pending.iter().any(|v| a.contains_var(*v)))
        else {
            return;
        };
        let atom = atoms[idx];
        let rest = without(&atoms, idx);
        for row in self.kb.matching(&atom) {
            let Some(new) = atom.unify(row) else {
                continue;
            };
            let Some(next) = self.bind(&rest, &new) else {
                continue;
            };
            let mark = bindings.len();
            bindings.extend(new);
            self.project(projection, next, bindings, out);
            bindings.truncate(mark);
        }
    }

    /// Apply `new` bindings to `atoms`, dropping atoms that became ground and
    /// hold. Returns `None` if a ground atom is not a stored fact.
    fn bind(&self, atoms: &[Atom], new: &[(Var, SymbolId)]) -> Option<Vec<Atom>> {
        let mut next = Vec::with_capacity(atoms.len());
        for atom in atoms {
            let bound = new
                .iter()
                .fold(*atom, |a, &(var, value)| a.substitute(var, Term::Const(value)));
            match ground(&bound) {
                Some(fact) if self.kb.contains(&fact) => {}
                Some(_) => return None,
                None => next.push(bound),
            }
        }
        Some(next)
    }

    fn most_selective(&self, atoms: &[Atom], eligible: impl Fn(&Atom) -> bool) -> Option<usize> {
        atoms
            .iter()
            .enumerate()
            .filter(|&(_, a)| eligible(a))
            .min_by_key(|&(_, a)| self.kb.estimate(a))
            .map(|(i, _)| i)
    }
}

fn lookup(bindings: &[(Var, SymbolId)], var: Var) -> Option<SymbolId> {
    bindings.iter().find(|(v, _)| *v == var).map(|(_, value)| *value)
}

fn without(atoms: &[Atom], idx: usize) -> Vec<Atom> {
    atoms
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != idx)
        .map(|(_, a)| *a)
        .collect()
}

fn ground(atom: &Atom) -> Option<Fact> {
    Some(Fact::new(
        atom.subject.as_const()?,
        atom.relation.as_const()?,
        atom.object.as_const()?,
    ))
}
