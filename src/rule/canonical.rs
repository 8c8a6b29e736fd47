//! Structural identity of rules.
//!
//! Two rules are the same rule when they have the same head and the same
//! body up to atom order and variable names. [`CanonicalRule`] is the
//! normal form: the head comes first, and the body atoms are permuted into
//! the lexicographically smallest sequence after renaming variables in order
//! of first appearance.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use super::atom::{Atom, Term, Var};

/// Normal form of a rule's atoms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalRule {
    atoms: Vec<Atom>,
}

impl CanonicalRule {
    /// Compute the normal form of `head ⇐ body`.
    pub fn new(head: &Atom, body: &[Atom]) -> Self {
        let mut renaming = Renaming::default();
        let mut atoms = Vec::with_capacity(body.len() + 1);
        atoms.push(renaming.apply(head));
        atoms.extend(smallest_order(&renaming, body));
        Self { atoms }
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// 64-bit hash of the normal form.
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Debug, Clone, Default)]
struct Renaming {
    map: HashMap<Var, Var>,
}

impl Renaming {
    fn term(&mut self, term: Term) -> Term {
        match term {
            Term::Const(_) => term,
            Term::Var(v) => {
                let next = Var(self.map.len() as u32);
                Term::Var(*self.map.entry(v).or_insert(next))
            }
        }
    }

    fn apply(&mut self, atom: &Atom) -> Atom {
        let subject = self.term(atom.subject);
        let relation = self.term(atom.relation);
        let object = self.term(atom.object);
        Atom {
            subject,
            relation,
            object,
        }
    }
}

/// Lexicographically smallest renamed sequence over all orders of `atoms`.
///
/// At each step only the atoms whose renamed form is minimal can start the
/// best suffix, so the search branches on ties only.
fn smallest_order(renaming: &Renaming, atoms: &[Atom]) -> Vec<Atom> {
    if atoms.is_empty() {
        return Vec::new();
    }

    let renamed: Vec<(Atom, Renaming)> = atoms
        .iter()
        .map(|atom| {
            let mut extended = renaming.clone();
            let form = extended.apply(atom);
            (form, extended)
        })
        .collect();
    let Some(min) = renamed.iter().map(|(form, _)| *form).min() else {
        return Vec::new();
    };

    let mut best: Option<Vec<Atom>> = None;
    for (i, (form, extended)) in renamed.iter().enumerate() {
        if *form != min {
            continue;
        }
        let rest: Vec<Atom> = atoms
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(_, a)| *a)
            .collect();
        let mut candidate = Vec::with_capacity(atoms.len());
        candidate.push(min);
        candidate.extend(smallest_order(extended, &rest));
        if best.as_ref().is_none_or(|b| candidate < *b) {
            best = Some(candidate);
        }
    }
    best.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolId;

    fn sym(id: u64) -> SymbolId {
        SymbolId::new(id).unwrap()
    }

    #[test]
    fn body_order_does_not_matter() {
        let head = Atom::new(Var(0), sym(1), Var(1));
        let b1 = Atom::new(Var(0), sym(2), Var(2));
        let b2 = Atom::new(Var(2), sym(3), Var(1));
        let a = CanonicalRule::new(&head, &[b1, b2]);
        let b = CanonicalRule::new(&head, &[b2, b1]);
        assert_eq!(a, b);
        assert_eq!(a.structural_hash(), b.structural_hash());
    }

    #[test]
    fn variable_names_do_not_matter() {
        let a = CanonicalRule::new(
            &Atom::new(Var(0), sym(1), Var(1)),
            &[Atom::new(Var(0), sym(2), Var(5)), Atom::new(Var(5), sym(3), Var(1))],
        );
        let b = CanonicalRule::new(
            &Atom::new(Var(7), sym(1), Var(3)),
            &[Atom::new(Var(9), sym(3), Var(3)), Atom::new(Var(7), sym(2), Var(9))],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn head_is_not_interchangeable_with_body() {
        let x = Atom::new(Var(0), sym(1), Var(1));
        let y = Atom::new(Var(0), sym(2), Var(1));
        assert_ne!(CanonicalRule::new(&x, &[y]), CanonicalRule::new(&y, &[x]));
    }

    #[test]
    fn different_join_structure_differs() {
        let head = Atom::new(Var(0), sym(1), Var(1));
        let forward = CanonicalRule::new(&head, &[Atom::new(Var(0), sym(2), Var(1))]);
        let inverse = CanonicalRule::new(&head, &[Atom::new(Var(1), sym(2), Var(0))]);
        assert_ne!(forward, inverse);
    }

    #[test]
    fn ties_are_resolved_by_the_rest_of_the_body() {
        // Both r2 atoms rename identically at first; only the suffix decides.
        let head = Atom::new(Var(0), sym(1), Var(1));
        let body = [
            Atom::new(Var(0), sym(2), Var(2)),
            Atom::new(Var(0), sym(2), Var(3)),
            Atom::new(Var(3), sym(3), Var(1)),
        ];
        let mut reordered = body;
        reordered.swap(0, 1);
        assert_eq!(
            CanonicalRule::new(&head, &body),
            CanonicalRule::new(&head, &reordered)
        );
    }
}
