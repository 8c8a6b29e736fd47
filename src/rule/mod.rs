//! Horn rules: a head atom implied by a conjunction of body atoms.
//!
//! A [`Rule`] is created by a refinement operator from its parent, gets its
//! confidence metrics attached once by the acceptance test, and is shared
//! immutably (`Arc<Rule>`) from then on.

pub mod atom;
pub mod canonical;

use std::sync::Arc;

use crate::kb::FactIndex;
use crate::symbol::SymbolId;

use self::atom::{Atom, Position, Term, Var};
use self::canonical::CanonicalRule;

/// A candidate or accepted rule.
///
/// `atoms[0]` is the head; the remaining atoms are the body.
#[derive(Clone)]
pub struct Rule {
    atoms: Vec<Atom>,
    functional: Position,
    support: usize,
    head_coverage: f64,
    std_body_size: Option<usize>,
    pca_body_size: Option<usize>,
    parent: Option<Arc<Rule>>,
}

impl Rule {
    /// A single-atom rule with no body.
    pub fn seed(head: Atom, functional: Position, support: usize) -> Self {
        Self::from_atoms(vec![head], functional, support)
    }

    /// A rule from explicit atoms (`atoms[0]` is the head), without lineage.
    pub fn from_atoms(atoms: Vec<Atom>, functional: Position, support: usize) -> Self {
        Self {
            atoms,
            functional,
            support,
            head_coverage: 0.0,
            std_body_size: None,
            pca_body_size: None,
            parent: None,
        }
    }

    /// Child of `parent` with `atom` appended and a freshly counted support.
    pub fn extend(parent: &Arc<Rule>, atom: Atom, support: usize) -> Self {
        let mut atoms = parent.atoms.clone();
        atoms.push(atom);
        Self {
            atoms,
            functional: parent.functional,
            support,
            head_coverage: 0.0,
            std_body_size: None,
            pca_body_size: None,
            parent: Some(Arc::clone(parent)),
        }
    }

    /// Copy of this rule with the term at `position` of atom `index` bound
    /// to `constant` everywhere that variable occurs.
    pub fn instantiate(&self, index: usize, position: Position, constant: SymbolId, support: usize) -> Self {
        let mut child = self.clone();
        if let Some(var) = self.atoms.get(index).and_then(|a| a.get(position).as_var()) {
            for atom in &mut child.atoms {
                *atom = atom.substitute(var, Term::Const(constant));
            }
        }
        child.support = support;
        child.head_coverage = 0.0;
        child.std_body_size = None;
        child.pca_body_size = None;
        child
    }

    // -----------------------------------------------------------------------
    // Shape
    // -----------------------------------------------------------------------

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn head(&self) -> &Atom {
        &self.atoms[0]
    }

    pub fn body(&self) -> &[Atom] {
        &self.atoms[1..]
    }

    pub fn last(&self) -> &Atom {
        &self.atoms[self.atoms.len() - 1]
    }

    /// Number of atoms including the head.
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// `true` for seed rules (head only).
    pub fn is_empty_body(&self) -> bool {
        self.atoms.len() < 2
    }

    pub fn head_relation(&self) -> Option<SymbolId> {
        self.head().relation_id()
    }

    pub fn parent(&self) -> Option<&Arc<Rule>> {
        self.parent.as_ref()
    }

    /// Parent, grandparent, ... up to the seed.
    pub fn ancestors(&self) -> impl Iterator<Item = &Rule> {
        std::iter::successors(self.parent.as_deref(), |r| r.parent.as_deref())
    }

    /// Position of the head term support is counted on.
    pub fn functional_position(&self) -> Position {
        self.functional
    }

    pub fn functional_variable(&self) -> Option<Var> {
        self.head().get(self.functional).as_var()
    }

    /// The other head argument, if it is a variable.
    pub fn non_functional_variable(&self) -> Option<Var> {
        self.head().get(self.functional.other()).as_var()
    }

    /// Argument variables in order of first appearance.
    pub fn variables(&self) -> Vec<Var> {
        let mut vars = Vec::new();
        for atom in &self.atoms {
            for v in atom.argument_vars() {
                if !vars.contains(&v) {
                    vars.push(v);
                }
            }
        }
        vars
    }

    /// Argument variables that occur exactly once in the whole rule.
    pub fn open_variables(&self) -> Vec<Var> {
        self.variables()
            .into_iter()
            .filter(|&v| self.occurrences(v) == 1)
            .collect()
    }

    /// Every variable occurs at least twice.
    pub fn is_closed(&self) -> bool {
        self.variables().into_iter().all(|v| self.occurrences(v) >= 2)
    }

    fn occurrences(&self, var: Var) -> usize {
        self.atoms
            .iter()
            .flat_map(|a| [a.subject, a.object])
            .filter(|t| *t == Term::Var(var))
            .count()
    }

    /// Number of atoms with the given relation.
    pub fn relation_multiplicity(&self, relation: SymbolId) -> usize {
        self.atoms
            .iter()
            .filter(|a| a.relation_id() == Some(relation))
            .count()
    }

    /// A variable not used anywhere in the rule.
    pub fn fresh_var(&self) -> Var {
        let max = self
            .atoms
            .iter()
            .flat_map(|a| a.terms())
            .filter_map(Term::as_var)
            .map(|v| v.0)
            .max();
        Var(max.map_or(0, |m| m + 1))
    }

    /// Atoms other than the last one that could denote the same fact as it.
    pub fn redundant_atoms(&self) -> Vec<Atom> {
        let last = *self.last();
        self.atoms[..self.atoms.len() - 1]
            .iter()
            .filter(|a| a.unifiable(&last))
            .copied()
            .collect()
    }

    /// The last atom repeats an earlier atom verbatim.
    pub fn is_redundant_recursive(&self) -> bool {
        let last = self.last();
        self.atoms[..self.atoms.len() - 1].contains(last)
    }

    /// The variable at `position` of atom `index` occurs nowhere else in the
    /// rule, so dropping that atom cannot constrain any other binding.
    pub fn variable_can_be_deleted(&self, index: usize, position: Position) -> bool {
        let Some(var) = self.atoms.get(index).and_then(|a| a.get(position).as_var()) else {
            return false;
        };
        self.atoms
            .iter()
            .flat_map(|a| a.terms())
            .filter(|t| *t == Term::Var(var))
            .count()
            == 1
    }

    // -----------------------------------------------------------------------
    // Metrics
    // -----------------------------------------------------------------------

    /// Distinct head bindings satisfying the whole rule.
    pub fn support(&self) -> usize {
        self.support
    }

    pub fn head_coverage(&self) -> f64 {
        self.head_coverage
    }

    pub fn set_head_coverage(&mut self, head_coverage: f64) {
        self.head_coverage = head_coverage;
    }

    pub fn std_body_size(&self) -> Option<usize> {
        self.std_body_size
    }

    pub fn set_std_body_size(&mut self, size: usize) {
        self.std_body_size = Some(size);
    }

    pub fn pca_body_size(&self) -> Option<usize> {
        self.pca_body_size
    }

    pub fn set_pca_body_size(&mut self, size: usize) {
        self.pca_body_size = Some(size);
    }

    pub fn std_confidence(&self) -> f64 {
        ratio(self.support, self.std_body_size)
    }

    pub fn pca_confidence(&self) -> f64 {
        ratio(self.support, self.pca_body_size)
    }

    // -----------------------------------------------------------------------
    // Identity and display
    // -----------------------------------------------------------------------

    pub fn canonical_key(&self) -> CanonicalRule {
        CanonicalRule::new(self.head(), self.body())
    }

    pub fn structural_hash(&self) -> u64 {
        self.canonical_key().structural_hash()
    }

    /// AMIE-style rendering: `?a  r  ?b  ?b  s  ?c   => ?a  t  ?c`.
    pub fn display(&self, index: &dyn FactIndex) -> String {
        let atom = |a: &Atom| {
            a.terms()
                .iter()
                .map(|t| match t {
                    Term::Var(v) => v.to_string(),
                    Term::Const(c) => index.resolve_label(*c),
                })
                .collect::<Vec<_>>()
                .join("  ")
        };
        let body: Vec<String> = self.body().iter().map(&atom).collect();
        format!("{}   => {}", body.join("  "), atom(self.head()))
    }
}

fn ratio(support: usize, body: Option<usize>) -> f64 {
    match body {
        Some(size) if size > 0 => support as f64 / size as f64,
        _ => 0.0,
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("atoms", &self.atoms)
            .field("support", &self.support)
            .field("head_coverage", &self.head_coverage)
            .field("std_body_size", &self.std_body_size)
            .field("pca_body_size", &self.pca_body_size)
            .finish()
    }
}
