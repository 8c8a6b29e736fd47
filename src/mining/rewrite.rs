//! Hard query patterns and their rewrite.
//!
//! A pair `r(z, x) r(z, w)` joins every `x` of a `z` with every `w` of the
//! same `z`, which blows up the intermediate results of a count. When `w`
//! occurs nowhere else, `r(z, w)` is implied by `r(z, x)` and the atom can be
//! dropped without changing any count over the remaining variables.

use crate::kb::{FactIndex, HardPattern};
use crate::rule::Rule;
use crate::rule::atom::{Atom, Position, Var};

/// Equivalent cheaper query for `atoms`, or `None` when the atoms contain no
/// hard pattern or none of its atoms can be removed safely.
///
/// `join` is the rule variable the newest atom was attached to; the atom of
/// the pair that does not mention it is the preferred victim. The head
/// (index 0) is never removed, nor is an atom whose removed variable is in
/// `protected`.
pub fn rewrite_hard_query(
    index: &dyn FactIndex,
    atoms: &[Atom],
    join: Option<Var>,
    protected: &[Var],
) -> Option<Vec<Atom>> {
    let pattern = index.identify_hard_query_pattern(atoms)?;
    let HardPattern { first, second, .. } = pattern;

    let candidates: Vec<usize> = match join {
        Some(var) if !atoms[first].contains_var(var) => vec![first],
        Some(var) if !atoms[second].contains_var(var) => vec![second],
        _ => vec![first, second],
    };
    let victim = candidates
        .into_iter()
        .find(|&i| removable(atoms, i, pattern.free, protected))?;

    let rewritten: Vec<Atom> = atoms
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != victim)
        .map(|(_, a)| *a)
        .collect();
    tracing::trace!(removed = victim, atoms = atoms.len(), "rewrote hard query");
    Some(rewritten)
}

fn removable(atoms: &[Atom], index: usize, free: Position, protected: &[Var]) -> bool {
    if index == 0 {
        return false;
    }
    let Some(var) = atoms[index].get(free).as_var() else {
        return false;
    };
    if protected.contains(&var) {
        return false;
    }
    let query = Rule::from_atoms(atoms.to_vec(), Position::Subject, 0);
    query.variable_can_be_deleted(index, free)
}

/// Whether adding `atom` to `rule` would form a second hard pattern with
/// either atom of a hard pair the rule already contains.
pub fn contains_hard_case(index: &dyn FactIndex, rule: &Rule, atom: &Atom) -> bool {
    let atoms = rule.atoms();
    let Some(pattern) = index.identify_hard_query_pattern(atoms) else {
        return false;
    };
    [pattern.first, pattern.second]
        .into_iter()
        .any(|i| index.identify_hard_query_pattern(&[*atom, atoms[i]]).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::KnowledgeBase;
    use crate::symbol::SymbolId;

    fn kb() -> KnowledgeBase {
        let kb = KnowledgeBase::new();
        for (s, r, o) in [
            ("ann", "speaks", "en"),
            ("ann", "speaks", "fr"),
            ("ann", "speaks", "de"),
            ("bob", "speaks", "en"),
            ("cid", "speaks", "fr"),
            ("ann", "livesIn", "paris"),
            ("bob", "livesIn", "rome"),
            ("cid", "livesIn", "paris"),
        ] {
            kb.add_fact(s, r, o).unwrap();
        }
        kb
    }

    fn id(kb: &KnowledgeBase, label: &str) -> SymbolId {
        kb.lookup(label).unwrap()
    }

    #[test]
    fn removes_atom_with_unshared_free_variable() {
        let kb = kb();
        let speaks = id(&kb, "speaks");
        let lives = id(&kb, "livesIn");
        // livesIn(?a,?b) ⇐ speaks(?a,?c) ∧ speaks(?a,?d)
        let atoms = vec![
            Atom::new(Var(0), lives, Var(1)),
            Atom::new(Var(0), speaks, Var(2)),
            Atom::new(Var(0), speaks, Var(3)),
        ];
        let rewritten = rewrite_hard_query(&kb, &atoms, None, &[Var(0), Var(1)]).unwrap();
        assert_eq!(rewritten.len(), 2);
        assert_eq!(rewritten, vec![atoms[0], atoms[2]]);
        assert_eq!(
            kb.count_distinct_pairs(Var(0), Var(1), &atoms),
            kb.count_distinct_pairs(Var(0), Var(1), &rewritten)
        );
    }

    #[test]
    fn prefers_atom_without_join_variable() {
        let kb = kb();
        let speaks = id(&kb, "speaks");
        let lives = id(&kb, "livesIn");
        let atoms = vec![
            Atom::new(Var(0), lives, Var(1)),
            Atom::new(Var(0), speaks, Var(2)),
            Atom::new(Var(0), speaks, Var(3)),
            Atom::new(Var(2), Var(5), Var(4)),
        ];
        let rewritten = rewrite_hard_query(&kb, &atoms, Some(Var(2)), &[Var(0), Var(5)]).unwrap();
        assert!(rewritten.contains(&atoms[1]));
        assert!(!rewritten.contains(&atoms[2]));
    }

    #[test]
    fn never_removes_head_or_protected_variables() {
        let kb = kb();
        let speaks = id(&kb, "speaks");
        // The pair is the head plus one body atom.
        let atoms = vec![
            Atom::new(Var(0), speaks, Var(1)),
            Atom::new(Var(0), speaks, Var(2)),
        ];
        assert!(rewrite_hard_query(&kb, &atoms, None, &[Var(2)]).is_none());
        assert!(rewrite_hard_query(&kb, &atoms, None, &[]).is_some());
    }

    #[test]
    fn no_pattern_no_rewrite() {
        let kb = kb();
        let atoms = vec![
            Atom::new(Var(0), id(&kb, "livesIn"), Var(1)),
            Atom::new(Var(0), id(&kb, "speaks"), Var(2)),
        ];
        assert!(rewrite_hard_query(&kb, &atoms, None, &[]).is_none());
    }

    #[test]
    fn detects_recreated_hard_case() {
        let kb = kb();
        let speaks = id(&kb, "speaks");
        let lives = id(&kb, "livesIn");
        let rule = Rule::from_atoms(
            vec![
                Atom::new(Var(0), lives, Var(1)),
                Atom::new(Var(0), speaks, Var(2)),
                Atom::new(Var(0), speaks, Var(3)),
            ],
            Position::Subject,
            1,
        );
        assert!(contains_hard_case(&kb, &rule, &Atom::new(Var(0), speaks, Var(4))));
        assert!(!contains_hard_case(&kb, &rule, &Atom::new(Var(2), speaks, Var(4))));
        assert!(!contains_hard_case(&kb, &rule, &Atom::new(Var(0), lives, Var(4))));
    }
}
