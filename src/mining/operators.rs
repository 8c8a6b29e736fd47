//! Refinement operators of [`DefaultStrategy`].
//!
//! Each operator adds one atom to a rule (or binds one variable of the last
//! atom to a constant) and counts the support of every candidate in a single
//! projection query. Candidates come back sorted by descending count, so
//! enumeration stops at the first one below the threshold: support never
//! grows when a rule is specialized.

use std::sync::Arc;

use crate::error::MineResult;
use crate::kb::FactIndex;
use crate::rule::Rule;
use crate::rule::atom::{Atom, Position, Term, Var};

use super::assistant::DefaultStrategy;
use super::config::ConstantMode;
use super::rewrite::contains_hard_case;

pub const DANGLING: &str = "dangling";
pub const CLOSING: &str = "closing";
pub const INSTANTIATED: &str = "instantiated";

/// Atom with `join` at `position`, `other` at the opposite argument and a
/// variable relation.
fn join_atom(position: Position, join: Var, relation: Var, other: Var) -> Atom {
    match position {
        Position::Object => Atom::new(other, relation, join),
        _ => Atom::new(join, relation, other),
    }
}

fn with_atom(rule: &Rule, atom: Atom) -> Vec<Atom> {
    let mut atoms = rule.atoms().to_vec();
    atoms.push(atom);
    atoms
}

/// Add `r(x, fresh)` or `r(fresh, x)` for every usable relation `r` and
/// join variable `x`.
pub fn dangling(
    strategy: &DefaultStrategy,
    rule: &Arc<Rule>,
    threshold: usize,
    _: Option<&[Rule]>,
) -> MineResult<Vec<Rule>> {
    let config = strategy.config();
    let open = rule.open_variables();
    if config.exploit_max_length
        && rule.len() + 1 == config.max_depth
        && !open.is_empty()
        && config.constants == ConstantMode::Disallow
    {
        return Ok(Vec::new());
    }

    let joins = if rule.is_closed() { rule.variables() } else { open };
    let fresh = rule.fresh_var();
    let relation_var = Var(fresh.0 + 1);

    let mut candidates = Vec::new();
    for position in Position::ARGUMENTS {
        for &join in &joins {
            let atom = join_atom(position, join, relation_var, fresh);
            let atoms = with_atom(rule, atom);
            let counts = strategy.refinement_counts(
                rule,
                &atoms,
                relation_var,
                Some(join),
                config.query_rewriting,
            )?;
            for (relation, support) in counts.descending() {
                if support < threshold {
                    break;
                }
                if !strategy.allows_body_relation(rule, relation) {
                    continue;
                }
                let atom = atom.with(Position::Relation, Term::Const(relation));
                if contains_hard_case(strategy.index(), rule, &atom) {
                    continue;
                }
                let mut candidate = Rule::extend(rule, atom, support);
                if strategy.set_head_coverage(&mut candidate) {
                    candidates.push(candidate);
                }
            }
        }
    }
    Ok(candidates)
}

/// Add `r(x, y)` between two variables already in the rule.
pub fn closing(
    strategy: &DefaultStrategy,
    rule: &Arc<Rule>,
    threshold: usize,
    _: Option<&[Rule]>,
) -> MineResult<Vec<Rule>> {
    let config = strategy.config();
    let variables = rule.variables();
    if variables.len() < 2 {
        return Ok(Vec::new());
    }

    let (sources, targets) = if rule.is_closed() {
        (variables.clone(), variables)
    } else {
        let open = rule.open_variables();
        if open.len() > 1 {
            if config.exploit_max_length && open.len() > 2 && rule.len() + 1 == config.max_depth {
                return Ok(Vec::new());
            }
            (open.clone(), open)
        } else {
            (open, variables)
        }
    };

    let relation_var = rule.fresh_var();
    let rewrite = config.functionality_heuristic && config.query_rewriting;
    let mut tried: Vec<Atom> = Vec::new();
    let mut candidates = Vec::new();
    for position in Position::ARGUMENTS {
        for &source in &sources {
            for &target in &targets {
                if source == target {
                    continue;
                }
                let atom = join_atom(position, source, relation_var, target);
                if tried.contains(&atom) {
                    continue;
                }
                tried.push(atom);

                let atoms = with_atom(rule, atom);
                let counts =
                    strategy.refinement_counts(rule, &atoms, relation_var, Some(target), rewrite)?;
                for (relation, support) in counts.descending() {
                    if support < threshold {
                        break;
                    }
                    if !strategy.allows_body_relation(rule, relation) {
                        continue;
                    }
                    let atom = atom.with(Position::Relation, Term::Const(relation));
                    let mut candidate = Rule::extend(rule, atom, support);
                    if candidate.is_redundant_recursive() {
                        continue;
                    }
                    if strategy.set_head_coverage(&mut candidate) {
                        candidates.push(candidate);
                    }
                }
            }
        }
    }
    Ok(candidates)
}

/// Bind the fresh variable of each dangling candidate to its frequent
/// constants.
pub fn instantiated(
    strategy: &DefaultStrategy,
    rule: &Arc<Rule>,
    threshold: usize,
    dangling: Option<&[Rule]>,
) -> MineResult<Vec<Rule>> {
    let Some(dangling) = dangling else {
        return Ok(Vec::new());
    };
    let config = strategy.config();
    let fresh = rule.fresh_var();

    let mut candidates = Vec::new();
    for candidate in dangling {
        let last = *candidate.last();
        let Some(position) = last.position_of(fresh) else {
            continue;
        };
        let join = last.get(position.other()).as_var();
        let counts = strategy.refinement_counts(
            candidate,
            candidate.atoms(),
            fresh,
            join,
            config.query_rewriting,
        )?;
        for (constant, support) in counts.descending() {
            if support < threshold {
                break;
            }
            let mut bound = candidate.instantiate(candidate.len() - 1, position, constant, support);
            // degenerate constant: the join side collapses to one value
            if let Some(join) = join {
                if strategy.index().count_distinct(join, bound.atoms()) < 2 {
                    continue;
                }
            }
            if !bound.redundant_atoms().is_empty() {
                continue;
            }
            if strategy.set_head_coverage(&mut bound) {
                candidates.push(bound);
            }
        }
    }
    Ok(candidates)
}
