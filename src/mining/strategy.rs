//! The mining strategy seam and the refinement operator registry.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{MineError, MineResult};
use crate::rule::Rule;
use crate::symbol::SymbolId;

/// Support/confidence semantics and refinement operators.
///
/// A strategy is shared by every worker thread of a run, so all methods take
/// `&self`; per-rule state lives in the [`Rule`] itself.
pub trait MiningStrategy: Send + Sync {
    /// Single-atom rules over every relation with support ≥ `min_support`.
    fn initial_rules(&self, min_support: usize) -> Vec<Rule>;

    /// Single-atom rules restricted to the given head relations.
    fn initial_rules_from_seeds(&self, seeds: &[SymbolId], min_support: usize) -> Vec<Rule>;

    /// Run every enabled operator on `rule`, keeping candidates whose
    /// cardinality reaches `threshold`.
    fn apply_operators(&self, rule: &Arc<Rule>, threshold: usize) -> MineResult<Refinements>;

    /// Compute confidence metrics on `rule` and decide whether it is output.
    fn test_acceptance(&self, rule: &mut Rule) -> bool;

    /// Number of bindings of the head relation support is measured against.
    fn head_cardinality(&self, rule: &Rule) -> usize;

    /// Whether `rule` should be refined further at all.
    fn should_refine(&self, rule: &Rule) -> bool;
}

/// Candidates produced by one [`MiningStrategy::apply_operators`] call,
/// grouped by operator in registry order.
#[derive(Debug, Default)]
pub struct Refinements {
    by_operator: Vec<(&'static str, Vec<Rule>)>,
}

impl Refinements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, operator: &'static str, rules: Vec<Rule>) {
        self.by_operator.push((operator, rules));
    }

    /// Candidates of one operator.
    pub fn get(&self, operator: &str) -> Option<&[Rule]> {
        self.by_operator
            .iter()
            .find(|(name, _)| *name == operator)
            .map(|(_, rules)| rules.as_slice())
    }

    pub fn operators(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.by_operator.iter().map(|(name, _)| *name)
    }

    /// Total number of candidates.
    pub fn len(&self) -> usize {
        self.by_operator.iter().map(|(_, rules)| rules.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All candidates, in operator order.
    pub fn into_rules(self) -> Vec<Rule> {
        self.by_operator
            .into_iter()
            .flat_map(|(_, rules)| rules)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Operator registry
// ---------------------------------------------------------------------------

/// Signature of a refinement operator: strategy, rule, count threshold and
/// the output of the operator it depends on, if any.
pub type OperatorFn<S> = fn(&S, &Arc<Rule>, usize, Option<&[Rule]>) -> MineResult<Vec<Rule>>;

/// A named refinement operator.
pub struct Operator<S> {
    pub name: &'static str,
    /// Operator whose output this one consumes.
    pub depends_on: Option<&'static str>,
    /// Whether the output is returned as refinements or only fed forward.
    pub emits: bool,
    pub apply: OperatorFn<S>,
}

impl<S> Clone for Operator<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            depends_on: self.depends_on,
            emits: self.emits,
            apply: self.apply,
        }
    }
}

impl<S> std::fmt::Debug for Operator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operator")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("emits", &self.emits)
            .finish()
    }
}

/// Ordered list of operators, built once per run.
pub struct OperatorRegistry<S> {
    operators: Vec<Operator<S>>,
}

impl<S> OperatorRegistry<S> {
    pub fn new() -> Self {
        Self {
            operators: Vec::new(),
        }
    }

    /// Append an operator. Dependencies must be registered first.
    pub fn register(mut self, operator: Operator<S>) -> Self {
        self.operators.push(operator);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.operators.iter().map(|op| op.name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Apply every operator in order and collect the emitted candidates.
    ///
    /// Structurally identical candidates are emitted once, by the first
    /// operator that produced them.
    pub fn run(&self, strategy: &S, rule: &Arc<Rule>, threshold: usize) -> MineResult<Refinements> {
        let mut outputs: Vec<(&'static str, Vec<Rule>)> = Vec::with_capacity(self.operators.len());
        for op in &self.operators {
            let input = op.depends_on.and_then(|dep| {
                outputs
                    .iter()
                    .find(|(name, _)| *name == dep)
                    .map(|(_, rules)| rules.as_slice())
            });
            let produced = (op.apply)(strategy, rule, threshold, input).map_err(|e| {
                MineError::Operator {
                    operator: op.name,
                    rule: format!("{:?}", rule.atoms()),
                    message: e.to_string(),
                }
            })?;
            tracing::trace!(operator = op.name, candidates = produced.len(), "applied operator");
            outputs.push((op.name, produced));
        }

        let mut seen = HashSet::new();
        let mut refinements = Refinements::new();
        for (op, (name, rules)) in self.operators.iter().zip(outputs) {
            if !op.emits {
                continue;
            }
            let unique: Vec<Rule> = rules
                .into_iter()
                .filter(|r| seen.insert(r.canonical_key()))
                .collect();
            refinements.push(name, unique);
        }
        Ok(refinements)
    }
}

impl<S> Default for OperatorRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> std::fmt::Debug for OperatorRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.operators.iter()).finish()
    }
}
