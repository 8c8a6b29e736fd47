//! The default mining strategy: closed Horn rules ranked by standard and
//! PCA confidence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::{ConfigResult, MineError, MineResult};
use crate::kb::{BindingCounts, FactIndex};
use crate::rule::Rule;
use crate::rule::atom::{Atom, Position, Term, Var};
use crate::symbol::SymbolId;

use super::config::{ConstantMode, CountingMode, MinerConfig, RelationFilters};
use super::operators;
use super::rewrite::rewrite_hard_query;
use super::strategy::{MiningStrategy, Operator, OperatorRegistry, Refinements};

/// Variables used for seed heads.
const HEAD_SUBJECT: Var = Var(0);
const HEAD_OBJECT: Var = Var(1);

/// Strategy over a [`FactIndex`] with the operators selected by the
/// configuration.
pub struct DefaultStrategy {
    index: Arc<dyn FactIndex>,
    config: MinerConfig,
    relations: RelationFilters,
    registry: OperatorRegistry<DefaultStrategy>,
    head_cardinalities: DashMap<(SymbolId, Position), usize>,
    functional_positions: DashMap<SymbolId, Position>,
}

impl DefaultStrategy {
    /// Validate `config`, resolve its relation lists against `index` and
    /// build the operator registry.
    pub fn new(index: Arc<dyn FactIndex>, config: MinerConfig) -> ConfigResult<Self> {
        config.validate()?;
        let relations = config.resolve_relations(index.as_ref())?;
        let registry = build_registry(config.constants);
        tracing::debug!(operators = ?registry.names(), "built operator registry");
        Ok(Self {
            index,
            config,
            relations,
            registry,
            head_cardinalities: DashMap::new(),
            functional_positions: DashMap::new(),
        })
    }

    pub fn index(&self) -> &dyn FactIndex {
        self.index.as_ref()
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    pub fn relations(&self) -> &RelationFilters {
        &self.relations
    }

    /// Seed relations from the configuration, if any were listed.
    pub fn seed_relations(&self) -> Option<&[SymbolId]> {
        self.relations.seeds.as_deref()
    }

    /// Head argument that support is counted on for `relation`.
    pub fn functional_position(&self, relation: SymbolId) -> Position {
        if !self.config.functionality_heuristic {
            return Position::Subject;
        }
        *self
            .functional_positions
            .entry(relation)
            .or_insert_with(|| {
                if self.index.functionality(relation) >= self.index.inverse_functionality(relation) {
                    Position::Subject
                } else {
                    Position::Object
                }
            })
    }

    /// Cardinality of `relation` as a head counted on `functional`.
    pub fn relation_head_cardinality(&self, relation: SymbolId, functional: Position) -> usize {
        if let Some(card) = self.head_cardinalities.get(&(relation, functional)) {
            return *card;
        }
        let card = match self.config.counting {
            CountingMode::FunctionalVariable => {
                let head = Atom::new(HEAD_SUBJECT, relation, HEAD_OBJECT);
                let fv = head.get(functional).as_var().unwrap_or(HEAD_SUBJECT);
                self.index.count_distinct(fv, &[head])
            }
            CountingMode::HeadBindings => self.index.relation_cardinality(relation),
        };
        self.head_cardinalities.insert((relation, functional), card);
        card
    }

    /// Support of a rule made of `atoms` under the configured counting mode.
    pub fn support_of(&self, rule: &Rule, atoms: &[Atom]) -> MineResult<usize> {
        let fv = functional_variable(rule)?;
        let count = match (self.config.counting, rule.non_functional_variable()) {
            (CountingMode::HeadBindings, Some(nfv)) if nfv != fv => {
                self.timed("count_distinct_pairs", rule, || {
                    self.index.count_distinct_pairs(fv, nfv, atoms)
                })
            }
            _ => self.timed("count_distinct", rule, || self.index.count_distinct(fv, atoms)),
        };
        Ok(count)
    }

    /// Counts per binding of `target` in `atoms`, the candidate atoms of a
    /// refinement of `rule`. With `rewrite`, hard joins are rewritten first.
    pub fn refinement_counts(
        &self,
        rule: &Rule,
        atoms: &[Atom],
        target: Var,
        join: Option<Var>,
        rewrite: bool,
    ) -> MineResult<BindingCounts> {
        let fv = functional_variable(rule)?;
        let rewritten = if rewrite {
            rewrite_hard_query(self.index.as_ref(), atoms, join, &[target, fv])
        } else {
            None
        };
        let query = rewritten.as_deref().unwrap_or(atoms);
        let counts = match self.config.counting {
            CountingMode::FunctionalVariable => self.timed("frequent_bindings_of", rule, || {
                self.index.frequent_bindings_of(target, fv, query)
            }),
            CountingMode::HeadBindings => self.timed("count_projection_bindings", rule, || {
                self.index
                    .count_projection_bindings(&query[0], &query[1..], target)
            }),
        };
        Ok(counts)
    }

    /// Body relations `rule` may still take.
    pub fn allows_body_relation(&self, rule: &Rule, relation: SymbolId) -> bool {
        rule.relation_multiplicity(relation) < self.config.recursivity_limit
            && self.relations.allows_body(relation)
    }

    /// Attach head coverage to a candidate. Returns `false` when the head
    /// relation has no bindings and the candidate must be dropped.
    pub fn set_head_coverage(&self, candidate: &mut Rule) -> bool {
        let card = self.head_cardinality(candidate);
        if card == 0 {
            return false;
        }
        candidate.set_head_coverage(candidate.support() as f64 / card as f64);
        true
    }

    fn timed<T>(&self, query: &'static str, rule: &Rule, run: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = run();
        let elapsed = start.elapsed();
        if elapsed > Duration::from_millis(self.config.slow_query_ms) {
            tracing::warn!(
                query,
                rule = %rule.display(self.index.as_ref()),
                elapsed_ms = elapsed.as_millis() as u64,
                "slow counting query"
            );
        }
        out
    }

    fn seeds_for(&self, relation: SymbolId, min_support: usize) -> Vec<Rule> {
        if !self.relations.allows_head(relation) {
            return Vec::new();
        }
        let functional = self.functional_position(relation);
        let head = Atom::new(HEAD_SUBJECT, relation, HEAD_OBJECT);
        let mut seeds = Vec::new();

        if self.config.constants != ConstantMode::Enforce {
            let seed = Rule::seed(head, functional, 0);
            if let Ok(support) = self.support_of(&seed, &[head]) {
                if support >= min_support {
                    let mut seed = Rule::seed(head, functional, support);
                    if self.set_head_coverage(&mut seed) {
                        seeds.push(seed);
                    }
                }
            }
        }

        if self.config.constants != ConstantMode::Disallow {
            seeds.extend(self.instantiated_seeds(head, functional, min_support));
        }
        seeds
    }

    /// Seeds whose non-functional head argument is a frequent constant.
    fn instantiated_seeds(&self, head: Atom, functional: Position, min_support: usize) -> Vec<Rule> {
        let Some(fv) = head.get(functional).as_var() else {
            return Vec::new();
        };
        let Some(bound) = head.get(functional.other()).as_var() else {
            return Vec::new();
        };
        let template = Rule::seed(head, functional, 0);
        let constants = self.timed("frequent_bindings_of", &template, || {
            self.index.frequent_bindings_of(bound, fv, &[head])
        });

        let mut seeds = Vec::new();
        for (constant, support) in constants.descending() {
            if support < min_support {
                break;
            }
            let mut seed = template.instantiate(0, functional.other(), constant, support);
            // A constant that leaves a single binding carries no pattern.
            if self.index.count_distinct(fv, seed.atoms()) < 2 {
                continue;
            }
            if self.set_head_coverage(&mut seed) {
                seeds.push(seed);
            }
        }
        seeds
    }

    /// The head with its non-functional argument replaced by a fresh
    /// variable: "has some value for the head relation".
    fn existential_head(rule: &Rule) -> Atom {
        let fresh = rule.fresh_var();
        rule.head()
            .with(rule.functional_position().other(), Term::Var(fresh))
    }

    fn body_size(&self, rule: &Rule, atoms: &[Atom]) -> MineResult<usize> {
        let fv = functional_variable(rule)?;
        let size = match (self.config.counting, rule.non_functional_variable()) {
            (CountingMode::HeadBindings, Some(nfv)) if nfv != fv => self
                .timed("count_distinct_pairs", rule, || {
                    self.index.count_distinct_pairs(fv, nfv, atoms)
                }),
            _ => self.timed("count_distinct", rule, || self.index.count_distinct(fv, atoms)),
        };
        Ok(size)
    }

    fn pca_body_size(&self, rule: &Rule) -> MineResult<usize> {
        let mut atoms = rule.body().to_vec();
        atoms.push(Self::existential_head(rule));
        self.body_size(rule, &atoms)
    }

    fn acceptance(&self, rule: &mut Rule) -> MineResult<bool> {
        if rule.is_empty_body() || !rule.is_closed() {
            return Ok(false);
        }

        if self.config.counting == CountingMode::HeadBindings && self.config.confidence_upper_bounds {
            let fv = functional_variable(rule)?;
            let mut atoms = rule.body().to_vec();
            atoms.push(Self::existential_head(rule));
            let bound_denominator = self.index.count_distinct(fv, &atoms);
            let upper_bound = if bound_denominator == 0 {
                0.0
            } else {
                rule.support() as f64 / bound_denominator as f64
            };
            if upper_bound < self.config.min_pca_confidence {
                return Ok(false);
            }
        }

        let pca = self.pca_body_size(rule)?;
        rule.set_pca_body_size(pca);
        if rule.pca_confidence() < self.config.min_pca_confidence {
            return Ok(false);
        }

        let std = self.body_size(rule, rule.body())?;
        rule.set_std_body_size(std);
        if rule.std_confidence() < self.config.min_std_confidence {
            return Ok(false);
        }

        if self.config.skyline_pruning {
            let pca_confidence = rule.pca_confidence();
            let dominated = rule.ancestors().any(|ancestor| {
                ancestor.pca_body_size().is_some()
                    && ancestor.is_closed()
                    && pca_confidence <= ancestor.pca_confidence()
            });
            if dominated {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn functional_variable(rule: &Rule) -> MineResult<Var> {
    rule.functional_variable().ok_or_else(|| MineError::GroundHead {
        rule: format!("{:?}", rule.atoms()),
    })
}

fn build_registry(constants: ConstantMode) -> OperatorRegistry<DefaultStrategy> {
    let mut registry = OperatorRegistry::new().register(Operator {
        name: operators::DANGLING,
        depends_on: None,
        emits: constants != ConstantMode::Enforce,
        apply: operators::dangling,
    });
    if constants != ConstantMode::Enforce {
        registry = registry.register(Operator {
            name: operators::CLOSING,
            depends_on: None,
            emits: true,
            apply: operators::closing,
        });
    }
    if constants != ConstantMode::Disallow {
        registry = registry.register(Operator {
            name: operators::INSTANTIATED,
            depends_on: Some(operators::DANGLING),
            emits: true,
            apply: operators::instantiated,
        });
    }
    registry
}

impl MiningStrategy for DefaultStrategy {
    fn initial_rules(&self, min_support: usize) -> Vec<Rule> {
        self.index
            .relations()
            .into_iter()
            .flat_map(|relation| self.seeds_for(relation, min_support))
            .collect()
    }

    fn initial_rules_from_seeds(&self, seeds: &[SymbolId], min_support: usize) -> Vec<Rule> {
        seeds
            .iter()
            .flat_map(|&relation| self.seeds_for(relation, min_support))
            .collect()
    }

    fn apply_operators(&self, rule: &Arc<Rule>, threshold: usize) -> MineResult<Refinements> {
        self.registry.run(self, rule, threshold)
    }

    fn test_acceptance(&self, rule: &mut Rule) -> bool {
        match self.acceptance(rule) {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "acceptance test failed");
                false
            }
        }
    }

    fn head_cardinality(&self, rule: &Rule) -> usize {
        match rule.head_relation() {
            Some(relation) => self.relation_head_cardinality(relation, rule.functional_position()),
            None => 0,
        }
    }

    fn should_refine(&self, rule: &Rule) -> bool {
        if rule.len() >= self.config.max_depth {
            return false;
        }
        let perfect = rule.pca_body_size().is_some() && rule.pca_confidence() >= 1.0;
        !(self.config.perfect_rule_pruning && perfect)
    }
}

impl std::fmt::Debug for DefaultStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultStrategy")
            .field("operators", &self.registry)
            .field("counting", &self.config.counting)
            .field("cached_head_cardinalities", &self.head_cardinalities.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::KnowledgeBase;
    use crate::mining::config::PruningMetric;

    /// livesIn follows marriedTo: every married couple lives in the same city.
    fn married_kb() -> Arc<KnowledgeBase> {
        let kb = KnowledgeBase::new();
        for (a, b, city) in [
            ("ann", "bob", "paris"),
            ("cid", "dee", "rome"),
            ("eve", "fay", "oslo"),
        ] {
            kb.add_fact(a, "marriedTo", b).unwrap();
            kb.add_fact(b, "marriedTo", a).unwrap();
            kb.add_fact(a, "livesIn", city).unwrap();
            kb.add_fact(b, "livesIn", city).unwrap();
        }
        // a married person with no recorded city
        kb.add_fact("gus", "marriedTo", "hal").unwrap();
        kb.add_fact("hal", "livesIn", "kiev").unwrap();
        Arc::new(kb)
    }

    fn strategy(kb: &Arc<KnowledgeBase>, config: MinerConfig) -> DefaultStrategy {
        DefaultStrategy::new(kb.clone(), config).unwrap()
    }

    fn support_config() -> MinerConfig {
        MinerConfig {
            pruning_metric: PruningMetric::Support,
            min_initial_support: 2,
            ..MinerConfig::default()
        }
    }

    fn lives_married_rule(kb: &KnowledgeBase) -> Rule {
        let lives = kb.lookup("livesIn").unwrap();
        let married = kb.lookup("marriedTo").unwrap();
        Rule::from_atoms(
            vec![
                Atom::new(Var(0), lives, Var(1)),
                Atom::new(Var(0), married, Var(2)),
                Atom::new(Var(2), lives, Var(1)),
            ],
            Position::Subject,
            6,
        )
    }

    /// Answers like the wrapped base but reports every single-atom query,
    /// and so every head relation, as empty.
    struct NoHeads(Arc<KnowledgeBase>);

    impl FactIndex for NoHeads {
        fn size(&self) -> usize {
            self.0.size()
        }
        fn relations(&self) -> Vec<SymbolId> {
            self.0.relations()
        }
        fn relation_cardinality(&self, relation: SymbolId) -> usize {
            self.0.relation_cardinality(relation)
        }
        fn functionality(&self, relation: SymbolId) -> f64 {
            self.0.functionality(relation)
        }
        fn inverse_functionality(&self, relation: SymbolId) -> f64 {
            self.0.inverse_functionality(relation)
        }
        fn count_distinct(&self, var: Var, atoms: &[Atom]) -> usize {
            if atoms.len() == 1 {
                return 0;
            }
            self.0.count_distinct(var, atoms)
        }
        fn count_distinct_pairs(&self, a: Var, b: Var, atoms: &[Atom]) -> usize {
            self.0.count_distinct_pairs(a, b, atoms)
        }
        fn count_projection_bindings(&self, head: &Atom, body: &[Atom], target: Var) -> BindingCounts {
            self.0.count_projection_bindings(head, body, target)
        }
        fn frequent_bindings_of(&self, var: Var, counting: Var, atoms: &[Atom]) -> BindingCounts {
            self.0.frequent_bindings_of(var, counting, atoms)
        }
        fn lookup(&self, label: &str) -> Option<SymbolId> {
            self.0.lookup(label)
        }
        fn resolve_label(&self, id: SymbolId) -> String {
            self.0.resolve_label(id)
        }
    }

    #[test]
    fn zero_head_cardinality_drops_candidates() {
        let kb = married_kb();
        // a known label that no fact uses as a relation
        let born = kb.symbols().intern("bornIn").unwrap();
        let s = strategy(&kb, support_config());
        let mut orphan = Rule::seed(Atom::new(Var(0), born, Var(1)), Position::Subject, 3);
        assert_eq!(s.head_cardinality(&orphan), 0);
        assert!(!s.set_head_coverage(&mut orphan));
        assert_eq!(orphan.head_coverage(), 0.0);

        let lives = kb.lookup("livesIn").unwrap();
        let seed = Arc::new(Rule::seed(Atom::new(Var(0), lives, Var(1)), Position::Subject, 7));
        assert_eq!(operators::dangling(&s, &seed, 2, None).unwrap().len(), 4);

        let headless = DefaultStrategy::new(Arc::new(NoHeads(kb.clone())), support_config()).unwrap();
        assert_eq!(headless.head_cardinality(&seed), 0);
        assert!(operators::dangling(&headless, &seed, 2, None).unwrap().is_empty());
    }

    #[test]
    fn seeds_meet_min_support() {
        let kb = married_kb();
        let s = strategy(&kb, support_config());
        let seeds = s.initial_rules(2);
        assert_eq!(seeds.len(), 2);
        for seed in &seeds {
            assert!(seed.support() >= 2);
            assert!((seed.head_coverage() - 1.0).abs() < 1e-12);
        }
        assert!(s.initial_rules(100).is_empty());
    }

    #[test]
    fn seeds_respect_head_exclusion() {
        let kb = married_kb();
        let s = strategy(
            &kb,
            MinerConfig {
                head_excluded_relations: vec!["livesIn".into()],
                ..support_config()
            },
        );
        let seeds = s.initial_rules(2);
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].head_relation(), kb.lookup("marriedTo"));
    }

    #[test]
    fn instantiated_seeds_under_allow() {
        let kb = married_kb();
        let s = strategy(
            &kb,
            MinerConfig {
                constants: ConstantMode::Allow,
                ..support_config()
            },
        );
        let lives = kb.lookup("livesIn").unwrap();
        let seeds = s.initial_rules_from_seeds(&[lives], 2);
        // livesIn(?a,?b) plus livesIn(?a,c) for the three cities with two residents
        assert_eq!(seeds.len(), 4);
        assert!(seeds.iter().skip(1).all(|r| r.head().object.as_const().is_some()));
    }

    #[test]
    fn enforce_drops_unbound_seed_and_closing() {
        let kb = married_kb();
        let s = strategy(
            &kb,
            MinerConfig {
                constants: ConstantMode::Enforce,
                ..support_config()
            },
        );
        let lives = kb.lookup("livesIn").unwrap();
        let seeds = s.initial_rules_from_seeds(&[lives], 2);
        assert_eq!(seeds.len(), 3);
        assert_eq!(s.registry.names(), vec![operators::DANGLING, operators::INSTANTIATED]);
    }

    #[test]
    fn acceptance_computes_confidences() {
        let kb = married_kb();
        let s = strategy(&kb, support_config());
        let mut rule = lives_married_rule(&kb);
        assert!(s.test_acceptance(&mut rule));
        // seven married people, six of them share a recorded city with the spouse
        assert_eq!(rule.std_body_size(), Some(7));
        // gus has no recorded city so PCA ignores him
        assert_eq!(rule.pca_body_size(), Some(6));
        assert!((rule.pca_confidence() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn acceptance_rejects_open_and_bodiless_rules() {
        let kb = married_kb();
        let s = strategy(&kb, support_config());
        let lives = kb.lookup("livesIn").unwrap();
        let mut seed = Rule::seed(Atom::new(Var(0), lives, Var(1)), Position::Subject, 7);
        assert!(!s.test_acceptance(&mut seed));
        let mut open = Rule::from_atoms(
            vec![
                Atom::new(Var(0), lives, Var(1)),
                Atom::new(Var(0), lives, Var(2)),
            ],
            Position::Subject,
            7,
        );
        assert!(!s.test_acceptance(&mut open));
        assert_eq!(open.pca_body_size(), None);
    }

    #[test]
    fn acceptance_applies_confidence_thresholds() {
        let kb = married_kb();
        let s = strategy(
            &kb,
            MinerConfig {
                min_std_confidence: 0.9,
                ..support_config()
            },
        );
        let mut rule = lives_married_rule(&kb);
        assert!(!s.test_acceptance(&mut rule));
    }

    #[test]
    fn skyline_rejects_rules_not_beating_closed_ancestors() {
        let kb = married_kb();
        let s = strategy(&kb, support_config());
        let mut parent = lives_married_rule(&kb);
        assert!(s.test_acceptance(&mut parent));
        let parent = Arc::new(parent);
        let married = kb.lookup("marriedTo").unwrap();
        let mut child = Rule::extend(&parent, Atom::new(Var(2), married, Var(0)), 6);
        assert!(!s.test_acceptance(&mut child));

        let s = strategy(
            &kb,
            MinerConfig {
                skyline_pruning: false,
                ..support_config()
            },
        );
        let mut child = Rule::extend(&parent, Atom::new(Var(2), married, Var(0)), 6);
        assert!(s.test_acceptance(&mut child));
    }

    #[test]
    fn head_bindings_mode_counts_pairs() {
        let kb = married_kb();
        let s = strategy(
            &kb,
            MinerConfig {
                counting: CountingMode::HeadBindings,
                confidence_upper_bounds: true,
                ..support_config()
            },
        );
        let lives = kb.lookup("livesIn").unwrap();
        let seed = Rule::seed(Atom::new(Var(0), lives, Var(1)), Position::Subject, 0);
        assert_eq!(s.head_cardinality(&seed), 7);
        assert_eq!(s.support_of(&seed, seed.atoms()).unwrap(), 7);

        let mut rule = lives_married_rule(&kb);
        assert!(s.test_acceptance(&mut rule));
        assert_eq!(rule.std_body_size(), Some(7));
        assert_eq!(rule.pca_body_size(), Some(6));
    }

    #[test]
    fn functionality_heuristic_picks_more_functional_side() {
        let kb = KnowledgeBase::new();
        // many subjects share one object: inverse functionality is low
        for i in 0..5 {
            kb.add_fact(&format!("p{i}"), "bornIn", "paris").unwrap();
        }
        let kb = Arc::new(kb);
        let born = kb.lookup("bornIn").unwrap();
        let s = strategy(
            &kb,
            MinerConfig {
                functionality_heuristic: true,
                ..support_config()
            },
        );
        assert_eq!(s.functional_position(born), Position::Subject);
        let s = strategy(&kb, support_config());
        assert_eq!(s.functional_position(born), Position::Subject);

        let kb2 = KnowledgeBase::new();
        for i in 0..5 {
            kb2.add_fact("paris", "hasCitizen", &format!("p{i}")).unwrap();
        }
        let kb2 = Arc::new(kb2);
        let citizen = kb2.lookup("hasCitizen").unwrap();
        let s = strategy(
            &kb2,
            MinerConfig {
                functionality_heuristic: true,
                ..support_config()
            },
        );
        assert_eq!(s.functional_position(citizen), Position::Object);
    }

    #[test]
    fn perfect_rules_stop_refinement_when_enabled() {
        let kb = married_kb();
        let s = strategy(
            &kb,
            MinerConfig {
                perfect_rule_pruning: true,
                max_depth: 4,
                ..support_config()
            },
        );
        let mut rule = lives_married_rule(&kb);
        assert!(s.test_acceptance(&mut rule));
        assert!(!s.should_refine(&rule));

        let s = strategy(
            &kb,
            MinerConfig {
                max_depth: 4,
                ..support_config()
            },
        );
        assert!(s.should_refine(&rule));
        let s = strategy(&kb, support_config());
        assert!(!s.should_refine(&rule));
    }
}
