//! End-to-end mining runs over small knowledge bases.

use std::collections::HashSet;
use std::sync::Arc;

use rulemine::kb::{FactIndex, KnowledgeBase};
use rulemine::mining::{
    ConstantMode, DefaultStrategy, Miner, MinerConfig, MiningStrategy, PruningMetric,
    count_threshold,
};
use rulemine::rule::Rule;
use rulemine::rule::atom::{Atom, Position, Var};

fn support_config(min_support: usize) -> MinerConfig {
    MinerConfig {
        pruning_metric: PruningMetric::Support,
        min_initial_support: min_support,
        idle_poll_ms: 1,
        ..MinerConfig::default()
    }
}

/// Spouses live together; one spouse's city is unknown.
fn family() -> Arc<KnowledgeBase> {
    let kb = KnowledgeBase::new();
    for (a, b, city) in [
        ("ann", "bob", "paris"),
        ("cid", "dee", "rome"),
        ("eve", "fay", "oslo"),
        ("gil", "hue", "lima"),
    ] {
        kb.add_fact(a, "marriedTo", b).unwrap();
        kb.add_fact(b, "marriedTo", a).unwrap();
        kb.add_fact(a, "livesIn", city).unwrap();
        kb.add_fact(b, "livesIn", city).unwrap();
    }
    kb.add_fact("ivy", "marriedTo", "jon").unwrap();
    kb.add_fact("jon", "marriedTo", "ivy").unwrap();
    kb.add_fact("jon", "livesIn", "kiev").unwrap();
    Arc::new(kb)
}

fn keys(rules: &[Arc<Rule>]) -> HashSet<rulemine::rule::canonical::CanonicalRule> {
    rules.iter().map(|r| r.canonical_key()).collect()
}

#[test]
fn single_relation_seed_has_no_refinements() {
    let kb = KnowledgeBase::new();
    // ten facts over five distinct subjects
    for i in 0..5 {
        kb.add_fact(&format!("p{i}"), "knows", &format!("p{}", (i + 1) % 5)).unwrap();
        kb.add_fact(&format!("p{i}"), "knows", &format!("p{}", (i + 2) % 5)).unwrap();
    }
    let kb = Arc::new(kb);
    assert_eq!(kb.size(), 10);

    let config = MinerConfig {
        recursivity_limit: 1,
        ..support_config(2)
    };
    let strategy = DefaultStrategy::new(kb.clone(), config.clone()).unwrap();
    let seeds = strategy.initial_rules(2);
    assert_eq!(seeds.len(), 1);
    assert_eq!(seeds[0].support(), 5);

    let seed = Arc::new(seeds.into_iter().next().unwrap());
    let refinements = strategy.apply_operators(&seed, 2).unwrap();
    assert!(refinements.is_empty());

    let miner = Miner::new(kb, config).unwrap();
    assert!(miner.mine().unwrap().is_empty());
}

#[test]
fn empty_knowledge_base_yields_no_rules() {
    let kb = Arc::new(KnowledgeBase::new());
    let miner = Miner::new(
        kb,
        MinerConfig {
            threads: 4,
            ..support_config(1)
        },
    )
    .unwrap();
    assert!(miner.mine().unwrap().is_empty());
}

#[test]
fn head_coverage_threshold_example() {
    assert_eq!(count_threshold(&MinerConfig::default(), 500), 5);
}

#[test]
fn mines_spouse_residence_rule() {
    let kb = family();
    let lives = kb.lookup("livesIn").unwrap();
    let married = kb.lookup("marriedTo").unwrap();
    let rules = Miner::new(kb.clone(), support_config(2)).unwrap().mine().unwrap();
    assert!(!rules.is_empty());

    let expected = Rule::from_atoms(
        vec![
            Atom::new(Var(0), lives, Var(1)),
            Atom::new(Var(0), married, Var(2)),
            Atom::new(Var(2), lives, Var(1)),
        ],
        Position::Subject,
        0,
    );
    let found = rules
        .iter()
        .find(|r| r.canonical_key() == expected.canonical_key())
        .expect("spouse rule mined");
    // eight people share a city with their spouse; ivy's city is unknown
    assert_eq!(found.support(), 8);
    assert_eq!(found.std_body_size(), Some(9));
    assert_eq!(found.pca_body_size(), Some(8));
    assert!((found.pca_confidence() - 1.0).abs() < 1e-12);

    for rule in &rules {
        assert!(rule.is_closed(), "{}", rule.display(kb.as_ref()));
        assert!(rule.len() >= 2 && rule.len() <= 3);
        assert!(rule.support() >= 2);
    }
    assert_eq!(keys(&rules).len(), rules.len());
}

#[test]
fn symmetric_relation_is_found() {
    let kb = family();
    let rules = Miner::new(kb.clone(), support_config(2)).unwrap().mine().unwrap();
    let married = kb.lookup("marriedTo").unwrap();
    let symmetric = Rule::from_atoms(
        vec![
            Atom::new(Var(0), married, Var(1)),
            Atom::new(Var(1), married, Var(0)),
        ],
        Position::Subject,
        0,
    );
    let found = rules
        .iter()
        .find(|r| r.canonical_key() == symmetric.canonical_key())
        .expect("symmetry rule mined");
    assert_eq!(found.support(), 10);
    assert!((found.std_confidence() - 1.0).abs() < 1e-12);
}

#[test]
fn thread_count_does_not_change_results() {
    let kb = family();
    let single = Miner::new(
        kb.clone(),
        MinerConfig {
            threads: 1,
            ..support_config(2)
        },
    )
    .unwrap()
    .mine()
    .unwrap();
    let parallel = Miner::new(
        kb,
        MinerConfig {
            threads: 4,
            ..support_config(2)
        },
    )
    .unwrap()
    .mine()
    .unwrap();
    assert_eq!(keys(&single), keys(&parallel));
}

#[test]
fn streaming_matches_returned_order() {
    let kb = family();
    let miner = Miner::new(kb.clone(), support_config(2)).unwrap();
    let mut streamed = Vec::new();
    let rules = miner
        .mine_streaming(|rule| streamed.push(rule.canonical_key()))
        .unwrap();
    let returned: Vec<_> = rules.iter().map(|r| r.canonical_key()).collect();
    assert_eq!(streamed, returned);
}

#[test]
fn seeds_restrict_head_relations() {
    let kb = family();
    let married = kb.lookup("marriedTo").unwrap();
    let rules = Miner::new(kb.clone(), support_config(2))
        .unwrap()
        .with_seeds(vec![married])
        .mine()
        .unwrap();
    assert!(!rules.is_empty());
    assert!(rules.iter().all(|r| r.head_relation() == Some(married)));

    let config = MinerConfig {
        seed_relations: vec!["livesIn".into()],
        ..support_config(2)
    };
    let lives = kb.lookup("livesIn").unwrap();
    let rules = Miner::new(kb, config).unwrap().mine().unwrap();
    assert!(rules.iter().all(|r| r.head_relation() == Some(lives)));
}

#[test]
fn confidence_thresholds_filter_output() {
    let kb = family();
    let config = MinerConfig {
        min_pca_confidence: 1.0,
        ..support_config(2)
    };
    let rules = Miner::new(kb, config).unwrap().mine().unwrap();
    assert!(!rules.is_empty());
    assert!(rules.iter().all(|r| r.pca_confidence() >= 1.0));
}

#[test]
fn constants_appear_only_when_allowed() {
    let kb = family();
    let has_constant = |rules: &[Arc<Rule>]| {
        rules
            .iter()
            .any(|r| r.atoms().iter().any(|a| a.subject.as_const().is_some() || a.object.as_const().is_some()))
    };
    let disallowed = Miner::new(kb.clone(), support_config(2)).unwrap().mine().unwrap();
    assert!(!has_constant(&disallowed));

    let enforced = Miner::new(
        kb,
        MinerConfig {
            constants: ConstantMode::Enforce,
            ..support_config(2)
        },
    )
    .unwrap()
    .mine()
    .unwrap();
    assert!(enforced.iter().all(|r| has_constant(std::slice::from_ref(r))));
}

#[test]
fn unknown_relation_in_config_is_rejected() {
    let kb = family();
    let config = MinerConfig {
        body_excluded_relations: vec!["bornIn".into()],
        ..support_config(2)
    };
    assert!(Miner::new(kb, config).is_err());
}
