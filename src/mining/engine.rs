//! The mining engine: seeds the queue, runs the workers and the optional
//! streaming consumer, and returns the accepted rules.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use crate::error::{ConfigResult, MineError, MineResult};
use crate::kb::FactIndex;
use crate::rule::Rule;
use crate::symbol::SymbolId;

use super::assistant::DefaultStrategy;
use super::collector::ResultCollector;
use super::config::{MinerConfig, PruningMetric};
use super::queue::WorkQueue;
use super::strategy::MiningStrategy;
use super::worker::{WorkerContext, WorkerStats, run_worker};

/// Minimum count a refinement of a rule with the given head cardinality
/// must reach.
///
/// Under head coverage pruning the product `threshold × cardinality` is
/// rounded up, with a small tolerance so `0.01 × 500` yields 5 and not 6.
pub fn count_threshold(config: &MinerConfig, head_cardinality: usize) -> usize {
    match config.pruning_metric {
        PruningMetric::Support => config.min_initial_support,
        PruningMetric::HeadCoverage => {
            let raw = config.threshold * head_cardinality as f64;
            (raw - f64::EPSILON * raw.max(1.0)).ceil().max(0.0) as usize
        }
    }
}

/// A configured mining run.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use rulemine::kb::KnowledgeBase;
/// use rulemine::mining::{Miner, MinerConfig};
///
/// let kb = Arc::new(KnowledgeBase::new());
/// kb.add_fact("ann", "marriedTo", "bob").unwrap();
/// let miner = Miner::new(kb.clone(), MinerConfig::default()).unwrap();
/// for rule in miner.mine().unwrap() {
///     println!("{}", rule.display(kb.as_ref()));
/// }
/// ```
pub struct Miner {
    strategy: Arc<dyn MiningStrategy>,
    config: MinerConfig,
    seeds: Option<Vec<SymbolId>>,
}

impl Miner {
    /// Miner with the [`DefaultStrategy`] over `index`.
    pub fn new(index: Arc<dyn FactIndex>, config: MinerConfig) -> ConfigResult<Self> {
        let strategy = DefaultStrategy::new(index, config.clone())?;
        let seeds = strategy.seed_relations().map(<[SymbolId]>::to_vec);
        Ok(Self {
            strategy: Arc::new(strategy),
            config,
            seeds,
        })
    }

    /// Miner driving a custom strategy.
    pub fn with_strategy(strategy: Arc<dyn MiningStrategy>, config: MinerConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            strategy,
            config,
            seeds: None,
        })
    }

    /// Restrict seed rules to these head relations.
    pub fn with_seeds(mut self, seeds: Vec<SymbolId>) -> Self {
        self.seeds = Some(seeds);
        self
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Run to completion and return the accepted rules in acceptance order.
    pub fn mine(&self) -> MineResult<Vec<Arc<Rule>>> {
        self.run(None::<fn(&Rule)>)
    }

    /// Like [`mine`](Self::mine), additionally calling `callback` on each
    /// accepted rule, in acceptance order, while the search is running.
    pub fn mine_streaming<F>(&self, callback: F) -> MineResult<Vec<Arc<Rule>>>
    where
        F: FnMut(&Rule) + Send,
    {
        self.run(Some(callback))
    }

    fn seed_rules(&self) -> Vec<Rule> {
        let min_support = self.config.min_initial_support;
        match &self.seeds {
            Some(seeds) => self.strategy.initial_rules_from_seeds(seeds, min_support),
            None => self.strategy.initial_rules(min_support),
        }
    }

    fn run<F>(&self, callback: Option<F>) -> MineResult<Vec<Arc<Rule>>>
    where
        F: FnMut(&Rule) + Send,
    {
        let start = Instant::now();
        let threads = self.config.effective_threads();
        let seeds = self.seed_rules();
        tracing::info!(
            seeds = seeds.len(),
            threads,
            max_depth = self.config.max_depth,
            "starting rule mining"
        );

        let queue = WorkQueue::new();
        queue.enqueue_all(seeds);
        let collector = ResultCollector::new();
        let idle = AtomicUsize::new(0);
        let ctx = WorkerContext {
            strategy: self.strategy.as_ref(),
            config: &self.config,
            queue: &queue,
            collector: &collector,
            idle: &idle,
            threads,
        };

        let (stats, spawn_error) = thread::scope(|s| {
            let mut spawn_error = None;

            let consumer = callback.and_then(|callback| {
                let collector = &collector;
                match thread::Builder::new()
                    .name("rule-consumer".into())
                    .spawn_scoped(s, move || collector.consume(callback))
                {
                    Ok(handle) => Some(handle),
                    Err(source) => {
                        spawn_error = Some(MineError::Spawn {
                            thread: "rule-consumer".into(),
                            source,
                        });
                        None
                    }
                }
            });

            let mut workers = Vec::with_capacity(threads);
            for i in 0..threads {
                let name = format!("miner-{i}");
                let ctx = &ctx;
                match thread::Builder::new()
                    .name(name.clone())
                    .spawn_scoped(s, move || run_worker(ctx, i))
                {
                    Ok(handle) => workers.push(handle),
                    Err(source) => {
                        // a worker that never started counts as idle forever
                        idle.fetch_add(1, Ordering::SeqCst);
                        tracing::warn!(thread = %name, error = %source, "failed to spawn worker");
                        spawn_error.get_or_insert(MineError::Spawn { thread: name, source });
                    }
                }
            }

            let mut stats = WorkerStats::default();
            for handle in workers {
                match handle.join() {
                    Ok(worker) => stats.merge(worker),
                    Err(_) => tracing::warn!("worker thread panicked"),
                }
            }
            collector.close();
            if let Some(handle) = consumer {
                if handle.join().is_err() {
                    tracing::warn!("rule consumer panicked");
                }
            }
            (stats, spawn_error)
        });

        if let Some(e) = spawn_error {
            return Err(e);
        }
        let rules = collector.snapshot();
        tracing::info!(
            rules = rules.len(),
            processed = stats.processed,
            failures = stats.failures,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "rule mining finished"
        );
        Ok(rules)
    }
}

impl std::fmt::Debug for Miner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Miner")
            .field("config", &self.config)
            .field("seeds", &self.seeds)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mining::strategy::Refinements;

    #[test]
    fn head_coverage_threshold_rounds_up() {
        let config = MinerConfig::default();
        assert_eq!(count_threshold(&config, 500), 5);
        assert_eq!(count_threshold(&config, 501), 6);
        assert_eq!(count_threshold(&config, 50), 1);
        assert_eq!(count_threshold(&config, 0), 0);
    }

    #[test]
    fn support_threshold_is_constant() {
        let config = MinerConfig {
            pruning_metric: PruningMetric::Support,
            min_initial_support: 7,
            ..MinerConfig::default()
        };
        assert_eq!(count_threshold(&config, 1), 7);
        assert_eq!(count_threshold(&config, 10_000), 7);
    }

    #[test]
    fn with_strategy_validates_config() {
        let strategy: Arc<dyn MiningStrategy> = Arc::new(NoRules);
        let bad = MinerConfig {
            max_depth: 1,
            ..MinerConfig::default()
        };
        assert!(Miner::with_strategy(strategy.clone(), bad).is_err());
        let miner = Miner::with_strategy(strategy, MinerConfig::default()).unwrap();
        assert!(miner.mine().unwrap().is_empty());
    }

    struct NoRules;

    impl MiningStrategy for NoRules {
        fn initial_rules(&self, _: usize) -> Vec<Rule> {
            Vec::new()
        }
        fn initial_rules_from_seeds(&self, _: &[SymbolId], _: usize) -> Vec<Rule> {
            Vec::new()
        }
        fn apply_operators(&self, _: &Arc<Rule>, _: usize) -> MineResult<Refinements> {
            Ok(Default::default())
        }
        fn test_acceptance(&self, _: &mut Rule) -> bool {
            false
        }
        fn head_cardinality(&self, _: &Rule) -> usize {
            0
        }
        fn should_refine(&self, _: &Rule) -> bool {
            false
        }
    }
}
