//! The worker loop: dequeue, test, refine, re-enqueue.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::MineError;
use crate::rule::Rule;

use super::collector::ResultCollector;
use super::config::MinerConfig;
use super::engine::count_threshold;
use super::queue::WorkQueue;
use super::strategy::MiningStrategy;

/// State shared by the workers of one run.
pub(crate) struct WorkerContext<'a> {
    pub strategy: &'a dyn MiningStrategy,
    pub config: &'a MinerConfig,
    pub queue: &'a WorkQueue,
    pub collector: &'a ResultCollector,
    /// Workers currently waiting on an empty queue.
    pub idle: &'a AtomicUsize,
    pub threads: usize,
}

/// Per-worker counters, summed by the engine at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: usize,
    pub accepted: usize,
    pub enqueued: usize,
    pub failures: usize,
}

impl WorkerStats {
    pub fn merge(&mut self, other: WorkerStats) {
        self.processed += other.processed;
        self.accepted += other.accepted;
        self.enqueued += other.enqueued;
        self.failures += other.failures;
    }
}

/// Process rules until every worker is idle at once.
///
/// A worker counts itself idle the first time it finds the queue empty and
/// stops counting as soon as it dequeues again. Refinements are enqueued
/// before the producing worker can go idle, so an idle count equal to the
/// thread count means no rule is left anywhere.
pub(crate) fn run_worker(ctx: &WorkerContext<'_>, id: usize) -> WorkerStats {
    let mut stats = WorkerStats::default();
    let mut waiting = false;
    let poll = Duration::from_millis(ctx.config.idle_poll_ms);
    loop {
        match ctx.queue.dequeue() {
            Some(rule) => {
                if waiting {
                    ctx.idle.fetch_sub(1, Ordering::SeqCst);
                    waiting = false;
                }
                process(ctx, rule, &mut stats);
            }
            None => {
                if !waiting {
                    waiting = true;
                    ctx.idle.fetch_add(1, Ordering::SeqCst);
                }
                if ctx.idle.load(Ordering::SeqCst) >= ctx.threads {
                    break;
                }
                std::thread::sleep(poll);
            }
        }
    }
    tracing::debug!(
        worker = id,
        processed = stats.processed,
        accepted = stats.accepted,
        enqueued = stats.enqueued,
        "worker finished"
    );
    stats
}

fn process(ctx: &WorkerContext<'_>, mut rule: Rule, stats: &mut WorkerStats) {
    stats.processed += 1;

    let accepted = match catch_unwind(AssertUnwindSafe(|| ctx.strategy.test_acceptance(&mut rule))) {
        Ok(accepted) => accepted,
        Err(_) => {
            stats.failures += 1;
            tracing::warn!(
                error = %MineError::StrategyPanicked { stage: "testing acceptance" },
                rule = ?rule.atoms(),
                "skipping rule"
            );
            false
        }
    };

    let rule = Arc::new(rule);
    if accepted && ctx.collector.insert(Arc::clone(&rule)) {
        stats.accepted += 1;
    }

    let refined = catch_unwind(AssertUnwindSafe(|| {
        if !ctx.strategy.should_refine(&rule) {
            return Ok(Vec::new());
        }
        let threshold = count_threshold(ctx.config, ctx.strategy.head_cardinality(&rule));
        ctx.strategy
            .apply_operators(&rule, threshold)
            .map(|refinements| refinements.into_rules())
    }));
    match refined {
        Ok(Ok(children)) => {
            stats.enqueued += children.len();
            ctx.queue.enqueue_all(children);
        }
        Ok(Err(e)) => {
            stats.failures += 1;
            tracing::warn!(error = %e, "refinement failed; rule has no children");
        }
        Err(_) => {
            stats.failures += 1;
            tracing::warn!(
                error = %MineError::StrategyPanicked { stage: "refining" },
                rule = ?rule.atoms(),
                "refinement failed; rule has no children"
            );
        }
    }
}
