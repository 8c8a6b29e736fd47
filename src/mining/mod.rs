//! Parallel top-down rule search.
//!
//! Seed rules are refined breadth-first by a pool of worker threads sharing a
//! [`WorkQueue`]. Every dequeued rule is tested for acceptance by the
//! [`MiningStrategy`], accepted rules go to the [`ResultCollector`], and
//! refinements reaching the count threshold are enqueued again.

pub mod assistant;
pub mod collector;
pub mod config;
pub mod engine;
pub mod operators;
pub mod queue;
pub mod rewrite;
pub mod strategy;
mod worker;

pub use assistant::DefaultStrategy;
pub use collector::ResultCollector;
pub use config::{ConstantMode, CountingMode, MinerConfig, PruningMetric, RelationFilters};
pub use engine::{Miner, count_threshold};
pub use queue::WorkQueue;
pub use strategy::{MiningStrategy, Operator, OperatorFn, OperatorRegistry, Refinements};
pub use worker::WorkerStats;
