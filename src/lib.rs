// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # rulemine
//!
//! Parallel mining of Horn rules over knowledge graphs under the partial
//! completeness assumption, in the style of AMIE.
//!
//! ## Architecture
//!
//! - **Knowledge base** (`kb`): interned triples indexed three ways, with a
//!   conjunctive-query evaluator behind the [`kb::FactIndex`] trait
//! - **Rules** (`rule`): atoms, rules, metrics and canonical structural keys
//! - **Mining** (`mining`): refinement operators, acceptance tests and the
//!   multi-threaded search engine
//! - **Report** (`report`): AMIE-compatible TSV rows and JSON records
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use rulemine::kb::{KnowledgeBase, load_tsv};
//! use rulemine::mining::{Miner, MinerConfig};
//!
//! let kb = Arc::new(KnowledgeBase::new());
//! load_tsv(&kb, "facts.tsv".as_ref()).unwrap();
//! let miner = Miner::new(kb.clone(), MinerConfig::default()).unwrap();
//! for rule in miner.mine().unwrap() {
//!     println!("{}  pca={:.3}", rule.display(kb.as_ref()), rule.pca_confidence());
//! }
//! ```

pub mod error;
pub mod kb;
pub mod mining;
pub mod report;
pub mod rule;
pub mod symbol;
