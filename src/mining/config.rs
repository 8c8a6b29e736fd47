//! Miner configuration: thresholds, language bias and optimization switches.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::kb::FactIndex;
use crate::symbol::SymbolId;

/// Which cardinality prunes the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruningMetric {
    /// Absolute support, compared with `min_initial_support`.
    Support,
    /// Support relative to the head relation, compared with `threshold`.
    HeadCoverage,
}

/// How constants may appear in rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstantMode {
    /// Only variables.
    Disallow,
    /// Variables, plus atoms with one argument bound to a frequent constant.
    Allow,
    /// Every rule carries a constant in its last atom.
    Enforce,
}

/// What support and body sizes count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountingMode {
    /// Distinct bindings of the functional variable.
    FunctionalVariable,
    /// Distinct bindings of all head variables (pairs for binary heads).
    HeadBindings,
}

/// Configuration of one mining run. Read-only once the miner starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Metric used for threshold pruning (default: head coverage).
    pub pruning_metric: PruningMetric,
    /// Minimum head coverage when pruning by head coverage (default: 0.01).
    pub threshold: f64,
    /// Minimum support of seed rules, and of every rule under support
    /// pruning (default: 100).
    pub min_initial_support: usize,
    /// Maximum number of atoms in a rule, head included (default: 3).
    pub max_depth: usize,
    /// Maximum occurrences of one relation in a rule (default: 3).
    pub recursivity_limit: usize,
    pub constants: ConstantMode,
    pub counting: CountingMode,
    /// Worker threads; 0 uses the available parallelism (default: 0).
    pub threads: usize,
    pub min_std_confidence: f64,
    pub min_pca_confidence: f64,
    /// Rewrite hard `r(z,x) r(z,y)` joins before counting (default: true).
    pub query_rewriting: bool,
    /// Reject rules whose PCA confidence upper bound is below the minimum
    /// before computing the exact value (default: false).
    pub confidence_upper_bounds: bool,
    /// Count on the more functional head argument (default: false).
    pub functionality_heuristic: bool,
    /// Skip refinements that cannot become closed within `max_depth`
    /// (default: true).
    pub exploit_max_length: bool,
    /// Only output rules whose PCA confidence beats all their closed
    /// ancestors (default: true).
    pub skyline_pruning: bool,
    /// Stop refining rules with PCA confidence 1 (default: false).
    pub perfect_rule_pruning: bool,
    /// Restrict seed heads to these relations (default: all).
    pub seed_relations: Vec<String>,
    pub head_excluded_relations: Vec<String>,
    /// If non-empty, only these relations may be added to bodies.
    pub body_target_relations: Vec<String>,
    pub body_excluded_relations: Vec<String>,
    /// Sleep between dequeue attempts of an idle worker, in ms (default: 50).
    pub idle_poll_ms: u64,
    /// Counting queries slower than this are logged, in ms (default: 20000).
    pub slow_query_ms: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            pruning_metric: PruningMetric::HeadCoverage,
            threshold: 0.01,
            min_initial_support: 100,
            max_depth: 3,
            recursivity_limit: 3,
            constants: ConstantMode::Disallow,
            counting: CountingMode::FunctionalVariable,
            threads: 0,
            min_std_confidence: 0.0,
            min_pca_confidence: 0.0,
            query_rewriting: true,
            confidence_upper_bounds: false,
            functionality_heuristic: false,
            exploit_max_length: true,
            skyline_pruning: true,
            perfect_rule_pruning: false,
            seed_relations: Vec::new(),
            head_excluded_relations: Vec::new(),
            body_target_relations: Vec::new(),
            body_excluded_relations: Vec::new(),
            idle_poll_ms: 50,
            slow_query_ms: 20_000,
        }
    }
}

impl MinerConfig {
    /// Parse and validate a TOML document. Missing fields take defaults.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_toml_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    /// Check value ranges and contradictory relation lists.
    pub fn validate(&self) -> ConfigResult<()> {
        let threshold_ok = match self.pruning_metric {
            PruningMetric::HeadCoverage => (0.0..=1.0).contains(&self.threshold),
            PruningMetric::Support => self.threshold.is_finite() && self.threshold >= 0.0,
        };
        if !threshold_ok {
            return Err(ConfigError::InvalidThreshold {
                metric: match self.pruning_metric {
                    PruningMetric::HeadCoverage => "head coverage".into(),
                    PruningMetric::Support => "support".into(),
                },
                value: self.threshold,
            });
        }
        for (name, value) in [
            ("standard", self.min_std_confidence),
            ("PCA", self.min_pca_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidConfidence { name, value });
            }
        }
        if self.max_depth < 2 {
            return Err(ConfigError::InvalidDepth {
                max_depth: self.max_depth,
            });
        }
        if self.recursivity_limit < 1 {
            return Err(ConfigError::InvalidRecursivityLimit);
        }
        check_disjoint(&self.seed_relations, &self.head_excluded_relations, "head")?;
        check_disjoint(&self.body_target_relations, &self.body_excluded_relations, "body")?;
        Ok(())
    }

    /// Worker count: the configured value clamped to the available
    /// parallelism, which is also used when the value is 0.
    pub fn effective_threads(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        match self.threads {
            0 => available,
            n => n.min(available),
        }
    }

    /// Resolve the relation lists against the labels known to `index`.
    pub fn resolve_relations(&self, index: &dyn FactIndex) -> ConfigResult<RelationFilters> {
        let resolve = |labels: &[String]| -> ConfigResult<Vec<SymbolId>> {
            labels
                .iter()
                .map(|label| {
                    index.lookup(label).ok_or_else(|| ConfigError::UnknownRelation {
                        label: label.clone(),
                    })
                })
                .collect()
        };
        let seeds = resolve(&self.seed_relations)?;
        let body_target = resolve(&self.body_target_relations)?;
        Ok(RelationFilters {
            seeds: (!seeds.is_empty()).then_some(seeds),
            head_excluded: resolve(&self.head_excluded_relations)?.into_iter().collect(),
            body_target: (!body_target.is_empty()).then(|| body_target.into_iter().collect()),
            body_excluded: resolve(&self.body_excluded_relations)?.into_iter().collect(),
        })
    }
}

fn check_disjoint(included: &[String], excluded: &[String], side: &'static str) -> ConfigResult<()> {
    match included.iter().find(|r| excluded.contains(r)) {
        Some(relation) => Err(ConfigError::ConflictingRelations {
            relation: relation.clone(),
            side,
        }),
        None => Ok(()),
    }
}

/// Relation lists resolved to symbols.
#[derive(Debug, Clone, Default)]
pub struct RelationFilters {
    /// Seed head relations; `None` means every relation.
    pub seeds: Option<Vec<SymbolId>>,
    pub head_excluded: HashSet<SymbolId>,
    /// Allowed body relations; `None` means every relation.
    pub body_target: Option<HashSet<SymbolId>>,
    pub body_excluded: HashSet<SymbolId>,
}

impl RelationFilters {
    pub fn allows_head(&self, relation: SymbolId) -> bool {
        !self.head_excluded.contains(&relation)
    }

    pub fn allows_body(&self, relation: SymbolId) -> bool {
        !self.body_excluded.contains(&relation)
            && self
                .body_target
                .as_ref()
                .is_none_or(|targets| targets.contains(&relation))
    }
}
