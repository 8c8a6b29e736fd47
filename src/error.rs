//! Rich diagnostic error types for the rulemine engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the rulemine engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum RuleMineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Kb(#[from] KbError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Mine(#[from] MineError),
}

// ---------------------------------------------------------------------------
// Knowledge base errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum KbError {
    #[error("cannot read fact file {path}")]
    #[diagnostic(
        code(rulemine::kb::io),
        help(
            "The fact file could not be opened or read. Check that the path exists \
             and is readable."
        )
    )]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("symbol allocator exhausted: cannot allocate more than u64::MAX symbols")]
    #[diagnostic(
        code(rulemine::kb::symbols_exhausted),
        help(
            "The symbol ID space is exhausted. This requires 2^64 distinct labels \
             and indicates an allocation loop."
        )
    )]
    SymbolsExhausted,

    #[error("no facts loaded from {files} file(s)")]
    #[diagnostic(
        code(rulemine::kb::empty),
        help(
            "Every line was blank, a comment, or malformed. Facts must be \
             tab-separated `subject<TAB>relation<TAB>object` lines."
        )
    )]
    NoFacts { files: usize },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("invalid threshold {value} for {metric}")]
    #[diagnostic(
        code(rulemine::config::threshold),
        help(
            "Head coverage thresholds are ratios in [0, 1]; support thresholds \
             are non-negative counts."
        )
    )]
    InvalidThreshold { metric: String, value: f64 },

    #[error("invalid {name} confidence threshold {value}")]
    #[diagnostic(
        code(rulemine::config::confidence),
        help("Confidence thresholds must lie in [0, 1].")
    )]
    InvalidConfidence { name: &'static str, value: f64 },

    #[error("max_depth must be at least 2, got {max_depth}")]
    #[diagnostic(
        code(rulemine::config::depth),
        help("A rule needs a head and at least one body atom, so max_depth >= 2.")
    )]
    InvalidDepth { max_depth: usize },

    #[error("recursivity_limit must be at least 1")]
    #[diagnostic(
        code(rulemine::config::recursivity),
        help("Set recursivity_limit to the number of times one relation may occur in a rule.")
    )]
    InvalidRecursivityLimit,

    #[error("relation '{relation}' is both included and excluded in the {side} relation lists")]
    #[diagnostic(
        code(rulemine::config::conflicting_relations),
        help(
            "A relation cannot be a target and excluded at the same time. Remove it \
             from one of the two lists."
        )
    )]
    ConflictingRelations { relation: String, side: &'static str },

    #[error("unknown relation '{label}'")]
    #[diagnostic(
        code(rulemine::config::unknown_relation),
        help("The relation does not occur in the loaded facts. Check its spelling.")
    )]
    UnknownRelation { label: String },

    #[error("cannot read configuration file {path}")]
    #[diagnostic(
        code(rulemine::config::io),
        help("Check that the configuration file exists and is readable.")
    )]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration parse error: {message}")]
    #[diagnostic(
        code(rulemine::config::parse),
        help("The configuration must be valid TOML with the fields of MinerConfig.")
    )]
    Parse { message: String },
}

// ---------------------------------------------------------------------------
// Mining errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum MineError {
    #[error("operator '{operator}' failed on {rule}: {message}")]
    #[diagnostic(
        code(rulemine::mine::operator),
        help(
            "The refinement operator could not expand this rule. The rule is \
             treated as having no refinements."
        )
    )]
    Operator {
        operator: &'static str,
        rule: String,
        message: String,
    },

    #[error("rule has no variable in its head: {rule}")]
    #[diagnostic(
        code(rulemine::mine::ground_head),
        help("Head atoms must keep at least one variable to count support on.")
    )]
    GroundHead { rule: String },

    #[error("strategy panicked while {stage}")]
    #[diagnostic(
        code(rulemine::mine::panic),
        help("A mining strategy panicked. The affected rule was skipped.")
    )]
    StrategyPanicked { stage: &'static str },

    #[error("failed to spawn thread '{thread}'")]
    #[diagnostic(
        code(rulemine::mine::spawn),
        help(
            "The operating system refused to start a mining thread. Lower the \
             thread count or raise the process limits."
        )
    )]
    Spawn {
        thread: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for knowledge base operations.
pub type KbResult<T> = std::result::Result<T, KbError>;

/// Result type for configuration handling.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type for mining operations.
pub type MineResult<T> = std::result::Result<T, MineError>;

/// Convenience alias for functions returning rulemine results.
pub type RuleMineResult<T> = std::result::Result<T, RuleMineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_top_level() {
        let err = ConfigError::InvalidDepth { max_depth: 1 };
        let top: RuleMineError = err.into();
        assert!(matches!(
            top,
            RuleMineError::Config(ConfigError::InvalidDepth { max_depth: 1 })
        ));
    }

    #[test]
    fn kb_error_converts_to_top_level() {
        let top: RuleMineError = KbError::SymbolsExhausted.into();
        assert!(matches!(top, RuleMineError::Kb(KbError::SymbolsExhausted)));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = ConfigError::ConflictingRelations {
            relation: "livesIn".into(),
            side: "head",
        };
        let msg = format!("{err}");
        assert!(msg.contains("livesIn"));
        assert!(msg.contains("head"));
    }
}
