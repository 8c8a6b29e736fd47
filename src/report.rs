//! Output formats for accepted rules.
//!
//! Rows follow the column layout of AMIE's tab-separated output, so existing
//! tooling that parses it can read rulemine results unchanged.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::kb::FactIndex;
use crate::rule::Rule;

/// Column headers of [`tsv_row`].
pub const TSV_HEADERS: [&str; 8] = [
    "Rule",
    "Head Coverage",
    "Std Confidence",
    "PCA Confidence",
    "Positive Examples",
    "Body size",
    "PCA Body size",
    "Functional variable",
];

pub fn tsv_header() -> String {
    TSV_HEADERS.join("\t")
}

/// One tab-separated row for `rule`.
pub fn tsv_row(rule: &Rule, index: &dyn FactIndex) -> String {
    let record = RuleRecord::new(rule, index);
    format!(
        "{}\t{:.8}\t{:.8}\t{:.8}\t{}\t{}\t{}\t{}",
        record.rule,
        record.head_coverage,
        record.std_confidence,
        record.pca_confidence,
        record.support,
        record.body_size,
        record.pca_body_size,
        record.functional_variable,
    )
}

/// Streams TSV rows to `out` and stops writing after the first error.
pub struct TsvWriter<W> {
    out: W,
    failed: bool,
}

impl<W: Write> TsvWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, failed: false }
    }

    pub fn write_header(&mut self) -> bool {
        self.write_line(&tsv_header())
    }

    /// Write the row of `rule`. Returns `false` once output has failed.
    pub fn write_row(&mut self, rule: &Rule, index: &dyn FactIndex) -> bool {
        if self.failed {
            return false;
        }
        self.write_line(&tsv_row(rule, index))
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, line: &str) -> bool {
        if self.failed {
            return false;
        }
        if let Err(e) = writeln!(self.out, "{line}") {
            tracing::warn!(error = %e, "writing rules failed; no further rules are printed");
            self.failed = true;
            return false;
        }
        true
    }
}

/// Exported rule with resolved labels and metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    /// Rendered rule, body first.
    pub rule: String,
    /// Head atom alone.
    pub head: String,
    /// Body atoms in rule order.
    pub body: Vec<String>,
    pub head_coverage: f64,
    pub std_confidence: f64,
    pub pca_confidence: f64,
    /// Positive examples (support).
    pub support: usize,
    /// Standard body size, 0 if never computed.
    pub body_size: usize,
    /// PCA body size, 0 if never computed.
    pub pca_body_size: usize,
    /// Head variable support is counted on, e.g. `?a`.
    pub functional_variable: String,
}

impl RuleRecord {
    pub fn new(rule: &Rule, index: &dyn FactIndex) -> Self {
        let label = |a: &crate::rule::atom::Atom| -> String {
            a.terms()
                .iter()
                .map(|t| match t.as_const() {
                    Some(c) => index.resolve_label(c),
                    None => t.as_var().map(|v| v.to_string()).unwrap_or_default(),
                })
                .collect::<Vec<_>>()
                .join(" ")
        };
        Self {
            rule: rule.display(index),
            head: label(rule.head()),
            body: rule.body().iter().map(&label).collect(),
            head_coverage: rule.head_coverage(),
            std_confidence: rule.std_confidence(),
            pca_confidence: rule.pca_confidence(),
            support: rule.support(),
            body_size: rule.std_body_size().unwrap_or(0),
            pca_body_size: rule.pca_body_size().unwrap_or(0),
            functional_variable: rule
                .functional_variable()
                .map(|v| v.to_string())
                .unwrap_or_default(),
        }
    }
}

/// Pretty-printed JSON array of `rules`.
pub fn to_json<'a>(
    rules: impl IntoIterator<Item = &'a Rule>,
    index: &dyn FactIndex,
) -> serde_json::Result<String> {
    let records: Vec<RuleRecord> = rules.into_iter().map(|r| RuleRecord::new(r, index)).collect();
    serde_json::to_string_pretty(&records)
}
