//! Tab-separated fact files.
//!
//! One fact per line: `subject<TAB>relation<TAB>object`, or with a leading
//! fact identifier column (`id<TAB>subject<TAB>relation<TAB>object`). A final
//! `.` column is ignored. Blank lines and lines starting with `#` or `@` are
//! skipped.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::{KbError, KbResult};

use super::FactIndex;
use super::index::KnowledgeBase;

/// Counters reported by a load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub files: usize,
    pub lines: usize,
    pub facts: usize,
    pub duplicates: usize,
    pub malformed: usize,
}

impl LoadStats {
    fn merge(self, other: Self) -> Self {
        Self {
            files: self.files + other.files,
            lines: self.lines + other.lines,
            facts: self.facts + other.facts,
            duplicates: self.duplicates + other.duplicates,
            malformed: self.malformed + other.malformed,
        }
    }
}

/// Load one file into `kb`.
pub fn load_tsv(kb: &KnowledgeBase, path: &Path) -> KbResult<LoadStats> {
    let content = std::fs::read_to_string(path).map_err(|e| KbError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut stats = LoadStats {
        files: 1,
        ..LoadStats::default()
    };
    for (i, line) in content.lines().enumerate() {
        stats.lines += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('@') {
            continue;
        }
        let Some((s, r, o)) = parse_line(line) else {
            stats.malformed += 1;
            tracing::debug!(path = %path.display(), line = i + 1, "skipping malformed fact line");
            continue;
        };
        if kb.add_fact(s, r, o)? {
            stats.facts += 1;
        } else {
            stats.duplicates += 1;
        }
    }

    if stats.malformed > 0 {
        tracing::warn!(
            path = %path.display(),
            malformed = stats.malformed,
            "fact file contains malformed lines"
        );
    }
    Ok(stats)
}

/// Load several files in parallel into `kb`.
///
/// Fails on the first unreadable file, or when no file contributed a fact.
pub fn load_tsv_files(kb: &KnowledgeBase, paths: &[PathBuf]) -> KbResult<LoadStats> {
    let stats = paths
        .par_iter()
        .map(|path| load_tsv(kb, path))
        .try_reduce(LoadStats::default, |a, b| Ok(a.merge(b)))?;

    if kb.size() == 0 {
        return Err(KbError::NoFacts { files: paths.len() });
    }
    tracing::info!(
        files = stats.files,
        facts = stats.facts,
        duplicates = stats.duplicates,
        malformed = stats.malformed,
        relations = kb.relations().len(),
        "loaded knowledge base"
    );
    Ok(stats)
}

fn parse_line(line: &str) -> Option<(&str, &str, &str)> {
    let mut fields: Vec<&str> = line
        .split('\t')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect();
    if fields.last() == Some(&".") {
        fields.pop();
    }
    match fields.as_slice() {
        [s, r, o] | [_, s, r, o] => Some((*s, *r, *o)),
        _ => None,
    }
}
