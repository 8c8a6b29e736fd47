//! rulemine CLI: mine Horn rules from tab-separated fact files.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};

use rulemine::kb::{KnowledgeBase, load_tsv_files};
use rulemine::mining::{ConstantMode, CountingMode, Miner, MinerConfig, PruningMetric};
use rulemine::report;

#[derive(Parser)]
#[command(name = "rulemine", version, about = "Parallel Horn-rule mining over knowledge graphs")]
struct Cli {
    /// Fact files: `subject<TAB>relation<TAB>object` per line.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// TOML configuration file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Minimum head coverage for pruning.
    #[arg(long, conflicts_with = "min_support")]
    min_hc: Option<f64>,

    /// Prune by absolute support instead of head coverage.
    #[arg(long)]
    min_support: Option<usize>,

    /// Minimum support of seed rules.
    #[arg(long)]
    min_initial_support: Option<usize>,

    /// Maximum number of atoms per rule, head included.
    #[arg(long)]
    max_depth: Option<usize>,

    /// Minimum PCA confidence of output rules.
    #[arg(long)]
    min_pca: Option<f64>,

    /// Minimum standard confidence of output rules.
    #[arg(long)]
    min_std: Option<f64>,

    /// Worker threads (0 = all cores).
    #[arg(long)]
    threads: Option<usize>,

    #[arg(long, value_enum)]
    constants: Option<Constants>,

    #[arg(long, value_enum)]
    counting: Option<Counting>,

    /// Head relations to seed from (comma-separated).
    #[arg(long, value_delimiter = ',')]
    seeds: Vec<String>,

    /// Relations never used as rule heads (comma-separated).
    #[arg(long, value_delimiter = ',')]
    exclude_head: Vec<String>,

    /// Relations never used in rule bodies (comma-separated).
    #[arg(long, value_delimiter = ',')]
    exclude_body: Vec<String>,

    /// Disable rewriting of hard join patterns.
    #[arg(long)]
    no_rewrite: bool,

    /// Print a JSON array at the end instead of streaming TSV rows.
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Constants {
    Disallow,
    Allow,
    Enforce,
}

#[derive(Clone, Copy, ValueEnum)]
enum Counting {
    FunctionalVariable,
    HeadBindings,
}

impl Cli {
    fn miner_config(&self) -> Result<MinerConfig> {
        let mut config = match &self.config {
            Some(path) => MinerConfig::from_toml_file(path)?,
            None => MinerConfig::default(),
        };
        if let Some(hc) = self.min_hc {
            config.pruning_metric = PruningMetric::HeadCoverage;
            config.threshold = hc;
        }
        if let Some(support) = self.min_support {
            config.pruning_metric = PruningMetric::Support;
            config.min_initial_support = support;
        }
        if let Some(support) = self.min_initial_support {
            config.min_initial_support = support;
        }
        if let Some(depth) = self.max_depth {
            config.max_depth = depth;
        }
        if let Some(pca) = self.min_pca {
            config.min_pca_confidence = pca;
        }
        if let Some(std) = self.min_std {
            config.min_std_confidence = std;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(constants) = self.constants {
            config.constants = match constants {
                Constants::Disallow => ConstantMode::Disallow,
                Constants::Allow => ConstantMode::Allow,
                Constants::Enforce => ConstantMode::Enforce,
            };
        }
        if let Some(counting) = self.counting {
            config.counting = match counting {
                Counting::FunctionalVariable => CountingMode::FunctionalVariable,
                Counting::HeadBindings => CountingMode::HeadBindings,
            };
        }
        if !self.seeds.is_empty() {
            config.seed_relations = self.seeds.clone();
        }
        config.head_excluded_relations.extend(self.exclude_head.iter().cloned());
        config.body_excluded_relations.extend(self.exclude_body.iter().cloned());
        if self.no_rewrite {
            config.query_rewriting = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // ignore error if a hook is already set

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.miner_config()?;

    let kb = Arc::new(KnowledgeBase::new());
    load_tsv_files(&kb, &cli.files)?;
    let miner = Miner::new(kb.clone(), config)?;

    if cli.json {
        let rules = miner.mine()?;
        let json = report::to_json(rules.iter().map(|r| r.as_ref()), kb.as_ref()).into_diagnostic()?;
        println!("{json}");
    } else {
        let index = kb.as_ref();
        let mut out = report::TsvWriter::new(std::io::stdout());
        out.write_header();
        miner.mine_streaming(|rule| {
            out.write_row(rule, index);
        })?;
    }
    Ok(())
}
