// Axel '0vercl0k' Souchet - October 15 2026
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use crashdump_triage::{AnalysisConfig, DumpAnalyzer, StrategySet, SymbolIndex};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// The dump path.
    dump_path: PathBuf,
    /// A text symbol index (`address name` per line).
    #[arg(short, long)]
    symbols: Option<PathBuf>,
    /// Time budget of the scans, in milliseconds.
    #[arg(long)]
    time_budget_ms: Option<u64>,
    /// Maximum number of stack frames.
    #[arg(long, default_value_t = 25)]
    max_frames: usize,
    /// Don't try to find a bug-check anywhere else than in the structures of
    /// the dump.
    #[arg(long, default_value_t = false)]
    structured_only: bool,
    /// Pretty print the report.
    #[arg(short, long, default_value_t = false)]
    pretty: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = AnalysisConfig {
        time_budget_ms: args.time_budget_ms,
        max_frames: args.max_frames,
        ..Default::default()
    };

    if args.structured_only {
        config.strategies = StrategySet::STRUCTURED_OFFSET | StrategySet::EXCEPTION_STREAM;
    }

    let mut analyzer =
        DumpAnalyzer::new(config).with_filename(args.dump_path.display().to_string());
    if let Some(path) = args.symbols {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let index = SymbolIndex::parse(&text);
        if index.rejected > 0 {
            tracing::warn!("{} lines of {} were skipped", index.rejected, path.display());
        }

        analyzer = analyzer.with_symbols(index);
    }

    let data = fs::read(&args.dump_path)
        .with_context(|| format!("failed to read {}", args.dump_path.display()))?;
    let report = analyzer
        .analyze(&data)
        .context("failed to analyze the dump")?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };

    println!("{json}");

    Ok(())
}
