use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use xau_advisor::config::AdvisorConfig;
use xau_advisor::data::csv_source::read_candle_file;
use xau_advisor::data::{load_snapshot, open_source, SnapshotFiles};
use xau_advisor::trading_core::levels::analyze_round_levels;
use xau_advisor::trading_core::report::DEFAULT_INSTRUMENT;
use xau_advisor::trading_core::{build_report, AdvisorReport, MarketSnapshot};

#[derive(Parser, Debug)]
#[command(name = "pipeline")]
#[command(about = "XAUUSD analysis pipeline: reports, batches and level maps")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Analysis config overrides (JSON)
    #[arg(long, global = true, env = "XAU_CONFIG")]
    config: Option<PathBuf>,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the full report for one snapshot file
    Report {
        /// Snapshot JSON
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report on every snapshot in a directory, in parallel
    Batch {
        /// Directory containing snapshot .json files
        #[arg(short, long)]
        input_dir: PathBuf,

        /// Output directory for reports
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },

    /// Psychological level map for a candle file
    Levels {
        /// Candle CSV (.csv or .csv.zst)
        #[arg(short, long)]
        candles: PathBuf,

        /// Current price
        #[arg(short, long)]
        price: f64,

        /// Max distance from the price in points
        #[arg(short, long, default_value = "100")]
        max_distance: f64,
    },

    /// Load a live snapshot from the data directory and report on it
    Fetch {
        /// Directory with <INSTRUMENT>_<tf>.csv[.zst] candle files
        #[arg(short, long, env = "XAU_DATA_DIR")]
        data_dir: PathBuf,

        /// Candle cache directory
        #[arg(short, long, env = "XAU_CACHE_DIR")]
        cache_dir: Option<PathBuf>,

        /// Economic calendar JSON
        #[arg(short, long, env = "XAU_EVENTS_FILE")]
        events: Option<PathBuf>,

        /// DXY/bond quotes JSON
        #[arg(short, long, env = "XAU_ALIGNMENT_FILE")]
        alignment: Option<PathBuf>,

        #[arg(long, default_value = DEFAULT_INSTRUMENT)]
        instrument: String,

        /// Snapshot time (RFC 3339), defaults to now
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,

        /// Also save the loaded snapshot
        #[arg(long)]
        save_snapshot: Option<PathBuf>,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = AdvisorConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Report { snapshot, output } => {
            run_report(&snapshot, output.as_deref(), &config)?;
        }
        Commands::Batch { input_dir, output_dir } => {
            run_batch(&input_dir, &output_dir, &config)?;
        }
        Commands::Levels { candles, price, max_distance } => {
            run_levels(&candles, price, max_distance, &config)?;
        }
        Commands::Fetch {
            data_dir, cache_dir, events, alignment,
            instrument, as_of, save_snapshot, output,
        } => {
            let files = SnapshotFiles { events, alignment };
            run_fetch(
                data_dir, cache_dir, files,
                &instrument, as_of.unwrap_or_else(Utc::now),
                save_snapshot.as_deref(), output.as_deref(), &config,
            ).await?;
        }
    }

    Ok(())
}

fn read_snapshot(path: &Path) -> Result<MarketSnapshot> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read snapshot: {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid snapshot: {:?}", path))
}

fn write_json<T: serde::Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
            info!("Wrote {:?}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn log_report(report: &AdvisorReport) {
    let rec = &report.recommendation;
    info!("Mode: {} ({:.2})", report.trading_mode.mode, report.trading_mode.confidence);
    info!("Scenarios: {}", report.scenarios.summary);
    info!("{} | confidence {:.2} | R:R {}", rec.summary, rec.confidence, rec.risk_reward_ratio);
    for warning in &rec.warnings {
        warn!("{}", warning);
    }
}

fn run_report(snapshot_path: &Path, output: Option<&Path>, config: &AdvisorConfig) -> Result<()> {
    info!("=== REPORT ===");
    let snapshot = read_snapshot(snapshot_path)?;
    let report = build_report(&snapshot, config)
        .with_context(|| format!("Report failed for {:?}", snapshot_path))?;
    log_report(&report);
    write_json(&report, output)
}

fn run_batch(input_dir: &Path, output_dir: &Path, config: &AdvisorConfig) -> Result<()> {
    info!("=== BATCH ===");
    info!("Input directory: {:?}", input_dir);
    info!("Output directory: {:?}", output_dir);

    std::fs::create_dir_all(output_dir)?;

    let mut files = Vec::new();
    for entry in std::fs::read_dir(input_dir)
        .with_context(|| format!("Failed to read directory: {:?}", input_dir))?
    {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    info!("Found {} snapshots", files.len());

    let results: Vec<(PathBuf, Result<()>)> = files
        .par_iter()
        .map(|path| {
            let result = read_snapshot(path)
                .and_then(|snapshot| Ok(build_report(&snapshot, config)?))
                .and_then(|report| {
                    let name = path.file_name().map(|n| n.to_owned()).unwrap_or_default();
                    write_json(&report, Some(&output_dir.join(name)))
                });
            (path.clone(), result)
        })
        .collect();

    let failed: Vec<_> = results.iter().filter(|(_, r)| r.is_err()).collect();
    for (path, result) in &failed {
        if let Err(e) = result {
            warn!("{:?}: {:#}", path, e);
        }
    }
    info!("Batch complete: {} ok, {} failed", results.len() - failed.len(), failed.len());
    if !files.is_empty() && failed.len() == files.len() {
        bail!("Every snapshot failed");
    }
    Ok(())
}

fn run_levels(candles_path: &Path, price: f64, max_distance: f64, config: &AdvisorConfig) -> Result<()> {
    let candles = read_candle_file(candles_path)?;
    info!("Loaded {} candles from {:?}", candles.len(), candles_path);
    let map = analyze_round_levels(price, &candles, max_distance, &config.levels)?;
    for level in &map.levels {
        info!(
            "{:>8.2} {:<10} strength {:.2} | {} bounces, {} breaks",
            level.price, level.kind, level.strength, level.bounce_count, level.break_count
        );
    }
    info!("{}", map.summary);
    write_json(&map, None)
}

#[allow(clippy::too_many_arguments)]
async fn run_fetch(
    data_dir: PathBuf,
    cache_dir: Option<PathBuf>,
    files: SnapshotFiles,
    instrument: &str,
    as_of: DateTime<Utc>,
    save_snapshot: Option<&Path>,
    output: Option<&Path>,
    config: &AdvisorConfig,
) -> Result<()> {
    info!("=== FETCH ===");
    info!("Data directory: {:?}", data_dir);

    let source = open_source(Some(data_dir), cache_dir).context("No candle source")?;

    let snapshot = load_snapshot(source, instrument, as_of, &files).await?;
    if let Some(path) = save_snapshot {
        write_json(&snapshot, Some(path))?;
    }
    let report = build_report(&snapshot, config)?;
    log_report(&report);
    write_json(&report, output)
}
