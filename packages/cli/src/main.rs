#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the soil/trade integration pipeline.
//!
//! ```text
//! soil_trade run --config pipeline.toml [--year 2021] [--merge chunked]
//! soil_trade overrides
//! soil_trade depths --grid data/socd.csv
//! soil_trade select --partner "Japan" [--item Rice]
//! ```
//!
//! Running `soil_trade` with no subcommand enters interactive mode.
//!
//! Uses `indicatif-log-bridge` (via [`soil_trade_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod interactive;

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use soil_trade_cli_utils::{IndicatifProgress, MultiProgress};
use soil_trade_models::MergedTradeSoilRecord;
use soil_trade_pipeline::PipelineConfig;
use soil_trade_pipeline::config::MergeMode;
use soil_trade_trade::YearSelection;

#[derive(Parser)]
#[command(
    name = "soil_trade",
    about = "Join gridded soil carbon data with bilateral food trade flows"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and commit its outputs
    Run(RunArgs),
    /// List the built-in reporter code overrides
    Overrides,
    /// List the depths present in a soil grid table
    Depths {
        /// Long-form grid table (`lon, lat, depth, <variable>`)
        #[arg(long)]
        grid: PathBuf,
        /// Measured variable column
        #[arg(long, default_value = "socd")]
        variable: String,
    },
    /// Print merged rows for one partner country (and optionally one item)
    Select {
        /// Merged table written by `run`
        #[arg(long, default_value = "output/trade_soil.csv")]
        input: PathBuf,
        /// Partner country code or name
        #[arg(long)]
        partner: String,
        /// Food item name
        #[arg(long)]
        item: Option<String>,
    },
}

#[derive(Args, Default)]
struct RunArgs {
    /// Pipeline configuration (TOML). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output directory (overrides `output.dir`)
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// "all", "latest" or a year (overrides `trade.years`)
    #[arg(long)]
    year: Option<YearSelection>,
    /// Aggregation depth in centimetres (overrides `soil.depth`)
    #[arg(long)]
    depth: Option<f64>,
    /// Fail if any selected reporter code cannot be resolved
    #[arg(long)]
    strict_keys: bool,
    /// Merge strategy (overrides `merge.mode`)
    #[arg(long, value_enum)]
    merge: Option<MergeArg>,
    /// Memory budget for the merge stage in MiB (overrides `merge.memory_budget_mb`)
    #[arg(long)]
    memory_budget_mb: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum MergeArg {
    Auto,
    InMemory,
    Chunked,
}

impl From<MergeArg> for MergeMode {
    fn from(arg: MergeArg) -> Self {
        match arg {
            MergeArg::Auto => Self::Auto,
            MergeArg::InMemory => Self::InMemory,
            MergeArg::Chunked => Self::Chunked,
        }
    }
}

impl RunArgs {
    fn into_config(self) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(dir) = self.output_dir {
            config.output.dir = dir;
        }
        if let Some(years) = self.year {
            config.trade.years = years;
        }
        if let Some(depth) = self.depth {
            config.soil.depth = depth;
        }
        if self.strict_keys {
            config.trade.strict_keys = true;
        }
        if let Some(merge) = self.merge {
            config.merge.mode = merge.into();
        }
        if let Some(budget) = self.memory_budget_mb {
            config.merge.memory_budget_mb = budget;
        }

        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = soil_trade_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return interactive::run(&multi);
    };

    match command {
        Commands::Run(args) => run_pipeline(&multi, args)?,
        Commands::Overrides => list_overrides(),
        Commands::Depths { grid, variable } => list_depths(&grid, &variable)?,
        Commands::Select {
            input,
            partner,
            item,
        } => select_rows(&input, &partner, item.as_deref())?,
    }

    Ok(())
}

fn run_pipeline(
    multi: &MultiProgress,
    args: RunArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.into_config()?;
    let start = Instant::now();

    let progress = IndicatifProgress::points_bar(multi, "Attributing soil points");
    let report = soil_trade_pipeline::run(&config, progress.as_ref())?;

    println!();
    println!("Finished in {:.1}s", start.elapsed().as_secs_f64());
    println!(
        "  points:        {} kept, {} matched a country",
        report.ingest.kept, report.attribution.matched
    );
    println!("  countries:     {} with soil summaries", report.country_stats);
    println!(
        "  trade rows:    {} merged, {} with soil data",
        report.merge.rows, report.merge.rows_with_soil
    );
    println!(
        "  reporter keys: {} mapped, {} overridden, {} unresolved",
        report.keys.mapped, report.keys.overridden, report.keys.unresolved
    );
    println!("  outputs:       {}", config.output.dir.display());

    Ok(())
}

fn list_overrides() {
    let overrides = soil_trade_trade::builtin_overrides();
    println!("{:<6} {:<5} {:<24} REASON", "CODE", "ISO3", "LABEL");
    println!("{}", "-".repeat(80));
    for entry in &overrides {
        println!(
            "{:<6} {:<5} {:<24} {}",
            entry.numeric_code, entry.iso3, entry.label, entry.reason
        );
    }
    println!("\n{} override(s)", overrides.len());
}

fn list_depths(grid: &Path, variable: &str) -> Result<(), Box<dyn std::error::Error>> {
    let ingested = soil_trade_soil::grid::read_grid_table(grid, variable)?;
    let depths = soil_trade_soil::aggregate::available_depths(&ingested.points);
    if depths.is_empty() {
        println!("No measurements in {}", grid.display());
        return Ok(());
    }
    for depth in depths {
        let count = ingested
            .points
            .iter()
            .filter(|p| p.depth.total_cmp(&depth).is_eq())
            .count();
        println!("{depth:>8} cm  {count} points");
    }
    Ok(())
}

fn select_rows(
    input: &Path,
    partner: &str,
    item: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader = csv::Reader::from_path(input)?;
    let rows: Vec<MergedTradeSoilRecord> = reader.deserialize().collect::<Result<_, _>>()?;
    let selected = soil_trade_merge::summary::select(&rows, partner, item);

    if selected.is_empty() {
        eprintln!("No rows for partner '{partner}'");
        return Ok(());
    }

    let mut writer = csv::Writer::from_writer(std::io::stdout());
    for row in &selected {
        writer.serialize(row)?;
    }
    writer.flush()?;
    log::info!("{} of {} rows selected", selected.len(), rows.len());
    Ok(())
}
