#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! End-to-end soil/trade integration run.
//!
//! Stages run in order, each consuming the previous stage's output:
//!
//! 1. Load country polygons and build the spatial index.
//! 2. Flatten the soil grid into measurement points.
//! 3. Attribute points to countries and aggregate at the target depth.
//! 4. Read the trade matrix and resolve reporter codes to ISO3.
//! 5. Left-join trade rows with the country soil summaries.
//! 6. Stage every table and the run report, then commit them, run report
//!    last.
//!
//! The merge stage runs in memory or in chunks depending on the size of the
//! trade input (see [`soil_trade_merge::MergeStrategy`]).

pub mod config;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use soil_trade_export::Staging;
use soil_trade_merge::summary::PartnerSummaryBuilder;
use soil_trade_merge::{ChunkedMerger, MergeCounts, MergeStrategy, StatTable};
use soil_trade_models::progress::ProgressCallback;
use soil_trade_models::{
    AttributedMeasurement, CountrySoilStat, MergedTradeSoilRecord, TradeRecord,
};
use soil_trade_soil::aggregate::{aggregate, filter_depth};
use soil_trade_soil::attribute::{AttributionReport, attribute};
use soil_trade_soil::grid::{IngestReport, read_grid_table};
use soil_trade_spatial::{CountryIndex, load_countries};
use soil_trade_trade::encoding::encoding_for_label;
use soil_trade_trade::normalize::{latest_year, open_input, read_trade_records, select_years};
use soil_trade_trade::{
    KeyReport, KeyTable, ReadCounts, TradeNormalizer, YearSelection, read_key_table,
    scan_trade_matrix,
};

pub use config::PipelineConfig;
use config::MergeMode;

/// Per-country soil summaries.
pub const COUNTRY_STATS_FILE: &str = "country_soil_stats.csv";
/// Attributed points at the target depth.
pub const SOIL_POINTS_FILE: &str = "soil_points.csv";
/// Trade rows joined with reporter soil summaries.
pub const TRADE_SOIL_FILE: &str = "trade_soil.csv";
/// Per-partner import totals.
pub const PARTNER_SUMMARY_FILE: &str = "partner_summary.csv";
/// Counts and settings of the run.
pub const RUN_REPORT_FILE: &str = "run_report.json";

/// Errors from a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Invalid configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },

    /// I/O error outside a stage (e.g. reading the configuration).
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    #[error(transparent)]
    Spatial(#[from] soil_trade_spatial::SpatialError),

    #[error(transparent)]
    Soil(#[from] soil_trade_soil::SoilError),

    #[error(transparent)]
    Trade(#[from] soil_trade_trade::TradeError),

    #[error(transparent)]
    Merge(#[from] soil_trade_merge::MergeError),

    #[error(transparent)]
    Export(#[from] soil_trade_export::ExportError),
}

/// Settings the run actually used.
#[derive(Debug, Clone, Serialize)]
pub struct RunSettings {
    pub depth: f64,
    pub element_code: i32,
    pub years: YearSelection,
    /// The year kept, once `years` is resolved. `None` keeps every year.
    pub year: Option<i32>,
    pub strict_keys: bool,
    pub merge_strategy: MergeStrategy,
}

/// Everything a run counted, written as `run_report.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub settings: RunSettings,
    pub countries_loaded: usize,
    pub countries_skipped: usize,
    pub ingest: IngestReport,
    /// Points dropped by the depth pre-filter.
    pub points_other_depths: u64,
    pub attribution: AttributionReport,
    pub country_stats: usize,
    pub soil_points_written: u64,
    pub trade: ReadCounts,
    pub keys: KeyReport,
    pub merge: MergeCounts,
    pub partners: usize,
    pub outputs: Vec<String>,
}

struct SoilStage {
    stats: Vec<CountrySoilStat>,
    points: Vec<AttributedMeasurement>,
    ingest: IngestReport,
    points_other_depths: u64,
    attribution: AttributionReport,
}

struct TradeStage {
    year: Option<i32>,
    strategy: MergeStrategy,
    read: ReadCounts,
    keys: KeyReport,
    merge: MergeCounts,
    partners: usize,
}

/// Runs every stage and commits the outputs to `config.output.dir`.
///
/// Nothing is written to the output directory's final paths unless every
/// stage succeeds.
///
/// # Errors
///
/// Returns [`PipelineError`] from the first stage that fails.
pub fn run(
    config: &PipelineConfig,
    progress: &dyn ProgressCallback,
) -> Result<RunReport, PipelineError> {
    let started_at = Utc::now();
    config.validate()?;

    std::fs::create_dir_all(&config.output.dir).map_err(|e| PipelineError::Io {
        path: config.output.dir.display().to_string(),
        source: e,
    })?;
    let mut staging = Staging::begin(&config.output.dir)?;

    log::info!("Loading country polygons from {}", config.countries.geojson.display());
    let loaded = load_countries(&config.countries.geojson)?;
    let countries_skipped = loaded.skipped;
    let index = CountryIndex::new(loaded.polygons);
    let countries_loaded = index.len();

    let soil = run_soil(config, &index, progress)?;
    staging.write_csv(COUNTRY_STATS_FILE, &soil.stats)?;

    let soil_points_written = if config.output.soil_points {
        let subset: Option<BTreeSet<&str>> = config
            .output
            .soil_points_iso3
            .as_ref()
            .map(|codes| codes.iter().map(String::as_str).collect());
        staging.write_csv(
            SOIL_POINTS_FILE,
            soil.points.iter().filter(|point| {
                subset.as_ref().is_none_or(|subset| {
                    point.iso3.as_deref().is_some_and(|iso3| subset.contains(iso3))
                })
            }),
        )?
    } else {
        0
    };

    let stat_table = StatTable::new(soil.stats.iter().cloned())?;
    let trade = run_trade(config, &stat_table, &mut staging)?;

    let report = RunReport {
        started_at,
        finished_at: Utc::now(),
        settings: RunSettings {
            depth: config.soil.depth,
            element_code: config.trade.element_code,
            years: config.trade.years,
            year: trade.year,
            strict_keys: config.trade.strict_keys,
            merge_strategy: trade.strategy,
        },
        countries_loaded,
        countries_skipped,
        ingest: soil.ingest,
        points_other_depths: soil.points_other_depths,
        attribution: soil.attribution,
        country_stats: soil.stats.len(),
        soil_points_written,
        trade: trade.read,
        keys: trade.keys,
        merge: trade.merge,
        partners: trade.partners,
        outputs: output_names(config)
            .into_iter()
            .map(ToString::to_string)
            .collect(),
    };
    staging.write_marker(RUN_REPORT_FILE, &report)?;
    staging.commit()?;

    log::info!(
        "Run complete: {} country summaries, {} trade rows ({} with soil data)",
        report.country_stats,
        report.merge.rows,
        report.merge.rows_with_soil
    );

    Ok(report)
}

fn run_soil(
    config: &PipelineConfig,
    index: &CountryIndex,
    progress: &dyn ProgressCallback,
) -> Result<SoilStage, PipelineError> {
    let depth = config.soil.depth;

    log::info!("Reading soil grid from {}", config.soil.grid.display());
    let ingested = read_grid_table(&config.soil.grid, &config.soil.variable)?;

    let (points, points_other_depths) = if config.soil.prefilter_depth {
        let kept = filter_depth(&ingested.points, depth);
        let dropped = (ingested.points.len() - kept.len()) as u64;
        log::info!("Depth pre-filter kept {} of {} points", kept.len(), ingested.points.len());
        (kept, dropped)
    } else {
        (ingested.points, 0)
    };

    let attribution = attribute(&points, index, progress);
    let stats = aggregate(&attribution.rows, depth, index);

    Ok(SoilStage {
        stats,
        points: filter_depth(&attribution.rows, depth),
        ingest: ingested.report,
        points_other_depths,
        attribution: attribution.report,
    })
}

fn input_size(path: &Path) -> Result<u64, PipelineError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| PipelineError::Io {
            path: path.display().to_string(),
            source: e,
        })
}

fn choose_strategy(config: &PipelineConfig) -> Result<MergeStrategy, PipelineError> {
    let merge = &config.merge;
    Ok(match merge.mode {
        MergeMode::InMemory => MergeStrategy::InMemory,
        MergeMode::Chunked => match merge.chunk_rows {
            Some(chunk_rows) => MergeStrategy::Chunked { chunk_rows },
            // Force chunking by pretending the input exceeds any budget.
            None => MergeStrategy::choose(u64::MAX, merge.budget_bytes()),
        },
        MergeMode::Auto => {
            let strategy =
                MergeStrategy::choose(input_size(&config.trade.matrix)?, merge.budget_bytes());
            match (strategy, merge.chunk_rows) {
                (MergeStrategy::Chunked { .. }, Some(chunk_rows)) => {
                    MergeStrategy::Chunked { chunk_rows }
                }
                (strategy, _) => strategy,
            }
        }
    })
}

fn run_trade(
    config: &PipelineConfig,
    stats: &StatTable,
    staging: &mut Staging,
) -> Result<TradeStage, PipelineError> {
    let trade = &config.trade;
    let encoding = encoding_for_label(&trade.encoding)?;
    let key_encoding = encoding_for_label(&trade.key_encoding)?;
    let label = trade.matrix.display().to_string();

    let keys = KeyTable::with_builtin_overrides(read_key_table(&trade.key_table, key_encoding)?)?;
    let strategy = choose_strategy(config)?;
    let mut normalizer = TradeNormalizer::new(&keys);
    let mut summary = PartnerSummaryBuilder::new();

    let filter = trade.filter();
    let (year, read, merge) = match strategy {
        MergeStrategy::InMemory => {
            let (records, read) = read_trade_records(
                open_input(&trade.matrix)?,
                &label,
                &filter.every_year(encoding),
            )?;
            let year = filter.years.resolve(latest_year(&records));
            let records = select_years(records, filter.years);
            if trade.strict_keys {
                keys.validate(records.iter().map(|r: &TradeRecord| r.reporter_code))?;
            }

            let trades: Vec<_> = records.into_iter().map(|r| normalizer.resolve(r)).collect();
            let (rows, merge) = soil_trade_merge::merge(&trades, stats);
            summary.extend(&rows);
            staging.write_csv(TRADE_SOIL_FILE, &rows)?;
            (year, read, merge)
        }
        MergeStrategy::Chunked { chunk_rows } => {
            let options = if filter.needs_scan() || trade.strict_keys {
                let scan = scan_trade_matrix(
                    open_input(&trade.matrix)?,
                    &label,
                    encoding,
                    filter.element_code,
                )?;
                let options = filter.read_options(encoding, scan.latest_year());
                if trade.strict_keys {
                    keys.validate(scan.reporter_codes(options.year))?;
                }
                options
            } else {
                filter.read_options(encoding, None)
            };
            let year = options.year;

            let mut sink = staging.csv_sink::<MergedTradeSoilRecord>(TRADE_SOIL_FILE)?;
            let mut merger = ChunkedMerger::new(stats, chunk_rows, |chunk| {
                summary.extend(chunk);
                sink.write_rows(chunk)
            });
            let read = normalizer.for_each(open_input(&trade.matrix)?, &label, &options, |t| {
                merger.push(&t).map_err(PipelineError::from)
            })?;
            let merge = merger.finish()?;
            sink.finish()?;
            (year, read, merge)
        }
    };

    let key_report = normalizer.finish();
    let partners = summary.build();
    staging.write_csv(PARTNER_SUMMARY_FILE, &partners)?;

    Ok(TradeStage {
        year,
        strategy,
        read,
        keys: key_report,
        merge,
        partners: partners.len(),
    })
}

fn output_names(config: &PipelineConfig) -> Vec<&'static str> {
    let mut names = vec![COUNTRY_STATS_FILE];
    if config.output.soil_points {
        names.push(SOIL_POINTS_FILE);
    }
    names.extend([TRADE_SOIL_FILE, PARTNER_SUMMARY_FILE, RUN_REPORT_FILE]);
    names
}

/// The final paths a successful run writes.
#[must_use]
pub fn output_paths(config: &PipelineConfig) -> Vec<PathBuf> {
    output_names(config)
        .into_iter()
        .map(|name| config.output.dir.join(name))
        .collect()
}
