#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Left join of trade rows with per-country soil summaries.
//!
//! Every trade row survives the join. Rows whose reporter has no ISO3 code,
//! or whose ISO3 code has no soil summary, carry empty soil fields.
//!
//! Two strategies produce identical rows:
//!
//! - [`merge`] materializes the whole result.
//! - [`ChunkedMerger`] merges a bounded number of rows at a time and hands
//!   each chunk to a sink, so peak memory is one chunk plus the
//!   [`StatTable`].

pub mod summary;

use std::collections::BTreeMap;

use serde::Serialize;
use soil_trade_models::{CountrySoilStat, MergedTradeSoilRecord, ResolvedTrade};

/// Smallest chunk the chunked strategy will use.
pub const MIN_CHUNK_ROWS: usize = 1_000;
/// Largest chunk the chunked strategy will use.
pub const MAX_CHUNK_ROWS: usize = 1_000_000;
/// Rough in-memory size of one merged row (strings included).
pub const MERGED_ROW_BYTES: u64 = 320;
/// In-memory bytes per byte of delimited trade input.
pub const INPUT_EXPANSION_FACTOR: u64 = 3;

/// Errors from merging.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// The soil summaries contain the same ISO3 code more than once.
    #[error("Duplicate ISO3 code in soil summaries: {iso3}")]
    DuplicateKey {
        /// The repeated code.
        iso3: String,
    },
}

// ============================================================
// Stat table
// ============================================================

/// Soil summaries keyed by ISO3 code.
#[derive(Debug, Clone, Default)]
pub struct StatTable {
    by_iso3: BTreeMap<String, CountrySoilStat>,
}

impl StatTable {
    /// Indexes `stats` by ISO3 code.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::DuplicateKey`] if two summaries share an ISO3
    /// code. A duplicate would fan out trade rows in the join.
    pub fn new(stats: impl IntoIterator<Item = CountrySoilStat>) -> Result<Self, MergeError> {
        let mut by_iso3 = BTreeMap::new();
        for stat in stats {
            if by_iso3.contains_key(&stat.iso3) {
                return Err(MergeError::DuplicateKey { iso3: stat.iso3 });
            }
            by_iso3.insert(stat.iso3.clone(), stat);
        }
        Ok(Self { by_iso3 })
    }

    #[must_use]
    pub fn get(&self, iso3: &str) -> Option<&CountrySoilStat> {
        self.by_iso3.get(iso3)
    }

    /// Joins one trade row.
    #[must_use]
    pub fn join(&self, trade: &ResolvedTrade) -> MergedTradeSoilRecord {
        let stat = trade.reporter_iso3.as_deref().and_then(|iso3| self.get(iso3));
        MergedTradeSoilRecord::join(trade, stat)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_iso3.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_iso3.is_empty()
    }
}

/// Row counts for a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeCounts {
    pub rows: u64,
    pub rows_with_soil: u64,
    pub chunks: u64,
}

impl MergeCounts {
    fn record(&mut self, row: &MergedTradeSoilRecord) {
        self.rows += 1;
        if row.has_soil() {
            self.rows_with_soil += 1;
        }
    }

    fn log(&self) {
        log::info!(
            "Merged {} trade rows ({} with soil data, {} without)",
            self.rows,
            self.rows_with_soil,
            self.rows - self.rows_with_soil
        );
    }
}

// ============================================================
// Strategies
// ============================================================

/// Left-joins `trades` with `stats` in memory. Output order and length
/// match `trades`.
#[must_use]
pub fn merge(trades: &[ResolvedTrade], stats: &StatTable) -> (Vec<MergedTradeSoilRecord>, MergeCounts) {
    let mut counts = MergeCounts::default();
    let rows: Vec<MergedTradeSoilRecord> = trades
        .iter()
        .map(|trade| {
            let row = stats.join(trade);
            counts.record(&row);
            row
        })
        .collect();
    counts.chunks = 1;
    counts.log();
    (rows, counts)
}

/// Merges trade rows in fixed-size chunks.
///
/// Rows are buffered until `chunk_rows` are pending, then handed to the sink
/// in input order. `chunk_rows` is clamped to `1..=MAX_CHUNK_ROWS`. Call
/// [`ChunkedMerger::finish`] to flush the last partial chunk.
pub struct ChunkedMerger<'a, F> {
    stats: &'a StatTable,
    chunk_rows: usize,
    buffer: Vec<MergedTradeSoilRecord>,
    sink: F,
    counts: MergeCounts,
}

impl<'a, F, E> ChunkedMerger<'a, F>
where
    F: FnMut(&[MergedTradeSoilRecord]) -> Result<(), E>,
{
    #[must_use]
    pub fn new(stats: &'a StatTable, chunk_rows: usize, sink: F) -> Self {
        let chunk_rows = chunk_rows.clamp(1, MAX_CHUNK_ROWS);
        Self {
            stats,
            chunk_rows,
            buffer: Vec::with_capacity(chunk_rows),
            sink,
            counts: MergeCounts::default(),
        }
    }

    /// Joins one row, flushing the chunk once it is full.
    ///
    /// # Errors
    ///
    /// Returns the sink's error.
    pub fn push(&mut self, trade: &ResolvedTrade) -> Result<(), E> {
        let row = self.stats.join(trade);
        self.counts.record(&row);
        self.buffer.push(row);
        if self.buffer.len() >= self.chunk_rows {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), E> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        (self.sink)(&self.buffer)?;
        self.counts.chunks += 1;
        log::debug!(
            "Flushed chunk {} ({} rows)",
            self.counts.chunks,
            self.buffer.len()
        );
        self.buffer.clear();
        Ok(())
    }

    /// Flushes the remaining rows.
    ///
    /// # Errors
    ///
    /// Returns the sink's error.
    pub fn finish(mut self) -> Result<MergeCounts, E> {
        self.flush()?;
        self.counts.log();
        Ok(self.counts)
    }
}

/// Merges `trades` chunk by chunk into `sink`.
///
/// # Errors
///
/// Returns the sink's error.
pub fn merge_chunked<'t, I, F, E>(
    trades: I,
    stats: &StatTable,
    chunk_rows: usize,
    sink: F,
) -> Result<MergeCounts, E>
where
    I: IntoIterator<Item = &'t ResolvedTrade>,
    F: FnMut(&[MergedTradeSoilRecord]) -> Result<(), E>,
{
    let mut merger = ChunkedMerger::new(stats, chunk_rows, sink);
    for trade in trades {
        merger.push(trade)?;
    }
    merger.finish()
}

/// How the merge stage holds its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum MergeStrategy {
    InMemory,
    Chunked { chunk_rows: usize },
}

impl MergeStrategy {
    /// Picks a strategy for a trade input of `input_bytes` on disk.
    ///
    /// The in-memory estimate is `input_bytes * INPUT_EXPANSION_FACTOR`.
    /// Within `budget_bytes` the merge runs in memory. Otherwise chunks are
    /// sized to use a quarter of the budget, clamped to
    /// [`MIN_CHUNK_ROWS`]..=[`MAX_CHUNK_ROWS`].
    #[must_use]
    pub fn choose(input_bytes: u64, budget_bytes: u64) -> Self {
        let estimate = input_bytes.saturating_mul(INPUT_EXPANSION_FACTOR);
        if estimate <= budget_bytes {
            return Self::InMemory;
        }

        let rows = budget_bytes / 4 / MERGED_ROW_BYTES;
        let chunk_rows = usize::try_from(rows)
            .unwrap_or(MAX_CHUNK_ROWS)
            .clamp(MIN_CHUNK_ROWS, MAX_CHUNK_ROWS);

        log::info!(
            "Estimated {} MiB for the trade input exceeds the {} MiB budget; merging in chunks of {chunk_rows} rows",
            estimate / (1024 * 1024),
            budget_bytes / (1024 * 1024)
        );

        Self::Chunked { chunk_rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soil_trade_models::{KeyResolution, TradeRecord};

    fn stat(iso3: &str, mean_value: f64) -> CountrySoilStat {
        CountrySoilStat {
            iso3: iso3.to_string(),
            country_name: format!("{iso3} land"),
            continent: "Asia".to_string(),
            population_estimate: 1_000,
            gdp_estimate: 50.0,
            mean_value,
            point_count: 3,
        }
    }

    fn trade(code: i32, iso3: Option<&str>, item: &str, tonnes: f64) -> ResolvedTrade {
        ResolvedTrade::new(
            TradeRecord {
                reporter_code: code,
                reporter_name: format!("Reporter {code}"),
                partner_code: 231,
                partner_name: "United States of America".to_string(),
                item: item.to_string(),
                year: 2021,
                quantity_tonnes: tonnes,
            },
            iso3.map(ToString::to_string),
            if iso3.is_some() {
                KeyResolution::Mapped
            } else {
                KeyResolution::Unresolved
            },
        )
    }

    fn trades() -> Vec<ResolvedTrade> {
        vec![
            trade(41, Some("CHN"), "Rice", 100.0),
            trade(41, Some("CHN"), "Wheat", 20.0),
            trade(2, Some("AFG"), "Rice", 5.0),
            trade(999, None, "Rice", 1.0),
            trade(100, Some("IND"), "Maize", 7.5),
        ]
    }

    fn stats() -> StatTable {
        StatTable::new(vec![stat("CHN", 61.5), stat("IND", 40.0)]).unwrap()
    }

    #[test]
    fn left_join_keeps_every_trade_row() {
        let trades = trades();
        let (rows, counts) = merge(&trades, &stats());
        assert_eq!(rows.len(), trades.len());
        assert_eq!(counts.rows, 5);
        assert_eq!(counts.rows_with_soil, 3);
        for (row, trade) in rows.iter().zip(&trades) {
            assert_eq!(row.reporter_code, trade.reporter_code);
            assert_eq!(row.item, trade.item);
        }
    }

    #[test]
    fn unmatched_rows_carry_null_soil_fields() {
        let (rows, _) = merge(&trades(), &stats());

        let afg = &rows[2];
        assert_eq!(afg.reporter_iso3.as_deref(), Some("AFG"));
        assert!(afg.soil_mean_value.is_none());
        assert!(afg.country_name.is_none());

        let unresolved = &rows[3];
        assert!(unresolved.reporter_iso3.is_none());
        assert!(unresolved.soil_point_count.is_none());

        let chn = &rows[0];
        assert_eq!(chn.soil_mean_value, Some(61.5));
        assert_eq!(chn.continent.as_deref(), Some("Asia"));
    }

    #[test]
    fn empty_stat_table_keeps_rows() {
        let trades = trades();
        let (rows, counts) = merge(&trades, &StatTable::default());
        assert_eq!(rows.len(), trades.len());
        assert_eq!(counts.rows_with_soil, 0);
    }

    #[test]
    fn duplicate_iso3_is_rejected() {
        let result = StatTable::new(vec![stat("CHN", 1.0), stat("IND", 2.0), stat("CHN", 3.0)]);
        match result {
            Err(MergeError::DuplicateKey { iso3 }) => assert_eq!(iso3, "CHN"),
            other => panic!("expected DuplicateKey, got {other:?}"),
        }
    }

    #[test]
    fn chunked_merge_matches_in_memory() {
        let trades = trades();
        let stats = stats();
        let (expected, _) = merge(&trades, &stats);

        for chunk_rows in [1, 2, 3, 5, 100] {
            let mut chunks = Vec::new();
            let counts = merge_chunked(&trades, &stats, chunk_rows, |chunk| {
                chunks.push(chunk.to_vec());
                Ok::<(), MergeError>(())
            })
            .unwrap();

            assert!(chunks.iter().all(|chunk| chunk.len() <= chunk_rows));
            assert_eq!(counts.chunks, chunks.len() as u64);
            assert_eq!(counts.rows, trades.len() as u64);
            let rows: Vec<MergedTradeSoilRecord> = chunks.into_iter().flatten().collect();
            assert_eq!(rows, expected, "chunk size {chunk_rows}");
        }
    }

    #[test]
    fn oversized_chunk_is_capped() {
        let trades = trades();
        let mut chunks = Vec::new();
        let counts = merge_chunked(&trades, &stats(), usize::MAX, |chunk| {
            chunks.push(chunk.len());
            Ok::<(), MergeError>(())
        })
        .unwrap();
        assert_eq!(chunks, vec![trades.len()]);
        assert_eq!(counts.chunks, 1);

        let stats = stats();
        let merger = ChunkedMerger::new(&stats, usize::MAX, |_: &[MergedTradeSoilRecord]| {
            Ok::<(), MergeError>(())
        });
        assert_eq!(merger.chunk_rows, MAX_CHUNK_ROWS);
    }

    #[test]
    fn chunked_merge_propagates_sink_error() {
        let trades = trades();
        let result = merge_chunked(&trades, &stats(), 2, |_| Err("disk full"));
        assert_eq!(result, Err("disk full"));
    }

    #[test]
    fn small_input_merges_in_memory() {
        assert_eq!(
            MergeStrategy::choose(10 * 1024 * 1024, 512 * 1024 * 1024),
            MergeStrategy::InMemory
        );
    }

    #[test]
    fn large_input_is_chunked_within_bounds() {
        let budget = 512 * 1024 * 1024;
        match MergeStrategy::choose(4 * 1024 * 1024 * 1024, budget) {
            MergeStrategy::Chunked { chunk_rows } => {
                assert!((MIN_CHUNK_ROWS..=MAX_CHUNK_ROWS).contains(&chunk_rows));
                assert_eq!(chunk_rows as u64, budget / 4 / MERGED_ROW_BYTES);
            }
            MergeStrategy::InMemory => panic!("expected chunked strategy"),
        }

        assert_eq!(
            MergeStrategy::choose(1024 * 1024, 1024),
            MergeStrategy::Chunked {
                chunk_rows: MIN_CHUNK_ROWS
            }
        );
    }
}
