//! Run configuration.
//!
//! Read from a TOML file. Every field has a default, so an empty file is a
//! valid configuration. Relative paths are resolved against the directory
//! containing the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use soil_trade_merge::MAX_CHUNK_ROWS;
use soil_trade_soil::aggregate::DEFAULT_DEPTH_CM;
use soil_trade_trade::encoding::DEFAULT_ENCODING;
use soil_trade_trade::{EXPORT_QUANTITY_ELEMENT, TradeFilter, YearSelection};

use crate::PipelineError;

/// Default memory budget for the merge stage, in MiB.
pub const DEFAULT_MEMORY_BUDGET_MB: u64 = 512;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub soil: SoilConfig,
    pub countries: CountriesConfig,
    pub trade: TradeConfig,
    pub merge: MergeConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SoilConfig {
    /// Long-form grid table (`lon, lat, depth, <variable>`).
    pub grid: PathBuf,
    /// Name of the measured variable column.
    pub variable: String,
    /// Depth to aggregate at, in centimetres.
    pub depth: f64,
    /// Drop points at other depths before the spatial join.
    pub prefilter_depth: bool,
}

impl Default for SoilConfig {
    fn default() -> Self {
        Self {
            grid: PathBuf::from("data/socd.csv"),
            variable: "socd".to_string(),
            depth: DEFAULT_DEPTH_CM,
            prefilter_depth: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CountriesConfig {
    /// `GeoJSON` `FeatureCollection` of country polygons.
    pub geojson: PathBuf,
}

impl Default for CountriesConfig {
    fn default() -> Self {
        Self {
            geojson: PathBuf::from("data/countries.geojson"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TradeConfig {
    pub matrix: PathBuf,
    pub key_table: PathBuf,
    /// Text encoding of the trade matrix.
    pub encoding: String,
    /// Text encoding of the key table.
    pub key_encoding: String,
    pub element_code: i32,
    /// `"all"`, `"latest"` or a year.
    pub years: YearSelection,
    /// Fail before merging if any selected reporter code is unresolved.
    pub strict_keys: bool,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            matrix: PathBuf::from("data/trade_matrix.csv"),
            key_table: PathBuf::from("data/country_codes.csv"),
            encoding: DEFAULT_ENCODING.to_string(),
            key_encoding: "UTF-8".to_string(),
            element_code: EXPORT_QUANTITY_ELEMENT,
            years: YearSelection::Latest,
            strict_keys: false,
        }
    }
}

impl TradeConfig {
    #[must_use]
    pub const fn filter(&self) -> TradeFilter {
        TradeFilter {
            element_code: self.element_code,
            years: self.years,
        }
    }
}

/// How the merge stage is run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Pick from the input size and the memory budget.
    #[default]
    Auto,
    InMemory,
    Chunked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    pub mode: MergeMode,
    pub memory_budget_mb: u64,
    /// Chunk size for `mode = "chunked"`. Derived from the budget if unset.
    pub chunk_rows: Option<usize>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            mode: MergeMode::Auto,
            memory_budget_mb: DEFAULT_MEMORY_BUDGET_MB,
            chunk_rows: None,
        }
    }
}

impl MergeConfig {
    #[must_use]
    pub const fn budget_bytes(&self) -> u64 {
        self.memory_budget_mb.saturating_mul(1024 * 1024)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Write the attributed points at the target depth.
    pub soil_points: bool,
    /// Restrict the exported points to these ISO3 codes.
    pub soil_points_iso3: Option<Vec<String>>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            soil_points: true,
            soil_points_iso3: None,
        }
    }
}

impl PipelineConfig {
    /// Parses a configuration. Paths are left as written.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the TOML is malformed or has
    /// unknown keys.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, PipelineError> {
        toml::de::from_str(toml_str).map_err(|e| PipelineError::Config {
            message: e.to_string(),
        })
    }

    /// Reads a configuration file, resolving relative paths against its
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Makes every relative path absolute against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.soil.grid,
            &mut self.countries.geojson,
            &mut self.trade.matrix,
            &mut self.trade.key_table,
            &mut self.output.dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Checks values serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] describing the first bad value.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |message: String| Err(PipelineError::Config { message });

        if !self.soil.depth.is_finite() || self.soil.depth < 0.0 {
            return invalid(format!("soil.depth must be a non-negative number, got {}", self.soil.depth));
        }
        if self.soil.variable.trim().is_empty() {
            return invalid("soil.variable must not be empty".to_string());
        }
        if self.merge.memory_budget_mb == 0 {
            return invalid("merge.memory_budget_mb must be positive".to_string());
        }
        if let Some(chunk_rows) = self.merge.chunk_rows
            && !(1..=MAX_CHUNK_ROWS).contains(&chunk_rows)
        {
            return invalid(format!(
                "merge.chunk_rows must be between 1 and {MAX_CHUNK_ROWS}, got {chunk_rows}"
            ));
        }
        if let Some(codes) = &self.output.soil_points_iso3
            && let Some(bad) = codes
                .iter()
                .find(|c| c.len() != 3 || !c.bytes().all(|b| b.is_ascii_uppercase()))
        {
            return invalid(format!("output.soil_points_iso3 has invalid ISO3 code '{bad}'"));
        }
        Ok(())
    }
}
