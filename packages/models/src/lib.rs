#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared record types for the soil/trade integration pipeline.
//!
//! Every stage of the pipeline consumes and produces these immutable
//! records. Rows are flat so they serialize directly to CSV with `csv` +
//! `serde`; nullable columns are `Option`s and are written as empty cells.

pub mod progress;

use serde::{Deserialize, Serialize};

/// Lowest valid longitude in WGS84 degrees.
pub const MIN_LONGITUDE: f64 = -180.0;
/// Highest valid longitude in WGS84 degrees.
pub const MAX_LONGITUDE: f64 = 180.0;
/// Lowest valid latitude in WGS84 degrees.
pub const MIN_LATITUDE: f64 = -90.0;
/// Highest valid latitude in WGS84 degrees.
pub const MAX_LATITUDE: f64 = 90.0;

// ============================================================
// Output tables
// ============================================================

/// A row type written as an output table.
///
/// `COLUMNS` lists the header in field order, matching what `serde` emits
/// for a row. It is written even when a table has no rows.
pub trait TableRow: Serialize {
    const COLUMNS: &'static [&'static str];
}

impl<T: TableRow> TableRow for &T {
    const COLUMNS: &'static [&'static str] = T::COLUMNS;
}

// ============================================================
// Soil grid
// ============================================================

/// A single non-missing grid cell from the soil dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementPoint {
    /// WGS84 longitude in degrees.
    pub longitude: f64,
    /// WGS84 latitude in degrees.
    pub latitude: f64,
    /// Measurement depth as documented by the source (centimetres).
    pub depth: f64,
    /// Measured value (SOCD).
    pub value: f64,
}

impl MeasurementPoint {
    #[must_use]
    pub const fn new(longitude: f64, latitude: f64, depth: f64, value: f64) -> Self {
        Self {
            longitude,
            latitude,
            depth,
            value,
        }
    }

    /// Whether the coordinates lie inside the WGS84 longitude/latitude
    /// domain.
    #[must_use]
    pub fn in_range(&self) -> bool {
        (MIN_LONGITUDE..=MAX_LONGITUDE).contains(&self.longitude)
            && (MIN_LATITUDE..=MAX_LATITUDE).contains(&self.latitude)
    }
}

/// Anything that wraps a [`MeasurementPoint`].
///
/// Lets depth filtering work on both raw and attributed rows.
pub trait Measured {
    /// The underlying measurement.
    fn point(&self) -> MeasurementPoint;
}

impl Measured for MeasurementPoint {
    fn point(&self) -> MeasurementPoint {
        *self
    }
}

/// A measurement together with the ISO3 code of the country containing it.
///
/// `iso3` is `None` iff the point fell outside every known country polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributedMeasurement {
    pub longitude: f64,
    pub latitude: f64,
    pub depth: f64,
    pub value: f64,
    pub iso3: Option<String>,
}

impl AttributedMeasurement {
    #[must_use]
    pub fn new(point: MeasurementPoint, iso3: Option<String>) -> Self {
        Self {
            longitude: point.longitude,
            latitude: point.latitude,
            depth: point.depth,
            value: point.value,
            iso3,
        }
    }
}

impl TableRow for AttributedMeasurement {
    const COLUMNS: &'static [&'static str] = &["longitude", "latitude", "depth", "value", "iso3"];
}

impl Measured for AttributedMeasurement {
    fn point(&self) -> MeasurementPoint {
        MeasurementPoint::new(self.longitude, self.latitude, self.depth, self.value)
    }
}

// ============================================================
// Countries
// ============================================================

/// Reference attributes of a country, taken from the polygon dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    /// ISO 3166-1 alpha-3 code.
    pub iso3: String,
    pub name: String,
    pub continent: String,
    pub population_estimate: u64,
    /// GDP estimate in millions of USD.
    pub gdp_estimate: f64,
}

/// Per-country soil summary at a single depth.
///
/// There is exactly one row per `iso3` in any aggregation output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountrySoilStat {
    pub iso3: String,
    pub country_name: String,
    pub continent: String,
    pub population_estimate: u64,
    pub gdp_estimate: f64,
    /// Arithmetic mean of all measurements at the target depth.
    pub mean_value: f64,
    /// Number of measurements that contributed to `mean_value`.
    pub point_count: u64,
}

impl TableRow for CountrySoilStat {
    const COLUMNS: &'static [&'static str] = &[
        "iso3",
        "country_name",
        "continent",
        "population_estimate",
        "gdp_estimate",
        "mean_value",
        "point_count",
    ];
}

// ============================================================
// Trade
// ============================================================

/// One export-quantity row of the bilateral trade matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Numeric code of the exporting country.
    pub reporter_code: i32,
    pub reporter_name: String,
    /// Numeric code of the importing country.
    pub partner_code: i32,
    pub partner_name: String,
    pub item: String,
    pub year: i32,
    pub quantity_tonnes: f64,
}

/// A row of the numeric-code to ISO3 key table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMapping {
    pub numeric_code: i32,
    pub iso3: String,
}

/// How a reporter code was turned into an ISO3 code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyResolution {
    /// Found in the key table.
    Mapped,
    /// Supplied by the named override list.
    Overridden,
    /// Neither the key table nor the override list knows the code.
    Unresolved,
}

/// A [`TradeRecord`] carrying the resolved reporter ISO3 code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTrade {
    pub reporter_code: i32,
    pub reporter_name: String,
    pub reporter_iso3: Option<String>,
    pub resolution: KeyResolution,
    pub partner_code: i32,
    pub partner_name: String,
    pub item: String,
    pub year: i32,
    pub quantity_tonnes: f64,
}

impl ResolvedTrade {
    #[must_use]
    pub fn new(record: TradeRecord, reporter_iso3: Option<String>, resolution: KeyResolution) -> Self {
        Self {
            reporter_code: record.reporter_code,
            reporter_name: record.reporter_name,
            reporter_iso3,
            resolution,
            partner_code: record.partner_code,
            partner_name: record.partner_name,
            item: record.item,
            year: record.year,
            quantity_tonnes: record.quantity_tonnes,
        }
    }
}

// ============================================================
// Merged output
// ============================================================

/// A trade row left-joined with the soil summary of its reporter country.
///
/// Soil columns are `None` when the reporter has no ISO3 code or no soil
/// coverage; such rows are kept, never dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedTradeSoilRecord {
    pub reporter_code: i32,
    pub reporter_name: String,
    pub reporter_iso3: Option<String>,
    pub partner_code: i32,
    pub partner_name: String,
    pub item: String,
    pub year: i32,
    pub quantity_tonnes: f64,
    pub country_name: Option<String>,
    pub continent: Option<String>,
    pub population_estimate: Option<u64>,
    pub gdp_estimate: Option<f64>,
    pub soil_mean_value: Option<f64>,
    pub soil_point_count: Option<u64>,
}

impl TableRow for MergedTradeSoilRecord {
    const COLUMNS: &'static [&'static str] = &[
        "reporter_code",
        "reporter_name",
        "reporter_iso3",
        "partner_code",
        "partner_name",
        "item",
        "year",
        "quantity_tonnes",
        "country_name",
        "continent",
        "population_estimate",
        "gdp_estimate",
        "soil_mean_value",
        "soil_point_count",
    ];
}

impl MergedTradeSoilRecord {
    /// Builds a merged row from a trade row and its (optional) soil match.
    #[must_use]
    pub fn join(trade: &ResolvedTrade, stat: Option<&CountrySoilStat>) -> Self {
        Self {
            reporter_code: trade.reporter_code,
            reporter_name: trade.reporter_name.clone(),
            reporter_iso3: trade.reporter_iso3.clone(),
            partner_code: trade.partner_code,
            partner_name: trade.partner_name.clone(),
            item: trade.item.clone(),
            year: trade.year,
            quantity_tonnes: trade.quantity_tonnes,
            country_name: stat.map(|s| s.country_name.clone()),
            continent: stat.map(|s| s.continent.clone()),
            population_estimate: stat.map(|s| s.population_estimate),
            gdp_estimate: stat.map(|s| s.gdp_estimate),
            soil_mean_value: stat.map(|s| s.mean_value),
            soil_point_count: stat.map(|s| s.point_count),
        }
    }

    /// Whether a soil summary was joined onto this row.
    #[must_use]
    pub const fn has_soil(&self) -> bool {
        self.soil_mean_value.is_some()
    }
}

/// Import-side totals for a single partner country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerSummary {
    pub partner_code: i32,
    pub partner_name: String,
    /// Sum of exported tonnes received from all reporters.
    pub total_quantity_tonnes: f64,
    /// Number of distinct food items received.
    pub item_count: u64,
    /// Number of distinct reporter countries exporting to this partner.
    pub reporter_count: u64,
    pub rows: u64,
    /// Rows whose reporter has soil coverage.
    pub rows_with_soil: u64,
}

impl TableRow for PartnerSummary {
    const COLUMNS: &'static [&'static str] = &[
        "partner_code",
        "partner_name",
        "total_quantity_tonnes",
        "item_count",
        "reporter_count",
        "rows",
        "rows_with_soil",
    ];
}
