//! Grid ingestion.
//!
//! A [`Grid`] is a dense array over named dimensions with one data
//! variable, the shape of the SOCD `NetCDF` source. [`ingest`] flattens it
//! into one [`MeasurementPoint`] per `(lon, lat, depth)` cell, dropping
//! missing values. [`read_grid_table`] does the same for the long-form
//! table produced by flattening the source ahead of time.

use std::io::Read;
use std::path::Path;

use serde::Serialize;
use soil_trade_models::MeasurementPoint;

use crate::SoilError;

/// One named axis of a [`Grid`].
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub name: String,
    pub values: Vec<f64>,
}

impl Dimension {
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// A dense gridded variable stored in row-major order over `dimensions`.
#[derive(Debug, Clone)]
pub struct Grid {
    dimensions: Vec<Dimension>,
    variable: String,
    values: Vec<f64>,
    fill_value: Option<f64>,
}

impl Grid {
    /// Creates a grid, checking that `values` matches the dimension shape.
    ///
    /// # Errors
    ///
    /// Returns [`SoilError::DataFormat`] if the number of values is not the
    /// product of the dimension lengths.
    pub fn new(
        dimensions: Vec<Dimension>,
        variable: impl Into<String>,
        values: Vec<f64>,
        fill_value: Option<f64>,
    ) -> Result<Self, SoilError> {
        let expected: usize = dimensions.iter().map(|d| d.values.len()).product();
        if expected != values.len() {
            return Err(SoilError::format(format!(
                "grid shape {:?} expects {expected} values, found {}",
                dimensions
                    .iter()
                    .map(|d| (d.name.as_str(), d.values.len()))
                    .collect::<Vec<_>>(),
                values.len()
            )));
        }

        Ok(Self {
            dimensions,
            variable: variable.into(),
            values,
            fill_value,
        })
    }

    #[must_use]
    pub fn variable(&self) -> &str {
        &self.variable
    }

    #[must_use]
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }
}

/// Counts collected while flattening a grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Cells examined.
    pub cells: u64,
    /// Cells dropped for a missing (NaN or fill) value.
    pub missing: u64,
    /// Cells dropped for coordinates outside the WGS84 domain.
    pub out_of_range: u64,
    /// Points kept.
    pub kept: u64,
}

/// Measurement points flattened from a grid.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub points: Vec<MeasurementPoint>,
    pub report: IngestReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Longitude,
    Latitude,
    Depth,
}

impl Axis {
    fn classify(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "lon" | "longitude" | "x" => Some(Self::Longitude),
            "lat" | "latitude" | "y" => Some(Self::Latitude),
            "depth" | "lev" | "level" => Some(Self::Depth),
            _ => None,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Longitude => "longitude",
            Self::Latitude => "latitude",
            Self::Depth => "depth",
        }
    }
}

/// Accumulates points and counts, applying the missing-value and range
/// rules shared by both input shapes.
#[derive(Default)]
struct Collector {
    points: Vec<MeasurementPoint>,
    report: IngestReport,
}

impl Collector {
    fn push(&mut self, point: MeasurementPoint, missing: bool) {
        self.report.cells += 1;
        if missing {
            self.report.missing += 1;
        } else if point.in_range() {
            self.points.push(point);
            self.report.kept += 1;
        } else {
            self.report.out_of_range += 1;
        }
    }

    fn finish(self, label: &str) -> Ingested {
        log::info!(
            "Ingested {label}: {} cells, {} kept, {} missing, {} out of range",
            self.report.cells,
            self.report.kept,
            self.report.missing,
            self.report.out_of_range
        );
        if self.report.out_of_range > 0 {
            log::warn!(
                "{label}: dropped {} points outside the WGS84 lon/lat domain",
                self.report.out_of_range
            );
        }
        Ingested {
            points: self.points,
            report: self.report,
        }
    }
}

#[allow(clippy::float_cmp)]
fn is_missing(value: f64, fill_value: Option<f64>) -> bool {
    value.is_nan() || fill_value.is_some_and(|fill| value == fill)
}

/// Flattens a grid into measurement points.
///
/// Dimensions may appear in any order. Dimensions other than longitude,
/// latitude and depth are accepted only when they have a single entry.
///
/// # Errors
///
/// Returns [`SoilError::DataFormat`] if longitude, latitude or depth is
/// absent, appears twice, or an extra dimension has more than one entry.
pub fn ingest(grid: &Grid) -> Result<Ingested, SoilError> {
    let mut axes: [Option<usize>; 3] = [None; 3];

    for (position, dimension) in grid.dimensions.iter().enumerate() {
        match Axis::classify(&dimension.name) {
            Some(axis) => {
                let slot = &mut axes[axis as usize];
                if slot.is_some() {
                    return Err(SoilError::format(format!(
                        "grid has more than one {} dimension",
                        axis.label()
                    )));
                }
                *slot = Some(position);
            }
            None if dimension.values.len() == 1 => {}
            None => {
                return Err(SoilError::format(format!(
                    "unexpected grid dimension '{}' with {} entries",
                    dimension.name,
                    dimension.values.len()
                )));
            }
        }
    }

    let resolve = |axis: Axis| {
        axes[axis as usize].ok_or_else(|| {
            SoilError::format(format!(
                "grid variable '{}' has no {} dimension",
                grid.variable,
                axis.label()
            ))
        })
    };
    let lon_dim = resolve(Axis::Longitude)?;
    let lat_dim = resolve(Axis::Latitude)?;
    let depth_dim = resolve(Axis::Depth)?;

    // Row-major strides: the last dimension varies fastest.
    let mut strides = vec![1usize; grid.dimensions.len()];
    for i in (0..grid.dimensions.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * grid.dimensions[i + 1].values.len();
    }

    let coordinate = |dim: usize, flat: usize| {
        let values = &grid.dimensions[dim].values;
        values[(flat / strides[dim]) % values.len()]
    };

    let mut collector = Collector::default();
    collector.points.reserve(grid.values.len());

    for (flat, &value) in grid.values.iter().enumerate() {
        let point = MeasurementPoint::new(
            coordinate(lon_dim, flat),
            coordinate(lat_dim, flat),
            coordinate(depth_dim, flat),
            value,
        );
        collector.push(point, is_missing(value, grid.fill_value));
    }

    Ok(collector.finish(&format!("grid '{}'", grid.variable)))
}

/// Reads a long-form grid table (`lon, lat, depth, <variable>` columns).
///
/// # Errors
///
/// Returns [`SoilError`] if the file cannot be read, a required column is
/// missing, or a coordinate cannot be parsed.
pub fn read_grid_table(path: &Path, variable: &str) -> Result<Ingested, SoilError> {
    let file = std::fs::File::open(path).map_err(|e| SoilError::Csv {
        path: path.display().to_string(),
        source: e.into(),
    })?;
    parse_grid_table(file, variable, &path.display().to_string())
}

/// Parses a long-form grid table from any reader. `label` names the source
/// in errors and logs.
///
/// Empty cells and `NaN` in the variable column count as missing values.
///
/// # Errors
///
/// See [`read_grid_table`].
pub fn parse_grid_table(
    reader: impl Read,
    variable: &str,
    label: &str,
) -> Result<Ingested, SoilError> {
    let csv_error = |source| SoilError::Csv {
        path: label.to_string(),
        source,
    };

    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = csv_reader.headers().map_err(csv_error)?.clone();

    let find_axis = |axis: Axis| {
        headers
            .iter()
            .position(|h| Axis::classify(h) == Some(axis))
            .ok_or_else(|| {
                SoilError::format(format!("{label}: no {} column", axis.label()))
            })
    };
    let lon_col = find_axis(Axis::Longitude)?;
    let lat_col = find_axis(Axis::Latitude)?;
    let depth_col = find_axis(Axis::Depth)?;
    let value_col = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(variable))
        .ok_or_else(|| SoilError::format(format!("{label}: no '{variable}' column")))?;

    let mut collector = Collector::default();

    for result in csv_reader.records() {
        let record = result.map_err(csv_error)?;
        let line = record.position().map_or(0, csv::Position::line);

        let coordinate = |col: usize, name: &str| {
            record
                .get(col)
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .ok_or_else(|| SoilError::format(format!("{label}:{line}: invalid {name}")))
        };

        let longitude = coordinate(lon_col, "longitude")?;
        let latitude = coordinate(lat_col, "latitude")?;
        let depth = coordinate(depth_col, "depth")?;
        let value = record
            .get(value_col)
            .and_then(|s| s.trim().parse::<f64>().ok())
            .unwrap_or(f64::NAN);

        collector.push(
            MeasurementPoint::new(longitude, latitude, depth, value),
            is_missing(value, None),
        );
    }

    Ok(collector.finish(label))
}
