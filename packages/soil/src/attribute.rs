//! Country attribution of measurement points.
//!
//! Each point is looked up in the [`CountryIndex`]. Points that fall in no
//! country (open ocean, unrecognized territories) keep `iso3 = None`; they
//! are counted, never treated as an error.

use serde::Serialize;
use soil_trade_models::progress::ProgressCallback;
use soil_trade_models::{AttributedMeasurement, MeasurementPoint};
use soil_trade_spatial::CountryIndex;

/// Points processed between progress updates.
const PROGRESS_BATCH: usize = 10_000;

/// Match counts for one attribution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttributionReport {
    pub total: u64,
    pub matched: u64,
    /// Points inside the WGS84 domain that matched no polygon.
    pub missed: u64,
    /// Points whose coordinates fall outside the WGS84 domain.
    pub out_of_range: u64,
}

impl AttributionReport {
    /// All points without a country.
    #[must_use]
    pub const fn unmatched(&self) -> u64 {
        self.missed + self.out_of_range
    }
}

/// Attributed points plus match counts.
#[derive(Debug, Clone)]
pub struct Attribution {
    pub rows: Vec<AttributedMeasurement>,
    pub report: AttributionReport,
}

/// Assigns each point the ISO3 code of the polygon containing it.
///
/// Output has one row per input point, in input order.
pub fn attribute(
    points: &[MeasurementPoint],
    index: &CountryIndex,
    progress: &dyn ProgressCallback,
) -> Attribution {
    let mut report = AttributionReport::default();
    let mut rows = Vec::with_capacity(points.len());

    progress.set_total(points.len() as u64);
    progress.set_message("Attributing soil points".to_string());

    for (i, point) in points.iter().enumerate() {
        report.total += 1;

        let iso3 = if point.in_range() {
            let found = index
                .lookup(point.longitude, point.latitude)
                .map(|country| country.iso3.clone());
            if found.is_some() {
                report.matched += 1;
            } else {
                report.missed += 1;
            }
            found
        } else {
            report.out_of_range += 1;
            None
        };

        rows.push(AttributedMeasurement::new(*point, iso3));

        if (i + 1) % PROGRESS_BATCH == 0 {
            progress.inc(PROGRESS_BATCH as u64);
        }
    }

    progress.inc((points.len() % PROGRESS_BATCH) as u64);
    progress.finish(format!(
        "Attributed {} of {} points",
        report.matched, report.total
    ));

    log::info!(
        "Attribution: {} points, {} matched, {} missed, {} out of range",
        report.total,
        report.matched,
        report.missed,
        report.out_of_range
    );
    if report.unmatched() > 0 {
        log::warn!(
            "{} points matched no country polygon and will be excluded from aggregation",
            report.unmatched()
        );
    }

    Attribution { rows, report }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{MultiPolygon, Rect};
    use soil_trade_models::Country;
    use soil_trade_models::progress::NullProgress;
    use soil_trade_spatial::CountryPolygon;

    fn square_index() -> CountryIndex {
        CountryIndex::new(vec![CountryPolygon {
            country: Country {
                iso3: "SQR".to_string(),
                name: "Squareland".to_string(),
                continent: "Oceania".to_string(),
                population_estimate: 500,
                gdp_estimate: 2.5,
            },
            geometry: MultiPolygon(vec![Rect::new((-10.0, -10.0), (10.0, 10.0)).to_polygon()]),
        }])
    }

    #[test]
    fn attributes_inside_and_leaves_outside_null() {
        let points = vec![
            MeasurementPoint::new(0.0, 0.0, 4.5, 5.0),
            MeasurementPoint::new(200.0, 0.0, 4.5, 3.0),
        ];
        let attribution = attribute(&points, &square_index(), &NullProgress);

        assert_eq!(attribution.rows.len(), 2);
        assert_eq!(attribution.rows[0].iso3.as_deref(), Some("SQR"));
        assert_eq!(attribution.rows[1].iso3, None);
        assert_eq!(attribution.report.matched, 1);
        assert_eq!(attribution.report.out_of_range, 1);
    }

    #[test]
    fn open_water_counts_as_miss() {
        let points = vec![MeasurementPoint::new(50.0, 50.0, 4.5, 1.0)];
        let attribution = attribute(&points, &square_index(), &NullProgress);
        assert_eq!(attribution.report.missed, 1);
        assert_eq!(attribution.report.unmatched(), 1);
        assert!(attribution.rows[0].iso3.is_none());
    }

    #[test]
    fn repeated_runs_agree() {
        let points: Vec<MeasurementPoint> = (-12..=12)
            .map(|i| MeasurementPoint::new(f64::from(i), f64::from(i) / 2.0, 4.5, 1.0))
            .collect();
        let index = square_index();
        let first = attribute(&points, &index, &NullProgress);
        let second = attribute(&points, &index, &NullProgress);
        assert_eq!(first.rows, second.rows);
    }
}
