//! Depth filtering and per-country aggregation.

use std::collections::BTreeMap;

use soil_trade_models::{AttributedMeasurement, CountrySoilStat, Measured};
use soil_trade_spatial::CountryIndex;

/// The surface layer of the SOCD source, in centimetres. Depth values in
/// the source are exact constants, so comparisons use float equality.
pub const DEFAULT_DEPTH_CM: f64 = 4.5;

/// Keeps rows measured at exactly `depth`, preserving order.
#[allow(clippy::float_cmp)]
#[must_use]
pub fn filter_depth<T: Measured + Clone>(rows: &[T], depth: f64) -> Vec<T> {
    rows.iter()
        .filter(|row| row.point().depth == depth)
        .cloned()
        .collect()
}

/// Distinct depths present in `rows`, ascending.
#[must_use]
pub fn available_depths<T: Measured>(rows: &[T]) -> Vec<f64> {
    let mut depths: Vec<f64> = rows.iter().map(|row| row.point().depth).collect();
    depths.sort_by(f64::total_cmp);
    depths.dedup_by(|a, b| a.total_cmp(b).is_eq());
    depths
}

/// Reduces attributed points to one [`CountrySoilStat`] per ISO3 code.
///
/// Only rows at `depth` with a country contribute. Country attributes come
/// from `countries`. Output is sorted by ISO3. An absent depth yields an
/// empty result.
#[allow(clippy::float_cmp)]
#[must_use]
pub fn aggregate(
    rows: &[AttributedMeasurement],
    depth: f64,
    countries: &CountryIndex,
) -> Vec<CountrySoilStat> {
    // iso3 -> (sum, count)
    let mut groups: BTreeMap<&str, (f64, u64)> = BTreeMap::new();
    let mut at_depth = 0u64;

    for row in rows.iter().filter(|row| row.depth == depth) {
        at_depth += 1;
        let Some(iso3) = row.iso3.as_deref() else {
            continue;
        };
        let entry = groups.entry(iso3).or_insert((0.0, 0));
        entry.0 += row.value;
        entry.1 += 1;
    }

    if at_depth == 0 {
        log::warn!(
            "No measurements at depth {depth}; available depths: {:?}",
            available_depths(rows)
        );
        return Vec::new();
    }

    let stats: Vec<CountrySoilStat> = groups
        .into_iter()
        .filter_map(|(iso3, (sum, count))| {
            let Some(country) = countries.country(iso3) else {
                log::warn!("No reference attributes for {iso3}; dropping its soil summary");
                return None;
            };
            #[allow(clippy::cast_precision_loss)]
            let mean_value = sum / count as f64;
            Some(CountrySoilStat {
                iso3: iso3.to_string(),
                country_name: country.name.clone(),
                continent: country.continent.clone(),
                population_estimate: country.population_estimate,
                gdp_estimate: country.gdp_estimate,
                mean_value,
                point_count: count,
            })
        })
        .collect();

    log::info!(
        "Aggregated {at_depth} measurements at depth {depth} into {} country summaries",
        stats.len()
    );

    stats
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::attribute::attribute;
    use geo::{MultiPolygon, Rect};
    use soil_trade_models::progress::NullProgress;
    use soil_trade_models::{Country, MeasurementPoint};
    use soil_trade_spatial::CountryPolygon;

    fn country(iso3: &str, min: (f64, f64), max: (f64, f64)) -> CountryPolygon {
        CountryPolygon {
            country: Country {
                iso3: iso3.to_string(),
                name: format!("{iso3} land"),
                continent: "Europe".to_string(),
                population_estimate: 42,
                gdp_estimate: 7.0,
            },
            geometry: MultiPolygon(vec![Rect::new(min, max).to_polygon()]),
        }
    }

    fn row(lon: f64, depth: f64, value: f64, iso3: Option<&str>) -> AttributedMeasurement {
        AttributedMeasurement::new(
            MeasurementPoint::new(lon, 0.0, depth, value),
            iso3.map(ToString::to_string),
        )
    }

    #[test]
    fn grid_to_single_country_scenario() {
        let index = CountryIndex::new(vec![country("AAA", (-10.0, -10.0), (10.0, 10.0))]);
        let points = vec![
            MeasurementPoint::new(0.0, 0.0, 4.5, 5.0),
            MeasurementPoint::new(200.0, 0.0, 4.5, 3.0),
        ];
        let attributed = attribute(&points, &index, &NullProgress).rows;
        assert_eq!(attributed[0].iso3.as_deref(), Some("AAA"));
        assert!(attributed[1].iso3.is_none());

        let stats = aggregate(&attributed, 4.5, &index);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].iso3, "AAA");
        assert!((stats[0].mean_value - 5.0).abs() < f64::EPSILON);
        assert_eq!(stats[0].point_count, 1);
    }

    #[test]
    fn computes_mean_per_country_at_depth_only() {
        let index = CountryIndex::new(vec![
            country("AAA", (-10.0, -10.0), (0.0, 10.0)),
            country("BBB", (0.0, -10.0), (10.0, 10.0)),
        ]);
        let rows = vec![
            row(-5.0, 4.5, 2.0, Some("AAA")),
            row(-4.0, 4.5, 4.0, Some("AAA")),
            row(-4.0, 9.1, 100.0, Some("AAA")),
            row(5.0, 4.5, 10.0, Some("BBB")),
            row(50.0, 4.5, 999.0, None),
        ];

        let stats = aggregate(&rows, 4.5, &index);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].iso3, "AAA");
        assert!((stats[0].mean_value - 3.0).abs() < f64::EPSILON);
        assert_eq!(stats[0].point_count, 2);
        assert_eq!(stats[0].country_name, "AAA land");
        assert_eq!(stats[0].population_estimate, 42);
        assert_eq!(stats[1].iso3, "BBB");
        assert!((stats[1].mean_value - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn iso3_values_are_unique() {
        let index = CountryIndex::new(vec![
            country("AAA", (-10.0, -10.0), (0.0, 10.0)),
            country("AAA", (20.0, -10.0), (30.0, 10.0)),
            country("BBB", (0.0, -10.0), (10.0, 10.0)),
        ]);
        let points: Vec<MeasurementPoint> = [-5.0, 5.0, 25.0, 26.0, -1.0]
            .iter()
            .map(|&lon| MeasurementPoint::new(lon, 0.0, 4.5, lon.abs()))
            .collect();
        let attributed = attribute(&points, &index, &NullProgress).rows;

        let stats = aggregate(&attributed, 4.5, &index);
        let unique: BTreeSet<&str> = stats.iter().map(|s| s.iso3.as_str()).collect();
        assert_eq!(unique.len(), stats.len());
        assert_eq!(stats.len(), 2);
    }

    #[test]
    fn absent_depth_yields_empty_result() {
        let index = CountryIndex::new(vec![country("AAA", (-10.0, -10.0), (10.0, 10.0))]);
        let rows = vec![row(0.0, 4.5, 1.0, Some("AAA"))];
        assert!(aggregate(&rows, 30.0, &index).is_empty());
    }

    #[test]
    fn depth_filter_is_idempotent() {
        let rows = vec![
            row(0.0, 4.5, 1.0, Some("AAA")),
            row(1.0, 9.1, 2.0, Some("AAA")),
            row(2.0, 4.5, 3.0, None),
        ];
        let once = filter_depth(&rows, 4.5);
        let twice = filter_depth(&once, 4.5);
        assert_eq!(once.len(), 2);
        assert_eq!(once, twice);
    }

    #[test]
    fn depth_filter_works_on_raw_points() {
        let points = vec![
            MeasurementPoint::new(0.0, 0.0, 4.5, 1.0),
            MeasurementPoint::new(0.0, 0.0, 22.8, 1.0),
        ];
        assert_eq!(filter_depth(&points, 22.8), vec![points[1]]);
    }

    #[test]
    fn lists_available_depths() {
        let rows = vec![
            row(0.0, 9.1, 1.0, None),
            row(0.0, 4.5, 1.0, None),
            row(0.0, 9.1, 1.0, None),
        ];
        assert_eq!(available_depths(&rows), vec![4.5, 9.1]);
    }
}
