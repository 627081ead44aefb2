#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index for country attribution.
//!
//! Country polygons are loaded once per run (see [`countries`]), stored in
//! an R-tree keyed by bounding box, and queried with point-in-polygon tests
//! in WGS84 longitude/latitude. No reprojection is performed.

pub mod countries;

use std::collections::BTreeMap;

use geo::{BoundingRect, Intersects, MultiPolygon};
use rstar::{AABB, RTree, RTreeObject};
use soil_trade_models::{Country, MeasurementPoint};

pub use countries::{LoadedCountries, load_countries, parse_countries};

/// Errors from loading country reference polygons.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// I/O error reading the polygon file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The polygon dataset is structurally malformed.
    #[error("Data format error: {message}")]
    DataFormat {
        /// Description of what went wrong.
        message: String,
    },
}

/// A country's reference attributes together with its geometry.
#[derive(Debug, Clone)]
pub struct CountryPolygon {
    pub country: Country,
    pub geometry: MultiPolygon<f64>,
}

/// A polygon stored in the R-tree.
///
/// `ordinal` is the polygon's position after sorting by `(iso3, name)` and
/// decides ties when several polygons contain the same point.
struct CountryEntry {
    ordinal: usize,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for CountryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built R-tree over country polygons.
///
/// Built once per run and shared by the attributor and the aggregator.
pub struct CountryIndex {
    tree: RTree<CountryEntry>,
    /// Country attributes indexed by ordinal.
    countries: Vec<Country>,
    /// iso3 -> ordinal of the first polygon carrying that code
    by_iso3: BTreeMap<String, usize>,
}

impl CountryIndex {
    /// Builds the index, fixing polygon order so attribution is
    /// reproducible across runs.
    ///
    /// Polygons with empty geometry are skipped.
    #[must_use]
    pub fn new(mut polygons: Vec<CountryPolygon>) -> Self {
        polygons.sort_by(|a, b| {
            a.country
                .iso3
                .cmp(&b.country.iso3)
                .then_with(|| a.country.name.cmp(&b.country.name))
        });

        let mut entries = Vec::with_capacity(polygons.len());
        let mut countries = Vec::with_capacity(polygons.len());
        let mut by_iso3 = BTreeMap::new();

        for polygon in polygons {
            let Some(rect) = polygon.geometry.bounding_rect() else {
                log::warn!(
                    "Skipping country {} ({}): empty geometry",
                    polygon.country.iso3,
                    polygon.country.name
                );
                continue;
            };

            let ordinal = countries.len();
            by_iso3
                .entry(polygon.country.iso3.clone())
                .or_insert(ordinal);
            entries.push(CountryEntry {
                ordinal,
                envelope: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
                polygon: polygon.geometry,
            });
            countries.push(polygon.country);
        }

        log::info!(
            "Loaded {} country polygons ({} distinct ISO3 codes) into spatial index",
            countries.len(),
            by_iso3.len()
        );

        Self {
            tree: RTree::bulk_load(entries),
            countries,
            by_iso3,
        }
    }

    /// Looks up the country containing a point.
    ///
    /// Points on a shared border match every adjacent polygon; the one with
    /// the lowest ordinal wins. Coordinates outside the WGS84 domain never
    /// match.
    #[must_use]
    pub fn lookup(&self, lng: f64, lat: f64) -> Option<&Country> {
        if !MeasurementPoint::new(lng, lat, 0.0, 0.0).in_range() {
            return None;
        }

        let point = geo::Point::new(lng, lat);
        let query_env = AABB::from_point([lng, lat]);

        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.intersects(&point))
            .map(|entry| entry.ordinal)
            .min()
            .map(|ordinal| &self.countries[ordinal])
    }

    /// Returns the reference attributes for an ISO3 code.
    #[must_use]
    pub fn country(&self, iso3: &str) -> Option<&Country> {
        self.by_iso3.get(iso3).map(|&ordinal| &self.countries[ordinal])
    }

    /// Number of indexed polygons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.countries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use geo::Rect;

    pub fn square(iso3: &str, min: (f64, f64), max: (f64, f64)) -> CountryPolygon {
        CountryPolygon {
            country: Country {
                iso3: iso3.to_string(),
                name: format!("Country {iso3}"),
                continent: "Testland".to_string(),
                population_estimate: 1_000,
                gdp_estimate: 10.0,
            },
            geometry: MultiPolygon(vec![Rect::new(min, max).to_polygon()]),
        }
    }

    #[test]
    fn finds_containing_country() {
        let index = CountryIndex::new(vec![square("AAA", (-10.0, -10.0), (10.0, 10.0))]);
        assert_eq!(index.lookup(0.0, 0.0).map(|c| c.iso3.as_str()), Some("AAA"));
    }

    #[test]
    fn misses_open_water() {
        let index = CountryIndex::new(vec![square("AAA", (-10.0, -10.0), (10.0, 10.0))]);
        assert!(index.lookup(50.0, 50.0).is_none());
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        let index = CountryIndex::new(vec![square("AAA", (-10.0, -10.0), (10.0, 10.0))]);
        assert!(index.lookup(200.0, 0.0).is_none());
    }

    #[test]
    fn shared_border_resolves_to_lowest_iso3_regardless_of_input_order() {
        let forward = CountryIndex::new(vec![
            square("AAA", (-10.0, -10.0), (0.0, 10.0)),
            square("BBB", (0.0, -10.0), (10.0, 10.0)),
        ]);
        let reversed = CountryIndex::new(vec![
            square("BBB", (0.0, -10.0), (10.0, 10.0)),
            square("AAA", (-10.0, -10.0), (0.0, 10.0)),
        ]);

        for _ in 0..3 {
            assert_eq!(forward.lookup(0.0, 0.0).map(|c| c.iso3.as_str()), Some("AAA"));
            assert_eq!(reversed.lookup(0.0, 0.0).map(|c| c.iso3.as_str()), Some("AAA"));
        }
        assert_eq!(forward.lookup(5.0, 0.0).map(|c| c.iso3.as_str()), Some("BBB"));
    }

    #[test]
    fn country_lookup_by_iso3() {
        let index = CountryIndex::new(vec![
            square("AAA", (-10.0, -10.0), (0.0, 10.0)),
            square("BBB", (0.0, -10.0), (10.0, 10.0)),
        ]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.country("BBB").map(|c| c.name.as_str()), Some("Country BBB"));
        assert!(index.country("ZZZ").is_none());
    }

    #[test]
    fn skips_empty_geometry() {
        let mut empty = square("EEE", (0.0, 0.0), (1.0, 1.0));
        empty.geometry = MultiPolygon(vec![]);
        let index = CountryIndex::new(vec![empty]);
        assert!(index.is_empty());
    }
}
