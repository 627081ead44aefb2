//! Country polygon loading from a `GeoJSON` `FeatureCollection`.
//!
//! Attribute names follow Natural Earth's admin-0 layer (`name`, `iso_a3`,
//! `continent`, `pop_est`, `gdp_md_est`), with upper-case fallbacks.
//! Natural Earth marks a handful of countries with the placeholder code
//! `-99`; those are reconciled by name through [`NAME_ISO3_OVERRIDES`].

use std::path::Path;

use geo::MultiPolygon;
use geojson::{Feature, GeoJson};
use soil_trade_models::Country;

use crate::{CountryPolygon, SpatialError};

/// Countries whose polygon record lacks a usable ISO3 code, keyed by the
/// feature's name.
pub const NAME_ISO3_OVERRIDES: &[(&str, &str)] = &[("France", "FRA"), ("Norway", "NOR")];

const NAME_KEYS: &[&str] = &["name", "NAME", "ADMIN", "admin"];
const ISO3_KEYS: &[&str] = &["iso_a3", "ISO_A3", "iso3", "ADM0_A3"];
const CONTINENT_KEYS: &[&str] = &["continent", "CONTINENT"];
const POPULATION_KEYS: &[&str] = &["pop_est", "POP_EST"];
const GDP_KEYS: &[&str] = &["gdp_md_est", "GDP_MD_EST", "gdp_md", "GDP_MD"];

/// Polygons read from a reference file plus the count of features that
/// could not be used.
#[derive(Debug)]
pub struct LoadedCountries {
    pub polygons: Vec<CountryPolygon>,
    /// Features skipped for an unresolvable ISO3 code or a non-polygon
    /// geometry.
    pub skipped: usize,
}

/// Reads country polygons from a `GeoJSON` file.
///
/// # Errors
///
/// Returns [`SpatialError`] if the file cannot be read or is not a
/// `GeoJSON` `FeatureCollection`.
pub fn load_countries(path: &Path) -> Result<LoadedCountries, SpatialError> {
    let content = std::fs::read_to_string(path).map_err(|e| SpatialError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let loaded = parse_countries(&content)?;
    log::info!(
        "Read {} country polygons from {} ({} features skipped)",
        loaded.polygons.len(),
        path.display(),
        loaded.skipped
    );
    Ok(loaded)
}

/// Parses country polygons from `GeoJSON` text.
///
/// # Errors
///
/// Returns [`SpatialError::DataFormat`] if the text is not a `GeoJSON`
/// `FeatureCollection`.
pub fn parse_countries(geojson_str: &str) -> Result<LoadedCountries, SpatialError> {
    let geojson: GeoJson = geojson_str.parse().map_err(|e| SpatialError::DataFormat {
        message: format!("invalid GeoJSON: {e}"),
    })?;

    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(SpatialError::DataFormat {
            message: "country polygons must be a GeoJSON FeatureCollection".to_string(),
        });
    };

    let mut polygons = Vec::with_capacity(collection.features.len());
    let mut skipped = 0;

    for feature in collection.features {
        match feature_to_polygon(feature) {
            Some(polygon) => polygons.push(polygon),
            None => skipped += 1,
        }
    }

    Ok(LoadedCountries { polygons, skipped })
}

fn feature_to_polygon(feature: Feature) -> Option<CountryPolygon> {
    let name = string_property(&feature, NAME_KEYS).unwrap_or_default();

    let Some(iso3) = string_property(&feature, ISO3_KEYS)
        .filter(|code| is_iso3(code))
        .or_else(|| name_override(&name).map(ToString::to_string))
    else {
        log::warn!("Skipping country feature '{name}': no usable ISO3 code");
        return None;
    };

    let population = number_property(&feature, POPULATION_KEYS).unwrap_or(0.0);
    let gdp = number_property(&feature, GDP_KEYS).unwrap_or(0.0);
    if population < 0.0 || gdp < 0.0 {
        log::warn!("Skipping country feature {iso3} ({name}): negative population or GDP");
        return None;
    }

    let continent = string_property(&feature, CONTINENT_KEYS).unwrap_or_default();

    let Some(geometry) = feature.geometry.and_then(to_multipolygon) else {
        log::warn!("Skipping country feature {iso3} ({name}): missing or non-polygon geometry");
        return None;
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let population_estimate = population.round() as u64;

    Some(CountryPolygon {
        country: Country {
            iso3,
            name,
            continent,
            population_estimate,
            gdp_estimate: gdp,
        },
        geometry,
    })
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

fn name_override(name: &str) -> Option<&'static str> {
    NAME_ISO3_OVERRIDES
        .iter()
        .find(|(override_name, _)| *override_name == name)
        .map(|(_, iso3)| *iso3)
}

fn is_iso3(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

fn string_property(feature: &Feature, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| feature.property(key))
        .and_then(|value| match value {
            serde_json::Value::String(s) => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn number_property(feature: &Feature, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|key| feature.property(key))
        .and_then(|value| match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .filter(|v: &f64| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CountryIndex;

    const WORLD: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"name": "France", "iso_a3": "-99", "continent": "Europe", "pop_est": 67059887, "gdp_md_est": 2715518.0},
                "geometry": {"type": "Polygon", "coordinates": [[[0.0, 43.0], [5.0, 43.0], [5.0, 49.0], [0.0, 49.0], [0.0, 43.0]]]}
            },
            {
                "type": "Feature",
                "properties": {"name": "Kenya", "iso_a3": "KEN", "continent": "Africa", "pop_est": "52573973", "gdp_md_est": 95503},
                "geometry": {"type": "MultiPolygon", "coordinates": [[[[35.0, -4.0], [41.0, -4.0], [41.0, 4.0], [35.0, 4.0], [35.0, -4.0]]]]}
            },
            {
                "type": "Feature",
                "properties": {"name": "Kosovo", "iso_a3": "-99", "continent": "Europe", "pop_est": 1794248, "gdp_md_est": 7926},
                "geometry": {"type": "Polygon", "coordinates": [[[20.0, 42.0], [21.0, 42.0], [21.0, 43.0], [20.0, 43.0], [20.0, 42.0]]]}
            },
            {
                "type": "Feature",
                "properties": {"name": "Pointland", "iso_a3": "PNT", "continent": "Nowhere", "pop_est": 1, "gdp_md_est": 1},
                "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}
            }
        ]
    }"#;

    #[test]
    fn reconciles_placeholder_iso3_by_name() {
        let loaded = parse_countries(WORLD).unwrap();
        let iso3s: Vec<&str> = loaded
            .polygons
            .iter()
            .map(|p| p.country.iso3.as_str())
            .collect();
        assert_eq!(iso3s, vec!["FRA", "KEN"]);
    }

    #[test]
    fn counts_unusable_features() {
        let loaded = parse_countries(WORLD).unwrap();
        // Kosovo has no ISO3 code and Pointland is not a polygon.
        assert_eq!(loaded.skipped, 2);
    }

    #[test]
    fn parses_numeric_attributes_from_numbers_and_strings() {
        let loaded = parse_countries(WORLD).unwrap();
        let kenya = &loaded.polygons[1].country;
        assert_eq!(kenya.population_estimate, 52_573_973);
        assert!((kenya.gdp_estimate - 95_503.0).abs() < f64::EPSILON);
        assert_eq!(kenya.continent, "Africa");
    }

    #[test]
    fn loaded_polygons_are_queryable() {
        let index = CountryIndex::new(parse_countries(WORLD).unwrap().polygons);
        assert_eq!(index.lookup(2.0, 46.0).map(|c| c.iso3.as_str()), Some("FRA"));
        assert_eq!(index.lookup(37.0, 0.0).map(|c| c.iso3.as_str()), Some("KEN"));
        assert!(index.lookup(20.5, 42.5).is_none());
    }

    #[test]
    fn rejects_bare_geometry() {
        let result = parse_countries(r#"{"type": "Point", "coordinates": [0.0, 0.0]}"#);
        assert!(matches!(result, Err(SpatialError::DataFormat { .. })));
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(
            parse_countries("not json"),
            Err(SpatialError::DataFormat { .. })
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.geojson");
        std::fs::write(&path, WORLD).unwrap();
        assert_eq!(load_countries(&path).unwrap().polygons.len(), 2);
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = load_countries(Path::new("/definitely/not/here.geojson"));
        assert!(matches!(result, Err(SpatialError::Io { .. })));
    }
}
