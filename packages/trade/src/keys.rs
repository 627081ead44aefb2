//! Reporter code to ISO3 reconciliation.
//!
//! The key table maps the trade matrix's numeric country codes to ISO3
//! codes. Codes the key table cannot resolve are listed in
//! `overrides.toml`, embedded at compile time so the exceptions stay
//! reviewable in one place.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use soil_trade_models::{KeyMapping, KeyResolution};

use crate::TradeError;
use crate::encoding::{DecodingReader, classify_csv_error};
use crate::normalize::open_input;

/// Override list embedded at compile time.
const OVERRIDES_TOML: &str = include_str!("../overrides.toml");

/// Number of built-in overrides. Enforced by a test.
#[cfg(test)]
const EXPECTED_OVERRIDE_COUNT: usize = 1;

const CODE_HEADERS: &[&str] = &["country code", "numeric_code", "reporter_country_code"];
const ISO3_HEADERS: &[&str] = &["iso3 code", "iso3", "reporter_country_iso3"];

/// A reporter code whose ISO3 code is supplied by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOverride {
    pub numeric_code: i32,
    pub iso3: String,
    /// Country name as it appears in the trade matrix.
    pub label: String,
    /// Why the key table cannot resolve this code.
    pub reason: String,
}

#[derive(Deserialize)]
struct OverrideFile {
    #[serde(rename = "override", default)]
    overrides: Vec<KeyOverride>,
}

/// Returns the embedded override list.
///
/// # Panics
///
/// Panics if the embedded TOML fails to parse. It is a compile-time
/// constant, so a parse failure is a development error caught by tests.
#[must_use]
pub fn builtin_overrides() -> Vec<KeyOverride> {
    parse_overrides(OVERRIDES_TOML)
        .unwrap_or_else(|e| panic!("Failed to parse embedded overrides.toml: {e}"))
}

/// Parses an override list in the `overrides.toml` format.
///
/// # Errors
///
/// Returns [`TradeError::DataFormat`] if the TOML is malformed.
pub fn parse_overrides(toml_str: &str) -> Result<Vec<KeyOverride>, TradeError> {
    toml::de::from_str::<OverrideFile>(toml_str)
        .map(|file| file.overrides)
        .map_err(|e| TradeError::format(format!("invalid override list: {e}")))
}

pub(crate) fn is_iso3(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

/// Resolves reporter codes to ISO3 codes.
#[derive(Debug, Clone, Default)]
pub struct KeyTable {
    mappings: BTreeMap<i32, String>,
    overrides: BTreeMap<i32, KeyOverride>,
}

impl KeyTable {
    /// Builds a table from key rows and overrides.
    ///
    /// Identical duplicate rows are accepted. Overrides win over key rows for
    /// the same code.
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::DataFormat`] if one code maps to two different
    /// ISO3 codes, an override carries an invalid ISO3 code, or two
    /// overrides share a code.
    pub fn new(
        mappings: impl IntoIterator<Item = KeyMapping>,
        overrides: Vec<KeyOverride>,
    ) -> Result<Self, TradeError> {
        let mut table = BTreeMap::new();
        for mapping in mappings {
            match table.get(&mapping.numeric_code) {
                Some(existing) if *existing != mapping.iso3 => {
                    return Err(TradeError::format(format!(
                        "key table maps code {} to both {existing} and {}",
                        mapping.numeric_code, mapping.iso3
                    )));
                }
                Some(_) => {}
                None => {
                    table.insert(mapping.numeric_code, mapping.iso3);
                }
            }
        }

        let mut by_code = BTreeMap::new();
        for entry in overrides {
            if !is_iso3(&entry.iso3) {
                return Err(TradeError::format(format!(
                    "override for code {} has invalid ISO3 code '{}'",
                    entry.numeric_code, entry.iso3
                )));
            }
            if let Some(mapped) = table.get(&entry.numeric_code) {
                log::info!(
                    "Override {} ({}) -> {} replaces key table value {mapped}",
                    entry.numeric_code,
                    entry.label,
                    entry.iso3
                );
            }
            if by_code.insert(entry.numeric_code, entry).is_some() {
                return Err(TradeError::format("duplicate reporter code in override list"));
            }
        }

        Ok(Self {
            mappings: table,
            overrides: by_code,
        })
    }

    /// Builds a table using the embedded override list.
    ///
    /// # Errors
    ///
    /// See [`KeyTable::new`].
    pub fn with_builtin_overrides(
        mappings: impl IntoIterator<Item = KeyMapping>,
    ) -> Result<Self, TradeError> {
        Self::new(mappings, builtin_overrides())
    }

    /// Resolves a reporter code.
    #[must_use]
    pub fn resolve(&self, code: i32) -> (Option<&str>, KeyResolution) {
        if let Some(entry) = self.overrides.get(&code) {
            return (Some(entry.iso3.as_str()), KeyResolution::Overridden);
        }
        self.mappings.get(&code).map_or(
            (None, KeyResolution::Unresolved),
            |iso3| (Some(iso3.as_str()), KeyResolution::Mapped),
        )
    }

    /// Fails if any of `codes` cannot be resolved.
    ///
    /// # Errors
    ///
    /// Returns [`TradeError::UnresolvedKey`] listing every unresolved code.
    pub fn validate(&self, codes: impl IntoIterator<Item = i32>) -> Result<(), TradeError> {
        let missing: BTreeSet<i32> = codes
            .into_iter()
            .filter(|code| self.resolve(*code).0.is_none())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(TradeError::UnresolvedKey {
                codes: missing.into_iter().collect(),
            })
        }
    }

    /// The overrides in effect, by code.
    pub fn overrides(&self) -> impl Iterator<Item = &KeyOverride> {
        self.overrides.values()
    }

    /// Number of key table rows (excluding overrides).
    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

/// Reads the key-mapping table from a delimited file.
///
/// # Errors
///
/// See [`parse_key_table`].
pub fn read_key_table(
    path: &Path,
    encoding: &'static encoding_rs::Encoding,
) -> Result<Vec<KeyMapping>, TradeError> {
    let file = open_input(path)?;
    parse_key_table(file, encoding, &path.display().to_string())
}

/// Parses key-mapping rows.
///
/// Rows whose ISO3 cell is blank or not a three-letter code (the key
/// table uses pseudo-codes such as `F41` for some areas) are skipped.
///
/// # Errors
///
/// Returns [`TradeError`] if the code or ISO3 column is missing, a code is
/// not an integer, or the text cannot be decoded.
pub fn parse_key_table(
    reader: impl Read,
    encoding: &'static encoding_rs::Encoding,
    label: &str,
) -> Result<Vec<KeyMapping>, TradeError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(DecodingReader::new(reader, encoding));

    let headers = csv_reader
        .headers()
        .map_err(|e| classify_csv_error(label, e))?
        .clone();

    let find = |candidates: &[&str], what: &str| {
        headers
            .iter()
            .position(|h| candidates.contains(&h.trim().to_ascii_lowercase().as_str()))
            .ok_or_else(|| TradeError::format(format!("{label}: no {what} column")))
    };
    let code_col = find(CODE_HEADERS, "country code")?;
    let iso3_col = find(ISO3_HEADERS, "ISO3 code")?;

    let mut mappings = Vec::new();
    let mut skipped = 0usize;

    for result in csv_reader.records() {
        let record = result.map_err(|e| classify_csv_error(label, e))?;
        let line = record.position().map_or(0, csv::Position::line);

        let code_str = record.get(code_col).unwrap_or("").trim();
        let numeric_code: i32 = code_str.parse().map_err(|_| {
            TradeError::format(format!("{label}:{line}: invalid country code '{code_str}'"))
        })?;

        let iso3 = record.get(iso3_col).unwrap_or("").trim();
        if !is_iso3(iso3) {
            log::debug!("{label}:{line}: no ISO3 code for {numeric_code} ('{iso3}')");
            skipped += 1;
            continue;
        }

        mappings.push(KeyMapping {
            numeric_code,
            iso3: iso3.to_string(),
        });
    }

    log::info!(
        "Read {} key mappings from {label} ({skipped} rows without an ISO3 code)",
        mappings.len()
    );

    Ok(mappings)
}
