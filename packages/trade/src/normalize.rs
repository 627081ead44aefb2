//! Trade matrix reading, filtering and reporter resolution.
//!
//! Only the columns the pipeline needs are deserialized. Rows outside the
//! configured element code or year are skipped while reading, so neither
//! the full matrix nor its unused columns are ever held in memory.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use encoding_rs::Encoding;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use soil_trade_models::{KeyResolution, ResolvedTrade, TradeRecord};

use crate::TradeError;
use crate::encoding::{DecodingReader, classify_csv_error};
use crate::keys::KeyTable;

/// FAOSTAT element code for "Export Quantity".
pub const EXPORT_QUANTITY_ELEMENT: i32 = 5910;

const REQUIRED_COLUMNS: &[&str] = &[
    "Reporter Country Code",
    "Reporter Countries",
    "Partner Country Code",
    "Partner Countries",
    "Item",
    "Element Code",
    "Year",
    "Value",
];

#[derive(Debug, Deserialize)]
struct RawTradeRow {
    #[serde(rename = "Reporter Country Code")]
    reporter_code: i32,
    #[serde(rename = "Reporter Countries")]
    reporter_name: String,
    #[serde(rename = "Partner Country Code")]
    partner_code: i32,
    #[serde(rename = "Partner Countries")]
    partner_name: String,
    #[serde(rename = "Item")]
    item: String,
    #[serde(rename = "Element Code")]
    element_code: i32,
    #[serde(rename = "Year")]
    year: i32,
    #[serde(rename = "Value")]
    value: Option<f64>,
}

// ============================================================
// Filter settings
// ============================================================

/// Which years of the matrix to keep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum YearSelection {
    All,
    Exact(i32),
    /// The most recent year present for the selected element.
    #[default]
    Latest,
}

impl YearSelection {
    /// The concrete year filter once the latest year is known.
    #[must_use]
    pub const fn resolve(self, latest: Option<i32>) -> Option<i32> {
        match self {
            Self::All => None,
            Self::Exact(year) => Some(year),
            Self::Latest => latest,
        }
    }
}

impl fmt::Display for YearSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Exact(year) => write!(f, "{year}"),
            Self::Latest => f.write_str("latest"),
        }
    }
}

impl FromStr for YearSelection {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "latest" => Ok(Self::Latest),
            other => other
                .parse()
                .map(Self::Exact)
                .map_err(|_| TradeError::format(format!("invalid year selection '{s}'"))),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum YearRepr {
    Year(i32),
    Keyword(String),
}

impl<'de> Deserialize<'de> for YearSelection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match YearRepr::deserialize(deserializer)? {
            YearRepr::Year(year) => Ok(Self::Exact(year)),
            YearRepr::Keyword(keyword) => keyword.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl Serialize for YearSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Exact(year) => serializer.serialize_i32(*year),
            other => serializer.collect_str(other),
        }
    }
}

/// Row selection for the trade matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeFilter {
    pub element_code: i32,
    pub years: YearSelection,
}

impl Default for TradeFilter {
    fn default() -> Self {
        Self {
            element_code: EXPORT_QUANTITY_ELEMENT,
            years: YearSelection::Latest,
        }
    }
}

impl TradeFilter {
    /// Options for a pass that keeps every year of the element. Used when
    /// the year is selected after reading.
    #[must_use]
    pub const fn every_year(self, encoding: &'static Encoding) -> TradeReadOptions {
        TradeReadOptions {
            encoding,
            element_code: self.element_code,
            year: None,
        }
    }

    /// Options for a pass restricted to the selected year, given the latest
    /// year in the matrix if a scan found one.
    #[must_use]
    pub const fn read_options(
        self,
        encoding: &'static Encoding,
        latest: Option<i32>,
    ) -> TradeReadOptions {
        TradeReadOptions {
            encoding,
            element_code: self.element_code,
            year: self.years.resolve(latest),
        }
    }

    /// Whether the latest year must be known before a filtered pass.
    #[must_use]
    pub const fn needs_scan(self) -> bool {
        matches!(self.years, YearSelection::Latest)
    }
}

/// Concrete settings for one pass over the matrix.
#[derive(Debug, Clone, Copy)]
pub struct TradeReadOptions {
    pub encoding: &'static Encoding,
    pub element_code: i32,
    /// `None` keeps every year.
    pub year: Option<i32>,
}

impl Default for TradeReadOptions {
    fn default() -> Self {
        Self {
            encoding: encoding_rs::WINDOWS_1252,
            element_code: EXPORT_QUANTITY_ELEMENT,
            year: None,
        }
    }
}

// ============================================================
// Reading
// ============================================================

/// Row counts for one pass over the matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadCounts {
    pub rows_read: u64,
    pub other_elements: u64,
    pub other_years: u64,
    /// Rows whose value is empty, negative or not finite.
    pub dropped_values: u64,
    /// Rows that could not be deserialized.
    pub malformed: u64,
    pub kept: u64,
}

/// Opens a trade or key file, mapping the error to [`TradeError::Io`].
///
/// # Errors
///
/// Returns [`TradeError::Io`] if the file cannot be opened.
pub fn open_input(path: &Path) -> Result<std::fs::File, TradeError> {
    std::fs::File::open(path).map_err(|e| TradeError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Streams the matrix, handing every row that passes `options` to
/// `on_record`.
///
/// # Errors
///
/// Returns [`TradeError::DataFormat`] if a required column is missing,
/// [`TradeError::Encoding`] if the text cannot be decoded, or whatever
/// `on_record` returns.
pub fn read_trade_matrix<R, E, F>(
    reader: R,
    label: &str,
    options: &TradeReadOptions,
    mut on_record: F,
) -> Result<ReadCounts, E>
where
    R: Read,
    E: From<TradeError>,
    F: FnMut(TradeRecord) -> Result<(), E>,
{
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(DecodingReader::new(reader, options.encoding));

    let headers = csv_reader
        .headers()
        .map_err(|e| classify_csv_error(label, e))?
        .clone();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .collect();
    if !missing.is_empty() {
        return Err(TradeError::format(format!(
            "{label}: missing required columns {missing:?}"
        ))
        .into());
    }

    let mut counts = ReadCounts::default();

    for result in csv_reader.deserialize::<RawTradeRow>() {
        counts.rows_read += 1;

        let row = match result {
            Ok(row) => row,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Deserialize { .. }) => {
                log::debug!("{label}: skipping malformed row: {e}");
                counts.malformed += 1;
                continue;
            }
            Err(e) => return Err(classify_csv_error(label, e).into()),
        };

        if row.element_code != options.element_code {
            counts.other_elements += 1;
            continue;
        }
        if options.year.is_some_and(|year| year != row.year) {
            counts.other_years += 1;
            continue;
        }
        let Some(quantity_tonnes) = row.value.filter(|v| v.is_finite() && *v >= 0.0) else {
            counts.dropped_values += 1;
            continue;
        };

        counts.kept += 1;
        on_record(TradeRecord {
            reporter_code: row.reporter_code,
            reporter_name: row.reporter_name,
            partner_code: row.partner_code,
            partner_name: row.partner_name,
            item: row.item,
            year: row.year,
            quantity_tonnes,
        })?;
    }

    if counts.malformed > 0 {
        log::warn!("{label}: skipped {} malformed rows", counts.malformed);
    }
    if counts.dropped_values > 0 {
        log::warn!(
            "{label}: dropped {} rows with an empty or negative value",
            counts.dropped_values
        );
    }
    log::info!(
        "{label}: kept {} of {} rows (element {}, year {})",
        counts.kept,
        counts.rows_read,
        options.element_code,
        options
            .year
            .map_or_else(|| "all".to_string(), |year| year.to_string())
    );

    Ok(counts)
}

/// Reads every matching row into memory.
///
/// # Errors
///
/// See [`read_trade_matrix`].
pub fn read_trade_records(
    reader: impl Read,
    label: &str,
    options: &TradeReadOptions,
) -> Result<(Vec<TradeRecord>, ReadCounts), TradeError> {
    let mut records = Vec::new();
    let counts = read_trade_matrix(reader, label, options, |record| {
        records.push(record);
        Ok::<(), TradeError>(())
    })?;
    Ok((records, counts))
}

/// Years and reporter codes present for one element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeScan {
    /// year -> reporter codes with at least one kept row in that year
    pub reporters_by_year: BTreeMap<i32, BTreeSet<i32>>,
    pub counts: ReadCounts,
}

impl TradeScan {
    #[must_use]
    pub fn latest_year(&self) -> Option<i32> {
        self.reporters_by_year.keys().next_back().copied()
    }

    /// Reporter codes in `year`, or in every year when `None`.
    #[must_use]
    pub fn reporter_codes(&self, year: Option<i32>) -> BTreeSet<i32> {
        match year {
            Some(year) => self
                .reporters_by_year
                .get(&year)
                .cloned()
                .unwrap_or_default(),
            None => self.reporters_by_year.values().flatten().copied().collect(),
        }
    }
}

/// A cheap pre-pass over the matrix that keeps no rows.
///
/// Resolves [`YearSelection::Latest`] and collects reporter codes for strict
/// key validation before the streaming pass.
///
/// # Errors
///
/// See [`read_trade_matrix`].
pub fn scan_trade_matrix(
    reader: impl Read,
    label: &str,
    encoding: &'static Encoding,
    element_code: i32,
) -> Result<TradeScan, TradeError> {
    let options = TradeReadOptions {
        encoding,
        element_code,
        year: None,
    };
    let mut reporters_by_year: BTreeMap<i32, BTreeSet<i32>> = BTreeMap::new();
    let counts = read_trade_matrix(reader, label, &options, |record| {
        reporters_by_year
            .entry(record.year)
            .or_default()
            .insert(record.reporter_code);
        Ok::<(), TradeError>(())
    })?;

    Ok(TradeScan {
        reporters_by_year,
        counts,
    })
}

/// The most recent year among `records`.
#[must_use]
pub fn latest_year(records: &[TradeRecord]) -> Option<i32> {
    records.iter().map(|record| record.year).max()
}

/// Keeps the records matching `years`, preserving order.
#[must_use]
pub fn select_years(records: Vec<TradeRecord>, years: YearSelection) -> Vec<TradeRecord> {
    match years.resolve(latest_year(&records)) {
        None => records,
        Some(year) => records.into_iter().filter(|r| r.year == year).collect(),
    }
}

// ============================================================
// Reporter resolution
// ============================================================

/// A reporter code nothing could resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedReporter {
    pub name: String,
    pub rows: u64,
}

/// How reporter codes were resolved during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyReport {
    pub mapped: u64,
    pub overridden: u64,
    pub unresolved: u64,
    pub unresolved_codes: BTreeMap<i32, UnresolvedReporter>,
}

impl KeyReport {
    fn record(&mut self, trade: &ResolvedTrade) {
        match trade.resolution {
            KeyResolution::Mapped => self.mapped += 1,
            KeyResolution::Overridden => self.overridden += 1,
            KeyResolution::Unresolved => {
                self.unresolved += 1;
                self.unresolved_codes
                    .entry(trade.reporter_code)
                    .or_insert_with(|| UnresolvedReporter {
                        name: trade.reporter_name.clone(),
                        rows: 0,
                    })
                    .rows += 1;
            }
        }
    }
}

/// Attaches reporter ISO3 codes to trade records.
pub struct TradeNormalizer<'a> {
    keys: &'a KeyTable,
    report: KeyReport,
}

impl<'a> TradeNormalizer<'a> {
    #[must_use]
    pub fn new(keys: &'a KeyTable) -> Self {
        Self {
            keys,
            report: KeyReport::default(),
        }
    }

    /// Resolves one record. Unresolved reporters keep `reporter_iso3 = None`.
    pub fn resolve(&mut self, record: TradeRecord) -> ResolvedTrade {
        let (iso3, resolution) = self.keys.resolve(record.reporter_code);
        let trade = ResolvedTrade::new(record, iso3.map(ToString::to_string), resolution);
        self.report.record(&trade);
        trade
    }

    /// Selects `years` and resolves every remaining record, preserving order.
    pub fn normalize(
        &mut self,
        records: Vec<TradeRecord>,
        years: YearSelection,
    ) -> Vec<ResolvedTrade> {
        select_years(records, years)
            .into_iter()
            .map(|record| self.resolve(record))
            .collect()
    }

    /// Streams the matrix, resolving every matching row and handing it to
    /// `f`.
    ///
    /// # Errors
    ///
    /// See [`read_trade_matrix`].
    pub fn for_each<R, E, F>(
        &mut self,
        reader: R,
        label: &str,
        options: &TradeReadOptions,
        mut f: F,
    ) -> Result<ReadCounts, E>
    where
        R: Read,
        E: From<TradeError>,
        F: FnMut(ResolvedTrade) -> Result<(), E>,
    {
        read_trade_matrix(reader, label, options, |record| f(self.resolve(record)))
    }

    #[must_use]
    pub const fn report(&self) -> &KeyReport {
        &self.report
    }

    /// Ends the run, logging unresolved reporters.
    #[must_use]
    pub fn finish(self) -> KeyReport {
        for (code, reporter) in &self.report.unresolved_codes {
            log::warn!(
                "Unresolved reporter {code} ({}): {} rows without soil data",
                reporter.name,
                reporter.rows
            );
        }
        log::info!(
            "Reporter keys: {} mapped, {} overridden, {} unresolved",
            self.report.mapped,
            self.report.overridden,
            self.report.unresolved
        );
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soil_trade_models::KeyMapping;

    const HEADER: &str = "Reporter Country Code,Reporter Countries,Partner Country Code,\
                          Partner Countries,Item Code,Item,Element Code,Element,Year Code,\
                          Year,Unit,Value,Flag\n";

    fn matrix(rows: &[&str]) -> String {
        let mut text = HEADER.to_string();
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text
    }

    fn utf8_options(year: Option<i32>) -> TradeReadOptions {
        TradeReadOptions {
            encoding: encoding_rs::UTF_8,
            element_code: EXPORT_QUANTITY_ELEMENT,
            year,
        }
    }

    #[test]
    fn china_mainland_scenario() {
        let text = matrix(&[
            "41,\"China, mainland\",231,United States of America,27,Rice,5910,Export Quantity,2021,2021,t,100,A",
        ]);
        let (records, counts) =
            read_trade_records(text.as_bytes(), "matrix.csv", &utf8_options(None)).unwrap();
        assert_eq!(counts.kept, 1);

        let keys = KeyTable::with_builtin_overrides(Vec::new()).unwrap();
        let mut normalizer = TradeNormalizer::new(&keys);
        let trades = normalizer.normalize(records, YearSelection::All);
        let report = normalizer.finish();

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].reporter_iso3.as_deref(), Some("CHN"));
        assert_eq!(trades[0].resolution, KeyResolution::Overridden);
        assert_eq!(trades[0].item, "Rice");
        assert!((trades[0].quantity_tonnes - 100.0).abs() < f64::EPSILON);
        assert_eq!(report.overridden, 1);
    }

    #[test]
    fn keeps_only_export_quantity_rows() {
        let text = matrix(&[
            "2,Afghanistan,4,Algeria,15,Wheat,5910,Export Quantity,2021,2021,t,10,A",
            "2,Afghanistan,4,Algeria,15,Wheat,5922,Export Value,2021,2021,1000 US$,99,A",
            "2,Afghanistan,4,Algeria,15,Wheat,5610,Import Quantity,2021,2021,t,7,A",
        ]);
        let (records, counts) =
            read_trade_records(text.as_bytes(), "matrix.csv", &utf8_options(None)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(counts.other_elements, 2);
        assert!((records[0].quantity_tonnes - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn drops_empty_and_negative_values() {
        let text = matrix(&[
            "2,Afghanistan,4,Algeria,15,Wheat,5910,Export Quantity,2021,2021,t,,A",
            "2,Afghanistan,4,Algeria,15,Wheat,5910,Export Quantity,2021,2021,t,-3,A",
            "2,Afghanistan,4,Algeria,15,Wheat,5910,Export Quantity,2021,2021,t,0,A",
        ]);
        let (records, counts) =
            read_trade_records(text.as_bytes(), "matrix.csv", &utf8_options(None)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(counts.dropped_values, 2);
    }

    #[test]
    fn skips_malformed_rows() {
        let text = matrix(&[
            "2,Afghanistan,4,Algeria,15,Wheat,5910,Export Quantity,2021,twenty,t,5,A",
            "2,Afghanistan,4,Algeria,15,Wheat,5910,Export Quantity,2021,2021,t,5,A",
        ]);
        let (records, counts) =
            read_trade_records(text.as_bytes(), "matrix.csv", &utf8_options(None)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(counts.malformed, 1);
    }

    #[test]
    fn missing_column_is_a_format_error() {
        let text = "Reporter Country Code,Reporter Countries,Item,Year,Value\n2,Afghanistan,Wheat,2021,5\n";
        let result = read_trade_records(text.as_bytes(), "matrix.csv", &utf8_options(None));
        assert!(matches!(result, Err(TradeError::DataFormat { .. })));
    }

    #[test]
    fn decodes_latin1_names() {
        let mut bytes = HEADER.as_bytes().to_vec();
        bytes.extend_from_slice(
            b"107,C\xf4te d'Ivoire,68,France,661,Cocoa beans,5910,Export Quantity,2021,2021,t,500,A\n",
        );
        let options = TradeReadOptions {
            encoding: crate::encoding::encoding_for_label("ISO-8859-1").unwrap(),
            ..utf8_options(None)
        };
        let (records, _) = read_trade_records(bytes.as_slice(), "matrix.csv", &options).unwrap();
        assert_eq!(records[0].reporter_name, "Côte d'Ivoire");

        let result = read_trade_records(bytes.as_slice(), "matrix.csv", &utf8_options(None));
        assert!(matches!(result, Err(TradeError::Encoding { .. })));
    }

    #[test]
    fn selects_latest_year() {
        let text = matrix(&[
            "2,Afghanistan,4,Algeria,15,Wheat,5910,Export Quantity,2020,2020,t,1,A",
            "3,Albania,4,Algeria,15,Wheat,5910,Export Quantity,2022,2022,t,2,A",
            "2,Afghanistan,4,Algeria,15,Wheat,5910,Export Quantity,2022,2022,t,3,A",
            "2,Afghanistan,4,Algeria,15,Wheat,5910,Export Quantity,2021,2021,t,4,A",
        ]);
        let (records, _) =
            read_trade_records(text.as_bytes(), "matrix.csv", &utf8_options(None)).unwrap();
        assert_eq!(latest_year(&records), Some(2022));

        let latest = select_years(records.clone(), YearSelection::Latest);
        assert_eq!(latest.len(), 2);
        assert!(latest.iter().all(|r| r.year == 2022));
        assert_eq!(select_years(records.clone(), YearSelection::Exact(2020)).len(), 1);
        assert_eq!(select_years(records, YearSelection::All).len(), 4);

        let scan = scan_trade_matrix(
            text.as_bytes(),
            "matrix.csv",
            encoding_rs::UTF_8,
            EXPORT_QUANTITY_ELEMENT,
        )
        .unwrap();
        assert_eq!(scan.latest_year(), Some(2022));
        assert_eq!(scan.reporter_codes(Some(2022)), BTreeSet::from([2, 3]));
        assert_eq!(scan.reporter_codes(Some(2020)), BTreeSet::from([2]));
        assert_eq!(scan.reporter_codes(None), BTreeSet::from([2, 3]));
    }

    #[test]
    fn streaming_matches_in_memory() {
        let text = matrix(&[
            "2,Afghanistan,4,Algeria,15,Wheat,5910,Export Quantity,2022,2022,t,1,A",
            "41,\"China, mainland\",4,Algeria,27,Rice,5910,Export Quantity,2022,2022,t,2,A",
            "999,Atlantis,4,Algeria,27,Rice,5910,Export Quantity,2022,2022,t,3,A",
        ]);
        let keys = KeyTable::with_builtin_overrides(vec![KeyMapping {
            numeric_code: 2,
            iso3: "AFG".to_string(),
        }])
        .unwrap();

        let (records, _) =
            read_trade_records(text.as_bytes(), "matrix.csv", &utf8_options(None)).unwrap();
        let in_memory = TradeNormalizer::new(&keys).normalize(records, YearSelection::All);

        let mut streamed = Vec::new();
        let mut normalizer = TradeNormalizer::new(&keys);
        normalizer
            .for_each(text.as_bytes(), "matrix.csv", &utf8_options(Some(2022)), |trade| {
                streamed.push(trade);
                Ok::<(), TradeError>(())
            })
            .unwrap();
        let report = normalizer.finish();

        assert_eq!(in_memory, streamed);
        assert_eq!(report.mapped, 1);
        assert_eq!(report.overridden, 1);
        assert_eq!(report.unresolved, 1);
        assert_eq!(report.unresolved_codes[&999].name, "Atlantis");
        assert!(streamed[2].reporter_iso3.is_none());
    }

    #[test]
    fn parses_year_selection() {
        assert_eq!("latest".parse::<YearSelection>().unwrap(), YearSelection::Latest);
        assert_eq!("ALL".parse::<YearSelection>().unwrap(), YearSelection::All);
        assert_eq!("2021".parse::<YearSelection>().unwrap(), YearSelection::Exact(2021));
        assert!("soon".parse::<YearSelection>().is_err());
    }

    #[test]
    fn deserializes_trade_filter_from_toml() {
        let filter: TradeFilter = toml::de::from_str("years = 2019").unwrap();
        assert_eq!(filter.years, YearSelection::Exact(2019));
        assert_eq!(filter.element_code, EXPORT_QUANTITY_ELEMENT);

        let filter: TradeFilter = toml::de::from_str("years = \"all\"\nelement_code = 5610").unwrap();
        assert_eq!(filter.years, YearSelection::All);
        assert_eq!(filter.element_code, 5610);

        assert_eq!(TradeFilter::default().years, YearSelection::Latest);
    }

    #[test]
    fn filter_builds_read_options() {
        let latest = TradeFilter::default();
        assert!(latest.needs_scan());
        let options = latest.read_options(encoding_rs::UTF_8, Some(2021));
        assert_eq!(options.year, Some(2021));
        assert_eq!(options.element_code, EXPORT_QUANTITY_ELEMENT);
        assert_eq!(latest.every_year(encoding_rs::UTF_8).year, None);

        let exact = TradeFilter {
            element_code: 5610,
            years: YearSelection::Exact(2019),
        };
        assert!(!exact.needs_scan());
        let options = exact.read_options(encoding_rs::UTF_8, Some(2021));
        assert_eq!(options.year, Some(2019));
        assert_eq!(options.element_code, 5610);

        let all = TradeFilter {
            years: YearSelection::All,
            ..TradeFilter::default()
        };
        assert_eq!(all.read_options(encoding_rs::UTF_8, Some(2021)).year, None);
    }
}
