#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Trade side of the pipeline.
//!
//! Reads the bilateral trade matrix in its legacy text encoding
//! ([`encoding`]), keeps export-quantity rows ([`normalize`]), and resolves
//! each reporter's numeric code to an ISO3 code through the key table and a
//! small, named override list ([`keys`]).

pub mod encoding;
pub mod keys;
pub mod normalize;

pub use keys::{KeyOverride, KeyTable, builtin_overrides, read_key_table};
pub use normalize::{
    EXPORT_QUANTITY_ELEMENT, KeyReport, ReadCounts, TradeFilter, TradeNormalizer,
    TradeReadOptions, TradeScan, YearSelection, read_trade_matrix, scan_trade_matrix,
};

/// Errors from trade matrix processing.
#[derive(Debug, thiserror::Error)]
pub enum TradeError {
    /// I/O error opening an input file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// CSV parsing error.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path to the CSV file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// The input text could not be decoded with the configured encoding.
    #[error("Encoding error: {message}")]
    Encoding {
        /// Description of what went wrong.
        message: String,
    },

    /// The input is missing a required column or is otherwise malformed.
    #[error("Data format error: {message}")]
    DataFormat {
        /// Description of what went wrong.
        message: String,
    },

    /// Reporter codes with neither a key table row nor an override.
    #[error("Unresolved reporter codes (add them to the key table or the override list): {codes:?}")]
    UnresolvedKey {
        /// The offending codes, ascending.
        codes: Vec<i32>,
    },
}

impl TradeError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::DataFormat {
            message: message.into(),
        }
    }
}
