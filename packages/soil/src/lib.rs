#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Soil side of the pipeline.
//!
//! Flattens the gridded SOCD dataset into measurement points ([`grid`]),
//! attributes each point to the country containing it ([`attribute`]), and
//! reduces the attributed points to one summary row per country at a single
//! depth ([`aggregate`]).

pub mod aggregate;
pub mod attribute;
pub mod grid;

/// Errors from the soil stages.
#[derive(Debug, thiserror::Error)]
pub enum SoilError {
    /// The grid is missing a required dimension, column, or is otherwise
    /// malformed.
    #[error("Data format error: {message}")]
    DataFormat {
        /// Description of what went wrong.
        message: String,
    },

    /// CSV parsing error.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path to the CSV file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },
}

impl SoilError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::DataFormat {
            message: message.into(),
        }
    }
}
