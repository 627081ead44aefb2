#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Output tables with commit-on-success semantics.
//!
//! Every artifact of a run is written into `<output_dir>/.staging` first.
//! [`Staging::commit`] moves them to their final paths only once the whole
//! run has succeeded, so a failed run never leaves a partial table where a
//! consumer would read it. A failed run leaves the staging directory behind;
//! the next [`Staging::begin`] clears it. The commit itself moves files one
//! by one and finishes with a marker document (the run report).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use soil_trade_models::TableRow;

/// Name of the staging directory inside the output directory.
pub const STAGING_DIR: &str = ".staging";

/// Errors from writing outputs.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// I/O error creating, writing or moving a file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// CSV serialization error.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path to the CSV file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// JSON serialization error.
    #[error("JSON error in {path}: {source}")]
    Json {
        /// Path to the JSON file.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError + '_ {
    move |source| ExportError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn csv_error(path: &Path) -> impl FnOnce(csv::Error) -> ExportError + '_ {
    move |source| ExportError::Csv {
        path: path.display().to_string(),
        source,
    }
}

// ============================================================
// CSV writing
// ============================================================

/// Incremental CSV writer for rows of one type.
///
/// The header comes from [`TableRow::COLUMNS`] and is written on creation,
/// so a table with no rows still has its header line. `None` fields are
/// written as empty cells.
pub struct CsvSink<T> {
    path: PathBuf,
    writer: csv::Writer<BufWriter<File>>,
    rows: u64,
    row_type: PhantomData<fn(&T)>,
}

impl<T: TableRow> CsvSink<T> {
    /// Creates (or truncates) `path` and writes the header.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError`] if the file cannot be created or the header
    /// cannot be written.
    pub fn create(path: &Path) -> Result<Self, ExportError> {
        let file = File::create(path).map_err(io_error(path))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(file));
        writer.write_record(T::COLUMNS).map_err(csv_error(path))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            rows: 0,
            row_type: PhantomData,
        })
    }

    /// Appends one row.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Csv`] if the row cannot be serialized.
    pub fn write_row(&mut self, row: &T) -> Result<(), ExportError> {
        self.writer.serialize(row).map_err(csv_error(&self.path))?;
        self.rows += 1;
        Ok(())
    }

    /// Appends a chunk of rows.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Csv`] if a row cannot be serialized.
    pub fn write_rows(&mut self, rows: &[T]) -> Result<(), ExportError> {
        rows.iter().try_for_each(|row| self.write_row(row))
    }

    #[must_use]
    pub const fn rows(&self) -> u64 {
        self.rows
    }

    /// Flushes the file and returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Io`] if flushing fails.
    pub fn finish(mut self) -> Result<u64, ExportError> {
        self.writer.flush().map_err(io_error(&self.path))?;
        log::debug!("Wrote {} rows to {}", self.rows, self.path.display());
        Ok(self.rows)
    }
}

/// Writes `rows` to `path` as CSV and returns the row count.
///
/// # Errors
///
/// Returns [`ExportError`] if the file cannot be created or written.
pub fn write_csv<T: TableRow>(
    path: &Path,
    rows: impl IntoIterator<Item = T>,
) -> Result<u64, ExportError> {
    let mut sink = CsvSink::create(path)?;
    for row in rows {
        sink.write_row(&row)?;
    }
    sink.finish()
}

/// Writes `value` to `path` as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`ExportError`] if the file cannot be created or written.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ExportError> {
    let file = File::create(path).map_err(io_error(path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| ExportError::Json {
        path: path.display().to_string(),
        source,
    })?;
    writer.write_all(b"\n").map_err(io_error(path))?;
    writer.flush().map_err(io_error(path))
}

// ============================================================
// Staging
// ============================================================

/// A set of files written for one run, not yet visible at their final
/// paths.
#[derive(Debug)]
pub struct Staging {
    output_dir: PathBuf,
    staging_dir: PathBuf,
    files: Vec<String>,
    marker: Option<String>,
}

impl Staging {
    /// Creates an empty staging directory under `output_dir`, removing any
    /// leftovers of an earlier failed run.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Io`] if the directories cannot be created.
    pub fn begin(output_dir: &Path) -> Result<Self, ExportError> {
        let staging_dir = output_dir.join(STAGING_DIR);
        if staging_dir.exists() {
            log::warn!(
                "Removing leftover staging directory {}",
                staging_dir.display()
            );
            std::fs::remove_dir_all(&staging_dir).map_err(io_error(&staging_dir))?;
        }
        std::fs::create_dir_all(&staging_dir).map_err(io_error(&staging_dir))?;

        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            staging_dir,
            files: Vec::new(),
            marker: None,
        })
    }

    /// Registers `name` and returns its staged path.
    fn stage(&mut self, name: &str) -> PathBuf {
        if !self.files.iter().any(|f| f == name) {
            self.files.push(name.to_string());
        }
        self.staging_dir.join(name)
    }

    /// Writes a complete CSV table.
    ///
    /// # Errors
    ///
    /// See [`write_csv`].
    pub fn write_csv<T: TableRow>(
        &mut self,
        name: &str,
        rows: impl IntoIterator<Item = T>,
    ) -> Result<u64, ExportError> {
        let path = self.stage(name);
        let rows = write_csv(&path, rows)?;
        log::info!("Staged {name} ({rows} rows)");
        Ok(rows)
    }

    /// Opens an incremental CSV writer for `name`.
    ///
    /// # Errors
    ///
    /// See [`CsvSink::create`].
    pub fn csv_sink<T: TableRow>(&mut self, name: &str) -> Result<CsvSink<T>, ExportError> {
        let path = self.stage(name);
        CsvSink::create(&path)
    }

    /// Writes a JSON document.
    ///
    /// # Errors
    ///
    /// See [`write_json`].
    pub fn write_json<T: Serialize>(&mut self, name: &str, value: &T) -> Result<(), ExportError> {
        let path = self.stage(name);
        write_json(&path, value)
    }

    /// Writes the JSON document that marks a completed commit.
    ///
    /// [`Staging::commit`] removes the previous marker before moving
    /// anything and moves this one last. A marker at its final path means
    /// every other file of the same commit is in place.
    ///
    /// # Errors
    ///
    /// See [`write_json`].
    pub fn write_marker<T: Serialize>(&mut self, name: &str, value: &T) -> Result<(), ExportError> {
        let path = self.staging_dir.join(name);
        write_json(&path, value)?;
        self.files.retain(|f| f != name);
        self.marker = Some(name.to_string());
        Ok(())
    }

    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    fn move_into_place(&self, name: &str) -> Result<PathBuf, ExportError> {
        let from = self.staging_dir.join(name);
        let to = self.output_dir.join(name);
        std::fs::rename(&from, &to).map_err(io_error(&to))?;
        Ok(to)
    }

    /// Moves every staged file to `output_dir`, replacing existing files,
    /// then removes the staging directory. Returns the final paths.
    ///
    /// Files are moved one at a time. The marker (see
    /// [`Staging::write_marker`]) is moved last, so if a move fails partway
    /// the output directory has no marker.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Io`] if a file cannot be moved.
    pub fn commit(self) -> Result<Vec<PathBuf>, ExportError> {
        if let Some(marker) = &self.marker {
            let previous = self.output_dir.join(marker);
            if previous.exists() {
                std::fs::remove_file(&previous).map_err(io_error(&previous))?;
            }
        }

        let mut committed = Vec::with_capacity(self.files.len() + 1);
        for name in self.files.iter().chain(&self.marker) {
            committed.push(self.move_into_place(name)?);
        }
        std::fs::remove_dir_all(&self.staging_dir).map_err(io_error(&self.staging_dir))?;

        log::info!(
            "Committed {} files to {}",
            committed.len(),
            self.output_dir.display()
        );
        Ok(committed)
    }
}
