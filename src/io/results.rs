//! Results table: one row per saved fit, keyed by (batch, cellid, modelname).
//!
//! Updates hold an exclusive lock on `results.json.lock` for the whole
//! read-modify-write, and the table is replaced atomically, so readers never
//! see a partial file. Updating an existing key replaces the row (last write
//! wins); other keys are untouched.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{AppError, ErrorKind};

/// File name of the table inside the results directory.
pub const RESULTS_TABLE_FILE: &str = "results.json";

/// Lock file serializing updates to the table.
const LOCK_SUFFIX: &str = "lock";

/// Summary of one saved fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsRow {
    pub batch: u32,
    pub cellid: String,
    pub modelname: String,
    pub modelpath: PathBuf,
    pub figurefile: PathBuf,
    #[serde(default)]
    pub r_test: Option<f64>,
    #[serde(default)]
    pub r_fit: Option<f64>,
    #[serde(default)]
    pub githash: Option<String>,
    pub lastmod: DateTime<Utc>,
}

impl ResultsRow {
    fn matches(&self, batch: u32, modelname: &str, cellid: &str) -> bool {
        self.batch == batch && self.modelname == modelname && self.cellid == cellid
    }
}

/// Persistence for fit summaries.
pub trait ResultsStore {
    /// Insert the row, replacing any row with the same key.
    fn update_results(&mut self, row: ResultsRow) -> Result<(), AppError>;

    /// Look up the row for an exact (batch, modelname, cellid) match.
    fn get_results_file(&self, batch: u32, modelname: &str, cellid: &str) -> Result<ResultsRow, AppError>;
}

/// Results table stored as a JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonResultsStore {
    path: PathBuf,
}

impl JsonResultsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The table inside a results directory.
    pub fn in_dir(results_dir: &Path) -> Self {
        Self::new(results_dir.join(RESULTS_TABLE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All rows; a missing table is empty.
    pub fn rows(&self) -> Result<Vec<ResultsRow>, AppError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)
            .map_err(|e| AppError::io(format!("Failed to open results table '{}': {e}", self.path.display())))?;
        serde_json::from_reader(file)
            .map_err(|e| AppError::new(ErrorKind::Serialization, format!("Invalid results table: {e}")))
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".");
        name.push(LOCK_SUFFIX);
        self.path.with_file_name(name)
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn open_lock(&self) -> Result<RwLock<File>, AppError> {
        let parent = self.parent_dir();
        fs::create_dir_all(parent).map_err(|e| AppError::io(format!("Failed to create '{}': {e}", parent.display())))?;
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| AppError::io(format!("Failed to open lock '{}': {e}", lock_path.display())))?;
        Ok(RwLock::new(file))
    }

    /// Write the table to a temporary file next to it, then rename it over.
    fn write_rows(&self, rows: &[ResultsRow]) -> Result<(), AppError> {
        let write_err = |e: std::io::Error| {
            AppError::io(format!("Failed to write results table '{}': {e}", self.path.display()))
        };
        let tmp = NamedTempFile::new_in(self.parent_dir()).map_err(write_err)?;
        let mut writer = BufWriter::new(tmp);
        serde_json::to_writer_pretty(&mut writer, rows)
            .map_err(|e| AppError::new(ErrorKind::Serialization, format!("Failed to write results table: {e}")))?;
        writer.flush().map_err(write_err)?;
        let tmp = writer.into_inner().map_err(|e| write_err(e.into_error()))?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

impl ResultsStore for JsonResultsStore {
    fn update_results(&mut self, row: ResultsRow) -> Result<(), AppError> {
        let mut lock = self.open_lock()?;
        let _guard = lock
            .write()
            .map_err(|e| AppError::io(format!("Failed to lock results table '{}': {e}", self.path.display())))?;

        let mut rows = self.rows()?;
        log::info!(
            "Updating results table {} for {}/{}/{}",
            self.path.display(),
            row.batch,
            row.cellid,
            row.modelname
        );
        match rows
            .iter_mut()
            .find(|r| r.matches(row.batch, &row.modelname, &row.cellid))
        {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
        self.write_rows(&rows)
    }

    fn get_results_file(&self, batch: u32, modelname: &str, cellid: &str) -> Result<ResultsRow, AppError> {
        self.rows()?
            .into_iter()
            .find(|r| r.matches(batch, modelname, cellid))
            .ok_or_else(|| {
                AppError::not_found(format!(
                    "No results for batch {batch}, model {modelname}, cell {cellid}."
                ))
            })
    }
}
