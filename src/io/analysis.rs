//! Saved analysis directories.
//!
//! A saved fit is a directory holding everything needed to reload it:
//!
//! - `xfspec.json`: the pipeline that produced it
//! - `modelspec.NNNN.json`: one file per fitted modelspec
//! - `log.txt`: the evaluation log

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use serde_json::Value;

use crate::domain::{Step, Xfspec};
use crate::error::{AppError, ErrorKind};

const XFSPEC_FILE: &str = "xfspec.json";
const LOG_FILE: &str = "log.txt";
const MODELSPEC_PREFIX: &str = "modelspec.";

/// Contents of a saved analysis directory.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedAnalysis {
    pub xfspec: Xfspec,
    pub modelspecs: Vec<Value>,
}

/// Directory a fit is saved to: `{results_dir}/{batch}/{cellid}/{modelname}.{timestamp}`,
/// with the timestamp down to microseconds.
pub fn analysis_destination<Tz: TimeZone>(
    results_dir: &Path,
    batch: u32,
    cellid: &str,
    modelname: &str,
    when: &DateTime<Tz>,
) -> PathBuf
where
    Tz::Offset: std::fmt::Display,
{
    results_dir
        .join(batch.to_string())
        .join(cellid)
        .join(format!("{modelname}.{}", when.format("%Y-%m-%dT%H%M%S.%6f")))
}

/// Summary figure path recorded alongside a saved fit.
pub fn figure_file(destination: &Path) -> PathBuf {
    destination.join("figure.0000.png")
}

/// Write the pipeline, modelspecs and log into `destination`, creating it.
///
/// Modelspec files left by an earlier save to the same directory are removed
/// first, so a reload sees exactly `modelspecs`.
pub fn save_analysis(destination: &Path, xfspec: &[Step], modelspecs: &[Value], log: &[String]) -> Result<(), AppError> {
    fs::create_dir_all(destination)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", destination.display())))?;

    for stale in modelspec_files(destination)? {
        log::warn!("Replacing earlier modelspec {}", stale.display());
        fs::remove_file(&stale).map_err(|e| AppError::io(format!("Failed to remove '{}': {e}", stale.display())))?;
    }

    write_xfspec_json(&destination.join(XFSPEC_FILE), xfspec)?;

    for (i, modelspec) in modelspecs.iter().enumerate() {
        let path = destination.join(format!("{MODELSPEC_PREFIX}{i:04}.json"));
        let file = File::create(&path)
            .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", path.display())))?;
        serde_json::to_writer_pretty(file, modelspec)
            .map_err(|e| AppError::new(ErrorKind::Serialization, format!("Failed to write modelspec: {e}")))?;
    }

    let mut text = log.join("\n");
    text.push('\n');
    fs::write(destination.join(LOG_FILE), text)
        .map_err(|e| AppError::io(format!("Failed to write evaluation log: {e}")))?;

    Ok(())
}

/// Read a saved analysis back.
pub fn load_analysis(path: &Path) -> Result<SavedAnalysis, AppError> {
    let xfspec_path = path.join(XFSPEC_FILE);
    if !xfspec_path.is_file() {
        return Err(AppError::not_found(format!(
            "No saved analysis at '{}' (missing {XFSPEC_FILE}).",
            path.display()
        )));
    }
    let xfspec = read_xfspec_json(&xfspec_path)?;

    let modelspec_paths = modelspec_files(path)?;
    let mut modelspecs = Vec::with_capacity(modelspec_paths.len());
    for p in modelspec_paths {
        let file = File::open(&p).map_err(|e| AppError::io(format!("Failed to open '{}': {e}", p.display())))?;
        let modelspec: Value = serde_json::from_reader(file).map_err(|e| {
            AppError::new(ErrorKind::Serialization, format!("Invalid modelspec '{}': {e}", p.display()))
        })?;
        modelspecs.push(modelspec);
    }

    Ok(SavedAnalysis { xfspec, modelspecs })
}

/// `modelspec.*.json` files in `dir`, sorted by name.
fn modelspec_files(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let entries = fs::read_dir(dir).map_err(|e| AppError::io(format!("Failed to list '{}': {e}", dir.display())))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AppError::io(format!("Failed to list '{}': {e}", dir.display())))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(MODELSPEC_PREFIX) && name.ends_with(".json") {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Write a pipeline as pretty JSON.
pub fn write_xfspec_json(path: &Path, xfspec: &[Step]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create xfspec JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, xfspec)
        .map_err(|e| AppError::new(ErrorKind::Serialization, format!("Failed to write xfspec JSON: {e}")))
}

/// Read a pipeline from JSON.
pub fn read_xfspec_json(path: &Path) -> Result<Xfspec, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open xfspec JSON '{}': {e}", path.display())))?;
    serde_json::from_reader(file)
        .map_err(|e| AppError::new(ErrorKind::Serialization, format!("Invalid xfspec JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Operation;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn destination_layout() {
        let when = NaiveDate::from_ymd_opt(2018, 3, 9)
            .unwrap()
            .and_hms_micro_opt(14, 5, 7, 250_000)
            .unwrap()
            .and_utc();
        let dest = analysis_destination(Path::new("/results"), 271, "TAR010c-18-1", "env100_fir15x1_fit02", &when);
        assert_eq!(
            dest,
            PathBuf::from("/results/271/TAR010c-18-1/env100_fir15x1_fit02.2018-03-09T140507.250000")
        );
        assert_eq!(figure_file(&dest).file_name().unwrap(), "figure.0000.png");
    }

    #[test]
    fn save_then_load_keeps_modelspec_order() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("fit");
        let xfspec = vec![
            Step::new(Operation::FitBasic).arg("maxiter", 1000),
            Step::new(Operation::StandardCorrelation).io(&["est", "val", "modelspecs"], &["modelspecs"]),
        ];
        let modelspecs: Vec<Value> = (0..12).map(|i| json!([{"fn": "wc", "meta": {"fold": i}}])).collect();

        save_analysis(&dest, &xfspec, &modelspecs, &["Evaluating: nems.xforms.fit_basic".to_string()]).unwrap();
        assert!(dest.join("modelspec.0011.json").is_file());
        assert!(dest.join("log.txt").is_file());

        let loaded = load_analysis(&dest).unwrap();
        assert_eq!(loaded.xfspec, xfspec);
        assert_eq!(loaded.modelspecs, modelspecs);
    }

    #[test]
    fn destinations_differ_within_one_second() {
        let at = |micros| {
            NaiveDate::from_ymd_opt(2018, 3, 9)
                .unwrap()
                .and_hms_micro_opt(14, 5, 7, micros)
                .unwrap()
                .and_utc()
        };
        let first = analysis_destination(Path::new("/results"), 271, "TAR010c-18-1", "env100_fit01", &at(1));
        let second = analysis_destination(Path::new("/results"), 271, "TAR010c-18-1", "env100_fit01", &at(2));
        assert_ne!(first, second);
    }

    #[test]
    fn resave_replaces_earlier_modelspecs() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("fit");
        let xfspec = vec![Step::new(Operation::FitBasic)];
        let old: Vec<Value> = (0..5).map(|i| json!([{"meta": {"fold": i}}])).collect();
        save_analysis(&dest, &xfspec, &old, &[]).unwrap();

        let new = vec![json!([{"meta": {"fold": "new"}}])];
        save_analysis(&dest, &xfspec, &new, &[]).unwrap();

        let loaded = load_analysis(&dest).unwrap();
        assert_eq!(loaded.modelspecs, new);
        assert!(!dest.join("modelspec.0004.json").exists());
    }

    #[test]
    fn missing_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_analysis(&dir.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
