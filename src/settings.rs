//! Environment-driven settings.
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file in the working directory.

use std::path::{Path, PathBuf};

const DEFAULT_RESULTS_DIR: &str = "results";
const DEFAULT_RECORDINGS_DIR: &str = "recordings";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Root for saved analyses and the results table.
    pub results_dir: PathBuf,
    /// Base used to resolve bare recording file names.
    pub recordings_dir: PathBuf,
    /// Program implementing the external evaluator protocol.
    pub evaluator: Option<String>,
    /// Code revision recorded with saved fits.
    pub githash: Option<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup (the environment in practice).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            results_dir: non_empty("NEMS_RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RESULTS_DIR)),
            recordings_dir: non_empty("NEMS_RECORDINGS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RECORDINGS_DIR)),
            evaluator: non_empty("NEMS_EVALUATOR"),
            githash: non_empty("CODEHASH"),
        }
    }

    /// Resolve a recording argument.
    ///
    /// URIs (`scheme://...`) and paths with a directory component are returned
    /// unchanged; a bare file name is joined onto `recordings_dir`.
    pub fn resolve_recording(&self, recording: &str) -> String {
        if recording.contains("://") {
            return recording.to_string();
        }
        let path = Path::new(recording);
        if path.is_absolute() || path.components().count() > 1 {
            return recording.to_string();
        }
        self.recordings_dir.join(path).to_string_lossy().to_string()
    }
}
