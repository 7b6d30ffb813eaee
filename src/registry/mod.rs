//! Configuration registry.
//!
//! Maps short loader and fitter codes to structured pipeline descriptions.
//! The tables are closed enumerations built once per process: every valid model
//! name resolves to exactly one pipeline, and an unrecognized code is an error
//! rather than a fallback.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::domain::{RecordingSource, Xfspec};
use crate::error::AppError;

pub mod fitter;
pub mod loader;

pub use fitter::FitterConfig;
pub use loader::{LoaderConfig, LoaderShape};

#[derive(Debug, Clone)]
pub struct Registry {
    loaders: Vec<LoaderConfig>,
    fitters: Vec<FitterConfig>,
    loader_index: HashMap<&'static str, usize>,
    fitter_index: HashMap<&'static str, usize>,
}

impl Registry {
    /// Build the registry from the standard loader and fitter tables.
    pub fn standard() -> Self {
        Self::from_tables(loader::standard_loaders(), fitter::standard_fitters())
    }

    /// Process-wide registry, built on first use.
    pub fn global() -> &'static Registry {
        static REGISTRY: OnceLock<Registry> = OnceLock::new();
        REGISTRY.get_or_init(Registry::standard)
    }

    fn from_tables(loaders: Vec<LoaderConfig>, fitters: Vec<FitterConfig>) -> Self {
        let loader_index = loaders.iter().enumerate().map(|(i, l)| (l.code, i)).collect();
        let fitter_index = fitters.iter().enumerate().map(|(i, f)| (f.code, i)).collect();
        Self {
            loaders,
            fitters,
            loader_index,
            fitter_index,
        }
    }

    pub fn loader(&self, code: &str) -> Result<&LoaderConfig, AppError> {
        self.loader_index
            .get(code)
            .map(|&i| &self.loaders[i])
            .ok_or_else(|| AppError::unknown_configuration("loader", code))
    }

    pub fn fitter(&self, code: &str) -> Result<&FitterConfig, AppError> {
        self.fitter_index
            .get(code)
            .map(|&i| &self.fitters[i])
            .ok_or_else(|| AppError::unknown_configuration("fitter", code))
    }

    /// All loaders, in table order.
    pub fn loaders(&self) -> &[LoaderConfig] {
        &self.loaders
    }

    /// All fitters, in table order.
    pub fn fitters(&self) -> &[FitterConfig] {
        &self.fitters
    }

    /// Steps that load and shape the recording for `code`.
    pub fn resolve_loader(&self, code: &str, source: &RecordingSource) -> Result<Xfspec, AppError> {
        let config = self.loader(code)?;
        log::debug!("loader {code}: {:?}", config.options);
        Ok(config.steps(source))
    }

    /// Steps that fit the model for `code`, ending with prediction.
    pub fn resolve_fitter(&self, code: &str) -> Result<Xfspec, AppError> {
        let config = self.fitter(code)?;
        if let Some(note) = config.note {
            log::info!("{note}");
        }
        Ok(config.steps())
    }
}

/// Resolve a loader code against a recording URI using the global registry.
pub fn resolve_loader(code: &str, recording_uri: &str) -> Result<Xfspec, AppError> {
    Registry::global().resolve_loader(code, &RecordingSource::Uri(recording_uri.to_string()))
}

/// Resolve a fitter code using the global registry.
pub fn resolve_fitter(code: &str) -> Result<Xfspec, AppError> {
    Registry::global().resolve_fitter(code)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::domain::{Operation, StateSignal};
    use crate::error::ErrorKind;
    use serde_json::json;

    const LOADER_CODES: [&str; 12] = [
        "ozgf100ch18",
        "ozgf100ch18pup",
        "nostim10pup",
        "nostim10pup0beh0",
        "nostim10pup0beh",
        "nostim10pupbeh0",
        "nostim10pupbeh",
        "nostim20pup0beh0",
        "nostim20pup0beh",
        "nostim20pupbeh0",
        "nostim20pupbeh",
        "env100",
    ];

    const FITTER_CODES: [&str; 6] = ["fit01", "fit01a", "fitjk01", "fitpjk01", "fit02", "fititer01"];

    #[test]
    fn tables_are_exactly_the_enumerated_codes() {
        let registry = Registry::standard();
        let loaders: Vec<&str> = registry.loaders().iter().map(|l| l.code).collect();
        let fitters: Vec<&str> = registry.fitters().iter().map(|f| f.code).collect();
        assert_eq!(loaders, LOADER_CODES);
        assert_eq!(fitters, FITTER_CODES);

        let unique: HashSet<&str> = loaders.iter().copied().collect();
        assert_eq!(unique.len(), loaders.len());
    }

    #[test]
    fn every_loader_starts_by_loading_the_locator() {
        for code in LOADER_CODES {
            let steps = resolve_loader(code, "http://host/recordings/TAR010c-18-1.tgz").unwrap();
            assert!(!steps.is_empty(), "{code}");
            assert_eq!(steps[0].op, Operation::LoadRecordings, "{code}");
            assert_eq!(
                steps[0].args["recording_uri_list"],
                json!(["http://host/recordings/TAR010c-18-1.tgz"]),
                "{code}"
            );
        }
    }

    #[test]
    fn every_fitter_ends_with_prediction() {
        for code in FITTER_CODES {
            let steps = resolve_fitter(code).unwrap();
            assert!(!steps.is_empty(), "{code}");
            assert_eq!(steps.last().map(|s| &s.op), Some(&Operation::Predict), "{code}");
        }
    }

    #[test]
    fn unknown_codes_are_rejected() {
        let err = resolve_loader("unknown_code", "uri").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownConfiguration);
        let err = resolve_fitter("unknown_code").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownConfiguration);
    }

    #[test]
    fn no_partial_or_prefix_matches() {
        for code in ["ozgf100", "nostim10pup0", "nostim10pupbeh00", "NOSTIM10PUPBEH", "fit0", "fit01 "] {
            assert!(
                Registry::global().loader(code).is_err() && Registry::global().fitter(code).is_err(),
                "{code}"
            );
        }
    }

    fn permuted(code: &str) -> serde_json::Value {
        let steps = resolve_loader(code, "uri").unwrap();
        steps
            .iter()
            .find(|s| matches!(s.op, Operation::MakeStateSignal | Operation::PreprocMakeStateSignal))
            .map(|s| s.args["permute_signals"].clone())
            .unwrap()
    }

    #[test]
    fn permutation_controls_10hz() {
        assert_eq!(permuted("nostim10pup0beh0"), json!(["pupil", "behavior_state"]));
        assert_eq!(permuted("nostim10pup0beh"), json!(["pupil"]));
        assert_eq!(permuted("nostim10pupbeh0"), json!(["behavior_state"]));
        assert_eq!(permuted("nostim10pupbeh"), json!([]));
    }

    #[test]
    fn permutation_controls_20hz() {
        assert_eq!(permuted("nostim20pup0beh0"), json!(["pupil", "active"]));
        assert_eq!(permuted("nostim20pup0beh"), json!(["pupil"]));
        assert_eq!(permuted("nostim20pupbeh0"), json!(["active"]));
        assert_eq!(permuted("nostim20pupbeh"), json!([]));
    }

    #[test]
    fn permutation_sets_are_subsets_of_state_signals() {
        let registry = Registry::standard();
        for config in registry.loaders() {
            if let LoaderShape::StateSignal {
                state_signals,
                permute_signals,
                ..
            } = &config.shape
            {
                assert!(permute_signals.iter().all(|s| state_signals.contains(s)), "{}", config.code);
            }
        }
        let only_controls: Vec<&str> = registry
            .loaders()
            .iter()
            .filter(|l| !l.permute_signals().is_empty())
            .map(|l| l.code)
            .collect();
        assert_eq!(only_controls.len(), 6);
        assert!(!only_controls.contains(&"nostim10pup"));
        assert!(
            registry
                .loader("nostim10pup0beh0")
                .unwrap()
                .permute_signals()
                .contains(&StateSignal::BehaviorState)
        );
    }
}
