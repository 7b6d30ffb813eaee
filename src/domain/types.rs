//! Shared domain types.
//!
//! These types are kept serializable so an assembled pipeline can be:
//!
//! - handed to an evaluator (in-process or external)
//! - written next to a saved fit and reloaded later
//! - printed as JSON for inspection

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AppError, ErrorKind};

/// Keyword arguments of a single step.
pub type StepArgs = Map<String, Value>;

/// An ordered list of steps; the unit handed to an evaluator.
pub type Xfspec = Vec<Step>;

/// A compound model name: `<loader>_<architecture keywords>_<fitter>`.
///
/// The first underscore-delimited token selects the loader, the last selects the
/// fitter, and everything in between (rejoined with `_`) is the keyword string
/// used to initialize the modelspec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelName {
    pub full: String,
    pub loader: String,
    pub modelspecname: String,
    pub fitter: String,
}

impl FromStr for ModelName {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kws: Vec<&str> = s.split('_').collect();
        if kws.len() < 2 {
            return Err(AppError::new(
                ErrorKind::InvalidModelName,
                format!("model name '{s}' needs at least a loader and a fitter segment"),
            ));
        }
        let loader = kws[0];
        let fitter = kws[kws.len() - 1];
        if loader.is_empty() || fitter.is_empty() {
            return Err(AppError::new(
                ErrorKind::InvalidModelName,
                format!("model name '{s}' has an empty loader or fitter segment"),
            ));
        }

        Ok(Self {
            full: s.to_string(),
            loader: loader.to_string(),
            modelspecname: kws[1..kws.len() - 1].join("_"),
            fitter: fitter.to_string(),
        })
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

/// Operation identifiers understood by the xforms evaluator.
///
/// Identifiers are opaque to this crate; they are resolved by whichever
/// evaluator runs the pipeline. Anything not listed here is carried as
/// [`Operation::Other`] so saved pipelines round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operation {
    LoadRecordings,
    LoadRecordingWrapper,
    SplitByOccurrenceCounts,
    AverageAwayStimOccurrences,
    MakeStateSignal,
    /// The preprocessing-level variant, called with explicit `rec` in/out keys.
    PreprocMakeStateSignal,
    InitFromKeywords,
    FitBasicInit,
    FitBasic,
    SplitForJackknife,
    GeneratePsthNfold,
    FitNfold,
    FitIteratively,
    Predict,
    StandardCorrelation,
    PlotSummary,
    Other(String),
}

const XFORMS_FIT_PREFIX: &str = "nems.xforms.fit_";

const KNOWN_OPERATIONS: [(Operation, &str); 16] = [
    (Operation::LoadRecordings, "nems.xforms.load_recordings"),
    (Operation::LoadRecordingWrapper, "nems.xforms.load_recording_wrapper"),
    (Operation::SplitByOccurrenceCounts, "nems.xforms.split_by_occurrence_counts"),
    (Operation::AverageAwayStimOccurrences, "nems.xforms.average_away_stim_occurrences"),
    (Operation::MakeStateSignal, "nems.xforms.make_state_signal"),
    (Operation::PreprocMakeStateSignal, "nems.preprocessing.make_state_signal"),
    (Operation::InitFromKeywords, "nems.xforms.init_from_keywords"),
    (Operation::FitBasicInit, "nems.xforms.fit_basic_init"),
    (Operation::FitBasic, "nems.xforms.fit_basic"),
    (Operation::SplitForJackknife, "nems.xforms.split_for_jackknife"),
    (
        Operation::GeneratePsthNfold,
        "nems.xforms.generate_psth_from_est_for_both_est_and_val_nfold",
    ),
    (Operation::FitNfold, "nems.xforms.fit_nfold"),
    (Operation::FitIteratively, "nems.xforms.fit_iteratively"),
    (Operation::Predict, "nems.xforms.predict"),
    (Operation::StandardCorrelation, "nems.analysis.api.standard_correlation"),
    (Operation::PlotSummary, "nems.xforms.plot_summary"),
];

impl Operation {
    /// Dotted identifier as written in an xfspec.
    pub fn identifier(&self) -> &str {
        if let Operation::Other(id) = self {
            return id;
        }
        KNOWN_OPERATIONS
            .iter()
            .find(|(op, _)| op == self)
            .map(|(_, id)| *id)
            .unwrap_or_default()
    }

    /// Steps that estimate parameters, including `nems.xforms.fit_*` variants
    /// outside the known table.
    pub fn is_fit(&self) -> bool {
        match self {
            Operation::FitBasicInit | Operation::FitBasic | Operation::FitNfold | Operation::FitIteratively => true,
            Operation::Other(id) => id.starts_with(XFORMS_FIT_PREFIX),
            _ => false,
        }
    }

    /// Steps that must not run again when re-evaluating a reloaded model:
    /// anything that would replace the saved modelspecs.
    pub fn skip_on_reload(&self) -> bool {
        self.is_fit() || matches!(self, Operation::InitFromKeywords)
    }
}

impl From<String> for Operation {
    fn from(value: String) -> Self {
        KNOWN_OPERATIONS
            .iter()
            .find(|(_, id)| *id == value)
            .map(|(op, _)| op.clone())
            .unwrap_or(Operation::Other(value))
    }
}

impl From<Operation> for String {
    fn from(value: Operation) -> Self {
        match value {
            Operation::Other(id) => id,
            known => known.identifier().to_string(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// One pipeline step: an operation, its keyword arguments, and optionally the
/// context keys it reads and writes.
///
/// On the wire a step is a JSON list, `[op, args]` or
/// `[op, args, inputs, outputs]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StepRepr", into = "StepRepr")]
pub struct Step {
    pub op: Operation,
    pub args: StepArgs,
    pub inputs: Option<Vec<String>>,
    pub outputs: Option<Vec<String>>,
}

impl Step {
    pub fn new(op: Operation) -> Self {
        Self {
            op,
            args: StepArgs::new(),
            inputs: None,
            outputs: None,
        }
    }

    pub fn arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.args.insert(key.to_string(), value.into());
        self
    }

    /// Declare the context keys this step consumes and produces.
    pub fn io(mut self, inputs: &[&str], outputs: &[&str]) -> Self {
        self.inputs = Some(inputs.iter().map(|k| k.to_string()).collect());
        self.outputs = Some(outputs.iter().map(|k| k.to_string()).collect());
        self
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StepRepr {
    Short(Operation, StepArgs),
    Full(Operation, StepArgs, Vec<String>, Vec<String>),
}

impl From<StepRepr> for Step {
    fn from(value: StepRepr) -> Self {
        match value {
            StepRepr::Short(op, args) => Step {
                op,
                args,
                inputs: None,
                outputs: None,
            },
            StepRepr::Full(op, args, inputs, outputs) => Step {
                op,
                args,
                inputs: Some(inputs),
                outputs: Some(outputs),
            },
        }
    }
}

impl From<Step> for StepRepr {
    fn from(value: Step) -> Self {
        match (value.inputs, value.outputs) {
            (None, None) => StepRepr::Short(value.op, value.args),
            (inputs, outputs) => StepRepr::Full(
                value.op,
                value.args,
                inputs.unwrap_or_default(),
                outputs.unwrap_or_default(),
            ),
        }
    }
}

/// State signals a loader can expose (or permute as a null control).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateSignal {
    Pupil,
    BehaviorState,
    Active,
}

impl StateSignal {
    pub fn name(self) -> &'static str {
        match self {
            StateSignal::Pupil => "pupil",
            StateSignal::BehaviorState => "behavior_state",
            StateSignal::Active => "active",
        }
    }
}

/// Stimulus representation requested from the recording source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StimFormat {
    Ozgf,
    Parm,
    Envelope,
}

/// Acquisition parameters attached to a loader code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderOptions {
    pub rasterfs: u32,
    pub includeprestim: bool,
    pub stimfmt: StimFormat,
    pub chancount: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pupil: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stim: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pupil_deblink: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pupil_median: Option<u32>,
    pub average_stim: bool,
    pub state_vars: Vec<StateSignal>,
}

/// Where the first loader step gets its recording from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingSource {
    /// A recording URI or path, passed through unchanged.
    Uri(String),
    /// A recording built by an external load command from a data file.
    External {
        load_command: String,
        exptid: String,
        datafile: String,
    },
}

impl RecordingSource {
    /// Short label for logs and metadata.
    pub fn label(&self) -> &str {
        match self {
            RecordingSource::Uri(uri) => uri,
            RecordingSource::External { exptid, .. } => exptid,
        }
    }
}

/// Metadata handed to modelspec initialization and recorded with saved fits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cellid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<u32>,
    pub modelname: String,
    pub loader: String,
    pub fitter: String,
    pub modelspecname: String,
    pub recording: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub githash: Option<String>,
}

impl FitMeta {
    pub fn for_model(model: &ModelName, recording: &RecordingSource) -> Self {
        Self {
            modelname: model.full.clone(),
            loader: model.loader.clone(),
            fitter: model.fitter.clone(),
            modelspecname: model.modelspecname.clone(),
            recording: recording.label().to_string(),
            ..Self::default()
        }
    }
}

/// A full fit request as understood by the pipeline.
///
/// This is derived from CLI flags plus settings.
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub recording: RecordingSource,
    pub model_name: String,
    pub auto_plot: bool,
    pub save_results: bool,
    pub cellid: Option<String>,
    pub batch: Option<u32>,
    pub githash: Option<String>,
    pub results_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn model_name_splits_first_middle_last() {
        let name: ModelName = "loaderX_a_b_c_fitterY".parse().unwrap();
        assert_eq!(name.loader, "loaderX");
        assert_eq!(name.modelspecname, "a_b_c");
        assert_eq!(name.fitter, "fitterY");
    }

    #[test]
    fn model_name_allows_empty_architecture() {
        let name: ModelName = "env100_fit01".parse().unwrap();
        assert_eq!(name.loader, "env100");
        assert_eq!(name.modelspecname, "");
        assert_eq!(name.fitter, "fit01");
    }

    #[test]
    fn model_name_without_underscore_is_rejected() {
        let err = "ozgf100ch18".parse::<ModelName>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidModelName);
    }

    #[test]
    fn step_wire_form_matches_list_layout() {
        let short = Step::new(Operation::Predict);
        assert_eq!(serde_json::to_value(&short).unwrap(), json!(["nems.xforms.predict", {}]));

        let full = Step::new(Operation::StandardCorrelation).io(&["est", "val", "modelspecs"], &["modelspecs"]);
        assert_eq!(
            serde_json::to_value(&full).unwrap(),
            json!([
                "nems.analysis.api.standard_correlation",
                {},
                ["est", "val", "modelspecs"],
                ["modelspecs"]
            ])
        );
    }

    #[test]
    fn step_parses_both_list_lengths_and_unknown_ops() {
        let steps: Xfspec = serde_json::from_value(json!([
            ["nems.xforms.fit_basic", {"maxiter": 1000}],
            ["nems.preprocessing.make_state_signal", {}, ["rec"], ["rec"]],
            ["nems.xforms.fit_basic_shrink", {}]
        ]))
        .unwrap();

        assert_eq!(steps[0].op, Operation::FitBasic);
        assert_eq!(steps[0].args["maxiter"], json!(1000));
        assert!(steps[0].inputs.is_none());
        assert_eq!(steps[1].op, Operation::PreprocMakeStateSignal);
        assert_eq!(steps[1].outputs.as_deref(), Some(&["rec".to_string()][..]));
        assert_eq!(steps[2].op, Operation::Other("nems.xforms.fit_basic_shrink".to_string()));
        assert_eq!(steps[2].op.identifier(), "nems.xforms.fit_basic_shrink");
    }

    #[test]
    fn reload_skips_init_and_fit_only() {
        assert!(Operation::InitFromKeywords.skip_on_reload());
        assert!(Operation::FitNfold.skip_on_reload());
        assert!(!Operation::Predict.skip_on_reload());
        assert!(!Operation::SplitForJackknife.skip_on_reload());
    }

    #[test]
    fn unlisted_xforms_fit_ops_count_as_fits() {
        let shrink = Operation::from("nems.xforms.fit_basic_shrink".to_string());
        assert_eq!(shrink, Operation::Other("nems.xforms.fit_basic_shrink".to_string()));
        assert!(shrink.is_fit());
        assert!(shrink.skip_on_reload());

        assert!(!Operation::from("nems.xforms.fitness_report".to_string()).is_fit());
        assert!(!Operation::from("mylab.fit_custom".to_string()).skip_on_reload());
    }
}
