//! Shared pipeline logic used by every command.
//!
//! Assembly turns a model name into one ordered step list:
//! loader steps -> modelspec init -> fitter steps -> scoring -> (plot)
//!
//! Orchestration hands that list to an evaluator and optionally persists the
//! result; reload finds a persisted fit and rebuilds its context.

use std::path::Path;

use chrono::{Local, Utc};
use serde_json::{Map, Value};

use crate::domain::{FitConfig, FitMeta, ModelName, Operation, RecordingSource, Step, Xfspec};
use crate::error::{AppError, ErrorKind};
use crate::io::{ResultsRow, ResultsStore, analysis_destination, figure_file, load_analysis, save_analysis};
use crate::registry::Registry;
use crate::xforms::{Context, Evaluation, Evaluator, IS_RELOAD, MODELSPECS, XFSPEC, modelspec_meta};

/// Context keys read by the scoring step.
pub const SCORE_INPUTS: [&str; 3] = ["est", "val", "modelspecs"];

/// Assemble the pipeline for `model_name` against a recording URI.
///
/// `save_results` does not add steps: persistence is done by [`fit`] after the
/// pipeline has run. The only failure modes are a malformed model name and
/// `UnknownConfiguration` from the registry; nothing is read or written.
pub fn build_pipeline(
    recording_uri: &str,
    model_name: &str,
    auto_plot: bool,
    save_results: bool,
) -> Result<Xfspec, AppError> {
    let model: ModelName = model_name.parse()?;
    let source = RecordingSource::Uri(recording_uri.to_string());
    let meta = FitMeta::for_model(&model, &source);
    log::debug!("assembling {model} (auto_plot={auto_plot}, save_results={save_results})");
    assemble(Registry::global(), &source, &model, &meta, auto_plot)
}

/// Assemble a pipeline from already-parsed parts.
pub fn assemble(
    registry: &Registry,
    source: &RecordingSource,
    model: &ModelName,
    meta: &FitMeta,
    auto_plot: bool,
) -> Result<Xfspec, AppError> {
    log::info!(
        "Initializing modelspec(s) for recording/model {}/{}...",
        source.label(),
        model
    );

    let mut xfspec = registry.resolve_loader(&model.loader, source)?;
    let fitter_steps = registry.resolve_fitter(&model.fitter)?;

    let meta = serde_json::to_value(meta)
        .map_err(|e| AppError::new(ErrorKind::Serialization, format!("Failed to encode fit metadata: {e}")))?;
    xfspec.push(
        Step::new(Operation::InitFromKeywords)
            .arg("keywordstring", model.modelspecname.as_str())
            .arg("meta", meta),
    );

    xfspec.extend(fitter_steps);

    xfspec.push(Step::new(Operation::StandardCorrelation).io(&SCORE_INPUTS, &[MODELSPECS]));

    if auto_plot {
        log::info!("Generating summary plot...");
        xfspec.push(Step::new(Operation::PlotSummary));
    }

    Ok(xfspec)
}

/// All outputs of a single fit.
#[derive(Debug, Clone)]
pub struct FitOutput {
    pub model: ModelName,
    pub xfspec: Xfspec,
    pub context: Context,
    pub log: Vec<String>,
    /// The results row written, when saving was requested.
    pub saved: Option<ResultsRow>,
}

/// Assemble, evaluate, and (if requested) persist one fit.
///
/// Errors from the evaluator and the store are returned unchanged.
pub fn fit(
    config: &FitConfig,
    evaluator: &mut dyn Evaluator,
    store: &mut dyn ResultsStore,
) -> Result<FitOutput, AppError> {
    let model: ModelName = config.model_name.parse()?;

    let save_key = if config.save_results {
        match (&config.cellid, config.batch) {
            (Some(cellid), Some(batch)) => Some((cellid.clone(), batch)),
            _ => {
                return Err(AppError::new(
                    ErrorKind::InvalidRequest,
                    "Saving results requires both a cell id and a batch.",
                ));
            }
        }
    } else {
        None
    };

    let meta = FitMeta {
        cellid: config.cellid.clone(),
        batch: config.batch,
        githash: config.githash.clone(),
        ..FitMeta::for_model(&model, &config.recording)
    };
    let xfspec = assemble(Registry::global(), &config.recording, &model, &meta, config.auto_plot)?;

    let Evaluation { mut context, log } = evaluator.evaluate(&xfspec, Context::new())?;

    let saved = match save_key {
        Some((cellid, batch)) => {
            let destination = analysis_destination(&config.results_dir, batch, &cellid, &model.full, &Local::now());
            let row = save_fit(
                &destination,
                &xfspec,
                &mut context,
                &log,
                FitKey {
                    batch,
                    cellid,
                    modelname: model.full.clone(),
                    githash: config.githash.clone(),
                },
            )?;
            store.update_results(row.clone())?;
            Some(row)
        }
        None => None,
    };

    Ok(FitOutput {
        model,
        xfspec,
        context,
        log,
        saved,
    })
}

struct FitKey {
    batch: u32,
    cellid: String,
    modelname: String,
    githash: Option<String>,
}

/// Record where the fit lives on its first modelspec, write the analysis
/// directory, and build the results row.
fn save_fit(
    destination: &Path,
    xfspec: &[Step],
    context: &mut Context,
    log: &[String],
    key: FitKey,
) -> Result<ResultsRow, AppError> {
    let figurefile = figure_file(destination);

    let modelspecs = context
        .modelspecs_mut()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AppError::evaluation("Evaluation produced no modelspecs to save."))?;
    let meta = ensure_meta(&mut modelspecs[0])?;
    meta.insert("modelpath".to_string(), path_value(destination));
    meta.insert("figurefile".to_string(), path_value(&figurefile));

    log::info!("Saving modelspec(s) to {} ...", destination.display());
    save_analysis(destination, xfspec, modelspecs, log)?;

    let meta = modelspec_meta(&modelspecs[0]);
    Ok(ResultsRow {
        batch: key.batch,
        cellid: key.cellid,
        modelname: key.modelname,
        modelpath: destination.to_path_buf(),
        figurefile,
        r_test: meta.and_then(|m| score(m, "r_test")),
        r_fit: meta.and_then(|m| score(m, "r_fit")),
        githash: key.githash,
        lastmod: Utc::now(),
    })
}

fn path_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}

/// The `meta` object of a modelspec's first module, created if absent.
fn ensure_meta(modelspec: &mut Value) -> Result<&mut Map<String, Value>, AppError> {
    let first = modelspec
        .get_mut(0)
        .and_then(Value::as_object_mut)
        .ok_or_else(|| AppError::evaluation("Modelspec has no modules to attach metadata to."))?;
    first
        .entry("meta")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| AppError::evaluation("Modelspec meta is not an object."))
}

/// A score stored either as a number or as a one-per-modelspec list.
fn score(meta: &Map<String, Value>, key: &str) -> Option<f64> {
    match meta.get(key)? {
        Value::Array(values) => values.first().and_then(Value::as_f64),
        value => value.as_f64(),
    }
}

/// Reload a persisted fit by exact (batch, modelname, cellid) match.
///
/// With an evaluator, the saved pipeline is re-run against fresh data with the
/// saved modelspecs in place; modelspec initialization and fitting are skipped.
/// Without one, the context holds only the saved modelspecs and pipeline.
pub fn load_fitted(
    cellid: &str,
    batch: u32,
    modelname: &str,
    store: &dyn ResultsStore,
    evaluator: Option<&mut dyn Evaluator>,
) -> Result<Context, AppError> {
    let row = store.get_results_file(batch, modelname, cellid)?;
    load_from_path(&row.modelpath, evaluator)
}

/// Reload a saved analysis directory directly.
pub fn load_from_path(path: &Path, evaluator: Option<&mut dyn Evaluator>) -> Result<Context, AppError> {
    log::info!("Loading from {}", path.display());
    let analysis = load_analysis(path)?;

    let mut context = Context::new();
    context.insert(MODELSPECS, Value::Array(analysis.modelspecs));

    let mut context = match evaluator {
        Some(evaluator) => {
            context.insert(IS_RELOAD, Value::Bool(true));
            let steps: Xfspec = analysis
                .xfspec
                .iter()
                .filter(|s| !s.op.skip_on_reload())
                .cloned()
                .collect();
            evaluator.evaluate(&steps, context)?.context
        }
        None => context,
    };

    let xfspec = serde_json::to_value(&analysis.xfspec)
        .map_err(|e| AppError::new(ErrorKind::Serialization, format!("Failed to encode xfspec: {e}")))?;
    context.insert(XFSPEC, xfspec);
    Ok(context)
}
