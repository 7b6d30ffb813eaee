//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads settings from the environment
//! - assembles pipelines from model names
//! - hands them to the configured evaluator
//! - saves and reloads fits

use std::path::PathBuf;

use clap::Parser;

use crate::cli::{Command, FitArgs, LoadArgs, RecordingArgs, XfspecArgs};
use crate::domain::{FitConfig, FitMeta, ModelName, RecordingSource};
use crate::error::{AppError, ErrorKind};
use crate::io::{JsonResultsStore, write_xfspec_json};
use crate::registry::Registry;
use crate::settings::Settings;
use crate::xforms::{Evaluator, ProcessEvaluator};

pub mod pipeline;

/// Entry point for the `xf` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Command::Codes => {
            print!("{}", crate::report::format_codes(Registry::global()));
            Ok(())
        }
        Command::Xfspec(args) => handle_xfspec(args, &settings),
        Command::Fit(args) => handle_fit(args, &settings),
        Command::Load(args) => handle_load(args, &settings),
    }
}

fn handle_xfspec(args: XfspecArgs, settings: &Settings) -> Result<(), AppError> {
    let model: ModelName = args.modelname.parse()?;
    let source = recording_source(&args.recording, settings);
    let meta = FitMeta::for_model(&model, &source);
    let xfspec = pipeline::assemble(Registry::global(), &source, &model, &meta, !args.no_plot)?;

    if args.list {
        print!("{}", crate::report::format_pipeline(&xfspec));
        return Ok(());
    }

    match &args.out {
        Some(path) => {
            write_xfspec_json(path, &xfspec)?;
            log::info!("Wrote {} step(s) to {}", xfspec.len(), path.display());
        }
        None => {
            let text = serde_json::to_string_pretty(&xfspec)
                .map_err(|e| AppError::new(ErrorKind::Serialization, format!("Failed to encode xfspec: {e}")))?;
            println!("{text}");
        }
    }
    Ok(())
}

fn handle_fit(args: FitArgs, settings: &Settings) -> Result<(), AppError> {
    let config = fit_config_from_args(&args, settings);
    let mut evaluator = evaluator_from_settings(settings)?;
    let mut store = JsonResultsStore::in_dir(&config.results_dir);

    let output = pipeline::fit(&config, &mut evaluator, &mut store)?;
    print!("{}", crate::report::format_fit_summary(&output));
    Ok(())
}

fn handle_load(args: LoadArgs, settings: &Settings) -> Result<(), AppError> {
    let results_dir = results_dir(args.results_dir.as_ref(), settings);
    let store = JsonResultsStore::in_dir(&results_dir);

    let context = if args.no_eval {
        pipeline::load_fitted(&args.cellid, args.batch, &args.modelname, &store, None)?
    } else {
        let mut evaluator = evaluator_from_settings(settings)?;
        let evaluator: &mut dyn Evaluator = &mut evaluator;
        pipeline::load_fitted(&args.cellid, args.batch, &args.modelname, &store, Some(evaluator))?
    };

    print!("{}", crate::report::format_context_summary(&context));
    Ok(())
}

pub fn fit_config_from_args(args: &FitArgs, settings: &Settings) -> FitConfig {
    FitConfig {
        recording: recording_source(&args.recording, settings),
        model_name: args.modelname.clone(),
        auto_plot: !args.no_plot,
        save_results: args.save,
        cellid: args.cellid.clone(),
        batch: args.batch,
        githash: settings.githash.clone(),
        results_dir: results_dir(args.results_dir.as_ref(), settings),
    }
}

fn recording_source(args: &RecordingArgs, settings: &Settings) -> RecordingSource {
    match (&args.load_command, &args.exptid) {
        (Some(load_command), Some(exptid)) => RecordingSource::External {
            load_command: load_command.clone(),
            exptid: exptid.clone(),
            datafile: settings.resolve_recording(&args.recording),
        },
        _ => RecordingSource::Uri(settings.resolve_recording(&args.recording)),
    }
}

fn results_dir(flag: Option<&PathBuf>, settings: &Settings) -> PathBuf {
    flag.cloned().unwrap_or_else(|| settings.results_dir.clone())
}

fn evaluator_from_settings(settings: &Settings) -> Result<ProcessEvaluator, AppError> {
    let command = settings.evaluator.as_deref().ok_or_else(|| {
        AppError::new(
            ErrorKind::InvalidRequest,
            "Missing NEMS_EVALUATOR in environment (.env); it names the program that runs pipelines.",
        )
    })?;
    ProcessEvaluator::from_command_line(command)
}
