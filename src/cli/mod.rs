//! Command-line parsing for the `xf` pipeline tool.
//!
//! The goal of this module is to keep **argument parsing** separate from
//! pipeline assembly and evaluation.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "xf", version, about = "Assemble and run model-fitting pipelines from model names")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List every loader and fitter code.
    Codes,
    /// Assemble a pipeline and print it as JSON without running it.
    Xfspec(XfspecArgs),
    /// Assemble a pipeline, run it with the configured evaluator, optionally save.
    Fit(FitArgs),
    /// Reload a saved fit.
    Load(LoadArgs),
}

/// Where the recording comes from.
#[derive(Debug, Args, Clone)]
pub struct RecordingArgs {
    /// Recording URI or path. Bare file names resolve under NEMS_RECORDINGS_DIR.
    #[arg(value_name = "RECORDING")]
    pub recording: String,

    /// Build the recording with an external load command instead; RECORDING is
    /// then the data file handed to it.
    #[arg(long, value_name = "COMMAND", requires = "exptid")]
    pub load_command: Option<String>,

    /// Experiment id passed to `--load-command`.
    #[arg(long)]
    pub exptid: Option<String>,
}

/// Common options for assembling a pipeline.
#[derive(Debug, Args, Clone)]
pub struct XfspecArgs {
    #[command(flatten)]
    pub recording: RecordingArgs,

    /// Model name: `<loader>_<modelspec keywords>_<fitter>`.
    #[arg(value_name = "MODELNAME")]
    pub modelname: String,

    /// Do not append the summary plot step.
    #[arg(long)]
    pub no_plot: bool,

    /// Write the pipeline JSON to a file instead of stdout.
    #[arg(long, value_name = "JSON")]
    pub out: Option<PathBuf>,

    /// Print a readable step listing instead of JSON.
    #[arg(long, conflicts_with = "out")]
    pub list: bool,
}

/// Options for fitting.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub recording: RecordingArgs,

    /// Model name: `<loader>_<modelspec keywords>_<fitter>`.
    #[arg(value_name = "MODELNAME")]
    pub modelname: String,

    /// Do not append the summary plot step.
    #[arg(long)]
    pub no_plot: bool,

    /// Save the analysis and update the results table.
    #[arg(long, requires_all = ["cellid", "batch"])]
    pub save: bool,

    /// Cell id recorded with the fit.
    #[arg(long)]
    pub cellid: Option<String>,

    /// Batch id recorded with the fit.
    #[arg(long)]
    pub batch: Option<u32>,

    /// Results directory (overrides NEMS_RESULTS_DIR).
    #[arg(long, value_name = "DIR")]
    pub results_dir: Option<PathBuf>,
}

/// Options for reloading a saved fit.
#[derive(Debug, Args, Clone)]
pub struct LoadArgs {
    #[arg(long)]
    pub cellid: String,

    #[arg(long, default_value_t = 271)]
    pub batch: u32,

    #[arg(long)]
    pub modelname: String,

    /// Return the saved modelspecs without re-evaluating the pipeline.
    #[arg(long)]
    pub no_eval: bool,

    /// Results directory (overrides NEMS_RESULTS_DIR).
    #[arg(long, value_name = "DIR")]
    pub results_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_save_requires_cell_and_batch() {
        let err = Cli::try_parse_from(["xf", "fit", "rec.tgz", "env100_fir15x1_fit01", "--save"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from([
            "xf",
            "fit",
            "rec.tgz",
            "env100_fir15x1_fit01",
            "--save",
            "--cellid",
            "TAR010c-18-1",
            "--batch",
            "271",
        ])
        .unwrap();
        match cli.command {
            Command::Fit(args) => {
                assert!(args.save);
                assert_eq!(args.batch, Some(271));
                assert_eq!(args.recording.recording, "rec.tgz");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn load_defaults_to_batch_271() {
        let cli = Cli::try_parse_from(["xf", "load", "--cellid", "TAR010c-18-1", "--modelname", "m_fit01"]).unwrap();
        match cli.command {
            Command::Load(args) => {
                assert_eq!(args.batch, 271);
                assert!(!args.no_eval);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
