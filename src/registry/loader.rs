//! Loader table: recording acquisition options and the steps that load and
//! shape a recording.

use serde::Serialize;

use crate::domain::{LoaderOptions, Operation, RecordingSource, StateSignal, Step, StimFormat, Xfspec};

use StateSignal::{Active, BehaviorState, Pupil};

/// Epochs whose repeated occurrences are split on / averaged away.
pub const STIM_EPOCH_REGEX: &str = "^STIM_";

/// Name given to the state signal built by the state loaders.
pub const STATE_SIGNAL_NAME: &str = "state";

/// Null-control variants of the 10 Hz no-stimulus loader.
///
/// A trailing `0` after a signal name means that signal is permuted across
/// trials. The list is exhaustive; codes are never parsed.
const NOSTIM10_CONTROLS: [(&str, &[StateSignal]); 4] = [
    ("nostim10pup0beh0", &[Pupil, BehaviorState]),
    ("nostim10pup0beh", &[Pupil]),
    ("nostim10pupbeh0", &[BehaviorState]),
    ("nostim10pupbeh", &[]),
];

/// Null-control variants of the 20 Hz no-stimulus loader. Behavior is the
/// `active` signal here.
const NOSTIM20_CONTROLS: [(&str, &[StateSignal]); 4] = [
    ("nostim20pup0beh0", &[Pupil, Active]),
    ("nostim20pup0beh", &[Pupil]),
    ("nostim20pupbeh0", &[Active]),
    ("nostim20pupbeh", &[]),
];

/// What happens to the recording after it is loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoaderShape {
    /// Split est/val by occurrence count, then average repeated stimuli.
    AverageStim,
    /// Build a `state` signal from the listed signals, permuting some of them.
    StateSignal {
        op: Operation,
        state_signals: Vec<StateSignal>,
        permute_signals: Vec<StateSignal>,
        /// Call with explicit `rec` in/out context keys.
        rec_io: bool,
    },
}

/// One row of the loader table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoaderConfig {
    pub code: &'static str,
    pub options: LoaderOptions,
    pub shape: LoaderShape,
}

impl LoaderConfig {
    /// Ordered steps for this loader. The first step always loads the recording.
    pub fn steps(&self, source: &RecordingSource) -> Xfspec {
        let mut xfspec = vec![load_step(source)];

        match &self.shape {
            LoaderShape::AverageStim => {
                xfspec.push(Step::new(Operation::SplitByOccurrenceCounts).arg("epoch_regex", STIM_EPOCH_REGEX));
                xfspec.push(Step::new(Operation::AverageAwayStimOccurrences));
            }
            LoaderShape::StateSignal {
                op,
                state_signals,
                permute_signals,
                rec_io,
            } => {
                let mut step = Step::new(op.clone())
                    .arg("state_signals", signal_names(state_signals))
                    .arg("permute_signals", signal_names(permute_signals))
                    .arg("new_signalname", STATE_SIGNAL_NAME);
                if *rec_io {
                    step = step.io(&["rec"], &["rec"]);
                }
                xfspec.push(step);
            }
        }

        xfspec
    }

    /// Signals this loader permutes as a null control (empty for all other loaders).
    pub fn permute_signals(&self) -> &[StateSignal] {
        match &self.shape {
            LoaderShape::StateSignal { permute_signals, .. } => permute_signals,
            LoaderShape::AverageStim => &[],
        }
    }
}

fn load_step(source: &RecordingSource) -> Step {
    match source {
        RecordingSource::Uri(uri) => {
            Step::new(Operation::LoadRecordings).arg("recording_uri_list", vec![uri.clone()])
        }
        RecordingSource::External {
            load_command,
            exptid,
            datafile,
        } => Step::new(Operation::LoadRecordingWrapper)
            .arg("load_command", load_command.as_str())
            .arg("exptid", exptid.as_str())
            .arg("datafile", datafile.as_str()),
    }
}

fn signal_names(signals: &[StateSignal]) -> Vec<&'static str> {
    signals.iter().map(|s| s.name()).collect()
}

/// Options for the stimulus-driven loaders: averaged, no state variables.
fn stim_options(stimfmt: StimFormat, chancount: u32) -> LoaderOptions {
    LoaderOptions {
        rasterfs: 100,
        includeprestim: true,
        stimfmt,
        chancount,
        pupil: None,
        stim: None,
        pupil_deblink: None,
        pupil_median: None,
        average_stim: true,
        state_vars: Vec::new(),
    }
}

/// Options for the pupil-aware loaders.
fn pupil_options(rasterfs: u32, stimfmt: StimFormat, chancount: u32, stim: bool) -> LoaderOptions {
    LoaderOptions {
        rasterfs,
        includeprestim: true,
        stimfmt,
        chancount,
        pupil: Some(true),
        stim: Some(stim),
        pupil_deblink: Some(true),
        pupil_median: Some(1),
        average_stim: false,
        state_vars: vec![Pupil],
    }
}

/// The full loader table, in listing order.
pub fn standard_loaders() -> Vec<LoaderConfig> {
    let mut out = vec![
        LoaderConfig {
            code: "ozgf100ch18",
            options: stim_options(StimFormat::Ozgf, 18),
            shape: LoaderShape::AverageStim,
        },
        LoaderConfig {
            code: "ozgf100ch18pup",
            options: pupil_options(100, StimFormat::Ozgf, 18, true),
            shape: LoaderShape::StateSignal {
                op: Operation::MakeStateSignal,
                state_signals: vec![Pupil],
                permute_signals: Vec::new(),
                rec_io: false,
            },
        },
        LoaderConfig {
            code: "nostim10pup",
            options: pupil_options(10, StimFormat::Parm, 0, false),
            shape: LoaderShape::StateSignal {
                op: Operation::PreprocMakeStateSignal,
                state_signals: vec![Pupil],
                permute_signals: Vec::new(),
                rec_io: true,
            },
        },
    ];

    for (code, permute) in NOSTIM10_CONTROLS {
        out.push(LoaderConfig {
            code,
            options: pupil_options(10, StimFormat::Parm, 0, false),
            shape: LoaderShape::StateSignal {
                op: Operation::MakeStateSignal,
                state_signals: vec![Pupil, BehaviorState],
                permute_signals: permute.to_vec(),
                rec_io: false,
            },
        });
    }

    for (code, permute) in NOSTIM20_CONTROLS {
        out.push(LoaderConfig {
            code,
            options: pupil_options(20, StimFormat::Parm, 0, false),
            shape: LoaderShape::StateSignal {
                op: Operation::PreprocMakeStateSignal,
                state_signals: vec![Pupil, Active],
                permute_signals: permute.to_vec(),
                rec_io: true,
            },
        });
    }

    out.push(LoaderConfig {
        code: "env100",
        options: stim_options(StimFormat::Envelope, 0),
        shape: LoaderShape::AverageStim,
    });

    out
}
