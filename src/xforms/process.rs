//! Evaluator backed by an external program.
//!
//! Protocol (one request per process):
//!
//! - stdin: `{"xfspec": [...steps...], "context": {...}}`
//! - stdout: `{"context": {...}, "log": ["...", ...]}`
//! - a non-zero exit status is a failed evaluation; stderr becomes the message
//!
//! There is no timeout: a hung evaluator blocks the caller.

use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use serde::Serialize;

use crate::domain::Step;
use crate::error::{AppError, ErrorKind};
use crate::xforms::{Context, Evaluation, Evaluator};

#[derive(Serialize)]
struct Request<'a> {
    xfspec: &'a [Step],
    context: &'a Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEvaluator {
    program: String,
    args: Vec<String>,
}

impl ProcessEvaluator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Build from a command line such as `python -m nems_evaluate`.
    ///
    /// Arguments are split on whitespace; quoting is not interpreted.
    pub fn from_command_line(command: &str) -> Result<Self, AppError> {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            AppError::new(ErrorKind::InvalidRequest, "Evaluator command is empty (set NEMS_EVALUATOR).")
        })?;
        Ok(Self::new(program).with_args(parts))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Evaluator for ProcessEvaluator {
    fn evaluate(&mut self, xfspec: &[Step], context: Context) -> Result<Evaluation, AppError> {
        let request = serde_json::to_vec(&Request {
            xfspec,
            context: &context,
        })
        .map_err(|e| AppError::new(ErrorKind::Serialization, format!("Failed to encode evaluator request: {e}")))?;

        log::info!("Handing {} step(s) to evaluator '{}'", xfspec.len(), self.program);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AppError::evaluation(format!("Failed to start evaluator '{}': {e}", self.program)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::evaluation("Evaluator stdin is not available."))?;
        // Feed stdin from a separate thread so a chatty child cannot fill its
        // stdout pipe while we are still writing.
        let writer = thread::spawn(move || stdin.write_all(&request));

        let output = child
            .wait_with_output()
            .map_err(|e| AppError::evaluation(format!("Failed to wait for evaluator: {e}")))?;
        let write_result = writer
            .join()
            .map_err(|_| AppError::evaluation("Evaluator stdin writer panicked."))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::evaluation(format!(
                "Evaluator '{}' failed ({}): {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        write_result.map_err(|e| AppError::evaluation(format!("Failed to send pipeline to evaluator: {e}")))?;

        serde_json::from_slice(&output.stdout)
            .map_err(|e| AppError::new(ErrorKind::Serialization, format!("Invalid evaluator response: {e}")))
    }
}
