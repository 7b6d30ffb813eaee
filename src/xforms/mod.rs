//! Pipeline execution.
//!
//! An [`Evaluator`] takes an ordered step list and a starting [`Context`] and
//! runs the steps in order, threading each step's outputs into the context for
//! the steps after it. This crate ships two evaluators:
//!
//! - [`StepEvaluator`]: in-process dispatch to registered step handlers
//! - [`ProcessEvaluator`]: hands the whole pipeline to an external program

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Step;
use crate::error::AppError;

pub mod evaluator;
pub mod process;

pub use evaluator::{StepEvaluator, StepHandler};
pub use process::ProcessEvaluator;

/// Context key holding the fitted model collection.
pub const MODELSPECS: &str = "modelspecs";
/// Context key set when a saved model is being re-evaluated.
pub const IS_RELOAD: &str = "IsReload";
/// Context key holding the pipeline a reloaded context came from.
pub const XFSPEC: &str = "xfspec";

/// Mutable key/value mapping threaded through step execution.
///
/// Values are opaque to this crate apart from `modelspecs`, which is a list of
/// modelspecs, each a list of module descriptors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(BTreeMap<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge `updates` into this context; keys in `updates` win.
    pub fn merge(&mut self, updates: Context) {
        self.0.extend(updates.0);
    }

    /// Take a single key out of the context.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn modelspecs(&self) -> Option<&Vec<Value>> {
        self.get(MODELSPECS).and_then(Value::as_array)
    }

    pub fn modelspecs_mut(&mut self) -> Option<&mut Vec<Value>> {
        self.0.get_mut(MODELSPECS).and_then(Value::as_array_mut)
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Result of running a pipeline: the final context plus the evaluation log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub context: Context,
    #[serde(default)]
    pub log: Vec<String>,
}

/// Runs an ordered step list against a context.
///
/// Implementations own the meaning of each operation. Errors propagate to the
/// caller as-is; there is no retry and no partial result.
pub trait Evaluator {
    fn evaluate(&mut self, xfspec: &[Step], context: Context) -> Result<Evaluation, AppError>;
}

/// The `meta` mapping of a modelspec (stored on its first module).
pub fn modelspec_meta(modelspec: &Value) -> Option<&serde_json::Map<String, Value>> {
    modelspec.get(0)?.get("meta")?.as_object()
}
