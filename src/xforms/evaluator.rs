//! In-process step evaluator.
//!
//! Each operation is bound to a [`StepHandler`]. A step is evaluated as:
//!
//! 1. Inputs: if the step declares input keys, the handler sees only those
//!    (each must be present); otherwise it sees the whole context.
//! 2. The handler returns a set of updates.
//! 3. Outputs: if the step declares output keys, only those are taken from the
//!    updates (each must be present); otherwise all updates are taken.
//! 4. The taken updates are merged into the context, replacing existing keys.

use std::collections::HashMap;

use crate::domain::{Operation, Step, StepArgs};
use crate::error::AppError;
use crate::xforms::{Context, Evaluation, Evaluator};

/// Implementation of one operation.
pub trait StepHandler {
    fn call(&self, args: &StepArgs, context: &Context) -> Result<Context, AppError>;
}

impl<F> StepHandler for F
where
    F: Fn(&StepArgs, &Context) -> Result<Context, AppError>,
{
    fn call(&self, args: &StepArgs, context: &Context) -> Result<Context, AppError> {
        self(args, context)
    }
}

/// Dispatch table from operation to handler.
#[derive(Default)]
pub struct StepEvaluator {
    handlers: HashMap<Operation, Box<dyn StepHandler>>,
}

impl StepEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a closure to `op`, replacing any previous binding.
    pub fn register<F>(self, op: Operation, handler: F) -> Self
    where
        F: Fn(&StepArgs, &Context) -> Result<Context, AppError> + 'static,
    {
        self.register_handler(op, Box::new(handler))
    }

    /// Bind a boxed handler to `op`, replacing any previous binding.
    pub fn register_handler(mut self, op: Operation, handler: Box<dyn StepHandler>) -> Self {
        self.handlers.insert(op, handler);
        self
    }

    /// Evaluate a single step against `context`, returning the merged context.
    pub fn evaluate_step(&self, step: &Step, mut context: Context) -> Result<Context, AppError> {
        let handler = self
            .handlers
            .get(&step.op)
            .ok_or_else(|| AppError::evaluation(format!("No handler registered for {}", step.op)))?;

        let updates = match &step.inputs {
            Some(keys) => {
                let mut context_in = Context::new();
                for key in keys {
                    let value = context.get(key).ok_or_else(|| {
                        AppError::evaluation(format!("{}: missing input '{key}' in context", step.op))
                    })?;
                    context_in.insert(key.clone(), value.clone());
                }
                handler.call(&step.args, &context_in)?
            }
            None => handler.call(&step.args, &context)?,
        };

        let updates = match &step.outputs {
            Some(keys) if !keys.is_empty() => {
                let mut updates = updates;
                let mut taken = Context::new();
                for key in keys {
                    let value = updates.remove(key).ok_or_else(|| {
                        AppError::evaluation(format!("{}: did not produce output '{key}'", step.op))
                    })?;
                    taken.insert(key.clone(), value);
                }
                taken
            }
            _ => updates,
        };

        context.merge(updates);
        Ok(context)
    }
}

impl Evaluator for StepEvaluator {
    fn evaluate(&mut self, xfspec: &[Step], mut context: Context) -> Result<Evaluation, AppError> {
        let mut log = Vec::with_capacity(xfspec.len());
        for step in xfspec {
            log::info!("Evaluating: {}", step.op);
            log.push(format!("Evaluating: {}", step.op));
            context = self.evaluate_step(step, context)?;
        }
        Ok(Evaluation { context, log })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::{Value, json};

    fn single(key: &str, value: Value) -> Context {
        [(key.to_string(), value)].into_iter().collect()
    }

    fn counting_evaluator() -> StepEvaluator {
        StepEvaluator::new()
            .register(Operation::LoadRecordings, |_: &StepArgs, _: &Context| Ok(single("rec", json!(0))))
            .register(Operation::PreprocMakeStateSignal, |_: &StepArgs, ctx: &Context| {
                // Sees only `rec` because the step declares it.
                assert_eq!(ctx.len(), 1);
                let rec = ctx.get("rec").and_then(Value::as_i64).unwrap_or_default();
                let mut out = single("rec", json!(rec + 1));
                out.insert("scratch", json!(true));
                Ok(out)
            })
            .register(Operation::FitBasic, |args: &StepArgs, _: &Context| {
                Ok(single("modelspecs", json!([[{"maxiter": args.get("maxiter")}]])))
            })
    }

    #[test]
    fn steps_thread_outputs_in_order() {
        let xfspec = vec![
            Step::new(Operation::LoadRecordings),
            Step::new(Operation::PreprocMakeStateSignal).io(&["rec"], &["rec"]),
            Step::new(Operation::FitBasic).arg("maxiter", 1000),
        ];
        let mut evaluator = counting_evaluator();
        let evaluation = evaluator.evaluate(&xfspec, Context::new()).unwrap();

        let ctx = evaluation.context;
        assert_eq!(ctx.get("rec"), Some(&json!(1)));
        // Undeclared outputs are dropped.
        assert!(!ctx.contains_key("scratch"));
        assert_eq!(ctx.modelspecs().unwrap()[0][0]["maxiter"], json!(1000));
        assert_eq!(evaluation.log.len(), 3);
    }

    #[test]
    fn missing_input_key_fails() {
        let xfspec = vec![Step::new(Operation::PreprocMakeStateSignal).io(&["rec"], &["rec"])];
        let err = counting_evaluator().evaluate(&xfspec, Context::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Evaluation);
        assert!(err.message().contains("missing input 'rec'"));
    }

    #[test]
    fn missing_declared_output_fails() {
        let xfspec = vec![Step::new(Operation::LoadRecordings).io(&[], &["est"])];
        let err = counting_evaluator().evaluate(&xfspec, Context::new()).unwrap_err();
        assert!(err.message().contains("did not produce output 'est'"));
    }

    #[test]
    fn unregistered_operation_fails_before_later_steps() {
        let xfspec = vec![Step::new(Operation::Predict), Step::new(Operation::LoadRecordings)];
        let err = counting_evaluator().evaluate(&xfspec, Context::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Evaluation);
        assert!(err.message().contains("nems.xforms.predict"));
    }

    #[test]
    fn empty_output_list_takes_all_updates() {
        let xfspec = vec![Step::new(Operation::LoadRecordings).io(&[], &[])];
        let ctx = counting_evaluator().evaluate(&xfspec, Context::new()).unwrap().context;
        assert_eq!(ctx.get("rec"), Some(&json!(0)));
    }
}
