//! Formatted terminal output.
//!
//! We keep formatting code in one place so the registry and pipeline code stay
//! free of presentation concerns.

use serde_json::Value;

use crate::app::pipeline::FitOutput;
use crate::domain::{LoaderOptions, Step};
use crate::registry::Registry;
use crate::xforms::{Context, MODELSPECS, XFSPEC, modelspec_meta};

/// One line per step: index, operation, arguments, and declared context keys.
pub fn format_pipeline(xfspec: &[Step]) -> String {
    let mut out = String::new();
    for (i, step) in xfspec.iter().enumerate() {
        out.push_str(&format!("{:>2}. {}", i, step.op));
        if !step.args.is_empty() {
            out.push_str(&format!(" {}", Value::Object(step.args.clone())));
        }
        if let (Some(inputs), Some(outputs)) = (&step.inputs, &step.outputs) {
            out.push_str(&format!(" [{}] -> [{}]", inputs.join(", "), outputs.join(", ")));
        }
        out.push('\n');
    }
    out
}

/// Table of every loader and fitter code the registry recognizes.
pub fn format_codes(registry: &Registry) -> String {
    let mut out = String::new();

    out.push_str("Loaders:\n");
    for loader in registry.loaders() {
        out.push_str(&format!("  {:<18} {}\n", loader.code, format_options(&loader.options)));
        let permuted = loader.permute_signals();
        if !permuted.is_empty() {
            let names: Vec<&str> = permuted.iter().map(|s| s.name()).collect();
            out.push_str(&format!("  {:<18} permuted: {}\n", "", names.join(", ")));
        }
    }

    out.push_str("\nFitters:\n");
    for fitter in registry.fitters() {
        let ops: Vec<String> = fitter
            .steps()
            .iter()
            .map(|s| short_op(s.op.identifier()).to_string())
            .collect();
        out.push_str(&format!("  {:<18} {}\n", fitter.code, ops.join(" -> ")));
    }

    out
}

fn format_options(options: &LoaderOptions) -> String {
    let state: Vec<&str> = options.state_vars.iter().map(|s| s.name()).collect();
    format!(
        "{}Hz {:?}x{} prestim={} avg={} state=[{}]",
        options.rasterfs,
        options.stimfmt,
        options.chancount,
        options.includeprestim,
        options.average_stim,
        state.join(", ")
    )
}

/// Last dotted component of an operation identifier.
fn short_op(identifier: &str) -> &str {
    identifier.rsplit('.').next().unwrap_or(identifier)
}

/// Summary of a completed fit.
pub fn format_fit_summary(output: &FitOutput) -> String {
    let mut out = String::new();

    out.push_str("=== xf - model fit ===\n");
    out.push_str(&format!("Model: {}\n", output.model));
    out.push_str(&format!("Loader: {}\n", output.model.loader));
    out.push_str(&format!("Modelspec: {}\n", output.model.modelspecname));
    out.push_str(&format!("Fitter: {}\n", output.model.fitter));
    out.push_str(&format!("Steps: {}\n", output.xfspec.len()));
    out.push_str(&format_context_summary(&output.context));

    if let Some(row) = &output.saved {
        out.push_str(&format!("Saved: {}\n", row.modelpath.display()));
    }

    out
}

/// Context keys and per-modelspec scores.
pub fn format_context_summary(context: &Context) -> String {
    if context.is_empty() {
        return "Context: empty\n".to_string();
    }

    let mut out = String::new();
    let keys: Vec<&str> = context.keys().filter(|k| *k != XFSPEC).collect();
    out.push_str(&format!("Context ({} keys): {}\n", context.len(), keys.join(", ")));

    match context.modelspecs() {
        Some(modelspecs) => {
            out.push_str(&format!("Modelspecs: {}\n", modelspecs.len()));
            for (i, modelspec) in modelspecs.iter().enumerate() {
                let meta = modelspec_meta(modelspec);
                let r_test = meta.and_then(|m| m.get("r_test")).map(fmt_score);
                let r_fit = meta.and_then(|m| m.get("r_fit")).map(fmt_score);
                out.push_str(&format!(
                    "  [{i}] r_test={} r_fit={}\n",
                    r_test.unwrap_or_else(|| "-".to_string()),
                    r_fit.unwrap_or_else(|| "-".to_string())
                ));
            }
        }
        None => out.push_str(&format!("Modelspecs: none ('{MODELSPECS}' missing)\n")),
    }

    out
}

fn fmt_score(value: &Value) -> String {
    let v = match value {
        Value::Array(values) => values.first().and_then(Value::as_f64),
        other => other.as_f64(),
    };
    match v {
        Some(v) if v.is_finite() => format!("{v:.3}"),
        _ => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Operation;
    use serde_json::json;

    #[test]
    fn pipeline_lines_show_args_and_io() {
        let xfspec = vec![
            Step::new(Operation::FitBasic).arg("maxiter", 1000),
            Step::new(Operation::StandardCorrelation).io(&["est", "val", "modelspecs"], &["modelspecs"]),
        ];
        let text = format_pipeline(&xfspec);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], " 0. nems.xforms.fit_basic {\"maxiter\":1000}");
        assert_eq!(
            lines[1],
            " 1. nems.analysis.api.standard_correlation [est, val, modelspecs] -> [modelspecs]"
        );
    }

    #[test]
    fn codes_list_every_entry() {
        let registry = Registry::standard();
        let text = format_codes(&registry);
        for loader in registry.loaders() {
            assert!(text.contains(loader.code));
        }
        assert!(text.contains("fitpjk01"));
        assert!(text.contains("split_for_jackknife -> generate_psth_from_est_for_both_est_and_val_nfold"));
    }

    #[test]
    fn context_summary_reads_scores() {
        let mut ctx = Context::new();
        ctx.insert(MODELSPECS, json!([[{"meta": {"r_test": [0.4213], "r_fit": 0.5}}]]));
        ctx.insert(XFSPEC, json!([]));
        let text = format_context_summary(&ctx);
        assert!(text.starts_with("Context (2 keys): modelspecs\n"), "{text}");
        assert!(text.contains("[0] r_test=0.421 r_fit=0.500"));
    }

    #[test]
    fn empty_context_summary() {
        assert_eq!(format_context_summary(&Context::new()), "Context: empty\n");
    }
}
