//! Fitter table: steps that initialize, optionally cross-validate, and fit
//! model parameters. Every variant ends with a prediction step.

use serde::Serialize;

use crate::domain::{Operation, Step, Xfspec};

/// One row of the fitter table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitterConfig {
    pub code: &'static str,
    /// Logged when the fitter is resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
    /// Steps before the trailing prediction.
    body: Xfspec,
}

impl FitterConfig {
    fn new(code: &'static str, note: Option<&'static str>, body: Xfspec) -> Self {
        Self { code, note, body }
    }

    /// Ordered steps for this fitter, prediction last.
    pub fn steps(&self) -> Xfspec {
        let mut xfspec = self.body.clone();
        xfspec.push(Step::new(Operation::Predict));
        xfspec
    }
}

const PREFIT_NOTE: &str = "Prefitting STRF without other modules...";
const NFOLD_NOTE: &str = "n-fold fitting...";

/// The full fitter table, in listing order.
pub fn standard_fitters() -> Vec<FitterConfig> {
    vec![
        FitterConfig::new(
            "fit01",
            Some(PREFIT_NOTE),
            vec![Step::new(Operation::FitBasicInit), Step::new(Operation::FitBasic)],
        ),
        FitterConfig::new(
            "fit01a",
            Some(PREFIT_NOTE),
            vec![
                Step::new(Operation::FitBasicInit),
                Step::new(Operation::FitBasic).arg("maxiter", 1000).arg("ftol", 1e-5),
            ],
        ),
        FitterConfig::new(
            "fitjk01",
            Some(NFOLD_NOTE),
            vec![
                Step::new(Operation::SplitForJackknife).arg("njacks", 5),
                Step::new(Operation::FitNfold),
            ],
        ),
        FitterConfig::new(
            "fitpjk01",
            Some(NFOLD_NOTE),
            vec![
                Step::new(Operation::SplitForJackknife).arg("njacks", 10),
                Step::new(Operation::GeneratePsthNfold),
                Step::new(Operation::FitNfold),
            ],
        ),
        FitterConfig::new(
            "fit02",
            Some("Performing full fit..."),
            vec![Step::new(Operation::FitBasic)],
        ),
        // TODO: drop the module_sets override once fit_iteratively picks its own sets.
        FitterConfig::new(
            "fititer01",
            None,
            vec![Step::new(Operation::FitIteratively).arg("module_sets", vec![vec![0, 1], vec![0, 1, 2, 3]])],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn find(code: &str) -> FitterConfig {
        standard_fitters().into_iter().find(|f| f.code == code).unwrap()
    }

    #[test]
    fn fit01a_overrides_iterations_and_tolerance() {
        let steps = find("fit01a").steps();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].op, Operation::FitBasic);
        assert_eq!(steps[1].args["maxiter"], json!(1000));
        assert_eq!(steps[1].args["ftol"], json!(1e-5));
    }

    #[test]
    fn jackknife_fold_counts() {
        assert_eq!(find("fitjk01").steps()[0].args["njacks"], json!(5));
        let pjk = find("fitpjk01").steps();
        assert_eq!(pjk[0].args["njacks"], json!(10));
        assert_eq!(pjk[1].op, Operation::GeneratePsthNfold);
        assert_eq!(pjk[2].op, Operation::FitNfold);
    }

    #[test]
    fn fit02_has_no_prefit() {
        let ops: Vec<Operation> = find("fit02").steps().into_iter().map(|s| s.op).collect();
        assert_eq!(ops, vec![Operation::FitBasic, Operation::Predict]);
    }

    #[test]
    fn fititer01_module_sets() {
        let steps = find("fititer01").steps();
        assert_eq!(steps[0].args["module_sets"], json!([[0, 1], [0, 1, 2, 3]]));
    }
}
