//! Validation of a reduced model against the detailed model.
//!
//! After a greedy run the reduced model is checked on a test set that is usually
//! different from the training set: for every test parameter the true reduction
//! error and the estimated error are computed (in parallel, one detailed solve per
//! parameter), and the ratio `estimate / error`, the effectivity, is reported. A
//! rigorous estimator has effectivities of at least one.

use crate::{
    algorithms::greedy::true_error,
    error::{GreedyError, GreedyErrorKind},
    model::DetailedSolver,
    parameters::{Parameter, TrainingSet},
    reductors::{ErrorEstimator, Reductor},
};
use rayon::prelude::*;
use std::fmt;

/// True and estimated error at one test parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterErrors {
    pub parameter: Parameter,
    pub error: f64,
    pub estimate: f64,
}

impl ParameterErrors {
    /// `estimate / error`, undefined when the error vanishes.
    pub fn effectivity(&self) -> Option<f64> {
        (self.error > 0.0).then(|| self.estimate / self.error)
    }
}

/// Summary statistics of a reduction error analysis.
#[derive(Debug, Clone)]
pub struct ErrorAnalysis {
    /// Per-parameter results in test set order.
    pub samples: Vec<ParameterErrors>,
    pub max_error: f64,
    pub max_error_parameter: Parameter,
    pub max_estimate: f64,
    pub max_estimate_parameter: Parameter,
    /// Effectivity statistics over the parameters with non-zero error.
    pub min_effectivity: Option<f64>,
    pub max_effectivity: Option<f64>,
    pub mean_effectivity: Option<f64>,
}

/// Compares the reduced model of `reductor` with the detailed model on `test_set`.
///
/// Errors are measured in the reductor's inner product. Fails if `test_set` is
/// empty or if any solve or estimate fails.
pub fn reduction_error_analysis<S, R>(
    solver: &S,
    reductor: &R,
    model: &R::Model,
    estimator: &R::Estimator,
    test_set: &TrainingSet,
) -> Result<ErrorAnalysis, GreedyError>
where
    S: DetailedSolver + Sync,
    R: Reductor + Sync,
{
    if test_set.is_empty() {
        return Err(GreedyErrorKind::InvalidOption("the test set is empty".to_string()).into());
    }

    let samples: Vec<ParameterErrors> = test_set
        .as_slice()
        .par_iter()
        .map(|mu| {
            let error = true_error(solver, reductor, model, mu)?;
            let estimate = estimator
                .estimate(mu, model)
                .map_err(|e| GreedyError::estimator_failure(mu, e))?;
            Ok(ParameterErrors {
                parameter: mu.clone(),
                error,
                estimate,
            })
        })
        .collect::<Result<_, GreedyError>>()?;

    let worst_error = argmax(&samples, |s| s.error);
    let worst_estimate = argmax(&samples, |s| s.estimate);

    let effectivities: Vec<f64> = samples.iter().filter_map(ParameterErrors::effectivity).collect();
    let (min_effectivity, max_effectivity, mean_effectivity) = if effectivities.is_empty() {
        (None, None, None)
    } else {
        (
            Some(effectivities.iter().copied().fold(f64::INFINITY, f64::min)),
            Some(effectivities.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
            Some(effectivities.iter().sum::<f64>() / effectivities.len() as f64),
        )
    };

    log::info!(
        "Error analysis on {} parameters: max error {:e}, max estimate {:e}.",
        samples.len(),
        worst_error.error,
        worst_estimate.estimate
    );

    Ok(ErrorAnalysis {
        max_error: worst_error.error,
        max_error_parameter: worst_error.parameter.clone(),
        max_estimate: worst_estimate.estimate,
        max_estimate_parameter: worst_estimate.parameter.clone(),
        min_effectivity,
        max_effectivity,
        mean_effectivity,
        samples,
    })
}

/// First sample maximizing `key`. `samples` must not be empty.
fn argmax(samples: &[ParameterErrors], key: impl Fn(&ParameterErrors) -> f64) -> &ParameterErrors {
    samples
        .iter()
        .fold(&samples[0], |best, s| if key(s) > key(best) { s } else { best })
}

impl fmt::Display for ErrorAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reduction error analysis:")?;
        writeln!(f, "   number of samples:                  {}", self.samples.len())?;
        writeln!(
            f,
            "   maximum error:                      {:e} at {}",
            self.max_error, self.max_error_parameter
        )?;
        writeln!(
            f,
            "   maximum estimated error:            {:e} at {}",
            self.max_estimate, self.max_estimate_parameter
        )?;
        match (self.min_effectivity, self.max_effectivity, self.mean_effectivity) {
            (Some(min), Some(max), Some(mean)) => {
                writeln!(f, "   minimum effectivity:                {min:.4}")?;
                writeln!(f, "   maximum effectivity:                {max:.4}")?;
                write!(f, "   mean effectivity:                   {mean:.4}")
            }
            _ => write!(f, "   effectivities:                      n/a (all errors vanish)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ParameterType;

    fn sample(value: f64, error: f64, estimate: f64) -> ParameterErrors {
        let ty = ParameterType::new([("mu", vec![])]);
        ParameterErrors {
            parameter: Parameter::new(&ty, [("mu", vec![value])]).unwrap(),
            error,
            estimate,
        }
    }

    #[test]
    fn test_argmax_keeps_first_maximum() {
        let samples = vec![sample(0.1, 1.0, 4.0), sample(0.2, 2.0, 4.0), sample(0.3, 2.0, 1.0)];
        assert_eq!(argmax(&samples, |s| s.error).parameter, samples[1].parameter);
        assert_eq!(argmax(&samples, |s| s.estimate).parameter, samples[0].parameter);
    }

    #[test]
    fn test_effectivity_requires_nonzero_error() {
        assert_eq!(sample(0.1, 2.0, 3.0).effectivity(), Some(1.5));
        assert_eq!(sample(0.1, 0.0, 3.0).effectivity(), None);
    }
}
