//! Greedy reduced basis generation.
//!
//! The greedy search repeatedly asks which training parameter is worst
//! approximated by the current reduced model, solves the detailed problem there
//! and adds the snapshot to the basis:
//!
//! 1. Evaluate the error (by default the a posteriori estimate) for every
//!    training parameter. This scan is the dominant cost and runs in parallel
//!    on the rayon pool; the training parameters are independent.
//! 2. Select the parameter with the largest error. Ties go to the parameter that
//!    comes first in the training set.
//! 3. Stop if the error is within the tolerance, or if the previous snapshot was
//!    dropped as linearly dependent and the same parameter is selected again.
//!    A drop leaves the reduced model unchanged, so the scan after a drop reuses
//!    the previous errors instead of recomputing them; it therefore always
//!    selects the dropped parameter again and the run ends without progress.
//! 4. Solve the detailed problem at the selected parameter and offer the snapshot
//!    to the reductor. If the basis grew, rebuild the reduced model and
//!    estimator.
//!
//! The loop also stops once `max_extensions` snapshots have been added. Every
//! scan is recorded as an [`ErrorRecord`]; the final [`GreedyResult`] says which
//! of the three terminal states ended the run.
//!
//! With [`GreedyOptions::use_estimator`] set to `false` the scan computes true
//! errors instead, which needs one detailed solve per training parameter and
//! iteration. This is meant for validating estimators on small problems; wrap the
//! solver in a [`crate::model::CachedSolver`] to avoid repeating those solves.

use crate::{
    basis::ExtensionOutcome,
    error::{GreedyError, GreedyErrorKind},
    model::DetailedSolver,
    parameters::{Parameter, TrainingSet},
    reductors::{ErrorEstimator, ReducedModel, Reductor},
};
use rayon::prelude::*;
use std::time::{Duration, Instant};

/// Configuration of a greedy run.
#[derive(Debug, Clone, PartialEq)]
pub struct GreedyOptions {
    /// Maximum number of basis extensions. Zero returns immediately.
    pub max_extensions: usize,
    /// Stop once the maximum error over the training set is at most this value.
    pub error_tolerance: Option<f64>,
    /// Scan with the error estimator (`true`) or with true errors (`false`).
    pub use_estimator: bool,
    /// Number of worker threads for the scan; `None` uses the global rayon pool.
    pub num_workers: Option<usize>,
}

impl Default for GreedyOptions {
    fn default() -> Self {
        Self {
            max_extensions: 10,
            error_tolerance: None,
            use_estimator: true,
            num_workers: None,
        }
    }
}

impl GreedyOptions {
    fn validate(&self) -> Result<(), GreedyError> {
        if let Some(tol) = self
            .error_tolerance
            .filter(|tol| !(tol.is_finite() && *tol >= 0.0))
        {
            return Err(GreedyErrorKind::InvalidOption(format!(
                "error tolerance must be a non-negative finite number, got {tol}"
            ))
            .into());
        }
        if self.num_workers == Some(0) {
            return Err(GreedyErrorKind::InvalidOption(
                "number of workers must be positive".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

/// Why a greedy run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// `max_extensions` snapshots were added.
    MaxExtensionsReached,
    /// The maximum error dropped to the tolerance.
    ToleranceReached,
    /// The selected snapshot could not extend the basis and the search kept
    /// selecting it.
    NoProgress,
}

/// What the driver did after a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IterationAction {
    /// The snapshot was appended to the basis.
    Extended,
    /// The snapshot was linearly dependent on the basis and was not appended.
    Dropped,
    /// No snapshot was computed because the run terminated after the scan.
    Stopped,
}

/// Outcome of one scan over the training set.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    /// One-based iteration number.
    pub iteration: usize,
    /// Basis size the scanned reduced model was built from.
    pub basis_size: usize,
    /// Maximum error over the training set.
    pub max_error: f64,
    /// First training parameter attaining `max_error`.
    pub parameter: Parameter,
    pub action: IterationAction,
    /// Time since the start of the run when the iteration completed.
    pub elapsed: Duration,
}

/// Final state of a greedy run.
#[derive(Debug)]
pub struct GreedyResult<M, E> {
    reduced_model: M,
    estimator: E,
    records: Vec<ErrorRecord>,
    extensions: usize,
    elapsed: Duration,
    termination: Termination,
}

impl<M, E> GreedyResult<M, E> {
    /// The reduced model built from the final basis.
    pub fn reduced_model(&self) -> &M {
        &self.reduced_model
    }

    /// The error estimator matching [`GreedyResult::reduced_model`].
    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// One record per scan, in iteration order.
    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    /// The maximum error of every scan.
    pub fn max_errors(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.max_error).collect()
    }

    /// The parameter selected in every scan.
    pub fn max_error_parameters(&self) -> Vec<&Parameter> {
        self.records.iter().map(|r| &r.parameter).collect()
    }

    /// Number of snapshots that were appended to the basis.
    pub fn extensions(&self) -> usize {
        self.extensions
    }

    /// Total wall time of the run.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    /// Consumes the result, returning the reduced model and its estimator.
    pub fn into_parts(self) -> (M, E) {
        (self.reduced_model, self.estimator)
    }
}

/// Runs the greedy basis generation.
///
/// # Arguments
/// * `solver`: The detailed model, used for snapshots (and for true errors when
///   the estimator is disabled).
/// * `reductor`: Owns the basis; extended in place.
/// * `training_set`: The candidate parameters. Must not be empty.
/// * `options`: Stopping criteria and scan configuration.
///
/// # Returns
/// The [`GreedyResult`], or a [`GreedyError`] if the configuration is invalid or a
/// collaborator fails. A failing detailed solve aborts the run and the error
/// carries the parameter.
pub fn greedy<S, R>(
    solver: &S,
    reductor: &mut R,
    training_set: &TrainingSet,
    options: &GreedyOptions,
) -> Result<GreedyResult<R::Model, R::Estimator>, GreedyError>
where
    S: DetailedSolver + Sync,
    R: Reductor + Sync,
{
    options.validate()?;
    if training_set.is_empty() {
        return Err(GreedyErrorKind::EmptyTrainingSet.into());
    }
    let pool = options
        .num_workers
        .map(|n| rayon::ThreadPoolBuilder::new().num_threads(n).build())
        .transpose()
        .map_err(|e| GreedyErrorKind::InvalidOption(format!("cannot build worker pool: {e}")))?;

    let start = Instant::now();
    log::info!(
        "Starting greedy search over {} training parameters (max_extensions = {}, tolerance = {:?}, estimator = {}).",
        training_set.len(),
        options.max_extensions,
        options.error_tolerance,
        options.use_estimator
    );

    let (mut model, mut estimator) = reductor.project().map_err(GreedyError::reductor_failure)?;
    let mut records: Vec<ErrorRecord> = Vec::new();
    let mut extensions = 0;
    let mut stalled_on: Option<Parameter> = None;
    // Errors of the last scan, kept only while the reduced model is unchanged.
    let mut unchanged_scan: Option<Vec<f64>> = None;

    let termination = loop {
        if extensions >= options.max_extensions {
            break Termination::MaxExtensionsReached;
        }

        let basis_size = reductor.basis().len();
        let errors = if let Some(errors) = unchanged_scan.take() {
            log::debug!("Reduced model unchanged; reusing the previous scan.");
            errors
        } else {
            let reductor = &*reductor;
            let scan = || {
                scan_errors(
                    solver,
                    reductor,
                    &model,
                    &estimator,
                    training_set,
                    options.use_estimator,
                )
            };
            match &pool {
                Some(pool) => pool.install(scan),
                None => scan(),
            }?
        };

        let (index, max_error) = select_max(&errors);
        let mu = training_set.as_slice()[index].clone();
        let iteration = records.len() + 1;
        log::info!(
            "Iteration {iteration}: max error {max_error:e} at {mu} (basis size {basis_size})."
        );

        let stop = if options.error_tolerance.is_some_and(|tol| max_error <= tol) {
            log::info!("Error tolerance reached.");
            Some(Termination::ToleranceReached)
        } else if stalled_on.as_ref() == Some(&mu) {
            log::warn!("Selected {mu} again after its snapshot was dropped; stopping.");
            Some(Termination::NoProgress)
        } else {
            None
        };
        if let Some(termination) = stop {
            records.push(ErrorRecord {
                iteration,
                basis_size,
                max_error,
                parameter: mu,
                action: IterationAction::Stopped,
                elapsed: start.elapsed(),
            });
            break termination;
        }

        let snapshot = solver
            .solve(&mu)
            .map_err(|e| GreedyError::solver_failure(&mu, e))?;
        let outcome = reductor
            .extend(snapshot.as_ref())
            .map_err(GreedyError::reductor_failure)?;

        let action = match outcome {
            ExtensionOutcome::Extended { basis_len } => {
                extensions += 1;
                stalled_on = None;
                (model, estimator) = reductor.project().map_err(GreedyError::reductor_failure)?;
                log::debug!("Rebuilt reduced model of dimension {basis_len}.");
                IterationAction::Extended
            }
            ExtensionOutcome::Dropped { residual_ratio } => {
                log::warn!(
                    "Snapshot at {mu} did not extend the basis (relative residual {residual_ratio:e})."
                );
                stalled_on = Some(mu.clone());
                unchanged_scan = Some(errors);
                IterationAction::Dropped
            }
        };

        records.push(ErrorRecord {
            iteration,
            basis_size,
            max_error,
            parameter: mu,
            action,
            elapsed: start.elapsed(),
        });
    };

    let elapsed = start.elapsed();
    log::info!(
        "Greedy search finished after {extensions} extensions ({termination:?}) in {:.3}s.",
        elapsed.as_secs_f64()
    );

    Ok(GreedyResult {
        reduced_model: model,
        estimator,
        records,
        extensions,
        elapsed,
        termination,
    })
}

/// Computes the error of the reduced model for every training parameter, in order.
fn scan_errors<S, R>(
    solver: &S,
    reductor: &R,
    model: &R::Model,
    estimator: &R::Estimator,
    training_set: &TrainingSet,
    use_estimator: bool,
) -> Result<Vec<f64>, GreedyError>
where
    S: DetailedSolver + Sync,
    R: Reductor + Sync,
{
    training_set
        .as_slice()
        .par_iter()
        .map(|mu| {
            let error = if use_estimator {
                estimator
                    .estimate(mu, model)
                    .map_err(|e| GreedyError::estimator_failure(mu, e))?
            } else {
                true_error(solver, reductor, model, mu)?
            };
            if !(error.is_finite() && error >= 0.0) {
                return Err(GreedyErrorKind::NonFiniteError {
                    parameter: mu.clone(),
                    value: error,
                }
                .into());
            }
            Ok(error)
        })
        .collect()
}

/// The reduction error `‖u(μ) − V u_N(μ)‖_X`, measured in the reductor's product.
pub(crate) fn true_error<S, R>(
    solver: &S,
    reductor: &R,
    model: &R::Model,
    mu: &Parameter,
) -> Result<f64, GreedyError>
where
    S: DetailedSolver,
    R: Reductor,
{
    let u = solver
        .solve(mu)
        .map_err(|e| GreedyError::solver_failure(mu, e))?;
    let u_n = model
        .solve(mu)
        .map_err(|e| GreedyError::estimator_failure(mu, e))?;
    let u_rb = reductor.reconstruct(u_n.as_ref());
    if u.nrows() != u_rb.nrows() || u.ncols() != 1 {
        return Err(GreedyErrorKind::DimensionMismatch {
            basis_dim: u_rb.nrows(),
            vector_dim: u.nrows(),
        }
        .into());
    }
    Ok(reductor.product().norm((&u - &u_rb).as_ref()))
}

/// Index and value of the maximum; the first occurrence wins ties.
fn select_max(errors: &[f64]) -> (usize, f64) {
    errors
        .iter()
        .copied()
        .enumerate()
        .fold((0, errors[0]), |best, (i, e)| if e > best.1 { (i, e) } else { best })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_max_prefers_first_occurrence() {
        assert_eq!(select_max(&[1.0, 3.0, 2.0, 3.0]), (1, 3.0));
        assert_eq!(select_max(&[0.5, 0.5, 0.5]), (0, 0.5));
        assert_eq!(select_max(&[0.0]), (0, 0.0));
    }

    #[test]
    fn test_options_validation() {
        assert!(GreedyOptions::default().validate().is_ok());

        let negative = GreedyOptions {
            error_tolerance: Some(-1.0),
            ..Default::default()
        };
        assert_eq!(
            negative.validate().unwrap_err().to_string(),
            "Invalid configuration: error tolerance must be a non-negative finite number, got -1"
        );

        let nan = GreedyOptions {
            error_tolerance: Some(f64::NAN),
            ..Default::default()
        };
        assert!(nan.validate().is_err());

        let no_workers = GreedyOptions {
            num_workers: Some(0),
            ..Default::default()
        };
        assert!(no_workers.validate().unwrap_err().is_configuration_error());
    }
}
