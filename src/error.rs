//! This module defines the custom error types for the library.
//!
//! All failure conditions of a greedy basis generation run are collected into a
//! single enum, [`GreedyErrorKind`], wrapped by the public [`GreedyError`]. The
//! kinds follow the taxonomy of the driver: configuration errors detected before
//! the loop starts, failures of the pluggable collaborators (detailed solver,
//! error estimator, reductor) which always carry the offending parameter where
//! one exists, and basis dimension mismatches.
//!
//! Numerical degeneracy during orthonormalization and lack of progress are *not*
//! errors; they are reported through [`crate::basis::ExtensionOutcome`] and
//! [`crate::algorithms::greedy::Termination`].
//!
//! Collaborators implemented outside this crate return [`anyhow::Error`]; the
//! driver converts those into the matching kind with the error chain rendered
//! into the message.
use crate::parameters::Parameter;
use thiserror::Error;

/// Represents all possible errors that can occur during a greedy run.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct GreedyError(#[from] GreedyErrorKind);

/// Private enum containing the distinct kinds of errors.
#[derive(Error, Debug, PartialEq)]
pub(crate) enum GreedyErrorKind {
    /// The training set contains no parameters.
    #[error("Invalid configuration: the training set is empty.")]
    EmptyTrainingSet,

    /// An option has a value outside of its admissible range.
    #[error("Invalid configuration: {0}")]
    InvalidOption(String),

    /// The detailed solver failed for the selected (or scanned) parameter.
    #[error("Detailed solve failed for parameter {parameter}: {message}")]
    SolverFailure {
        parameter: Parameter,
        message: String,
    },

    /// The error estimator or the reduced solve it relies on failed.
    #[error("Error estimation failed for parameter {parameter}: {message}")]
    EstimatorFailure {
        parameter: Parameter,
        message: String,
    },

    /// An error value that is negative, NaN or infinite was produced.
    #[error("Error value {value} for parameter {parameter} is not a non-negative finite number.")]
    NonFiniteError { parameter: Parameter, value: f64 },

    /// Projection, extension or any other reductor operation failed.
    #[error("Reductor failure: {0}")]
    ReductorFailure(String),

    /// A matrix or vector has the wrong number of rows or columns for its role.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// A vector does not live in the same space as the basis.
    #[error("Dimension mismatch: basis vectors have dimension {basis_dim} but vector has {vector_dim} rows.")]
    DimensionMismatch { basis_dim: usize, vector_dim: usize },
}

impl GreedyError {
    /// Returns the parameter at which the run failed, if the failure is tied to one.
    pub fn parameter(&self) -> Option<&Parameter> {
        match &self.0 {
            GreedyErrorKind::SolverFailure { parameter, .. }
            | GreedyErrorKind::EstimatorFailure { parameter, .. }
            | GreedyErrorKind::NonFiniteError { parameter, .. } => Some(parameter),
            _ => None,
        }
    }

    /// Whether the error was raised by configuration validation, before any work was done.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self.0,
            GreedyErrorKind::EmptyTrainingSet | GreedyErrorKind::InvalidOption(_)
        )
    }

    /// Whether the detailed solver failed.
    pub fn is_solver_failure(&self) -> bool {
        matches!(self.0, GreedyErrorKind::SolverFailure { .. })
    }

    pub(crate) fn solver_failure(parameter: &Parameter, err: anyhow::Error) -> Self {
        GreedyErrorKind::SolverFailure {
            parameter: parameter.clone(),
            message: format!("{err:#}"),
        }
        .into()
    }

    pub(crate) fn estimator_failure(parameter: &Parameter, err: anyhow::Error) -> Self {
        GreedyErrorKind::EstimatorFailure {
            parameter: parameter.clone(),
            message: format!("{err:#}"),
        }
        .into()
    }

    pub(crate) fn reductor_failure(err: anyhow::Error) -> Self {
        GreedyErrorKind::ReductorFailure(format!("{err:#}")).into()
    }
}

impl PartialEq for GreedyError {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ParameterType;

    fn diffusion(values: &[f64]) -> Parameter {
        let ty = ParameterType::new([("diffusion", vec![values.len()])]);
        Parameter::new(&ty, [("diffusion", values.to_vec())]).unwrap()
    }

    #[test]
    fn test_empty_training_set_message() {
        let error = GreedyError(GreedyErrorKind::EmptyTrainingSet);
        assert_eq!(
            error.to_string(),
            "Invalid configuration: the training set is empty."
        );
        assert!(error.is_configuration_error());
        assert!(error.parameter().is_none());
    }

    #[test]
    fn test_solver_failure_carries_parameter() {
        let mu = diffusion(&[0.5, 1.0]);
        let error = GreedyError::solver_failure(&mu, anyhow::anyhow!("singular matrix"));
        assert_eq!(
            error.to_string(),
            "Detailed solve failed for parameter {diffusion: [0.5, 1]}: singular matrix"
        );
        assert!(error.is_solver_failure());
        assert_eq!(error.parameter(), Some(&mu));
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let error = GreedyError(GreedyErrorKind::DimensionMismatch {
            basis_dim: 100,
            vector_dim: 99,
        });
        assert_eq!(
            error.to_string(),
            "Dimension mismatch: basis vectors have dimension 100 but vector has 99 rows."
        );
    }

    #[test]
    fn test_invalid_shape_is_not_a_configuration_error() {
        let error = GreedyError(GreedyErrorKind::InvalidShape(
            "basis extension expects a single vector, got 2 columns".to_string(),
        ));
        assert_eq!(
            error.to_string(),
            "Invalid shape: basis extension expects a single vector, got 2 columns"
        );
        assert!(!error.is_configuration_error());
    }

    #[test]
    fn test_anyhow_context_is_flattened() {
        let err = anyhow::anyhow!("pivot is zero").context("LU factorization failed");
        let error = GreedyError::reductor_failure(err);
        assert_eq!(
            error.to_string(),
            "Reductor failure: LU factorization failed: pivot is zero"
        );
    }
}
