//! Basis extension by re-iterated Gram–Schmidt orthonormalization.
//!
//! A new snapshot is made orthogonal to every existing basis vector with modified
//! Gram–Schmidt. In floating point, a single pass loses orthogonality whenever
//! the snapshot is nearly contained in the span of the basis (heavy cancellation),
//! so the pass is repeated as long as it removes a large fraction of the
//! remaining norm, up to a fixed number of repetitions.
//!
//! If what is left is small relative to the original norm, the snapshot is
//! considered linearly dependent on the basis and is dropped. Dropping is a
//! regular outcome ([`ExtensionOutcome::Dropped`]), not an error: it happens when
//! the greedy search selects a parameter whose solution is already well
//! approximated, and routinely while orthonormalizing the residual range in
//! [`crate::reductors`]. Drops are logged at debug level here; the greedy driver
//! reports dropped snapshots as warnings.

use crate::{
    basis::{Basis, ExtensionOutcome},
    error::{GreedyError, GreedyErrorKind},
    product::InnerProduct,
};
use faer::prelude::*;

/// Tolerances of the orthonormalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GramSchmidtOptions {
    /// Drop the vector if its orthogonalized norm is below `rtol` times its original norm.
    pub rtol: f64,
    /// Repeat the pass if it reduced the norm below this fraction of the norm before the pass.
    pub reiteration_tol: f64,
    /// Maximum number of additional passes.
    pub max_reiterations: usize,
}

impl Default for GramSchmidtOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-10,
            reiteration_tol: 0.1,
            max_reiterations: 3,
        }
    }
}

/// Orthonormalizes `vector` against `basis` and appends it unless it is linearly dependent.
///
/// # Arguments
/// * `basis`: The basis to extend, orthonormal with respect to `product`.
/// * `vector`: A `dim × 1` snapshot.
/// * `product`: The inner product defining orthonormality.
/// * `options`: Drop and re-iteration tolerances.
///
/// # Returns
/// The [`ExtensionOutcome`], or an error if `vector` is not a single column of the
/// basis dimension or contains non-finite entries.
pub fn gram_schmidt_extend(
    basis: &mut Basis,
    vector: MatRef<'_, f64>,
    product: &InnerProduct,
    options: &GramSchmidtOptions,
) -> Result<ExtensionOutcome, GreedyError> {
    if vector.ncols() != 1 {
        return Err(GreedyErrorKind::InvalidShape(format!(
            "basis extension expects a single vector, got {} columns",
            vector.ncols()
        ))
        .into());
    }
    if vector.nrows() != basis.dim() || product.dim().is_some_and(|d| d != basis.dim()) {
        return Err(GreedyErrorKind::DimensionMismatch {
            basis_dim: basis.dim(),
            vector_dim: vector.nrows(),
        }
        .into());
    }

    let initial_norm = product.norm(vector);
    if !initial_norm.is_finite() {
        return Err(GreedyErrorKind::ReductorFailure(
            "snapshot contains non-finite entries".to_string(),
        )
        .into());
    }
    if initial_norm == 0.0 {
        log::debug!("Dropping zero vector; basis size stays at {}.", basis.len());
        return Ok(ExtensionOutcome::Dropped {
            residual_ratio: 0.0,
        });
    }

    let mut v = vector.to_owned();
    let mut norm = initial_norm;
    let mut passes = 0;
    loop {
        let norm_before = norm;
        orthogonalize_once(basis, &mut v, product);
        norm = product.norm(v.as_ref());
        passes += 1;

        // A pass that removed most of the norm suffered from cancellation.
        if norm > options.reiteration_tol * norm_before || passes > options.max_reiterations {
            break;
        }
        log::debug!(
            "Re-orthogonalizing (pass {}): norm dropped from {norm_before:e} to {norm:e}.",
            passes + 1
        );
    }

    let residual_ratio = norm / initial_norm;
    if residual_ratio < options.rtol {
        log::debug!(
            "Vector is linearly dependent on the basis (relative residual {residual_ratio:e}); \
             basis size stays at {}.",
            basis.len()
        );
        return Ok(ExtensionOutcome::Dropped { residual_ratio });
    }

    let v = &v * Scale(1.0 / norm);
    basis.push(v.as_ref());
    Ok(ExtensionOutcome::Extended {
        basis_len: basis.len(),
    })
}

/// One modified Gram–Schmidt sweep of `v` against all basis vectors.
fn orthogonalize_once(basis: &Basis, v: &mut Mat<f64>, product: &InnerProduct) {
    for j in 0..basis.len() {
        let b = basis.vector(j);
        let coefficient = product.inner(b, v.as_ref());
        for i in 0..v.nrows() {
            v[(i, 0)] -= coefficient * b[(i, 0)];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn random_vector(n: usize, rng: &mut StdRng) -> Mat<f64> {
        Mat::from_fn(n, 1, |_, _| rng.random::<f64>() - 0.5)
    }

    #[test]
    fn test_extension_keeps_basis_orthonormal() {
        let n = 40;
        let mut rng = StdRng::seed_from_u64(42);
        let x = Mat::from_fn(n, n, |i, j| {
            if i == j {
                2.0
            } else if i.abs_diff(j) == 1 {
                -1.0
            } else {
                0.0
            }
        });
        let product = InnerProduct::Matrix(x);
        let mut basis = Basis::new(n);
        let options = GramSchmidtOptions::default();

        for k in 1..=10 {
            let v = random_vector(n, &mut rng);
            let outcome = gram_schmidt_extend(&mut basis, v.as_ref(), &product, &options).unwrap();
            assert_eq!(outcome, ExtensionOutcome::Extended { basis_len: k });
            assert!(basis.orthonormality_defect(&product) < 1e-12);
        }
    }

    #[test]
    fn test_dependent_vector_is_dropped() {
        let mut basis = Basis::new(3);
        let product = InnerProduct::Euclidean;
        let options = GramSchmidtOptions::default();
        let a: Mat<f64> = mat![[1.0], [1.0], [0.0]];
        let b: Mat<f64> = mat![[0.0], [1.0], [1.0]];
        gram_schmidt_extend(&mut basis, a.as_ref(), &product, &options).unwrap();
        gram_schmidt_extend(&mut basis, b.as_ref(), &product, &options).unwrap();

        let combination: Mat<f64> = mat![[3.0], [1.0], [-2.0]];
        let outcome =
            gram_schmidt_extend(&mut basis, combination.as_ref(), &product, &options).unwrap();
        assert!(matches!(outcome, ExtensionOutcome::Dropped { residual_ratio } if residual_ratio < 1e-10));
        assert_eq!(basis.len(), 2);
    }

    #[test]
    fn test_zero_vector_is_dropped() {
        let mut basis = Basis::new(2);
        let zero = Mat::<f64>::zeros(2, 1);
        let outcome = gram_schmidt_extend(
            &mut basis,
            zero.as_ref(),
            &InnerProduct::Euclidean,
            &GramSchmidtOptions::default(),
        )
        .unwrap();
        assert_eq!(outcome, ExtensionOutcome::Dropped { residual_ratio: 0.0 });
        assert!(basis.is_empty());
    }

    #[test]
    fn test_nearly_parallel_vector_is_reorthogonalized() {
        let n = 50;
        let mut rng = StdRng::seed_from_u64(7);
        let product = InnerProduct::Euclidean;
        let options = GramSchmidtOptions::default();
        let mut basis = Basis::new(n);

        let first = random_vector(n, &mut rng);
        gram_schmidt_extend(&mut basis, first.as_ref(), &product, &options).unwrap();

        // Perturb the first vector slightly: one Gram-Schmidt pass cancels almost
        // everything, the second pass restores orthogonality.
        let perturbation = random_vector(n, &mut rng);
        let nearly_parallel = &first + &(&perturbation * Scale(1e-7));
        let outcome =
            gram_schmidt_extend(&mut basis, nearly_parallel.as_ref(), &product, &options).unwrap();
        assert!(outcome.is_extended());
        assert!(basis.orthonormality_defect(&product) < 1e-10);
    }

    #[test]
    fn test_multi_column_input_is_a_shape_error() {
        let mut basis = Basis::new(3);
        let block = Mat::<f64>::identity(3, 2);
        let err = gram_schmidt_extend(
            &mut basis,
            block.as_ref(),
            &InnerProduct::Euclidean,
            &GramSchmidtOptions::default(),
        )
        .unwrap_err();
        assert!(!err.is_configuration_error());
        assert_eq!(
            err.to_string(),
            "Invalid shape: basis extension expects a single vector, got 2 columns"
        );
        assert!(basis.is_empty());
    }

    #[test]
    fn test_dimension_mismatch_is_an_error() {
        let mut basis = Basis::new(3);
        let v = Mat::<f64>::zeros(4, 1);
        let err = gram_schmidt_extend(
            &mut basis,
            v.as_ref(),
            &InnerProduct::Euclidean,
            &GramSchmidtOptions::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            GreedyError::from(GreedyErrorKind::DimensionMismatch {
                basis_dim: 3,
                vector_dim: 4
            })
        );
    }
}
