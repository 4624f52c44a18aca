//! Inner products on the detailed solution space.
//!
//! Orthonormalization, dual residual norms and true reduction errors are all
//! measured in an inner product `(u, v)_X = uᵀ X v`. The [`InnerProduct`] type
//! covers the two cases used in practice: the Euclidean product (`X = I`) and a
//! product given by an explicit symmetric positive definite matrix, such as the
//! H¹₀ semi product of a diffusion problem.
//!
//! Vectors are `n × 1` column matrices and blocks of vectors are `n × k`
//! matrices, so every operation here is a thin layer over `faer`'s dense
//! matrix products.

use crate::error::{GreedyError, GreedyErrorKind};
use faer::prelude::*;

#[derive(Debug, Clone)]
pub enum InnerProduct {
    /// `(u, v) = uᵀ v`.
    Euclidean,
    /// `(u, v) = uᵀ X v` for a symmetric positive definite `X`.
    Matrix(Mat<f64>),
}

impl InnerProduct {
    /// Wraps a product matrix, checking that it is square.
    ///
    /// Symmetry and definiteness are the caller's responsibility.
    pub fn from_matrix(matrix: Mat<f64>) -> Result<Self, GreedyError> {
        if matrix.nrows() != matrix.ncols() {
            return Err(GreedyErrorKind::InvalidOption(format!(
                "product matrix must be square, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            ))
            .into());
        }
        Ok(Self::Matrix(matrix))
    }

    /// Dimension of the space, if the product fixes one.
    pub fn dim(&self) -> Option<usize> {
        match self {
            Self::Euclidean => None,
            Self::Matrix(x) => Some(x.nrows()),
        }
    }

    /// Applies `X` to every column of `v`.
    pub fn apply(&self, v: MatRef<'_, f64>) -> Mat<f64> {
        match self {
            Self::Euclidean => v.to_owned(),
            Self::Matrix(x) => x.as_ref() * v,
        }
    }

    /// The matrix `aᵀ X b` of pairwise inner products of the columns of `a` and `b`.
    pub fn gram(&self, a: MatRef<'_, f64>, b: MatRef<'_, f64>) -> Mat<f64> {
        match self {
            Self::Euclidean => a.transpose() * b,
            Self::Matrix(x) => a.transpose() * (x.as_ref() * b).as_ref(),
        }
    }

    /// Inner product of two single-column vectors.
    pub fn inner(&self, u: MatRef<'_, f64>, v: MatRef<'_, f64>) -> f64 {
        self.gram(u, v)[(0, 0)]
    }

    /// Norm of a single-column vector.
    ///
    /// Rounding can make `(v, v)_X` slightly negative for vectors that are
    /// numerically zero; those have norm zero.
    pub fn norm(&self, v: MatRef<'_, f64>) -> f64 {
        match self {
            Self::Euclidean => v.norm_l2(),
            Self::Matrix(_) => self.inner(v, v).max(0.0).sqrt(),
        }
    }

    /// Riesz representatives `X⁻¹ B` of the functionals given by the columns of `b`.
    ///
    /// A single LU factorization of `X` is shared by all columns.
    pub fn riesz_representatives(&self, b: MatRef<'_, f64>) -> Mat<f64> {
        match self {
            Self::Euclidean => b.to_owned(),
            Self::Matrix(x) => {
                if b.ncols() == 0 {
                    return Mat::zeros(x.nrows(), 0);
                }
                let rhs = b.to_owned();
                x.as_ref().partial_piv_lu().solve(&rhs)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    #[test]
    fn test_euclidean_matches_dot_product() {
        let u: Mat<f64> = mat![[1.0], [2.0], [2.0]];
        let v: Mat<f64> = mat![[3.0], [0.0], [-1.0]];
        let product = InnerProduct::Euclidean;
        assert_eq!(product.inner(u.as_ref(), v.as_ref()), 1.0);
        assert!((product.norm(u.as_ref()) - 3.0).abs() < 1e-15);
        assert_eq!(product.dim(), None);
    }

    #[test]
    fn test_matrix_product_and_riesz() {
        let x: Mat<f64> = mat![[2.0, -1.0], [-1.0, 2.0]];
        let product = InnerProduct::from_matrix(x.clone()).unwrap();
        let u: Mat<f64> = mat![[1.0], [1.0]];
        assert!((product.inner(u.as_ref(), u.as_ref()) - 2.0).abs() < 1e-14);

        // The Riesz representative r of b satisfies X r = b.
        let b: Mat<f64> = mat![[1.0, 0.0], [0.0, 1.0]];
        let r = product.riesz_representatives(b.as_ref());
        let back = &x * &r;
        assert!((&back - &b).norm_l2() < 1e-14);
    }

    #[test]
    fn test_from_matrix_rejects_non_square() {
        let x = Mat::<f64>::zeros(3, 2);
        assert!(InnerProduct::from_matrix(x).is_err());
    }

    #[test]
    fn test_gram_of_block() {
        let x: Mat<f64> = mat![[4.0, 0.0], [0.0, 1.0]];
        let product = InnerProduct::Matrix(x);
        let v: Mat<f64> = mat![[0.5, 0.0], [0.0, 1.0]];
        let g = product.gram(v.as_ref(), v.as_ref());
        let identity = Mat::<f64>::identity(2, 2);
        assert!((&g - &identity).norm_l2() < 1e-15);
    }
}
