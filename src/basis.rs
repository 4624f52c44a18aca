//! The reduced basis and the outcome of extending it.
//!
//! A [`Basis`] stores its vectors as the columns of a single `dim × len` matrix
//! `V`. It only grows, one column at a time, through
//! [`crate::algorithms::gram_schmidt::gram_schmidt_extend`], which keeps the
//! columns orthonormal with respect to the inner product the reductor was
//! configured with.

use crate::product::InnerProduct;
use faer::prelude::*;

/// An ordered set of orthonormal vectors in the detailed solution space.
#[derive(Debug, Clone)]
pub struct Basis {
    vectors: Mat<f64>,
}

impl Basis {
    /// An empty basis for a space of dimension `dim`.
    pub fn new(dim: usize) -> Self {
        Self {
            vectors: Mat::zeros(dim, 0),
        }
    }

    /// Dimension of the space the basis vectors live in.
    pub fn dim(&self) -> usize {
        self.vectors.nrows()
    }

    /// Number of basis vectors.
    pub fn len(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The basis matrix `V`, one vector per column.
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        self.vectors.as_ref()
    }

    /// The `j`-th basis vector as a `dim × 1` view.
    pub fn vector(&self, j: usize) -> MatRef<'_, f64> {
        self.vectors.as_ref().get(.., j..j + 1)
    }

    /// Appends a column. The caller guarantees orthonormality.
    pub(crate) fn push(&mut self, v: MatRef<'_, f64>) {
        let (n, k) = (self.dim(), self.len());
        let old = self.vectors.as_ref();
        let extended = Mat::from_fn(n, k + 1, |i, j| if j < k { old[(i, j)] } else { v[(i, 0)] });
        self.vectors = extended;
    }

    /// Linear combination `V c` of the basis vectors.
    pub fn reconstruct(&self, coefficients: MatRef<'_, f64>) -> Mat<f64> {
        if self.is_empty() {
            return Mat::zeros(self.dim(), coefficients.ncols());
        }
        self.vectors.as_ref() * coefficients
    }

    /// The Gram matrix `Vᵀ X V`.
    pub fn gram_matrix(&self, product: &InnerProduct) -> Mat<f64> {
        product.gram(self.as_ref(), self.as_ref())
    }

    /// Loss of orthonormality `‖I − Vᵀ X V‖_F`.
    pub fn orthonormality_defect(&self, product: &InnerProduct) -> f64 {
        let k = self.len();
        if k == 0 {
            return 0.0;
        }
        let identity = Mat::<f64>::identity(k, k);
        (&identity - &self.gram_matrix(product)).norm_l2()
    }
}

/// What happened to a vector offered to the basis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtensionOutcome {
    /// The orthonormalized vector was appended; the basis now has `basis_len` vectors.
    Extended { basis_len: usize },
    /// The vector was numerically contained in the span of the basis and was not
    /// appended. `residual_ratio` is the norm of what was left after
    /// orthogonalization relative to the original norm.
    Dropped { residual_ratio: f64 },
}

impl ExtensionOutcome {
    pub fn is_extended(&self) -> bool {
        matches!(self, Self::Extended { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    #[test]
    fn test_push_and_reconstruct() {
        let mut basis = Basis::new(3);
        assert!(basis.is_empty());
        let zero = basis.reconstruct(Mat::<f64>::zeros(0, 1).as_ref());
        assert_eq!(zero, Mat::<f64>::zeros(3, 1));

        let e0: Mat<f64> = mat![[1.0], [0.0], [0.0]];
        let e2: Mat<f64> = mat![[0.0], [0.0], [1.0]];
        basis.push(e0.as_ref());
        basis.push(e2.as_ref());
        assert_eq!(basis.len(), 2);
        assert_eq!(basis.vector(1).to_owned(), e2);

        let c: Mat<f64> = mat![[2.0], [-1.0]];
        let expected: Mat<f64> = mat![[2.0], [0.0], [-1.0]];
        assert_eq!(basis.reconstruct(c.as_ref()), expected);
        assert!(basis.orthonormality_defect(&InnerProduct::Euclidean) < 1e-15);
    }

    #[test]
    fn test_orthonormality_defect_detects_non_orthogonal_columns() {
        let mut basis = Basis::new(2);
        let a: Mat<f64> = mat![[1.0], [0.0]];
        let b: Mat<f64> = mat![[1.0], [0.0]];
        basis.push(a.as_ref());
        basis.push(b.as_ref());
        // Gram matrix is all ones, so the defect is sqrt(2).
        let defect = basis.orthonormality_defect(&InnerProduct::Euclidean);
        assert!((defect - 2.0_f64.sqrt()).abs() < 1e-14);
    }
}
