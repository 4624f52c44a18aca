//! Detailed (full order) models.
//!
//! The greedy driver only needs one capability from the expensive model: a
//! snapshot `u(μ)` for a given parameter. That capability is the
//! [`DetailedSolver`] trait. Implementations live outside this crate as well, so
//! its methods report failures as [`anyhow::Error`]; the driver attaches the
//! offending parameter before propagating them.
//!
//! [`StationaryAffineModel`] is the concrete model used by
//! [`crate::reductors::CoerciveRbReductor`]: a linear system whose operator and
//! right-hand side depend affinely on scalar coefficient functionals,
//!
//! ```text
//! A(μ) = Σ_q θ_q(μ) A_q,    f(μ) = Σ_p φ_p(μ) f_p,    A(μ) u(μ) = f(μ).
//! ```
//!
//! [`CachedSolver`] memoizes snapshots of any solver by parameter value.

use crate::{
    error::{GreedyError, GreedyErrorKind},
    parameters::{Parameter, ParameterType},
};
use anyhow::{Context, bail};
use faer::prelude::*;
use parking_lot::Mutex;
use std::{collections::HashMap, fmt, sync::Arc};

/// Computes full order solution snapshots.
pub trait DetailedSolver {
    /// The parameter layout accepted by [`DetailedSolver::solve`].
    fn parameter_type(&self) -> &ParameterType;

    /// Dimension of the solution space.
    fn dim(&self) -> usize;

    /// Solves the detailed problem for `mu`, returning a `dim × 1` snapshot.
    ///
    /// Fails if `mu` does not match [`DetailedSolver::parameter_type`] or if the
    /// underlying solver fails.
    fn solve(&self, mu: &Parameter) -> anyhow::Result<Mat<f64>>;
}

/// A scalar function of the parameter, `μ ↦ θ(μ)`.
#[derive(Clone)]
pub struct ParameterFunctional {
    f: Arc<dyn Fn(&Parameter) -> f64 + Send + Sync>,
}

impl ParameterFunctional {
    pub fn new(f: impl Fn(&Parameter) -> f64 + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f) }
    }

    /// The functional that ignores the parameter.
    pub fn constant(value: f64) -> Self {
        Self::new(move |_| value)
    }

    /// Projection onto one scalar entry of a component.
    ///
    /// Evaluates to NaN for parameters lacking the entry.
    pub fn component(name: impl Into<String>, index: usize) -> Self {
        let name = name.into();
        Self::new(move |mu| mu.component(&name, index).unwrap_or(f64::NAN))
    }

    pub fn evaluate(&self, mu: &Parameter) -> f64 {
        (self.f)(mu)
    }
}

impl fmt::Debug for ParameterFunctional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ParameterFunctional(..)")
    }
}

/// One term `θ(μ) M` of an affine decomposition.
#[derive(Debug, Clone)]
pub struct AffineTerm {
    pub matrix: Mat<f64>,
    pub coefficient: ParameterFunctional,
}

impl AffineTerm {
    pub fn new(matrix: Mat<f64>, coefficient: ParameterFunctional) -> Self {
        Self {
            matrix,
            coefficient,
        }
    }
}

/// A stationary linear problem with affinely parameter dependent data.
#[derive(Debug, Clone)]
pub struct StationaryAffineModel {
    parameter_type: ParameterType,
    operators: Vec<AffineTerm>,
    rhs: Vec<AffineTerm>,
}

impl StationaryAffineModel {
    /// Builds the model, checking that all operator terms are `n × n` and all
    /// right-hand side terms are `n × 1` for a common `n`.
    pub fn new(
        parameter_type: ParameterType,
        operators: Vec<AffineTerm>,
        rhs: Vec<AffineTerm>,
    ) -> Result<Self, GreedyError> {
        let n = match operators.first() {
            Some(term) => term.matrix.nrows(),
            None => {
                return Err(GreedyErrorKind::InvalidShape(
                    "an affine model needs at least one operator term".to_string(),
                )
                .into());
            }
        };
        for term in &operators {
            if term.matrix.nrows() != n || term.matrix.ncols() != n {
                return Err(GreedyErrorKind::InvalidShape(format!(
                    "operator term of shape {}x{} does not match dimension {n}",
                    term.matrix.nrows(),
                    term.matrix.ncols()
                ))
                .into());
            }
        }
        for term in &rhs {
            if term.matrix.nrows() != n || term.matrix.ncols() != 1 {
                return Err(GreedyErrorKind::DimensionMismatch {
                    basis_dim: n,
                    vector_dim: term.matrix.nrows(),
                }
                .into());
            }
        }
        Ok(Self {
            parameter_type,
            operators,
            rhs,
        })
    }

    pub fn operator_terms(&self) -> &[AffineTerm] {
        &self.operators
    }

    pub fn rhs_terms(&self) -> &[AffineTerm] {
        &self.rhs
    }

    /// `A(μ) = Σ_q θ_q(μ) A_q`.
    pub fn assemble_operator(&self, mu: &Parameter) -> Mat<f64> {
        let thetas: Vec<f64> = self
            .operators
            .iter()
            .map(|t| t.coefficient.evaluate(mu))
            .collect();
        let n = self.dim();
        Mat::from_fn(n, n, |i, j| {
            self.operators
                .iter()
                .zip(&thetas)
                .map(|(t, theta)| theta * t.matrix[(i, j)])
                .sum::<f64>()
        })
    }

    /// `f(μ) = Σ_p φ_p(μ) f_p`.
    pub fn assemble_rhs(&self, mu: &Parameter) -> Mat<f64> {
        let phis: Vec<f64> = self.rhs.iter().map(|t| t.coefficient.evaluate(mu)).collect();
        Mat::from_fn(self.dim(), 1, |i, _| {
            self.rhs
                .iter()
                .zip(&phis)
                .map(|(t, phi)| phi * t.matrix[(i, 0)])
                .sum::<f64>()
        })
    }

    /// Assembles and solves `A(μ) u = f(μ)`; `role` names the operator in errors.
    pub(crate) fn solve_system(&self, mu: &Parameter, role: &str) -> anyhow::Result<Mat<f64>> {
        mu.check_type(&self.parameter_type)
            .context("parameter does not match the model")?;
        let a = self.assemble_operator(mu);
        let f = self.assemble_rhs(mu);
        let u = a.as_ref().partial_piv_lu().solve(&f);
        // A singular operator shows up as non-finite entries of the LU solution.
        if (0..u.nrows()).any(|i| !u[(i, 0)].is_finite()) {
            bail!("{role} operator is singular");
        }
        Ok(u)
    }
}

impl DetailedSolver for StationaryAffineModel {
    fn parameter_type(&self) -> &ParameterType {
        &self.parameter_type
    }

    fn dim(&self) -> usize {
        self.operators[0].matrix.nrows()
    }

    fn solve(&self, mu: &Parameter) -> anyhow::Result<Mat<f64>> {
        self.solve_system(mu, "detailed")
    }
}

/// Memoizes the snapshots of another solver.
///
/// Parameters hash by value, so re-solving a parameter that was solved before,
/// for example during exact-error greedy scans, is a lookup.
pub struct CachedSolver<S> {
    inner: S,
    cache: Mutex<HashMap<Parameter, Mat<f64>>>,
}

impl<S: DetailedSolver> CachedSolver<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of cached snapshots.
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}

impl<S: DetailedSolver> DetailedSolver for CachedSolver<S> {
    fn parameter_type(&self) -> &ParameterType {
        self.inner.parameter_type()
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    fn solve(&self, mu: &Parameter) -> anyhow::Result<Mat<f64>> {
        if let Some(u) = self.cache.lock().get(mu) {
            return Ok(u.clone());
        }
        // The lock is not held during the solve so that parallel scans do not serialize.
        let u = self.inner.solve(mu)?;
        self.cache.lock().insert(mu.clone(), u.clone());
        Ok(u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn two_term_model() -> StationaryAffineModel {
        let ty = ParameterType::new([("mu", vec![2])]);
        let a0: Mat<f64> = mat![[2.0, 0.0], [0.0, 1.0]];
        let a1: Mat<f64> = mat![[1.0, 0.0], [0.0, 3.0]];
        let f: Mat<f64> = mat![[1.0], [1.0]];
        StationaryAffineModel::new(
            ty,
            vec![
                AffineTerm::new(a0, ParameterFunctional::component("mu", 0)),
                AffineTerm::new(a1, ParameterFunctional::component("mu", 1)),
            ],
            vec![AffineTerm::new(f, ParameterFunctional::constant(1.0))],
        )
        .unwrap()
    }

    fn mu(values: [f64; 2]) -> Parameter {
        let ty = ParameterType::new([("mu", vec![2])]);
        Parameter::new(&ty, [("mu", values.to_vec())]).unwrap()
    }

    #[test]
    fn test_affine_solve() {
        let model = two_term_model();
        // A = diag(2*1 + 1*2, 1*1 + 3*2) = diag(4, 7).
        let u = model.solve(&mu([1.0, 2.0])).unwrap();
        assert!((u[(0, 0)] - 0.25).abs() < 1e-15);
        assert!((u[(1, 0)] - 1.0 / 7.0).abs() < 1e-15);
        assert_eq!(model.dim(), 2);
    }

    #[test]
    fn test_solve_rejects_wrong_parameter_shape() {
        let model = two_term_model();
        let ty = ParameterType::new([("mu", vec![3])]);
        let wrong = Parameter::new(&ty, [("mu", vec![1.0, 1.0, 1.0])]).unwrap();
        let err = model.solve(&wrong).unwrap_err();
        assert!(err.to_string().contains("parameter does not match the model"));
        assert!(err.root_cause().to_string().contains("Shape mismatch"));
    }

    #[test]
    fn test_singular_operator_fails() {
        let model = two_term_model();
        let err = model.solve(&mu([0.0, 0.0])).unwrap_err();
        assert_eq!(err.to_string(), "detailed operator is singular");
    }

    #[test]
    fn test_model_rejects_inconsistent_terms() {
        let ty = ParameterType::new([("mu", vec![])]);
        let result = StationaryAffineModel::new(
            ty,
            vec![AffineTerm::new(
                Mat::<f64>::identity(3, 3),
                ParameterFunctional::constant(1.0),
            )],
            vec![AffineTerm::new(
                Mat::<f64>::zeros(2, 1),
                ParameterFunctional::constant(1.0),
            )],
        );
        assert!(result.is_err());

        let non_square = StationaryAffineModel::new(
            ParameterType::new([("mu", vec![])]),
            vec![AffineTerm::new(
                Mat::<f64>::zeros(3, 2),
                ParameterFunctional::constant(1.0),
            )],
            vec![],
        )
        .unwrap_err();
        assert!(!non_square.is_configuration_error());
        assert!(
            non_square
                .to_string()
                .starts_with("Invalid shape: operator term of shape 3x2")
        );
    }

    struct CountingSolver {
        inner: StationaryAffineModel,
        calls: AtomicUsize,
    }

    impl DetailedSolver for CountingSolver {
        fn parameter_type(&self) -> &ParameterType {
            self.inner.parameter_type()
        }
        fn dim(&self) -> usize {
            self.inner.dim()
        }
        fn solve(&self, mu: &Parameter) -> anyhow::Result<Mat<f64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.solve(mu)
        }
    }

    #[test]
    fn test_cached_solver_solves_once_per_parameter() {
        let cached = CachedSolver::new(CountingSolver {
            inner: two_term_model(),
            calls: AtomicUsize::new(0),
        });
        let a = cached.solve(&mu([1.0, 2.0])).unwrap();
        let b = cached.solve(&mu([1.0, 2.0])).unwrap();
        cached.solve(&mu([2.0, 2.0])).unwrap();
        assert_eq!(a, b);
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 2);
        assert_eq!(cached.cached(), 2);
    }
}
