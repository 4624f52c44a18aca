//! Reductors: Galerkin projection onto the reduced basis and a posteriori error estimation.
//!
//! A [`Reductor`] owns the reduced basis. It turns the basis into a cheap
//! [`ReducedModel`] together with an [`ErrorEstimator`] for it (`project`),
//! extends the basis with new snapshots (`extend`), and maps reduced coefficient
//! vectors back to the detailed space (`reconstruct`). The greedy driver only
//! talks to these traits.
//!
//! [`CoerciveRbReductor`] is the reductor for coercive [`StationaryAffineModel`]s.
//! Projection keeps the affine structure, so the reduced model is again an affine
//! model, of dimension `N = len(basis)`:
//!
//! ```text
//! A_N,q = Vᵀ A_q V,    f_N,p = Vᵀ f_p.
//! ```
//!
//! The error estimator bounds the error in the norm of the configured product by
//! the dual norm of the residual divided by a lower bound of the coercivity
//! constant,
//!
//! ```text
//! ‖u(μ) − V u_N(μ)‖_X ≤ Δ(μ) = ‖f(μ) − A(μ) V u_N(μ)‖_X' / α_LB(μ).
//! ```
//!
//! The residual is affine in the vector `c(μ) = [φ_p(μ); −θ_q(μ) u_N(μ)]`: its
//! Riesz representative is `R c(μ)`, where the columns of `R` are the Riesz
//! representatives of all residual components. Two offline/online splittings of
//! `‖R c‖_X` are available ([`ResidualMethod`]):
//!
//! - **Residual basis** (default): `R` is orthonormalized into a basis `W` of its
//!   range and `‖R c‖_X = ‖C c‖₂` with `C = Wᵀ X R`. Cancellation happens in a
//!   linear combination, so the estimate stays accurate down to round-off.
//! - **Traditional**: `‖R c‖_X = sqrt(cᵀ G c)` with `G = Rᵀ X R`. Cheaper offline,
//!   but the quadratic form cancels, so estimates stagnate around
//!   `sqrt(ε)` times the residual scale.
//!
//! Either matrix is computed once per basis; evaluating `Δ(μ)` then costs a
//! reduced solve and a small dense product, independent of the detailed
//! dimension.

use crate::{
    algorithms::gram_schmidt::{GramSchmidtOptions, gram_schmidt_extend},
    basis::{Basis, ExtensionOutcome},
    error::{GreedyError, GreedyErrorKind},
    model::{AffineTerm, DetailedSolver, ParameterFunctional, StationaryAffineModel},
    parameters::Parameter,
    product::InnerProduct,
};
use anyhow::{Context, ensure};
use faer::prelude::*;

/// A cheap surrogate of the detailed model.
pub trait ReducedModel {
    /// Number of reduced degrees of freedom.
    fn dim(&self) -> usize;

    /// Returns the `dim × 1` vector of reduced coefficients for `mu`.
    fn solve(&self, mu: &Parameter) -> anyhow::Result<Mat<f64>>;
}

/// A computable upper bound of the reduction error of a reduced model `M`.
///
/// Implementations must not solve the detailed problem, must not mutate state,
/// and must return the same value for the same arguments.
pub trait ErrorEstimator<M: ?Sized> {
    fn estimate(&self, mu: &Parameter, model: &M) -> anyhow::Result<f64>;
}

/// Builds reduced models from a basis it owns, and extends that basis.
pub trait Reductor {
    type Model: ReducedModel + Send + Sync;
    type Estimator: ErrorEstimator<Self::Model> + Send + Sync;

    /// The current reduced basis.
    fn basis(&self) -> &Basis;

    /// The inner product the basis is orthonormal in and errors are measured in.
    fn product(&self) -> &InnerProduct;

    /// Projects the detailed model onto the current basis.
    fn project(&self) -> anyhow::Result<(Self::Model, Self::Estimator)>;

    /// Offers a snapshot to the basis.
    fn extend(&mut self, snapshot: MatRef<'_, f64>) -> anyhow::Result<ExtensionOutcome>;

    /// Maps reduced coefficients to the detailed space.
    fn reconstruct(&self, coefficients: MatRef<'_, f64>) -> Mat<f64>;
}

/// Galerkin projection of a [`StationaryAffineModel`].
#[derive(Debug, Clone)]
pub struct ReducedStationaryModel {
    affine: StationaryAffineModel,
}

impl ReducedStationaryModel {
    /// The projected affine decomposition.
    pub fn affine(&self) -> &StationaryAffineModel {
        &self.affine
    }
}

impl ReducedModel for ReducedStationaryModel {
    fn dim(&self) -> usize {
        self.affine.dim()
    }

    fn solve(&self, mu: &Parameter) -> anyhow::Result<Mat<f64>> {
        if self.dim() == 0 {
            mu.check_type(self.affine.parameter_type())?;
            return Ok(Mat::zeros(0, 1));
        }
        self.affine.solve_system(mu, "reduced")
    }
}

/// How the dual norm of the residual is split into offline and online parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResidualMethod {
    /// Project onto an orthonormal basis of the residual range.
    #[default]
    ResidualBasis,
    /// Evaluate the quadratic form of the residual Gram matrix.
    Traditional,
}

/// Relative drop tolerance when orthonormalizing the residual range.
const RESIDUAL_RANGE_RTOL: f64 = 1e-14;

/// Offline data of the residual norm.
#[derive(Debug, Clone)]
enum ResidualOperator {
    /// `C = Wᵀ X R`; the norm is `‖C c‖₂`.
    Projected(Mat<f64>),
    /// `G = Rᵀ X R`; the norm is `sqrt(cᵀ G c)`.
    Gram(Mat<f64>),
}

/// Residual based error estimator for [`ReducedStationaryModel`]s.
#[derive(Debug, Clone)]
pub struct ResidualErrorEstimator {
    rhs_coefficients: Vec<ParameterFunctional>,
    operator_coefficients: Vec<ParameterFunctional>,
    coercivity: ParameterFunctional,
    basis_len: usize,
    components: usize,
    residual: ResidualOperator,
}

impl ResidualErrorEstimator {
    pub fn method(&self) -> ResidualMethod {
        match self.residual {
            ResidualOperator::Projected(_) => ResidualMethod::ResidualBasis,
            ResidualOperator::Gram(_) => ResidualMethod::Traditional,
        }
    }

    /// Dual norm of the residual of the reduced solution `u_n`.
    pub fn residual_norm(&self, mu: &Parameter, u_n: MatRef<'_, f64>) -> f64 {
        let (p, n) = (self.rhs_coefficients.len(), self.basis_len);
        let mut c = Mat::<f64>::zeros(self.components, 1);
        for (i, phi) in self.rhs_coefficients.iter().enumerate() {
            c[(i, 0)] = phi.evaluate(mu);
        }
        for (q, theta) in self.operator_coefficients.iter().enumerate() {
            let theta = theta.evaluate(mu);
            for j in 0..n {
                c[(p + q * n + j, 0)] = -theta * u_n[(j, 0)];
            }
        }
        match &self.residual {
            ResidualOperator::Projected(projected) => (projected * &c).norm_l2(),
            ResidualOperator::Gram(gram) => {
                let gc = gram * &c;
                let squared = (c.transpose() * gc.as_ref())[(0, 0)];
                // Cancellation can push the quadratic form slightly below zero.
                squared.max(0.0).sqrt()
            }
        }
    }
}

impl ErrorEstimator<ReducedStationaryModel> for ResidualErrorEstimator {
    fn estimate(&self, mu: &Parameter, model: &ReducedStationaryModel) -> anyhow::Result<f64> {
        ensure!(
            model.dim() == self.basis_len,
            "estimator was built for a basis of size {} but the reduced model has dimension {}",
            self.basis_len,
            model.dim()
        );
        let u_n = model.solve(mu)?;
        let alpha = self.coercivity.evaluate(mu);
        ensure!(
            alpha > 0.0 && alpha.is_finite(),
            "coercivity lower bound {alpha} at {mu} is not positive"
        );
        Ok(self.residual_norm(mu, u_n.as_ref()) / alpha)
    }
}

/// Reduced basis reductor for coercive stationary affine problems.
#[derive(Debug, Clone)]
pub struct CoerciveRbReductor<'a> {
    model: &'a StationaryAffineModel,
    product: InnerProduct,
    coercivity: ParameterFunctional,
    basis: Basis,
    gram_schmidt: GramSchmidtOptions,
    residual_method: ResidualMethod,
}

impl<'a> CoerciveRbReductor<'a> {
    /// Creates a reductor with an empty basis.
    ///
    /// # Arguments
    /// * `model`: The detailed affine model.
    /// * `product`: Inner product for orthonormalization and error measurement.
    /// * `coercivity`: A positive lower bound of the coercivity constant of `A(μ)`
    ///   with respect to `product`.
    pub fn new(
        model: &'a StationaryAffineModel,
        product: InnerProduct,
        coercivity: ParameterFunctional,
    ) -> Result<Self, GreedyError> {
        if let Some(dim) = product.dim().filter(|&d| d != model.dim()) {
            return Err(GreedyErrorKind::DimensionMismatch {
                basis_dim: model.dim(),
                vector_dim: dim,
            }
            .into());
        }
        Ok(Self {
            model,
            product,
            coercivity,
            basis: Basis::new(model.dim()),
            gram_schmidt: GramSchmidtOptions::default(),
            residual_method: ResidualMethod::default(),
        })
    }

    pub fn with_gram_schmidt_options(mut self, options: GramSchmidtOptions) -> Self {
        self.gram_schmidt = options;
        self
    }

    /// Selects how the estimator evaluates the dual residual norm.
    pub fn with_residual_method(mut self, method: ResidualMethod) -> Self {
        self.residual_method = method;
        self
    }

    pub fn model(&self) -> &StationaryAffineModel {
        self.model
    }

    /// All residual components `[f_1 … f_P, A_1 V … A_Q V]` as columns.
    fn residual_components(&self) -> Mat<f64> {
        let n = self.model.dim();
        let v = self.basis.as_ref();
        let rhs = self.model.rhs_terms();
        let applied: Vec<Mat<f64>> = self
            .model
            .operator_terms()
            .iter()
            .map(|t| t.matrix.as_ref() * v)
            .collect();
        let (p, k) = (rhs.len(), self.basis.len());
        Mat::from_fn(n, p + applied.len() * k, |i, j| {
            if j < p {
                rhs[j].matrix[(i, 0)]
            } else {
                let (q, col) = ((j - p) / k, (j - p) % k);
                applied[q][(i, col)]
            }
        })
    }

    /// An orthonormal basis of the span of the Riesz representatives.
    fn residual_range(&self, riesz: MatRef<'_, f64>) -> Result<Basis, GreedyError> {
        let options = GramSchmidtOptions {
            rtol: RESIDUAL_RANGE_RTOL,
            ..self.gram_schmidt
        };
        let mut range = Basis::new(riesz.nrows());
        for j in 0..riesz.ncols() {
            gram_schmidt_extend(&mut range, riesz.get(.., j..j + 1), &self.product, &options)?;
        }
        Ok(range)
    }
}

impl Reductor for CoerciveRbReductor<'_> {
    type Model = ReducedStationaryModel;
    type Estimator = ResidualErrorEstimator;

    fn basis(&self) -> &Basis {
        &self.basis
    }

    fn product(&self) -> &InnerProduct {
        &self.product
    }

    fn project(&self) -> anyhow::Result<(ReducedStationaryModel, ResidualErrorEstimator)> {
        let v = self.basis.as_ref();
        let operators = self
            .model
            .operator_terms()
            .iter()
            .map(|t| {
                let projected = v.transpose() * (t.matrix.as_ref() * v).as_ref();
                AffineTerm::new(projected, t.coefficient.clone())
            })
            .collect();
        let rhs = self
            .model
            .rhs_terms()
            .iter()
            .map(|t| AffineTerm::new(v.transpose() * t.matrix.as_ref(), t.coefficient.clone()))
            .collect();
        let affine =
            StationaryAffineModel::new(self.model.parameter_type().clone(), operators, rhs)
                .context("projected model is inconsistent")?;

        let components = self.residual_components();
        let riesz = self.product.riesz_representatives(components.as_ref());
        let residual = match self.residual_method {
            ResidualMethod::ResidualBasis => {
                let range = self.residual_range(riesz.as_ref())?;
                log::debug!(
                    "Residual range of dimension {} for {} components.",
                    range.len(),
                    riesz.ncols()
                );
                ResidualOperator::Projected(self.product.gram(range.as_ref(), riesz.as_ref()))
            }
            ResidualMethod::Traditional => {
                ResidualOperator::Gram(components.transpose() * riesz.as_ref())
            }
        };

        log::debug!(
            "Projected onto basis of size {} ({} residual components).",
            self.basis.len(),
            components.ncols()
        );

        let estimator = ResidualErrorEstimator {
            rhs_coefficients: self
                .model
                .rhs_terms()
                .iter()
                .map(|t| t.coefficient.clone())
                .collect(),
            operator_coefficients: self
                .model
                .operator_terms()
                .iter()
                .map(|t| t.coefficient.clone())
                .collect(),
            coercivity: self.coercivity.clone(),
            basis_len: self.basis.len(),
            components: components.ncols(),
            residual,
        };
        Ok((ReducedStationaryModel { affine }, estimator))
    }

    fn extend(&mut self, snapshot: MatRef<'_, f64>) -> anyhow::Result<ExtensionOutcome> {
        Ok(gram_schmidt_extend(
            &mut self.basis,
            snapshot,
            &self.product,
            &self.gram_schmidt,
        )?)
    }

    fn reconstruct(&self, coefficients: MatRef<'_, f64>) -> Mat<f64> {
        self.basis.reconstruct(coefficients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ParameterType;
    use faer::mat;

    fn ty() -> ParameterType {
        ParameterType::new([("mu", vec![2])])
    }

    fn mu(a: f64, b: f64) -> Parameter {
        Parameter::new(&ty(), [("mu", vec![a, b])]).unwrap()
    }

    /// A(μ) = μ_0 A_0 + μ_1 A_1 with SPD diagonal blocks, f = (1, 2, 3)ᵀ.
    fn model() -> StationaryAffineModel {
        let a0: Mat<f64> = mat![[2.0, -1.0, 0.0], [-1.0, 2.0, 0.0], [0.0, 0.0, 1.0]];
        let a1: Mat<f64> = mat![[1.0, 0.0, 0.0], [0.0, 1.0, -0.5], [0.0, -0.5, 1.0]];
        let f: Mat<f64> = mat![[1.0], [2.0], [3.0]];
        StationaryAffineModel::new(
            ty(),
            vec![
                AffineTerm::new(a0, ParameterFunctional::component("mu", 0)),
                AffineTerm::new(a1, ParameterFunctional::component("mu", 1)),
            ],
            vec![AffineTerm::new(f, ParameterFunctional::constant(1.0))],
        )
        .unwrap()
    }

    fn coercivity() -> ParameterFunctional {
        // λ_min(A_0) = 1, λ_min(A_1) = 0.5.
        ParameterFunctional::new(|mu| {
            mu.component("mu", 0).unwrap_or(0.0) + 0.5 * mu.component("mu", 1).unwrap_or(0.0)
        })
    }

    #[test]
    fn test_empty_basis_projection() {
        let model = model();
        let reductor = CoerciveRbReductor::new(&model, InnerProduct::Euclidean, coercivity()).unwrap();
        let (rom, estimator) = reductor.project().unwrap();
        assert_eq!(rom.dim(), 0);
        let u_n = rom.solve(&mu(1.0, 1.0)).unwrap();
        assert_eq!(u_n.nrows(), 0);
        // With no basis the residual is f itself.
        let estimate = estimator.estimate(&mu(1.0, 1.0), &rom).unwrap();
        let expected = 14.0_f64.sqrt() / 1.5;
        assert!((estimate - expected).abs() < 1e-12);
    }

    #[test]
    fn test_estimator_bounds_true_error_and_vanishes_on_snapshots() {
        let model = model();
        let mut reductor =
            CoerciveRbReductor::new(&model, InnerProduct::Euclidean, coercivity()).unwrap();
        let snapshot_mu = mu(1.0, 0.5);
        let snapshot = model.solve(&snapshot_mu).unwrap();
        assert!(reductor.extend(snapshot.as_ref()).unwrap().is_extended());
        let (rom, estimator) = reductor.project().unwrap();
        assert_eq!(rom.dim(), 1);

        // The snapshot parameter is reproduced exactly.
        let at_snapshot = estimator.estimate(&snapshot_mu, &rom).unwrap();
        assert!(at_snapshot < 1e-6);

        for other in [mu(0.2, 1.0), mu(1.0, 1.0), mu(0.5, 0.1)] {
            let u = model.solve(&other).unwrap();
            let u_n = rom.solve(&other).unwrap();
            let u_rb = reductor.reconstruct(u_n.as_ref());
            let error = InnerProduct::Euclidean.norm((&u - &u_rb).as_ref());
            let estimate = estimator.estimate(&other, &rom).unwrap();
            assert!(estimate + 1e-12 >= error, "estimate {estimate} < error {error}");
        }
    }

    #[test]
    fn test_estimate_is_idempotent() {
        let model = model();
        let mut reductor =
            CoerciveRbReductor::new(&model, InnerProduct::Euclidean, coercivity()).unwrap();
        let snapshot = model.solve(&mu(0.3, 0.7)).unwrap();
        reductor.extend(snapshot.as_ref()).unwrap();
        let (rom, estimator) = reductor.project().unwrap();
        let target = mu(0.9, 0.2);
        let first = estimator.estimate(&target, &rom).unwrap();
        let second = estimator.estimate(&target, &rom).unwrap();
        assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn test_residual_methods_agree_away_from_snapshots() {
        let model = model();
        let snapshot = model.solve(&mu(1.0, 0.5)).unwrap();
        let mut by_range = CoerciveRbReductor::new(&model, InnerProduct::Euclidean, coercivity())
            .unwrap();
        let mut by_gram = CoerciveRbReductor::new(&model, InnerProduct::Euclidean, coercivity())
            .unwrap()
            .with_residual_method(ResidualMethod::Traditional);
        by_range.extend(snapshot.as_ref()).unwrap();
        by_gram.extend(snapshot.as_ref()).unwrap();
        let (rom, range_estimator) = by_range.project().unwrap();
        let (_, gram_estimator) = by_gram.project().unwrap();
        assert_eq!(range_estimator.method(), ResidualMethod::ResidualBasis);
        assert_eq!(gram_estimator.method(), ResidualMethod::Traditional);

        for target in [mu(0.2, 1.0), mu(1.0, 1.0), mu(0.5, 0.1)] {
            let a = range_estimator.estimate(&target, &rom).unwrap();
            let b = gram_estimator.estimate(&target, &rom).unwrap();
            assert!((a - b).abs() <= 1e-8 * b, "{a} vs {b}");
        }
    }

    #[test]
    fn test_residual_basis_estimate_resolves_round_off() {
        let model = model();
        let snapshot_mu = mu(0.7, 0.3);
        let snapshot = model.solve(&snapshot_mu).unwrap();
        let mut reductor =
            CoerciveRbReductor::new(&model, InnerProduct::Euclidean, coercivity()).unwrap();
        reductor.extend(snapshot.as_ref()).unwrap();
        let (rom, estimator) = reductor.project().unwrap();
        let estimate = estimator.estimate(&snapshot_mu, &rom).unwrap();
        assert!(estimate < 1e-11, "estimate {estimate} at the snapshot parameter");
    }

    #[test]
    fn test_singular_reduced_operator_is_reported_as_reduced() {
        let model = model();
        let mut reductor =
            CoerciveRbReductor::new(&model, InnerProduct::Euclidean, coercivity()).unwrap();
        let snapshot = model.solve(&mu(1.0, 1.0)).unwrap();
        reductor.extend(snapshot.as_ref()).unwrap();
        let (rom, _) = reductor.project().unwrap();
        // Both coefficients vanish, so the projected operator is zero.
        let err = rom.solve(&mu(0.0, 0.0)).unwrap_err();
        assert_eq!(err.to_string(), "reduced operator is singular");
    }

    #[test]
    fn test_product_dimension_must_match() {
        let model = model();
        let product = InnerProduct::Matrix(Mat::<f64>::identity(4, 4));
        assert!(CoerciveRbReductor::new(&model, product, coercivity()).is_err());
    }

    #[test]
    fn test_estimator_rejects_non_positive_coercivity() {
        let model = model();
        let reductor = CoerciveRbReductor::new(
            &model,
            InnerProduct::Euclidean,
            ParameterFunctional::constant(0.0),
        )
        .unwrap();
        let (rom, estimator) = reductor.project().unwrap();
        assert!(estimator.estimate(&mu(1.0, 1.0), &rom).is_err());
    }
}
