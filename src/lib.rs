//! Greedy reduced basis generation for parametrized linear problems.
//!
//! This crate builds reduced order models of parametrized problems
//! `A(μ) u(μ) = f(μ)` with the weak greedy algorithm. Starting from an empty
//! basis, the greedy loop scans a finite training set of parameters for the one
//! whose reduced solution is worst, solves the detailed problem there, and adds
//! the orthonormalized snapshot to the basis until a tolerance is met, an
//! extension budget is used up, or the basis stops growing.
//!
//! Built on the [`faer`] linear algebra framework for dense algebra and on
//! [`rayon`] for the parallel error scan over the training set.
//!
//! ## Components
//!
//! **Greedy driver** ([`greedy`]): Generic over a [`DetailedSolver`] producing
//! snapshots and a [`Reductor`] owning the basis. Records the maximum error of
//! every iteration and reports why it stopped ([`Termination`]).
//!
//! **Coercive RB reductor** ([`CoerciveRbReductor`]): Galerkin projection of a
//! [`StationaryAffineModel`] with an offline/online decomposed residual based
//! error estimator. Basis extension uses re-iterated modified Gram–Schmidt
//! ([`algorithms::gram_schmidt`]) in a configurable [`InnerProduct`].
//!
//! **Error analysis** ([`reduction_error_analysis`]): True errors, estimates and
//! effectivities of a reduced model on a test set.
//!
//! ## Example Usage
//!
//! The following example reduces a one-dimensional thermal block problem with two
//! blocks and checks the reduced solution against the detailed one.
//!
//! ```rust
//! use reduced_basis::utils::thermal_block::{ProductKind, ThermalBlock1d};
//! use reduced_basis::{
//!     CoerciveRbReductor, DetailedSolver, GreedyOptions, ReducedModel, Reductor, TrainingSet,
//!     greedy,
//! };
//!
//! let problem = ThermalBlock1d::new(2, 50).unwrap();
//! let model = problem.model().unwrap();
//! let mut reductor = CoerciveRbReductor::new(
//!     &model,
//!     problem.product(ProductKind::H1Semi),
//!     problem.coercivity_lower_bound(ProductKind::H1Semi),
//! )
//! .unwrap();
//!
//! let training_set = TrainingSet::uniform(&problem.parameter_space().unwrap(), 5).unwrap();
//! let options = GreedyOptions {
//!     max_extensions: 4,
//!     error_tolerance: Some(1e-8),
//!     ..Default::default()
//! };
//! let result = greedy(&model, &mut reductor, &training_set, &options).unwrap();
//! assert!(reductor.basis().len() <= 4);
//!
//! // The reduced solution approximates the detailed one at a new parameter.
//! let mu = problem.parameter(&[0.3, 0.7]).unwrap();
//! let u = model.solve(&mu).unwrap();
//! let u_rb = reductor.reconstruct(result.reduced_model().solve(&mu).unwrap().as_ref());
//! let error = reductor.product().norm((&u - &u_rb).as_ref());
//! assert!(error <= reductor.product().norm(u.as_ref()) * 1e-2);
//! ```

pub mod algorithms;
pub mod basis;
pub mod error;
pub mod model;
pub mod parameters;
pub mod product;
pub mod reductors;
pub mod utils;

pub use algorithms::error_analysis::{ErrorAnalysis, reduction_error_analysis};
pub use algorithms::greedy::{
    ErrorRecord, GreedyOptions, GreedyResult, IterationAction, Termination, greedy,
};
pub use basis::{Basis, ExtensionOutcome};
pub use error::GreedyError;
pub use model::{CachedSolver, DetailedSolver, StationaryAffineModel};
pub use parameters::{Parameter, ParameterSpace, ParameterType, TrainingSet};
pub use product::InnerProduct;
pub use reductors::{CoerciveRbReductor, ErrorEstimator, ReducedModel, Reductor, ResidualMethod};
