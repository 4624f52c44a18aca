//! A one-dimensional thermal block problem.
//!
//! The stationary heat equation `−(κ(x; μ) u')' = 1` on `(0, 1)` with
//! homogeneous Dirichlet boundary values, where the unit interval is split into
//! `B` equally sized blocks and the conductivity on block `b` is the parameter
//! entry `μ_b ∈ [0.1, 1]`. The problem is discretized with second order finite
//! differences on `n` interior points, which gives an affine decomposition with
//! one operator term per block:
//!
//! ```text
//! A(μ) = Σ_b μ_b A_b,    f = (1, …, 1)ᵀ.
//! ```
//!
//! Each edge between two neighboring grid points contributes to the block
//! containing its midpoint, so `Σ_b A_b` is the standard finite difference
//! Laplacian. That sum is also the matrix of the H¹₀ semi product.
//!
//! The problem is small, cheap and coercive with explicitly known coercivity
//! bounds, which makes it the reference problem for the binaries and the tests.

use crate::{
    error::{GreedyError, GreedyErrorKind},
    model::{AffineTerm, ParameterFunctional, StationaryAffineModel},
    parameters::{Parameter, ParameterError, ParameterSpace, ParameterType},
    product::InnerProduct,
};
use faer::Mat;
use std::f64::consts::PI;

/// Name of the parameter component holding the block conductivities.
pub const DIFFUSION: &str = "diffusion";

/// Lower end of the conductivity range.
pub const MIN_DIFFUSION: f64 = 0.1;

/// Upper end of the conductivity range.
pub const MAX_DIFFUSION: f64 = 1.0;

/// Which inner product to orthonormalize in and measure errors with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductKind {
    Euclidean,
    H1Semi,
}

/// Problem definition: number of blocks and grid resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThermalBlock1d {
    blocks: usize,
    interior_points: usize,
}

impl ThermalBlock1d {
    /// Needs at least one block and at least one grid point per block.
    pub fn new(blocks: usize, interior_points: usize) -> Result<Self, GreedyError> {
        if blocks == 0 || interior_points < blocks {
            return Err(GreedyErrorKind::InvalidOption(format!(
                "thermal block needs 1 <= blocks <= interior points, got {blocks} blocks and {interior_points} points"
            ))
            .into());
        }
        Ok(Self {
            blocks,
            interior_points,
        })
    }

    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Dimension of the discrete problem.
    pub fn dim(&self) -> usize {
        self.interior_points
    }

    /// Mesh width `h = 1 / (n + 1)`.
    pub fn mesh_width(&self) -> f64 {
        1.0 / (self.interior_points + 1) as f64
    }

    pub fn parameter_type(&self) -> ParameterType {
        ParameterType::new([(DIFFUSION, vec![self.blocks])])
    }

    /// The box `[0.1, 1]^B`.
    pub fn parameter_space(&self) -> Result<ParameterSpace, ParameterError> {
        ParameterSpace::new(self.parameter_type(), MIN_DIFFUSION, MAX_DIFFUSION)
    }

    /// The parameter with the given block conductivities.
    pub fn parameter(&self, diffusion: &[f64]) -> Result<Parameter, ParameterError> {
        Parameter::new(&self.parameter_type(), [(DIFFUSION, diffusion.to_vec())])
    }

    /// Finite difference stiffness matrix of block `block` with unit conductivity.
    pub fn block_operator(&self, block: usize) -> Mat<f64> {
        let n = self.interior_points;
        let h = self.mesh_width();
        let scale = 1.0 / (h * h);
        let mut a = Mat::<f64>::zeros(n, n);

        // Edge `e` joins grid nodes `e` and `e + 1`; nodes 0 and n + 1 lie on the
        // boundary and carry no unknown.
        for e in 0..=n {
            let midpoint = (e as f64 + 0.5) * h;
            let owner = ((midpoint * self.blocks as f64) as usize).min(self.blocks - 1);
            if owner != block {
                continue;
            }
            let left = e.checked_sub(1);
            let right = (e < n).then_some(e);
            if let Some(i) = left {
                a[(i, i)] += scale;
            }
            if let Some(j) = right {
                a[(j, j)] += scale;
            }
            if let (Some(i), Some(j)) = (left, right) {
                a[(i, j)] -= scale;
                a[(j, i)] -= scale;
            }
        }
        a
    }

    /// The affine model `Σ_b μ_b A_b u = 1`.
    pub fn model(&self) -> Result<StationaryAffineModel, GreedyError> {
        let operators = (0..self.blocks)
            .map(|b| {
                AffineTerm::new(
                    self.block_operator(b),
                    ParameterFunctional::component(DIFFUSION, b),
                )
            })
            .collect();
        let rhs = vec![AffineTerm::new(
            Mat::from_fn(self.interior_points, 1, |_, _| 1.0),
            ParameterFunctional::constant(1.0),
        )];
        StationaryAffineModel::new(self.parameter_type(), operators, rhs)
    }

    /// The finite difference Laplacian `Σ_b A_b`.
    pub fn h1_semi_matrix(&self) -> Mat<f64> {
        let n = self.interior_points;
        let blocks: Vec<Mat<f64>> = (0..self.blocks).map(|b| self.block_operator(b)).collect();
        Mat::from_fn(n, n, |i, j| blocks.iter().map(|a| a[(i, j)]).sum::<f64>())
    }

    pub fn product(&self, kind: ProductKind) -> InnerProduct {
        match kind {
            ProductKind::Euclidean => InnerProduct::Euclidean,
            ProductKind::H1Semi => InnerProduct::Matrix(self.h1_semi_matrix()),
        }
    }

    /// Smallest eigenvalue `4/h² sin²(πh/2)` of the finite difference Laplacian.
    pub fn laplacian_min_eigenvalue(&self) -> f64 {
        let h = self.mesh_width();
        4.0 / (h * h) * (PI * h / 2.0).sin().powi(2)
    }

    /// A lower bound of the coercivity constant of `A(μ)` in the given product.
    ///
    /// `A(μ) ≥ min_b μ_b · Σ_b A_b` in the sense of quadratic forms, so the bound
    /// is `min_b μ_b` for the H¹₀ semi product and `min_b μ_b · λ_min` for the
    /// Euclidean product.
    pub fn coercivity_lower_bound(&self, kind: ProductKind) -> ParameterFunctional {
        let factor = match kind {
            ProductKind::Euclidean => self.laplacian_min_eigenvalue(),
            ProductKind::H1Semi => 1.0,
        };
        ParameterFunctional::new(move |mu| {
            let min = mu
                .get(DIFFUSION)
                .map(|d| d.iter().copied().fold(f64::INFINITY, f64::min))
                .unwrap_or(f64::NAN);
            factor * min
        })
    }
}
