//! Experiment Runner for Orthogonality Analysis.
//!
//! This executable measures how well Gram–Schmidt basis extension preserves
//! orthonormality as the basis grows. Random vectors with a controlled amount of
//! linear dependence are offered to two bases, one extended with a single
//! orthogonalization pass and one with re-orthogonalization, and the loss of
//! orthonormality `‖I − VᵀXV‖_F` of both is recorded per basis size.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use faer::prelude::*;
use rand::{Rng, SeedableRng, rngs::StdRng};
use reduced_basis::{
    Basis,
    algorithms::gram_schmidt::{GramSchmidtOptions, gram_schmidt_extend},
    utils::thermal_block::{ProductKind, ThermalBlock1d},
};
use serde::Serialize;
use std::path::PathBuf;

/// Defines how the offered vectors are generated.
#[derive(ValueEnum, Clone, Debug, Copy)]
enum VectorScenario {
    /// Independent uniformly random vectors.
    Random,
    /// Random vectors that are small perturbations of the previously offered
    /// vector, which makes the projected residuals suffer from cancellation.
    NearlyDependent,
}

/// Inner product to orthonormalize in.
#[derive(ValueEnum, Clone, Debug, Copy)]
enum Product {
    Euclidean,
    H1,
}

/// Command-line arguments for the orthogonality analysis runner.
#[derive(Parser, Debug)]
#[clap(
    name = "orthogonality-runner",
    about = "Runs an analysis of the orthonormality of Gram-Schmidt extended bases."
)]
struct OrthoArgs {
    /// How the offered vectors are generated.
    #[clap(long, value_enum)]
    scenario: VectorScenario,
    /// Inner product for the orthonormalization.
    #[clap(long, value_enum, default_value_t = Product::Euclidean)]
    product: Product,
    /// Dimension of the vectors.
    #[clap(long, default_value_t = 500)]
    n: usize,
    /// Number of vectors offered to the bases.
    #[clap(long, default_value_t = 100)]
    count: usize,
    /// Relative size of the perturbation in the nearly dependent scenario.
    #[clap(long, default_value_t = 1e-6)]
    perturbation: f64,
    /// Path to the output CSV file where results will be written.
    #[clap(long, value_name = "PATH")]
    output: PathBuf,
}

/// Represents a single row of data in the output CSV file.
#[derive(Debug, Serialize)]
struct OrthogonalityResult {
    /// Number of vectors offered so far.
    offered: usize,
    /// Basis size with a single orthogonalization pass.
    size_single_pass: usize,
    /// Basis size with re-orthogonalization.
    size_reiterated: usize,
    /// Orthonormality loss with a single pass, measured as ||I - V^T X V||_F.
    ortho_loss_single_pass: f64,
    /// Orthonormality loss with re-orthogonalization.
    ortho_loss_reiterated: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .try_init()?;
    let args = OrthoArgs::parse();
    log::info!(
        "Starting orthogonality analysis for scenario: {:?}, product: {:?}",
        args.scenario,
        args.product
    );

    let product = match args.product {
        Product::Euclidean => ThermalBlock1d::new(1, args.n)?.product(ProductKind::Euclidean),
        Product::H1 => ThermalBlock1d::new(1, args.n)?.product(ProductKind::H1Semi),
    };
    let single_pass = GramSchmidtOptions {
        max_reiterations: 0,
        ..Default::default()
    };
    let reiterated = GramSchmidtOptions::default();

    let mut rng = StdRng::seed_from_u64(42); // For reproducible results.
    let mut previous = Mat::from_fn(args.n, 1, |_, _| rng.random::<f64>());
    let mut basis_single = Basis::new(args.n);
    let mut basis_reiterated = Basis::new(args.n);
    let mut writer = csv::Writer::from_path(&args.output)?;

    for offered in 1..=args.count {
        let v = match args.scenario {
            VectorScenario::Random => Mat::from_fn(args.n, 1, |_, _| rng.random::<f64>()),
            VectorScenario::NearlyDependent => Mat::from_fn(args.n, 1, |i, _| {
                previous[(i, 0)] + args.perturbation * (rng.random::<f64>() - 0.5)
            }),
        };
        gram_schmidt_extend(&mut basis_single, v.as_ref(), &product, &single_pass)?;
        gram_schmidt_extend(&mut basis_reiterated, v.as_ref(), &product, &reiterated)?;
        previous = v;

        writer.serialize(OrthogonalityResult {
            offered,
            size_single_pass: basis_single.len(),
            size_reiterated: basis_reiterated.len(),
            ortho_loss_single_pass: basis_single.orthonormality_defect(&product),
            ortho_loss_reiterated: basis_reiterated.orthonormality_defect(&product),
        })?;
    }

    writer.flush()?;
    log::info!(
        "Orthogonality analysis complete. Results saved to {:?}.",
        &args.output
    );
    Ok(())
}
