//! Greedy reduction of the one-dimensional thermal block problem.
//!
//! This executable builds the thermal block model, runs the greedy basis
//! generation on a uniform training grid, validates the resulting reduced model on
//! a finer test grid and writes the per-iteration greedy errors to a CSV file.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use reduced_basis::{
    CachedSolver, CoerciveRbReductor, GreedyOptions, IterationAction, Reductor, ResidualMethod,
    TrainingSet, greedy, reduction_error_analysis,
    utils::thermal_block::{ProductKind, ThermalBlock1d},
};
use serde::Serialize;
use std::path::PathBuf;

/// Inner product used for orthonormalization and error measurement.
#[derive(ValueEnum, Clone, Debug, Copy)]
enum Product {
    /// The Euclidean product of the coefficient vectors.
    Euclidean,
    /// The H¹₀ semi product, the energy norm for unit conductivity.
    H1,
}

impl From<Product> for ProductKind {
    fn from(product: Product) -> Self {
        match product {
            Product::Euclidean => ProductKind::Euclidean,
            Product::H1 => ProductKind::H1Semi,
        }
    }
}

/// Offline/online splitting of the residual norm in the error estimator.
#[derive(ValueEnum, Clone, Debug, Copy)]
enum ReductorKind {
    /// Orthonormal basis of the residual range; accurate down to round-off.
    ResidualBasis,
    /// Gram matrix of the residual components; stagnates near sqrt(eps).
    Traditional,
}

impl From<ReductorKind> for ResidualMethod {
    fn from(kind: ReductorKind) -> Self {
        match kind {
            ReductorKind::ResidualBasis => ResidualMethod::ResidualBasis,
            ReductorKind::Traditional => ResidualMethod::Traditional,
        }
    }
}

/// Command-line arguments for the thermal block demo.
#[derive(Parser, Debug)]
#[clap(
    name = "thermalblock",
    about = "Reduces a 1D thermal block problem with the greedy reduced basis method."
)]
struct ThermalBlockArgs {
    /// Maximum size of the reduced basis.
    #[clap(long, default_value_t = 10)]
    rb_size: usize,
    /// Stop once the maximum greedy error is below this value.
    #[clap(long)]
    tolerance: Option<f64>,
    /// Use true errors instead of the residual estimator during the greedy search.
    #[clap(long)]
    without_estimator: bool,
    /// Inner product for the basis and the error norm.
    #[clap(long, value_enum, default_value_t = Product::H1)]
    product: Product,
    /// How the error estimator evaluates residual norms.
    #[clap(long, value_enum, default_value_t = ReductorKind::ResidualBasis)]
    reductor: ReductorKind,
    /// Number of blocks, i.e. the parameter dimension.
    #[clap(long, default_value_t = 2)]
    blocks: usize,
    /// Number of interior grid points.
    #[clap(long, default_value_t = 200)]
    grid: usize,
    /// Training samples per parameter dimension.
    #[clap(long, default_value_t = 10)]
    samples: usize,
    /// Test samples per parameter dimension for the error analysis.
    #[clap(long, default_value_t = 7)]
    test_samples: usize,
    /// Number of worker threads for the error scans; defaults to all cores.
    #[clap(long)]
    workers: Option<usize>,
    /// Path to the output CSV file for the greedy error history.
    #[clap(long, value_name = "PATH")]
    output: Option<PathBuf>,
}

/// One greedy iteration, as written to the output CSV file.
#[derive(Debug, Serialize)]
struct IterationRow {
    iteration: usize,
    basis_size: usize,
    max_error: f64,
    parameter: String,
    action: &'static str,
    elapsed_s: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .try_init()?;
    let args = ThermalBlockArgs::parse();
    log::info!(
        "Thermal block with {} blocks on {} grid points, product {:?}, reductor {:?}.",
        args.blocks,
        args.grid,
        args.product,
        args.reductor
    );

    let problem = ThermalBlock1d::new(args.blocks, args.grid)?;
    let model = problem.model()?;
    let space = problem.parameter_space()?;
    let kind = ProductKind::from(args.product);

    // Exact-error scans solve every training parameter in every iteration.
    let solver = CachedSolver::new(model.clone());
    let mut reductor = CoerciveRbReductor::new(
        &model,
        problem.product(kind),
        problem.coercivity_lower_bound(kind),
    )?
    .with_residual_method(args.reductor.into());

    let training_set = TrainingSet::uniform(&space, args.samples)?;
    let options = GreedyOptions {
        max_extensions: args.rb_size,
        error_tolerance: args.tolerance,
        use_estimator: !args.without_estimator,
        num_workers: args.workers,
    };
    let result = greedy(&solver, &mut reductor, &training_set, &options)?;

    println!(
        "Greedy search: {} extensions, {:?}, {:.3}s",
        result.extensions(),
        result.termination(),
        result.elapsed().as_secs_f64()
    );
    println!(
        "Orthonormality defect of the basis: {:e}",
        reductor.basis().orthonormality_defect(reductor.product())
    );

    let test_set = TrainingSet::uniform(&space, args.test_samples)?;
    let analysis = reduction_error_analysis(
        &solver,
        &reductor,
        result.reduced_model(),
        result.estimator(),
        &test_set,
    )?;
    println!("{analysis}");

    if let Some(path) = &args.output {
        let mut writer = csv::Writer::from_path(path)?;
        for record in result.records() {
            writer.serialize(IterationRow {
                iteration: record.iteration,
                basis_size: record.basis_size,
                max_error: record.max_error,
                parameter: record.parameter.to_string(),
                action: match record.action {
                    IterationAction::Extended => "extended",
                    IterationAction::Dropped => "dropped",
                    IterationAction::Stopped => "stopped",
                },
                elapsed_s: record.elapsed.as_secs_f64(),
            })?;
        }
        writer.flush()?;
        log::info!("Greedy history saved to {:?}.", path);
    }
    Ok(())
}
