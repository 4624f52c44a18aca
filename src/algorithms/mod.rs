//! Core algorithms of the reduced basis method.
//!
//! - [`gram_schmidt`]: orthonormal basis extension with re-orthogonalization and
//!   detection of linearly dependent snapshots.
//! - [`greedy`]: the greedy basis generation loop.
//! - [`error_analysis`]: validation of a reduced model on a test set.

pub mod error_analysis;
pub mod gram_schmidt;
pub mod greedy;
