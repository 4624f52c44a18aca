//! Helpers shared by the binaries and the tests.
//!
//! - **`thermal_block`**: A one-dimensional thermal block problem with an affine
//!   decomposition and known coercivity bounds, used as the reference problem.

pub mod thermal_block;
