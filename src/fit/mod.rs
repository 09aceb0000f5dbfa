//! Ringdown fitting.
//!
//! Responsibilities:
//!
//! - generate the deterministic `(τ, f)` seed grid
//! - evaluate each grid point (parallel)
//! - refine with bounded Levenberg–Marquardt and report uncertainties

pub mod fitter;
pub mod grid;

pub use fitter::*;
pub use grid::*;
