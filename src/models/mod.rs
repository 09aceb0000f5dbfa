//! Physical and signal models.
//!
//! Models are implemented as small, pure functions so that fitting and analysis
//! code can stay generic:
//!
//! - `qnm`: Kerr quasi-normal-mode frequencies and damping times
//! - `ringdown`: the damped-sinusoid template and its derivatives

pub mod qnm;
pub mod ringdown;

pub use qnm::*;
pub use ringdown::*;
