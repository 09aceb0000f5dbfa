//! `ringdown-anomaly` library crate.
//!
//! Tests binary black-hole ringdowns in gravitational-wave strain for
//! departures from the Kerr quasi-normal-mode spectrum predicted by GR.
//!
//! The binary (`ringdown`) is a thin wrapper around this library so that:
//!
//! - the signal processing and fitting are testable without spawning processes
//! - the pipeline runs the same way on archive data and on synthetic signals
//! - code stays easy to navigate as the analysis grows

pub mod analysis;
pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod dsp;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod preprocess;
pub mod report;
