//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - catalog entries and detectors (`Event`, `Detector`)
//! - strain containers and merger references (`StrainSegment`, `MergerRef`)
//! - fit outputs (`RingdownFit`, `ModeFit`, `Estimate`)
//! - run configuration (`AnalysisConfig`)

pub mod types;

pub use types::*;
