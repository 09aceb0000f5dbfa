//! Post-merger analyses built on a preprocessed strain segment.

pub mod overtone;
pub mod spin;
pub mod stacker;
pub mod time_frequency;

pub use overtone::{OvertoneAnalyzer, OvertoneRatioTest, PronyMode};
pub use spin::{KerrPrediction, Priority, ResonanceSummary, SpinCorrectedResult, event_priority, spin_corrected_fit};
pub use stacker::{EventMetrics, MassDependence, Metric, MultiEventStacker};
pub use time_frequency::{FrequencyTrack, JumpResult, TimeFrequencyAnalyzer};
