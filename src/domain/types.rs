//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during preprocessing and fitting
//! - cached to disk between runs
//! - exported to JSON/CSV summaries

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Interferometer that recorded the strain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
pub enum Detector {
    #[value(name = "H1")]
    H1,
    #[value(name = "L1")]
    L1,
    #[value(name = "V1")]
    V1,
}

impl Detector {
    pub fn as_str(self) -> &'static str {
        match self {
            Detector::H1 => "H1",
            Detector::L1 => "L1",
            Detector::V1 => "V1",
        }
    }
}

impl std::fmt::Display for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compact-binary source class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Bbh,
    Bns,
    Nsbh,
}

/// Where the merger sits inside a strain segment.
///
/// The two forms are never inferred from magnitude: a caller either knows the
/// sample index (e.g. from the peak finder) or an absolute GPS time (e.g. from
/// the catalog), and says which.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergerRef {
    Index(u64),
    GpsTime(f64),
}

/// One catalog entry. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub gps_time: f64,
    /// Remnant mass (solar masses).
    pub final_mass: f64,
    /// Dimensionless remnant spin, 0..=0.998.
    pub final_spin: f64,
    /// Orbital inclination θ_jn (radians), when known.
    #[serde(default)]
    pub inclination: Option<f64>,
    #[serde(default)]
    pub distance_mpc: Option<f64>,
    /// Network SNR per detector that observed the event.
    #[serde(default)]
    pub snr: BTreeMap<Detector, f64>,
    #[serde(default)]
    pub kind: SourceKind,
}

impl Event {
    pub fn observed_by(&self, detector: Detector) -> bool {
        self.snr.is_empty() || self.snr.contains_key(&detector)
    }

    /// Minimal catalog entry describing a prepared package.
    pub fn from_package(package: &DataPackage) -> Self {
        Self {
            name: package.event_name.clone(),
            gps_time: package.merger_gps,
            final_mass: package.final_mass,
            final_spin: package.final_spin,
            inclination: package.inclination,
            distance_mpc: None,
            snr: BTreeMap::new(),
            kind: SourceKind::default(),
        }
    }
}

/// A uniformly sampled strain time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrainSegment {
    /// GPS time of the first sample.
    pub t0: f64,
    pub sample_rate: f64,
    pub data: Vec<f64>,
}

impl StrainSegment {
    pub fn new(t0: f64, sample_rate: f64, data: Vec<f64>) -> Result<Self, AppError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(AppError::data(format!("Invalid sample rate: {sample_rate}")));
        }
        if !t0.is_finite() {
            return Err(AppError::data("Segment start time must be finite."));
        }
        Ok(Self {
            t0,
            sample_rate,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dt(&self) -> f64 {
        1.0 / self.sample_rate
    }

    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.sample_rate
    }

    /// GPS time of sample `idx`.
    pub fn time_at(&self, idx: usize) -> f64 {
        self.t0 + idx as f64 / self.sample_rate
    }

    /// Nearest sample index for a GPS time, or `None` outside the segment.
    pub fn index_of_gps(&self, gps: f64) -> Option<usize> {
        if self.data.is_empty() || !gps.is_finite() {
            return None;
        }
        let pos = ((gps - self.t0) * self.sample_rate).round();
        if pos < 0.0 || pos >= self.data.len() as f64 {
            return None;
        }
        Some(pos as usize)
    }

    /// Resolve a merger reference to a sample index inside this segment.
    pub fn merger_index(&self, merger: MergerRef) -> Result<usize, AppError> {
        match merger {
            MergerRef::Index(idx) => {
                let idx = usize::try_from(idx)
                    .map_err(|_| AppError::data(format!("Merger index {idx} does not fit in memory.")))?;
                if idx >= self.data.len() {
                    return Err(AppError::data(format!(
                        "Merger index {idx} is outside the segment ({} samples).",
                        self.data.len()
                    )));
                }
                Ok(idx)
            }
            MergerRef::GpsTime(gps) => self.index_of_gps(gps).ok_or_else(|| {
                AppError::data(format!(
                    "Merger GPS time {gps:.4} is outside the segment [{:.4}, {:.4}).",
                    self.t0,
                    self.time_at(self.data.len())
                ))
            }),
        }
    }

    /// Samples in `[start, end)` as a new segment, clamped to the data.
    pub fn slice(&self, start: usize, end: usize) -> StrainSegment {
        let end = end.min(self.data.len());
        let start = start.min(end);
        StrainSegment {
            t0: self.time_at(start),
            sample_rate: self.sample_rate,
            data: self.data[start..end].to_vec(),
        }
    }

    /// Crop to the GPS interval `[start, end)`.
    pub fn crop_gps(&self, start: f64, end: f64) -> StrainSegment {
        let to_idx = |t: f64| -> usize {
            let pos = ((t - self.t0) * self.sample_rate).round();
            if pos <= 0.0 { 0 } else { (pos as usize).min(self.data.len()) }
        };
        self.slice(to_idx(start), to_idx(end))
    }
}

/// A parameter estimate with its 1σ uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Estimate {
    pub value: f64,
    pub sigma: f64,
}

/// Fitted parameters of one damped-sinusoid mode.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModeFit {
    pub amplitude: Estimate,
    /// Damping time τ (seconds).
    pub damping_time: Estimate,
    /// Frequency (Hz).
    pub frequency: Estimate,
    /// Phase (radians).
    pub phase: Estimate,
}

/// Outcome of a ringdown fit. `success == false` is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RingdownFit {
    pub success: bool,
    pub message: String,
    pub modes: Vec<ModeFit>,
    pub sse: f64,
    pub n_samples: usize,
    pub iterations: usize,
}

impl RingdownFit {
    pub fn failed(message: impl Into<String>, n_samples: usize) -> Self {
        Self {
            success: false,
            message: message.into(),
            n_samples,
            ..Self::default()
        }
    }

    /// First mode of a successful fit.
    pub fn fundamental(&self) -> Option<&ModeFit> {
        if self.success { self.modes.first() } else { None }
    }
}

/// A preprocessed, merger-centred strain segment ready for analysis.
///
/// This is what `prepare` writes to the cache and what every analysis reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPackage {
    pub event_name: String,
    pub detector: Detector,
    pub strain: StrainSegment,
    /// Sample index of the merger peak inside `strain`.
    pub merger_index: u64,
    pub merger_gps: f64,
    pub final_mass: f64,
    pub final_spin: f64,
    #[serde(default)]
    pub inclination: Option<f64>,
    pub quality_passed: bool,
    pub created: DateTime<Utc>,
}

impl DataPackage {
    pub fn merger(&self) -> MergerRef {
        MergerRef::Index(self.merger_index)
    }
}

/// Knobs for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub detector: Detector,
    pub sample_rate: u32,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub catalog: Option<PathBuf>,
    pub download_params: bool,
    pub fetch: bool,
    pub min_priority: Option<f64>,
    pub plots: bool,

    /// Seconds of raw strain fetched around the event.
    pub fetch_duration: f64,
    /// Half-width (s) of the merger-centred crop kept after preprocessing.
    pub crop_half_width: f64,
    pub bandpass: (f64, f64),
    pub bandpass_order: usize,
    pub min_post_merger: f64,

    /// Early-ringdown window (s after merger) for the frequency-jump test.
    pub early_window: (f64, f64),
    pub jump_tolerance: f64,
    /// Window (s after merger) for the damped-sinusoid fit.
    pub fit_window: (f64, f64),
    pub prony_duration: f64,
    pub n_modes: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            detector: Detector::H1,
            sample_rate: 4096,
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("analysis_results"),
            catalog: None,
            download_params: false,
            fetch: true,
            min_priority: None,
            plots: true,
            fetch_duration: 32.0,
            crop_half_width: 0.15,
            bandpass: (20.0, 400.0),
            bandpass_order: 8,
            min_post_merger: 0.05,
            early_window: (0.0, 0.05),
            jump_tolerance: 0.05,
            fit_window: (0.003, 0.04),
            prony_duration: 0.03,
            n_modes: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment() -> StrainSegment {
        StrainSegment::new(1000.0, 100.0, vec![0.0; 200]).unwrap()
    }

    #[test]
    fn merger_index_resolves_both_forms() {
        let s = segment();
        assert_eq!(s.merger_index(MergerRef::Index(150)).unwrap(), 150);
        assert_eq!(s.merger_index(MergerRef::GpsTime(1001.5)).unwrap(), 150);
    }

    #[test]
    fn merger_index_rejects_out_of_range() {
        let s = segment();
        assert!(s.merger_index(MergerRef::Index(200)).is_err());
        assert!(s.merger_index(MergerRef::GpsTime(999.0)).is_err());
        assert!(s.merger_index(MergerRef::GpsTime(1003.0)).is_err());
    }

    #[test]
    fn small_gps_times_are_not_mistaken_for_indices() {
        // An index smaller than the array length must stay an index even when
        // the segment itself starts at a tiny GPS time.
        let s = StrainSegment::new(0.0, 4096.0, vec![0.0; 8192]).unwrap();
        assert_eq!(s.merger_index(MergerRef::Index(10)).unwrap(), 10);
        assert_eq!(s.merger_index(MergerRef::GpsTime(1.0)).unwrap(), 4096);
    }

    #[test]
    fn crop_gps_moves_start_time() {
        let s = segment();
        let c = s.crop_gps(1000.5, 1001.0);
        assert_eq!(c.len(), 50);
        assert!((c.t0 - 1000.5).abs() < 1e-12);
    }

    #[test]
    fn detector_keys_serialize_as_strings() {
        let mut snr = BTreeMap::new();
        snr.insert(Detector::H1, 24.0);
        let json = serde_json::to_string(&snr).unwrap();
        assert_eq!(json, r#"{"H1":24.0}"#);
    }
}
