//! Synthetic merger-plus-ringdown strain for offline runs and tests.
//!
//! The waveform is a toy: a Gaussian-enveloped pre-merger oscillation at
//! half the ringdown frequency, then a single damped sinusoid starting at
//! peak amplitude. The ringdown frequency is the Kerr `f220` scaled by
//! `1 + shift`, so a non-zero shift plants a known anomaly.

use std::f64::consts::PI;

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::domain::{DataPackage, Detector, StrainSegment};
use crate::error::AppError;
use crate::models::QnmModel;

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSpec {
    pub mass: f64,
    pub spin: f64,
    /// Fractional frequency shift applied to the ringdown.
    pub shift: f64,
    /// Noise standard deviation relative to the unit peak amplitude.
    pub noise: f64,
    pub seed: u64,
    pub sample_rate: f64,
    /// Total length (s); the merger sits in the middle.
    pub duration: f64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            mass: 62.0,
            spin: 0.68,
            shift: 0.0,
            noise: 0.1,
            seed: 42,
            sample_rate: 4096.0,
            duration: 0.3,
        }
    }
}

/// GPS time given to the synthetic merger.
pub const SYNTHETIC_MERGER_GPS: f64 = 1_000_000_000.0;

/// Build a cache-compatible package holding a synthetic event.
pub fn synthetic_event(spec: &SyntheticSpec) -> Result<DataPackage, AppError> {
    if !(spec.noise.is_finite() && spec.noise >= 0.0) {
        return Err(AppError::input("Noise level must be a non-negative number."));
    }
    if !(spec.duration.is_finite() && spec.duration > 0.0) {
        return Err(AppError::input("Synthetic duration must be positive."));
    }
    if !(spec.shift.is_finite() && spec.shift > -1.0) {
        return Err(AppError::input("Frequency shift must be greater than -1."));
    }
    let qnm = QnmModel::new(spec.mass, spec.spin)?;
    let fs = spec.sample_rate;
    let freq = qnm.f_220() * (1.0 + spec.shift);
    if freq >= fs / 2.0 {
        return Err(AppError::input(format!(
            "Ringdown frequency {freq:.0} Hz is above Nyquist for {fs} Hz sampling."
        )));
    }
    let tau = qnm.tau_220();

    let n = (spec.duration * fs).round() as usize;
    let merger = n / 2;
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let normal = Normal::new(0.0, spec.noise.max(f64::MIN_POSITIVE))
        .map_err(|e| AppError::numeric(format!("Noise distribution error: {e}")))?;

    let data = (0..n)
        .map(|i| {
            let t = (i as f64 - merger as f64) / fs;
            let signal = if i >= merger {
                (-t / tau).exp() * (2.0 * PI * freq * t).cos()
            } else {
                let envelope = 0.5 * (-(t / (4.0 * tau)).powi(2)).exp();
                envelope * (PI * freq * t).cos()
            };
            let noise = if spec.noise > 0.0 { normal.sample(&mut rng) } else { 0.0 };
            signal + noise
        })
        .collect();

    let t0 = SYNTHETIC_MERGER_GPS - merger as f64 / fs;
    let strain = StrainSegment::new(t0, fs, data)?;
    Ok(DataPackage {
        event_name: "SYNTHETIC".to_string(),
        detector: Detector::H1,
        merger_gps: strain.time_at(merger),
        strain,
        merger_index: merger as u64,
        final_mass: spec.mass,
        final_spin: spec.spin,
        // The injected ringdown sits at f220(M, a), i.e. a face-on view.
        inclination: Some(0.0),
        quality_passed: true,
        created: Utc::now(),
    })
}
