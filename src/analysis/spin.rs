//! Spin-corrected frequency analysis.
//!
//! A Schwarzschild prediction ignores the remnant spin, which alone moves the
//! fundamental by tens of percent. Here the observed ringdown frequency is
//! compared with the Kerr prediction for the line-of-sight spin
//! `a·cos(θ_jn)`, and whatever is left over is the "quantum residual".

use serde::Serialize;
use tracing::debug;

use crate::analysis::time_frequency::TimeFrequencyAnalyzer;
use crate::domain::{Event, MergerRef, RingdownFit, StrainSegment};
use crate::error::AppError;
use crate::fit::{ModeBounds, ModeGuess, fit_ringdown};
use crate::math::{mean, std_sample};
use crate::models::{QnmModel, effective_spin, kerr_factor};

/// Fractional frequency shift of the quantum hypothesis.
pub const QUANTUM_SHIFT: f64 = 0.03;

/// Remnant masses (M☉) where the effect is expected to resonate.
pub const RESONANCE_BAND: (f64, f64) = (59.0, 62.0);
const NEAR_RESONANCE_BAND: (f64, f64) = (57.0, 64.0);

/// Selection score (0..=100) and the reasons behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Priority {
    pub score: f64,
    pub reasons: Vec<String>,
}

/// Rank an event by how cleanly it could show a spin-independent shift.
///
/// - edge-on orientation: up to 40 points (`40·(1 − |cos θ|)`)
/// - low spin: up to 30 points (`30·(1 − |a|)`)
/// - remnant mass in the resonance band: 30, near it: 15
///
/// A missing inclination counts as face-on.
pub fn event_priority(event: &Event) -> Priority {
    let theta = event.inclination.unwrap_or(0.0);
    let a = event.final_spin;
    let mass = event.final_mass;
    let mut reasons = Vec::with_capacity(3);

    let angle = 40.0 * (1.0 - theta.cos().abs());
    let deg = theta.to_degrees();
    reasons.push(if angle > 30.0 {
        format!("Edge-on (θ={deg:.0}°, +{angle:.0})")
    } else if angle > 20.0 {
        format!("Moderate angle ({deg:.0}°, +{angle:.0})")
    } else {
        format!("Face-on ({deg:.0}°, +{angle:.0})")
    });

    let spin = 30.0 * (1.0 - a.abs());
    reasons.push(if a.abs() < 0.3 {
        format!("Low spin (a={a:.2}, +{spin:.0})")
    } else if a.abs() < 0.6 {
        format!("Medium spin (a={a:.2}, +{spin:.0})")
    } else {
        format!("High spin (a={a:.2}, +{spin:.0})")
    });

    let in_band = |(lo, hi): (f64, f64)| (lo..=hi).contains(&mass);
    let resonance = if in_band(RESONANCE_BAND) {
        reasons.push(format!("In resonance ({mass} M☉, +30)"));
        30.0
    } else if in_band(NEAR_RESONANCE_BAND) {
        reasons.push(format!("Near resonance ({mass} M☉, +15)"));
        15.0
    } else {
        reasons.push(format!("Outside resonance ({mass} M☉, +0)"));
        0.0
    };

    Priority {
        score: angle + spin + resonance,
        reasons,
    }
}

/// Inclination assumed by the spin correction when the catalog has none.
///
/// Edge-on makes `a_eff = 0`, so an unknown orientation is compared against
/// the Schwarzschild frequency instead of being given the full spin shift.
pub const DEFAULT_INCLINATION: f64 = std::f64::consts::FRAC_PI_2;

/// Predicted frequencies for one event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KerrPrediction {
    pub a_final: f64,
    pub inclination: f64,
    pub a_effective: f64,
    pub kerr_factor: f64,
    /// `f220(M, 0)`.
    pub f_schwarzschild: f64,
    /// `f_schwarzschild · kerr_factor(a_eff)`.
    pub f_kerr: f64,
    /// `f220(M, a)`; centre of the fit band.
    pub f_220: f64,
}

impl KerrPrediction {
    pub fn for_event(event: &Event) -> Result<Self, AppError> {
        let qnm = QnmModel::new(event.final_mass, event.final_spin)?;
        let inclination = event.inclination.unwrap_or(DEFAULT_INCLINATION);
        let a_effective = effective_spin(qnm.spin(), inclination);
        let factor = kerr_factor(a_effective);
        let f_schwarzschild = qnm.f_schwarzschild();
        Ok(Self {
            a_final: qnm.spin(),
            inclination,
            a_effective,
            kerr_factor: factor,
            f_schwarzschild,
            f_kerr: f_schwarzschild * factor,
            f_220: qnm.f_220(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Hypothesis {
    GeneralRelativity,
    Quantum,
}

impl std::fmt::Display for Hypothesis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Hypothesis::GeneralRelativity => "GR",
            Hypothesis::Quantum => "Quantum",
        })
    }
}

/// GR (`f_kerr`) against the shifted quantum prediction, one χ² each.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HypothesisComparison {
    pub f_gr: f64,
    pub f_quantum: f64,
    pub sigma_gr: f64,
    pub sigma_quantum: f64,
    pub chi2_gr: f64,
    pub chi2_quantum: f64,
    pub preferred: Hypothesis,
}

impl HypothesisComparison {
    /// `None` when the frequency uncertainty is not positive.
    pub fn new(f_obs: f64, f_error: f64, f_gr: f64) -> Option<Self> {
        if f_error.is_nan() || f_error <= 0.0 {
            return None;
        }
        let f_quantum = f_gr * (1.0 + QUANTUM_SHIFT);
        let sigma_gr = (f_obs - f_gr).abs() / f_error;
        let sigma_quantum = (f_obs - f_quantum).abs() / f_error;
        let preferred = if sigma_quantum < sigma_gr {
            Hypothesis::Quantum
        } else {
            Hypothesis::GeneralRelativity
        };
        Some(Self {
            f_gr,
            f_quantum,
            sigma_gr,
            sigma_quantum,
            chi2_gr: sigma_gr * sigma_gr,
            chi2_quantum: sigma_quantum * sigma_quantum,
            preferred,
        })
    }
}

/// Fitted frequency compared with both predictions. Deviations are percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpinMeasurement {
    pub f_obs: f64,
    pub f_error: f64,
    pub damping_time: f64,
    pub delta_raw: f64,
    pub sigma_raw: f64,
    pub quantum_residual: f64,
    pub quantum_error: f64,
    pub sigma_quantum: f64,
    pub hypotheses: Option<HypothesisComparison>,
}

impl SpinMeasurement {
    pub fn new(f_obs: f64, f_error: f64, damping_time: f64, prediction: &KerrPrediction) -> Self {
        let f_schw = prediction.f_schwarzschild;
        let f_kerr = prediction.f_kerr;
        let delta_raw = (f_obs - f_schw) / f_schw * 100.0;
        let raw_error = f_error / f_schw * 100.0;
        let quantum_residual = (f_obs - f_kerr) / f_kerr * 100.0;
        let quantum_error = f_error / f_kerr * 100.0;
        let ratio = |num: f64, den: f64| if den > 0.0 { num.abs() / den } else { 0.0 };
        Self {
            f_obs,
            f_error,
            damping_time,
            delta_raw,
            sigma_raw: ratio(delta_raw, raw_error),
            quantum_residual,
            quantum_error,
            sigma_quantum: ratio(quantum_residual, quantum_error),
            hypotheses: HypothesisComparison::new(f_obs, f_error, f_kerr),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpinCorrectedResult {
    pub prediction: KerrPrediction,
    pub band: (f64, f64),
    pub fit: RingdownFit,
    pub measurement: Option<SpinMeasurement>,
}

impl SpinCorrectedResult {
    pub fn success(&self) -> bool {
        self.measurement.is_some()
    }
}

/// Fit the ringdown in `window` (s after merger) and compare with the Kerr
/// prediction for `event`.
///
/// The frequency band is `[0.7, 1.5]·f220(M, a)`, capped below Nyquist. A
/// failed fit is reported through `fit.message` with no measurement.
pub fn spin_corrected_fit(
    strain: &StrainSegment,
    merger: MergerRef,
    event: &Event,
    window: (f64, f64),
) -> Result<SpinCorrectedResult, AppError> {
    let prediction = KerrPrediction::for_event(event)?;
    let fs = strain.sample_rate;
    let hi = (1.5 * prediction.f_220).min(0.49 * fs);
    let lo = (0.7 * prediction.f_220).min(0.9 * hi);
    let band = (lo, hi);

    let analyzer = TimeFrequencyAnalyzer::new(strain, merger)?;
    let segment = analyzer.segment(window.0, window.1);
    let peak = segment.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let guess = ModeGuess {
        amplitude: peak,
        damping_time: 0.01,
        frequency: prediction.f_220.clamp(lo, hi),
        phase: 0.0,
    };
    debug!(
        "{}: spin-corrected fit on {} samples, band {:.0}-{:.0} Hz",
        event.name,
        segment.len(),
        lo,
        hi
    );
    let fit = fit_ringdown(segment, fs, &guess, &ModeBounds::for_band(band));
    let measurement = fit
        .fundamental()
        .map(|m| SpinMeasurement::new(m.frequency.value, m.frequency.sigma, m.damping_time.value, &prediction));

    Ok(SpinCorrectedResult {
        prediction,
        band,
        fit,
        measurement,
    })
}

/// Aggregate of the events whose mass lies in the resonance band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResonanceSummary {
    pub n_events: usize,
    pub delta_raw_mean: Option<f64>,
    pub delta_raw_std: Option<f64>,
    pub residual_mean: Option<f64>,
    pub residual_std: Option<f64>,
    pub mean_sigma: Option<f64>,
    pub positive: usize,
}

impl ResonanceSummary {
    /// `events` pairs remnant mass with a measurement; others are ignored.
    pub fn from_measurements<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = (f64, &'a SpinMeasurement)>,
    {
        let (lo, hi) = RESONANCE_BAND;
        let inside: Vec<&SpinMeasurement> = events
            .into_iter()
            .filter(|(mass, _)| (lo..=hi).contains(mass))
            .map(|(_, m)| m)
            .collect();
        let raw: Vec<f64> = inside.iter().map(|m| m.delta_raw).collect();
        let residual: Vec<f64> = inside.iter().map(|m| m.quantum_residual).collect();
        let sigma: Vec<f64> = inside.iter().map(|m| m.sigma_quantum).collect();
        Self {
            n_events: inside.len(),
            delta_raw_mean: mean(&raw),
            delta_raw_std: std_sample(&raw),
            residual_mean: mean(&residual),
            residual_std: std_sample(&residual),
            mean_sigma: mean(&sigma),
            positive: residual.iter().filter(|r| **r > 0.0).count(),
        }
    }

    pub fn render(&self) -> String {
        let (lo, hi) = RESONANCE_BAND;
        let mut out = format!("RESONANCE BAND ({lo:.0}-{hi:.0} M☉)\n  Events: {}\n", self.n_events);
        let fmt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"));
        if self.n_events > 0 {
            out.push_str(&format!(
                "  Before spin correction: avg δf {}% ± {}%\n",
                fmt(self.delta_raw_mean),
                fmt(self.delta_raw_std)
            ));
            out.push_str(&format!(
                "  After spin correction:  avg residual {}% ± {}%, avg σ {}\n",
                fmt(self.residual_mean),
                fmt(self.residual_std),
                fmt(self.mean_sigma)
            ));
            out.push_str(&format!(
                "  Positive residuals: {}/{} ({:.0}%)\n",
                self.positive,
                self.n_events,
                self.positive as f64 / self.n_events as f64 * 100.0
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceKind;
    use crate::models::synthesize;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};
    use std::collections::BTreeMap;
    use std::f64::consts::FRAC_PI_2;

    fn event(mass: f64, spin: f64, inclination: Option<f64>) -> Event {
        Event {
            name: "TEST".to_string(),
            gps_time: 0.0,
            final_mass: mass,
            final_spin: spin,
            inclination,
            distance_mpc: None,
            snr: BTreeMap::new(),
            kind: SourceKind::Bbh,
        }
    }

    #[test]
    fn priority_rewards_edge_on_low_spin_resonant_events() {
        let best = event_priority(&event(60.0, 0.0, Some(FRAC_PI_2)));
        assert!((best.score - 100.0).abs() < 1e-9);
        assert!(best.reasons[0].starts_with("Edge-on"));
        assert!(best.reasons[1].starts_with("Low spin"));
        assert!(best.reasons[2].starts_with("In resonance"));

        let near = event_priority(&event(63.0, 0.5, None));
        assert!((near.score - (0.0 + 15.0 + 15.0)).abs() < 1e-9);
        assert!(near.reasons[0].starts_with("Face-on"));
        assert!(near.reasons[1].starts_with("Medium spin"));
        assert!(near.reasons[2].starts_with("Near resonance"));

        let far = event_priority(&event(20.0, 0.9, Some(0.0)));
        assert!(far.reasons[2].starts_with("Outside resonance"));
    }

    #[test]
    fn edge_on_inclination_removes_the_spin_correction() {
        let p = KerrPrediction::for_event(&event(62.0, 0.68, Some(FRAC_PI_2))).unwrap();
        assert!(p.a_effective.abs() < 1e-12);
        assert!((p.kerr_factor - 1.0).abs() < 1e-9);
        assert!((p.f_kerr - p.f_schwarzschild).abs() < 1e-6);

        let face_on = KerrPrediction::for_event(&event(62.0, 0.68, Some(0.0))).unwrap();
        assert!((face_on.f_kerr - face_on.f_220).abs() < 1e-6);
    }

    #[test]
    fn unknown_inclination_is_treated_as_edge_on() {
        let p = KerrPrediction::for_event(&event(62.0, 0.68, None)).unwrap();
        assert_eq!(p.inclination, DEFAULT_INCLINATION);
        assert!(p.a_effective.abs() < 1e-12);
        assert!((p.f_kerr - p.f_schwarzschild).abs() < 1e-6);
        // Priority scoring keeps the face-on default.
        assert!(event_priority(&event(62.0, 0.68, None)).reasons[0].starts_with("Face-on"));
    }

    #[test]
    fn hypothesis_comparison_picks_the_closer_prediction() {
        let h = HypothesisComparison::new(103.0, 1.0, 100.0).unwrap();
        assert_eq!(h.preferred, Hypothesis::Quantum);
        assert!((h.chi2_gr - 9.0).abs() < 1e-9);
        assert!(h.chi2_quantum < 1e-9);
        assert!(HypothesisComparison::new(103.0, 0.0, 100.0).is_none());
    }

    #[test]
    fn measurement_percentages() {
        let p = KerrPrediction::for_event(&event(62.0, 0.68, Some(0.0))).unwrap();
        let m = SpinMeasurement::new(p.f_kerr * 1.02, p.f_kerr * 0.01, 0.004, &p);
        assert!((m.quantum_residual - 2.0).abs() < 1e-9);
        assert!((m.quantum_error - 1.0).abs() < 1e-9);
        assert!((m.sigma_quantum - 2.0).abs() < 1e-9);
        assert!(m.delta_raw > 40.0);
    }

    #[test]
    fn fit_recovers_shifted_ringdown() {
        let fs = 4096.0;
        let ev = event(62.0, 0.68, Some(0.0));
        let f_true = KerrPrediction::for_event(&ev).unwrap().f_kerr * 1.03;
        let merger = 410;
        let ring = synthesize(&[1.0, 0.004, f_true, 0.0], fs, 410);
        let mut rng = StdRng::seed_from_u64(11);
        let noise = Normal::new(0.0, 0.01).unwrap();
        let mut data = vec![0.0; merger];
        data.extend(ring);
        let data: Vec<f64> = data.into_iter().map(|v| v + noise.sample(&mut rng)).collect();
        let strain = StrainSegment::new(0.0, fs, data).unwrap();

        let result = spin_corrected_fit(&strain, MergerRef::Index(merger as u64), &ev, (0.003, 0.04)).unwrap();
        assert!(result.success(), "{}", result.fit.message);
        let m = result.measurement.unwrap();
        assert!((m.f_obs - f_true).abs() < 2.0, "{}", m.f_obs);
        assert!((m.quantum_residual - 3.0).abs() < 1.0);
        assert_eq!(m.hypotheses.unwrap().preferred, Hypothesis::Quantum);
    }

    #[test]
    fn resonance_summary_filters_by_mass() {
        let p = KerrPrediction::for_event(&event(60.0, 0.5, None)).unwrap();
        let a = SpinMeasurement::new(p.f_kerr * 1.04, 1.0, 0.004, &p);
        let b = SpinMeasurement::new(p.f_kerr * 0.98, 1.0, 0.004, &p);
        let c = SpinMeasurement::new(p.f_kerr * 1.50, 1.0, 0.004, &p);
        let summary = ResonanceSummary::from_measurements([(60.0, &a), (61.5, &b), (36.0, &c)]);
        assert_eq!(summary.n_events, 2);
        assert_eq!(summary.positive, 1);
        assert!((summary.residual_mean.unwrap() - 1.0).abs() < 1e-9);
        assert!(summary.render().contains("Positive residuals: 1/2 (50%)"));

        let empty = ResonanceSummary::from_measurements(std::iter::empty::<(f64, &SpinMeasurement)>());
        assert_eq!(empty.n_events, 0);
        assert!(empty.residual_mean.is_none());
    }
}
