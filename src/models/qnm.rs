//! Kerr quasi-normal-mode predictions.
//!
//! Fundamental `(l, m, n) = (2, 2, 0)` mode from the Berti, Cardoso & Will (2006)
//! fitting formulas:
//!
//! ```text
//! f   = (f1 + f2 (1 - a)^f3) / (2π M_sec)
//! Q   = q1 + q2 (1 - a)^q3
//! τ   = Q / (2π f)
//! ```
//!
//! `M_sec` is the remnant mass in geometric time units. This module is the only
//! place a Kerr correction is computed; everything else calls `kerr_factor`.

use crate::error::AppError;

/// Solar mass in seconds (G M☉ / c³).
pub const MSUN_SECONDS: f64 = 4.926e-6;

/// Highest spin the fits are evaluated at.
pub const MAX_SPIN: f64 = 0.998;

const F1: f64 = 1.5251;
const F2: f64 = -1.1568;
const F3: f64 = 0.1292;

const Q1: f64 = 0.7000;
const Q2: f64 = 1.4187;
const Q3: f64 = -0.4990;

/// Overtone-to-fundamental frequency ratio (empirical).
pub const OVERTONE_FREQ_RATIO: f64 = 1.58;
/// Overtone-to-fundamental damping-time ratio (empirical).
pub const OVERTONE_TAU_RATIO: f64 = 0.35;

fn clamp_spin(spin: f64) -> f64 {
    if spin.is_nan() { 0.0 } else { spin.clamp(0.0, MAX_SPIN) }
}

/// Dimensionless `M ω` of the fundamental mode.
fn omega_220(spin: f64) -> f64 {
    let a = clamp_spin(spin);
    F1 + F2 * (1.0 - a).powf(F3)
}

fn quality_220(spin: f64) -> f64 {
    let a = clamp_spin(spin);
    Q1 + Q2 * (1.0 - a).powf(Q3)
}

/// QNM predictions for one remnant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QnmModel {
    mass: f64,
    spin: f64,
}

impl QnmModel {
    /// `mass` in solar masses; `spin` is clamped into `[0, 0.998]`.
    pub fn new(mass: f64, spin: f64) -> Result<Self, AppError> {
        if !(mass.is_finite() && mass > 0.0) {
            return Err(AppError::input(format!("Remnant mass must be positive, got {mass}.")));
        }
        Ok(Self {
            mass,
            spin: clamp_spin(spin),
        })
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn spin(&self) -> f64 {
        self.spin
    }

    fn mass_seconds(&self) -> f64 {
        self.mass * MSUN_SECONDS
    }

    /// Fundamental frequency (Hz).
    pub fn f_220(&self) -> f64 {
        omega_220(self.spin) / (2.0 * std::f64::consts::PI * self.mass_seconds())
    }

    /// Fundamental damping time (s).
    pub fn tau_220(&self) -> f64 {
        quality_220(self.spin) / (2.0 * std::f64::consts::PI * self.f_220())
    }

    pub fn quality_factor(&self) -> f64 {
        quality_220(self.spin)
    }

    /// First overtone frequency (Hz).
    pub fn f_221(&self) -> f64 {
        self.f_220() * OVERTONE_FREQ_RATIO
    }

    /// First overtone damping time (s).
    pub fn tau_221(&self) -> f64 {
        self.tau_220() * OVERTONE_TAU_RATIO
    }

    /// Non-spinning (Schwarzschild) fundamental frequency at the same mass.
    pub fn f_schwarzschild(&self) -> f64 {
        omega_220(0.0) / (2.0 * std::f64::consts::PI * self.mass_seconds())
    }
}

/// Kerr frequency correction `f_Kerr / f_Schwarzschild` at equal mass.
///
/// Retrograde spins use `|a|`. Exactly `1.0` at `a = 0`.
pub fn kerr_factor(spin: f64) -> f64 {
    let a = spin.abs();
    if a == 0.0 || a.is_nan() {
        return 1.0;
    }
    omega_220(a) / omega_220(0.0)
}

/// Projected spin seen by an observer at inclination `theta` (radians).
pub fn effective_spin(spin: f64, inclination: f64) -> f64 {
    spin * inclination.cos()
}

/// Spin that would explain a fractional frequency excess of `delta_percent`
/// (in percent) purely as a Kerr effect.
///
/// Inverts `kerr_factor` by bisection over `[0, 0.998]`; deviations outside the
/// attainable range clamp to the interval ends.
pub fn spin_from_deviation(delta_percent: f64) -> f64 {
    let target = 1.0 + delta_percent / 100.0;
    if !target.is_finite() || target <= 1.0 {
        return 0.0;
    }
    if target >= kerr_factor(MAX_SPIN) {
        return MAX_SPIN;
    }

    let (mut lo, mut hi) = (0.0_f64, MAX_SPIN);
    for _ in 0..80 {
        let mid = 0.5 * (lo + hi);
        if kerr_factor(mid) < target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kerr_factor_is_exactly_one_without_spin() {
        assert_eq!(kerr_factor(0.0), 1.0);
        assert_eq!(kerr_factor(-0.0), 1.0);
    }

    #[test]
    fn frequency_scales_inversely_with_mass() {
        let spin = 0.68;
        let reference = QnmModel::new(10.0, spin).unwrap().f_220() * 10.0;
        for mass in [5.0, 20.0, 62.0, 142.0] {
            let fm = QnmModel::new(mass, spin).unwrap().f_220() * mass;
            assert!((fm - reference).abs() / reference < 1e-12);
        }
    }

    #[test]
    fn frequency_increases_with_spin() {
        let mut prev = QnmModel::new(62.0, 0.0).unwrap().f_220();
        for i in 1..=99 {
            let a = i as f64 * 0.01;
            let f = QnmModel::new(62.0, a).unwrap().f_220();
            assert!(f > prev, "f not increasing at a={a}");
            assert!(f.is_finite());
            prev = f;
        }
        let top = QnmModel::new(62.0, 0.998).unwrap();
        assert!(top.f_220().is_finite() && top.tau_220().is_finite());
    }

    #[test]
    fn gw150914_prediction_is_in_expected_range() {
        let qnm = QnmModel::new(62.0, 0.68).unwrap();
        assert!(qnm.f_220() > 260.0 && qnm.f_220() < 290.0, "{}", qnm.f_220());
        assert!(qnm.tau_220() > 0.001 && qnm.tau_220() < 0.003, "{}", qnm.tau_220());
        assert!((qnm.f_221() / qnm.f_220() - 1.58).abs() < 1e-12);
    }

    #[test]
    fn spin_is_clamped() {
        let hi = QnmModel::new(30.0, 1.5).unwrap();
        assert_eq!(hi.spin(), MAX_SPIN);
        let lo = QnmModel::new(30.0, -0.4).unwrap();
        assert_eq!(lo.spin(), 0.0);
        assert!(QnmModel::new(0.0, 0.5).is_err());
    }

    #[test]
    fn spin_from_deviation_inverts_kerr_factor() {
        for a in [0.1, 0.4, 0.7, 0.9] {
            let delta = (kerr_factor(a) - 1.0) * 100.0;
            assert!((spin_from_deviation(delta) - a).abs() < 1e-9);
        }
        assert_eq!(spin_from_deviation(-3.0), 0.0);
        assert_eq!(spin_from_deviation(500.0), MAX_SPIN);
    }
}
