//! Butterworth bandpass design and second-order-section filtering.
//!
//! Design follows the classic analog-prototype route:
//!
//! 1. Butterworth low-pass prototype poles on the unit circle
//! 2. low-pass → band-pass transform around the pre-warped band edges
//! 3. bilinear transform to the z-plane
//! 4. pair conjugate poles into biquads
//!
//! Every band-pass biquad has numerator `1 - z⁻²` (one zero at `z = 1` and one at
//! `z = -1`); the overall gain lives in the first section.
//!
//! Filtering uses direct form II transposed. `Sos::filtfilt` runs the cascade
//! forward and backward over an odd-extended signal with steady-state initial
//! conditions, giving zero phase.

use std::f64::consts::PI;

use rustfft::num_complex::Complex64;

use crate::error::AppError;

/// One biquad: `b = [b0, b1, b2]`, `a = [1, a1, a2]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

/// A cascade of biquads.
#[derive(Debug, Clone, PartialEq)]
pub struct Sos {
    pub sections: Vec<Biquad>,
}

/// Design a digital Butterworth band-pass of the given `order` (per band edge,
/// so the cascade has `order` sections and `2 · order` poles).
pub fn butter_bandpass(order: usize, low: f64, high: f64, sample_rate: f64) -> Result<Sos, AppError> {
    if order == 0 {
        return Err(AppError::input("Filter order must be >= 1."));
    }
    let nyquist = sample_rate / 2.0;
    if !(low.is_finite() && high.is_finite() && low > 0.0 && high > low && high < nyquist) {
        return Err(AppError::input(format!(
            "Invalid band [{low}, {high}] Hz for sample rate {sample_rate} Hz."
        )));
    }

    // Pre-warp with fs = 2 so the bilinear transform maps the edges exactly.
    let fs = 2.0;
    let warp = |f: f64| 2.0 * fs * (PI * (f / nyquist) / fs).tan();
    let w1 = warp(low);
    let w2 = warp(high);
    let bw = w2 - w1;
    let wo = (w1 * w2).sqrt();

    let n = order as i64;
    let prototype: Vec<Complex64> = (-n + 1..n)
        .step_by(2)
        .map(|m| -Complex64::from_polar(1.0, PI * m as f64 / (2 * n) as f64))
        .collect();

    let mut analog = Vec::with_capacity(2 * order);
    for &p in &prototype {
        let p_lp = p * (bw / 2.0);
        let root = (p_lp * p_lp - wo * wo).sqrt();
        analog.push(p_lp + root);
        analog.push(p_lp - root);
    }

    // Bilinear transform: z = (2fs + s) / (2fs - s). The `order` zeros at the
    // analog origin land on z = 1, and `order` new zeros appear at z = -1.
    let fs2 = 2.0 * fs;
    let mut gain = Complex64::new(bw.powi(order as i32), 0.0);
    let mut digital = Vec::with_capacity(analog.len());
    for &p in &analog {
        gain *= fs2 / (fs2 - p);
        digital.push((fs2 + p) / (fs2 - p));
    }
    let gain = gain.re;

    let sections = pair_poles(&digital)?
        .into_iter()
        .enumerate()
        .map(|(i, (a1, a2))| {
            let k = if i == 0 { gain } else { 1.0 };
            Biquad {
                b: [k, 0.0, -k],
                a: [1.0, a1, a2],
            }
        })
        .collect::<Vec<_>>();

    if sections.len() != order {
        return Err(AppError::numeric(format!(
            "Filter design produced {} sections, expected {order}.",
            sections.len()
        )));
    }
    Ok(Sos { sections })
}

/// Group z-plane poles into `(a1, a2)` denominators.
///
/// Complex poles are taken from the upper half plane (their conjugates are
/// implied); real poles are paired with each other.
fn pair_poles(poles: &[Complex64]) -> Result<Vec<(f64, f64)>, AppError> {
    const EPS: f64 = 1e-10;
    let mut out = Vec::new();
    let mut reals: Vec<f64> = Vec::new();

    for p in poles {
        if !(p.re.is_finite() && p.im.is_finite()) {
            return Err(AppError::numeric("Non-finite pole in filter design."));
        }
        if p.im > EPS {
            out.push((-2.0 * p.re, p.norm_sqr()));
        } else if p.im.abs() <= EPS {
            reals.push(p.re);
        }
    }

    reals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    for pair in reals.chunks(2) {
        match pair {
            [r1, r2] => out.push((-(r1 + r2), r1 * r2)),
            [r] => out.push((-r, 0.0)),
            _ => {}
        }
    }

    // Poles farthest from the unit circle first.
    out.sort_by(|x, y| x.1.partial_cmp(&y.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(out)
}

impl Sos {
    /// Causal filtering from rest.
    pub fn filter(&self, x: &[f64]) -> Vec<f64> {
        let zi = vec![[0.0, 0.0]; self.sections.len()];
        self.filter_with_state(x, zi)
    }

    fn filter_with_state(&self, x: &[f64], mut state: Vec<[f64; 2]>) -> Vec<f64> {
        let mut y = x.to_vec();
        for (sec, z) in self.sections.iter().zip(state.iter_mut()) {
            let [b0, b1, b2] = sec.b;
            let [_, a1, a2] = sec.a;
            for v in y.iter_mut() {
                let input = *v;
                let out = b0 * input + z[0];
                z[0] = b1 * input - a1 * out + z[1];
                z[1] = b2 * input - a2 * out;
                *v = out;
            }
        }
        y
    }

    /// Steady-state initial conditions for a unit step input.
    fn steady_state(&self) -> Vec<[f64; 2]> {
        let mut scale = 1.0;
        let mut out = Vec::with_capacity(self.sections.len());
        for sec in &self.sections {
            let [b0, b1, b2] = sec.b;
            let [_, a1, a2] = sec.a;
            let r0 = b1 - a1 * b0;
            let r1 = b2 - a2 * b0;
            let denom = 1.0 + a1 + a2;
            let z0 = if denom.abs() > 1e-300 { (r0 + r1) / denom } else { 0.0 };
            let z1 = r1 - a2 * z0;
            out.push([z0 * scale, z1 * scale]);

            let dc_num = b0 + b1 + b2;
            scale *= if denom.abs() > 1e-300 { dc_num / denom } else { 0.0 };
        }
        out
    }

    /// Default odd-extension length used by `filtfilt`.
    pub fn pad_len(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    /// Zero-phase forward-backward filtering.
    pub fn filtfilt(&self, x: &[f64]) -> Result<Vec<f64>, AppError> {
        let n = x.len();
        if n < 2 {
            return Err(AppError::data(format!(
                "Signal of {n} samples is too short for zero-phase filtering."
            )));
        }
        let pad = self.pad_len().min(n - 1);

        let mut ext = Vec::with_capacity(n + 2 * pad);
        for i in (1..=pad).rev() {
            ext.push(2.0 * x[0] - x[i]);
        }
        ext.extend_from_slice(x);
        for i in 1..=pad {
            ext.push(2.0 * x[n - 1] - x[n - 1 - i]);
        }

        let zi = self.steady_state();
        let scaled = |x0: f64| -> Vec<[f64; 2]> { zi.iter().map(|z| [z[0] * x0, z[1] * x0]).collect() };

        let mut y = self.filter_with_state(&ext, scaled(ext[0]));
        y.reverse();
        let mut y = self.filter_with_state(&y, scaled(y[0]));
        y.reverse();

        Ok(y[pad..pad + n].to_vec())
    }

    /// Magnitude response at frequency `freq` (Hz).
    pub fn gain_at(&self, freq: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * freq / sample_rate;
        let z1 = Complex64::from_polar(1.0, -w);
        let z2 = z1 * z1;
        self.sections
            .iter()
            .map(|s| {
                let num = s.b[0] + z1 * s.b[1] + z2 * s.b[2];
                let den = s.a[0] + z1 * s.a[1] + z2 * s.a[2];
                (num / den).norm()
            })
            .product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| (2.0 * PI * freq * i as f64 / fs).sin()).collect()
    }

    fn rms(x: &[f64]) -> f64 {
        (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
    }

    #[test]
    fn bandpass_gain_is_unity_at_geometric_center() {
        let fs = 4096.0;
        let sos = butter_bandpass(4, 175.0, 325.0, fs).unwrap();
        assert_eq!(sos.sections.len(), 4);
        // Bilinear pre-warping keeps the centre at the warped geometric mean;
        // the passband is maximally flat so the gain there is ~1.
        let center = (175.0_f64 * 325.0).sqrt();
        assert!((sos.gain_at(center, fs) - 1.0).abs() < 0.02);
        assert!(sos.gain_at(20.0, fs) < 1e-3);
        assert!(sos.gain_at(1000.0, fs) < 1e-3);
        // Band edges are the -3 dB points.
        assert!((sos.gain_at(175.0, fs) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!((sos.gain_at(325.0, fs) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn high_order_wide_band_is_stable() {
        let fs = 4096.0;
        let sos = butter_bandpass(8, 20.0, 400.0, fs).unwrap();
        for s in &sos.sections {
            // Stable biquad: |a2| < 1 and |a1| < 1 + a2.
            assert!(s.a[2].abs() < 1.0);
            assert!(s.a[1].abs() < 1.0 + s.a[2]);
        }
        assert!((sos.gain_at(100.0, fs) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn filtfilt_passes_in_band_tone_without_phase_shift() {
        let fs = 4096.0;
        let sos = butter_bandpass(4, 150.0, 350.0, fs).unwrap();
        let x = tone(250.0, fs, 4096);
        let y = sos.filtfilt(&x).unwrap();
        assert_eq!(y.len(), x.len());
        // Compare the middle half to avoid edges.
        let mid = &y[1024..3072];
        let ref_mid = &x[1024..3072];
        let err: Vec<f64> = mid.iter().zip(ref_mid).map(|(a, b)| a - b).collect();
        assert!(rms(&err) < 0.02, "rms err {}", rms(&err));
    }

    #[test]
    fn filter_rejects_out_of_band_tone() {
        let fs = 4096.0;
        let sos = butter_bandpass(4, 150.0, 350.0, fs).unwrap();
        let y = sos.filter(&tone(30.0, fs, 4096));
        assert!(rms(&y[2048..]) < 1e-3);
    }

    #[test]
    fn rejects_invalid_band() {
        assert!(butter_bandpass(4, 300.0, 200.0, 4096.0).is_err());
        assert!(butter_bandpass(4, 100.0, 2048.0, 4096.0).is_err());
        assert!(butter_bandpass(0, 100.0, 200.0, 4096.0).is_err());
    }
}
