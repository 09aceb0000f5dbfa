//! Analytic signal and instantaneous phase/frequency.

use std::f64::consts::PI;

use rustfft::num_complex::Complex64;

use super::fft::{fft_real, ifft};

/// Analytic signal `x + i·H{x}` computed in the frequency domain.
///
/// Negative frequencies are zeroed and positive ones doubled; DC (and the
/// Nyquist bin for even lengths) keep unit weight.
pub fn analytic_signal(x: &[f64]) -> Vec<Complex64> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }
    let mut spec = fft_real(x);
    let mut h = vec![0.0; n];
    h[0] = 1.0;
    if n % 2 == 0 {
        h[n / 2] = 1.0;
        for w in h.iter_mut().take(n / 2).skip(1) {
            *w = 2.0;
        }
    } else {
        for w in h.iter_mut().take(n.div_ceil(2)).skip(1) {
            *w = 2.0;
        }
    }
    for (s, w) in spec.iter_mut().zip(h.iter()) {
        *s *= *w;
    }
    ifft(&spec)
}

/// Remove `2π` jumps from a phase sequence.
pub fn unwrap_phase(phase: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(phase.len());
    let mut offset = 0.0;
    let mut prev: Option<f64> = None;
    for &p in phase {
        if let Some(q) = prev {
            let d = p - q;
            // Wrap the raw step into [-π, π); a step of exactly +π stays +π.
            let mut wrapped = (d + PI).rem_euclid(2.0 * PI) - PI;
            if wrapped == -PI && d > 0.0 {
                wrapped = PI;
            }
            offset += wrapped - d;
        }
        out.push(p + offset);
        prev = Some(p);
    }
    out
}

/// Envelope and instantaneous frequency of a real signal.
///
/// The frequency track is the forward difference of the unwrapped phase, so
/// it is one sample shorter than the input; the returned envelope is
/// truncated to match.
pub fn envelope_and_frequency(x: &[f64], sample_rate: f64) -> (Vec<f64>, Vec<f64>) {
    if x.len() < 2 {
        return (Vec::new(), Vec::new());
    }
    let analytic = analytic_signal(x);
    let phase: Vec<f64> = analytic.iter().map(|c| c.arg()).collect();
    let unwrapped = unwrap_phase(&phase);
    let freq: Vec<f64> = unwrapped
        .windows(2)
        .map(|w| (w[1] - w[0]) * sample_rate / (2.0 * PI))
        .collect();
    let mut envelope: Vec<f64> = analytic.iter().map(|c| c.norm()).collect();
    envelope.truncate(freq.len());
    (envelope, freq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analytic_signal_of_cosine_is_complex_exponential() {
        let fs = 1000.0;
        let n = 1000;
        let x: Vec<f64> = (0..n).map(|i| (2.0 * PI * 50.0 * i as f64 / fs).cos()).collect();
        let a = analytic_signal(&x);
        for (i, c) in a.iter().enumerate() {
            let expect = (2.0 * PI * 50.0 * i as f64 / fs).sin();
            assert!((c.re - x[i]).abs() < 1e-9);
            assert!((c.im - expect).abs() < 1e-9);
        }
    }

    #[test]
    fn unwrap_removes_jumps() {
        let raw: Vec<f64> = (0..20).map(|i| (i as f64 * 1.0 + PI).rem_euclid(2.0 * PI) - PI).collect();
        let un = unwrap_phase(&raw);
        for w in un.windows(2) {
            assert!((w[1] - w[0] - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn pure_tone_has_constant_frequency() {
        let fs = 4096.0;
        let x: Vec<f64> = (0..2048).map(|i| (2.0 * PI * 256.0 * i as f64 / fs).sin()).collect();
        let (env, freq) = envelope_and_frequency(&x, fs);
        assert_eq!(env.len(), 2047);
        assert_eq!(freq.len(), 2047);
        for f in &freq[100..1900] {
            assert!((f - 256.0).abs() < 1e-6, "{f}");
        }
        for e in &env[100..1900] {
            assert!((e - 1.0).abs() < 1e-6);
        }
    }
}
