//! FFT helpers and window functions.

use std::f64::consts::PI;

use rustfft::FftPlanner;
use rustfft::num_complex::Complex64;

/// Window functions used by the spectral estimators.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum WindowFunction {
    /// No windowing (rectangular)
    Rectangular,
    /// Periodic Hann window, the usual choice for Welch averaging
    #[default]
    Hann,
    /// Symmetric Tukey (tapered cosine) with taper fraction `alpha`
    Tukey(f64),
}

impl WindowFunction {
    /// Generate window coefficients for the given size
    pub fn generate(&self, size: usize) -> Vec<f64> {
        match *self {
            WindowFunction::Rectangular => vec![1.0; size],
            WindowFunction::Hann => (0..size)
                .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
                .collect(),
            WindowFunction::Tukey(alpha) => tukey(size, alpha),
        }
    }
}

fn tukey(size: usize, alpha: f64) -> Vec<f64> {
    if size <= 1 {
        return vec![1.0; size];
    }
    let alpha = alpha.clamp(0.0, 1.0);
    if alpha == 0.0 {
        return vec![1.0; size];
    }
    let m = (size - 1) as f64;
    let edge = alpha * m / 2.0;
    (0..size)
        .map(|i| {
            let n = i as f64;
            if n < edge {
                0.5 * (1.0 + (PI * (n / edge - 1.0)).cos())
            } else if n > m - edge {
                0.5 * (1.0 + (PI * ((n - m) / edge + 1.0)).cos())
            } else {
                1.0
            }
        })
        .collect()
}

/// Forward FFT of a real signal (full complex spectrum, length `x.len()`).
pub fn fft_real(x: &[f64]) -> Vec<Complex64> {
    let mut buf: Vec<Complex64> = x.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    if buf.is_empty() {
        return buf;
    }
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(buf.len()).process(&mut buf);
    buf
}

/// Inverse FFT, normalized by `1/N`.
pub fn ifft(spectrum: &[Complex64]) -> Vec<Complex64> {
    let mut buf = spectrum.to_vec();
    if buf.is_empty() {
        return buf;
    }
    let n = buf.len() as f64;
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_inverse(buf.len()).process(&mut buf);
    for v in buf.iter_mut() {
        *v /= n;
    }
    buf
}

/// Magnitude of the non-negative-frequency half of the spectrum (`N/2 + 1` bins).
pub fn rfft_magnitude(x: &[f64]) -> Vec<f64> {
    let spec = fft_real(x);
    let half = x.len() / 2 + 1;
    spec.iter().take(half).map(|c| c.norm()).collect()
}

/// Bin frequencies matching `rfft_magnitude`.
pub fn rfft_frequencies(n: usize, sample_rate: f64) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    (0..n / 2 + 1)
        .map(|k| k as f64 * sample_rate / n as f64)
        .collect()
}

/// Subtract the mean in place.
pub fn detrend_constant(x: &mut [f64]) {
    if x.is_empty() {
        return;
    }
    let mean = x.iter().sum::<f64>() / x.len() as f64;
    for v in x.iter_mut() {
        *v -= mean;
    }
}
