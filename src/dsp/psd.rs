//! Welch power spectral density and spectral whitening.

use rustfft::num_complex::Complex64;

use super::fft::{WindowFunction, detrend_constant, fft_real, ifft, rfft_frequencies};
use crate::error::AppError;

/// One-sided PSD estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct Psd {
    pub frequencies: Vec<f64>,
    /// Power spectral density (units²/Hz).
    pub density: Vec<f64>,
}

impl Psd {
    /// Linear interpolation of the density at `freq`, clamped to the end values.
    pub fn interpolate(&self, freq: f64) -> f64 {
        interp(freq, &self.frequencies, &self.density)
    }
}

/// Welch's averaged periodogram: periodic Hann segments of `nperseg`
/// samples with 50 % overlap, mean-detrended, density-scaled.
pub fn welch(x: &[f64], sample_rate: f64, nperseg: usize) -> Result<Psd, AppError> {
    if nperseg < 2 {
        return Err(AppError::numeric(format!("Welch segment length {nperseg} is too short.")));
    }
    if x.len() < nperseg {
        return Err(AppError::data(format!(
            "{} samples cannot hold one {nperseg}-sample Welch segment.",
            x.len()
        )));
    }
    let window = WindowFunction::Hann.generate(nperseg);
    let win_power: f64 = window.iter().map(|w| w * w).sum();
    let step = nperseg - nperseg / 2;
    let n_bins = nperseg / 2 + 1;

    let mut acc = vec![0.0; n_bins];
    let mut n_segments = 0usize;
    let mut start = 0;
    while start + nperseg <= x.len() {
        let mut seg = x[start..start + nperseg].to_vec();
        detrend_constant(&mut seg);
        for (v, w) in seg.iter_mut().zip(&window) {
            *v *= w;
        }
        let spec = fft_real(&seg);
        for (a, c) in acc.iter_mut().zip(spec.iter()) {
            *a += c.norm_sqr();
        }
        n_segments += 1;
        start += step;
    }

    let scale = 1.0 / (sample_rate * win_power * n_segments as f64);
    let last = n_bins - 1;
    let density = acc
        .iter()
        .enumerate()
        .map(|(k, &p)| {
            let one_sided = if k == 0 || (k == last && nperseg % 2 == 0) { 1.0 } else { 2.0 };
            p * scale * one_sided
        })
        .collect();

    Ok(Psd {
        frequencies: rfft_frequencies(nperseg, sample_rate),
        density,
    })
}

/// Whiten `x` by the Welch PSD estimated with `fftlength`-second segments.
///
/// The signal is Tukey(0.1) tapered, transformed, divided bin-by-bin by the
/// amplitude spectral density (`sqrt(PSD · fs/2)`), and transformed back.
pub fn whiten(x: &[f64], sample_rate: f64, fftlength: f64) -> Result<Vec<f64>, AppError> {
    let nperseg = (fftlength * sample_rate).round() as usize;
    let psd = welch(x, sample_rate, nperseg)?;

    let n = x.len();
    let taper = WindowFunction::Tukey(0.1).generate(n);
    let tapered: Vec<f64> = x.iter().zip(&taper).map(|(v, w)| v * w).collect();
    let mut spec = fft_real(&tapered);

    for (k, bin) in spec.iter_mut().enumerate() {
        let kk = if k <= n / 2 { k } else { n - k };
        let f = kk as f64 * sample_rate / n as f64;
        let asd = (psd.interpolate(f) * sample_rate / 2.0).sqrt();
        if !(asd.is_finite() && asd > 0.0) {
            return Err(AppError::numeric(format!(
                "Non-positive noise PSD at {f:.2} Hz; cannot whiten."
            )));
        }
        *bin /= Complex64::new(asd, 0.0);
    }

    Ok(ifft(&spec).into_iter().map(|c| c.re).collect())
}

/// `np.interp`-style piecewise linear interpolation over ascending `xs`.
pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return f64::NAN;
    }
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[n - 1] {
        return ys[n - 1];
    }
    let hi = xs[..n].partition_point(|&v| v <= x);
    let lo = hi - 1;
    let span = xs[hi] - xs[lo];
    if span <= 0.0 {
        return ys[lo];
    }
    ys[lo] + (ys[hi] - ys[lo]) * (x - xs[lo]) / span
}
