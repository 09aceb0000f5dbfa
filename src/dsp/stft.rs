//! Short-time Fourier and continuous wavelet transforms.

use std::f64::consts::PI;

use rustfft::num_complex::Complex64;

use super::fft::{WindowFunction, detrend_constant, fft_real, rfft_frequencies};

/// A time-frequency magnitude map; `magnitude[f][t]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeFrequencyMap {
    pub frequencies: Vec<f64>,
    /// Seconds from the first sample of the analysed segment.
    pub times: Vec<f64>,
    pub magnitude: Vec<Vec<f64>>,
}

impl TimeFrequencyMap {
    pub fn is_empty(&self) -> bool {
        self.times.is_empty() || self.frequencies.is_empty()
    }

    /// Largest magnitude in the map.
    pub fn peak(&self) -> f64 {
        self.magnitude
            .iter()
            .flat_map(|row| row.iter().copied())
            .fold(0.0, f64::max)
    }
}

/// Magnitude spectrogram.
///
/// Each segment is mean-detrended, Tukey(0.25) windowed and transformed;
/// the magnitude is scaled by `sqrt(1 / (fs · Σw²))`. `noverlap` is forced
/// below `nperseg`, and `nperseg` never exceeds the input length.
pub fn spectrogram(x: &[f64], sample_rate: f64, nperseg: usize, noverlap: usize) -> TimeFrequencyMap {
    let nperseg = nperseg.min(x.len());
    if nperseg == 0 {
        return TimeFrequencyMap::default();
    }
    let noverlap = noverlap.min(nperseg - 1);
    let step = nperseg - noverlap;

    let window = WindowFunction::Tukey(0.25).generate(nperseg);
    let win_power: f64 = window.iter().map(|w| w * w).sum();
    let scale = if win_power > 0.0 {
        (1.0 / (sample_rate * win_power)).sqrt()
    } else {
        0.0
    };

    let frequencies = rfft_frequencies(nperseg, sample_rate);
    let n_segments = (x.len() - noverlap) / step;
    let mut magnitude = vec![Vec::with_capacity(n_segments); frequencies.len()];
    let mut times = Vec::with_capacity(n_segments);

    for k in 0..n_segments {
        let start = k * step;
        let mut seg = x[start..start + nperseg].to_vec();
        detrend_constant(&mut seg);
        for (v, w) in seg.iter_mut().zip(&window) {
            *v *= w;
        }
        let spec = fft_real(&seg);
        for (row, c) in magnitude.iter_mut().zip(spec.iter()) {
            row.push(c.norm() * scale);
        }
        times.push((nperseg as f64 / 2.0 + start as f64) / sample_rate);
    }

    TimeFrequencyMap {
        frequencies,
        times,
        magnitude,
    }
}

/// Complex Morlet wavelet of length `m` at scale `s`, centre frequency `w` (rad/sample·s).
fn morlet(m: usize, s: f64, w: f64) -> Vec<Complex64> {
    let norm = PI.powf(-0.25) * (1.0 / s).sqrt();
    let centre = (m as f64 - 1.0) / 2.0;
    (0..m)
        .map(|i| {
            let x = (i as f64 - centre) / s;
            Complex64::from_polar(norm * (-0.5 * x * x).exp(), w * x)
        })
        .collect()
}

/// Continuous wavelet transform magnitude with a complex Morlet wavelet.
///
/// Row `i` is centred on `frequencies[i]`: the scale is `w · fs / (2π f)`.
/// The kernel spans `min(10 · scale, len)` samples and the convolution is
/// trimmed to the input length.
pub fn morlet_cwt(x: &[f64], sample_rate: f64, frequencies: &[f64], w: f64) -> TimeFrequencyMap {
    let n = x.len();
    let times: Vec<f64> = (0..n).map(|i| i as f64 / sample_rate).collect();
    let magnitude = frequencies
        .iter()
        .map(|&f| {
            if n == 0 || f <= 0.0 {
                return vec![0.0; n];
            }
            let scale = w * sample_rate / (2.0 * PI * f);
            let m = ((10.0 * scale) as usize).clamp(1, n);
            let wavelet = morlet(m, scale, w);
            // Convolve with conj(reversed wavelet), keep the centred `n` samples.
            let offset = (m - 1) / 2;
            (0..n)
                .map(|t| {
                    let j = t + offset;
                    let mut acc = Complex64::new(0.0, 0.0);
                    let lo = (j + 1).saturating_sub(m);
                    let hi = j.min(n - 1);
                    for (i, &xi) in x.iter().enumerate().take(hi + 1).skip(lo) {
                        acc += xi * wavelet[m - 1 - (j - i)].conj();
                    }
                    acc.norm()
                })
                .collect()
        })
        .collect();

    TimeFrequencyMap {
        frequencies: frequencies.to_vec(),
        times,
        magnitude,
    }
}

/// `n` evenly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| (2.0 * PI * freq * i as f64 / fs).sin()).collect()
    }

    fn argmax(v: &[f64]) -> usize {
        v.iter()
            .enumerate()
            .fold((0, f64::MIN), |acc, (i, &x)| if x > acc.1 { (i, x) } else { acc })
            .0
    }

    #[test]
    fn spectrogram_shape_and_peak() {
        let fs = 4096.0;
        let x = tone(256.0, fs, 1024);
        let map = spectrogram(&x, fs, 256, 128);
        assert_eq!(map.frequencies.len(), 129);
        assert_eq!(map.times.len(), (1024 - 128) / 128);
        assert!((map.times[0] - 128.0 / fs).abs() < 1e-12);
        let column: Vec<f64> = map.magnitude.iter().map(|row| row[3]).collect();
        assert_eq!(map.frequencies[argmax(&column)], 256.0);
    }

    #[test]
    fn spectrogram_clamps_overlap_and_length() {
        let x = tone(100.0, 1000.0, 40);
        let map = spectrogram(&x, 1000.0, 64, 64);
        assert_eq!(map.frequencies.len(), 21);
        // nperseg 40, noverlap 39 -> one-sample hop
        assert_eq!(map.times.len(), 1);
        assert!(spectrogram(&[], 1000.0, 64, 32).is_empty());
    }

    #[test]
    fn cwt_peaks_at_tone_frequency() {
        let fs = 4096.0;
        let x = tone(250.0, fs, 400);
        let freqs = linspace(100.0, 400.0, 31);
        let map = morlet_cwt(&x, fs, &freqs, 5.0);
        assert_eq!(map.magnitude.len(), 31);
        let column: Vec<f64> = map.magnitude.iter().map(|row| row[200]).collect();
        let best = freqs[argmax(&column)];
        assert!((best - 250.0).abs() <= 20.0, "{best}");
    }

    #[test]
    fn linspace_endpoints() {
        assert_eq!(linspace(1.0, 2.0, 3), vec![1.0, 1.5, 2.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }
}
