//! Time-frequency analysis of the post-merger signal.
//!
//! All windows are given in seconds relative to the merger sample. A window
//! is converted to sample indices by truncating `merger + t · fs` and clamping
//! to the data.

use serde::Serialize;

use crate::domain::{MergerRef, StrainSegment};
use crate::dsp::hilbert::envelope_and_frequency;
use crate::dsp::stft::{linspace, morlet_cwt, spectrogram};
use crate::dsp::{TimeFrequencyMap, butter_bandpass};
use crate::error::AppError;
use crate::math::std_population;

/// Minimum window length for the Hilbert analysis.
pub const MIN_SEGMENT_SAMPLES: usize = 50;

const IF_FILTER_ORDER: usize = 4;
const MORLET_W: f64 = 5.0;
const CWT_FREQUENCIES: usize = 200;

/// Instantaneous frequency track; all three vectors share one length.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FrequencyTrack {
    /// Seconds after merger.
    pub times: Vec<f64>,
    pub frequency: Vec<f64>,
    pub amplitude: Vec<f64>,
}

impl FrequencyTrack {
    pub fn is_empty(&self) -> bool {
        self.frequency.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frequency.len()
    }
}

/// Outcome of the early-ringdown frequency-jump test.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct JumpResult {
    /// False when the window held too little signal to measure anything.
    pub measured: bool,
    pub detected: bool,
    /// Amplitude-weighted fractional deviation with the largest magnitude.
    pub max_deviation: f64,
    /// Seconds after merger of `max_deviation`.
    pub time_of_max: f64,
    pub significance: f64,
    pub message: String,
    /// Samples that passed the amplitude cut.
    #[serde(skip)]
    pub track: FrequencyTrack,
}

impl JumpResult {
    fn rejected(message: &str, track: FrequencyTrack) -> Self {
        Self {
            message: message.to_string(),
            track,
            ..Self::default()
        }
    }
}

/// Stateless analyzer over one strain segment and a resolved merger sample.
#[derive(Debug, Clone, Copy)]
pub struct TimeFrequencyAnalyzer<'a> {
    strain: &'a StrainSegment,
    merger_idx: usize,
}

impl<'a> TimeFrequencyAnalyzer<'a> {
    pub fn new(strain: &'a StrainSegment, merger: MergerRef) -> Result<Self, AppError> {
        let merger_idx = strain.merger_index(merger)?;
        Ok(Self { strain, merger_idx })
    }

    pub fn merger_index(&self) -> usize {
        self.merger_idx
    }

    pub fn sample_rate(&self) -> f64 {
        self.strain.sample_rate
    }

    fn offset_index(&self, t: f64) -> usize {
        let pos = (self.merger_idx as f64 + t * self.strain.sample_rate).trunc();
        if pos <= 0.0 {
            0
        } else {
            (pos as usize).min(self.strain.len())
        }
    }

    /// Index range `[start, end)` of a merger-relative window.
    pub fn window(&self, t_start: f64, t_end: f64) -> (usize, usize) {
        let start = self.offset_index(t_start);
        let end = self.offset_index(t_end).max(start);
        (start, end)
    }

    /// Samples of a merger-relative window.
    pub fn segment(&self, t_start: f64, t_end: f64) -> &'a [f64] {
        let (start, end) = self.window(t_start, t_end);
        &self.strain.data[start..end]
    }

    fn relative_time(&self, idx: usize) -> f64 {
        (idx as f64 - self.merger_idx as f64) / self.strain.sample_rate
    }

    /// Band-pass (causal, 4th order) then Hilbert-transform the window.
    ///
    /// Windows under 50 samples give an empty track.
    pub fn instantaneous_frequency(&self, t_start: f64, t_end: f64, band: (f64, f64)) -> Result<FrequencyTrack, AppError> {
        let (start, _) = self.window(t_start, t_end);
        let segment = self.segment(t_start, t_end);
        if segment.len() < MIN_SEGMENT_SAMPLES {
            tracing::debug!(
                "instantaneous frequency window [{t_start}, {t_end}] s has {} samples (merger index {}, {} total)",
                segment.len(),
                self.merger_idx,
                self.strain.len()
            );
            return Ok(FrequencyTrack::default());
        }

        let fs = self.strain.sample_rate;
        let sos = butter_bandpass(IF_FILTER_ORDER, band.0, band.1, fs)?;
        let filtered = sos.filter(segment);
        let (amplitude, frequency) = envelope_and_frequency(&filtered, fs);
        let t0 = self.relative_time(start);
        let times = (0..frequency.len()).map(|i| t0 + i as f64 / fs).collect();

        Ok(FrequencyTrack {
            times,
            frequency,
            amplitude,
        })
    }

    /// Look for an amplitude-weighted frequency deviation from `expected`.
    ///
    /// Detection needs `|deviation| > tolerance` and a significance above 3σ
    /// against the scatter of the low-amplitude samples. Deviations over 100 %
    /// are reported as analysis artifacts, never as detections.
    pub fn detect_frequency_jump(
        &self,
        t_start: f64,
        t_end: f64,
        expected: f64,
        tolerance: f64,
    ) -> Result<JumpResult, AppError> {
        let track = self.instantaneous_frequency(t_start, t_end, (expected * 0.7, expected * 1.3))?;
        if track.is_empty() {
            return Ok(JumpResult::rejected("Insufficient signal (empty segment)", track));
        }

        let max_amp = track.amplitude.iter().copied().fold(0.0, f64::max);
        if max_amp == 0.0 {
            return Ok(JumpResult::rejected("Zero amplitude", track));
        }

        let valid: Vec<usize> = (0..track.len())
            .filter(|&i| track.amplitude[i] / max_amp > 0.1)
            .collect();
        if valid.len() < 10 {
            return Ok(JumpResult::rejected("Insufficient signal", FrequencyTrack::default()));
        }

        let weight = |i: usize| track.amplitude[i] / max_amp;
        let deviation = |i: usize| (track.frequency[i] - expected) / expected;

        let (best, max_dev) = valid
            .iter()
            .map(|&i| (i, deviation(i) * weight(i)))
            .fold((valid[0], 0.0_f64), |acc, (i, wd)| if wd.abs() > acc.1.abs() { (i, wd) } else { acc });

        let low: Vec<f64> = valid.iter().filter(|&&i| weight(i) < 0.3).map(|&i| deviation(i)).collect();
        let noise_std = if low.len() > 5 {
            std_population(&low).unwrap_or(0.0)
        } else {
            0.01
        };
        let significance = if noise_std > 0.0 { max_dev.abs() / noise_std } else { 0.0 };

        let mut detected = max_dev.abs() > tolerance && significance > 3.0;
        let message = if max_dev.abs() > 1.0 {
            detected = false;
            format!("Unrealistic deviation ({:.1}%) - likely analysis error", max_dev * 100.0)
        } else if detected {
            "Anomaly detected!".to_string()
        } else {
            "No significant deviation".to_string()
        };

        let kept = FrequencyTrack {
            times: valid.iter().map(|&i| track.times[i]).collect(),
            frequency: valid.iter().map(|&i| track.frequency[i]).collect(),
            amplitude: valid.iter().map(|&i| track.amplitude[i]).collect(),
        };

        Ok(JumpResult {
            measured: true,
            detected,
            max_deviation: max_dev,
            time_of_max: track.times[best],
            significance,
            message,
            track: kept,
        })
    }

    /// High-overlap magnitude spectrogram; times are seconds after merger.
    ///
    /// Windows shorter than `nperseg` fall back to `max(16, len/4)` samples
    /// per segment with 50 % overlap.
    pub fn spectrogram_analysis(&self, t_start: f64, t_end: f64, nperseg: usize, overlap: f64) -> TimeFrequencyMap {
        let (start, _) = self.window(t_start, t_end);
        let segment = self.segment(t_start, t_end);

        let (nperseg, overlap) = if segment.len() < nperseg {
            ((segment.len() / 4).max(16), 0.5)
        } else {
            (nperseg, overlap)
        };
        let noverlap = ((nperseg as f64 * overlap) as usize).min(nperseg.saturating_sub(1));

        let mut map = spectrogram(segment, self.strain.sample_rate, nperseg, noverlap);
        let t0 = self.relative_time(start);
        for t in map.times.iter_mut() {
            *t += t0;
        }
        map
    }

    /// Morlet CWT magnitude over `freq_range` (200 linearly spaced rows).
    pub fn continuous_wavelet_transform(&self, t_start: f64, t_end: f64, freq_range: (f64, f64)) -> TimeFrequencyMap {
        let (start, _) = self.window(t_start, t_end);
        let segment = self.segment(t_start, t_end);
        let freqs = linspace(freq_range.0, freq_range.1, CWT_FREQUENCIES);
        let mut map = morlet_cwt(segment, self.strain.sample_rate, &freqs, MORLET_W);
        let t0 = self.relative_time(start);
        for t in map.times.iter_mut() {
            *t += t0;
        }
        map
    }
}

/// Amplitude-weighted mean frequency of a track.
pub fn mean_frequency(track: &FrequencyTrack) -> Option<f64> {
    let total: f64 = track.amplitude.iter().sum();
    if track.is_empty() || total <= 0.0 {
        return None;
    }
    Some(
        track
            .frequency
            .iter()
            .zip(&track.amplitude)
            .map(|(f, a)| f * a)
            .sum::<f64>()
            / total,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    const FS: f64 = 4096.0;
    const MERGER: usize = 100;

    /// Zeros up to the merger, then a damped sinusoid.
    fn ringdown_strain(freq: f64, tau: f64) -> StrainSegment {
        let n = (0.2 * FS) as usize;
        let data = (0..n)
            .map(|i| {
                if i < MERGER {
                    0.0
                } else {
                    let t = (i - MERGER) as f64 / FS;
                    (-t / tau).exp() * (2.0 * PI * freq * t).cos()
                }
            })
            .collect();
        StrainSegment::new(1_000_000_000.0, FS, data).unwrap()
    }

    fn analyzer(strain: &StrainSegment) -> TimeFrequencyAnalyzer<'_> {
        TimeFrequencyAnalyzer::new(strain, MergerRef::Index(MERGER as u64)).unwrap()
    }

    #[test]
    fn short_window_gives_empty_track() {
        let strain = ringdown_strain(250.0, 0.004);
        let tf = analyzer(&strain);
        // 10 ms at 4096 Hz is 40 samples.
        let track = tf.instantaneous_frequency(0.0, 0.01, (175.0, 325.0)).unwrap();
        assert!(track.times.is_empty());
        assert!(track.frequency.is_empty());
        assert!(track.amplitude.is_empty());

        let jump = tf.detect_frequency_jump(0.0, 0.01, 250.0, 0.05).unwrap();
        assert!(!jump.detected);
        assert!(!jump.measured);
        assert_eq!(jump.message, "Insufficient signal (empty segment)");
    }

    #[test]
    fn gps_merger_reference_matches_index() {
        let strain = ringdown_strain(250.0, 0.004);
        let gps = strain.time_at(MERGER);
        let tf = TimeFrequencyAnalyzer::new(&strain, MergerRef::GpsTime(gps)).unwrap();
        assert_eq!(tf.merger_index(), MERGER);
        assert_eq!(tf.window(0.0, 0.05), (100, 304));
    }

    #[test]
    fn track_follows_a_steady_tone() {
        let n = 4096;
        let data: Vec<f64> = (0..n).map(|i| (2.0 * PI * 250.0 * i as f64 / FS).sin()).collect();
        let strain = StrainSegment::new(0.0, FS, data).unwrap();
        let tf = TimeFrequencyAnalyzer::new(&strain, MergerRef::Index(0)).unwrap();
        let track = tf.instantaneous_frequency(0.0, 0.5, (175.0, 325.0)).unwrap();
        assert_eq!(track.len(), 2047);
        assert!((track.times[0]).abs() < 1e-12);
        // Skip the filter start-up and the FFT edge.
        for f in &track.frequency[600..1600] {
            assert!((f - 250.0).abs() < 1.0, "{f}");
        }
    }

    #[test]
    fn ringdown_at_expected_frequency_is_not_flagged() {
        let strain = ringdown_strain(250.0, 0.004);
        let jump = analyzer(&strain).detect_frequency_jump(0.0, 0.05, 250.0, 0.05).unwrap();
        assert!(!jump.detected, "{jump:?}");
        assert!(jump.max_deviation.abs() < 0.1);
    }

    #[test]
    fn shifted_ringdown_is_flagged() {
        let strain = ringdown_strain(300.0, 0.01);
        let jump = analyzer(&strain).detect_frequency_jump(0.0, 0.05, 250.0, 0.05).unwrap();
        assert!(jump.measured && jump.detected, "{jump:?}");
        assert!(jump.max_deviation > 0.05);
        assert_eq!(jump.message, "Anomaly detected!");
    }

    #[test]
    fn pure_noise_rarely_triggers_detection() {
        let mut rng = StdRng::seed_from_u64(2024);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let trials = 400;
        let mut detections = 0;
        for _ in 0..trials {
            let data: Vec<f64> = (0..(0.2 * FS) as usize).map(|_| normal.sample(&mut rng)).collect();
            let strain = StrainSegment::new(0.0, FS, data).unwrap();
            let jump = analyzer(&strain).detect_frequency_jump(0.0, 0.05, 250.0, 0.05).unwrap();
            if jump.detected {
                detections += 1;
            }
        }
        // At most 5 % false positives.
        assert!(detections * 20 <= trials, "{detections} detections in {trials} trials");
    }

    #[test]
    fn spectrogram_shrinks_segment_for_short_windows() {
        let strain = ringdown_strain(250.0, 0.01);
        let tf = analyzer(&strain);
        let map = tf.spectrogram_analysis(0.0, 0.05, 256, 0.95);
        // 204 samples < 256 -> nperseg 51, overlap 25.
        assert_eq!(map.frequencies.len(), 26);
        assert!(!map.times.is_empty());
        assert!(map.times[0] > 0.0 && map.times[0] < 0.05);

        let long = tf.spectrogram_analysis(-0.02, 0.15, 256, 0.95);
        assert_eq!(long.frequencies.len(), 129);
    }

    #[test]
    fn wavelet_map_peaks_near_ringdown_frequency() {
        let strain = ringdown_strain(250.0, 0.02);
        let tf = analyzer(&strain);
        let map = tf.continuous_wavelet_transform(0.0, 0.05, (50.0, 500.0));
        assert_eq!(map.frequencies.len(), 200);
        let column: Vec<f64> = map.magnitude.iter().map(|row| row[60]).collect();
        let best = column
            .iter()
            .enumerate()
            .fold((0, 0.0), |acc, (i, &m)| if m > acc.1 { (i, m) } else { acc })
            .0;
        assert!((map.frequencies[best] - 250.0).abs() < 30.0);
    }

    #[test]
    fn weighted_mean_frequency() {
        let track = FrequencyTrack {
            times: vec![0.0, 1.0],
            frequency: vec![200.0, 300.0],
            amplitude: vec![1.0, 3.0],
        };
        assert_eq!(mean_frequency(&track), Some(275.0));
        assert_eq!(mean_frequency(&FrequencyTrack::default()), None);
    }
}
