//! Fundamental/overtone extraction and the overtone-ratio test.
//!
//! `prony_method` is an FFT approximation of Prony's method: the window is
//! multiplied by `exp(-n / (0.01 fs))`, transformed, and the strongest
//! spectral peaks are taken as mode frequencies. It does not estimate damping
//! times or phases; those stay `None` rather than carrying made-up values.

use serde::Serialize;

use crate::domain::{MergerRef, RingdownFit, StrainSegment};
use crate::dsp::PeakFinder;
use crate::dsp::fft::{rfft_frequencies, rfft_magnitude};
use crate::error::AppError;
use crate::fit::{ModeBounds, ModeGuess, fit_multimode, fit_ringdown};
use crate::models::QnmModel;

/// Fractional ratio deviation above which the overtone test is significant.
pub const RATIO_THRESHOLD: f64 = 0.01;

/// One spectral mode candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PronyMode {
    pub frequency: f64,
    pub amplitude: f64,
    pub damping_time: Option<f64>,
    pub phase: Option<f64>,
}

/// Observed vs predicted overtone-to-fundamental frequency ratio.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct OvertoneRatioTest {
    pub success: bool,
    pub message: String,
    pub f0_observed: f64,
    pub f1_observed: f64,
    pub ratio_observed: f64,
    pub ratio_predicted: f64,
    pub fractional_deviation: f64,
    pub significant: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct OvertoneAnalyzer<'a> {
    strain: &'a StrainSegment,
    merger_idx: usize,
}

impl<'a> OvertoneAnalyzer<'a> {
    pub fn new(strain: &'a StrainSegment, merger: MergerRef) -> Result<Self, AppError> {
        let merger_idx = strain.merger_index(merger)?;
        Ok(Self { strain, merger_idx })
    }

    fn segment(&self, t_start: f64, duration: f64) -> &'a [f64] {
        let fs = self.strain.sample_rate;
        let to_idx = |t: f64| {
            let pos = (self.merger_idx as f64 + t * fs).trunc();
            if pos <= 0.0 { 0 } else { (pos as usize).min(self.strain.len()) }
        };
        let start = to_idx(t_start);
        let end = to_idx(t_start + duration).max(start);
        &self.strain.data[start..end]
    }

    /// Up to `n_modes` spectral peaks, lowest frequency first.
    ///
    /// Candidates need at least 10 % of the maximum magnitude and 20 bins of
    /// separation; the `n_modes` strongest are kept.
    pub fn prony_method(&self, t_start: f64, duration: f64, n_modes: usize) -> Vec<PronyMode> {
        let segment = self.segment(t_start, duration);
        let n = segment.len();
        if n < 3 {
            return Vec::new();
        }
        let fs = self.strain.sample_rate;
        let decay = 0.01 * fs;
        let windowed: Vec<f64> = segment
            .iter()
            .enumerate()
            .map(|(i, v)| v * (-(i as f64) / decay).exp())
            .collect();

        let magnitude = rfft_magnitude(&windowed);
        let freqs = rfft_frequencies(n, fs);
        let mut peaks = PeakFinder::new()
            .with_min_height_ratio(0.1)
            .with_min_distance(20)
            .with_max_peaks(n_modes)
            .find_peaks(&magnitude, &freqs);
        peaks.sort_by(|a, b| a.frequency.partial_cmp(&b.frequency).unwrap_or(std::cmp::Ordering::Equal));

        peaks
            .into_iter()
            .map(|p| PronyMode {
                frequency: p.frequency,
                amplitude: p.amplitude,
                damping_time: None,
                phase: None,
            })
            .collect()
    }

    /// Compare the observed overtone ratio with the predicted `f221 / f220`.
    pub fn test_overtone_ratio(&self, qnm: &QnmModel, t_start: f64, duration: f64) -> OvertoneRatioTest {
        let modes = self.prony_method(t_start, duration, 2);
        if modes.len() < 2 {
            return OvertoneRatioTest {
                message: "Could not extract both fundamental and overtone".to_string(),
                ..OvertoneRatioTest::default()
            };
        }
        let f0 = modes[0].frequency;
        let f1 = modes[1].frequency;
        let ratio_observed = f1 / f0;
        let ratio_predicted = qnm.f_221() / qnm.f_220();
        let fractional_deviation = (ratio_observed - ratio_predicted) / ratio_predicted;
        let significant = fractional_deviation.abs() > RATIO_THRESHOLD;

        OvertoneRatioTest {
            success: true,
            message: format!(
                "Observed ratio {ratio_observed:.3} vs predicted {ratio_predicted:.3} ({:+.1}%)",
                fractional_deviation * 100.0
            ),
            f0_observed: f0,
            f1_observed: f1,
            ratio_observed,
            ratio_predicted,
            fractional_deviation,
            significant,
        }
    }

    /// Fit `n_modes` damped sinusoids (fundamental first, then overtones).
    ///
    /// The fundamental is seeded by a single-mode fit inside `band`; overtone
    /// `k` is seeded at `1.58^k` times its frequency and `0.35^k` times its
    /// damping time, with bounds widened to follow.
    pub fn fit_multimode(
        &self,
        t_start: f64,
        duration: f64,
        n_modes: usize,
        qnm: &QnmModel,
        band: (f64, f64),
    ) -> RingdownFit {
        let segment = self.segment(t_start, duration);
        let fs = self.strain.sample_rate;
        if n_modes == 0 {
            return RingdownFit::failed("At least one mode is required", segment.len());
        }

        let peak = segment.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let base_guess = ModeGuess {
            amplitude: peak,
            damping_time: qnm.tau_220().clamp(0.001, 0.1),
            frequency: qnm.f_220().clamp(band.0, band.1),
            phase: 0.0,
        };
        let base_bounds = ModeBounds::for_band(band);
        let single = fit_ringdown(segment, fs, &base_guess, &base_bounds);
        if n_modes == 1 || !single.success {
            return single;
        }
        let Some(fundamental) = single.fundamental() else {
            return single;
        };

        let nyquist = fs / 2.0;
        let freq_ratio = qnm.f_221() / qnm.f_220();
        let tau_ratio = qnm.tau_221() / qnm.tau_220();
        let mut guesses = Vec::with_capacity(n_modes);
        let mut bounds = Vec::with_capacity(n_modes);
        guesses.push(ModeGuess {
            amplitude: fundamental.amplitude.value,
            damping_time: fundamental.damping_time.value,
            frequency: fundamental.frequency.value,
            phase: fundamental.phase.value,
        });
        bounds.push(base_bounds);
        for k in 1..n_modes {
            let scale = freq_ratio.powi(k as i32);
            let hi = (band.1 * scale).min(nyquist * 0.99);
            let lo = (band.0 * scale).min(hi * 0.99);
            guesses.push(ModeGuess {
                amplitude: fundamental.amplitude.value * 0.5,
                damping_time: (fundamental.damping_time.value * tau_ratio.powi(k as i32)).max(0.001),
                frequency: (fundamental.frequency.value * scale).clamp(lo, hi),
                phase: 0.0,
            });
            bounds.push(ModeBounds::for_band((lo, hi)));
        }

        fit_multimode(segment, fs, &guesses, &bounds)
    }
}
