//! Strain preprocessing.
//!
//! Raw detector strain goes through:
//!
//! 1. whitening against its own Welch PSD
//! 2. a zero-phase Butterworth band-pass
//! 3. an edge crop that removes filter transients
//!
//! Afterwards the merger is located as the loudest sample and the segment is
//! sanity-checked before it is cached.

use tracing::{debug, info, warn};

use crate::domain::StrainSegment;
use crate::dsp::butter_bandpass;
use crate::dsp::psd::whiten;
use crate::error::AppError;

/// Band-pass and whitening settings.
#[derive(Debug, Clone)]
pub struct PreprocessOptions {
    pub band: (f64, f64),
    pub order: usize,
    /// Whitening FFT length in seconds; `None` picks `min(4, dur/4)`.
    pub fftlength: Option<f64>,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            band: (20.0, 400.0),
            order: 8,
            fftlength: None,
        }
    }
}

/// Whiten, band-pass and edge-crop a strain segment.
pub fn preprocess_strain(strain: &StrainSegment, opts: &PreprocessOptions) -> Result<StrainSegment, AppError> {
    if strain.is_empty() {
        return Err(AppError::data("Cannot preprocess an empty strain segment."));
    }
    let fs = strain.sample_rate;
    let duration = strain.duration();

    let auto = (duration / 4.0).min(4.0);
    let fftlength = match opts.fftlength {
        Some(len) if len <= duration / 4.0 => len,
        _ => {
            debug!("whitening fftlength auto-set to {auto:.2}s for {duration:.2}s of data");
            auto
        }
    };

    info!("whitening (fftlength={fftlength:.2}s)");
    let white = match whiten(&strain.data, fs, fftlength) {
        Ok(w) => w,
        Err(err) => {
            let retry = (duration / 8.0).max(0.25);
            warn!("whitening failed ({err}); retrying with fftlength={retry:.2}s");
            whiten(&strain.data, fs, retry)?
        }
    };

    let (fmin, fmax) = opts.band;
    info!("band-pass {fmin}-{fmax} Hz");
    let sos = butter_bandpass(opts.order, fmin, fmax, fs)?;
    let filtered = sos.filtfilt(&white)?;

    let crop = (duration * 0.1).min(0.02);
    let out = StrainSegment::new(strain.t0, fs, filtered)?;
    if duration > 2.0 * crop {
        let n_crop = (crop * fs).round() as usize;
        debug!("cropping {:.0} ms from each end", crop * 1000.0);
        Ok(out.slice(n_crop, out.len().saturating_sub(n_crop)))
    } else {
        debug!("skipping edge crop (data too short)");
        Ok(out)
    }
}

/// Location of the loudest sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergerPeak {
    /// Index into the full segment.
    pub index: usize,
    pub gps_time: f64,
    pub amplitude: f64,
    /// Seconds of data from the peak to the end of the segment.
    pub post_merger: f64,
}

/// Find the merger as `argmax |h|`, optionally restricted to a GPS window.
///
/// Warns when fewer than `min_post_merger` seconds follow the peak.
pub fn find_merger_peak(
    strain: &StrainSegment,
    window: Option<(f64, f64)>,
    min_post_merger: f64,
) -> Result<MergerPeak, AppError> {
    let (lo, hi) = match window {
        Some((start, end)) => {
            let to_idx = |t: f64| ((t - strain.t0) * strain.sample_rate).round().clamp(0.0, strain.len() as f64) as usize;
            (to_idx(start), to_idx(end).max(to_idx(start)))
        }
        None => (0, strain.len()),
    };
    let (offset, amplitude) = strain.data[lo..hi]
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, v)| {
            let a = v.abs();
            match best {
                Some((_, b)) if b >= a => best,
                _ if a.is_nan() => best,
                _ => Some((i, a)),
            }
        })
        .ok_or_else(|| AppError::data("No samples in the merger search window."))?;

    let index = lo + offset;
    let post_merger = (strain.len() - index) as f64 / strain.sample_rate;
    let peak = MergerPeak {
        index,
        gps_time: strain.time_at(index),
        amplitude,
        post_merger,
    };
    info!(
        "merger peak at GPS {:.6} (index {}/{}), |h|={:.2e}, {:.1} ms after",
        peak.gps_time,
        index,
        strain.len(),
        amplitude,
        post_merger * 1000.0
    );
    if post_merger < min_post_merger {
        warn!(
            "only {:.1} ms of data after merger; at least {:.0} ms recommended for ringdown analysis",
            post_merger * 1000.0,
            min_post_merger * 1000.0
        );
    }
    Ok(peak)
}

/// Largest absolute value expected from whitened strain.
pub const MAX_WHITENED_AMPLITUDE: f64 = 1e3;

/// Result of the basic data-quality checks.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    pub passed: bool,
    pub lines: Vec<String>,
}

impl QualityReport {
    pub fn render(&self) -> String {
        let mut out = String::from("Data Quality Checks:\n");
        out.push_str(&"-".repeat(40));
        out.push('\n');
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&"-".repeat(40));
        out.push('\n');
        out
    }
}

/// NaN/Inf and duration are hard failures; an oversized amplitude only warns.
pub fn check_data_quality(strain: &StrainSegment) -> QualityReport {
    let mut lines = Vec::new();
    let mut passed = true;

    if strain.data.iter().any(|v| v.is_nan()) {
        lines.push("FAIL: NaN values detected".to_string());
        passed = false;
    } else {
        lines.push("PASS: No NaN values".to_string());
    }

    if strain.data.iter().any(|v| v.is_infinite()) {
        lines.push("FAIL: Inf values detected".to_string());
        passed = false;
    } else {
        lines.push("PASS: No Inf values".to_string());
    }

    let max_abs = strain
        .data
        .iter()
        .filter(|v| v.is_finite())
        .fold(0.0_f64, |m, v| m.max(v.abs()));
    if max_abs > MAX_WHITENED_AMPLITUDE {
        lines.push(format!("WARNING: Very large strain amplitude: {max_abs:.2e}"));
        lines.push("  (May indicate preprocessing issue)".to_string());
    } else {
        lines.push(format!("PASS: Reasonable amplitude ({max_abs:.2e})"));
    }

    let duration = strain.duration();
    if duration < 0.1 {
        lines.push(format!("FAIL: Duration too short: {duration:.3}s"));
        passed = false;
    } else {
        lines.push(format!("PASS: Sufficient duration ({duration:.2}s)"));
    }

    QualityReport { passed, lines }
}
