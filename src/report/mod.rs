//! Reporting utilities: statistical interpretation of a batch, plus the
//! formatted text that goes to the terminal and to `analysis_report.txt`.

use serde::Serialize;

use crate::analysis::{Metric, MultiEventStacker};

pub mod format;

pub use format::*;

/// Schwarzschild radius per solar mass (m).
pub const SCHWARZSCHILD_RADIUS_PER_MSUN: f64 = 2.95e3;
/// Planck length (m).
pub const PLANCK_LENGTH: f64 = 1.616e-35;

/// Implied ξ above which the result is physically meaningless.
const XI_NULL_THRESHOLD: f64 = 1e50;
/// Mean fractional deviations above this are not quantum gravity.
const UNREALISTIC_DEVIATION: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    NoEvidence,
    WeakHint,
    SignificantDeviation,
    StrongDeviation,
}

impl Verdict {
    pub fn from_sigma(sigma: f64) -> Self {
        if sigma < 2.0 {
            Verdict::NoEvidence
        } else if sigma < 3.0 {
            Verdict::WeakHint
        } else if sigma < 5.0 {
            Verdict::SignificantDeviation
        } else {
            Verdict::StrongDeviation
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Verdict::NoEvidence => "NO EVIDENCE for quantum effects",
            Verdict::WeakHint => "WEAK HINT (< 3σ)",
            Verdict::SignificantDeviation => "SIGNIFICANT DEVIATION (3-5σ)",
            Verdict::StrongDeviation => "STRONG DEVIATION (> 5σ)",
        }
    }

    pub fn confidence(self) -> &'static str {
        match self {
            Verdict::NoEvidence => "Results consistent with GR",
            Verdict::WeakHint => "Insufficient evidence, needs more events",
            Verdict::SignificantDeviation => "Warrants further investigation",
            Verdict::StrongDeviation => "Potential new physics or systematic error",
        }
    }
}

/// Combined-statistics reading of the stacked frequency deviations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interpretation {
    pub mean_deviation: f64,
    pub std_deviation: f64,
    pub combined_sigma: f64,
    pub verdict: Verdict,
    /// |mean| above 50 %.
    pub unrealistic: bool,
    /// `ξ` implied by the mean deviation; `None` for an exactly zero mean.
    pub xi: Option<f64>,
    pub null_result: bool,
}

/// `ξ` such that `δf/f = ξ (l_P / r_s)²` for a remnant of `mass` M☉.
pub fn implied_xi(mean_deviation: f64, mass: f64) -> f64 {
    let r_s = mass * SCHWARZSCHILD_RADIUS_PER_MSUN;
    mean_deviation / (PLANCK_LENGTH / r_s).powi(2)
}

/// Interpret the weighted max-deviation of a batch; `None` when no event
/// produced a deviation.
pub fn interpret(stacker: &MultiEventStacker) -> Option<Interpretation> {
    let (mean, std, combined_sigma) = stacker.compute_weighted_average(Metric::MaxDeviation);
    let (mean, std) = (mean?, std?);
    let unrealistic = mean.abs() > UNREALISTIC_DEVIATION;

    let xi = if mean != 0.0 {
        let masses: Vec<f64> = stacker.events().iter().map(|e| e.mass).collect();
        crate::math::mean(&masses).map(|m| implied_xi(mean, m))
    } else {
        None
    };
    let null_result = xi.is_some_and(|xi| xi > XI_NULL_THRESHOLD || unrealistic);

    Some(Interpretation {
        mean_deviation: mean,
        std_deviation: std,
        combined_sigma,
        verdict: Verdict::from_sigma(combined_sigma),
        unrealistic,
        xi,
        null_result,
    })
}
