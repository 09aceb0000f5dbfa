//! Damped-sinusoid ringdown fitting.
//!
//! Given:
//! - a strain window starting at (or just after) the merger
//! - an initial guess for each mode
//! - box bounds on `[A, τ, f, φ]`
//!
//! we:
//! - scan a `(τ, f)` seed grid, solving the linear sub-problem for the
//!   amplitude/phase quadratures at each point (parallel)
//! - refine from the better of the caller's guess and the grid best with
//!   bounded Levenberg–Marquardt
//! - read 1σ uncertainties off the covariance diagonal
//!
//! A fit that cannot be trusted comes back with `success == false` and a
//! message; it is never an `Err`.

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::debug;

use crate::domain::{Estimate, ModeFit, RingdownFit};
use crate::fit::grid::seed_grid;
use crate::math::{
    Bounds, LeastSquaresProblem, LmOptions, covariance, levenberg_marquardt, residual_sum_of_squares,
    solve_least_squares,
};
use crate::models::{PARAMS_PER_MODE, fill_jacobian_row, predict};

/// Windows shorter than this are not fitted.
pub const MIN_FIT_SAMPLES: usize = 50;

const TAU_STEPS: usize = 30;
const FREQ_STEPS: usize = 81;

/// Initial guess for one mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeGuess {
    pub amplitude: f64,
    pub damping_time: f64,
    pub frequency: f64,
    pub phase: f64,
}

impl ModeGuess {
    fn to_params(self) -> [f64; PARAMS_PER_MODE] {
        [self.amplitude, self.damping_time, self.frequency, self.phase]
    }
}

/// Per-mode parameter bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeBounds {
    pub amplitude_max: f64,
    pub damping_time: (f64, f64),
    pub frequency: (f64, f64),
}

impl ModeBounds {
    /// `A ≥ 0`, `τ ∈ [1 ms, 100 ms]`, `f` in the given band, `φ ∈ [-π, π]`.
    pub fn for_band(frequency: (f64, f64)) -> Self {
        Self {
            amplitude_max: f64::INFINITY,
            damping_time: (0.001, 0.1),
            frequency,
        }
    }

    fn lower(&self) -> [f64; PARAMS_PER_MODE] {
        [0.0, self.damping_time.0, self.frequency.0, -PI]
    }

    fn upper(&self) -> [f64; PARAMS_PER_MODE] {
        [self.amplitude_max, self.damping_time.1, self.frequency.1, PI]
    }
}

struct RingdownProblem<'a> {
    times: Vec<f64>,
    y: &'a [f64],
    n_params: usize,
}

impl LeastSquaresProblem for RingdownProblem<'_> {
    fn n_params(&self) -> usize {
        self.n_params
    }

    fn n_residuals(&self) -> usize {
        self.y.len()
    }

    fn residuals(&self, params: &[f64], out: &mut [f64]) {
        for ((r, &t), &y) in out.iter_mut().zip(&self.times).zip(self.y) {
            *r = y - predict(t, params);
        }
    }

    fn jacobian(&self, params: &[f64], out: &mut DMatrix<f64>) {
        let mut row = vec![0.0; params.len()];
        for (i, &t) in self.times.iter().enumerate() {
            fill_jacobian_row(t, params, &mut row);
            for (j, v) in row.iter().enumerate() {
                out[(i, j)] = *v;
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    idx: usize,
    params: [f64; PARAMS_PER_MODE],
    sse: f64,
}

/// Fit a single damped sinusoid to `data` (time measured from its first sample).
pub fn fit_ringdown(data: &[f64], sample_rate: f64, guess: &ModeGuess, bounds: &ModeBounds) -> RingdownFit {
    let n = data.len();
    if n < MIN_FIT_SAMPLES {
        return RingdownFit::failed(
            format!("Insufficient samples for fit ({n} < {MIN_FIT_SAMPLES})"),
            n,
        );
    }
    let times = sample_times(n, sample_rate);

    let mut start = guess.to_params();
    clamp_mode(&mut start, bounds);
    let guess_sse = sse_of(&times, data, &start);

    match grid_seed(&times, data, bounds) {
        Some(best) if best.sse < guess_sse || !guess_sse.is_finite() => {
            debug!(
                "grid seed f={:.1} Hz tau={:.2} ms (sse {:.3e})",
                best.params[2],
                best.params[1] * 1e3,
                best.sse
            );
            start = best.params;
        }
        _ => {}
    }

    refine(times, data, start.to_vec(), &[*bounds])
}

/// Fit the sum of `guesses.len()` damped sinusoids; each mode gets `bounds[k]`.
pub fn fit_multimode(data: &[f64], sample_rate: f64, guesses: &[ModeGuess], bounds: &[ModeBounds]) -> RingdownFit {
    let n = data.len();
    if guesses.is_empty() || guesses.len() != bounds.len() {
        return RingdownFit::failed("One guess and one bound set are needed per mode", n);
    }
    if n < MIN_FIT_SAMPLES {
        return RingdownFit::failed(
            format!("Insufficient samples for fit ({n} < {MIN_FIT_SAMPLES})"),
            n,
        );
    }
    if n <= guesses.len() * PARAMS_PER_MODE {
        return RingdownFit::failed("More parameters than samples", n);
    }
    let times = sample_times(n, sample_rate);
    let mut start = Vec::with_capacity(guesses.len() * PARAMS_PER_MODE);
    for (g, b) in guesses.iter().zip(bounds) {
        let mut p = g.to_params();
        clamp_mode(&mut p, b);
        start.extend_from_slice(&p);
    }
    refine(times, data, start, bounds)
}

fn refine(times: Vec<f64>, data: &[f64], start: Vec<f64>, bounds: &[ModeBounds]) -> RingdownFit {
    let n = data.len();
    let box_bounds = Bounds {
        lower: bounds.iter().flat_map(|b| b.lower()).collect(),
        upper: bounds.iter().flat_map(|b| b.upper()).collect(),
    };
    let problem = RingdownProblem {
        times,
        y: data,
        n_params: start.len(),
    };
    let opts = LmOptions::default();

    let Some(outcome) = levenberg_marquardt(&problem, &start, &box_bounds, &opts) else {
        return RingdownFit::failed("Model produced non-finite residuals at the starting point", n);
    };
    if !outcome.converged {
        return RingdownFit {
            iterations: outcome.iterations,
            sse: outcome.sse,
            ..RingdownFit::failed(
                format!("Fit did not converge within {} iterations", opts.max_iterations),
                n,
            )
        };
    }
    let Some(cov) = covariance(&outcome.jtj, outcome.sse, n) else {
        return RingdownFit {
            iterations: outcome.iterations,
            sse: outcome.sse,
            ..RingdownFit::failed("Covariance matrix is singular; parameters are not constrained", n)
        };
    };

    let sigma = |k: usize| cov[(k, k)].max(0.0).sqrt();
    let modes = outcome
        .params
        .chunks_exact(PARAMS_PER_MODE)
        .enumerate()
        .map(|(m, p)| {
            let base = m * PARAMS_PER_MODE;
            ModeFit {
                amplitude: Estimate { value: p[0], sigma: sigma(base) },
                damping_time: Estimate { value: p[1], sigma: sigma(base + 1) },
                frequency: Estimate { value: p[2], sigma: sigma(base + 2) },
                phase: Estimate { value: p[3], sigma: sigma(base + 3) },
            }
        })
        .collect();

    RingdownFit {
        success: true,
        message: "Fit converged".to_string(),
        modes,
        sse: outcome.sse,
        n_samples: n,
        iterations: outcome.iterations,
    }
}

/// Best `(τ, f)` grid point with the amplitude and phase solved linearly.
fn grid_seed(times: &[f64], y: &[f64], bounds: &ModeBounds) -> Option<Candidate> {
    let grid = seed_grid(bounds.damping_time, TAU_STEPS, bounds.frequency, FREQ_STEPS).ok()?;
    let yv = DVector::from_column_slice(y);

    // Evaluate each grid point independently (parallel).
    let candidates: Vec<Candidate> = grid
        .par_iter()
        .enumerate()
        .filter_map(|(idx, &(tau, freq))| {
            let mut x = DMatrix::<f64>::zeros(times.len(), 2);
            for (i, &t) in times.iter().enumerate() {
                let env = (-t / tau).exp();
                let (s, c) = (2.0 * PI * freq * t).sin_cos();
                x[(i, 0)] = env * c;
                x[(i, 1)] = env * s;
            }
            let mut coef = solve_least_squares(&x, &yv)?;
            let (c1, c2) = (coef[0], coef[1]);
            let norm = c1.hypot(c2);
            let amplitude = norm.min(bounds.amplitude_max);
            let phase = if amplitude > 0.0 { (-c2).atan2(c1) } else { 0.0 };
            if amplitude < norm {
                coef *= amplitude / norm;
            }
            let sse = residual_sum_of_squares(&x, &yv, &coef);
            let params = [amplitude, tau, freq, phase];
            sse.is_finite().then_some(Candidate { idx, params, sse })
        })
        .collect();

    // Deterministic selection: pick the minimum SSE; break ties by grid index.
    let mut iter = candidates.into_iter();
    let mut best = iter.next()?;
    for c in iter {
        if c.sse < best.sse || (c.sse == best.sse && c.idx < best.idx) {
            best = c;
        }
    }
    Some(best)
}

fn clamp_mode(p: &mut [f64; PARAMS_PER_MODE], bounds: &ModeBounds) {
    let (lo, hi) = (bounds.lower(), bounds.upper());
    for k in 0..PARAMS_PER_MODE {
        p[k] = if p[k].is_finite() { p[k].clamp(lo[k], hi[k]) } else { lo[k].max(0.0).min(hi[k]) };
    }
}

fn sample_times(n: usize, sample_rate: f64) -> Vec<f64> {
    (0..n).map(|i| i as f64 / sample_rate).collect()
}

fn sse_of(times: &[f64], y: &[f64], params: &[f64]) -> f64 {
    times
        .iter()
        .zip(y)
        .map(|(&t, &v)| {
            let r = v - predict(t, params);
            r * r
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::synthesize;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    const FS: f64 = 4096.0;

    fn guess() -> ModeGuess {
        ModeGuess {
            amplitude: 0.5,
            damping_time: 0.01,
            frequency: 230.0,
            phase: 0.0,
        }
    }

    #[test]
    fn recovers_injected_damped_sinusoid() {
        let n = (0.1 * FS) as usize;
        let data = synthesize(&[1.0, 0.004, 250.0, 0.0], FS, n);
        let fit = fit_ringdown(&data, FS, &guess(), &ModeBounds::for_band((200.0, 300.0)));
        assert!(fit.success, "{}", fit.message);
        let mode = fit.fundamental().unwrap();
        assert!((mode.frequency.value - 250.0).abs() / 250.0 < 0.01, "{:?}", mode.frequency);
        assert!((mode.damping_time.value - 0.004).abs() / 0.004 < 0.10, "{:?}", mode.damping_time);
        assert!(mode.frequency.sigma >= 0.0 && mode.damping_time.sigma >= 0.0);
    }

    #[test]
    fn recovers_parameters_in_noise() {
        let n = (0.1 * FS) as usize;
        let clean = synthesize(&[1.0, 0.004, 250.0, 0.7], FS, n);
        let mut rng = StdRng::seed_from_u64(42);
        let normal = Normal::new(0.0, 0.05).unwrap();
        let data: Vec<f64> = clean.iter().map(|v| v + normal.sample(&mut rng)).collect();

        let fit = fit_ringdown(&data, FS, &guess(), &ModeBounds::for_band((200.0, 300.0)));
        assert!(fit.success, "{}", fit.message);
        let mode = fit.fundamental().unwrap();
        assert!((mode.frequency.value - 250.0).abs() < 5.0);
        assert!((mode.damping_time.value - 0.004).abs() / 0.004 < 0.2);
        assert!((mode.phase.value - 0.7).abs() < 0.3);
        assert!(mode.frequency.sigma > 0.0);
    }

    #[test]
    fn grid_seed_error_matches_the_seed_parameters() {
        let times = sample_times(400, FS);
        let data = synthesize(&[1.0, 0.004, 250.0, 0.3], FS, times.len());
        let free = ModeBounds::for_band((200.0, 300.0));
        let capped = ModeBounds { amplitude_max: 0.5, ..free };
        for bounds in [free, capped] {
            let best = grid_seed(&times, &data, &bounds).unwrap();
            let direct = sse_of(&times, &data, &best.params);
            assert!((best.sse - direct).abs() <= 1e-9 * direct.max(1.0), "{} vs {direct}", best.sse);
            assert!(best.params[0] <= bounds.amplitude_max);
        }
    }

    #[test]
    fn short_window_is_a_failed_fit() {
        let data = synthesize(&[1.0, 0.004, 250.0, 0.0], FS, 40);
        let fit = fit_ringdown(&data, FS, &guess(), &ModeBounds::for_band((200.0, 300.0)));
        assert!(!fit.success);
        assert!(fit.message.contains("Insufficient"));
        assert!(fit.fundamental().is_none());
    }

    #[test]
    fn fit_stays_inside_bounds() {
        // True frequency 250 Hz lies above the allowed band.
        let n = (0.1 * FS) as usize;
        let data = synthesize(&[1.0, 0.004, 250.0, 0.0], FS, n);
        let fit = fit_ringdown(&data, FS, &guess(), &ModeBounds::for_band((150.0, 220.0)));
        for m in &fit.modes {
            assert!(m.frequency.value <= 220.0 && m.frequency.value >= 150.0);
            assert!(m.damping_time.value >= 0.001 && m.damping_time.value <= 0.1);
        }
    }

    #[test]
    fn multimode_recovers_two_components() {
        let n = (0.1 * FS) as usize;
        let truth = [1.0, 0.006, 250.0, 0.0, 0.5, 0.003, 395.0, 0.5];
        let data = synthesize(&truth, FS, n);
        let guesses = [
            ModeGuess { amplitude: 0.8, damping_time: 0.005, frequency: 255.0, phase: 0.1 },
            ModeGuess { amplitude: 0.4, damping_time: 0.002, frequency: 390.0, phase: 0.3 },
        ];
        let bounds = [
            ModeBounds::for_band((200.0, 320.0)),
            ModeBounds::for_band((320.0, 480.0)),
        ];
        let fit = fit_multimode(&data, FS, &guesses, &bounds);
        assert!(fit.success, "{}", fit.message);
        assert_eq!(fit.modes.len(), 2);
        assert!((fit.modes[0].frequency.value - 250.0).abs() < 0.5);
        assert!((fit.modes[1].frequency.value - 395.0).abs() < 1.0);
    }

    #[test]
    fn multimode_rejects_mismatched_bounds() {
        let data = vec![0.0; 200];
        let fit = fit_multimode(&data, FS, &[guess()], &[]);
        assert!(!fit.success);
    }
}
