//! Damped-sinusoid ringdown model.
//!
//! One mode is
//!
//! ```text
//! h(t) = A · exp(-t/τ) · cos(2π f t + φ)
//! ```
//!
//! with `t` measured from the start of the fitted window. An N-mode model is the
//! plain sum of N independent modes. Parameters are packed per mode in the
//! order `[A, τ, f, φ]`.
//!
//! The fitter relies on two primitive operations:
//! - predict `h(t)` for a packed parameter vector
//! - fill the Jacobian row `∂h/∂p` at one time sample

use std::f64::consts::PI;

/// Parameters per mode (`A`, `τ`, `f`, `φ`).
pub const PARAMS_PER_MODE: usize = 4;

/// Evaluate the summed model at time `t`.
///
/// # Panics
/// Panics if `params.len()` is not a multiple of `PARAMS_PER_MODE`.
pub fn predict(t: f64, params: &[f64]) -> f64 {
    assert_eq!(params.len() % PARAMS_PER_MODE, 0);
    params
        .chunks_exact(PARAMS_PER_MODE)
        .map(|p| {
            let (amp, tau, freq, phase) = (p[0], p[1], p[2], p[3]);
            amp * (-t / tau).exp() * (2.0 * PI * freq * t + phase).cos()
        })
        .sum()
}

/// Fill `out` with the partial derivatives of the model at time `t`.
///
/// # Panics
/// Panics if `out` and `params` differ in length.
pub fn fill_jacobian_row(t: f64, params: &[f64], out: &mut [f64]) {
    assert_eq!(out.len(), params.len());
    for (p, row) in params
        .chunks_exact(PARAMS_PER_MODE)
        .zip(out.chunks_exact_mut(PARAMS_PER_MODE))
    {
        let (amp, tau, freq, phase) = (p[0], p[1], p[2], p[3]);
        let envelope = (-t / tau).exp();
        let arg = 2.0 * PI * freq * t + phase;
        let (s, c) = arg.sin_cos();

        row[0] = envelope * c;
        row[1] = amp * envelope * c * t / (tau * tau);
        row[2] = -amp * envelope * s * 2.0 * PI * t;
        row[3] = -amp * envelope * s;
    }
}

/// Sample the model at `n` points spaced `1/sample_rate` apart.
pub fn synthesize(params: &[f64], sample_rate: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| predict(i as f64 / sample_rate, params))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_at_origin_is_a_cos_phi() {
        let p = [2.0, 0.004, 250.0, 0.3];
        assert!((predict(0.0, &p) - 2.0 * 0.3_f64.cos()).abs() < 1e-15);
    }

    #[test]
    fn two_modes_sum() {
        let a = [1.0, 0.004, 250.0, 0.0];
        let b = [0.5, 0.002, 395.0, 1.0];
        let both = [a, b].concat();
        let t = 0.0017;
        assert!((predict(t, &both) - predict(t, &a) - predict(t, &b)).abs() < 1e-15);
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let p = [1.3, 0.004, 251.0, -0.7];
        let t = 0.0031;
        let mut row = [0.0; 4];
        fill_jacobian_row(t, &p, &mut row);

        for k in 0..4 {
            let h = 1e-7 * p[k].abs().max(1e-3);
            let mut hi = p;
            let mut lo = p;
            hi[k] += h;
            lo[k] -= h;
            let fd = (predict(t, &hi) - predict(t, &lo)) / (2.0 * h);
            assert!((fd - row[k]).abs() < 1e-5 * row[k].abs().max(1.0), "param {k}");
        }
    }
}
