//! Bounded Levenberg–Marquardt for small nonlinear least squares problems.
//!
//! Minimizes `Σ (y_i - m(t_i; p))²` subject to box bounds on `p`.
//!
//! - Marquardt scaling: the damping term is `λ · diag(JᵀJ)`, so parameters with
//!   very different magnitudes (an amplitude of order 1, a damping time of a
//!   few ms, a frequency of a few hundred Hz) are treated evenly.
//! - Bounds are enforced by projecting every trial step onto the box.
//! - `λ` shrinks ×10 after an accepted step and grows ×10 after a rejected one.

use nalgebra::{DMatrix, DVector};

/// A least squares problem in terms of model predictions.
pub trait LeastSquaresProblem {
    fn n_params(&self) -> usize;
    fn n_residuals(&self) -> usize;
    /// Write `y_i - m(t_i; p)` into `out`.
    fn residuals(&self, params: &[f64], out: &mut [f64]);
    /// Write the model Jacobian `∂m(t_i; p)/∂p_j` into `out` (n × p).
    fn jacobian(&self, params: &[f64], out: &mut DMatrix<f64>);
}

/// Box constraints, one entry per parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    pub fn clamp(&self, params: &mut [f64]) {
        for (k, p) in params.iter_mut().enumerate() {
            *p = p.clamp(self.lower[k], self.upper[k]);
        }
    }

    pub fn contains(&self, params: &[f64]) -> bool {
        params
            .iter()
            .enumerate()
            .all(|(k, &p)| p >= self.lower[k] && p <= self.upper[k])
    }
}

#[derive(Debug, Clone)]
pub struct LmOptions {
    pub max_iterations: usize,
    pub initial_lambda: f64,
    /// Relative SSE decrease below which the fit is considered converged.
    pub ftol: f64,
    /// Relative parameter change below which the fit is considered converged.
    pub xtol: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            initial_lambda: 1e-3,
            ftol: 1e-12,
            xtol: 1e-10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub params: Vec<f64>,
    pub sse: f64,
    pub iterations: usize,
    pub converged: bool,
    /// `JᵀJ` at the returned parameters.
    pub jtj: DMatrix<f64>,
}

const LAMBDA_MAX: f64 = 1e12;
const LAMBDA_MIN: f64 = 1e-15;

/// Run bounded Levenberg–Marquardt from `start`.
///
/// Returns `None` when the starting point already produces non-finite residuals.
pub fn levenberg_marquardt<P: LeastSquaresProblem>(
    problem: &P,
    start: &[f64],
    bounds: &Bounds,
    opts: &LmOptions,
) -> Option<LmOutcome> {
    let m = problem.n_params();
    let n = problem.n_residuals();

    let mut params = start.to_vec();
    bounds.clamp(&mut params);

    let mut resid = vec![0.0; n];
    let mut trial_resid = vec![0.0; n];
    let mut jac = DMatrix::<f64>::zeros(n, m);

    problem.residuals(&params, &mut resid);
    let mut sse = sum_sq(&resid);
    if !sse.is_finite() {
        return None;
    }

    let mut lambda = opts.initial_lambda;
    let mut converged = sse == 0.0;
    let mut iterations = 0;

    while !converged && iterations < opts.max_iterations {
        iterations += 1;

        problem.jacobian(&params, &mut jac);
        let jtj = jac.transpose() * &jac;
        let g = jac.transpose() * DVector::from_column_slice(&resid);

        let mut accepted = false;
        while lambda <= LAMBDA_MAX {
            let mut a = jtj.clone();
            for k in 0..m {
                a[(k, k)] += lambda * jtj[(k, k)].max(1e-300);
            }
            let Some(chol) = a.cholesky() else {
                lambda *= 10.0;
                continue;
            };
            let delta = chol.solve(&g);

            let mut trial: Vec<f64> = params.iter().zip(delta.iter()).map(|(p, d)| p + d).collect();
            bounds.clamp(&mut trial);
            problem.residuals(&trial, &mut trial_resid);
            let trial_sse = sum_sq(&trial_resid);

            if trial_sse.is_finite() && trial_sse < sse {
                let sse_drop = sse - trial_sse;
                let max_step = params
                    .iter()
                    .zip(trial.iter())
                    .map(|(p, q)| (q - p).abs() / (p.abs() + opts.xtol))
                    .fold(0.0, f64::max);

                params = trial;
                std::mem::swap(&mut resid, &mut trial_resid);
                sse = trial_sse;
                lambda = (lambda / 10.0).max(LAMBDA_MIN);
                accepted = true;

                if sse == 0.0 || sse_drop <= opts.ftol * (sse + sse_drop) || max_step <= opts.xtol {
                    converged = true;
                }
                break;
            }
            lambda *= 10.0;
        }

        if !accepted {
            // No downhill step at any damping: we are at a (bounded) minimum.
            converged = true;
        }
    }

    problem.jacobian(&params, &mut jac);
    let jtj = jac.transpose() * &jac;

    Some(LmOutcome {
        params,
        sse,
        iterations,
        converged,
        jtj,
    })
}

/// Parameter covariance `(JᵀJ)⁻¹ · SSE / (n - p)`.
///
/// Returns `None` when `JᵀJ` is singular, there are no spare degrees of
/// freedom, or a diagonal entry comes out non-finite or negative.
pub fn covariance(jtj: &DMatrix<f64>, sse: f64, n_residuals: usize) -> Option<DMatrix<f64>> {
    let m = jtj.nrows();
    if n_residuals <= m {
        return None;
    }
    let inv = jtj.clone().try_inverse()?;
    let cov = inv * (sse / (n_residuals - m) as f64);
    let diag_ok = (0..m).all(|k| {
        let v = cov[(k, k)];
        v.is_finite() && v >= 0.0
    });
    if diag_ok { Some(cov) } else { None }
}

fn sum_sq(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = a · exp(b x)
    struct ExpDecay {
        x: Vec<f64>,
        y: Vec<f64>,
    }

    impl LeastSquaresProblem for ExpDecay {
        fn n_params(&self) -> usize {
            2
        }
        fn n_residuals(&self) -> usize {
            self.x.len()
        }
        fn residuals(&self, p: &[f64], out: &mut [f64]) {
            for i in 0..self.x.len() {
                out[i] = self.y[i] - p[0] * (p[1] * self.x[i]).exp();
            }
        }
        fn jacobian(&self, p: &[f64], out: &mut DMatrix<f64>) {
            for i in 0..self.x.len() {
                let e = (p[1] * self.x[i]).exp();
                out[(i, 0)] = e;
                out[(i, 1)] = p[0] * self.x[i] * e;
            }
        }
    }

    fn problem() -> ExpDecay {
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.1).collect();
        let y = x.iter().map(|&xi| 2.5 * (-1.3 * xi).exp()).collect();
        ExpDecay { x, y }
    }

    #[test]
    fn converges_on_exponential_decay() {
        let bounds = Bounds {
            lower: vec![0.0, -10.0],
            upper: vec![10.0, 0.0],
        };
        let out = levenberg_marquardt(&problem(), &[1.0, -0.5], &bounds, &LmOptions::default()).unwrap();
        assert!(out.converged);
        assert!((out.params[0] - 2.5).abs() < 1e-6);
        assert!((out.params[1] + 1.3).abs() < 1e-6);
    }

    #[test]
    fn respects_bounds() {
        // True b = -1.3 lies outside the box; the fit must stop on the boundary.
        let bounds = Bounds {
            lower: vec![0.0, -1.0],
            upper: vec![10.0, 0.0],
        };
        let out = levenberg_marquardt(&problem(), &[1.0, -0.5], &bounds, &LmOptions::default()).unwrap();
        assert!(bounds.contains(&out.params));
        assert!((out.params[1] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn covariance_requires_spare_dof() {
        let jtj = DMatrix::<f64>::identity(2, 2);
        assert!(covariance(&jtj, 1.0, 2).is_none());
        let cov = covariance(&jtj, 4.0, 6).unwrap();
        assert!((cov[(0, 0)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn covariance_rejects_singular_matrix() {
        let jtj = DMatrix::<f64>::zeros(2, 2);
        assert!(covariance(&jtj, 1.0, 10).is_none());
    }
}
