//! Linear least squares solver.
//!
//! For a fixed `(f, τ)` the single-mode ringdown is linear in two coefficients:
//!
//! ```text
//! h(t) = c1 · e^{-t/τ} cos(2π f t) + c2 · e^{-t/τ} sin(2π f t)
//! c1 = A cos φ,  c2 = -A sin φ
//! ```
//!
//! so the seed grid search solves this small tall system once per grid point.
//!
//! Implementation choices:
//! - SVD handles tall (n × 2) design matrices robustly.
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)
//! - Very short or strongly damped windows make the two columns nearly
//!   collinear, so a few progressively looser singular-value cutoffs are tried.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    if x.nrows() != y.len() || x.nrows() < x.ncols() {
        return None;
    }
    let svd = x.clone().svd(true, true);

    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Sum of squared residuals `‖y - X β‖²`.
pub fn residual_sum_of_squares(x: &DMatrix<f64>, y: &DVector<f64>, beta: &DVector<f64>) -> f64 {
    (y - x * beta).norm_squared()
}
