//! Seed grid for the ringdown fitter.
//!
//! The nonlinear parameters `(τ, f)` are scanned on a fixed grid before local
//! refinement:
//! - `τ` is log-spaced (damping times span two decades)
//! - `f` is linearly spaced over the analysis band
//!
//! The grid is deterministic, so a fit is reproducible given the same inputs.

use crate::error::AppError;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > min) {
        return Err(AppError::input(format!(
            "Invalid log range: min={min}, max={max} (must be finite, >0, and max>min)."
        )));
    }
    if steps < 2 {
        return Err(AppError::input("Grid steps must be >= 2."));
    }

    let ln_min = min.ln();
    let step = (max.ln() - ln_min) / (steps as f64 - 1.0);
    Ok((0..steps).map(|i| (ln_min + step * i as f64).exp()).collect())
}

/// Generate `steps` evenly spaced points between `min` and `max` (inclusive).
pub fn lin_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && max > min) {
        return Err(AppError::input(format!("Invalid range: min={min}, max={max}.")));
    }
    if steps < 2 {
        return Err(AppError::input("Grid steps must be >= 2."));
    }
    let step = (max - min) / (steps as f64 - 1.0);
    Ok((0..steps).map(|i| min + step * i as f64).collect())
}

/// `(τ, f)` pairs, τ-major.
pub fn seed_grid(
    tau_range: (f64, f64),
    tau_steps: usize,
    freq_range: (f64, f64),
    freq_steps: usize,
) -> Result<Vec<(f64, f64)>, AppError> {
    let taus = log_space(tau_range.0, tau_range.1, tau_steps)?;
    let freqs = lin_space(freq_range.0, freq_range.1, freq_steps)?;
    Ok(taus
        .iter()
        .flat_map(|&tau| freqs.iter().map(move |&f| (tau, f)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_space_includes_endpoints() {
        let v = log_space(0.001, 0.1, 5).unwrap();
        assert!((v[0] - 0.001).abs() < 1e-15);
        assert!((v[2] - 0.01).abs() < 1e-12);
        assert!((v[v.len() - 1] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn seed_grid_is_tau_major() {
        let grid = seed_grid((0.001, 0.1), 3, (200.0, 300.0), 11).unwrap();
        assert_eq!(grid.len(), 33);
        assert!((grid[0].0 - 0.001).abs() < 1e-15);
        assert_eq!(grid[0].1, 200.0);
        assert!((grid[10].1 - 300.0).abs() < 1e-12);
        assert!((grid[11].0 - 0.01).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_ranges() {
        assert!(log_space(0.0, 1.0, 5).is_err());
        assert!(lin_space(2.0, 1.0, 5).is_err());
        assert!(seed_grid((0.001, 0.1), 1, (1.0, 2.0), 3).is_err());
    }
}
