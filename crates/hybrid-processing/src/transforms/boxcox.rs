//! Box-Cox power transform with a maximum-likelihood lambda.

use crate::utils::{min_max, variance};

/// Lambda search interval.
pub const LAMBDA_BOUNDS: (f64, f64) = (-2.0, 2.0);

const GOLDEN_RATIO: f64 = 0.618_033_988_749_895;
const TOLERANCE: f64 = 1e-8;
const MAX_ITERATIONS: usize = 200;

/// Offset that makes every value strictly positive: `1 - min` when the
/// minimum is not positive, otherwise zero.
pub fn positive_shift(values: &[f64]) -> f64 {
    match min_max(values) {
        Some((min, _)) if min <= 0.0 => 1.0 - min,
        _ => 0.0,
    }
}

/// Box-Cox transform of one strictly positive value.
pub fn boxcox(value: f64, lambda: f64) -> f64 {
    if lambda.abs() < 1e-12 {
        value.ln()
    } else {
        (value.powf(lambda) - 1.0) / lambda
    }
}

/// Profile log-likelihood of `lambda` for strictly positive values.
fn log_likelihood(values: &[f64], lambda: f64, log_sum: f64) -> Option<f64> {
    let transformed: Vec<f64> = values.iter().map(|&v| boxcox(v, lambda)).collect();
    let var = variance(&transformed, 0)?;
    if var <= 0.0 || !var.is_finite() {
        return None;
    }
    let n = values.len() as f64;
    Some((lambda - 1.0) * log_sum - n / 2.0 * var.ln())
}

/// Fit lambda by maximizing the log-likelihood with a golden-section search
/// over [`LAMBDA_BOUNDS`].
///
/// Fails on fewer than two values, non-positive or non-finite values, and
/// constant data.
pub fn fit_lambda(values: &[f64]) -> Result<f64, String> {
    if values.len() < 2 {
        return Err("at least two values are required".to_string());
    }
    if values.iter().any(|&v| v <= 0.0 || !v.is_finite()) {
        return Err("values must be finite and strictly positive".to_string());
    }
    if let Some((min, max)) = min_max(values)
        && min == max
    {
        return Err("data must not be constant".to_string());
    }

    let log_sum: f64 = values.iter().map(|v| v.ln()).sum();
    let objective = |lambda: f64| {
        log_likelihood(values, lambda, log_sum).unwrap_or(f64::NEG_INFINITY)
    };

    let (mut lo, mut hi) = LAMBDA_BOUNDS;
    let mut a = hi - GOLDEN_RATIO * (hi - lo);
    let mut b = lo + GOLDEN_RATIO * (hi - lo);
    let mut fa = objective(a);
    let mut fb = objective(b);

    for _ in 0..MAX_ITERATIONS {
        if (hi - lo).abs() < TOLERANCE {
            break;
        }
        if fa < fb {
            lo = a;
            a = b;
            fa = fb;
            b = lo + GOLDEN_RATIO * (hi - lo);
            fb = objective(b);
        } else {
            hi = b;
            b = a;
            fb = fa;
            a = hi - GOLDEN_RATIO * (hi - lo);
            fa = objective(a);
        }
    }

    let lambda = (lo + hi) / 2.0;
    if objective(lambda).is_finite() {
        Ok(lambda)
    } else {
        Err("log-likelihood is undefined over the lambda range".to_string())
    }
}
