use num_traits::Float;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpolationError {
    #[error("Input theta level out of data bounds: requested {requested} K, data maximum {available} K")]
    LevelOutOfBounds { requested: f64, available: f64 },

    #[error("Target levels must be non-empty and strictly increasing")]
    UnsortedLevels,

    #[error("Vertical coordinate is not strictly monotonic: {0}")]
    NonMonotonicCoordinate(String),

    #[error("Vertical coordinate has non-positive values: {0}")]
    NonPositiveCoordinate(String),

    #[error("Pressure solve for theta {theta} K failed to converge in {iterations} iterations")]
    NotConverged { theta: f64, iterations: usize },
}

/// Generic linear interpolation between two values
pub fn lin_interp<T: Float>(v0: T, v1: T, fac: T) -> T {
    v0 + (v1 - v0) * fac
}

/// Linear interpolation between two points (traditional interface)
pub fn linear_interpolate(x0: f64, y0: f64, x1: f64, y1: f64, x: f64) -> f64 {
    if (x1 - x0).abs() < f64::EPSILON {
        return y0; // Avoid division by zero
    }
    let fac = (x - x0) / (x1 - x0);
    lin_interp(y0, y1, fac)
}

/// Values `start, start + step, ...` strictly below `stop`
pub fn arange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || stop <= start {
        return Vec::new();
    }
    let n = ((stop - start) / step).ceil() as usize;
    (0..n)
        .map(|k| start + k as f64 * step)
        .filter(|&v| v < stop)
        .collect()
}

/// Midpoints of a uniform partition of `[lo, hi]` into `n` bins
pub fn bin_midpoints(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    let width = (hi - lo) / n as f64;
    (0..n).map(|k| lo + (k as f64 + 0.5) * width).collect()
}

/// Returns `Some(true)` for strictly increasing, `Some(false)` for strictly
/// decreasing, `None` otherwise (including fewer than two values)
pub fn strict_monotonic_direction<T: Float>(values: &[T]) -> Option<bool> {
    if values.len() < 2 {
        return None;
    }
    if values.windows(2).all(|w| w[1] > w[0]) {
        Some(true)
    } else if values.windows(2).all(|w| w[1] < w[0]) {
        Some(false)
    } else {
        None
    }
}

/// First index `k >= 1` where `values[k] <= target` differs from
/// `values[k - 1] <= target`, scanning from the start of the column.
/// The bracketing pair is `(k - 1, k)`.
pub fn find_bounding_index(values: &[f64], target: f64) -> Option<usize> {
    values
        .windows(2)
        .position(|w| (w[0] <= target) != (w[1] <= target))
        .map(|k| k + 1)
}

/// Linear interpolation at `x` against ascending `xp`; `NaN` outside the range
pub fn interp_1d(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 || x.is_nan() || x < xp[0] || x > xp[n - 1] {
        return f64::NAN;
    }
    if n == 1 {
        return fp[0];
    }
    // Index of the first element >= x
    let above = xp[..n].partition_point(|&v| v < x).clamp(1, n - 1);
    let below = above - 1;
    linear_interpolate(xp[below], fp[below], xp[above], fp[above], x)
}

/// Linear interpolation of `values` at `target` along a column whose
/// coordinate may run in either direction. The first cell that brackets
/// the target (endpoints inclusive) is used; `NaN` when none does.
pub fn interp_bracketed(target: f64, coord: &[f64], values: &[f64]) -> f64 {
    let n = coord.len().min(values.len());
    for k in 1..n {
        let (c0, c1) = (coord[k - 1], coord[k]);
        let inside = (c0 <= target && target <= c1) || (c1 <= target && target <= c0);
        if inside {
            if c0 == c1 {
                return values[k - 1];
            }
            return lin_interp(values[k - 1], values[k], (target - c0) / (c1 - c0));
        }
    }
    f64::NAN
}
