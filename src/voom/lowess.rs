//! Robust locally weighted regression (Cleveland's LOWESS)
//!
//! Smooths the mean-variance trend the voom weights are read from.
//! Local linear fits with tricube kernel weights, followed by bisquare
//! robustifying iterations to keep outlying genes from bending the curve.

use crate::error::{LimmaError, Result};
use crate::stats::median;

/// A fitted LOWESS curve: points sorted by x with their smoothed values
#[derive(Debug, Clone)]
pub struct LowessCurve {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl LowessCurve {
    /// Predict at x0 by linear interpolation, clamped at the curve ends.
    /// R equivalent: approxfun(l, rule=2)
    pub fn interpolate(&self, x0: f64) -> f64 {
        let n = self.x.len();
        if n == 0 {
            return f64::NAN;
        }
        if x0 <= self.x[0] {
            return self.y[0];
        }
        if x0 >= self.x[n - 1] {
            return self.y[n - 1];
        }
        // Binary search for the bracketing interval
        let mut lo = 0;
        let mut hi = n - 1;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.x[mid] <= x0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let (x1, x2) = (self.x[lo], self.x[hi]);
        let (y1, y2) = (self.y[lo], self.y[hi]);
        if x2 == x1 {
            return (y1 + y2) / 2.0;
        }
        y1 + (y2 - y1) * (x0 - x1) / (x2 - x1)
    }
}

/// Fit a LOWESS curve through (x, y).
/// R equivalent: lowess(x, y, f=span, iter=iterations)
///
/// `span` is the fraction of points in each local window (voom uses 0.5);
/// `iterations` counts the robustifying passes after the first fit.
pub fn lowess(x: &[f64], y: &[f64], span: f64, iterations: usize) -> Result<LowessCurve> {
    if x.len() != y.len() {
        return Err(LimmaError::DimensionMismatch {
            expected: format!("{} y values", x.len()),
            got: format!("{} y values", y.len()),
        });
    }
    let n = x.len();
    if n < 2 {
        return Err(LimmaError::InvalidInput {
            reason: "LOWESS needs at least 2 points".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&span) || span <= 0.0 {
        return Err(LimmaError::InvalidInput {
            reason: format!("LOWESS span must be in (0, 1], got {}", span),
        });
    }

    // Sort by x
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| x[a].partial_cmp(&x[b]).unwrap_or(std::cmp::Ordering::Equal));
    let xs: Vec<f64> = order.iter().map(|&i| x[i]).collect();
    let ys: Vec<f64> = order.iter().map(|&i| y[i]).collect();

    if xs.iter().any(|v| !v.is_finite()) || ys.iter().any(|v| !v.is_finite()) {
        return Err(LimmaError::InvalidInput {
            reason: "LOWESS input contains non-finite values".to_string(),
        });
    }

    let window = ((span * n as f64).ceil() as usize).clamp(2, n);
    let mut robustness = vec![1.0; n];
    let mut fitted = vec![0.0; n];

    for iteration in 0..=iterations {
        for i in 0..n {
            let (lo, hi) = neighbor_window(&xs, i, window);
            fitted[i] = local_linear(&xs, &ys, &robustness, i, lo, hi);
        }

        if iteration == iterations {
            break;
        }

        // Bisquare robustness weights from the residual spread
        let residuals: Vec<f64> = (0..n).map(|i| ys[i] - fitted[i]).collect();
        let abs_res: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
        let s = median(&abs_res);
        if !(s > 0.0) {
            break; // perfect fit, nothing left to robustify
        }
        let cutoff = 6.0 * s;
        for i in 0..n {
            let u = (residuals[i] / cutoff).abs();
            robustness[i] = if u >= 1.0 {
                0.0
            } else {
                let t = 1.0 - u * u;
                t * t
            };
        }
    }

    Ok(LowessCurve { x: xs, y: fitted })
}

/// Contiguous window of `window` points around index i with the smallest
/// maximum distance to xs[i]
fn neighbor_window(xs: &[f64], i: usize, window: usize) -> (usize, usize) {
    let n = xs.len();
    let mut lo = i.saturating_sub(window - 1).min(n - window);
    let mut hi = lo + window - 1;
    // Slide right while that brings the window closer to xs[i]
    while hi + 1 < n && hi < i + window {
        let drop_dist = xs[i] - xs[lo];
        let gain_dist = xs[hi + 1] - xs[i];
        if gain_dist < drop_dist {
            lo += 1;
            hi += 1;
        } else {
            break;
        }
    }
    (lo, hi)
}

/// Tricube-weighted linear fit over [lo, hi], evaluated at xs[i]
fn local_linear(xs: &[f64], ys: &[f64], robustness: &[f64], i: usize, lo: usize, hi: usize) -> f64 {
    let xi = xs[i];
    let h = (xs[hi] - xi).abs().max((xs[lo] - xi).abs()).max(1e-12);

    let mut sw = 0.0;
    let mut swx = 0.0;
    let mut swy = 0.0;
    let mut swxx = 0.0;
    let mut swxy = 0.0;
    for j in lo..=hi {
        let d = ((xs[j] - xi) / h).abs();
        let tricube = if d < 1.0 {
            let t = 1.0 - d * d * d;
            t * t * t
        } else {
            0.0
        };
        let w = tricube * robustness[j];
        if w <= 0.0 {
            continue;
        }
        sw += w;
        swx += w * xs[j];
        swy += w * ys[j];
        swxx += w * xs[j] * xs[j];
        swxy += w * xs[j] * ys[j];
    }

    if sw <= 0.0 {
        return ys[i];
    }
    let denom = sw * swxx - swx * swx;
    if denom.abs() < 1e-12 * sw * sw.max(1.0) {
        // Degenerate x spread in the window: weighted mean
        return swy / sw;
    }
    let slope = (sw * swxy - swx * swy) / denom;
    let intercept = (swy - slope * swx) / sw;
    intercept + slope * xi
}
