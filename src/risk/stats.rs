//! Return statistics used by the risk gate: VaR, expected shortfall and
//! Pearson correlation over trailing return series.

use statrs::distribution::{ContinuousCDF, Normal};
use statrs::statistics::Statistics;

/// How a VaR figure was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarMethod {
    Historical,
    Parametric,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarEstimate {
    /// Loss as a positive fraction of portfolio value
    pub var: f64,
    /// Expected shortfall beyond the VaR threshold
    pub cvar: f64,
    pub method: VarMethod,
    pub samples: usize,
}

/// Align series on their most recent common window.
///
/// Trailing series end at the same period, so alignment keeps the last
/// `min(len)` observations of each.
pub fn align_tail<'a>(series: &[&'a [f64]]) -> Vec<&'a [f64]> {
    let n = series.iter().map(|s| s.len()).min().unwrap_or(0);
    series.iter().map(|s| &s[s.len() - n..]).collect()
}

/// Pearson correlation of the common trailing window.
///
/// Returns `None` with fewer than `min_samples` overlapping observations or
/// when either side has zero variance.
pub fn correlation(a: &[f64], b: &[f64], min_samples: usize) -> Option<f64> {
    let aligned = align_tail(&[a, b]);
    let (a, b) = (aligned[0], aligned[1]);
    let n = a.len();
    if n < min_samples.max(2) {
        return None;
    }

    let mean_a = a.mean();
    let mean_b = b.mean();
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return None;
    }
    let corr = cov / (var_a.sqrt() * var_b.sqrt());
    if corr.is_finite() {
        Some(corr.clamp(-1.0, 1.0))
    } else {
        None
    }
}

/// Value-weighted portfolio return series over the common trailing window.
pub fn portfolio_returns(series: &[&[f64]], weights: &[f64]) -> Vec<f64> {
    let aligned = align_tail(series);
    let total: f64 = weights.iter().sum();
    if aligned.is_empty() || total <= 0.0 {
        return Vec::new();
    }
    let n = aligned[0].len();
    (0..n)
        .map(|t| {
            aligned
                .iter()
                .zip(weights.iter())
                .map(|(s, w)| s[t] * w / total)
                .sum()
        })
        .collect()
}

/// Historical VaR: the negated lower-tail quantile of observed returns.
pub fn historical_var(returns: &[f64], confidence: f64) -> Option<VarEstimate> {
    if returns.is_empty() {
        return None;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let idx = (((1.0 - confidence) * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    let threshold = sorted[idx];
    let tail = &sorted[..=idx];
    let cvar = -(tail.iter().sum::<f64>() / tail.len() as f64);

    Some(VarEstimate {
        var: (-threshold).max(0.0),
        cvar: cvar.max(0.0),
        method: VarMethod::Historical,
        samples: returns.len(),
    })
}

/// Parametric (normal) VaR: `-(mean + z * std)` with `z` the lower-tail quantile.
pub fn parametric_var(returns: &[f64], confidence: f64) -> Option<VarEstimate> {
    if returns.len() < 2 {
        return None;
    }
    let mean = returns.mean();
    let std = returns.std_dev();
    if !std.is_finite() {
        return None;
    }

    let normal = Normal::new(0.0, 1.0).ok()?;
    let alpha = 1.0 - confidence;
    let z = normal.inverse_cdf(alpha);
    // E[X | X < q] for a normal: mean - std * pdf(z) / alpha
    let pdf_z = (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt();
    let var = -(mean + z * std);
    let cvar = -(mean - std * pdf_z / alpha);

    Some(VarEstimate {
        var: var.max(0.0),
        cvar: cvar.max(0.0),
        method: VarMethod::Parametric,
        samples: returns.len(),
    })
}

/// Historical VaR when enough samples exist, parametric otherwise.
pub fn portfolio_var(
    returns: &[f64],
    confidence: f64,
    min_historical_samples: usize,
) -> Option<VarEstimate> {
    if returns.len() >= min_historical_samples {
        historical_var(returns, confidence)
    } else {
        parametric_var(returns, confidence)
    }
}
