//! Per-feature L1 regularisation widths.
//!
//! Base betas come from the piecewise-linear tables of Phillips & Dudík
//! (2008), indexed by the number of presence samples, and are scaled by the
//! feature's standard deviation over the presence samples.

use super::config::FeatureFamily;

/// Lower bound on a feature's presence standard deviation.
const MIN_DEVIATION: f64 = 0.001;

/// Linear interpolation through `(ts[i], betas[i])`, constant outside the table.
fn interpolate(ts: &[f64], betas: &[f64], n: f64) -> f64 {
    if n <= ts[0] {
        return betas[0];
    }
    for i in 1..ts.len() {
        if n <= ts[i] {
            let t = (n - ts[i - 1]) / (ts[i] - ts[i - 1]);
            return betas[i - 1] + t * (betas[i] - betas[i - 1]);
        }
    }
    betas[betas.len() - 1]
}

/// Base beta for a feature of `family` given `n` presence samples and the
/// full set of families in use (linear/quadratic/product share one table
/// chosen by the most complex of them).
pub fn family_beta(family: FeatureFamily, n: usize, in_use: &[FeatureFamily]) -> f64 {
    let n = n as f64;
    match family {
        FeatureFamily::Linear | FeatureFamily::Quadratic | FeatureFamily::Product => {
            if in_use.contains(&FeatureFamily::Product) {
                interpolate(&[0.0, 10.0, 17.0, 30.0, 100.0], &[2.6, 1.6, 0.9, 0.55, 0.05], n)
            } else if in_use.contains(&FeatureFamily::Quadratic) {
                interpolate(&[0.0, 10.0, 17.0, 30.0, 100.0], &[1.3, 0.8, 0.5, 0.25, 0.05], n)
            } else {
                interpolate(&[10.0, 30.0, 100.0], &[1.0, 0.2, 0.05], n)
            }
        }
        FeatureFamily::Threshold => interpolate(&[0.0, 100.0], &[2.0, 1.0], n),
        FeatureFamily::Hinge => interpolate(&[0.0, 1.0], &[0.5, 0.5], n),
        FeatureFamily::Categorical => interpolate(&[0.0, 10.0, 17.0], &[0.65, 0.5, 0.25], n),
    }
}

/// Regularisation width for one feature: `multiplier · β_family · σ / √n`.
pub fn feature_beta(base: f64, multiplier: f64, presence_values: &[f64]) -> f64 {
    let n = presence_values.len() as f64;
    let mean = presence_values.iter().sum::<f64>() / n;
    let var = presence_values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    multiplier * base * var.sqrt().max(MIN_DEVIATION) / n.sqrt()
}
