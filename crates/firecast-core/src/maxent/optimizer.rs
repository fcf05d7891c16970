//! L1-regularised MaxEnt dual, minimised by cyclic coordinate descent.
//!
//! The model is a Gibbs distribution over the background sample,
//! `q_i ∝ exp(λ·f(x_i))`. The loss is
//!
//! ```text
//! L(λ) = log(1/N Σ_i exp(λ·f(x_i))) − λ·μ̂ + Σ_j β_j |λ_j|
//! ```
//!
//! where μ̂ is the presence mean of each feature. Each coordinate step takes a
//! soft-thresholded Newton step on the one-dimensional problem and halves it
//! until the loss does not increase, so the loss is monotone over sweeps.

use serde::{Deserialize, Serialize};

/// Step halvings tried per coordinate before giving up on it for this sweep.
const MAX_HALVINGS: usize = 30;
/// Curvature below which a coordinate is treated as flat on the background.
const MIN_CURVATURE: f64 = 1e-12;

/// Dense feature data for one fit.
pub struct Problem<'a> {
    /// `columns[j][i]` = feature j at background sample i.
    pub columns: &'a [Vec<f64>],
    /// Presence mean of each feature.
    pub empirical_means: &'a [f64],
    /// L1 width per feature.
    pub betas: &'a [f64],
}

impl Problem<'_> {
    fn n_background(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }
}

/// Outcome of [`fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    pub converged: bool,
    /// Completed coordinate-descent sweeps.
    pub iterations: usize,
    /// Final regularised loss.
    pub loss: f64,
    /// Unregularised training gain: `λ·μ̂ − log(1/N Σ exp(λ·f))`.
    pub training_gain: f64,
}

pub struct Solution {
    pub lambdas: Vec<f64>,
    /// Linear predictor `λ·f(x_i)` at each background sample.
    pub scores: Vec<f64>,
    pub diagnostics: FitDiagnostics,
}

/// `ln Σ_i exp(s_i)`, stable for large scores.
pub fn log_sum_exp(s: &[f64]) -> f64 {
    let max = s.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + s.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Background weights `q_i = exp(s_i) / Σ exp(s)`.
pub fn gibbs_weights(s: &[f64]) -> Vec<f64> {
    let lse = log_sum_exp(s);
    s.iter().map(|v| (v - lse).exp()).collect()
}

/// Entropy of the normalised background distribution.
pub fn entropy(s: &[f64]) -> f64 {
    gibbs_weights(s)
        .into_iter()
        .filter(|&q| q > 0.0)
        .map(|q| -q * q.ln())
        .sum()
}

/// Unregularised training gain for linear predictors `s` and weights `lambdas`.
pub fn gain(s: &[f64], lambdas: &[f64], empirical_means: &[f64]) -> f64 {
    let n = s.len() as f64;
    let dot: f64 = lambdas.iter().zip(empirical_means).map(|(l, m)| l * m).sum();
    dot - (log_sum_exp(s) - n.ln())
}

fn l1(lambdas: &[f64], betas: &[f64]) -> f64 {
    lambdas.iter().zip(betas).map(|(l, b)| l.abs() * b).sum()
}

fn loss(s: &[f64], lambdas: &[f64], p: &Problem<'_>) -> f64 {
    -gain(s, lambdas, p.empirical_means) + l1(lambdas, p.betas)
}

/// Minimise the regularised loss from λ = 0.
pub fn fit(p: &Problem<'_>, max_iterations: usize, tolerance: f64) -> Solution {
    let m = p.columns.len();
    let n = p.n_background();
    let mut lambdas = vec![0.0; m];
    let mut s = vec![0.0; n];
    let mut current = loss(&s, &lambdas, p);
    let mut converged = false;
    let mut iterations = 0;
    let mut trial = vec![0.0; n];

    while iterations < max_iterations {
        let start = current;
        for j in 0..m {
            let col = &p.columns[j];
            let q = gibbs_weights(&s);
            let mean: f64 = q.iter().zip(col).map(|(w, f)| w * f).sum();
            let second: f64 = q.iter().zip(col).map(|(w, f)| w * f * f).sum();
            let curvature = second - mean * mean;
            if curvature < MIN_CURVATURE {
                continue;
            }

            let grad = mean - p.empirical_means[j];
            let z = lambdas[j] - grad / curvature;
            let shrink = p.betas[j] / curvature;
            let target = z.signum() * (z.abs() - shrink).max(0.0);
            let mut step = target - lambdas[j];

            for _ in 0..MAX_HALVINGS {
                if step == 0.0 {
                    break;
                }
                for i in 0..n {
                    trial[i] = s[i] + step * col[i];
                }
                let old = lambdas[j];
                lambdas[j] = old + step;
                let candidate = loss(&trial, &lambdas, p);
                if candidate <= current {
                    current = candidate;
                    std::mem::swap(&mut s, &mut trial);
                    break;
                }
                lambdas[j] = old;
                step *= 0.5;
            }
        }
        iterations += 1;

        if iterations % 50 == 0 {
            log::debug!("maxent sweep {iterations}: loss {current:.6}");
        }
        if start - current < tolerance {
            converged = true;
            break;
        }
    }

    let training_gain = gain(&s, &lambdas, p.empirical_means);
    Solution {
        lambdas,
        scores: s,
        diagnostics: FitDiagnostics { converged, iterations, loss: current, training_gain },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn log_sum_exp_matches_naive() {
        let s = [0.1, -2.0, 3.5];
        let naive: f64 = s.iter().map(|v: &f64| v.exp()).sum::<f64>().ln();
        assert_relative_eq!(log_sum_exp(&s), naive, epsilon = 1e-12);
        assert_relative_eq!(log_sum_exp(&[1000.0, 1000.0]), 1000.0 + 2f64.ln());
    }

    #[test]
    fn uniform_start_has_max_entropy() {
        let s = vec![0.0; 8];
        assert_relative_eq!(entropy(&s), 8f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(gain(&s, &[0.0], &[0.3]), 0.0);
    }

    #[test]
    fn unregularised_fit_matches_moments() {
        // One binary feature, half the background has it; presences have it 80% of the time.
        let col = vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let columns = vec![col.clone()];
        let p = Problem { columns: &columns, empirical_means: &[0.8], betas: &[0.0] };
        let sol = fit(&p, 500, 1e-12);
        assert!(sol.diagnostics.converged);
        let q = gibbs_weights(&sol.scores);
        let model_mean: f64 = q.iter().zip(&col).map(|(w, f)| w * f).sum();
        assert_relative_eq!(model_mean, 0.8, epsilon = 1e-6);
        // Closed form: λ = ln(0.8/0.2).
        assert_relative_eq!(sol.lambdas[0], 4f64.ln(), epsilon = 1e-5);
        assert!(sol.diagnostics.training_gain > 0.0);
    }

    #[test]
    fn strong_regularisation_zeroes_lambda() {
        let columns = vec![vec![0.0, 0.5, 1.0, 0.25]];
        let p = Problem { columns: &columns, empirical_means: &[0.6], betas: &[10.0] };
        let sol = fit(&p, 100, 1e-9);
        assert_eq!(sol.lambdas[0], 0.0);
        assert!(sol.diagnostics.converged);
        assert_eq!(sol.diagnostics.iterations, 1);
    }

    #[test]
    fn loss_never_increases_and_cap_is_reported() {
        let columns = vec![
            vec![0.0, 0.2, 0.4, 0.6, 0.8, 1.0],
            vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0],
        ];
        let p = Problem { columns: &columns, empirical_means: &[0.9, 0.7], betas: &[0.01, 0.01] };
        let one = fit(&p, 1, 1e-300);
        let many = fit(&p, 200, 1e-300);
        assert!(!one.diagnostics.converged);
        assert_eq!(one.diagnostics.iterations, 1);
        assert!(many.diagnostics.loss <= one.diagnostics.loss);
        assert!(one.diagnostics.loss <= 0.0, "first sweep must not be worse than λ = 0");
    }

    #[test]
    fn deterministic() {
        let columns = vec![vec![0.1, 0.9, 0.4, 0.7], vec![0.0, 1.0, 1.0, 0.0]];
        let p = Problem { columns: &columns, empirical_means: &[0.6, 0.5], betas: &[0.05, 0.05] };
        let a = fit(&p, 300, 1e-10);
        let b = fit(&p, 300, 1e-10);
        assert_eq!(a.lambdas, b.lambdas);
        assert_eq!(a.scores, b.scores);
    }
}
