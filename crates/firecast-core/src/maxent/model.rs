use serde::{Deserialize, Serialize};

#[cfg(feature = "threading")]
use rayon::prelude::*;

use super::config::{FeatureFamily, OutputFormat};
use super::features::FeatureSet;
use super::optimizer::{self, FitDiagnostics};
use crate::error::{FirecastError, Result};
use crate::raster::{Raster, RasterStack};

/// Band produced by [`FittedModel::score_stack`] for cloglog and logistic output.
pub const PROBABILITY_BAND: &str = "probability";
/// Band produced for raw output; values are relative densities, not probabilities.
pub const RAW_BAND: &str = "raw";

/// One fitted feature weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeight {
    pub name: String,
    pub family: FeatureFamily,
    pub lambda: f64,
    /// Mean over the presence samples.
    pub empirical_mean: f64,
    /// Mean under the fitted background distribution.
    pub model_mean: f64,
}

/// Share of the training gain lost when a predictor is removed from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableContribution {
    pub variable: String,
    /// Normalised so the contributions of all predictors sum to 100.
    pub percent: f64,
    pub gain_drop: f64,
}

/// Fit-time summary of what the model learned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub features: Vec<FeatureWeight>,
    pub contributions: Vec<VariableContribution>,
    pub training_gain: f64,
    pub entropy: f64,
    pub n_presence: usize,
    pub n_background: usize,
    pub families: Vec<FeatureFamily>,
    pub diagnostics: FitDiagnostics,
}

/// Inputs needed to explain a finished fit.
pub(crate) struct FitSummary<'a> {
    pub columns: &'a [Vec<f64>],
    pub empirical_means: &'a [f64],
    pub lambdas: &'a [f64],
    pub scores: &'a [f64],
    pub n_presence: usize,
    pub families: Vec<FeatureFamily>,
    pub diagnostics: FitDiagnostics,
}

impl Explanation {
    pub(crate) fn compute(features: &FeatureSet, fit: FitSummary<'_>) -> Explanation {
        let q = optimizer::gibbs_weights(fit.scores);
        let weights = features
            .features
            .iter()
            .enumerate()
            .map(|(j, f)| FeatureWeight {
                name: f.describe(&features.variables),
                family: f.family(),
                lambda: fit.lambdas[j],
                empirical_mean: fit.empirical_means[j],
                model_mean: q.iter().zip(&fit.columns[j]).map(|(w, x)| w * x).sum(),
            })
            .collect();

        let full_gain = fit.diagnostics.training_gain;
        let mut contributions: Vec<VariableContribution> = features
            .variables
            .iter()
            .enumerate()
            .map(|(v, var)| {
                let mut lambdas = fit.lambdas.to_vec();
                let mut scores = fit.scores.to_vec();
                for (j, f) in features.features.iter().enumerate() {
                    if f.uses(v) && lambdas[j] != 0.0 {
                        for (s, x) in scores.iter_mut().zip(&fit.columns[j]) {
                            *s -= lambdas[j] * x;
                        }
                        lambdas[j] = 0.0;
                    }
                }
                let reduced = optimizer::gain(&scores, &lambdas, fit.empirical_means);
                VariableContribution {
                    variable: var.name.clone(),
                    percent: 0.0,
                    gain_drop: (full_gain - reduced).max(0.0),
                }
            })
            .collect();
        let total: f64 = contributions.iter().map(|c| c.gain_drop).sum();
        if total > 0.0 {
            for c in &mut contributions {
                c.percent = 100.0 * c.gain_drop / total;
            }
        }

        Explanation {
            features: weights,
            contributions,
            training_gain: full_gain,
            entropy: optimizer::entropy(fit.scores),
            n_presence: fit.n_presence,
            n_background: fit.scores.len(),
            families: fit.families,
            diagnostics: fit.diagnostics,
        }
    }
}

/// A trained MaxEnt model. Immutable and serialisable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub features: FeatureSet,
    pub lambdas: Vec<f64>,
    /// `ln Σ exp(λ·f)` over the training background.
    pub log_norm: f64,
    /// Entropy of the fitted background distribution.
    pub entropy: f64,
    pub output_format: OutputFormat,
    pub clamp: bool,
    pub explanation: Explanation,
}

impl FittedModel {
    /// Predictor bands the model reads, in variable order.
    pub fn band_names(&self) -> Vec<&str> {
        self.features.variables.iter().map(|v| v.name.as_str()).collect()
    }

    /// Name of the band [`Self::score_stack`] writes.
    pub fn output_band(&self) -> &'static str {
        if self.output_format.is_probability() {
            PROBABILITY_BAND
        } else {
            RAW_BAND
        }
    }

    /// Linear predictor `λ·f(x)` for raw predictor values in variable order.
    pub fn linear_predictor(&self, raw: &[f64]) -> f64 {
        self.features
            .evaluate(raw, self.clamp)
            .iter()
            .zip(&self.lambdas)
            .map(|(f, l)| f * l)
            .sum()
    }

    /// Output value for raw predictor values in variable order.
    pub fn predict(&self, raw: &[f64]) -> f64 {
        let s = self.linear_predictor(raw) - self.log_norm;
        match self.output_format {
            OutputFormat::Raw => s.exp(),
            OutputFormat::Cloglog => 1.0 - (-(s + self.entropy).exp()).exp(),
            OutputFormat::Logistic => {
                let e = (s + self.entropy).exp();
                if e.is_infinite() {
                    1.0
                } else {
                    e / (1.0 + e)
                }
            }
        }
    }

    /// Score every pixel of `stack`; bands are matched by name.
    ///
    /// A pixel that is no-data in any model band stays NaN. The band is
    /// [`PROBABILITY_BAND`] unless the model emits raw densities.
    pub fn score_stack(&self, stack: &RasterStack) -> Result<Raster> {
        let bands: Vec<&Raster> = self
            .features
            .variables
            .iter()
            .map(|v| stack.band(&v.name).ok_or_else(|| FirecastError::ScoringBandMissing { band: v.name.clone() }))
            .collect::<Result<_>>()?;

        let grid = stack.grid;
        let mut out = Raster::filled(self.output_band(), grid, f32::NAN);
        if grid.width == 0 {
            return Ok(out);
        }

        let score_row = |row: usize, values: &mut [f32]| {
            let mut raw = vec![0.0; bands.len()];
            for (col, cell) in values.iter_mut().enumerate() {
                let i = grid.index(row, col);
                let mut valid = true;
                for (slot, band) in raw.iter_mut().zip(&bands) {
                    let v = band.data[i];
                    if v.is_nan() {
                        valid = false;
                        break;
                    }
                    *slot = f64::from(v);
                }
                if valid {
                    *cell = self.predict(&raw) as f32;
                }
            }
        };

        #[cfg(feature = "threading")]
        out.data
            .par_chunks_mut(grid.width)
            .enumerate()
            .for_each(|(row, values)| score_row(row, values));
        #[cfg(not(feature = "threading"))]
        out.data
            .chunks_mut(grid.width)
            .enumerate()
            .for_each(|(row, values)| score_row(row, values));

        Ok(out)
    }
}
