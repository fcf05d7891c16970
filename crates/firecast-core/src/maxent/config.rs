use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FirecastError, Result};

/// Class of derived feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureFamily {
    Linear,
    Quadratic,
    Product,
    Threshold,
    Hinge,
    /// Indicator per observed category of a categorical predictor.
    Categorical,
}

impl FeatureFamily {
    pub fn name(self) -> &'static str {
        match self {
            FeatureFamily::Linear => "linear",
            FeatureFamily::Quadratic => "quadratic",
            FeatureFamily::Product => "product",
            FeatureFamily::Threshold => "threshold",
            FeatureFamily::Hinge => "hinge",
            FeatureFamily::Categorical => "categorical",
        }
    }
}

impl fmt::Display for FeatureFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which continuous feature families may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFamilies {
    pub linear: bool,
    pub product: bool,
    pub quadratic: bool,
    pub threshold: bool,
    pub hinge: bool,
}

impl Default for FeatureFamilies {
    fn default() -> Self {
        Self::all()
    }
}

impl FeatureFamilies {
    pub fn all() -> Self {
        Self { linear: true, product: true, quadratic: true, threshold: true, hinge: true }
    }

    pub fn none() -> Self {
        Self { linear: false, product: false, quadratic: false, threshold: false, hinge: false }
    }

    pub fn linear_only() -> Self {
        Self { linear: true, ..Self::none() }
    }

    /// Enabled families in canonical order.
    pub fn enabled(&self) -> Vec<FeatureFamily> {
        [
            (self.linear, FeatureFamily::Linear),
            (self.quadratic, FeatureFamily::Quadratic),
            (self.product, FeatureFamily::Product),
            (self.threshold, FeatureFamily::Threshold),
            (self.hinge, FeatureFamily::Hinge),
        ]
        .into_iter()
        .filter_map(|(on, f)| on.then_some(f))
        .collect()
    }
}

/// How fitted scores are mapped to the output band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `1 - exp(-exp(s))`, the complementary log-log link.
    #[default]
    Cloglog,
    /// `exp(s) / (1 + exp(s))`.
    Logistic,
    /// Gibbs density relative to the background sample. Unbounded above.
    Raw,
}

impl OutputFormat {
    /// Whether outputs are probabilities in `[0, 1]`.
    pub fn is_probability(self) -> bool {
        !matches!(self, OutputFormat::Raw)
    }
}

/// MaxEnt trainer settings. Defaults follow the standard MaxEnt program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MaxentConfig {
    pub families: FeatureFamilies,
    /// Choose families from the number of presence samples.
    pub auto_feature: bool,
    /// Predictors holding integer category codes rather than continuous values.
    pub categorical_bands: Vec<String>,
    /// Presence count at which auto selection enables hinge features.
    pub hinge_threshold: usize,
    /// Presence count at which auto selection enables quadratic features.
    pub l2lq_threshold: usize,
    /// Presence count at which auto selection enables product and threshold features.
    pub lq2lqpt_threshold: usize,
    pub beta_multiplier: f64,
    /// Quantile knots per predictor for hinge and threshold features.
    pub knots: usize,
    /// Include presence samples in the background distribution.
    pub add_samples_to_background: bool,
    pub output_format: OutputFormat,
    /// Clamp predictors to the training range when scoring.
    pub clamp: bool,
    /// Cap on coordinate-descent sweeps.
    pub max_iterations: usize,
    /// Stop when one sweep lowers the regularised loss by less than this.
    pub convergence_threshold: f64,
}

impl Default for MaxentConfig {
    fn default() -> Self {
        Self {
            families: FeatureFamilies::all(),
            auto_feature: true,
            categorical_bands: Vec::new(),
            hinge_threshold: 15,
            l2lq_threshold: 10,
            lq2lqpt_threshold: 80,
            beta_multiplier: 1.0,
            knots: 20,
            add_samples_to_background: true,
            output_format: OutputFormat::Cloglog,
            clamp: true,
            max_iterations: 500,
            convergence_threshold: 1e-5,
        }
    }
}

impl MaxentConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.beta_multiplier.is_finite() && self.beta_multiplier >= 0.0) {
            return Err(FirecastError::invalid_config("beta_multiplier", format!("must be >= 0, got {}", self.beta_multiplier)));
        }
        if self.knots == 0 {
            return Err(FirecastError::invalid_config("knots", "must be at least 1"));
        }
        if self.max_iterations == 0 {
            return Err(FirecastError::invalid_config("max_iterations", "must be at least 1"));
        }
        if !(self.convergence_threshold.is_finite() && self.convergence_threshold > 0.0) {
            return Err(FirecastError::invalid_config(
                "convergence_threshold",
                format!("must be > 0, got {}", self.convergence_threshold),
            ));
        }
        Ok(())
    }

    /// Continuous families to build for `n_presence` presence samples.
    ///
    /// With auto selection off this is exactly the configured set, and an empty
    /// set is an error. With auto selection on, families are gated by sample
    /// size and intersected with the configured set (an empty configuration
    /// leaves every family available); linear is used if nothing survives.
    pub fn resolve_families(&self, n_presence: usize) -> Result<Vec<FeatureFamily>> {
        let configured = self.families.enabled();
        if !self.auto_feature {
            if configured.is_empty() {
                return Err(FirecastError::EmptyFeatureSet);
            }
            return Ok(configured);
        }

        let candidates = if configured.is_empty() { FeatureFamilies::all().enabled() } else { configured };
        let allowed = |f: &FeatureFamily| match f {
            FeatureFamily::Linear | FeatureFamily::Categorical => true,
            FeatureFamily::Quadratic => n_presence >= self.l2lq_threshold,
            FeatureFamily::Hinge => n_presence >= self.hinge_threshold,
            FeatureFamily::Product | FeatureFamily::Threshold => n_presence >= self.lq2lqpt_threshold,
        };
        let chosen: Vec<FeatureFamily> = candidates.into_iter().filter(allowed).collect();
        if chosen.is_empty() {
            Ok(vec![FeatureFamily::Linear])
        } else {
            Ok(chosen)
        }
    }
}
