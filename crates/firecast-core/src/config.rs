//! Per-run configuration, read from camelCase JSON.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{FirecastError, Result};
use crate::loader::StackInput;
use crate::maxent::{FeatureFamilies, MaxentConfig};
use crate::region::Region;

pub const DEFAULT_SAMPLE_COUNT: usize = 500;
pub const DEFAULT_SAMPLE_SEED: u64 = 7;
pub const DEFAULT_EXCLUSION_DISTANCE_M: f64 = 25_000.0;

/// A stack band given either as a bare raster id or as `{id, band}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum StackInputRepr {
    Id(String),
    Full(StackInput),
}

fn stack_inputs<'de, D>(deserializer: D) -> std::result::Result<Vec<StackInput>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let reprs = Vec::<StackInputRepr>::deserialize(deserializer)?;
    Ok(reprs
        .into_iter()
        .map(|r| match r {
            StackInputRepr::Id(id) => StackInput::new(id),
            StackInputRepr::Full(input) => input,
        })
        .collect())
}

fn default_sample_count() -> usize {
    DEFAULT_SAMPLE_COUNT
}

fn default_sample_seed() -> u64 {
    DEFAULT_SAMPLE_SEED
}

fn default_exclusion_distance() -> f64 {
    DEFAULT_EXCLUSION_DISTANCE_M
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Area from which background candidates are drawn.
    pub region: Region,
    #[serde(deserialize_with = "stack_inputs")]
    pub training_epoch_stack: Vec<StackInput>,
    #[serde(deserialize_with = "stack_inputs")]
    pub forecast_epoch_stack: Vec<StackInput>,
    /// Point collection id of the observed fires.
    pub presence_points: String,
    #[serde(default = "default_sample_count")]
    pub sample_count: usize,
    #[serde(default = "default_sample_seed")]
    pub sample_seed: u64,
    /// Metres on geographic grids, map units on planar ones.
    #[serde(default = "default_exclusion_distance")]
    pub exclusion_distance_meters: f64,
    pub predictor_band_names: Vec<String>,
    #[serde(default)]
    pub feature_families: FeatureFamilies,
    #[serde(default = "default_true")]
    pub auto_feature_selection: bool,
    /// Advanced trainer settings; its family switches are overridden by the fields above.
    #[serde(default)]
    pub maxent: MaxentConfig,
}

impl RunConfig {
    pub fn from_json(s: &str) -> std::result::Result<RunConfig, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Trainer configuration with the run-level family settings applied.
    pub fn maxent_config(&self) -> MaxentConfig {
        MaxentConfig {
            families: self.feature_families,
            auto_feature: self.auto_feature_selection,
            ..self.maxent.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.region.validate()?;
        if self.training_epoch_stack.is_empty() {
            return Err(FirecastError::invalid_config("trainingEpochStack", "no rasters listed"));
        }
        if self.forecast_epoch_stack.is_empty() {
            return Err(FirecastError::invalid_config("forecastEpochStack", "no rasters listed"));
        }
        if self.sample_count == 0 {
            return Err(FirecastError::invalid_config("sampleCount", "must be at least 1"));
        }
        if !(self.exclusion_distance_meters.is_finite() && self.exclusion_distance_meters >= 0.0) {
            return Err(FirecastError::invalid_config(
                "exclusionDistanceMeters",
                format!("must be a finite distance >= 0, got {}", self.exclusion_distance_meters),
            ));
        }
        if self.predictor_band_names.is_empty() {
            return Err(FirecastError::invalid_config("predictorBandNames", "no predictors listed"));
        }
        let mut seen = HashSet::new();
        for band in &self.predictor_band_names {
            if !seen.insert(band.as_str()) {
                return Err(FirecastError::invalid_config("predictorBandNames", format!("'{band}' listed twice")));
            }
        }
        let maxent = self.maxent_config();
        if !maxent.auto_feature && maxent.families.enabled().is_empty() {
            return Err(FirecastError::EmptyFeatureSet);
        }
        if !maxent.output_format.is_probability() {
            return Err(FirecastError::invalid_config(
                "maxent.outputFormat",
                "raw output is unbounded; a run writes a probability raster, use cloglog or logistic",
            ));
        }
        maxent.validate()
    }
}
