//! End-to-end run: load, sample, exclude, assemble, fit, score.
//!
//! Stages run strictly in order and each consumes the previous stage's
//! complete output. Every failure is tagged with the stage that raised it.

use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::error::{FirecastError, PipelineError, Stage, StageContext};
use crate::exclusion::exclude_near_presence;
use crate::loader::{load_stack, PointCatalog, RasterCatalog};
use crate::maxent::{self, FeatureFamily, FittedModel, VariableContribution};
use crate::points::{Label, Point};
use crate::raster::{GridSpec, Raster, RasterStack};
use crate::sampler::sample_valid_candidates;
use crate::training::{assemble, TrainingSet};

/// Counts and diagnostics of one run, suitable for writing next to the outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub predictors: Vec<String>,
    pub presence_points: usize,
    pub candidates: usize,
    pub excluded: usize,
    pub survivors: usize,
    pub training_presence: usize,
    pub training_background: usize,
    pub dropped_presence: usize,
    pub dropped_background: usize,
    pub families: Vec<FeatureFamily>,
    pub features: usize,
    pub converged: bool,
    pub iterations: usize,
    pub training_gain: f64,
    pub contributions: Vec<VariableContribution>,
    pub scored_pixels: usize,
    pub probability_min: Option<f64>,
    pub probability_max: Option<f64>,
    pub probability_mean: Option<f64>,
}

/// Every artefact a run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub grid: GridSpec,
    pub presence: Vec<Point>,
    pub candidates: Vec<Point>,
    pub survivors: Vec<Point>,
    pub training_set: TrainingSet,
    pub model: FittedModel,
    pub probability: Raster,
    pub report: RunReport,
}

/// Check that every predictor is present in `stack`.
fn require_predictors(stack: &RasterStack, predictors: &[String]) -> crate::error::Result<()> {
    for band in predictors {
        stack.require_band(band)?;
    }
    Ok(())
}

pub fn run(
    config: &RunConfig,
    rasters: &dyn RasterCatalog,
    points: &dyn PointCatalog,
) -> Result<PipelineOutput, PipelineError> {
    config.validate().at(Stage::ValidateConfig)?;
    let predictors = &config.predictor_band_names;

    // ── 1. Raster stacks ──
    let training = load_stack(rasters, "training", &config.training_epoch_stack, None).at(Stage::LoadStacks)?;
    let forecast =
        load_stack(rasters, "forecast", &config.forecast_epoch_stack, Some(&training.grid)).at(Stage::LoadStacks)?;
    require_predictors(&training, predictors).at(Stage::LoadStacks)?;
    require_predictors(&forecast, predictors).at(Stage::LoadStacks)?;
    let grid = training.grid;
    log::info!(
        "training stack: {} bands, forecast stack: {} bands on a {}x{} grid",
        training.bands().len(),
        forecast.bands().len(),
        grid.width,
        grid.height
    );

    // ── 2. Presence points ──
    let presence = points.load_points(&config.presence_points).at(Stage::LoadPresence)?;
    if presence.is_empty() {
        return Err(PipelineError { stage: Stage::LoadPresence, source: FirecastError::NoPresencePoints });
    }
    log::info!("presence points: {}", presence.len());

    // ── 3. Candidate background points ──
    let mask = training.require_band(&predictors[0]).at(Stage::SampleCandidates)?;
    let candidates = sample_valid_candidates(&config.region, mask, config.sample_count, config.sample_seed);
    if candidates.is_empty() {
        let detail = format!("no valid '{}' pixel lies inside the region", predictors[0]);
        return Err(PipelineError { stage: Stage::SampleCandidates, source: FirecastError::NoBackgroundPoints { detail } });
    }
    log::info!("candidate points: {} (requested {})", candidates.len(), config.sample_count);

    // ── 4. Exclusion join ──
    let joined = exclude_near_presence(&candidates, &presence, config.exclusion_distance_meters, grid.crs);
    if joined.kept.is_empty() {
        let detail = format!(
            "all {} candidates lie within {} of a presence point",
            candidates.len(),
            config.exclusion_distance_meters
        );
        return Err(PipelineError { stage: Stage::ExclusionJoin, source: FirecastError::NoBackgroundPoints { detail } });
    }
    log::info!("background points after exclusion join: {} ({} excluded)", joined.kept.len(), joined.excluded);

    // ── 5. Training set ──
    let training_set = assemble(&presence, &joined.kept, &training, predictors).at(Stage::AssembleTrainingSet)?;
    training_set.require_both_labels().at(Stage::AssembleTrainingSet)?;
    log::info!(
        "training points: {} ({} presence, {} background)",
        training_set.points.len(),
        training_set.count(Label::Presence),
        training_set.count(Label::Background)
    );

    // ── 6. Fit ──
    let model = maxent::train(&training_set, &config.maxent_config()).at(Stage::Train)?;

    // ── 7. Score ──
    let probability = model.score_stack(&forecast).at(Stage::Score)?;

    let valid: Vec<f64> = probability.data.iter().filter(|v| !v.is_nan()).map(|&v| f64::from(v)).collect();
    log::info!("scored {} of {} forecast pixels", valid.len(), probability.data.len());

    let diag = &model.explanation.diagnostics;
    let report = RunReport {
        predictors: predictors.clone(),
        presence_points: presence.len(),
        candidates: candidates.len(),
        excluded: joined.excluded,
        survivors: joined.kept.len(),
        training_presence: training_set.count(Label::Presence),
        training_background: training_set.count(Label::Background),
        dropped_presence: training_set.dropped_count(Label::Presence),
        dropped_background: training_set.dropped_count(Label::Background),
        families: model.explanation.families.clone(),
        features: model.features.features.len(),
        converged: diag.converged,
        iterations: diag.iterations,
        training_gain: diag.training_gain,
        contributions: model.explanation.contributions.clone(),
        scored_pixels: valid.len(),
        probability_min: valid.iter().copied().reduce(f64::min),
        probability_max: valid.iter().copied().reduce(f64::max),
        probability_mean: (!valid.is_empty()).then(|| valid.iter().sum::<f64>() / valid.len() as f64),
    };

    Ok(PipelineOutput {
        grid,
        presence,
        candidates,
        survivors: joined.kept,
        training_set,
        model,
        probability,
        report,
    })
}
