//! Presence/background maximum-entropy trainer and scorer.

pub mod config;
pub mod features;
pub mod model;
pub mod optimizer;
pub mod regularization;

pub use config::{FeatureFamilies, FeatureFamily, MaxentConfig, OutputFormat};
pub use features::{FeatureKind, FeatureSet, Variable};
pub use model::{Explanation, FeatureWeight, FittedModel, VariableContribution, PROBABILITY_BAND, RAW_BAND};
pub use optimizer::FitDiagnostics;

use crate::error::Result;
use crate::points::Label;
use crate::training::TrainingSet;
use model::FitSummary;
use optimizer::Problem;

/// Fit a MaxEnt model to `ts`.
///
/// Presence rows give the empirical feature means. The background sample is
/// every background row, plus every presence row when
/// `add_samples_to_background` is set.
pub fn train(ts: &TrainingSet, config: &MaxentConfig) -> Result<FittedModel> {
    config.validate()?;
    ts.require_both_labels()?;
    ts.require_finite()?;

    let n_presence = ts.count(Label::Presence);
    let families = config.resolve_families(n_presence)?;
    log::debug!(
        "feature families for {n_presence} presence samples: {}",
        families.iter().map(|f| f.name()).collect::<Vec<_>>().join(", ")
    );

    let rows: Vec<(Vec<f64>, Label)> = ts.rows().collect();
    let raw: Vec<Vec<f64>> = rows.iter().map(|(r, _)| r.clone()).collect();
    let features = FeatureSet::build(&ts.bands, &raw, &families, config, !config.auto_feature)?;

    let presence: Vec<Vec<f64>> = rows
        .iter()
        .filter(|(_, l)| *l == Label::Presence)
        .map(|(r, _)| features.evaluate(r, true))
        .collect();
    let background: Vec<Vec<f64>> = rows
        .iter()
        .filter(|(_, l)| *l == Label::Background || config.add_samples_to_background)
        .map(|(r, _)| features.evaluate(r, true))
        .collect();

    let m = features.features.len();
    let columns: Vec<Vec<f64>> = (0..m).map(|j| background.iter().map(|f| f[j]).collect()).collect();
    let presence_columns: Vec<Vec<f64>> = (0..m).map(|j| presence.iter().map(|f| f[j]).collect()).collect();
    let empirical_means: Vec<f64> = presence_columns
        .iter()
        .map(|c| c.iter().sum::<f64>() / n_presence as f64)
        .collect();

    let mut in_use = families.clone();
    if features.features.iter().any(|f| f.family() == FeatureFamily::Categorical) {
        in_use.push(FeatureFamily::Categorical);
    }
    let betas: Vec<f64> = features
        .features
        .iter()
        .zip(&presence_columns)
        .map(|(f, values)| {
            let base = regularization::family_beta(f.family(), n_presence, &in_use);
            regularization::feature_beta(base, config.beta_multiplier, values)
        })
        .collect();

    let problem = Problem { columns: &columns, empirical_means: &empirical_means, betas: &betas };
    let solution = optimizer::fit(&problem, config.max_iterations, config.convergence_threshold);
    let diag = &solution.diagnostics;
    if diag.converged {
        log::info!(
            "maxent converged after {} sweeps: {} features, {} presence, {} background, gain {:.4}",
            diag.iterations,
            m,
            n_presence,
            background.len(),
            diag.training_gain
        );
    } else {
        log::warn!(
            "maxent did not converge within {} sweeps (loss {:.6}); using the last iterate",
            diag.iterations,
            diag.loss
        );
    }

    let log_norm = optimizer::log_sum_exp(&solution.scores);
    let explanation = Explanation::compute(
        &features,
        FitSummary {
            columns: &columns,
            empirical_means: &empirical_means,
            lambdas: &solution.lambdas,
            scores: &solution.scores,
            n_presence,
            families: in_use,
            diagnostics: solution.diagnostics.clone(),
        },
    );

    Ok(FittedModel {
        features,
        lambdas: solution.lambdas,
        log_norm,
        entropy: explanation.entropy,
        output_format: config.output_format,
        clamp: config.clamp,
        explanation,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::FirecastError;
    use crate::points::Point;
    use crate::training::LabeledPoint;
    use approx::assert_relative_eq;

    /// Fires favour high `T2M` and low `PR`; `SOIL1` is noise.
    pub(crate) fn training_set(n_presence: usize, n_background: usize) -> TrainingSet {
        let bands: Vec<String> = ["T2M", "PR", "SOIL1"].iter().map(|s| s.to_string()).collect();
        let mut points = Vec::new();
        let mut push = |t2m: f64, pr: f64, soil: f64, label: Label| {
            let point = Point::new(0.0, 0.0)
                .with_attr("T2M", t2m)
                .with_attr("PR", pr)
                .with_attr("SOIL1", soil);
            points.push(LabeledPoint { point, label });
        };
        for i in 0..n_presence {
            let u = i as f64 / n_presence as f64;
            push(25.0 + 5.0 * u, 1.0 - 0.8 * u, (i % 5) as f64, Label::Presence);
        }
        for i in 0..n_background {
            let u = i as f64 / n_background as f64;
            push(10.0 + 20.0 * u, 0.5 + 4.0 * ((i * 7) % 11) as f64 / 11.0, (i % 5) as f64, Label::Background);
        }
        TrainingSet { bands, points, dropped: Vec::new() }
    }

    #[test]
    fn unsampled_attribute_is_rejected_before_fitting() {
        let mut ts = training_set(12, 60);
        ts.points[14].point.attributes.remove("PR");
        let err = train(&ts, &MaxentConfig::default()).unwrap_err();
        assert!(matches!(err, FirecastError::NonFiniteSample { index: 14, ref band } if band == "PR"));
        assert_eq!(err.kind(), crate::error::ErrorKind::Data);

        let mut ts = training_set(12, 60);
        ts.points[0].point.attributes.insert("T2M".into(), f64::INFINITY);
        assert!(matches!(train(&ts, &MaxentConfig::default()), Err(FirecastError::NonFiniteSample { index: 0, .. })));
    }

    #[test]
    fn linear_fit_converges_and_favours_presence_conditions() {
        let cfg = MaxentConfig { families: FeatureFamilies::linear_only(), auto_feature: false, ..Default::default() };
        let model = train(&training_set(12, 60), &cfg).unwrap();
        assert!(model.explanation.diagnostics.converged);
        assert_eq!(model.features.features.len(), 3);
        assert!(model.explanation.training_gain > 0.0);

        let hot_dry = model.predict(&[29.0, 0.3, 2.0]);
        let cold_wet = model.predict(&[11.0, 4.0, 2.0]);
        assert!(hot_dry > cold_wet, "{hot_dry} vs {cold_wet}");
        assert!((0.0..=1.0).contains(&hot_dry) && (0.0..=1.0).contains(&cold_wet));
    }

    #[test]
    fn contributions_sum_to_hundred_and_rank_signal() {
        let cfg = MaxentConfig { families: FeatureFamilies::linear_only(), auto_feature: false, ..Default::default() };
        let model = train(&training_set(12, 60), &cfg).unwrap();
        let c = &model.explanation.contributions;
        assert_eq!(c.len(), 3);
        assert_relative_eq!(c.iter().map(|v| v.percent).sum::<f64>(), 100.0, epsilon = 1e-9);
        let soil = c.iter().find(|v| v.variable == "SOIL1").unwrap();
        let t2m = c.iter().find(|v| v.variable == "T2M").unwrap();
        assert!(t2m.percent > soil.percent);
    }

    #[test]
    fn heavy_regularisation_gives_uniform_cloglog() {
        let cfg = MaxentConfig { beta_multiplier: 1e6, ..Default::default() };
        let model = train(&training_set(5, 20), &cfg).unwrap();
        assert!(model.lambdas.iter().all(|&l| l == 0.0));
        assert_relative_eq!(model.predict(&[20.0, 2.0, 1.0]), 1.0 - (-1.0f64).exp(), epsilon = 1e-9);
    }

    #[test]
    fn empty_family_set_fails_before_fitting() {
        let cfg = MaxentConfig { families: FeatureFamilies::none(), auto_feature: false, ..Default::default() };
        assert!(matches!(train(&training_set(5, 20), &cfg), Err(FirecastError::EmptyFeatureSet)));
    }

    #[test]
    fn single_label_is_data_error() {
        let mut ts = training_set(5, 20);
        ts.points.retain(|p| p.label == Label::Background);
        let err = train(&ts, &MaxentConfig::default()).unwrap_err();
        assert!(matches!(err, FirecastError::MissingLabel { label: "presence" }));
    }

    #[test]
    fn background_size_follows_configuration() {
        let ts = training_set(6, 30);
        let with = train(&ts, &MaxentConfig::default()).unwrap();
        let without = train(&ts, &MaxentConfig { add_samples_to_background: false, ..Default::default() }).unwrap();
        assert_eq!(with.explanation.n_background, 36);
        assert_eq!(without.explanation.n_background, 30);
    }

    #[test]
    fn auto_selection_with_many_presences_uses_richer_families() {
        let model = train(&training_set(90, 200), &MaxentConfig { max_iterations: 50, ..Default::default() }).unwrap();
        let fams = &model.explanation.families;
        for f in [FeatureFamily::Linear, FeatureFamily::Quadratic, FeatureFamily::Hinge, FeatureFamily::Product] {
            assert!(fams.contains(&f), "{f} missing from {fams:?}");
        }
    }

    #[test]
    fn training_is_deterministic() {
        let ts = training_set(15, 40);
        let a = train(&ts, &MaxentConfig::default()).unwrap();
        let b = train(&ts, &MaxentConfig::default()).unwrap();
        assert_eq!(a, b);
    }
}
