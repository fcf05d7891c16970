//! Feature construction from raw predictor values.
//!
//! Continuous predictors are scaled to [0, 1] by the training-set range.
//! Threshold and hinge knots are interior quantiles of the scaled values.
//! Categorical predictors only ever produce indicator features.

use serde::{Deserialize, Serialize};

use super::config::{FeatureFamily, MaxentConfig};
use crate::error::{FirecastError, Result};

/// A predictor band and the range used to scale it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub categorical: bool,
    pub min: f64,
    pub max: f64,
}

impl Variable {
    /// Scaled value; clamped to [0, 1] when `clamp` is set. Categorical values pass through.
    #[inline]
    pub fn scale(&self, x: f64, clamp: bool) -> f64 {
        if self.categorical {
            return x;
        }
        let z = (x - self.min) / (self.max - self.min);
        if clamp {
            z.clamp(0.0, 1.0)
        } else {
            z
        }
    }

    fn unscale(&self, z: f64) -> f64 {
        self.min + z * (self.max - self.min)
    }

    fn is_constant(&self) -> bool {
        !self.categorical && self.max <= self.min
    }
}

/// Basis function over scaled predictor values. Knots are in scaled units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureKind {
    Linear { var: usize },
    Quadratic { var: usize },
    Product { a: usize, b: usize },
    Threshold { var: usize, knot: f64 },
    ForwardHinge { var: usize, knot: f64 },
    ReverseHinge { var: usize, knot: f64 },
    Category { var: usize, value: f64 },
}

impl FeatureKind {
    pub fn family(&self) -> FeatureFamily {
        match self {
            FeatureKind::Linear { .. } => FeatureFamily::Linear,
            FeatureKind::Quadratic { .. } => FeatureFamily::Quadratic,
            FeatureKind::Product { .. } => FeatureFamily::Product,
            FeatureKind::Threshold { .. } => FeatureFamily::Threshold,
            FeatureKind::ForwardHinge { .. } | FeatureKind::ReverseHinge { .. } => FeatureFamily::Hinge,
            FeatureKind::Category { .. } => FeatureFamily::Categorical,
        }
    }

    /// True if this feature reads variable `v`.
    pub fn uses(&self, v: usize) -> bool {
        match *self {
            FeatureKind::Product { a, b } => a == v || b == v,
            FeatureKind::Linear { var }
            | FeatureKind::Quadratic { var }
            | FeatureKind::Threshold { var, .. }
            | FeatureKind::ForwardHinge { var, .. }
            | FeatureKind::ReverseHinge { var, .. }
            | FeatureKind::Category { var, .. } => var == v,
        }
    }

    /// Evaluate on scaled values `z`.
    #[inline]
    pub fn eval(&self, z: &[f64]) -> f64 {
        match *self {
            FeatureKind::Linear { var } => z[var],
            FeatureKind::Quadratic { var } => z[var] * z[var],
            FeatureKind::Product { a, b } => z[a] * z[b],
            FeatureKind::Threshold { var, knot } => {
                if z[var] > knot {
                    1.0
                } else {
                    0.0
                }
            }
            FeatureKind::ForwardHinge { var, knot } => {
                if z[var] > knot {
                    (z[var] - knot) / (1.0 - knot)
                } else {
                    0.0
                }
            }
            FeatureKind::ReverseHinge { var, knot } => {
                if z[var] < knot {
                    (knot - z[var]) / knot
                } else {
                    0.0
                }
            }
            FeatureKind::Category { var, value } => {
                if z[var] == value {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Human-readable name in raw predictor units.
    pub fn describe(&self, vars: &[Variable]) -> String {
        let raw = |var: usize, knot: f64| vars[var].unscale(knot);
        match *self {
            FeatureKind::Linear { var } => vars[var].name.clone(),
            FeatureKind::Quadratic { var } => format!("{}^2", vars[var].name),
            FeatureKind::Product { a, b } => format!("{}*{}", vars[a].name, vars[b].name),
            FeatureKind::Threshold { var, knot } => format!("step({}>{:.6})", vars[var].name, raw(var, knot)),
            FeatureKind::ForwardHinge { var, knot } => format!("hinge({}>{:.6})", vars[var].name, raw(var, knot)),
            FeatureKind::ReverseHinge { var, knot } => format!("revhinge({}<{:.6})", vars[var].name, raw(var, knot)),
            FeatureKind::Category { var, value } => format!("{}={}", vars[var].name, value),
        }
    }
}

/// Variables plus the features built over them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub variables: Vec<Variable>,
    pub features: Vec<FeatureKind>,
}

impl FeatureSet {
    /// Build features for `families` from training rows (values in `names` order).
    ///
    /// `explicit` marks a hand-picked family list: a family that yields no
    /// feature is then an error instead of being skipped.
    pub fn build(
        names: &[String],
        rows: &[Vec<f64>],
        families: &[FeatureFamily],
        config: &MaxentConfig,
        explicit: bool,
    ) -> Result<FeatureSet> {
        for cat in &config.categorical_bands {
            if !names.contains(cat) {
                return Err(FirecastError::invalid_config(
                    "categorical_bands",
                    format!("'{cat}' is not one of the predictor bands"),
                ));
            }
        }

        let variables = names
            .iter()
            .enumerate()
            .map(|(i, name)| build_variable(name, rows.iter().map(|r| r[i]), config))
            .collect::<Result<Vec<_>>>()?;

        for v in variables.iter().filter(|v| v.is_constant()) {
            log::warn!("predictor '{}' is constant over the training set; skipping its features", v.name);
        }
        let continuous: Vec<usize> = (0..variables.len())
            .filter(|&i| !variables[i].categorical && !variables[i].is_constant())
            .collect();

        let scaled: Vec<Vec<f64>> = rows
            .iter()
            .map(|r| variables.iter().zip(r).map(|(v, &x)| v.scale(x, true)).collect())
            .collect();

        let mut features = Vec::new();
        for &family in families {
            let before = features.len();
            match family {
                FeatureFamily::Linear => features.extend(continuous.iter().map(|&var| FeatureKind::Linear { var })),
                FeatureFamily::Quadratic => {
                    features.extend(continuous.iter().map(|&var| FeatureKind::Quadratic { var }))
                }
                FeatureFamily::Product => {
                    for (i, &a) in continuous.iter().enumerate() {
                        for &b in &continuous[i + 1..] {
                            features.push(FeatureKind::Product { a, b });
                        }
                    }
                }
                FeatureFamily::Threshold => {
                    for &var in &continuous {
                        let knots = quantile_knots(scaled.iter().map(|z| z[var]), config.knots);
                        features.extend(knots.into_iter().map(|knot| FeatureKind::Threshold { var, knot }));
                    }
                }
                FeatureFamily::Hinge => {
                    for &var in &continuous {
                        for knot in quantile_knots(scaled.iter().map(|z| z[var]), config.knots) {
                            features.push(FeatureKind::ForwardHinge { var, knot });
                            features.push(FeatureKind::ReverseHinge { var, knot });
                        }
                    }
                }
                FeatureFamily::Categorical => {}
            }
            if features.len() == before && family != FeatureFamily::Categorical {
                let reason = unavailable_reason(family, continuous.len(), &variables);
                if explicit {
                    return Err(FirecastError::FamilyUnavailable { family: family.name(), reason });
                }
                log::debug!("auto-selected family '{family}' yields no features: {reason}");
            }
        }

        for (var, v) in variables.iter().enumerate().filter(|(_, v)| v.categorical) {
            let mut values: Vec<f64> = rows.iter().map(|r| r[var]).collect();
            values.sort_by(f64::total_cmp);
            values.dedup();
            log::debug!("categorical predictor '{}' has {} levels", v.name, values.len());
            features.extend(values.into_iter().map(|value| FeatureKind::Category { var, value }));
        }

        if features.is_empty() {
            return Err(FirecastError::NoFeatures {
                reason: "every predictor is constant over the training set".into(),
            });
        }
        Ok(FeatureSet { variables, features })
    }

    /// Scale a raw predictor vector (in variable order).
    pub fn scale(&self, raw: &[f64], clamp: bool) -> Vec<f64> {
        self.variables.iter().zip(raw).map(|(v, &x)| v.scale(x, clamp)).collect()
    }

    /// Feature vector for raw predictor values.
    pub fn evaluate(&self, raw: &[f64], clamp: bool) -> Vec<f64> {
        let z = self.scale(raw, clamp);
        self.features.iter().map(|f| f.eval(&z)).collect()
    }
}

fn build_variable(name: &str, values: impl Iterator<Item = f64>, config: &MaxentConfig) -> Result<Variable> {
    let categorical = config.categorical_bands.iter().any(|c| c == name);
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for x in values {
        if categorical && x.fract() != 0.0 {
            return Err(FirecastError::FamilyUnavailable {
                family: FeatureFamily::Categorical.name(),
                reason: format!("predictor '{name}' has non-integer value {x}"),
            });
        }
        min = min.min(x);
        max = max.max(x);
    }
    Ok(Variable { name: name.to_string(), categorical, min, max })
}

fn unavailable_reason(family: FeatureFamily, n_continuous: usize, vars: &[Variable]) -> String {
    match family {
        FeatureFamily::Product if n_continuous == 1 => "needs at least two continuous predictors".into(),
        _ if n_continuous == 0 && vars.iter().any(|v| v.categorical) => {
            "no continuous predictors (categorical predictors only support indicator features)".into()
        }
        _ if n_continuous == 0 => "every continuous predictor is constant".into(),
        _ => "predictors have too few distinct values for knots".into(),
    }
}

/// Distinct interior quantiles at `i / (k + 1)` for `i = 1..=k`, strictly inside (0, 1).
pub fn quantile_knots(values: impl Iterator<Item = f64>, k: usize) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    if sorted.len() < 2 {
        return Vec::new();
    }
    sorted.sort_by(f64::total_cmp);
    let last = (sorted.len() - 1) as f64;

    let mut knots: Vec<f64> = Vec::with_capacity(k);
    for i in 1..=k {
        let pos = i as f64 / (k + 1) as f64 * last;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        let q = sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64);
        if q > 0.0 && q < 1.0 && knots.last().map_or(true, |&prev| q > prev) {
            knots.push(q);
        }
    }
    knots
}
