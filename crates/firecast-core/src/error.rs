//! Error taxonomy shared by every pipeline stage.
//!
//! Variants are grouped by [`ErrorKind`] so callers can tell configuration
//! problems apart from data-dependent ones without matching every variant.

use std::fmt;

use thiserror::Error;

/// Broad failure class of a [`FirecastError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing identifiers, grid mismatches, malformed inputs.
    Input,
    /// The inputs are well formed but cannot support training.
    Data,
    /// The feature or run configuration cannot be honoured.
    Config,
    /// The fitted model cannot be applied to the forecast stack.
    Scoring,
}

#[derive(Debug, Error)]
pub enum FirecastError {
    #[error("raster '{id}' not found")]
    MissingRaster { id: String },

    #[error("point collection '{id}' not found")]
    MissingPoints { id: String },

    #[error("raster '{id}' does not match the reference grid: {detail}")]
    GridMismatch { id: String, detail: String },

    #[error("band '{band}' is not present in stack '{stack}'")]
    MissingBand { stack: String, band: String },

    #[error("band '{band}' appears more than once in stack '{stack}'")]
    DuplicateBand { stack: String, band: String },

    #[error("raster '{id}' is malformed: {detail}")]
    InvalidRaster { id: String, detail: String },

    #[error("point collection '{id}' is malformed: {detail}")]
    InvalidPoints { id: String, detail: String },

    #[error("invalid region: {0}")]
    InvalidRegion(String),

    #[error("no presence points available for training")]
    NoPresencePoints,

    #[error("no background points survived ({detail})")]
    NoBackgroundPoints { detail: String },

    #[error("training set has no {label} points after assembly")]
    MissingLabel { label: &'static str },

    #[error("training point {index} has no finite value for band '{band}'")]
    NonFiniteSample { index: usize, band: String },

    #[error("no feature families are enabled and auto feature selection is off")]
    EmptyFeatureSet,

    #[error("feature family '{family}' cannot be constructed: {reason}")]
    FamilyUnavailable { family: &'static str, reason: String },

    #[error("no features could be built: {reason}")]
    NoFeatures { reason: String },

    #[error("invalid configuration for {field}: {message}")]
    InvalidConfig { field: &'static str, message: String },

    #[error("forecast stack is missing band '{band}' used by the fitted model")]
    ScoringBandMissing { band: String },
}

impl FirecastError {
    pub fn kind(&self) -> ErrorKind {
        use FirecastError::*;
        match self {
            MissingRaster { .. }
            | MissingPoints { .. }
            | GridMismatch { .. }
            | MissingBand { .. }
            | DuplicateBand { .. }
            | InvalidRaster { .. }
            | InvalidPoints { .. }
            | InvalidRegion(_) => ErrorKind::Input,
            NoPresencePoints | NoBackgroundPoints { .. } | MissingLabel { .. } | NonFiniteSample { .. } => {
                ErrorKind::Data
            }
            EmptyFeatureSet | FamilyUnavailable { .. } | NoFeatures { .. } | InvalidConfig { .. } => {
                ErrorKind::Config
            }
            ScoringBandMissing { .. } => ErrorKind::Scoring,
        }
    }

    pub(crate) fn invalid_config(field: &'static str, message: impl Into<String>) -> Self {
        FirecastError::InvalidConfig { field, message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, FirecastError>;

/// Pipeline stage names used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ValidateConfig,
    LoadStacks,
    LoadPresence,
    SampleCandidates,
    ExclusionJoin,
    AssembleTrainingSet,
    Train,
    Score,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ValidateConfig => "validate-config",
            Stage::LoadStacks => "load-stacks",
            Stage::LoadPresence => "load-presence",
            Stage::SampleCandidates => "sample-candidates",
            Stage::ExclusionJoin => "exclusion-join",
            Stage::AssembleTrainingSet => "assemble-training-set",
            Stage::Train => "train",
            Stage::Score => "score",
        };
        f.write_str(name)
    }
}

/// A [`FirecastError`] tagged with the stage that raised it.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: FirecastError,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Attach a stage to a core result.
pub(crate) trait StageContext<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, PipelineError>;
}

impl<T> StageContext<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, PipelineError> {
        self.map_err(|source| PipelineError { stage, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_group_variants() {
        assert_eq!(FirecastError::MissingRaster { id: "pr".into() }.kind(), ErrorKind::Input);
        assert_eq!(FirecastError::NoPresencePoints.kind(), ErrorKind::Data);
        assert_eq!(FirecastError::EmptyFeatureSet.kind(), ErrorKind::Config);
        assert_eq!(
            FirecastError::ScoringBandMissing { band: "VPD".into() }.kind(),
            ErrorKind::Scoring
        );
    }

    #[test]
    fn pipeline_error_names_stage_and_identifier() {
        let res: Result<()> = Err(FirecastError::MissingRaster { id: "T2M_OND2021".into() });
        let err = res.at(Stage::LoadStacks).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
        let msg = err.to_string();
        assert!(msg.contains("load-stacks"), "{msg}");
        assert!(msg.contains("T2M_OND2021"), "{msg}");
    }
}
