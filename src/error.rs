//! Error taxonomy for experiment runs
//!
//! Every stage of the call chain returns [`Result`]; nothing is recovered
//! locally, so a run either produces a complete outcome or one of these.

use thiserror::Error;

use crate::dataset::Label;

#[derive(Debug, Error)]
pub enum LccdeError {
    /// Degenerate split: fewer than two classes, or a class without training rows.
    #[error("insufficient data for label {label}: {reason}")]
    DataInsufficient { label: Label, reason: String },

    /// A base learner could not produce an output for a sample.
    #[error("learner {learner} failed on sample {sample}: {reason}")]
    Prediction {
        learner: String,
        sample: usize,
        reason: String,
    },

    /// A hyperparameter is incompatible with the learner kind.
    #[error("invalid configuration for {learner}: parameter `{parameter}` {reason}")]
    Configuration {
        learner: String,
        parameter: String,
        reason: String,
    },

    #[error("invalid feature dimension: expected {expected}, got {got}")]
    InvalidDimension { expected: usize, got: usize },

    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("model not trained: {0}")]
    NotTrained(String),

    /// A learner returned an unusable probability vector.
    #[error("learner {learner} produced invalid probabilities: {reason}")]
    InvalidProbabilities { learner: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("report formatting error: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("toml write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl LccdeError {
    pub(crate) fn config(
        learner: impl Into<String>,
        parameter: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        LccdeError::Configuration {
            learner: learner.into(),
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn insufficient(label: Label, reason: impl Into<String>) -> Self {
        LccdeError::DataInsufficient {
            label,
            reason: reason.into(),
        }
    }

    /// True for the errors an orchestration layer should surface as a bad
    /// experiment setup rather than an internal failure.
    pub fn is_configuration_problem(&self) -> bool {
        matches!(
            self,
            LccdeError::DataInsufficient { .. } | LccdeError::Configuration { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LccdeError>;
