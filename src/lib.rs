//! Leader-Class and Confidence Decision Ensemble (LCCDE)
//!
//! Combines three independently trained multi-class classifiers for
//! intrusion detection. Each class is assigned to the learner with the best
//! held-out F1 on it, and per-sample disagreements are resolved with those
//! leaders and the learners' confidences.
//!
//! ```ignore
//! use lccde::{DatasetLoader, ExperimentConfig, ExperimentRunner};
//!
//! let dataset = DatasetLoader::new().load("cicids2017.csv".as_ref())?;
//! let outcome = ExperimentRunner::new(ExperimentConfig::default())?.run(&dataset)?;
//! println!("{}", outcome.lccde.to_text());
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod experiment;
pub mod ml;

pub use config::{ExperimentConfig, LearnersConfig, ParallelConfig};
pub use dataset::{Dataset, DatasetLoader, FeatureMatrix, Label, LabelSet, TrainTestSplit};
pub use error::{LccdeError, Result};
pub use evaluation::{ConfusionMatrix, EvaluationReport, EvaluationReporter, ReportFormat};
pub use experiment::{ExperimentOutcome, ExperimentRunner};
pub use ml::{
    BaseLearner, BaseLearnerPool, DecisionEngine, FusedPrediction, LeaderAssigner, LeaderTable, LearnerKind,
    LearnerSlot, LearnerSpec, PerClassScoreTable, PerClassScorer,
};
