//! Ensemble learning
//!
//! The run threads its values explicitly through:
//! [`BaseLearnerPool`] -> [`PerClassScorer`] -> [`LeaderAssigner`] -> [`DecisionEngine`]

pub mod boosting;
pub mod decision;
pub mod leader;
pub mod learner;
pub mod pool;
pub mod scoring;

pub use decision::{
    collect_votes, Agreement, ConfidenceComparison, DecisionBatch, DecisionConfig, DecisionEngine, DecisionPath,
    DecisionStats, FusedPrediction, LearnerVote, SampleVotes,
};
pub use leader::{LeaderAssigner, LeaderTable};
pub use learner::{argmax, BaseLearner, LearnerKind, LearnerSlot, LearnerSpec};
pub use pool::{BaseLearnerPool, LearnerTraining};
pub use scoring::{PerClassScoreTable, PerClassScorer};
