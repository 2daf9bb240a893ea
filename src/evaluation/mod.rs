//! Evaluation of fused and per-learner predictions

pub mod metrics;
pub mod report;

pub use metrics::{AveragedMetrics, ClassMetrics, ClassificationMetrics, ConfusionMatrix};
pub use report::{EvaluationReport, EvaluationReporter, ReportFormat};
