//! Per-class scoring of the base learners
//!
//! Each learner is scored one-vs-rest on the held-out split. The resulting
//! table is total over the label set: labels missing from the held-out split
//! score 0 for every learner.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::decision::{collect_votes, SampleVotes};
use super::learner::LearnerSlot;
use super::pool::BaseLearnerPool;
use crate::dataset::{FeatureMatrix, Label, LabelSet};
use crate::error::{LccdeError, Result};
use crate::evaluation::ConfusionMatrix;

/// F1 per (learner, label), every entry in `[0, 1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerClassScoreTable {
    /// `scores[slot][label]`
    scores: [Vec<f64>; 3],
}

impl PerClassScoreTable {
    /// Build from explicit per-slot rows; rows must cover the same labels
    pub fn from_rows(scores: [Vec<f64>; 3]) -> Result<Self> {
        let n = scores[0].len();
        for row in &scores {
            if row.len() != n {
                return Err(LccdeError::InvalidDimension {
                    expected: n,
                    got: row.len(),
                });
            }
            if row.iter().any(|s| !(0.0..=1.0).contains(s)) {
                return Err(LccdeError::InvalidDataset(
                    "per-class scores must lie in [0, 1]".to_string(),
                ));
            }
        }
        Ok(Self { scores })
    }

    pub fn n_classes(&self) -> usize {
        self.scores[0].len()
    }

    pub fn score(&self, slot: LearnerSlot, label: Label) -> f64 {
        self.scores[slot.index()][label]
    }

    /// Scores of one learner ordered by label
    pub fn row(&self, slot: LearnerSlot) -> &[f64] {
        &self.scores[slot.index()]
    }

    /// Scores of the three learners for one label, in slot order
    pub fn column(&self, label: Label) -> [f64; 3] {
        LearnerSlot::PREFERENCE.map(|slot| self.score(slot, label))
    }
}

/// Computes [`PerClassScoreTable`]s
pub struct PerClassScorer;

impl PerClassScorer {
    /// Predict the held-out split with every learner and score it
    pub fn score(
        pool: &BaseLearnerPool,
        features: &FeatureMatrix,
        labels: &[Label],
        label_set: &LabelSet,
    ) -> Result<PerClassScoreTable> {
        let votes = collect_votes(pool, features, false)?;
        Self::score_votes(&votes, labels, label_set)
    }

    /// Score votes that were already collected on the held-out split
    pub fn score_votes(
        votes: &[SampleVotes],
        labels: &[Label],
        label_set: &LabelSet,
    ) -> Result<PerClassScoreTable> {
        let scores = Self::confusion_matrices(votes, labels, label_set)?
            .map(|matrix| label_set.iter().map(|label| matrix.f1(label)).collect::<Vec<_>>());
        for slot in LearnerSlot::PREFERENCE {
            debug!(learner = %slot, scores = ?scores[slot.index()], "per-class F1");
        }
        PerClassScoreTable::from_rows(scores)
    }

    /// One confusion matrix per learner, in slot order
    pub fn confusion_matrices(
        votes: &[SampleVotes],
        labels: &[Label],
        label_set: &LabelSet,
    ) -> Result<[ConfusionMatrix; 3]> {
        if votes.len() != labels.len() {
            return Err(LccdeError::InvalidDimension {
                expected: labels.len(),
                got: votes.len(),
            });
        }
        let mut matrices = [
            ConfusionMatrix::new(label_set.len()),
            ConfusionMatrix::new(label_set.len()),
            ConfusionMatrix::new(label_set.len()),
        ];
        for (sample, &truth) in votes.iter().zip(labels) {
            for (matrix, vote) in matrices.iter_mut().zip(sample.iter()) {
                matrix.record(truth, vote.label)?;
            }
        }
        Ok(matrices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::decision::LearnerVote;

    fn votes(rows: &[[Label; 3]]) -> Vec<SampleVotes> {
        rows.iter()
            .map(|r| r.map(|label| LearnerVote { label, confidence: 0.9 }))
            .collect()
    }

    #[test]
    fn test_scores_per_learner() {
        // A perfect, B always predicts 0, C swaps 1 and 2
        let v = votes(&[[0, 0, 0], [1, 0, 2], [2, 0, 1], [1, 0, 2]]);
        let truth = [0, 1, 2, 1];
        let set = LabelSet::new(3).unwrap();
        let table = PerClassScorer::score_votes(&v, &truth, &set).unwrap();
        assert_eq!(table.row(LearnerSlot::A), &[1.0, 1.0, 1.0]);
        assert!((table.score(LearnerSlot::B, 0) - 0.4).abs() < 1e-12);
        assert_eq!(table.score(LearnerSlot::B, 1), 0.0);
        assert_eq!(table.column(1), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_absent_label_scores_zero() {
        let v = votes(&[[0, 0, 1], [1, 1, 1]]);
        let truth = [0, 1];
        let set = LabelSet::new(4).unwrap();
        let table = PerClassScorer::score_votes(&v, &truth, &set).unwrap();
        assert_eq!(table.n_classes(), 4);
        assert_eq!(table.column(3), [0.0, 0.0, 0.0]);
        assert_eq!(table.column(2), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_scores_bounded() {
        let v = votes(&[[0, 1, 2], [2, 1, 0], [1, 1, 1], [0, 2, 2]]);
        let truth = [0, 1, 2, 2];
        let set = LabelSet::new(3).unwrap();
        let table = PerClassScorer::score_votes(&v, &truth, &set).unwrap();
        for slot in LearnerSlot::PREFERENCE {
            assert!(table.row(slot).iter().all(|s| (0.0..=1.0).contains(s)));
        }
    }

    #[test]
    fn test_from_rows_rejects_out_of_range() {
        assert!(PerClassScoreTable::from_rows([vec![0.5], vec![1.5], vec![0.0]]).is_err());
        assert!(PerClassScoreTable::from_rows([vec![0.5], vec![0.5, 0.1], vec![0.0]]).is_err());
    }

    #[test]
    fn test_score_with_pool() {
        use crate::ml::pool::tests::{default_specs, make_data};
        let (x, y, set) = make_data();
        let mut pool = BaseLearnerPool::new(default_specs(), 0).unwrap();
        pool.fit(&x, &y, &set).unwrap();
        let table = PerClassScorer::score(&pool, &x, &y, &set).unwrap();
        assert_eq!(table.n_classes(), 3);
        assert!(table.column(0).iter().all(|&s| s > 0.5));
    }
}
