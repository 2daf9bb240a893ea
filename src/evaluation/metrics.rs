//! Classification metrics
//!
//! Confusion matrix plus the per-class and averaged precision/recall/F1
//! derived from it. Divisions by zero yield 0 rather than an error.

use serde::{Deserialize, Serialize};

use crate::dataset::{Label, LabelSet};
use crate::error::{LccdeError, Result};

/// `|L| x |L|` counts, rows = true label, columns = predicted label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    n_classes: usize,
    counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![vec![0; n_classes]; n_classes],
        }
    }

    /// Tally paired truth/prediction vectors
    pub fn from_predictions(truth: &[Label], predicted: &[Label], n_classes: usize) -> Result<Self> {
        if truth.len() != predicted.len() {
            return Err(LccdeError::InvalidDimension {
                expected: truth.len(),
                got: predicted.len(),
            });
        }
        let mut matrix = Self::new(n_classes);
        for (&t, &p) in truth.iter().zip(predicted) {
            matrix.record(t, p)?;
        }
        Ok(matrix)
    }

    pub fn record(&mut self, truth: Label, predicted: Label) -> Result<()> {
        if truth >= self.n_classes || predicted >= self.n_classes {
            return Err(LccdeError::InvalidDataset(format!(
                "label pair ({truth}, {predicted}) outside label set of size {}",
                self.n_classes
            )));
        }
        self.counts[truth][predicted] += 1;
        Ok(())
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn get(&self, truth: Label, predicted: Label) -> u64 {
        self.counts[truth][predicted]
    }

    pub fn rows(&self) -> &[Vec<u64>] {
        &self.counts
    }

    /// Samples whose true label is `label`
    pub fn support(&self, label: Label) -> u64 {
        self.counts[label].iter().sum()
    }

    /// Samples predicted as `label`
    pub fn predicted(&self, label: Label) -> u64 {
        self.counts.iter().map(|row| row[label]).sum()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> u64 {
        (0..self.n_classes).map(|l| self.counts[l][l]).sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    /// TP / (TP + FP)
    pub fn precision(&self, label: Label) -> f64 {
        ratio(self.counts[label][label], self.predicted(label))
    }

    /// TP / (TP + FN)
    pub fn recall(&self, label: Label) -> f64 {
        ratio(self.counts[label][label], self.support(label))
    }

    /// One-vs-rest F1 for `label`
    pub fn f1(&self, label: Label) -> f64 {
        f1(self.precision(label), self.recall(label))
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall <= 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// One row of a classification report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: Label,
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

/// Averaged precision/recall/F1 across classes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

/// Accuracy, per-class rows and both averages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub per_class: Vec<ClassMetrics>,
    /// Unweighted mean over all labels
    pub macro_avg: AveragedMetrics,
    /// Mean weighted by per-class support
    pub weighted_avg: AveragedMetrics,
}

impl ClassificationMetrics {
    pub fn from_confusion(matrix: &ConfusionMatrix, label_set: &LabelSet) -> Self {
        let per_class: Vec<ClassMetrics> = label_set
            .iter()
            .map(|label| ClassMetrics {
                label,
                name: label_set.name(label),
                precision: matrix.precision(label),
                recall: matrix.recall(label),
                f1: matrix.f1(label),
                support: matrix.support(label),
            })
            .collect();

        let total = matrix.total();
        let n = per_class.len().max(1) as f64;
        let mut macro_avg = AveragedMetrics {
            support: total,
            ..Default::default()
        };
        let mut weighted_avg = macro_avg;
        for row in &per_class {
            macro_avg.precision += row.precision / n;
            macro_avg.recall += row.recall / n;
            macro_avg.f1 += row.f1 / n;
            if total > 0 {
                let w = row.support as f64 / total as f64;
                weighted_avg.precision += row.precision * w;
                weighted_avg.recall += row.recall * w;
                weighted_avg.f1 += row.f1 * w;
            }
        }

        Self {
            accuracy: matrix.accuracy(),
            per_class,
            macro_avg,
            weighted_avg,
        }
    }

    /// Per-class F1 ordered by label
    pub fn f1_by_label(&self) -> Vec<f64> {
        self.per_class.iter().map(|c| c.f1).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> ConfusionMatrix {
        // truth:     0 0 0 1 1 2
        // predicted: 0 0 1 1 1 0
        ConfusionMatrix::from_predictions(&[0, 0, 0, 1, 1, 2], &[0, 0, 1, 1, 1, 0], 3).unwrap()
    }

    #[test]
    fn test_confusion_counts() {
        let m = sample_matrix();
        assert_eq!(m.get(0, 0), 2);
        assert_eq!(m.get(0, 1), 1);
        assert_eq!(m.get(2, 0), 1);
        assert_eq!(m.support(0), 3);
        assert_eq!(m.predicted(0), 3);
        assert_eq!(m.total(), 6);
        assert!((m.accuracy() - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_per_class_scores() {
        let m = sample_matrix();
        assert!((m.precision(0) - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall(0) - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.precision(1) - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall(1) - 1.0).abs() < 1e-12);
        assert!((m.f1(1) - 0.8).abs() < 1e-12);
        // label 2 is never predicted correctly
        assert_eq!(m.f1(2), 0.0);
    }

    #[test]
    fn test_zero_division_is_zero() {
        let m = ConfusionMatrix::from_predictions(&[0, 0], &[0, 0], 3).unwrap();
        assert_eq!(m.precision(2), 0.0);
        assert_eq!(m.recall(2), 0.0);
        assert_eq!(m.f1(2), 0.0);
    }

    #[test]
    fn test_out_of_range_label() {
        assert!(ConfusionMatrix::from_predictions(&[0], &[3], 3).is_err());
        assert!(ConfusionMatrix::from_predictions(&[0, 1], &[0], 3).is_err());
    }

    #[test]
    fn test_weighted_and_macro() {
        let m = sample_matrix();
        let set = LabelSet::new(3).unwrap();
        let metrics = ClassificationMetrics::from_confusion(&m, &set);
        let f1 = metrics.f1_by_label();
        let macro_f1 = f1.iter().sum::<f64>() / 3.0;
        let weighted_f1 = (f1[0] * 3.0 + f1[1] * 2.0 + f1[2]) / 6.0;
        assert!((metrics.macro_avg.f1 - macro_f1).abs() < 1e-12);
        assert!((metrics.weighted_avg.f1 - weighted_f1).abs() < 1e-12);
        assert_eq!(metrics.weighted_avg.support, 6);
        let weighted_recall = (2.0 / 3.0 * 3.0 + 1.0 * 2.0) / 6.0;
        assert!((metrics.weighted_avg.recall - weighted_recall).abs() < 1e-12);
    }
}
