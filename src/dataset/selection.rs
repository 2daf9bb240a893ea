//! Information-gain feature selection
//!
//! Scores every feature by the mutual information between its quantile-binned
//! values and the label on the training split, then keeps the highest scoring
//! features until their share of the total gain reaches a threshold.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{BinMapper, FeatureMatrix, Label, LabelSet};
use crate::error::{LccdeError, Result};

/// Default cumulative-gain cut-off
pub const DEFAULT_SELECTION_THRESHOLD: f64 = 0.9;

/// Bins used when estimating mutual information
const GAIN_BINS: usize = 32;

#[derive(Debug, Clone)]
pub struct InformationGainSelector {
    threshold: f64,
}

impl Default for InformationGainSelector {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SELECTION_THRESHOLD,
        }
    }
}

/// Chosen columns and the gain of every input column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSelection {
    /// Selected column indices, highest gain first
    pub selected: Vec<usize>,
    /// Mutual information per input column (nats)
    pub gains: Vec<f64>,
}

impl InformationGainSelector {
    pub fn new(threshold: f64) -> Result<Self> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(LccdeError::config(
                "feature_selection",
                "feature_selection_threshold",
                format!("must be in (0, 1], got {}", threshold),
            ));
        }
        Ok(Self { threshold })
    }

    pub fn fit(
        &self,
        features: &FeatureMatrix,
        labels: &[Label],
        label_set: &LabelSet,
    ) -> Result<FeatureSelection> {
        if features.n_rows() != labels.len() {
            return Err(LccdeError::InvalidDimension {
                expected: features.n_rows(),
                got: labels.len(),
            });
        }
        let binned = BinMapper::fit(features, GAIN_BINS).transform(features);
        let mapper_bins: Vec<usize> = (0..features.n_features())
            .map(|j| binned.column(j).iter().copied().max().map(|b| b as usize + 1).unwrap_or(1))
            .collect();

        let gains: Vec<f64> = (0..features.n_features())
            .map(|j| mutual_information(binned.column(j), mapper_bins[j], labels, label_set.len()))
            .collect();

        let mut order: Vec<usize> = (0..gains.len()).collect();
        order.sort_by(|&a, &b| {
            gains[b]
                .partial_cmp(&gains[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        let total: f64 = gains.iter().sum();
        let selected = if total <= 0.0 {
            // Nothing is informative; keep every column rather than none
            order
        } else {
            let mut acc = 0.0;
            let mut selected = Vec::new();
            for j in order {
                acc += gains[j] / total;
                selected.push(j);
                if acc >= self.threshold {
                    break;
                }
            }
            selected
        };

        info!(
            selected = selected.len(),
            total = features.n_features(),
            "feature selection complete"
        );
        Ok(FeatureSelection { selected, gains })
    }
}

impl FeatureSelection {
    /// Project a matrix onto the selected columns
    pub fn apply(&self, features: &FeatureMatrix) -> FeatureMatrix {
        features.select_columns(&self.selected)
    }

    /// Names of the selected columns
    pub fn selected_names(&self, names: &[String]) -> Vec<String> {
        self.selected
            .iter()
            .map(|&j| names.get(j).cloned().unwrap_or_else(|| format!("f{}", j)))
            .collect()
    }
}

fn mutual_information(bins: &[u16], n_bins: usize, labels: &[Label], n_classes: usize) -> f64 {
    let n = labels.len();
    if n == 0 {
        return 0.0;
    }
    let mut joint = vec![0usize; n_bins * n_classes];
    let mut bin_counts = vec![0usize; n_bins];
    let mut class_counts = vec![0usize; n_classes];
    for (&b, &l) in bins.iter().zip(labels) {
        joint[b as usize * n_classes + l] += 1;
        bin_counts[b as usize] += 1;
        class_counts[l] += 1;
    }

    let n = n as f64;
    let mut mi = 0.0;
    for b in 0..n_bins {
        for c in 0..n_classes {
            let count = joint[b * n_classes + c];
            if count == 0 {
                continue;
            }
            let p_joint = count as f64 / n;
            let p_bin = bin_counts[b] as f64 / n;
            let p_class = class_counts[c] as f64 / n;
            mi += p_joint * (p_joint / (p_bin * p_class)).ln();
        }
    }
    mi.max(0.0)
}
