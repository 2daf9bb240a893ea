//! Synthetic minority oversampling (SMOTE)
//!
//! Rebalances a training split before fitting. For every label with a
//! requested target count, new rows are interpolated between a randomly drawn
//! row of that label and one of its nearest same-label neighbours:
//! `x_new = x + u * (neighbour - x)` with `u` uniform in `[0, 1)`.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{FeatureMatrix, Label, LabelSet};
use crate::error::{LccdeError, Result};

/// Default neighbourhood size
pub const DEFAULT_K_NEIGHBORS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Smote {
    /// Target row count per label after resampling
    pub sampling_strategy: BTreeMap<Label, usize>,
    /// Neighbours considered per seed row
    pub k_neighbors: usize,
    /// Generator seed
    pub seed: u64,
}

impl Smote {
    pub fn new(sampling_strategy: BTreeMap<Label, usize>, seed: u64) -> Self {
        Self {
            sampling_strategy,
            k_neighbors: DEFAULT_K_NEIGHBORS,
            seed,
        }
    }

    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k;
        self
    }

    /// Check the strategy against the label set and current class counts
    /// without generating anything.
    pub fn validate(&self, labels: &[Label], label_set: &LabelSet) -> Result<()> {
        if self.k_neighbors == 0 {
            return Err(LccdeError::config("smote", "k_neighbors", "must be at least 1"));
        }
        let counts = label_set.counts(labels);
        for (&label, &target) in &self.sampling_strategy {
            if !label_set.contains(label) {
                return Err(LccdeError::insufficient(
                    label,
                    format!("sampling strategy names a label outside 0..{}", label_set.len()),
                ));
            }
            let current = counts[label];
            if current == 0 {
                return Err(LccdeError::insufficient(label, "no training rows to oversample"));
            }
            if target < current {
                return Err(LccdeError::config(
                    "smote",
                    format!("sampling_strategy[{}]", label),
                    format!("target {} is below the current count {}", target, current),
                ));
            }
            if target > current && current < 2 {
                return Err(LccdeError::config(
                    "smote",
                    format!("sampling_strategy[{}]", label),
                    "needs at least 2 rows of the label to interpolate",
                ));
            }
        }
        Ok(())
    }

    /// Return the input rows followed by the synthetic rows
    pub fn fit_resample(
        &self,
        features: &FeatureMatrix,
        labels: &[Label],
        label_set: &LabelSet,
    ) -> Result<(FeatureMatrix, Vec<Label>)> {
        if features.n_rows() != labels.len() {
            return Err(LccdeError::InvalidDimension {
                expected: features.n_rows(),
                got: labels.len(),
            });
        }
        self.validate(labels, label_set)?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut out_features = features.clone();
        let mut out_labels = labels.to_vec();
        let mut synthetic = vec![0.0f32; features.n_features()];

        for (&label, &target) in &self.sampling_strategy {
            let members: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|(_, &l)| l == label)
                .map(|(i, _)| i)
                .collect();
            let needed = target - members.len();
            if needed == 0 {
                continue;
            }

            let k = self.k_neighbors.min(members.len() - 1);
            let neighbours = nearest_neighbours(features, &members, k);

            for _ in 0..needed {
                let seed_pos = rng.random_range(0..members.len());
                let neighbour_pos = neighbours[seed_pos][rng.random_range(0..k)];
                let x = features.row(members[seed_pos]);
                let nn = features.row(members[neighbour_pos]);
                let gap: f32 = rng.random();
                for (s, (&a, &b)) in synthetic.iter_mut().zip(x.iter().zip(nn)) {
                    *s = a + gap * (b - a);
                }
                out_features.push_row(&synthetic)?;
                out_labels.push(label);
            }
            debug!(label, generated = needed, target, "smote oversampled label");
        }

        info!(
            before = labels.len(),
            after = out_labels.len(),
            "smote resampling complete"
        );
        Ok((out_features, out_labels))
    }
}

/// For each member, the positions (into `members`) of its `k` nearest other members
fn nearest_neighbours(features: &FeatureMatrix, members: &[usize], k: usize) -> Vec<Vec<usize>> {
    members
        .iter()
        .enumerate()
        .map(|(pos, &row)| {
            let x = features.row(row);
            let mut distances: Vec<(f32, usize)> = members
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != pos)
                .map(|(other, &other_row)| (squared_distance(x, features.row(other_row)), other))
                .collect();
            distances.sort_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.1.cmp(&b.1))
            });
            distances.truncate(k);
            distances.into_iter().map(|(_, other)| other).collect()
        })
        .collect()
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_data() -> (FeatureMatrix, Vec<Label>, LabelSet) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            rows.push(vec![i as f32, 0.0]);
            labels.push(0);
        }
        for i in 0..4 {
            rows.push(vec![100.0 + i as f32, 50.0]);
            labels.push(1);
        }
        (FeatureMatrix::from_rows(&rows).unwrap(), labels, LabelSet::new(2).unwrap())
    }

    #[test]
    fn test_reaches_target_counts() {
        let (x, y, set) = make_data();
        let smote = Smote::new(BTreeMap::from([(1, 20)]), 42);
        let (rx, ry) = smote.fit_resample(&x, &y, &set).unwrap();
        assert_eq!(set.counts(&ry), vec![20, 20]);
        assert_eq!(rx.n_rows(), 40);
        // Original rows come first, untouched
        assert_eq!(rx.row(0), x.row(0));
    }

    #[test]
    fn test_synthetic_rows_stay_between_neighbours() {
        let (x, y, set) = make_data();
        let smote = Smote::new(BTreeMap::from([(1, 30)]), 3);
        let (rx, ry) = smote.fit_resample(&x, &y, &set).unwrap();
        for i in 24..rx.n_rows() {
            assert_eq!(ry[i], 1);
            let row = rx.row(i);
            assert!(row[0] >= 100.0 && row[0] <= 103.0);
            assert_eq!(row[1], 50.0);
        }
    }

    #[test]
    fn test_same_seed_same_rows() {
        let (x, y, set) = make_data();
        let smote = Smote::new(BTreeMap::from([(1, 10)]), 9);
        let a = smote.fit_resample(&x, &y, &set).unwrap();
        let b = smote.fit_resample(&x, &y, &set).unwrap();
        assert_eq!(a.0, b.0);
    }

    #[test]
    fn test_target_below_count_is_config_error() {
        let (x, y, set) = make_data();
        let smote = Smote::new(BTreeMap::from([(0, 5)]), 0);
        let err = smote.fit_resample(&x, &y, &set).unwrap_err();
        assert!(matches!(err, LccdeError::Configuration { .. }));
    }

    #[test]
    fn test_unknown_label_is_insufficient_data() {
        let (x, y, set) = make_data();
        let smote = Smote::new(BTreeMap::from([(4, 50)]), 0);
        let err = smote.fit_resample(&x, &y, &set).unwrap_err();
        assert!(matches!(err, LccdeError::DataInsufficient { label: 4, .. }));
    }
}
