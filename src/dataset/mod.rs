//! Dataset primitives
//!
//! Holds the already-encoded feature matrix and label vector an experiment
//! runs on, and the train/test partition shared by every base learner.
//!
//! # Invariants
//! - every row of a [`FeatureMatrix`] has the same length and feature order
//! - a [`LabelSet`] is the contiguous range `0..K`, fixed before training

pub mod binning;
pub mod loader;
pub mod selection;
pub mod smote;

pub use binning::{BinMapper, BinnedMatrix, DEFAULT_MAX_BINS};
pub use loader::DatasetLoader;
pub use selection::{FeatureSelection, InformationGainSelector};
pub use smote::Smote;

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LccdeError, Result};

/// Class label, an index into the [`LabelSet`]
pub type Label = usize;

/// Dense row-major feature matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    n_features: usize,
    data: Vec<f32>,
}

impl FeatureMatrix {
    /// Create an empty matrix with a fixed row width
    pub fn new(n_features: usize) -> Self {
        Self {
            n_features,
            data: Vec::new(),
        }
    }

    /// Build from a flat row-major buffer
    pub fn from_flat(n_features: usize, data: Vec<f32>) -> Result<Self> {
        if n_features == 0 {
            return Err(LccdeError::InvalidDataset(
                "feature matrix needs at least one feature".to_string(),
            ));
        }
        if data.len() % n_features != 0 {
            return Err(LccdeError::InvalidDimension {
                expected: n_features,
                got: data.len() % n_features,
            });
        }
        Ok(Self { n_features, data })
    }

    /// Build from individual rows, rejecting ragged input
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let n_features = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut matrix = Self::new(n_features);
        matrix.data.reserve(rows.len() * n_features);
        for row in rows {
            matrix.push_row(row)?;
        }
        if n_features == 0 && !rows.is_empty() {
            return Err(LccdeError::InvalidDataset(
                "feature matrix needs at least one feature".to_string(),
            ));
        }
        Ok(matrix)
    }

    /// Append one row
    pub fn push_row(&mut self, row: &[f32]) -> Result<()> {
        if row.len() != self.n_features {
            return Err(LccdeError::InvalidDimension {
                expected: self.n_features,
                got: row.len(),
            });
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        if self.n_features == 0 {
            0
        } else {
            self.data.len() / self.n_features
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow row `i`
    pub fn row(&self, i: usize) -> &[f32] {
        let start = i * self.n_features;
        &self.data[start..start + self.n_features]
    }

    /// Iterate over rows in order
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.data.chunks_exact(self.n_features.max(1))
    }

    /// Copy of column `j`
    pub fn column(&self, j: usize) -> Vec<f32> {
        self.rows().map(|r| r[j]).collect()
    }

    /// New matrix holding the given rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.n_features);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Self {
            n_features: self.n_features,
            data,
        }
    }

    /// New matrix holding only the given columns, in the given order
    pub fn select_columns(&self, columns: &[usize]) -> Self {
        let mut data = Vec::with_capacity(self.n_rows() * columns.len());
        for row in self.rows() {
            data.extend(columns.iter().map(|&c| row[c]));
        }
        Self {
            n_features: columns.len(),
            data,
        }
    }
}

/// The fixed, contiguous set of class labels `0..K`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    n_classes: usize,
    /// Display names (e.g. "BENIGN", "DoS"), when the labels were encoded from text
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    names: Vec<String>,
}

impl LabelSet {
    /// Label set `0..n_classes`
    pub fn new(n_classes: usize) -> Result<Self> {
        if n_classes == 0 {
            return Err(LccdeError::InvalidDataset("label set is empty".to_string()));
        }
        Ok(Self {
            n_classes,
            names: Vec::new(),
        })
    }

    /// Derive `0..=max(labels)` from a label vector
    pub fn from_labels(labels: &[Label]) -> Result<Self> {
        let max = labels
            .iter()
            .copied()
            .max()
            .ok_or_else(|| LccdeError::InvalidDataset("no labels".to_string()))?;
        let n_classes = max
            .checked_add(1)
            .ok_or_else(|| LccdeError::InvalidDataset(format!("label {max} is out of range")))?;
        Self::new(n_classes)
    }

    /// Attach display names, one per label
    pub fn with_names(mut self, names: Vec<String>) -> Result<Self> {
        if names.len() != self.n_classes {
            return Err(LccdeError::InvalidDimension {
                expected: self.n_classes,
                got: names.len(),
            });
        }
        self.names = names;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.n_classes
    }

    pub fn is_empty(&self) -> bool {
        self.n_classes == 0
    }

    pub fn contains(&self, label: Label) -> bool {
        label < self.n_classes
    }

    pub fn iter(&self) -> std::ops::Range<Label> {
        0..self.n_classes
    }

    /// Display name of a label
    pub fn name(&self, label: Label) -> String {
        self.names
            .get(label)
            .cloned()
            .unwrap_or_else(|| label.to_string())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Per-label row counts
    pub fn counts(&self, labels: &[Label]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &l in labels {
            if l < self.n_classes {
                counts[l] += 1;
            }
        }
        counts
    }

    /// Reject labels outside the set
    pub fn validate(&self, labels: &[Label]) -> Result<()> {
        match labels.iter().find(|&&l| !self.contains(l)) {
            Some(&l) => Err(LccdeError::InvalidDataset(format!(
                "label {} outside label set 0..{}",
                l, self.n_classes
            ))),
            None => Ok(()),
        }
    }
}

/// A labeled, encoded dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub features: FeatureMatrix,
    pub labels: Vec<Label>,
    pub label_set: LabelSet,
    /// Column names, one per feature
    pub feature_names: Vec<String>,
}

impl Dataset {
    /// Create a dataset, deriving the label set from the labels
    pub fn new(features: FeatureMatrix, labels: Vec<Label>) -> Result<Self> {
        let label_set = LabelSet::from_labels(&labels)?;
        Self::with_label_set(features, labels, label_set)
    }

    /// Create a dataset over an explicit label set
    pub fn with_label_set(
        features: FeatureMatrix,
        labels: Vec<Label>,
        label_set: LabelSet,
    ) -> Result<Self> {
        if features.n_rows() != labels.len() {
            return Err(LccdeError::InvalidDimension {
                expected: features.n_rows(),
                got: labels.len(),
            });
        }
        label_set.validate(&labels)?;
        let feature_names = (0..features.n_features())
            .map(|i| format!("f{}", i))
            .collect();
        Ok(Self {
            features,
            labels,
            label_set,
            feature_names,
        })
    }

    /// Replace the generated column names
    pub fn with_feature_names(mut self, names: Vec<String>) -> Result<Self> {
        if names.len() != self.features.n_features() {
            return Err(LccdeError::InvalidDimension {
                expected: self.features.n_features(),
                got: names.len(),
            });
        }
        self.feature_names = names;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Per-label row counts, keyed by label
    pub fn class_distribution(&self) -> BTreeMap<Label, usize> {
        self.label_set
            .counts(&self.labels)
            .into_iter()
            .enumerate()
            .collect()
    }
}

/// Train/test partition produced once per run and shared by all learners
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub train_features: FeatureMatrix,
    pub train_labels: Vec<Label>,
    pub test_features: FeatureMatrix,
    pub test_labels: Vec<Label>,
    /// Dataset row indices that went to the train side
    pub train_indices: Vec<usize>,
    /// Dataset row indices that went to the test side
    pub test_indices: Vec<usize>,
}

impl TrainTestSplit {
    /// Partition `dataset` with `train_size` of the rows on the train side.
    ///
    /// The row order is shuffled with a generator seeded from `seed`, so the
    /// same seed always yields the same partition. With `stratify`, each label
    /// is split separately so both sides keep the class proportions.
    pub fn new(dataset: &Dataset, train_size: f64, seed: u64, stratify: bool) -> Result<Self> {
        if !(train_size > 0.0 && train_size < 1.0) {
            return Err(LccdeError::config(
                "split",
                "train_size",
                format!("must be in (0, 1), got {}", train_size),
            ));
        }
        let n = dataset.len();
        if n < 2 {
            return Err(LccdeError::InvalidDataset(format!(
                "need at least 2 rows to split, got {}",
                n
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let (mut train_indices, mut test_indices) = if stratify {
            stratified_indices(dataset, train_size, &mut rng)
        } else {
            let mut indices: Vec<usize> = (0..n).collect();
            indices.shuffle(&mut rng);
            let n_train = ((n as f64) * train_size).floor() as usize;
            let n_train = n_train.clamp(1, n - 1);
            let test = indices.split_off(n_train);
            (indices, test)
        };

        if stratify {
            // Keep the per-class blocks from lining up in the output
            train_indices.shuffle(&mut rng);
            test_indices.shuffle(&mut rng);
        }

        debug!(
            train = train_indices.len(),
            test = test_indices.len(),
            stratify,
            "dataset split"
        );

        Ok(Self {
            train_features: dataset.features.select_rows(&train_indices),
            train_labels: train_indices.iter().map(|&i| dataset.labels[i]).collect(),
            test_features: dataset.features.select_rows(&test_indices),
            test_labels: test_indices.iter().map(|&i| dataset.labels[i]).collect(),
            train_indices,
            test_indices,
        })
    }

    /// Project both sides onto a subset of columns
    pub fn select_columns(&mut self, columns: &[usize]) {
        self.train_features = self.train_features.select_columns(columns);
        self.test_features = self.test_features.select_columns(columns);
    }
}

fn stratified_indices(dataset: &Dataset, train_size: f64, rng: &mut StdRng) -> (Vec<usize>, Vec<usize>) {
    let mut by_label: Vec<Vec<usize>> = vec![Vec::new(); dataset.label_set.len()];
    for (i, &l) in dataset.labels.iter().enumerate() {
        by_label[l].push(i);
    }

    let mut train = Vec::with_capacity(dataset.len());
    let mut test = Vec::with_capacity(dataset.len());
    for mut rows in by_label {
        if rows.is_empty() {
            continue;
        }
        rows.shuffle(rng);
        let count = rows.len();
        let mut n_train = ((count as f64) * train_size).round() as usize;
        if count >= 2 {
            n_train = n_train.clamp(1, count - 1);
        } else {
            n_train = count;
        }
        test.extend_from_slice(&rows[n_train..]);
        rows.truncate(n_train);
        train.extend(rows);
    }
    (train, test)
}
