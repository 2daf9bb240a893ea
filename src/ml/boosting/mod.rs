//! Multi-class gradient-boosted decision trees
//!
//! Pure Rust softmax boosting. Each round computes class probabilities for
//! every training row, then fits one regression tree per class to the
//! gradient `p - y` and hessian `p (1 - p)` of the cross-entropy loss.
//!
//! The three learner kinds share this driver and differ only in their
//! [`TreeGrower`]:
//! - [`LeafWiseBooster`]: best-first growth under a leaf budget
//! - [`DepthWiseBooster`]: level-wise growth to a fixed depth
//! - [`ObliviousBooster`]: symmetric trees with one split per level
//!
//! # Usage
//! ```ignore
//! use lccde::ml::boosting::DepthWiseBooster;
//!
//! let mut booster = DepthWiseBooster::from_params(&params, 42)?;
//! booster.fit(&features, &labels, &label_set)?;
//! let (label, confidence) = booster.predict_with_confidence(&sample)?;
//! ```

pub mod growers;
pub mod params;
pub mod tree;

pub use growers::{DepthWiseGrower, LeafWiseGrower, ObliviousGrower, TreeGrower};
pub use params::{BoostingParams, HyperParams, ParamReader};
pub use tree::{GrowContext, RegressionTree};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::dataset::{BinMapper, FeatureMatrix, Label, LabelSet};
use crate::error::{LccdeError, Result};
use crate::ml::learner::{BaseLearner, LearnerKind};

pub type LeafWiseBooster = GradientBoostClassifier<LeafWiseGrower>;
pub type DepthWiseBooster = GradientBoostClassifier<DepthWiseGrower>;
pub type ObliviousBooster = GradientBoostClassifier<ObliviousGrower>;

/// Hessian floor, keeps Newton steps finite on confident rows
const MIN_HESSIAN: f64 = 1e-6;

/// Gradient-boosted multi-class classifier
#[derive(Debug, Clone)]
pub struct GradientBoostClassifier<G: TreeGrower> {
    params: BoostingParams,
    grower: G,
    mapper: Option<BinMapper>,
    /// Initial raw score per class (log prior)
    base_scores: Vec<f64>,
    /// `trees[round][class]`
    trees: Vec<Vec<RegressionTree>>,
    n_features: usize,
    /// Accumulated split gain per feature
    feature_gain: Vec<f64>,
    trained: bool,
}

impl<G: TreeGrower> GradientBoostClassifier<G> {
    /// Build an untrained learner from an opaque hyperparameter map.
    ///
    /// `seed` is used unless the map carries its own seed key.
    pub fn from_params(params: &HyperParams, seed: u64) -> Result<Self> {
        let name = G::KIND.name();
        let mut reader = ParamReader::new(name, params);
        let (params, grower) = G::configure(&mut reader, seed)?;
        reader.finish();
        Ok(Self::new(params, grower))
    }

    pub fn new(params: BoostingParams, grower: G) -> Self {
        Self {
            params,
            grower,
            mapper: None,
            base_scores: Vec::new(),
            trees: Vec::new(),
            n_features: 0,
            feature_gain: Vec::new(),
            trained: false,
        }
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    pub fn grower(&self) -> &G {
        &self.grower
    }

    /// Bin boundaries learned from the training rows
    pub fn bin_mapper(&self) -> Option<&BinMapper> {
        self.mapper.as_ref()
    }

    /// Number of completed boosting rounds
    pub fn n_rounds(&self) -> usize {
        self.trees.len()
    }

    fn n_classes(&self) -> usize {
        self.base_scores.len()
    }

    /// Raw per-class scores before softmax
    fn raw_scores(&self, sample: &[f32]) -> Vec<f64> {
        let mut scores = self.base_scores.clone();
        for round in &self.trees {
            for (score, tree) in scores.iter_mut().zip(round) {
                *score += tree.predict(sample);
            }
        }
        scores
    }

    fn check_sample(&self, sample: &[f32]) -> Result<()> {
        if !self.trained {
            return Err(LccdeError::NotTrained(G::KIND.name().to_string()));
        }
        if sample.len() != self.n_features {
            return Err(LccdeError::InvalidDimension {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        if let Some(i) = sample.iter().position(|v| !v.is_finite()) {
            return Err(LccdeError::InvalidDataset(format!(
                "feature {} is not finite",
                i
            )));
        }
        Ok(())
    }

    /// Rows drawn for one round; never empty
    fn sample_rows(&self, n_rows: usize, rng: &mut StdRng) -> Vec<usize> {
        if self.params.subsample >= 1.0 {
            return (0..n_rows).collect();
        }
        let rows: Vec<usize> = (0..n_rows)
            .filter(|_| rng.random::<f64>() < self.params.subsample)
            .collect();
        if rows.is_empty() {
            vec![rng.random_range(0..n_rows)]
        } else {
            rows
        }
    }

    /// Features drawn for one round, sorted; never empty
    fn sample_features(&self, n_features: usize, rng: &mut StdRng) -> Vec<usize> {
        let mut features: Vec<usize> = (0..n_features).collect();
        if self.params.colsample < 1.0 {
            let keep = ((n_features as f64) * self.params.colsample).ceil() as usize;
            features.shuffle(rng);
            features.truncate(keep.max(1));
            features.sort_unstable();
        }
        features
    }
}

/// Numerically stable softmax in place
fn softmax(scores: &mut [f64]) {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for s in scores.iter_mut() {
        *s = (*s - max).exp();
        sum += *s;
    }
    for s in scores.iter_mut() {
        *s /= sum;
    }
}

impl<G: TreeGrower> BaseLearner for GradientBoostClassifier<G> {
    fn fit(&mut self, features: &FeatureMatrix, labels: &[Label], label_set: &LabelSet) -> Result<()> {
        if features.n_rows() != labels.len() {
            return Err(LccdeError::InvalidDimension {
                expected: features.n_rows(),
                got: labels.len(),
            });
        }
        if features.is_empty() {
            return Err(LccdeError::InvalidDataset("no training rows".to_string()));
        }
        label_set.validate(labels)?;

        let n = features.n_rows();
        let k = label_set.len();
        let mapper = BinMapper::fit(features, self.params.max_bins);
        let binned = mapper.transform(features);

        // Smoothed log priors so an absent class still has a finite score
        let counts = label_set.counts(labels);
        self.base_scores = counts
            .iter()
            .map(|&c| ((c as f64 + 1.0) / (n as f64 + k as f64)).ln())
            .collect();
        self.n_features = features.n_features();
        self.feature_gain = vec![0.0; self.n_features];
        self.trees.clear();

        let mut raw: Vec<f64> = (0..n).flat_map(|_| self.base_scores.iter().copied()).collect();
        let mut probs = vec![0.0f64; n * k];
        let mut grad = vec![0.0f64; n];
        let mut hess = vec![0.0f64; n];
        let mut rng = StdRng::seed_from_u64(self.params.seed);

        for round in 0..self.params.n_estimators {
            probs.copy_from_slice(&raw);
            for row in probs.chunks_exact_mut(k) {
                softmax(row);
            }

            let rows = self.sample_rows(n, &mut rng);
            let feature_subset = self.sample_features(self.n_features, &mut rng);
            let mut round_trees = Vec::with_capacity(k);

            for class in 0..k {
                for i in 0..n {
                    let p = probs[i * k + class];
                    let y = if labels[i] == class { 1.0 } else { 0.0 };
                    grad[i] = p - y;
                    hess[i] = (p * (1.0 - p)).max(MIN_HESSIAN);
                }
                let ctx = GrowContext {
                    binned: &binned,
                    mapper: &mapper,
                    grad: &grad,
                    hess: &hess,
                    features: &feature_subset,
                    params: &self.params,
                };
                let mut tree = self.grower.grow(&ctx, &rows);
                tree.scale(self.params.learning_rate);
                for i in 0..n {
                    raw[i * k + class] += tree.predict_binned(&binned, i);
                }
                tree.accumulate_gain(&mut self.feature_gain);
                round_trees.push(tree);
            }

            if raw.iter().any(|v| !v.is_finite()) {
                self.trained = false;
                return Err(LccdeError::config(
                    G::KIND.name(),
                    "learning_rate",
                    format!("raw scores diverged in round {}", round),
                ));
            }
            trace!(learner = G::KIND.name(), round, "boosting round complete");
            self.trees.push(round_trees);
        }

        self.mapper = Some(mapper);
        self.trained = true;
        debug!(
            learner = G::KIND.name(),
            rounds = self.trees.len(),
            classes = k,
            rows = n,
            "booster trained"
        );
        Ok(())
    }

    fn predict_proba(&self, sample: &[f32]) -> Result<Vec<f64>> {
        self.check_sample(sample)?;
        let mut scores = self.raw_scores(sample);
        softmax(&mut scores);
        debug_assert_eq!(scores.len(), self.n_classes());
        Ok(scores)
    }

    fn name(&self) -> &str {
        G::KIND.name()
    }

    fn kind(&self) -> LearnerKind {
        G::KIND
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn feature_importance(&self) -> Vec<f64> {
        let total: f64 = self.feature_gain.iter().sum();
        if total <= 0.0 {
            return vec![0.0; self.feature_gain.len()];
        }
        self.feature_gain.iter().map(|g| g / total).collect()
    }
}
