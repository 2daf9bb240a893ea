//! Base learner contract
//!
//! The ensemble combines three independently trained multi-class classifiers.
//! Each occupies a fixed [`LearnerSlot`]; the slot order is also the
//! tie-break preference when picking class leaders.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::boosting::{DepthWiseBooster, HyperParams, LeafWiseBooster, ObliviousBooster};
use crate::dataset::{FeatureMatrix, Label, LabelSet};
use crate::error::{LccdeError, Result};

/// Trait for trained multi-class classifiers
pub trait BaseLearner: Send + Sync + fmt::Debug {
    /// Train on the given rows
    fn fit(&mut self, features: &FeatureMatrix, labels: &[Label], label_set: &LabelSet) -> Result<()>;

    /// Probability per label, one entry per label in the label set, summing to 1
    fn predict_proba(&self, sample: &[f32]) -> Result<Vec<f64>>;

    /// Most probable label; the lowest label wins exact ties
    fn predict(&self, sample: &[f32]) -> Result<Label> {
        self.predict_with_confidence(sample).map(|(label, _)| label)
    }

    /// Most probable label with the probability assigned to it.
    ///
    /// Empty or non-finite probability vectors are errors, never a vote.
    fn predict_with_confidence(&self, sample: &[f32]) -> Result<(Label, f64)> {
        let proba = self.predict_proba(sample)?;
        check_probabilities(self.name(), &proba)?;
        Ok(argmax(&proba))
    }

    /// Get model name
    fn name(&self) -> &str;

    fn kind(&self) -> LearnerKind;

    /// Check if model is trained
    fn is_trained(&self) -> bool;

    /// Normalised per-feature importance, empty if the kind has none
    fn feature_importance(&self) -> Vec<f64> {
        Vec::new()
    }
}

/// Reject probability vectors no label can be read from
pub fn check_probabilities(learner: &str, proba: &[f64]) -> Result<()> {
    let invalid = |reason: String| LccdeError::InvalidProbabilities {
        learner: learner.to_string(),
        reason,
    };
    if proba.is_empty() {
        return Err(invalid("empty probability vector".to_string()));
    }
    if let Some(i) = proba.iter().position(|p| !p.is_finite()) {
        return Err(invalid(format!("entry {} is {}", i, proba[i])));
    }
    Ok(())
}

/// Index and value of the largest entry, first index on ties
pub fn argmax(values: &[f64]) -> (usize, f64) {
    let mut best = (0, f64::NEG_INFINITY);
    for (i, &v) in values.iter().enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best
}

/// Learner kinds available to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnerKind {
    /// Gradient boosting with best-first (leaf-wise) tree growth
    LeafWise,
    /// Gradient boosting with level-wise tree growth
    DepthWise,
    /// Gradient boosting with oblivious (symmetric) trees
    Oblivious,
}

impl LearnerKind {
    pub fn name(&self) -> &'static str {
        match self {
            LearnerKind::LeafWise => "leaf_wise",
            LearnerKind::DepthWise => "depth_wise",
            LearnerKind::Oblivious => "oblivious",
        }
    }

    /// Construct an untrained learner, validating its hyperparameters
    pub fn build(&self, params: &HyperParams, seed: u64) -> Result<Box<dyn BaseLearner>> {
        Ok(match self {
            LearnerKind::LeafWise => Box::new(LeafWiseBooster::from_params(params, seed)?),
            LearnerKind::DepthWise => Box::new(DepthWiseBooster::from_params(params, seed)?),
            LearnerKind::Oblivious => Box::new(ObliviousBooster::from_params(params, seed)?),
        })
    }
}

impl fmt::Display for LearnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Position of a learner in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LearnerSlot {
    A,
    B,
    C,
}

impl LearnerSlot {
    /// Fixed preference order used to break exact ties
    pub const PREFERENCE: [LearnerSlot; 3] = [LearnerSlot::A, LearnerSlot::B, LearnerSlot::C];

    pub fn index(self) -> usize {
        match self {
            LearnerSlot::A => 0,
            LearnerSlot::B => 1,
            LearnerSlot::C => 2,
        }
    }
}

impl fmt::Display for LearnerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LearnerSlot::A => "A",
            LearnerSlot::B => "B",
            LearnerSlot::C => "C",
        };
        f.write_str(s)
    }
}

/// Kind and hyperparameters for one slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerSpec {
    pub kind: LearnerKind,
    /// Passed to the learner kind unmodified
    #[serde(default)]
    pub params: HyperParams,
}

impl LearnerSpec {
    pub fn new(kind: LearnerKind) -> Self {
        Self {
            kind,
            params: HyperParams::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Label used in logs and reports, e.g. `A:leaf_wise`
    pub fn display_name(&self, slot: LearnerSlot) -> String {
        format!("{}:{}", slot, self.kind)
    }
}
