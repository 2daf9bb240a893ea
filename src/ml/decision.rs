//! Per-sample decision fusion
//!
//! Fuses the three learners' votes for one sample into a single label. The
//! procedure first classifies the votes into an [`Agreement`] and then
//! resolves it against the [`LeaderTable`]:
//!
//! 1. all three agree: take the common label
//! 2. two agree: keep the majority unless the dissenter leads the majority
//!    label and is more confident than both agreeing learners
//! 3. all disagree: take the most confident learner among those leading
//!    their own predicted label, or the most confident learner overall when
//!    none does
//!
//! Every sample is independent, so batches can be fused in parallel. The
//! fused label is always one of the three votes.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::leader::LeaderTable;
use super::learner::{argmax, check_probabilities, BaseLearner, LearnerSlot};
use super::pool::BaseLearnerPool;
use crate::dataset::{FeatureMatrix, Label, LabelSet};
use crate::error::{LccdeError, Result};

/// One learner's prediction for a sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearnerVote {
    pub label: Label,
    /// Probability the learner assigned to `label`
    pub confidence: f64,
}

/// Votes of learners A, B, C for one sample
pub type SampleVotes = [LearnerVote; 3];

/// Shape of the three votes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agreement {
    Unanimous(Label),
    MajorityOfTwo {
        majority: Label,
        dissent: Label,
        dissenter: LearnerSlot,
    },
    AllDisagree,
}

impl Agreement {
    pub fn classify(votes: &SampleVotes) -> Self {
        let [a, b, c] = votes.map(|v| v.label);
        if a == b && b == c {
            Agreement::Unanimous(a)
        } else if a == b {
            Agreement::MajorityOfTwo {
                majority: a,
                dissent: c,
                dissenter: LearnerSlot::C,
            }
        } else if a == c {
            Agreement::MajorityOfTwo {
                majority: a,
                dissent: b,
                dissenter: LearnerSlot::B,
            }
        } else if b == c {
            Agreement::MajorityOfTwo {
                majority: b,
                dissent: a,
                dissenter: LearnerSlot::A,
            }
        } else {
            Agreement::AllDisagree
        }
    }
}

/// Which rule produced a fused label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPath {
    /// All three learners agreed
    Unanimous,
    /// Two agreed and one of them leads the majority label
    MajorityLeader,
    /// Two agreed, the dissenting leader was not confident enough
    MajorityDefault,
    /// Two agreed, the dissenting leader overrode them
    LeaderOverride,
    /// All disagreed, resolved among learners leading their own label
    LeaderConfidence,
    /// All disagreed and no learner led its own label
    ConfidenceFallback,
}

impl DecisionPath {
    pub const ALL: [DecisionPath; 6] = [
        DecisionPath::Unanimous,
        DecisionPath::MajorityLeader,
        DecisionPath::MajorityDefault,
        DecisionPath::LeaderOverride,
        DecisionPath::LeaderConfidence,
        DecisionPath::ConfidenceFallback,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DecisionPath::Unanimous => "unanimous",
            DecisionPath::MajorityLeader => "majority_leader",
            DecisionPath::MajorityDefault => "majority_default",
            DecisionPath::LeaderOverride => "leader_override",
            DecisionPath::LeaderConfidence => "leader_confidence",
            DecisionPath::ConfidenceFallback => "confidence_fallback",
        }
    }
}

impl fmt::Display for DecisionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Final label for one sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusedPrediction {
    pub label: Label,
    /// Learner whose vote was taken
    pub winner: LearnerSlot,
    pub path: DecisionPath,
}

/// How a dissenting leader's confidence is compared with the majority's
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceComparison {
    /// Override only when strictly more confident than both
    #[default]
    Strict,
    /// Override when at least as confident as both
    Inclusive,
}

impl ConfidenceComparison {
    fn exceeds(self, confidence: f64, other: f64) -> bool {
        match self {
            ConfidenceComparison::Strict => confidence > other,
            ConfidenceComparison::Inclusive => confidence >= other,
        }
    }
}

/// Decision engine settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub override_comparison: ConfidenceComparison,
}

/// Number of samples resolved by each path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionStats {
    pub total: usize,
    pub unanimous: usize,
    pub majority_leader: usize,
    pub majority_default: usize,
    pub leader_override: usize,
    pub leader_confidence: usize,
    pub confidence_fallback: usize,
}

impl DecisionStats {
    pub fn from_predictions(predictions: &[FusedPrediction]) -> Self {
        let mut stats = Self::default();
        for p in predictions {
            stats.record(p.path);
        }
        stats
    }

    pub fn record(&mut self, path: DecisionPath) {
        self.total += 1;
        *self.count_mut(path) += 1;
    }

    pub fn count(&self, path: DecisionPath) -> usize {
        match path {
            DecisionPath::Unanimous => self.unanimous,
            DecisionPath::MajorityLeader => self.majority_leader,
            DecisionPath::MajorityDefault => self.majority_default,
            DecisionPath::LeaderOverride => self.leader_override,
            DecisionPath::LeaderConfidence => self.leader_confidence,
            DecisionPath::ConfidenceFallback => self.confidence_fallback,
        }
    }

    fn count_mut(&mut self, path: DecisionPath) -> &mut usize {
        match path {
            DecisionPath::Unanimous => &mut self.unanimous,
            DecisionPath::MajorityLeader => &mut self.majority_leader,
            DecisionPath::MajorityDefault => &mut self.majority_default,
            DecisionPath::LeaderOverride => &mut self.leader_override,
            DecisionPath::LeaderConfidence => &mut self.leader_confidence,
            DecisionPath::ConfidenceFallback => &mut self.confidence_fallback,
        }
    }

    /// Share of samples where the learners did not all agree
    pub fn disagreement_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.total - self.unanimous) as f64 / self.total as f64
        }
    }
}

/// Votes and fused predictions for a batch of samples
#[derive(Debug, Clone)]
pub struct DecisionBatch {
    pub votes: Vec<SampleVotes>,
    pub predictions: Vec<FusedPrediction>,
    pub stats: DecisionStats,
}

impl DecisionBatch {
    pub fn labels(&self) -> Vec<Label> {
        self.predictions.iter().map(|p| p.label).collect()
    }

    /// Raw labels predicted by one learner
    pub fn learner_labels(&self, slot: LearnerSlot) -> Vec<Label> {
        self.votes.iter().map(|v| v[slot.index()].label).collect()
    }
}

/// One learner's vote; the probability vector must cover `n_classes`
/// labels and be finite
pub fn learner_vote(learner: &dyn BaseLearner, sample: &[f32], n_classes: Option<usize>) -> Result<LearnerVote> {
    let proba = learner.predict_proba(sample)?;
    if let Some(expected) = n_classes {
        if proba.len() != expected {
            return Err(LccdeError::InvalidDimension {
                expected,
                got: proba.len(),
            });
        }
    }
    check_probabilities(learner.name(), &proba)?;
    let (label, confidence) = argmax(&proba);
    Ok(LearnerVote { label, confidence })
}

/// Query every learner for one sample, naming the learner on failure
pub fn vote_sample(pool: &BaseLearnerPool, sample: &[f32], index: usize) -> Result<SampleVotes> {
    let n_classes = pool.label_set().map(LabelSet::len);
    let mut votes = [LearnerVote {
        label: 0,
        confidence: 0.0,
    }; 3];
    for (slot, learner) in pool.iter() {
        votes[slot.index()] =
            learner_vote(learner, sample, n_classes).map_err(|e| LccdeError::Prediction {
                learner: pool.name(slot),
                sample: index,
                reason: e.to_string(),
            })?;
    }
    Ok(votes)
}

/// Votes of all learners for every row, failing on the first bad sample
pub fn collect_votes(pool: &BaseLearnerPool, features: &FeatureMatrix, parallel: bool) -> Result<Vec<SampleVotes>> {
    let n = features.n_rows();

    #[cfg(feature = "parallel")]
    if parallel {
        return (0..n)
            .into_par_iter()
            .map(|i| vote_sample(pool, features.row(i), i))
            .collect();
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;

    (0..n).map(|i| vote_sample(pool, features.row(i), i)).collect()
}

/// Fuses learner votes using a fixed leader table
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    leaders: LeaderTable,
    config: DecisionConfig,
    parallel: bool,
}

impl DecisionEngine {
    pub fn new(leaders: LeaderTable, config: DecisionConfig) -> Self {
        Self {
            leaders,
            config,
            parallel: false,
        }
    }

    /// Fuse batches across threads (needs the `parallel` feature)
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn leaders(&self) -> &LeaderTable {
        &self.leaders
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Fuse one sample's votes
    pub fn decide(&self, votes: &SampleVotes) -> FusedPrediction {
        match Agreement::classify(votes) {
            Agreement::Unanimous(label) => FusedPrediction {
                label,
                winner: self.leaders.get(label).unwrap_or(LearnerSlot::A),
                path: DecisionPath::Unanimous,
            },
            Agreement::MajorityOfTwo {
                majority,
                dissent,
                dissenter,
            } => self.resolve_majority(votes, majority, dissent, dissenter),
            Agreement::AllDisagree => self.resolve_disagreement(votes),
        }
    }

    fn resolve_majority(
        &self,
        votes: &SampleVotes,
        majority: Label,
        dissent: Label,
        dissenter: LearnerSlot,
    ) -> FusedPrediction {
        let agreeing: Vec<LearnerSlot> = LearnerSlot::PREFERENCE
            .into_iter()
            .filter(|&s| s != dissenter)
            .collect();

        match self.leaders.get(majority) {
            Some(leader) if leader != dissenter => FusedPrediction {
                label: majority,
                winner: leader,
                path: DecisionPath::MajorityLeader,
            },
            _ => {
                let c_dissent = votes[dissenter.index()].confidence;
                let comparison = self.config.override_comparison;
                let overrides = agreeing
                    .iter()
                    .all(|s| comparison.exceeds(c_dissent, votes[s.index()].confidence));
                if overrides {
                    FusedPrediction {
                        label: dissent,
                        winner: dissenter,
                        path: DecisionPath::LeaderOverride,
                    }
                } else {
                    FusedPrediction {
                        label: majority,
                        winner: most_confident(votes, agreeing.iter().copied()),
                        path: DecisionPath::MajorityDefault,
                    }
                }
            }
        }
    }

    fn resolve_disagreement(&self, votes: &SampleVotes) -> FusedPrediction {
        let self_leaders: Vec<LearnerSlot> = LearnerSlot::PREFERENCE
            .into_iter()
            .filter(|&s| self.leaders.is_leader(s, votes[s.index()].label))
            .collect();

        let (winner, path) = if self_leaders.is_empty() {
            (
                most_confident(votes, LearnerSlot::PREFERENCE),
                DecisionPath::ConfidenceFallback,
            )
        } else {
            (
                most_confident(votes, self_leaders),
                DecisionPath::LeaderConfidence,
            )
        };
        FusedPrediction {
            label: votes[winner.index()].label,
            winner,
            path,
        }
    }

    /// Fuse pre-collected votes
    pub fn fuse(&self, votes: &[SampleVotes]) -> Vec<FusedPrediction> {
        #[cfg(feature = "parallel")]
        if self.parallel {
            return votes.par_iter().map(|v| self.decide(v)).collect();
        }

        votes
            .iter()
            .map(|v| {
                let fused = self.decide(v);
                trace!(label = fused.label, path = %fused.path, "fused");
                fused
            })
            .collect()
    }

    /// Query the pool for every row and fuse the results
    pub fn decide_batch(&self, pool: &BaseLearnerPool, features: &FeatureMatrix) -> Result<DecisionBatch> {
        let votes = collect_votes(pool, features, self.parallel)?;
        Ok(self.decide_votes(votes))
    }

    /// Fuse votes collected earlier, keeping them alongside the predictions
    pub fn decide_votes(&self, votes: Vec<SampleVotes>) -> DecisionBatch {
        let predictions = self.fuse(&votes);
        let stats = DecisionStats::from_predictions(&predictions);
        debug!(
            samples = stats.total,
            unanimous = stats.unanimous,
            overrides = stats.leader_override,
            fallbacks = stats.confidence_fallback,
            "decision batch fused"
        );
        DecisionBatch {
            votes,
            predictions,
            stats,
        }
    }
}

/// Highest confidence among `slots`; earlier slots keep exact ties
fn most_confident(votes: &SampleVotes, slots: impl IntoIterator<Item = LearnerSlot>) -> LearnerSlot {
    let mut best: Option<LearnerSlot> = None;
    for slot in slots {
        best = match best {
            Some(b) if votes[slot.index()].confidence <= votes[b.index()].confidence => Some(b),
            _ => Some(slot),
        };
    }
    best.unwrap_or(LearnerSlot::A)
}
