//! Base learner pool
//!
//! Owns the three learners of one run. Construction parses and validates every
//! learner's hyperparameters, so configuration errors surface before any
//! training work. All three learners are fitted on the same training rows.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::learner::{BaseLearner, LearnerSlot, LearnerSpec};
use crate::dataset::{FeatureMatrix, Label, LabelSet};
use crate::error::{LccdeError, Result};

/// The three learners of one run, indexed by [`LearnerSlot`]
#[derive(Debug)]
pub struct BaseLearnerPool {
    specs: [LearnerSpec; 3],
    learners: Vec<Box<dyn BaseLearner>>,
    fit_times: [Duration; 3],
    label_set: Option<LabelSet>,
    parallel: bool,
}

/// Per-learner training summary
#[derive(Debug, Clone, Serialize)]
pub struct LearnerTraining {
    pub slot: LearnerSlot,
    pub name: String,
    pub fit_time_ms: f64,
}

impl BaseLearnerPool {
    /// Build three untrained learners from their specs
    pub fn new(specs: [LearnerSpec; 3], seed: u64) -> Result<Self> {
        let learners = specs
            .iter()
            .map(|spec| spec.kind.build(&spec.params, seed))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            specs,
            learners,
            fit_times: [Duration::ZERO; 3],
            label_set: None,
            parallel: false,
        })
    }

    /// Fit the learners concurrently (needs the `parallel` feature)
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Reject splits the learners cannot be compared on
    pub fn check_training_data(labels: &[Label], label_set: &LabelSet) -> Result<()> {
        let counts = label_set.counts(labels);
        let present: Vec<Label> = label_set.iter().filter(|&l| counts[l] > 0).collect();
        match present.as_slice() {
            [] => {
                let first = label_set.iter().next().unwrap_or_default();
                return Err(LccdeError::insufficient(first, "no training rows"));
            }
            [only] => {
                return Err(LccdeError::insufficient(
                    *only,
                    "training data holds a single class; at least 2 are required",
                ));
            }
            _ => {}
        }
        if let Some(missing) = label_set.iter().find(|&l| counts[l] == 0) {
            return Err(LccdeError::insufficient(missing, "no training rows after the split"));
        }
        Ok(())
    }

    /// Train all three learners on the same rows
    pub fn fit(
        &mut self,
        features: &FeatureMatrix,
        labels: &[Label],
        label_set: &LabelSet,
    ) -> Result<Vec<LearnerTraining>> {
        Self::check_training_data(labels, label_set)?;
        info!(
            rows = features.n_rows(),
            features = features.n_features(),
            classes = label_set.len(),
            parallel = self.parallel,
            "training base learners"
        );

        let fit_one = |learner: &mut Box<dyn BaseLearner>| -> Result<Duration> {
            let start = Instant::now();
            learner.fit(features, labels, label_set)?;
            Ok(start.elapsed())
        };

        #[cfg(feature = "parallel")]
        let times: Vec<Duration> = if self.parallel {
            self.learners
                .par_iter_mut()
                .map(fit_one)
                .collect::<Result<Vec<_>>>()?
        } else {
            self.learners.iter_mut().map(fit_one).collect::<Result<Vec<_>>>()?
        };
        #[cfg(not(feature = "parallel"))]
        let times: Vec<Duration> = self.learners.iter_mut().map(fit_one).collect::<Result<Vec<_>>>()?;

        let mut summary = Vec::with_capacity(3);
        for slot in LearnerSlot::PREFERENCE {
            let elapsed = times[slot.index()];
            self.fit_times[slot.index()] = elapsed;
            debug!(learner = %self.name(slot), ms = elapsed.as_millis() as u64, "learner fitted");
            summary.push(LearnerTraining {
                slot,
                name: self.name(slot),
                fit_time_ms: elapsed.as_secs_f64() * 1000.0,
            });
        }
        self.label_set = Some(label_set.clone());
        Ok(summary)
    }

    pub fn learner(&self, slot: LearnerSlot) -> &dyn BaseLearner {
        self.learners[slot.index()].as_ref()
    }

    /// Learners in preference order
    pub fn iter(&self) -> impl Iterator<Item = (LearnerSlot, &dyn BaseLearner)> + '_ {
        LearnerSlot::PREFERENCE
            .into_iter()
            .map(move |slot| (slot, self.learner(slot)))
    }

    pub fn spec(&self, slot: LearnerSlot) -> &LearnerSpec {
        &self.specs[slot.index()]
    }

    /// Display name, e.g. `A:leaf_wise`
    pub fn name(&self, slot: LearnerSlot) -> String {
        self.spec(slot).display_name(slot)
    }

    pub fn fit_time(&self, slot: LearnerSlot) -> Duration {
        self.fit_times[slot.index()]
    }

    /// Label set the pool was trained on
    pub fn label_set(&self) -> Option<&LabelSet> {
        self.label_set.as_ref()
    }

    pub fn is_trained(&self) -> bool {
        self.learners.iter().all(|l| l.is_trained())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ml::learner::LearnerKind;

    pub(crate) fn default_specs() -> [LearnerSpec; 3] {
        [
            LearnerSpec::new(LearnerKind::LeafWise)
                .with_param("n_estimators", 10)
                .with_param("min_child_samples", 2),
            LearnerSpec::new(LearnerKind::DepthWise).with_param("n_estimators", 10),
            LearnerSpec::new(LearnerKind::Oblivious).with_param("n_estimators", 10),
        ]
    }

    pub(crate) fn make_data() -> (FeatureMatrix, Vec<Label>, LabelSet) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..60 {
            let label = i % 3;
            rows.push(vec![label as f32 * 5.0 + (i % 4) as f32 * 0.1, (i % 7) as f32]);
            labels.push(label);
        }
        (
            FeatureMatrix::from_rows(&rows).unwrap(),
            labels,
            LabelSet::new(3).unwrap(),
        )
    }

    #[test]
    fn test_pool_trains_all_learners() {
        let (x, y, set) = make_data();
        let mut pool = BaseLearnerPool::new(default_specs(), 0).unwrap();
        assert!(!pool.is_trained());
        let summary = pool.fit(&x, &y, &set).unwrap();
        assert!(pool.is_trained());
        assert_eq!(summary.len(), 3);
        assert_eq!(summary[0].name, "A:leaf_wise");
        assert_eq!(pool.name(LearnerSlot::C), "C:oblivious");
        for (_, learner) in pool.iter() {
            assert_eq!(learner.predict(x.row(1)).unwrap(), y[1]);
        }
    }

    #[test]
    fn test_bad_params_fail_before_training() {
        let mut specs = default_specs();
        specs[1] = LearnerSpec::new(LearnerKind::DepthWise).with_param("learning_rate", -1.0);
        let err = BaseLearnerPool::new(specs, 0).unwrap_err();
        match err {
            LccdeError::Configuration { learner, parameter, .. } => {
                assert_eq!(learner, "depth_wise");
                assert_eq!(parameter, "learning_rate");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_single_class_is_insufficient() {
        let (x, _, set) = make_data();
        let y = vec![1; x.n_rows()];
        let mut pool = BaseLearnerPool::new(default_specs(), 0).unwrap();
        let err = pool.fit(&x, &y, &set).unwrap_err();
        assert!(matches!(err, LccdeError::DataInsufficient { label: 1, .. }));
    }

    #[test]
    fn test_missing_class_is_insufficient() {
        let (x, y, _) = make_data();
        let set = LabelSet::new(4).unwrap();
        let mut pool = BaseLearnerPool::new(default_specs(), 0).unwrap();
        let err = pool.fit(&x, &y, &set).unwrap_err();
        assert!(matches!(err, LccdeError::DataInsufficient { label: 3, .. }));
    }

    #[test]
    fn test_empty_training_split_is_insufficient() {
        let set = LabelSet::new(3).unwrap();
        let err = BaseLearnerPool::check_training_data(&[], &set).unwrap_err();
        assert!(matches!(err, LccdeError::DataInsufficient { label: 0, .. }));
        assert!(err.is_configuration_problem());
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let (x, y, set) = make_data();
        let mut seq = BaseLearnerPool::new(default_specs(), 5).unwrap();
        let mut par = BaseLearnerPool::new(default_specs(), 5).unwrap().with_parallel(true);
        seq.fit(&x, &y, &set).unwrap();
        par.fit(&x, &y, &set).unwrap();
        for slot in LearnerSlot::PREFERENCE {
            assert_eq!(
                seq.learner(slot).predict_proba(x.row(3)).unwrap(),
                par.learner(slot).predict_proba(x.row(3)).unwrap()
            );
        }
    }
}
