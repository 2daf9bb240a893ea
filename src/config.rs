//! Experiment configuration
//!
//! One TOML document configures a run. Every field has a default, so an
//! empty file is a valid configuration.
//!
//! ```toml
//! train_size = 0.8
//! random_state = 0
//! smote_enabled = true
//!
//! [smote_sampling_strategy]
//! 2 = 1000
//! 4 = 1000
//!
//! [learners.a]
//! kind = "leaf_wise"
//!
//! [learners.a.params]
//! num_leaves = 31
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dataset::selection::DEFAULT_SELECTION_THRESHOLD;
use crate::dataset::smote::DEFAULT_K_NEIGHBORS;
use crate::dataset::{InformationGainSelector, Label, LabelSet};
use crate::error::{LccdeError, Result};
use crate::ml::{DecisionConfig, LearnerKind, LearnerSlot, LearnerSpec};

/// Complete configuration of one experiment run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Fraction of rows on the train side, in (0, 1)
    pub train_size: f64,
    /// Seed for the split, oversampling and every learner
    pub random_state: u64,
    /// Split each label separately
    pub stratify: bool,

    pub learners: LearnersConfig,

    /// Oversample the training split before fitting
    pub smote_enabled: bool,
    /// Label (id or name) -> target row count after oversampling
    pub smote_sampling_strategy: BTreeMap<String, usize>,
    pub smote_k_neighbors: usize,

    pub feature_selection_enabled: bool,
    /// Cumulative normalised information gain to retain
    pub feature_selection_threshold: f64,

    pub decision: DecisionConfig,
    pub parallel: ParallelConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        let smote_sampling_strategy = BTreeMap::from([("2".to_string(), 1000), ("4".to_string(), 1000)]);
        Self {
            train_size: 0.8,
            random_state: 0,
            stratify: false,
            learners: LearnersConfig::default(),
            smote_enabled: true,
            smote_sampling_strategy,
            smote_k_neighbors: DEFAULT_K_NEIGHBORS,
            feature_selection_enabled: false,
            feature_selection_threshold: DEFAULT_SELECTION_THRESHOLD,
            decision: DecisionConfig::default(),
            parallel: ParallelConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Check everything that can be checked without data, including every
    /// learner's hyperparameters
    pub fn validate(&self) -> Result<()> {
        if !(self.train_size > 0.0 && self.train_size < 1.0) {
            return Err(LccdeError::config(
                "split",
                "train_size",
                format!("must be in (0, 1), got {}", self.train_size),
            ));
        }
        for spec in self.learners.specs() {
            spec.kind.build(&spec.params, self.random_state)?;
        }
        if self.smote_enabled && self.smote_k_neighbors == 0 {
            return Err(LccdeError::config("smote", "smote_k_neighbors", "must be at least 1"));
        }
        if self.feature_selection_enabled {
            InformationGainSelector::new(self.feature_selection_threshold)?;
        }
        Ok(())
    }

    /// Resolve the sampling strategy keys against a label set.
    ///
    /// Numeric keys are label ids, anything else is matched against the
    /// label names.
    pub fn resolve_sampling_strategy(&self, label_set: &LabelSet) -> Result<BTreeMap<Label, usize>> {
        let mut resolved = BTreeMap::new();
        for (key, &target) in &self.smote_sampling_strategy {
            let label = match key.trim().parse::<Label>() {
                Ok(id) => id,
                Err(_) => label_set
                    .names()
                    .iter()
                    .position(|name| name == key)
                    .ok_or_else(|| {
                        LccdeError::config(
                            "smote",
                            "smote_sampling_strategy",
                            format!("unknown label `{key}`"),
                        )
                    })?,
            };
            resolved.insert(label, target);
        }
        Ok(resolved)
    }
}

/// Learner kind and hyperparameters for slots A, B and C
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnersConfig {
    pub a: LearnerSpec,
    pub b: LearnerSpec,
    pub c: LearnerSpec,
}

impl Default for LearnersConfig {
    fn default() -> Self {
        Self {
            a: LearnerSpec::new(LearnerKind::LeafWise),
            b: LearnerSpec::new(LearnerKind::DepthWise),
            c: LearnerSpec::new(LearnerKind::Oblivious),
        }
    }
}

impl LearnersConfig {
    /// Specs in slot order
    pub fn specs(&self) -> [LearnerSpec; 3] {
        [self.a.clone(), self.b.clone(), self.c.clone()]
    }

    pub fn get(&self, slot: LearnerSlot) -> &LearnerSpec {
        match slot {
            LearnerSlot::A => &self.a,
            LearnerSlot::B => &self.b,
            LearnerSlot::C => &self.c,
        }
    }
}

/// Configuration for parallel training and fusion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Fit learners and fuse samples on worker threads
    pub enabled: bool,
    /// Number of worker threads (0 = auto-detect CPU count)
    pub num_threads: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: cfg!(feature = "parallel"),
            num_threads: 0,
        }
    }
}

impl ParallelConfig {
    /// Get actual number of threads to use
    pub fn actual_threads(&self) -> usize {
        if !self.enabled {
            return 1;
        }
        if self.num_threads == 0 {
            #[cfg(feature = "parallel")]
            {
                num_cpus::get().max(1)
            }
            #[cfg(not(feature = "parallel"))]
            {
                1
            }
        } else {
            self.num_threads
        }
    }

    /// True when work is actually spread over threads
    pub fn is_active(&self) -> bool {
        cfg!(feature = "parallel") && self.enabled
    }

    /// Create a new config with specified thread count
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    /// Build a run-local thread pool so concurrent runs don't share one
    #[cfg(feature = "parallel")]
    pub fn build_pool(&self) -> std::result::Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.actual_threads())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExperimentConfig::default();
        assert_eq!(config.train_size, 0.8);
        assert!(config.smote_enabled);
        assert_eq!(config.smote_sampling_strategy["2"], 1000);
        assert_eq!(config.learners.b.kind, LearnerKind::DepthWise);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = ExperimentConfig::from_toml("").unwrap();
        assert_eq!(config, ExperimentConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = ExperimentConfig::from_toml(
            r#"
            train_size = 0.7
            smote_enabled = false

            [learners.c]
            kind = "depth_wise"

            [learners.c.params]
            max_depth = 4
            learning_rate = 0.2

            [decision]
            override_comparison = "inclusive"
            "#,
        )
        .unwrap();
        assert_eq!(config.train_size, 0.7);
        assert!(!config.smote_enabled);
        assert_eq!(config.learners.a.kind, LearnerKind::LeafWise);
        assert_eq!(config.learners.c.kind, LearnerKind::DepthWise);
        assert_eq!(config.learners.c.params["max_depth"], serde_json::json!(4));
        assert_eq!(
            config.decision.override_comparison,
            crate::ml::ConfidenceComparison::Inclusive
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ExperimentConfig {
            train_size: 1.0,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().is_configuration_problem());

        config.train_size = 0.5;
        config.learners.a = LearnerSpec::new(LearnerKind::LeafWise).with_param("learning_rate", -0.1);
        match config.validate().unwrap_err() {
            LccdeError::Configuration { parameter, .. } => assert_eq!(parameter, "learning_rate"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_sampling_strategy() {
        let set = LabelSet::new(3)
            .unwrap()
            .with_names(vec!["BENIGN".into(), "DoS".into(), "PortScan".into()])
            .unwrap();
        let config = ExperimentConfig {
            smote_sampling_strategy: BTreeMap::from([("1".to_string(), 50), ("PortScan".to_string(), 80)]),
            ..Default::default()
        };
        let resolved = config.resolve_sampling_strategy(&set).unwrap();
        assert_eq!(resolved, BTreeMap::from([(1, 50), (2, 80)]));

        let config = ExperimentConfig {
            smote_sampling_strategy: BTreeMap::from([("Botnet".to_string(), 10)]),
            ..Default::default()
        };
        assert!(config.resolve_sampling_strategy(&set).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lccde.toml");
        let mut config = ExperimentConfig::default();
        config.learners.b = LearnerSpec::new(LearnerKind::DepthWise).with_param("max_depth", 3);
        config.save(&path).unwrap();
        let loaded = ExperimentConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_parallel_threads() {
        let config = ParallelConfig::default().with_threads(3);
        if config.is_active() {
            assert_eq!(config.actual_threads(), 3);
        }
        let off = ParallelConfig {
            enabled: false,
            num_threads: 8,
        };
        assert_eq!(off.actual_threads(), 1);
        assert!(!off.is_active());
    }
}
