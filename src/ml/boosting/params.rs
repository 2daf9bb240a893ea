//! Hyperparameter parsing
//!
//! Learner hyperparameters arrive as opaque key/value maps and are handed to
//! the learner kind unmodified. Each kind reads the keys it understands
//! (accepting the usual aliases), validates them, and logs anything left over.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::dataset::DEFAULT_MAX_BINS;
use crate::error::{LccdeError, Result};

/// Opaque per-learner hyperparameter map
pub type HyperParams = BTreeMap<String, Value>;

/// Typed reader over a [`HyperParams`] map
pub struct ParamReader<'a> {
    learner: &'a str,
    params: &'a HyperParams,
    consumed: BTreeSet<String>,
}

impl<'a> ParamReader<'a> {
    pub fn new(learner: &'a str, params: &'a HyperParams) -> Self {
        Self {
            learner,
            params,
            consumed: BTreeSet::new(),
        }
    }

    pub fn learner(&self) -> &str {
        self.learner
    }

    /// First alias present in the map; every present alias counts as consumed
    fn lookup(&mut self, keys: &[&'static str]) -> Option<(&'static str, &'a Value)> {
        let mut found = None;
        for &key in keys {
            if let Some(value) = self.params.get(key) {
                self.consumed.insert(key.to_string());
                if found.is_none() {
                    found = Some((key, value));
                }
            }
        }
        found
    }

    fn error(&self, key: &str, reason: impl Into<String>) -> LccdeError {
        LccdeError::config(self.learner, key, reason)
    }

    pub fn f64(&mut self, keys: &[&'static str], default: f64) -> Result<f64> {
        match self.lookup(keys) {
            None => Ok(default),
            Some((key, value)) => value
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or_else(|| self.error(key, format!("must be a finite number, got {}", value))),
        }
    }

    pub fn i64(&mut self, keys: &[&'static str], default: i64) -> Result<i64> {
        match self.lookup(keys) {
            None => Ok(default),
            Some((key, value)) => value
                .as_i64()
                .ok_or_else(|| self.error(key, format!("must be an integer, got {}", value))),
        }
    }

    pub fn u64(&mut self, keys: &[&'static str], default: u64) -> Result<u64> {
        match self.lookup(keys) {
            None => Ok(default),
            Some((key, value)) => value.as_u64().ok_or_else(|| {
                self.error(key, format!("must be a non-negative integer, got {}", value))
            }),
        }
    }

    pub fn usize(&mut self, keys: &[&'static str], default: usize) -> Result<usize> {
        self.u64(keys, default as u64).map(|v| v as usize)
    }

    /// Accept keys that only matter to other implementations (verbosity, file output)
    pub fn ignore(&mut self, keys: &[&'static str]) {
        self.lookup(keys);
    }

    /// Fail with a configuration error naming `key` unless `ok`
    pub fn ensure(&self, ok: bool, key: &str, reason: &str) -> Result<()> {
        if ok {
            Ok(())
        } else {
            Err(self.error(key, reason.to_string()))
        }
    }

    /// Log keys nobody read
    pub fn finish(self) {
        for key in self.params.keys() {
            if !self.consumed.contains(key) {
                warn!(learner = self.learner, parameter = %key, "ignoring unknown hyperparameter");
            }
        }
    }
}

/// Settings shared by every boosted learner kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostingParams {
    /// Boosting rounds; each round adds one tree per class
    pub n_estimators: usize,
    /// Shrinkage applied to every leaf value
    pub learning_rate: f64,
    /// L2 penalty on leaf values
    pub reg_lambda: f64,
    /// Minimum loss reduction required to split
    pub min_split_gain: f64,
    /// Minimum hessian sum per child
    pub min_child_weight: f64,
    /// Minimum rows per child
    pub min_samples_leaf: usize,
    /// Row fraction drawn per round
    pub subsample: f64,
    /// Feature fraction drawn per round
    pub colsample: f64,
    /// Histogram bins per feature
    pub max_bins: usize,
    /// Generator seed for row/feature sampling
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            reg_lambda: 1.0,
            min_split_gain: 0.0,
            min_child_weight: 1e-3,
            min_samples_leaf: 1,
            subsample: 1.0,
            colsample: 1.0,
            max_bins: DEFAULT_MAX_BINS,
            seed: 0,
        }
    }
}

impl BoostingParams {
    /// Reject values no learner can train with
    pub fn validate(&self, reader: &ParamReader<'_>) -> Result<()> {
        reader.ensure(self.n_estimators >= 1, "n_estimators", "must be at least 1")?;
        reader.ensure(
            self.learning_rate > 0.0 && self.learning_rate <= 1.0,
            "learning_rate",
            "must be in (0, 1]",
        )?;
        reader.ensure(self.reg_lambda >= 0.0, "reg_lambda", "must be non-negative")?;
        reader.ensure(self.min_split_gain >= 0.0, "min_split_gain", "must be non-negative")?;
        reader.ensure(
            self.min_child_weight >= 0.0,
            "min_child_weight",
            "must be non-negative",
        )?;
        reader.ensure(
            self.subsample > 0.0 && self.subsample <= 1.0,
            "subsample",
            "must be in (0, 1]",
        )?;
        reader.ensure(
            self.colsample > 0.0 && self.colsample <= 1.0,
            "colsample",
            "must be in (0, 1]",
        )?;
        reader.ensure(
            (2..=u16::MAX as usize).contains(&self.max_bins),
            "max_bins",
            "must be between 2 and 65535",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> HyperParams {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_aliases_and_defaults() {
        let p = params(json!({"eta": 0.05, "n_estimators": 10}));
        let mut reader = ParamReader::new("test", &p);
        assert_eq!(reader.f64(&["learning_rate", "eta"], 0.3).unwrap(), 0.05);
        assert_eq!(reader.usize(&["n_estimators"], 100).unwrap(), 10);
        assert_eq!(reader.usize(&["max_depth"], 6).unwrap(), 6);
        reader.finish();
    }

    #[test]
    fn test_type_mismatch_is_config_error() {
        let p = params(json!({"n_estimators": "many"}));
        let mut reader = ParamReader::new("test", &p);
        let err = reader.usize(&["n_estimators"], 100).unwrap_err();
        match err {
            LccdeError::Configuration { learner, parameter, .. } => {
                assert_eq!(learner, "test");
                assert_eq!(parameter, "n_estimators");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_negative_integer_rejected() {
        let p = params(json!({"num_leaves": -3}));
        let mut reader = ParamReader::new("test", &p);
        assert!(reader.usize(&["num_leaves"], 31).is_err());
    }

    #[test]
    fn test_validate_rejects_negative_learning_rate() {
        let p = HyperParams::new();
        let reader = ParamReader::new("test", &p);
        let params = BoostingParams {
            learning_rate: -0.1,
            ..Default::default()
        };
        assert!(params.validate(&reader).is_err());
        let huge = BoostingParams {
            learning_rate: 1e308,
            ..Default::default()
        };
        assert!(huge.validate(&reader).is_err());
        assert!(BoostingParams::default().validate(&reader).is_ok());
    }
}
