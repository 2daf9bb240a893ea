//! Experiment runner
//!
//! Runs the whole chain once, synchronously:
//! split -> feature selection -> oversampling -> fit -> per-class scoring ->
//! leader assignment -> decision fusion -> evaluation.
//!
//! Every intermediate value is owned by the run. A failure at any stage
//! aborts the run; there are no partial outcomes.

use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ExperimentConfig;
use crate::dataset::{Dataset, InformationGainSelector, Smote, TrainTestSplit};
use crate::error::{LccdeError, Result};
use crate::evaluation::report::duration_ms;
use crate::evaluation::{EvaluationReport, EvaluationReporter, ReportFormat};
use crate::ml::{
    collect_votes, BaseLearnerPool, DecisionBatch, DecisionEngine, DecisionPath, DecisionStats, FusedPrediction,
    LeaderAssigner, LeaderTable, LearnerSlot, LearnerTraining, PerClassScoreTable, PerClassScorer,
};

/// Name of the fused model in reports
pub const ENSEMBLE_NAME: &str = "LCCDE";

/// Shape of the data at each stage
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub rows: usize,
    pub features: usize,
    pub classes: Vec<String>,
    /// Rows per class name over the whole dataset
    pub class_distribution: BTreeMap<String, usize>,
    pub train_rows: usize,
    /// Train rows after oversampling
    pub train_rows_resampled: usize,
    pub test_rows: usize,
}

/// Everything a run produces
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentOutcome {
    pub timestamp: DateTime<Utc>,
    pub config: ExperimentConfig,
    pub dataset: DatasetSummary,
    /// Feature names kept by selection, `None` when selection is off
    pub selected_features: Option<Vec<String>>,
    pub learners: Vec<LearnerTraining>,
    pub scores: PerClassScoreTable,
    pub leaders: LeaderTable,
    /// Class name -> leading learner name
    pub leader_names: BTreeMap<String, String>,
    pub lccde: EvaluationReport,
    pub base_learners: Vec<EvaluationReport>,
    pub decision_stats: DecisionStats,
    /// Dataset row index of each test sample, aligned with `predictions`
    pub test_indices: Vec<usize>,
    pub predictions: Vec<FusedPrediction>,
}

/// Runs experiments with a fixed configuration
#[derive(Debug, Clone)]
pub struct ExperimentRunner {
    config: ExperimentConfig,
}

impl ExperimentRunner {
    /// Validate the configuration up front
    pub fn new(config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn run(&self, dataset: &Dataset) -> Result<ExperimentOutcome> {
        #[cfg(feature = "parallel")]
        if self.config.parallel.is_active() {
            let threads = self
                .config
                .parallel
                .build_pool()
                .map_err(|e| LccdeError::config("parallel", "num_threads", e.to_string()))?;
            debug!(threads = threads.current_num_threads(), "using run-local thread pool");
            return threads.install(|| self.run_chain(dataset));
        }
        self.run_chain(dataset)
    }

    fn run_chain(&self, dataset: &Dataset) -> Result<ExperimentOutcome> {
        let config = &self.config;
        let seed = config.random_state;
        let parallel = config.parallel.is_active();
        let label_set = &dataset.label_set;

        if dataset.is_empty() {
            return Err(LccdeError::InvalidDataset("dataset has no rows".to_string()));
        }
        info!(
            rows = dataset.len(),
            features = dataset.features.n_features(),
            classes = label_set.len(),
            "starting LCCDE experiment"
        );

        // Parse every learner's hyperparameters before spending any work
        let mut pool = BaseLearnerPool::new(config.learners.specs(), seed)?.with_parallel(parallel);

        let mut split = TrainTestSplit::new(dataset, config.train_size, seed, config.stratify)?;
        info!(
            train = split.train_labels.len(),
            test = split.test_labels.len(),
            "train/test split"
        );
        BaseLearnerPool::check_training_data(&split.train_labels, label_set)?;
        let train_rows = split.train_labels.len();

        let selected_features = if config.feature_selection_enabled {
            let selection = InformationGainSelector::new(config.feature_selection_threshold)?.fit(
                &split.train_features,
                &split.train_labels,
                label_set,
            )?;
            split.select_columns(&selection.selected);
            let names = selection.selected_names(&dataset.feature_names);
            debug!(features = ?names, "selected features");
            Some(names)
        } else {
            None
        };

        if config.smote_enabled {
            let strategy = config.resolve_sampling_strategy(label_set)?;
            if !strategy.is_empty() {
                let smote = Smote::new(strategy, seed).with_k_neighbors(config.smote_k_neighbors);
                let (features, labels) =
                    smote.fit_resample(&split.train_features, &split.train_labels, label_set)?;
                info!(before = train_rows, after = labels.len(), "oversampled training split");
                split.train_features = features;
                split.train_labels = labels;
            }
        }

        let train_start = Instant::now();
        let learners = pool.fit(&split.train_features, &split.train_labels, label_set)?;
        let training_time = train_start.elapsed();
        info!(ms = training_time.as_millis() as u64, "base learners trained");

        let decision_start = Instant::now();
        let votes = collect_votes(&pool, &split.test_features, parallel)?;
        let inference_time = decision_start.elapsed();

        let scores = PerClassScorer::score_votes(&votes, &split.test_labels, label_set)?;
        let leaders = LeaderAssigner::assign(&scores);
        let learner_names = LearnerSlot::PREFERENCE.map(|slot| pool.name(slot));
        let leader_names = leaders.named(label_set, &learner_names);
        info!(leaders = ?leader_names, "leader table");

        let engine = DecisionEngine::new(leaders.clone(), config.decision.clone()).with_parallel(parallel);
        let batch = engine.decide_votes(votes);
        let decision_time = decision_start.elapsed();
        let DecisionBatch {
            votes,
            predictions,
            stats: decision_stats,
        } = batch;
        for path in DecisionPath::ALL {
            debug!(path = %path, samples = decision_stats.count(path), "decision path");
        }

        let fused_labels: Vec<_> = predictions.iter().map(|p| p.label).collect();
        let lccde = EvaluationReporter::evaluate(
            ENSEMBLE_NAME,
            &split.test_labels,
            &fused_labels,
            label_set,
            training_time,
            decision_time,
        )?;

        let base_learners = LearnerSlot::PREFERENCE
            .into_iter()
            .map(|slot| {
                let predicted: Vec<_> = votes.iter().map(|v| v[slot.index()].label).collect();
                EvaluationReporter::evaluate(
                    pool.name(slot),
                    &split.test_labels,
                    &predicted,
                    label_set,
                    pool.fit_time(slot),
                    inference_time,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            accuracy = lccde.accuracy,
            f1 = lccde.f1,
            disagreements = decision_stats.total - decision_stats.unanimous,
            "experiment complete"
        );

        let class_distribution = dataset
            .class_distribution()
            .into_iter()
            .map(|(label, n)| (label_set.name(label), n))
            .collect();

        Ok(ExperimentOutcome {
            timestamp: Utc::now(),
            config: config.clone(),
            dataset: DatasetSummary {
                rows: dataset.len(),
                features: dataset.features.n_features(),
                classes: label_set.iter().map(|l| label_set.name(l)).collect(),
                class_distribution,
                train_rows,
                train_rows_resampled: split.train_labels.len(),
                test_rows: split.test_labels.len(),
            },
            selected_features,
            learners,
            scores,
            leaders,
            leader_names,
            lccde,
            base_learners,
            decision_stats,
            test_indices: split.test_indices,
            predictions,
        })
    }
}

impl ExperimentOutcome {
    /// Reports of the ensemble followed by each base learner
    pub fn reports(&self) -> impl Iterator<Item = &EvaluationReport> {
        std::iter::once(&self.lccde).chain(self.base_learners.iter())
    }

    /// Wall-clock training plus decision time of the ensemble
    pub fn total_time(&self) -> Duration {
        Duration::from_secs_f64(self.lccde.total_time_ms().max(0.0) / 1000.0)
    }

    pub fn render(&self, format: ReportFormat) -> Result<String> {
        let mut out = String::new();
        match format {
            ReportFormat::Json => return Ok(serde_json::to_string_pretty(self)?),
            ReportFormat::Text => self.write_text(&mut out)?,
            ReportFormat::Markdown => self.write_markdown(&mut out)?,
        }
        Ok(out)
    }

    fn write_text(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "LCCDE experiment, {}", self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(
            out,
            "{} rows, {} features, {} classes; train {} ({} after oversampling), test {}",
            self.dataset.rows,
            self.dataset.features,
            self.dataset.classes.len(),
            self.dataset.train_rows,
            self.dataset.train_rows_resampled,
            self.dataset.test_rows
        )?;
        if let Some(features) = &self.selected_features {
            writeln!(out, "selected features: {}", features.join(", "))?;
        }

        writeln!(out, "\nleaders")?;
        for (class, learner) in &self.leader_names {
            writeln!(out, "  {class:<20} {learner}")?;
        }

        writeln!(out, "\ndecisions")?;
        for path in DecisionPath::ALL {
            writeln!(out, "  {:<20} {}", path.name(), self.decision_stats.count(path))?;
        }

        for report in self.reports() {
            writeln!(out)?;
            report.write_text(out)?;
        }
        Ok(())
    }

    fn write_markdown(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "# LCCDE Experiment Report")?;
        writeln!(out, "Generated: {}\n", self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"))?;

        writeln!(out, "## Dataset\n")?;
        writeln!(out, "| Metric | Value |")?;
        writeln!(out, "|--------|-------|")?;
        writeln!(out, "| Rows | {} |", self.dataset.rows)?;
        writeln!(out, "| Features | {} |", self.dataset.features)?;
        writeln!(out, "| Train rows | {} |", self.dataset.train_rows)?;
        writeln!(out, "| Train rows (oversampled) | {} |", self.dataset.train_rows_resampled)?;
        writeln!(out, "| Test rows | {} |\n", self.dataset.test_rows)?;
        if let Some(features) = &self.selected_features {
            writeln!(out, "Selected features: {}\n", features.join(", "))?;
        }

        writeln!(out, "## Summary\n")?;
        writeln!(out, "| Model | Accuracy | Precision | Recall | F1 | Time (ms) |")?;
        writeln!(out, "|-------|----------|-----------|--------|----|-----------|")?;
        for r in self.reports() {
            writeln!(
                out,
                "| {} | {:.4} | {:.4} | {:.4} | {:.4} | {:.1} |",
                r.model,
                r.accuracy,
                r.precision,
                r.recall,
                r.f1,
                r.total_time_ms()
            )?;
        }

        writeln!(out, "\n## Leaders\n")?;
        writeln!(out, "| Class | Leader |")?;
        writeln!(out, "|-------|--------|")?;
        for (class, learner) in &self.leader_names {
            writeln!(out, "| {class} | {learner} |")?;
        }

        writeln!(out, "\n## Decisions\n")?;
        writeln!(out, "| Path | Samples |")?;
        writeln!(out, "|------|---------|")?;
        for path in DecisionPath::ALL {
            writeln!(out, "| {} | {} |", path.name(), self.decision_stats.count(path))?;
        }

        writeln!(out, "\n## Reports\n")?;
        for report in self.reports() {
            report.write_markdown(out)?;
            writeln!(out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{FeatureMatrix, LabelSet};
    use crate::ml::{LearnerKind, LearnerSpec};

    fn blobs(per_class: usize) -> Dataset {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..per_class * 3 {
            let label = i % 3;
            let jitter = ((i * 7919) % 13) as f32 / 13.0;
            rows.push(vec![label as f32 * 4.0 + jitter, jitter * 2.0, (label * 2) as f32 - jitter]);
            labels.push(label);
        }
        let set = LabelSet::new(3)
            .unwrap()
            .with_names(vec!["BENIGN".into(), "DoS".into(), "PortScan".into()])
            .unwrap();
        Dataset::with_label_set(FeatureMatrix::from_rows(&rows).unwrap(), labels, set).unwrap()
    }

    fn small_config() -> ExperimentConfig {
        let mut config = ExperimentConfig {
            smote_enabled: false,
            ..Default::default()
        };
        for spec in [&mut config.learners.a, &mut config.learners.b, &mut config.learners.c] {
            spec.params.insert("n_estimators".into(), 15.into());
        }
        config.learners.a.params.insert("min_child_samples".into(), 3.into());
        config
    }

    #[test]
    fn test_run_separable() {
        let outcome = ExperimentRunner::new(small_config()).unwrap().run(&blobs(40)).unwrap();
        assert_eq!(outcome.predictions.len(), outcome.dataset.test_rows);
        assert_eq!(outcome.test_indices.len(), outcome.dataset.test_rows);
        assert_eq!(outcome.base_learners.len(), 3);
        assert_eq!(outcome.leader_names.len(), 3);
        assert!(outcome.lccde.accuracy > 0.9);
        assert_eq!(outcome.decision_stats.total, outcome.dataset.test_rows);
    }

    #[test]
    fn test_bad_learner_config_fails_early() {
        let mut config = small_config();
        config.learners.b = LearnerSpec::new(LearnerKind::DepthWise).with_param("learning_rate", -1.0);
        assert!(ExperimentRunner::new(config).unwrap_err().is_configuration_problem());
    }

    #[test]
    fn test_smote_and_selection() {
        let mut config = small_config();
        config.smote_enabled = true;
        config.smote_sampling_strategy = BTreeMap::from([("PortScan".to_string(), 60)]);
        config.feature_selection_enabled = true;
        let outcome = ExperimentRunner::new(config).unwrap().run(&blobs(40)).unwrap();
        assert!(outcome.dataset.train_rows_resampled > outcome.dataset.train_rows);
        let selected = outcome.selected_features.unwrap();
        assert!(!selected.is_empty());
        assert!(selected.len() <= 3);
    }

    #[test]
    fn test_render_formats() {
        let outcome = ExperimentRunner::new(small_config()).unwrap().run(&blobs(20)).unwrap();
        let text = outcome.render(ReportFormat::Text).unwrap();
        assert!(text.contains("leaders"));
        assert!(text.contains(ENSEMBLE_NAME));
        assert!(text.contains(&outcome.lccde.to_text()));
        let md = outcome.render(ReportFormat::Markdown).unwrap();
        assert!(md.contains("## Leaders"));
        assert!(md.contains(&outcome.base_learners[2].to_markdown()));
        let json = outcome.render(ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["lccde"]["model"], ENSEMBLE_NAME);
    }
}
