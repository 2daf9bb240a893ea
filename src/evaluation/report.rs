//! Evaluation reports
//!
//! An [`EvaluationReport`] is the plain record handed back to the caller for
//! one model: accuracy, weighted and per-class scores, the confusion matrix
//! and timing. It renders as text (classification-report layout), Markdown
//! or JSON.

use std::fmt::{self, Write};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::metrics::{AveragedMetrics, ClassMetrics, ClassificationMetrics, ConfusionMatrix};
use crate::dataset::{Label, LabelSet};
use crate::error::{LccdeError, Result};

/// Report output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Markdown,
    Json,
}

impl FromStr for ReportFormat {
    type Err = LccdeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(ReportFormat::Text),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "json" => Ok(ReportFormat::Json),
            other => Err(LccdeError::config(
                "report",
                "format",
                format!("must be text, markdown or json, got `{other}`"),
            )),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReportFormat::Text => "text",
            ReportFormat::Markdown => "markdown",
            ReportFormat::Json => "json",
        };
        f.write_str(s)
    }
}

/// Metrics for one model on the held-out split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub model: String,
    pub samples: usize,
    pub accuracy: f64,
    /// Support-weighted precision
    pub precision: f64,
    /// Support-weighted recall
    pub recall: f64,
    /// Support-weighted F1
    pub f1: f64,
    /// F1 ordered by label
    pub per_class_f1: Vec<f64>,
    pub classes: Vec<ClassMetrics>,
    pub macro_avg: AveragedMetrics,
    pub weighted_avg: AveragedMetrics,
    /// Rows = true label, columns = predicted label
    pub confusion_matrix: ConfusionMatrix,
    pub training_time_ms: f64,
    pub decision_time_ms: f64,
}

impl EvaluationReport {
    pub fn total_time_ms(&self) -> f64 {
        self.training_time_ms + self.decision_time_ms
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

    /// Classification-report style text
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        // fmt::Write for String is infallible
        let _ = self.write_text(&mut out);
        out
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        // fmt::Write for String is infallible
        let _ = self.write_markdown(&mut out);
        out
    }

    pub(crate) fn write_text(&self, out: &mut String) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.name.len())
            .chain(["weighted avg".len()])
            .max()
            .unwrap_or(12);

        writeln!(out, "{}", self.model)?;
        writeln!(
            out,
            "{:>width$}  {:>9} {:>9} {:>9} {:>9}\n",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for c in &self.classes {
            writeln!(
                out,
                "{:>width$}  {:>9.4} {:>9.4} {:>9.4} {:>9}",
                c.name, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(out)?;
        writeln!(
            out,
            "{:>width$}  {:>9} {:>9} {:>9.4} {:>9}",
            "accuracy", "", "", self.accuracy, self.samples
        )?;
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                out,
                "{:>width$}  {:>9.4} {:>9.4} {:>9.4} {:>9}",
                name, avg.precision, avg.recall, avg.f1, avg.support
            )?;
        }

        writeln!(out, "\nconfusion matrix (rows = true, columns = predicted)")?;
        for row in self.confusion_matrix.rows() {
            let cells: Vec<String> = row.iter().map(|n| format!("{n:>7}")).collect();
            writeln!(out, "{}", cells.join(" "))?;
        }
        writeln!(
            out,
            "\ntraining {:.1} ms, decision {:.1} ms",
            self.training_time_ms, self.decision_time_ms
        )
    }

    pub(crate) fn write_markdown(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "### {}\n", self.model)?;
        writeln!(out, "| Metric | Value |")?;
        writeln!(out, "|--------|-------|")?;
        writeln!(out, "| Accuracy | {:.4} |", self.accuracy)?;
        writeln!(out, "| Precision (weighted) | {:.4} |", self.precision)?;
        writeln!(out, "| Recall (weighted) | {:.4} |", self.recall)?;
        writeln!(out, "| F1 (weighted) | {:.4} |", self.f1)?;
        writeln!(out, "| Training time | {:.1} ms |", self.training_time_ms)?;
        writeln!(out, "| Decision time | {:.1} ms |\n", self.decision_time_ms)?;

        writeln!(out, "| Class | Precision | Recall | F1 | Support |")?;
        writeln!(out, "|-------|-----------|--------|----|---------|")?;
        for c in &self.classes {
            writeln!(
                out,
                "| {} | {:.4} | {:.4} | {:.4} | {} |",
                c.name, c.precision, c.recall, c.f1, c.support
            )?;
        }
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                out,
                "| *{}* | {:.4} | {:.4} | {:.4} | {} |",
                name, avg.precision, avg.recall, avg.f1, avg.support
            )?;
        }

        writeln!(out, "\nConfusion matrix (rows = true label):\n")?;
        let header: Vec<String> = self.classes.iter().map(|c| c.name.clone()).collect();
        writeln!(out, "| | {} |", header.join(" | "))?;
        writeln!(out, "|---{}|", "|---".repeat(header.len()))?;
        for (c, row) in self.classes.iter().zip(self.confusion_matrix.rows()) {
            let cells: Vec<String> = row.iter().map(|n| n.to_string()).collect();
            writeln!(out, "| {} | {} |", c.name, cells.join(" | "))?;
        }
        Ok(())
    }
}

/// Turns predictions and ground truth into an [`EvaluationReport`]
pub struct EvaluationReporter;

impl EvaluationReporter {
    pub fn evaluate(
        model: impl Into<String>,
        truth: &[Label],
        predicted: &[Label],
        label_set: &LabelSet,
        training_time: Duration,
        decision_time: Duration,
    ) -> Result<EvaluationReport> {
        let matrix = ConfusionMatrix::from_predictions(truth, predicted, label_set.len())?;
        let metrics = ClassificationMetrics::from_confusion(&matrix, label_set);
        Ok(EvaluationReport {
            model: model.into(),
            samples: truth.len(),
            accuracy: metrics.accuracy,
            precision: metrics.weighted_avg.precision,
            recall: metrics.weighted_avg.recall,
            f1: metrics.weighted_avg.f1,
            per_class_f1: metrics.f1_by_label(),
            classes: metrics.per_class,
            macro_avg: metrics.macro_avg,
            weighted_avg: metrics.weighted_avg,
            confusion_matrix: matrix,
            training_time_ms: duration_ms(training_time),
            decision_time_ms: duration_ms(decision_time),
        })
    }
}

pub(crate) fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> EvaluationReport {
        let set = LabelSet::new(3)
            .unwrap()
            .with_names(vec!["BENIGN".into(), "DoS".into(), "PortScan".into()])
            .unwrap();
        EvaluationReporter::evaluate(
            "LCCDE",
            &[0, 0, 1, 1, 2, 2],
            &[0, 0, 1, 2, 2, 2],
            &set,
            Duration::from_millis(120),
            Duration::from_millis(3),
        )
        .unwrap()
    }

    #[test]
    fn test_report_fields() {
        let r = report();
        assert_eq!(r.samples, 6);
        assert!((r.accuracy - 5.0 / 6.0).abs() < 1e-12);
        assert_eq!(r.per_class_f1.len(), 3);
        assert_eq!(r.per_class_f1[0], 1.0);
        assert!((r.f1 - r.weighted_avg.f1).abs() < 1e-12);
        assert!((r.total_time_ms() - 123.0).abs() < 1e-6);
    }

    #[test]
    fn test_confusion_rows_match_support() {
        let r = report();
        for (label, row) in r.confusion_matrix.rows().iter().enumerate() {
            assert_eq!(row.iter().sum::<u64>(), r.classes[label].support);
        }
    }

    #[test]
    fn test_text_render() {
        let text = report().to_text();
        assert!(text.contains("precision"));
        assert!(text.contains("PortScan"));
        assert!(text.contains("weighted avg"));
        assert!(text.contains("confusion matrix"));
        assert_eq!(report().render(ReportFormat::Text).unwrap(), text);
    }

    #[test]
    fn test_markdown_render() {
        let md = report().render(ReportFormat::Markdown).unwrap();
        assert!(md.starts_with("### LCCDE"));
        assert!(md.contains("| DoS | 1.0000 | 0.5000 |"));
    }

    #[test]
    fn test_json_round_trip() {
        let r = report();
        let json = r.render(ReportFormat::Json).unwrap();
        let back: EvaluationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.model, r.model);
        assert_eq!(back.confusion_matrix, r.confusion_matrix);
        assert_eq!(back.classes.len(), 3);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("md".parse::<ReportFormat>().unwrap(), ReportFormat::Markdown);
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert!("csv".parse::<ReportFormat>().is_err());
    }
}
