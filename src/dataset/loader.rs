//! CSV dataset loading
//!
//! Reads a header-first CSV with numeric feature columns and one label
//! column. Numeric labels are used as-is; textual labels are encoded by their
//! sorted distinct values and the names are kept on the label set.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, info};

use super::{Dataset, FeatureMatrix, Label, LabelSet};
use crate::error::{LccdeError, Result};

/// Default name of the label column
pub const DEFAULT_LABEL_COLUMN: &str = "Label";

#[derive(Debug, Clone)]
pub struct DatasetLoader {
    label_column: String,
    delimiter: u8,
}

impl Default for DatasetLoader {
    fn default() -> Self {
        Self {
            label_column: DEFAULT_LABEL_COLUMN.to_string(),
            delimiter: b',',
        }
    }
}

impl DatasetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different label column
    pub fn with_label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = column.into();
        self
    }

    /// Use a different field delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Load a dataset from a CSV file
    pub fn load(&self, path: &Path) -> Result<Dataset> {
        let file = File::open(path)?;
        let dataset = self.from_reader(file)?;
        info!(
            path = %path.display(),
            rows = dataset.len(),
            features = dataset.features.n_features(),
            classes = dataset.label_set.len(),
            "dataset loaded"
        );
        Ok(dataset)
    }

    /// Load a dataset from any CSV source
    pub fn from_reader<R: Read>(&self, reader: R) -> Result<Dataset> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let label_idx = headers
            .iter()
            .position(|h| h == self.label_column)
            .ok_or_else(|| {
                LccdeError::InvalidDataset(format!("missing label column `{}`", self.label_column))
            })?;
        let feature_names: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != label_idx)
            .map(|(_, h)| h.to_string())
            .collect();

        let mut features = FeatureMatrix::new(feature_names.len());
        let mut raw_labels: Vec<String> = Vec::new();
        let mut row = Vec::with_capacity(feature_names.len());

        for (line, record) in rdr.records().enumerate() {
            let record = record?;
            row.clear();
            for (col, field) in record.iter().enumerate() {
                if col == label_idx {
                    raw_labels.push(field.to_string());
                    continue;
                }
                let value: f32 = field.parse().map_err(|_| {
                    LccdeError::InvalidDataset(format!(
                        "row {} column `{}`: `{}` is not numeric",
                        line + 1,
                        headers.get(col).unwrap_or("?"),
                        field
                    ))
                })?;
                if !value.is_finite() {
                    return Err(LccdeError::InvalidDataset(format!(
                        "row {} column `{}`: non-finite value",
                        line + 1,
                        headers.get(col).unwrap_or("?")
                    )));
                }
                row.push(value);
            }
            features.push_row(&row)?;
        }

        let (labels, label_set) = encode_labels(&raw_labels)?;
        Dataset::with_label_set(features, labels, label_set)?.with_feature_names(feature_names)
    }
}

/// Numeric labels already forming `0..K` pass through; anything else
/// (sparse ids, text) is label-encoded in sorted order
fn encode_labels(raw: &[String]) -> Result<(Vec<Label>, LabelSet)> {
    let numeric: Option<Vec<Label>> = raw.iter().map(|s| s.parse::<Label>().ok()).collect();
    if let Some(labels) = numeric {
        let ids: BTreeSet<Label> = labels.iter().copied().collect();
        if ids.iter().copied().eq(0..ids.len()) {
            let set = LabelSet::new(ids.len())?;
            return Ok((labels, set));
        }
        let ids: Vec<Label> = ids.into_iter().collect();
        debug!(?ids, "encoding sparse numeric labels");
        let encoded = labels
            .iter()
            .map(|l| ids.binary_search(l).unwrap_or_default())
            .collect();
        let names = ids.iter().map(|l| l.to_string()).collect();
        let set = LabelSet::new(ids.len())?.with_names(names)?;
        return Ok((encoded, set));
    }

    let classes: Vec<String> = raw.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
    debug!(?classes, "encoding textual labels");
    let labels = raw
        .iter()
        .map(|s| classes.binary_search(s).unwrap_or_default())
        .collect();
    let set = LabelSet::new(classes.len())?.with_names(classes)?;
    Ok((labels, set))
}
