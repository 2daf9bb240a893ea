//! Quantile feature binning
//!
//! Maps each feature's raw values onto at most `max_bins` ordered bins. Tree
//! growers split on bin boundaries and the feature selector estimates
//! information gain on the binned values.
//!
//! A bin `b` of feature `f` holds the values `v` with
//! `thresholds[f][b - 1] < v <= thresholds[f][b]`; the last bin holds
//! everything above the last threshold.

use serde::{Deserialize, Serialize};

use super::FeatureMatrix;

/// Default bin count per feature
pub const DEFAULT_MAX_BINS: usize = 255;

/// Per-feature bin boundaries learned from training data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinMapper {
    thresholds: Vec<Vec<f32>>,
}

impl BinMapper {
    /// Learn boundaries for every column of `features`
    pub fn fit(features: &FeatureMatrix, max_bins: usize) -> Self {
        let max_bins = max_bins.max(2);
        let thresholds = (0..features.n_features())
            .map(|j| feature_thresholds(features.column(j), max_bins))
            .collect();
        Self { thresholds }
    }

    pub fn n_features(&self) -> usize {
        self.thresholds.len()
    }

    /// Number of bins for a feature
    pub fn n_bins(&self, feature: usize) -> usize {
        self.thresholds[feature].len() + 1
    }

    /// Upper boundary of `bin`, the split threshold used at prediction time
    pub fn threshold(&self, feature: usize, bin: usize) -> f32 {
        self.thresholds[feature][bin]
    }

    /// Bin index of a raw value
    #[inline]
    pub fn bin_of(&self, feature: usize, value: f32) -> u16 {
        self.thresholds[feature].partition_point(|&t| t < value) as u16
    }

    /// Bin every value of `features`
    pub fn transform(&self, features: &FeatureMatrix) -> BinnedMatrix {
        let columns = (0..self.n_features())
            .map(|j| features.rows().map(|r| self.bin_of(j, r[j])).collect())
            .collect();
        BinnedMatrix {
            columns,
            n_rows: features.n_rows(),
        }
    }
}

/// Column-major bin indices
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    columns: Vec<Vec<u16>>,
    n_rows: usize,
}

impl BinnedMatrix {
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    /// Bin indices of one feature, indexed by row
    #[inline]
    pub fn column(&self, feature: usize) -> &[u16] {
        &self.columns[feature]
    }
}

fn feature_thresholds(mut values: Vec<f32>, max_bins: usize) -> Vec<f32> {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    // Distinct values with their counts
    let mut distinct: Vec<(f32, usize)> = Vec::new();
    for v in values.iter().copied() {
        match distinct.last_mut() {
            Some((last, count)) if *last == v => *count += 1,
            _ => distinct.push((v, 1)),
        }
    }
    if distinct.len() < 2 {
        return Vec::new();
    }

    let midpoint = |i: usize| (distinct[i].0 + distinct[i + 1].0) / 2.0;

    if distinct.len() <= max_bins {
        return (0..distinct.len() - 1).map(midpoint).collect();
    }

    // Cut whenever the running count crosses the next quantile
    let per_bin = values.len() as f64 / max_bins as f64;
    let mut thresholds = Vec::with_capacity(max_bins - 1);
    let mut seen = 0usize;
    let mut next_cut = per_bin;
    for i in 0..distinct.len() - 1 {
        seen += distinct[i].1;
        if seen as f64 >= next_cut {
            thresholds.push(midpoint(i));
            while next_cut <= seen as f64 {
                next_cut += per_bin;
            }
            if thresholds.len() == max_bins - 1 {
                break;
            }
        }
    }
    thresholds
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_matrix(values: &[f32]) -> FeatureMatrix {
        FeatureMatrix::from_flat(1, values.to_vec()).unwrap()
    }

    #[test]
    fn test_few_distinct_values_get_midpoints() {
        let mapper = BinMapper::fit(&column_matrix(&[1.0, 3.0, 3.0, 5.0]), 255);
        assert_eq!(mapper.n_bins(0), 3);
        assert_eq!(mapper.threshold(0, 0), 2.0);
        assert_eq!(mapper.threshold(0, 1), 4.0);
        assert_eq!(mapper.bin_of(0, 1.0), 0);
        assert_eq!(mapper.bin_of(0, 2.0), 0);
        assert_eq!(mapper.bin_of(0, 3.0), 1);
        assert_eq!(mapper.bin_of(0, 100.0), 2);
    }

    #[test]
    fn test_constant_feature_has_one_bin() {
        let mapper = BinMapper::fit(&column_matrix(&[7.0; 10]), 16);
        assert_eq!(mapper.n_bins(0), 1);
        assert_eq!(mapper.bin_of(0, 7.0), 0);
    }

    #[test]
    fn test_bins_are_capped() {
        let values: Vec<f32> = (0..1000).map(|i| i as f32).collect();
        let mapper = BinMapper::fit(&column_matrix(&values), 16);
        assert!(mapper.n_bins(0) <= 16);
        assert!(mapper.n_bins(0) >= 8);
    }

    #[test]
    fn test_transform_matches_bin_of() {
        let m = FeatureMatrix::from_rows(&[vec![0.0, 10.0], vec![1.0, 20.0], vec![2.0, 10.0]]).unwrap();
        let mapper = BinMapper::fit(&m, 255);
        let binned = mapper.transform(&m);
        assert_eq!(binned.n_rows(), 3);
        assert_eq!(binned.column(0), &[0, 1, 2]);
        assert_eq!(binned.column(1), &[0, 1, 0]);
    }
}
