//! Regression trees fitted to second-order gradient statistics
//!
//! Every learner kind grows the same [`RegressionTree`] shape; they differ only
//! in the order in which they decide to split. Splits are found on feature
//! histograms: a split on `(feature, bin)` sends rows with `bin <= split bin`
//! left, which at prediction time is `value <= threshold`.

use serde::{Deserialize, Serialize};

use super::params::BoostingParams;
use crate::dataset::{BinMapper, BinnedMatrix};

/// Gradient/hessian sums over a set of rows
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GradStats {
    pub grad: f64,
    pub hess: f64,
    pub count: usize,
}

impl GradStats {
    #[inline]
    fn add(&mut self, grad: f64, hess: f64) {
        self.grad += grad;
        self.hess += hess;
        self.count += 1;
    }

    #[inline]
    fn merge(&mut self, other: &GradStats) {
        self.grad += other.grad;
        self.hess += other.hess;
        self.count += other.count;
    }

    #[inline]
    fn minus(&self, other: &GradStats) -> GradStats {
        GradStats {
            grad: self.grad - other.grad,
            hess: self.hess - other.hess,
            count: self.count - other.count,
        }
    }
}

/// Best split found for a node
#[derive(Debug, Clone, Copy)]
pub struct SplitCandidate {
    pub feature: usize,
    pub bin: u16,
    pub gain: f64,
    pub left: GradStats,
    pub right: GradStats,
}

/// Everything a grower needs for one tree
pub struct GrowContext<'a> {
    pub binned: &'a BinnedMatrix,
    pub mapper: &'a BinMapper,
    pub grad: &'a [f64],
    pub hess: &'a [f64],
    /// Features this round may split on
    pub features: &'a [usize],
    pub params: &'a BoostingParams,
}

impl GrowContext<'_> {
    pub fn totals(&self, rows: &[usize]) -> GradStats {
        let mut stats = GradStats::default();
        for &r in rows {
            stats.add(self.grad[r], self.hess[r]);
        }
        stats
    }

    /// Per-bin statistics of one feature over `rows`
    pub fn histogram(&self, feature: usize, rows: &[usize]) -> Vec<GradStats> {
        let mut hist = vec![GradStats::default(); self.mapper.n_bins(feature)];
        let column = self.binned.column(feature);
        for &r in rows {
            hist[column[r] as usize].add(self.grad[r], self.hess[r]);
        }
        hist
    }

    /// Newton step for a leaf, before shrinkage
    #[inline]
    pub fn leaf_value(&self, stats: &GradStats) -> f64 {
        if stats.count == 0 {
            return 0.0;
        }
        -stats.grad / (stats.hess + self.params.reg_lambda)
    }

    #[inline]
    fn structure_score(&self, stats: &GradStats) -> f64 {
        let denom = stats.hess + self.params.reg_lambda;
        if denom <= 0.0 {
            0.0
        } else {
            stats.grad * stats.grad / denom
        }
    }

    /// Loss reduction of splitting `parent` into `left` and `right`
    #[inline]
    pub fn split_gain(&self, parent: &GradStats, left: &GradStats, right: &GradStats) -> f64 {
        0.5 * (self.structure_score(left) + self.structure_score(right)
            - self.structure_score(parent))
    }

    fn child_allowed(&self, stats: &GradStats) -> bool {
        stats.count >= self.params.min_samples_leaf.max(1)
            && stats.hess >= self.params.min_child_weight
    }

    /// Best admissible split of a node, if any improves the loss
    pub fn best_split(&self, rows: &[usize], totals: &GradStats) -> Option<SplitCandidate> {
        let mut best: Option<SplitCandidate> = None;
        for &feature in self.features {
            let hist = self.histogram(feature, rows);
            let mut left = GradStats::default();
            for (bin, stats) in hist.iter().enumerate().take(hist.len().saturating_sub(1)) {
                left.merge(stats);
                let right = totals.minus(&left);
                if !self.child_allowed(&left) || !self.child_allowed(&right) {
                    continue;
                }
                let gain = self.split_gain(totals, &left, &right) - self.params.min_split_gain;
                if gain > 1e-12 && best.map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        bin: bin as u16,
                        gain,
                        left,
                        right,
                    });
                }
            }
        }
        best
    }

    /// Split `rows` on `(feature, bin)`
    pub fn partition(&self, rows: &[usize], feature: usize, bin: u16) -> (Vec<usize>, Vec<usize>) {
        let column = self.binned.column(feature);
        rows.iter().copied().partition(|&r| column[r] <= bin)
    }

    pub fn split_node(&self, feature: usize, bin: u16, gain: f64, left: usize, right: usize) -> TreeNode {
        TreeNode::Split {
            feature,
            bin,
            threshold: self.mapper.threshold(feature, bin as usize),
            gain,
            left,
            right,
        }
    }
}

/// A node of a [`RegressionTree`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        bin: u16,
        threshold: f32,
        gain: f64,
        left: usize,
        right: usize,
    },
}

/// Binary regression tree, root at index 0
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Single-leaf tree
    pub fn leaf(value: f64) -> Self {
        Self {
            nodes: vec![TreeNode::Leaf { value }],
        }
    }

    pub fn from_nodes(nodes: Vec<TreeNode>) -> Self {
        debug_assert!(!nodes.is_empty());
        Self { nodes }
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Evaluate on raw feature values
    pub fn predict(&self, sample: &[f32]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if sample[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Evaluate on a training row's bins
    pub fn predict_binned(&self, binned: &BinnedMatrix, row: usize) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    bin,
                    left,
                    right,
                    ..
                } => {
                    idx = if binned.column(*feature)[row] <= *bin { *left } else { *right };
                }
            }
        }
    }

    /// Multiply every leaf by `factor`
    pub fn scale(&mut self, factor: f64) {
        for node in &mut self.nodes {
            if let TreeNode::Leaf { value } = node {
                *value *= factor;
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match &nodes[idx] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        walk(&self.nodes, 0)
    }

    /// Add each split's gain to its feature
    pub fn accumulate_gain(&self, importance: &mut [f64]) {
        for node in &self.nodes {
            if let TreeNode::Split { feature, gain, .. } = node {
                importance[*feature] += *gain;
            }
        }
    }
}
