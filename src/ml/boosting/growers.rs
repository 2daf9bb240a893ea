//! Tree growth strategies
//!
//! | Kind | Growth | Stops at |
//! |------|--------|----------|
//! | leaf-wise | split the leaf with the largest gain next | `num_leaves` |
//! | depth-wise | split every node level by level | `max_depth` |
//! | oblivious | one shared split per level (symmetric tree) | `depth` |

use std::fmt;

use super::params::{BoostingParams, ParamReader};
use super::tree::{GrowContext, RegressionTree, SplitCandidate, TreeNode};
use crate::error::Result;
use crate::ml::learner::LearnerKind;

/// A tree growth strategy, one per learner kind
pub trait TreeGrower: Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: LearnerKind;

    /// Parse shared and kind-specific hyperparameters
    fn configure(reader: &mut ParamReader<'_>, seed: u64) -> Result<(BoostingParams, Self)>;

    /// Fit one tree to the gradients of `rows`
    fn grow(&self, ctx: &GrowContext<'_>, rows: &[usize]) -> RegressionTree;
}

/// Keys every kind accepts but does not act on
const IGNORED_KEYS: &[&str] = &[
    "verbose",
    "verbosity",
    "silent",
    "n_jobs",
    "thread_count",
    "boosting_type",
    "allow_writing_files",
    "objective",
];

/// Shared hyperparameters over kind-specific defaults
fn read_common(
    reader: &mut ParamReader<'_>,
    defaults: BoostingParams,
) -> Result<BoostingParams> {
    let params = BoostingParams {
        n_estimators: reader.usize(
            &["n_estimators", "num_iterations", "num_boost_round", "iterations"],
            defaults.n_estimators,
        )?,
        learning_rate: reader.f64(&["learning_rate", "eta"], defaults.learning_rate)?,
        reg_lambda: reader.f64(
            &["reg_lambda", "lambda_l2", "lambda", "l2_leaf_reg"],
            defaults.reg_lambda,
        )?,
        min_split_gain: reader.f64(
            &["min_split_gain", "gamma", "min_split_loss"],
            defaults.min_split_gain,
        )?,
        min_child_weight: reader.f64(
            &["min_child_weight", "min_sum_hessian_in_leaf"],
            defaults.min_child_weight,
        )?,
        min_samples_leaf: reader.usize(
            &["min_child_samples", "min_data_in_leaf"],
            defaults.min_samples_leaf,
        )?,
        subsample: reader.f64(&["subsample", "bagging_fraction"], defaults.subsample)?,
        colsample: reader.f64(
            &["colsample_bytree", "feature_fraction", "rsm"],
            defaults.colsample,
        )?,
        max_bins: reader.usize(&["max_bin", "border_count"], defaults.max_bins)?,
        seed: reader.u64(&["random_state", "seed", "random_seed"], defaults.seed)?,
    };
    reader.ignore(IGNORED_KEYS);
    params.validate(reader)?;
    Ok(params)
}

/// Best-first growth bounded by a leaf budget
#[derive(Debug, Clone)]
pub struct LeafWiseGrower {
    pub num_leaves: usize,
    /// `None` means unbounded
    pub max_depth: Option<usize>,
}

impl TreeGrower for LeafWiseGrower {
    const KIND: LearnerKind = LearnerKind::LeafWise;

    fn configure(reader: &mut ParamReader<'_>, seed: u64) -> Result<(BoostingParams, Self)> {
        let params = read_common(
            reader,
            BoostingParams {
                n_estimators: 100,
                learning_rate: 0.1,
                reg_lambda: 0.0,
                min_child_weight: 1e-3,
                min_samples_leaf: 20,
                max_bins: 255,
                seed,
                ..Default::default()
            },
        )?;
        let num_leaves = reader.usize(&["num_leaves", "max_leaves"], 31)?;
        reader.ensure(num_leaves >= 2, "num_leaves", "must be at least 2")?;
        let max_depth = reader.i64(&["max_depth"], -1)?;
        let max_depth = (max_depth > 0).then_some(max_depth as usize);
        Ok((params, Self { num_leaves, max_depth }))
    }

    fn grow(&self, ctx: &GrowContext<'_>, rows: &[usize]) -> RegressionTree {
        struct Open {
            node: usize,
            rows: Vec<usize>,
            depth: usize,
            split: SplitCandidate,
        }

        let may_split = |depth: usize| self.max_depth.map_or(true, |max| depth < max);
        let open_leaf = |node: usize, rows: Vec<usize>, depth: usize| -> Option<Open> {
            if !may_split(depth) {
                return None;
            }
            let totals = ctx.totals(&rows);
            ctx.best_split(&rows, &totals).map(|split| Open {
                node,
                rows,
                depth,
                split,
            })
        };

        let totals = ctx.totals(rows);
        let mut nodes = vec![TreeNode::Leaf {
            value: ctx.leaf_value(&totals),
        }];
        let mut open: Vec<Open> = open_leaf(0, rows.to_vec(), 0).into_iter().collect();
        let mut n_leaves = 1;

        while n_leaves < self.num_leaves && !open.is_empty() {
            // Largest gain first; earliest opened wins ties
            let mut best = 0;
            for (i, candidate) in open.iter().enumerate().skip(1) {
                if candidate.split.gain > open[best].split.gain {
                    best = i;
                }
            }
            let leaf = open.remove(best);
            let split = leaf.split;
            let (left_rows, right_rows) = ctx.partition(&leaf.rows, split.feature, split.bin);

            let left = nodes.len();
            nodes.push(TreeNode::Leaf {
                value: ctx.leaf_value(&split.left),
            });
            let right = nodes.len();
            nodes.push(TreeNode::Leaf {
                value: ctx.leaf_value(&split.right),
            });
            nodes[leaf.node] = ctx.split_node(split.feature, split.bin, split.gain, left, right);
            n_leaves += 1;

            open.extend(open_leaf(left, left_rows, leaf.depth + 1));
            open.extend(open_leaf(right, right_rows, leaf.depth + 1));
        }

        RegressionTree::from_nodes(nodes)
    }
}

/// Level-by-level growth to a fixed depth
#[derive(Debug, Clone)]
pub struct DepthWiseGrower {
    pub max_depth: usize,
}

impl DepthWiseGrower {
    fn build(&self, ctx: &GrowContext<'_>, rows: &[usize], depth: usize, nodes: &mut Vec<TreeNode>) -> usize {
        let totals = ctx.totals(rows);
        let idx = nodes.len();
        nodes.push(TreeNode::Leaf {
            value: ctx.leaf_value(&totals),
        });
        if depth >= self.max_depth {
            return idx;
        }
        if let Some(split) = ctx.best_split(rows, &totals) {
            let (left_rows, right_rows) = ctx.partition(rows, split.feature, split.bin);
            let left = self.build(ctx, &left_rows, depth + 1, nodes);
            let right = self.build(ctx, &right_rows, depth + 1, nodes);
            nodes[idx] = ctx.split_node(split.feature, split.bin, split.gain, left, right);
        }
        idx
    }
}

impl TreeGrower for DepthWiseGrower {
    const KIND: LearnerKind = LearnerKind::DepthWise;

    fn configure(reader: &mut ParamReader<'_>, seed: u64) -> Result<(BoostingParams, Self)> {
        let params = read_common(
            reader,
            BoostingParams {
                n_estimators: 100,
                learning_rate: 0.3,
                reg_lambda: 1.0,
                min_child_weight: 1.0,
                min_samples_leaf: 1,
                max_bins: 256,
                seed,
                ..Default::default()
            },
        )?;
        let max_depth = reader.usize(&["max_depth"], 6)?;
        reader.ensure(max_depth >= 1, "max_depth", "must be at least 1")?;
        Ok((params, Self { max_depth }))
    }

    fn grow(&self, ctx: &GrowContext<'_>, rows: &[usize]) -> RegressionTree {
        let mut nodes = Vec::new();
        self.build(ctx, rows, 0, &mut nodes);
        RegressionTree::from_nodes(nodes)
    }
}

/// Symmetric trees: every node on a level shares one split
#[derive(Debug, Clone)]
pub struct ObliviousGrower {
    pub depth: usize,
}

/// Deepest symmetric tree accepted; 2^16 leaves
const MAX_OBLIVIOUS_DEPTH: usize = 16;

impl ObliviousGrower {
    /// Shared split maximising the summed gain over all current leaves
    fn best_level_split(&self, ctx: &GrowContext<'_>, leaves: &[Vec<usize>]) -> Option<(usize, u16, f64)> {
        let mut best: Option<(usize, u16, f64)> = None;
        for &feature in ctx.features {
            let n_bins = ctx.mapper.n_bins(feature);
            if n_bins < 2 {
                continue;
            }
            let mut level_gain = vec![0.0f64; n_bins - 1];
            for rows in leaves {
                if rows.is_empty() {
                    continue;
                }
                let totals = ctx.totals(rows);
                let hist = ctx.histogram(feature, rows);
                let mut left = super::tree::GradStats::default();
                for (bin, gain) in level_gain.iter_mut().enumerate() {
                    left.grad += hist[bin].grad;
                    left.hess += hist[bin].hess;
                    left.count += hist[bin].count;
                    let right = super::tree::GradStats {
                        grad: totals.grad - left.grad,
                        hess: totals.hess - left.hess,
                        count: totals.count - left.count,
                    };
                    *gain += ctx.split_gain(&totals, &left, &right);
                }
            }
            for (bin, &gain) in level_gain.iter().enumerate() {
                let gain = gain - ctx.params.min_split_gain;
                if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, bin as u16, gain));
                }
            }
        }
        best
    }
}

impl TreeGrower for ObliviousGrower {
    const KIND: LearnerKind = LearnerKind::Oblivious;

    fn configure(reader: &mut ParamReader<'_>, seed: u64) -> Result<(BoostingParams, Self)> {
        let params = read_common(
            reader,
            BoostingParams {
                n_estimators: 100,
                learning_rate: 0.1,
                reg_lambda: 3.0,
                min_child_weight: 0.0,
                min_samples_leaf: 1,
                max_bins: 254,
                seed,
                ..Default::default()
            },
        )?;
        let depth = reader.usize(&["depth", "max_depth"], 6)?;
        reader.ensure(
            (1..=MAX_OBLIVIOUS_DEPTH).contains(&depth),
            "depth",
            "must be between 1 and 16",
        )?;
        Ok((params, Self { depth }))
    }

    fn grow(&self, ctx: &GrowContext<'_>, rows: &[usize]) -> RegressionTree {
        let mut leaves: Vec<Vec<usize>> = vec![rows.to_vec()];
        let mut splits: Vec<(usize, u16, f64)> = Vec::with_capacity(self.depth);

        for _ in 0..self.depth {
            let Some((feature, bin, gain)) = self.best_level_split(ctx, &leaves) else {
                break;
            };
            leaves = leaves
                .iter()
                .flat_map(|rows| {
                    let (l, r) = ctx.partition(rows, feature, bin);
                    [l, r]
                })
                .collect();
            splits.push((feature, bin, gain));
        }

        let values: Vec<f64> = leaves.iter().map(|rows| ctx.leaf_value(&ctx.totals(rows))).collect();

        // Leaf i's path is the binary expansion of i, first level most significant
        fn emit(
            ctx: &GrowContext<'_>,
            splits: &[(usize, u16, f64)],
            values: &[f64],
            level: usize,
            leaf: usize,
            nodes: &mut Vec<TreeNode>,
        ) -> usize {
            let idx = nodes.len();
            if level == splits.len() {
                nodes.push(TreeNode::Leaf { value: values[leaf] });
                return idx;
            }
            nodes.push(TreeNode::Leaf { value: 0.0 });
            let (feature, bin, gain) = splits[level];
            // Report the level's gain once, on its first node
            let node_gain = if leaf == 0 { gain } else { 0.0 };
            let left = emit(ctx, splits, values, level + 1, leaf * 2, nodes);
            let right = emit(ctx, splits, values, level + 1, leaf * 2 + 1, nodes);
            nodes[idx] = ctx.split_node(feature, bin, node_gain, left, right);
            idx
        }

        let mut nodes = Vec::with_capacity((1 << (splits.len() + 1)) - 1);
        emit(ctx, &splits, &values, 0, 0, &mut nodes);
        RegressionTree::from_nodes(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{BinMapper, FeatureMatrix};
    use crate::ml::boosting::params::HyperParams;

    struct Fixture {
        mapper: BinMapper,
        binned: crate::dataset::BinnedMatrix,
        grad: Vec<f64>,
        hess: Vec<f64>,
        params: BoostingParams,
    }

    /// Two features; gradient depends on both quadrants
    fn fixture() -> Fixture {
        let mut rows = Vec::new();
        let mut grad = Vec::new();
        for i in 0..8 {
            for j in 0..8 {
                rows.push(vec![i as f32, j as f32]);
                let g = match (i < 4, j < 4) {
                    (true, true) => -1.0,
                    (true, false) => -0.5,
                    (false, true) => 0.5,
                    (false, false) => 1.0,
                };
                grad.push(g);
            }
        }
        let x = FeatureMatrix::from_rows(&rows).unwrap();
        let mapper = BinMapper::fit(&x, 255);
        let binned = mapper.transform(&x);
        let hess = vec![1.0; grad.len()];
        Fixture {
            mapper,
            binned,
            grad,
            hess,
            params: BoostingParams {
                reg_lambda: 0.0,
                ..Default::default()
            },
        }
    }

    fn grow_with<G: TreeGrower>(grower: &G, f: &Fixture) -> RegressionTree {
        let ctx = GrowContext {
            binned: &f.binned,
            mapper: &f.mapper,
            grad: &f.grad,
            hess: &f.hess,
            features: &[0, 1],
            params: &f.params,
        };
        let rows: Vec<usize> = (0..f.grad.len()).collect();
        grower.grow(&ctx, &rows)
    }

    #[test]
    fn test_leaf_wise_respects_leaf_budget() {
        let f = fixture();
        let tree = grow_with(&LeafWiseGrower { num_leaves: 3, max_depth: None }, &f);
        assert_eq!(tree.n_leaves(), 3);
    }

    #[test]
    fn test_depth_wise_fits_quadrants() {
        let f = fixture();
        let tree = grow_with(&DepthWiseGrower { max_depth: 2 }, &f);
        assert_eq!(tree.depth(), 2);
        // Leaf values are the negated mean gradient of each quadrant
        assert!((tree.predict(&[0.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!((tree.predict(&[7.0, 7.0]) + 1.0).abs() < 1e-9);
        assert!((tree.predict(&[0.0, 7.0]) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_oblivious_tree_is_symmetric() {
        let f = fixture();
        let tree = grow_with(&ObliviousGrower { depth: 2 }, &f);
        assert_eq!(tree.n_leaves(), 4);
        assert_eq!(tree.depth(), 2);
        assert!((tree.predict(&[7.0, 0.0]) + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_pure_node_is_not_split() {
        let mut f = fixture();
        f.grad = vec![0.25; f.grad.len()];
        let tree = grow_with(&DepthWiseGrower { max_depth: 4 }, &f);
        assert_eq!(tree.n_leaves(), 1);
        assert!((tree.predict(&[3.0, 3.0]) + 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_configure_reads_kind_keys() {
        let params: HyperParams =
            serde_json::from_value(serde_json::json!({"num_leaves": 8, "max_depth": 4})).unwrap();
        let mut reader = ParamReader::new("leaf", &params);
        let (_, grower) = LeafWiseGrower::configure(&mut reader, 0).unwrap();
        assert_eq!(grower.num_leaves, 8);
        assert_eq!(grower.max_depth, Some(4));

        let params: HyperParams = serde_json::from_value(serde_json::json!({"depth": 40})).unwrap();
        let mut reader = ParamReader::new("oblivious", &params);
        assert!(ObliviousGrower::configure(&mut reader, 0).is_err());
    }
}
