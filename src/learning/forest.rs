//! Multi-output random forest regression.
//!
//! Each tree is a CART regression tree grown on a bootstrap sample. Splits
//! minimise the summed squared error across all outputs, leaves hold the
//! per-output mean, and the forest prediction is the average over trees.
//!
//! Fitting is deterministic: the only randomness is the bootstrap draw,
//! seeded from [`ForestParams::seed`], and candidate splits are scanned in
//! feature order with ties resolved to the first candidate.

use crate::error::{ErgError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Hyperparameters for [`RandomForest::fit`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    /// Unlimited when unset
    #[serde(default)]
    pub max_depth: Option<usize>,

    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,

    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,

    #[serde(default = "default_true")]
    pub bootstrap: bool,

    #[serde(default)]
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: default_n_trees(),
            max_depth: None,
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            bootstrap: true,
            seed: 0,
        }
    }
}

fn default_n_trees() -> usize {
    100
}

fn default_min_samples_split() -> usize {
    2
}

fn default_min_samples_leaf() -> usize {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Regression tree stored as a flat node arena, root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn predict(&self, features: &[f64]) -> &[f64] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let x = features.get(*feature).copied().unwrap_or(0.0);
                    index = if x <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Check the arena is a tree of the given shape that `predict` can walk.
    ///
    /// Children must sit after their parent, so every path ends at a leaf.
    fn validate(&self, n_features: usize, n_outputs: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }

        let len = self.nodes.len();
        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { value } => {
                    if value.len() != n_outputs {
                        return Err(format!(
                            "leaf {} has {} outputs, expected {}",
                            index,
                            value.len(),
                            n_outputs
                        ));
                    }
                    if value.iter().any(|v| !v.is_finite()) {
                        return Err(format!("leaf {} holds a non-finite value", index));
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "split {} uses feature {} of {}",
                            index, feature, n_features
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("split {} has a non-finite threshold", index));
                    }
                    if [*left, *right].iter().any(|&c| c <= index || c >= len) {
                        return Err(format!(
                            "split {} points at nodes {} and {} of {}",
                            index, left, right, len
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match &nodes[index] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [Vec<f64>],
    params: &'a ForestParams,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    fn build(mut self, samples: Vec<usize>) -> RegressionTree {
        self.grow(samples, 0);
        RegressionTree { nodes: self.nodes }
    }

    /// Appends the subtree for `samples` and returns its root index
    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let index = self.nodes.len();
        let value = self.mean(&samples);
        self.nodes.push(Node::Leaf { value });

        let depth_exhausted = self.params.max_depth.is_some_and(|max| depth >= max);
        if depth_exhausted || samples.len() < self.params.min_samples_split.max(2) {
            return index;
        }

        let Some(split) = self.best_split(&samples) else {
            return index;
        };

        let left = self.grow(split.left, depth + 1);
        let right = self.grow(split.right, depth + 1);
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    fn mean(&self, samples: &[usize]) -> Vec<f64> {
        let outputs = self.y.first().map_or(0, Vec::len);
        let mut sum = vec![0.0; outputs];
        for &s in samples {
            for (acc, v) in sum.iter_mut().zip(&self.y[s]) {
                *acc += v;
            }
        }
        let n = samples.len().max(1) as f64;
        sum.iter().map(|v| v / n).collect()
    }

    /// Summed squared error around the mean, from running sums
    fn sse(sum: &[f64], sum_sq: &[f64], n: f64) -> f64 {
        sum.iter()
            .zip(sum_sq)
            .map(|(s, sq)| sq - s * s / n)
            .sum::<f64>()
    }

    fn best_split(&self, samples: &[usize]) -> Option<SplitCandidate> {
        let n_features = self.x.first().map_or(0, Vec::len);
        let outputs = self.y.first().map_or(0, Vec::len);
        let min_leaf = self.params.min_samples_leaf.max(1);

        let mut total_sum = vec![0.0; outputs];
        let mut total_sq = vec![0.0; outputs];
        for &s in samples {
            for (k, v) in self.y[s].iter().enumerate() {
                total_sum[k] += v;
                total_sq[k] += v * v;
            }
        }
        let parent_cost = Self::sse(&total_sum, &total_sq, samples.len() as f64);

        let mut best: Option<(usize, f64, f64)> = None;
        let mut order = samples.to_vec();

        for feature in 0..n_features {
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut left_sum = vec![0.0; outputs];
            let mut left_sq = vec![0.0; outputs];

            for i in 0..order.len() - 1 {
                let s = order[i];
                for (k, v) in self.y[s].iter().enumerate() {
                    left_sum[k] += v;
                    left_sq[k] += v * v;
                }

                let here = self.x[s][feature];
                let next = self.x[order[i + 1]][feature];
                if here == next {
                    continue;
                }

                let n_left = i + 1;
                let n_right = order.len() - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let right_sum: Vec<f64> =
                    total_sum.iter().zip(&left_sum).map(|(t, l)| t - l).collect();
                let right_sq: Vec<f64> =
                    total_sq.iter().zip(&left_sq).map(|(t, l)| t - l).collect();
                let cost = Self::sse(&left_sum, &left_sq, n_left as f64)
                    + Self::sse(&right_sum, &right_sq, n_right as f64);

                if best.map_or(true, |(_, _, c)| cost < c - 1e-12) {
                    best = Some((feature, (here + next) / 2.0, cost));
                }
            }
        }

        let (feature, threshold, cost) = best?;
        if cost >= parent_cost - 1e-12 {
            return None;
        }

        let (left, right) = samples
            .iter()
            .partition(|&&s| self.x[s][feature] <= threshold);

        Some(SplitCandidate {
            feature,
            threshold,
            left,
            right,
        })
    }
}

/// Averaged ensemble of regression trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    n_outputs: usize,
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    /// Fit on row-major features `x` and targets `y`
    pub fn fit(x: &[Vec<f64>], y: &[Vec<f64>], params: &ForestParams) -> Result<Self> {
        if x.is_empty() {
            return Err(ErgError::Other("cannot fit a forest on zero rows".to_string()));
        }
        if x.len() != y.len() {
            return Err(ErgError::Other(format!(
                "feature rows ({}) and target rows ({}) differ",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();
        let n_outputs = y[0].len();
        if x.iter().any(|r| r.len() != n_features) || y.iter().any(|r| r.len() != n_outputs) {
            return Err(ErgError::Other("ragged training matrix".to_string()));
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let n = x.len();
        let trees = (0..params.n_trees.max(1))
            .map(|_| {
                let samples: Vec<usize> = if params.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                TreeBuilder {
                    x,
                    y,
                    params,
                    nodes: Vec::new(),
                }
                .build(samples)
            })
            .collect();

        Ok(Self {
            params: params.clone(),
            n_features,
            n_outputs,
            trees,
        })
    }

    /// Mean prediction across trees
    pub fn predict(&self, features: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.n_outputs];
        for tree in &self.trees {
            for (acc, v) in out.iter_mut().zip(tree.predict(features)) {
                *acc += v;
            }
        }
        let n = self.trees.len().max(1) as f64;
        out.iter_mut().for_each(|v| *v /= n);
        out
    }

    /// Mean squared error over every output of every row
    pub fn mean_squared_error(&self, x: &[Vec<f64>], y: &[Vec<f64>]) -> f64 {
        let mut total = 0.0;
        let mut count = 0usize;
        for (features, target) in x.iter().zip(y) {
            for (p, t) in self.predict(features).iter().zip(target) {
                total += (p - t) * (p - t);
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            total / count as f64
        }
    }

    /// Structural check for forests that did not come from [`RandomForest::fit`]
    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(ErgError::Other("forest has no trees".to_string()));
        }
        if self.n_outputs == 0 {
            return Err(ErgError::Other("forest predicts no outputs".to_string()));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features, self.n_outputs)
                .map_err(|reason| ErgError::Other(format!("tree {}: {}", i, reason)))?;
        }
        Ok(())
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }
}
