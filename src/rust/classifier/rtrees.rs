//! Random forest of Gini CART trees.

use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{
    check_prediction_input, check_training_input, distinct_labels, ClassifierError,
    ClassifierKind, StatModel,
};

/// Random forest hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RTreesParams {
    /// Features sampled at every node. 0 means the square root of the
    /// feature count.
    pub active_vars: usize,
    /// Maximum number of trees.
    pub max_trees: usize,
    /// Stop adding trees once the out-of-bag error is at most this value.
    pub oob_epsilon: f32,
    pub max_depth: usize,
    /// Nodes with fewer samples become leaves.
    pub min_samples_split: usize,
}

impl Default for RTreesParams {
    fn default() -> Self {
        Self {
            active_vars: 0,
            max_trees: 50,
            oob_epsilon: 0.1,
            max_depth: 10,
            min_samples_split: 2,
        }
    }
}

impl RTreesParams {
    fn validate(&self) -> Result<(), ClassifierError> {
        if self.max_trees == 0 {
            return Err(ClassifierError::InvalidParams("T must be at least 1".to_string()));
        }
        if !(self.oob_epsilon >= 0.0 && self.oob_epsilon.is_finite()) {
            return Err(ClassifierError::InvalidParams(format!(
                "E must be a non-negative number, got {}",
                self.oob_epsilon
            )));
        }
        if self.max_depth == 0 {
            return Err(ClassifierError::InvalidParams("max depth must be at least 1".to_string()));
        }
        Ok(())
    }

    fn active_vars_for(&self, features: usize) -> usize {
        let wanted = if self.active_vars == 0 {
            (features as f64).sqrt().round() as usize
        } else {
            self.active_vars
        };
        wanted.clamp(1, features)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        class: usize,
    },
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
}

/// One tree stored as a flat node list; node 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Children always come after their parent, so a valid tree has no
    /// cycles and every walk ends on a leaf.
    fn validate(&self, features: usize, classes: usize) -> Result<(), ClassifierError> {
        if self.nodes.is_empty() {
            return Err(ClassifierError::Corrupt("empty tree".to_string()));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Leaf { class } if class >= classes => {
                    return Err(ClassifierError::Corrupt(format!(
                        "leaf {index} votes for class {class} of {classes}"
                    )));
                }
                Node::Leaf { .. } => {}
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    if feature >= features {
                        return Err(ClassifierError::Corrupt(format!(
                            "node {index} splits on feature {feature} of {features}"
                        )));
                    }
                    for child in [left, right] {
                        if child <= index || child >= self.nodes.len() {
                            return Err(ClassifierError::Corrupt(format!(
                                "node {index} points to node {child} of {}",
                                self.nodes.len()
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn predict(&self, sample: ArrayView1<f32>) -> usize {
        let mut current = 0;
        loop {
            match self.nodes[current] {
                Node::Leaf { class } => return class,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    current = if sample[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

struct TreeBuilder<'s, 'b> {
    samples: ArrayView2<'s, f32>,
    targets: &'b [usize],
    n_classes: usize,
    active_vars: usize,
    params: &'b RTreesParams,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_, '_> {
    fn grow(&mut self, rows: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let counts = self.class_counts(&rows);
        let majority = argmax(&counts);
        let node = self.nodes.len();
        self.nodes.push(Node::Leaf { class: majority });

        if depth >= self.params.max_depth
            || rows.len() < self.params.min_samples_split.max(2)
            || counts[majority] == rows.len()
        {
            return node;
        }
        let Some((feature, threshold)) = self.best_split(&rows, gini(&counts, rows.len()), rng) else {
            return node;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&row| self.samples[[row, feature]] <= threshold);
        let left = self.grow(left_rows, depth + 1, rng);
        let right = self.grow(right_rows, depth + 1, rng);
        self.nodes[node] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        node
    }

    /// Returns the (feature, threshold) pair with the lowest weighted Gini
    /// impurity among randomly drawn features, if any split improves on
    /// `parent_impurity`.
    fn best_split(&self, rows: &[usize], parent_impurity: f64, rng: &mut StdRng) -> Option<(usize, f32)> {
        let total = rows.len();
        let mut best: Option<(f64, usize, f32)> = None;

        for feature in index::sample(rng, self.samples.ncols(), self.active_vars).into_iter() {
            let mut column: Vec<(f32, usize)> = rows
                .iter()
                .map(|&row| (self.samples[[row, feature]], self.targets[row]))
                .collect();
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = vec![0usize; self.n_classes];
            let mut right = self.class_counts(rows);
            for position in 0..total - 1 {
                let (value, class) = column[position];
                left[class] += 1;
                right[class] -= 1;
                let next = column[position + 1].0;
                if value == next {
                    continue;
                }
                let left_len = position + 1;
                let right_len = total - left_len;
                let impurity = (left_len as f64 * gini(&left, left_len)
                    + right_len as f64 * gini(&right, right_len))
                    / total as f64;
                if best.map_or(true, |(lowest, _, _)| impurity < lowest) {
                    let middle = value + (next - value) / 2.0;
                    let threshold = if middle < next { middle } else { value };
                    best = Some((impurity, feature, threshold));
                }
            }
        }

        best.filter(|(impurity, _, _)| *impurity < parent_impurity)
            .map(|(_, feature, threshold)| (feature, threshold))
    }

    fn class_counts(&self, rows: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &row in rows {
            counts[self.targets[row]] += 1;
        }
        counts
    }
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&count| {
            let p = count as f64 / total;
            p * p
        })
        .sum::<f64>()
}

/// Index of the largest count, the lowest index on ties.
fn argmax(counts: &[usize]) -> usize {
    counts
        .iter()
        .enumerate()
        .fold((0, 0), |best, (index, &count)| {
            if count > best.1 {
                (index, count)
            } else {
                best
            }
        })
        .0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Forest {
    classes: Vec<i32>,
    features: usize,
    trees: Vec<Tree>,
    oob_error: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RTrees {
    params: RTreesParams,
    seed: u64,
    forest: Option<Forest>,
}

impl RTrees {
    pub fn new(params: RTreesParams, seed: u64) -> Result<Self, ClassifierError> {
        params.validate()?;
        Ok(Self {
            params,
            seed,
            forest: None,
        })
    }

    pub fn params(&self) -> &RTreesParams {
        &self.params
    }

    pub fn tree_count(&self) -> usize {
        self.forest.as_ref().map_or(0, |forest| forest.trees.len())
    }

    /// Out-of-bag error of the trained forest, when any sample was left out
    /// of at least one bootstrap.
    pub fn oob_error(&self) -> Option<f32> {
        self.forest.as_ref().and_then(|forest| forest.oob_error)
    }
}

impl StatModel for RTrees {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::RTrees
    }

    fn train(&mut self, samples: ArrayView2<f32>, labels: ArrayView1<i32>) -> Result<(), ClassifierError> {
        check_training_input(samples, labels)?;
        let n = samples.nrows();
        let classes = distinct_labels(labels);
        let targets: Vec<usize> = labels
            .iter()
            .map(|label| classes.iter().position(|class| class == label).unwrap_or(0))
            .collect();
        let active_vars = self.params.active_vars_for(samples.ncols());
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut trees = Vec::new();
        let mut oob_votes = Array2::<u32>::zeros((n, classes.len()));
        let mut oob_error = None;
        while trees.len() < self.params.max_trees {
            let mut in_bag = vec![false; n];
            let bootstrap: Vec<usize> = (0..n)
                .map(|_| {
                    let row = rng.gen_range(0..n);
                    in_bag[row] = true;
                    row
                })
                .collect();

            let mut builder = TreeBuilder {
                samples: samples.view(),
                targets: &targets,
                n_classes: classes.len(),
                active_vars,
                params: &self.params,
                nodes: Vec::new(),
            };
            builder.grow(bootstrap, 0, &mut rng);
            let tree = Tree {
                nodes: builder.nodes,
            };

            for row in (0..n).filter(|&row| !in_bag[row]) {
                oob_votes[[row, tree.predict(samples.row(row))]] += 1;
            }
            trees.push(tree);

            let (mut voted, mut wrong) = (0usize, 0usize);
            for (row, votes) in oob_votes.outer_iter().enumerate() {
                let votes = votes.to_vec();
                if votes.iter().any(|&count| count > 0) {
                    voted += 1;
                    if argmax_u32(&votes) != targets[row] {
                        wrong += 1;
                    }
                }
            }
            if voted > 0 {
                let error = wrong as f32 / voted as f32;
                oob_error = Some(error);
                if error <= self.params.oob_epsilon {
                    break;
                }
            }
        }

        debug!(
            "Random forest grew {} trees, out-of-bag error {:?}",
            trees.len(),
            oob_error
        );
        self.forest = Some(Forest {
            classes,
            features: samples.ncols(),
            trees,
            oob_error,
        });
        Ok(())
    }

    fn is_trained(&self) -> bool {
        self.forest
            .as_ref()
            .is_some_and(|forest| !forest.trees.is_empty())
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        self.params
            .validate()
            .map_err(|err| ClassifierError::Corrupt(err.to_string()))?;
        let Some(forest) = &self.forest else {
            return Ok(());
        };
        if forest.classes.is_empty() || forest.features == 0 {
            return Err(ClassifierError::Corrupt(
                "forest has no classes or no features".to_string(),
            ));
        }
        for tree in &forest.trees {
            tree.validate(forest.features, forest.classes.len())?;
        }
        Ok(())
    }

    fn predict(&self, samples: ArrayView2<f32>) -> Result<Array1<i32>, ClassifierError> {
        let forest = self.forest.as_ref().ok_or(ClassifierError::NotTrained)?;
        check_prediction_input(samples, forest.features)?;
        Ok(samples
            .outer_iter()
            .map(|row| {
                let mut votes = vec![0u32; forest.classes.len()];
                for tree in &forest.trees {
                    votes[tree.predict(row)] += 1;
                }
                forest.classes[argmax_u32(&votes)]
            })
            .collect())
    }

    fn describe(&self) -> String {
        format!("RTrees classifier with {} trees", self.tree_count())
    }

    fn to_blob(&self) -> Result<serde_json::Value, ClassifierError> {
        serde_json::to_value(self).map_err(ClassifierError::Encode)
    }
}

fn argmax_u32(votes: &[u32]) -> usize {
    argmax(&votes.iter().map(|&v| v as usize).collect::<Vec<_>>())
}
