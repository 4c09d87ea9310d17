use crate::error::{ForecastError, ForecastResult};
use crate::features::TrainingExample;
use crate::math::{mean_indices, variance_indices};
use crate::{DEFAULT_MAX_DEPTH, DEFAULT_MIN_GAIN, DEFAULT_MIN_LEAF};
use itertools::Itertools;
use ordered_float::OrderedFloat;
use rayon::prelude::*;

/// Training parameters of the tree.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_leaf: usize,
    /// A best gain at or under this threshold means "no useful split".
    pub min_gain: f64,
}

impl Default for TreeParams {
    fn default() -> Self {
        TreeParams {
            max_depth: DEFAULT_MAX_DEPTH,
            min_leaf: DEFAULT_MIN_LEAF,
            min_gain: DEFAULT_MIN_GAIN,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LeafNode {
    pub value: f64,
    pub size: usize,
    pub depth: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SplitNode {
    pub feature: usize,
    pub threshold: f64,
    pub left: Box<Node>,
    pub right: Box<Node>,
    pub size: usize,
    pub depth: usize,
}

/// A node of the trained tree. The tree is built bottom-up by recursion
/// during training and never mutated afterwards; every child is owned by
/// exactly one parent.
///
/// Serializes as `{"kind": "leaf", ...}` / `{"kind": "split", ...}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Node {
    Leaf(LeafNode),
    Split(SplitNode),
}

impl Node {
    pub fn predict(&self, features: &[f64]) -> f64 {
        match self {
            Node::Split(split) => {
                if features[split.feature] <= split.threshold {
                    split.left.predict(features)
                } else {
                    split.right.predict(features)
                }
            }
            Node::Leaf(leaf) => leaf.value,
        }
    }

    pub fn num_splits(&self) -> usize {
        match self {
            Node::Leaf(_) => 0,
            Node::Split(split) => 1 + split.left.num_splits() + split.right.num_splits(),
        }
    }

    pub fn num_leaves(&self) -> usize {
        match self {
            Node::Leaf(_) => 1,
            Node::Split(split) => split.left.num_leaves() + split.right.num_leaves(),
        }
    }
}

/// A trained tree plus the feature width it is valid for. Using it on a
/// vector of any other width is an error, never a truncation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Model {
    pub root: Node,
    #[serde(rename = "featureWidth")]
    pub feature_width: usize,
}

impl Model {
    pub fn predict(&self, features: &[f64]) -> ForecastResult<f64> {
        if features.len() != self.feature_width {
            return Err(ForecastError::WidthMismatch {
                expected: self.feature_width,
                actual: features.len(),
            });
        }
        Ok(self.root.predict(features))
    }

    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> ForecastResult<Vec<f64>> {
        rows.par_iter().map(|row| self.predict(row)).collect()
    }
}

/// Store the result of a successful split on a node
struct SplitResult {
    feature: usize,
    threshold: f64,
    gain: f64,
    left_indices: Vec<usize>,
    right_indices: Vec<usize>,
}

/// Candidate thresholds for one feature: the values at the 10%..90%
/// decile positions of the distinct sorted values among the node's rows.
/// Identical positions collapse, so there are at most 9 candidates.
fn candidate_thresholds(examples: &[TrainingExample], indices: &[usize], feature: usize) -> Vec<f64> {
    let mut values: Vec<f64> = indices
        .iter()
        .map(|&i| examples[i].features[feature])
        .collect();
    values.sort_unstable_by_key(|&v| OrderedFloat(v));
    let distinct: Vec<f64> = values.into_iter().dedup().collect();
    if distinct.len() < 2 {
        return Vec::new();
    }
    let mut out: Vec<f64> = Vec::with_capacity(9);
    for decile in 1..10 {
        let val = distinct[decile * distinct.len() / 10];
        if out.last() != Some(&val) {
            out.push(val);
        }
    }
    out
}

/// Best candidate for one feature: (gain, threshold). Thresholds are
/// scanned in ascending order and only a strictly larger gain replaces the
/// current best, so ties keep the lowest threshold.
fn best_for_feature(
    examples: &[TrainingExample],
    labels: &[f64],
    indices: &[usize],
    parent_variance: f64,
    params: &TreeParams,
    feature: usize,
) -> Option<(f64, f64)> {
    let n = indices.len() as f64;
    let mut best: Option<(f64, f64)> = None;
    for threshold in candidate_thresholds(examples, indices, feature) {
        let mut left = Vec::new();
        let mut right = Vec::new();
        for &i in indices {
            if examples[i].features[feature] <= threshold {
                left.push(labels[i]);
            } else {
                right.push(labels[i]);
            }
        }
        if left.len() < params.min_leaf || right.len() < params.min_leaf {
            continue;
        }
        let gain = parent_variance
            - (left.len() as f64 / n) * crate::math::variance(&left)
            - (right.len() as f64 / n) * crate::math::variance(&right);
        match best {
            Some((best_gain, _)) if gain <= best_gain => {}
            _ => best = Some((gain, threshold)),
        }
    }
    best
}

/// The per-feature search runs in parallel; the reduction over features is
/// an ordered fold with a strict comparison, so equal gains resolve to the
/// lowest feature index and the tree is identical to a serial run.
fn best_split(
    examples: &[TrainingExample],
    labels: &[f64],
    indices: &[usize],
    params: &TreeParams,
) -> Option<SplitResult> {
    let width = examples[indices[0]].features.len();
    let parent_variance = variance_indices(labels, indices);

    let per_feature: Vec<Option<(f64, f64)>> = (0..width)
        .into_par_iter()
        .map(|feature| best_for_feature(examples, labels, indices, parent_variance, params, feature))
        .collect();

    let mut best: Option<(usize, f64, f64)> = None;
    for (feature, candidate) in per_feature.into_iter().enumerate() {
        if let Some((gain, threshold)) = candidate {
            match best {
                Some((_, best_gain, _)) if gain <= best_gain => {}
                _ => best = Some((feature, gain, threshold)),
            }
        }
    }
    let (feature, gain, threshold) = best?;

    let mut left_indices = Vec::new();
    let mut right_indices = Vec::new();
    for &i in indices {
        if examples[i].features[feature] <= threshold {
            left_indices.push(i);
        } else {
            right_indices.push(i);
        }
    }
    Some(SplitResult {
        feature,
        threshold,
        gain,
        left_indices,
        right_indices,
    })
}

fn build_node(
    examples: &[TrainingExample],
    labels: &[f64],
    indices: &[usize],
    depth: usize,
    params: &TreeParams,
) -> Node {
    macro_rules! return_leaf {
        () => {{
            return Node::Leaf(LeafNode {
                value: mean_indices(labels, indices),
                size: indices.len(),
                depth,
            });
        }};
    }

    // Stopping on size and depth is checked before any split search, so a
    // node never splits when it could equally stop.
    if indices.len() <= params.min_leaf || depth >= params.max_depth {
        return_leaf!();
    }

    let best = match best_split(examples, labels, indices, params) {
        Some(e) => e,
        None => return_leaf!(),
    };
    if best.gain <= params.min_gain {
        return_leaf!();
    }

    let left = Box::new(build_node(
        examples,
        labels,
        &best.left_indices,
        depth + 1,
        params,
    ));
    let right = Box::new(build_node(
        examples,
        labels,
        &best.right_indices,
        depth + 1,
        params,
    ));

    Node::Split(SplitNode {
        feature: best.feature,
        threshold: best.threshold,
        left,
        right,
        size: indices.len(),
        depth,
    })
}

/// Train a tree by recursive variance-reduction splitting.
///
/// Fewer than `2 * min_leaf` examples still yield a valid single-leaf
/// model; the caller is expected to enforce its own floor before this.
pub fn train(examples: &[TrainingExample], params: &TreeParams) -> Model {
    let feature_width = examples
        .first()
        .map(|e| e.features.len())
        .unwrap_or(0);
    if examples.is_empty() {
        // A tree over no rows predicts zero.
        return Model {
            root: Node::Leaf(LeafNode {
                value: 0.,
                size: 0,
                depth: 0,
            }),
            feature_width,
        };
    }
    let labels: Vec<f64> = examples.iter().map(|e| e.label).collect();
    let indices: Vec<usize> = (0..examples.len()).collect();
    let root = build_node(examples, &labels, &indices, 0, params);
    Model {
        root,
        feature_width,
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    fn example(features: Vec<f64>, label: f64) -> TrainingExample {
        TrainingExample { features, label }
    }

    /// Two clusters on feature 0 with distinct labels, plus a noise feature.
    fn two_cluster_examples(n: usize) -> Vec<TrainingExample> {
        (0..n)
            .map(|i| {
                let noise = ((i * 13) % 7) as f64 / 7.;
                if i % 2 == 0 {
                    example(vec![1., noise], 10.)
                } else {
                    example(vec![5., noise], 20.)
                }
            })
            .collect()
    }

    fn leaf_paths(node: &Node, features: &[f64], path: &mut String) {
        if let Node::Split(split) = node {
            if features[split.feature] <= split.threshold {
                path.push('L');
                leaf_paths(&split.left, features, path);
            } else {
                path.push('R');
                leaf_paths(&split.right, features, path);
            }
        }
    }

    fn leaf_value(node: &Node, features: &[f64]) -> (f64, usize) {
        match node {
            Node::Leaf(leaf) => (leaf.value, leaf.size),
            Node::Split(split) => {
                if features[split.feature] <= split.threshold {
                    leaf_value(&split.left, features)
                } else {
                    leaf_value(&split.right, features)
                }
            }
        }
    }

    #[test]
    fn test_learns_two_clusters() {
        let examples = two_cluster_examples(40);
        let model = train(&examples, &TreeParams::default());
        assert!(model.root.num_splits() >= 1);
        assert_eq!(model.predict(&[1., 0.5]).unwrap(), 10.);
        assert_eq!(model.predict(&[5., 0.5]).unwrap(), 20.);
    }

    #[test]
    fn test_determinism() {
        let examples = two_cluster_examples(60);
        let params = TreeParams::default();
        let one = train(&examples, &params);
        let two = train(&examples, &params);
        assert_eq!(one, two);
    }

    #[test]
    fn test_leaf_mean_property() {
        // Noisy labels so every leaf mixes several distinct values.
        let examples: Vec<TrainingExample> = (0..50)
            .map(|i| {
                let x = (i % 10) as f64;
                let y = ((i * 17) % 13) as f64 / 13.;
                example(vec![x, y], x * 2. + y)
            })
            .collect();
        let model = train(&examples, &TreeParams::default());

        // Re-partition the training set along root-to-leaf paths and check
        // every leaf value is the exact mean of the labels reaching it.
        use std::collections::HashMap;
        let mut groups: HashMap<String, (Vec<f64>, Vec<f64>)> = HashMap::new();
        for e in &examples {
            let mut path = String::new();
            leaf_paths(&model.root, &e.features, &mut path);
            let entry = groups
                .entry(path)
                .or_insert_with(|| (Vec::new(), e.features.clone()));
            entry.0.push(e.label);
        }
        assert!(groups.len() > 1);
        for (_, (labels, member)) in &groups {
            let (value, size) = leaf_value(&model.root, member);
            assert_eq!(size, labels.len());
            assert!((value - mean(labels)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_monotonic_stopping() {
        let examples: Vec<TrainingExample> = (0..80)
            .map(|i| {
                let x = (i % 16) as f64;
                example(vec![x, ((i * 7) % 5) as f64], x.powi(2))
            })
            .collect();
        let splits = |max_depth: usize, min_leaf: usize| {
            let params = TreeParams {
                max_depth,
                min_leaf,
                min_gain: DEFAULT_MIN_GAIN,
            };
            train(&examples, &params).root.num_splits()
        };
        assert!(splits(4, 16) <= splits(4, 8));
        assert!(splits(2, 8) <= splits(4, 8));
        assert!(splits(1, 8) <= splits(2, 8));
    }

    #[test]
    fn test_predict_idempotent_and_batch() {
        let examples = two_cluster_examples(40);
        let model = train(&examples, &TreeParams::default());
        let rows: Vec<Vec<f64>> = examples.iter().map(|e| e.features.clone()).collect();
        let batch = model.predict_batch(&rows).unwrap();
        for (row, &expected) in rows.iter().zip(batch.iter()) {
            assert_eq!(model.predict(row).unwrap(), expected);
            assert_eq!(model.predict(row).unwrap(), model.predict(row).unwrap());
        }
    }

    #[test]
    fn test_width_mismatch() {
        let examples = two_cluster_examples(40);
        let model = train(&examples, &TreeParams::default());
        match model.predict(&[1.]) {
            Err(ForecastError::WidthMismatch { expected: 2, actual: 1 }) => {}
            other => panic!("expected WidthMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_constant_labels_give_single_leaf() {
        let examples: Vec<TrainingExample> = (0..30)
            .map(|i| example(vec![i as f64, (i * i) as f64], 42.))
            .collect();
        let params = TreeParams {
            max_depth: 10,
            min_leaf: 1,
            min_gain: DEFAULT_MIN_GAIN,
        };
        let model = train(&examples, &params);
        match &model.root {
            Node::Leaf(leaf) => {
                assert_eq!(leaf.value, 42.);
                assert_eq!(leaf.size, 30);
                assert_eq!(leaf.depth, 0);
            }
            other => panic!("expected a single leaf, got {:?}", other),
        }
        assert_eq!(model.predict(&[123., -7.]).unwrap(), 42.);
    }

    #[test]
    fn test_small_input_degenerates_to_leaf() {
        let examples = two_cluster_examples(10);
        // 10 < 2 * min_leaf: nothing can be split.
        let model = train(&examples, &TreeParams::default());
        assert_eq!(model.root.num_splits(), 0);
        assert_eq!(model.feature_width, 2);
    }

    #[test]
    fn test_tie_breaks_prefer_lowest_feature() {
        // Feature 1 duplicates feature 0, so every split gain exists twice.
        let examples: Vec<TrainingExample> = (0..20)
            .map(|i| {
                let x = if i % 2 == 0 { 1. } else { 5. };
                example(vec![x, x], if i % 2 == 0 { 0. } else { 1. })
            })
            .collect();
        let params = TreeParams {
            max_depth: 4,
            min_leaf: 2,
            min_gain: DEFAULT_MIN_GAIN,
        };
        let model = train(&examples, &params);
        match &model.root {
            Node::Split(split) => assert_eq!(split.feature, 0),
            other => panic!("expected a split, got {:?}", other),
        }
    }

    #[test]
    fn test_model_serialization_format() {
        let examples = two_cluster_examples(40);
        let model = train(&examples, &TreeParams::default());
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["featureWidth"], 2);
        assert_eq!(json["root"]["kind"], "split");
        let leaf = &json["root"]["left"];
        assert!(leaf["kind"] == "leaf" || leaf["kind"] == "split");

        let back: Model = serde_json::from_value(json).unwrap();
        assert_eq!(back, model);
    }
}
