//! Decision tree implementation

use super::{Estimator, ModelSchema, TaskType};
use crate::error::{PmmlError, Result};
use crate::export::{Node, Operator, PMMLModel, ScoreDistribution, TreeModel, TreePredicate};
use crate::preprocessing::Feature;
use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf {
        value: f64,
        n_samples: usize,
        class_counts: Vec<usize>,
    },
    /// Internal node with split; samples with `x <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        value: f64,
        n_samples: usize,
        class_counts: Vec<usize>,
        impurity: f64,
    },
}

impl TreeNode {
    /// Class index (classification) or mean target (regression)
    pub fn value(&self) -> f64 {
        match self {
            TreeNode::Leaf { value, .. } | TreeNode::Split { value, .. } => *value,
        }
    }

    pub fn n_samples(&self) -> usize {
        match self {
            TreeNode::Leaf { n_samples, .. } | TreeNode::Split { n_samples, .. } => *n_samples,
        }
    }

    /// Training samples per class reaching this node; empty for regression
    pub fn class_counts(&self) -> &[usize] {
        match self {
            TreeNode::Leaf { class_counts, .. } | TreeNode::Split { class_counts, .. } => class_counts,
        }
    }

    /// Class frequencies at this node
    pub fn probabilities(&self) -> Vec<f64> {
        let n = self.n_samples() as f64;
        self.class_counts().iter().map(|&c| c as f64 / n).collect()
    }

    /// Leaf reached by a sample
    pub fn leaf_for(&self, sample: ArrayView1<'_, f64>) -> &TreeNode {
        let mut node = self;
        while let TreeNode::Split { feature_idx, threshold, left, right, .. } = node {
            node = if sample[*feature_idx] <= *threshold { left } else { right };
        }
        node
    }
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Entropy (classification)
    Entropy,
    /// Mean squared error (regression)
    #[serde(alias = "squared_error")]
    MSE,
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Criterion::Gini => write!(f, "gini"),
            Criterion::Entropy => write!(f, "entropy"),
            Criterion::MSE => write!(f, "mse"),
        }
    }
}

/// Running target statistics of one side of a split
#[derive(Debug, Clone)]
struct SplitStats {
    count: usize,
    sum: f64,
    sq_sum: f64,
    class_counts: Vec<f64>,
}

impl SplitStats {
    fn empty(n_classes: usize) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sq_sum: 0.0,
            class_counts: vec![0.0; n_classes],
        }
    }

    fn push(&mut self, yi: f64, classification: bool) {
        self.count += 1;
        if classification {
            self.class_counts[yi as usize] += 1.0;
        } else {
            self.sum += yi;
            self.sq_sum += yi * yi;
        }
    }

    fn remove(&mut self, yi: f64, classification: bool) {
        self.count -= 1;
        if classification {
            self.class_counts[yi as usize] -= 1.0;
        } else {
            self.sum -= yi;
            self.sq_sum -= yi * yi;
        }
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        match criterion {
            Criterion::Gini => {
                1.0 - self.class_counts.iter().map(|&c| (c / n).powi(2)).sum::<f64>()
            }
            Criterion::Entropy => -self
                .class_counts
                .iter()
                .filter(|&&c| c > 0.0)
                .map(|&c| {
                    let p = c / n;
                    p * p.ln()
                })
                .sum::<f64>(),
            // Var = E[X²] - E[X]²
            Criterion::MSE => (self.sq_sum / n - (self.sum / n).powi(2)).max(0.0),
        }
    }
}

/// Best split of a node: (feature, threshold, impurity decrease)
type SplitCandidate = (usize, f64, f64);

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features drawn at random for each split (all when None)
    pub max_features: Option<usize>,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Seed for feature sampling
    pub random_state: Option<u64>,
    /// Number of features
    n_features: usize,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Is classification task
    is_classification: bool,
    /// Number of classes (for classification)
    n_classes: usize,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            feature_importances: None,
            is_classification: true,
            n_classes: 0,
        }
    }

    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::MSE,
            is_classification: false,
            ..Self::new_classifier()
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Set number of features considered per split
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Declare the number of classes, for samples that miss some of them
    pub fn with_n_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = n_classes;
        self
    }

    pub fn is_classification(&self) -> bool {
        self.is_classification
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    fn validate_params(&self) -> Result<()> {
        if self.min_samples_split < 2 {
            return Err(PmmlError::InvalidParameter {
                name: "min_samples_split".to_string(),
                value: self.min_samples_split.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        if self.min_samples_leaf < 1 {
            return Err(PmmlError::InvalidParameter {
                name: "min_samples_leaf".to_string(),
                value: self.min_samples_leaf.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let classification_criterion = matches!(self.criterion, Criterion::Gini | Criterion::Entropy);
        if classification_criterion != self.is_classification {
            return Err(PmmlError::InvalidParameter {
                name: "criterion".to_string(),
                value: self.criterion.to_string(),
                reason: "does not match the task".to_string(),
            });
        }
        Ok(())
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        self.validate_params()?;

        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(PmmlError::EstimatorFitError(format!(
                "x has {} rows but y has {} values",
                n_samples,
                y.len()
            )));
        }
        if n_samples == 0 {
            return Err(PmmlError::EstimatorFitError("no training samples".to_string()));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(PmmlError::EstimatorFitError("feature matrix has non-finite values".to_string()));
        }

        if self.is_classification {
            if y.iter().any(|v| *v < 0.0 || v.fract() != 0.0 || !v.is_finite()) {
                return Err(PmmlError::EstimatorFitError(
                    "classification targets must be class indices".to_string(),
                ));
            }
            let max_class = y.iter().fold(0.0f64, |acc, &v| acc.max(v)) as usize;
            self.n_classes = self.n_classes.max(max_class + 1);
        } else if y.iter().any(|v| !v.is_finite()) {
            return Err(PmmlError::EstimatorFitError("regression target has non-finite values".to_string()));
        }

        self.n_features = n_features;

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(42));
        let mut importances = vec![0.0; n_features];

        // Build tree recursively
        let indices: Vec<usize> = (0..n_samples).collect();
        let root = self.build_tree(x, y, indices, 0, &mut importances, &mut rng);
        self.root = Some(root);

        // Normalize feature importances
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn node_stats(&self, y: &Array1<f64>, indices: &[usize]) -> SplitStats {
        let mut stats = SplitStats::empty(if self.is_classification { self.n_classes } else { 0 });
        for &i in indices {
            stats.push(y[i], self.is_classification);
        }
        stats
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: Vec<usize>,
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let stats = self.node_stats(y, &indices);
        let class_counts: Vec<usize> = stats.class_counts.iter().map(|&c| c as usize).collect();
        let value = if self.is_classification {
            argmax(&stats.class_counts) as f64
        } else {
            stats.sum / n_samples as f64
        };

        // Check stopping conditions
        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || self.is_pure(y, &indices, &stats);

        let leaf = |class_counts: Vec<usize>| TreeNode::Leaf {
            value,
            n_samples,
            class_counts,
        };

        if should_stop {
            return leaf(class_counts);
        }

        let parent_impurity = stats.impurity(self.criterion);
        let Some((feature_idx, threshold, gain)) = self.find_best_split(x, y, &indices, &stats, parent_impurity, rng)
        else {
            return leaf(class_counts);
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) =
            indices.into_iter().partition(|&i| x[[i, feature_idx]] <= threshold);

        if left_indices.is_empty() || right_indices.is_empty() {
            return leaf(class_counts);
        }

        importances[feature_idx] += n_samples as f64 * gain;

        // Build children recursively
        let left = Box::new(self.build_tree(x, y, left_indices, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(x, y, right_indices, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            value,
            n_samples,
            class_counts,
            impurity: parent_impurity,
        }
    }

    fn is_pure(&self, y: &Array1<f64>, indices: &[usize], stats: &SplitStats) -> bool {
        if self.is_classification {
            return stats.class_counts.iter().filter(|&&c| c > 0.0).count() <= 1;
        }
        let first = y[indices[0]];
        indices.iter().all(|&i| y[i] == first)
    }

    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        parent: &SplitStats,
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitCandidate> {
        let n_features = x.ncols();
        let candidates: Vec<usize> = match self.max_features {
            Some(k) if k < n_features => {
                let mut drawn = rand::seq::index::sample(rng, n_features, k.max(1)).into_vec();
                drawn.sort_unstable();
                drawn
            }
            _ => (0..n_features).collect(),
        };

        // Each feature finds its best threshold independently
        let feature_results: Vec<Option<SplitCandidate>> = candidates
            .par_iter()
            .map(|&feature_idx| self.best_threshold(x, y, indices, parent, parent_impurity, feature_idx))
            .collect();

        // Ties go to the earliest feature
        let mut best: Option<SplitCandidate> = None;
        for candidate in feature_results.into_iter().flatten() {
            if best.map_or(true, |b| candidate.2 > b.2) {
                best = Some(candidate);
            }
        }
        best
    }

    /// Sweep the sorted feature values, moving one sample at a time from
    /// the right side to the left side.
    fn best_threshold(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        parent: &SplitStats,
        parent_impurity: f64,
        feature_idx: usize,
    ) -> Option<SplitCandidate> {
        let mut order: Vec<(f64, usize)> = indices.iter().map(|&i| (x[[i, feature_idx]], i)).collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = order.len();
        let mut left = SplitStats::empty(parent.class_counts.len());
        let mut right = parent.clone();
        let mut best_gain = 0.0f64;
        let mut best_threshold = None;

        for pos in 0..n - 1 {
            let (value, idx) = order[pos];
            left.push(y[idx], self.is_classification);
            right.remove(y[idx], self.is_classification);

            let next = order[pos + 1].0;
            if value >= next {
                continue;
            }
            if left.count < self.min_samples_leaf || right.count < self.min_samples_leaf {
                continue;
            }

            let weighted_impurity = (left.count as f64 * left.impurity(self.criterion)
                + right.count as f64 * right.impurity(self.criterion))
                / n as f64;

            let gain = parent_impurity - weighted_impurity;
            if gain > best_gain {
                best_gain = gain;
                best_threshold = Some(midpoint(value, next));
            }
        }

        best_threshold.map(|threshold| (feature_idx, threshold, best_gain))
    }

    /// Make predictions: class index or regression value per row
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(PmmlError::ModelNotFitted)?;
        self.check_width(x)?;

        Ok(x.outer_iter().map(|row| root.leaf_for(row).value()).collect())
    }

    /// Leaf class frequencies per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let root = self.root.as_ref().ok_or(PmmlError::ModelNotFitted)?;
        if !self.is_classification {
            return Err(PmmlError::UnsupportedError("predict_proba on a regression tree".to_string()));
        }
        self.check_width(x)?;

        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.outer_iter().enumerate() {
            for (c, p) in root.leaf_for(row).probabilities().into_iter().enumerate() {
                proba[[i, c]] = p;
            }
        }
        Ok(proba)
    }

    fn check_width(&self, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != self.n_features {
            return Err(PmmlError::EvaluationError(format!(
                "expected {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        Ok(())
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        match &self.root {
            None => 0,
            Some(node) => Self::node_depth(node),
        }
    }

    fn node_depth(node: &TreeNode) -> usize {
        match node {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => 1 + Self::node_depth(left).max(Self::node_depth(right)),
        }
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        match &self.root {
            None => 0,
            Some(node) => Self::count_leaves(node),
        }
    }

    fn count_leaves(node: &TreeNode) -> usize {
        match node {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => Self::count_leaves(left) + Self::count_leaves(right),
        }
    }

    /// Express the fitted tree as a PMML `TreeModel`
    pub fn to_tree_model(&self, schema: &ModelSchema, with_output: bool) -> Result<TreeModel> {
        let root = self.root.as_ref().ok_or(PmmlError::ModelNotFitted)?;

        if schema.features.len() != self.n_features {
            return Err(PmmlError::SerializationError(format!(
                "tree uses {} features but the schema lists {}",
                self.n_features,
                schema.features.len()
            )));
        }
        if self.is_classification && schema.classes.len() < self.n_classes {
            return Err(PmmlError::SerializationError(format!(
                "tree has {} classes but the schema lists {}",
                self.n_classes,
                schema.classes.len()
            )));
        }

        let mut next_id = 1;
        let root = self.encode_node(root, TreePredicate::True, schema, &mut next_id);
        let task = if self.is_classification { TaskType::Classification } else { TaskType::Regression };

        Ok(TreeModel {
            model_name: None,
            function: task.mining_function(),
            algorithm_name: None,
            split_characteristic: "binarySplit".to_string(),
            no_true_child_strategy: Some("returnLastPrediction".to_string()),
            mining_schema: schema.mining_schema(),
            output: if with_output { schema.output() } else { Vec::new() },
            root,
        })
    }

    fn encode_node(&self, node: &TreeNode, predicate: TreePredicate, schema: &ModelSchema, next_id: &mut usize) -> Node {
        let id = if schema.compact {
            None
        } else {
            let id = next_id.to_string();
            *next_id += 1;
            Some(id)
        };

        let is_leaf = matches!(node, TreeNode::Leaf { .. });
        let scored = is_leaf || !schema.compact;

        let score = scored.then(|| {
            if self.is_classification {
                schema.classes[node.value() as usize].clone()
            } else {
                node.value().to_string()
            }
        });

        let score_distributions = if scored && self.is_classification {
            node.class_counts()
                .iter()
                .zip(node.probabilities())
                .enumerate()
                .map(|(c, (&count, probability))| ScoreDistribution {
                    value: schema.classes[c].clone(),
                    record_count: count as f64,
                    probability: Some(probability),
                    confidence: None,
                })
                .collect()
        } else {
            Vec::new()
        };

        let children = match node {
            TreeNode::Leaf { .. } => Vec::new(),
            TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                let (left_pred, right_pred) = split_predicates(&schema.features[*feature_idx], *threshold, schema.compact);
                vec![
                    self.encode_node(left, left_pred, schema, next_id),
                    self.encode_node(right, right_pred, schema, next_id),
                ]
            }
        };

        Node {
            id,
            score,
            record_count: Some(node.n_samples() as f64),
            predicate,
            score_distributions,
            children,
        }
    }
}

/// Predicates of the left (`<=`) and right (`>`) children of a split
fn split_predicates(feature: &Feature, threshold: f64, compact: bool) -> (TreePredicate, TreePredicate) {
    let simple = |field: String, operator: Operator, value: String| TreePredicate::SimplePredicate { field, operator, value };

    match feature {
        // An indicator is 0 or 1, so `<= threshold` means the category differs
        Feature::Indicator { field, value } if compact => (
            simple(field.clone(), Operator::NotEqual, value.clone()),
            simple(field.clone(), Operator::Equal, value.clone()),
        ),
        _ => (
            simple(feature.name(), Operator::LessOrEqual, threshold.to_string()),
            simple(feature.name(), Operator::GreaterThan, threshold.to_string()),
        ),
    }
}

/// Split point strictly below `hi`, so `lo <= t < hi`
fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    if mid >= hi || !mid.is_finite() {
        lo
    } else {
        mid
    }
}

/// Index of the first maximum
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (idx, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = idx;
        }
    }
    best
}

impl Estimator for DecisionTree {
    fn name(&self) -> &str {
        if self.is_classification {
            "DecisionTreeClassifier"
        } else {
            "DecisionTreeRegressor"
        }
    }

    fn task(&self) -> TaskType {
        if self.is_classification {
            TaskType::Classification
        } else {
            TaskType::Regression
        }
    }

    fn params(&self) -> Vec<(String, String)> {
        vec![
            ("criterion".to_string(), self.criterion.to_string()),
            ("max_depth".to_string(), self.max_depth.map_or("None".to_string(), |d| d.to_string())),
            ("min_samples_split".to_string(), self.min_samples_split.to_string()),
            ("min_samples_leaf".to_string(), self.min_samples_leaf.to_string()),
            ("random_state".to_string(), self.random_state.map_or("None".to_string(), |s| s.to_string())),
        ]
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        DecisionTree::fit(self, x, y).map(|_| ())
    }

    fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        DecisionTree::predict(self, x)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        DecisionTree::predict_proba(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.feature_importances.clone()
    }

    fn encode(&self, schema: &ModelSchema) -> Result<PMMLModel> {
        let mut model = self.to_tree_model(schema, true)?;
        model.model_name = Some(Estimator::name(self).to_string());
        Ok(PMMLModel::Tree(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn schema(features: Vec<Feature>, classes: &[&str], compact: bool) -> ModelSchema {
        ModelSchema {
            target: "y".to_string(),
            classes: classes.iter().map(|c| c.to_string()).collect(),
            active_fields: vec!["Gender".to_string(), "Age".to_string()],
            features,
            compact,
        }
    }

    #[test]
    fn test_classifier_simple() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        let predictions = tree.predict(&x).unwrap();
        assert_eq!(predictions, y);
        assert_eq!(tree.get_n_leaves(), 2);
    }

    #[test]
    fn test_regressor_simple() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];

        let mut tree = DecisionTree::new_regressor().with_criterion(Criterion::MSE);
        tree.fit(&x, &y).unwrap();

        let predictions = tree.predict(&x).unwrap();

        let mse: f64 = predictions.iter().zip(y.iter()).map(|(p, a)| (p - a).powi(2)).sum::<f64>() / y.len() as f64;
        assert!(mse < 1e-12, "MSE too high: {}", mse);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let y = array![0.0, 1.0, 0.0, 1.0];

        let mut tree = DecisionTree::new_classifier().with_max_depth(1);
        tree.fit(&x, &y).unwrap();

        assert!(tree.get_depth() <= 2);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert_eq!(importances[0], 1.0);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_threshold_is_midpoint() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        match tree.root().unwrap() {
            TreeNode::Split { threshold, class_counts, n_samples, .. } => {
                assert_eq!(*threshold, 2.5);
                assert_eq!(class_counts, &vec![2, 2]);
                assert_eq!(*n_samples, 4);
            }
            other => panic!("expected split, got {:?}", other),
        }
    }

    #[test]
    fn test_small_sample_becomes_leaf() {
        let x = array![[1.0], [2.0]];
        let y = array![0.0, 1.0];

        let mut tree = DecisionTree::new_classifier().with_min_samples_split(5);
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.get_n_leaves(), 1);
        let proba = tree.predict_proba(&x).unwrap();
        assert_eq!(proba.row(0).to_vec(), vec![0.5, 0.5]);
        assert_eq!(tree.predict(&x).unwrap()[0], 0.0);
    }

    #[test]
    fn test_rejects_bad_targets() {
        let x = array![[1.0], [2.0]];
        let mut tree = DecisionTree::new_classifier();
        let result = tree.fit(&x, &array![0.5, 1.0]);
        assert!(matches!(result, Err(PmmlError::EstimatorFitError(_))));

        let result = tree.fit(&x, &array![0.0]);
        assert!(matches!(result, Err(PmmlError::EstimatorFitError(_))));
    }

    #[test]
    fn test_not_fitted() {
        let tree = DecisionTree::new_regressor();
        assert!(matches!(tree.predict(&array![[1.0]]), Err(PmmlError::ModelNotFitted)));
    }

    #[test]
    fn test_feature_sampling_is_seeded() {
        let x = array![[0.0, 1.0, 5.0], [1.0, 0.0, 3.0], [0.0, 0.0, 1.0], [1.0, 1.0, 4.0], [0.0, 1.0, 2.0]];
        let y = array![0.0, 1.0, 0.0, 1.0, 1.0];

        let fit = || {
            let mut tree = DecisionTree::new_classifier().with_max_features(1).with_random_state(7);
            tree.fit(&x, &y).unwrap();
            tree.root().cloned()
        };
        assert_eq!(fit(), fit());
    }

    #[test]
    fn test_encode_expanded() {
        let x = array![[0.0, 30.0], [0.0, 40.0], [1.0, 35.0], [1.0, 50.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        let features = vec![
            Feature::Indicator { field: "Gender".into(), value: "Male".into() },
            Feature::Continuous { field: "Age".into() },
        ];
        let model = tree.to_tree_model(&schema(features, &["No", "Yes"], false), true).unwrap();

        assert_eq!(model.root.id.as_deref(), Some("1"));
        assert_eq!(model.root.score_distributions.len(), 2);
        assert_eq!(model.output.len(), 2);
        assert_eq!(
            model.root.children[0].predicate,
            TreePredicate::SimplePredicate {
                field: "Gender=Male".into(),
                operator: Operator::LessOrEqual,
                value: "0.5".into(),
            }
        );
        assert_eq!(model.root.children[1].score.as_deref(), Some("Yes"));
        assert_eq!(model.root.children[1].record_count, Some(2.0));
    }

    #[test]
    fn test_encode_compact_rewrites_indicators() {
        let x = array![[0.0, 30.0], [0.0, 40.0], [1.0, 35.0], [1.0, 50.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        let features = vec![
            Feature::Indicator { field: "Gender".into(), value: "Male".into() },
            Feature::Continuous { field: "Age".into() },
        ];
        let model = tree.to_tree_model(&schema(features, &["No", "Yes"], true), false).unwrap();

        assert_eq!(model.root.id, None);
        assert_eq!(model.root.score, None);
        assert!(model.root.score_distributions.is_empty());
        assert_eq!(
            model.root.children[1].predicate,
            TreePredicate::SimplePredicate {
                field: "Gender".into(),
                operator: Operator::Equal,
                value: "Male".into(),
            }
        );
        assert_eq!(model.root.children[0].score.as_deref(), Some("No"));
    }
}
