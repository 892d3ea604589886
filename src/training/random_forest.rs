//! Random Forest implementation

use super::decision_tree::{argmax, Criterion, DecisionTree};
use super::{Estimator, ModelSchema, TaskType};
use crate::error::{PmmlError, Result};
use crate::export::{MiningModel, MultipleModelMethod, PMMLModel, Segment};
use ndarray::{Array1, Array2, Axis};
use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Random Forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    /// Individual trees
    trees: Vec<DecisionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features considered per split
    pub max_features: MaxFeatures,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Random state; tree `i` is seeded with `random_state + i`
    pub random_state: Option<u64>,
    /// Is classification task
    is_classification: bool,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Number of features
    n_features: usize,
    /// Number of classes (for classification)
    n_classes: usize,
}

/// Strategy for max features
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl std::fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaxFeatures::Sqrt => write!(f, "sqrt"),
            MaxFeatures::Log2 => write!(f, "log2"),
            MaxFeatures::Fraction(v) => write!(f, "{}", v),
            MaxFeatures::Fixed(n) => write!(f, "{}", n),
            MaxFeatures::All => write!(f, "None"),
        }
    }
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new_classifier(100)
    }
}

impl RandomForest {
    /// Create a new classifier forest
    pub fn new_classifier(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            criterion: Criterion::Gini,
            random_state: None,
            is_classification: true,
            feature_importances: None,
            n_features: 0,
            n_classes: 0,
        }
    }

    /// Create a new regressor forest
    pub fn new_regressor(n_estimators: usize) -> Self {
        Self {
            max_features: MaxFeatures::All,
            criterion: Criterion::MSE,
            is_classification: false,
            ..Self::new_classifier(n_estimators)
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

    /// Set max features strategy
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Enable or disable bootstrap sampling
    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
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

    fn compute_max_features(&self, n_features: usize) -> usize {
        match self.max_features {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n.min(n_features),
            MaxFeatures::All => n_features,
        }
        .clamp(1, n_features.max(1))
    }

    /// Fit the forest to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if self.n_estimators == 0 {
            return Err(PmmlError::InvalidParameter {
                name: "n_estimators".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if let MaxFeatures::Fraction(f) = self.max_features {
            if !(f > 0.0 && f <= 1.0) {
                return Err(PmmlError::InvalidParameter {
                    name: "max_features".to_string(),
                    value: f.to_string(),
                    reason: "fraction must be in (0, 1]".to_string(),
                });
            }
        }
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

        self.n_features = n_features;
        let max_features = self.compute_max_features(n_features);

        if self.is_classification {
            let max_class = y.iter().fold(0.0f64, |acc, &v| acc.max(v));
            self.n_classes = max_class as usize + 1;
        }

        // Build trees in parallel
        let base_seed = self.random_state.unwrap_or(42);

        let trees: Vec<DecisionTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                // Bootstrap sample
                let sample_indices: Vec<usize> = if self.bootstrap {
                    (0..n_samples)
                        .map(|_| (rng.next_u64() as usize) % n_samples)
                        .collect()
                } else {
                    (0..n_samples).collect()
                };

                let x_boot = x.select(Axis(0), &sample_indices);
                let y_boot: Array1<f64> = sample_indices.iter().map(|&i| y[i]).collect();

                let mut tree = if self.is_classification {
                    DecisionTree::new_classifier().with_n_classes(self.n_classes)
                } else {
                    DecisionTree::new_regressor()
                };

                if let Some(d) = self.max_depth {
                    tree = tree.with_max_depth(d);
                }

                tree = tree
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_criterion(self.criterion)
                    .with_max_features(max_features)
                    .with_random_state(rng.next_u64());

                tree.fit(&x_boot, &y_boot)?;
                debug!(tree = tree_idx, depth = tree.get_depth(), leaves = tree.get_n_leaves(), "Fitted tree");

                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;

        // Compute feature importances
        self.compute_feature_importances();

        Ok(self)
    }

    fn compute_feature_importances(&mut self) {
        if self.trees.is_empty() {
            return;
        }

        let mut total_importances = vec![0.0; self.n_features];

        for tree in &self.trees {
            if let Some(imp) = tree.feature_importances() {
                for (i, &val) in imp.iter().enumerate() {
                    if i < self.n_features {
                        total_importances[i] += val;
                    }
                }
            }
        }

        let n_trees = self.trees.len() as f64;
        for imp in &mut total_importances {
            *imp /= n_trees;
        }

        // Normalize
        let total: f64 = total_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut total_importances {
                *imp /= total;
            }
        }

        self.feature_importances = Some(Array1::from_vec(total_importances));
    }

    /// Make predictions: most probable class index, or mean of tree outputs
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(PmmlError::ModelNotFitted);
        }

        if self.is_classification {
            let proba = self.predict_proba(x)?;
            let predictions = proba
                .outer_iter()
                .map(|row| argmax(&row.to_vec()) as f64)
                .collect();
            return Ok(predictions);
        }

        // Trees are summed in order so exported models reproduce the result exactly
        let all_predictions = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<Array1<f64>>>>()?;

        let mut sum = Array1::zeros(x.nrows());
        for preds in &all_predictions {
            sum += preds;
        }
        Ok(sum / self.trees.len() as f64)
    }

    /// Average of the trees' leaf class frequencies (soft voting)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(PmmlError::ModelNotFitted);
        }

        if !self.is_classification {
            return Err(PmmlError::UnsupportedError(
                "predict_proba is only available for classification".to_string(),
            ));
        }

        let all_proba = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_proba(x))
            .collect::<Result<Vec<Array2<f64>>>>()?;

        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        for tree_proba in &all_proba {
            proba += tree_proba;
        }
        Ok(proba / self.trees.len() as f64)
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }
}

impl Estimator for RandomForest {
    fn name(&self) -> &str {
        if self.is_classification {
            "RandomForestClassifier"
        } else {
            "RandomForestRegressor"
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
            ("n_estimators".to_string(), self.n_estimators.to_string()),
            ("criterion".to_string(), self.criterion.to_string()),
            ("max_depth".to_string(), self.max_depth.map_or("None".to_string(), |d| d.to_string())),
            ("min_samples_split".to_string(), self.min_samples_split.to_string()),
            ("min_samples_leaf".to_string(), self.min_samples_leaf.to_string()),
            ("max_features".to_string(), self.max_features.to_string()),
            ("bootstrap".to_string(), self.bootstrap.to_string()),
            ("random_state".to_string(), self.random_state.map_or("None".to_string(), |s| s.to_string())),
        ]
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        RandomForest::fit(self, x, y).map(|_| ())
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RandomForest::predict(self, x)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        RandomForest::predict_proba(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.feature_importances.clone()
    }

    fn encode(&self, schema: &ModelSchema) -> Result<PMMLModel> {
        if self.trees.is_empty() {
            return Err(PmmlError::ModelNotFitted);
        }

        let segments = self
            .trees
            .iter()
            .enumerate()
            .map(|(idx, tree)| {
                Ok(Segment {
                    id: (idx + 1).to_string(),
                    weight: 1.0,
                    model: tree.to_tree_model(schema, false)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PMMLModel::Mining(MiningModel {
            model_name: Some(Estimator::name(self).to_string()),
            function: Estimator::task(self).mining_function(),
            algorithm_name: None,
            mining_schema: schema.mining_schema(),
            output: schema.output(),
            multiple_model_method: MultipleModelMethod::Average,
            segments,
        }))
    }
}
