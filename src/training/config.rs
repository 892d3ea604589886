//! Estimator configuration

use super::{Criterion, DecisionTree, Estimator, MaxFeatures, RandomForest};
use crate::error::{PmmlError, Result};
use serde::{Deserialize, Serialize};

/// Hyperparameters shared by the tree estimators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TreeParams {
    /// Number of trees (forests only)
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Defaults to `sqrt` for classifiers and all features for regressors
    pub max_features: Option<MaxFeatures>,
    /// Forests only
    pub bootstrap: bool,
    /// Defaults to `gini` for classifiers and `mse` for regressors
    pub criterion: Option<Criterion>,
    pub random_state: Option<u64>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            criterion: None,
            random_state: None,
        }
    }
}

/// Estimator selection, tagged by `type` in JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EstimatorConfig {
    RandomForestClassifier(TreeParams),
    RandomForestRegressor(TreeParams),
    DecisionTreeClassifier(TreeParams),
    DecisionTreeRegressor(TreeParams),
}

impl EstimatorConfig {
    pub fn params(&self) -> &TreeParams {
        match self {
            EstimatorConfig::RandomForestClassifier(p)
            | EstimatorConfig::RandomForestRegressor(p)
            | EstimatorConfig::DecisionTreeClassifier(p)
            | EstimatorConfig::DecisionTreeRegressor(p) => p,
        }
    }

    fn validate(&self) -> Result<()> {
        let params = self.params();
        let invalid = |name: &str, value: String, reason: &str| PmmlError::InvalidParameter {
            name: name.to_string(),
            value,
            reason: reason.to_string(),
        };

        if params.n_estimators == 0 {
            return Err(invalid("n_estimators", "0".into(), "must be at least 1"));
        }
        if params.max_depth == Some(0) {
            return Err(invalid("max_depth", "0".into(), "must be at least 1"));
        }
        if params.min_samples_split < 2 {
            return Err(invalid("min_samples_split", params.min_samples_split.to_string(), "must be at least 2"));
        }
        if params.min_samples_leaf < 1 {
            return Err(invalid("min_samples_leaf", "0".into(), "must be at least 1"));
        }

        let classifier = matches!(
            self,
            EstimatorConfig::RandomForestClassifier(_) | EstimatorConfig::DecisionTreeClassifier(_)
        );
        let tree = matches!(
            self,
            EstimatorConfig::DecisionTreeClassifier(_) | EstimatorConfig::DecisionTreeRegressor(_)
        );
        if let Some(mf) = params.max_features {
            if tree && !matches!(mf, MaxFeatures::Fixed(_) | MaxFeatures::All) {
                return Err(invalid("max_features", mf.to_string(), "decision trees take a fixed count"));
            }
        }
        if let Some(criterion) = params.criterion {
            let classification_criterion = matches!(criterion, Criterion::Gini | Criterion::Entropy);
            if classification_criterion != classifier {
                return Err(invalid("criterion", criterion.to_string(), "does not match the estimator type"));
            }
        }
        Ok(())
    }

    /// Build an unfitted estimator
    pub fn build(&self) -> Result<Box<dyn Estimator>> {
        self.validate()?;
        let p = self.params();

        let estimator: Box<dyn Estimator> = match self {
            EstimatorConfig::RandomForestClassifier(_) | EstimatorConfig::RandomForestRegressor(_) => {
                let mut forest = if matches!(self, EstimatorConfig::RandomForestClassifier(_)) {
                    RandomForest::new_classifier(p.n_estimators)
                } else {
                    RandomForest::new_regressor(p.n_estimators)
                };
                forest = forest
                    .with_min_samples_split(p.min_samples_split)
                    .with_min_samples_leaf(p.min_samples_leaf)
                    .with_bootstrap(p.bootstrap);
                if let Some(d) = p.max_depth {
                    forest = forest.with_max_depth(d);
                }
                if let Some(mf) = p.max_features {
                    forest = forest.with_max_features(mf);
                }
                if let Some(c) = p.criterion {
                    forest = forest.with_criterion(c);
                }
                if let Some(seed) = p.random_state {
                    forest = forest.with_random_state(seed);
                }
                Box::new(forest)
            }
            EstimatorConfig::DecisionTreeClassifier(_) | EstimatorConfig::DecisionTreeRegressor(_) => {
                let mut tree = if matches!(self, EstimatorConfig::DecisionTreeClassifier(_)) {
                    DecisionTree::new_classifier()
                } else {
                    DecisionTree::new_regressor()
                };
                tree = tree
                    .with_min_samples_split(p.min_samples_split)
                    .with_min_samples_leaf(p.min_samples_leaf);
                if let Some(d) = p.max_depth {
                    tree = tree.with_max_depth(d);
                }
                if let Some(MaxFeatures::Fixed(n)) = p.max_features {
                    tree = tree.with_max_features(n);
                }
                if let Some(c) = p.criterion {
                    tree = tree.with_criterion(c);
                }
                if let Some(seed) = p.random_state {
                    tree = tree.with_random_state(seed);
                }
                Box::new(tree)
            }
        };

        Ok(estimator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::TaskType;

    #[test]
    fn test_parse_forest_config() {
        let config: EstimatorConfig = serde_json::from_str(
            r#"{"type": "random_forest_classifier", "n_estimators": 71, "max_depth": 7, "random_state": 13}"#,
        )
        .unwrap();

        let params = config.params();
        assert_eq!(params.n_estimators, 71);
        assert_eq!(params.max_depth, Some(7));
        assert_eq!(params.min_samples_split, 2);

        let estimator = config.build().unwrap();
        assert_eq!(estimator.name(), "RandomForestClassifier");
        assert_eq!(estimator.task(), TaskType::Classification);
        assert!(!estimator.is_fitted());
    }

    #[test]
    fn test_parse_regressor_config() {
        let config: EstimatorConfig =
            serde_json::from_str(r#"{"type": "decision_tree_regressor", "max_depth": 5}"#).unwrap();

        let estimator = config.build().unwrap();
        assert_eq!(estimator.name(), "DecisionTreeRegressor");
        assert_eq!(estimator.task(), TaskType::Regression);
    }

    #[test]
    fn test_rejects_unknown_field() {
        let result: std::result::Result<EstimatorConfig, _> =
            serde_json::from_str(r#"{"type": "random_forest_regressor", "n_trees": 5}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_mismatched_criterion() {
        let config: EstimatorConfig =
            serde_json::from_str(r#"{"type": "random_forest_regressor", "criterion": "gini"}"#).unwrap();
        assert!(matches!(config.build(), Err(PmmlError::InvalidParameter { .. })));
    }
}
