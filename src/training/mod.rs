//! Model training module
//!
//! Tree estimators whose fitted structure can be exported to PMML:
//! - Decision trees (CART)
//! - Random Forests (bagged, feature-subsampled trees)

mod config;
pub mod decision_tree;
mod metrics;
pub mod random_forest;

pub use config::{EstimatorConfig, TreeParams};
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use metrics::ModelMetrics;
pub use random_forest::{MaxFeatures, RandomForest};

use crate::error::Result;
use crate::export::{
    FieldUsageType, InvalidValueTreatment, MiningField, MiningFunction, OutputField, PMMLModel,
};
use crate::preprocessing::Feature;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Task type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Classification,
    Regression,
}

impl TaskType {
    pub fn mining_function(&self) -> MiningFunction {
        match self {
            TaskType::Classification => MiningFunction::Classification,
            TaskType::Regression => MiningFunction::Regression,
        }
    }
}

/// Result of scoring one record
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// Predicted class with the probability of every class, in class order
    Classification {
        label: String,
        probabilities: Vec<(String, f64)>,
    },
    Regression { value: f64 },
}

impl Prediction {
    /// Build a classification result; the label is the first most probable class
    pub fn from_probabilities(classes: &[String], probabilities: &[f64]) -> Self {
        let mut best = 0;
        for (idx, p) in probabilities.iter().enumerate() {
            if *p > probabilities[best] {
                best = idx;
            }
        }

        Prediction::Classification {
            label: classes.get(best).cloned().unwrap_or_default(),
            probabilities: classes.iter().cloned().zip(probabilities.iter().copied()).collect(),
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Prediction::Classification { label, .. } => Some(label),
            Prediction::Regression { .. } => None,
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Prediction::Regression { value } => Some(*value),
            Prediction::Classification { .. } => None,
        }
    }

    pub fn probability(&self, class: &str) -> Option<f64> {
        match self {
            Prediction::Classification { probabilities, .. } => {
                probabilities.iter().find(|(c, _)| c == class).map(|(_, p)| *p)
            }
            Prediction::Regression { .. } => None,
        }
    }
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Prediction::Classification { label, .. } => write!(f, "{}", label),
            Prediction::Regression { value } => write!(f, "{}", value),
        }
    }
}

/// Everything an estimator needs to express itself as a PMML model
#[derive(Debug, Clone)]
pub struct ModelSchema {
    pub target: String,
    /// Class labels, indexed by the encoded target; empty for regression
    pub classes: Vec<String>,
    /// Encoded features, indexed like the training matrix columns
    pub features: Vec<Feature>,
    /// Raw input fields, in declaration order
    pub active_fields: Vec<String>,
    /// Rewrite one-hot splits onto raw fields and keep scores on leaves only
    pub compact: bool,
}

impl ModelSchema {
    pub fn mining_schema(&self) -> Vec<MiningField> {
        let mut fields = vec![MiningField::target(&self.target)];
        fields.extend(self.active_fields.iter().map(|name| {
            MiningField::active(name).with_invalid_value_treatment(InvalidValueTreatment::ReturnInvalid)
        }));
        fields
    }

    /// Probability outputs for classification models
    pub fn output(&self) -> Vec<OutputField> {
        self.classes.iter().map(|c| OutputField::probability(c)).collect()
    }

    pub fn is_target(&self, field: &MiningField) -> bool {
        field.usage_type == FieldUsageType::Target && field.name == self.target
    }
}

/// Trainable model that can be exported to PMML
pub trait Estimator: Send + Sync + std::fmt::Debug {
    /// Model name, e.g. `RandomForestClassifier`
    fn name(&self) -> &str;

    fn task(&self) -> TaskType;

    /// Hyperparameters as name/value pairs
    fn params(&self) -> Vec<(String, String)>;

    /// Fit on a feature matrix. Classification targets are class indices.
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn is_fitted(&self) -> bool;

    /// Class index (classification) or value (regression) per row
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Class probabilities per row
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    fn feature_importances(&self) -> Option<Array1<f64>>;

    /// Encode the fitted model as a PMML model element
    fn encode(&self, schema: &ModelSchema) -> Result<PMMLModel>;
}

/// `Name(k=v, ...)` rendering of an estimator
pub fn describe(estimator: &dyn Estimator) -> String {
    let params: Vec<String> = estimator
        .params()
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    format!("{}({})", estimator.name(), params.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_first_max_wins() {
        let classes = vec!["0".to_string(), "1".to_string()];
        let prediction = Prediction::from_probabilities(&classes, &[0.5, 0.5]);

        assert_eq!(prediction.label(), Some("0"));
        assert_eq!(prediction.probability("1"), Some(0.5));
        assert_eq!(prediction.value(), None);
    }

    #[test]
    fn test_mining_schema_lists_target_first() {
        let schema = ModelSchema {
            target: "mpg".to_string(),
            classes: Vec::new(),
            features: Vec::new(),
            active_fields: vec!["cylinders".to_string(), "weight".to_string()],
            compact: false,
        };

        let fields = schema.mining_schema();
        assert_eq!(fields.len(), 3);
        assert!(schema.is_target(&fields[0]));
        assert_eq!(fields[2].invalid_value_treatment, Some(InvalidValueTreatment::ReturnInvalid));
        assert!(schema.output().is_empty());
    }
}
