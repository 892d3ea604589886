//! Training-set metrics reported after a fit

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Metrics for model evaluation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Accuracy (classification)
    pub accuracy: Option<f64>,
    /// Log loss (classification)
    pub log_loss: Option<f64>,
    /// Mean Squared Error (regression)
    pub mse: Option<f64>,
    /// Root Mean Squared Error (regression)
    pub rmse: Option<f64>,
    /// Mean Absolute Error (regression)
    pub mae: Option<f64>,
    /// R-squared (regression)
    pub r2: Option<f64>,
    /// Training time in seconds
    pub training_time_secs: f64,
    pub n_features: usize,
    pub n_samples: usize,
}

impl ModelMetrics {
    /// Classification metrics from class indices and class probabilities
    pub fn compute_classification(y_true: &Array1<f64>, y_pred: &Array1<f64>, y_prob: Option<&Array2<f64>>) -> Self {
        let mut metrics = Self {
            n_samples: y_true.len(),
            ..Self::default()
        };
        if y_true.is_empty() {
            return metrics;
        }

        let correct = y_true
            .iter()
            .zip(y_pred.iter())
            .filter(|(t, p)| (*t - *p).abs() < 0.5)
            .count();
        metrics.accuracy = Some(correct as f64 / y_true.len() as f64);

        if let Some(proba) = y_prob {
            let eps = 1e-15;
            let total: f64 = y_true
                .iter()
                .zip(proba.rows())
                .map(|(t, row)| {
                    let p = row.get(*t as usize).copied().unwrap_or(0.0);
                    -p.clamp(eps, 1.0 - eps).ln()
                })
                .sum();
            metrics.log_loss = Some(total / y_true.len() as f64);
        }

        metrics
    }

    /// Regression metrics
    pub fn compute_regression(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let mut metrics = Self {
            n_samples: y_true.len(),
            ..Self::default()
        };
        if y_true.is_empty() {
            return metrics;
        }

        let n = y_true.len() as f64;
        let errors: Vec<f64> = y_true.iter().zip(y_pred.iter()).map(|(t, p)| t - p).collect();

        let mse: f64 = errors.iter().map(|e| e * e).sum::<f64>() / n;
        metrics.mse = Some(mse);
        metrics.rmse = Some(mse.sqrt());
        metrics.mae = Some(errors.iter().map(|e| e.abs()).sum::<f64>() / n);

        let y_mean: f64 = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
        let ss_res: f64 = errors.iter().map(|e| e.powi(2)).sum();
        metrics.r2 = Some(if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 });

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classification_metrics() {
        let y_true = array![1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let y_pred = array![1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0];

        let metrics = ModelMetrics::compute_classification(&y_true, &y_pred, None);

        assert_eq!(metrics.accuracy, Some(0.75));
        assert!(metrics.log_loss.is_none());
        assert!(metrics.rmse.is_none());
    }

    #[test]
    fn test_log_loss_of_confident_predictions() {
        let y_true = array![0.0, 2.0];
        let y_pred = array![0.0, 2.0];
        let proba = array![[1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];

        let metrics = ModelMetrics::compute_classification(&y_true, &y_pred, Some(&proba));
        assert!(metrics.log_loss.unwrap() < 1e-10);
    }

    #[test]
    fn test_regression_metrics() {
        let y_true = array![1.0, 2.0, 3.0, 4.0];
        let y_pred = array![1.0, 2.0, 3.0, 5.0];

        let metrics = ModelMetrics::compute_regression(&y_true, &y_pred);

        assert_eq!(metrics.mse, Some(0.25));
        assert_eq!(metrics.rmse, Some(0.5));
        assert_eq!(metrics.mae, Some(0.25));
        assert!((metrics.r2.unwrap() - 0.8).abs() < 1e-12);
    }
}
