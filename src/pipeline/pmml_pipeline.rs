//! Fitted preprocessing + estimator bound into one artifact

use super::ExportOptions;
use crate::error::{PmmlError, Result};
use crate::export::{DataField, Extension, PMMLDataType, PMMLDocument, PMMLExporter, PMMLHeader, PMML_VERSION};
use crate::preprocessing::{pmml_data_type, sort_categories, DataFrameMapper, FittedMapper};
use crate::training::{describe, Estimator, ModelMetrics, ModelSchema, Prediction, TaskType};
use crate::utils::data_loader::{numeric_values, string_values, Record};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Target column as seen during fit
#[derive(Debug, Clone, PartialEq)]
pub struct TargetField {
    pub name: String,
    pub data_type: PMMLDataType,
    /// Sorted class labels; empty for regression
    pub classes: Vec<String>,
}

impl TargetField {
    fn data_field(&self) -> DataField {
        if self.classes.is_empty() {
            DataField::continuous(&self.name, PMMLDataType::Double)
        } else {
            DataField::categorical(&self.name, self.data_type, self.classes.clone())
        }
    }
}

/// A fitted pipeline: column mapper, target description and estimator
#[derive(Debug)]
pub struct PmmlPipeline {
    mapper: DataFrameMapper,
    fitted: FittedMapper,
    target: TargetField,
    estimator: Box<dyn Estimator>,
    options: ExportOptions,
    metrics: ModelMetrics,
}

impl PmmlPipeline {
    /// Fit domains, encoders and the estimator on `df`.
    ///
    /// The schema must already have been validated; only the declared
    /// columns and the target are read.
    pub fn fit(df: &DataFrame, target: &str, mapper: DataFrameMapper, mut estimator: Box<dyn Estimator>) -> Result<Self> {
        if df.height() == 0 {
            return Err(PmmlError::EmptyDatasetError);
        }

        let start = Instant::now();
        let fitted = mapper.fit(df)?;
        fitted.check_field_names(target)?;
        let x = fitted.transform(df)?;
        debug!(rows = x.nrows(), features = x.ncols(), "Feature matrix built");

        let (target, y) = encode_target(df, target, estimator.task())?;
        estimator.fit(&x, &y)?;

        let mut metrics = match estimator.task() {
            TaskType::Classification => {
                let proba = estimator.predict_proba(&x)?;
                let pred = estimator.predict(&x)?;
                ModelMetrics::compute_classification(&y, &pred, Some(&proba))
            }
            TaskType::Regression => ModelMetrics::compute_regression(&y, &estimator.predict(&x)?),
        };
        metrics.training_time_secs = start.elapsed().as_secs_f64();
        metrics.n_features = x.ncols();

        info!(
            estimator = estimator.name(),
            rows = x.nrows(),
            features = x.ncols(),
            secs = metrics.training_time_secs,
            "Pipeline fitted"
        );

        Ok(Self {
            mapper,
            fitted,
            target,
            estimator,
            options: ExportOptions::default(),
            metrics,
        })
    }

    /// Replace the export options
    pub fn configure(&mut self, options: ExportOptions) -> &mut Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn mapper(&self) -> &DataFrameMapper {
        &self.mapper
    }

    pub fn fitted_mapper(&self) -> &FittedMapper {
        &self.fitted
    }

    pub fn estimator(&self) -> &dyn Estimator {
        self.estimator.as_ref()
    }

    pub fn target(&self) -> &TargetField {
        &self.target
    }

    pub fn task(&self) -> TaskType {
        self.estimator.task()
    }

    /// Metrics on the training data
    pub fn metrics(&self) -> &ModelMetrics {
        &self.metrics
    }

    /// Feature names paired with importances, most important first
    pub fn feature_importances(&self) -> Option<Vec<(String, f64)>> {
        let importances = self.estimator.feature_importances()?;
        let mut pairs: Vec<(String, f64)> = self
            .fitted
            .features()
            .iter()
            .map(|f| f.name())
            .zip(importances.iter().copied())
            .collect();
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
        Some(pairs)
    }

    /// Encode the declared columns of `df`
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        self.fitted.transform(df)
    }

    /// Score one raw record
    pub fn predict_record(&self, record: &Record) -> Result<Prediction> {
        let x = self.fitted.encode_record(record)?.insert_axis(Axis(0));
        let mut predictions = self.predict_matrix(&x)?;
        predictions.pop().ok_or(PmmlError::ModelNotFitted)
    }

    /// Score every row of `df`
    pub fn predict(&self, df: &DataFrame) -> Result<Vec<Prediction>> {
        let x = self.transform(df)?;
        self.predict_matrix(&x)
    }

    fn predict_matrix(&self, x: &Array2<f64>) -> Result<Vec<Prediction>> {
        match self.task() {
            TaskType::Classification => {
                let proba = self.estimator.predict_proba(x)?;
                Ok(proba
                    .rows()
                    .into_iter()
                    .map(|row| Prediction::from_probabilities(&self.target.classes, &row.to_vec()))
                    .collect())
            }
            TaskType::Regression => Ok(self
                .estimator
                .predict(x)?
                .iter()
                .map(|&value| Prediction::Regression { value })
                .collect()),
        }
    }

    /// Human-readable representation of the pipeline steps
    pub fn repr(&self) -> String {
        let step = match self.task() {
            TaskType::Classification => "classifier",
            TaskType::Regression => "regressor",
        };
        format!(
            "PMMLPipeline(steps=[('mapper', {}), ('{}', {})])",
            self.mapper,
            step,
            describe(self.estimator.as_ref())
        )
    }

    fn model_schema(&self) -> ModelSchema {
        ModelSchema {
            target: self.target.name.clone(),
            classes: self.target.classes.clone(),
            features: self.fitted.features(),
            active_fields: self.mapper.column_names().into_iter().map(String::from).collect(),
            compact: self.options.compact,
        }
    }

    /// Build the PMML document for the fitted pipeline
    pub fn to_pmml(&self) -> Result<PMMLDocument> {
        let mut header = PMMLHeader {
            timestamp: Some(chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            ..PMMLHeader::default()
        };
        if self.options.with_repr {
            header.extensions.push(Extension {
                name: "repr".to_string(),
                content: self.repr(),
            });
        }

        let mut data_dictionary = vec![self.target.data_field()];
        data_dictionary.extend(self.fitted.data_fields());

        let model = self.estimator.encode(&self.model_schema())?;

        Ok(PMMLDocument {
            version: PMML_VERSION.to_string(),
            header,
            data_dictionary,
            transformation_dictionary: self.fitted.derived_fields(),
            model,
        })
    }

    /// Serialize to `path`, replacing any existing file
    pub fn write_pmml(&self, path: impl AsRef<Path>) -> Result<()> {
        let doc = self.to_pmml()?;
        PMMLExporter::new().with_compact(self.options.compact).export(&doc, path)
    }
}

/// Classification targets become indices into the sorted labels
fn encode_target(df: &DataFrame, target: &str, task: TaskType) -> Result<(TargetField, Array1<f64>)> {
    let dtype = df
        .column(target)
        .map_err(|_| PmmlError::SchemaMismatch(format!("target column '{}' not found", target)))?
        .dtype()
        .clone();

    match task {
        TaskType::Classification => {
            let values = string_values(df, target)?;
            let labels = values
                .into_iter()
                .enumerate()
                .map(|(row, v)| {
                    v.ok_or_else(|| {
                        PmmlError::EstimatorFitError(format!("missing target value in row {}", row))
                    })
                })
                .collect::<Result<Vec<String>>>()?;

            let classes = sort_categories(labels.iter().cloned());
            let index: HashMap<&str, usize> = classes.iter().enumerate().map(|(i, c)| (c.as_str(), i)).collect();
            let y: Array1<f64> = labels.iter().map(|l| index[l.as_str()] as f64).collect();

            debug!(column = target, classes = classes.len(), "Target encoded");
            Ok((
                TargetField {
                    name: target.to_string(),
                    data_type: pmml_data_type(&dtype),
                    classes,
                },
                y,
            ))
        }
        TaskType::Regression => {
            let (values, unparsable) = numeric_values(df, target)?;
            if unparsable > 0 {
                return Err(PmmlError::EstimatorFitError(format!(
                    "target '{}' has {} non-numeric values",
                    target, unparsable
                )));
            }
            let y = values
                .into_iter()
                .enumerate()
                .map(|(row, v)| {
                    v.filter(|v| v.is_finite()).ok_or_else(|| {
                        PmmlError::EstimatorFitError(format!("missing target value in row {}", row))
                    })
                })
                .collect::<Result<Array1<f64>>>()?;

            Ok((
                TargetField {
                    name: target.to_string(),
                    data_type: PMMLDataType::Double,
                    classes: Vec::new(),
                },
                y,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{DecisionTree, RandomForest};

    fn frame() -> DataFrame {
        df!(
            "color" => &["red", "blue", "red", "green", "blue", "red", "green", "blue"],
            "size" => &[1.0, 2.5, 3.0, 4.5, 5.0, 6.5, 7.0, 8.5],
            "label" => &["b", "a", "b", "a", "a", "b", "a", "a"]
        )
        .unwrap()
    }

    fn mapper() -> DataFrameMapper {
        DataFrameMapper::new().categorical("color").continuous("size")
    }

    #[test]
    fn test_fit_classifier() {
        let pipeline = PmmlPipeline::fit(&frame(), "label", mapper(), Box::new(DecisionTree::new_classifier())).unwrap();

        assert_eq!(pipeline.target().classes, vec!["a", "b"]);
        assert_eq!(pipeline.fitted_mapper().n_features(), 4);
        assert_eq!(pipeline.metrics().accuracy, Some(1.0));

        let record: Record = [("color", "red"), ("size", "3.0")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let prediction = pipeline.predict_record(&record).unwrap();
        assert_eq!(prediction.label(), Some("b"));
    }

    #[test]
    fn test_repr_and_header_extension() {
        let mut pipeline =
            PmmlPipeline::fit(&frame(), "label", mapper(), Box::new(RandomForest::new_classifier(3).with_random_state(7)))
                .unwrap();

        let repr = pipeline.repr();
        assert!(repr.starts_with("PMMLPipeline(steps=[('mapper', DataFrameMapper(["));
        assert!(repr.contains("('classifier', RandomForestClassifier("));

        assert!(pipeline.to_pmml().unwrap().header.extensions.is_empty());
        pipeline.configure(ExportOptions { compact: false, with_repr: true });
        let doc = pipeline.to_pmml().unwrap();
        assert_eq!(doc.header.extensions.len(), 1);
        assert_eq!(doc.header.extensions[0].content, repr);
    }

    #[test]
    fn test_fit_rejects_derived_name_clash() {
        let df = df!(
            "g" => &["x", "y", "x", "y"],
            "g=x" => &[1.0, 2.0, 3.0, 4.0],
            "label" => &["0", "1", "1", "0"]
        )
        .unwrap();
        let mapper = DataFrameMapper::new().categorical("g").continuous("g=x");

        let result = PmmlPipeline::fit(&df, "label", mapper, Box::new(DecisionTree::new_classifier()));
        assert!(matches!(result, Err(PmmlError::SchemaMismatch(msg)) if msg.contains("'g=x'")));
    }

    #[test]
    fn test_fit_rejects_blank_category() {
        let df = df!(
            "c" => &["a", " ", "a", " "],
            "size" => &[1.0, 2.0, 3.0, 4.0],
            "label" => &["0", "1", "1", "0"]
        )
        .unwrap();
        let mapper = DataFrameMapper::new().categorical("c").continuous("size");

        let result = PmmlPipeline::fit(&df, "label", mapper, Box::new(DecisionTree::new_classifier()));
        assert!(matches!(result, Err(PmmlError::EstimatorFitError(_))));
    }

    #[test]
    fn test_data_dictionary_lists_target_first() {
        let pipeline = PmmlPipeline::fit(&frame(), "label", mapper(), Box::new(DecisionTree::new_classifier())).unwrap();
        let doc = pipeline.to_pmml().unwrap();

        let names: Vec<&str> = doc.data_dictionary.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["label", "color", "size"]);
        assert_eq!(doc.transformation_dictionary.len(), 3);
    }

    #[test]
    fn test_regression_target_must_be_numeric() {
        let result = PmmlPipeline::fit(&frame(), "label", mapper(), Box::new(DecisionTree::new_regressor()));
        assert!(matches!(result, Err(PmmlError::EstimatorFitError(_))));
    }

    #[test]
    fn test_empty_frame_is_rejected() {
        let empty = frame().head(Some(0));
        let result = PmmlPipeline::fit(&empty, "label", mapper(), Box::new(DecisionTree::new_classifier()));
        assert!(matches!(result, Err(PmmlError::EmptyDatasetError)));
    }
}
