//! JSON pipeline configuration for the command line

use crate::error::{PmmlError, Result};
use crate::preprocessing::{ColumnSpec, DataFrameMapper};
use crate::training::EstimatorConfig;
use crate::utils::DataLoader;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::ExportOptions;

/// Everything needed to run one export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Training CSV
    pub data: PathBuf,
    /// Defaults to the last column of the dataset
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Role declarations, in feature order
    pub columns: Vec<ColumnSpec>,
    pub estimator: EstimatorConfig,
    pub output: PathBuf,
    #[serde(default)]
    pub compact: bool,
    #[serde(default)]
    pub with_repr: bool,
    /// Rows scanned for CSV schema inference; the whole file when unset
    #[serde(default)]
    pub infer_schema_length: Option<usize>,
}

impl PipelineConfig {
    /// Load from a JSON file. Relative `data` and `output` paths resolve
    /// against the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| PmmlError::ConfigError(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_json(&json)?;

        if let Some(base) = path.parent() {
            if config.data.is_relative() {
                config.data = base.join(&config.data);
            }
            if config.output.is_relative() {
                config.output = base.join(&config.output);
            }
        }
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PmmlError::ConfigError(e.to_string()))
    }

    pub fn mapper(&self) -> DataFrameMapper {
        DataFrameMapper::from_specs(self.columns.clone())
    }

    /// CSV loader for `data`
    pub fn loader(&self) -> DataLoader {
        match self.infer_schema_length {
            Some(n) => DataLoader::new().with_infer_schema_length(n),
            None => DataLoader::new(),
        }
    }

    pub fn options(&self) -> ExportOptions {
        ExportOptions {
            compact: self.compact,
            with_repr: self.with_repr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::{CategoricalEncoder, ColumnRole};
    use polars::prelude::DataType;
    use std::io::Write;

    const AUDIT: &str = r#"{
        "data": "csv/Audit.csv",
        "target": "Adjusted",
        "exclude": ["Deductions"],
        "columns": [
            {"name": "Employment", "role": "categorical"},
            {"name": "Gender", "role": "categorical", "encoder": "label"},
            {"name": "Age", "role": "continuous"}
        ],
        "estimator": {"type": "random_forest_classifier", "n_estimators": 71, "max_depth": 7, "random_state": 13},
        "output": "pmml/RandomForestAudit.pmml"
    }"#;

    #[test]
    fn test_parse_config() {
        let config = PipelineConfig::from_json(AUDIT).unwrap();

        assert_eq!(config.target.as_deref(), Some("Adjusted"));
        assert_eq!(config.exclude, vec!["Deductions"]);
        assert_eq!(config.columns.len(), 3);
        assert_eq!(
            config.columns[1].role,
            ColumnRole::Categorical { encoder: CategoricalEncoder::Label }
        );
        assert_eq!(config.columns[2].role, ColumnRole::Continuous);
        assert_eq!(config.options(), ExportOptions::default());
        assert_eq!(config.mapper().column_names(), vec!["Employment", "Gender", "Age"]);
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.json");
        std::fs::File::create(&path).unwrap().write_all(AUDIT.as_bytes()).unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.data, dir.path().join("csv/Audit.csv"));
        assert_eq!(config.output, dir.path().join("pmml/RandomForestAudit.pmml"));
    }

    #[test]
    fn test_infer_schema_length_reaches_loader() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("mixed.csv");
        std::fs::write(&csv, "code,y\n1,0\n2,1\nA7,0\n").unwrap();

        let mut config = PipelineConfig::from_json(AUDIT).unwrap();
        config.data = csv;
        let df = config.loader().load_csv(&config.data).unwrap();
        assert_eq!(df.column("code").unwrap().dtype(), &DataType::String);

        // One row of inference types the column as integer, so "A7" no longer loads as text
        config.infer_schema_length = Some(1);
        match config.loader().load_csv(&config.data) {
            Ok(df) => assert_ne!(df.column("code").unwrap().dtype(), &DataType::String),
            Err(e) => assert!(matches!(e, PmmlError::DataError(_))),
        }
    }

    #[test]
    fn test_unknown_key_is_a_config_error() {
        let result = PipelineConfig::from_json(r#"{"data": "a.csv", "colums": []}"#);
        assert!(matches!(result, Err(PmmlError::ConfigError(_))));
    }
}
