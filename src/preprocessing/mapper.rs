//! Column mapper: role declarations to feature matrix

use super::{CategoricalEncoder, ColumnRole, ColumnSpec, Domain, Feature, FittedEncoder};
use crate::error::{PmmlError, Result};
use crate::export::{DataField, DerivedField};
use crate::utils::data_loader::{numeric_values, string_values, Record};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::collections::HashSet;
use tracing::debug;

/// Ordered role declarations. Declaration order is feature order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFrameMapper {
    specs: Vec<ColumnSpec>,
}

impl DataFrameMapper {
    /// Create an empty mapper
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: Vec<ColumnSpec>) -> Self {
        Self { specs }
    }

    /// Declare a one-hot encoded categorical column
    pub fn categorical(self, name: impl Into<String>) -> Self {
        self.categorical_with(name, CategoricalEncoder::OneHot)
    }

    /// Declare a categorical column with an explicit encoder
    pub fn categorical_with(mut self, name: impl Into<String>, encoder: CategoricalEncoder) -> Self {
        self.specs.push(ColumnSpec {
            name: name.into(),
            role: ColumnRole::Categorical { encoder },
        });
        self
    }

    /// Declare a continuous column
    pub fn continuous(mut self, name: impl Into<String>) -> Self {
        self.specs.push(ColumnSpec::continuous(name));
        self
    }

    pub fn specs(&self) -> &[ColumnSpec] {
        &self.specs
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }

    /// Learn domains and encoders for every declared column
    pub fn fit(&self, df: &DataFrame) -> Result<FittedMapper> {
        let columns = self
            .specs
            .iter()
            .map(|spec| FittedColumn::fit(spec, df))
            .collect::<Result<Vec<_>>>()?;

        Ok(FittedMapper { columns })
    }
}

impl std::fmt::Display for DataFrameMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let specs: Vec<String> = self.specs.iter().map(|s| format!("{}: {}", s.name, s.role)).collect();
        write!(f, "DataFrameMapper([{}])", specs.join(", "))
    }
}

/// Check that the declarations exactly cover the dataset's feature columns.
///
/// Feature columns are all columns except the target and the excluded ones.
pub fn validate_schema(df: &DataFrame, target: &str, excluded: &[String], mapper: &DataFrameMapper) -> Result<()> {
    let columns: Vec<String> = df.get_column_names().into_iter().map(|s| s.to_string()).collect();
    let present: HashSet<&str> = columns.iter().map(String::as_str).collect();

    if !present.contains(target) {
        return Err(PmmlError::SchemaMismatch(format!("target column '{}' not found", target)));
    }

    for name in excluded {
        if !present.contains(name.as_str()) {
            return Err(PmmlError::SchemaMismatch(format!("excluded column '{}' not found", name)));
        }
    }

    let mut declared = HashSet::new();
    for spec in mapper.specs() {
        if !declared.insert(spec.name.as_str()) {
            return Err(PmmlError::SchemaMismatch(format!("column '{}' has more than one role", spec.name)));
        }
        if spec.name == target {
            return Err(PmmlError::SchemaMismatch(format!("target column '{}' cannot have a feature role", target)));
        }
        if excluded.contains(&spec.name) {
            return Err(PmmlError::SchemaMismatch(format!("excluded column '{}' has a role", spec.name)));
        }
        if !present.contains(spec.name.as_str()) {
            return Err(PmmlError::SchemaMismatch(format!("role column '{}' not found in dataset", spec.name)));
        }
    }

    let missing: Vec<&str> = columns
        .iter()
        .map(String::as_str)
        .filter(|c| *c != target && !excluded.iter().any(|e| e == c) && !declared.contains(c))
        .collect();

    if !missing.is_empty() {
        return Err(PmmlError::SchemaMismatch(format!(
            "feature columns without a role: {}",
            missing.join(", ")
        )));
    }

    Ok(())
}

/// A declared column with its learned domain and encoder
#[derive(Debug, Clone, PartialEq)]
pub struct FittedColumn {
    pub name: String,
    pub role: ColumnRole,
    pub domain: Domain,
    pub encoder: FittedEncoder,
}

impl FittedColumn {
    fn fit(spec: &ColumnSpec, df: &DataFrame) -> Result<Self> {
        let column = df
            .column(&spec.name)
            .map_err(|_| PmmlError::SchemaMismatch(format!("role column '{}' not found in dataset", spec.name)))?;
        let dtype = column.dtype().clone();

        let (domain, encoder) = match spec.role {
            ColumnRole::Categorical { encoder } => {
                let values = string_values(df, &spec.name)?;
                let domain = Domain::fit_categorical(&spec.name, &dtype, &values)?;
                let fitted = FittedEncoder::new(Some(encoder), &domain);
                (domain, fitted)
            }
            ColumnRole::Continuous => {
                let (values, unparsable) = numeric_values(df, &spec.name)?;
                let domain = Domain::fit_continuous(&spec.name, &dtype, &values, unparsable)?;
                (domain, FittedEncoder::Identity)
            }
        };

        debug!(column = %spec.name, role = %spec.role, width = encoder.width(), "Fitted column");

        Ok(Self {
            name: spec.name.clone(),
            role: spec.role,
            domain,
            encoder,
        })
    }

    pub fn features(&self) -> Vec<Feature> {
        self.encoder.features(&self.name)
    }

    pub fn width(&self) -> usize {
        self.encoder.width()
    }

    /// Encode one raw value. Missing values and values outside the domain
    /// are rejected.
    pub fn encode_value(&self, raw: Option<&str>) -> Result<Vec<f64>> {
        let mut out = vec![0.0; self.width()];
        self.encode_into(raw, &mut out)?;
        Ok(out)
    }

    fn encode_into(&self, raw: Option<&str>, out: &mut [f64]) -> Result<()> {
        let raw = raw
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| PmmlError::EvaluationError(format!("missing value for field '{}'", self.name)))?;

        match &self.domain {
            Domain::Categorical { .. } => {
                let index = self.domain.position(raw).ok_or_else(|| {
                    PmmlError::EvaluationError(format!("invalid value '{}' for field '{}'", raw, self.name))
                })?;
                self.encoder.encode_category(index, out)
            }
            Domain::Continuous { .. } => {
                let value = raw.trim().parse::<f64>().map_err(|_| {
                    PmmlError::EvaluationError(format!("invalid value '{}' for field '{}'", raw, self.name))
                })?;
                self.encode_number(value, out)
            }
        }
    }

    fn encode_number(&self, value: f64, out: &mut [f64]) -> Result<()> {
        if let Domain::Continuous { interval, .. } = &self.domain {
            if !interval.contains(value) {
                return Err(PmmlError::EvaluationError(format!(
                    "value {} for field '{}' is outside [{}, {}]",
                    value, self.name, interval.left_margin, interval.right_margin
                )));
            }
        }
        out[0] = value;
        Ok(())
    }

    pub fn data_field(&self) -> DataField {
        self.domain.data_field(&self.name)
    }

    pub fn derived_fields(&self) -> Vec<DerivedField> {
        self.encoder.derived_fields(&self.name)
    }
}

/// All fitted columns, in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct FittedMapper {
    columns: Vec<FittedColumn>,
}

impl FittedMapper {
    pub fn columns(&self) -> &[FittedColumn] {
        &self.columns
    }

    pub fn features(&self) -> Vec<Feature> {
        self.columns.iter().flat_map(FittedColumn::features).collect()
    }

    pub fn n_features(&self) -> usize {
        self.columns.iter().map(FittedColumn::width).sum()
    }

    /// Build the feature matrix for a DataFrame
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        let n_rows = df.height();
        let width = self.n_features();
        let mut data = vec![0.0; n_rows * width];

        let mut offset = 0;
        for column in &self.columns {
            let w = column.width();
            match column.domain {
                Domain::Categorical { .. } => {
                    let values = string_values(df, &column.name)?;
                    for (row, value) in values.iter().enumerate() {
                        let start = row * width + offset;
                        column.encode_into(value.as_deref(), &mut data[start..start + w])?;
                    }
                }
                Domain::Continuous { .. } => {
                    let (values, _) = numeric_values(df, &column.name)?;
                    for (row, value) in values.iter().enumerate() {
                        let value = value.ok_or_else(|| {
                            PmmlError::EvaluationError(format!(
                                "missing or non-numeric value in row {} of '{}'",
                                row, column.name
                            ))
                        })?;
                        let start = row * width + offset;
                        column.encode_number(value, &mut data[start..start + w])?;
                    }
                }
            }
            offset += w;
        }

        Ok(Array2::from_shape_vec((n_rows, width), data)?)
    }

    /// Encode one raw record into a feature vector
    pub fn encode_record(&self, record: &Record) -> Result<Array1<f64>> {
        let mut data = vec![0.0; self.n_features()];
        let mut offset = 0;
        for column in &self.columns {
            let w = column.width();
            column.encode_into(record.get(&column.name).map(String::as_str), &mut data[offset..offset + w])?;
            offset += w;
        }
        Ok(Array1::from_vec(data))
    }

    pub fn data_fields(&self) -> Vec<DataField> {
        self.columns.iter().map(FittedColumn::data_field).collect()
    }

    pub fn derived_fields(&self) -> Vec<DerivedField> {
        self.columns.iter().flat_map(FittedColumn::derived_fields).collect()
    }

    /// Derived field names must not clash with the data dictionary
    /// (`target` plus the declared columns) or with each other.
    pub fn check_field_names(&self, target: &str) -> Result<()> {
        let derived_fields = self.derived_fields();
        let mut names: HashSet<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        names.insert(target);

        for derived in &derived_fields {
            if !names.insert(derived.name.as_str()) {
                return Err(PmmlError::SchemaMismatch(format!(
                    "derived field '{}' clashes with another field of the same name",
                    derived.name
                )));
            }
        }
        Ok(())
    }
}
