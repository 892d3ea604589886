//! Data loading utilities

use crate::error::{PmmlError, Result};
use polars::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// One raw input row, keyed by column name. Missing cells are absent.
pub type Record = HashMap<String, String>;

/// CSV loader backed by polars
pub struct DataLoader {
    /// Rows scanned for schema inference (None = whole file)
    infer_schema_length: Option<usize>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader that infers the schema from the whole file
    pub fn new() -> Self {
        Self {
            infer_schema_length: None,
        }
    }

    /// Limit schema inference to the first `n` rows
    pub fn with_infer_schema_length(mut self, n: usize) -> Self {
        self.infer_schema_length = Some(n);
        self
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| PmmlError::DataError(format!("{}: {}", path.display(), e)))?;

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| PmmlError::DataError(format!("{}: {}", path.display(), e)))?;

        debug!(path = %path.display(), rows = df.height(), cols = df.width(), "Loaded CSV");
        Ok(df)
    }
}

/// Save DataFrame to CSV
pub struct DataSaver;

impl DataSaver {
    /// Save to CSV
    pub fn save_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path.as_ref())
            .map_err(|e| PmmlError::DataError(e.to_string()))?;

        CsvWriter::new(&mut file)
            .finish(df)
            .map_err(|e| PmmlError::DataError(e.to_string()))
    }
}

/// Name of the last column, the conventional target of a training CSV
pub fn default_target(df: &DataFrame) -> Result<String> {
    df.get_column_names()
        .last()
        .map(|name| name.to_string())
        .ok_or_else(|| PmmlError::SchemaMismatch("dataset has no columns".to_string()))
}

/// Render the first `n` rows for console inspection
pub fn preview(df: &DataFrame, n: usize) -> String {
    format!("{}", df.head(Some(n)))
}

/// Column values rendered as strings, the way they appear in a raw record
pub fn string_values(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    let series = df
        .column(column)
        .map_err(|_| PmmlError::SchemaMismatch(format!("column '{}' not found", column)))?
        .as_materialized_series();

    let as_str = series.cast(&DataType::String)?;
    let values = as_str
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect();
    Ok(values)
}

/// Column values as f64. Returns the values and the number of cells that
/// were present but could not be read as numbers.
pub fn numeric_values(df: &DataFrame, column: &str) -> Result<(Vec<Option<f64>>, usize)> {
    let series = df
        .column(column)
        .map_err(|_| PmmlError::SchemaMismatch(format!("column '{}' not found", column)))?
        .as_materialized_series();

    let original_nulls = series.null_count();
    let as_f64 = series.cast(&DataType::Float64)?;
    let unparsable = as_f64.null_count().saturating_sub(original_nulls);

    let values: Vec<Option<f64>> = as_f64.f64()?.into_iter().collect();
    Ok((values, unparsable))
}

/// Convert every row into a [`Record`] of raw string values
pub fn frame_to_records(df: &DataFrame) -> Result<Vec<Record>> {
    let names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    let columns: Vec<Vec<Option<String>>> = names
        .iter()
        .map(|name| string_values(df, name))
        .collect::<Result<Vec<_>>>()?;

    let records = (0..df.height())
        .map(|row| {
            names
                .iter()
                .zip(columns.iter())
                .filter_map(|(name, values)| {
                    values[row].as_ref().map(|v| (name.clone(), v.clone()))
                })
                .collect::<Record>()
        })
        .collect();

    Ok(records)
}
