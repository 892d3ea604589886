//! One-call fit and export

use super::PmmlPipeline;
use crate::error::{PmmlError, Result};
use crate::preprocessing::{validate_schema, DataFrameMapper};
use crate::training::{describe, Estimator};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Serialization options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Minimal XML: no whitespace, no node ids, scores on leaves only and
    /// one-hot splits written against the raw field
    pub compact: bool,
    /// Embed the pipeline representation string in the header
    pub with_repr: bool,
}

/// Validate, fit and serialize a pipeline in one step.
///
/// `excluded` columns are ignored; every other non-target column must have
/// exactly one role in `mapper`. The artifact at `output` is replaced
/// atomically. The fitted pipeline is returned for further use.
pub fn build_and_export(
    df: &DataFrame,
    target: &str,
    excluded: &[String],
    mapper: DataFrameMapper,
    estimator: Box<dyn Estimator>,
    output: impl AsRef<Path>,
    options: ExportOptions,
) -> Result<PmmlPipeline> {
    let output = output.as_ref();

    validate_schema(df, target, excluded, &mapper)?;
    if df.height() == 0 {
        return Err(PmmlError::EmptyDatasetError);
    }

    info!(
        rows = df.height(),
        target_column = target,
        mapper = %mapper,
        estimator = %describe(estimator.as_ref()),
        "Fitting pipeline"
    );

    let mut pipeline = PmmlPipeline::fit(df, target, mapper, estimator)?;
    pipeline.configure(options);
    pipeline.write_pmml(output)?;

    info!(path = %output.display(), compact = options.compact, "PMML written");
    Ok(pipeline)
}
