//! pmml-pipeline - tabular model export to PMML
//!
//! Declare a preprocessing role for every feature column, fit a tree
//! estimator, and write preprocessing and model together as one PMML 4.4
//! document that scores raw records without this crate.
//!
//! # Modules
//!
//! - [`preprocessing`] - Column roles, domains, categorical encoders, the column mapper
//! - [`training`] - Decision tree and random forest estimators
//! - [`pipeline`] - Fitted pipeline and the one-call `build_and_export`
//! - [`export`] - PMML document model, writer, reader, evaluator, record counts
//! - [`cli`] - Command-line interface
//!
//! ```no_run
//! use pmml_pipeline::prelude::*;
//!
//! let df = DataLoader::new().load_csv("csv/Auto.csv")?;
//! let mapper = DataFrameMapper::new()
//!     .categorical("cylinders")
//!     .continuous("displacement");
//! let forest = RandomForest::new_regressor(31).with_max_depth(5).with_random_state(13);
//!
//! build_and_export(&df, "mpg", &[], mapper, Box::new(forest), "RandomForestAuto.pmml", ExportOptions::default())?;
//! # Ok::<(), pmml_pipeline::PmmlError>(())
//! ```

// Core error handling
pub mod error;

pub mod export;
pub mod pipeline;
pub mod preprocessing;
pub mod training;
pub mod utils;

pub mod cli;

pub use error::{PmmlError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{PmmlError, Result};

    // Preprocessing
    pub use crate::preprocessing::{CategoricalEncoder, ColumnRole, ColumnSpec, DataFrameMapper, Feature};

    // Training
    pub use crate::training::{
        DecisionTree, Estimator, EstimatorConfig, MaxFeatures, Prediction, RandomForest, TaskType,
    };

    // Pipeline
    pub use crate::pipeline::{build_and_export, ExportOptions, PipelineConfig, PmmlPipeline};

    // Export
    pub use crate::export::{recount, ModelEvaluator, PMMLDocument, PMMLExporter, PMMLReader};

    pub use crate::utils::data_loader::{DataLoader, Record};
}
