//! Fit-and-export pipeline
//!
//! Binds role declarations, fitted encoders and a fitted estimator into a
//! [`PmmlPipeline`] and writes it out as PMML.

mod config;
mod export;
mod pmml_pipeline;

pub use config::PipelineConfig;
pub use export::{build_and_export, ExportOptions};
pub use pmml_pipeline::{PmmlPipeline, TargetField};
