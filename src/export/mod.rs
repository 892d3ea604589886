//! PMML document model and its consumers
//!
//! - [`PMMLExporter`] writes a document as PMML 4.4 XML
//! - [`PMMLReader`] parses the subset the exporter writes back into a document
//! - [`ModelEvaluator`] scores raw records against a document
//! - [`recount`] rebuilds node record counts from a dataset

mod evaluator;
pub(crate) mod pmml;
mod reader;
mod record_count;

pub use evaluator::ModelEvaluator;
pub use pmml::{
    BooleanOperator, DataField, DerivedField, Expression, Extension, FieldUsageType, Interval,
    InvalidValueTreatment, MiningField, MiningFunction, MiningModel, MultipleModelMethod, Node,
    OpType, Operator, OutputField, PMMLDataType, PMMLDocument, PMMLExporter, PMMLHeader, PMMLModel,
    ScoreDistribution, Segment, TreeModel, TreePredicate, INLINE_TABLE_NAMESPACE, PMML_NAMESPACE,
    PMML_VERSION,
};
pub use reader::PMMLReader;
pub use record_count::{recount, RecordCountCleaner, RecordCounter};
