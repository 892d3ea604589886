//! PMML (Predictive Model Markup Language) document model and XML writer
//!
//! The document model covers the subset of PMML 4.4 produced by the
//! pipeline: a data dictionary, a transformation dictionary with one-hot
//! and label encodings, and tree models, optionally combined into a
//! segmented mining model.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{PmmlError, Result};

pub const PMML_VERSION: &str = "4.4";
pub const PMML_NAMESPACE: &str = "http://www.dmg.org/PMML-4_4";
pub const INLINE_TABLE_NAMESPACE: &str = "http://jpmml.org/jpmml-model/InlineTable";

/// PMML data type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PMMLDataType {
    Double,
    Float,
    Integer,
    String,
    Boolean,
}

impl PMMLDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PMMLDataType::Double => "double",
            PMMLDataType::Float => "float",
            PMMLDataType::Integer => "integer",
            PMMLDataType::String => "string",
            PMMLDataType::Boolean => "boolean",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "double" => Ok(PMMLDataType::Double),
            "float" => Ok(PMMLDataType::Float),
            "integer" => Ok(PMMLDataType::Integer),
            "string" => Ok(PMMLDataType::String),
            "boolean" => Ok(PMMLDataType::Boolean),
            other => Err(PmmlError::UnsupportedError(format!("dataType '{}'", other))),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, PMMLDataType::Double | PMMLDataType::Float | PMMLDataType::Integer)
    }
}

/// PMML operational type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    Categorical,
    Ordinal,
    Continuous,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Categorical => "categorical",
            OpType::Ordinal => "ordinal",
            OpType::Continuous => "continuous",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "categorical" => Ok(OpType::Categorical),
            "ordinal" => Ok(OpType::Ordinal),
            "continuous" => Ok(OpType::Continuous),
            other => Err(PmmlError::UnsupportedError(format!("optype '{}'", other))),
        }
    }
}

/// PMML field usage type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUsageType {
    Active,
    Target,
    Predicted,
    Supplementary,
}

impl FieldUsageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldUsageType::Active => "active",
            FieldUsageType::Target => "target",
            FieldUsageType::Predicted => "predicted",
            FieldUsageType::Supplementary => "supplementary",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(FieldUsageType::Active),
            "target" => Ok(FieldUsageType::Target),
            "predicted" => Ok(FieldUsageType::Predicted),
            "supplementary" => Ok(FieldUsageType::Supplementary),
            other => Err(PmmlError::UnsupportedError(format!("usageType '{}'", other))),
        }
    }
}

/// Treatment of values outside the declared domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidValueTreatment {
    ReturnInvalid,
    AsIs,
    AsMissing,
}

impl InvalidValueTreatment {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidValueTreatment::ReturnInvalid => "returnInvalid",
            InvalidValueTreatment::AsIs => "asIs",
            InvalidValueTreatment::AsMissing => "asMissing",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "returnInvalid" => Ok(InvalidValueTreatment::ReturnInvalid),
            "asIs" => Ok(InvalidValueTreatment::AsIs),
            "asMissing" => Ok(InvalidValueTreatment::AsMissing),
            other => Err(PmmlError::UnsupportedError(format!("invalidValueTreatment '{}'", other))),
        }
    }
}

/// Closed numeric range of a continuous field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub left_margin: f64,
    pub right_margin: f64,
}

impl Interval {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.left_margin && value <= self.right_margin
    }
}

/// PMML data field definition
#[derive(Debug, Clone, PartialEq)]
pub struct DataField {
    pub name: String,
    pub data_type: PMMLDataType,
    pub op_type: OpType,
    pub values: Vec<String>,
    pub interval: Option<Interval>,
}

impl DataField {
    /// Create continuous field
    pub fn continuous(name: impl Into<String>, data_type: PMMLDataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            op_type: OpType::Continuous,
            values: Vec::new(),
            interval: None,
        }
    }

    /// Create categorical field
    pub fn categorical(name: impl Into<String>, data_type: PMMLDataType, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            data_type,
            op_type: OpType::Categorical,
            values,
            interval: None,
        }
    }

    pub fn with_interval(mut self, left_margin: f64, right_margin: f64) -> Self {
        self.interval = Some(Interval { left_margin, right_margin });
        self
    }
}

/// Expression computing a derived field
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    FieldRef { field: String },
    /// 1.0 when `field` equals `value`, 0.0 otherwise
    NormDiscrete { field: String, value: String },
    /// Lookup table from input value to output value
    MapValues {
        field: String,
        output_data_type: PMMLDataType,
        entries: Vec<(String, String)>,
    },
}

/// Derived field in the transformation dictionary
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedField {
    pub name: String,
    pub op_type: OpType,
    pub data_type: PMMLDataType,
    pub expression: Expression,
}

/// PMML mining field
#[derive(Debug, Clone, PartialEq)]
pub struct MiningField {
    pub name: String,
    pub usage_type: FieldUsageType,
    pub invalid_value_treatment: Option<InvalidValueTreatment>,
}

impl MiningField {
    pub fn active(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            usage_type: FieldUsageType::Active,
            invalid_value_treatment: None,
        }
    }

    pub fn target(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            usage_type: FieldUsageType::Target,
            invalid_value_treatment: None,
        }
    }

    pub fn with_invalid_value_treatment(mut self, treatment: InvalidValueTreatment) -> Self {
        self.invalid_value_treatment = Some(treatment);
        self
    }
}

/// Output field declared by a model
#[derive(Debug, Clone, PartialEq)]
pub struct OutputField {
    pub name: String,
    pub op_type: OpType,
    pub data_type: PMMLDataType,
    pub feature: String,
    pub value: Option<String>,
}

impl OutputField {
    pub fn probability(class: &str) -> Self {
        Self {
            name: format!("probability({})", class),
            op_type: OpType::Continuous,
            data_type: PMMLDataType::Double,
            feature: "probability".to_string(),
            value: Some(class.to_string()),
        }
    }
}

/// Mining function of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningFunction {
    Classification,
    Regression,
}

impl MiningFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MiningFunction::Classification => "classification",
            MiningFunction::Regression => "regression",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "classification" => Ok(MiningFunction::Classification),
            "regression" => Ok(MiningFunction::Regression),
            other => Err(PmmlError::UnsupportedError(format!("functionName '{}'", other))),
        }
    }
}

/// Comparison operator of a simple predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "equal",
            Operator::NotEqual => "notEqual",
            Operator::LessThan => "lessThan",
            Operator::LessOrEqual => "lessOrEqual",
            Operator::GreaterThan => "greaterThan",
            Operator::GreaterOrEqual => "greaterOrEqual",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "equal" => Ok(Operator::Equal),
            "notEqual" => Ok(Operator::NotEqual),
            "lessThan" => Ok(Operator::LessThan),
            "lessOrEqual" => Ok(Operator::LessOrEqual),
            "greaterThan" => Ok(Operator::GreaterThan),
            "greaterOrEqual" => Ok(Operator::GreaterOrEqual),
            other => Err(PmmlError::UnsupportedError(format!("operator '{}'", other))),
        }
    }
}

/// Boolean operator of a compound predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOperator {
    And,
    Or,
}

impl BooleanOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BooleanOperator::And => "and",
            BooleanOperator::Or => "or",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "and" => Ok(BooleanOperator::And),
            "or" => Ok(BooleanOperator::Or),
            other => Err(PmmlError::UnsupportedError(format!("booleanOperator '{}'", other))),
        }
    }
}

/// Tree predicate for splits
#[derive(Debug, Clone, PartialEq)]
pub enum TreePredicate {
    True,
    False,
    SimplePredicate {
        field: String,
        operator: Operator,
        value: String,
    },
    CompoundPredicate {
        boolean_operator: BooleanOperator,
        predicates: Vec<TreePredicate>,
    },
}

/// Class count (and probability) at a tree node
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreDistribution {
    pub value: String,
    pub record_count: f64,
    pub probability: Option<f64>,
    pub confidence: Option<f64>,
}

/// Decision tree node
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: Option<String>,
    pub score: Option<String>,
    pub record_count: Option<f64>,
    pub predicate: TreePredicate,
    pub score_distributions: Vec<ScoreDistribution>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Visit this node and all descendants, parents first
    pub fn visit_mut(&mut self, f: &mut dyn FnMut(&mut Node)) {
        f(self);
        for child in &mut self.children {
            child.visit_mut(f);
        }
    }

    pub fn count_nodes(&self) -> usize {
        1 + self.children.iter().map(Node::count_nodes).sum::<usize>()
    }
}

/// PMML tree model
#[derive(Debug, Clone, PartialEq)]
pub struct TreeModel {
    pub model_name: Option<String>,
    pub function: MiningFunction,
    pub algorithm_name: Option<String>,
    pub split_characteristic: String,
    pub no_true_child_strategy: Option<String>,
    pub mining_schema: Vec<MiningField>,
    pub output: Vec<OutputField>,
    pub root: Node,
}

/// Ensemble combination rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipleModelMethod {
    MajorityVote,
    WeightedMajorityVote,
    Average,
    WeightedAverage,
    Median,
    WeightedMedian,
    Sum,
    WeightedSum,
    SelectFirst,
    SelectAll,
    ModelChain,
}

impl MultipleModelMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MultipleModelMethod::MajorityVote => "majorityVote",
            MultipleModelMethod::WeightedMajorityVote => "weightedMajorityVote",
            MultipleModelMethod::Average => "average",
            MultipleModelMethod::WeightedAverage => "weightedAverage",
            MultipleModelMethod::Median => "median",
            MultipleModelMethod::WeightedMedian => "weightedMedian",
            MultipleModelMethod::Sum => "sum",
            MultipleModelMethod::WeightedSum => "weightedSum",
            MultipleModelMethod::SelectFirst => "selectFirst",
            MultipleModelMethod::SelectAll => "selectAll",
            MultipleModelMethod::ModelChain => "modelChain",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "majorityVote" => Ok(MultipleModelMethod::MajorityVote),
            "weightedMajorityVote" => Ok(MultipleModelMethod::WeightedMajorityVote),
            "average" => Ok(MultipleModelMethod::Average),
            "weightedAverage" => Ok(MultipleModelMethod::WeightedAverage),
            "median" => Ok(MultipleModelMethod::Median),
            "weightedMedian" => Ok(MultipleModelMethod::WeightedMedian),
            "sum" => Ok(MultipleModelMethod::Sum),
            "weightedSum" => Ok(MultipleModelMethod::WeightedSum),
            "selectFirst" => Ok(MultipleModelMethod::SelectFirst),
            "selectAll" => Ok(MultipleModelMethod::SelectAll),
            "modelChain" => Ok(MultipleModelMethod::ModelChain),
            other => Err(PmmlError::UnsupportedError(format!("multipleModelMethod '{}'", other))),
        }
    }
}

/// One member of a segmentation
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub id: String,
    pub weight: f64,
    pub model: TreeModel,
}

/// PMML mining model (tree ensemble)
#[derive(Debug, Clone, PartialEq)]
pub struct MiningModel {
    pub model_name: Option<String>,
    pub function: MiningFunction,
    pub algorithm_name: Option<String>,
    pub mining_schema: Vec<MiningField>,
    pub output: Vec<OutputField>,
    pub multiple_model_method: MultipleModelMethod,
    pub segments: Vec<Segment>,
}

/// PMML model types
#[derive(Debug, Clone, PartialEq)]
pub enum PMMLModel {
    Tree(TreeModel),
    Mining(MiningModel),
}

impl PMMLModel {
    pub fn function(&self) -> MiningFunction {
        match self {
            PMMLModel::Tree(tree) => tree.function,
            PMMLModel::Mining(mining) => mining.function,
        }
    }

    pub fn mining_schema(&self) -> &[MiningField] {
        match self {
            PMMLModel::Tree(tree) => &tree.mining_schema,
            PMMLModel::Mining(mining) => &mining.mining_schema,
        }
    }

    pub fn output(&self) -> &[OutputField] {
        match self {
            PMMLModel::Tree(tree) => &tree.output,
            PMMLModel::Mining(mining) => &mining.output,
        }
    }

    /// All tree models, in segment order
    pub fn trees(&self) -> Vec<&TreeModel> {
        match self {
            PMMLModel::Tree(tree) => vec![tree],
            PMMLModel::Mining(mining) => mining.segments.iter().map(|s| &s.model).collect(),
        }
    }

    pub fn trees_mut(&mut self) -> Vec<&mut TreeModel> {
        match self {
            PMMLModel::Tree(tree) => vec![tree],
            PMMLModel::Mining(mining) => mining.segments.iter_mut().map(|s| &mut s.model).collect(),
        }
    }
}

/// Header extension element
#[derive(Debug, Clone, PartialEq)]
pub struct Extension {
    pub name: String,
    pub content: String,
}

/// PMML header
#[derive(Debug, Clone, PartialEq)]
pub struct PMMLHeader {
    pub copyright: Option<String>,
    pub description: Option<String>,
    pub application_name: String,
    pub application_version: String,
    pub timestamp: Option<String>,
    pub extensions: Vec<Extension>,
}

impl Default for PMMLHeader {
    fn default() -> Self {
        Self {
            copyright: None,
            description: None,
            application_name: env!("CARGO_PKG_NAME").to_string(),
            application_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: None,
            extensions: Vec::new(),
        }
    }
}

/// Complete PMML document
#[derive(Debug, Clone, PartialEq)]
pub struct PMMLDocument {
    pub version: String,
    pub header: PMMLHeader,
    pub data_dictionary: Vec<DataField>,
    pub transformation_dictionary: Vec<DerivedField>,
    pub model: PMMLModel,
}

impl PMMLDocument {
    pub fn data_field(&self, name: &str) -> Option<&DataField> {
        self.data_dictionary.iter().find(|f| f.name == name)
    }

    pub fn derived_field(&self, name: &str) -> Option<&DerivedField> {
        self.transformation_dictionary.iter().find(|f| f.name == name)
    }

    /// Name of the single target field
    pub fn target_field(&self) -> Result<&str> {
        let targets: Vec<&MiningField> = self
            .model
            .mining_schema()
            .iter()
            .filter(|f| f.usage_type == FieldUsageType::Target)
            .collect();

        match targets.as_slice() {
            [target] => Ok(target.name.as_str()),
            _ => Err(PmmlError::UnsupportedError(format!(
                "expected exactly one target field, found {}",
                targets.len()
            ))),
        }
    }

    /// Names of the active input fields
    pub fn active_fields(&self) -> Vec<&str> {
        self.model
            .mining_schema()
            .iter()
            .filter(|f| f.usage_type == FieldUsageType::Active)
            .map(|f| f.name.as_str())
            .collect()
    }
}

type Attrs<'a> = Vec<(&'a str, String)>;

/// Streams XML elements, indented unless compact
struct XmlSink<'w, W: Write> {
    writer: &'w mut W,
    compact: bool,
    depth: usize,
}

impl<'w, W: Write> XmlSink<'w, W> {
    fn line(&mut self, content: &str) -> Result<()> {
        if self.compact {
            write!(self.writer, "{}", content).map_err(PMMLExporter::io_err)
        } else {
            writeln!(self.writer, "{}{}", "  ".repeat(self.depth), content)
                .map_err(PMMLExporter::io_err)
        }
    }

    fn tag(name: &str, attrs: &Attrs<'_>) -> String {
        let mut out = format!("<{}", name);
        for (key, value) in attrs {
            out.push_str(&format!(" {}=\"{}\"", key, PMMLExporter::escape_xml(value)));
        }
        out
    }

    fn start(&mut self, name: &str, attrs: Attrs<'_>) -> Result<()> {
        let tag = Self::tag(name, &attrs);
        self.line(&format!("{}>", tag))?;
        self.depth += 1;
        Ok(())
    }

    fn empty(&mut self, name: &str, attrs: Attrs<'_>) -> Result<()> {
        let tag = Self::tag(name, &attrs);
        self.line(&format!("{}/>", tag))
    }

    fn text(&mut self, name: &str, attrs: Attrs<'_>, text: &str) -> Result<()> {
        let tag = Self::tag(name, &attrs);
        self.line(&format!("{}>{}</{}>", tag, PMMLExporter::escape_xml(text), name))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.depth = self.depth.saturating_sub(1);
        self.line(&format!("</{}>", name))
    }
}

/// PMML exporter
pub struct PMMLExporter {
    compact: bool,
}

impl PMMLExporter {
    /// Create new exporter producing indented XML
    pub fn new() -> Self {
        Self { compact: false }
    }

    /// Drop insignificant whitespace from the output
    pub fn with_compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Export PMML document to file. The file is replaced atomically, so a
    /// failed export never leaves a partial document behind.
    pub fn export(&self, doc: &PMMLDocument, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir()?,
        };

        if !dir.is_dir() {
            return Err(PmmlError::SerializationError(format!(
                "output directory {} does not exist",
                dir.display()
            )));
        }

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| {
            PmmlError::SerializationError(format!("Failed to create file in {}: {}", dir.display(), e))
        })?;

        {
            let mut writer = std::io::BufWriter::new(tmp.as_file_mut());
            self.write_pmml(&mut writer, doc)?;
            writer.flush().map_err(Self::io_err)?;
        }
        tmp.as_file().sync_all().map_err(Self::io_err)?;

        if path.is_dir() {
            return Err(PmmlError::SerializationError(format!(
                "{} is a directory",
                path.display()
            )));
        }

        tmp.persist(path).map_err(|e| {
            PmmlError::SerializationError(format!("Failed to write {}: {}", path.display(), e.error))
        })?;

        if let Ok(meta) = fs::metadata(path) {
            tracing::debug!(path = %path.display(), bytes = meta.len(), "PMML written");
        }
        Ok(())
    }

    /// Export to string
    pub fn export_to_string(&self, doc: &PMMLDocument) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_pmml(&mut buffer, doc)?;
        String::from_utf8(buffer).map_err(|e| {
            PmmlError::SerializationError(format!("Invalid UTF-8: {}", e))
        })
    }

    pub fn write_pmml<W: Write>(&self, writer: &mut W, doc: &PMMLDocument) -> Result<()> {
        let mut sink = XmlSink {
            writer,
            compact: self.compact,
            depth: 0,
        };

        sink.line("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>")?;
        sink.start(
            "PMML",
            vec![
                ("xmlns", PMML_NAMESPACE.to_string()),
                ("xmlns:data", INLINE_TABLE_NAMESPACE.to_string()),
                ("version", doc.version.clone()),
            ],
        )?;

        self.write_header(&mut sink, &doc.header)?;
        self.write_data_dictionary(&mut sink, &doc.data_dictionary)?;
        if !doc.transformation_dictionary.is_empty() {
            self.write_transformation_dictionary(&mut sink, &doc.transformation_dictionary)?;
        }

        match &doc.model {
            PMMLModel::Tree(tree) => self.write_tree_model(&mut sink, tree)?,
            PMMLModel::Mining(mining) => self.write_mining_model(&mut sink, mining)?,
        }

        sink.end("PMML")?;
        if sink.compact {
            writeln!(sink.writer).map_err(Self::io_err)?;
        }
        Ok(())
    }

    fn write_header<W: Write>(&self, sink: &mut XmlSink<'_, W>, header: &PMMLHeader) -> Result<()> {
        let mut attrs = Vec::new();
        if let Some(ref copyright) = header.copyright {
            attrs.push(("copyright", copyright.clone()));
        }
        if let Some(ref desc) = header.description {
            attrs.push(("description", desc.clone()));
        }
        sink.start("Header", attrs)?;

        for extension in &header.extensions {
            sink.text("Extension", vec![("name", extension.name.clone())], &extension.content)?;
        }

        sink.empty(
            "Application",
            vec![
                ("name", header.application_name.clone()),
                ("version", header.application_version.clone()),
            ],
        )?;

        if let Some(ref timestamp) = header.timestamp {
            sink.text("Timestamp", Vec::new(), timestamp)?;
        }

        sink.end("Header")
    }

    fn write_data_dictionary<W: Write>(&self, sink: &mut XmlSink<'_, W>, fields: &[DataField]) -> Result<()> {
        sink.start("DataDictionary", vec![("numberOfFields", fields.len().to_string())])?;

        for field in fields {
            let attrs = vec![
                ("name", field.name.clone()),
                ("optype", field.op_type.as_str().to_string()),
                ("dataType", field.data_type.as_str().to_string()),
            ];

            if field.values.is_empty() && field.interval.is_none() {
                sink.empty("DataField", attrs)?;
                continue;
            }

            sink.start("DataField", attrs)?;
            if let Some(interval) = field.interval {
                sink.empty(
                    "Interval",
                    vec![
                        ("closure", "closedClosed".to_string()),
                        ("leftMargin", interval.left_margin.to_string()),
                        ("rightMargin", interval.right_margin.to_string()),
                    ],
                )?;
            }
            for val in &field.values {
                sink.empty("Value", vec![("value", val.clone())])?;
            }
            sink.end("DataField")?;
        }

        sink.end("DataDictionary")
    }

    fn write_transformation_dictionary<W: Write>(
        &self,
        sink: &mut XmlSink<'_, W>,
        fields: &[DerivedField],
    ) -> Result<()> {
        sink.start("TransformationDictionary", Vec::new())?;

        for field in fields {
            sink.start(
                "DerivedField",
                vec![
                    ("name", field.name.clone()),
                    ("optype", field.op_type.as_str().to_string()),
                    ("dataType", field.data_type.as_str().to_string()),
                ],
            )?;
            self.write_expression(sink, &field.expression)?;
            sink.end("DerivedField")?;
        }

        sink.end("TransformationDictionary")
    }

    fn write_expression<W: Write>(&self, sink: &mut XmlSink<'_, W>, expression: &Expression) -> Result<()> {
        match expression {
            Expression::FieldRef { field } => {
                sink.empty("FieldRef", vec![("field", field.clone())])
            }
            Expression::NormDiscrete { field, value } => sink.empty(
                "NormDiscrete",
                vec![("field", field.clone()), ("value", value.clone())],
            ),
            Expression::MapValues { field, output_data_type, entries } => {
                sink.start(
                    "MapValues",
                    vec![
                        ("outputColumn", "data:output".to_string()),
                        ("dataType", output_data_type.as_str().to_string()),
                    ],
                )?;
                sink.empty(
                    "FieldColumnPair",
                    vec![("field", field.clone()), ("column", "data:input".to_string())],
                )?;
                sink.start("InlineTable", Vec::new())?;
                for (input, output) in entries {
                    sink.start("row", Vec::new())?;
                    sink.text("data:input", Vec::new(), input)?;
                    sink.text("data:output", Vec::new(), output)?;
                    sink.end("row")?;
                }
                sink.end("InlineTable")?;
                sink.end("MapValues")
            }
        }
    }

    fn write_mining_schema<W: Write>(&self, sink: &mut XmlSink<'_, W>, fields: &[MiningField]) -> Result<()> {
        sink.start("MiningSchema", Vec::new())?;

        for field in fields {
            let mut attrs = vec![("name", field.name.clone())];
            if field.usage_type != FieldUsageType::Active {
                attrs.push(("usageType", field.usage_type.as_str().to_string()));
            }
            if let Some(treatment) = field.invalid_value_treatment {
                attrs.push(("invalidValueTreatment", treatment.as_str().to_string()));
            }
            sink.empty("MiningField", attrs)?;
        }

        sink.end("MiningSchema")
    }

    fn write_output<W: Write>(&self, sink: &mut XmlSink<'_, W>, fields: &[OutputField]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        sink.start("Output", Vec::new())?;
        for field in fields {
            let mut attrs = vec![
                ("name", field.name.clone()),
                ("optype", field.op_type.as_str().to_string()),
                ("dataType", field.data_type.as_str().to_string()),
                ("feature", field.feature.clone()),
            ];
            if let Some(ref value) = field.value {
                attrs.push(("value", value.clone()));
            }
            sink.empty("OutputField", attrs)?;
        }
        sink.end("Output")
    }

    fn write_mining_model<W: Write>(&self, sink: &mut XmlSink<'_, W>, model: &MiningModel) -> Result<()> {
        let mut attrs = vec![("functionName", model.function.as_str().to_string())];
        if let Some(ref name) = model.model_name {
            attrs.push(("modelName", name.clone()));
        }
        if let Some(ref algo) = model.algorithm_name {
            attrs.push(("algorithmName", algo.clone()));
        }
        sink.start("MiningModel", attrs)?;

        self.write_mining_schema(sink, &model.mining_schema)?;
        self.write_output(sink, &model.output)?;

        sink.start(
            "Segmentation",
            vec![("multipleModelMethod", model.multiple_model_method.as_str().to_string())],
        )?;
        for segment in &model.segments {
            let mut attrs = vec![("id", segment.id.clone())];
            if segment.weight != 1.0 {
                attrs.push(("weight", segment.weight.to_string()));
            }
            sink.start("Segment", attrs)?;
            sink.empty("True", Vec::new())?;
            self.write_tree_model(sink, &segment.model)?;
            sink.end("Segment")?;
        }
        sink.end("Segmentation")?;

        sink.end("MiningModel")
    }

    fn write_tree_model<W: Write>(&self, sink: &mut XmlSink<'_, W>, model: &TreeModel) -> Result<()> {
        let mut attrs = vec![("functionName", model.function.as_str().to_string())];
        if let Some(ref name) = model.model_name {
            attrs.push(("modelName", name.clone()));
        }
        if let Some(ref algo) = model.algorithm_name {
            attrs.push(("algorithmName", algo.clone()));
        }
        if let Some(ref strategy) = model.no_true_child_strategy {
            attrs.push(("noTrueChildStrategy", strategy.clone()));
        }
        attrs.push(("splitCharacteristic", model.split_characteristic.clone()));
        sink.start("TreeModel", attrs)?;

        self.write_mining_schema(sink, &model.mining_schema)?;
        self.write_output(sink, &model.output)?;
        self.write_tree_node(sink, &model.root)?;

        sink.end("TreeModel")
    }

    fn write_tree_node<W: Write>(&self, sink: &mut XmlSink<'_, W>, node: &Node) -> Result<()> {
        let mut attrs = Vec::new();
        if let Some(ref id) = node.id {
            attrs.push(("id", id.clone()));
        }
        if let Some(ref score) = node.score {
            attrs.push(("score", score.clone()));
        }
        if let Some(count) = node.record_count {
            attrs.push(("recordCount", count.to_string()));
        }
        sink.start("Node", attrs)?;

        self.write_predicate(sink, &node.predicate)?;

        for dist in &node.score_distributions {
            let mut attrs = vec![
                ("value", dist.value.clone()),
                ("recordCount", dist.record_count.to_string()),
            ];
            if let Some(p) = dist.probability {
                attrs.push(("probability", p.to_string()));
            }
            if let Some(c) = dist.confidence {
                attrs.push(("confidence", c.to_string()));
            }
            sink.empty("ScoreDistribution", attrs)?;
        }

        for child in &node.children {
            self.write_tree_node(sink, child)?;
        }

        sink.end("Node")
    }

    fn write_predicate<W: Write>(&self, sink: &mut XmlSink<'_, W>, predicate: &TreePredicate) -> Result<()> {
        match predicate {
            TreePredicate::True => sink.empty("True", Vec::new()),
            TreePredicate::False => sink.empty("False", Vec::new()),
            TreePredicate::SimplePredicate { field, operator, value } => sink.empty(
                "SimplePredicate",
                vec![
                    ("field", field.clone()),
                    ("operator", operator.as_str().to_string()),
                    ("value", value.clone()),
                ],
            ),
            TreePredicate::CompoundPredicate { boolean_operator, predicates } => {
                sink.start(
                    "CompoundPredicate",
                    vec![("booleanOperator", boolean_operator.as_str().to_string())],
                )?;
                for pred in predicates {
                    self.write_predicate(sink, pred)?;
                }
                sink.end("CompoundPredicate")
            }
        }
    }

    pub(crate) fn escape_xml(s: &str) -> String {
        s.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&apos;")
    }

    fn io_err(e: std::io::Error) -> PmmlError {
        PmmlError::SerializationError(format!("Failed to write PMML: {}", e))
    }
}

impl Default for PMMLExporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A two-leaf classification tree over one one-hot indicator
    pub(crate) fn sample_document() -> PMMLDocument {
        let leaf = |id: &str, score: &str, no: f64, yes: f64, pred: TreePredicate| Node {
            id: Some(id.to_string()),
            score: Some(score.to_string()),
            record_count: Some(no + yes),
            predicate: pred,
            score_distributions: vec![
                ScoreDistribution {
                    value: "0".to_string(),
                    record_count: no,
                    probability: Some(no / (no + yes)),
                    confidence: None,
                },
                ScoreDistribution {
                    value: "1".to_string(),
                    record_count: yes,
                    probability: Some(yes / (no + yes)),
                    confidence: None,
                },
            ],
            children: Vec::new(),
        };

        let root = Node {
            id: Some("1".to_string()),
            score: Some("0".to_string()),
            record_count: Some(10.0),
            predicate: TreePredicate::True,
            score_distributions: Vec::new(),
            children: vec![
                leaf("2", "0", 5.0, 1.0, TreePredicate::SimplePredicate {
                    field: "Gender=Male".to_string(),
                    operator: Operator::LessOrEqual,
                    value: "0.5".to_string(),
                }),
                leaf("3", "1", 1.0, 3.0, TreePredicate::SimplePredicate {
                    field: "Gender=Male".to_string(),
                    operator: Operator::GreaterThan,
                    value: "0.5".to_string(),
                }),
            ],
        };

        let schema = vec![
            MiningField::target("Adjusted"),
            MiningField::active("Gender").with_invalid_value_treatment(InvalidValueTreatment::ReturnInvalid),
        ];

        PMMLDocument {
            version: PMML_VERSION.to_string(),
            header: PMMLHeader::default(),
            data_dictionary: vec![
                DataField::categorical("Adjusted", PMMLDataType::Integer, vec!["0".into(), "1".into()]),
                DataField::categorical("Gender", PMMLDataType::String, vec!["Female".into(), "Male".into()]),
            ],
            transformation_dictionary: vec![DerivedField {
                name: "Gender=Male".to_string(),
                op_type: OpType::Continuous,
                data_type: PMMLDataType::Double,
                expression: Expression::NormDiscrete {
                    field: "Gender".to_string(),
                    value: "Male".to_string(),
                },
            }],
            model: PMMLModel::Tree(TreeModel {
                model_name: None,
                function: MiningFunction::Classification,
                algorithm_name: None,
                split_characteristic: "binarySplit".to_string(),
                no_true_child_strategy: Some("returnLastPrediction".to_string()),
                mining_schema: schema,
                output: vec![OutputField::probability("0"), OutputField::probability("1")],
                root,
            }),
        }
    }

    #[test]
    fn test_tree_model_xml() {
        let pmml_str = PMMLExporter::new().export_to_string(&sample_document()).unwrap();

        assert!(pmml_str.contains("<TreeModel functionName=\"classification\""));
        assert!(pmml_str.contains("<NormDiscrete field=\"Gender\" value=\"Male\"/>"));
        assert!(pmml_str.contains("<MiningField name=\"Adjusted\" usageType=\"target\"/>"));
        assert!(pmml_str.contains("\n    <DataField"));
    }

    #[test]
    fn test_compact_output_has_no_indentation() {
        let pmml_str = PMMLExporter::new()
            .with_compact(true)
            .export_to_string(&sample_document())
            .unwrap();

        assert_eq!(pmml_str.trim_end().lines().count(), 1);
        assert!(pmml_str.contains("<True/><Node"));
    }

    #[test]
    fn test_xml_escaping() {
        let escaped = PMMLExporter::escape_xml("<test & \"value\">");
        assert_eq!(escaped, "&lt;test &amp; &quot;value&quot;&gt;");
    }

    #[test]
    fn test_data_field_categorical() {
        let field = DataField::categorical("color", PMMLDataType::String, vec!["red".to_string(), "blue".to_string()]);
        assert_eq!(field.values.len(), 2);
        assert_eq!(field.op_type, OpType::Categorical);
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("model.pmml");

        let result = PMMLExporter::new().export(&sample_document(), &path);
        assert!(matches!(result, Err(PmmlError::SerializationError(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_export_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pmml");
        std::fs::write(&path, "stale").unwrap();

        PMMLExporter::new().export(&sample_document(), &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("<?xml"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
