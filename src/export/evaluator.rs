//! Scoring raw records against a PMML document

use super::pmml::*;
use crate::error::{PmmlError, Result};
use crate::training::Prediction;
use crate::utils::data_loader::Record;
use std::collections::HashMap;

/// A prepared field value
#[derive(Debug, Clone, PartialEq)]
struct FieldValue {
    text: String,
    number: Option<f64>,
}

impl FieldValue {
    fn number(value: f64) -> Self {
        Self {
            text: value.to_string(),
            number: Some(value),
        }
    }

    fn equals(&self, other: &str) -> bool {
        if self.text == other {
            return true;
        }
        match (self.number, other.trim().parse::<f64>()) {
            (Some(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

/// Output of one tree for one record
#[derive(Debug, Clone)]
enum TreeScore {
    Probabilities(Vec<f64>),
    Value(f64),
}

/// Evaluates tree and tree-ensemble PMML models
#[derive(Debug, Clone)]
pub struct ModelEvaluator {
    doc: PMMLDocument,
    target: String,
    /// Class labels in target domain order; empty for regression
    classes: Vec<String>,
}

impl ModelEvaluator {
    /// Verify that the document holds a model this evaluator can score
    pub fn new(doc: PMMLDocument) -> Result<Self> {
        let target = doc.target_field()?.to_string();
        let function = doc.model.function();

        if let PMMLModel::Mining(mining) = &doc.model {
            use MultipleModelMethod::*;
            let supported = match function {
                MiningFunction::Regression => {
                    matches!(mining.multiple_model_method, Sum | WeightedSum | Average | WeightedAverage | Median | WeightedMedian)
                }
                MiningFunction::Classification => {
                    matches!(mining.multiple_model_method, Average | WeightedAverage | Median | WeightedMedian)
                }
            };
            if !supported {
                return Err(PmmlError::UnsupportedError(format!(
                    "multipleModelMethod '{}' for {}",
                    mining.multiple_model_method.as_str(),
                    function.as_str()
                )));
            }
            if mining.segments.is_empty() {
                return Err(PmmlError::UnsupportedError("segmentation without segments".to_string()));
            }
        }

        let classes = match function {
            MiningFunction::Classification => {
                let field = doc
                    .data_field(&target)
                    .ok_or_else(|| PmmlError::ParseError(format!("target '{}' is not in the DataDictionary", target)))?;
                if field.values.is_empty() {
                    return Err(PmmlError::UnsupportedError(format!(
                        "classification target '{}' declares no values",
                        target
                    )));
                }
                field.values.clone()
            }
            MiningFunction::Regression => Vec::new(),
        };

        for name in doc.active_fields() {
            if doc.data_field(name).is_none() {
                return Err(PmmlError::ParseError(format!("active field '{}' is not in the DataDictionary", name)));
            }
        }

        Ok(Self { doc, target, classes })
    }

    pub fn document(&self) -> &PMMLDocument {
        &self.doc
    }

    pub fn into_document(self) -> PMMLDocument {
        self.doc
    }

    /// Node annotations may change; predicates must not
    pub(crate) fn document_mut(&mut self) -> &mut PMMLDocument {
        &mut self.doc
    }

    pub fn target_field(&self) -> &str {
        &self.target
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn function(&self) -> MiningFunction {
        self.doc.model.function()
    }

    /// Score one raw record
    pub fn evaluate(&self, record: &Record) -> Result<Prediction> {
        self.evaluate_with_paths(record).map(|(prediction, _)| prediction)
    }

    /// Score one raw record and report, for every tree, the child indices
    /// followed from the root
    pub fn evaluate_with_paths(&self, record: &Record) -> Result<(Prediction, Vec<Vec<usize>>)> {
        let values = self.prepare(record)?;

        let mut leaves = Vec::new();
        let mut scores = Vec::new();
        let mut weights = Vec::new();
        let mut paths = Vec::new();
        for (tree, weight) in self.trees_with_weights() {
            let (node, path) = walk(tree, &values)?;
            scores.push(self.tree_score(node)?);
            leaves.push(node);
            weights.push(weight);
            paths.push(path);
        }

        let prediction = match &self.doc.model {
            PMMLModel::Tree(_) => self.single_prediction(leaves[0], &scores[0]),
            PMMLModel::Mining(mining) => self.aggregate(mining.multiple_model_method, &scores, &weights)?,
        };
        Ok((prediction, paths))
    }

    fn trees_with_weights(&self) -> Vec<(&TreeModel, f64)> {
        match &self.doc.model {
            PMMLModel::Tree(tree) => vec![(tree, 1.0)],
            PMMLModel::Mining(mining) => mining.segments.iter().map(|s| (&s.model, s.weight)).collect(),
        }
    }

    /// Validate active fields and compute derived fields
    fn prepare(&self, record: &Record) -> Result<HashMap<String, FieldValue>> {
        let mut values = HashMap::new();

        for mining_field in self.doc.model.mining_schema() {
            if mining_field.usage_type != FieldUsageType::Active {
                continue;
            }
            let name = &mining_field.name;
            let field = self
                .doc
                .data_field(name)
                .ok_or_else(|| PmmlError::EvaluationError(format!("field '{}' is not defined", name)))?;

            let raw = record
                .get(name)
                .map(String::as_str)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| PmmlError::EvaluationError(format!("missing value for field '{}'", name)))?;

            let treatment = mining_field
                .invalid_value_treatment
                .unwrap_or(InvalidValueTreatment::ReturnInvalid);

            match validate_value(field, raw) {
                Some(value) => {
                    values.insert(name.clone(), value);
                }
                None => match treatment {
                    InvalidValueTreatment::AsIs => {
                        values.insert(
                            name.clone(),
                            FieldValue {
                                text: raw.to_string(),
                                number: raw.trim().parse::<f64>().ok(),
                            },
                        );
                    }
                    InvalidValueTreatment::ReturnInvalid | InvalidValueTreatment::AsMissing => {
                        return Err(PmmlError::EvaluationError(format!(
                            "invalid value '{}' for field '{}'",
                            raw, name
                        )));
                    }
                },
            }
        }

        for derived in &self.doc.transformation_dictionary {
            if let Some(value) = compute_derived(derived, &values)? {
                values.insert(derived.name.clone(), value);
            }
        }

        Ok(values)
    }

    fn tree_score(&self, node: &Node) -> Result<TreeScore> {
        match self.function() {
            MiningFunction::Regression => {
                let score = node
                    .score
                    .as_deref()
                    .ok_or_else(|| PmmlError::EvaluationError("leaf has no score".to_string()))?;
                let value = score
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| PmmlError::EvaluationError(format!("score '{}' is not a number", score)))?;
                Ok(TreeScore::Value(value))
            }
            MiningFunction::Classification => Ok(TreeScore::Probabilities(self.node_probabilities(node)?)),
        }
    }

    /// Class probabilities of a node, in class order
    fn node_probabilities(&self, node: &Node) -> Result<Vec<f64>> {
        if node.score_distributions.is_empty() {
            let score = node
                .score
                .as_deref()
                .ok_or_else(|| PmmlError::EvaluationError("leaf has neither score nor distribution".to_string()))?;
            return Ok(self.classes.iter().map(|c| if c == score { 1.0 } else { 0.0 }).collect());
        }

        let total: f64 = node.score_distributions.iter().map(|d| d.record_count).sum();
        Ok(self
            .classes
            .iter()
            .map(|class| {
                node.score_distributions
                    .iter()
                    .find(|d| &d.value == class)
                    .map(|d| match d.probability {
                        Some(p) => p,
                        None if total > 0.0 => d.record_count / total,
                        None => 0.0,
                    })
                    .unwrap_or(0.0)
            })
            .collect())
    }

    fn single_prediction(&self, leaf: &Node, score: &TreeScore) -> Prediction {
        match score {
            TreeScore::Value(value) => Prediction::Regression { value: *value },
            TreeScore::Probabilities(probabilities) => {
                let mut prediction = Prediction::from_probabilities(&self.classes, probabilities);
                if let (Some(score), Prediction::Classification { label, .. }) = (&leaf.score, &mut prediction) {
                    *label = score.clone();
                }
                prediction
            }
        }
    }

    fn aggregate(&self, method: MultipleModelMethod, scores: &[TreeScore], weights: &[f64]) -> Result<Prediction> {
        match self.function() {
            MiningFunction::Regression => {
                let values: Vec<f64> = scores
                    .iter()
                    .map(|s| match s {
                        TreeScore::Value(v) => *v,
                        TreeScore::Probabilities(_) => f64::NAN,
                    })
                    .collect();
                Ok(Prediction::Regression {
                    value: combine(method, &values, weights)?,
                })
            }
            MiningFunction::Classification => {
                let mut probabilities = Vec::with_capacity(self.classes.len());
                for class_idx in 0..self.classes.len() {
                    let column: Vec<f64> = scores
                        .iter()
                        .map(|s| match s {
                            TreeScore::Probabilities(p) => p[class_idx],
                            TreeScore::Value(_) => f64::NAN,
                        })
                        .collect();
                    probabilities.push(combine(method, &column, weights)?);
                }
                Ok(Prediction::from_probabilities(&self.classes, &probabilities))
            }
        }
    }
}

/// Combine per-segment values. Sums run in segment order.
fn combine(method: MultipleModelMethod, values: &[f64], weights: &[f64]) -> Result<f64> {
    let n = values.len() as f64;
    let weighted_sum = || values.iter().zip(weights).fold(0.0, |acc, (v, w)| acc + v * w);

    match method {
        MultipleModelMethod::Sum => Ok(values.iter().fold(0.0, |acc, v| acc + v)),
        MultipleModelMethod::Average => Ok(values.iter().fold(0.0, |acc, v| acc + v) / n),
        MultipleModelMethod::WeightedSum => Ok(weighted_sum()),
        MultipleModelMethod::WeightedAverage => {
            let total_weight: f64 = weights.iter().sum();
            Ok(weighted_sum() / total_weight)
        }
        MultipleModelMethod::Median => {
            let mut sorted = values.to_vec();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                Ok((sorted[mid - 1] + sorted[mid]) / 2.0)
            } else {
                Ok(sorted[mid])
            }
        }
        MultipleModelMethod::WeightedMedian => {
            let mut pairs: Vec<(f64, f64)> = values.iter().copied().zip(weights.iter().copied()).collect();
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
            let half = weights.iter().sum::<f64>() / 2.0;
            let mut acc = 0.0;
            for (value, weight) in &pairs {
                acc += weight;
                if acc >= half {
                    return Ok(*value);
                }
            }
            Ok(pairs.last().map(|p| p.0).unwrap_or(f64::NAN))
        }
        other => Err(PmmlError::UnsupportedError(format!("multipleModelMethod '{}'", other.as_str()))),
    }
}

/// Canonical value of `raw` within a data field's domain
fn validate_value(field: &DataField, raw: &str) -> Option<FieldValue> {
    match field.op_type {
        OpType::Continuous => {
            let number = raw.trim().parse::<f64>().ok()?;
            if let Some(interval) = field.interval {
                if !interval.contains(number) {
                    return None;
                }
            }
            Some(FieldValue {
                text: raw.to_string(),
                number: Some(number),
            })
        }
        OpType::Categorical | OpType::Ordinal => {
            let number = if field.data_type.is_numeric() {
                Some(raw.trim().parse::<f64>().ok()?)
            } else {
                None
            };

            if field.values.is_empty() {
                return Some(FieldValue {
                    text: raw.to_string(),
                    number,
                });
            }

            let probe = FieldValue {
                text: raw.to_string(),
                number,
            };
            field.values.iter().find(|v| probe.equals(v)).map(|canonical| FieldValue {
                text: canonical.clone(),
                number,
            })
        }
    }
}

fn compute_derived(field: &DerivedField, values: &HashMap<String, FieldValue>) -> Result<Option<FieldValue>> {
    match &field.expression {
        Expression::FieldRef { field } => Ok(values.get(field).cloned()),
        Expression::NormDiscrete { field, value } => Ok(values
            .get(field)
            .map(|input| FieldValue::number(if input.equals(value) { 1.0 } else { 0.0 }))),
        Expression::MapValues {
            field: input_field,
            output_data_type,
            entries,
        } => {
            let Some(input) = values.get(input_field) else {
                return Ok(None);
            };
            let (_, output) = entries.iter().find(|(i, _)| input.equals(i)).ok_or_else(|| {
                PmmlError::EvaluationError(format!(
                    "value '{}' has no mapping in derived field '{}'",
                    input.text, field.name
                ))
            })?;
            let number = if output_data_type.is_numeric() {
                Some(output.trim().parse::<f64>().map_err(|_| {
                    PmmlError::EvaluationError(format!("mapped value '{}' is not a number", output))
                })?)
            } else {
                None
            };
            Ok(Some(FieldValue {
                text: output.clone(),
                number,
            }))
        }
    }
}

fn eval_predicate(predicate: &TreePredicate, values: &HashMap<String, FieldValue>) -> Result<bool> {
    match predicate {
        TreePredicate::True => Ok(true),
        TreePredicate::False => Ok(false),
        TreePredicate::SimplePredicate { field, operator, value } => {
            let input = values
                .get(field)
                .ok_or_else(|| PmmlError::EvaluationError(format!("no value for field '{}'", field)))?;

            match operator {
                Operator::Equal => Ok(input.equals(value)),
                Operator::NotEqual => Ok(!input.equals(value)),
                _ => {
                    let lhs = input.number.ok_or_else(|| {
                        PmmlError::EvaluationError(format!("field '{}' is not numeric", field))
                    })?;
                    let rhs = value.trim().parse::<f64>().map_err(|_| {
                        PmmlError::EvaluationError(format!("predicate value '{}' is not numeric", value))
                    })?;
                    Ok(match operator {
                        Operator::LessThan => lhs < rhs,
                        Operator::LessOrEqual => lhs <= rhs,
                        Operator::GreaterThan => lhs > rhs,
                        Operator::GreaterOrEqual => lhs >= rhs,
                        Operator::Equal | Operator::NotEqual => false,
                    })
                }
            }
        }
        TreePredicate::CompoundPredicate { boolean_operator, predicates } => {
            let results = predicates
                .iter()
                .map(|p| eval_predicate(p, values))
                .collect::<Result<Vec<bool>>>()?;
            Ok(match boolean_operator {
                BooleanOperator::And => results.iter().all(|r| *r),
                BooleanOperator::Or => results.iter().any(|r| *r),
            })
        }
    }
}

fn walk<'t>(tree: &'t TreeModel, values: &HashMap<String, FieldValue>) -> Result<(&'t Node, Vec<usize>)> {
    let (node, path) = walk_node(&tree.root, values)?;
    if !node.is_leaf() && tree.no_true_child_strategy.as_deref() != Some("returnLastPrediction") {
        return Err(PmmlError::EvaluationError("no child predicate matched".to_string()));
    }
    Ok((node, path))
}

/// Follow the first true child until a leaf, or until no child matches
fn walk_node<'t>(root: &'t Node, values: &HashMap<String, FieldValue>) -> Result<(&'t Node, Vec<usize>)> {
    if !eval_predicate(&root.predicate, values)? {
        return Err(PmmlError::EvaluationError("root predicate is false".to_string()));
    }

    let mut node = root;
    let mut path = Vec::new();
    'descend: while !node.children.is_empty() {
        for (idx, child) in node.children.iter().enumerate() {
            if eval_predicate(&child.predicate, values)? {
                path.push(idx);
                node = child;
                continue 'descend;
            }
        }
        break;
    }
    Ok((node, path))
}
