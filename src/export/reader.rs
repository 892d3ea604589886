//! PMML reader: XML to document model

use super::pmml::*;
use crate::error::{PmmlError, Result};
use roxmltree::Node as XmlNode;
use std::path::Path;

/// Parses PMML 4.x documents holding tree or segmented tree models
#[derive(Debug, Default)]
pub struct PMMLReader;

fn elements<'a, 'input>(node: XmlNode<'a, 'input>) -> impl Iterator<Item = XmlNode<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn child<'a, 'input>(node: XmlNode<'a, 'input>, name: &str) -> Option<XmlNode<'a, 'input>> {
    elements(node).find(|n| n.tag_name().name() == name)
}

fn required_attr<'a>(node: XmlNode<'a, '_>, name: &str) -> Result<&'a str> {
    node.attribute(name).ok_or_else(|| {
        PmmlError::ParseError(format!("<{}> is missing attribute '{}'", node.tag_name().name(), name))
    })
}

fn parse_f64(value: &str, what: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| PmmlError::ParseError(format!("{} '{}' is not a number", what, value)))
}

fn optional_f64(node: XmlNode<'_, '_>, name: &str) -> Result<Option<f64>> {
    node.attribute(name).map(|v| parse_f64(v, name)).transpose()
}

impl PMMLReader {
    pub fn new() -> Self {
        Self
    }

    /// Read a PMML file
    pub fn read(&self, path: impl AsRef<Path>) -> Result<PMMLDocument> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PmmlError::ParseError(format!("{}: {}", path.display(), e)))?;
        self.parse_str(&text)
    }

    /// Parse PMML text
    pub fn parse_str(&self, text: &str) -> Result<PMMLDocument> {
        let xml = roxmltree::Document::parse(text)?;
        let root = xml.root_element();

        if root.tag_name().name() != "PMML" {
            return Err(PmmlError::ParseError(format!(
                "root element is <{}>, expected <PMML>",
                root.tag_name().name()
            )));
        }

        let version = required_attr(root, "version")?.to_string();

        let header = match child(root, "Header") {
            Some(node) => self.parse_header(node)?,
            None => PMMLHeader::default(),
        };

        let data_dictionary = child(root, "DataDictionary")
            .ok_or_else(|| PmmlError::ParseError("missing <DataDictionary>".to_string()))
            .and_then(|node| self.parse_data_dictionary(node))?;

        let transformation_dictionary = match child(root, "TransformationDictionary") {
            Some(node) => self.parse_transformation_dictionary(node)?,
            None => Vec::new(),
        };

        let model = elements(root)
            .find_map(|node| match node.tag_name().name() {
                "TreeModel" => Some(self.parse_tree_model(node).map(PMMLModel::Tree)),
                "MiningModel" => Some(self.parse_mining_model(node).map(PMMLModel::Mining)),
                "RegressionModel" | "NeuralNetwork" | "GeneralRegressionModel" | "SupportVectorMachineModel"
                | "NaiveBayesModel" | "Scorecard" | "ClusteringModel" => Some(Err(PmmlError::UnsupportedError(
                    format!("model element <{}>", node.tag_name().name()),
                ))),
                _ => None,
            })
            .ok_or_else(|| PmmlError::ParseError("document has no model element".to_string()))??;

        Ok(PMMLDocument {
            version,
            header,
            data_dictionary,
            transformation_dictionary,
            model,
        })
    }

    fn parse_header(&self, node: XmlNode<'_, '_>) -> Result<PMMLHeader> {
        let mut header = PMMLHeader {
            copyright: node.attribute("copyright").map(str::to_string),
            description: node.attribute("description").map(str::to_string),
            application_name: String::new(),
            application_version: String::new(),
            timestamp: None,
            extensions: Vec::new(),
        };

        for el in elements(node) {
            match el.tag_name().name() {
                "Application" => {
                    header.application_name = el.attribute("name").unwrap_or_default().to_string();
                    header.application_version = el.attribute("version").unwrap_or_default().to_string();
                }
                "Timestamp" => header.timestamp = Some(el.text().unwrap_or_default().trim().to_string()),
                "Extension" => header.extensions.push(Extension {
                    name: el.attribute("name").unwrap_or_default().to_string(),
                    content: el.text().unwrap_or_default().to_string(),
                }),
                _ => {}
            }
        }
        Ok(header)
    }

    fn parse_data_dictionary(&self, node: XmlNode<'_, '_>) -> Result<Vec<DataField>> {
        elements(node)
            .filter(|n| n.tag_name().name() == "DataField")
            .map(|field| {
                let name = required_attr(field, "name")?;
                let mut data_field = DataField {
                    name: name.to_string(),
                    data_type: PMMLDataType::parse(required_attr(field, "dataType")?)?,
                    op_type: OpType::parse(required_attr(field, "optype")?)?,
                    values: Vec::new(),
                    interval: None,
                };

                for el in elements(field) {
                    match el.tag_name().name() {
                        "Value" => {
                            // Only valid values bound the domain
                            if el.attribute("property").map_or(true, |p| p == "valid") {
                                data_field.values.push(required_attr(el, "value")?.to_string());
                            }
                        }
                        "Interval" => {
                            let left = optional_f64(el, "leftMargin")?.unwrap_or(f64::NEG_INFINITY);
                            let right = optional_f64(el, "rightMargin")?.unwrap_or(f64::INFINITY);
                            data_field.interval = Some(Interval {
                                left_margin: left,
                                right_margin: right,
                            });
                        }
                        _ => {}
                    }
                }
                Ok(data_field)
            })
            .collect()
    }

    fn parse_transformation_dictionary(&self, node: XmlNode<'_, '_>) -> Result<Vec<DerivedField>> {
        elements(node)
            .filter(|n| n.tag_name().name() == "DerivedField")
            .map(|field| {
                let expression = elements(field)
                    .find(|n| n.tag_name().name() != "Extension")
                    .ok_or_else(|| PmmlError::ParseError("<DerivedField> has no expression".to_string()))?;

                Ok(DerivedField {
                    name: required_attr(field, "name")?.to_string(),
                    op_type: OpType::parse(required_attr(field, "optype")?)?,
                    data_type: PMMLDataType::parse(required_attr(field, "dataType")?)?,
                    expression: self.parse_expression(expression)?,
                })
            })
            .collect()
    }

    fn parse_expression(&self, node: XmlNode<'_, '_>) -> Result<Expression> {
        match node.tag_name().name() {
            "FieldRef" => Ok(Expression::FieldRef {
                field: required_attr(node, "field")?.to_string(),
            }),
            "NormDiscrete" => Ok(Expression::NormDiscrete {
                field: required_attr(node, "field")?.to_string(),
                value: required_attr(node, "value")?.to_string(),
            }),
            "MapValues" => {
                let pair = child(node, "FieldColumnPair")
                    .ok_or_else(|| PmmlError::ParseError("<MapValues> has no <FieldColumnPair>".to_string()))?;
                let field = required_attr(pair, "field")?.to_string();
                let input_column = local_name(required_attr(pair, "column")?);
                let output_column = local_name(required_attr(node, "outputColumn")?);
                let output_data_type = match node.attribute("dataType") {
                    Some(dt) => PMMLDataType::parse(dt)?,
                    None => PMMLDataType::String,
                };

                let table = child(node, "InlineTable")
                    .ok_or_else(|| PmmlError::ParseError("<MapValues> has no <InlineTable>".to_string()))?;

                let entries = elements(table)
                    .filter(|row| row.tag_name().name() == "row")
                    .map(|row| {
                        let cell = |column: &str| {
                            elements(row)
                                .find(|c| c.tag_name().name() == column)
                                .map(|c| c.text().unwrap_or_default().to_string())
                                .ok_or_else(|| PmmlError::ParseError(format!("<row> has no column '{}'", column)))
                        };
                        Ok((cell(input_column)?, cell(output_column)?))
                    })
                    .collect::<Result<Vec<_>>>()?;

                Ok(Expression::MapValues {
                    field,
                    output_data_type,
                    entries,
                })
            }
            other => Err(PmmlError::UnsupportedError(format!("expression <{}>", other))),
        }
    }

    fn parse_mining_schema(&self, model: XmlNode<'_, '_>) -> Result<Vec<MiningField>> {
        let schema = child(model, "MiningSchema")
            .ok_or_else(|| PmmlError::ParseError(format!("<{}> has no <MiningSchema>", model.tag_name().name())))?;

        elements(schema)
            .filter(|n| n.tag_name().name() == "MiningField")
            .map(|field| {
                Ok(MiningField {
                    name: required_attr(field, "name")?.to_string(),
                    usage_type: match field.attribute("usageType") {
                        Some(usage) => FieldUsageType::parse(usage)?,
                        None => FieldUsageType::Active,
                    },
                    invalid_value_treatment: field
                        .attribute("invalidValueTreatment")
                        .map(InvalidValueTreatment::parse)
                        .transpose()?,
                })
            })
            .collect()
    }

    fn parse_output(&self, model: XmlNode<'_, '_>) -> Result<Vec<OutputField>> {
        let Some(output) = child(model, "Output") else {
            return Ok(Vec::new());
        };

        elements(output)
            .filter(|n| n.tag_name().name() == "OutputField")
            .map(|field| {
                Ok(OutputField {
                    name: required_attr(field, "name")?.to_string(),
                    op_type: field.attribute("optype").map(OpType::parse).transpose()?.unwrap_or(OpType::Continuous),
                    data_type: field
                        .attribute("dataType")
                        .map(PMMLDataType::parse)
                        .transpose()?
                        .unwrap_or(PMMLDataType::Double),
                    feature: field.attribute("feature").unwrap_or("predictedValue").to_string(),
                    value: field.attribute("value").map(str::to_string),
                })
            })
            .collect()
    }

    fn parse_mining_model(&self, node: XmlNode<'_, '_>) -> Result<MiningModel> {
        let segmentation = child(node, "Segmentation")
            .ok_or_else(|| PmmlError::ParseError("<MiningModel> has no <Segmentation>".to_string()))?;

        let segments = elements(segmentation)
            .filter(|n| n.tag_name().name() == "Segment")
            .enumerate()
            .map(|(idx, segment)| {
                if let Some(pred) = elements(segment).next() {
                    if pred.tag_name().name() != "True" {
                        return Err(PmmlError::UnsupportedError(format!(
                            "segment predicate <{}>",
                            pred.tag_name().name()
                        )));
                    }
                }
                let tree = child(segment, "TreeModel").ok_or_else(|| {
                    PmmlError::UnsupportedError("segments must hold a <TreeModel>".to_string())
                })?;

                Ok(Segment {
                    id: segment.attribute("id").map_or_else(|| (idx + 1).to_string(), str::to_string),
                    weight: optional_f64(segment, "weight")?.unwrap_or(1.0),
                    model: self.parse_tree_model(tree)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(MiningModel {
            model_name: node.attribute("modelName").map(str::to_string),
            function: MiningFunction::parse(required_attr(node, "functionName")?)?,
            algorithm_name: node.attribute("algorithmName").map(str::to_string),
            mining_schema: self.parse_mining_schema(node)?,
            output: self.parse_output(node)?,
            multiple_model_method: MultipleModelMethod::parse(required_attr(segmentation, "multipleModelMethod")?)?,
            segments,
        })
    }

    fn parse_tree_model(&self, node: XmlNode<'_, '_>) -> Result<TreeModel> {
        let root = child(node, "Node").ok_or_else(|| PmmlError::ParseError("<TreeModel> has no <Node>".to_string()))?;

        Ok(TreeModel {
            model_name: node.attribute("modelName").map(str::to_string),
            function: MiningFunction::parse(required_attr(node, "functionName")?)?,
            algorithm_name: node.attribute("algorithmName").map(str::to_string),
            split_characteristic: node.attribute("splitCharacteristic").unwrap_or("multiSplit").to_string(),
            no_true_child_strategy: node.attribute("noTrueChildStrategy").map(str::to_string),
            mining_schema: self.parse_mining_schema(node)?,
            output: self.parse_output(node)?,
            root: self.parse_node(root)?,
        })
    }

    fn parse_node(&self, node: XmlNode<'_, '_>) -> Result<Node> {
        let mut predicate = None;
        let mut score_distributions = Vec::new();
        let mut children = Vec::new();

        for el in elements(node) {
            match el.tag_name().name() {
                "True" | "False" | "SimplePredicate" | "CompoundPredicate" | "SimpleSetPredicate" => {
                    predicate = Some(self.parse_predicate(el)?);
                }
                "ScoreDistribution" => score_distributions.push(ScoreDistribution {
                    value: required_attr(el, "value")?.to_string(),
                    record_count: parse_f64(required_attr(el, "recordCount")?, "recordCount")?,
                    probability: optional_f64(el, "probability")?,
                    confidence: optional_f64(el, "confidence")?,
                }),
                "Node" => children.push(self.parse_node(el)?),
                _ => {}
            }
        }

        Ok(Node {
            id: node.attribute("id").map(str::to_string),
            score: node.attribute("score").map(str::to_string),
            record_count: optional_f64(node, "recordCount")?,
            predicate: predicate.ok_or_else(|| PmmlError::ParseError("<Node> has no predicate".to_string()))?,
            score_distributions,
            children,
        })
    }

    fn parse_predicate(&self, node: XmlNode<'_, '_>) -> Result<TreePredicate> {
        match node.tag_name().name() {
            "True" => Ok(TreePredicate::True),
            "False" => Ok(TreePredicate::False),
            "SimplePredicate" => Ok(TreePredicate::SimplePredicate {
                field: required_attr(node, "field")?.to_string(),
                operator: Operator::parse(required_attr(node, "operator")?)?,
                value: node.attribute("value").unwrap_or_default().to_string(),
            }),
            "CompoundPredicate" => Ok(TreePredicate::CompoundPredicate {
                boolean_operator: BooleanOperator::parse(required_attr(node, "booleanOperator")?)?,
                predicates: elements(node)
                    .filter(|n| n.tag_name().name() != "Extension")
                    .map(|n| self.parse_predicate(n))
                    .collect::<Result<Vec<_>>>()?,
            }),
            other => Err(PmmlError::UnsupportedError(format!("predicate <{}>", other))),
        }
    }
}

/// `data:input` -> `input`
fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::pmml::tests::sample_document;

    #[test]
    fn test_round_trip_expanded() {
        let doc = sample_document();
        let xml = PMMLExporter::new().export_to_string(&doc).unwrap();
        let parsed = PMMLReader::new().parse_str(&xml).unwrap();

        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_round_trip_compact() {
        let mut doc = sample_document();
        doc.header.extensions.push(Extension {
            name: "repr".to_string(),
            content: "PmmlPipeline(<x> & \"y\")".to_string(),
        });
        let xml = PMMLExporter::new().with_compact(true).export_to_string(&doc).unwrap();
        let parsed = PMMLReader::new().parse_str(&xml).unwrap();

        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_map_values() {
        let xml = r#"<PMML xmlns="http://www.dmg.org/PMML-4_4" xmlns:data="http://jpmml.org/jpmml-model/InlineTable" version="4.4">
            <DataDictionary>
                <DataField name="Education" optype="categorical" dataType="string"><Value value="College"/><Value value="HSgrad"/></DataField>
            </DataDictionary>
            <TransformationDictionary>
                <DerivedField name="label(Education)" optype="continuous" dataType="integer">
                    <MapValues outputColumn="data:output" dataType="integer">
                        <FieldColumnPair field="Education" column="data:input"/>
                        <InlineTable>
                            <row><data:input>College</data:input><data:output>0</data:output></row>
                            <row><data:input>HSgrad</data:input><data:output>1</data:output></row>
                        </InlineTable>
                    </MapValues>
                </DerivedField>
            </TransformationDictionary>
            <TreeModel functionName="regression">
                <MiningSchema><MiningField name="y" usageType="target"/><MiningField name="Education"/></MiningSchema>
                <Node score="1.5"><True/></Node>
            </TreeModel>
        </PMML>"#;

        let doc = PMMLReader::new().parse_str(xml).unwrap();
        match &doc.transformation_dictionary[0].expression {
            Expression::MapValues { entries, field, .. } => {
                assert_eq!(field, "Education");
                assert_eq!(entries[1], ("HSgrad".to_string(), "1".to_string()));
            }
            other => panic!("unexpected expression {:?}", other),
        }
        assert_eq!(doc.active_fields(), vec!["Education"]);
        assert_eq!(doc.target_field().unwrap(), "y");
    }

    #[test]
    fn test_malformed_xml() {
        let result = PMMLReader::new().parse_str("<PMML version=\"4.4\"><DataDictionary>");
        assert!(matches!(result, Err(PmmlError::ParseError(_))));
    }

    #[test]
    fn test_unsupported_model() {
        let xml = r#"<PMML version="4.4"><DataDictionary/><RegressionModel functionName="regression"/></PMML>"#;
        let result = PMMLReader::new().parse_str(xml);
        assert!(matches!(result, Err(PmmlError::UnsupportedError(_))));
    }
}
