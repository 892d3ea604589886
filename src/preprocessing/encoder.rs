//! Feature encoders

use super::{CategoricalEncoder, Domain, Feature};
use crate::error::{PmmlError, Result};
use crate::export::{DerivedField, Expression, OpType, PMMLDataType};

/// Encoder bound to a fitted domain
#[derive(Debug, Clone, PartialEq)]
pub enum FittedEncoder {
    /// One indicator column per category
    OneHot { categories: Vec<String> },
    /// Category index as a single column
    Label { categories: Vec<String> },
    /// Numeric passthrough
    Identity,
}

impl FittedEncoder {
    pub fn new(encoder: Option<CategoricalEncoder>, domain: &Domain) -> Self {
        match (encoder, domain) {
            (Some(CategoricalEncoder::OneHot), Domain::Categorical { values, .. }) => FittedEncoder::OneHot {
                categories: values.clone(),
            },
            (Some(CategoricalEncoder::Label), Domain::Categorical { values, .. }) => FittedEncoder::Label {
                categories: values.clone(),
            },
            _ => FittedEncoder::Identity,
        }
    }

    /// Number of matrix columns produced
    pub fn width(&self) -> usize {
        match self {
            FittedEncoder::OneHot { categories } => categories.len(),
            FittedEncoder::Label { .. } | FittedEncoder::Identity => 1,
        }
    }

    pub fn features(&self, field: &str) -> Vec<Feature> {
        match self {
            FittedEncoder::OneHot { categories } => categories
                .iter()
                .map(|value| Feature::Indicator {
                    field: field.to_string(),
                    value: value.clone(),
                })
                .collect(),
            FittedEncoder::Label { categories } => vec![Feature::Ordinal {
                field: field.to_string(),
                values: categories.clone(),
            }],
            FittedEncoder::Identity => vec![Feature::Continuous {
                field: field.to_string(),
            }],
        }
    }

    /// Write the encoding of category `index` into `out`
    pub fn encode_category(&self, index: usize, out: &mut [f64]) -> Result<()> {
        match self {
            FittedEncoder::OneHot { categories } if index < categories.len() => {
                out.iter_mut().for_each(|v| *v = 0.0);
                out[index] = 1.0;
                Ok(())
            }
            FittedEncoder::Label { categories } if index < categories.len() => {
                out[0] = index as f64;
                Ok(())
            }
            _ => Err(PmmlError::EvaluationError(format!(
                "category index {} is not valid for this encoder",
                index
            ))),
        }
    }

    /// Derived fields that compute the encoded features in PMML
    pub fn derived_fields(&self, field: &str) -> Vec<DerivedField> {
        match self {
            FittedEncoder::OneHot { categories } => categories
                .iter()
                .map(|value| DerivedField {
                    name: format!("{}={}", field, value),
                    op_type: OpType::Continuous,
                    data_type: PMMLDataType::Double,
                    expression: Expression::NormDiscrete {
                        field: field.to_string(),
                        value: value.clone(),
                    },
                })
                .collect(),
            FittedEncoder::Label { categories } => vec![DerivedField {
                name: format!("label({})", field),
                op_type: OpType::Continuous,
                data_type: PMMLDataType::Integer,
                expression: Expression::MapValues {
                    field: field.to_string(),
                    output_data_type: PMMLDataType::Integer,
                    entries: categories
                        .iter()
                        .enumerate()
                        .map(|(idx, value)| (value.clone(), idx.to_string()))
                        .collect(),
                },
            }],
            FittedEncoder::Identity => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> Domain {
        Domain::Categorical {
            data_type: PMMLDataType::String,
            values: vec!["Divorced".into(), "Married".into(), "Unmarried".into()],
        }
    }

    #[test]
    fn test_one_hot_encoding() {
        let encoder = FittedEncoder::new(Some(CategoricalEncoder::OneHot), &domain());
        let mut out = vec![0.0; encoder.width()];
        encoder.encode_category(1, &mut out).unwrap();

        assert_eq!(out, vec![0.0, 1.0, 0.0]);
        assert_eq!(encoder.derived_fields("Marital").len(), 3);
        assert_eq!(encoder.derived_fields("Marital")[2].name, "Marital=Unmarried");
    }

    #[test]
    fn test_label_encoding() {
        let encoder = FittedEncoder::new(Some(CategoricalEncoder::Label), &domain());
        let mut out = vec![0.0; encoder.width()];
        encoder.encode_category(2, &mut out).unwrap();

        assert_eq!(out, vec![2.0]);
        match &encoder.derived_fields("Marital")[0].expression {
            Expression::MapValues { entries, .. } => assert_eq!(entries[1], ("Married".to_string(), "1".to_string())),
            other => panic!("unexpected expression {:?}", other),
        }
    }

    #[test]
    fn test_index_out_of_range() {
        let encoder = FittedEncoder::new(Some(CategoricalEncoder::OneHot), &domain());
        let mut out = vec![0.0; 3];
        assert!(encoder.encode_category(3, &mut out).is_err());
    }
}
