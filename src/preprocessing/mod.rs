//! Data preprocessing module
//!
//! Column roles and their fitted state:
//! - Role declarations (categorical or continuous) per column
//! - Domains learned from training data (valid values, numeric ranges)
//! - Categorical encoding (OneHot, Label)
//! - The column mapper that turns a DataFrame into a feature matrix

mod domain;
mod encoder;
mod mapper;

pub use domain::{pmml_data_type, sort_categories, Domain};
pub use encoder::FittedEncoder;
pub use mapper::{validate_schema, DataFrameMapper, FittedColumn, FittedMapper};

use serde::{Deserialize, Serialize};

/// Encoding applied to a categorical column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoricalEncoder {
    /// One binary indicator per category
    #[default]
    OneHot,
    /// Category replaced by its index in the sorted domain
    Label,
}

/// Preprocessing role of a feature column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ColumnRole {
    Categorical {
        #[serde(default)]
        encoder: CategoricalEncoder,
    },
    Continuous,
}

impl std::fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnRole::Categorical { encoder: CategoricalEncoder::OneHot } => write!(f, "categorical(one_hot)"),
            ColumnRole::Categorical { encoder: CategoricalEncoder::Label } => write!(f, "categorical(label)"),
            ColumnRole::Continuous => write!(f, "continuous"),
        }
    }
}

/// Role declaration for one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(flatten)]
    pub role: ColumnRole,
}

impl ColumnSpec {
    pub fn categorical(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: ColumnRole::Categorical { encoder: CategoricalEncoder::OneHot },
        }
    }

    pub fn continuous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: ColumnRole::Continuous,
        }
    }
}

/// One column of the encoded feature matrix
#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    /// 1.0 when `field` equals `value`
    Indicator { field: String, value: String },
    /// Index of the value of `field` in `values`
    Ordinal { field: String, values: Vec<String> },
    /// Raw numeric value of `field`
    Continuous { field: String },
}

impl Feature {
    /// Name of the PMML field the model reads this feature from
    pub fn name(&self) -> String {
        match self {
            Feature::Indicator { field, value } => format!("{}={}", field, value),
            Feature::Ordinal { field, .. } => format!("label({})", field),
            Feature::Continuous { field } => field.clone(),
        }
    }

    /// Name of the raw input column
    pub fn field(&self) -> &str {
        match self {
            Feature::Indicator { field, .. } | Feature::Ordinal { field, .. } | Feature::Continuous { field } => field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_spec_deserialize() {
        let specs: Vec<ColumnSpec> = serde_json::from_str(
            r#"[
                {"name": "Employment", "role": "categorical"},
                {"name": "Education", "role": "categorical", "encoder": "label"},
                {"name": "Age", "role": "continuous"}
            ]"#,
        )
        .unwrap();

        assert_eq!(specs[0], ColumnSpec::categorical("Employment"));
        assert_eq!(specs[1].role, ColumnRole::Categorical { encoder: CategoricalEncoder::Label });
        assert_eq!(specs[2], ColumnSpec::continuous("Age"));
    }

    #[test]
    fn test_feature_names() {
        let indicator = Feature::Indicator { field: "Gender".into(), value: "Male".into() };
        let ordinal = Feature::Ordinal { field: "Education".into(), values: vec!["College".into()] };

        assert_eq!(indicator.name(), "Gender=Male");
        assert_eq!(ordinal.name(), "label(Education)");
        assert_eq!(ordinal.field(), "Education");
    }
}
