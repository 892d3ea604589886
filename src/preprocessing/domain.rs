//! Column domains learned during fit

use crate::error::{PmmlError, Result};
use crate::export::{DataField, Interval, PMMLDataType};
use polars::prelude::DataType;
use std::cmp::Ordering;

/// Valid values of a column
#[derive(Debug, Clone, PartialEq)]
pub enum Domain {
    /// Finite set of sorted distinct values
    Categorical {
        data_type: PMMLDataType,
        values: Vec<String>,
    },
    /// Closed range observed in training
    Continuous {
        data_type: PMMLDataType,
        interval: Interval,
    },
}

/// Map a polars dtype to the PMML data type of the field
pub fn pmml_data_type(dtype: &DataType) -> PMMLDataType {
    match dtype {
        DataType::Boolean => PMMLDataType::Boolean,
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => PMMLDataType::Integer,
        DataType::Float32 | DataType::Float64 => PMMLDataType::Double,
        _ => PMMLDataType::String,
    }
}

/// Sorted distinct values. Sorted numerically when every value parses as a
/// number, lexicographically otherwise.
pub fn sort_categories<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut distinct: Vec<String> = values.into_iter().map(Into::into).collect();
    distinct.sort();
    distinct.dedup();

    let parsed: Option<Vec<f64>> = distinct.iter().map(|v| v.trim().parse::<f64>().ok()).collect();
    if let Some(numbers) = parsed {
        let mut pairs: Vec<(f64, String)> = numbers.into_iter().zip(distinct).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        return pairs.into_iter().map(|(_, v)| v).collect();
    }
    distinct
}

impl Domain {
    /// Learn a categorical domain. Missing values are rejected, and so are
    /// blank ones, which scoring reads as missing.
    pub fn fit_categorical(name: &str, dtype: &DataType, values: &[Option<String>]) -> Result<Self> {
        let present: Vec<&String> = values.iter().flatten().filter(|v| !v.trim().is_empty()).collect();
        if present.len() != values.len() {
            return Err(PmmlError::EstimatorFitError(format!(
                "categorical column '{}' has {} missing or blank values",
                name,
                values.len() - present.len()
            )));
        }

        let values = sort_categories(present.into_iter().cloned());
        if values.len() == 1 {
            tracing::warn!(column = name, value = %values[0], "Categorical column has a single value");
        }

        Ok(Domain::Categorical {
            data_type: pmml_data_type(dtype),
            values,
        })
    }

    /// Learn a continuous domain. Missing and non-numeric values are rejected.
    pub fn fit_continuous(name: &str, dtype: &DataType, values: &[Option<f64>], unparsable: usize) -> Result<Self> {
        if unparsable > 0 {
            return Err(PmmlError::EstimatorFitError(format!(
                "continuous column '{}' has {} non-numeric values",
                name, unparsable
            )));
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for value in values {
            match value {
                Some(v) if v.is_finite() => {
                    min = min.min(*v);
                    max = max.max(*v);
                }
                Some(v) => {
                    return Err(PmmlError::EstimatorFitError(format!(
                        "continuous column '{}' has non-finite value {}",
                        name, v
                    )))
                }
                None => {
                    return Err(PmmlError::EstimatorFitError(format!(
                        "continuous column '{}' has missing values",
                        name
                    )))
                }
            }
        }

        let data_type = match pmml_data_type(dtype) {
            PMMLDataType::Integer => PMMLDataType::Integer,
            _ => PMMLDataType::Double,
        };

        Ok(Domain::Continuous {
            data_type,
            interval: Interval {
                left_margin: min,
                right_margin: max,
            },
        })
    }

    pub fn data_type(&self) -> PMMLDataType {
        match self {
            Domain::Categorical { data_type, .. } | Domain::Continuous { data_type, .. } => *data_type,
        }
    }

    /// Index of `raw` in a categorical domain
    pub fn position(&self, raw: &str) -> Option<usize> {
        let Domain::Categorical { data_type, values } = self else {
            return None;
        };

        if let Some(idx) = values.iter().position(|v| v == raw) {
            return Some(idx);
        }

        // Numeric categories match on value, so "4" and "4.0" are the same level
        if data_type.is_numeric() {
            let parsed = raw.trim().parse::<f64>().ok()?;
            return values.iter().position(|v| {
                v.trim()
                    .parse::<f64>()
                    .map(|n| n.partial_cmp(&parsed) == Some(Ordering::Equal))
                    .unwrap_or(false)
            });
        }
        None
    }

    /// PMML data dictionary entry for this domain
    pub fn data_field(&self, name: &str) -> DataField {
        match self {
            Domain::Categorical { data_type, values } => DataField::categorical(name, *data_type, values.clone()),
            Domain::Continuous { data_type, interval } => {
                DataField::continuous(name, *data_type).with_interval(interval.left_margin, interval.right_margin)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_categories_numeric() {
        let sorted = sort_categories(["8", "4", "10", "6", "4"]);
        assert_eq!(sorted, vec!["4", "6", "8", "10"]);
    }

    #[test]
    fn test_sort_categories_lexicographic() {
        let sorted = sort_categories(["Private", "Consultant", "10", "Private"]);
        assert_eq!(sorted, vec!["10", "Consultant", "Private"]);
    }

    #[test]
    fn test_categorical_rejects_missing() {
        let values = vec![Some("a".to_string()), None];
        let result = Domain::fit_categorical("col", &DataType::String, &values);
        assert!(matches!(result, Err(PmmlError::EstimatorFitError(_))));
    }

    #[test]
    fn test_categorical_rejects_blank() {
        let values = vec![Some("a".to_string()), Some(" ".to_string()), Some("a".to_string())];
        let result = Domain::fit_categorical("col", &DataType::String, &values);
        assert!(matches!(result, Err(PmmlError::EstimatorFitError(msg)) if msg.contains("'col'")));
    }

    #[test]
    fn test_continuous_interval() {
        let values = vec![Some(3.5), Some(-1.0), Some(10.0)];
        let domain = Domain::fit_continuous("Income", &DataType::Float64, &values, 0).unwrap();

        match domain {
            Domain::Continuous { data_type, interval } => {
                assert_eq!(data_type, PMMLDataType::Double);
                assert_eq!(interval.left_margin, -1.0);
                assert_eq!(interval.right_margin, 10.0);
            }
            _ => panic!("expected continuous domain"),
        }
    }

    #[test]
    fn test_continuous_rejects_text() {
        let values = vec![Some(1.0), None];
        let result = Domain::fit_continuous("Income", &DataType::String, &values, 1);
        assert!(matches!(result, Err(PmmlError::EstimatorFitError(_))));
    }

    #[test]
    fn test_numeric_position() {
        let domain = Domain::Categorical {
            data_type: PMMLDataType::Integer,
            values: vec!["4".into(), "6".into(), "8".into()],
        };
        assert_eq!(domain.position("6"), Some(1));
        assert_eq!(domain.position("8.0"), Some(2));
        assert_eq!(domain.position("5"), None);
    }
}
