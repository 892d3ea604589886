//! Integration test: role declarations through to the written PMML file

use pmml_pipeline::error::PmmlError;
use pmml_pipeline::export::{OpType, PMMLModel, PMMLReader};
use pmml_pipeline::pipeline::{build_and_export, ExportOptions};
use pmml_pipeline::preprocessing::DataFrameMapper;
use pmml_pipeline::training::{DecisionTree, RandomForest};
use polars::prelude::*;
use tempfile::tempdir;

const EMPLOYMENT: [&str; 4] = ["Private", "Consultant", "SelfEmp", "PSState"];
const EDUCATION: [&str; 5] = ["College", "HSgrad", "Bachelor", "Master", "Yr10"];
const MARITAL: [&str; 4] = ["Married", "Absent", "Divorced", "Unmarried"];
const OCCUPATION: [&str; 6] = ["Service", "Transport", "Clerical", "Repair", "Executive", "Sales"];

fn audit_df() -> DataFrame {
    let n = 60;
    let age: Vec<i64> = (0..n).map(|i| 20 + (i * 7) % 45).collect();
    let employment: Vec<&str> = (0..n).map(|i| EMPLOYMENT[(i % 4) as usize]).collect();
    let education: Vec<&str> = (0..n).map(|i| EDUCATION[((i * 3) % 5) as usize]).collect();
    let marital: Vec<&str> = (0..n).map(|i| MARITAL[((i / 2) % 4) as usize]).collect();
    let occupation: Vec<&str> = (0..n).map(|i| OCCUPATION[((i * 5) % 6) as usize]).collect();
    let income: Vec<f64> = (0..n).map(|i| 10000.0 + ((i * 7919) % 997) as f64 * 123.45).collect();
    let gender: Vec<&str> = (0..n).map(|i| if i % 3 == 0 { "Female" } else { "Male" }).collect();
    let deductions: Vec<bool> = (0..n).map(|i| i % 7 == 0).collect();
    let hours: Vec<i64> = (0..n).map(|i| 20 + (i * 11) % 50).collect();
    let adjusted: Vec<i64> = (0..n as usize)
        .map(|i| {
            let positive = (age[i] > 40 && gender[i] == "Male") || income[i] > 100000.0;
            let flipped = i % 9 == 0;
            (positive != flipped) as i64
        })
        .collect();

    df!(
        "Age" => age,
        "Employment" => employment,
        "Education" => education,
        "Marital" => marital,
        "Occupation" => occupation,
        "Income" => income,
        "Gender" => gender,
        "Deductions" => deductions,
        "Hours" => hours,
        "Adjusted" => adjusted
    )
    .unwrap()
}

fn audit_mapper() -> DataFrameMapper {
    DataFrameMapper::new()
        .categorical("Employment")
        .categorical("Education")
        .categorical("Marital")
        .categorical("Occupation")
        .categorical("Gender")
        .continuous("Age")
        .continuous("Income")
        .continuous("Hours")
}

fn auto_df() -> DataFrame {
    let n = 50;
    let cylinders: Vec<i64> = (0..n).map(|i| [4, 6, 8, 4, 4][i % 5]).collect();
    let displacement: Vec<f64> = (0..n).map(|i| 100.0 + ((i * 37) % 200) as f64).collect();
    let horsepower: Vec<f64> = (0..n).map(|i| 60.0 + ((i * 13) % 150) as f64).collect();
    let weight: Vec<f64> = (0..n).map(|i| 2000.0 + ((i * 97) % 2500) as f64).collect();
    let acceleration: Vec<f64> = (0..n).map(|i| 10.0 + ((i * 7) % 15) as f64 * 0.5).collect();
    let model_year: Vec<i64> = (0..n).map(|i| 70 + (i % 13) as i64).collect();
    let origin: Vec<i64> = (0..n).map(|i| [1, 2, 3][(i * 2) % 3]).collect();
    let mpg: Vec<f64> = (0..n)
        .map(|i| 45.0 - cylinders[i] as f64 * 2.0 - weight[i] / 500.0 + (model_year[i] - 70) as f64 * 0.5)
        .collect();

    df!(
        "cylinders" => cylinders,
        "displacement" => displacement,
        "horsepower" => horsepower,
        "weight" => weight,
        "acceleration" => acceleration,
        "model_year" => model_year,
        "origin" => origin,
        "mpg" => mpg
    )
    .unwrap()
}

fn auto_mapper() -> DataFrameMapper {
    DataFrameMapper::new()
        .categorical("cylinders")
        .categorical("model_year")
        .categorical("origin")
        .continuous("displacement")
        .continuous("horsepower")
        .continuous("weight")
        .continuous("acceleration")
}

fn audit_forest() -> Box<RandomForest> {
    Box::new(RandomForest::new_classifier(9).with_max_depth(7).with_random_state(13))
}

#[test]
fn test_audit_data_dictionary_excludes_deductions() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("RandomForestAudit.pmml");

    build_and_export(
        &audit_df(),
        "Adjusted",
        &["Deductions".to_string()],
        audit_mapper(),
        audit_forest(),
        &path,
        ExportOptions::default(),
    )
    .unwrap();

    let doc = PMMLReader::new().read(&path).unwrap();
    let features: Vec<&str> = doc
        .data_dictionary
        .iter()
        .filter(|f| f.name != "Adjusted")
        .map(|f| f.name.as_str())
        .collect();

    assert_eq!(features.len(), 8);
    assert!(!features.contains(&"Deductions"));
    assert_eq!(doc.data_dictionary[0].name, "Adjusted");
    assert_eq!(doc.data_dictionary[0].values, vec!["0", "1"]);
    assert_eq!(doc.target_field().unwrap(), "Adjusted");

    match &doc.model {
        PMMLModel::Mining(mining) => assert_eq!(mining.segments.len(), 9),
        PMMLModel::Tree(_) => panic!("expected a segmented model"),
    }
}

#[test]
fn test_auto_feature_width() {
    let dir = tempdir().unwrap();
    let df = auto_df();
    let target = df.get_column_names().last().unwrap().to_string();
    assert_eq!(target, "mpg");

    let pipeline = build_and_export(
        &df,
        &target,
        &[],
        auto_mapper(),
        Box::new(RandomForest::new_regressor(5).with_max_depth(5).with_random_state(13)),
        dir.path().join("RandomForestAuto.pmml"),
        ExportOptions::default(),
    )
    .unwrap();

    // 3 cylinder values + 13 model years + 3 origins, plus 4 continuous columns
    assert_eq!(pipeline.fitted_mapper().n_features(), 3 + 13 + 3 + 4);
    assert_eq!(pipeline.transform(&df).unwrap().ncols(), 23);

    let doc = pipeline.to_pmml().unwrap();
    let continuous = doc
        .data_dictionary
        .iter()
        .filter(|f| f.op_type == OpType::Continuous && f.name != "mpg")
        .count();
    assert_eq!(continuous, 4);
    assert!(doc.data_dictionary.iter().skip(1).all(|f| f.op_type != OpType::Continuous || f.interval.is_some()));
}

#[test]
fn test_missing_role_fails_before_fit() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.pmml");
    let mapper = DataFrameMapper::new()
        .categorical("Employment")
        .categorical("Education")
        .categorical("Marital")
        .categorical("Occupation")
        .categorical("Gender")
        .continuous("Age")
        .continuous("Income");

    let result = build_and_export(
        &audit_df(),
        "Adjusted",
        &["Deductions".to_string()],
        mapper,
        audit_forest(),
        &path,
        ExportOptions::default(),
    );

    match result {
        Err(PmmlError::SchemaMismatch(msg)) => assert!(msg.contains("Hours")),
        other => panic!("expected SchemaMismatch, got {:?}", other.map(|_| ())),
    }
    assert!(!path.exists());
}

#[test]
fn test_empty_dataset_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.pmml");

    let result = build_and_export(
        &audit_df().head(Some(0)),
        "Adjusted",
        &["Deductions".to_string()],
        audit_mapper(),
        audit_forest(),
        &path,
        ExportOptions::default(),
    );

    assert!(matches!(result, Err(PmmlError::EmptyDatasetError)));
    assert!(!path.exists());
}

#[test]
fn test_non_numeric_continuous_column() {
    let dir = tempdir().unwrap();
    let df = df!(
        "Income" => &["high", "low", "12.5", "high"],
        "Adjusted" => &[1i64, 0, 0, 1]
    )
    .unwrap();

    let result = build_and_export(
        &df,
        "Adjusted",
        &[],
        DataFrameMapper::new().continuous("Income"),
        Box::new(DecisionTree::new_classifier()),
        dir.path().join("out.pmml"),
        ExportOptions::default(),
    );

    assert!(matches!(result, Err(PmmlError::EstimatorFitError(_))));
}

#[test]
fn test_single_value_categorical_gets_one_indicator() {
    let dir = tempdir().unwrap();
    let df = df!(
        "Flag" => &["yes", "yes", "yes", "yes"],
        "Hours" => &[10.0, 20.0, 30.0, 40.0],
        "Adjusted" => &[0i64, 0, 1, 1]
    )
    .unwrap();

    let pipeline = build_and_export(
        &df,
        "Adjusted",
        &[],
        DataFrameMapper::new().categorical("Flag").continuous("Hours"),
        Box::new(DecisionTree::new_classifier()),
        dir.path().join("out.pmml"),
        ExportOptions::default(),
    )
    .unwrap();

    let flag = &pipeline.fitted_mapper().columns()[0];
    assert_eq!(flag.width(), 1);

    let doc = PMMLReader::new().read(dir.path().join("out.pmml")).unwrap();
    assert_eq!(doc.data_field("Flag").unwrap().values, vec!["yes"]);
    assert!(doc.derived_field("Flag=yes").is_some());
}

#[test]
fn test_indicator_name_clash_fails_before_writing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.pmml");
    let df = df!(
        "g" => &["x", "y", "x", "y"],
        "g=x" => &[1i64, 2, 3, 4],
        "y" => &[0i64, 1, 1, 0]
    )
    .unwrap();

    let result = build_and_export(
        &df,
        "y",
        &[],
        DataFrameMapper::new().categorical("g").continuous("g=x"),
        Box::new(DecisionTree::new_classifier()),
        &path,
        ExportOptions::default(),
    );

    match result {
        Err(PmmlError::SchemaMismatch(msg)) => assert!(msg.contains("g=x")),
        other => panic!("expected SchemaMismatch, got {:?}", other.map(|_| ())),
    }
    assert!(!path.exists());
}

#[test]
fn test_export_is_deterministic() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("first.pmml");
    let second = dir.path().join("second.pmml");

    for path in [&first, &second] {
        build_and_export(
            &audit_df(),
            "Adjusted",
            &["Deductions".to_string()],
            audit_mapper(),
            audit_forest(),
            path,
            ExportOptions::default(),
        )
        .unwrap();
    }

    let first = PMMLReader::new().read(&first).unwrap();
    let second = PMMLReader::new().read(&second).unwrap();
    assert_eq!(first.model, second.model);
    assert_eq!(first.data_dictionary, second.data_dictionary);
    assert_eq!(first.transformation_dictionary, second.transformation_dictionary);
}

#[test]
fn test_unwritable_output_leaves_no_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing").join("out.pmml");

    let result = build_and_export(
        &audit_df(),
        "Adjusted",
        &["Deductions".to_string()],
        audit_mapper(),
        audit_forest(),
        &path,
        ExportOptions::default(),
    );

    assert!(matches!(result, Err(PmmlError::SerializationError(_))));
    assert!(!path.exists());
}

#[test]
fn test_existing_output_is_overwritten() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.pmml");
    std::fs::write(&path, "stale").unwrap();

    build_and_export(
        &audit_df(),
        "Adjusted",
        &["Deductions".to_string()],
        audit_mapper(),
        audit_forest(),
        &path,
        ExportOptions { compact: true, with_repr: true },
    )
    .unwrap();

    let doc = PMMLReader::new().read(&path).unwrap();
    assert_eq!(doc.header.extensions.len(), 1);
    assert_eq!(doc.header.extensions[0].name, "repr");
}
