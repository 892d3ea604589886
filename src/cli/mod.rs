//! pmml-pipeline CLI Module
//!
//! Command-line interface for exporting, scoring and rewriting PMML models.

use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::export::{recount, MiningFunction, ModelEvaluator, PMMLDocument, PMMLExporter, PMMLModel, PMMLReader};
use crate::pipeline::{build_and_export, PipelineConfig};
use crate::training::{Prediction, TaskType};
use crate::utils::data_loader::{default_target, frame_to_records, preview, DataLoader, DataSaver};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "pmml-pipeline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fit tree pipelines on CSV data and export them as PMML")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fit a pipeline described by a JSON config and write it as PMML
    Export {
        /// Pipeline config file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Score a CSV file with a PMML model
    Score {
        /// PMML model file
        #[arg(short, long)]
        pmml: PathBuf,

        /// Input data file (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// Output predictions file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rebuild node record counts of a PMML model from a CSV file
    RecordCount {
        #[arg(long)]
        pmml_input: PathBuf,

        #[arg(long)]
        csv_input: PathBuf,

        /// Written to stdout when omitted
        #[arg(long)]
        pmml_output: Option<PathBuf>,

        /// Write compact XML
        #[arg(long)]
        compact: bool,
    },

    /// Summarize a PMML model
    Info {
        #[arg(short, long)]
        pmml: PathBuf,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_export(config_path: &Path) -> anyhow::Result<()> {
    section("Export");

    let config = PipelineConfig::from_file(config_path)?;

    step_run("Loading data");
    let start = Instant::now();
    let df = config.loader().load_csv(&config.data)?;
    step_done(&format!("{} rows × {} cols in {:?}", df.height(), df.width(), start.elapsed()));

    println!();
    println!("{}", preview(&df, 3));

    let target = match &config.target {
        Some(target) => target.clone(),
        None => default_target(&df)?,
    };
    let estimator = config.estimator.build()?;

    step_run(&format!("Fitting {}", estimator.name().cyan()));
    let start = Instant::now();
    let pipeline = build_and_export(
        &df,
        &target,
        &config.exclude,
        config.mapper(),
        estimator,
        &config.output,
        config.options(),
    )?;
    step_done(&format!("{:?}", start.elapsed()));

    let metrics = pipeline.metrics();
    println!();
    kv("Target", &target);
    kv("Features", &metrics.n_features.to_string());
    match pipeline.task() {
        TaskType::Classification => {
            kv("Classes", &pipeline.target().classes.join(", "));
            kv("Accuracy", &format!("{:.4}", metrics.accuracy.unwrap_or(0.0)));
            if let Some(log_loss) = metrics.log_loss {
                kv("Log loss", &format!("{:.4}", log_loss));
            }
        }
        TaskType::Regression => {
            kv("RMSE", &format!("{:.4}", metrics.rmse.unwrap_or(0.0)));
            kv("R²", &format!("{:.4}", metrics.r2.unwrap_or(0.0)));
        }
    }
    kv("Time", &format!("{:.3}s", metrics.training_time_secs));

    if let Some(importances) = pipeline.feature_importances() {
        section("Feature importances");
        for (name, importance) in importances.iter().take(10) {
            println!("  {:<32} {:>8.4}", name, importance);
        }
    }

    println!();
    println!("  {} {}", ok("wrote"), config.output.display().to_string().white().bold());
    println!();
    Ok(())
}

pub fn cmd_score(pmml_path: &Path, data_path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let evaluator = ModelEvaluator::new(PMMLReader::new().read(pmml_path)?)?;
    let df = DataLoader::new().load_csv(data_path)?;
    let records = frame_to_records(&df)?;

    let predictions = records
        .iter()
        .enumerate()
        .map(|(row, record)| {
            evaluator
                .evaluate(record)
                .map_err(|e| anyhow::anyhow!("row {}: {}", row, e))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut out = predictions_frame(&evaluator, &predictions)?;

    match output {
        Some(path) => {
            DataSaver::save_csv(&mut out, path)?;
            println!("  {} {} predictions → {}", ok("✓"), predictions.len(), path.display());
        }
        None => println!("{}", out),
    }
    Ok(())
}

fn predictions_frame(evaluator: &ModelEvaluator, predictions: &[Prediction]) -> anyhow::Result<DataFrame> {
    let target = evaluator.target_field();
    let mut columns: Vec<Column> = Vec::new();

    match evaluator.function() {
        MiningFunction::Regression => {
            let values: Vec<Option<f64>> = predictions.iter().map(Prediction::value).collect();
            columns.push(Series::new(target.into(), values).into());
        }
        MiningFunction::Classification => {
            let labels: Vec<Option<&str>> = predictions.iter().map(Prediction::label).collect();
            columns.push(Series::new(target.into(), labels).into());
            for class in evaluator.classes() {
                let values: Vec<Option<f64>> = predictions.iter().map(|p| p.probability(class)).collect();
                columns.push(Series::new(format!("probability({})", class).into(), values).into());
            }
        }
    }

    Ok(DataFrame::new(columns)?)
}

pub fn cmd_record_count(
    pmml_input: &Path,
    csv_input: &Path,
    pmml_output: Option<&Path>,
    compact: bool,
) -> anyhow::Result<()> {
    let doc = PMMLReader::new().read(pmml_input)?;
    let df = DataLoader::new().load_csv(csv_input)?;
    let records = frame_to_records(&df)?;

    let doc = recount(doc, &records)?;
    let exporter = PMMLExporter::new().with_compact(compact);

    match pmml_output {
        Some(path) => {
            exporter.export(&doc, path)?;
            eprintln!("  {} {} records counted → {}", ok("✓"), records.len(), path.display());
        }
        None => print!("{}", exporter.export_to_string(&doc)?),
    }
    Ok(())
}

pub fn cmd_info(pmml_path: &Path) -> anyhow::Result<()> {
    let doc = PMMLReader::new().read(pmml_path)?;
    print_info(&doc)?;
    Ok(())
}

fn print_info(doc: &PMMLDocument) -> anyhow::Result<()> {
    section("Model");
    let model_type = match &doc.model {
        PMMLModel::Tree(_) => "TreeModel".to_string(),
        PMMLModel::Mining(mining) => format!(
            "MiningModel ({} segments, {})",
            mining.segments.len(),
            mining.multiple_model_method.as_str()
        ),
    };
    kv("Type", &model_type);
    kv("Function", doc.model.function().as_str());
    kv("Target", doc.target_field()?);
    kv(
        "Application",
        &format!("{} {}", doc.header.application_name, doc.header.application_version),
    );
    if let Some(timestamp) = &doc.header.timestamp {
        kv("Timestamp", timestamp);
    }
    let nodes: usize = doc.model.trees().iter().map(|t| t.root.count_nodes()).sum();
    kv("Nodes", &nodes.to_string());

    section("Fields");
    for field in &doc.data_dictionary {
        let detail = match (&field.interval, field.values.len()) {
            (Some(interval), _) => format!("[{}, {}]", interval.left_margin, interval.right_margin),
            (None, 0) => String::new(),
            (None, n) => format!("{} values", n),
        };
        println!(
            "  {:<24} {:<12} {:<12} {}",
            field.name,
            muted(field.op_type.as_str()),
            muted(field.data_type.as_str()),
            dim(&detail)
        );
    }
    if !doc.transformation_dictionary.is_empty() {
        kv("Derived fields", &doc.transformation_dictionary.len().to_string());
    }
    println!();
    Ok(())
}
