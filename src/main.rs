//! pmml-pipeline - Main Entry Point

use clap::Parser;
use pmml_pipeline::cli::{cmd_export, cmd_info, cmd_record_count, cmd_score, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pmml_pipeline=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Export { config } => cmd_export(&config)?,
        Commands::Score { pmml, data, output } => cmd_score(&pmml, &data, output.as_deref())?,
        Commands::RecordCount {
            pmml_input,
            csv_input,
            pmml_output,
            compact,
        } => cmd_record_count(&pmml_input, &csv_input, pmml_output.as_deref(), compact)?,
        Commands::Info { pmml } => cmd_info(&pmml)?,
    }

    Ok(())
}
