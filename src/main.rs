use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use memoria_imessage::config::AppConfig;
use memoria_imessage::logging::init_logging;
use memoria_imessage::service::Preprocessor;
use memoria_imessage::validation::InputValidator;

/// Extract and deduplicate iMessage attachments from Mac and iPhone exports
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Export directories, oldest first; later contact cards win
    #[arg(required = true)]
    exports: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Worker threads for hashing and copying
    #[arg(short, long)]
    workers: Option<usize>,

    /// Owner label for the export
    #[arg(long)]
    owner: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    apply_overrides(&mut config, &cli);
    config.validate().context("Invalid configuration")?;

    let _guard = init_logging(Some(config.logging.level.as_str()), config.log_file(), config.json_logs())?;
    info!("Starting memoria-imessage");

    // bad paths are reported here and counted as failed exports by the run
    for export in &cli.exports {
        if let Err(e) = InputValidator::validate_export_path(export) {
            warn!(export = %export.display(), error = %e, "Export will be skipped");
        }
    }

    let preprocessor = Preprocessor::new(cli.exports, config.preprocess)?;
    let summary = preprocessor.run()?;

    info!(metadata = %summary.metadata_path.display(), "Wrote metadata");
    if let Some(report) = &summary.failure_report {
        info!(report = %report.display(), "Some files could not be processed");
    }

    #[allow(clippy::print_stdout)]
    {
        println!("{}", summary.stats);
    }

    Ok(())
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(output) = &cli.output {
        config.preprocess.output_directory = output.display().to_string();
    }
    if let Some(workers) = cli.workers {
        config.preprocess.workers = workers;
    }
    if let Some(owner) = &cli.owner {
        config.preprocess.owner_name.clone_from(owner);
    }
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    if let Some(file) = &cli.log_file {
        config.logging.file_path = file.display().to_string();
    }
    if cli.json_logs {
        config.logging.format = "json".to_string();
    }
}
