use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use tokio::runtime::Runtime;
use uuid::Uuid;

use s3_folder_zipper::cli::{Args, Commands};
use s3_folder_zipper::cloud::client::{check_credentials, create_s3_client};
use s3_folder_zipper::cloud::retry::RetryPolicy;
use s3_folder_zipper::cloud::s3::S3ObjectStore;
use s3_folder_zipper::cloud::ObjectStore;
use s3_folder_zipper::config::{PipelineConfig, ZipperConfig};
use s3_folder_zipper::error::ZipperError;
use s3_folder_zipper::logging::{init_logging, LoggingConfig, RunLogger};
use s3_folder_zipper::models::{PipelineResult, PipelineStatus};
use s3_folder_zipper::pipeline::Pipeline;
use s3_folder_zipper::utils::summary::write_run_summary;

/// Exit code for configuration problems detected before any remote call.
const CONFIG_ERROR_EXIT: u8 = 2;

fn main() -> ExitCode {
    // A .env file is optional; its absence is not worth reporting
    let dotenv = dotenvy::dotenv();

    // Parse arguments
    let args = Args::parse();

    // Handle subcommands
    if let Some(Commands::InitConfig { path }) = &args.command {
        initialize_logging(&LoggingConfig::default(), args.verbose);
        return handle_init_config(path);
    }

    // Logging settings come from the config file, so read it first
    let file_config = ZipperConfig::from_yaml_file(&args.config);
    let logging_config = file_config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    initialize_logging(&logging_config, args.verbose);

    match dotenv {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Ignoring unreadable .env file: {}", e),
    }

    let config = match file_config.and_then(|c| PipelineConfig::from_file_config(&c)) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(CONFIG_ERROR_EXIT);
        }
    };

    match run_pipeline(&args, config) {
        Ok(result) => ExitCode::from(result.status.exit_code()),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

/// Initialize logging, falling back to defaults if the configured settings
/// are unusable.
fn initialize_logging(config: &LoggingConfig, verbose: bool) {
    if let Err(e) = init_logging(config, verbose) {
        eprintln!("{}; using default logging", e);
        if let Err(e) = init_logging(&LoggingConfig::default(), verbose) {
            eprintln!("{}", e);
        }
    }
}

fn handle_init_config(path: &Path) -> ExitCode {
    info!("Creating sample configuration file at {}", path.display());
    match ZipperConfig::create_sample_config_file(path) {
        Ok(()) => {
            info!("Configuration created successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(CONFIG_ERROR_EXIT)
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ZipperError>() {
        Some(ZipperError::Config(_)) => CONFIG_ERROR_EXIT,
        _ => PipelineStatus::Failed.exit_code(),
    }
}

/// Build the S3-backed pipeline and drive it to completion.
fn run_pipeline(args: &Args, config: PipelineConfig) -> Result<PipelineResult> {
    check_credentials()?;
    let client = create_s3_client(config.region.as_deref(), config.endpoint_url.as_deref())?;
    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(
        client,
        RetryPolicy::with_max_attempts(config.max_retries),
    ));

    let run_id = Uuid::new_v4().to_string();
    info!("Starting run {}", run_id);

    let runtime = Runtime::new().context("Failed to create Tokio runtime")?;
    let pipeline = Pipeline::new(config, store, RunLogger::new(&run_id));
    let result = runtime.block_on(async {
        if args.dry_run {
            pipeline.plan().await
        } else {
            pipeline.run().await
        }
    });

    report(&result);

    if let Some(path) = &args.summary {
        match write_run_summary(path, &result, pipeline.config()) {
            Ok(()) => info!("Run summary written to {}", path.display()),
            Err(e) => warn!("{:#}", e),
        }
    }

    Ok(result)
}

fn report(result: &PipelineResult) {
    match result.status {
        PipelineStatus::Success => info!(
            "Published {} ({} objects, {} bytes)",
            result.archive_remote_location, result.object_count, result.total_bytes
        ),
        PipelineStatus::Skipped => info!(
            "{} already exists; nothing to do",
            result.archive_remote_location
        ),
        PipelineStatus::DryRun => info!(
            "Dry run complete: {} objects, {} bytes",
            result.object_count, result.total_bytes
        ),
        PipelineStatus::Failed => {
            let stage = result
                .failed_stage
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            error!(
                "Run failed during {}: {}",
                stage,
                result.error_detail.as_deref().unwrap_or("no detail")
            );
            if let Some(path) = &result.local_archive_path {
                error!("Local archive kept at {}", path.display());
            }
        }
    }
}
