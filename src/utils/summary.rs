use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use crate::config::PipelineConfig;
use crate::models::PipelineResult;

/// Create a JSON summary of a pipeline run.
///
/// The summary is what operators and schedulers read after the process
/// exits: the run outcome plus the inputs that produced it.
///
/// # Example Output
///
/// ```json
/// {
///   "run_id": "550e8400-e29b-41d4-a716-446655440000",
///   "status": "Success",
///   "archive_remote_location": "s3://dst/exports/combined.zip",
///   "object_count": 42,
///   "total_bytes": 1048576,
///   "tool_version": "0.3.0",
///   "inputs": {...}
/// }
/// ```
pub fn create_run_summary(result: &PipelineResult, config: &PipelineConfig) -> Result<String> {
    let mut summary =
        serde_json::to_value(result).context("Failed to serialize pipeline result")?;

    let inputs = json!({
        "source_bucket": config.source_bucket,
        "source_prefixes": config.source_prefixes,
        "destination_bucket": config.destination_bucket,
        "destination_key": config.destination_key(),
        "compression_level": config.compression_level,
        "skip_if_exists": config.skip_if_exists,
        "delete_local_after": config.delete_local_after,
    });

    if let Some(obj) = summary.as_object_mut() {
        obj.insert("tool_version".to_string(), json!(env!("CARGO_PKG_VERSION")));
        obj.insert("inputs".to_string(), inputs);
    }

    serde_json::to_string_pretty(&summary).context("Failed to serialize run summary to JSON")
}

/// Write the run summary to `path`, creating parent directories.
pub fn write_run_summary(path: &Path, result: &PipelineResult, config: &PipelineConfig) -> Result<()> {
    let summary = create_run_summary(result, config)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(path, summary).with_context(|| format!("Failed to write summary to {}", path.display()))
}
