//! Reporting helpers.
//!
//! ## Writing a run summary
//!
//! ```no_run
//! use s3_folder_zipper::utils::summary::write_run_summary;
//! # use s3_folder_zipper::config::PipelineConfig;
//! # use s3_folder_zipper::models::PipelineResult;
//! use std::path::Path;
//!
//! # fn example(result: &PipelineResult, config: &PipelineConfig) -> anyhow::Result<()> {
//! write_run_summary(Path::new("reports/run.json"), result, config)?;
//! # Ok(())
//! # }
//! ```

/// Run summary generation and reporting
pub mod summary;
