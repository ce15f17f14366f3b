//! # s3-folder-zipper
//!
//! Combines several S3 "folders" (key prefixes) into one zip archive and
//! publishes it back to S3.
//!
//! ## Overview
//!
//! A run lists every configured prefix, downloads the objects into a local
//! staging tree, writes them into a single archive (each object stored under
//! its key with the prefix removed), uploads the archive and cleans up.
//!
//! ## Features
//!
//! - **Deterministic layout**: entries follow listing order, prefix by prefix
//! - **Safe staging**: keys that would escape the staging root are rejected
//! - **Collision detection**: two objects mapping to one entry fail the run
//! - **Idempotent re-runs**: optional skip when the destination already exists
//! - **Bounded concurrency**: parallel streaming downloads with a worker cap
//! - **Retrying transport**: transient S3 errors are retried with backoff
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use s3_folder_zipper::cloud::memory::MemoryObjectStore;
//! use s3_folder_zipper::config::PipelineConfig;
//! use s3_folder_zipper::logging::RunLogger;
//! use s3_folder_zipper::pipeline::Pipeline;
//!
//! # async fn example() {
//! let store = Arc::new(MemoryObjectStore::new());
//! store.insert("src", "a/x.txt", b"hello".to_vec());
//!
//! let config = PipelineConfig::new(
//!     "src",
//!     "dst",
//!     vec!["a/".to_string()],
//!     "combined.zip",
//!     "/tmp/zipper-stage",
//! );
//! let pipeline = Pipeline::new(config, store, RunLogger::new("example"));
//! let result = pipeline.run().await;
//! println!("{:?}: {}", result.status, result.archive_remote_location);
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`cli`]: Command-line interface definitions and argument parsing
//! - [`config`]: Configuration file model and validation
//! - [`cloud`]: Object storage capability, S3 and in-memory implementations
//! - [`pipeline`]: Lister, staging, downloader, archive builder, guard,
//!   publisher and the orchestrating state machine
//! - [`models`]: Core data models
//! - [`logging`]: Logger setup and the per-run logging handle
//! - [`security`]: Key validation and credential scrubbing
//! - [`utils`]: Run summary reporting
//! - [`error`]: Error taxonomy
//! - [`constants`]: Application-wide constants

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Core data models and structures used throughout the application
pub mod models;

/// Error types
pub mod error;

/// Logger initialization and per-run logging handle
pub mod logging;

/// Configuration file model and validated pipeline settings
pub mod config;

/// Object storage integration (S3, in-memory)
pub mod cloud;

/// The aggregation pipeline stages and orchestrator
pub mod pipeline;

/// Utility functions for reporting
pub mod utils;

/// Application constants and configuration values
pub mod constants;

/// Security utilities for key validation and credential protection
pub mod security;
