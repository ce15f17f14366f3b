//! Global constants for the s3-folder-zipper application.
//!
//! This module centralizes all hardcoded values to improve maintainability
//! and make configuration changes easier.

// Buffer size constants
/// Chunk size for streaming staged files into the archive (512KB)
pub const COMPRESSION_CHUNK_SIZE: usize = 512 * 1024;

/// Write buffer for streaming downloads to disk (256KB)
pub const DOWNLOAD_BUFFER_SIZE: usize = 256 * 1024;

// Cloud storage constants
/// S3 upload chunk size (8MB, S3 minimum is 5MB)
pub const S3_UPLOAD_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Large file threshold for multipart uploads (50MB)
pub const LARGE_FILE_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Maximum multipart parts in flight for a single upload
pub const MULTIPART_CONCURRENCY: usize = 4;

/// Maximum keys requested per ListObjectsV2 page
pub const LIST_PAGE_SIZE: i64 = 1000;

// Timeout and retry constants
/// Default maximum transport attempts
pub const MAX_TRANSFER_RETRIES: usize = 3;

/// Base retry delay in milliseconds
pub const RETRY_BASE_DELAY_MS: u64 = 250;

/// Maximum retry delay in seconds
pub const RETRY_MAX_DELAY_SECS: u64 = 30;

/// Upper bound for the default download worker count
pub const MAX_DEFAULT_DOWNLOAD_WORKERS: usize = 8;

// ZIP constants
/// Default Deflate level when the configuration does not set one
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 9;

/// Entries at or above this size need zip64 headers
pub const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// Unix permissions recorded for archived files
pub const ARCHIVE_FILE_PERMISSIONS: u32 = 0o644;

// Default names
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const STAGING_DIR_PREFIX: &str = "s3-folder-zipper";
pub const LOG_TARGET: &str = "s3_folder_zipper";

// Credentials that must be present in the environment
pub const REQUIRED_CREDENTIAL_VARS: &[&str] = &["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"];
