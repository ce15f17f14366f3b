use std::path::{Component, Path, PathBuf};

use log::warn;
use serde::Serialize;
use uuid::Uuid;

use crate::config::zipper_config::ZipperConfig;
use crate::constants::{
    DEFAULT_COMPRESSION_LEVEL, MAX_DEFAULT_DOWNLOAD_WORKERS, MAX_TRANSFER_RETRIES,
    STAGING_DIR_PREFIX,
};
use crate::error::{Result, ZipperError};

/// Validated, immutable settings for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    pub source_bucket: String,
    pub destination_bucket: String,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    /// Each prefix ends with `/`
    pub source_prefixes: Vec<String>,
    pub output_archive_name: String,
    pub destination_prefix: String,
    pub local_staging_root: PathBuf,
    /// Always outside `local_staging_root`
    pub local_archive_path: PathBuf,
    pub compression_level: u8,
    pub delete_local_after: bool,
    pub skip_if_exists: bool,
    pub max_concurrent_downloads: usize,
    pub max_retries: usize,
    pub cleanup_on_failure: bool,
}

/// Default number of concurrent downloads: one per core, capped.
pub fn default_download_workers() -> usize {
    num_cpus::get().clamp(1, MAX_DEFAULT_DOWNLOAD_WORKERS)
}

/// Fresh staging directory under the system temp dir.
pub fn default_staging_root() -> PathBuf {
    std::env::temp_dir().join(format!("{}-{}", STAGING_DIR_PREFIX, Uuid::new_v4()))
}

/// The archive lives next to the staging root, never inside it.
pub fn default_archive_path(staging_root: &Path, output_archive_name: &str) -> PathBuf {
    let dir_name = staging_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| STAGING_DIR_PREFIX.to_string());
    let parent = staging_root.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{}-{}", dir_name, output_archive_name))
}

/// Absolute form of `path` with `.` and `..` folded away. Purely lexical:
/// the path does not have to exist.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

impl PipelineConfig {
    /// Settings with every option at its default. Mostly useful for tests
    /// and programmatic callers; [`PipelineConfig::from_file_config`] is the
    /// path the CLI takes.
    pub fn new(
        source_bucket: impl Into<String>,
        destination_bucket: impl Into<String>,
        source_prefixes: Vec<String>,
        output_archive_name: impl Into<String>,
        local_staging_root: impl Into<PathBuf>,
    ) -> Self {
        let output_archive_name = output_archive_name.into();
        let local_staging_root = local_staging_root.into();
        let local_archive_path = default_archive_path(&local_staging_root, &output_archive_name);
        Self {
            source_bucket: source_bucket.into(),
            destination_bucket: destination_bucket.into(),
            region: None,
            endpoint_url: None,
            source_prefixes,
            output_archive_name,
            destination_prefix: String::new(),
            local_staging_root,
            local_archive_path,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            delete_local_after: true,
            skip_if_exists: false,
            max_concurrent_downloads: default_download_workers(),
            max_retries: MAX_TRANSFER_RETRIES,
            cleanup_on_failure: false,
        }
    }

    /// Resolve defaults and validate a parsed configuration file.
    pub fn from_file_config(file: &ZipperConfig) -> Result<Self> {
        let options = &file.options;

        // skip_existing and overwrite_s3 are two spellings of one switch
        if options.skip_existing == Some(true) && options.overwrite_s3 == Some(true) {
            return Err(ZipperError::config(
                "options.skip_existing and options.overwrite_s3 cannot both be true",
            ));
        }
        let skip_if_exists = match (options.skip_existing, options.overwrite_s3) {
            (Some(skip), _) => skip,
            (None, Some(overwrite)) => !overwrite,
            (None, None) => false,
        };

        let compression_level = match options.compression_level {
            None => DEFAULT_COMPRESSION_LEVEL,
            Some(level) if (1..=9).contains(&level) => level as u8,
            Some(level) => {
                return Err(ZipperError::config(format!(
                    "options.compression_level must be between 1 and 9, got {}",
                    level
                )))
            }
        };

        let zip = &file.zip_config;
        let local_staging_root = zip
            .local_directory
            .as_deref()
            .map(normalize_path)
            .unwrap_or_else(default_staging_root);
        let local_archive_path = zip
            .local_zip_path
            .as_deref()
            .map(normalize_path)
            .unwrap_or_else(|| default_archive_path(&local_staging_root, &zip.output_zip_name));

        let config = Self {
            source_bucket: file.aws.source_bucket.trim().to_string(),
            destination_bucket: file.aws.destination_bucket.trim().to_string(),
            region: file.aws.region.clone().filter(|r| !r.trim().is_empty()),
            endpoint_url: file.aws.endpoint_url.clone().filter(|e| !e.trim().is_empty()),
            source_prefixes: zip.source_prefixes.clone(),
            output_archive_name: zip.output_zip_name.clone(),
            destination_prefix: zip.destination_prefix.clone(),
            local_staging_root,
            local_archive_path,
            compression_level,
            delete_local_after: options.delete_local_after.unwrap_or(true),
            skip_if_exists,
            max_concurrent_downloads: options
                .max_concurrent_downloads
                .unwrap_or_else(default_download_workers),
            max_retries: options.max_retries.unwrap_or(MAX_TRANSFER_RETRIES),
            cleanup_on_failure: options.cleanup_on_failure.unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check every invariant. Runs before any remote call is made.
    pub fn validate(&self) -> Result<()> {
        if self.source_bucket.is_empty() {
            return Err(ZipperError::config("aws.source_bucket must not be empty"));
        }
        if self.destination_bucket.is_empty() {
            return Err(ZipperError::config("aws.destination_bucket must not be empty"));
        }
        if self.source_prefixes.is_empty() {
            return Err(ZipperError::config(
                "zip_config.source_prefixes must list at least one prefix",
            ));
        }
        for prefix in &self.source_prefixes {
            if !prefix.ends_with('/') {
                return Err(ZipperError::config(format!(
                    "source prefix '{}' must end with '/'",
                    prefix
                )));
            }
        }
        if self.output_archive_name.trim().is_empty() {
            return Err(ZipperError::config("zip_config.output_zip_name must not be empty"));
        }
        if self.output_archive_name.contains('/') {
            return Err(ZipperError::config(format!(
                "zip_config.output_zip_name '{}' must be a plain file name",
                self.output_archive_name
            )));
        }
        if !(1..=9).contains(&self.compression_level) {
            return Err(ZipperError::config(format!(
                "compression level must be between 1 and 9, got {}",
                self.compression_level
            )));
        }
        if self.max_concurrent_downloads == 0 {
            return Err(ZipperError::config(
                "options.max_concurrent_downloads must be at least 1",
            ));
        }
        if self.max_retries == 0 {
            return Err(ZipperError::config("options.max_retries must be at least 1"));
        }
        self.validate_local_paths()?;

        for (i, a) in self.source_prefixes.iter().enumerate() {
            for b in &self.source_prefixes[i + 1..] {
                if a.starts_with(b.as_str()) || b.starts_with(a.as_str()) {
                    warn!(
                        "Source prefixes '{}' and '{}' overlap; shared objects will collide in the archive",
                        a, b
                    );
                }
            }
        }

        Ok(())
    }

    /// The staging root is removed after a run, so it must be a dedicated
    /// directory: not a filesystem root, not the working directory or one of
    /// its ancestors, and not the directory holding the local archive.
    fn validate_local_paths(&self) -> Result<()> {
        let staging_root = normalize_path(&self.local_staging_root);
        let archive_path = normalize_path(&self.local_archive_path);

        if staging_root.parent().is_none() {
            return Err(ZipperError::config(format!(
                "staging directory {} must not be a filesystem root",
                self.local_staging_root.display()
            )));
        }
        if let Ok(cwd) = std::env::current_dir() {
            if normalize_path(&cwd).starts_with(&staging_root) {
                return Err(ZipperError::config(format!(
                    "staging directory {} must not contain the working directory",
                    self.local_staging_root.display()
                )));
            }
        }
        if archive_path.starts_with(&staging_root) {
            return Err(ZipperError::config(format!(
                "local archive path {} must not be inside the staging directory {}",
                self.local_archive_path.display(),
                self.local_staging_root.display()
            )));
        }
        Ok(())
    }

    /// Destination key: `destination_prefix` joined to the archive name with
    /// exactly one `/`, or the bare name when the prefix is empty.
    pub fn destination_key(&self) -> String {
        let prefix = self.destination_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            self.output_archive_name.clone()
        } else {
            format!("{}/{}", prefix, self.output_archive_name)
        }
    }

    /// `s3://bucket/key` form of the destination.
    pub fn destination_location(&self) -> String {
        format!("s3://{}/{}", self.destination_bucket, self.destination_key())
    }
}
