use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ZipperError};
use crate::logging::LoggingConfig;

/// `aws` section: where objects come from and where the archive goes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AwsConfig {
    pub source_bucket: String,
    pub destination_bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// S3-compatible endpoint (MinIO, LocalStack, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
}

/// `zip_config` section: which folders to combine and how to name the result.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ZipConfig {
    pub source_prefixes: Vec<String>,
    pub output_zip_name: String,
    #[serde(default)]
    pub destination_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_directory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_zip_path: Option<PathBuf>,
}

/// `options` section. Every field is optional; defaults are applied when the
/// file is turned into a [`PipelineConfig`](super::PipelineConfig).
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct OptionsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_local_after: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_existing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite_s3: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_downloads: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_on_failure: Option<bool>,
}

/// The configuration file as written by the user.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ZipperConfig {
    pub aws: AwsConfig,
    pub zip_config: ZipConfig,
    #[serde(default)]
    pub options: OptionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

const SAMPLE_HEADER: &str = "\
# s3-folder-zipper configuration
#
# Every prefix under zip_config.source_prefixes must end with '/'.
# Objects are stored in the archive under their key with the prefix removed.
# Credentials are read from AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY
# (a .env file in the working directory is loaded if present).
";

impl ZipperConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ZipperError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config = Self::from_yaml_str(&content).map_err(|e| match e {
            ZipperError::Config(msg) => ZipperError::config(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| ZipperError::config(format!("Failed to parse YAML config: {}", e)))
    }

    /// A starting point for `init-config`.
    pub fn sample() -> Self {
        Self {
            aws: AwsConfig {
                source_bucket: "my-source-bucket".to_string(),
                destination_bucket: "my-destination-bucket".to_string(),
                region: Some("us-east-1".to_string()),
                endpoint_url: None,
            },
            zip_config: ZipConfig {
                source_prefixes: vec![
                    "datasets/partition-a/".to_string(),
                    "datasets/partition-b/".to_string(),
                ],
                output_zip_name: "combined.zip".to_string(),
                destination_prefix: "exports/".to_string(),
                local_directory: None,
                local_zip_path: None,
            },
            options: OptionsConfig {
                compression_level: Some(9),
                delete_local_after: Some(true),
                skip_existing: Some(false),
                ..Default::default()
            },
            logging: LoggingConfig {
                level: Some("INFO".to_string()),
                ..Default::default()
            },
        }
    }

    /// Save configuration to a YAML file
    pub fn save_to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| ZipperError::config(format!("Failed to serialize config to YAML: {}", e)))?;

        fs::write(path, format!("{}{}", SAMPLE_HEADER, yaml))
            .map_err(|e| ZipperError::config(format!("Failed to write config to {}: {}", path.display(), e)))?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Write the sample configuration, refusing to clobber an existing file.
    pub fn create_sample_config_file(path: &Path) -> Result<()> {
        if path.exists() {
            return Err(ZipperError::config(format!(
                "{} already exists; refusing to overwrite it",
                path.display()
            )));
        }
        Self::sample().save_to_yaml_file(path)
    }
}
