use std::env;

use log::debug;
use rusoto_core::{HttpClient, Region};
use rusoto_credential::EnvironmentProvider;
use rusoto_s3::S3Client;

use crate::constants::REQUIRED_CREDENTIAL_VARS;
use crate::error::{Result, ZipperError};

/// Resolve the AWS region from configuration, falling back to the
/// environment (`AWS_DEFAULT_REGION` / `AWS_REGION`).
///
/// An explicit `endpoint_url` produces a custom region so S3-compatible
/// stores (MinIO, Ceph, LocalStack) can be targeted.
pub fn resolve_region(region_name: Option<&str>, endpoint_url: Option<&str>) -> Result<Region> {
    if let Some(endpoint) = endpoint_url {
        let name = region_name
            .map(str::to_string)
            .unwrap_or_else(|| Region::default().name().to_string());
        debug!("Using custom S3 endpoint {} (region {})", endpoint, name);
        return Ok(Region::Custom {
            name,
            endpoint: endpoint.to_string(),
        });
    }

    match region_name {
        Some(name) => name
            .parse::<Region>()
            .map_err(|_| ZipperError::config(format!("aws.region '{}' is not a known AWS region", name))),
        None => Ok(Region::default()),
    }
}

/// Fail early when the credential variables are not set.
pub fn check_credentials() -> Result<()> {
    let missing: Vec<&str> = REQUIRED_CREDENTIAL_VARS
        .iter()
        .copied()
        .filter(|var| env::var(var).map(|v| v.is_empty()).unwrap_or(true))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ZipperError::config(format!(
            "Missing required AWS credentials in environment: {}",
            missing.join(", ")
        )))
    }
}

/// Create an S3 client that reads its credentials from the environment.
pub fn create_s3_client(region_name: Option<&str>, endpoint_url: Option<&str>) -> Result<S3Client> {
    let region = resolve_region(region_name, endpoint_url)?;
    let http_client = HttpClient::new()
        .map_err(|e| ZipperError::config(format!("Failed to create HTTP client: {}", e)))?;

    debug!("Creating S3 client for region {}", region.name());
    Ok(S3Client::new_with(
        http_client,
        EnvironmentProvider::default(),
        region,
    ))
}
