use std::fs;
use std::io::ErrorKind;
use std::sync::Arc;

use chrono::Utc;

use crate::cloud::retry::RetryPolicy;
use crate::cloud::ObjectStore;
use crate::config::PipelineConfig;
use crate::error::{Result, ZipperError};
use crate::logging::RunLogger;
use crate::models::{PipelineResult, PipelineStatus, Stage, StagedFile};
use crate::pipeline::archive::{verify_unique, ArchiveBuilder};
use crate::pipeline::downloader::Downloader;
use crate::pipeline::guard::ExistenceGuard;
use crate::pipeline::lister::ObjectLister;
use crate::pipeline::publisher::Publisher;
use crate::pipeline::staging::StagingArea;
use crate::security::safe_error_message;

/// Mutable bookkeeping for one run.
#[derive(Debug)]
struct Progress {
    stage: Stage,
    object_count: usize,
    total_bytes: u64,
    /// Set once the archive has been uploaded
    published_location: Option<String>,
}

/// Drives one aggregation run from listing to publication.
pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn ObjectStore>,
    logger: RunLogger,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, store: Arc<dyn ObjectStore>, logger: RunLogger) -> Self {
        Self {
            config,
            store,
            logger,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full pipeline. Never panics on remote or local failures;
    /// every outcome is reported through the returned result.
    pub async fn run(&self) -> PipelineResult {
        self.execute(false).await
    }

    /// List and validate the inputs without downloading or uploading.
    pub async fn plan(&self) -> PipelineResult {
        self.execute(true).await
    }

    async fn execute(&self, dry_run: bool) -> PipelineResult {
        let started_at = Utc::now().to_rfc3339();
        let staging = StagingArea::new(
            self.config.local_staging_root.clone(),
            self.logger.for_stage(Stage::Downloading),
        );
        let mut progress = Progress {
            stage: Stage::Init,
            object_count: 0,
            total_bytes: 0,
            published_location: None,
        };

        self.logger.info(format_args!(
            "Aggregating {} prefix(es) from s3://{} into {}",
            self.config.source_prefixes.len(),
            self.config.source_bucket,
            self.config.destination_location()
        ));

        let outcome = self.drive(dry_run, &staging, &mut progress).await;

        let (status, error_detail, failed_stage) = match outcome {
            Ok(status) => (status, None, None),
            Err(err) => {
                let detail = format!("{}: {}", err.kind(), safe_error_message(&err));
                self.handle_failure(&staging, progress.stage, &detail);
                (PipelineStatus::Failed, Some(detail), Some(progress.stage))
            }
        };

        let local_archive_path = Some(self.config.local_archive_path.clone())
            .filter(|path| path.exists());

        let result = PipelineResult {
            run_id: self.logger.run_id().to_string(),
            status,
            archive_remote_location: progress
                .published_location
                .take()
                .unwrap_or_else(|| self.config.destination_location()),
            object_count: progress.object_count,
            total_bytes: progress.total_bytes,
            error_detail,
            failed_stage,
            local_archive_path,
            started_at,
            finished_at: Utc::now().to_rfc3339(),
        };

        self.logger.for_stage(Stage::Done).info(format_args!(
            "Finished with status {:?}: {} object(s), {} bytes",
            result.status, result.object_count, result.total_bytes
        ));
        result
    }

    fn enter(&self, progress: &mut Progress, stage: Stage) -> RunLogger {
        progress.stage = stage;
        let logger = self.logger.for_stage(stage);
        logger.debug(format_args!("Entering stage"));
        logger
    }

    async fn drive(
        &self,
        dry_run: bool,
        staging: &StagingArea,
        progress: &mut Progress,
    ) -> Result<PipelineStatus> {
        self.config.validate()?;
        staging.ensure_unclaimed()?;
        let destination_key = self.config.destination_key();

        if self.config.skip_if_exists {
            let logger = self.enter(progress, Stage::CheckExisting);
            let guard = ExistenceGuard::new(Arc::clone(&self.store), logger.clone());
            if guard
                .exists(&self.config.destination_bucket, &destination_key)
                .await?
            {
                logger.info(format_args!("Destination archive already exists, skipping run"));
                progress.stage = Stage::Done;
                return Ok(PipelineStatus::Skipped);
            }
        }

        let logger = self.enter(progress, Stage::Listing);
        let staged = self.list_and_resolve(staging, &logger, progress).await?;

        if dry_run {
            for file in &staged {
                logger.info(format_args!(
                    "Would archive {} as {}",
                    file.remote_ref.key, file.relative_path
                ));
            }
            logger.info(format_args!(
                "Dry run: {} object(s), {} bytes would be uploaded to {}",
                progress.object_count,
                progress.total_bytes,
                self.config.destination_location()
            ));
            progress.stage = Stage::Done;
            return Ok(PipelineStatus::DryRun);
        }

        let logger = self.enter(progress, Stage::Downloading);
        staging.prepare()?;
        for file in &staged {
            staging.ensure_parent_dirs(&file.local_path)?;
        }
        let downloader = Downloader::new(
            Arc::clone(&self.store),
            logger,
            self.config.max_concurrent_downloads,
        )
        .with_retry(RetryPolicy::with_max_attempts(self.config.max_retries));
        progress.total_bytes = downloader.download_all(&staged).await?;

        let logger = self.enter(progress, Stage::Building);
        let entries: Vec<_> = staged.iter().map(StagedFile::archive_entry).collect();
        let builder = ArchiveBuilder::new(self.config.compression_level, logger);
        let archive_path = self.config.local_archive_path.clone();
        let build_path = archive_path.clone();
        tokio::task::spawn_blocking(move || builder.build(&entries, &build_path))
            .await
            .map_err(|e| ZipperError::archive_write(&archive_path, format!("build task failed: {}", e)))??;

        let logger = self.enter(progress, Stage::Publishing);
        let publisher = Publisher::new(Arc::clone(&self.store), logger);
        let location = publisher
            .publish(&archive_path, &self.config.destination_bucket, &destination_key)
            .await?;
        progress.published_location = Some(location);

        let logger = self.enter(progress, Stage::Cleanup);
        if self.config.delete_local_after {
            Publisher::new(Arc::clone(&self.store), logger).cleanup(staging, &archive_path);
        } else {
            logger.info(format_args!(
                "Keeping {} and {}",
                staging.root().display(),
                archive_path.display()
            ));
        }

        progress.stage = Stage::Done;
        Ok(PipelineStatus::Success)
    }

    /// List every prefix in configuration order and map each object to its
    /// staged location. Rejects archive path collisions before anything is
    /// downloaded.
    async fn list_and_resolve(
        &self,
        staging: &StagingArea,
        logger: &RunLogger,
        progress: &mut Progress,
    ) -> Result<Vec<StagedFile>> {
        let lister = ObjectLister::new(Arc::clone(&self.store), logger.clone());
        let mut staged = Vec::new();

        for prefix in &self.config.source_prefixes {
            let objects = lister.list_all(&self.config.source_bucket, prefix).await?;
            if objects.is_empty() {
                logger.warn(format_args!(
                    "No objects under s3://{}/{}",
                    self.config.source_bucket, prefix
                ));
            }
            for object in &objects {
                staged.push(staging.resolve(object, prefix)?);
            }
        }

        let entries: Vec<_> = staged.iter().map(StagedFile::archive_entry).collect();
        verify_unique(&entries)?;

        progress.object_count = staged.len();
        progress.total_bytes = staged.iter().map(|f| f.remote_ref.size).sum();
        Ok(staged)
    }

    fn handle_failure(&self, staging: &StagingArea, stage: Stage, detail: &str) {
        let logger = self.logger.for_stage(stage);
        logger.error(format_args!("Run failed: {}", detail));

        let before_publish = !matches!(stage, Stage::Publishing | Stage::Cleanup | Stage::Done);
        if self.config.cleanup_on_failure && before_publish {
            if let Err(e) = staging.teardown() {
                logger.warn(format_args!("Could not remove staging directory: {}", e));
            }
            // Only a failed build leaves an archive this run wrote
            if stage != Stage::Building {
                return;
            }
            let archive = &self.config.local_archive_path;
            match fs::remove_file(archive) {
                Ok(()) => logger.info(format_args!("Removed partial archive {}", archive.display())),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => logger.warn(format_args!(
                    "Could not remove partial archive {}: {}",
                    archive.display(),
                    e
                )),
            }
            return;
        }

        let leftover = staging.leftover_file_count();
        if leftover > 0 {
            logger.warn(format_args!(
                "Left {} staged file(s) under {} for inspection",
                leftover,
                staging.root().display()
            ));
        }
        if self.config.local_archive_path.exists() {
            logger.warn(format_args!(
                "Local archive kept at {}",
                self.config.local_archive_path.display()
            ));
        }
    }
}
