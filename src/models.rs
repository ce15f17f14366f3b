use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One object discovered under a source prefix.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RemoteObjectRef {
    pub bucket: String,
    pub key: String,
    pub size: u64,
}

/// A remote object paired with the local file it is downloaded to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub remote_ref: RemoteObjectRef,
    pub local_path: PathBuf,
    pub source_prefix: String,
    /// Key with the source prefix removed, always `/`-separated
    pub relative_path: String,
}

impl StagedFile {
    pub fn archive_entry(&self) -> ArchiveEntry {
        ArchiveEntry {
            archive_relative_path: self.relative_path.clone(),
            source_local_path: self.local_path.clone(),
            source_key: self.remote_ref.key.clone(),
        }
    }
}

/// One file to be written into the archive.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub archive_relative_path: String,
    pub source_local_path: PathBuf,
    /// Remote key the entry came from, reported on collisions
    pub source_key: String,
}

/// Pipeline states. `Failed` is reachable from every state except `Done`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Init,
    CheckExisting,
    Listing,
    Downloading,
    Building,
    Publishing,
    Cleanup,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::CheckExisting => "check-existing",
            Stage::Listing => "listing",
            Stage::Downloading => "downloading",
            Stage::Building => "building",
            Stage::Publishing => "publishing",
            Stage::Cleanup => "cleanup",
            Stage::Done => "done",
        };
        write!(f, "{}", name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Success,
    Skipped,
    /// Planned only; nothing was downloaded or uploaded
    DryRun,
    Failed,
}

impl PipelineStatus {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineStatus::Success | PipelineStatus::Skipped | PipelineStatus::DryRun => 0,
            PipelineStatus::Failed => 1,
        }
    }
}

/// Terminal value of a pipeline run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult {
    pub run_id: String,
    pub status: PipelineStatus,
    /// `s3://bucket/key` of the destination artifact
    pub archive_remote_location: String,
    pub object_count: usize,
    pub total_bytes: u64,
    pub error_detail: Option<String>,
    pub failed_stage: Option<Stage>,
    /// Set whenever the local archive was left on disk
    pub local_archive_path: Option<PathBuf>,
    pub started_at: String,
    pub finished_at: String,
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Success
    }
}
