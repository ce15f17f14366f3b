use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use walkdir::WalkDir;

use crate::error::{Result, ZipperError};
use crate::logging::RunLogger;
use crate::models::{RemoteObjectRef, StagedFile};
use crate::security::{join_within, relative_key_path};

/// The local directory tree downloads are written into.
///
/// One staging root belongs to exactly one pipeline run. A root that
/// already holds files is never claimed, and [`StagingArea::teardown`] only
/// removes what a successful [`StagingArea::prepare`] handed to this run.
pub struct StagingArea {
    root: PathBuf,
    logger: RunLogger,
    claimed: AtomicBool,
    created_root: AtomicBool,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>, logger: RunLogger) -> Self {
        Self {
            root: root.into(),
            logger,
            claimed: AtomicBool::new(false),
            created_root: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fail if the root exists and already contains anything.
    ///
    /// Read-only, so it can run before any remote call.
    pub fn ensure_unclaimed(&self) -> Result<()> {
        match fs::read_dir(&self.root) {
            Ok(mut entries) => {
                if entries.next().is_some() {
                    return Err(ZipperError::staging(
                        &self.root,
                        io::Error::new(
                            ErrorKind::AlreadyExists,
                            "staging directory is not empty; point zip_config.local_directory at an empty or new directory",
                        ),
                    ));
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ZipperError::staging(&self.root, e)),
        }
    }

    /// Claim the staging root for this run, creating it if needed.
    pub fn prepare(&self) -> Result<()> {
        let existed = self.root.exists();
        if existed {
            self.ensure_unclaimed()?;
        }
        fs::create_dir_all(&self.root).map_err(|e| ZipperError::staging(&self.root, e))?;

        self.created_root.store(!existed, Ordering::SeqCst);
        self.claimed.store(true, Ordering::SeqCst);
        self.logger
            .debug(format_args!("Staging root ready at {}", self.root.display()));
        Ok(())
    }

    /// Map a remote object to its local path: the key with `source_prefix`
    /// stripped, joined under the staging root.
    pub fn resolve(&self, remote_ref: &RemoteObjectRef, source_prefix: &str) -> Result<StagedFile> {
        let escape = |reason: String| ZipperError::PathEscape {
            key: remote_ref.key.clone(),
            root: self.root.clone(),
            reason,
        };

        let relative_path = relative_key_path(&remote_ref.key, source_prefix).map_err(escape)?;
        let local_path = join_within(&self.root, &relative_path).map_err(escape)?;

        Ok(StagedFile {
            remote_ref: remote_ref.clone(),
            local_path,
            source_prefix: source_prefix.to_string(),
            relative_path,
        })
    }

    /// Create any missing directories above `local_path`.
    pub fn ensure_parent_dirs(&self, local_path: &Path) -> Result<()> {
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ZipperError::staging(parent, e))?;
        }
        Ok(())
    }

    /// Remove everything this run staged. A root created by `prepare` goes
    /// with it; a pre-existing empty root is emptied but kept. Does nothing
    /// if the root was never claimed, and removing an absent root is not an
    /// error.
    pub fn teardown(&self) -> Result<()> {
        if !self.claimed.load(Ordering::SeqCst) {
            self.logger.debug(format_args!(
                "Staging directory {} was not prepared by this run, leaving it untouched",
                self.root.display()
            ));
            return Ok(());
        }

        let removed = if self.created_root.load(Ordering::SeqCst) {
            fs::remove_dir_all(&self.root)
        } else {
            self.remove_contents()
        };

        match removed {
            Ok(()) => {
                self.logger
                    .info(format_args!("Removed staging directory {}", self.root.display()));
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ZipperError::staging(&self.root, e)),
        }
    }

    fn remove_contents(&self) -> io::Result<()> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Number of regular files currently under the staging root.
    pub fn leftover_file_count(&self) -> usize {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .count()
    }
}
