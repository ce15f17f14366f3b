use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::Instant;

use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::constants::{ARCHIVE_FILE_PERMISSIONS, COMPRESSION_CHUNK_SIZE, ZIP64_THRESHOLD};
use crate::error::{Result, ZipperError};
use crate::logging::RunLogger;
use crate::models::ArchiveEntry;

/// What ended up in a finished archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub uncompressed_bytes: u64,
    pub archive_bytes: u64,
}

/// Writes staged files into a single Deflate-compressed zip.
#[derive(Clone)]
pub struct ArchiveBuilder {
    compression_level: u8,
    logger: RunLogger,
}

/// Fail on the first archive path that two entries share, or that one entry
/// uses as a file while another needs it as a directory (`x` and `x/y`).
pub fn verify_unique(entries: &[ArchiveEntry]) -> Result<()> {
    let mut seen: HashMap<&str, &str> = HashMap::with_capacity(entries.len());
    for entry in entries {
        if let Some(first_key) = seen.insert(&entry.archive_relative_path, &entry.source_key) {
            return Err(ZipperError::ArchiveCollision {
                path: entry.archive_relative_path.clone(),
                first_key: first_key.to_string(),
                second_key: entry.source_key.clone(),
            });
        }
    }

    for entry in entries {
        let path = entry.archive_relative_path.as_str();
        for (slash, _) in path.match_indices('/') {
            let parent = &path[..slash];
            if let Some(file_key) = seen.get(parent) {
                return Err(ZipperError::ArchiveCollision {
                    path: parent.to_string(),
                    first_key: file_key.to_string(),
                    second_key: entry.source_key.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Determine the zip options for one entry.
///
/// Entries at or above 4GiB need zip64 headers, which must be requested
/// before the entry is started.
pub fn entry_options(compression_level: u8, size: u64) -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(i32::from(compression_level)))
        .unix_permissions(ARCHIVE_FILE_PERMISSIONS)
        .large_file(size >= ZIP64_THRESHOLD)
}

impl ArchiveBuilder {
    pub fn new(compression_level: u8, logger: RunLogger) -> Self {
        Self {
            compression_level,
            logger,
        }
    }

    /// Write `entries`, in order, to a new archive at `archive_path`.
    ///
    /// Uniqueness is checked before the file is created. If writing fails
    /// part way, the partial file is left where it is.
    pub fn build(&self, entries: &[ArchiveEntry], archive_path: &Path) -> Result<ArchiveSummary> {
        verify_unique(entries)?;
        let start = Instant::now();

        if let Some(parent) = archive_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ZipperError::staging(parent, e))?;
        }

        let file = File::create(archive_path)
            .map_err(|e| ZipperError::archive_write(archive_path, format!("cannot create: {}", e)))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));

        // Reused across entries to avoid repeated allocations
        let mut buffer = vec![0u8; COMPRESSION_CHUNK_SIZE];
        let mut uncompressed_bytes = 0u64;

        for entry in entries {
            uncompressed_bytes += self.write_entry(&mut zip, entry, &mut buffer, archive_path)?;
        }

        let mut writer = zip
            .finish()
            .map_err(|e| ZipperError::archive_write(archive_path, e))?;
        writer
            .flush()
            .map_err(|e| ZipperError::archive_write(archive_path, e))?;
        drop(writer);

        let archive_bytes = fs::metadata(archive_path)
            .map_err(|e| ZipperError::archive_write(archive_path, e))?
            .len();

        self.logger.info(format_args!(
            "Wrote {} entries ({} bytes, {} compressed, level {}) to {} in {:.2?}",
            entries.len(),
            uncompressed_bytes,
            archive_bytes,
            self.compression_level,
            archive_path.display(),
            start.elapsed()
        ));

        Ok(ArchiveSummary {
            entries: entries.len(),
            uncompressed_bytes,
            archive_bytes,
        })
    }

    fn write_entry<W: Write + std::io::Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        entry: &ArchiveEntry,
        buffer: &mut [u8],
        archive_path: &Path,
    ) -> Result<u64> {
        let source = &entry.source_local_path;
        let file = File::open(source).map_err(|e| ZipperError::staging(source, e))?;
        let size = file
            .metadata()
            .map_err(|e| ZipperError::staging(source, e))?
            .len();
        let mut reader = BufReader::new(file);

        zip.start_file(
            entry.archive_relative_path.as_str(),
            entry_options(self.compression_level, size),
        )
        .map_err(|e| {
            ZipperError::archive_write(
                archive_path,
                format!("cannot start entry {}: {}", entry.archive_relative_path, e),
            )
        })?;

        // Stream file content in chunks to avoid large memory usage
        let mut written = 0u64;
        loop {
            let bytes_read = reader
                .read(buffer)
                .map_err(|e| ZipperError::staging(source, e))?;
            if bytes_read == 0 {
                break;
            }
            zip.write_all(&buffer[..bytes_read]).map_err(|e| {
                ZipperError::archive_write(
                    archive_path,
                    format!("writing {}: {}", entry.archive_relative_path, e),
                )
            })?;
            written += bytes_read as u64;
        }

        self.logger.debug(format_args!(
            "Added {} ({} bytes)",
            entry.archive_relative_path, written
        ));
        Ok(written)
    }
}
