use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use flate2::{Compression, GzBuilder};
use log::{debug, info, warn};

use crate::config::{CarverConfig, CompressionKind};
use crate::constants::{
    ARCHIVE_EXTENSION, CARVE_NAME_PREFIX, COMPRESSED_EXTENSION, COMPRESSION_BUFFER_SIZE,
};
use crate::error::CarveError;

/// Removes a file on drop unless committed.
struct ArtifactGuard {
    path: PathBuf,
    armed: bool,
}

impl ArtifactGuard {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed partial artifact {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove partial artifact {}: {}", self.path.display(), e),
        }
    }
}

/// Paths and sizes of the packaged carve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOutcome {
    pub archive_path: PathBuf,
    /// The artifact to ship; equals `archive_path` when compression is off
    pub compressed_path: PathBuf,
    pub archive_size: u64,
    pub compressed_size: u64,
}

/// Archives staged files into `carve_<guid>.tar` and compresses the result.
#[derive(Debug, Clone)]
pub struct Packager {
    guid: String,
    compression: CompressionKind,
    level: u32,
}

impl Packager {
    pub fn new(guid: &str, config: &CarverConfig) -> Self {
        Self {
            guid: guid.to_string(),
            compression: config.compression,
            level: config.compression_level,
        }
    }

    pub fn archive_path(&self, staging_dir: &Path) -> PathBuf {
        staging_dir.join(format!("{}{}.{}", CARVE_NAME_PREFIX, self.guid, ARCHIVE_EXTENSION))
    }

    pub fn compressed_path(&self, staging_dir: &Path) -> PathBuf {
        staging_dir.join(format!("{}{}.{}", CARVE_NAME_PREFIX, self.guid, COMPRESSED_EXTENSION))
    }

    /// Build the archive and its compressed form.
    ///
    /// Members are added in lexicographic order of their staging-relative
    /// name with normalized headers, so the same staged set always yields
    /// the same bytes. On failure nothing this call wrote is left behind.
    pub fn package(
        &self,
        staging_dir: &Path,
        staged: &BTreeSet<PathBuf>,
    ) -> Result<PackageOutcome, CarveError> {
        let start = Instant::now();
        let archive_path = self.archive_path(staging_dir);
        let archive_guard = ArtifactGuard::new(&archive_path);
        let archive_size = self.write_archive(staging_dir, staged, &archive_path)?;
        debug!("Archived {} file(s) into {} ({} bytes)", staged.len(), archive_path.display(), archive_size);

        let (compressed_path, compressed_size, compressed_guard) = match self.compression {
            CompressionKind::Gzip => {
                let compressed_path = self.compressed_path(staging_dir);
                let guard = ArtifactGuard::new(&compressed_path);
                let size = self.compress(&archive_path, &compressed_path)?;
                (compressed_path, size, Some(guard))
            }
            CompressionKind::None => (archive_path.clone(), archive_size, None),
        };

        archive_guard.commit();
        if let Some(guard) = compressed_guard {
            guard.commit();
        }

        info!(
            "Packaged carve {} into {} ({} -> {} bytes) in {:?}",
            self.guid,
            compressed_path.display(),
            archive_size,
            compressed_size,
            start.elapsed()
        );

        Ok(PackageOutcome {
            archive_path,
            compressed_path,
            archive_size,
            compressed_size,
        })
    }

    fn write_archive(
        &self,
        staging_dir: &Path,
        staged: &BTreeSet<PathBuf>,
        archive_path: &Path,
    ) -> Result<u64, CarveError> {
        let mut members = Vec::with_capacity(staged.len());
        for path in staged {
            let name = member_name(staging_dir, path).ok_or_else(|| {
                CarveError::packaging("Staged file is outside the staging directory", path, staging_dir.display())
            })?;
            members.push((name, path));
        }
        members.sort_by(|a, b| a.0.cmp(&b.0));

        let file = File::create(archive_path)
            .map_err(|e| CarveError::packaging("Failed to create archive", archive_path, e))?;
        let mut builder = tar::Builder::new(BufWriter::new(file));
        builder.mode(tar::HeaderMode::Deterministic);
        builder.follow_symlinks(false);

        for (name, path) in members {
            builder
                .append_path_with_name(path, &name)
                .map_err(|e| CarveError::packaging("Failed to add to archive", path, e))?;
        }

        let writer = builder
            .into_inner()
            .map_err(|e| CarveError::packaging("Failed to finalize archive", archive_path, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| CarveError::packaging("Failed to flush archive", archive_path, e.error()))?;
        file.sync_all()
            .map_err(|e| CarveError::packaging("Failed to sync archive", archive_path, e))?;

        file_size(archive_path)
    }

    fn compress(&self, archive_path: &Path, compressed_path: &Path) -> Result<u64, CarveError> {
        let input = File::open(archive_path)
            .map_err(|e| CarveError::packaging("Failed to open archive", archive_path, e))?;
        let output = File::create(compressed_path)
            .map_err(|e| CarveError::packaging("Failed to create", compressed_path, e))?;

        let mut reader = BufReader::with_capacity(COMPRESSION_BUFFER_SIZE, input);
        let mut encoder = GzBuilder::new()
            .mtime(0)
            .operating_system(255)
            .write(BufWriter::new(output), Compression::new(self.level));

        io::copy(&mut reader, &mut encoder)
            .map_err(|e| CarveError::packaging("Failed to compress", archive_path, e))?;
        let mut writer = encoder
            .finish()
            .map_err(|e| CarveError::packaging("Failed to finish", compressed_path, e))?;
        writer
            .flush()
            .map_err(|e| CarveError::packaging("Failed to flush", compressed_path, e))?;

        file_size(compressed_path)
    }
}

/// Archive member name of a staged file: relative to the staging
/// directory, always with forward slashes.
fn member_name(staging_dir: &Path, staged: &Path) -> Option<String> {
    let relative = staged.strip_prefix(staging_dir).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }
    Some(relative.to_string_lossy().replace('\\', "/"))
}

fn file_size(path: &Path) -> Result<u64, CarveError> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| CarveError::packaging("Failed to stat", path, e))
}
