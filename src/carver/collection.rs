use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use log::{debug, info, warn};

use crate::carver::block_copy::BlockCopier;
use crate::config::CarverConfig;
use crate::constants::CARVE_PATH_PREFIX;
use crate::error::CarveError;

/// Owns a carve's staging directory.
///
/// The directory is removed when the guard is dropped unless [`keep`] was
/// called first.
///
/// [`keep`]: StagingDir::keep
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    keep: bool,
}

impl StagingDir {
    /// Create `<root>/osquery_carve_<guid>`, readable only by the owner.
    ///
    /// Fails if the directory already exists.
    pub fn create(root: &Path, guid: &str) -> Result<Self, CarveError> {
        fs::create_dir_all(root).map_err(|e| CarveError::io_at("create staging root", root, e))?;

        let path = root.join(format!("{}{}", CARVE_PATH_PREFIX, guid));
        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder
            .create(&path)
            .map_err(|e| CarveError::io_at("create staging directory", &path, e))?;

        debug!("Created staging directory {}", path.display());
        Ok(Self { path, keep: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Leave the directory on disk when the guard goes away.
    pub fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed staging directory {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove staging directory {}: {}", self.path.display(), e),
        }
    }
}

/// A source that could not be staged, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of collecting a set of paths.
#[derive(Debug)]
pub struct CollectionOutcome {
    pub staging: StagingDir,
    /// Staged copies, ordered
    pub staged: BTreeSet<PathBuf>,
    pub failures: Vec<CopyFailure>,
    pub bytes_copied: u64,
}

impl CollectionOutcome {
    /// At least one requested source was not staged.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Copies requested files into a per-carve staging directory.
#[derive(Debug, Clone)]
pub struct CollectionEngine {
    guid: String,
    staging_root: PathBuf,
    copier: BlockCopier,
    max_file_size: Option<u64>,
    max_carve_size: Option<u64>,
}

impl CollectionEngine {
    pub fn new(guid: &str, config: &CarverConfig) -> Result<Self, CarveError> {
        Ok(Self {
            guid: guid.to_string(),
            staging_root: config.staging_root.clone(),
            copier: BlockCopier::new(config.block_size)?,
            max_file_size: config.max_file_size,
            max_carve_size: config.max_carve_size,
        })
    }

    /// Stage every path that can be copied.
    ///
    /// Only failing to create the staging directory is an error; each
    /// source that cannot be copied is reported in
    /// [`CollectionOutcome::failures`] and collection moves on.
    pub fn carve_all(&self, paths: &BTreeSet<PathBuf>) -> Result<CollectionOutcome, CarveError> {
        let start = Instant::now();
        let staging = StagingDir::create(&self.staging_root, &self.guid)?;
        info!("Carving {} file(s) into {}", paths.len(), staging.path().display());

        let mut staged = BTreeSet::new();
        let mut failures = Vec::new();
        let mut bytes_copied = 0u64;

        for src in paths {
            let budget = self.max_carve_size.map(|max| max.saturating_sub(bytes_copied));
            match self.carve_file(src, staging.path(), budget) {
                Ok((dest, bytes)) => {
                    debug!("Carved {} ({} bytes) to {}", src.display(), bytes, dest.display());
                    bytes_copied += bytes;
                    staged.insert(dest);
                }
                Err(reason) => {
                    warn!("Failed to carve {}: {}", src.display(), reason);
                    failures.push(CopyFailure {
                        path: src.clone(),
                        reason,
                    });
                }
            }
        }

        info!(
            "Carved {}/{} file(s), {} bytes in {:?}",
            staged.len(),
            paths.len(),
            bytes_copied,
            start.elapsed()
        );

        Ok(CollectionOutcome {
            staging,
            staged,
            failures,
            bytes_copied,
        })
    }

    /// Copy one source, returning its staged path and size.
    fn carve_file(
        &self,
        src: &Path,
        staging_dir: &Path,
        budget: Option<u64>,
    ) -> Result<(PathBuf, u64), String> {
        // opening a FIFO or device can block, so only regular files get opened
        let metadata = fs::metadata(src).map_err(|e| format!("stat failed: {}", e))?;
        if !metadata.is_file() {
            return Err("not a regular file".to_string());
        }

        let mut source = File::open(src).map_err(|e| format!("open failed: {}", e))?;
        let metadata = source.metadata().map_err(|e| format!("stat failed: {}", e))?;
        if !metadata.is_file() {
            return Err("not a regular file".to_string());
        }

        let len = metadata.len();
        if let Some(max) = self.max_file_size {
            if len > max {
                return Err(format!("file size {} exceeds limit of {} bytes", len, max));
            }
        }
        if let Some(remaining) = budget {
            if len > remaining {
                return Err(format!(
                    "file size {} exceeds remaining carve budget of {} bytes",
                    len, remaining
                ));
            }
        }

        let dest = staged_path(staging_dir, src);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("create {} failed: {}", parent.display(), e))?;
        }

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut destination = options
            .open(&dest)
            .map_err(|e| format!("create {} failed: {}", dest.display(), e))?;

        match self.copier.copy(&mut source, len, &mut destination) {
            Ok(stats) => Ok((dest, stats.bytes)),
            Err(e) => {
                drop(destination);
                if let Err(rm) = fs::remove_file(&dest) {
                    warn!("Failed to discard partial copy {}: {}", dest.display(), rm);
                }
                Err(e.to_string())
            }
        }
    }
}

/// Where `src` lands inside the staging directory.
///
/// The source path is mirrored below the staging directory with its root
/// (and drive prefix on Windows) removed, so `/etc/passwd` becomes
/// `<staging>/etc/passwd`. `..` is resolved lexically and never climbs
/// above the staging directory.
pub fn staged_path(staging_dir: &Path, src: &Path) -> PathBuf {
    let mut parts = Vec::new();
    for component in src.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                parts.pop();
            }
            _ => {}
        }
    }
    staging_dir.join(parts.into_iter().collect::<PathBuf>())
}
