use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::CarveError;
use crate::store::KvStore;

const RECORD_EXTENSION: &str = "json";

/// File-backed [`KvStore`]: `<root>/<domain>/<key>.json`.
///
/// Values are written to a temporary sibling, flushed to disk and renamed
/// over the old document, so a concurrent reader never sees a torn record.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self, CarveError> {
        fs::create_dir_all(root).map_err(|e| CarveError::io_at("create store directory", root, e))?;
        debug!("Opened carve store at {}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, domain: &str, key: &str) -> Result<PathBuf, CarveError> {
        for part in [domain, key] {
            if part.is_empty()
                || part.contains('/')
                || part.contains('\\')
                || part == "."
                || part == ".."
            {
                return Err(CarveError::Store(format!("invalid store key component '{}'", part)));
            }
        }
        Ok(self
            .root
            .join(domain)
            .join(format!("{}.{}", key, RECORD_EXTENSION)))
    }
}

impl KvStore for FileStore {
    fn put(&self, domain: &str, key: &str, value: &str) -> Result<(), CarveError> {
        let path = self.entry_path(domain, key)?;
        let dir = self.root.join(domain);
        fs::create_dir_all(&dir).map_err(|e| CarveError::io_at("create store domain", &dir, e))?;

        let tmp = dir.join(format!(".{}.{}.tmp", key, uuid::Uuid::new_v4()));
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        };

        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(CarveError::io_at("write store entry", &path, e));
        }
        Ok(())
    }

    fn get(&self, domain: &str, key: &str) -> Result<Option<String>, CarveError> {
        let path = self.entry_path(domain, key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CarveError::io_at("read store entry", &path, e)),
        }
    }

    fn scan(&self, domain: &str) -> Result<Vec<String>, CarveError> {
        let dir = self.root.join(domain);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CarveError::io_at("scan store domain", &dir, e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CarveError::io_at("scan store domain", &dir, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            if let Some(key) = name.strip_suffix(&format!(".{}", RECORD_EXTENSION)) {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
