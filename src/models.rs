use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::CARVE_DB_PREFIX;

/// Lifecycle of a carve.
///
/// Variants are declared in lifecycle order; `Failed` sits outside the
/// ordering and can be reached from any non-terminal state.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CarveStatus {
    Pending,
    Collecting,
    Staged,
    Archiving,
    Compressed,
    Exfiltrating,
    Succeeded,
    Failed,
}

impl CarveStatus {
    /// Position in the forward lifecycle. `Failed` has no position.
    fn stage(self) -> Option<u8> {
        match self {
            CarveStatus::Pending => Some(0),
            CarveStatus::Collecting => Some(1),
            CarveStatus::Staged => Some(2),
            CarveStatus::Archiving => Some(3),
            CarveStatus::Compressed => Some(4),
            CarveStatus::Exfiltrating => Some(5),
            CarveStatus::Succeeded => Some(6),
            CarveStatus::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CarveStatus::Succeeded | CarveStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal step.
    ///
    /// Only the immediate successor is allowed, plus `Failed` from any
    /// non-terminal state.
    pub fn can_advance_to(self, next: CarveStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.stage(), next.stage()) {
            (_, None) => true,
            (Some(cur), Some(nxt)) => nxt == cur + 1,
            (None, Some(_)) => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CarveStatus::Pending => "PENDING",
            CarveStatus::Collecting => "COLLECTING",
            CarveStatus::Staged => "STAGED",
            CarveStatus::Archiving => "ARCHIVING",
            CarveStatus::Compressed => "COMPRESSED",
            CarveStatus::Exfiltrating => "EXFILTRATING",
            CarveStatus::Succeeded => "SUCCEEDED",
            CarveStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for CarveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable request to carve a set of concrete paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarveRequest {
    paths: BTreeSet<PathBuf>,
    guid: String,
    request_id: String,
}

impl CarveRequest {
    pub fn new(
        paths: impl IntoIterator<Item = PathBuf>,
        guid: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            paths: paths.into_iter().collect(),
            guid: guid.into(),
            request_id: request_id.into(),
        }
    }

    /// Build a request with a freshly generated GUID.
    pub fn with_generated_guid(
        paths: impl IntoIterator<Item = PathBuf>,
        request_id: impl Into<String>,
    ) -> Self {
        Self::new(paths, uuid::Uuid::new_v4().to_string(), request_id)
    }

    pub fn paths(&self) -> &BTreeSet<PathBuf> {
        &self.paths
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

/// The persisted view of one carve, stored under `carves.<guid>`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CarveRecord {
    pub guid: String,
    pub request_id: String,
    pub status: CarveStatus,
    pub staging_dir: Option<PathBuf>,
    #[serde(default)]
    pub staged_files: Vec<PathBuf>,
    pub archive_path: Option<PathBuf>,
    pub compressed_path: Option<PathBuf>,
    pub requested_count: usize,
    pub file_count: usize,
    #[serde(default)]
    pub failed_paths: Vec<PathBuf>,
    pub bytes_collected: u64,
    pub carve_size: u64,
    pub sha256: Option<String>,
    pub chunk_count: u64,
    pub chunks_sent: u64,
    pub session_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CarveRecord {
    /// A fresh `PENDING` record for the given request.
    pub fn pending(request: &CarveRequest) -> Self {
        let now = Utc::now();
        Self {
            guid: request.guid().to_string(),
            request_id: request.request_id().to_string(),
            status: CarveStatus::Pending,
            staging_dir: None,
            staged_files: Vec::new(),
            archive_path: None,
            compressed_path: None,
            requested_count: request.paths().len(),
            file_count: 0,
            failed_paths: Vec::new(),
            bytes_collected: 0,
            carve_size: 0,
            sha256: None,
            chunk_count: 0,
            chunks_sent: 0,
            session_id: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Store key of this record.
    pub fn key(&self) -> String {
        record_key(&self.guid)
    }
}

/// Store key for the carve with the given GUID.
pub fn record_key(guid: &str) -> String {
    format!("{}{}", CARVE_DB_PREFIX, guid)
}

/// Per-chunk metadata handed to the transport alongside the chunk bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkUploadRecord<'a> {
    pub index: u64,
    pub offset: u64,
    pub len: usize,
    pub guid: &'a str,
}
