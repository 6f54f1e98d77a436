use async_trait::async_trait;
use serde::Serialize;

use crate::error::CarveError;

/// Opens an exfiltration session for one carve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BeginRequest {
    pub block_count: u64,
    pub block_size: u64,
    pub carve_size: u64,
    pub carve_id: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_key: Option<String>,
    /// File name of the artifact on this host
    #[serde(skip)]
    pub artifact_name: String,
}

/// The server's answer to a begin call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BeginResponse {
    /// Server-assigned token echoed on every continue call
    pub session_id: Option<String>,
}

/// One chunk of the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinueRequest {
    pub carve_id: String,
    pub session_id: Option<String>,
    pub request_id: String,
    pub block_id: u64,
    pub data: Vec<u8>,
}

/// The two calls of the carve upload protocol.
///
/// Implementations report a rejected call as [`CarveError::Network`]; the
/// caller decides whether to retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CarveTransport: Send + Sync {
    async fn begin(&self, request: &BeginRequest) -> Result<BeginResponse, CarveError>;

    async fn continue_chunk(&self, request: &ContinueRequest) -> Result<(), CarveError>;

    /// Drop whatever state an unfinished upload of `carve_id` holds.
    async fn abort(&self, _carve_id: &str) {}
}
