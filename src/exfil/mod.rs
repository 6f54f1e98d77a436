//! Exfiltration of packaged carves.
//!
//! A carve leaves the host through an [`Exfiltrator`]. The stock
//! implementation is [`ExfiltrationClient`], which drives the two-call
//! upload protocol over any [`CarveTransport`]:
//!
//! ```text
//!  begin(carve_id, request_id, carve_size, block_count) ──▶ session_id
//!  continue(session_id, block 0, data)                  ──▶ ack
//!  continue(session_id, block 1, data)                  ──▶ ack
//!  ...                                                    (strictly in order)
//! ```
//!
//! Two transports ship with the crate: [`HttpTransport`] posts JSON to the
//! configured start and continue endpoints, and [`DirectoryTransport`]
//! assembles the chunks in a local directory. [`build_exfiltrator`] picks
//! one from the configuration.

/// Splitting an artifact into chunks
pub mod chunk;

/// Ordered upload with per-chunk retry
pub mod client;

/// Local directory transport
pub mod directory;

/// HTTP(S) transport
pub mod http;

/// Transport trait and protocol messages
pub mod transport;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ExfilConfig, ExfilMode};
use crate::error::CarveError;

pub use chunk::ChunkPlan;
pub use client::ExfiltrationClient;
pub use directory::DirectoryTransport;
pub use http::HttpTransport;
pub use transport::{BeginRequest, BeginResponse, CarveTransport, ContinueRequest};

/// Upload progress, reported after the begin call and after every
/// acknowledged chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExfilProgress {
    pub session_id: Option<String>,
    pub chunk_count: u64,
    pub chunks_sent: u64,
}

/// Summary of a finished upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExfilReport {
    pub session_id: Option<String>,
    pub chunk_count: u64,
    pub bytes_sent: u64,
}

/// Ships a packaged carve off the host.
#[async_trait]
pub trait Exfiltrator: Send + Sync {
    async fn send(
        &self,
        artifact: &Path,
        guid: &str,
        request_id: &str,
        progress: &mut (dyn for<'p> FnMut(&'p ExfilProgress) + Send),
    ) -> Result<ExfilReport, CarveError>;
}

/// Build the exfiltrator selected by `config.mode`.
pub fn build_exfiltrator(config: &ExfilConfig) -> Result<Arc<dyn Exfiltrator>, CarveError> {
    match config.mode {
        ExfilMode::Tls => {
            let transport = HttpTransport::new(config)?;
            Ok(Arc::new(ExfiltrationClient::new(transport, config)))
        }
        ExfilMode::Directory => {
            let dir = config.output_dir.as_deref().ok_or_else(|| {
                CarveError::Config("exfil.output_dir is required in directory mode".into())
            })?;
            let transport = DirectoryTransport::new(dir)?;
            Ok(Arc::new(ExfiltrationClient::new(transport, config)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_build_directory_exfiltrator() {
        let dir = TempDir::new().unwrap();
        let config = ExfilConfig {
            mode: ExfilMode::Directory,
            output_dir: Some(dir.path().join("out")),
            ..ExfilConfig::default()
        };
        assert!(build_exfiltrator(&config).is_ok());
        assert!(dir.path().join("out").is_dir());
    }

    #[test]
    fn test_build_tls_without_url_fails() {
        assert!(build_exfiltrator(&ExfilConfig::default()).is_err());
    }

    #[test]
    fn test_build_tls_exfiltrator() {
        let config = ExfilConfig {
            base_url: Some("https://carves.example.com".to_string()),
            ..ExfilConfig::default()
        };
        assert!(build_exfiltrator(&config).is_ok());
    }
}
