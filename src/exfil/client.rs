use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::fs::File as AsyncFile;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::sleep;

use crate::config::ExfilConfig;
use crate::constants::ERROR_BEGIN_REJECTED;
use crate::error::CarveError;
use crate::exfil::chunk::ChunkPlan;
use crate::exfil::transport::{BeginRequest, CarveTransport, ContinueRequest};
use crate::exfil::{ExfilProgress, ExfilReport, Exfiltrator};

/// Ships an artifact over a [`CarveTransport`] as one begin call followed
/// by one continue call per chunk, strictly in order.
pub struct ExfiltrationClient<T> {
    transport: T,
    chunk_size: usize,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
    node_key: Option<String>,
}

impl<T: CarveTransport> ExfiltrationClient<T> {
    pub fn new(transport: T, config: &ExfilConfig) -> Self {
        Self {
            transport,
            chunk_size: config.chunk_size,
            max_retries: config.max_chunk_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            node_key: config.node_key.clone(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Delay before retry number `attempt` (1-based).
    fn retry_delay(&self, attempt: usize) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16) as u32);
        std::cmp::min(self.base_delay.saturating_mul(factor), self.max_delay)
    }

    /// Send one chunk, retrying the same chunk until it is acknowledged or
    /// the retry budget is spent.
    async fn send_chunk(&self, request: &ContinueRequest) -> Result<(), CarveError> {
        let mut attempt = 0;
        loop {
            match self.transport.continue_chunk(request).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(CarveError::Network(format!(
                            "chunk {} failed after {} attempt(s): {}",
                            request.block_id,
                            attempt + 1,
                            e
                        )));
                    }
                    attempt += 1;
                    let delay = self.retry_delay(attempt);
                    warn!(
                        "Chunk {} of carve {} failed, retry {} of {} in {:?}: {}",
                        request.block_id, request.carve_id, attempt, self.max_retries, delay, e
                    );
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl<T: CarveTransport> Exfiltrator for ExfiltrationClient<T> {
    async fn send(
        &self,
        artifact: &Path,
        guid: &str,
        request_id: &str,
        progress: &mut (dyn for<'p> FnMut(&'p ExfilProgress) + Send),
    ) -> Result<ExfilReport, CarveError> {
        let start = Instant::now();
        let mut file = AsyncFile::open(artifact)
            .await
            .map_err(|e| CarveError::io_at("open artifact", artifact, e))?;
        let total = file
            .metadata()
            .await
            .map_err(|e| CarveError::io_at("stat artifact", artifact, e))?
            .len();
        let plan = ChunkPlan::new(total, self.chunk_size)?;

        let begin = BeginRequest {
            block_count: plan.count(),
            block_size: plan.chunk_size(),
            carve_size: total,
            carve_id: guid.to_string(),
            request_id: request_id.to_string(),
            node_key: self.node_key.clone(),
            artifact_name: artifact
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| format!("{}.carve", guid)),
        };
        debug!(
            "Beginning exfiltration of carve {}: {} bytes in {} chunk(s)",
            guid,
            total,
            plan.count()
        );

        let session = self.transport.begin(&begin).await.map_err(|e| match e {
            CarveError::Network(msg) => {
                CarveError::Network(format!("{}: {}", ERROR_BEGIN_REJECTED, msg))
            }
            other => other,
        })?;
        let mut state = ExfilProgress {
            session_id: session.session_id.clone(),
            chunk_count: plan.count(),
            chunks_sent: 0,
        };
        progress(&state);

        let sent = async {
            for record in plan.records(guid) {
                file.seek(std::io::SeekFrom::Start(record.offset))
                    .await
                    .map_err(|e| CarveError::io_at("seek artifact", artifact, e))?;
                let mut data = vec![0u8; record.len];
                file.read_exact(&mut data)
                    .await
                    .map_err(|e| CarveError::io_at("read artifact", artifact, e))?;

                let request = ContinueRequest {
                    carve_id: guid.to_string(),
                    session_id: session.session_id.clone(),
                    request_id: request_id.to_string(),
                    block_id: record.index,
                    data,
                };
                self.send_chunk(&request).await?;

                state.chunks_sent = record.index + 1;
                progress(&state);
            }
            Ok::<_, CarveError>(())
        }
        .await;

        if let Err(e) = sent {
            warn!("Abandoning upload of carve {}: {}", guid, e);
            self.transport.abort(guid).await;
            return Err(e);
        }

        info!(
            "Exfiltrated carve {} ({} bytes, {} chunk(s)) in {:?}",
            guid,
            total,
            plan.count(),
            start.elapsed()
        );

        Ok(ExfilReport {
            session_id: session.session_id,
            chunk_count: plan.count(),
            bytes_sent: total,
        })
    }
}
