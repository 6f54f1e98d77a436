use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::error::CarveError;
use crate::exfil::transport::{BeginRequest, BeginResponse, CarveTransport, ContinueRequest};

struct PartialUpload {
    part_path: PathBuf,
    final_path: PathBuf,
    next_block: u64,
    block_count: u64,
    block_size: u64,
}

/// Writes carves into a local directory using the same begin/continue
/// protocol as the network transport.
///
/// Chunks are written to `<carve_id>.part` at `block_id * block_size` and
/// must arrive in order; after the last one the file is renamed to
/// `<carve_id>-<artifact name>`. A chunk that is sent again after a failed
/// write replaces whatever that write left behind.
pub struct DirectoryTransport {
    output_dir: PathBuf,
    uploads: Mutex<HashMap<String, PartialUpload>>,
}

impl DirectoryTransport {
    pub fn new(output_dir: &Path) -> Result<Self, CarveError> {
        std::fs::create_dir_all(output_dir)
            .map_err(|e| CarveError::io_at("create output directory", output_dir, e))?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            uploads: Mutex::new(HashMap::new()),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, PartialUpload>>, CarveError> {
        self.uploads
            .lock()
            .map_err(|_| CarveError::Network("directory transport lock poisoned".into()))
    }

    async fn finish(&self, carve_id: &str) -> Result<(), CarveError> {
        let upload = self
            .lock()?
            .remove(carve_id)
            .ok_or_else(|| CarveError::Network(format!("no open session for carve {}", carve_id)))?;
        tokio::fs::rename(&upload.part_path, &upload.final_path)
            .await
            .map_err(|e| CarveError::io_at("finalize", &upload.final_path, e))?;
        info!("Wrote carve {} to {}", carve_id, upload.final_path.display());
        Ok(())
    }
}

#[async_trait]
impl CarveTransport for DirectoryTransport {
    async fn begin(&self, request: &BeginRequest) -> Result<BeginResponse, CarveError> {
        let part_path = self.output_dir.join(format!("{}.part", request.carve_id));
        let final_path = self
            .output_dir
            .join(format!("{}-{}", request.carve_id, request.artifact_name));

        tokio::fs::File::create(&part_path)
            .await
            .map_err(|e| CarveError::io_at("create", &part_path, e))?;

        let previous = self.lock()?.insert(
            request.carve_id.clone(),
            PartialUpload {
                part_path,
                final_path,
                next_block: 0,
                block_count: request.block_count,
                block_size: request.block_size,
            },
        );
        if previous.is_some() {
            debug!("Restarted upload of carve {}", request.carve_id);
        }

        if request.block_count == 0 {
            self.finish(&request.carve_id).await?;
        }

        Ok(BeginResponse {
            session_id: Some(request.carve_id.clone()),
        })
    }

    async fn continue_chunk(&self, request: &ContinueRequest) -> Result<(), CarveError> {
        let (part_path, offset, last) = {
            let uploads = self.lock()?;
            let upload = uploads.get(&request.carve_id).ok_or_else(|| {
                CarveError::Network(format!("no open session for carve {}", request.carve_id))
            })?;
            if request.block_id != upload.next_block {
                return Err(CarveError::Network(format!(
                    "carve {} expected block {} but got {}",
                    request.carve_id, upload.next_block, request.block_id
                )));
            }
            (
                upload.part_path.clone(),
                request.block_id.saturating_mul(upload.block_size),
                request.block_id + 1 == upload.block_count,
            )
        };

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&part_path)
            .await
            .map_err(|e| CarveError::io_at("open", &part_path, e))?;
        file.set_len(offset)
            .await
            .map_err(|e| CarveError::io_at("truncate", &part_path, e))?;
        file.seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(|e| CarveError::io_at("seek", &part_path, e))?;
        file.write_all(&request.data)
            .await
            .map_err(|e| CarveError::io_at("write to", &part_path, e))?;
        file.flush()
            .await
            .map_err(|e| CarveError::io_at("flush", &part_path, e))?;

        if let Some(upload) = self.lock()?.get_mut(&request.carve_id) {
            upload.next_block += 1;
        }

        if last {
            self.finish(&request.carve_id).await?;
        }
        Ok(())
    }

    async fn abort(&self, carve_id: &str) {
        let upload = match self.lock() {
            Ok(mut uploads) => uploads.remove(carve_id),
            Err(e) => {
                warn!("Failed to abort upload of carve {}: {}", carve_id, e);
                return;
            }
        };
        let upload = match upload {
            Some(upload) => upload,
            None => return,
        };
        match tokio::fs::remove_file(&upload.part_path).await {
            Ok(()) => debug!("Removed {}", upload.part_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", upload.part_path.display(), e),
        }
    }
}
