use std::sync::Arc;

use log::{error, info};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::carver::CarveSession;
use crate::config::CarverConfig;
use crate::constants::ERROR_NO_PATHS;
use crate::error::CarveError;
use crate::exfil::{build_exfiltrator, Exfiltrator};
use crate::expand::{PathExpander, PatternExpander};
use crate::models::{CarveRequest, CarveStatus};
use crate::store::{FileStore, KvStore};

/// Handle on a carve that has been scheduled.
#[derive(Debug)]
pub struct CarveTicket {
    pub guid: String,
    pub handle: JoinHandle<CarveStatus>,
}

impl CarveTicket {
    /// Wait for the carve to reach a terminal status.
    pub async fn wait(self) -> Result<CarveStatus, CarveError> {
        self.handle.await.map_err(|e| {
            CarveError::io(
                format!("Carve task {} did not complete", self.guid),
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            )
        })
    }
}

/// Entry point for carve requests.
///
/// Each accepted request becomes one [`CarveSession`] running on its own
/// tokio task. At most `max_concurrent_carves` sessions run at once; the
/// rest wait for a permit with their `PENDING` record already stored.
pub struct Dispatcher {
    config: CarverConfig,
    store: Arc<dyn KvStore>,
    exfil: Arc<dyn Exfiltrator>,
    expander: Arc<dyn PathExpander>,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        config: CarverConfig,
        store: Arc<dyn KvStore>,
        exfil: Arc<dyn Exfiltrator>,
    ) -> Result<Self, CarveError> {
        config.validate()?;
        let permits = Arc::new(Semaphore::new(config.max_concurrent_carves));
        Ok(Self {
            config,
            store,
            exfil,
            expander: Arc::new(PatternExpander::new()),
            permits,
        })
    }

    /// Build a dispatcher with the store and exfiltrator named in `config`.
    pub fn from_config(config: CarverConfig) -> Result<Self, CarveError> {
        config.validate()?;
        let store = Arc::new(FileStore::open(&config.store_path)?);
        let exfil = build_exfiltrator(&config.exfil)?;
        Self::new(config, store, exfil)
    }

    pub fn with_expander(mut self, expander: Arc<dyn PathExpander>) -> Self {
        self.expander = expander;
        self
    }

    pub fn config(&self) -> &CarverConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn KvStore> {
        Arc::clone(&self.store)
    }

    /// Carve every file matching `patterns` under a fresh request id.
    pub fn carve_paths(&self, patterns: &[String]) -> Result<CarveTicket, CarveError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.carve_paths_for_request(patterns, &request_id)
    }

    /// Carve every file matching `patterns` on behalf of `request_id`.
    ///
    /// The `PENDING` record is stored before this returns. Must be called
    /// from within a tokio runtime.
    pub fn carve_paths_for_request(
        &self,
        patterns: &[String],
        request_id: &str,
    ) -> Result<CarveTicket, CarveError> {
        let paths = self.expander.expand(patterns)?;
        if paths.is_empty() {
            return Err(CarveError::io(
                ERROR_NO_PATHS,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} pattern(s) matched no files", patterns.len()),
                ),
            ));
        }

        let request = CarveRequest::with_generated_guid(paths, request_id);
        let guid = request.guid().to_string();
        let mut session = CarveSession::new(
            request,
            self.config.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.exfil),
        )?;

        let permits = Arc::clone(&self.permits);
        let task_guid = guid.clone();
        let handle = tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(e) => {
                    error!("Carve {} running without a permit: {}", task_guid, e);
                    None
                }
            };
            session.start().await
        });

        info!("Scheduled carve {} for request {}", guid, request_id);
        Ok(CarveTicket { guid, handle })
    }
}
