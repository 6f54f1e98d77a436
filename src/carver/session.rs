use std::io;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use log::{debug, error, info, warn};

use crate::carver::collection::{CollectionEngine, StagingDir};
use crate::carver::packager::Packager;
use crate::config::CarverConfig;
use crate::constants::ERROR_NOTHING_STAGED;
use crate::error::CarveError;
use crate::exfil::{ExfilProgress, Exfiltrator};
use crate::models::{CarveRecord, CarveRequest, CarveStatus};
use crate::store::{load_record, save_record, KvStore};
use crate::utils::hash::sha256_file;

/// One carve from request to upload.
///
/// The record is written to the store on every status change, before the
/// in-memory copy moves, so anything reading the store sees the same
/// lifecycle the session went through.
pub struct CarveSession {
    request: CarveRequest,
    config: CarverConfig,
    store: Arc<dyn KvStore>,
    exfil: Arc<dyn Exfiltrator>,
    record: CarveRecord,
    staging: Option<StagingDir>,
    started: bool,
}

impl CarveSession {
    /// Create the session and persist its `PENDING` record.
    ///
    /// Fails if the store already holds a record for the request's GUID.
    pub fn new(
        request: CarveRequest,
        config: CarverConfig,
        store: Arc<dyn KvStore>,
        exfil: Arc<dyn Exfiltrator>,
    ) -> Result<Self, CarveError> {
        if let Some(existing) = load_record(store.as_ref(), request.guid())? {
            return Err(CarveError::Store(format!(
                "carve {} already exists with status {}",
                existing.guid, existing.status
            )));
        }

        let record = CarveRecord::pending(&request);
        save_record(store.as_ref(), &record)?;
        info!(
            "Carve {} pending for {} path(s) (request {})",
            request.guid(),
            request.paths().len(),
            request.request_id()
        );

        Ok(Self {
            request,
            config,
            store,
            exfil,
            record,
            staging: None,
            started: false,
        })
    }

    pub fn guid(&self) -> &str {
        self.request.guid()
    }

    pub fn status(&self) -> CarveStatus {
        self.record.status
    }

    pub fn record(&self) -> &CarveRecord {
        &self.record
    }

    /// Move to `next`, persisting the record first.
    pub fn advance(&mut self, next: CarveStatus) -> Result<(), CarveError> {
        self.advance_with(next, |_| {})
    }

    fn advance_with<F>(&mut self, next: CarveStatus, update: F) -> Result<(), CarveError>
    where
        F: FnOnce(&mut CarveRecord),
    {
        let current = self.record.status;
        if !current.can_advance_to(next) {
            return Err(CarveError::InvalidTransition { from: current, to: next });
        }

        let mut updated = self.record.clone();
        update(&mut updated);
        updated.status = next;
        updated.updated_at = Utc::now();
        save_record(self.store.as_ref(), &updated)?;

        debug!("Carve {}: {} -> {}", self.guid(), current, next);
        self.record = updated;
        Ok(())
    }

    /// Run the carve to a terminal status and return it.
    ///
    /// Only the first call does any work; later calls return the current
    /// status.
    pub async fn start(&mut self) -> CarveStatus {
        if self.started {
            return self.status();
        }
        self.started = true;

        let start = Instant::now();
        if let Err(e) = self.run().await {
            self.fail(&e);
        }

        match self.status() {
            CarveStatus::Succeeded => info!(
                "Carve {} succeeded: {} file(s), {} bytes shipped in {:?}",
                self.guid(),
                self.record.file_count,
                self.record.carve_size,
                start.elapsed()
            ),
            status => warn!("Carve {} finished as {} after {:?}", self.guid(), status, start.elapsed()),
        }
        self.status()
    }

    async fn run(&mut self) -> Result<(), CarveError> {
        self.advance(CarveStatus::Collecting)?;

        let engine = CollectionEngine::new(self.guid(), &self.config)?;
        let paths = self.request.paths().clone();
        let outcome = tokio::task::spawn_blocking(move || engine.carve_all(&paths))
            .await
            .map_err(|e| {
                CarveError::io(
                    "Collection task failed",
                    io::Error::new(io::ErrorKind::Other, e.to_string()),
                )
            })??;

        let staging_dir = outcome.staging.path().to_path_buf();
        let staged = outcome.staged;
        let failed_paths: Vec<_> = outcome.failures.iter().map(|f| f.path.clone()).collect();
        let bytes_collected = outcome.bytes_copied;
        self.staging = Some(outcome.staging);

        if staged.is_empty() {
            let error = CarveError::io(
                ERROR_NOTHING_STAGED,
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("none of {} requested file(s) could be copied", self.request.paths().len()),
                ),
            );
            self.fail_with(&error, |r| {
                r.staging_dir = Some(staging_dir);
                r.failed_paths = failed_paths;
            });
            return Ok(());
        }

        self.advance_with(CarveStatus::Staged, |r| {
            r.staging_dir = Some(staging_dir.clone());
            r.staged_files = staged.iter().cloned().collect();
            r.file_count = staged.len();
            r.failed_paths = failed_paths;
            r.bytes_collected = bytes_collected;
        })?;

        self.advance(CarveStatus::Archiving)?;
        let packager = Packager::new(self.guid(), &self.config);
        let package_dir = staging_dir.clone();
        let (package, sha256) = tokio::task::spawn_blocking(move || {
            let package = packager.package(&package_dir, &staged)?;
            let sha256 = sha256_file(&package.compressed_path)
                .map_err(|e| CarveError::io_at("hash", &package.compressed_path, e))?;
            Ok::<_, CarveError>((package, sha256))
        })
        .await
        .map_err(|e| CarveError::Packaging(format!("packaging task failed: {}", e)))??;

        self.advance_with(CarveStatus::Compressed, |r| {
            r.archive_path = Some(package.archive_path.clone());
            r.compressed_path = Some(package.compressed_path.clone());
            r.carve_size = package.compressed_size;
            r.sha256 = Some(sha256);
        })?;

        self.advance(CarveStatus::Exfiltrating)?;
        let exfil = Arc::clone(&self.exfil);
        let store = Arc::clone(&self.store);
        let mut snapshot = self.record.clone();
        let report = {
            let mut on_progress = |p: &ExfilProgress| {
                snapshot.session_id = p.session_id.clone();
                snapshot.chunk_count = p.chunk_count;
                snapshot.chunks_sent = p.chunks_sent;
                snapshot.updated_at = Utc::now();
                if let Err(e) = save_record(store.as_ref(), &snapshot) {
                    warn!("Failed to persist progress of carve {}: {}", snapshot.guid, e);
                }
            };
            exfil
                .send(
                    &package.compressed_path,
                    self.request.guid(),
                    self.request.request_id(),
                    &mut on_progress,
                )
                .await
        };
        self.record.session_id = snapshot.session_id;
        self.record.chunk_count = snapshot.chunk_count;
        self.record.chunks_sent = snapshot.chunks_sent;
        let report = report?;

        self.advance_with(CarveStatus::Succeeded, |r| {
            r.session_id = report.session_id.clone();
            r.chunk_count = report.chunk_count;
            r.chunks_sent = report.chunk_count;
        })?;

        if let Some(mut staging) = self.staging.take() {
            if self.config.retain_artifacts {
                staging.keep();
                debug!("Retaining artifacts of carve {} in {}", self.guid(), staging.path().display());
            }
        }
        Ok(())
    }

    fn fail(&mut self, error: &CarveError) {
        self.fail_with(error, |_| {});
    }

    /// Persist `FAILED` with the error text and keep whatever is on disk.
    ///
    /// If even that write fails the in-memory record still ends up `FAILED`.
    fn fail_with<F>(&mut self, error: &CarveError, update: F)
    where
        F: FnOnce(&mut CarveRecord),
    {
        error!("Carve {} failed while {}: {}", self.guid(), self.status(), error);

        if let Some(mut staging) = self.staging.take() {
            staging.keep();
            info!("Keeping staging directory {} for inspection", staging.path().display());
        }

        let message = error.to_string();
        let mut fallback = self.record.clone();
        update(&mut fallback);
        fallback.error = Some(message.clone());

        let persisted = {
            let fields = fallback.clone();
            self.advance_with(CarveStatus::Failed, move |r| *r = fields)
        };
        if let Err(e) = persisted {
            error!("Failed to persist FAILED status of carve {}: {}", self.guid(), e);
            if !self.record.status.is_terminal() {
                fallback.status = CarveStatus::Failed;
                fallback.updated_at = Utc::now();
                self.record = fallback;
            }
        }
    }
}
