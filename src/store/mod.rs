//! Durable key-value storage for carve records.
//!
//! Records live in the `carves` domain under `carves.<guid>` and are
//! serialized as JSON. Anything that can put and get strings by
//! `(domain, key)` can back the carver; two implementations ship here:
//!
//! - [`FileStore`]: one JSON document per key on disk, replaced atomically
//! - [`MemoryStore`]: process-local map, used by tests and dry runs
//!
//! ```no_run
//! use rust_carver::store::{FileStore, load_record};
//! use std::path::Path;
//!
//! # fn example() -> Result<(), rust_carver::error::CarveError> {
//! let store = FileStore::open(Path::new("/var/lib/rs-carver"))?;
//! if let Some(record) = load_record(&store, "7c0f5a2e-0000-4000-8000-000000000000")? {
//!     println!("{} is {}", record.guid, record.status);
//! }
//! # Ok(())
//! # }
//! ```

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::constants::{CARVE_DB_DOMAIN, CARVE_DB_PREFIX};
use crate::error::CarveError;
use crate::models::{record_key, CarveRecord};

/// Minimal durable key-value store.
///
/// `put` must be durable and atomic per key by the time it returns: a reader
/// either sees the previous value or the new one.
pub trait KvStore: Send + Sync {
    fn put(&self, domain: &str, key: &str, value: &str) -> Result<(), CarveError>;

    fn get(&self, domain: &str, key: &str) -> Result<Option<String>, CarveError>;

    /// All keys in `domain`, sorted.
    fn scan(&self, domain: &str) -> Result<Vec<String>, CarveError>;
}

/// Write a carve record under its `carves.<guid>` key.
pub fn save_record(store: &dyn KvStore, record: &CarveRecord) -> Result<(), CarveError> {
    let json = serde_json::to_string(record)?;
    store.put(CARVE_DB_DOMAIN, &record.key(), &json)
}

/// Read the record for one carve.
pub fn load_record(store: &dyn KvStore, guid: &str) -> Result<Option<CarveRecord>, CarveError> {
    match store.get(CARVE_DB_DOMAIN, &record_key(guid))? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Every carve record in the store, oldest first.
pub fn list_records(store: &dyn KvStore) -> Result<Vec<CarveRecord>, CarveError> {
    let mut records = Vec::new();
    for key in store.scan(CARVE_DB_DOMAIN)? {
        if !key.starts_with(CARVE_DB_PREFIX) {
            continue;
        }
        if let Some(json) = store.get(CARVE_DB_DOMAIN, &key)? {
            records.push(serde_json::from_str::<CarveRecord>(&json)?);
        }
    }
    records.sort_by_key(|r| r.created_at);
    Ok(records)
}
