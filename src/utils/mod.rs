//! Utility functions shared by the carve engines.
//!
//! ```no_run
//! use rust_carver::utils::hash::sha256_file;
//! use std::path::Path;
//!
//! # fn example() -> std::io::Result<()> {
//! let digest = sha256_file(Path::new("/tmp/osquery_carve_x/carve_x.tar.gz"))?;
//! println!("SHA-256: {}", digest);
//! # Ok(())
//! # }
//! ```

/// Cryptographic hash calculation utilities
pub mod hash;
