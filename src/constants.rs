//! Global constants for the rs-carver application.
//!
//! This module centralizes naming prefixes, protocol defaults and size
//! limits so the engines and the configuration layer agree on them.

// Store layout
/// Key-value store domain holding carve records
pub const CARVE_DB_DOMAIN: &str = "carves";

/// Key prefix for carve records inside [`CARVE_DB_DOMAIN`]
pub const CARVE_DB_PREFIX: &str = "carves.";

// On-disk naming
/// Prefix of the per-carve staging directory
pub const CARVE_PATH_PREFIX: &str = "osquery_carve_";

/// Prefix of the tar archive and its compressed form
pub const CARVE_NAME_PREFIX: &str = "carve_";

/// Extension of the uncompressed archive
pub const ARCHIVE_EXTENSION: &str = "tar";

/// Extension of the gzip-compressed archive
pub const COMPRESSED_EXTENSION: &str = "tar.gz";

// Buffer and chunk sizes
/// Default block size for copying files into the staging area (8KB)
pub const DEFAULT_BLOCK_SIZE: usize = 8 * 1024;

/// Default exfiltration chunk size (2MB)
pub const DEFAULT_CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// Largest chunk the client will put in a single continue call (64MB)
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Default gzip compression level
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Buffer used when streaming the archive through the compressor (512KB)
pub const COMPRESSION_BUFFER_SIZE: usize = 512 * 1024;

// Exfiltration protocol defaults
/// Default path of the "begin" call
pub const DEFAULT_START_ENDPOINT: &str = "/carve_init";

/// Default path of the "continue" call
pub const DEFAULT_CONTINUE_ENDPOINT: &str = "/carve_block";

// Timeout and retry constants
/// Default per-request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Retries of a single chunk after its first failed attempt
pub const MAX_CHUNK_RETRIES: usize = 3;

/// Base retry delay in milliseconds
pub const RETRY_BASE_DELAY_MS: u64 = 250;

/// Maximum retry delay in milliseconds
pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Upper bound on the default number of carves running at once
pub const MAX_DEFAULT_CONCURRENT_CARVES: usize = 4;

// Error messages
pub const ERROR_NO_PATHS: &str = "No paths to carve";
pub const ERROR_NOTHING_STAGED: &str = "No files were carved";
pub const ERROR_BEGIN_REJECTED: &str = "Carve session was rejected by the server";
