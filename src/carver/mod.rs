//! The carve pipeline.
//!
//! A [`CarveSession`] drives one carve through its stages:
//!
//! 1. [`CollectionEngine`] copies each requested file into a private
//!    staging directory with a [`BlockCopier`].
//! 2. [`Packager`] rolls the staged copies into a deterministic tar archive
//!    and gzips it.
//! 3. The session hands the artifact to an [`Exfiltrator`](crate::exfil::Exfiltrator).
//!
//! Status is persisted through a [`KvStore`](crate::store::KvStore) at every
//! step.

/// Fixed-size block copy between file handles
pub mod block_copy;

/// Staging of requested files
pub mod collection;

/// Archive and compression of staged files
pub mod packager;

/// Lifecycle of one carve
pub mod session;

pub use block_copy::{BlockCopier, CopyStats};
pub use collection::{CollectionEngine, CollectionOutcome, CopyFailure, StagingDir};
pub use packager::{PackageOutcome, Packager};
pub use session::CarveSession;
