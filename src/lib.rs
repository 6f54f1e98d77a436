//! # rs-carver
//!
//! Forensic file carving for endpoint agents: copy a set of files off a live
//! host, roll them into one compressed archive and ship it to a collection
//! service in ordered chunks.
//!
//! ## Overview
//!
//! A carve moves through a fixed pipeline, with its status persisted to a
//! key-value store at every step so it can be inspected while it runs and
//! after the process exits:
//!
//! ```text
//! patterns ─▶ PathExpander ─▶ CollectionEngine ─▶ Packager ─▶ Exfiltrator
//!                               (staging dir)     (tar.gz)    (begin + chunks)
//! ```
//!
//! ## Features
//!
//! - **Block copies**: files are read in fixed-size blocks into a private
//!   per-carve staging directory
//! - **Deterministic archives**: the same staged files always produce the
//!   same archive bytes
//! - **Chunked upload**: begin/continue protocol with per-chunk retry and
//!   backoff, or a local directory sink for offline use
//! - **Persistent status**: `PENDING` through `SUCCEEDED`/`FAILED`, stored
//!   under `carves.<guid>`
//!
//! ## Usage
//!
//! ```no_run
//! use rust_carver::config::CarverConfig;
//! use rust_carver::dispatch::Dispatcher;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut config = CarverConfig::default();
//! config.exfil.base_url = Some("https://carves.example.com".to_string());
//!
//! let dispatcher = Dispatcher::from_config(config)?;
//! let ticket = dispatcher.carve_paths(&["/var/log/%.log".to_string()])?;
//! let guid = ticket.guid.clone();
//! println!("carve {} finished as {}", guid, ticket.wait().await?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`carver`]: block copy, staging, packaging and the carve session
//! - [`exfil`]: chunked upload protocol and its transports
//! - [`store`]: carve record persistence
//! - [`dispatch`]: scheduling of carve requests
//! - [`expand`]: carve pattern expansion
//! - [`config`]: YAML configuration
//! - [`cli`]: command-line interface definitions

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Block copy, staging, packaging and carve sessions
pub mod carver;

/// Configuration management
pub mod config;

/// Application constants and configuration values
pub mod constants;

/// Scheduling of carve requests
pub mod dispatch;

/// Error types shared by the library
pub mod error;

/// Chunked exfiltration of carve archives
pub mod exfil;

/// Pattern expansion for carve requests
pub mod expand;

/// Core data models and structures used throughout the application
pub mod models;

/// Durable storage of carve records
pub mod store;

/// Utility functions for hashing
pub mod utils;
