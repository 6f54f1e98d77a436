use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{CarverConfig, ExfilMode};

/// Command-line arguments for rs-carver.
///
/// Global options override the matching configuration file values for this
/// run only.
#[derive(Parser, Debug)]
#[clap(
    name = "rs-carver",
    version,
    about = "Carve files from this host and ship them to a collection service"
)]
pub struct Args {
    /// Verbose logging
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Path to configuration YAML file
    #[clap(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Block size used when copying files into staging (bytes)
    #[clap(long, global = true)]
    pub block_size: Option<usize>,

    /// Size of each uploaded chunk (bytes)
    #[clap(long, global = true)]
    pub chunk_size: Option<usize>,

    /// Gzip level for the carve archive (0-9)
    #[clap(long, global = true)]
    pub compression_level: Option<u32>,

    /// Base URL of the carve collection service
    #[clap(long, global = true)]
    pub base_url: Option<String>,

    /// Endpoint that opens a carve session
    #[clap(long, global = true)]
    pub start_endpoint: Option<String>,

    /// Endpoint that receives carve chunks
    #[clap(long, global = true)]
    pub continue_endpoint: Option<String>,

    /// Write carves to this directory instead of uploading them
    #[clap(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Keep staging directories and archives after a successful upload
    #[clap(long, global = true)]
    pub retain_artifacts: bool,

    /// Subcommands
    #[clap(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Carve files matching the given patterns (`%` and `%%` wildcards)
    Carve {
        /// Paths or patterns to carve
        #[clap(required = true)]
        patterns: Vec<String>,

        /// Request identifier reported to the collection service
        #[clap(long)]
        request_id: Option<String>,
    },

    /// Show stored carve records as JSON
    Status {
        /// Only show this carve
        guid: Option<String>,
    },

    /// Create a default configuration file
    InitConfig {
        /// Path to output configuration file
        #[clap(default_value = "rs-carver.yaml")]
        path: PathBuf,
    },
}

impl Args {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut CarverConfig) {
        if let Some(block_size) = self.block_size {
            config.block_size = block_size;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.exfil.chunk_size = chunk_size;
        }
        if let Some(level) = self.compression_level {
            config.compression_level = level;
        }
        if let Some(url) = &self.base_url {
            config.exfil.base_url = Some(url.clone());
        }
        if let Some(endpoint) = &self.start_endpoint {
            config.exfil.start_endpoint = endpoint.clone();
        }
        if let Some(endpoint) = &self.continue_endpoint {
            config.exfil.continue_endpoint = endpoint.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.exfil.mode = ExfilMode::Directory;
            config.exfil.output_dir = Some(dir.clone());
        }
        if self.retain_artifacts {
            config.retain_artifacts = true;
        }
    }
}
