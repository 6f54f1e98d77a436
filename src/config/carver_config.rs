use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BLOCK_SIZE, DEFAULT_CHUNK_SIZE, DEFAULT_COMPRESSION_LEVEL,
    DEFAULT_CONTINUE_ENDPOINT, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_START_ENDPOINT,
    MAX_CHUNK_RETRIES, MAX_CHUNK_SIZE, MAX_DEFAULT_CONCURRENT_CARVES, RETRY_BASE_DELAY_MS,
    RETRY_MAX_DELAY_MS,
};
use crate::error::CarveError;

/// How the archive is compressed before it is shipped
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    #[default]
    Gzip,
    None,
}

/// Where the compressed carve goes
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExfilMode {
    /// begin/continue calls against a remote collection service
    #[default]
    Tls,
    /// chunks written to a local directory
    Directory,
}

/// Settings for shipping the carve off the host
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ExfilConfig {
    pub mode: ExfilMode,
    pub base_url: Option<String>,
    pub start_endpoint: String,
    pub continue_endpoint: String,
    /// Enrollment secret sent with the begin call
    pub node_key: Option<String>,
    pub chunk_size: usize,
    pub timeout_secs: u64,
    pub max_chunk_retries: usize,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Destination for `mode: directory`
    pub output_dir: Option<PathBuf>,
}

impl Default for ExfilConfig {
    fn default() -> Self {
        Self {
            mode: ExfilMode::Tls,
            base_url: None,
            start_endpoint: DEFAULT_START_ENDPOINT.to_string(),
            continue_endpoint: DEFAULT_CONTINUE_ENDPOINT.to_string(),
            node_key: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_chunk_retries: MAX_CHUNK_RETRIES,
            retry_base_delay_ms: RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: RETRY_MAX_DELAY_MS,
            output_dir: None,
        }
    }
}

impl ExfilConfig {
    /// Full URL of the begin call
    pub fn start_url(&self) -> Option<String> {
        self.base_url
            .as_ref()
            .map(|base| format!("{}{}", base.trim_end_matches('/'), self.start_endpoint))
    }

    /// Full URL of the continue call
    pub fn continue_url(&self) -> Option<String> {
        self.base_url
            .as_ref()
            .map(|base| format!("{}{}", base.trim_end_matches('/'), self.continue_endpoint))
    }

    fn validate(&self) -> Result<(), CarveError> {
        if self.chunk_size == 0 {
            return Err(CarveError::Config("chunk_size must be greater than zero".into()));
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(CarveError::Config(format!(
                "chunk_size {} exceeds the maximum of {} bytes",
                self.chunk_size, MAX_CHUNK_SIZE
            )));
        }
        if self.timeout_secs == 0 {
            return Err(CarveError::Config("timeout_secs must be greater than zero".into()));
        }

        match self.mode {
            ExfilMode::Tls => {
                let base = self.base_url.as_deref().ok_or_else(|| {
                    CarveError::Config("exfil.base_url is required in tls mode".into())
                })?;
                let parsed = reqwest::Url::parse(base)
                    .map_err(|e| CarveError::Config(format!("invalid base_url '{}': {}", base, e)))?;
                if parsed.scheme() != "https" && parsed.scheme() != "http" {
                    return Err(CarveError::Config(format!(
                        "base_url '{}' must use http or https",
                        base
                    )));
                }
                for (name, endpoint) in [
                    ("start_endpoint", &self.start_endpoint),
                    ("continue_endpoint", &self.continue_endpoint),
                ] {
                    if !endpoint.starts_with('/') {
                        return Err(CarveError::Config(format!(
                            "{} '{}' must start with '/'",
                            name, endpoint
                        )));
                    }
                }
            }
            ExfilMode::Directory => {
                if self.output_dir.is_none() {
                    return Err(CarveError::Config(
                        "exfil.output_dir is required in directory mode".into(),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Top-level carver configuration, loaded from YAML.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CarverConfig {
    /// Block size used when copying files into the staging area
    pub block_size: usize,
    /// Parent of the per-carve staging directories
    pub staging_root: PathBuf,
    pub compression: CompressionKind,
    pub compression_level: u32,
    /// Files larger than this are skipped
    pub max_file_size: Option<u64>,
    /// Files that would push the staged total past this are skipped
    pub max_carve_size: Option<u64>,
    /// Keep staging directories after a successful carve
    pub retain_artifacts: bool,
    pub max_concurrent_carves: usize,
    /// Root of the file-backed carve record store
    pub store_path: PathBuf,
    pub exfil: ExfilConfig,
}

impl Default for CarverConfig {
    fn default() -> Self {
        let temp = std::env::temp_dir();
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            staging_root: temp.clone(),
            compression: CompressionKind::Gzip,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_file_size: None,
            max_carve_size: None,
            retain_artifacts: false,
            max_concurrent_carves: std::cmp::min(num_cpus::get(), MAX_DEFAULT_CONCURRENT_CARVES),
            store_path: temp.join("rs-carver-db"),
            exfil: ExfilConfig::default(),
        }
    }
}

impl CarverConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: CarverConfig =
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml).context(format!("Failed to write config to {}", path.display()))?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Create a default configuration YAML file
    pub fn create_default_config_file(path: &Path) -> Result<()> {
        CarverConfig::default().save_to_yaml_file(path)
    }

    /// Check sizes, levels and endpoints before any carve starts.
    pub fn validate(&self) -> Result<(), CarveError> {
        if self.block_size == 0 {
            return Err(CarveError::Config("block_size must be greater than zero".into()));
        }
        if self.compression_level > 9 {
            return Err(CarveError::Config(format!(
                "compression_level {} is outside 0-9",
                self.compression_level
            )));
        }
        if self.max_concurrent_carves == 0 {
            return Err(CarveError::Config(
                "max_concurrent_carves must be greater than zero".into(),
            ));
        }
        if let Some(0) = self.max_carve_size {
            return Err(CarveError::Config("max_carve_size must be greater than zero".into()));
        }
        self.exfil.validate()
    }
}

/// Load the configuration file if one was given, otherwise the defaults.
pub fn load_config(path: Option<&Path>) -> Result<CarverConfig> {
    match path {
        Some(path) => CarverConfig::from_yaml_file(path),
        None => {
            info!("No configuration file given, using defaults");
            Ok(CarverConfig::default())
        }
    }
}
