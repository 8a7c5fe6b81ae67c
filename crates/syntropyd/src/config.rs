//! Configuration management for syntropyd.
//!
//! Loads settings from `--config`, then /etc/syntropy/syntropyd.toml, or uses defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file path
pub const CONFIG_PATH: &str = "/etc/syntropy/syntropyd.toml";

/// File name of the setup history log under `state_dir`
pub const HISTORY_FILE: &str = "setup_history.jsonl";

/// Defaults written into generated manager configs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerDefaults {
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_api_endpoint() -> String {
    "https://api.syntropystack.com".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ManagerDefaults {
    fn default() -> Self {
        Self {
            api_endpoint: default_api_endpoint(),
            log_level: default_log_level(),
        }
    }
}

/// Probe and aggregator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Whole-run timeout when the request does not set one
    #[serde(default = "default_timeout_s")]
    pub default_timeout_s: u64,

    /// `host:port` dialled by the connectivity check
    #[serde(default = "default_connectivity_target")]
    pub connectivity_target: String,

    /// `host:port` for the network benchmark; absent means simulated
    #[serde(default)]
    pub network_benchmark_target: Option<String>,

    /// RSA modulus size for owner keys and the security probe
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,
}

fn default_timeout_s() -> u64 {
    30
}

fn default_connectivity_target() -> String {
    "1.1.1.1:443".to_string()
}

fn default_key_bits() -> usize {
    2048
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            default_timeout_s: default_timeout_s(),
            connectivity_target: default_connectivity_target(),
            network_benchmark_target: None,
            key_bits: default_key_bits(),
        }
    }
}

impl ValidationConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_s.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_s: u64,

    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,
}

fn default_request_timeout() -> u64 {
    120
}

fn default_max_body() -> usize {
    1024 * 1024
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_s: default_request_timeout(),
            max_body_bytes: default_max_body(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Backups and setup history live here
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Gzip backup documents on disk
    #[serde(default)]
    pub compress_backups: bool,

    #[serde(default)]
    pub manager: ManagerDefaults,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8742".to_string()
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("syntropy")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            log_level: default_log_level(),
            state_dir: default_state_dir(),
            compress_backups: false,
            manager: ManagerDefaults::default(),
            validation: ValidationConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Config {
    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.state_dir.join("backups")
    }

    pub fn history_path(&self) -> PathBuf {
        self.state_dir.join(HISTORY_FILE)
    }
}
