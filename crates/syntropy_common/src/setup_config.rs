//! Setup configuration written to `config/manager.yaml`.
//!
//! Field names are the YAML/JSON keys. The owner key subtree only ever carries
//! public material; the private key lives in `keys/owner.key`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Client driving a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    Cli,
    Web,
    Desktop,
    Mobile,
}

impl InterfaceType {
    pub const ALL: [InterfaceType; 4] = [
        InterfaceType::Cli,
        InterfaceType::Web,
        InterfaceType::Desktop,
        InterfaceType::Mobile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InterfaceType::Cli => "cli",
            InterfaceType::Web => "web",
            InterfaceType::Desktop => "desktop",
            InterfaceType::Mobile => "mobile",
        }
    }

    /// Feature flags enabled for this interface in generated configs
    pub fn default_features(self) -> Vec<String> {
        let features: &[&str] = match self {
            InterfaceType::Cli => &["colored_output", "progress_bars", "shell_completion"],
            InterfaceType::Web => &["dashboard", "websocket_updates", "session_auth"],
            InterfaceType::Desktop => &["system_tray", "notifications", "auto_start"],
            InterfaceType::Mobile => &["push_notifications", "low_bandwidth_mode"],
        };
        features.iter().map(|f| f.to_string()).collect()
    }
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown interface name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid interface type: '{0}' (expected one of cli, web, desktop, mobile)")]
pub struct InvalidInterface(pub String);

impl FromStr for InterfaceType {
    type Err = InvalidInterface;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InterfaceType::ALL
            .into_iter()
            .find(|i| i.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| InvalidInterface(s.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Directories {
    pub config: String,
    pub keys: String,
    pub logs: String,
    pub cache: String,
    pub backups: String,
}

impl Directories {
    /// `(name, path)` pairs in creation order
    pub fn entries(&self) -> [(&'static str, &str); 5] {
        [
            ("config", self.config.as_str()),
            ("keys", self.keys.as_str()),
            ("logs", self.logs.as_str()),
            ("cache", self.cache.as_str()),
            ("backups", self.backups.as_str()),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultPaths {
    pub manager_config: String,
    pub owner_key: String,
    pub owner_pub: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// The `.syntropy` directory every other path lives under
    pub home_dir: String,
    pub log_level: String,
    pub api_endpoint: String,
    pub directories: Directories,
    pub default_paths: DefaultPaths,
    pub database: DatabaseConfig,
}

/// Public half of the owner key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnerKey {
    pub algorithm: String,
    pub path: String,
    #[serde(rename = "public_key")]
    pub public_key_pem: String,
    pub created_at: Option<DateTime<Utc>>,
    pub size_bits: u32,
}

impl OwnerKey {
    pub fn is_empty(&self) -> bool {
        self.public_key_pem.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub os: String,
    pub os_version: String,
    pub arch: String,
    pub hostname: String,
    /// The user's home directory the `.syntropy` tree was created in
    pub user_home: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    #[serde(rename = "type")]
    pub kind: InterfaceType,
    pub features: Vec<String>,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            kind: InterfaceType::Cli,
            features: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub key_encrypted: bool,
    pub key_algorithm: String,
    pub key_size_bits: u32,
    pub key_file_mode: String,
    pub directory_mode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub api_endpoint: String,
    pub timeout_s: u64,
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub version: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub created_by: String,
    /// SHA-256 hex over the canonical YAML of the config with this field blank
    pub checksum: String,
}

/// Complete node setup configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetupConfig {
    pub manager: ManagerConfig,
    pub owner_key: OwnerKey,
    pub environment: EnvironmentConfig,
    pub interface: InterfaceConfig,
    pub security: SecurityConfig,
    pub network: NetworkConfig,
    pub metadata: ConfigMetadata,
}
