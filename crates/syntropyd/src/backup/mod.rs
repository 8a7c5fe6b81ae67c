//! Config backups: creation, restore and listing on top of a [`BackupStore`].

pub mod store;

pub use store::{BackupStore, FileBackupStore, MemoryBackupStore};

use crate::fsutil::{self, PUBLIC_FILE_MODE};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use syntropy_common::layout::{is_strictly_under, MANAGER_CONFIG_FILE, SYNTROPY_DIR};
use syntropy_common::{
    checksum, BackupFilter, BackupMetadata, Clock, ConfigBackup, InterfaceType, Pagination,
    SetupConfig, Sort, StoreError, SummaryPage,
};
use tracing::{info, warn};

/// Collision suffixes tried before giving up
const MAX_ID_ATTEMPTS: u32 = 1000;

#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub config: SetupConfig,
    pub name: Option<String>,
    pub description: String,
    pub metadata: BackupMetadata,
}

impl BackupRequest {
    pub fn new(config: SetupConfig, interface: InterfaceType) -> Self {
        Self {
            config,
            name: None,
            description: String::new(),
            metadata: BackupMetadata {
                interface,
                user_id: String::new(),
                session_id: String::new(),
                created_by: "syntropyd".to_string(),
            },
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn for_user(mut self, user_id: &str, session_id: &str) -> Self {
        self.metadata.user_id = user_id.to_string();
        self.metadata.session_id = session_id.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreOptions {
    pub verify_checksum: bool,
    /// Archive whatever is installed at the target before overwriting it
    pub backup_current: bool,
    /// Defaults to the backed-up config's own manager_config path
    pub target_path: Option<String>,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            verify_checksum: true,
            backup_current: true,
            target_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub backup_id: String,
    pub restored_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_backup_id: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub config: SetupConfig,
}

pub struct BackupManager {
    store: Arc<dyn BackupStore>,
    clock: Arc<dyn Clock>,
}

impl BackupManager {
    pub fn new(store: Arc<dyn BackupStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn BackupStore> {
        &self.store
    }

    /// Archive a config under a fresh `backup_<iface>_<ts>[_n]` id
    pub fn create(&self, request: BackupRequest) -> Result<ConfigBackup, StoreError> {
        let now = self.clock.now();
        let yaml = checksum::to_yaml(&request.config)?;
        let base = ConfigBackup::base_id(request.metadata.interface, now);
        let name = request
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| {
                format!(
                    "{} backup {}",
                    request.metadata.interface,
                    now.format("%Y-%m-%d %H:%M:%S")
                )
            });

        let mut backup = ConfigBackup {
            id: base.clone(),
            name,
            description: request.description,
            config: request.config,
            size_bytes: yaml.len() as u64,
            checksum: checksum::sha256_hex(yaml.as_bytes()),
            encrypted: false,
            compressed: self.store.compresses(),
            metadata: request.metadata,
            created_at: now,
        };

        for attempt in 1..=MAX_ID_ATTEMPTS {
            backup.id = if attempt == 1 {
                base.clone()
            } else {
                format!("{}_{}", base, attempt)
            };
            if self.store.contains(&backup.id)? {
                continue;
            }
            match self.store.put(backup.clone()) {
                Ok(id) => {
                    info!("Created backup {} ({} bytes)", id, backup.size_bytes);
                    return Ok(backup);
                }
                // lost a race for this id; try the next suffix
                Err(StoreError::Duplicate(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::Duplicate(base))
    }

    pub fn get(&self, id: &str) -> Result<ConfigBackup, StoreError> {
        self.store.get(id)
    }

    pub fn list(
        &self,
        filter: &BackupFilter,
        pagination: Pagination,
        sort: Sort,
    ) -> Result<SummaryPage, StoreError> {
        self.store.list(filter, pagination, sort)
    }

    /// Write a backed-up config back to disk
    pub fn restore(&self, id: &str, options: &RestoreOptions) -> Result<RestoreReport, StoreError> {
        let backup = self.store.get(id)?;
        let yaml = checksum::to_yaml(&backup.config)?;

        if options.verify_checksum && checksum::sha256_hex(yaml.as_bytes()) != backup.checksum {
            return Err(StoreError::Corrupt {
                id: id.to_string(),
                reason: "stored checksum does not match the config content".to_string(),
            });
        }

        let target = restore_target(&backup.config, options.target_path.as_deref())?;

        let mut warnings = Vec::new();
        let previous_backup_id = if options.backup_current && target.exists() {
            self.archive_current(&target, &backup, &mut warnings)?
        } else {
            None
        };

        fsutil::atomic_write(&target, yaml.as_bytes(), PUBLIC_FILE_MODE)?;
        info!("Restored backup {} to {}", id, target.display());

        warnings.extend(missing_artifacts(&backup.config));
        for w in &warnings {
            warn!("Restore {}: {}", id, w);
        }

        Ok(RestoreReport {
            backup_id: backup.id,
            restored_path: target.display().to_string(),
            previous_backup_id,
            warnings,
            config: backup.config,
        })
    }

    fn archive_current(
        &self,
        target: &Path,
        restoring: &ConfigBackup,
        warnings: &mut Vec<String>,
    ) -> Result<Option<String>, StoreError> {
        let text = std::fs::read_to_string(target)?;
        match serde_yaml::from_str::<SetupConfig>(&text) {
            Ok(current) => {
                let request = BackupRequest::new(current, restoring.metadata.interface)
                    .named(format!("before restore of {}", restoring.id))
                    .for_user(&restoring.metadata.user_id, &restoring.metadata.session_id);
                Ok(Some(self.create(request)?.id))
            }
            Err(e) => {
                warnings.push(format!(
                    "existing config at {} is unreadable and was not archived: {}",
                    target.display(),
                    e
                ));
                Ok(None)
            }
        }
    }
}

/// Where a restore may write: a `manager.yaml` below the backed-up
/// config's own `.syntropy` home, never anywhere else
fn restore_target(config: &SetupConfig, requested: Option<&str>) -> Result<PathBuf, StoreError> {
    let target = requested
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(&config.manager.default_paths.manager_config);
    let invalid = |reason: &str| StoreError::InvalidTarget {
        path: target.to_string(),
        reason: reason.to_string(),
    };

    let root = Path::new(&config.manager.home_dir);
    if !root.is_absolute() || root.file_name().map_or(true, |n| n != SYNTROPY_DIR) {
        return Err(invalid("backup has no absolute .syntropy home directory"));
    }

    let path = PathBuf::from(target);
    if !path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
    {
        return Err(invalid("target must be an absolute path without '.' or '..'"));
    }
    if !is_strictly_under(&path, root) {
        return Err(invalid(&format!("target is outside {}", root.display())));
    }
    if path.file_name().map_or(true, |n| n != MANAGER_CONFIG_FILE) {
        return Err(invalid(&format!("target file must be named {}", MANAGER_CONFIG_FILE)));
    }
    Ok(path)
}

/// Files and directories a restored config refers to that are not on disk
fn missing_artifacts(config: &SetupConfig) -> Vec<String> {
    let mut missing = Vec::new();
    let key = &config.owner_key.path;
    if !key.is_empty() && !Path::new(key).exists() {
        missing.push(format!("owner key file {} is missing", key));
    }
    for (name, dir) in config.manager.directories.entries() {
        if !dir.is_empty() && !Path::new(dir).is_dir() {
            missing.push(format!("{} directory {} is missing", name, dir));
        }
    }
    missing
}
