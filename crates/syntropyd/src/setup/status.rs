//! Inspecting and resetting an installed setup.

use super::orchestrator::SetupOrchestrator;
use crate::backup::BackupRequest;
use crate::fsutil;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use syntropy_common::layout::display;
use syntropy_common::{checksum, InterfaceType, SetupConfig, SetupLayout, StoreError};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallState {
    Installed,
    Incomplete,
    Corrupted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryStatus {
    pub name: String,
    pub path: String,
    pub exists: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupStatus {
    pub state: InstallState,
    pub home_dir: String,
    pub config_path: String,
    pub config_present: bool,
    pub checksum_valid: bool,
    pub owner_key_present: bool,
    pub owner_key_secure: bool,
    pub public_key_present: bool,
    pub directories: Vec<DirectoryStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<InterfaceType>,
    pub service_installed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetReport {
    pub home_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
    pub removed: Vec<String>,
    pub service_removed: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
}

fn read_config(path: &Path) -> Option<(String, Option<SetupConfig>)> {
    let text = fs::read_to_string(path).ok()?;
    let config = serde_yaml::from_str(&text).ok();
    Some((text, config))
}

impl SetupOrchestrator {
    /// `None` when no manager config exists under `layout`
    pub fn status(&self, layout: &SetupLayout) -> Option<SetupStatus> {
        let (text, parsed) = read_config(&layout.manager_config)?;

        // Paths come from the config when it parses, else from the layout
        let (dirs, key_path, pub_path) = match &parsed {
            Some(c) => (
                c.manager.directories.clone(),
                c.owner_key.path.clone(),
                c.manager.default_paths.owner_pub.clone(),
            ),
            None => (
                layout.directories(),
                display(&layout.owner_key),
                display(&layout.owner_pub),
            ),
        };

        let checksum_valid = parsed
            .as_ref()
            .is_some_and(|c| checksum::verify(&text, &c.metadata.checksum));
        let key = Path::new(&key_path);
        let owner_key_present = key.is_file();
        let owner_key_secure = owner_key_present && fsutil::is_owner_only(key).unwrap_or(false);
        let directories: Vec<_> = dirs
            .entries()
            .into_iter()
            .map(|(name, path)| DirectoryStatus {
                name: name.to_string(),
                path: path.to_string(),
                exists: Path::new(path).is_dir(),
            })
            .collect();

        let state = if !checksum_valid {
            InstallState::Corrupted
        } else if !owner_key_present || directories.iter().any(|d| !d.exists) {
            InstallState::Incomplete
        } else {
            InstallState::Installed
        };

        Some(SetupStatus {
            state,
            home_dir: display(&layout.root),
            config_path: display(&layout.manager_config),
            config_present: true,
            checksum_valid,
            owner_key_present,
            owner_key_secure,
            public_key_present: Path::new(&pub_path).is_file(),
            directories,
            version: parsed.as_ref().map(|c| c.metadata.version.clone()),
            interface: parsed.as_ref().map(|c| c.interface.kind),
            service_installed: parsed
                .as_ref()
                .is_some_and(|c| self.installer().find(c).is_some()),
        })
    }

    /// Archive the installed config, then remove the config, key files and
    /// service. Directories, logs and backups are left alone.
    pub fn reset(
        &self,
        layout: &SetupLayout,
        interface: InterfaceType,
        user_id: &str,
        session_id: &str,
    ) -> Result<ResetReport, StoreError> {
        let mut report = ResetReport {
            home_dir: display(&layout.root),
            backup_id: None,
            removed: Vec::new(),
            service_removed: false,
            warnings: Vec::new(),
        };

        let parsed = match read_config(&layout.manager_config) {
            Some((_, Some(config))) => {
                let request = BackupRequest::new(config.clone(), interface)
                    .named("before reset")
                    .for_user(user_id, session_id);
                report.backup_id = Some(self.backups().create(request)?.id);
                Some(config)
            }
            Some((_, None)) => {
                report
                    .warnings
                    .push("manager config is unreadable and was not archived".to_string());
                None
            }
            None => None,
        };

        if let Some(config) = &parsed {
            if let Some(installation) = self.installer().find(config) {
                match self.installer().uninstall(&installation) {
                    Ok(()) => report.service_removed = true,
                    Err(e) => report
                        .warnings
                        .push(format!("could not remove service {}: {}", installation.name, e)),
                }
            }
        }

        for path in [&layout.manager_config, &layout.owner_key, &layout.owner_pub] {
            if fsutil::remove_if_exists(path)? {
                report.removed.push(display(path));
            }
        }

        for w in &report.warnings {
            warn!("Reset of {}: {}", report.home_dir, w);
        }
        info!(
            "Reset {}: removed {} files, backup {:?}",
            report.home_dir,
            report.removed.len(),
            report.backup_id
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{BackupManager, MemoryBackupStore};
    use crate::config::ManagerDefaults;
    use crate::factory::ConfigFactory;
    use crate::host::StaticHost;
    use crate::probes::EnvironmentProbe;
    use crate::setup::service::RecordingInstaller;
    use std::sync::Arc;
    use std::time::Duration;
    use syntropy_common::{FixedClock, SetupRequest};

    fn orchestrator(home: &Path) -> (SetupOrchestrator, Arc<MemoryBackupStore>) {
        let host = Arc::new(StaticHost::healthy(home));
        let clock = Arc::new(FixedClock::at_rfc3339("2026-05-04T10:00:00Z").unwrap());
        let store = Arc::new(MemoryBackupStore::new());
        let o = SetupOrchestrator::new(
            Arc::new(ConfigFactory::new(host.clone(), clock.clone(), ManagerDefaults::default(), 1024)),
            Arc::new(EnvironmentProbe::new(host)),
            Arc::new(BackupManager::new(store.clone(), clock)),
            Arc::new(RecordingInstaller::new()),
            Duration::from_secs(10),
        );
        (o, store)
    }

    fn install(o: &SetupOrchestrator, service: bool) {
        let mut req = SetupRequest::new(InterfaceType::Cli);
        req.options.install_service = service;
        assert!(o.execute(&req).unwrap().success);
    }

    #[test]
    fn test_status_absent() {
        let home = tempfile::tempdir().unwrap();
        let (o, _) = orchestrator(home.path());
        assert!(o.status(&SetupLayout::under(home.path())).is_none());
    }

    #[test]
    fn test_status_states() {
        let home = tempfile::tempdir().unwrap();
        let (o, _) = orchestrator(home.path());
        install(&o, true);
        let layout = SetupLayout::under(home.path());

        let status = o.status(&layout).unwrap();
        assert_eq!(status.state, InstallState::Installed);
        assert!(status.owner_key_secure);
        assert!(status.service_installed);
        assert_eq!(status.interface, Some(InterfaceType::Cli));

        fs::remove_dir(&layout.cache_dir).unwrap();
        assert_eq!(o.status(&layout).unwrap().state, InstallState::Incomplete);

        let mut text = fs::read_to_string(&layout.manager_config).unwrap();
        text = text.replace("log_level: info", "log_level: trace");
        fs::write(&layout.manager_config, text).unwrap();
        assert_eq!(o.status(&layout).unwrap().state, InstallState::Corrupted);
    }

    #[test]
    fn test_reset_archives_and_preserves_dirs() {
        let home = tempfile::tempdir().unwrap();
        let (o, store) = orchestrator(home.path());
        install(&o, true);
        let layout = SetupLayout::under(home.path());

        let report = o.reset(&layout, InterfaceType::Cli, "u", "s").unwrap();
        assert!(report.backup_id.is_some());
        assert_eq!(store.len(), 1);
        assert!(report.service_removed);
        assert_eq!(report.removed.len(), 3);
        assert!(!layout.manager_config.exists());
        assert!(!layout.owner_key.exists());
        assert!(layout.logs_dir.is_dir());
        assert!(layout.backups_dir.is_dir());

        // nothing left to do
        let again = o.reset(&layout, InterfaceType::Cli, "u", "s").unwrap();
        assert!(again.removed.is_empty());
        assert!(again.backup_id.is_none());

        // and a fresh setup is allowed afterwards
        install(&o, false);
    }
}
