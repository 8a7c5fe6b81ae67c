//! OS service registration for the node manager.

use crate::command::CommandRunner;
use crate::fsutil::{self, PUBLIC_FILE_MODE};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use syntropy_common::{ServiceInstallation, SetupConfig};
use thiserror::Error;
use tracing::{info, warn};

pub const SERVICE_NAME: &str = "syntropy-manager";
pub const LAUNCHD_LABEL: &str = "com.syntropystack.manager";
pub const WINDOWS_SERVICE_NAME: &str = "SyntropyManager";
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("service installation is not supported on '{0}'")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{command} failed: {message}")]
    Command { command: String, message: String },
}

pub trait ServiceInstaller: Send + Sync {
    fn install(&self, config: &SetupConfig) -> Result<ServiceInstallation, ServiceError>;

    fn uninstall(&self, installation: &ServiceInstallation) -> Result<(), ServiceError>;

    /// The installation for `config` if one is present on this host
    fn find(&self, config: &SetupConfig) -> Option<ServiceInstallation>;
}

// ============================================================================
// Unit Files
// ============================================================================

pub fn systemd_unit_path(user_home: &Path) -> PathBuf {
    user_home
        .join(".config/systemd/user")
        .join(format!("{}.service", SERVICE_NAME))
}

pub fn launchd_plist_path(user_home: &Path) -> PathBuf {
    user_home
        .join("Library/LaunchAgents")
        .join(format!("{}.plist", LAUNCHD_LABEL))
}

pub fn systemd_unit(binary: &str, config: &SetupConfig) -> String {
    format!(
        "[Unit]\n\
         Description=Syntropy node manager\n\
         After=network-online.target\n\
         Wants=network-online.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         ExecStart={} --config {}\n\
         Restart=on-failure\n\
         RestartSec=5\n\
         Environment=SYNTROPY_HOME={}\n\
         \n\
         [Install]\n\
         WantedBy=default.target\n",
        binary, config.manager.default_paths.manager_config, config.manager.home_dir
    )
}

pub fn launchd_plist(binary: &str, config: &SetupConfig) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{binary}</string>
        <string>--config</string>
        <string>{config}</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <true/>
    <key>StandardErrorPath</key>
    <string>{logs}/manager.err.log</string>
</dict>
</plist>
"#,
        label = LAUNCHD_LABEL,
        binary = binary,
        config = config.manager.default_paths.manager_config,
        logs = config.manager.directories.logs,
    )
}

// ============================================================================
// OS Installer
// ============================================================================

/// systemd user unit, launchd agent or Windows service depending on the
/// config's target OS
pub struct OsServiceInstaller {
    runner: Arc<dyn CommandRunner>,
    binary: String,
}

impl OsServiceInstaller {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            binary: SERVICE_NAME.to_string(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<(), ServiceError> {
        let command = format!("{} {}", program, args.join(" "));
        let output = self
            .runner
            .run(program, args, COMMAND_TIMEOUT)
            .map_err(|e| ServiceError::Command {
                command: command.clone(),
                message: e.to_string(),
            })?;
        if output.success {
            Ok(())
        } else {
            Err(ServiceError::Command {
                command,
                message: output.stderr.trim().to_string(),
            })
        }
    }

    /// Unit file written but the manager could not be told about it
    fn reload_soft(&self, program: &str, args: &[&str]) {
        if let Err(e) = self.run(program, args) {
            warn!("Service file installed but reload failed: {}", e);
        }
    }

    fn unit_file(&self, config: &SetupConfig) -> Option<(&'static str, PathBuf)> {
        let home = Path::new(&config.environment.user_home);
        match config.environment.os.as_str() {
            "linux" => Some(("systemd", systemd_unit_path(home))),
            "darwin" => Some(("launchd", launchd_plist_path(home))),
            _ => None,
        }
    }
}

impl ServiceInstaller for OsServiceInstaller {
    fn install(&self, config: &SetupConfig) -> Result<ServiceInstallation, ServiceError> {
        match config.environment.os.as_str() {
            "linux" => {
                let path = systemd_unit_path(Path::new(&config.environment.user_home));
                fsutil::atomic_write(&path, systemd_unit(&self.binary, config).as_bytes(), PUBLIC_FILE_MODE)?;
                self.reload_soft("systemctl", &["--user", "daemon-reload"]);
                info!("Installed systemd unit {}", path.display());
                Ok(ServiceInstallation {
                    kind: "systemd".to_string(),
                    name: SERVICE_NAME.to_string(),
                    unit_path: Some(path.display().to_string()),
                })
            }
            "darwin" => {
                let path = launchd_plist_path(Path::new(&config.environment.user_home));
                fsutil::atomic_write(&path, launchd_plist(&self.binary, config).as_bytes(), PUBLIC_FILE_MODE)?;
                info!("Installed launchd agent {}", path.display());
                Ok(ServiceInstallation {
                    kind: "launchd".to_string(),
                    name: LAUNCHD_LABEL.to_string(),
                    unit_path: Some(path.display().to_string()),
                })
            }
            "windows" => {
                let bin_path = format!(
                    "{} --config {}",
                    self.binary, config.manager.default_paths.manager_config
                );
                self.run(
                    "sc.exe",
                    &["create", WINDOWS_SERVICE_NAME, "binPath=", &bin_path, "start=", "auto"],
                )?;
                info!("Registered Windows service {}", WINDOWS_SERVICE_NAME);
                Ok(ServiceInstallation {
                    kind: "windows_service".to_string(),
                    name: WINDOWS_SERVICE_NAME.to_string(),
                    unit_path: None,
                })
            }
            other => Err(ServiceError::Unsupported(other.to_string())),
        }
    }

    fn uninstall(&self, installation: &ServiceInstallation) -> Result<(), ServiceError> {
        match installation.kind.as_str() {
            "windows_service" => self.run("sc.exe", &["delete", &installation.name]),
            _ => {
                if let Some(path) = installation.unit_path.as_deref() {
                    fsutil::remove_if_exists(Path::new(path))?;
                }
                if installation.kind == "systemd" {
                    self.reload_soft("systemctl", &["--user", "daemon-reload"]);
                }
                info!("Removed {} service {}", installation.kind, installation.name);
                Ok(())
            }
        }
    }

    fn find(&self, config: &SetupConfig) -> Option<ServiceInstallation> {
        if config.environment.os == "windows" {
            let found = self.run("sc.exe", &["query", WINDOWS_SERVICE_NAME]).is_ok();
            return found.then(|| ServiceInstallation {
                kind: "windows_service".to_string(),
                name: WINDOWS_SERVICE_NAME.to_string(),
                unit_path: None,
            });
        }
        let (kind, path) = self.unit_file(config)?;
        path.is_file().then(|| ServiceInstallation {
            kind: kind.to_string(),
            name: if kind == "launchd" { LAUNCHD_LABEL } else { SERVICE_NAME }.to_string(),
            unit_path: Some(path.display().to_string()),
        })
    }
}

// ============================================================================
// Recording Installer
// ============================================================================

/// Keeps installations in memory. Can be told to fail.
#[derive(Default)]
pub struct RecordingInstaller {
    installed: Mutex<Vec<ServiceInstallation>>,
    fail_with: Option<String>,
}

impl RecordingInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            installed: Mutex::new(Vec::new()),
            fail_with: Some(message.into()),
        }
    }

    pub fn installed(&self) -> Vec<ServiceInstallation> {
        self.installed
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

impl ServiceInstaller for RecordingInstaller {
    fn install(&self, config: &SetupConfig) -> Result<ServiceInstallation, ServiceError> {
        if let Some(message) = &self.fail_with {
            return Err(ServiceError::Command {
                command: "install".to_string(),
                message: message.clone(),
            });
        }
        let installation = ServiceInstallation {
            kind: "recorded".to_string(),
            name: SERVICE_NAME.to_string(),
            unit_path: Some(format!("{}/{}.service", config.manager.home_dir, SERVICE_NAME)),
        };
        if let Ok(mut installed) = self.installed.lock() {
            installed.push(installation.clone());
        }
        Ok(installation)
    }

    fn uninstall(&self, installation: &ServiceInstallation) -> Result<(), ServiceError> {
        if let Ok(mut installed) = self.installed.lock() {
            installed.retain(|i| i != installation);
        }
        Ok(())
    }

    fn find(&self, config: &SetupConfig) -> Option<ServiceInstallation> {
        let prefix = format!("{}/", config.manager.home_dir);
        self.installed().into_iter().find(|i| {
            i.unit_path
                .as_deref()
                .is_some_and(|p| p.starts_with(&prefix))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ScriptedRunner;

    fn config(os: &str, home: &Path) -> SetupConfig {
        let mut config = SetupConfig::default();
        config.environment.os = os.to_string();
        config.environment.user_home = home.display().to_string();
        config.manager.home_dir = home.join(".syntropy").display().to_string();
        config.manager.default_paths.manager_config =
            home.join(".syntropy/config/manager.yaml").display().to_string();
        config
    }

    #[test]
    fn test_systemd_install_and_uninstall() {
        let home = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().ok("systemctl --user daemon-reload", ""));
        let installer = OsServiceInstaller::new(runner.clone());
        let config = config("linux", home.path());

        let installation = installer.install(&config).unwrap();
        let unit = systemd_unit_path(home.path());
        assert_eq!(installation.unit_path.as_deref(), Some(unit.to_str().unwrap()));
        let text = std::fs::read_to_string(&unit).unwrap();
        assert!(text.contains("ExecStart=syntropy-manager --config"));
        assert!(text.contains("manager.yaml"));
        assert_eq!(installer.find(&config), Some(installation.clone()));

        installer.uninstall(&installation).unwrap();
        assert!(!unit.exists());
        assert!(installer.find(&config).is_none());
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn test_reload_failure_is_not_fatal() {
        let home = tempfile::tempdir().unwrap();
        let installer = OsServiceInstaller::new(Arc::new(ScriptedRunner::new()));
        assert!(installer.install(&config("linux", home.path())).is_ok());
    }

    #[test]
    fn test_launchd_plist() {
        let home = tempfile::tempdir().unwrap();
        let installer = OsServiceInstaller::new(Arc::new(ScriptedRunner::new()));
        let installation = installer.install(&config("darwin", home.path())).unwrap();
        assert_eq!(installation.kind, "launchd");
        let text = std::fs::read_to_string(launchd_plist_path(home.path())).unwrap();
        assert!(text.contains(LAUNCHD_LABEL));
    }

    #[test]
    fn test_windows_service_uses_sc() {
        let home = tempfile::tempdir().unwrap();
        let config = config("windows", home.path());
        let line = format!(
            "sc.exe create SyntropyManager binPath= syntropy-manager --config {} start= auto",
            config.manager.default_paths.manager_config
        );
        let runner = Arc::new(ScriptedRunner::new().fail(&line, "Access is denied."));
        let err = OsServiceInstaller::new(runner).install(&config).unwrap_err();
        assert!(err.to_string().contains("Access is denied."));
    }

    #[test]
    fn test_unknown_os() {
        let home = tempfile::tempdir().unwrap();
        let installer = OsServiceInstaller::new(Arc::new(ScriptedRunner::new()));
        assert!(matches!(
            installer.install(&config("plan9", home.path())),
            Err(ServiceError::Unsupported(_))
        ));
    }
}
