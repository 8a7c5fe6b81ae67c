//! Environment probe: OS, architecture, home directory, disk and network.

use super::{Probe, ProbeContext, ProbeKind, ValidationFragment};
use crate::host::{HostInspector, ResolvedEnvironment};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use syntropy_common::layout::SYNTROPY_DIR;
use syntropy_common::validation::{EnvironmentSection, ResourcesSection};
use syntropy_common::{
    AutoFix, Category, ProbeError, Risk, ValidationItem, ValidationRequest,
};
use tracing::debug;

/// Minimum free disk space for a node setup
pub const MIN_DISK_GB: f64 = 1.0;

const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(3);
const WRITE_PROBE_FILE: &str = ".write_test";

pub struct EnvironmentProbe {
    host: Arc<dyn HostInspector>,
}

impl EnvironmentProbe {
    pub fn new(host: Arc<dyn HostInspector>) -> Self {
        Self { host }
    }

    /// Platform features the node can use, or `None` for unsupported systems
    pub fn capabilities(os: &str) -> Option<&'static [&'static str]> {
        match os {
            "windows" => Some(&["windows_service", "powershell", "registry", "event_log", "wmi"]),
            "linux" => Some(&["systemd_service", "bash", "cron", "logrotate", "iptables"]),
            "darwin" => Some(&["launchd_service", "zsh", "cron", "log_rotation", "pfctl"]),
            _ => None,
        }
    }

    fn check_home(&self, env: &ResolvedEnvironment, fragment: &mut ValidationFragment) -> Option<bool> {
        let Some(home) = env.home_dir.as_deref() else {
            fragment.push(
                ValidationItem::error(
                    "HOME_DIR_NOT_FOUND",
                    "Could not determine the user's home directory",
                    Category::Environment,
                )
                .with_field("home_dir")
                .with_fix(AutoFix::manual(
                    "Set the HOME environment variable or pass environment.home_dir",
                    Risk::Low,
                )),
            );
            return Some(false);
        };

        if !env.is_live_host {
            fragment.push(
                ValidationItem::info(
                    "HOME_DIR_CHECK_SKIPPED",
                    format!(
                        "Home directory {} belongs to a {} host and cannot be checked from here",
                        home.display(),
                        env.os
                    ),
                    Category::Storage,
                )
                .with_field("home_dir"),
            );
            return None;
        }

        if !home.is_dir() {
            fragment.push(
                ValidationItem::error(
                    "HOME_DIR_NOT_FOUND",
                    format!("Home directory {} does not exist", home.display()),
                    Category::Storage,
                )
                .with_field("home_dir")
                .with_actual(home.display()),
            );
            return Some(false);
        }

        match probe_writable(&home.join(SYNTROPY_DIR)) {
            Ok(()) => Some(true),
            Err(e) => {
                fragment.push(
                    ValidationItem::error(
                        "HOME_DIR_NOT_WRITABLE",
                        format!("Cannot write to {}: {}", home.join(SYNTROPY_DIR).display(), e),
                        Category::Storage,
                    )
                    .with_field("home_dir")
                    .with_fix(
                        AutoFix::command(format!("chmod 755 ~/{}", SYNTROPY_DIR), Risk::Low)
                            .with_manual("Make sure your user owns the home directory"),
                    ),
                );
                Some(false)
            }
        }
    }
}

/// Create `dir` owner-only if missing, then write and remove a probe file
fn probe_writable(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
        }
    }

    let probe = dir.join(WRITE_PROBE_FILE);
    let result = fs::File::create(&probe).and_then(|mut f| f.write_all(b"ok"));
    let _ = fs::remove_file(&probe);
    result
}

impl Probe for EnvironmentProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Environment
    }

    fn run(&self, req: &ValidationRequest, ctx: &ProbeContext) -> Result<ValidationFragment, ProbeError> {
        let mut fragment = ValidationFragment::new(ProbeKind::Environment);
        let env = ResolvedEnvironment::resolve(&req.environment, &self.host.snapshot());
        debug!("Environment probe: os={} arch={} live={}", env.os, env.arch, env.is_live_host);

        let mut section = EnvironmentSection {
            os: env.os.clone(),
            os_version: env.os_version.clone(),
            architecture: env.arch.clone(),
            kernel_version: env.kernel_version.clone(),
            path_separator: env.path_separator().to_string(),
            has_admin_rights: env.has_admin_rights,
            home_dir: env
                .home_dir
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            home_writable: None,
            available_disk_gb: env.available_disk_gb,
            has_internet: None,
            capabilities: Vec::new(),
        };
        fragment.resources = Some(ResourcesSection {
            cpu_cores: env.cpu_cores,
            total_memory_gb: env.total_memory_gb,
            available_memory_gb: env.available_memory_gb,
            available_disk_gb: env.available_disk_gb,
        });

        let Some(capabilities) = Self::capabilities(&env.os) else {
            fragment.push(
                ValidationItem::error(
                    "UNSUPPORTED_OS",
                    format!("Operating system '{}' is not supported", env.os),
                    Category::Environment,
                )
                .with_field("os")
                .with_expected("windows, linux or darwin")
                .with_actual(&env.os),
            );
            fragment.environment = Some(section);
            return Ok(fragment);
        };
        section.capabilities = capabilities.iter().map(|c| c.to_string()).collect();

        if ctx.is_cancelled() {
            fragment.interrupted = true;
            fragment.environment = Some(section);
            return Ok(fragment);
        }

        section.home_writable = self.check_home(&env, &mut fragment);

        if env.available_disk_gb < MIN_DISK_GB {
            fragment.push(
                ValidationItem::error(
                    "INSUFFICIENT_DISK_SPACE",
                    format!(
                        "Only {:.2} GB of disk space available, at least {:.1} GB required",
                        env.available_disk_gb, MIN_DISK_GB
                    ),
                    Category::Storage,
                )
                .with_field("available_disk_gb")
                .with_expected(format!(">= {:.1}", MIN_DISK_GB))
                .with_actual(format!("{:.2}", env.available_disk_gb))
                .with_fix(AutoFix::manual(
                    "Free up disk space in the home directory's filesystem",
                    Risk::Low,
                )),
            );
        }

        if ctx.is_cancelled() {
            fragment.interrupted = true;
            fragment.environment = Some(section);
            return Ok(fragment);
        }

        let has_internet = env
            .has_internet
            .unwrap_or_else(|| self.host.check_connectivity(ctx.remaining(CONNECTIVITY_TIMEOUT)));
        section.has_internet = Some(has_internet);
        if !has_internet {
            fragment.push(
                ValidationItem::warning(
                    "NO_INTERNET_CONNECTIVITY",
                    "No internet connectivity detected; the node cannot join the grid until it is online",
                    Category::Network,
                )
                .with_field("has_internet")
                .with_fix(AutoFix::manual(
                    "Check network cables, Wi-Fi, proxy and firewall settings",
                    Risk::Low,
                )),
            );
        }

        if !env.has_admin_rights {
            fragment.push(
                ValidationItem::info(
                    "NO_ADMIN_RIGHTS",
                    "Running without administrator rights; installing a system service may need elevation",
                    Category::Security,
                )
                .with_field("has_admin_rights"),
            );
        }

        if req.options.detailed {
            let details = serde_json::json!({
                "live_host": env.is_live_host,
                "hostname": env.hostname,
            });
            for item in &mut fragment.items {
                item.details.get_or_insert_with(|| details.clone());
            }
        }

        fragment.environment = Some(section);
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StaticHost;
    use syntropy_common::{EnvironmentInfo, InterfaceType, Severity};

    fn run(host: StaticHost, env: EnvironmentInfo) -> ValidationFragment {
        let probe = EnvironmentProbe::new(Arc::new(host));
        let mut req = ValidationRequest::new(InterfaceType::Cli);
        req.environment = env;
        probe
            .run(&req, &ProbeContext::new(Duration::from_secs(10)))
            .unwrap()
    }

    #[test]
    fn test_foreign_windows_host_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let fragment = run(
            StaticHost::healthy(dir.path()),
            EnvironmentInfo {
                os: "windows".to_string(),
                arch: "amd64".to_string(),
                home_dir: "C:\\Users\\T".to_string(),
                has_admin_rights: Some(true),
                available_disk_gb: Some(50.0),
                has_internet: Some(true),
                ..Default::default()
            },
        );
        let env = fragment.environment.unwrap();
        assert_eq!(env.os, "windows");
        assert!(env.capabilities.contains(&"powershell".to_string()));
        assert!(!fragment.items.iter().any(|i| i.severity.is_blocking()));
    }

    #[test]
    fn test_unsupported_os_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let fragment = run(
            StaticHost::healthy(dir.path()),
            EnvironmentInfo {
                os: "unsupported".to_string(),
                available_disk_gb: Some(0.0),
                has_internet: Some(false),
                ..Default::default()
            },
        );
        assert_eq!(fragment.items.len(), 1);
        assert_eq!(fragment.items[0].code, "UNSUPPORTED_OS");
        assert_eq!(fragment.items[0].severity, Severity::Error);
    }

    #[test]
    fn test_live_home_is_created_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let fragment = run(StaticHost::healthy(dir.path()), EnvironmentInfo::default());
        assert!(dir.path().join(".syntropy").is_dir());
        assert_eq!(fragment.environment.unwrap().home_writable, Some(true));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dir.path().join(".syntropy")).unwrap().permissions().mode();
            assert_eq!(mode & 0o077, 0);
        }
    }

    #[test]
    fn test_low_disk_and_offline() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = StaticHost::healthy(dir.path());
        host.snapshot.available_disk_gb = 0.5;
        host.online = false;
        let fragment = run(host, EnvironmentInfo::default());
        assert!(fragment.has_code("INSUFFICIENT_DISK_SPACE"));
        assert!(fragment.has_code("NO_INTERNET_CONNECTIVITY"));
    }

    #[test]
    fn test_missing_home_dir() {
        let fragment = run(
            StaticHost::healthy("/definitely/not/here/syntropy-test"),
            EnvironmentInfo::default(),
        );
        assert!(fragment.has_code("HOME_DIR_NOT_FOUND"));
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_home_reports_fix() {
        use std::os::unix::fs::PermissionsExt;
        if nix::unistd::Uid::effective().is_root() {
            // root ignores permission bits
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o500)).unwrap();
        let fragment = run(StaticHost::healthy(dir.path()), EnvironmentInfo::default());
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700)).unwrap();

        let item = fragment
            .items
            .iter()
            .find(|i| i.code == "HOME_DIR_NOT_WRITABLE")
            .expect("not writable finding");
        assert_eq!(item.auto_fix.as_ref().unwrap().command, "chmod 755 ~/.syntropy");
    }
}
