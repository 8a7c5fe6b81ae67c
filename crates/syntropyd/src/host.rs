//! Host inspection: OS, architecture, resources and connectivity.
//!
//! Probes never read the machine directly; they go through [`HostInspector`]
//! so tests can describe any host they like. Facts supplied in the request
//! override host facts field by field (see [`ResolvedEnvironment::resolve`]).

use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use sysinfo::{Disks, System};
use syntropy_common::EnvironmentInfo;
use tracing::{debug, warn};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Facts about the machine the daemon runs on
#[derive(Debug, Clone, PartialEq)]
pub struct HostSnapshot {
    pub os: String,
    pub os_version: String,
    pub arch: String,
    pub kernel_version: String,
    pub hostname: String,
    pub home_dir: Option<PathBuf>,
    pub has_admin_rights: bool,
    pub cpu_cores: usize,
    pub total_memory_gb: f64,
    pub available_memory_gb: f64,
    pub available_disk_gb: f64,
}

pub trait HostInspector: Send + Sync {
    fn snapshot(&self) -> HostSnapshot;

    /// Whether the internet is reachable within `timeout`
    fn check_connectivity(&self, timeout: Duration) -> bool;
}

/// Map platform names onto `windows`, `linux`, `darwin`
pub fn normalize_os(os: &str) -> String {
    match os.trim().to_ascii_lowercase().as_str() {
        "macos" | "darwin" | "osx" | "mac" => "darwin".to_string(),
        "windows" | "win32" | "win64" => "windows".to_string(),
        "linux" => "linux".to_string(),
        other => other.to_string(),
    }
}

/// Map architecture names onto `amd64`, `386`, `arm64`, `arm`
pub fn normalize_arch(arch: &str) -> String {
    match arch.trim().to_ascii_lowercase().as_str() {
        "x86_64" | "amd64" | "x64" => "amd64".to_string(),
        "x86" | "i386" | "i686" | "386" => "386".to_string(),
        "aarch64" | "arm64" => "arm64".to_string(),
        "arm" | "armv7" | "armv7l" => "arm".to_string(),
        other => other.to_string(),
    }
}

/// The daemon's own OS, normalized
pub fn current_os() -> String {
    normalize_os(std::env::consts::OS)
}

/// Live host backed by `sysinfo`
pub struct SystemHost {
    connectivity_target: String,
}

impl SystemHost {
    pub fn new(connectivity_target: impl Into<String>) -> Self {
        Self {
            connectivity_target: connectivity_target.into(),
        }
    }

    /// Available space on the filesystem holding `path`. Falls back to the
    /// sum of all disks when no mount point matches.
    fn available_disk_gb(path: Option<&Path>) -> f64 {
        let disks = Disks::new_with_refreshed_list();
        let target = path.unwrap_or_else(|| Path::new("/"));

        let best = disks
            .list()
            .iter()
            .filter(|d| target.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len());

        let bytes = match best {
            Some(disk) => disk.available_space(),
            None => disks.list().iter().map(|d| d.available_space()).sum(),
        };
        bytes as f64 / GIB
    }

    #[cfg(unix)]
    fn is_admin() -> bool {
        nix::unistd::Uid::effective().is_root()
    }

    #[cfg(windows)]
    fn is_admin() -> bool {
        // `net session` only succeeds from an elevated prompt
        Command::new("net")
            .arg("session")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[cfg(not(any(unix, windows)))]
    fn is_admin() -> bool {
        false
    }

    fn kernel_version() -> String {
        if let Some(version) = System::kernel_version() {
            return version;
        }
        Command::new("uname")
            .arg("-r")
            .output()
            .ok()
            .filter(|o| o.status.success())
            .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
            .unwrap_or_default()
    }
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new("1.1.1.1:443")
    }
}

impl HostInspector for SystemHost {
    fn snapshot(&self) -> HostSnapshot {
        let mut system = System::new();
        system.refresh_memory();

        let home_dir = dirs::home_dir();
        let available_disk_gb = Self::available_disk_gb(home_dir.as_deref());

        HostSnapshot {
            os: current_os(),
            os_version: System::os_version().unwrap_or_default(),
            arch: normalize_arch(std::env::consts::ARCH),
            kernel_version: Self::kernel_version(),
            hostname: System::host_name().unwrap_or_default(),
            home_dir,
            has_admin_rights: Self::is_admin(),
            cpu_cores: num_cpus::get(),
            total_memory_gb: system.total_memory() as f64 / GIB,
            available_memory_gb: system.available_memory() as f64 / GIB,
            available_disk_gb,
        }
    }

    fn check_connectivity(&self, timeout: Duration) -> bool {
        let addrs = match self.connectivity_target.to_socket_addrs() {
            Ok(addrs) => addrs.collect::<Vec<_>>(),
            Err(e) => {
                warn!("Cannot resolve connectivity target {}: {}", self.connectivity_target, e);
                return false;
            }
        };

        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(_) => return true,
                Err(e) => debug!("Connectivity check to {} failed: {}", addr, e),
            }
        }
        false
    }
}

/// Host description used by tests and by callers that already know the facts
#[derive(Debug, Clone)]
pub struct StaticHost {
    pub snapshot: HostSnapshot,
    pub online: bool,
}

impl StaticHost {
    /// A comfortable host of the daemon's own OS rooted at `home`
    pub fn healthy(home: impl Into<PathBuf>) -> Self {
        Self {
            snapshot: HostSnapshot {
                os: current_os(),
                os_version: "1.0".to_string(),
                arch: "amd64".to_string(),
                kernel_version: "6.1.0".to_string(),
                hostname: "node-1".to_string(),
                home_dir: Some(home.into()),
                has_admin_rights: false,
                cpu_cores: 8,
                total_memory_gb: 16.0,
                available_memory_gb: 8.0,
                available_disk_gb: 100.0,
            },
            online: true,
        }
    }
}

impl HostInspector for StaticHost {
    fn snapshot(&self) -> HostSnapshot {
        self.snapshot.clone()
    }

    fn check_connectivity(&self, _timeout: Duration) -> bool {
        self.online
    }
}

/// Request facts merged over host facts
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEnvironment {
    pub os: String,
    pub os_version: String,
    pub arch: String,
    pub kernel_version: String,
    pub hostname: String,
    pub home_dir: Option<PathBuf>,
    pub has_admin_rights: bool,
    pub available_disk_gb: f64,
    /// `None` until a live check runs
    pub has_internet: Option<bool>,
    pub cpu_cores: usize,
    pub total_memory_gb: f64,
    pub available_memory_gb: f64,
    /// The described OS is the one the daemon runs on, so host-only checks apply
    pub is_live_host: bool,
}

impl ResolvedEnvironment {
    pub fn resolve(info: &EnvironmentInfo, host: &HostSnapshot) -> Self {
        let pick = |requested: &str, fallback: &str| {
            if requested.trim().is_empty() {
                fallback.to_string()
            } else {
                requested.trim().to_string()
            }
        };

        let os = if info.os.trim().is_empty() {
            host.os.clone()
        } else {
            normalize_os(&info.os)
        };
        let arch = if info.arch.trim().is_empty() {
            host.arch.clone()
        } else {
            normalize_arch(&info.arch)
        };
        let home_dir = if info.home_dir.trim().is_empty() {
            host.home_dir.clone()
        } else {
            Some(PathBuf::from(info.home_dir.trim()))
        };

        Self {
            is_live_host: os == host.os,
            os,
            os_version: pick(&info.os_version, &host.os_version),
            arch,
            kernel_version: pick(&info.kernel_version, &host.kernel_version),
            hostname: pick(&info.hostname, &host.hostname),
            home_dir,
            has_admin_rights: info.has_admin_rights.unwrap_or(host.has_admin_rights),
            available_disk_gb: info.available_disk_gb.unwrap_or(host.available_disk_gb),
            has_internet: info.has_internet,
            cpu_cores: info.cpu_cores.unwrap_or(host.cpu_cores),
            total_memory_gb: info.total_memory_gb.unwrap_or(host.total_memory_gb),
            available_memory_gb: info.available_memory_gb.unwrap_or(host.available_memory_gb),
        }
    }

    pub fn path_separator(&self) -> &'static str {
        if self.os == "windows" {
            "\\"
        } else {
            "/"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_names() {
        assert_eq!(normalize_os("macos"), "darwin");
        assert_eq!(normalize_os("Windows"), "windows");
        assert_eq!(normalize_arch("x86_64"), "amd64");
        assert_eq!(normalize_arch("aarch64"), "arm64");
        assert_eq!(normalize_arch("riscv64"), "riscv64");
    }

    #[test]
    fn test_request_overrides_host() {
        let host = StaticHost::healthy("/home/h").snapshot;
        let info = EnvironmentInfo {
            os: "windows".to_string(),
            home_dir: "C:\\Users\\T".to_string(),
            available_disk_gb: Some(50.0),
            ..Default::default()
        };
        let env = ResolvedEnvironment::resolve(&info, &host);
        assert_eq!(env.os, "windows");
        assert_eq!(env.available_disk_gb, 50.0);
        assert_eq!(env.cpu_cores, 8);
        assert_eq!(env.path_separator(), "\\");
        assert_eq!(env.is_live_host, host.os == "windows");
    }

    #[test]
    fn test_empty_request_uses_host() {
        let host = StaticHost::healthy("/home/h").snapshot;
        let env = ResolvedEnvironment::resolve(&EnvironmentInfo::default(), &host);
        assert!(env.is_live_host);
        assert_eq!(env.home_dir, Some(PathBuf::from("/home/h")));
        assert_eq!(env.has_internet, None);
    }

    #[test]
    fn test_system_host_snapshot() {
        let snapshot = SystemHost::default().snapshot();
        assert!(!snapshot.os.is_empty());
        assert!(snapshot.cpu_cores > 0);
    }
}
