//! Dependencies probe: detect required and optional tooling per OS.

use super::{Probe, ProbeContext, ProbeKind, ValidationFragment};
use crate::command::CommandRunner;
use crate::host::{HostInspector, ResolvedEnvironment};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use syntropy_common::validation::{DependenciesSection, DependencyState, DependencyStatus};
use syntropy_common::version::{is_version_compatible, parse_version_output, UNKNOWN_VERSION};
use syntropy_common::{
    AutoFix, Category, ProbeError, Risk, ValidationItem, ValidationRequest,
};
use tracing::debug;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const VERSION_FLAGS: [&str; 4] = ["--version", "-version", "-v", "--help"];

/// One entry of the dependency catalog
#[derive(Debug, Clone, PartialEq)]
pub struct DependencySpec {
    pub name: String,
    pub required_version: String,
    /// Shell line whose stdout carries the version
    pub check_command: String,
    pub install_command: String,
    /// Well-known install location, used when there is no check command
    pub path: String,
    pub required: bool,
}

impl DependencySpec {
    fn new(name: &str, required_version: &str, install_command: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            required_version: required_version.to_string(),
            check_command: String::new(),
            install_command: install_command.to_string(),
            path: String::new(),
            required,
        }
    }

    fn check(mut self, command: &str) -> Self {
        self.check_command = command.to_string();
        self
    }

    fn at(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }
}

/// Catalog for an OS; empty for unknown systems
pub fn default_catalog(os: &str) -> Vec<DependencySpec> {
    match os {
        "linux" => vec![
            DependencySpec::new("git", "2.0", "sudo apt-get install -y git", true),
            DependencySpec::new("curl", "7.58", "sudo apt-get install -y curl", true),
            DependencySpec::new("tar", "1.28", "sudo apt-get install -y tar", true).at("/usr/bin/tar"),
            DependencySpec::new("systemctl", "219", "sudo apt-get install -y systemd", false)
                .check("systemctl --version"),
            DependencySpec::new("openssl", "1.1.1", "sudo apt-get install -y openssl", false),
            DependencySpec::new("docker", "20.10", "curl -fsSL https://get.docker.com | sh", false),
        ],
        "darwin" => vec![
            DependencySpec::new("git", "2.0", "xcode-select --install", true),
            DependencySpec::new("curl", "7.58", "brew install curl", true).at("/usr/bin/curl"),
            DependencySpec::new("brew", "3.0", "/bin/bash -c \"$(curl -fsSL https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh)\"", false)
                .check("brew --version"),
            DependencySpec::new("docker", "20.10", "brew install --cask docker", false),
        ],
        "windows" => vec![
            DependencySpec::new("powershell", "5.1", "winget install --id Microsoft.PowerShell -e", true)
                .check("powershell -NoProfile -Command $PSVersionTable.PSVersion.ToString()"),
            DependencySpec::new("git", "2.0", "winget install --id Git.Git -e", true),
            DependencySpec::new("curl", "7.55", "winget install --id cURL.cURL -e", true)
                .at("C:\\Windows\\System32\\curl.exe"),
            DependencySpec::new("docker", "20.10", "winget install --id Docker.DockerDesktop -e", false),
        ],
        _ => Vec::new(),
    }
}

enum Detection {
    Found { version: String, output: String },
    Missing,
    Failed(String),
}

pub struct DependenciesProbe {
    host: Arc<dyn HostInspector>,
    runner: Arc<dyn CommandRunner>,
    catalog: Option<Vec<DependencySpec>>,
}

impl DependenciesProbe {
    pub fn new(host: Arc<dyn HostInspector>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            host,
            runner,
            catalog: None,
        }
    }

    /// Replace the per-OS catalog with a fixed list
    pub fn with_catalog(mut self, catalog: Vec<DependencySpec>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    fn detect(&self, spec: &DependencySpec, ctx: &ProbeContext) -> Detection {
        let timeout = ctx.remaining(COMMAND_TIMEOUT);

        if !spec.check_command.is_empty() {
            return match self.runner.run_shell(&spec.check_command, timeout) {
                Ok(out) if out.success => Detection::Found {
                    version: parse_version_output(&out.stdout),
                    output: out.stdout,
                },
                Ok(_) => Detection::Missing,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Detection::Failed(e.to_string()),
                Err(_) => Detection::Missing,
            };
        }

        if !spec.path.is_empty() && Path::new(&spec.path).exists() {
            return Detection::Found {
                version: UNKNOWN_VERSION.to_string(),
                output: String::new(),
            };
        }

        for flag in VERSION_FLAGS {
            if ctx.is_cancelled() {
                return Detection::Failed("validation cancelled".to_string());
            }
            match self.runner.run(&spec.name, &[flag], ctx.remaining(COMMAND_TIMEOUT)) {
                Ok(out) if out.success => {
                    let text = format!("{}\n{}", out.stdout, out.stderr);
                    return Detection::Found {
                        version: parse_version_output(&text),
                        output: text.trim().to_string(),
                    };
                }
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Detection::Failed(e.to_string());
                }
                // Not on PATH: no other flag will help
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Detection::Missing,
                Err(_) => continue,
            }
        }
        Detection::Missing
    }
}

impl Probe for DependenciesProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Dependencies
    }

    fn run(&self, req: &ValidationRequest, ctx: &ProbeContext) -> Result<ValidationFragment, ProbeError> {
        let mut fragment = ValidationFragment::new(ProbeKind::Dependencies);
        let env = ResolvedEnvironment::resolve(&req.environment, &self.host.snapshot());
        let mut section = DependenciesSection::default();

        if !env.is_live_host {
            fragment.push(ValidationItem::info(
                "DEPENDENCY_CHECK_SKIPPED",
                format!("Dependencies of a {} host cannot be detected from this machine", env.os),
                Category::Dependencies,
            ));
            fragment.dependencies = Some(section);
            return Ok(fragment);
        }

        let catalog = self
            .catalog
            .clone()
            .unwrap_or_else(|| default_catalog(&env.os));

        for spec in catalog {
            if !spec.required && req.options.skip_optional {
                continue;
            }
            if ctx.is_cancelled() {
                fragment.interrupted = true;
                break;
            }

            let detection = self.detect(&spec, ctx);
            let (state, version, output) = match detection {
                Detection::Found { version, output } => {
                    if is_version_compatible(&version, &spec.required_version) {
                        (DependencyState::Installed, version, output)
                    } else {
                        (DependencyState::Outdated, version, output)
                    }
                }
                Detection::Missing => (DependencyState::Missing, String::new(), String::new()),
                Detection::Failed(reason) => (DependencyState::Error, String::new(), reason),
            };
            debug!("Dependency {}: {:?} {}", spec.name, state, version);

            let item = match (state, spec.required) {
                (DependencyState::Missing, true) => Some(
                    ValidationItem::error(
                        "REQUIRED_DEPENDENCY_MISSING",
                        format!("Required dependency '{}' is not installed", spec.name),
                        Category::Dependencies,
                    )
                    .with_expected(format!(">= {}", spec.required_version))
                    .with_fix(AutoFix::command(&spec.install_command, Risk::Medium)),
                ),
                (DependencyState::Missing, false) => Some(
                    ValidationItem::info(
                        "OPTIONAL_DEPENDENCY_MISSING",
                        format!("Optional dependency '{}' is not installed", spec.name),
                        Category::Dependencies,
                    )
                    .with_fix(AutoFix::command(&spec.install_command, Risk::Medium)),
                ),
                (DependencyState::Outdated, true) => Some(
                    ValidationItem::warning(
                        "DEPENDENCY_OUTDATED",
                        format!(
                            "Dependency '{}' {} is older than required {}",
                            spec.name, version, spec.required_version
                        ),
                        Category::Dependencies,
                    )
                    .with_expected(format!(">= {}", spec.required_version))
                    .with_actual(&version)
                    .with_fix(AutoFix::command(&spec.install_command, Risk::Medium)),
                ),
                (DependencyState::Error, _) => Some(ValidationItem::warning(
                    "DEPENDENCY_CHECK_FAILED",
                    format!("Could not check dependency '{}': {}", spec.name, output),
                    Category::Dependencies,
                )),
                _ => None,
            };
            if let Some(mut item) = item {
                item = item.with_field(spec.name.clone());
                if req.options.detailed && !output.is_empty() {
                    item = item.with_details(serde_json::json!({ "output": output }));
                }
                fragment.push(item);
            }

            section.checked += 1;
            match state {
                DependencyState::Installed => {
                    section.installed += 1;
                    fragment.capabilities.push(spec.name.clone());
                }
                DependencyState::Outdated => {
                    section.installed += 1;
                    section.outdated += 1;
                    fragment.capabilities.push(spec.name.clone());
                }
                DependencyState::Missing => section.missing += 1,
                DependencyState::Error => {}
            }
            section.entries.push(DependencyStatus {
                name: spec.name,
                required: spec.required,
                required_version: spec.required_version,
                version: if version.is_empty() { UNKNOWN_VERSION.to_string() } else { version },
                state,
            });
        }

        fragment.dependencies = Some(section);
        Ok(fragment)
    }
}
