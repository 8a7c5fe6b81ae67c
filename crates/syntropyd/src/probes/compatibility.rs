//! Compatibility probe: static OS, architecture and interface tables.

use super::{Probe, ProbeContext, ProbeKind, ValidationFragment};
use crate::host::{HostInspector, ResolvedEnvironment};
use std::sync::Arc;
use syntropy_common::validation::{CompatibilitySection, KnownIssue, Workaround};
use syntropy_common::version::compare_versions;
use syntropy_common::{
    AutoFix, Category, InterfaceType, ProbeError, Risk, Severity, ValidationItem,
    ValidationRequest,
};

pub const SUPPORTED_OS: [&str; 3] = ["windows", "linux", "darwin"];
pub const SUPPORTED_ARCH: [&str; 4] = ["amd64", "386", "arm64", "arm"];

/// Oldest OS release each platform is tested on
pub fn min_os_version(os: &str) -> Option<&'static str> {
    match os {
        "windows" => Some("10"),
        "linux" => Some("3.10"),
        "darwin" => Some("10.15"),
        _ => None,
    }
}

/// Interface × OS support matrix
pub fn interface_supported(os: &str, interface: InterfaceType) -> bool {
    !matches!(
        (os, interface),
        ("windows", InterfaceType::Mobile) | ("linux", InterfaceType::Mobile)
    )
}

struct IssueRow {
    id: &'static str,
    os: &'static str,
    interface: &'static str,
    severity: &'static str,
    title: &'static str,
    description: &'static str,
}

const KNOWN_ISSUES: &[IssueRow] = &[
    IssueRow {
        id: "KI-001",
        os: "windows",
        interface: "all",
        severity: "low",
        title: "Long paths",
        description: "Paths longer than 260 characters fail unless long path support is enabled",
    },
    IssueRow {
        id: "KI-002",
        os: "darwin",
        interface: "desktop",
        severity: "low",
        title: "Gatekeeper prompt",
        description: "The first launch of the desktop client is blocked until it is approved in System Settings",
    },
    IssueRow {
        id: "KI-003",
        os: "linux",
        interface: "desktop",
        severity: "low",
        title: "Tray icon on Wayland",
        description: "Some Wayland compositors do not show the system tray icon",
    },
    IssueRow {
        id: "KI-004",
        os: "all",
        interface: "web",
        severity: "low",
        title: "Browser storage quota",
        description: "Private browsing modes limit local storage and may drop session state",
    },
    IssueRow {
        id: "KI-005",
        os: "windows",
        interface: "mobile",
        severity: "high",
        title: "No mobile runtime",
        description: "The mobile interface cannot be hosted on Windows nodes",
    },
    IssueRow {
        id: "KI-006",
        os: "linux",
        interface: "mobile",
        severity: "high",
        title: "No mobile runtime",
        description: "The mobile interface cannot be hosted on Linux nodes",
    },
];

struct WorkaroundRow {
    id: &'static str,
    os: &'static str,
    interface: &'static str,
    title: &'static str,
    steps: &'static [&'static str],
}

const WORKAROUNDS: &[WorkaroundRow] = &[
    WorkaroundRow {
        id: "WA-001",
        os: "windows",
        interface: "all",
        title: "Enable long path support",
        steps: &[
            "Open an elevated PowerShell",
            "Set HKLM:\\SYSTEM\\CurrentControlSet\\Control\\FileSystem LongPathsEnabled to 1",
        ],
    },
    WorkaroundRow {
        id: "WA-002",
        os: "darwin",
        interface: "desktop",
        title: "Approve the desktop client",
        steps: &["Open System Settings > Privacy & Security", "Click 'Open Anyway'"],
    },
    WorkaroundRow {
        id: "WA-003",
        os: "linux",
        interface: "desktop",
        title: "Install a tray extension",
        steps: &["Install the AppIndicator extension for your desktop", "Log out and back in"],
    },
    WorkaroundRow {
        id: "WA-004",
        os: "all",
        interface: "mobile",
        title: "Use the web interface",
        steps: &["Open the web interface from the mobile browser instead"],
    },
];

/// `"all"` matches anything, otherwise exact match
fn selector_matches(selector: &str, value: &str) -> bool {
    selector == "all" || selector == value
}

pub fn known_issues_for(os: &str, interface: InterfaceType) -> Vec<KnownIssue> {
    KNOWN_ISSUES
        .iter()
        .filter(|r| selector_matches(r.os, os) && selector_matches(r.interface, interface.as_str()))
        .map(|r| KnownIssue {
            id: r.id.to_string(),
            os: r.os.to_string(),
            interface: r.interface.to_string(),
            severity: r.severity.to_string(),
            title: r.title.to_string(),
            description: r.description.to_string(),
        })
        .collect()
}

pub fn workarounds_for(os: &str, interface: InterfaceType) -> Vec<Workaround> {
    WORKAROUNDS
        .iter()
        .filter(|r| selector_matches(r.os, os) && selector_matches(r.interface, interface.as_str()))
        .map(|r| Workaround {
            id: r.id.to_string(),
            os: r.os.to_string(),
            interface: r.interface.to_string(),
            title: r.title.to_string(),
            steps: r.steps.iter().map(|s| s.to_string()).collect(),
        })
        .collect()
}

fn issue_severity(label: &str) -> Severity {
    match label {
        "critical" => Severity::Critical,
        "high" => Severity::Error,
        _ => Severity::Warning,
    }
}

pub struct CompatibilityProbe {
    host: Arc<dyn HostInspector>,
}

impl CompatibilityProbe {
    pub fn new(host: Arc<dyn HostInspector>) -> Self {
        Self { host }
    }
}

impl Probe for CompatibilityProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Compatibility
    }

    fn run(&self, req: &ValidationRequest, _ctx: &ProbeContext) -> Result<ValidationFragment, ProbeError> {
        let mut fragment = ValidationFragment::new(ProbeKind::Compatibility);
        let env = ResolvedEnvironment::resolve(&req.environment, &self.host.snapshot());
        let interface = req.interface;

        let os_supported = SUPPORTED_OS.contains(&env.os.as_str());
        let arch_supported = SUPPORTED_ARCH.contains(&env.arch.as_str());
        let iface_supported = interface_supported(&env.os, interface);
        let min_version = min_os_version(&env.os).unwrap_or_default();

        if !os_supported {
            fragment.push(
                ValidationItem::error(
                    "UNSUPPORTED_OS",
                    format!("Operating system '{}' is not supported", env.os),
                    Category::Compatibility,
                )
                .with_field("os")
                .with_expected(SUPPORTED_OS.join(", "))
                .with_actual(&env.os),
            );
        }

        if !arch_supported {
            fragment.push(
                ValidationItem::warning(
                    "UNSUPPORTED_ARCHITECTURE",
                    format!("Architecture '{}' is not officially supported", env.arch),
                    Category::Compatibility,
                )
                .with_field("arch")
                .with_expected(SUPPORTED_ARCH.join(", "))
                .with_actual(&env.arch),
            );
        }

        if os_supported
            && !env.os_version.is_empty()
            && !min_version.is_empty()
            && compare_versions(&env.os_version, min_version).is_lt()
        {
            fragment.push(
                ValidationItem::warning(
                    "OS_VERSION_TOO_OLD",
                    format!(
                        "{} {} is older than the minimum tested release {}",
                        env.os, env.os_version, min_version
                    ),
                    Category::Compatibility,
                )
                .with_field("os_version")
                .with_expected(format!(">= {}", min_version))
                .with_actual(&env.os_version)
                .with_fix(AutoFix::manual("Upgrade the operating system", Risk::High)),
            );
        }

        if !iface_supported {
            fragment.push(
                ValidationItem::warning(
                    "INTERFACE_COMPATIBILITY_WARNING",
                    format!("The {} interface is not supported on {}", interface, env.os),
                    Category::Compatibility,
                )
                .with_field("interface")
                .with_actual(interface)
                .with_fix(AutoFix::manual(
                    "Use the web or cli interface on this platform",
                    Risk::Low,
                )),
            );
        }

        let known_issues = known_issues_for(&env.os, interface);
        for issue in &known_issues {
            fragment.push(
                ValidationItem::new(
                    "KNOWN_ISSUE",
                    format!("{}: {}", issue.title, issue.description),
                    issue_severity(&issue.severity),
                    Category::Compatibility,
                )
                .with_field(issue.id.clone()),
            );
        }

        fragment.compatibility = Some(CompatibilitySection {
            os_supported,
            arch_supported,
            interface_supported: iface_supported,
            min_os_version: min_version.to_string(),
            known_issues,
            workarounds: workarounds_for(&env.os, interface),
        });
        Ok(fragment)
    }
}
