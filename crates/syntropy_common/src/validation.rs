//! Validation model shared by the probes, the aggregator and the HTTP layer.
//!
//! Findings are appended to a [`ValidationResult`] and never removed. Where an
//! item lands (errors vs warnings) is decided by its severity in exactly one
//! place, [`ValidationResult::push`].

use crate::setup_config::InterfaceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a single finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Errors and critical findings invalidate a result
    pub fn is_blocking(self) -> bool {
        matches!(self, Severity::Error | Severity::Critical)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Area a finding belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Environment,
    Security,
    Performance,
    Compatibility,
    Dependencies,
    Configuration,
    Network,
    Storage,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Environment,
        Category::Security,
        Category::Performance,
        Category::Compatibility,
        Category::Dependencies,
        Category::Configuration,
        Category::Network,
        Category::Storage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Environment => "environment",
            Category::Security => "security",
            Category::Performance => "performance",
            Category::Compatibility => "compatibility",
            Category::Dependencies => "dependencies",
            Category::Configuration => "configuration",
            Category::Network => "network",
            Category::Storage => "storage",
        }
    }

    pub fn parse(s: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk label attached to an auto-fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    Medium,
    High,
}

/// Instructions that would resolve a finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoFix {
    pub available: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub script: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub manual: String,
    pub risk: Risk,
    /// Whether applying the fix should be preceded by a backup
    #[serde(default)]
    pub backup: bool,
}

impl AutoFix {
    /// Fix expressed as a single shell command
    pub fn command(command: impl Into<String>, risk: Risk) -> Self {
        Self {
            available: true,
            command: command.into(),
            script: String::new(),
            manual: String::new(),
            risk,
            backup: false,
        }
    }

    /// Fix that needs a human to follow written steps
    pub fn manual(manual: impl Into<String>, risk: Risk) -> Self {
        Self {
            available: true,
            command: String::new(),
            script: String::new(),
            manual: manual.into(),
            risk,
            backup: false,
        }
    }

    pub fn with_manual(mut self, manual: impl Into<String>) -> Self {
        self.manual = manual.into();
        self
    }

    pub fn with_backup(mut self) -> Self {
        self.backup = true;
        self
    }

    /// At least one way of applying the fix is present
    pub fn is_actionable(&self) -> bool {
        !self.command.is_empty() || !self.script.is_empty() || !self.manual.is_empty()
    }
}

/// A single finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationItem {
    /// Stable machine-readable code, e.g. `UNSUPPORTED_OS`
    pub code: String,
    pub message: String,
    pub severity: Severity,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_fix: Option<AutoFix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ValidationItem {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        category: Category,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            severity,
            category,
            field: None,
            expected: None,
            actual: None,
            auto_fix: None,
            details: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>, category: Category) -> Self {
        Self::new(code, message, Severity::Error, category)
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>, category: Category) -> Self {
        Self::new(code, message, Severity::Warning, category)
    }

    pub fn info(code: impl Into<String>, message: impl Into<String>, category: Category) -> Self {
        Self::new(code, message, Severity::Info, category)
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_expected(mut self, expected: impl ToString) -> Self {
        self.expected = Some(expected.to_string());
        self
    }

    pub fn with_actual(mut self, actual: impl ToString) -> Self {
        self.actual = Some(actual.to_string());
        self
    }

    /// Attach a fix. Fixes without any command, script or manual text are dropped.
    pub fn with_fix(mut self, fix: AutoFix) -> Self {
        if fix.is_actionable() {
            self.auto_fix = Some(fix);
        }
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Host facts supplied by the client. Every field is optional; missing
/// fields are filled in from the live host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub kernel_version: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub home_dir: String,
    #[serde(default)]
    pub has_admin_rights: Option<bool>,
    #[serde(default)]
    pub available_disk_gb: Option<f64>,
    #[serde(default)]
    pub has_internet: Option<bool>,
    #[serde(default)]
    pub cpu_cores: Option<usize>,
    #[serde(default)]
    pub total_memory_gb: Option<f64>,
    #[serde(default)]
    pub available_memory_gb: Option<f64>,
}

/// Knobs controlling a validation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationOptions {
    #[serde(default)]
    pub skip_optional: bool,
    #[serde(default)]
    pub auto_fix: bool,
    #[serde(default)]
    pub detailed: bool,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub exclude_categories: Vec<Category>,
    /// Soft upper bound on the whole run; zero means the daemon default
    #[serde(default)]
    pub timeout_s: u64,
}

impl ValidationOptions {
    /// Whether findings and probes of `category` take part in this run
    pub fn includes(&self, category: Category) -> bool {
        if self.exclude_categories.contains(&category) {
            return false;
        }
        self.categories.is_empty() || self.categories.contains(&category)
    }
}

/// A validation request after normalization at the HTTP edge
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRequest {
    pub kind: String,
    pub interface: InterfaceType,
    pub user_id: String,
    pub session_id: String,
    pub environment: EnvironmentInfo,
    pub options: ValidationOptions,
}

impl ValidationRequest {
    pub fn new(interface: InterfaceType) -> Self {
        Self {
            kind: "validation".to_string(),
            interface,
            user_id: String::new(),
            session_id: String::new(),
            environment: EnvironmentInfo::default(),
            options: ValidationOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSection {
    pub os: String,
    pub os_version: String,
    pub architecture: String,
    pub kernel_version: String,
    pub path_separator: String,
    pub has_admin_rights: bool,
    pub home_dir: String,
    pub home_writable: Option<bool>,
    pub available_disk_gb: f64,
    pub has_internet: Option<bool>,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcesSection {
    pub cpu_cores: usize,
    pub total_memory_gb: f64,
    pub available_memory_gb: f64,
    pub available_disk_gb: f64,
}

/// Row of the known-issues table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownIssue {
    pub id: String,
    pub os: String,
    /// Interface selector: `all` or an interface name
    pub interface: String,
    pub severity: String,
    pub title: String,
    pub description: String,
}

/// Row of the workarounds table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workaround {
    pub id: String,
    pub os: String,
    pub interface: String,
    pub title: String,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompatibilitySection {
    pub os_supported: bool,
    pub arch_supported: bool,
    pub interface_supported: bool,
    pub min_os_version: String,
    pub known_issues: Vec<KnownIssue>,
    pub workarounds: Vec<Workaround>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyState {
    Installed,
    Outdated,
    Missing,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub name: String,
    pub required: bool,
    pub required_version: String,
    pub version: String,
    pub state: DependencyState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependenciesSection {
    pub checked: usize,
    pub installed: usize,
    pub missing: usize,
    pub outdated: usize,
    pub entries: Vec<DependencyStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecuritySection {
    pub key_generation: bool,
    pub encryption_available: bool,
    pub secure_random: bool,
    pub file_permissions: bool,
}

/// Outcome of one micro-benchmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub name: String,
    pub duration_ms: f64,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulated: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSection {
    pub cpu_score: f64,
    pub memory_score: f64,
    pub disk_score: f64,
    pub network_score: f64,
    pub overall_score: f64,
    pub benchmarks: Vec<BenchmarkResult>,
    pub optimizations: Vec<String>,
}

/// Aggregated result of a validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationItem>,
    pub warnings: Vec<ValidationItem>,
    pub environment: EnvironmentSection,
    pub resources: ResourcesSection,
    pub compatibility: CompatibilitySection,
    pub dependencies: DependenciesSection,
    pub security: SecuritySection,
    pub performance: PerformanceSection,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ValidationResult {
    /// Empty result with every section present
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            environment: EnvironmentSection::default(),
            resources: ResourcesSection::default(),
            compatibility: CompatibilitySection::default(),
            dependencies: DependenciesSection::default(),
            security: SecuritySection::default(),
            performance: PerformanceSection::default(),
            duration_ms: 0,
            timestamp,
        }
    }

    /// Append a finding to `errors` or `warnings` by severity
    pub fn push(&mut self, item: ValidationItem) {
        if item.severity.is_blocking() {
            self.errors.push(item);
            self.valid = false;
        } else {
            self.warnings.push(item);
        }
    }

    /// Re-derive `valid` from the error list
    pub fn seal(&mut self) {
        self.valid = self.errors.is_empty();
    }

    pub fn items(&self) -> impl Iterator<Item = &ValidationItem> {
        self.errors.iter().chain(self.warnings.iter())
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.items().any(|i| i.code == code)
    }

    pub fn first_error(&self) -> Option<&ValidationItem> {
        self.errors.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_push_routes_by_severity() {
        let mut result = ValidationResult::empty(now());
        result.push(ValidationItem::info("A", "a", Category::Environment));
        result.push(ValidationItem::warning("B", "b", Category::Environment));
        assert!(result.valid);

        result.push(ValidationItem::new("C", "c", Severity::Critical, Category::Security));
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_seal_matches_error_list() {
        let mut result = ValidationResult::empty(now());
        result.valid = false;
        result.seal();
        assert!(result.valid);

        result.errors.push(ValidationItem::error("X", "x", Category::Storage));
        result.seal();
        assert!(!result.valid);
    }

    #[test]
    fn test_empty_fix_is_dropped() {
        let mut fix = AutoFix::command("", Risk::Low);
        fix.manual.clear();
        let item = ValidationItem::error("X", "x", Category::Storage).with_fix(fix);
        assert!(item.auto_fix.is_none());
    }

    #[test]
    fn test_category_filter() {
        let mut options = ValidationOptions::default();
        assert!(options.includes(Category::Security));

        options.categories = vec![Category::Security];
        assert!(options.includes(Category::Security));
        assert!(!options.includes(Category::Performance));

        options.exclude_categories = vec![Category::Security];
        assert!(!options.includes(Category::Security));
    }

    #[test]
    fn test_severity_serialization() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), r#""critical""#);
        assert_eq!(serde_json::to_string(&Risk::Medium).unwrap(), r#""medium""#);
        assert_eq!(Category::parse("Storage"), Some(Category::Storage));
        assert_eq!(Category::parse("bogus"), None);
    }
}
