//! Validation probes.
//!
//! Each probe inspects one aspect of the host or request and returns a
//! [`ValidationFragment`]. Probes are stateless and reentrant: they never
//! touch the shared result, the aggregator merges fragments.

mod compatibility;
mod dependencies;
mod environment;
mod performance;
mod security;

pub use compatibility::CompatibilityProbe;
pub use dependencies::{DependenciesProbe, DependencySpec};
pub use environment::EnvironmentProbe;
pub use performance::{score, BenchmarkWeights, PerformanceProbe};
pub use security::SecurityProbe;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use syntropy_common::validation::{
    CompatibilitySection, DependenciesSection, EnvironmentSection, PerformanceSection,
    ResourcesSection, SecuritySection,
};
use syntropy_common::{Category, ProbeError, ValidationItem, ValidationRequest};

/// The five probes, in sequential execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Environment,
    Security,
    Performance,
    Compatibility,
    Dependencies,
}

impl ProbeKind {
    pub const SEQUENTIAL_ORDER: [ProbeKind; 5] = [
        ProbeKind::Environment,
        ProbeKind::Security,
        ProbeKind::Performance,
        ProbeKind::Compatibility,
        ProbeKind::Dependencies,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProbeKind::Environment => "environment",
            ProbeKind::Security => "security",
            ProbeKind::Performance => "performance",
            ProbeKind::Compatibility => "compatibility",
            ProbeKind::Dependencies => "dependencies",
        }
    }

    pub fn category(self) -> Category {
        match self {
            ProbeKind::Environment => Category::Environment,
            ProbeKind::Security => Category::Security,
            ProbeKind::Performance => Category::Performance,
            ProbeKind::Compatibility => Category::Compatibility,
            ProbeKind::Dependencies => Category::Dependencies,
        }
    }

    pub fn parse(s: &str) -> Option<ProbeKind> {
        Self::SEQUENTIAL_ORDER
            .into_iter()
            .find(|k| k.as_str() == s.trim().to_ascii_lowercase())
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run context: deadline and cooperative cancellation
#[derive(Debug, Clone)]
pub struct ProbeContext {
    deadline: Instant,
    cancelled: Arc<AtomicBool>,
}

impl ProbeContext {
    pub fn new(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Cancelled explicitly or past the deadline
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || Instant::now() >= self.deadline
    }

    /// Time left before the deadline, capped at `cap`
    pub fn remaining(&self, cap: Duration) -> Duration {
        self.deadline
            .saturating_duration_since(Instant::now())
            .min(cap)
    }
}

/// What a single probe found. Sections a probe does not own stay `None`.
#[derive(Debug, Clone)]
pub struct ValidationFragment {
    pub probe: ProbeKind,
    /// Findings in the order the probe produced them
    pub items: Vec<ValidationItem>,
    pub environment: Option<EnvironmentSection>,
    /// Appended to `environment.capabilities` by any probe
    pub capabilities: Vec<String>,
    pub resources: Option<ResourcesSection>,
    pub compatibility: Option<CompatibilitySection>,
    pub dependencies: Option<DependenciesSection>,
    pub security: Option<SecuritySection>,
    pub performance: Option<PerformanceSection>,
    /// The probe stopped early because the run was cancelled
    pub interrupted: bool,
}

impl ValidationFragment {
    pub fn new(probe: ProbeKind) -> Self {
        Self {
            probe,
            items: Vec::new(),
            environment: None,
            capabilities: Vec::new(),
            resources: None,
            compatibility: None,
            dependencies: None,
            security: None,
            performance: None,
            interrupted: false,
        }
    }

    pub fn push(&mut self, item: ValidationItem) {
        self.items.push(item);
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.items.iter().any(|i| i.code == code)
    }
}

/// A validator that can be run by the aggregator
pub trait Probe: Send + Sync {
    fn kind(&self) -> ProbeKind;

    /// Inspect and report. `Err` only when the probe cannot run at all;
    /// findings always go into the returned fragment.
    fn run(&self, req: &ValidationRequest, ctx: &ProbeContext) -> Result<ValidationFragment, ProbeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_order() {
        let names: Vec<_> = ProbeKind::SEQUENTIAL_ORDER.iter().map(|k| k.as_str()).collect();
        assert_eq!(
            names,
            vec!["environment", "security", "performance", "compatibility", "dependencies"]
        );
    }

    #[test]
    fn test_context_cancellation() {
        let ctx = ProbeContext::new(Duration::from_secs(60));
        assert!(!ctx.is_cancelled());
        let clone = ctx.clone();
        clone.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_context_deadline() {
        let ctx = ProbeContext::new(Duration::ZERO);
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.remaining(Duration::from_secs(1)), Duration::ZERO);
    }
}
