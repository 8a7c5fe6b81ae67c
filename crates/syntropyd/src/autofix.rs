//! Collects auto-fixes from a validation run and applies the safe ones.

use crate::aggregator::ValidationEngine;
use crate::command::CommandRunner;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use syntropy_common::{Category, ProbeError, Risk, ValidationRequest, ValidationResult};
use tracing::{info, warn};

const FIX_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedFix {
    pub code: String,
    pub category: Category,
    pub risk: Risk,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub script: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub manual: String,
}

impl PlannedFix {
    /// Low risk and runnable without a human
    pub fn is_automatic(&self) -> bool {
        self.risk == Risk::Low && !self.command.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedFix {
    pub code: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedFix {
    pub code: String,
    pub command: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixReport {
    pub planned: Vec<PlannedFix>,
    pub applied: Vec<AppliedFix>,
    pub failed: Vec<FailedFix>,
}

/// Every available fix in `result`, lowest risk first, one per (code, command)
pub fn plan(result: &ValidationResult) -> Vec<PlannedFix> {
    let mut seen = HashSet::new();
    let mut planned: Vec<_> = result
        .items()
        .filter_map(|item| {
            let fix = item.auto_fix.as_ref().filter(|f| f.available && f.is_actionable())?;
            seen.insert((item.code.clone(), fix.command.clone()))
                .then(|| PlannedFix {
                    code: item.code.clone(),
                    category: item.category,
                    risk: fix.risk,
                    command: fix.command.clone(),
                    script: fix.script.clone(),
                    manual: fix.manual.clone(),
                })
        })
        .collect();
    // stable: equal risks keep finding order
    planned.sort_by_key(|f| f.risk);
    planned
}

fn apply(runner: &dyn CommandRunner, planned: &[PlannedFix], report: &mut FixReport) {
    for fix in planned.iter().filter(|f| f.is_automatic()) {
        info!("Applying fix for {}: {}", fix.code, fix.command);
        match runner.run_shell(&fix.command, FIX_TIMEOUT) {
            Ok(out) if out.success => report.applied.push(AppliedFix {
                code: fix.code.clone(),
                command: fix.command.clone(),
                output: out.stdout.trim().to_string(),
            }),
            Ok(out) => {
                warn!("Fix for {} exited non-zero: {}", fix.code, out.stderr.trim());
                report.failed.push(FailedFix {
                    code: fix.code.clone(),
                    command: fix.command.clone(),
                    error: out.stderr.trim().to_string(),
                });
            }
            Err(e) => {
                warn!("Fix for {} could not run: {}", fix.code, e);
                report.failed.push(FailedFix {
                    code: fix.code.clone(),
                    command: fix.command.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Validate, plan fixes and, when the request asks for it, apply the
/// automatic ones and validate again
pub async fn run(
    engine: &ValidationEngine,
    runner: Arc<dyn CommandRunner>,
    req: &ValidationRequest,
) -> Result<(ValidationResult, FixReport), ProbeError> {
    let result = engine.validate_all(req).await?;
    let mut report = FixReport {
        planned: plan(&result),
        ..Default::default()
    };
    if !req.options.auto_fix || !report.planned.iter().any(PlannedFix::is_automatic) {
        return Ok((result, report));
    }

    let planned = report.planned.clone();
    let (applied, failed) = tokio::task::spawn_blocking(move || {
        let mut partial = FixReport::default();
        apply(runner.as_ref(), &planned, &mut partial);
        (partial.applied, partial.failed)
    })
    .await
    .map_err(|e| ProbeError::Aborted {
        probe: "autofix".to_string(),
        message: e.to_string(),
    })?;
    report.applied = applied;
    report.failed = failed;

    if report.applied.is_empty() {
        return Ok((result, report));
    }
    let revalidated = engine.validate_all(req).await?;
    Ok((revalidated, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ScriptedRunner;
    use crate::probes::{Probe, ProbeContext, ProbeKind, ValidationFragment};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use syntropy_common::{AutoFix, FixedClock, InterfaceType, ValidationItem};

    /// Reports a fixable error until its fix has run once
    struct FixableProbe {
        runs: AtomicUsize,
    }

    impl Probe for FixableProbe {
        fn kind(&self) -> ProbeKind {
            ProbeKind::Dependencies
        }

        fn run(&self, _req: &ValidationRequest, _ctx: &ProbeContext) -> Result<ValidationFragment, ProbeError> {
            let mut fragment = ValidationFragment::new(ProbeKind::Dependencies);
            if self.runs.fetch_add(1, Ordering::SeqCst) == 0 {
                fragment.push(
                    ValidationItem::error("REQUIRED_DEPENDENCY_MISSING", "curl missing", Category::Dependencies)
                        .with_fix(AutoFix::command("apt-get install -y curl", Risk::Low)),
                );
                fragment.push(
                    ValidationItem::warning("RISKY", "needs a reboot", Category::Dependencies)
                        .with_fix(AutoFix::command("reboot", Risk::High)),
                );
                fragment.push(
                    ValidationItem::warning("MANUAL", "read the docs", Category::Dependencies)
                        .with_fix(AutoFix::manual("Read the docs", Risk::Medium)),
                );
            }
            Ok(fragment)
        }
    }

    fn engine() -> ValidationEngine {
        ValidationEngine::new(
            vec![Arc::new(FixableProbe {
                runs: AtomicUsize::new(0),
            })],
            Arc::new(FixedClock::at_rfc3339("2026-05-04T10:00:00Z").unwrap()),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_plan_only_without_auto_fix() {
        let runner = Arc::new(ScriptedRunner::new());
        let req = ValidationRequest::new(InterfaceType::Cli);
        let (result, report) = run(&engine(), runner.clone(), &req).await.unwrap();

        assert!(!result.valid);
        let risks: Vec<_> = report.planned.iter().map(|f| f.risk).collect();
        assert_eq!(risks, vec![Risk::Low, Risk::Medium, Risk::High]);
        assert!(report.applied.is_empty());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_applies_low_risk_and_revalidates() {
        let runner = Arc::new(ScriptedRunner::new().ok("apt-get install -y curl", "done"));
        let mut req = ValidationRequest::new(InterfaceType::Cli);
        req.options.auto_fix = true;
        let (result, report) = run(&engine(), runner.clone(), &req).await.unwrap();

        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.applied[0].output, "done");
        assert!(report.failed.is_empty());
        assert_eq!(runner.calls(), vec!["apt-get install -y curl".to_string()]);
        // second run no longer sees the problem
        assert!(result.valid);
    }

    #[tokio::test]
    async fn test_failed_fix_is_reported() {
        let runner = Arc::new(ScriptedRunner::new().fail("apt-get install -y curl", "E: locked"));
        let mut req = ValidationRequest::new(InterfaceType::Cli);
        req.options.auto_fix = true;
        let (result, report) = run(&engine(), runner, &req).await.unwrap();
        assert_eq!(report.failed[0].error, "E: locked");
        assert!(!result.valid);
    }
}
