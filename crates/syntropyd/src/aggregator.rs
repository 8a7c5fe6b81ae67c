//! Validation aggregator.
//!
//! Runs the probes sequentially or concurrently, merges their fragments into
//! one [`ValidationResult`] under a mutex and enforces the run timeout.

use crate::command::CommandRunner;
use crate::config::ValidationConfig;
use crate::host::HostInspector;
use crate::probes::{
    CompatibilityProbe, DependenciesProbe, EnvironmentProbe, PerformanceProbe, Probe, ProbeContext,
    ProbeKind, SecurityProbe, ValidationFragment,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use syntropy_common::{
    Category, Clock, ProbeError, ValidationItem, ValidationOptions, ValidationRequest,
    ValidationResult,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long cancelled probes get to hand back their partial fragments
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Merges fragments into the shared result
struct Merger {
    result: ValidationResult,
    options: ValidationOptions,
    /// Some probe stopped early on cancellation
    interrupted: bool,
}

impl Merger {
    fn new(result: ValidationResult, options: ValidationOptions) -> Self {
        Self {
            result,
            options,
            interrupted: false,
        }
    }

    fn merge(&mut self, fragment: ValidationFragment) {
        debug!(
            "Merging {} fragment: {} item(s){}",
            fragment.probe,
            fragment.items.len(),
            if fragment.interrupted { ", interrupted" } else { "" }
        );

        self.interrupted |= fragment.interrupted;
        for item in fragment.items {
            if self.options.includes(item.category) {
                self.result.push(item);
            }
        }

        // Only the environment probe owns the section; everyone else appends
        if fragment.probe == ProbeKind::Environment {
            if let Some(mut env) = fragment.environment {
                let appended = std::mem::take(&mut self.result.environment.capabilities);
                for cap in appended {
                    if !env.capabilities.contains(&cap) {
                        env.capabilities.push(cap);
                    }
                }
                self.result.environment = env;
            }
        }
        for cap in fragment.capabilities {
            if !self.result.environment.capabilities.contains(&cap) {
                self.result.environment.capabilities.push(cap);
            }
        }

        if let Some(resources) = fragment.resources {
            self.result.resources = resources;
        }
        if let Some(compatibility) = fragment.compatibility {
            self.result.compatibility = compatibility;
        }
        if let Some(dependencies) = fragment.dependencies {
            self.result.dependencies = dependencies;
        }
        if let Some(security) = fragment.security {
            self.result.security = security;
        }
        if let Some(performance) = fragment.performance {
            self.result.performance = performance;
        }
    }
}

type Shared = Arc<Mutex<Merger>>;

/// Runs probes and aggregates their findings
pub struct ValidationEngine {
    probes: Vec<Arc<dyn Probe>>,
    clock: Arc<dyn Clock>,
    default_timeout: Duration,
}

impl ValidationEngine {
    pub fn new(probes: Vec<Arc<dyn Probe>>, clock: Arc<dyn Clock>, default_timeout: Duration) -> Self {
        let mut probes = probes;
        probes.sort_by_key(|p| {
            ProbeKind::SEQUENTIAL_ORDER
                .iter()
                .position(|k| *k == p.kind())
                .unwrap_or(usize::MAX)
        });
        Self {
            probes,
            clock,
            default_timeout,
        }
    }

    /// The five standard probes wired to live or fake seams
    pub fn standard(
        host: Arc<dyn HostInspector>,
        runner: Arc<dyn CommandRunner>,
        clock: Arc<dyn Clock>,
        settings: &ValidationConfig,
    ) -> Self {
        let probes: Vec<Arc<dyn Probe>> = vec![
            Arc::new(EnvironmentProbe::new(host.clone())),
            Arc::new(SecurityProbe::new().with_key_bits(settings.key_bits)),
            Arc::new(
                PerformanceProbe::new(host.clone())
                    .with_network_target(settings.network_benchmark_target.clone()),
            ),
            Arc::new(CompatibilityProbe::new(host.clone())),
            Arc::new(DependenciesProbe::new(host, runner)),
        ];
        Self::new(probes, clock, settings.default_timeout())
    }

    pub fn probe(&self, kind: ProbeKind) -> Option<Arc<dyn Probe>> {
        self.probes.iter().find(|p| p.kind() == kind).cloned()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run every probe whose category the request includes
    pub async fn validate_all(&self, req: &ValidationRequest) -> Result<ValidationResult, ProbeError> {
        let probes: Vec<_> = self
            .probes
            .iter()
            .filter(|p| req.options.includes(p.kind().category()))
            .cloned()
            .collect();
        self.run(probes, req).await
    }

    /// Run a single probe
    pub async fn validate_one(&self, kind: ProbeKind, req: &ValidationRequest) -> Result<ValidationResult, ProbeError> {
        let probe = self
            .probe(kind)
            .ok_or_else(|| ProbeError::failed(kind.as_str(), "probe is not registered"))?;
        self.run(vec![probe], req).await
    }

    fn timeout_for(&self, options: &ValidationOptions) -> Duration {
        if options.timeout_s > 0 {
            Duration::from_secs(options.timeout_s)
        } else {
            self.default_timeout
        }
    }

    async fn run(&self, probes: Vec<Arc<dyn Probe>>, req: &ValidationRequest) -> Result<ValidationResult, ProbeError> {
        let started = Instant::now();
        let timeout = self.timeout_for(&req.options);
        let deadline = tokio::time::Instant::now() + timeout;
        let ctx = ProbeContext::new(timeout);
        let shared: Shared = Arc::new(Mutex::new(Merger::new(
            ValidationResult::empty(self.clock.now()),
            req.options.clone(),
        )));
        let req = Arc::new(req.clone());

        let mut timed_out = false;
        if req.options.parallel {
            let mut handles: Vec<_> = probes
                .into_iter()
                .map(|p| (p.kind(), spawn_probe(p, req.clone(), ctx.clone(), shared.clone())))
                .collect();
            for (kind, handle) in handles.iter_mut() {
                if let Err(e) = join_probe(*kind, handle, &ctx, deadline, &mut timed_out).await {
                    ctx.cancel();
                    return Err(e);
                }
            }
        } else {
            for probe in probes {
                if timed_out || ctx.is_cancelled() {
                    timed_out = true;
                    break;
                }
                let kind = probe.kind();
                let mut handle = spawn_probe(probe, req.clone(), ctx.clone(), shared.clone());
                join_probe(kind, &mut handle, &ctx, deadline, &mut timed_out).await?;
            }
        }

        let mut result = {
            let mut guard = shared
                .lock()
                .map_err(|_| ProbeError::failed("aggregator", "result lock poisoned"))?;
            timed_out |= guard.interrupted;
            std::mem::replace(&mut guard.result, ValidationResult::empty(self.clock.now()))
        };

        if timed_out {
            warn!("Validation exceeded {:?}, returning partial results", timeout);
            result.push(
                ValidationItem::warning(
                    "VALIDATION_TIMEOUT",
                    format!(
                        "Validation did not finish within {}s; results are partial",
                        timeout.as_secs()
                    ),
                    Category::Configuration,
                )
                .with_field("timeout_s")
                .with_actual(timeout.as_secs()),
            );
        }

        result.seal();
        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Validation for {} finished: valid={} errors={} warnings={} duration_ms={}",
            req.interface,
            result.valid,
            result.errors.len(),
            result.warnings.len(),
            result.duration_ms
        );
        Ok(result)
    }
}

fn spawn_probe(
    probe: Arc<dyn Probe>,
    req: Arc<ValidationRequest>,
    ctx: ProbeContext,
    shared: Shared,
) -> JoinHandle<Result<(), ProbeError>> {
    tokio::task::spawn_blocking(move || {
        let fragment = probe.run(&req, &ctx)?;
        let mut merger = shared
            .lock()
            .map_err(|_| ProbeError::failed(probe.kind().as_str(), "result lock poisoned"))?;
        merger.merge(fragment);
        Ok(())
    })
}

/// Await one probe. Past the deadline the run is cancelled and the probe
/// gets a grace period to merge what it already found.
async fn join_probe(
    kind: ProbeKind,
    handle: &mut JoinHandle<Result<(), ProbeError>>,
    ctx: &ProbeContext,
    deadline: tokio::time::Instant,
    timed_out: &mut bool,
) -> Result<(), ProbeError> {
    let joined = match tokio::time::timeout_at(deadline, &mut *handle).await {
        Ok(joined) => joined,
        Err(_) => {
            *timed_out = true;
            ctx.cancel();
            match tokio::time::timeout(CANCEL_GRACE, &mut *handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("{} probe ignored cancellation, dropping its findings", kind);
                    return Ok(());
                }
            }
        }
    };

    match joined {
        Ok(result) => result,
        Err(e) => Err(ProbeError::Aborted {
            probe: kind.as_str().to_string(),
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syntropy_common::validation::SecuritySection;
    use syntropy_common::{FixedClock, InterfaceType, Severity};

    struct FakeProbe {
        kind: ProbeKind,
        items: Vec<ValidationItem>,
        delay: Duration,
        fail: bool,
    }

    impl FakeProbe {
        fn new(kind: ProbeKind, codes: &[(&str, Severity, Category)]) -> Self {
            Self {
                kind,
                items: codes
                    .iter()
                    .map(|(c, s, cat)| ValidationItem::new(*c, "finding", *s, *cat))
                    .collect(),
                delay: Duration::ZERO,
                fail: false,
            }
        }
    }

    impl Probe for FakeProbe {
        fn kind(&self) -> ProbeKind {
            self.kind
        }

        fn run(&self, _req: &ValidationRequest, ctx: &ProbeContext) -> Result<ValidationFragment, ProbeError> {
            if self.fail {
                return Err(ProbeError::failed(self.kind.as_str(), "cannot start"));
            }
            let mut fragment = ValidationFragment::new(self.kind);
            fragment.items = self.items.clone();
            let until = Instant::now() + self.delay;
            while Instant::now() < until {
                if ctx.is_cancelled() {
                    fragment.interrupted = true;
                    break;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            if self.kind == ProbeKind::Security {
                fragment.security = Some(SecuritySection {
                    key_generation: true,
                    ..Default::default()
                });
            }
            fragment.capabilities.push(format!("{}_cap", self.kind));
            Ok(fragment)
        }
    }

    fn engine(probes: Vec<FakeProbe>) -> ValidationEngine {
        let clock = FixedClock::at_rfc3339("2026-03-01T12:00:00Z").unwrap();
        ValidationEngine::new(
            probes.into_iter().map(|p| Arc::new(p) as Arc<dyn Probe>).collect(),
            Arc::new(clock),
            Duration::from_secs(30),
        )
    }

    fn standard_fakes() -> Vec<FakeProbe> {
        vec![
            FakeProbe::new(ProbeKind::Dependencies, &[("D1", Severity::Info, Category::Dependencies)]),
            FakeProbe::new(ProbeKind::Environment, &[("E1", Severity::Error, Category::Storage)]),
            FakeProbe::new(ProbeKind::Security, &[("S1", Severity::Warning, Category::Security)]),
            FakeProbe::new(ProbeKind::Compatibility, &[("C1", Severity::Critical, Category::Compatibility)]),
        ]
    }

    #[tokio::test]
    async fn test_sequential_order_and_validity() {
        let result = engine(standard_fakes())
            .validate_all(&ValidationRequest::new(InterfaceType::Cli))
            .await
            .unwrap();
        let errors: Vec<_> = result.errors.iter().map(|i| i.code.as_str()).collect();
        assert_eq!(errors, vec!["E1", "C1"]);
        let warnings: Vec<_> = result.warnings.iter().map(|i| i.code.as_str()).collect();
        assert_eq!(warnings, vec!["S1", "D1"]);
        assert!(!result.valid);
        assert!(result.security.key_generation);
        assert_eq!(result.environment.capabilities.len(), 4);
    }

    #[tokio::test]
    async fn test_parallel_matches_sequential_multiset() {
        let mut req = ValidationRequest::new(InterfaceType::Cli);
        let sequential = engine(standard_fakes()).validate_all(&req).await.unwrap();
        req.options.parallel = true;
        let parallel = engine(standard_fakes()).validate_all(&req).await.unwrap();

        let codes = |r: &ValidationResult| {
            let mut c: Vec<_> = r.items().map(|i| i.code.clone()).collect();
            c.sort();
            c
        };
        assert_eq!(codes(&sequential), codes(&parallel));
        assert_eq!(sequential.valid, parallel.valid);
    }

    #[tokio::test]
    async fn test_category_filters() {
        let mut req = ValidationRequest::new(InterfaceType::Cli);
        req.options.exclude_categories = vec![Category::Compatibility, Category::Storage];
        let result = engine(standard_fakes()).validate_all(&req).await.unwrap();
        assert!(!result.has_code("C1"));
        assert!(!result.has_code("E1"));
        assert!(result.valid);
    }

    #[tokio::test]
    async fn test_probe_failure_names_probe() {
        let mut probes = standard_fakes();
        probes[2].fail = true;
        let mut req = ValidationRequest::new(InterfaceType::Cli);
        req.options.parallel = true;
        let err = engine(probes).validate_all(&req).await.unwrap_err();
        assert_eq!(err.probe(), "security");
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_findings() {
        let mut probes = standard_fakes();
        probes[2].delay = Duration::from_secs(20);
        let mut req = ValidationRequest::new(InterfaceType::Cli);
        req.options.timeout_s = 1;

        let started = Instant::now();
        let result = engine(probes).validate_all(&req).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(result.has_code("VALIDATION_TIMEOUT"));
        assert!(result.has_code("E1"));
        // the slow probe returned its partial fragment after cancellation
        assert!(result.has_code("S1"));
        // probes after the timeout never start
        assert!(!result.has_code("C1"));
        assert_eq!(result.valid, result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_validate_one() {
        let result = engine(standard_fakes())
            .validate_one(ProbeKind::Security, &ValidationRequest::new(InterfaceType::Web))
            .await
            .unwrap();
        assert_eq!(result.items().count(), 1);
        assert!(result.valid);
        assert_eq!(result.timestamp.to_rfc3339(), "2026-03-01T12:00:00+00:00");

        let err = engine(standard_fakes())
            .validate_one(ProbeKind::Performance, &ValidationRequest::new(InterfaceType::Web))
            .await
            .unwrap_err();
        assert_eq!(err.probe(), "performance");
    }

    #[tokio::test]
    async fn test_disk_benchmark_failure_does_not_abort_run() {
        let home = tempfile::tempdir().unwrap();
        let host = Arc::new(crate::host::StaticHost::healthy(home.path()));
        let probes: Vec<Arc<dyn Probe>> = vec![
            Arc::new(EnvironmentProbe::new(host.clone())),
            Arc::new(PerformanceProbe::new(host).with_scratch_dir("/nonexistent/scratch")),
        ];
        let engine = ValidationEngine::new(
            probes,
            Arc::new(FixedClock::at_rfc3339("2026-03-01T12:00:00Z").unwrap()),
            Duration::from_secs(30),
        );
        let mut req = ValidationRequest::new(InterfaceType::Cli);
        req.options.parallel = true;

        let result = engine.validate_all(&req).await.unwrap();
        assert!(result.has_code("DISK_BENCHMARK_FAILED"));
        assert_eq!(result.performance.disk_score, 0.0);
        assert!(!result.environment.os.is_empty());
        assert_eq!(result.valid, result.errors.is_empty());
    }
}
