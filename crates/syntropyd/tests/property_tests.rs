//! Property tests over the full probe set
//!
//! Runs the standard engine against a spread of requested environments and
//! checks the invariants every validation result must hold.
//!
//! ## Invariants Tested
//!
//! - valid is exactly "no errors"
//! - items are complete and sorted into errors/warnings by severity
//! - every auto-fix is actionable
//! - sequential and parallel runs find the same codes
//! - generated configs verify and any mutation breaks verification

use std::collections::HashMap;
use std::sync::Arc;
use syntropy_common::{
    checksum, Category, EnvironmentInfo, FixedClock, InterfaceType, SetupRequest,
    ValidationRequest, ValidationResult,
};
use syntropyd::aggregator::ValidationEngine;
use syntropyd::command::ScriptedRunner;
use syntropyd::config::{ManagerDefaults, ValidationConfig};
use syntropyd::factory::ConfigFactory;
use syntropyd::host::StaticHost;

// ============================================================================
// TEST HELPERS
// ============================================================================

fn engine(home: &std::path::Path) -> ValidationEngine {
    let settings = ValidationConfig {
        key_bits: 1024,
        ..ValidationConfig::default()
    };
    ValidationEngine::standard(
        Arc::new(StaticHost::healthy(home)),
        Arc::new(
            ScriptedRunner::new()
                .ok("git --version", "git version 2.43.0")
                .ok("curl --version", "curl 8.5.0 (x86_64-pc-linux-gnu)"),
        ),
        Arc::new(FixedClock::at_rfc3339("2026-05-04T10:00:00Z").unwrap()),
        &settings,
    )
}

/// Requested environments covering clean, foreign and broken hosts
fn environments(home: &std::path::Path) -> Vec<EnvironmentInfo> {
    let live = EnvironmentInfo {
        home_dir: home.to_string_lossy().into_owned(),
        ..Default::default()
    };
    let windows = EnvironmentInfo {
        os: "windows".into(),
        arch: "amd64".into(),
        home_dir: "C:\\Users\\T".into(),
        has_admin_rights: Some(true),
        available_disk_gb: Some(50.0),
        has_internet: Some(true),
        ..Default::default()
    };
    let darwin_old = EnvironmentInfo {
        os: "darwin".into(),
        os_version: "10.9".into(),
        arch: "arm64".into(),
        has_internet: Some(false),
        ..Default::default()
    };
    let broken = EnvironmentInfo {
        os: "unsupported".into(),
        arch: "sparc".into(),
        available_disk_gb: Some(0.0),
        cpu_cores: Some(1),
        total_memory_gb: Some(1.0),
        available_memory_gb: Some(0.2),
        has_internet: Some(false),
        ..Default::default()
    };
    vec![EnvironmentInfo::default(), live, windows, darwin_old, broken]
}

fn request(interface: InterfaceType, env: EnvironmentInfo, parallel: bool) -> ValidationRequest {
    let mut req = ValidationRequest::new(interface);
    req.environment = env;
    req.options.parallel = parallel;
    // benchmark findings depend on wall-clock timings
    req.options.exclude_categories = vec![Category::Performance];
    req
}

fn code_multiset(result: &ValidationResult) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for item in result.items() {
        *counts.entry(item.code.clone()).or_insert(0) += 1;
    }
    counts
}

fn check_invariants(result: &ValidationResult) {
    assert_eq!(result.valid, result.errors.is_empty());

    for item in &result.errors {
        assert!(item.severity.is_blocking(), "{} in errors", item.code);
    }
    for item in &result.warnings {
        assert!(!item.severity.is_blocking(), "{} in warnings", item.code);
    }
    for item in result.items() {
        assert!(!item.code.is_empty());
        assert!(!item.message.is_empty(), "{} has no message", item.code);
        if let Some(fix) = &item.auto_fix {
            assert!(fix.is_actionable(), "{} has an empty fix", item.code);
        }
    }
}

// ============================================================================
// VALIDATION PROPERTIES
// ============================================================================

#[tokio::test]
async fn test_result_invariants_hold_everywhere() {
    let home = tempfile::tempdir().unwrap();
    let engine = engine(home.path());

    for interface in [InterfaceType::Cli, InterfaceType::Web, InterfaceType::Mobile] {
        for env in environments(home.path()) {
            let result = engine
                .validate_all(&request(interface, env, false))
                .await
                .unwrap();
            check_invariants(&result);
        }
    }
}

#[tokio::test]
async fn test_parallel_and_sequential_agree() {
    let home = tempfile::tempdir().unwrap();
    let engine = engine(home.path());

    for env in environments(home.path()) {
        let sequential = engine
            .validate_all(&request(InterfaceType::Desktop, env.clone(), false))
            .await
            .unwrap();
        let parallel = engine
            .validate_all(&request(InterfaceType::Desktop, env, true))
            .await
            .unwrap();
        check_invariants(&parallel);
        assert_eq!(code_multiset(&sequential), code_multiset(&parallel));
        assert_eq!(sequential.valid, parallel.valid);
    }
}

#[tokio::test]
async fn test_excluded_categories_never_leak() {
    let home = tempfile::tempdir().unwrap();
    let engine = engine(home.path());

    for env in environments(home.path()) {
        let mut req = request(InterfaceType::Cli, env, true);
        req.options.exclude_categories.push(Category::Security);
        let result = engine.validate_all(&req).await.unwrap();
        assert!(result
            .items()
            .all(|i| i.category != Category::Security && i.category != Category::Performance));
    }
}

// ============================================================================
// CONFIG PROPERTIES
// ============================================================================

#[test]
fn test_generated_configs_verify_and_mutations_fail() {
    let home = tempfile::tempdir().unwrap();
    let factory = ConfigFactory::new(
        Arc::new(StaticHost::healthy(home.path())),
        Arc::new(FixedClock::at_rfc3339("2026-05-04T10:00:00Z").unwrap()),
        ManagerDefaults::default(),
        1024,
    );

    for interface in [InterfaceType::Cli, InterfaceType::Mobile] {
        let generated = factory.build(&SetupRequest::new(interface));
        let yaml = checksum::to_yaml(&generated.config).unwrap();
        let sum = &generated.config.metadata.checksum;
        assert!(checksum::verify(&yaml, sum));

        // flip one byte at a spread of offsets
        let bytes = yaml.as_bytes();
        for offset in (0..bytes.len()).step_by(bytes.len() / 17 + 1) {
            let mut mutated = bytes.to_vec();
            mutated[offset] = if mutated[offset] == b'x' { b'y' } else { b'x' };
            let Ok(text) = String::from_utf8(mutated) else {
                continue;
            };
            assert!(!checksum::verify(&text, sum), "mutation at {} verified", offset);
        }
    }
}
