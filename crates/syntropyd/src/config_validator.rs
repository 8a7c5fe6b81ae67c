//! Structural checks over a [`SetupConfig`].
//!
//! Used by `POST /config/validate` and by the orchestrator before anything
//! is written to disk.

use chrono::{DateTime, Utc};
use pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use std::path::Path;
use syntropy_common::layout::is_strictly_under;
use syntropy_common::{
    checksum, AutoFix, Category, Risk, Severity, SetupConfig, ValidationItem, ValidationResult,
};

pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const PUBLIC_KEY_HEADER: &str = "-----BEGIN PUBLIC KEY-----";

/// Validate `config`; `None` is reported as `NULL_CONFIG`
pub fn validate(config: Option<&SetupConfig>, now: DateTime<Utc>) -> ValidationResult {
    let started = std::time::Instant::now();
    let mut result = ValidationResult::empty(now);
    match config {
        Some(config) => check(config, &mut result),
        None => result.push(ValidationItem::error(
            "NULL_CONFIG",
            "No configuration was provided",
            Category::Configuration,
        )),
    }
    result.seal();
    result.duration_ms = started.elapsed().as_millis() as u64;
    result
}

fn check(config: &SetupConfig, result: &mut ValidationResult) {
    let manager = &config.manager;
    let home = Path::new(&manager.home_dir);

    if manager.home_dir.trim().is_empty() {
        result.push(
            ValidationItem::error("MISSING_HOME_DIR", "manager.home_dir is empty", Category::Configuration)
                .with_field("manager.home_dir"),
        );
    } else {
        if !is_strictly_under(Path::new(&manager.default_paths.manager_config), home) {
            result.push(
                ValidationItem::error(
                    "CONFIG_PATH_OUTSIDE_HOME",
                    format!(
                        "Manager config path {} is not inside {}",
                        manager.default_paths.manager_config, manager.home_dir
                    ),
                    Category::Configuration,
                )
                .with_field("manager.default_paths.manager_config")
                .with_expected(format!("{}/...", manager.home_dir))
                .with_actual(&manager.default_paths.manager_config),
            );
        }
        for (name, path) in manager.directories.entries() {
            if !is_strictly_under(Path::new(path), home) {
                result.push(
                    ValidationItem::error(
                        "DIRECTORY_OUTSIDE_HOME",
                        format!("Directory '{}' ({}) is not inside {}", name, path, manager.home_dir),
                        Category::Storage,
                    )
                    .with_field(format!("manager.directories.{}", name))
                    .with_actual(path),
                );
            }
        }
    }

    let pem = config.owner_key.public_key_pem.trim();
    if pem.contains("PRIVATE KEY") {
        result.push(
            ValidationItem::new(
                "PRIVATE_KEY_EXPOSED",
                "owner_key.public_key contains private key material",
                Severity::Critical,
                Category::Security,
            )
            .with_field("owner_key.public_key")
            .with_fix(AutoFix::manual(
                "Remove the private key from the config and generate a new owner key",
                Risk::High,
            )),
        );
    } else if pem.is_empty() {
        result.push(
            ValidationItem::error(
                "MISSING_OWNER_KEY",
                "The config carries no owner public key",
                Category::Security,
            )
            .with_field("owner_key.public_key"),
        );
    } else if !pem.starts_with(PUBLIC_KEY_HEADER) || RsaPublicKey::from_public_key_pem(pem).is_err() {
        result.push(
            ValidationItem::error(
                "INVALID_PUBLIC_KEY",
                "owner_key.public_key is not a valid RSA PUBLIC KEY PEM block",
                Category::Security,
            )
            .with_field("owner_key.public_key")
            .with_expected(PUBLIC_KEY_HEADER),
        );
    }

    if config.metadata.checksum.is_empty() {
        result.push(
            ValidationItem::warning(
                "MISSING_CHECKSUM",
                "metadata.checksum is empty; integrity cannot be verified",
                Category::Configuration,
            )
            .with_field("metadata.checksum"),
        );
    } else if !checksum::is_sealed(config) {
        let actual = checksum::compute(config).unwrap_or_default();
        result.push(
            ValidationItem::error(
                "CHECKSUM_MISMATCH",
                "metadata.checksum does not match the config content",
                Category::Configuration,
            )
            .with_field("metadata.checksum")
            .with_expected(actual)
            .with_actual(&config.metadata.checksum),
        );
    }

    if !LOG_LEVELS.contains(&manager.log_level.to_ascii_lowercase().as_str()) {
        result.push(
            ValidationItem::warning(
                "UNKNOWN_LOG_LEVEL",
                format!("Log level '{}' is not recognised", manager.log_level),
                Category::Configuration,
            )
            .with_field("manager.log_level")
            .with_expected(LOG_LEVELS.join(", "))
            .with_actual(&manager.log_level),
        );
    }
}
