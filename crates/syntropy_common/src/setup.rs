//! Setup state machine types.
//!
//! States advance strictly in order:
//! INIT → ENV_OK → CFG_BUILT → DIRS_MADE → KEY_WRITTEN → CFG_WRITTEN →
//! SERVICE_INSTALLED → FINAL_OK, or stop in FAILED naming the step.

use crate::setup_config::{InterfaceType, SetupConfig};
use crate::validation::EnvironmentInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetupOptions {
    /// Overwrite an existing setup after archiving it
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub install_service: bool,
    /// Write the owner key as encrypted PKCS#8
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default, skip_serializing)]
    pub passphrase: Option<String>,
}

/// A setup request after normalization at the HTTP edge
#[derive(Debug, Clone, PartialEq)]
pub struct SetupRequest {
    pub interface: InterfaceType,
    pub user_id: String,
    pub session_id: String,
    pub environment: EnvironmentInfo,
    pub options: SetupOptions,
}

impl SetupRequest {
    pub fn new(interface: InterfaceType) -> Self {
        Self {
            interface,
            user_id: String::new(),
            session_id: String::new(),
            environment: EnvironmentInfo::default(),
            options: SetupOptions::default(),
        }
    }
}

/// Named transitions of the setup state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupStep {
    ValidateEnvironment,
    GenerateConfig,
    CreateDirectories,
    GenerateOwnerKey,
    WriteConfigFile,
    InstallService,
    FinalValidate,
}

impl SetupStep {
    pub const ORDER: [SetupStep; 7] = [
        SetupStep::ValidateEnvironment,
        SetupStep::GenerateConfig,
        SetupStep::CreateDirectories,
        SetupStep::GenerateOwnerKey,
        SetupStep::WriteConfigFile,
        SetupStep::InstallService,
        SetupStep::FinalValidate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SetupStep::ValidateEnvironment => "validate_environment",
            SetupStep::GenerateConfig => "generate_config",
            SetupStep::CreateDirectories => "create_directories",
            SetupStep::GenerateOwnerKey => "generate_owner_key",
            SetupStep::WriteConfigFile => "write_config_file",
            SetupStep::InstallService => "install_service",
            SetupStep::FinalValidate => "final_validate",
        }
    }

    /// State reached when this step succeeds
    pub fn target_state(self) -> SetupState {
        match self {
            SetupStep::ValidateEnvironment => SetupState::EnvOk,
            SetupStep::GenerateConfig => SetupState::CfgBuilt,
            SetupStep::CreateDirectories => SetupState::DirsMade,
            SetupStep::GenerateOwnerKey => SetupState::KeyWritten,
            SetupStep::WriteConfigFile => SetupState::CfgWritten,
            SetupStep::InstallService => SetupState::ServiceInstalled,
            SetupStep::FinalValidate => SetupState::FinalOk,
        }
    }
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetupState {
    Init,
    EnvOk,
    CfgBuilt,
    DirsMade,
    KeyWritten,
    CfgWritten,
    ServiceInstalled,
    FinalOk,
    Failed,
}

/// What one transition did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: SetupStep,
    pub state: SetupState,
    pub success: bool,
    /// Skipped steps succeed without side effects
    #[serde(default)]
    pub skipped: bool,
    pub message: String,
    pub duration_ms: u64,
}

/// Failure detail for a setup run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupFailure {
    pub step: SetupStep,
    pub code: String,
    pub message: String,
}

/// Record of an installed OS service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstallation {
    /// `systemd`, `launchd` or `windows_service`
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_path: Option<String>,
}

/// Outcome of `execute_setup`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupResult {
    pub success: bool,
    pub state: SetupState,
    pub steps: Vec<StepOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<SetupFailure>,
    /// Config as far as it was built; present on partial failure too
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<SetupConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceInstallation>,
    /// Compensating actions taken after a failure
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rolled_back: Vec<String>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl SetupResult {
    pub fn failed_step(&self) -> Option<SetupStep> {
        self.failure.as_ref().map(|f| f.step)
    }
}
