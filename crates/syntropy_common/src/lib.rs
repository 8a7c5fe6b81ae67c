//! Shared domain model for the Syntropy node bootstrap service.

pub mod backup;
pub mod checksum;
pub mod clock;
pub mod error;
pub mod layout;
pub mod setup;
pub mod setup_config;
pub mod validation;
pub mod version;

pub use backup::{
    apply_query, BackupFilter, BackupMetadata, ConfigBackup, ConfigSummary, Pagination, Sort,
    SortField, SortOrder, SummaryPage,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ChecksumError, ProbeError, SetupError, StoreError, TemplateError};
pub use layout::SetupLayout;
pub use setup::{
    ServiceInstallation, SetupFailure, SetupOptions, SetupRequest, SetupResult, SetupState,
    SetupStep, StepOutcome,
};
pub use setup_config::{InterfaceType, InvalidInterface, SetupConfig};
pub use validation::{
    AutoFix, Category, EnvironmentInfo, Risk, Severity, ValidationItem, ValidationOptions,
    ValidationRequest, ValidationResult,
};
