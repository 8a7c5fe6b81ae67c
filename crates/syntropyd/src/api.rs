//! Wire types for the HTTP API and the error envelope.
//!
//! Request bodies carry loosely typed strings (interface names, sort
//! fields); they are normalized here, once, into the domain types.

use crate::autofix::FixReport;
use crate::backup::{RestoreOptions, RestoreReport};
use crate::setup::{HistoryEntry, ResetReport, SetupStatus};
use crate::templates::RenderedTemplate;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use syntropy_common::{
    ConfigBackup, EnvironmentInfo, InterfaceType, InvalidInterface, ProbeError, SetupConfig,
    SetupError, SetupOptions, SetupRequest, SetupResult, SortField, SortOrder, StoreError,
    SummaryPage, TemplateError, ValidationOptions, ValidationRequest, ValidationResult,
};
use tracing::{error, warn};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Internal {
        code: String,
        message: String,
        details: Option<serde_json::Value>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn bad_request(code: &str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(code: &str, message: impl Into<String>) -> Self {
        ApiError::NotFound {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn internal(code: &str, message: impl Into<String>) -> Self {
        ApiError::Internal {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            ApiError::BadRequest { code, .. }
            | ApiError::NotFound { code, .. }
            | ApiError::Conflict { code, .. }
            | ApiError::Internal { code, .. } => code,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message, details) = match self {
            ApiError::BadRequest { code, message }
            | ApiError::NotFound { code, message }
            | ApiError::Conflict { code, message } => (code, message, None),
            ApiError::Internal {
                code,
                message,
                details,
            } => (code, message, details),
        };
        if status.is_server_error() {
            error!("{} {}: {}", status.as_u16(), code, message);
        } else {
            warn!("{} {}: {}", status.as_u16(), code, message);
        }
        let body = ErrorBody {
            success: false,
            code,
            message,
            details,
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request("INVALID_REQUEST", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request("INVALID_QUERY", rejection.body_text())
    }
}

impl From<InvalidInterface> for ApiError {
    fn from(err: InvalidInterface) -> Self {
        ApiError::bad_request("INVALID_INTERFACE", err.to_string())
    }
}

impl From<ProbeError> for ApiError {
    fn from(err: ProbeError) -> Self {
        ApiError::Internal {
            code: "PROBE_FAILED".to_string(),
            details: Some(serde_json::json!({ "probe": err.probe() })),
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => {
                ApiError::not_found("BACKUP_NOT_FOUND", format!("backup '{}' not found", id))
            }
            StoreError::Duplicate(id) => ApiError::Conflict {
                code: "BACKUP_EXISTS".to_string(),
                message: format!("backup '{}' already exists", id),
            },
            StoreError::Corrupt { .. } => ApiError::internal("BACKUP_CORRUPT", err.to_string()),
            StoreError::InvalidTarget { .. } => {
                ApiError::bad_request("INVALID_RESTORE_TARGET", err.to_string())
            }
            other => ApiError::internal("BACKUP_STORE_ERROR", other.to_string()),
        }
    }
}

impl From<TemplateError> for ApiError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::NotFound(_) => ApiError::not_found("TEMPLATE_NOT_FOUND", err.to_string()),
            TemplateError::MissingParameter(_) => {
                ApiError::bad_request("MISSING_PARAMETER", err.to_string())
            }
        }
    }
}

impl From<SetupError> for ApiError {
    fn from(err: SetupError) -> Self {
        match err {
            SetupError::SetupExists { .. } => ApiError::Conflict {
                code: err.code().to_string(),
                message: err.to_string(),
            },
            _ => ApiError::internal(err.code(), err.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal("INTERNAL_ERROR", format!("{:#}", err))
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Parse a required interface name
pub fn parse_interface(raw: &str) -> Result<InterfaceType, ApiError> {
    if raw.trim().is_empty() {
        return Err(ApiError::bad_request("MISSING_PARAMETER", "interface is required"));
    }
    Ok(raw.parse::<InterfaceType>()?)
}

/// Parse an optional interface name; empty means "any"
pub fn parse_optional_interface(raw: Option<&str>) -> Result<Option<InterfaceType>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Ok(Some(s.parse::<InterfaceType>()?)),
        None => Ok(None),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidationRequestBody {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub interface: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub environment: EnvironmentInfo,
    #[serde(default)]
    pub options: ValidationOptions,
}

impl ValidationRequestBody {
    pub fn into_request(self) -> Result<ValidationRequest, ApiError> {
        let mut req = ValidationRequest::new(parse_interface(&self.interface)?);
        if !self.kind.is_empty() {
            req.kind = self.kind;
        }
        req.user_id = self.user_id;
        req.session_id = self.session_id;
        req.environment = self.environment;
        req.options = self.options;
        Ok(req)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigRequestBody {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub interface: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub environment: EnvironmentInfo,
    #[serde(default)]
    pub config: Option<SetupConfig>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub options: SetupOptions,
}

impl ConfigRequestBody {
    pub fn interface(&self) -> Result<InterfaceType, ApiError> {
        parse_interface(&self.interface)
    }

    pub fn setup_request(&self) -> Result<SetupRequest, ApiError> {
        let mut req = SetupRequest::new(self.interface()?);
        req.user_id = self.user_id.clone();
        req.session_id = self.session_id.clone();
        req.environment = self.environment.clone();
        req.options = self.options.clone();
        Ok(req)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetupRequestBody {
    #[serde(default)]
    pub interface: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub environment: EnvironmentInfo,
    #[serde(default)]
    pub options: SetupOptions,
}

impl SetupRequestBody {
    pub fn into_request(self) -> Result<SetupRequest, ApiError> {
        let mut req = SetupRequest::new(parse_interface(&self.interface)?);
        req.user_id = self.user_id;
        req.session_id = self.session_id;
        req.environment = self.environment;
        req.options = self.options;
        Ok(req)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigRestoreRequest {
    #[serde(default)]
    pub backup_id: String,
    #[serde(default)]
    pub options: RestoreOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub interface: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub sort_field: Option<String>,
    pub sort_order: Option<String>,
}

impl ListQuery {
    pub fn filter(&self) -> Result<syntropy_common::BackupFilter, ApiError> {
        Ok(syntropy_common::BackupFilter {
            interface: parse_optional_interface(self.interface.as_deref())?,
            user_id: non_empty(self.user_id.clone()),
            session_id: non_empty(self.session_id.clone()),
        })
    }

    pub fn sort(&self) -> Result<syntropy_common::Sort, ApiError> {
        let field = match self.sort_field.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(s) => SortField::parse(s).ok_or_else(|| {
                ApiError::bad_request("INVALID_SORT_FIELD", format!("unknown sort field '{}'", s))
            })?,
            None => SortField::default(),
        };
        let order = match self.sort_order.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(s) => SortOrder::parse(s).ok_or_else(|| {
                ApiError::bad_request("INVALID_SORT_ORDER", format!("unknown sort order '{}'", s))
            })?,
            None => SortOrder::default(),
        };
        Ok(syntropy_common::Sort { field, order })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateQuery {
    pub interface: Option<String>,
    pub environment: Option<String>,
    pub template: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusQuery {
    pub interface: Option<String>,
    pub user_id: Option<String>,
    pub home_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub interface: Option<String>,
    pub user_id: Option<String>,
    pub limit: Option<usize>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub success: bool,
    pub result: ValidationResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixes: Option<FixReport>,
    pub timestamp: DateTime<Utc>,
}

impl ValidationResponse {
    pub fn new(result: ValidationResult) -> Self {
        Self {
            success: true,
            timestamp: result.timestamp,
            result,
            fixes: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigMetadataResponse {
    pub interface: InterfaceType,
    pub checksum: String,
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub owner_key_path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub success: bool,
    pub config: SetupConfig,
    pub metadata: ConfigMetadataResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackupResponse {
    pub success: bool,
    pub backup: ConfigBackup,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigRestoreResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: RestoreReport,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigListResponse {
    pub success: bool,
    #[serde(flatten)]
    pub page: SummaryPage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TemplateResponse {
    pub success: bool,
    pub template: RenderedTemplate,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetupResponse {
    pub success: bool,
    pub result: SetupResult,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    pub status: SetupStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub success: bool,
    pub reset: ResetReport,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub history: Vec<HistoryEntry>,
}
