//! API routes for syntropyd

use crate::api::{
    parse_interface, ApiError, ApiResult, BackupResponse, ConfigListResponse,
    ConfigMetadataResponse, ConfigRequestBody, ConfigResponse, ConfigRestoreRequest,
    ConfigRestoreResponse, HistoryQuery, HistoryResponse, ListQuery, ResetResponse,
    SetupRequestBody, SetupResponse, StatusQuery, StatusResponse, TemplateQuery,
    TemplateResponse, ValidationRequestBody, ValidationResponse,
};
use crate::autofix;
use crate::backup::BackupRequest;
use crate::config_validator;
use crate::probes::ProbeKind;
use crate::server::AppState;
use crate::setup::{resolve_layout, HistoryAction, HistoryEntry, DEFAULT_HISTORY_LIMIT};
use crate::templates::TemplateParams;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::fs;
use std::sync::Arc;
use std::time::Instant;
use syntropy_common::layout::display;
use syntropy_common::{
    Category, EnvironmentInfo, InterfaceType, Pagination, SetupConfig, SetupError, SetupRequest,
    ValidationItem, ValidationRequest,
};
use tracing::{info, warn};

type AppStateArc = Arc<AppState>;

fn done(endpoint: &str, interface: Option<InterfaceType>, user_id: &str, started: Instant) {
    let interface = interface.map(|i| i.to_string()).unwrap_or_default();
    info!(
        endpoint,
        interface = %interface,
        user_id,
        duration_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );
}

fn aborted(e: tokio::task::JoinError) -> ApiError {
    ApiError::internal("TASK_ABORTED", e.to_string())
}

fn required(value: Option<&str>, name: &str) -> Result<String, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => Ok(v.to_string()),
        None => Err(ApiError::bad_request(
            "MISSING_PARAMETER",
            format!("{} is required", name),
        )),
    }
}

// ============================================================================
// Validation Routes
// ============================================================================

pub fn validation_routes() -> Router<AppStateArc> {
    Router::new().route("/api/v1/validation/:kind", post(validate))
}

async fn validate(
    State(state): State<AppStateArc>,
    Path(kind): Path<String>,
    body: Result<Json<ValidationRequestBody>, JsonRejection>,
) -> ApiResult<ValidationResponse> {
    let started = Instant::now();
    let Json(body) = body?;
    let req = body.into_request()?;

    let response = match kind.as_str() {
        "all" => ValidationResponse::new(state.engine.validate_all(&req).await?),
        "autofix" => {
            let (result, fixes) = autofix::run(&state.engine, state.runner.clone(), &req).await?;
            ValidationResponse {
                fixes: Some(fixes),
                ..ValidationResponse::new(result)
            }
        }
        other => {
            let probe = ProbeKind::parse(other).ok_or_else(|| {
                ApiError::not_found("UNKNOWN_VALIDATION", format!("no validation named '{}'", other))
            })?;
            ValidationResponse::new(state.engine.validate_one(probe, &req).await?)
        }
    };

    done(&format!("validation/{}", kind), Some(req.interface), &req.user_id, started);
    Ok(Json(response))
}

// ============================================================================
// Config Routes
// ============================================================================

pub fn config_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/v1/config/generate", post(generate_config))
        .route("/api/v1/config/validate", post(validate_config))
        .route("/api/v1/config/backup", post(backup_config))
        .route("/api/v1/config/restore", post(restore_config))
        .route("/api/v1/config/list", get(list_configs))
        .route("/api/v1/config/template", get(get_template))
}

async fn generate_config(
    State(state): State<AppStateArc>,
    body: Result<Json<ConfigRequestBody>, JsonRejection>,
) -> ApiResult<ConfigResponse> {
    let started = Instant::now();
    let Json(body) = body?;
    let req = body.setup_request()?;

    let factory = state.factory.clone();
    let blocking_req = req.clone();
    let generated = tokio::task::spawn_blocking(move || factory.build(&blocking_req))
        .await
        .map_err(aborted)?;
    if generated.secret.is_none() {
        return Err(ApiError::internal(
            "KEY_GENERATION_FAILED",
            "owner key pair could not be generated",
        ));
    }

    let config = generated.config;
    let metadata = ConfigMetadataResponse {
        interface: config.interface.kind,
        checksum: config.metadata.checksum.clone(),
        version: config.metadata.version.clone(),
        generated_at: config.metadata.created_at.unwrap_or_else(|| state.clock.now()),
        owner_key_path: config.owner_key.path.clone(),
    };

    done("config/generate", Some(req.interface), &req.user_id, started);
    Ok(Json(ConfigResponse {
        success: true,
        config,
        metadata,
    }))
}

async fn validate_config(
    State(state): State<AppStateArc>,
    body: Result<Json<ConfigRequestBody>, JsonRejection>,
) -> ApiResult<ValidationResponse> {
    let started = Instant::now();
    let Json(body) = body?;
    let interface = crate::api::parse_optional_interface(Some(body.interface.as_str()))?;

    let result = config_validator::validate(body.config.as_ref(), state.clock.now());

    done("config/validate", interface, &body.user_id, started);
    Ok(Json(ValidationResponse::new(result)))
}

/// The manager config installed under the request's home, if any
fn installed_config(state: &AppState, env: &EnvironmentInfo) -> Result<Option<SetupConfig>, ApiError> {
    let layout = state.factory.layout(env);
    if !layout.is_installed() {
        return Ok(None);
    }
    let text = fs::read_to_string(&layout.manager_config).map_err(|e| {
        ApiError::internal("CONFIG_UNREADABLE", format!("{}: {}", display(&layout.manager_config), e))
    })?;
    serde_yaml::from_str(&text)
        .map(Some)
        .map_err(|e| ApiError::internal("CONFIG_UNREADABLE", e.to_string()))
}

async fn backup_config(
    State(state): State<AppStateArc>,
    body: Result<Json<ConfigRequestBody>, JsonRejection>,
) -> ApiResult<BackupResponse> {
    let started = Instant::now();
    let Json(mut body) = body?;
    let interface = body.interface()?;

    let config = match body.config.take() {
        Some(config) => config,
        None => installed_config(&state, &body.environment)?.ok_or_else(|| {
            ApiError::bad_request(
                "MISSING_CONFIG",
                "no config in the request and none installed to back up",
            )
        })?,
    };

    let mut request = BackupRequest::new(config, interface).for_user(&body.user_id, &body.session_id);
    if let Some(name) = body.name.take().filter(|n| !n.trim().is_empty()) {
        request = request.named(name);
    }
    if let Some(description) = body.description.take() {
        request = request.described(description);
    }

    let backups = state.backups.clone();
    let backup = tokio::task::spawn_blocking(move || backups.create(request))
        .await
        .map_err(aborted)??;
    info!("Created backup {} ({} bytes)", backup.id, backup.size_bytes);

    done("config/backup", Some(interface), &body.user_id, started);
    Ok(Json(BackupResponse {
        success: true,
        backup,
    }))
}

async fn restore_config(
    State(state): State<AppStateArc>,
    body: Result<Json<ConfigRestoreRequest>, JsonRejection>,
) -> ApiResult<ConfigRestoreResponse> {
    let started = Instant::now();
    let Json(body) = body?;
    let backup_id = required(Some(body.backup_id.as_str()), "backup_id")?;

    let backups = state.backups.clone();
    let options = body.options;
    let report = tokio::task::spawn_blocking(move || backups.restore(&backup_id, &options))
        .await
        .map_err(aborted)??;
    for w in &report.warnings {
        warn!("Restore of {}: {}", report.backup_id, w);
    }

    done("config/restore", Some(report.config.interface.kind), "", started);
    Ok(Json(ConfigRestoreResponse {
        success: true,
        report,
    }))
}

async fn list_configs(
    State(state): State<AppStateArc>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<ConfigListResponse> {
    let started = Instant::now();
    let Query(query) = query?;
    let filter = query.filter()?;
    let sort = query.sort()?;
    let pagination = Pagination::new(query.page, query.page_size);

    let page = state.backups.list(&filter, pagination, sort)?;

    done(
        "config/list",
        filter.interface,
        filter.user_id.as_deref().unwrap_or_default(),
        started,
    );
    Ok(Json(ConfigListResponse {
        success: true,
        page,
    }))
}

async fn get_template(
    State(state): State<AppStateArc>,
    query: Result<Query<TemplateQuery>, QueryRejection>,
) -> ApiResult<TemplateResponse> {
    let started = Instant::now();
    let Query(query) = query?;
    let interface = parse_interface(query.interface.as_deref().unwrap_or_default())?;
    let environment = required(query.environment.as_deref(), "environment")?;

    let home_dir = display(&state.factory.layout(&EnvironmentInfo::default()).root);
    let params = TemplateParams {
        interface,
        environment,
        home_dir,
    };
    let template = state.templates.render(query.template.as_deref(), &params)?;

    done("config/template", Some(interface), "", started);
    Ok(Json(TemplateResponse {
        success: true,
        template,
    }))
}

// ============================================================================
// Setup Routes
// ============================================================================

pub fn setup_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/v1/setup/execute", post(execute_setup))
        .route("/api/v1/setup/validate", post(validate_setup))
        .route("/api/v1/setup/status", get(setup_status))
        .route("/api/v1/setup/reset", post(reset_setup))
        .route("/api/v1/setup/history", get(setup_history))
}

fn record(state: &AppState, entry: &HistoryEntry) {
    if let Err(e) = state.history.record(entry) {
        warn!("Setup history not recorded: {:#}", e);
    }
}

async fn execute_setup(
    State(state): State<AppStateArc>,
    body: Result<Json<SetupRequestBody>, JsonRejection>,
) -> ApiResult<SetupResponse> {
    let started = Instant::now();
    let Json(body) = body?;
    let req = body.into_request()?;
    let layout = state.orchestrator.layout_for(&req);

    let orchestrator = state.orchestrator.clone();
    let blocking_req = req.clone();
    let outcome = tokio::task::spawn_blocking(move || orchestrator.execute(&blocking_req))
        .await
        .map_err(aborted)?;

    let result = match outcome {
        Ok(result) => result,
        Err(e @ SetupError::SetupExists { .. }) => return Err(e.into()),
        Err(e) => {
            let mut entry = HistoryEntry::new(HistoryAction::Execute, req.interface, state.clock.now());
            entry.user_id = req.user_id.clone();
            entry.session_id = req.session_id.clone();
            entry.home_dir = display(&layout.root);
            entry.duration_ms = started.elapsed().as_millis() as u64;
            record(&state, &entry);
            return Err(e.into());
        }
    };

    let mut entry = HistoryEntry::new(HistoryAction::Execute, req.interface, result.timestamp);
    entry.user_id = req.user_id.clone();
    entry.session_id = req.session_id.clone();
    entry.success = result.success;
    entry.failed_step = result.failed_step();
    entry.home_dir = display(&layout.root);
    entry.duration_ms = result.duration_ms;
    record(&state, &entry);

    done("setup/execute", Some(req.interface), &req.user_id, started);
    if let Some(failure) = &result.failure {
        return Err(ApiError::Internal {
            code: failure.code.clone(),
            message: format!("setup failed at {}: {}", failure.step, failure.message),
            details: serde_json::to_value(&result).ok(),
        });
    }
    Ok(Json(SetupResponse {
        success: true,
        result,
    }))
}

/// Validation request carrying the same identity and environment
fn validation_for(req: &SetupRequest) -> ValidationRequest {
    let mut vreq = ValidationRequest::new(req.interface);
    vreq.kind = "setup".to_string();
    vreq.user_id = req.user_id.clone();
    vreq.session_id = req.session_id.clone();
    vreq.environment = req.environment.clone();
    vreq
}

async fn validate_setup(
    State(state): State<AppStateArc>,
    body: Result<Json<SetupRequestBody>, JsonRejection>,
) -> ApiResult<ValidationResponse> {
    let started = Instant::now();
    let Json(body) = body?;
    let req = body.into_request()?;

    let mut result = state.engine.validate_all(&validation_for(&req)).await?;
    let layout = state.orchestrator.layout_for(&req);
    if layout.is_installed() {
        let message = format!("a setup already exists at {}", display(&layout.manager_config));
        let item = if req.options.force {
            ValidationItem::warning(
                "SETUP_EXISTS",
                format!("{}; it will be archived and replaced", message),
                Category::Configuration,
            )
        } else {
            ValidationItem::error(
                "SETUP_EXISTS",
                format!("{}; pass force=true to overwrite it", message),
                Category::Configuration,
            )
        };
        result.push(item.with_field("options.force"));
        result.seal();
    }

    done("setup/validate", Some(req.interface), &req.user_id, started);
    Ok(Json(ValidationResponse::new(result)))
}

async fn setup_status(
    State(state): State<AppStateArc>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> ApiResult<StatusResponse> {
    let started = Instant::now();
    let Query(query) = query?;
    let interface = parse_interface(query.interface.as_deref().unwrap_or_default())?;
    let user_id = query.user_id.unwrap_or_default();
    let env = EnvironmentInfo {
        home_dir: query.home_dir.unwrap_or_default(),
        ..Default::default()
    };

    let layout = resolve_layout(&state.factory, &state.history, interface, Some(&user_id), &env);
    let status = state.orchestrator.status(&layout).ok_or_else(|| {
        ApiError::not_found(
            "SETUP_NOT_FOUND",
            format!("no setup found at {}", display(&layout.root)),
        )
    })?;

    done("setup/status", Some(interface), &user_id, started);
    Ok(Json(StatusResponse {
        success: true,
        status,
    }))
}

async fn reset_setup(
    State(state): State<AppStateArc>,
    body: Result<Json<SetupRequestBody>, JsonRejection>,
) -> ApiResult<ResetResponse> {
    let started = Instant::now();
    let Json(body) = body?;
    let req = body.into_request()?;
    let layout = resolve_layout(
        &state.factory,
        &state.history,
        req.interface,
        Some(&req.user_id),
        &req.environment,
    );

    let orchestrator = state.orchestrator.clone();
    let (interface, user_id, session_id) = (req.interface, req.user_id.clone(), req.session_id.clone());
    let blocking_layout = layout.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        orchestrator.reset(&blocking_layout, interface, &user_id, &session_id)
    })
    .await
    .map_err(aborted)?;

    let mut entry = HistoryEntry::new(HistoryAction::Reset, req.interface, state.clock.now());
    entry.user_id = req.user_id.clone();
    entry.session_id = req.session_id.clone();
    entry.success = outcome.is_ok();
    entry.home_dir = display(&layout.root);
    entry.duration_ms = started.elapsed().as_millis() as u64;
    record(&state, &entry);

    let reset = outcome?;
    done("setup/reset", Some(req.interface), &req.user_id, started);
    Ok(Json(ResetResponse {
        success: true,
        reset,
    }))
}

async fn setup_history(
    State(state): State<AppStateArc>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<HistoryResponse> {
    let started = Instant::now();
    let Query(query) = query?;
    let interface = parse_interface(query.interface.as_deref().unwrap_or_default())?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);

    let history = state
        .history
        .list(interface, query.user_id.as_deref(), limit)?;

    done(
        "setup/history",
        Some(interface),
        query.user_id.as_deref().unwrap_or_default(),
        started,
    );
    Ok(Json(HistoryResponse {
        success: true,
        history,
    }))
}

// ============================================================================
// Health Routes
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/api/v1/health", get(health_check))
}

async fn health_check(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}
