//! HTTP server for syntropyd

use crate::aggregator::ValidationEngine;
use crate::backup::{BackupManager, BackupStore, FileBackupStore};
use crate::command::{CommandRunner, SystemCommandRunner};
use crate::config::Config;
use crate::factory::ConfigFactory;
use crate::host::{HostInspector, SystemHost};
use crate::probes::EnvironmentProbe;
use crate::routes;
use crate::setup::{OsServiceInstaller, ServiceInstaller, SetupHistory, SetupOrchestrator};
use crate::templates::TemplateProvider;
use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use std::time::{Duration, Instant};
use syntropy_common::{Clock, SystemClock};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The replaceable edges of the daemon. Tests hand in fakes.
pub struct Seams {
    pub host: Arc<dyn HostInspector>,
    pub runner: Arc<dyn CommandRunner>,
    pub clock: Arc<dyn Clock>,
    pub installer: Arc<dyn ServiceInstaller>,
    pub store: Arc<dyn BackupStore>,
}

impl Seams {
    /// Live host, processes, clock, OS services and on-disk backups
    pub fn live(config: &Config) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
        let installer = match std::env::current_exe() {
            Ok(exe) => OsServiceInstaller::new(runner.clone()).with_binary(exe.to_string_lossy()),
            Err(_) => OsServiceInstaller::new(runner.clone()),
        };
        Self {
            host: Arc::new(SystemHost::new(config.validation.connectivity_target.clone())),
            runner,
            clock: Arc::new(SystemClock),
            installer: Arc::new(installer),
            store: Arc::new(
                FileBackupStore::new(config.backups_dir()).with_compression(config.compress_backups),
            ),
        }
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub engine: Arc<ValidationEngine>,
    pub runner: Arc<dyn CommandRunner>,
    pub factory: Arc<ConfigFactory>,
    pub orchestrator: Arc<SetupOrchestrator>,
    pub backups: Arc<BackupManager>,
    pub templates: Arc<TemplateProvider>,
    pub history: Arc<SetupHistory>,
    pub clock: Arc<dyn Clock>,
    pub http_timeout: Duration,
    pub max_body_bytes: usize,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self::with_seams(config, Seams::live(config))
    }

    pub fn with_seams(config: &Config, seams: Seams) -> Self {
        let Seams {
            host,
            runner,
            clock,
            installer,
            store,
        } = seams;

        let engine = ValidationEngine::standard(host.clone(), runner.clone(), clock.clone(), &config.validation);
        let factory = Arc::new(ConfigFactory::new(
            host.clone(),
            clock.clone(),
            config.manager.clone(),
            config.validation.key_bits,
        ));
        let backups = Arc::new(BackupManager::new(store, clock.clone()));
        let orchestrator = SetupOrchestrator::new(
            factory.clone(),
            Arc::new(EnvironmentProbe::new(host)),
            backups.clone(),
            installer,
            config.validation.default_timeout(),
        );

        Self {
            engine: Arc::new(engine),
            runner,
            factory,
            orchestrator: Arc::new(orchestrator),
            backups,
            templates: Arc::new(TemplateProvider::new(config.manager.clone())),
            history: Arc::new(SetupHistory::new(config.history_path())),
            clock,
            http_timeout: Duration::from_secs(config.http.request_timeout_s),
            max_body_bytes: config.http.max_body_bytes,
            start_time: Instant::now(),
        }
    }
}

/// Every route with the tracing, timeout and body-size layers applied
pub fn router(state: AppState) -> Router {
    let timeout = state.http_timeout;
    let max_body = state.max_body_bytes;
    let state = Arc::new(state);

    Router::new()
        .merge(routes::validation_routes())
        .merge(routes::config_routes())
        .merge(routes::setup_routes())
        .merge(routes::health_routes())
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server
pub async fn run(config: &Config, state: AppState) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    info!("Listening on http://{}", config.listen_addr);

    axum::serve(listener, app).await.context("serving HTTP")?;
    Ok(())
}
