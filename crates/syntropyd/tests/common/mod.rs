//! In-process daemon wired to fake seams.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use syntropy_common::FixedClock;
use syntropyd::backup::MemoryBackupStore;
use syntropyd::command::ScriptedRunner;
use syntropyd::config::Config;
use syntropyd::host::StaticHost;
use syntropyd::server::{self, AppState, Seams};
use syntropyd::setup::RecordingInstaller;
use tempfile::TempDir;
use tower::ServiceExt;

pub const NOW: &str = "2026-05-04T10:00:00Z";

pub struct TestApp {
    pub app: Router,
    pub home: TempDir,
    pub state_dir: TempDir,
    pub installer: Arc<RecordingInstaller>,
    pub store: Arc<MemoryBackupStore>,
}

pub fn test_config(state_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.state_dir = state_dir.path().to_path_buf();
    config.validation.key_bits = 1024;
    config.validation.default_timeout_s = 30;
    config
}

pub fn test_app() -> TestApp {
    let home = tempfile::tempdir().unwrap();
    let state_dir = tempfile::tempdir().unwrap();
    let installer = Arc::new(RecordingInstaller::new());
    let store = Arc::new(MemoryBackupStore::new());

    let seams = Seams {
        host: Arc::new(StaticHost::healthy(home.path())),
        runner: Arc::new(ScriptedRunner::new()),
        clock: Arc::new(FixedClock::at_rfc3339(NOW).unwrap()),
        installer: installer.clone(),
        store: store.clone(),
    };
    let state = AppState::with_seams(&test_config(&state_dir), seams);

    TestApp {
        app: server::router(state),
        home,
        state_dir,
        installer,
        store,
    }
}

impl TestApp {
    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(v) => Body::from(v.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, json)
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, Some(body)).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send("GET", uri, None).await
    }
}
