//! Setup execution, status, reset and history.

pub mod history;
pub mod orchestrator;
pub mod service;
pub mod status;

pub use history::{HistoryAction, HistoryEntry, SetupHistory, DEFAULT_HISTORY_LIMIT};
pub use orchestrator::SetupOrchestrator;
pub use service::{OsServiceInstaller, RecordingInstaller, ServiceError, ServiceInstaller};
pub use status::{InstallState, ResetReport, SetupStatus};

use crate::factory::ConfigFactory;
use std::path::PathBuf;
use syntropy_common::{EnvironmentInfo, InterfaceType, SetupLayout};
use tracing::warn;

/// Layout a status or reset call refers to.
///
/// An explicit `home_dir` wins, then the home of the newest successful setup
/// recorded for (interface, user), then the host user's home.
pub fn resolve_layout(
    factory: &ConfigFactory,
    history: &SetupHistory,
    interface: InterfaceType,
    user_id: Option<&str>,
    env: &EnvironmentInfo,
) -> SetupLayout {
    if !env.home_dir.trim().is_empty() {
        return factory.layout(env);
    }
    match history.latest_success(interface, user_id) {
        Ok(Some(entry)) if !entry.home_dir.is_empty() => {
            // history stores the .syntropy root; the layout wants its parent
            let root = PathBuf::from(&entry.home_dir);
            match root.parent() {
                Some(home) => SetupLayout::under(home),
                None => factory.layout(env),
            }
        }
        Ok(_) => factory.layout(env),
        Err(e) => {
            warn!("Setup history unreadable, using host home: {:#}", e);
            factory.layout(env)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerDefaults;
    use crate::host::StaticHost;
    use chrono::Utc;
    use std::sync::Arc;
    use syntropy_common::layout::display;
    use syntropy_common::FixedClock;

    #[test]
    fn test_resolve_prefers_request_then_history_then_host() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ConfigFactory::new(
            Arc::new(StaticHost::healthy("/home/host")),
            Arc::new(FixedClock(Utc::now())),
            ManagerDefaults::default(),
            1024,
        );
        let history = SetupHistory::new(dir.path().join("h.jsonl"));
        let mut env = EnvironmentInfo::default();

        let host = resolve_layout(&factory, &history, InterfaceType::Cli, Some("u"), &env);
        assert_eq!(display(&host.root), "/home/host/.syntropy");

        let mut entry = HistoryEntry::new(HistoryAction::Execute, InterfaceType::Cli, Utc::now());
        entry.user_id = "u".to_string();
        entry.success = true;
        entry.home_dir = "/srv/node/.syntropy".to_string();
        history.record(&entry).unwrap();

        let recorded = resolve_layout(&factory, &history, InterfaceType::Cli, Some("u"), &env);
        assert_eq!(display(&recorded.manager_config), "/srv/node/.syntropy/config/manager.yaml");

        env.home_dir = "/home/explicit".to_string();
        let explicit = resolve_layout(&factory, &history, InterfaceType::Cli, Some("u"), &env);
        assert_eq!(display(&explicit.root), "/home/explicit/.syntropy");
    }
}
