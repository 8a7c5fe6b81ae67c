//! Append-only log of setup executions and resets.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use syntropy_common::{InterfaceType, SetupStep};
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Execute,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub action: HistoryAction,
    pub interface: InterfaceType,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<SetupStep>,
    pub home_dir: String,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(action: HistoryAction, interface: InterfaceType, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action,
            interface,
            user_id: String::new(),
            session_id: String::new(),
            success: false,
            failed_step: None,
            home_dir: String::new(),
            duration_ms: 0,
            timestamp,
        }
    }

    fn belongs_to(&self, interface: InterfaceType, user_id: Option<&str>) -> bool {
        self.interface == interface
            && user_id.map_or(true, |u| u.is_empty() || self.user_id == u)
    }
}

/// One JSON object per line at `<state_dir>/setup_history.jsonl`
pub struct SetupHistory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SetupHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, entry: &HistoryEntry) -> Result<()> {
        let line = serde_json::to_string(entry).context("Failed to serialize history entry")?;
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create history directory: {:?}", parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open history file: {:?}", self.path))?;

        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", line).context("Failed to write history entry")?;
        writer.flush().context("Failed to flush history file")?;
        writer
            .get_ref()
            .sync_all()
            .context("Failed to sync history file")?;

        debug!("Recorded {:?} for {} ({})", entry.action, entry.interface, entry.id);
        Ok(())
    }

    /// Every readable entry, oldest first
    pub fn load_all(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open history file: {:?}", self.path))?;

        let mut entries = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!("Skipping unreadable history line {}: {}", n + 1, e);
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping unparseable history line {}: {}", n + 1, e),
            }
        }
        Ok(entries)
    }

    /// Newest first, at most `limit`
    pub fn list(
        &self,
        interface: InterfaceType,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let mut entries: Vec<_> = self
            .load_all()?
            .into_iter()
            .filter(|e| e.belongs_to(interface, user_id))
            .collect();
        // file order breaks timestamp ties
        entries.reverse();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }

    /// Most recent successful execute for (interface, user)
    pub fn latest_success(
        &self,
        interface: InterfaceType,
        user_id: Option<&str>,
    ) -> Result<Option<HistoryEntry>> {
        Ok(self
            .list(interface, user_id, usize::MAX)?
            .into_iter()
            .find(|e| e.success && e.action == HistoryAction::Execute))
    }
}
