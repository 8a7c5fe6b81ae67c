//! Backup persistence.

use crate::fsutil::{self, PRIVATE_DIR_MODE, PRIVATE_FILE_MODE};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use syntropy_common::{
    apply_query, BackupFilter, ConfigBackup, Pagination, Sort, StoreError, SummaryPage,
};
use tracing::{debug, warn};

const JSON_EXT: &str = "json";
const GZIP_EXT: &str = "json.gz";

/// Where backups live. Implementations own their own locking.
pub trait BackupStore: Send + Sync {
    /// Store `backup` under its id; the id must not be taken
    fn put(&self, backup: ConfigBackup) -> Result<String, StoreError>;

    fn get(&self, id: &str) -> Result<ConfigBackup, StoreError>;

    fn list(
        &self,
        filter: &BackupFilter,
        pagination: Pagination,
        sort: Sort,
    ) -> Result<SummaryPage, StoreError>;

    fn contains(&self, id: &str) -> Result<bool, StoreError>;

    fn compresses(&self) -> bool {
        false
    }
}

/// Ids become file names, so keep them to a safe alphabet
fn check_id(id: &str) -> Result<(), StoreError> {
    let ok = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(StoreError::NotFound(id.to_string()))
    }
}

// ============================================================================
// File Store
// ============================================================================

/// One JSON document per backup under a directory, gzipped when enabled
pub struct FileBackupStore {
    dir: PathBuf,
    compress: bool,
    // serializes put() so the duplicate check and write don't race
    write_lock: Mutex<()>,
}

impl FileBackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            compress: false,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str, compressed: bool) -> PathBuf {
        let ext = if compressed { GZIP_EXT } else { JSON_EXT };
        self.dir.join(format!("{}.{}", id, ext))
    }

    /// Existing file for `id`, compressed first
    fn find(&self, id: &str) -> Option<(PathBuf, bool)> {
        [true, false]
            .into_iter()
            .map(|gz| (self.path_for(id, gz), gz))
            .find(|(path, _)| path.exists())
    }

    fn read_file(path: &Path, compressed: bool) -> Result<ConfigBackup, StoreError> {
        let raw = fs::read(path)?;
        let json = if compressed {
            let mut text = Vec::new();
            GzDecoder::new(raw.as_slice()).read_to_end(&mut text)?;
            text
        } else {
            raw
        };
        Ok(serde_json::from_slice(&json)?)
    }

    fn encode(&self, backup: &ConfigBackup) -> Result<Vec<u8>, StoreError> {
        let json = serde_json::to_vec_pretty(backup)?;
        if !self.compress {
            return Ok(json);
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        Ok(encoder.finish()?)
    }

    /// `(id, compressed)` for every backup file in the directory
    fn entries(&self) -> Result<Vec<(String, PathBuf, bool)>, StoreError> {
        let read = match fs::read_dir(&self.dir) {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for entry in read.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(id) = name.strip_suffix(".json.gz") {
                out.push((id.to_string(), path.clone(), true));
            } else if let Some(id) = name.strip_suffix(".json") {
                out.push((id.to_string(), path.clone(), false));
            }
        }
        Ok(out)
    }
}

impl BackupStore for FileBackupStore {
    fn put(&self, mut backup: ConfigBackup) -> Result<String, StoreError> {
        check_id(&backup.id)?;
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.find(&backup.id).is_some() {
            return Err(StoreError::Duplicate(backup.id));
        }
        fsutil::ensure_dir(&self.dir, PRIVATE_DIR_MODE)?;

        backup.compressed = self.compress;
        let bytes = self.encode(&backup)?;
        let path = self.path_for(&backup.id, self.compress);
        fsutil::atomic_write(&path, &bytes, PRIVATE_FILE_MODE)?;
        debug!("Stored backup {} ({} bytes on disk)", backup.id, bytes.len());
        Ok(backup.id)
    }

    fn get(&self, id: &str) -> Result<ConfigBackup, StoreError> {
        check_id(id)?;
        let (path, compressed) = self
            .find(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Self::read_file(&path, compressed).map_err(|e| match e {
            StoreError::Io(_) | StoreError::Json(_) => StoreError::Corrupt {
                id: id.to_string(),
                reason: e.to_string(),
            },
            other => other,
        })
    }

    fn list(
        &self,
        filter: &BackupFilter,
        pagination: Pagination,
        sort: Sort,
    ) -> Result<SummaryPage, StoreError> {
        let mut rows = Vec::new();
        for (id, path, compressed) in self.entries()? {
            match Self::read_file(&path, compressed) {
                Ok(backup) => rows.push(backup.summary()),
                Err(e) => warn!("Skipping unreadable backup {}: {}", id, e),
            }
        }
        Ok(apply_query(rows, filter, pagination, sort))
    }

    fn contains(&self, id: &str) -> Result<bool, StoreError> {
        Ok(check_id(id).is_ok() && self.find(id).is_some())
    }

    fn compresses(&self) -> bool {
        self.compress
    }
}

// ============================================================================
// Memory Store
// ============================================================================

#[derive(Default)]
pub struct MemoryBackupStore {
    backups: Mutex<BTreeMap<String, ConfigBackup>>,
}

impl MemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ConfigBackup>> {
        self.backups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BackupStore for MemoryBackupStore {
    fn put(&self, backup: ConfigBackup) -> Result<String, StoreError> {
        check_id(&backup.id)?;
        let mut backups = self.lock();
        if backups.contains_key(&backup.id) {
            return Err(StoreError::Duplicate(backup.id));
        }
        let id = backup.id.clone();
        backups.insert(id.clone(), backup);
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<ConfigBackup, StoreError> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn list(
        &self,
        filter: &BackupFilter,
        pagination: Pagination,
        sort: Sort,
    ) -> Result<SummaryPage, StoreError> {
        let rows = self.lock().values().map(ConfigBackup::summary).collect();
        Ok(apply_query(rows, filter, pagination, sort))
    }

    fn contains(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.lock().contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use syntropy_common::{BackupMetadata, InterfaceType, SetupConfig};

    fn backup(id: &str, iface: InterfaceType, ts: i64) -> ConfigBackup {
        ConfigBackup {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            config: SetupConfig::default(),
            size_bytes: 10,
            checksum: "00".repeat(32),
            encrypted: false,
            compressed: false,
            metadata: BackupMetadata {
                interface: iface,
                user_id: "u".to_string(),
                session_id: String::new(),
                created_by: "test".to_string(),
            },
            created_at: Utc.timestamp_opt(ts, 0).unwrap(),
        }
    }

    fn exercise(store: &dyn BackupStore) {
        store.put(backup("backup_cli_1", InterfaceType::Cli, 1)).unwrap();
        store.put(backup("backup_web_2", InterfaceType::Web, 2)).unwrap();

        assert!(matches!(
            store.put(backup("backup_cli_1", InterfaceType::Cli, 1)),
            Err(StoreError::Duplicate(_))
        ));
        assert!(matches!(store.get("nope"), Err(StoreError::NotFound(_))));
        assert!(store.contains("backup_web_2").unwrap());

        let page = store
            .list(&BackupFilter::default(), Pagination::default(), Sort::default())
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.configs[0].id, "backup_web_2");

        let filter = BackupFilter {
            interface: Some(InterfaceType::Cli),
            ..Default::default()
        };
        let page = store.list(&filter, Pagination::default(), Sort::default()).unwrap();
        assert_eq!(page.total, 1);
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryBackupStore::new());
    }

    #[test]
    fn test_file_store_plain_and_gzip() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FileBackupStore::new(dir.path().join("plain")));

        let gz = FileBackupStore::new(dir.path().join("gz")).with_compression(true);
        exercise(&gz);
        let back = gz.get("backup_cli_1").unwrap();
        assert!(back.compressed);
        assert!(gz.dir().join("backup_cli_1.json.gz").exists());
    }

    #[test]
    fn test_file_store_skips_corrupt_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackupStore::new(dir.path());
        store.put(backup("backup_cli_1", InterfaceType::Cli, 1)).unwrap();
        fs::write(dir.path().join("backup_cli_9.json"), b"{not json").unwrap();

        let page = store
            .list(&BackupFilter::default(), Pagination::default(), Sort::default())
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(matches!(store.get("backup_cli_9"), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_path_like_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackupStore::new(dir.path());
        assert!(store.get("../etc/passwd").is_err());
        assert!(!store.contains("a/b").unwrap());
        assert!(store.put(backup("a/b", InterfaceType::Cli, 1)).is_err());
    }

    #[test]
    fn test_missing_dir_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackupStore::new(dir.path().join("absent"));
        let page = store
            .list(&BackupFilter::default(), Pagination::default(), Sort::default())
            .unwrap();
        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages, 0);
    }
}
