//! Config backups and the listing query model.

use crate::setup_config::{InterfaceType, SetupConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum page size accepted by `list`
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub interface: InterfaceType,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub created_by: String,
}

/// Immutable archive of a setup config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigBackup {
    /// `backup_<interface>_<unix_ts>`
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub config: SetupConfig,
    /// Byte length of the YAML serialization of `config`
    pub size_bytes: u64,
    /// SHA-256 hex of the YAML serialization of `config`
    pub checksum: String,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub compressed: bool,
    pub metadata: BackupMetadata,
    pub created_at: DateTime<Utc>,
}

impl ConfigBackup {
    /// Base id before any collision suffix
    pub fn base_id(interface: InterfaceType, at: DateTime<Utc>) -> String {
        format!("backup_{}_{}", interface, at.timestamp())
    }

    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            interface: self.metadata.interface,
            user_id: self.metadata.user_id.clone(),
            session_id: self.metadata.session_id.clone(),
            size_bytes: self.size_bytes,
            checksum: self.checksum.clone(),
            compressed: self.compressed,
            created_at: self.created_at,
        }
    }
}

/// Listing row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub interface: InterfaceType,
    pub user_id: String,
    pub session_id: String,
    pub size_bytes: u64,
    pub checksum: String,
    pub compressed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackupFilter {
    pub interface: Option<InterfaceType>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl BackupFilter {
    pub fn matches(&self, summary: &ConfigSummary) -> bool {
        self.interface.map_or(true, |i| summary.interface == i)
            && self
                .user_id
                .as_deref()
                .map_or(true, |u| u.is_empty() || summary.user_id == u)
            && self
                .session_id
                .as_deref()
                .map_or(true, |s| s.is_empty() || summary.session_id == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub page_size: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 10,
        }
    }
}

impl Pagination {
    /// Clamp to page ≥ 1 and 1 ≤ page_size ≤ MAX_PAGE_SIZE
    pub fn new(page: Option<usize>, page_size: Option<usize>) -> Self {
        let defaults = Self::default();
        Self {
            page: page.unwrap_or(defaults.page).max(1),
            page_size: page_size
                .unwrap_or(defaults.page_size)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    Name,
    SizeBytes,
}

impl SortField {
    pub fn parse(s: &str) -> Option<SortField> {
        match s.trim() {
            "created_at" => Some(SortField::CreatedAt),
            "name" => Some(SortField::Name),
            "size_bytes" | "size" => Some(SortField::SizeBytes),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<SortOrder> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub order: SortOrder,
}

/// One page of summaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryPage {
    pub configs: Vec<ConfigSummary>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

/// Filter, sort and paginate summaries. Stores that keep everything in
/// memory share this instead of reimplementing the query.
pub fn apply_query(
    mut rows: Vec<ConfigSummary>,
    filter: &BackupFilter,
    pagination: Pagination,
    sort: Sort,
) -> SummaryPage {
    rows.retain(|r| filter.matches(r));
    rows.sort_by(|a, b| {
        let ordering = match sort.field {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::Name => a.name.cmp(&b.name),
            SortField::SizeBytes => a.size_bytes.cmp(&b.size_bytes),
        }
        .then_with(|| a.id.cmp(&b.id));
        match sort.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });

    let total = rows.len();
    let total_pages = total.div_ceil(pagination.page_size);
    let configs = rows
        .into_iter()
        .skip(pagination.offset())
        .take(pagination.page_size)
        .collect();

    SummaryPage {
        configs,
        total,
        page: pagination.page,
        page_size: pagination.page_size,
        total_pages,
    }
}
