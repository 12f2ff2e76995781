//! Dual-backend persistence: local JSON files or a remote REST service.
//!
//! In remote mode every write also lands in the embedded local store, so the
//! local state is always a cache of the most recent known-good data. Reads
//! prefer the remote side and on any failure (network, timeout, non-2xx)
//! silently fall back to that cache with a logged warning - remote
//! unavailability must never block or crash the editing session. Switching
//! from remote to local mode does not migrate anything; a later local-mode
//! session simply reads the mirror.

use crate::stats::UsageStats;
use crate::templates::{PromptTemplate, TemplateId, DEFAULT_TEMPLATE_CATEGORIES};
use crate::work::{Work, WorkId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::warn;

/// Timeout for remote calls; a stalled server degrades to the cache.
const REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from storage operations.
///
/// Only local failures surface here; remote failures are absorbed by the
/// fallback discipline and logged.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which backend serves this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageMode {
    /// JSON files on the running device only.
    Local,
    /// A REST service, mirrored into the local store.
    Remote { endpoint: String },
}

/// Explicit configuration threaded into [`Storage::open`]; no ambient
/// globals, so tests can point each store at its own directory.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub mode: StorageMode,
    /// Root directory for the local store (and the remote mirror).
    pub data_dir: PathBuf,
}

impl StorageConfig {
    /// Local-only storage under `data_dir`.
    pub fn local(data_dir: impl AsRef<Path>) -> Self {
        Self {
            mode: StorageMode::Local,
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    /// Remote storage at `endpoint`, mirrored under `data_dir`.
    pub fn remote(endpoint: impl Into<String>, data_dir: impl AsRef<Path>) -> Self {
        Self {
            mode: StorageMode::Remote {
                endpoint: endpoint.into(),
            },
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }
}

/// The typed persistence surface used by everything above it.
///
/// Cheap to clone; clones share the same backing configuration.
#[derive(Clone)]
pub struct Storage {
    local: LocalStore,
    remote: Option<RemoteStore>,
}

impl Storage {
    /// Open storage in the configured mode.
    pub fn open(config: StorageConfig) -> Self {
        let local = LocalStore::new(config.data_dir);
        let remote = match config.mode {
            StorageMode::Local => None,
            StorageMode::Remote { endpoint } => Some(RemoteStore::new(endpoint)),
        };
        Self { local, remote }
    }

    /// Whether a remote backend is configured.
    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    // =========================================================================
    // Works
    // =========================================================================

    /// All works, most recently updated first.
    pub async fn fetch_works(&self) -> Result<Vec<Work>, StoreError> {
        if let Some(remote) = &self.remote {
            match remote.fetch_works().await {
                Ok(works) => return Ok(works),
                Err(e) => warn!("remote work list unavailable, serving local cache: {e}"),
            }
        }
        self.local.fetch_works().await
    }

    pub async fn fetch_work(&self, id: WorkId) -> Result<Option<Work>, StoreError> {
        if let Some(remote) = &self.remote {
            match remote.fetch_work(id).await {
                Ok(work) => return Ok(Some(work)),
                Err(e) => warn!("remote work read failed, serving local cache: {e}"),
            }
        }
        self.local.fetch_work(id).await
    }

    pub async fn save_work(&self, work: &Work) -> Result<(), StoreError> {
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.save_work(work).await {
                warn!("remote work save failed, local mirror still updated: {e}");
            }
        }
        self.local.save_work(work).await
    }

    pub async fn delete_work(&self, id: WorkId) -> Result<(), StoreError> {
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.delete_work(id).await {
                warn!("remote work delete failed, local mirror still updated: {e}");
            }
        }
        self.local.delete_work(id).await
    }

    // =========================================================================
    // Prompt templates
    // =========================================================================

    pub async fn fetch_templates(&self) -> Result<Vec<PromptTemplate>, StoreError> {
        if let Some(remote) = &self.remote {
            match remote.fetch_templates().await {
                Ok(templates) => return Ok(templates),
                Err(e) => warn!("remote template list unavailable, serving local cache: {e}"),
            }
        }
        self.local.fetch_templates().await
    }

    pub async fn save_template(&self, template: &PromptTemplate) -> Result<(), StoreError> {
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.save_template(template).await {
                warn!("remote template save failed, local mirror still updated: {e}");
            }
        }
        self.local.save_template(template).await
    }

    pub async fn delete_template(&self, id: TemplateId) -> Result<(), StoreError> {
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.delete_template(id).await {
                warn!("remote template delete failed, local mirror still updated: {e}");
            }
        }
        self.local.delete_template(id).await
    }

    // =========================================================================
    // Template categories
    // =========================================================================

    /// Template category names. A store that has never persisted the list
    /// reads as the built-in default set.
    pub async fn fetch_template_categories(&self) -> Result<Vec<String>, StoreError> {
        if let Some(remote) = &self.remote {
            match remote.fetch_template_categories().await {
                Ok(names) => return Ok(names),
                Err(e) => warn!("remote category list unavailable, serving local cache: {e}"),
            }
        }
        self.local.fetch_template_categories().await
    }

    /// Append a category name if it is not already present.
    pub async fn add_template_category(&self, name: &str) -> Result<(), StoreError> {
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.add_template_category(name).await {
                warn!("remote category add failed, local mirror still updated: {e}");
            }
        }
        self.local.add_template_category(name).await
    }

    pub async fn delete_template_category(&self, name: &str) -> Result<(), StoreError> {
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.delete_template_category(name).await {
                warn!("remote category delete failed, local mirror still updated: {e}");
            }
        }
        self.local.delete_template_category(name).await
    }

    // =========================================================================
    // Usage statistics
    // =========================================================================

    /// The accumulated usage record; missing reads as the zeroed default.
    pub async fn fetch_stats(&self) -> Result<UsageStats, StoreError> {
        if let Some(remote) = &self.remote {
            match remote.fetch_stats().await {
                Ok(stats) => return Ok(stats),
                Err(e) => warn!("remote stats unavailable, serving local cache: {e}"),
            }
        }
        self.local.fetch_stats().await
    }

    pub async fn save_stats(&self, stats: &UsageStats) -> Result<(), StoreError> {
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.save_stats(stats).await {
                warn!("remote stats save failed, local mirror still updated: {e}");
            }
        }
        self.local.save_stats(stats).await
    }
}

// =============================================================================
// Local store: JSON files under a data directory
// =============================================================================

#[derive(Clone)]
struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn works_dir(&self) -> PathBuf {
        self.root.join("works")
    }

    fn work_path(&self, id: WorkId) -> PathBuf {
        self.works_dir().join(format!("{id}.json"))
    }

    fn templates_dir(&self) -> PathBuf {
        self.root.join("templates")
    }

    fn template_path(&self, id: TemplateId) -> PathBuf {
        self.templates_dir().join(format!("{id}.json"))
    }

    fn categories_path(&self) -> PathBuf {
        self.root.join("template_categories.json")
    }

    fn stats_path(&self) -> PathBuf {
        self.root.join("stats.json")
    }

    async fn fetch_works(&self) -> Result<Vec<Work>, StoreError> {
        let mut works: Vec<Work> = read_json_dir(&self.works_dir()).await?;
        works.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(works)
    }

    async fn fetch_work(&self, id: WorkId) -> Result<Option<Work>, StoreError> {
        read_json_opt(&self.work_path(id)).await
    }

    async fn save_work(&self, work: &Work) -> Result<(), StoreError> {
        write_json(&self.work_path(work.id), work).await
    }

    async fn delete_work(&self, id: WorkId) -> Result<(), StoreError> {
        remove_if_present(&self.work_path(id)).await
    }

    async fn fetch_templates(&self) -> Result<Vec<PromptTemplate>, StoreError> {
        let mut templates: Vec<PromptTemplate> = read_json_dir(&self.templates_dir()).await?;
        templates.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(templates)
    }

    async fn save_template(&self, template: &PromptTemplate) -> Result<(), StoreError> {
        write_json(&self.template_path(template.id), template).await
    }

    async fn delete_template(&self, id: TemplateId) -> Result<(), StoreError> {
        remove_if_present(&self.template_path(id)).await
    }

    async fn fetch_template_categories(&self) -> Result<Vec<String>, StoreError> {
        match read_json_opt::<Vec<String>>(&self.categories_path()).await? {
            Some(names) => Ok(names),
            None => Ok(DEFAULT_TEMPLATE_CATEGORIES
                .iter()
                .map(|name| name.to_string())
                .collect()),
        }
    }

    async fn add_template_category(&self, name: &str) -> Result<(), StoreError> {
        let mut names = self.fetch_template_categories().await?;
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        write_json(&self.categories_path(), &names).await
    }

    async fn delete_template_category(&self, name: &str) -> Result<(), StoreError> {
        let mut names = self.fetch_template_categories().await?;
        names.retain(|n| n != name);
        write_json(&self.categories_path(), &names).await
    }

    async fn fetch_stats(&self) -> Result<UsageStats, StoreError> {
        Ok(read_json_opt(&self.stats_path()).await?.unwrap_or_default())
    }

    async fn save_stats(&self, stats: &UsageStats) -> Result<(), StoreError> {
        write_json(&self.stats_path(), stats).await
    }
}

/// Read every `.json` record in a directory, skipping unreadable files.
async fn read_json_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StoreError> {
    let mut records = Vec::new();
    if !dir.exists() {
        return Ok(records);
    }

    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.extension().map(|e| e == "json").unwrap_or(false) {
            continue;
        }
        match read_json::<T>(&path).await {
            Ok(record) => records.push(record),
            Err(e) => warn!("skipping unreadable record {}: {e}", path.display()),
        }
    }
    Ok(records)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Read a record, mapping a missing file to `None`.
async fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).await?;
    Ok(())
}

async fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// Remote store: REST endpoints over the four resource kinds
// =============================================================================

#[derive(Clone)]
struct RemoteStore {
    client: reqwest::Client,
    base: String,
}

impl RemoteStore {
    fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REMOTE_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client"),
            base: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn fetch_works(&self) -> Result<Vec<Work>, reqwest::Error> {
        self.client
            .get(self.url("/api/works"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    async fn fetch_work(&self, id: WorkId) -> Result<Work, reqwest::Error> {
        self.client
            .get(self.url(&format!("/api/works/{id}")))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    async fn save_work(&self, work: &Work) -> Result<(), reqwest::Error> {
        self.client
            .post(self.url("/api/works"))
            .json(work)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete_work(&self, id: WorkId) -> Result<(), reqwest::Error> {
        self.client
            .delete(self.url(&format!("/api/works/{id}")))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn fetch_templates(&self) -> Result<Vec<PromptTemplate>, reqwest::Error> {
        self.client
            .get(self.url("/api/templates"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    async fn save_template(&self, template: &PromptTemplate) -> Result<(), reqwest::Error> {
        self.client
            .post(self.url("/api/templates"))
            .json(template)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete_template(&self, id: TemplateId) -> Result<(), reqwest::Error> {
        self.client
            .delete(self.url(&format!("/api/templates/{id}")))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn fetch_template_categories(&self) -> Result<Vec<String>, reqwest::Error> {
        self.client
            .get(self.url("/api/template-categories"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    async fn add_template_category(&self, name: &str) -> Result<(), reqwest::Error> {
        self.client
            .post(self.url("/api/template-categories"))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete_template_category(&self, name: &str) -> Result<(), reqwest::Error> {
        self.client
            .delete(self.url(&format!("/api/template-categories/{name}")))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn fetch_stats(&self) -> Result<UsageStats, reqwest::Error> {
        self.client
            .get(self.url("/api/stats"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    async fn save_stats(&self, stats: &UsageStats) -> Result<(), reqwest::Error> {
        self.client
            .post(self.url("/api/stats"))
            .json(stats)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
