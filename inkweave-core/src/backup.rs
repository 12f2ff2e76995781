//! Backup and restore: a single JSON envelope holding everything the
//! storage layer knows about.
//!
//! Restore is additive per id: records in the file replace records with
//! the same id, records only on the device are untouched. Category names
//! are merged as a set.

use crate::storage::{Storage, StoreError};
use crate::templates::PromptTemplate;
use crate::work::{now_millis, Work};
use crate::stats::UsageStats;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current backup envelope version.
const BACKUP_VERSION: u32 = 1;

/// Errors from backup and restore.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid backup file: {0}")]
    InvalidFormat(String),

    #[error("backup version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// The backup envelope.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Unix millis at backup creation.
    pub timestamp: u64,
    pub works: Option<Vec<Work>>,
    pub prompt_templates: Option<Vec<PromptTemplate>>,
    #[serde(default)]
    pub prompt_categories: Vec<String>,
    #[serde(default)]
    pub usage_stats: Option<UsageStats>,
}

fn default_version() -> u32 {
    BACKUP_VERSION
}

/// What a restore actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub new_works: usize,
    pub updated_works: usize,
    pub new_templates: usize,
    pub updated_templates: usize,
    pub new_categories: usize,
}

/// Serialize the entire store into a backup envelope.
pub async fn create_backup(storage: &Storage) -> Result<String, BackupError> {
    let backup = Backup {
        version: BACKUP_VERSION,
        timestamp: now_millis(),
        works: Some(storage.fetch_works().await?),
        prompt_templates: Some(storage.fetch_templates().await?),
        prompt_categories: storage.fetch_template_categories().await?,
        usage_stats: Some(storage.fetch_stats().await?),
    };

    serde_json::to_string_pretty(&backup).map_err(|e| BackupError::InvalidFormat(e.to_string()))
}

/// Restore a backup envelope into the store, additively per id.
///
/// Validation happens before any write: a file that parses but carries
/// none of the expected collections is rejected outright.
pub async fn restore_backup(storage: &Storage, json: &str) -> Result<RestoreSummary, BackupError> {
    let backup: Backup =
        serde_json::from_str(json).map_err(|e| BackupError::InvalidFormat(e.to_string()))?;

    if backup.version != BACKUP_VERSION {
        return Err(BackupError::VersionMismatch {
            expected: BACKUP_VERSION,
            found: backup.version,
        });
    }

    if backup.works.is_none() && backup.prompt_templates.is_none() {
        return Err(BackupError::InvalidFormat(
            "no works or prompt templates in backup".to_string(),
        ));
    }

    let mut summary = RestoreSummary::default();

    if let Some(works) = backup.works {
        let existing: Vec<_> = storage.fetch_works().await?.iter().map(|w| w.id).collect();
        for work in works {
            if existing.contains(&work.id) {
                summary.updated_works += 1;
            } else {
                summary.new_works += 1;
            }
            storage.save_work(&work).await?;
        }
    }

    if let Some(templates) = backup.prompt_templates {
        let existing: Vec<_> = storage
            .fetch_templates()
            .await?
            .iter()
            .map(|t| t.id)
            .collect();
        for template in templates {
            if existing.contains(&template.id) {
                summary.updated_templates += 1;
            } else {
                summary.new_templates += 1;
            }
            storage.save_template(&template).await?;
        }
    }

    if !backup.prompt_categories.is_empty() {
        let existing = storage.fetch_template_categories().await?;
        for name in backup.prompt_categories {
            if !existing.contains(&name) {
                storage.add_template_category(&name).await?;
                summary.new_categories += 1;
            }
        }
    }

    if let Some(stats) = backup.usage_stats {
        storage.save_stats(&stats).await?;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageConfig;
    use tempfile::TempDir;

    fn local_storage(dir: &TempDir) -> Storage {
        Storage::open(StorageConfig::local(dir.path()))
    }

    #[tokio::test]
    async fn test_backup_round_trip() {
        let source_dir = TempDir::new().unwrap();
        let source = local_storage(&source_dir);

        let work = Work::new("星落之城", "", "科幻");
        source.save_work(&work).await.unwrap();
        let template = PromptTemplate::new("三幕式大纲", "大纲", "铺垫、对抗、结局");
        source.save_template(&template).await.unwrap();

        let json = create_backup(&source).await.unwrap();

        let target_dir = TempDir::new().unwrap();
        let target = local_storage(&target_dir);
        let summary = restore_backup(&target, &json).await.unwrap();

        assert_eq!(summary.new_works, 1);
        assert_eq!(summary.new_templates, 1);
        assert_eq!(summary.updated_works, 0);
        assert_eq!(
            target.fetch_work(work.id).await.unwrap().unwrap().title,
            "星落之城"
        );
    }

    #[tokio::test]
    async fn test_restore_replaces_same_id_and_keeps_others() {
        let dir = TempDir::new().unwrap();
        let storage = local_storage(&dir);

        let mut shared = Work::new("旧标题", "", "");
        let local_only = Work::new("本地独有", "", "");
        storage.save_work(&shared).await.unwrap();
        storage.save_work(&local_only).await.unwrap();

        shared.title = "备份里的新标题".to_string();
        let backup = Backup {
            version: 1,
            timestamp: 0,
            works: Some(vec![shared.clone()]),
            prompt_templates: None,
            prompt_categories: Vec::new(),
            usage_stats: None,
        };
        let json = serde_json::to_string(&backup).unwrap();

        let summary = restore_backup(&storage, &json).await.unwrap();
        assert_eq!(summary.updated_works, 1);
        assert_eq!(summary.new_works, 0);

        assert_eq!(
            storage.fetch_work(shared.id).await.unwrap().unwrap().title,
            "备份里的新标题"
        );
        assert_eq!(
            storage
                .fetch_work(local_only.id)
                .await
                .unwrap()
                .unwrap()
                .title,
            "本地独有"
        );
    }

    #[tokio::test]
    async fn test_restore_rejects_garbage_before_side_effects() {
        let dir = TempDir::new().unwrap();
        let storage = local_storage(&dir);

        let result = restore_backup(&storage, "not json").await;
        assert!(matches!(result, Err(BackupError::InvalidFormat(_))));
        assert!(storage.fetch_works().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restore_rejects_envelope_without_collections() {
        let dir = TempDir::new().unwrap();
        let storage = local_storage(&dir);

        let result = restore_backup(&storage, r#"{"version":1,"timestamp":0}"#).await;
        assert!(matches!(result, Err(BackupError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn test_restore_rejects_version_mismatch() {
        let dir = TempDir::new().unwrap();
        let storage = local_storage(&dir);

        let json = r#"{"version":99,"timestamp":0,"works":[],"promptTemplates":[]}"#;
        let result = restore_backup(&storage, json).await;
        assert!(matches!(
            result,
            Err(BackupError::VersionMismatch {
                expected: 1,
                found: 99
            })
        ));
    }

    #[tokio::test]
    async fn test_restore_merges_categories_as_set() {
        let dir = TempDir::new().unwrap();
        let storage = local_storage(&dir);

        let existing = storage.fetch_template_categories().await.unwrap();
        let json = format!(
            r#"{{"version":1,"timestamp":0,"works":[],"promptTemplates":[],"promptCategories":["{}","灵感"]}}"#,
            existing[0]
        );

        let summary = restore_backup(&storage, &json).await.unwrap();
        assert_eq!(summary.new_categories, 1);

        let after = storage.fetch_template_categories().await.unwrap();
        assert_eq!(
            after.iter().filter(|c| *c == &existing[0]).count(),
            1
        );
        assert!(after.iter().any(|c| c == "灵感"));
    }
}
