//! Knowledge store for a single work.
//!
//! Wraps one [`Work`] and a [`Storage`] handle behind two write paths:
//! structural mutations (categories, entries, chapters, ordering) persist
//! immediately before returning, while free-text content edits are
//! coalesced through a 2-second debounce window. Structural changes must
//! never be lost or left inconsistent; losing up to 2 seconds of keystrokes
//! is an accepted trade.

use crate::evolution::{apply_suggestions, ApplyOutcome, EvolutionSuggestion};
use crate::storage::{Storage, StoreError};
use crate::work::{CategoryId, ChapterId, EntryId, KnowledgeEntry, Work, WorkId};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::warn;

/// How long content edits are allowed to coalesce before being persisted.
const CONTENT_SAVE_DEBOUNCE: Duration = Duration::from_secs(2);

/// Errors from knowledge-store operations.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("work not found: {0}")]
    WorkNotFound(WorkId),

    #[error("unknown category: {0}")]
    UnknownCategory(CategoryId),

    #[error("unknown entry: {0}")]
    UnknownEntry(EntryId),

    #[error("unknown chapter: {0}")]
    UnknownChapter(ChapterId),

    #[error("invalid position")]
    InvalidPosition,
}

/// The knowledge store for one work.
///
/// All mutation goes through this type so the write-path discipline holds.
/// It is driven from a single logical task; interleaved async continuations
/// are the only concurrency, so no locking is needed.
pub struct KnowledgeStore {
    storage: Storage,
    work: Work,
    pending_save: Option<JoinHandle<()>>,
}

impl KnowledgeStore {
    /// Wrap an in-memory work. Nothing is persisted until the first
    /// mutation (or an explicit [`flush`](Self::flush)).
    pub fn new(storage: Storage, work: Work) -> Self {
        Self {
            storage,
            work,
            pending_save: None,
        }
    }

    /// Load a work from storage.
    pub async fn load(storage: Storage, id: WorkId) -> Result<Self, KnowledgeError> {
        let work = storage
            .fetch_work(id)
            .await?
            .ok_or(KnowledgeError::WorkNotFound(id))?;
        Ok(Self::new(storage, work))
    }

    /// Create a brand-new work and persist it immediately.
    pub async fn create(
        storage: Storage,
        title: impl Into<String>,
        description: impl Into<String>,
        genre: impl Into<String>,
    ) -> Result<Self, KnowledgeError> {
        let work = Work::new(title, description, genre);
        storage.save_work(&work).await?;
        Ok(Self::new(storage, work))
    }

    /// The current in-memory state of the work.
    pub fn work(&self) -> &Work {
        &self.work
    }

    /// Entries of a category, in persisted order.
    pub fn entries_by_category(&self, category_id: CategoryId) -> Vec<&KnowledgeEntry> {
        self.work.entries_in_category(category_id)
    }

    // =========================================================================
    // Structural mutations - persisted immediately
    // =========================================================================

    /// Create a category and persist.
    pub async fn add_category(&mut self, name: impl Into<String>) -> Result<CategoryId, KnowledgeError> {
        let id = self.work.add_category(name);
        self.persist().await?;
        Ok(id)
    }

    /// Delete a category, cascading to its entries, and persist.
    /// Returns the number of entries removed.
    pub async fn delete_category(&mut self, id: CategoryId) -> Result<usize, KnowledgeError> {
        let removed = self
            .work
            .remove_category(id)
            .ok_or(KnowledgeError::UnknownCategory(id))?;
        self.persist().await?;
        Ok(removed)
    }

    /// Create an entry under an existing category and persist.
    pub async fn add_entry(
        &mut self,
        category_id: CategoryId,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<EntryId, KnowledgeError> {
        let id = self
            .work
            .add_entry(category_id, title, content)
            .ok_or(KnowledgeError::UnknownCategory(category_id))?;
        self.persist().await?;
        Ok(id)
    }

    /// Delete an entry and persist.
    pub async fn delete_entry(&mut self, id: EntryId) -> Result<(), KnowledgeError> {
        if !self.work.remove_entry(id) {
            return Err(KnowledgeError::UnknownEntry(id));
        }
        self.persist().await?;
        Ok(())
    }

    /// Move a category to a new position and persist.
    pub async fn reorder_categories(&mut self, from: usize, to: usize) -> Result<(), KnowledgeError> {
        if !self.work.reorder_categories(from, to) {
            return Err(KnowledgeError::InvalidPosition);
        }
        self.persist().await?;
        Ok(())
    }

    /// Move an entry within its category and persist.
    pub async fn reorder_entries(
        &mut self,
        category_id: CategoryId,
        from: usize,
        to: usize,
    ) -> Result<(), KnowledgeError> {
        if !self.work.reorder_entries(category_id, from, to) {
            return Err(KnowledgeError::InvalidPosition);
        }
        self.persist().await?;
        Ok(())
    }

    /// Append an empty chapter and persist.
    pub async fn add_chapter(&mut self, title: impl Into<String>) -> Result<ChapterId, KnowledgeError> {
        let id = self.work.add_chapter(title);
        self.persist().await?;
        Ok(id)
    }

    /// Apply user-approved reconciliation suggestions and persist the full
    /// work once after the whole batch.
    pub async fn commit_suggestions(
        &mut self,
        suggestions: &[EvolutionSuggestion],
        selected: &HashSet<usize>,
    ) -> Result<ApplyOutcome, KnowledgeError> {
        let outcome = apply_suggestions(&mut self.work, suggestions, selected);
        self.persist().await?;
        Ok(outcome)
    }

    // =========================================================================
    // Content mutations - debounced
    // =========================================================================

    /// Replace an entry's body text; persisted after the debounce window.
    pub fn set_entry_content(&mut self, id: EntryId, content: impl Into<String>) -> Result<(), KnowledgeError> {
        let entry = self
            .work
            .entry_mut(id)
            .ok_or(KnowledgeError::UnknownEntry(id))?;
        entry.content = content.into();
        self.schedule_content_save();
        Ok(())
    }

    /// Rename an entry; persisted after the debounce window.
    pub fn set_entry_title(&mut self, id: EntryId, title: impl Into<String>) -> Result<(), KnowledgeError> {
        let entry = self
            .work
            .entry_mut(id)
            .ok_or(KnowledgeError::UnknownEntry(id))?;
        entry.title = title.into();
        self.schedule_content_save();
        Ok(())
    }

    /// Replace a chapter's body text; persisted after the debounce window.
    pub fn set_chapter_content(&mut self, id: ChapterId, content: impl Into<String>) -> Result<(), KnowledgeError> {
        let chapter = self
            .work
            .chapter_mut(id)
            .ok_or(KnowledgeError::UnknownChapter(id))?;
        chapter.content = content.into();
        self.schedule_content_save();
        Ok(())
    }

    /// Rename a chapter; persisted after the debounce window.
    pub fn set_chapter_title(&mut self, id: ChapterId, title: impl Into<String>) -> Result<(), KnowledgeError> {
        let chapter = self
            .work
            .chapter_mut(id)
            .ok_or(KnowledgeError::UnknownChapter(id))?;
        chapter.title = title.into();
        self.schedule_content_save();
        Ok(())
    }

    /// Attach a provider-generated summary to a chapter; persisted after
    /// the debounce window.
    pub fn set_chapter_summary(&mut self, id: ChapterId, summary: impl Into<String>) -> Result<(), KnowledgeError> {
        let chapter = self
            .work
            .chapter_mut(id)
            .ok_or(KnowledgeError::UnknownChapter(id))?;
        chapter.summary = Some(summary.into());
        self.schedule_content_save();
        Ok(())
    }

    /// Whether a debounced save is currently pending.
    pub fn has_pending_save(&self) -> bool {
        self.pending_save
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Force out any pending content edits immediately.
    pub async fn flush(&mut self) -> Result<(), KnowledgeError> {
        if self.pending_save.is_some() {
            self.persist().await?;
        }
        Ok(())
    }

    /// Persist the current state now, superseding any pending snapshot.
    async fn persist(&mut self) -> Result<(), KnowledgeError> {
        if let Some(handle) = self.pending_save.take() {
            handle.abort();
        }
        self.storage.save_work(&self.work).await?;
        Ok(())
    }

    /// Restart the single pending debounce timer with a snapshot of the
    /// current state. The newest edit always wins; there is never more than
    /// one save queued per work.
    fn schedule_content_save(&mut self) {
        self.work.touch();

        if let Some(handle) = self.pending_save.take() {
            handle.abort();
        }

        let storage = self.storage.clone();
        let snapshot = self.work.clone();
        self.pending_save = Some(tokio::spawn(async move {
            tokio::time::sleep(CONTENT_SAVE_DEBOUNCE).await;
            if let Err(e) = storage.save_work(&snapshot).await {
                warn!("debounced content save failed: {e}");
            }
        }));
    }
}
