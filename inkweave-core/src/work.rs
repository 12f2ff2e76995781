//! The Work aggregate: chapters plus the categorized knowledge base.
//!
//! A Work exclusively owns its chapters, knowledge categories, and knowledge
//! entries. Category and entry order is insertion/reorder order and is
//! significant - it is what the editor displays and what retrieval iterates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Categories seeded into every freshly created work.
pub const DEFAULT_CATEGORY_NAMES: &[&str] = &[
    "大纲",
    "卷纲",
    "细纲",
    "人物",
    "背景",
    "物品",
    "金手指",
    "世界观",
    "简介",
];

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new unique id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// Unique identifier for a work.
    WorkId
);
id_type!(
    /// Unique identifier for a chapter.
    ChapterId
);
id_type!(
    /// Unique identifier for a knowledge category.
    CategoryId
);
id_type!(
    /// Unique identifier for a knowledge entry.
    EntryId
);

/// A chapter of a work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub title: String,
    pub content: String,
    /// Provider-generated digest used to compress long-range context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Chapter {
    /// Create a new empty chapter.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: ChapterId::new(),
            title: title.into(),
            content: String::new(),
            summary: None,
        }
    }
}

/// A knowledge-base category (e.g. 人物, 世界观).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeCategory {
    pub id: CategoryId,
    pub name: String,
}

impl KnowledgeCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CategoryId::new(),
            name: name.into(),
        }
    }
}

/// A knowledge-base entry under a category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: EntryId,
    pub category_id: CategoryId,
    pub title: String,
    pub content: String,
}

impl KnowledgeEntry {
    pub fn new(
        category_id: CategoryId,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            category_id,
            title: title.into(),
            content: content.into(),
        }
    }
}

/// A single novel/project: chapters plus its knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Work {
    pub id: WorkId,
    pub title: String,
    pub description: String,
    pub genre: String,
    /// Unix millis.
    pub created_at: u64,
    /// Unix millis, bumped on every mutation.
    pub updated_at: u64,
    pub chapters: Vec<Chapter>,
    pub categories: Vec<KnowledgeCategory>,
    pub entries: Vec<KnowledgeEntry>,
}

impl Work {
    /// Create a new work seeded with the default category set.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        genre: impl Into<String>,
    ) -> Self {
        let now = now_millis();
        Self {
            id: WorkId::new(),
            title: title.into(),
            description: description.into(),
            genre: genre.into(),
            created_at: now,
            updated_at: now,
            chapters: Vec::new(),
            categories: DEFAULT_CATEGORY_NAMES
                .iter()
                .map(|name| KnowledgeCategory::new(*name))
                .collect(),
            entries: Vec::new(),
        }
    }

    /// Bump the updated-at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = now_millis();
    }

    // =========================================================================
    // Chapters
    // =========================================================================

    /// Append a new empty chapter and return its id.
    pub fn add_chapter(&mut self, title: impl Into<String>) -> ChapterId {
        let chapter = Chapter::new(title);
        let id = chapter.id;
        self.chapters.push(chapter);
        self.touch();
        id
    }

    pub fn chapter(&self, id: ChapterId) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == id)
    }

    pub fn chapter_mut(&mut self, id: ChapterId) -> Option<&mut Chapter> {
        self.chapters.iter_mut().find(|c| c.id == id)
    }

    // =========================================================================
    // Categories
    // =========================================================================

    /// Append a new category and return its id.
    pub fn add_category(&mut self, name: impl Into<String>) -> CategoryId {
        let category = KnowledgeCategory::new(name);
        let id = category.id;
        self.categories.push(category);
        self.touch();
        id
    }

    pub fn category(&self, id: CategoryId) -> Option<&KnowledgeCategory> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// Look up a category name by id.
    pub fn category_name(&self, id: CategoryId) -> Option<&str> {
        self.category(id).map(|c| c.name.as_str())
    }

    /// Remove a category and cascade-delete its entries.
    ///
    /// Returns the number of entries removed, or `None` if the category
    /// does not exist.
    pub fn remove_category(&mut self, id: CategoryId) -> Option<usize> {
        let index = self.categories.iter().position(|c| c.id == id)?;
        self.categories.remove(index);

        let before = self.entries.len();
        self.entries.retain(|e| e.category_id != id);
        self.touch();
        Some(before - self.entries.len())
    }

    /// Move a category from one position to another, preserving the order
    /// of the rest.
    pub fn reorder_categories(&mut self, from: usize, to: usize) -> bool {
        if from >= self.categories.len() || to >= self.categories.len() {
            return false;
        }
        let category = self.categories.remove(from);
        self.categories.insert(to, category);
        self.touch();
        true
    }

    // =========================================================================
    // Entries
    // =========================================================================

    /// Append a new entry under an existing category and return its id.
    ///
    /// Returns `None` if the category does not exist - entries must never
    /// reference a dead category.
    pub fn add_entry(
        &mut self,
        category_id: CategoryId,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Option<EntryId> {
        self.category(category_id)?;
        let entry = KnowledgeEntry::new(category_id, title, content);
        let id = entry.id;
        self.entries.push(entry);
        self.touch();
        Some(id)
    }

    pub fn entry(&self, id: EntryId) -> Option<&KnowledgeEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut KnowledgeEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Remove an entry. Returns false if it does not exist.
    pub fn remove_entry(&mut self, id: EntryId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        if self.entries.len() != before {
            self.touch();
            true
        } else {
            false
        }
    }

    /// Entries belonging to a category, in persisted order.
    pub fn entries_in_category(&self, category_id: CategoryId) -> Vec<&KnowledgeEntry> {
        self.entries
            .iter()
            .filter(|e| e.category_id == category_id)
            .collect()
    }

    /// Reorder an entry within its category.
    ///
    /// `from` and `to` are positions within the category's entry list. The
    /// global list is rebuilt as (entries of other categories, in order) +
    /// (reordered entries of this category).
    pub fn reorder_entries(&mut self, category_id: CategoryId, from: usize, to: usize) -> bool {
        let mut in_category: Vec<KnowledgeEntry> = self
            .entries
            .iter()
            .filter(|e| e.category_id == category_id)
            .cloned()
            .collect();

        if from >= in_category.len() || to >= in_category.len() {
            return false;
        }

        let moved = in_category.remove(from);
        in_category.insert(to, moved);

        let mut rebuilt: Vec<KnowledgeEntry> = self
            .entries
            .iter()
            .filter(|e| e.category_id != category_id)
            .cloned()
            .collect();
        rebuilt.extend(in_category);
        self.entries = rebuilt;
        self.touch();
        true
    }
}

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_work_has_default_categories() {
        let work = Work::new("测试小说", "一部测试作品", "奇幻");
        assert_eq!(work.categories.len(), DEFAULT_CATEGORY_NAMES.len());
        assert_eq!(work.categories[0].name, "大纲");
        assert!(work.entries.is_empty());
        assert!(work.chapters.is_empty());
    }

    #[test]
    fn test_entries_in_category_filters_and_preserves_order() {
        let mut work = Work::new("t", "d", "g");
        let cat_a = work.add_category("功法");
        let cat_b = work.add_category("灵兽");

        let e1 = work.add_entry(cat_a, "御剑术", "基础剑诀").unwrap();
        let _e2 = work.add_entry(cat_b, "小白", "一只狐狸").unwrap();
        let e3 = work.add_entry(cat_a, "火球术", "入门法术").unwrap();

        let in_a: Vec<_> = work
            .entries_in_category(cat_a)
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(in_a, vec![e1, e3]);
        assert!(work
            .entries_in_category(cat_a)
            .iter()
            .all(|e| e.category_id == cat_a));
    }

    #[test]
    fn test_remove_category_cascades_exactly() {
        let mut work = Work::new("t", "d", "g");
        let cat_a = work.add_category("功法");
        let cat_b = work.add_category("灵兽");

        work.add_entry(cat_a, "a1", "").unwrap();
        work.add_entry(cat_a, "a2", "").unwrap();
        let keep = work.add_entry(cat_b, "b1", "").unwrap();

        let removed = work.remove_category(cat_a).unwrap();
        assert_eq!(removed, 2);
        assert!(work.category(cat_a).is_none());
        assert_eq!(work.entries.iter().filter(|e| e.id == keep).count(), 1);
        assert!(work.entries.iter().all(|e| e.category_id != cat_a));
    }

    #[test]
    fn test_remove_missing_category() {
        let mut work = Work::new("t", "d", "g");
        assert!(work.remove_category(CategoryId::new()).is_none());
    }

    #[test]
    fn test_add_entry_rejects_unknown_category() {
        let mut work = Work::new("t", "d", "g");
        assert!(work.add_entry(CategoryId::new(), "x", "y").is_none());
    }

    #[test]
    fn test_reorder_entries_within_category() {
        let mut work = Work::new("t", "d", "g");
        let cat = work.add_category("功法");
        let other = work.add_category("灵兽");

        let e1 = work.add_entry(cat, "one", "").unwrap();
        let e2 = work.add_entry(cat, "two", "").unwrap();
        let e3 = work.add_entry(cat, "three", "").unwrap();
        let unrelated = work.add_entry(other, "pet", "").unwrap();

        assert!(work.reorder_entries(cat, 0, 2));

        let order: Vec<_> = work.entries_in_category(cat).iter().map(|e| e.id).collect();
        assert_eq!(order, vec![e2, e3, e1]);
        // The other category is untouched
        assert_eq!(work.entries_in_category(other)[0].id, unrelated);
    }

    #[test]
    fn test_reorder_categories() {
        let mut work = Work::new("t", "d", "g");
        work.categories.clear();
        let a = work.add_category("a");
        let b = work.add_category("b");
        let c = work.add_category("c");

        assert!(work.reorder_categories(2, 0));
        let order: Vec<_> = work.categories.iter().map(|cat| cat.id).collect();
        assert_eq!(order, vec![c, a, b]);

        assert!(!work.reorder_categories(5, 0));
    }

    #[test]
    fn test_chapter_lifecycle() {
        let mut work = Work::new("t", "d", "g");
        let id = work.add_chapter("第 1 章");

        let chapter = work.chapter_mut(id).unwrap();
        assert!(chapter.content.is_empty());
        chapter.content = "夜色渐深。".to_string();

        assert_eq!(work.chapter(id).unwrap().content, "夜色渐深。");
    }
}
