//! Prompt-template library: reusable instruction snippets grouped by a
//! free-form category name. Pure pass-through CRUD; the only logic here is
//! the built-in default set seeded into an empty store.

use crate::storage::{Storage, StoreError};
use crate::work::now_millis;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Template categories available out of the box.
pub const DEFAULT_TEMPLATE_CATEGORIES: &[&str] = &[
    "脑洞",
    "大纲",
    "卷纲",
    "细纲",
    "正文",
    "简介",
    "人物",
    "书名",
];

/// Unique identifier for a prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(Uuid);

impl TemplateId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TemplateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A reusable instruction template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: TemplateId,
    pub title: String,
    pub content: String,
    /// Category name from the template-category list.
    pub category: String,
    /// Unix millis.
    pub created_at: u64,
}

impl PromptTemplate {
    pub fn new(
        title: impl Into<String>,
        category: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: TemplateId::new(),
            title: title.into(),
            content: content.into(),
            category: category.into(),
            created_at: now_millis(),
        }
    }
}

/// The built-in template set, seeded when the store has none.
pub fn default_templates() -> Vec<PromptTemplate> {
    vec![
        PromptTemplate::new(
            "创意风暴",
            "脑洞",
            "请基于以下关键词：[关键词1]、[关键词2]，提供3个截然不同的小说核心创意（High Concept）。每个创意包含：核心冲突、独特卖点、一句话梗概。",
        ),
        PromptTemplate::new(
            "三幕式大纲",
            "大纲",
            "请使用经典的三幕式结构（铺垫、对抗、结局）为一部关于[主题]的小说撰写大纲。重点描述情节点（Plot Points）和角色的弧光变化。",
        ),
        PromptTemplate::new(
            "章节细纲生成",
            "细纲",
            "当前章节的目标是[目标]。请为这一章列出5-7个具体的场景节拍（Beats），包括对话焦点、动作描写和情感转折。",
        ),
        PromptTemplate::new(
            "沉浸式描写",
            "正文",
            "请扩写以下场景：[场景简述]。要求运用“展示而非讲述”（Show, Don't Tell）的技巧，调动五感（视觉、听觉、嗅觉等），侧重于氛围渲染和人物的潜台词。",
        ),
        PromptTemplate::new(
            "反派设计",
            "人物",
            "请设计一个名为[名字]的反派角色。不要让他仅仅是“邪恶”的，请给出他扭曲的价值观来源、一个令人同情的弱点，以及他与主角的镜像关系。",
        ),
        PromptTemplate::new(
            "吸引人的书名",
            "书名",
            "这本小说关于[核心内容]。请生成10个书名，分为三种风格：1. 网文热血风；2. 出版文艺风；3. 悬疑极其抓人眼球风。",
        ),
    ]
}

/// Seed the built-in templates into an empty store.
///
/// Returns how many templates were written; a store that already holds any
/// template is left untouched.
pub async fn seed_default_templates(storage: &Storage) -> Result<usize, StoreError> {
    if !storage.fetch_templates().await?.is_empty() {
        return Ok(0);
    }

    let defaults = default_templates();
    for template in &defaults {
        storage.save_template(template).await?;
    }
    Ok(defaults.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_seed_only_when_empty() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(StorageConfig::local(dir.path()));

        let seeded = seed_default_templates(&storage).await.unwrap();
        assert_eq!(seeded, default_templates().len());

        // A second call must not duplicate anything
        assert_eq!(seed_default_templates(&storage).await.unwrap(), 0);
        assert_eq!(
            storage.fetch_templates().await.unwrap().len(),
            default_templates().len()
        );
    }

    #[test]
    fn test_default_templates_use_known_categories() {
        for template in default_templates() {
            assert!(
                DEFAULT_TEMPLATE_CATEGORIES.contains(&template.category.as_str()),
                "unexpected category {}",
                template.category
            );
        }
    }

    #[test]
    fn test_template_ids_unique() {
        let templates = default_templates();
        for (i, a) in templates.iter().enumerate() {
            for b in &templates[i + 1..] {
                assert_ne!(a.id, b.id);
            }
        }
    }
}
