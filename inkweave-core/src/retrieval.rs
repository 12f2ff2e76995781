//! Context retrieval: choosing which knowledge entries to inject into a
//! generation request.
//!
//! Manual mode is an identity pass-through over user-picked ids. Smart mode
//! asks the provider to pick relevant ids from a minimized index - titles
//! and category names only, never full bodies, to keep the request small.
//! A malformed or failed response degrades to the empty set so the
//! generation request itself is never blocked.

use crate::provider::{extract_json, TextProvider};
use crate::work::{EntryId, Work};
use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;

/// Temperature for the selection request - deterministic matching.
const SELECTION_TEMPERATURE: f32 = 0.1;

/// Upper bound on the outline digest included in the selection prompt.
const OUTLINE_DIGEST_CHARS: usize = 1500;

/// Category names that look like outlines; lowercase substrings.
const OUTLINE_KEYWORDS: &[&str] = &["大纲", "卷纲", "细纲", "outline"];

/// Minimized projection of an entry used only for the selection request.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalIndexItem {
    pub id: String,
    pub title: String,
    #[serde(rename = "categoryName")]
    pub category_name: String,
}

/// Formatted references plus a size estimate for display.
#[derive(Debug, Clone, Default)]
pub struct ReferencePack {
    /// `"[{category}] {title}:\n{content}"` strings, in entry order.
    pub references: Vec<String>,
    /// Character count of the included entry bodies. Informational only;
    /// no limit is enforced.
    pub estimated_chars: usize,
}

/// Build the minimized index for every entry of the work.
pub fn retrieval_index(work: &Work) -> Vec<RetrievalIndexItem> {
    work.entries
        .iter()
        .map(|entry| RetrievalIndexItem {
            id: entry.id.to_string(),
            title: entry.title.clone(),
            category_name: work
                .category_name(entry.category_id)
                .unwrap_or("资料")
                .to_string(),
        })
        .collect()
}

/// References for an explicit user selection.
pub fn manual_references(work: &Work, selected: &HashSet<EntryId>) -> ReferencePack {
    build_references(work, |entry_id| selected.contains(&entry_id))
}

/// References for a list of provider-proposed id strings.
///
/// Unknown ids are dropped silently by set membership - the selector does
/// not validate them up front, so this is where they become no-ops.
pub fn references_for_ids(work: &Work, ids: &[String]) -> ReferencePack {
    let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
    build_references(work, |entry_id| wanted.contains(entry_id.to_string().as_str()))
}

fn build_references(work: &Work, mut include: impl FnMut(EntryId) -> bool) -> ReferencePack {
    let mut pack = ReferencePack::default();

    for entry in &work.entries {
        if !include(entry.id) {
            continue;
        }
        let category = work.category_name(entry.category_id).unwrap_or("资料");
        pack.references
            .push(format!("[{category}] {}:\n{}", entry.title, entry.content));
        pack.estimated_chars += entry.content.chars().count();
    }

    pack
}

/// Picks relevant knowledge entries for a generation instruction.
pub struct ContextSelector<P> {
    provider: P,
}

impl<P: TextProvider> ContextSelector<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Ask the provider which entries are relevant to the instruction.
    ///
    /// Returns the raw id strings the provider proposed; callers build
    /// references via [`references_for_ids`], which drops unknown ids.
    /// Any provider failure or malformed response yields the empty set.
    pub async fn smart_select(&self, work: &Work, instruction: &str) -> Vec<String> {
        let index = retrieval_index(work);
        if index.is_empty() {
            return Vec::new();
        }

        let index_json = match serde_json::to_string(&index) {
            Ok(json) => json,
            Err(_) => return Vec::new(),
        };

        let outline = outline_digest(work);
        let prompt = build_selection_prompt(work, instruction, &outline, &index_json);

        match self
            .provider
            .complete_structured(&prompt, Some(SELECTION_TEMPERATURE))
            .await
        {
            Ok(text) => parse_selected_ids(&text),
            Err(e) => {
                warn!("smart retrieval selection failed: {e}");
                Vec::new()
            }
        }
    }
}

/// Concatenated content of outline-like categories, bounded to a prefix.
fn outline_digest(work: &Work) -> String {
    let outline_categories: Vec<_> = work
        .categories
        .iter()
        .filter(|c| {
            let lower = c.name.to_lowercase();
            OUTLINE_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .map(|c| c.id)
        .collect();

    let mut digest = String::new();
    for entry in &work.entries {
        if !outline_categories.contains(&entry.category_id) {
            continue;
        }
        if !digest.is_empty() {
            digest.push_str("\n\n");
        }
        digest.push_str(&entry.content);
        if digest.chars().count() >= OUTLINE_DIGEST_CHARS {
            break;
        }
    }

    if digest.chars().count() > OUTLINE_DIGEST_CHARS {
        digest = digest.chars().take(OUTLINE_DIGEST_CHARS).collect();
    }
    digest
}

fn build_selection_prompt(
    work: &Work,
    instruction: &str,
    outline: &str,
    index_json: &str,
) -> String {
    format!(
        r#"你是小说写作的资料管理员。用户即将执行一个写作任务，请从知识库索引中挑选与任务相关的条目。

小说标题: {title}
简介: {description}

本书大纲（节选）:
{outline}

写作任务:
{instruction}

知识库索引（仅含标题与分类）:
{index_json}

请判断哪些条目与本次写作任务相关（人物登场、地点出现、涉及的物品或设定）。
请**严格**只返回一个 JSON 数组，内容为相关条目的 id 字符串，例如：["id1", "id2"]。
若没有相关条目，返回 []。"#,
        title = work.title,
        description = work.description,
    )
}

/// Parse the provider's id-array response, failing closed to empty.
pub fn parse_selected_ids(text: &str) -> Vec<String> {
    serde_json::from_str(extract_json(text)).unwrap_or_default()
}
