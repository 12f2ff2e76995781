//! Evolution reconciliation: turning freshly written narrative into
//! structured knowledge-base deltas.
//!
//! One structured completion proposes creations and updates; the user
//! reviews the list (everything selected by default) and commits a subset.
//! The commit walks suggestions in order, resolves target entries and
//! categories, and never silently drops a suggestion - an update whose
//! target cannot be found is applied as a creation instead.

use crate::provider::{extract_json, TextProvider};
use crate::work::{CategoryId, Work};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::warn;

/// Temperature for the suggestion request - mostly extractive work.
const EVOLUTION_TEMPERATURE: f32 = 0.3;

/// How much of each existing entry body is shown to the model.
const ENTRY_SUMMARY_CHARS: usize = 100;

/// Errors from evolution analysis.
#[derive(Debug, Error)]
pub enum EvolutionError {
    #[error("chapter text is empty")]
    EmptyChapter,
}

/// Coarse entity type used to route new entries into categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Character,
    World,
    Item,
    Other,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Character,
        EntityKind::World,
        EntityKind::Item,
        EntityKind::Other,
    ];

    /// Keywords that mark a category name as belonging to this kind.
    /// Lowercase; matching is case-insensitive substring.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            EntityKind::Character => &["人物", "角色", "character", "person"],
            EntityKind::World => &["世界", "地点", "背景", "势力", "world", "location"],
            EntityKind::Item => &["物品", "道具", "金手指", "武器", "item", "artifact"],
            EntityKind::Other => &["其他", "杂项", "设定", "other"],
        }
    }

    /// Base name used when a category has to be auto-created.
    pub fn default_category_name(self) -> &'static str {
        match self {
            EntityKind::Character => "人物档案",
            EntityKind::World => "世界观设定",
            EntityKind::Item => "物品与金手指",
            EntityKind::Other => "其他设定",
        }
    }

    fn from_wire(value: &str) -> Self {
        match value {
            "CHARACTER" => EntityKind::Character,
            "WORLD" => EntityKind::World,
            "ITEM" => EntityKind::Item,
            _ => EntityKind::Other,
        }
    }
}

/// Classify a category name into an entity kind by keyword table.
///
/// Returns `None` when no keyword matches; the table is checked in
/// Character, World, Item, Other order.
pub fn classify(category_name: &str) -> Option<EntityKind> {
    let lower = category_name.to_lowercase();
    EntityKind::ALL
        .into_iter()
        .find(|kind| kind.keywords().iter().any(|k| lower.contains(k)))
}

/// Whether a suggestion creates a new entry or updates an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionKind {
    New,
    Update,
}

/// One proposed knowledge-base change, as reviewed by the user.
///
/// Transient: produced by one analysis, consumed by one commit.
#[derive(Debug, Clone)]
pub struct EvolutionSuggestion {
    /// Entry title.
    pub name: String,
    /// Full replacement/initial entry body.
    pub description: String,
    pub kind: SuggestionKind,
    pub entity_type: EntityKind,
    /// Human-readable justification for the review list.
    pub reason: String,
    /// Hint linking an update to an existing entry id, if the model had one.
    pub original_entry_id: Option<String>,
}

/// Wire shape of a single suggestion. Parsed leniently; anything that
/// cannot be normalized is discarded rather than failing the batch.
#[derive(Debug, Deserialize)]
struct SuggestionWire {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(rename = "categoryType", default)]
    category_type: String,
    #[serde(default)]
    reason: String,
    #[serde(rename = "originalId", default)]
    original_id: Option<String>,
}

/// Parse the provider's JSON into suggestions, failing closed.
///
/// Malformed JSON, a non-array payload, or unusable items all degrade to
/// an empty (or shorter) list - never an error.
pub fn parse_suggestions(text: &str) -> Vec<EvolutionSuggestion> {
    let wires: Vec<SuggestionWire> = match serde_json::from_str(extract_json(text)) {
        Ok(wires) => wires,
        Err(_) => return Vec::new(),
    };

    wires
        .into_iter()
        .filter_map(|wire| {
            if wire.name.trim().is_empty() {
                return None;
            }
            let kind = match wire.kind.as_str() {
                "NEW" => SuggestionKind::New,
                "UPDATE" => SuggestionKind::Update,
                _ => return None,
            };
            Some(EvolutionSuggestion {
                name: wire.name,
                description: wire.description,
                kind,
                entity_type: EntityKind::from_wire(&wire.category_type),
                reason: wire.reason,
                original_entry_id: wire.original_id.filter(|id| !id.is_empty()),
            })
        })
        .collect()
}

/// Analyzes chapter text against the current knowledge base and proposes
/// reconciliation suggestions.
pub struct EvolutionAnalyzer<P> {
    provider: P,
}

impl<P: TextProvider> EvolutionAnalyzer<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Ask the provider for suggested knowledge-base changes.
    ///
    /// Empty chapter text is rejected up front. Provider failures and
    /// malformed output both yield an empty suggestion list.
    pub async fn analyze(
        &self,
        chapter_text: &str,
        work: &Work,
    ) -> Result<Vec<EvolutionSuggestion>, EvolutionError> {
        if chapter_text.trim().is_empty() {
            return Err(EvolutionError::EmptyChapter);
        }

        let prompt = build_evolution_prompt(chapter_text, work);

        match self
            .provider
            .complete_structured(&prompt, Some(EVOLUTION_TEMPERATURE))
            .await
        {
            Ok(text) => Ok(parse_suggestions(&text)),
            Err(e) => {
                warn!("evolution analysis failed: {e}");
                Ok(Vec::new())
            }
        }
    }
}

/// Build the suggestion prompt: a summarized projection of every existing
/// entry plus the new chapter text.
fn build_evolution_prompt(chapter_text: &str, work: &Work) -> String {
    let existing = work
        .entries
        .iter()
        .map(|entry| {
            let category = work.category_name(entry.category_id).unwrap_or("设定");
            let summary: String = entry.content.chars().take(ENTRY_SUMMARY_CHARS).collect();
            format!(
                "ID: {} | Type: {} | Name: {}\nSummary: {}...",
                entry.id, category, entry.title, summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n");

    format!(
        r#"作为小说设定整理助手，请阅读以下【最新章节内容】以及现有的【知识库摘要】。
你的任务是捕捉故事中新出现的或发生变化的所有重要元素，并输出 JSON 格式的更新建议。

范围包括：
1. **人物 (CHARACTER)**: 新角色登场、老角色技能/性格/状态更新。
2. **世界观 (WORLD)**: 新地点、新组织、新历史背景、新法则。
3. **物品/金手指 (ITEM)**: 获得新道具、武器升级、重要物品丢失。
4. **其他 (OTHER)**: 不属于上述但重要的设定。

【现有知识库摘要】:
{existing}

【最新章节内容】:
{chapter_text}

任务要求：
1. **NEW**: 只有当该元素在【现有知识库】中完全不存在，且在章节中有具体描述时，才标记为 NEW。
2. **UPDATE**: 如果元素已存在（请仔细比对名称），且发生了重要变化（如：重伤、升级、秘密揭露），标记为 UPDATE。
3. 忽略琐碎信息（如角色只是吃了个饭，或仅仅路过某地）。

请**严格**只返回一个 JSON 数组，格式如下：
[
    {{
        "name": "条目名称",
        "description": "完整的设定描述（Markdown格式，包含外貌/功能/地理位置/历史等）",
        "type": "NEW" (或 "UPDATE"),
        "categoryType": "CHARACTER" (或 "WORLD", "ITEM", "OTHER"),
        "reason": "简述理由（例如：第X章获得了神剑...）",
        "originalId": "如果是UPDATE，请准确填入上方提供的ID，否则留空"
    }}
]"#
    )
}

/// Review default: every suggestion starts selected; the user deselects.
pub fn default_selection(suggestions: &[EvolutionSuggestion]) -> HashSet<usize> {
    (0..suggestions.len()).collect()
}

/// Result of applying a batch of suggestions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Entries whose content was overwritten.
    pub updated_entries: usize,
    /// Entries appended (including updates that fell back to creation).
    pub new_entries: usize,
    /// Categories auto-created during this commit.
    pub created_categories: Vec<CategoryId>,
}

impl ApplyOutcome {
    pub fn applied(&self) -> usize {
        self.updated_entries + self.new_entries
    }
}

/// Apply the selected suggestions to the work, in suggestion order.
///
/// Update resolution: `original_entry_id` if still valid, else an exact
/// title match, else the suggestion is applied as a creation. Creations
/// resolve their category by keyword, reusing a category auto-created
/// earlier in the same commit so one commit never produces duplicate
/// categories for a type. The caller persists the work once afterwards.
pub fn apply_suggestions(
    work: &mut Work,
    suggestions: &[EvolutionSuggestion],
    selected: &HashSet<usize>,
) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::default();
    let mut auto_created: HashMap<EntityKind, CategoryId> = HashMap::new();

    for (index, suggestion) in suggestions.iter().enumerate() {
        if !selected.contains(&index) {
            continue;
        }

        if suggestion.kind == SuggestionKind::Update {
            let target = suggestion
                .original_entry_id
                .as_deref()
                .and_then(|id| {
                    work.entries
                        .iter()
                        .position(|e| e.id.to_string() == id)
                })
                .or_else(|| {
                    work.entries
                        .iter()
                        .position(|e| e.title == suggestion.name)
                });

            if let Some(position) = target {
                work.entries[position].content = suggestion.description.clone();
                outcome.updated_entries += 1;
                continue;
            }
            // Target gone: fall through and apply as a creation
        }

        let category_id = resolve_category(work, &mut auto_created, suggestion.entity_type);
        work.entries.push(crate::work::KnowledgeEntry::new(
            category_id,
            suggestion.name.clone(),
            suggestion.description.clone(),
        ));
        outcome.new_entries += 1;
    }

    if outcome.applied() > 0 {
        work.touch();
    }
    outcome.created_categories = auto_created.into_values().collect();
    outcome
}

/// Find the category a new entry of this kind belongs in, creating at most
/// one auto-named category per kind per commit.
fn resolve_category(
    work: &mut Work,
    auto_created: &mut HashMap<EntityKind, CategoryId>,
    kind: EntityKind,
) -> CategoryId {
    if let Some(category) = work.categories.iter().find(|c| {
        let lower = c.name.to_lowercase();
        kind.keywords().iter().any(|k| lower.contains(k))
    }) {
        return category.id;
    }

    if let Some(id) = auto_created.get(&kind) {
        return *id;
    }

    let id = work.add_category(format!("{} (auto)", kind.default_category_name()));
    auto_created.insert(kind, id);
    id
}
