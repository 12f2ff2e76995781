//! Consistency auditing: comparing generated text against the knowledge
//! base and reporting conflicts.
//!
//! The audit uses a coarser category filter than the reconciler's
//! classification table - anything that smells like character, world,
//! setting, or item material is included wholesale. The optional fix pass
//! rewrites the working text only; it never touches the knowledge base.

use crate::provider::{ProviderError, TextProvider};
use crate::work::{KnowledgeEntry, Work};

/// Temperature for analytical passes.
const AUDIT_TEMPERATURE: f32 = 0.2;

/// Category names carrying setting material worth auditing against.
/// Lowercase; matching is case-insensitive substring.
const SETTING_KEYWORDS: &[&str] = &[
    "人物",
    "角色",
    "主角",
    "反派",
    "世界观",
    "背景",
    "设定",
    "物品",
    "金手指",
    "character",
    "world",
    "setting",
    "item",
];

/// Returned without a provider call when the filter finds nothing.
pub const NO_SETTINGS_MESSAGE: &str =
    "未在知识库中检测到相关的设定条目（人物、背景、世界观等），无法进行对比分析。\n\n请先在知识库中补充相关设定。";

/// Whether a category name carries auditable setting material.
pub fn is_setting_category(name: &str) -> bool {
    let lower = name.to_lowercase();
    SETTING_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Audits generated text against the knowledge base.
pub struct ConsistencyAuditor<P> {
    provider: P,
}

impl<P: TextProvider> ConsistencyAuditor<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Produce a conflict report for a generated segment.
    ///
    /// If no setting-like entries exist, a fixed explanatory message is
    /// returned without calling the provider.
    pub async fn audit(&self, text: &str, work: &Work) -> Result<String, ProviderError> {
        let entries = setting_entries(work);
        if entries.is_empty() {
            return Ok(NO_SETTINGS_MESSAGE.to_string());
        }

        let context = build_setting_context(work, &entries);
        let prompt = format!(
            r#"你是一位专业的小说连贯性编辑。请分析以下“生成文本”，将其与提供的“知识库设定”进行对比。

任务目标：
1. **人物一致性**: 检查角色的言行、性格、能力是否与设定矛盾 (OOC)。
2. **世界观与逻辑**: 检查环境描写、魔法/科技规则、历史背景、物品使用是否与世界观设定冲突。

知识库设定：
{context}

生成文本：
{text}

输出要求：
1. 若发现冲突，请分点列出，格式为：“❌ [冲突类型] 描述... (依据: 设定标题)”。
2. 若发现潜在风险（如语气略有偏移），标记为“⚠️”。
3. 若未发现明显问题，请回答“✅ 未检测到明显的设定冲突。”
4. 请保持客观、简练。"#
        );

        self.provider
            .complete(None, &prompt, Some(AUDIT_TEMPERATURE))
            .await
    }

    /// Rewrite the segment so it no longer conflicts with the settings.
    ///
    /// Takes the prior report as guidance and returns replacement text;
    /// the knowledge base is left untouched.
    pub async fn revise(
        &self,
        text: &str,
        work: &Work,
        report: &str,
    ) -> Result<String, ProviderError> {
        let entries = setting_entries(work);
        let context = build_setting_context(work, &entries);

        let prompt = format!(
            r#"你是一位专业的小说改稿编辑。以下“原始文本”与知识库设定存在冲突，冲突详情见“检查报告”。
请在尽量保留原文情节、文风和篇幅的前提下，改写文本以消除全部冲突。

知识库设定：
{context}

检查报告：
{report}

原始文本：
{text}

请只返回改写后的正文，不要附加任何说明。"#
        );

        self.provider
            .complete(None, &prompt, Some(AUDIT_TEMPERATURE))
            .await
    }
}

/// Entries whose category passes the setting filter, in entry order.
fn setting_entries(work: &Work) -> Vec<&KnowledgeEntry> {
    let setting_categories: Vec<_> = work
        .categories
        .iter()
        .filter(|c| is_setting_category(&c.name))
        .map(|c| c.id)
        .collect();

    work.entries
        .iter()
        .filter(|e| setting_categories.contains(&e.category_id))
        .collect()
}

fn build_setting_context(work: &Work, entries: &[&KnowledgeEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            let category = work.category_name(e.category_id).unwrap_or("设定");
            format!("【{category}】 {}:\n{}", e.title, e.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
