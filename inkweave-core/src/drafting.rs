//! Drafting: assembling generation requests and streaming the prose back.
//!
//! The draft prompt layers the work header, the selected knowledge
//! references, and a recap of the previous two chapters (summary when one
//! exists, otherwise a bounded prefix of the raw text) under the novelist
//! system persona. Summaries and title ideas are convenience passes that
//! degrade to empty output on provider failure - a failed summary must
//! never interrupt writing.

use crate::provider::{ProviderError, TextProvider};
use crate::work::Work;
use tracing::warn;

/// System persona for all prose generation.
pub const NOVELIST_SYSTEM_PROMPT: &str = "你是一位专家级的小说家和创意写作助手。
请用高质量、引人入胜且描写细腻的简体中文进行写作。
你的目标是帮助用户撰写小说，生成章节、大纲或续写场景。
保持语气、角色声音和情节走向的一致性。";

/// Temperature for prose drafting - slightly creative.
const DRAFT_TEMPERATURE: f32 = 0.8;

/// How many previous chapters feed the recap.
const RECAP_CHAPTERS: usize = 2;

/// Recap prefix length for chapters without a summary.
const RECAP_PREFIX_CHARS: usize = 500;

/// Drafts prose for a work using the configured provider.
pub struct Drafter<P> {
    provider: P,
}

impl<P: TextProvider> Drafter<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Generate a story segment, streaming chunks to `sink` as they arrive.
    ///
    /// `chapter_index` positions the recap window; `references` are the
    /// formatted knowledge strings chosen by retrieval. Returns the full
    /// generated text.
    pub async fn draft_segment(
        &self,
        work: &Work,
        chapter_index: usize,
        instruction: &str,
        references: &[String],
        target_word_count: Option<usize>,
        sink: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, ProviderError> {
        let prompt = build_draft_prompt(
            work,
            chapter_index,
            instruction,
            references,
            target_word_count,
        );

        self.provider
            .complete_streaming(
                Some(NOVELIST_SYSTEM_PROMPT),
                &prompt,
                Some(DRAFT_TEMPERATURE),
                sink,
            )
            .await
    }

    /// Summarize a chapter in a few sentences for use as future context.
    /// Failures degrade to an empty string.
    pub async fn summarize_chapter(&self, chapter_content: &str) -> String {
        let prompt = format!(
            "请用3-4句话总结以下章节内容（使用中文），作为未来写作的上下文：\n\n{chapter_content}"
        );

        match self.provider.complete(None, &prompt, None).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("chapter summary failed: {e}");
                String::new()
            }
        }
    }

    /// Propose a handful of titles with one-line hooks for a topic.
    /// Failures degrade to an empty string.
    pub async fn title_ideas(&self, topic: &str) -> String {
        let prompt = format!(
            "基于主题“{topic}”，提供3个富有创意的小说标题和一句话的简短钩子（Hook）。请以简单的列表形式用中文返回。"
        );

        match self.provider.complete(None, &prompt, None).await {
            Ok(ideas) => ideas,
            Err(e) => {
                warn!("title ideas failed: {e}");
                String::new()
            }
        }
    }
}

/// Assemble the full drafting prompt.
pub fn build_draft_prompt(
    work: &Work,
    chapter_index: usize,
    instruction: &str,
    references: &[String],
    target_word_count: Option<usize>,
) -> String {
    let mut context = format!(
        "小说标题: {}\n类型: {}\n简介/梗概: {}\n\n",
        work.title, work.genre, work.description
    );

    if !references.is_empty() {
        context.push_str("【参考资料 / 知识库】:\n");
        context.push_str(&references.join("\n\n"));
        context.push_str("\n\n");
    }

    let recap_start = chapter_index.saturating_sub(RECAP_CHAPTERS);
    let previous = work
        .chapters
        .get(recap_start..chapter_index)
        .unwrap_or_default();
    if !previous.is_empty() {
        context.push_str("前情回顾:\n");
        for (offset, chapter) in previous.iter().enumerate() {
            let recap = match &chapter.summary {
                Some(summary) => summary.clone(),
                None => {
                    let prefix: String =
                        chapter.content.chars().take(RECAP_PREFIX_CHARS).collect();
                    format!("{prefix}...")
                }
            };
            context.push_str(&format!("第 {} 章: {recap}\n", recap_start + offset + 1));
        }
    }

    let length_instruction = match target_word_count {
        Some(count) if count > 0 => format!(
            "\n\n【重要要求】：请生成大约 {count} 个中文字符的内容。尽量贴近这个字数，不要过短或过长。"
        ),
        _ => String::new(),
    };

    format!(
        "\n{context}\n当前任务:\n{instruction}\n{length_instruction}\n\n请用中文撰写。\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;
    use crate::work::Work;

    fn work_with_chapters() -> Work {
        let mut work = Work::new("星落之城", "废土之上的最后一座城", "科幻");
        let first = work.add_chapter("第 1 章");
        work.chapter_mut(first).unwrap().content = "城墙在黄昏中陷落。".to_string();
        work.chapter_mut(first).unwrap().summary = Some("城破，主角出逃。".to_string());

        let second = work.add_chapter("第 2 章");
        work.chapter_mut(second).unwrap().content = "废墟之间，幸存者结队而行。".repeat(100);

        work.add_chapter("第 3 章");
        work
    }

    #[test]
    fn test_prompt_header_and_task() {
        let work = work_with_chapters();
        let prompt = build_draft_prompt(&work, 0, "写开场", &[], None);

        assert!(prompt.contains("小说标题: 星落之城"));
        assert!(prompt.contains("类型: 科幻"));
        assert!(prompt.contains("当前任务:\n写开场"));
        assert!(prompt.contains("请用中文撰写"));
        // First chapter: nothing to recap
        assert!(!prompt.contains("前情回顾"));
    }

    #[test]
    fn test_prompt_recap_prefers_summary_and_truncates_raw() {
        let work = work_with_chapters();
        let prompt = build_draft_prompt(&work, 2, "续写", &[], None);

        assert!(prompt.contains("前情回顾"));
        // Chapter 1 contributes its summary, not its raw text
        assert!(prompt.contains("城破，主角出逃。"));
        assert!(!prompt.contains("城墙在黄昏中陷落"));
        // Chapter 2 has no summary: a bounded prefix with ellipsis
        let recap_line = prompt
            .lines()
            .find(|l| l.starts_with("第 2 章:"))
            .expect("chapter 2 recap");
        assert!(recap_line.chars().count() < RECAP_PREFIX_CHARS + 20);
        assert!(recap_line.ends_with("..."));
    }

    #[test]
    fn test_prompt_includes_references_block_when_present() {
        let work = work_with_chapters();
        let references = vec!["[人物] Aria:\n少女剑士。".to_string()];
        let prompt = build_draft_prompt(&work, 0, "续写", &references, None);

        assert!(prompt.contains("【参考资料 / 知识库】"));
        assert!(prompt.contains("[人物] Aria"));

        let without = build_draft_prompt(&work, 0, "续写", &[], None);
        assert!(!without.contains("【参考资料 / 知识库】"));
    }

    #[test]
    fn test_prompt_word_count_instruction() {
        let work = work_with_chapters();
        let prompt = build_draft_prompt(&work, 0, "续写", &[], Some(2000));
        assert!(prompt.contains("大约 2000 个中文字符"));

        let none = build_draft_prompt(&work, 0, "续写", &[], Some(0));
        assert!(!none.contains("中文字符"));
    }

    #[tokio::test]
    async fn test_draft_segment_streams_chunks_in_order() {
        let provider = MockProvider::new();
        provider.enqueue("夜色像潮水一样涌进城门。");
        let drafter = Drafter::new(provider);
        let work = work_with_chapters();

        let mut streamed = String::new();
        let full = drafter
            .draft_segment(&work, 2, "续写", &[], None, &mut |chunk: &str| {
                streamed.push_str(chunk)
            })
            .await
            .unwrap();

        assert_eq!(full, "夜色像潮水一样涌进城门。");
        assert_eq!(streamed, full);
    }

    #[tokio::test]
    async fn test_summary_degrades_to_empty_on_failure() {
        let provider = MockProvider::new();
        provider.enqueue_failure();
        let drafter = Drafter::new(provider);

        assert_eq!(drafter.summarize_chapter("一些内容").await, "");
    }

    #[tokio::test]
    async fn test_title_ideas_degrades_to_empty_on_failure() {
        let provider = MockProvider::new();
        provider.enqueue_failure();
        let drafter = Drafter::new(provider);

        assert_eq!(drafter.title_ideas("末日孤城").await, "");
    }
}
