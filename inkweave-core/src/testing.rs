//! Testing utilities.
//!
//! `MockProvider` replays scripted completions so engine behavior can be
//! exercised deterministically without API calls, and records every prompt
//! it receives for assertions.

use crate::provider::{ProviderError, TextProvider};
use crate::work::{EntryId, Work};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Chunk size used when a scripted response is streamed.
const STREAM_CHUNK_CHARS: usize = 8;

#[derive(Debug, Clone)]
enum Scripted {
    Text(String),
    Failure,
}

#[derive(Default)]
struct MockState {
    responses: VecDeque<Scripted>,
    prompts: Vec<String>,
}

/// A provider that replays scripted responses in order.
///
/// Clones share the same script and prompt log, so a clone can be handed
/// to an engine while the original stays available for assertions.
#[derive(Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn enqueue(&self, text: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .responses
            .push_back(Scripted::Text(text.into()));
    }

    /// Queue a provider failure.
    pub fn enqueue_failure(&self) {
        self.state
            .lock()
            .unwrap()
            .responses
            .push_back(Scripted::Failure);
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.state.lock().unwrap().prompts.clone()
    }

    fn next(&self, prompt: &str) -> Result<String, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.prompts.push(prompt.to_string());
        match state.responses.pop_front() {
            Some(Scripted::Text(text)) => Ok(text),
            Some(Scripted::Failure) => {
                Err(ProviderError::Request("scripted failure".to_string()))
            }
            None => Err(ProviderError::Exhausted),
        }
    }
}

#[async_trait]
impl TextProvider for MockProvider {
    async fn complete(
        &self,
        _system: Option<&str>,
        prompt: &str,
        _temperature: Option<f32>,
    ) -> Result<String, ProviderError> {
        self.next(prompt)
    }

    async fn complete_streaming(
        &self,
        _system: Option<&str>,
        prompt: &str,
        _temperature: Option<f32>,
        sink: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String, ProviderError> {
        let text = self.next(prompt)?;

        let chars: Vec<char> = text.chars().collect();
        for chunk in chars.chunks(STREAM_CHUNK_CHARS) {
            let chunk: String = chunk.iter().collect();
            sink(&chunk);
        }

        Ok(text)
    }

    async fn complete_structured(
        &self,
        prompt: &str,
        _temperature: Option<f32>,
    ) -> Result<String, ProviderError> {
        self.next(prompt)
    }
}

/// A small work with a populated knowledge base for tests.
///
/// Layout: 人物/Aria, 物品/Moonblade, 大纲/主线, plus one chapter of text.
pub fn sample_work() -> (Work, EntryId, EntryId, EntryId) {
    let mut work = Work::new("星落之城", "废土之上的最后一座城。", "科幻");
    work.categories.clear();

    let roles = work.add_category("人物");
    let items = work.add_category("物品");
    let outline = work.add_category("大纲");

    let aria = work
        .add_entry(roles, "Aria", "少女剑士，城破之夜的幸存者。")
        .unwrap();
    let blade = work
        .add_entry(items, "Moonblade", "一把会在月光下低鸣的古剑。")
        .unwrap();
    let plot = work
        .add_entry(outline, "主线", "第一卷：城破之日；第二卷：南行。")
        .unwrap();

    let chapter = work.add_chapter("第 1 章");
    work.chapter_mut(chapter).unwrap().content = "城墙在黄昏中陷落，Aria 握紧了剑。".to_string();

    (work, aria, blade, plot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_replays_in_order() {
        let provider = MockProvider::new();
        provider.enqueue("first");
        provider.enqueue("second");

        assert_eq!(provider.complete(None, "p1", None).await.unwrap(), "first");
        assert_eq!(
            provider.complete_structured("p2", None).await.unwrap(),
            "second"
        );
        assert!(matches!(
            provider.complete(None, "p3", None).await,
            Err(ProviderError::Exhausted)
        ));

        assert_eq!(provider.prompts(), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_mock_streaming_chunks_reassemble() {
        let provider = MockProvider::new();
        provider.enqueue("夜色像潮水一样涌进城门，守军的火把次第熄灭。");

        let mut streamed = String::new();
        let mut chunks = 0;
        let full = provider
            .complete_streaming(None, "p", None, &mut |chunk: &str| {
                streamed.push_str(chunk);
                chunks += 1;
            })
            .await
            .unwrap();

        assert_eq!(streamed, full);
        assert!(chunks > 1);
    }

    #[tokio::test]
    async fn test_mock_scripted_failure() {
        let provider = MockProvider::new();
        provider.enqueue_failure();
        assert!(provider.complete(None, "p", None).await.is_err());
    }

    #[test]
    fn test_sample_work_shape() {
        let (work, aria, _blade, _plot) = sample_work();
        assert_eq!(work.categories.len(), 3);
        assert_eq!(work.entries.len(), 3);
        assert_eq!(work.entry(aria).unwrap().title, "Aria");
        assert_eq!(work.chapters.len(), 1);
    }
}
