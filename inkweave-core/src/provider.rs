//! The text-provider seam.
//!
//! Everything that talks to a generative model goes through [`TextProvider`]
//! so the engines can run against the real Gemini client or a scripted mock.
//! Structured completions return raw JSON text; validation happens at the
//! call sites, which fail closed to empty collections on malformed output.

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;

/// Errors from a text provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),

    #[error("no scripted response available")]
    Exhausted,
}

impl From<gemini::Error> for ProviderError {
    fn from(e: gemini::Error) -> Self {
        ProviderError::Request(e.to_string())
    }
}

/// A generative text provider.
///
/// Calls may reject with a generic failure; streaming delivers chunks to
/// the sink in arrival order and cannot be cancelled once started.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Run a free-text completion and return the full text.
    async fn complete(
        &self,
        system: Option<&str>,
        prompt: &str,
        temperature: Option<f32>,
    ) -> Result<String, ProviderError>;

    /// Run a free-text completion, feeding chunks to `sink` as they arrive.
    /// Returns the accumulated full text. Some chunks may have reached the
    /// sink even when the call ultimately fails.
    async fn complete_streaming(
        &self,
        system: Option<&str>,
        prompt: &str,
        temperature: Option<f32>,
        sink: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String, ProviderError>;

    /// Run a completion in JSON mode and return the raw JSON text.
    async fn complete_structured(
        &self,
        prompt: &str,
        temperature: Option<f32>,
    ) -> Result<String, ProviderError>;
}

#[async_trait]
impl TextProvider for gemini::Gemini {
    async fn complete(
        &self,
        system: Option<&str>,
        prompt: &str,
        temperature: Option<f32>,
    ) -> Result<String, ProviderError> {
        let mut request = gemini::Request::new(prompt);
        if let Some(system) = system {
            request = request.with_system(system);
        }
        if let Some(temperature) = temperature {
            request = request.with_temperature(temperature);
        }

        let response = self.complete(request).await?;
        Ok(response.text)
    }

    async fn complete_streaming(
        &self,
        system: Option<&str>,
        prompt: &str,
        temperature: Option<f32>,
        sink: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String, ProviderError> {
        let mut request = gemini::Request::new(prompt);
        if let Some(system) = system {
            request = request.with_system(system);
        }
        if let Some(temperature) = temperature {
            request = request.with_temperature(temperature);
        }

        let mut stream = self.stream(request).await?;
        let mut full_text = String::new();

        while let Some(event) = stream.next().await {
            match event? {
                gemini::StreamEvent::Text { text } => {
                    sink(&text);
                    full_text.push_str(&text);
                }
                gemini::StreamEvent::Finished { .. } => {}
            }
        }

        Ok(full_text)
    }

    async fn complete_structured(
        &self,
        prompt: &str,
        temperature: Option<f32>,
    ) -> Result<String, ProviderError> {
        let mut request = gemini::Request::new(prompt).with_json_response();
        if let Some(temperature) = temperature {
            request = request.with_temperature(temperature);
        }

        let response = self.complete(request).await?;
        Ok(response.text)
    }
}

/// Extract JSON from a response that might have markdown code blocks.
///
/// JSON mode mostly returns bare JSON, but models occasionally wrap the
/// payload in ``` fences anyway.
pub(crate) fn extract_json(text: &str) -> &str {
    let text = text.trim();

    // Handle ```json ... ``` blocks
    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    // Handle ``` ... ``` blocks (without json specifier)
    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        let text = r#"["a", "b"]"#;
        assert_eq!(extract_json(text), text);
    }

    #[test]
    fn test_extract_json_markdown() {
        let text = "```json\n[\"a\"]\n```";
        assert_eq!(extract_json(text), r#"["a"]"#);
    }

    #[test]
    fn test_extract_json_markdown_no_specifier() {
        let text = "```\n{\"x\": 1}\n```";
        assert_eq!(extract_json(text), r#"{"x": 1}"#);
    }

    #[test]
    fn test_extract_json_whitespace() {
        assert_eq!(extract_json("  [1, 2]  \n"), "[1, 2]");
    }
}
