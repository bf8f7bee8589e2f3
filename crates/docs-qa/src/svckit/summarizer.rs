//! LLM Summarizer
//!
//! Condenses tool output with a (usually cheaper) model. Any failure
//! returns the original text.

use std::sync::Arc;
use std::time::Duration;

use agent_core::provider::{GenerationOptions, LlmProvider};
use agent_core::tool::{Summarizer, truncate_chars};
use agent_core::Message;
use async_trait::async_trait;

use crate::SUMMARY_PROMPT;

/// Summarizer backed by an `LlmProvider`
pub struct LlmSummarizer {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
    /// Input clip, in characters
    max_input: usize,
    timeout: Duration,
}

impl std::fmt::Debug for LlmSummarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSummarizer")
            .field("model", &self.options.model)
            .field("max_input", &self.max_input)
            .finish_non_exhaustive()
    }
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn LlmProvider>, options: GenerationOptions) -> Self {
        Self {
            provider,
            options,
            max_input: 20_000,
            timeout: Duration::from_secs(60),
        }
    }

    pub const fn max_input(mut self, chars: usize) -> Self {
        self.max_input = chars;
        self
    }

    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn messages(&self, text: &str, query: &str) -> Vec<Message> {
        vec![
            Message::system(SUMMARY_PROMPT),
            Message::user(format!(
                "Question: {query}\n\nContent:\n{}",
                truncate_chars(text, self.max_input)
            )),
        ]
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, text: &str, query: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }

        let messages = self.messages(text, query);
        let call = self.provider.complete(&messages, &self.options);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(completion)) if !completion.content.trim().is_empty() => {
                tracing::debug!(
                    before = text.chars().count(),
                    after = completion.content.chars().count(),
                    "summarized tool output"
                );
                completion.content.trim().to_string()
            }
            Ok(Ok(_)) => {
                tracing::warn!("summarizer returned nothing, keeping original text");
                text.to_string()
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "summarization failed, keeping original text");
                text.to_string()
            }
            Err(_) => {
                tracing::warn!("summarization timed out, keeping original text");
                text.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;

    #[tokio::test]
    async fn test_summary_replaces_text() {
        let provider = Arc::new(MockProvider::replying("  short version  "));
        let summarizer = LlmSummarizer::new(provider.clone(), GenerationOptions::default());
        let out = summarizer.summarize("a very long page", "what?").await;
        assert_eq!(out, "short version");

        let prompt = provider.last_prompt().unwrap();
        assert!(prompt.contains("Question: what?"));
        assert!(prompt.contains("a very long page"));
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_original() {
        let summarizer = LlmSummarizer::new(Arc::new(MockProvider::failing()), GenerationOptions::default());
        assert_eq!(summarizer.summarize("original", "q").await, "original");

        let summarizer = LlmSummarizer::new(Arc::new(MockProvider::replying("  ")), GenerationOptions::default());
        assert_eq!(summarizer.summarize("original", "q").await, "original");
    }
}
