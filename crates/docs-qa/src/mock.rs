//! Mock Backends
//!
//! In-process stand-ins for the search API, page fetches, the LLM and the
//! oracle. Used by tests here and in the server crate.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use agent_core::message::Message;
use agent_core::provider::{Completion, FinishReason, GenerationOptions, LlmProvider};
use agent_core::reasoning::{Action, DecisionContext, Oracle};
use agent_core::tool::{AllowList, ScrapeTool, SearchQuery, SearchResult, SearchTool, ToolKind};
use agent_core::{AgentError, Result};
use async_trait::async_trait;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// LLM
// ============================================================================

/// LLM returning canned replies
#[derive(Debug, Default)]
pub struct MockProvider {
    replies: Mutex<VecDeque<String>>,
    /// Repeated once the queue is empty
    fallback: String,
    fail: bool,
    prompts: Mutex<Vec<String>>,
}

impl MockProvider {
    /// Always reply with `text`
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            fallback: text.into(),
            ..Self::default()
        }
    }

    /// Reply with each entry in turn, then repeat the last one
    pub fn scripted<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        let replies: VecDeque<String> = replies.into_iter().map(Into::into).collect();
        Self {
            fallback: replies.back().cloned().unwrap_or_default(),
            replies: Mutex::new(replies),
            ..Self::default()
        }
    }

    /// Every call fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Flattened text of the most recent request
    pub fn last_prompt(&self) -> Option<String> {
        lock(&self.prompts).last().cloned()
    }

    pub fn calls(&self) -> usize {
        lock(&self.prompts).len()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.fail)
    }

    async fn complete(&self, messages: &[Message], options: &GenerationOptions) -> Result<Completion> {
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        lock(&self.prompts).push(prompt);

        if self.fail {
            return Err(AgentError::RemoteService("mock provider is down".into()));
        }

        let content = lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(Completion {
            content,
            model: options.model.clone(),
            usage: None,
            finish_reason: Some(FinishReason::Stop),
        })
    }
}

// ============================================================================
// Search
// ============================================================================

/// Search backend over a fixed result list, honouring the allow-list
#[derive(Debug, Default)]
pub struct MockSearch {
    results: Vec<SearchResult>,
    queries: Mutex<Vec<SearchQuery>>,
}

impl MockSearch {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        lock(&self.queries).len()
    }

    /// Every request received so far
    pub fn queries(&self) -> Vec<SearchQuery> {
        lock(&self.queries).clone()
    }
}

/// Shorthand for a search hit
pub fn hit(url: &str, snippet: &str, score: f64) -> SearchResult {
    SearchResult {
        title: url.rsplit('/').find(|s| !s.is_empty()).unwrap_or(url).to_string(),
        url: url.to_string(),
        snippet: snippet.to_string(),
        score,
    }
}

#[async_trait]
impl SearchTool for MockSearch {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        if query.allowed.is_empty() {
            return Err(AgentError::Config("search requires a non-empty allow-list".into()));
        }
        lock(&self.queries).push(query.clone());
        Ok(self
            .results
            .iter()
            .filter(|r| query.allowed.permits_url(&r.url))
            .take(query.max_results)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Scrape
// ============================================================================

/// Page fetcher over an in-memory site
#[derive(Debug, Default)]
pub struct MockScraper {
    pages: HashMap<String, String>,
    fetched: Mutex<Vec<String>>,
}

impl MockScraper {
    pub fn new<K: Into<String>, V: Into<String>>(pages: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            pages: pages.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// URLs actually fetched, in order
    pub fn fetched(&self) -> Vec<String> {
        lock(&self.fetched).clone()
    }
}

#[async_trait]
impl ScrapeTool for MockScraper {
    async fn scrape(&self, url: &str, allowed: &AllowList) -> Result<String> {
        if !allowed.permits_url(url) {
            return Err(AgentError::PolicyViolation(format!("{url} is outside the approved sites")));
        }
        lock(&self.fetched).push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| AgentError::RemoteService(format!("HTTP 404 Not Found for {url}")))
    }
}

// ============================================================================
// Oracle
// ============================================================================

/// Deterministic oracle: search the question, scrape when asked to
/// escalate, then answer from the freshest observation.
#[derive(Debug, Default)]
pub struct RuleOracle {
    delay: Option<Duration>,
}

impl RuleOracle {
    pub const fn new() -> Self {
        Self { delay: None }
    }

    /// Sleep before every decision
    pub const fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }
}

#[async_trait]
impl Oracle for RuleOracle {
    async fn decide(&self, ctx: &DecisionContext<'_>) -> Result<Action> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(url) = ctx.escalation {
            return Ok(Action::Scrape { url: url.to_string() });
        }

        let Some(latest) = ctx.observations.iter().rev().find(|i| i.success) else {
            return Ok(Action::Search { query: ctx.question.to_string() });
        };

        let (text, sources) = match latest.tool {
            ToolKind::Scrape => (latest.output.clone(), vec![latest.input.clone()]),
            ToolKind::Search => match latest.results.first() {
                Some(top) => (top.snippet.clone(), vec![top.url.clone()]),
                None => ("No approved page covers this.".to_string(), Vec::new()),
            },
        };
        Ok(Action::Answer { text, sources })
    }
}
