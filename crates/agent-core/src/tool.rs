//! Tool System
//!
//! Contracts for the two retrieval tiers (search, then scrape) and the optional
//! summarizer, plus the `ToolBox` that runs them with timeouts, the single
//! search retry and the allow-list guard.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

// ============================================================================
// Allow-list
// ============================================================================

/// Normalize a configured site or URL host to a bare lowercase hostname.
///
/// Accepts `docs.rs`, `https://docs.rs/`, `www.docs.rs/foo` and returns
/// `docs.rs` for all of them.
pub fn normalize_host(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let parsed = url::Url::parse(&with_scheme).ok()?;
    let host = parsed.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() { None } else { Some(host) }
}

/// Set of hostnames a turn may search or scrape
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowList {
    sites: BTreeSet<String>,
}

impl AllowList {
    pub fn new<I, S>(sites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            sites: sites
                .into_iter()
                .filter_map(|s| normalize_host(s.as_ref()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.sites.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.sites.iter().cloned().collect()
    }

    pub fn contains_site(&self, site: &str) -> bool {
        self.sites.contains(site)
    }

    /// Exact host or any subdomain of an allowed site
    pub fn permits_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        self.sites
            .iter()
            .any(|site| host == site || host.ends_with(&format!(".{site}")))
    }

    /// http(s) URL whose host is permitted
    pub fn permits_url(&self, raw: &str) -> bool {
        url::Url::parse(raw.trim()).is_ok_and(|u| {
            matches!(u.scheme(), "http" | "https")
                && u.host_str().is_some_and(|h| self.permits_host(h))
        })
    }
}

// ============================================================================
// Search
// ============================================================================

/// How hard the search backend should dig
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    #[default]
    Basic,
    Advanced,
}

impl SearchDepth {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Advanced => "advanced",
        }
    }
}

impl std::str::FromStr for SearchDepth {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "advanced" => Ok(Self::Advanced),
            other => Err(AgentError::Config(format!("invalid search depth '{other}'"))),
        }
    }
}

impl std::fmt::Display for SearchDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A search request restricted to an allow-list
#[derive(Clone, Debug)]
pub struct SearchQuery {
    pub query: String,
    pub allowed: AllowList,
    pub max_results: usize,
    pub depth: SearchDepth,
}

/// One ranked search hit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(default)]
    pub score: f64,
}

impl SearchResult {
    /// Snippet carries at least `min_chars` non-whitespace characters
    pub fn is_usable(&self, min_chars: usize) -> bool {
        self.snippet.chars().filter(|c| !c.is_whitespace()).count() >= min_chars
    }
}

/// Hosted search backend
#[async_trait]
pub trait SearchTool: Send + Sync {
    /// Search within `query.allowed`. Implementations must refuse an empty allow-list.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>>;

    /// Whether the backend is reachable
    async fn health_check(&self) -> bool {
        true
    }
}

// ============================================================================
// Scrape
// ============================================================================

/// Single-page fetch and text extraction
#[async_trait]
pub trait ScrapeTool: Send + Sync {
    /// Fetch `url` and return its readable text.
    ///
    /// Fails with [`AgentError::PolicyViolation`] when the host is not in `allowed`.
    async fn scrape(&self, url: &str, allowed: &AllowList) -> Result<String>;
}

// ============================================================================
// Summarizer
// ============================================================================

/// Condenses tool output before the oracle sees it.
///
/// Infallible on purpose: implementations return the input text when they fail.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str, query: &str) -> String;
}

/// Summarizer used when summarization is disabled
#[derive(Clone, Copy, Debug, Default)]
pub struct PassThrough;

#[async_trait]
impl Summarizer for PassThrough {
    async fn summarize(&self, text: &str, _query: &str) -> String {
        text.to_string()
    }
}

// ============================================================================
// Invocation records
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Search,
    Scrape,
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Search => write!(f, "search"),
            Self::Scrape => write!(f, "scrape"),
        }
    }
}

/// Record of one tool call within a turn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: ToolKind,
    /// Search query or scrape URL
    pub input: String,
    /// Text shown to the oracle (content, or the failure reason)
    pub output: String,
    pub success: bool,
    /// Ranked hits (search only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<SearchResult>,
}

impl ToolInvocation {
    pub fn success(tool: ToolKind, input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool,
            input: input.into(),
            output: output.into(),
            success: true,
            results: Vec::new(),
        }
    }

    pub fn failure(tool: ToolKind, input: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            tool,
            input: input.into(),
            output: format!("Error: {error}"),
            success: false,
            results: Vec::new(),
        }
    }

    pub fn with_results(mut self, results: Vec<SearchResult>) -> Self {
        self.results = results;
        self
    }

    /// URLs this invocation can be cited for
    pub fn sources(&self) -> Vec<String> {
        if !self.success {
            return Vec::new();
        }
        match self.tool {
            ToolKind::Search => self.results.iter().map(|r| r.url.clone()).collect(),
            ToolKind::Scrape => vec![self.input.clone()],
        }
    }

    /// Format for injection into the oracle prompt
    pub fn to_observation(&self) -> String {
        let verdict = if self.success { "returned" } else { "failed" };
        format!("[Tool '{}' {} for '{}']\n{}", self.tool, verdict, self.input, self.output)
    }
}

/// Clip `text` to `max_chars` characters on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}\n[truncated]", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Render search hits as numbered plain text
pub fn format_results(results: &[SearchResult]) -> String {
    let mut out = String::new();
    for (i, r) in results.iter().enumerate() {
        let _ = writeln!(out, "[{}] {}\nURL: {}\n{}\n", i + 1, r.title, r.url, r.snippet.trim());
    }
    out.trim_end().to_string()
}

// ============================================================================
// ToolBox
// ============================================================================

/// Limits applied around every tool call
#[derive(Clone, Debug)]
pub struct ToolSettings {
    pub max_results: usize,
    pub depth: SearchDepth,
    /// Clip for formatted search output
    pub max_content_size: usize,
    /// Clip for scraped page text
    pub max_scrape_length: usize,
    /// Per-call timeout
    pub timeout: Duration,
    pub summarize: bool,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            max_results: 10,
            depth: SearchDepth::Basic,
            max_content_size: 10_000,
            max_scrape_length: 20_000,
            timeout: Duration::from_secs(30),
            summarize: false,
        }
    }
}

/// Runs tools and turns every outcome into a [`ToolInvocation`]
pub struct ToolBox {
    search: Arc<dyn SearchTool>,
    scrape: Arc<dyn ScrapeTool>,
    summarizer: Arc<dyn Summarizer>,
    settings: ToolSettings,
}

impl std::fmt::Debug for ToolBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBox").field("settings", &self.settings).finish_non_exhaustive()
    }
}

impl ToolBox {
    pub fn new(
        search: Arc<dyn SearchTool>,
        scrape: Arc<dyn ScrapeTool>,
        summarizer: Arc<dyn Summarizer>,
        settings: ToolSettings,
    ) -> Self {
        Self {
            search,
            scrape,
            summarizer,
            settings,
        }
    }

    pub const fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    pub async fn search_reachable(&self) -> bool {
        self.search.health_check().await
    }

    async fn search_once(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        tokio::time::timeout(self.settings.timeout, self.search.search(query))
            .await
            .unwrap_or_else(|_| {
                Err(AgentError::RemoteService(format!(
                    "search timed out after {}s",
                    self.settings.timeout.as_secs()
                )))
            })
    }

    /// Search within `allowed`, retrying a retryable failure once
    pub async fn run_search(&self, query: &str, allowed: &AllowList) -> ToolInvocation {
        if allowed.is_empty() {
            let err = AgentError::Config("search requires a non-empty allow-list".into());
            tracing::warn!(%query, "refusing unrestricted search");
            return ToolInvocation::failure(ToolKind::Search, query, err);
        }

        let request = SearchQuery {
            query: query.to_string(),
            allowed: allowed.clone(),
            max_results: self.settings.max_results,
            depth: self.settings.depth,
        };

        let mut outcome = self.search_once(&request).await;
        let retry = matches!(&outcome, Err(e) if e.is_retryable());
        if retry {
            tracing::warn!(%query, "search failed, retrying once");
            outcome = self.search_once(&request).await;
        }

        match outcome {
            Ok(results) => {
                tracing::debug!(count = results.len(), %query, "search returned");
                let text = truncate_chars(&format_results(&results), self.settings.max_content_size);
                let text = if self.settings.summarize && !results.is_empty() {
                    self.summarizer.summarize(&text, query).await
                } else {
                    text
                };
                let text = if results.is_empty() { "No results found.".to_string() } else { text };
                ToolInvocation::success(ToolKind::Search, query, text).with_results(results)
            }
            Err(e) => {
                tracing::warn!(error = %e, %query, "search failed");
                ToolInvocation::failure(ToolKind::Search, query, e)
            }
        }
    }

    /// Scrape one allow-listed page; `question` steers the summarizer
    pub async fn run_scrape(&self, url: &str, allowed: &AllowList, question: &str) -> ToolInvocation {
        let outcome = tokio::time::timeout(self.settings.timeout, self.scrape.scrape(url, allowed))
            .await
            .unwrap_or_else(|_| {
                Err(AgentError::RemoteService(format!(
                    "scrape timed out after {}s",
                    self.settings.timeout.as_secs()
                )))
            });

        match outcome {
            Ok(text) if text.trim().is_empty() => {
                ToolInvocation::failure(ToolKind::Scrape, url, "page had no readable text")
            }
            Ok(text) => {
                let text = truncate_chars(&text, self.settings.max_scrape_length);
                let text = if self.settings.summarize {
                    self.summarizer.summarize(&text, question).await
                } else {
                    text
                };
                ToolInvocation::success(ToolKind::Scrape, url, text)
            }
            Err(e @ AgentError::PolicyViolation(_)) => {
                tracing::warn!(%url, error = %e, "blocked scrape outside allow-list");
                ToolInvocation::failure(ToolKind::Scrape, url, e)
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "scrape failed, continuing without page content");
                ToolInvocation::failure(ToolKind::Scrape, url, e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakySearch {
        calls: AtomicUsize,
        failures: usize,
    }

    #[async_trait]
    impl SearchTool for FlakySearch {
        async fn search(&self, _query: &SearchQuery) -> Result<Vec<SearchResult>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(AgentError::RemoteService("503".into()));
            }
            Ok(vec![SearchResult {
                title: "Agents".into(),
                url: "https://docs.langchain.com/agents".into(),
                snippet: "Build agents with custom tools.".into(),
                score: 0.9,
            }])
        }
    }

    struct NoScrape;

    #[async_trait]
    impl ScrapeTool for NoScrape {
        async fn scrape(&self, url: &str, allowed: &AllowList) -> Result<String> {
            if !allowed.permits_url(url) {
                return Err(AgentError::PolicyViolation(url.into()));
            }
            Ok("a".repeat(50))
        }
    }

    fn toolbox(failures: usize) -> (ToolBox, Arc<FlakySearch>) {
        let search = Arc::new(FlakySearch {
            calls: AtomicUsize::new(0),
            failures,
        });
        let settings = ToolSettings {
            max_scrape_length: 10,
            ..ToolSettings::default()
        };
        let tb = ToolBox::new(search.clone(), Arc::new(NoScrape), Arc::new(PassThrough), settings);
        (tb, search)
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("https://www.Docs.LangChain.com/x"), Some("docs.langchain.com".into()));
        assert_eq!(normalize_host("docs.rs"), Some("docs.rs".into()));
        assert_eq!(normalize_host("  "), None);
    }

    #[test]
    fn test_allow_list_matching() {
        let allowed = AllowList::new(["docs.langchain.com", "python.org"]);
        assert!(allowed.permits_url("https://docs.langchain.com/docs/agents"));
        assert!(allowed.permits_url("https://docs.python.org/3/"));
        assert!(!allowed.permits_url("https://evil-docs.langchain.com.attacker.io/"));
        assert!(!allowed.permits_url("https://notpython.org/"));
        assert!(!allowed.permits_url("ftp://python.org/file"));
        assert!(!allowed.permits_url("not a url"));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        assert_eq!(truncate_chars("héllo", 2), "hé\n[truncated]");
    }

    #[tokio::test]
    async fn test_empty_allow_list_never_reaches_backend() {
        let (tb, search) = toolbox(0);
        let inv = tb.run_search("anything", &AllowList::default()).await;
        assert!(!inv.success);
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_search_retried_once() {
        let (tb, search) = toolbox(1);
        let allowed = AllowList::new(["docs.langchain.com"]);
        let inv = tb.run_search("agents", &allowed).await;
        assert!(inv.success);
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
        assert_eq!(inv.sources(), vec!["https://docs.langchain.com/agents".to_string()]);

        let (tb, search) = toolbox(5);
        let inv = tb.run_search("agents", &allowed).await;
        assert!(!inv.success);
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_scrape_policy_violation_returns_no_content() {
        let (tb, _) = toolbox(0);
        let allowed = AllowList::new(["docs.langchain.com"]);
        let inv = tb.run_scrape("https://example.com/", &allowed, "q").await;
        assert!(!inv.success);
        assert!(inv.output.contains("Policy violation"));
        assert!(inv.sources().is_empty());

        let inv = tb.run_scrape("https://docs.langchain.com/a", &allowed, "q").await;
        assert!(inv.success);
        assert!(inv.output.ends_with("[truncated]"));
    }
}
