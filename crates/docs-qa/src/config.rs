//! Configuration
//!
//! Environment-driven settings. Required keys fail fast with
//! `AgentError::Config`; malformed optional values are logged and replaced
//! by their defaults.

use std::path::PathBuf;
use std::time::Duration;

use agent_core::provider::GenerationOptions;
use agent_core::reasoning::LoopConfig;
use agent_core::tool::{SearchDepth, ToolSettings};
use agent_core::{AgentError, Result};

/// Which LLM backend drives the oracle and summarizer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProviderKind {
    #[default]
    Gemini,
    Ollama,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

/// All service settings
#[derive(Clone)]
pub struct QaConfig {
    pub tavily_api_key: String,
    pub google_api_key: Option<String>,
    pub llm_provider: ProviderKind,
    pub llm_model: String,
    pub summary_model: String,
    pub max_results: usize,
    pub search_depth: SearchDepth,
    pub max_content_size: usize,
    pub max_scrape_length: usize,
    pub enable_search_summarization: bool,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    /// Seconds, for search and scrape calls
    pub request_timeout: u64,
    /// Seconds, for oracle and summarizer calls
    pub llm_timeout: u64,
    /// Seconds, for a whole chat turn
    pub turn_timeout: u64,
    pub max_tool_failures: usize,
    /// Prior turns replayed into the oracle prompt
    pub memory_window: usize,
    /// Render script-only pages in a headless browser
    pub render_fallback: bool,
    pub node_bin: String,
    pub user_agent: String,
    pub sites_file: PathBuf,
    /// Seconds
    pub session_max_age: i64,
    pub bind_addr: String,
    pub tavily_endpoint: String,
    pub gemini_base_url: String,
}

impl std::fmt::Debug for QaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QaConfig")
            .field("llm_provider", &self.llm_provider)
            .field("llm_model", &self.llm_model)
            .field("max_results", &self.max_results)
            .field("search_depth", &self.search_depth)
            .field("sites_file", &self.sites_file)
            .finish_non_exhaustive()
    }
}

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; docs-qa-agent/0.1; +https://github.com/your-org/docs-qa-agent)";

fn is_placeholder(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || (v.starts_with("your_") && v.ends_with("_here"))
}

/// Typed lookups over a key/value source
struct Source<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Source<F> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, key: &str, default: T) -> T
    where
        T: std::str::FromStr + std::fmt::Display + Copy,
    {
        match self.raw(key) {
            None => default,
            Some(v) => v.parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid {key} '{v}', using default: {default}");
                default
            }),
        }
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.raw(key).map_or(default, |v| v.eq_ignore_ascii_case("true"))
    }

    fn required_key(&self, key: &str) -> Result<String> {
        self.raw(key)
            .filter(|v| !is_placeholder(v))
            .ok_or_else(|| AgentError::Config(format!("{key} environment variable is required")))
    }
}

impl QaConfig {
    /// Read from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read from any key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let src = Source { lookup };

        let llm_provider = match src.string("LLM_PROVIDER", "gemini").to_ascii_lowercase().as_str() {
            "gemini" => ProviderKind::Gemini,
            "ollama" => ProviderKind::Ollama,
            other => {
                return Err(AgentError::Config(format!(
                    "LLM_PROVIDER must be 'gemini' or 'ollama', got '{other}'"
                )));
            }
        };

        let tavily_api_key = src.required_key("TAVILY_API_KEY")?;
        let google_api_key = match llm_provider {
            ProviderKind::Gemini => Some(src.required_key("GOOGLE_API_KEY")?),
            ProviderKind::Ollama => src.raw("GOOGLE_API_KEY").filter(|k| !is_placeholder(k)),
        };

        let default_model = match llm_provider {
            ProviderKind::Gemini => "gemini-2.0-flash",
            ProviderKind::Ollama => "llama3.2",
        };
        let llm_model = src.string("LLM_MODEL", default_model);
        let summary_model = src.string("SUMMARY_MODEL", &llm_model);

        let search_depth = match src.raw("SEARCH_DEPTH") {
            None => SearchDepth::Basic,
            Some(v) => v.parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid SEARCH_DEPTH '{v}', using default: basic");
                SearchDepth::Basic
            }),
        };

        Ok(Self {
            tavily_api_key,
            google_api_key,
            llm_provider,
            llm_model,
            summary_model,
            max_results: src.parsed("MAX_RESULTS", 10),
            search_depth,
            max_content_size: src.parsed("MAX_CONTENT_SIZE", 10_000),
            max_scrape_length: src.parsed("MAX_SCRAPE_LENGTH", 20_000),
            enable_search_summarization: src.flag("ENABLE_SEARCH_SUMMARIZATION", false),
            llm_temperature: src.parsed("LLM_TEMPERATURE", 0.1),
            llm_max_tokens: src.parsed("LLM_MAX_TOKENS", 3000),
            request_timeout: src.parsed("REQUEST_TIMEOUT", 30),
            llm_timeout: src.parsed("LLM_TIMEOUT", 60),
            turn_timeout: src.parsed("TURN_TIMEOUT", 120),
            max_tool_failures: src.parsed("MAX_TOOL_FAILURES", 3),
            memory_window: src.parsed("MEMORY_WINDOW", 5),
            render_fallback: src.flag("RENDER_FALLBACK", false),
            node_bin: src.string("NODE_BIN", "node"),
            user_agent: src.string("USER_AGENT", DEFAULT_USER_AGENT),
            sites_file: PathBuf::from(src.string("SITES_FILE", "sites.csv")),
            session_max_age: src.parsed("SESSION_MAX_AGE", 3600),
            bind_addr: src.string("BIND_ADDR", "0.0.0.0:8000"),
            tavily_endpoint: src.string("TAVILY_ENDPOINT", "https://api.tavily.com/search"),
            gemini_base_url: src.string("GEMINI_BASE_URL", "https://generativelanguage.googleapis.com"),
        })
    }

    /// Log settings, never the keys
    pub fn log(&self) {
        tracing::info!("Configuration loaded:");
        tracing::info!("  llm_provider: {}", self.llm_provider);
        tracing::info!("  llm_model: {}", self.llm_model);
        tracing::info!("  summary_model: {}", self.summary_model);
        tracing::info!("  max_results: {}", self.max_results);
        tracing::info!("  search_depth: {}", self.search_depth);
        tracing::info!("  max_content_size: {}", self.max_content_size);
        tracing::info!("  max_scrape_length: {}", self.max_scrape_length);
        tracing::info!("  enable_search_summarization: {}", self.enable_search_summarization);
        tracing::info!("  llm_temperature: {}", self.llm_temperature);
        tracing::info!("  llm_max_tokens: {}", self.llm_max_tokens);
        tracing::info!("  request_timeout: {}s", self.request_timeout);
        tracing::info!("  llm_timeout: {}s", self.llm_timeout);
        tracing::info!("  turn_timeout: {}s", self.turn_timeout);
        tracing::info!("  memory_window: {}", self.memory_window);
        tracing::info!("  render_fallback: {}", self.render_fallback);
        tracing::info!("  sites_file: {}", self.sites_file.display());
    }

    pub fn tool_settings(&self) -> ToolSettings {
        ToolSettings {
            max_results: self.max_results,
            depth: self.search_depth,
            max_content_size: self.max_content_size,
            max_scrape_length: self.max_scrape_length,
            timeout: Duration::from_secs(self.request_timeout),
            summarize: self.enable_search_summarization,
        }
    }

    pub fn loop_config(&self, rejection_message: String) -> LoopConfig {
        LoopConfig {
            max_tool_failures: self.max_tool_failures.max(1),
            oracle_timeout: Duration::from_secs(self.llm_timeout),
            rejection_message,
            ..LoopConfig::default()
        }
    }

    pub fn generation(&self) -> GenerationOptions {
        GenerationOptions {
            model: self.llm_model.clone(),
            temperature: self.llm_temperature,
            max_tokens: self.llm_max_tokens,
            ..GenerationOptions::default()
        }
    }

    pub const fn turn_budget(&self) -> Duration {
        Duration::from_secs(self.turn_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<QaConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        QaConfig::from_lookup(move |k| map.get(k).cloned())
    }

    const KEYS: [(&str, &str); 2] = [("TAVILY_API_KEY", "tvly-abc"), ("GOOGLE_API_KEY", "g-abc")];

    #[test]
    fn test_defaults() {
        let cfg = config(&KEYS).unwrap();
        assert_eq!(cfg.max_results, 10);
        assert_eq!(cfg.search_depth, SearchDepth::Basic);
        assert_eq!(cfg.max_content_size, 10_000);
        assert_eq!(cfg.max_scrape_length, 20_000);
        assert!(!cfg.enable_search_summarization);
        assert_eq!(cfg.llm_max_tokens, 3000);
        assert_eq!(cfg.request_timeout, 30);
        assert_eq!(cfg.llm_timeout, 60);
        assert_eq!(cfg.llm_provider, ProviderKind::Gemini);
        assert_eq!(cfg.summary_model, cfg.llm_model);
        assert_eq!(cfg.memory_window, 5);
        assert!(!cfg.render_fallback);
        assert_eq!(cfg.node_bin, "node");
    }

    #[test]
    fn test_missing_or_placeholder_keys() {
        assert!(matches!(config(&[("GOOGLE_API_KEY", "g")]), Err(AgentError::Config(_))));
        assert!(config(&[
            ("TAVILY_API_KEY", "your_tavily_api_key_here"),
            ("GOOGLE_API_KEY", "g")
        ])
        .is_err());
        // Ollama does not need a Google key
        let cfg = config(&[("TAVILY_API_KEY", "t"), ("LLM_PROVIDER", "ollama")]).unwrap();
        assert_eq!(cfg.llm_provider, ProviderKind::Ollama);
        assert_eq!(cfg.llm_model, "llama3.2");
        assert!(cfg.google_api_key.is_none());
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let mut pairs = KEYS.to_vec();
        pairs.extend([
            ("MAX_RESULTS", "5"),
            ("SEARCH_DEPTH", "ADVANCED"),
            ("ENABLE_SEARCH_SUMMARIZATION", "True"),
            ("LLM_TEMPERATURE", "warm"),
            ("REQUEST_TIMEOUT", "-3"),
            ("MEMORY_WINDOW", "2"),
            ("RENDER_FALLBACK", "true"),
        ]);
        let cfg = config(&pairs).unwrap();
        assert_eq!(cfg.max_results, 5);
        assert_eq!(cfg.search_depth, SearchDepth::Advanced);
        assert!(cfg.enable_search_summarization);
        assert!((cfg.llm_temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(cfg.request_timeout, 30);
        assert!(cfg.tool_settings().summarize);
        assert_eq!(cfg.memory_window, 2);
        assert!(cfg.render_fallback);
    }

    #[test]
    fn test_invalid_depth_falls_back() {
        let mut pairs = KEYS.to_vec();
        pairs.push(("SEARCH_DEPTH", "deep"));
        assert_eq!(config(&pairs).unwrap().search_depth, SearchDepth::Basic);
    }

    #[test]
    fn test_unknown_provider_is_fatal() {
        let mut pairs = KEYS.to_vec();
        pairs.push(("LLM_PROVIDER", "mystery"));
        assert!(config(&pairs).is_err());
    }
}
