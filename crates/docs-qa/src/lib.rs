//! # docs-qa
//!
//! Question answering restricted to an approved set of documentation sites.
//!
//! ## Retrieval tiers
//!
//! ```text
//! question ──► SiteRegistry::scope_for ──► (no site?) ──► rejection, no tools
//!                      │
//!                      ▼
//!              Tavily search (include_domains = allow-list)
//!                      │ snippets too thin?
//!                      ▼
//!              HttpScraper on a URL the search returned
//!                      │ (optional) headless render when the page has no text
//!                      │ (optional) LlmSummarizer
//!                      ▼
//!              answer + source URLs
//! ```
//!
//! The registry is loaded once from a `domain,site,description` CSV and is
//! read-only afterwards. Every tool call is checked against the allow-list
//! derived from it.

pub mod agent;
pub mod config;
pub mod mock;
pub mod oracle;
pub mod registry;
pub mod svckit;

pub use agent::{ChatReply, DocsQaAgent};
pub use config::{ProviderKind, QaConfig};
pub use oracle::LlmOracle;
pub use registry::{SiteEntry, SiteRegistry};

/// Re-export tools for easy wiring
pub mod tools {
    pub use crate::svckit::{HttpScraper, LlmSummarizer, PlaywrightRenderer, TavilySearch};
}

/// System prompt for the oracle. `{sites}` is replaced with the allowed sites.
pub const ORACLE_PROMPT: &str = r#"You are a documentation assistant. You answer questions using ONLY the approved documentation sites listed below. Never answer from memory alone.

{sites}

## How to act

Reply with exactly one action block and nothing else:

```action
{"action": "search", "query": "focused search terms"}
```

```action
{"action": "scrape", "url": "https://one-of-the-search-result-urls"}
```

```action
{"action": "answer", "text": "your answer in markdown", "sources": ["https://url-you-used"]}
```

## Rules

1. Always search before answering.
2. If the search snippets are too thin to answer, scrape the most relevant result URL.
3. Only scrape URLs that appeared in search results.
4. Cite the exact URLs you relied on in "sources".
5. If the approved sources do not contain the answer, say so plainly instead of guessing."#;

/// System prompt for the summarizer
pub const SUMMARY_PROMPT: &str = r"You condense documentation excerpts. Keep every fact, code identifier, version number and URL that helps answer the question. Drop navigation text, marketing copy and unrelated sections. Reply with the condensed text only.";
