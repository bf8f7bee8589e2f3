//! Service Kit - Retrieval Tools
//!
//! Concrete backends for the `agent_core` tool traits.

mod page;
mod render;
mod summarizer;
mod tavily;

pub use page::{HttpScraper, extract_text};
pub use render::{PageRenderer, PlaywrightRenderer, RenderedPage};
pub use summarizer::LlmSummarizer;
pub use tavily::TavilySearch;
