//! # agent-runtime
//!
//! Concrete `LlmProvider`s for the docs Q&A agent.
//!
//! ## Providers
//!
//! - **Gemini** (default): Google Generative Language API over HTTPS
//! - **Ollama** (feature `ollama`): local inference
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{GeminiConfig, GeminiProvider};
//!
//! let provider = GeminiProvider::new(GeminiConfig::new(api_key))?;
//! let completion = provider.complete(&messages, &options).await?;
//! ```

pub mod gemini;

#[cfg(feature = "ollama")]
pub mod ollama;

pub use gemini::{GeminiConfig, GeminiProvider};

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};

// Re-export core types for convenience
pub use agent_core::{AgentError, LlmProvider, Message, Result, Role};
