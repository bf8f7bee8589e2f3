//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Bad or missing configuration (site table, API keys). Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A search, scrape or LLM call failed
    #[error("Remote service error: {0}")]
    RemoteService(String),

    /// A tool tried to reach a host outside the allow-list
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// The whole turn ran past its budget
    #[error("Turn timed out after {0} seconds")]
    TurnTimeout(u64),

    /// The loop used up its tool attempts or decision steps
    #[error("Gave up after {attempts} failed tool attempts")]
    Exhausted { attempts: usize },

    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Parse error (e.g., oracle action parsing)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Session error
    #[error("Session error: {0}")]
    Session(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RemoteService(_) | Self::Provider(_) | Self::Io(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(_) => "The service is not configured correctly. Please contact the administrator.".into(),
            Self::RemoteService(_) | Self::Provider(_) => {
                "An external service is currently unavailable. Please try again.".into()
            }
            Self::PolicyViolation(_) => "That source is outside the approved documentation sites.".into(),
            Self::TurnTimeout(_) => {
                "I could not find an answer within the approved sources in time. Please try again or rephrase your question.".into()
            }
            Self::Exhausted { .. } => {
                "I was unable to find an answer within the approved documentation sources.".into()
            }
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
