//! Application State

use std::sync::Arc;

use agent_core::SessionStore;
use docs_qa::DocsQaAgent;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Registry-scoped agent (loop, tools, oracle)
    pub agent: Arc<DocsQaAgent>,

    /// Per-cookie sessions
    pub sessions: Arc<dyn SessionStore>,

    /// Session cookie lifetime in seconds
    pub session_max_age: i64,
}
