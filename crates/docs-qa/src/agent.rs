//! Docs QA Agent
//!
//! Binds the site registry to the agent loop and owns the per-session
//! commit rule: a turn reaches memory only if it completes.

use std::sync::Arc;
use std::time::Duration;

use agent_core::session::SessionHandle;
use agent_core::tool::AllowList;
use agent_core::{AgentError, AgentLoop, Memory, Result, TurnOutcome};
use serde::Serialize;

use crate::registry::SiteRegistry;

/// Outcome of one chat message
#[derive(Clone, Debug, Serialize)]
pub struct ChatReply {
    pub outcome: TurnOutcome,
    pub response: String,
    pub sources: Vec<String>,
    /// Tool calls made during the turn
    pub tool_calls: usize,
}

impl ChatReply {
    /// Wire status: `success` or `rejected`
    pub const fn status(&self) -> &'static str {
        match self.outcome {
            TurnOutcome::Answered => "success",
            TurnOutcome::Rejected => "rejected",
        }
    }
}

/// The documentation Q&A agent
pub struct DocsQaAgent {
    registry: Arc<SiteRegistry>,
    agent_loop: AgentLoop,
    turn_timeout: Duration,
}

impl std::fmt::Debug for DocsQaAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocsQaAgent")
            .field("sites", &self.registry.len())
            .field("turn_timeout", &self.turn_timeout)
            .finish_non_exhaustive()
    }
}

impl DocsQaAgent {
    pub const fn new(registry: Arc<SiteRegistry>, agent_loop: AgentLoop, turn_timeout: Duration) -> Self {
        Self {
            registry,
            agent_loop,
            turn_timeout,
        }
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    pub async fn search_reachable(&self) -> bool {
        self.agent_loop.tools().search_reachable().await
    }

    pub async fn llm_reachable(&self) -> bool {
        self.agent_loop.oracle_reachable().await
    }

    /// Sites a question may use. A follow-up that names no topic stays on
    /// the sites of the previous answered turn.
    fn scope(&self, question: &str, memory: &Memory) -> AllowList {
        let allowed = self.registry.scope_for(question);
        if !allowed.is_empty() {
            return allowed;
        }
        match memory.last() {
            Some(prev) if prev.outcome == TurnOutcome::Answered && !prev.scope.is_empty() => {
                tracing::debug!(sites = ?prev.scope, "follow-up keeps previous scope");
                AllowList::new(&prev.scope)
            }
            _ => allowed,
        }
    }

    /// Answer one message within the session.
    ///
    /// Holds the session lock for the whole turn. On timeout or failure the
    /// session memory is left exactly as it was.
    pub async fn chat(&self, session: &SessionHandle, message: &str) -> Result<ChatReply> {
        let question = message.trim();
        if question.is_empty() {
            return Err(AgentError::Parse("message must not be empty".into()));
        }

        let mut session = session.lock().await;
        let allowed = self.scope(question, &session.memory);
        tracing::debug!(
            session = %session.id,
            sites = ?allowed.to_vec(),
            "scoped question"
        );

        let turn = self.agent_loop.run_turn(question, &session.memory, &allowed);
        let report = tokio::time::timeout(self.turn_timeout, turn)
            .await
            .map_err(|_| {
                tracing::warn!(session = %session.id, "turn timed out, memory unchanged");
                AgentError::TurnTimeout(self.turn_timeout.as_secs())
            })??;

        session.record(report.to_turn(question).with_scope(allowed.to_vec()));
        tracing::info!(
            session = %session.id,
            outcome = ?report.outcome,
            tools = report.invocations.len(),
            turns = session.turn_count(),
            "turn complete"
        );

        Ok(ChatReply {
            outcome: report.outcome,
            response: report.answer,
            sources: report.sources,
            tool_calls: report.invocations.len(),
        })
    }

    /// Forget the session's conversation
    pub async fn reset(&self, session: &SessionHandle) {
        let mut session = session.lock().await;
        session.reset();
        tracing::info!(session = %session.id, "memory cleared");
    }
}
