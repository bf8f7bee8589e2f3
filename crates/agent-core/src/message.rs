//! Conversation Messages
//!
//! Prompt messages sent to LLM providers, and the per-session memory of
//! completed question/answer turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool observation (injected as context)
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A single prompt message
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }
}

/// How a turn ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Answered from approved sources
    Answered,
    /// Question fell outside every configured site
    Rejected,
}

/// One completed question/answer exchange
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<String>,
    pub outcome: TurnOutcome,
    /// Sites the turn was allowed to use
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default = "Utc::now")]
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn answered(question: impl Into<String>, answer: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            sources,
            outcome: TurnOutcome::Answered,
            scope: Vec::new(),
            at: Utc::now(),
        }
    }

    pub fn rejected(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            sources: Vec::new(),
            outcome: TurnOutcome::Rejected,
            scope: Vec::new(),
            at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: Vec<String>) -> Self {
        self.scope = scope;
        self
    }
}

/// Ordered conversation memory of a session
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Memory {
    turns: Vec<Turn>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed turn
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The last `n` turns, oldest first
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Replay the last `n` turns as user/assistant prompt messages
    pub fn to_messages(&self, n: usize) -> Vec<Message> {
        self.recent(n)
            .iter()
            .flat_map(|t| [Message::user(&t.question), Message::assistant(&t.answer)])
            .collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
    }

    #[test]
    fn test_memory_replay_window() {
        let mut memory = Memory::new();
        memory.push(Turn::answered("q1", "a1", vec![]));
        memory.push(Turn::rejected("q2", "no"));
        memory.push(Turn::answered("q3", "a3", vec!["https://docs.rs/x".into()]));

        let replay = memory.to_messages(2);
        assert_eq!(replay.len(), 4);
        assert_eq!(replay[0].content, "q2");
        assert_eq!(replay[3].role, Role::Assistant);
        assert_eq!(memory.last().map(|t| t.outcome), Some(TurnOutcome::Answered));
    }

    #[test]
    fn test_memory_clear() {
        let mut memory = Memory::new();
        memory.push(Turn::answered("q", "a", vec![]));
        memory.clear();
        assert!(memory.is_empty());
    }
}
