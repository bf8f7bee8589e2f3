//! # agent-core
//!
//! Core agent logic for an allow-listed documentation Q&A agent.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        AgentLoop                             │
//! │  ┌─────────────┐  ┌──────────────────┐  ┌────────────────┐   │
//! │  │   Oracle    │  │     ToolBox      │  │  Session       │   │
//! │  │ (decide)    │──│ search / scrape  │──│  memory        │   │
//! │  └─────────────┘  │ summarize        │  └────────────────┘   │
//! │                   └──────────────────┘                       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The loop owns every state transition. The model only answers
//! `decide(context) -> Action`, so any `Oracle` (LLM-backed or scripted)
//! drives the same state machine.

pub mod provider;
pub mod tool;
pub mod reasoning;
pub mod message;
pub mod error;
pub mod session;

pub use error::{AgentError, Result};
pub use message::{Memory, Message, Role, Turn, TurnOutcome};
pub use provider::LlmProvider;
pub use reasoning::{Action, AgentLoop, LoopConfig, Oracle, Phase, TurnReport};
pub use session::{MemorySessionStore, Session, SessionId, SessionStore};
pub use tool::{
    AllowList, PassThrough, ScrapeTool, SearchDepth, SearchQuery, SearchResult, SearchTool,
    Summarizer, ToolBox, ToolInvocation, ToolKind,
};
