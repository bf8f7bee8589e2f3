//! Reasoning Loop
//!
//! The search-then-scrape state machine:
//!
//! ```text
//! Idle → AwaitingToolDecision → ToolExecuting → Evaluating → Responding → Idle
//!              ▲                      │              │
//!              └──────────────────────┴──────────────┘
//! ```
//!
//! The oracle proposes an [`Action`]; the loop vets it against hard rules
//! (search before answering, scrape only URLs a search returned, escalate
//! when snippets are thin) and owns every transition.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::message::{Memory, Turn, TurnOutcome};
use crate::tool::{AllowList, SearchResult, ToolBox, ToolInvocation, ToolKind};

/// Loop state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    AwaitingToolDecision,
    ToolExecuting,
    Evaluating,
    Responding,
}

/// What the oracle may ask for next
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Search {
        query: String,
    },
    Scrape {
        url: String,
    },
    Answer {
        text: String,
        #[serde(default)]
        sources: Vec<String>,
    },
}

/// Everything the oracle sees when choosing an action
#[derive(Debug)]
pub struct DecisionContext<'a> {
    pub question: &'a str,
    pub memory: &'a Memory,
    pub allowed: &'a AllowList,
    pub observations: &'a [ToolInvocation],
    /// Set when the last search was judged insufficient
    pub escalation: Option<&'a str>,
}

/// The reasoning service, reduced to a decision function
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn decide(&self, ctx: &DecisionContext<'_>) -> Result<Action>;

    /// Whether the backing model is reachable
    async fn health_check(&self) -> bool {
        true
    }
}

/// Loop limits
#[derive(Clone, Debug)]
pub struct LoopConfig {
    /// Maximum oracle decisions per turn
    pub max_steps: usize,
    /// Failed tool calls (or oracle calls) before giving up
    pub max_tool_failures: usize,
    /// Snippet length that makes a search hit usable
    pub min_snippet_chars: usize,
    /// Sources reported when the oracle cites none we observed
    pub max_sources: usize,
    pub oracle_timeout: Duration,
    /// Reply for questions outside every configured site
    pub rejection_message: String,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_steps: 6,
            max_tool_failures: 3,
            min_snippet_chars: 40,
            max_sources: 3,
            oracle_timeout: Duration::from_secs(60),
            rejection_message: DEFAULT_REJECTION.into(),
        }
    }
}

const DEFAULT_REJECTION: &str =
    "I can only answer questions about the documentation sites I have been approved to search, and your question does not match any of them.";

const EMPTY_ANSWER: &str = "I could not find a clear answer to that in the approved documentation.";

/// Result of one turn
#[derive(Clone, Debug, Serialize)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    pub answer: String,
    pub sources: Vec<String>,
    pub invocations: Vec<ToolInvocation>,
    pub trace: Vec<Phase>,
}

impl TurnReport {
    /// Memory entry for this turn
    pub fn to_turn(&self, question: &str) -> Turn {
        match self.outcome {
            TurnOutcome::Answered => Turn::answered(question, &self.answer, self.sources.clone()),
            TurnOutcome::Rejected => Turn::rejected(question, &self.answer),
        }
    }
}

/// Mutable bookkeeping of a single turn
#[derive(Debug, Default)]
struct TurnState {
    invocations: Vec<ToolInvocation>,
    trace: Vec<Phase>,
    failures: usize,
    searched: bool,
    escalation: Option<String>,
}

impl TurnState {
    fn enter(&mut self, phase: Phase) {
        tracing::trace!(?phase, "transition");
        self.trace.push(phase);
    }

    fn search_hits(&self) -> impl Iterator<Item = &SearchResult> {
        self.invocations
            .iter()
            .filter(|i| i.tool == ToolKind::Search && i.success)
            .flat_map(|i| i.results.iter())
    }

    fn was_scraped(&self, url: &str) -> bool {
        self.invocations
            .iter()
            .any(|i| i.tool == ToolKind::Scrape && same_url(&i.input, url))
    }

    fn already_searched(&self, query: &str) -> bool {
        self.invocations.iter().any(|i| {
            i.tool == ToolKind::Search && i.success && i.input.trim().eq_ignore_ascii_case(query.trim())
        })
    }

    fn returned_by_search(&self, url: &str) -> bool {
        self.search_hits().any(|r| same_url(&r.url, url))
    }

    /// Best-scoring search hit not yet scraped
    fn scrape_candidate(&self, allowed: &AllowList) -> Option<String> {
        self.search_hits()
            .filter(|r| allowed.permits_url(&r.url) && !self.was_scraped(&r.url))
            .fold(None::<&SearchResult>, |best, r| match best {
                Some(b) if b.score >= r.score => Some(b),
                _ => Some(r),
            })
            .map(|r| r.url.clone())
    }

    /// Observed URLs, scraped pages first
    fn observed_sources(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let scraped = self.invocations.iter().filter(|i| i.tool == ToolKind::Scrape);
        let searched = self.invocations.iter().filter(|i| i.tool == ToolKind::Search);
        for url in scraped.chain(searched).flat_map(ToolInvocation::sources) {
            if !out.iter().any(|u| same_url(u, &url)) {
                out.push(url);
            }
        }
        out
    }
}

fn same_url(a: &str, b: &str) -> bool {
    a.trim().trim_end_matches('/') == b.trim().trim_end_matches('/')
}

/// The agent loop
pub struct AgentLoop {
    oracle: Arc<dyn Oracle>,
    tools: Arc<ToolBox>,
    config: LoopConfig,
}

impl std::fmt::Debug for AgentLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLoop")
            .field("tools", &self.tools)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AgentLoop {
    pub fn new(oracle: Arc<dyn Oracle>, tools: Arc<ToolBox>, config: LoopConfig) -> Self {
        Self { oracle, tools, config }
    }

    pub const fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolBox {
        &self.tools
    }

    pub async fn oracle_reachable(&self) -> bool {
        self.oracle.health_check().await
    }

    /// Run one question through the state machine.
    ///
    /// `memory` is read-only here; the caller commits the returned report.
    pub async fn run_turn(
        &self,
        question: &str,
        memory: &Memory,
        allowed: &AllowList,
    ) -> Result<TurnReport> {
        let mut state = TurnState::default();
        state.enter(Phase::Idle);

        if allowed.is_empty() {
            tracing::info!(%question, "no configured site matches, rejecting");
            state.enter(Phase::Responding);
            state.enter(Phase::Idle);
            return Ok(TurnReport {
                outcome: TurnOutcome::Rejected,
                answer: self.config.rejection_message.clone(),
                sources: Vec::new(),
                invocations: Vec::new(),
                trace: state.trace,
            });
        }

        for step in 1..=self.config.max_steps {
            state.enter(Phase::AwaitingToolDecision);

            let proposed = match self.consult(question, memory, allowed, &state).await {
                Ok(action) => action,
                Err(e) => {
                    tracing::warn!(step, error = %e, "oracle failed");
                    state.failures += 1;
                    if state.failures >= self.config.max_tool_failures {
                        return Err(AgentError::Exhausted { attempts: state.failures });
                    }
                    continue;
                }
            };

            let action = self.enforce(proposed, question, allowed, &state);
            tracing::debug!(step, ?action, "dispatching");

            match action {
                Action::Answer { text, sources } => {
                    state.enter(Phase::Responding);
                    let sources = self.attribute(&sources, &state);
                    let answer = if text.trim().is_empty() { EMPTY_ANSWER.to_string() } else { text };
                    state.enter(Phase::Idle);
                    return Ok(TurnReport {
                        outcome: TurnOutcome::Answered,
                        answer,
                        sources,
                        invocations: state.invocations,
                        trace: state.trace,
                    });
                }
                Action::Search { query } => {
                    state.enter(Phase::ToolExecuting);
                    let invocation = self.tools.run_search(&query, allowed).await;
                    state.enter(Phase::Evaluating);
                    if invocation.success {
                        state.searched = true;
                        state.invocations.push(invocation);
                        state.escalation = self.evaluate(&state, allowed);
                        if let Some(url) = &state.escalation {
                            tracing::debug!(%url, "search insufficient, escalating to scrape");
                        }
                    } else {
                        state.failures += 1;
                        state.invocations.push(invocation);
                    }
                }
                Action::Scrape { url } => {
                    state.enter(Phase::ToolExecuting);
                    let invocation = if state.returned_by_search(&url) {
                        self.tools.run_scrape(&url, allowed, question).await
                    } else {
                        tracing::warn!(%url, "scrape target was not returned by a search");
                        ToolInvocation::failure(
                            ToolKind::Scrape,
                            &url,
                            AgentError::PolicyViolation("only search result URLs may be scraped".into()),
                        )
                    };
                    let ok = invocation.success;
                    state.invocations.push(invocation);
                    if ok {
                        state.escalation = None;
                    } else {
                        state.failures += 1;
                        state.escalation = state
                            .escalation
                            .take()
                            .and_then(|_| state.scrape_candidate(allowed));
                    }
                }
            }

            if state.failures >= self.config.max_tool_failures {
                tracing::warn!(failures = state.failures, "giving up on turn");
                return Err(AgentError::Exhausted { attempts: state.failures });
            }
        }

        Err(AgentError::Exhausted { attempts: state.failures.max(self.config.max_steps) })
    }

    async fn consult(
        &self,
        question: &str,
        memory: &Memory,
        allowed: &AllowList,
        state: &TurnState,
    ) -> Result<Action> {
        let ctx = DecisionContext {
            question,
            memory,
            allowed,
            observations: &state.invocations,
            escalation: state.escalation.as_deref(),
        };
        tokio::time::timeout(self.config.oracle_timeout, self.oracle.decide(&ctx))
            .await
            .unwrap_or_else(|_| {
                Err(AgentError::RemoteService(format!(
                    "oracle timed out after {}s",
                    self.config.oracle_timeout.as_secs()
                )))
            })
    }

    /// Apply the hard rules the model cannot override
    fn enforce(&self, proposed: Action, question: &str, allowed: &AllowList, state: &TurnState) -> Action {
        let escalation = state.escalation.clone();
        match proposed {
            Action::Answer { .. } if !state.searched => {
                tracing::debug!("answer before any successful search, searching first");
                Action::Search { query: question.to_string() }
            }
            Action::Answer { .. } if escalation.is_some() => Action::Scrape {
                url: escalation.unwrap_or_default(),
            },
            Action::Search { query } if query.trim().is_empty() => Action::Search {
                query: question.to_string(),
            },
            Action::Search { query } => match escalation {
                Some(url) if state.already_searched(&query) => {
                    Action::Scrape { url }
                }
                _ => Action::Search { query },
            },
            Action::Scrape { url } if state.returned_by_search(&url) => Action::Scrape { url },
            Action::Scrape { url } => match escalation.or_else(|| state.scrape_candidate(allowed)) {
                Some(candidate) => {
                    tracing::debug!(requested = %url, %candidate, "scrape target not from search results");
                    Action::Scrape { url: candidate }
                }
                // rejected at dispatch
                None => Action::Scrape { url },
            },
            answer @ Action::Answer { .. } => answer,
        }
    }

    /// Sufficiency check after a search: `Some(url)` means escalate
    fn evaluate(&self, state: &TurnState, allowed: &AllowList) -> Option<String> {
        let last = state.invocations.last()?;
        if last.results.iter().any(|r| r.is_usable(self.config.min_snippet_chars)) {
            return None;
        }
        state.scrape_candidate(allowed)
    }

    /// Keep cited URLs we actually observed; fall back to the top observed ones
    fn attribute(&self, cited: &[String], state: &TurnState) -> Vec<String> {
        let observed = state.observed_sources();
        let mut kept: Vec<String> = Vec::new();
        for url in cited {
            if let Some(seen) = observed.iter().find(|o| same_url(o, url)) {
                if !kept.contains(seen) {
                    kept.push(seen.clone());
                }
            }
        }
        if kept.is_empty() {
            observed.into_iter().take(self.config.max_sources).collect()
        } else {
            kept
        }
    }
}
