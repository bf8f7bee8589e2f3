//! LLM Oracle
//!
//! Turns a `DecisionContext` into a prompt, and the model's reply into an
//! `Action`. The reply protocol is a fenced block:
//!
//! ~~~text
//! ```action
//! {"action": "search", "query": "..."}
//! ```
//! ~~~
//!
//! A `json` fence or a bare object with an `"action"` key is also accepted.
//! A reply without any action is taken as a plain answer.

use std::sync::Arc;

use agent_core::provider::{GenerationOptions, LlmProvider};
use agent_core::reasoning::{Action, DecisionContext, Oracle};
use agent_core::{AgentError, Message, Result};
use async_trait::async_trait;

use crate::ORACLE_PROMPT;
use crate::registry::SiteRegistry;

/// Oracle backed by an `LlmProvider`
pub struct LlmOracle {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
    registry: Arc<SiteRegistry>,
    /// Prior turns replayed into the prompt
    memory_window: usize,
}

impl std::fmt::Debug for LlmOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmOracle")
            .field("provider", &self.provider.name())
            .field("model", &self.options.model)
            .field("memory_window", &self.memory_window)
            .finish_non_exhaustive()
    }
}

impl LlmOracle {
    pub fn new(provider: Arc<dyn LlmProvider>, options: GenerationOptions, registry: Arc<SiteRegistry>) -> Self {
        Self {
            provider,
            options,
            registry,
            memory_window: 5,
        }
    }

    pub const fn memory_window(mut self, turns: usize) -> Self {
        self.memory_window = turns;
        self
    }

    fn build_messages(&self, ctx: &DecisionContext<'_>) -> Vec<Message> {
        let system = ORACLE_PROMPT.replace("{sites}", &self.registry.prompt_section(ctx.allowed));

        let mut messages = vec![Message::system(system)];
        messages.extend(ctx.memory.to_messages(self.memory_window));
        messages.push(Message::user(ctx.question));
        messages.extend(ctx.observations.iter().map(|inv| Message::tool(inv.to_observation())));

        if let Some(url) = ctx.escalation {
            messages.push(Message::user(format!(
                "The search snippets are too thin to answer from. Scrape {url} next."
            )));
        }
        messages
    }
}

#[async_trait]
impl Oracle for LlmOracle {
    async fn decide(&self, ctx: &DecisionContext<'_>) -> Result<Action> {
        let messages = self.build_messages(ctx);
        let completion = self
            .provider
            .complete(&messages, &self.options)
            .await
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        if let Some(usage) = &completion.usage {
            tracing::debug!(
                prompt = usage.prompt_tokens,
                completion = usage.completion_tokens,
                "oracle tokens"
            );
        }

        parse_action(&completion.content)
    }

    async fn health_check(&self) -> bool {
        self.provider.health_check().await.unwrap_or(false)
    }
}

/// Extract the action from a model reply
pub fn parse_action(reply: &str) -> Result<Action> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(AgentError::Parse("empty oracle reply".into()));
    }

    if let Some(start) = reply.find("```action") {
        return match first_action(&reply[start..]) {
            Some(Ok(action)) => Ok(action),
            Some(Err(e)) => Err(AgentError::Parse(format!("malformed action block: {e}"))),
            None => Err(AgentError::Parse("action block holds no JSON object".into())),
        };
    }

    // ```json blocks and inline objects may just be part of an answer
    if reply.contains("\"action\"") {
        let inline = reply
            .match_indices('{')
            .find_map(|(at, _)| first_action(&reply[at..]).and_then(std::result::Result::ok));
        if let Some(action) = inline {
            return Ok(action);
        }
    }

    Ok(Action::Answer {
        text: reply.to_string(),
        sources: Vec::new(),
    })
}

/// The JSON object starting at the first `{`. Parsing stops where the
/// object ends, so fences inside string values and trailing text are fine.
fn first_action(text: &str) -> Option<serde_json::Result<Action>> {
    let start = text.find('{')?;
    serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Action>()
        .next()
}
