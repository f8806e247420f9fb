use std::sync::Arc;

use crate::error::OuroborosResult;
use crate::memory::MemoryHit;
use crate::provider::ChatProvider;
use crate::speech::Persona;
use crate::tool::{ToolOutput, ToolRegistry};
use crate::types::*;

/// The tool-calling loop: ask the model, run any tool calls it makes, feed
/// the results back, until it answers without tools or `max_turns` runs out.
pub struct ChatLoop {
    provider: Arc<dyn ChatProvider>,
    tools: Arc<ToolRegistry>,
    model: ModelInfo,
    max_turns: usize,
    tools_enabled: bool,
}

/// Result of one [`ChatLoop::run`].
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// Messages produced during the run (assistant turns and tool results).
    pub new_messages: Vec<Message>,
    /// Final assistant text.
    pub reply: String,
    pub turns: usize,
    pub hit_turn_limit: bool,
}

impl ChatLoop {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        tools: Arc<ToolRegistry>,
        model: ModelInfo,
        max_turns: usize,
    ) -> Self {
        Self {
            provider,
            tools,
            model,
            max_turns: max_turns.max(1),
            tools_enabled: true,
        }
    }

    pub fn with_tools_enabled(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }

    pub async fn run(&self, system_prompt: &str, history: Vec<Message>) -> OuroborosResult<ChatOutcome> {
        let tool_defs = if self.tools_enabled {
            self.tools.definitions()
        } else {
            Vec::new()
        };

        let mut messages = history;
        let mut new_messages: Vec<Message> = Vec::new();
        let mut turn = 0;
        let mut has_more_tool_calls = true;

        while has_more_tool_calls && turn < self.max_turns {
            tracing::debug!(turn, model = %self.model.id, "chat turn");
            let assistant_msg = self
                .provider
                .complete(&messages, system_prompt, &tool_defs, &self.model)
                .await?;

            messages.push(assistant_msg.clone());
            new_messages.push(assistant_msg.clone());

            let tool_calls: Vec<&ContentBlock> = assistant_msg.tool_calls();
            has_more_tool_calls = !tool_calls.is_empty();

            for tc in tool_calls {
                if let ContentBlock::ToolCall {
                    id,
                    name,
                    arguments,
                } = tc
                {
                    let result = self.execute_tool(id, name, arguments.clone()).await;
                    let result_msg = Message::tool_result(id.clone(), result.content, result.is_error);
                    messages.push(result_msg.clone());
                    new_messages.push(result_msg);
                }
            }

            turn += 1;
        }

        let hit_turn_limit = has_more_tool_calls;
        if hit_turn_limit {
            tracing::warn!(max_turns = self.max_turns, "chat stopped at turn limit");
        }

        let reply = new_messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.text_content())
            .find(|t| !t.trim().is_empty())
            .unwrap_or_else(|| {
                if hit_turn_limit {
                    format!("(stopped after {} tool turns without an answer)", self.max_turns)
                } else {
                    String::new()
                }
            });

        Ok(ChatOutcome {
            new_messages,
            reply: reply.trim().to_string(),
            turns: turn,
            hit_turn_limit,
        })
    }

    async fn execute_tool(&self, id: &str, name: &str, arguments: serde_json::Value) -> ToolOutput {
        let Some(tool) = self.tools.get(name) else {
            tracing::warn!(tool = name, "model called an unknown tool");
            return ToolOutput::error(format!("Unknown tool: {name}"));
        };
        tracing::debug!(tool = name, call_id = id, "executing tool");
        match tool.execute(id, arguments).await {
            Ok(output) => output,
            Err(e) => ToolOutput::error(format!("Tool error: {e}")),
        }
    }
}

/// Persona style, optional culture hint, then any recalled memories.
pub fn build_system_prompt(persona: &Persona, culture: Option<&str>, memories: &[MemoryHit]) -> String {
    let mut prompt = persona.style.clone();

    if let Some(culture) = culture.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!(
            "\n\nAdapt tone, examples and formats to this culture/locale: {}.",
            culture.trim()
        ));
    }

    if !memories.is_empty() {
        prompt.push_str("\n\nThings you remember that may be relevant:");
        for hit in memories {
            prompt.push_str(&format!("\n- {}", hit.text));
        }
    }

    prompt
}
