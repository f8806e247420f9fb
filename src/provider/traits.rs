use tokio::sync::mpsc;

use crate::error::OuroborosResult;
use crate::types::*;

/// Core chat provider trait: abstracts LLM API communication
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync {
    /// Get provider kind
    fn kind(&self) -> ProviderKind;

    /// Stream a completion response, sending deltas through the channel
    async fn stream(
        &self,
        messages: &[Message],
        system: &str,
        tools: &[ToolDefinition],
        model: &ModelInfo,
        event_tx: mpsc::UnboundedSender<StreamDelta>,
    ) -> OuroborosResult<Message>;

    /// Non-streaming completion (convenience, default impl collects stream)
    async fn complete(
        &self,
        messages: &[Message],
        system: &str,
        tools: &[ToolDefinition],
        model: &ModelInfo,
    ) -> OuroborosResult<Message> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = self.stream(messages, system, tools, model, tx).await?;
        // Drain any remaining deltas
        while rx.try_recv().is_ok() {}
        Ok(result)
    }

    /// Health check (cheap call)
    async fn probe(&self, model: &ModelInfo) -> OuroborosResult<ProbeResult>;
}

/// Result of a provider health probe
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub healthy: bool,
    pub detail: Option<String>,
}

impl ProbeResult {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            detail: None,
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: Some(detail.into()),
        }
    }
}

/// Single-shot prompt helper: sends one user message, returns the reply text.
pub async fn ask(
    provider: &dyn ChatProvider,
    system: &str,
    prompt: &str,
    model: &ModelInfo,
) -> OuroborosResult<String> {
    let reply = provider
        .complete(&[Message::user(prompt)], system, &[], model)
        .await?;
    Ok(reply.text_content().trim().to_string())
}
