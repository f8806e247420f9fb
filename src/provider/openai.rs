use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;

use crate::error::{OuroborosError, OuroborosResult};
use crate::types::*;

use super::traits::{ChatProvider, ProbeResult};

/// Client for OpenAI-compatible chat endpoints (OpenAI, DeepSeek, local
/// gateways speaking the same protocol).
pub struct OpenAIProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    kind: ProviderKind,
}

impl OpenAIProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(ProviderKind::OpenAI.default_endpoint(), api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            kind: ProviderKind::OpenAI,
        }
    }

    pub fn deepseek(api_key: Option<String>) -> Self {
        Self::with_base_url(ProviderKind::DeepSeek.default_endpoint(), api_key)
            .with_kind(ProviderKind::DeepSeek)
    }

    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn build_body(
        &self,
        messages: &[Message],
        system: &str,
        tools: &[ToolDefinition],
        model: &ModelInfo,
    ) -> serde_json::Value {
        let mut api_messages = Vec::new();
        if !system.is_empty() {
            api_messages.push(json!({"role": "system", "content": system}));
        }

        for msg in messages {
            api_messages.push(self.message_to_api(msg));
        }

        let mut body = json!({
            "model": model.id,
            "messages": api_messages,
            "stream": true,
        });

        if model.max_output_tokens > 0 {
            body["max_tokens"] = json!(model.max_output_tokens);
        }
        if let Some(temperature) = model.temperature {
            body["temperature"] = json!(temperature);
        }

        if !tools.is_empty() {
            let api_tools: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(api_tools);
        }

        body
    }

    fn message_to_api(&self, msg: &Message) -> serde_json::Value {
        match msg.role {
            Role::Assistant => {
                let mut result = json!({"role": "assistant"});
                let mut content_text = String::new();
                let mut tool_calls: Vec<serde_json::Value> = Vec::new();

                for block in &msg.content {
                    match block {
                        ContentBlock::Text { text } => content_text.push_str(text),
                        ContentBlock::ToolCall { id, name, arguments } => {
                            tool_calls.push(json!({
                                "id": id,
                                "type": "function",
                                "function": {
                                    "name": name,
                                    "arguments": arguments.to_string(),
                                }
                            }));
                        }
                        ContentBlock::ToolResult { .. } => {}
                    }
                }

                result["content"] = json!(content_text);
                if !tool_calls.is_empty() {
                    result["tool_calls"] = json!(tool_calls);
                }
                result
            }
            Role::Tool => {
                if let Some(ContentBlock::ToolResult {
                    tool_call_id,
                    content,
                    ..
                }) = msg.content.first()
                {
                    json!({
                        "role": "tool",
                        "tool_call_id": tool_call_id,
                        "content": content,
                    })
                } else {
                    json!({"role": "user", "content": msg.text_content()})
                }
            }
            Role::User => json!({"role": "user", "content": msg.text_content()}),
            Role::System => json!({"role": "system", "content": msg.text_content()}),
        }
    }
}

/// Fold an SSE chat-completions body into an assistant message.
fn parse_sse(
    text: &str,
    model: &ModelInfo,
    event_tx: &mpsc::UnboundedSender<StreamDelta>,
) -> Message {
    let mut content_text = String::new();
    let mut tool_calls: Vec<(String, String, String)> = Vec::new(); // (id, name, args)
    let mut usage = TokenUsage::default();

    for line in text.lines() {
        let Some(data_str) = line.strip_prefix("data:") else {
            continue;
        };
        let data_str = data_str.trim();
        if data_str == "[DONE]" {
            break;
        }
        let Ok(data) = serde_json::from_str::<serde_json::Value>(data_str) else {
            continue;
        };

        if let Some(delta) = data
            .get("choices")
            .and_then(|v| v.as_array())
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("delta"))
        {
            if let Some(content) = delta.get("content").and_then(|v| v.as_str()) {
                content_text.push_str(content);
                let _ = event_tx.send(StreamDelta::TextDelta {
                    text: content.to_string(),
                });
            }

            if let Some(tcs) = delta.get("tool_calls").and_then(|v| v.as_array()) {
                for tc in tcs {
                    let idx = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;

                    while tool_calls.len() <= idx {
                        tool_calls.push((String::new(), String::new(), String::new()));
                    }

                    if let Some(id) = tc.get("id").and_then(|v| v.as_str()) {
                        tool_calls[idx].0 = id.to_string();
                    }
                    if let Some(func) = tc.get("function") {
                        if let Some(name) = func.get("name").and_then(|v| v.as_str()) {
                            tool_calls[idx].1 = name.to_string();
                        }
                        if let Some(args) = func.get("arguments").and_then(|v| v.as_str()) {
                            tool_calls[idx].2.push_str(args);
                            let _ = event_tx.send(StreamDelta::ToolCallDelta {
                                id: tool_calls[idx].0.clone(),
                                name: tool_calls[idx].1.clone(),
                                arguments_delta: args.to_string(),
                            });
                        }
                    }
                }
            }
        }

        if let Some(u) = data.get("usage") {
            if let Some(inp) = u.get("prompt_tokens").and_then(|v| v.as_u64()) {
                usage.input_tokens = inp as usize;
            }
            if let Some(out) = u.get("completion_tokens").and_then(|v| v.as_u64()) {
                usage.output_tokens = out as usize;
            }
        }
    }

    let mut content_blocks: Vec<ContentBlock> = Vec::new();
    if !content_text.is_empty() {
        content_blocks.push(ContentBlock::text(content_text));
    }
    for (i, (id, name, args_str)) in tool_calls.into_iter().enumerate() {
        if name.is_empty() {
            continue;
        }
        let id = if id.is_empty() { format!("call_{i}") } else { id };
        let args = serde_json::from_str(&args_str).unwrap_or(json!({}));
        content_blocks.push(ContentBlock::tool_call(id, name, args));
    }

    let mut msg = Message::new(Role::Assistant, content_blocks);
    msg.model = Some(model.id.clone());
    msg.usage = Some(usage);
    msg
}

#[async_trait]
impl ChatProvider for OpenAIProvider {
    fn kind(&self) -> ProviderKind {
        self.kind.clone()
    }

    async fn stream(
        &self,
        messages: &[Message],
        system: &str,
        tools: &[ToolDefinition],
        model: &ModelInfo,
        event_tx: mpsc::UnboundedSender<StreamDelta>,
    ) -> OuroborosResult<Message> {
        let body = self.build_body(messages, system, tools, model);
        let url = format!("{}/v1/chat/completions", self.base_url);
        tracing::debug!(provider = %self.kind, model = %model.id, "chat completion request");

        let response = self
            .request(self.client.post(&url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OuroborosError::from_status(&self.kind.to_string(), status, &body));
        }

        let bytes = response.bytes().await?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(parse_sse(&text, model, &event_tx))
    }

    async fn probe(&self, _model: &ModelInfo) -> OuroborosResult<ProbeResult> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self.request(self.client.get(&url)).send().await?;

        if response.status().is_success() {
            Ok(ProbeResult::healthy())
        } else {
            Ok(ProbeResult::unhealthy(format!("HTTP {}", response.status())))
        }
    }
}
