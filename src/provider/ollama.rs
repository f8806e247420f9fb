use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;

use crate::error::{OuroborosError, OuroborosResult};
use crate::types::*;

use super::traits::{ChatProvider, ProbeResult};

/// Client for the Ollama `/api/chat` endpoint (NDJSON streaming).
pub struct OllamaProvider {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OllamaProvider {
    pub fn new() -> Self {
        Self::with_endpoint(ProviderKind::Ollama.default_endpoint(), None)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
        }
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
        api_messages.extend(messages.iter().map(message_to_api));

        let mut options = json!({"num_ctx": model.context_window});
        if model.max_output_tokens > 0 {
            options["num_predict"] = json!(model.max_output_tokens);
        }
        if let Some(temperature) = model.temperature {
            options["temperature"] = json!(temperature);
        }

        let mut body = json!({
            "model": model.id,
            "messages": api_messages,
            "stream": true,
            "options": options,
        });

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
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn message_to_api(msg: &Message) -> serde_json::Value {
    match msg.role {
        Role::Assistant => {
            let tool_calls: Vec<serde_json::Value> = msg
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolCall { name, arguments, .. } => Some(json!({
                        "function": {"name": name, "arguments": arguments}
                    })),
                    _ => None,
                })
                .collect();

            let mut result = json!({"role": "assistant", "content": msg.text_content()});
            if !tool_calls.is_empty() {
                result["tool_calls"] = json!(tool_calls);
            }
            result
        }
        Role::Tool => {
            let content = msg
                .content
                .iter()
                .find_map(|block| match block {
                    ContentBlock::ToolResult { content, .. } => Some(content.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| msg.text_content());
            json!({"role": "tool", "content": content})
        }
        Role::User => json!({"role": "user", "content": msg.text_content()}),
        Role::System => json!({"role": "system", "content": msg.text_content()}),
    }
}

/// Fold an NDJSON `/api/chat` body into an assistant message.
fn parse_ndjson(
    text: &str,
    model: &ModelInfo,
    event_tx: &mpsc::UnboundedSender<StreamDelta>,
) -> OuroborosResult<Message> {
    let mut content_text = String::new();
    let mut tool_calls: Vec<ContentBlock> = Vec::new();
    let mut usage = TokenUsage::default();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Ok(data) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };

        if let Some(err) = data.get("error").and_then(|v| v.as_str()) {
            return Err(OuroborosError::Provider(format!("ollama: {err}")));
        }

        if let Some(message) = data.get("message") {
            if let Some(content) = message.get("content").and_then(|v| v.as_str()) {
                if !content.is_empty() {
                    content_text.push_str(content);
                    let _ = event_tx.send(StreamDelta::TextDelta {
                        text: content.to_string(),
                    });
                }
            }

            if let Some(calls) = message.get("tool_calls").and_then(|v| v.as_array()) {
                for call in calls {
                    let Some(func) = call.get("function") else {
                        continue;
                    };
                    let Some(name) = func.get("name").and_then(|v| v.as_str()) else {
                        continue;
                    };
                    // Arguments arrive as an object, some gateways send a string
                    let arguments = match func.get("arguments") {
                        Some(serde_json::Value::String(s)) => {
                            serde_json::from_str(s).unwrap_or(json!({}))
                        }
                        Some(v) => v.clone(),
                        None => json!({}),
                    };
                    let id = call
                        .get("id")
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("call_{}", tool_calls.len()));
                    let _ = event_tx.send(StreamDelta::ToolCallDelta {
                        id: id.clone(),
                        name: name.to_string(),
                        arguments_delta: arguments.to_string(),
                    });
                    tool_calls.push(ContentBlock::tool_call(id, name, arguments));
                }
            }
        }

        if data.get("done").and_then(|v| v.as_bool()).unwrap_or(false) {
            if let Some(n) = data.get("prompt_eval_count").and_then(|v| v.as_u64()) {
                usage.input_tokens = n as usize;
            }
            if let Some(n) = data.get("eval_count").and_then(|v| v.as_u64()) {
                usage.output_tokens = n as usize;
            }
        }
    }

    let mut content_blocks = Vec::new();
    if !content_text.is_empty() {
        content_blocks.push(ContentBlock::text(content_text));
    }
    content_blocks.extend(tool_calls);

    let mut msg = Message::new(Role::Assistant, content_blocks);
    msg.model = Some(model.id.clone());
    msg.usage = Some(usage);
    Ok(msg)
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
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
        let url = format!("{}/api/chat", self.endpoint);
        tracing::debug!(model = %model.id, %url, "ollama chat request");

        let response = self
            .request(self.client.post(&url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OuroborosError::from_status("ollama", status, &body));
        }

        let bytes = response.bytes().await?;
        parse_ndjson(&String::from_utf8_lossy(&bytes), model, &event_tx)
    }

    async fn probe(&self, model: &ModelInfo) -> OuroborosResult<ProbeResult> {
        let url = format!("{}/api/tags", self.endpoint);
        let response = self.request(self.client.get(&url)).send().await?;

        if !response.status().is_success() {
            return Ok(ProbeResult::unhealthy(format!("HTTP {}", response.status())));
        }

        let tags: serde_json::Value = response.json().await?;
        let installed = tags
            .get("models")
            .and_then(|v| v.as_array())
            .map(|models| {
                models.iter().any(|m| {
                    m.get("name")
                        .and_then(|n| n.as_str())
                        .map(|n| n == model.id || n.starts_with(&format!("{}:", model.id)))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false);

        if installed {
            Ok(ProbeResult::healthy())
        } else {
            Ok(ProbeResult::unhealthy(format!("model {} not pulled", model.id)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_model() -> ModelInfo {
        ModelInfo {
            id: "llama3.1".into(),
            provider: ProviderKind::Ollama,
            context_window: 8192,
            max_output_tokens: 512,
            temperature: Some(0.7),
        }
    }

    #[test]
    fn builds_body_with_options() {
        let provider = OllamaProvider::new();
        let body = provider.build_body(&[Message::user("hi")], "be brief", &[], &test_model());
        assert_eq!(body["model"], "llama3.1");
        assert_eq!(body["stream"], true);
        assert_eq!(body["options"]["num_predict"], 512);
        assert_eq!(body["options"]["num_ctx"], 8192);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn assistant_tool_calls_keep_object_arguments() {
        let msg = Message::new(
            Role::Assistant,
            vec![ContentBlock::tool_call("c0", "recall_memory", json!({"query": "cats"}))],
        );
        let api = message_to_api(&msg);
        assert_eq!(api["tool_calls"][0]["function"]["arguments"]["query"], "cats");
    }

    #[test]
    fn parses_ndjson_stream() {
        let body = concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Hi \"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"there\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"prompt_eval_count\":9,\"eval_count\":3}\n",
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let msg = parse_ndjson(body, &test_model(), &tx).unwrap();
        assert_eq!(msg.text_content(), "Hi there");
        assert_eq!(msg.usage.unwrap(), TokenUsage::new(9, 3));
    }

    #[test]
    fn parses_tool_calls() {
        let body = "{\"message\":{\"role\":\"assistant\",\"content\":\"\",\"tool_calls\":[{\"function\":{\"name\":\"current_time\",\"arguments\":{}}}]},\"done\":true}\n";
        let (tx, _rx) = mpsc::unbounded_channel();
        let msg = parse_ndjson(body, &test_model(), &tx).unwrap();
        assert!(msg.has_tool_calls());
        assert_eq!(msg.text_content(), "");
    }

    #[test]
    fn error_line_is_provider_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = parse_ndjson("{\"error\":\"model 'x' not found\"}\n", &test_model(), &tx).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn chat_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "llama3.1"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "{\"message\":{\"role\":\"assistant\",\"content\":\"pong\"},\"done\":true}\n",
            ))
            .mount(&server)
            .await;

        let provider = OllamaProvider::with_endpoint(server.uri(), None);
        let reply = provider
            .complete(&[Message::user("ping")], "", &[], &test_model())
            .await
            .unwrap();
        assert_eq!(reply.text_content(), "pong");
    }

    #[tokio::test]
    async fn probe_checks_model_is_pulled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{"name": "llama3.1:latest"}]
            })))
            .mount(&server)
            .await;

        let provider = OllamaProvider::with_endpoint(server.uri(), None);
        assert!(provider.probe(&test_model()).await.unwrap().healthy);

        let mut other = test_model();
        other.id = "mistral".into();
        assert!(!provider.probe(&other).await.unwrap().healthy);
    }
}
