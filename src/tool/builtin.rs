//! Tools registered on every agent.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{OuroborosError, OuroborosResult};
use crate::memory::{SemanticMemory, Thought, ThoughtKind, ThoughtStore};
use crate::types::ToolDefinition;

use super::{Tool, ToolOutput};

/// Fetches a URL. Arguments: `url`, optional `method` (GET/POST) and JSON `body`.
pub struct HttpFetchTool {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetchTool {
    pub const DEFAULT_MAX_BYTES: usize = 16 * 1024;

    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            max_bytes: Self::DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_client(client: reqwest::Client, max_bytes: usize) -> Self {
        Self { client, max_bytes }
    }

    fn fail(message: impl Into<String>) -> OuroborosError {
        OuroborosError::ToolExecution {
            tool_name: "http_fetch".into(),
            message: message.into(),
        }
    }
}

impl Default for HttpFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpFetchTool {
    fn name(&self) -> &str {
        "http_fetch"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "http_fetch".into(),
            description: "Fetch the contents of a URL over HTTP".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string"},
                    "method": {"type": "string", "enum": ["GET", "POST"]},
                    "body": {"type": "object"}
                },
                "required": ["url"]
            }),
        }
    }

    async fn execute(&self, _call_id: &str, arguments: serde_json::Value) -> OuroborosResult<ToolOutput> {
        let url = arguments
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Self::fail("Missing 'url' argument"))?;

        let method = arguments
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("GET");

        let builder = match method.to_uppercase().as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            other => return Err(Self::fail(format!("Unsupported HTTP method: {other}"))),
        };

        let builder = match arguments.get("body") {
            Some(body) => builder.json(body),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| Self::fail(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let mut body = response
            .text()
            .await
            .map_err(|e| Self::fail(format!("Failed to read response body: {e}")))?;

        if body.len() > self.max_bytes {
            let mut cut = self.max_bytes;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
            body.push_str("\n[truncated]");
        }

        if status.is_success() {
            Ok(ToolOutput::success(body).with_metadata(json!({"status": status.as_u16()})))
        } else {
            Ok(ToolOutput::error(format!("HTTP {}: {}", status.as_u16(), body)))
        }
    }
}

/// Current UTC time in RFC 3339.
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "current_time".into(),
            description: "Get the current date and time (UTC)".into(),
            input_schema: json!({"type": "object", "properties": {}}),
        }
    }

    async fn execute(&self, _call_id: &str, _arguments: serde_json::Value) -> OuroborosResult<ToolOutput> {
        Ok(ToolOutput::success(chrono::Utc::now().to_rfc3339()))
    }
}

/// Semantic search over long-term memory.
pub struct RecallMemoryTool {
    memory: Arc<SemanticMemory>,
}

impl RecallMemoryTool {
    pub fn new(memory: Arc<SemanticMemory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for RecallMemoryTool {
    fn name(&self) -> &str {
        "recall_memory"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "recall_memory".into(),
            description: "Search long-term memory for facts related to a query".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1}
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, _call_id: &str, arguments: serde_json::Value) -> OuroborosResult<ToolOutput> {
        let Some(query) = arguments.get("query").and_then(|v| v.as_str()) else {
            return Ok(ToolOutput::error("Missing 'query' argument"));
        };
        let limit = arguments
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(5) as usize;

        let hits = self.memory.recall(query, limit).await?;
        if hits.is_empty() {
            return Ok(ToolOutput::success("No related memories."));
        }
        let lines: Vec<String> = hits
            .iter()
            .map(|h| format!("- [{}] {} ({:.2})", h.kind, h.text, h.score))
            .collect();
        Ok(ToolOutput::success(lines.join("\n")))
    }
}

/// Persist a note to the thought history.
pub struct SaveThoughtTool {
    thoughts: Arc<ThoughtStore>,
}

impl SaveThoughtTool {
    pub fn new(thoughts: Arc<ThoughtStore>) -> Self {
        Self { thoughts }
    }
}

#[async_trait]
impl Tool for SaveThoughtTool {
    fn name(&self) -> &str {
        "save_thought"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "save_thought".into(),
            description: "Save a short thought or note to persistent history".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "content": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["content"]
            }),
        }
    }

    async fn execute(&self, _call_id: &str, arguments: serde_json::Value) -> OuroborosResult<ToolOutput> {
        let Some(content) = arguments.get("content").and_then(|v| v.as_str()) else {
            return Ok(ToolOutput::error("Missing 'content' argument"));
        };
        let tags = arguments
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let thought = Thought::new(ThoughtKind::Note, content).with_tags(tags);
        self.thoughts.save(&thought).await?;
        Ok(ToolOutput::success(format!("Saved thought {}", thought.id)))
    }
}
