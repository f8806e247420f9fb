use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Message Types ──────────────────────────────────────────────────────────

/// Role in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A content block within a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text { text: s.into() }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, args: serde_json::Value) -> Self {
        ContentBlock::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: args,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        ContentBlock::ToolResult {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error,
        }
    }

    /// Estimate token count for this content block (rough: 4 chars ≈ 1 token)
    pub fn estimate_tokens(&self) -> usize {
        let chars = match self {
            ContentBlock::Text { text } => text.len(),
            ContentBlock::ToolCall { name, arguments, .. } => {
                name.len() + arguments.to_string().len()
            }
            ContentBlock::ToolResult { content, .. } => content.len(),
        };
        chars.div_ceil(4)
    }
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl Message {
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
            model: None,
            usage: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentBlock::text(text)])
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentBlock::text(text)])
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self::new(
            Role::Tool,
            vec![ContentBlock::tool_result(tool_call_id, content, is_error)],
        )
    }

    /// Extract tool calls from this message
    pub fn tool_calls(&self) -> Vec<&ContentBlock> {
        self.content
            .iter()
            .filter(|c| matches!(c, ContentBlock::ToolCall { .. }))
            .collect()
    }

    /// Check if this message contains tool calls
    pub fn has_tool_calls(&self) -> bool {
        self.content
            .iter()
            .any(|c| matches!(c, ContentBlock::ToolCall { .. }))
    }

    /// Get text content concatenated
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Estimate total tokens for this message
    pub fn estimate_tokens(&self) -> usize {
        let content_tokens: usize = self.content.iter().map(|c| c.estimate_tokens()).sum();
        content_tokens + 4 // role + framing overhead
    }
}

// ─── Token Usage ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn new(input: usize, output: usize) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
        }
    }

    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}

// ─── Model Info ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider: ProviderKind,
    pub context_window: usize,
    #[serde(default)]
    pub max_output_tokens: usize,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>, provider: ProviderKind) -> Self {
        Self {
            id: id.into(),
            provider,
            context_window: 8192,
            max_output_tokens: 0,
            temperature: None,
        }
    }
}

/// Known chat providers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    OpenAI,
    DeepSeek,
    Custom(String),
}

impl ProviderKind {
    /// Base URL used when the configuration does not name an endpoint.
    pub fn default_endpoint(&self) -> &str {
        match self {
            ProviderKind::Ollama => "http://localhost:11434",
            ProviderKind::OpenAI => "https://api.openai.com",
            ProviderKind::DeepSeek => "https://api.deepseek.com",
            ProviderKind::Custom(_) => "http://localhost:8080",
        }
    }

    /// Environment variable holding the API key for this provider.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Ollama => Some("OLLAMA_API_KEY"),
            ProviderKind::OpenAI => Some("OPENAI_API_KEY"),
            ProviderKind::DeepSeek => Some("DEEPSEEK_API_KEY"),
            ProviderKind::Custom(_) => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Ollama => write!(f, "ollama"),
            ProviderKind::OpenAI => write!(f, "openai"),
            ProviderKind::DeepSeek => write!(f, "deepseek"),
            ProviderKind::Custom(s) => write!(f, "{s}"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "ollama" => ProviderKind::Ollama,
            "openai" => ProviderKind::OpenAI,
            "deepseek" => ProviderKind::DeepSeek,
            other => ProviderKind::Custom(other.to_string()),
        })
    }
}

// ─── Streaming ───────────────────────────────────────────────────────────────

/// Delta updates during streaming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamDelta {
    TextDelta { text: String },
    ToolCallDelta { id: String, name: String, arguments_delta: String },
}

// ─── Tool Definition ─────────────────────────────────────────────────────────

/// Schema for a tool's input parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}
