pub mod builtin;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::OuroborosResult;
use crate::types::ToolDefinition;

/// A tool that can be executed by the agent
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match the definition name)
    fn name(&self) -> &str;

    /// Tool definition for sending to the LLM
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given arguments
    async fn execute(&self, call_id: &str, arguments: serde_json::Value) -> OuroborosResult<ToolOutput>;
}

/// Output from a tool execution
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
    pub metadata: serde_json::Value,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Registry of tools available to the agent.
///
/// Safe to share across tasks; tools may be registered while the agent runs
/// (learned skills are added this way).
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
        }
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|t| Arc::clone(t.value()))
    }

    /// Definitions sorted by tool name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.iter().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".into(),
                description: "Echo back the input".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"message": {"type": "string"}},
                    "required": ["message"]
                }),
            }
        }

        async fn execute(&self, _call_id: &str, arguments: serde_json::Value) -> OuroborosResult<ToolOutput> {
            let message = arguments
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("no message");
            Ok(ToolOutput::success(message))
        }
    }

    #[test]
    fn tool_output_constructors() {
        let output = ToolOutput::success("result");
        assert!(!output.is_error);
        let output = ToolOutput::error("failed");
        assert!(output.is_error);
        let output = ToolOutput::success("ok").with_metadata(json!({"duration_ms": 42}));
        assert_eq!(output.metadata["duration_ms"], 42);
    }

    #[test]
    fn registry_register_and_lookup() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("echo").unwrap().name(), "echo");
        assert!(registry.get("nonexistent").is_none());

        // Re-registering replaces
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister("echo"));
        assert!(!registry.unregister("echo"));
    }

    #[test]
    fn registry_definitions_sorted() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(builtin::CurrentTimeTool));
        registry.register(Arc::new(EchoTool));

        let defs = registry.definitions();
        assert_eq!(defs[0].name, "current_time");
        assert_eq!(defs[1].name, "echo");
        assert_eq!(registry.names(), vec!["current_time", "echo"]);
    }

    #[tokio::test]
    async fn tool_execute() {
        let result = EchoTool
            .execute("call_1", json!({"message": "hello world"}))
            .await
            .unwrap();
        assert_eq!(result.content, "hello world");
    }

    #[test]
    fn tool_is_object_safe() {
        fn _assert_object_safe(_: &dyn Tool) {}
    }
}
