//! Bridge from skills to the `Tool` trait.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::OuroborosResult;
use crate::provider::{ask, ChatProvider};
use crate::tool::{Tool, ToolOutput};
use crate::types::{ModelInfo, ToolDefinition};

use super::SkillDefinition;

/// Exposes a skill to the LLM as the tool `skill_<name>`. Execution renders
/// the template with the `input` argument and asks the chat provider.
pub struct SkillTool {
    tool_name: String,
    skill: SkillDefinition,
    provider: Arc<dyn ChatProvider>,
    model: ModelInfo,
}

impl SkillTool {
    pub fn new(skill: SkillDefinition, provider: Arc<dyn ChatProvider>, model: ModelInfo) -> Self {
        Self {
            tool_name: format!("skill_{}", skill.name),
            skill,
            provider,
            model,
        }
    }

    pub fn skill(&self) -> &SkillDefinition {
        &self.skill
    }
}

#[async_trait]
impl Tool for SkillTool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn definition(&self) -> ToolDefinition {
        let description = if self.skill.description.is_empty() {
            format!("Run the learned skill '{}'", self.skill.name)
        } else {
            self.skill.description.clone()
        };
        ToolDefinition {
            name: self.tool_name.clone(),
            description,
            input_schema: json!({
                "type": "object",
                "properties": {"input": {"type": "string"}},
                "required": ["input"]
            }),
        }
    }

    async fn execute(&self, _call_id: &str, arguments: serde_json::Value) -> OuroborosResult<ToolOutput> {
        let input = arguments
            .get("input")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let prompt = self.skill.render(input)?;
        let answer = ask(self.provider.as_ref(), "", &prompt, &self.model).await?;
        Ok(ToolOutput::success(answer).with_metadata(json!({"skill": self.skill.name})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProbeResult;
    use crate::types::{Message, ProviderKind, StreamDelta};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Echoes the last user prompt back, recording what it saw.
    struct EchoProvider {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatProvider for EchoProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Custom("echo".into())
        }

        async fn stream(
            &self,
            messages: &[Message],
            _system: &str,
            _tools: &[ToolDefinition],
            _model: &ModelInfo,
            _event_tx: mpsc::UnboundedSender<StreamDelta>,
        ) -> OuroborosResult<Message> {
            let prompt = messages.last().map(|m| m.text_content()).unwrap_or_default();
            self.prompts.lock().unwrap().push(prompt.clone());
            Ok(Message::assistant(format!("echo: {prompt}")))
        }

        async fn probe(&self, _model: &ModelInfo) -> OuroborosResult<ProbeResult> {
            Ok(ProbeResult::healthy())
        }
    }

    fn tool() -> (SkillTool, Arc<EchoProvider>) {
        let provider = Arc::new(EchoProvider {
            prompts: Mutex::new(Vec::new()),
        });
        let skill = SkillDefinition::new("haiku", "Write a haiku", "Haiku about {{input}}");
        let model = ModelInfo::new("test", ProviderKind::Ollama);
        (SkillTool::new(skill, provider.clone(), model), provider)
    }

    #[test]
    fn tool_name_is_prefixed() {
        let (tool, _) = tool();
        assert_eq!(tool.name(), "skill_haiku");
        let def = tool.definition();
        assert_eq!(def.name, "skill_haiku");
        assert_eq!(def.description, "Write a haiku");
        assert_eq!(def.input_schema["required"][0], "input");
    }

    #[tokio::test]
    async fn execute_renders_and_asks_provider() {
        let (tool, provider) = tool();
        let out = tool.execute("c1", json!({"input": "the sea"})).await.unwrap();
        assert_eq!(out.content, "echo: Haiku about the sea");
        assert_eq!(out.metadata["skill"], "haiku");
        assert_eq!(*provider.prompts.lock().unwrap(), vec!["Haiku about the sea".to_string()]);
    }

    #[test]
    fn skill_tool_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SkillTool>();
    }
}
