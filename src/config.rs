//! Agent configuration.
//!
//! `OuroborosConfig` is layered: built-in defaults, then an optional TOML
//! file, then environment variables, then command-line overrides applied by
//! the binary. Nothing here talks to the network.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OuroborosError, OuroborosResult};
use crate::types::{ModelInfo, ProviderKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OuroborosConfig {
    /// Persona name; selects TTS voice and conversational style.
    #[serde(default = "default_persona")]
    pub persona: String,

    #[serde(default = "default_provider")]
    pub provider: ProviderKind,

    #[serde(default = "default_model")]
    pub model: String,

    /// Chat endpoint. Falls back to the provider's well-known URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Never written back to disk.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Upper bound on LLM round-trips per request when tools are involved.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    #[serde(default = "default_embed_model")]
    pub embed_model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_endpoint: Option<String>,

    /// Qdrant REST endpoint; `None` keeps vector memory in-process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qdrant_endpoint: Option<String>,

    #[serde(default = "default_qdrant_collection")]
    pub qdrant_collection: String,

    /// Culture/locale hint appended to the system prompt (e.g. "de-DE").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culture: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default = "default_true")]
    pub tools_enabled: bool,

    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub voice: VoiceConfig,

    #[serde(default)]
    pub autonomy: AutonomyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Speak every reply.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_voice_endpoint")]
    pub endpoint: String,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    #[serde(default = "default_stt_model")]
    pub stt_model: String,

    #[serde(default = "default_speed")]
    pub speed: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyConfig {
    /// Periodic background reflection on recent thoughts.
    #[serde(default)]
    pub thinking: bool,

    #[serde(default = "default_thinking_interval")]
    pub thinking_interval_secs: u64,

    /// Periodically propose intentions that wait for user approval.
    #[serde(default)]
    pub push_mode: bool,

    #[serde(default = "default_push_interval")]
    pub push_interval_secs: u64,

    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

fn default_persona() -> String {
    "Ouroboros".into()
}

fn default_provider() -> ProviderKind {
    ProviderKind::Ollama
}

fn default_model() -> String {
    "llama3.1".into()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> usize {
    2048
}

fn default_context_window() -> usize {
    8192
}

fn default_max_turns() -> usize {
    8
}

fn default_embed_model() -> String {
    "nomic-embed-text".into()
}

fn default_qdrant_collection() -> String {
    "ouroboros_memory".into()
}

fn default_history_limit() -> usize {
    50
}

fn default_true() -> bool {
    true
}

fn default_voice_endpoint() -> String {
    "https://api.openai.com".into()
}

fn default_tts_model() -> String {
    "tts-1".into()
}

fn default_stt_model() -> String {
    "whisper-1".into()
}

fn default_speed() -> f32 {
    1.0
}

fn default_thinking_interval() -> u64 {
    300
}

fn default_push_interval() -> u64 {
    120
}

fn default_max_pending() -> usize {
    10
}

impl Default for OuroborosConfig {
    fn default() -> Self {
        Self {
            persona: default_persona(),
            provider: default_provider(),
            model: default_model(),
            endpoint: None,
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            context_window: default_context_window(),
            max_turns: default_max_turns(),
            embed_model: default_embed_model(),
            embed_endpoint: None,
            qdrant_endpoint: None,
            qdrant_collection: default_qdrant_collection(),
            culture: None,
            data_dir: None,
            history_limit: default_history_limit(),
            tools_enabled: true,
            debug: false,
            voice: VoiceConfig::default(),
            autonomy: AutonomyConfig::default(),
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_voice_endpoint(),
            api_key: None,
            tts_model: default_tts_model(),
            stt_model: default_stt_model(),
            speed: default_speed(),
        }
    }
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            thinking: false,
            thinking_interval_secs: default_thinking_interval(),
            push_mode: false,
            push_interval_secs: default_push_interval(),
            max_pending: default_max_pending(),
        }
    }
}

impl OuroborosConfig {
    /// Load configuration: defaults, then the TOML file, then the process
    /// environment.
    ///
    /// An explicit `path` must exist. Without one, `<data_dir>/config.toml`
    /// is read when present.
    pub fn load(path: Option<&Path>) -> OuroborosResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let implicit = Self::default().data_dir().join("config.toml");
                if implicit.exists() {
                    Self::from_file(&implicit)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_from(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> OuroborosResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> OuroborosResult<Self> {
        toml::from_str(content).map_err(|e| OuroborosError::Config(format!("invalid TOML: {e}")))
    }

    pub fn to_toml(&self) -> OuroborosResult<String> {
        toml::to_string_pretty(self).map_err(|e| OuroborosError::Config(e.to_string()))
    }

    /// Apply environment overrides through a lookup function.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = non_empty("OUROBOROS_MODEL") {
            self.model = model;
        }
        if let Some(endpoint) = non_empty("OUROBOROS_ENDPOINT") {
            self.endpoint = Some(endpoint);
        }
        if let Some(qdrant) = non_empty("OUROBOROS_QDRANT") {
            self.qdrant_endpoint = Some(qdrant);
        }
        if self.api_key.is_none() {
            if let Some(var) = self.provider.api_key_env() {
                self.api_key = non_empty(var);
            }
        }
        if self.voice.api_key.is_none() {
            self.voice.api_key = non_empty("OPENAI_API_KEY");
        }
    }

    pub fn validate(&self) -> OuroborosResult<()> {
        if self.model.trim().is_empty() {
            return Err(OuroborosError::Config("model must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(OuroborosError::Config(format!(
                "temperature {} outside 0.0..=2.0",
                self.temperature
            )));
        }
        if self.max_turns == 0 {
            return Err(OuroborosError::Config("max_turns must be at least 1".into()));
        }
        if self.autonomy.thinking_interval_secs == 0 || self.autonomy.push_interval_secs == 0 {
            return Err(OuroborosError::Config(
                "autonomy intervals must be greater than zero".into(),
            ));
        }
        if !(0.25..=4.0).contains(&self.voice.speed) {
            return Err(OuroborosError::Config(format!(
                "voice speed {} outside 0.25..=4.0",
                self.voice.speed
            )));
        }
        Ok(())
    }

    pub fn chat_endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| self.provider.default_endpoint().to_string())
    }

    pub fn embed_endpoint(&self) -> String {
        self.embed_endpoint
            .clone()
            .unwrap_or_else(|| self.chat_endpoint())
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            id: self.model.clone(),
            provider: self.provider.clone(),
            context_window: self.context_window,
            max_output_tokens: self.max_tokens,
            temperature: Some(self.temperature),
        }
    }

    /// Root directory for persisted state, `~/.ouroboros` by default.
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".ouroboros"),
        }
    }

    pub fn thoughts_dir(&self) -> PathBuf {
        self.data_dir().join("thoughts")
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.data_dir().join("skills")
    }

    pub fn speech_dir(&self) -> PathBuf {
        self.data_dir().join("speech")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir().join("history.jsonl")
    }
}
