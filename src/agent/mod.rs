//! The Ouroboros agent: subsystem wiring and command dispatch.
//!
//! Every subsystem is optional or has an offline fallback. Start-up never
//! fails because a backend is unreachable; the outcome is recorded as a
//! [`SubsystemStatus`] and reported by the `status` command.

mod chat_loop;

pub use chat_loop::{build_system_prompt, ChatLoop, ChatOutcome};

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use crate::autonomy::{Autonomy, AutonomyContext, IntentionQueue};
use crate::command::{
    parse_action, split_first_word, split_skill_definition, Action, ActionType, HELP_TEXT,
};
use crate::config::OuroborosConfig;
use crate::embedding::{Embedder, HashingEmbedder, OllamaEmbedder, OpenAIEmbedder};
use crate::error::{OuroborosError, OuroborosResult};
use crate::history::ConversationHistory;
use crate::memory::{
    InMemoryVectorStore, MemoryHit, QdrantStore, SemanticMemory, Thought, ThoughtKind, ThoughtStore,
    VectorStore,
};
use crate::pipe::{parse_pipe_segments, substitute_pipe};
use crate::provider::{ask, build_chat_provider, ChatProvider};
use crate::skill::{SkillRegistry, SkillTool};
use crate::speech::{
    parse_speak_args, OpenAISpeech, OpenAITranscriber, Persona, SpeakArgs, SpeechSynthesizer,
    Transcriber, VoiceOutput,
};
use crate::tool::builtin::{CurrentTimeTool, HttpFetchTool, RecallMemoryTool, SaveThoughtTool};
use crate::tool::ToolRegistry;
use crate::types::{Message, ModelInfo, ProviderKind, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsystemState {
    Ready,
    Fallback,
    Disabled,
}

impl std::fmt::Display for SubsystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubsystemState::Ready => write!(f, "ready"),
            SubsystemState::Fallback => write!(f, "fallback"),
            SubsystemState::Disabled => write!(f, "disabled"),
        }
    }
}

/// Start-up outcome of one subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct SubsystemStatus {
    pub name: String,
    pub state: SubsystemState,
    pub detail: String,
}

impl SubsystemStatus {
    pub fn ready(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(name, SubsystemState::Ready, detail)
    }

    pub fn fallback(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(name, SubsystemState::Fallback, detail)
    }

    pub fn disabled(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(name, SubsystemState::Disabled, detail)
    }

    fn new(name: impl Into<String>, state: SubsystemState, detail: impl Into<String>) -> Self {
        let status = Self {
            name: name.into(),
            state,
            detail: detail.into(),
        };
        match state {
            SubsystemState::Ready => tracing::info!(subsystem = %status.name, "{}", status.detail),
            SubsystemState::Fallback => tracing::warn!(subsystem = %status.name, "{}", status.detail),
            SubsystemState::Disabled => tracing::debug!(subsystem = %status.name, "{}", status.detail),
        }
        status
    }
}

impl std::fmt::Display for SubsystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}: {}", self.name, self.state)
        } else {
            write!(f, "{}: {} ({})", self.name, self.state, self.detail)
        }
    }
}

/// Answer to one input line.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    /// The user asked to leave.
    pub exit: bool,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exit: false,
        }
    }

    pub fn exit(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exit: true,
        }
    }
}

/// Network-facing backends. [`AgentParts::connect`] probes the configured
/// services; tests build one by hand with mocks.
pub struct AgentParts {
    pub provider: Arc<dyn ChatProvider>,
    pub memory: Arc<SemanticMemory>,
    pub synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub status: Vec<SubsystemStatus>,
}

impl AgentParts {
    pub async fn connect(config: &OuroborosConfig) -> Self {
        let mut status = Vec::new();
        let model = config.model_info();

        let provider = build_chat_provider(config);
        let llm_detail = format!("{} {} at {}", config.provider, config.model, config.chat_endpoint());
        status.push(match provider.probe(&model).await {
            Ok(probe) if probe.healthy => SubsystemStatus::ready("llm", llm_detail),
            Ok(probe) => SubsystemStatus::fallback(
                "llm",
                format!(
                    "{llm_detail} unhealthy: {}",
                    probe.detail.unwrap_or_else(|| "no detail".into())
                ),
            ),
            Err(e) => SubsystemStatus::fallback("llm", format!("{llm_detail} unreachable: {e}")),
        });

        let remote: Arc<dyn Embedder> = match config.provider {
            ProviderKind::Ollama => Arc::new(OllamaEmbedder::new(config.embed_endpoint(), &config.embed_model)),
            _ => Arc::new(OpenAIEmbedder::new(
                config.embed_endpoint(),
                &config.embed_model,
                config.api_key.clone(),
            )),
        };
        let embedder: Arc<dyn Embedder> = match remote.embed("ping").await {
            Ok(_) => {
                status.push(SubsystemStatus::ready("embeddings", remote.name()));
                remote
            }
            Err(e) => {
                let local: Arc<dyn Embedder> = Arc::new(HashingEmbedder::default());
                status.push(SubsystemStatus::fallback(
                    "embeddings",
                    format!("{} failed ({e}); using {}", remote.name(), local.name()),
                ));
                local
            }
        };

        let store: Arc<dyn VectorStore> = match &config.qdrant_endpoint {
            Some(endpoint) => {
                let qdrant = QdrantStore::new(endpoint, &config.qdrant_collection);
                match qdrant.health().await {
                    Ok(()) => {
                        status.push(SubsystemStatus::ready(
                            "vector store",
                            format!("qdrant at {endpoint}, collection {}", config.qdrant_collection),
                        ));
                        Arc::new(qdrant) as Arc<dyn VectorStore>
                    }
                    Err(e) => {
                        status.push(SubsystemStatus::fallback(
                            "vector store",
                            format!("qdrant at {endpoint} unreachable ({e}); using in-memory store"),
                        ));
                        Arc::new(InMemoryVectorStore::new())
                    }
                }
            }
            None => {
                status.push(SubsystemStatus::fallback(
                    "vector store",
                    "no qdrant endpoint configured; using in-memory store",
                ));
                Arc::new(InMemoryVectorStore::new())
            }
        };

        let voice = &config.voice;
        let has_credentials = voice.api_key.is_some() || !voice.endpoint.contains("api.openai.com");
        let mut synthesizer: Option<Arc<dyn SpeechSynthesizer>> = None;
        let mut transcriber: Option<Arc<dyn Transcriber>> = None;
        if has_credentials {
            synthesizer = Some(Arc::new(OpenAISpeech::new(
                &voice.endpoint,
                voice.api_key.clone(),
                &voice.tts_model,
            )));
            transcriber = Some(Arc::new(OpenAITranscriber::new(
                &voice.endpoint,
                voice.api_key.clone(),
                &voice.stt_model,
            )));
            status.push(SubsystemStatus::ready(
                "speech",
                format!("{} / {} at {}", voice.tts_model, voice.stt_model, voice.endpoint),
            ));
        } else {
            status.push(SubsystemStatus::disabled("speech", "OPENAI_API_KEY not set"));
        }

        Self {
            provider,
            memory: Arc::new(SemanticMemory::new(embedder, store)),
            synthesizer,
            transcriber,
            status,
        }
    }
}

/// Conversational replies that are read aloud when voice is enabled.
fn is_spoken(kind: ActionType) -> bool {
    matches!(
        kind,
        ActionType::Chat
            | ActionType::Ask
            | ActionType::Summarize
            | ActionType::LearnAbout
            | ActionType::ThinkAbout
            | ActionType::Reflect
            | ActionType::Skill
            | ActionType::Listen
    )
}

fn uses_llm(kind: ActionType) -> bool {
    is_spoken(kind) || kind == ActionType::LearnSkill
}

/// Turn a handler error into the text shown to the user.
fn describe_failure(kind: ActionType, error: &OuroborosError) -> String {
    match error {
        OuroborosError::Command(message) => message.clone(),
        OuroborosError::Speech(_) => format!("Speech unavailable ({error})"),
        _ if kind == ActionType::Speak => format!("Speech unavailable ({error})"),
        OuroborosError::Memory(_) => format!("Memory unavailable ({error})"),
        _ if matches!(kind, ActionType::Remember | ActionType::Recall) => {
            format!("Memory unavailable ({error})")
        }
        OuroborosError::Provider(_) | OuroborosError::RateLimited { .. } | OuroborosError::Auth(_) => {
            format!("LLM unavailable ({error})")
        }
        OuroborosError::Http(_) if uses_llm(kind) => format!("LLM unavailable ({error})"),
        _ => format!("Error: {error}"),
    }
}

fn require<'a>(argument: &'a str, usage: &str) -> OuroborosResult<&'a str> {
    if argument.trim().is_empty() {
        Err(OuroborosError::Command(format!("Usage: {usage}")))
    } else {
        Ok(argument.trim())
    }
}

fn parse_id(argument: &str, usage: &str) -> OuroborosResult<u64> {
    require(argument, usage)?
        .trim_start_matches('#')
        .parse()
        .map_err(|_| OuroborosError::Command(format!("Usage: {usage}")))
}

pub struct OuroborosAgent {
    config: OuroborosConfig,
    model: ModelInfo,
    persona: Persona,
    provider: Arc<dyn ChatProvider>,
    memory: Arc<SemanticMemory>,
    thoughts: Arc<ThoughtStore>,
    skills: Arc<SkillRegistry>,
    tools: Arc<ToolRegistry>,
    voice: Option<Arc<VoiceOutput>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    history: ConversationHistory,
    intentions: Arc<IntentionQueue>,
    autonomy: Autonomy,
    status: Vec<SubsystemStatus>,
}

impl OuroborosAgent {
    /// Validate the configuration, probe the backends and start background
    /// tasks. Unreachable backends degrade; only invalid configuration fails.
    pub async fn initialize(config: OuroborosConfig) -> OuroborosResult<Self> {
        config.validate()?;
        let parts = AgentParts::connect(&config).await;
        Self::from_parts(config, parts).await
    }

    /// Assemble an agent around already-built backends.
    pub async fn from_parts(config: OuroborosConfig, parts: AgentParts) -> OuroborosResult<Self> {
        config.validate()?;
        let mut status = parts.status;
        let model = config.model_info();
        let persona = Persona::resolve(&config.persona);

        let thoughts = Arc::new(ThoughtStore::new(config.thoughts_dir()));
        status.push(SubsystemStatus::ready(
            "thoughts",
            config.thoughts_dir().display().to_string(),
        ));

        let skills = Arc::new(SkillRegistry::new(Some(config.skills_dir())));
        match skills.load_dir().await {
            Ok(count) => status.push(SubsystemStatus::ready("skills", format!("{count} loaded"))),
            Err(e) => status.push(SubsystemStatus::fallback(
                "skills",
                format!("could not load skills ({e}); starting empty"),
            )),
        }

        let tools = Arc::new(ToolRegistry::new());
        if config.tools_enabled {
            tools.register(Arc::new(HttpFetchTool::new()));
            tools.register(Arc::new(CurrentTimeTool));
            tools.register(Arc::new(RecallMemoryTool::new(Arc::clone(&parts.memory))));
            tools.register(Arc::new(SaveThoughtTool::new(Arc::clone(&thoughts))));
            for skill in skills.definitions() {
                tools.register(Arc::new(SkillTool::new(
                    skill,
                    Arc::clone(&parts.provider),
                    model.clone(),
                )));
            }
            status.push(SubsystemStatus::ready("tools", format!("{} registered", tools.len())));
        } else {
            status.push(SubsystemStatus::disabled("tools", "tools_enabled = false"));
        }

        let voice = parts.synthesizer.map(|synth| {
            Arc::new(VoiceOutput::new(
                synth,
                config.speech_dir(),
                persona.voice.clone(),
                config.voice.speed,
            ))
        });

        let history = match ConversationHistory::load(config.history_path(), config.history_limit).await {
            Ok(history) => {
                status.push(SubsystemStatus::ready(
                    "history",
                    format!("{} messages restored", history.len()),
                ));
                history
            }
            Err(e) => {
                status.push(SubsystemStatus::fallback(
                    "history",
                    format!("transcript unreadable ({e}); not persisting"),
                ));
                ConversationHistory::new(config.history_limit)
            }
        };

        let intentions = Arc::new(IntentionQueue::new(config.autonomy.max_pending));
        let autonomy = Autonomy::new(
            Arc::new(AutonomyContext {
                provider: Arc::clone(&parts.provider),
                model: model.clone(),
                thoughts: Arc::clone(&thoughts),
                intentions: Arc::clone(&intentions),
                system_prompt: build_system_prompt(&persona, config.culture.as_deref(), &[]),
            }),
            config.autonomy.clone(),
        );
        autonomy.start();
        if config.autonomy.thinking || config.autonomy.push_mode {
            status.push(SubsystemStatus::ready(
                "autonomy",
                format!(
                    "thinking {}, push {}",
                    on_off(config.autonomy.thinking),
                    on_off(config.autonomy.push_mode)
                ),
            ));
        } else {
            status.push(SubsystemStatus::disabled("autonomy", "thinking and push mode off"));
        }

        tracing::info!(persona = %persona.name, model = %model.id, "agent initialized");

        Ok(Self {
            config,
            model,
            persona,
            provider: parts.provider,
            memory: parts.memory,
            thoughts,
            skills,
            tools,
            voice,
            transcriber: parts.transcriber,
            history,
            intentions,
            autonomy,
            status,
        })
    }

    pub fn config(&self) -> &OuroborosConfig {
        &self.config
    }

    pub fn subsystems(&self) -> &[SubsystemStatus] {
        &self.status
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn memory(&self) -> &SemanticMemory {
        &self.memory
    }

    pub fn thoughts(&self) -> &ThoughtStore {
        &self.thoughts
    }

    pub fn skills(&self) -> &SkillRegistry {
        &self.skills
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn intentions(&self) -> &IntentionQueue {
        &self.intentions
    }

    pub fn autonomy(&self) -> &Autonomy {
        &self.autonomy
    }

    /// Handle one input line: a command, a pipe chain, or chat. Failures are
    /// reported in the reply text rather than returned.
    pub async fn process(&mut self, line: &str) -> Reply {
        let (kind, result) = self.execute(line).await;
        match result {
            Ok(reply) => {
                if !reply.exit && is_spoken(kind) {
                    self.speak_in_background(&reply.text);
                }
                reply
            }
            Err(message) => Reply::text(message),
        }
    }

    /// Stop background tasks.
    pub async fn shutdown(&self) {
        self.autonomy.shutdown().await;
        tracing::info!("agent shut down");
    }

    async fn execute(&mut self, line: &str) -> (ActionType, Result<Reply, String>) {
        let segments = parse_pipe_segments(line);
        match segments.len() {
            0 => return (ActionType::Chat, Ok(Reply::text(""))),
            1 => return self.run_single(&segments[0]).await,
            _ => {}
        }

        let mut previous: Option<String> = None;
        let mut last_kind = ActionType::Chat;
        for (i, segment) in segments.iter().enumerate() {
            let command = substitute_pipe(segment, previous.as_deref());
            tracing::debug!(step = i + 1, %command, "pipe step");
            let (kind, result) = self.run_single(&command).await;
            last_kind = kind;
            match result {
                Ok(reply) if reply.exit => return (kind, Ok(reply)),
                Ok(reply) => previous = Some(reply.text),
                Err(message) => {
                    return (
                        kind,
                        Err(format!("Pipe stopped at step {} ({segment}): {message}", i + 1)),
                    )
                }
            }
        }
        (last_kind, Ok(Reply::text(previous.unwrap_or_default())))
    }

    async fn run_single(&mut self, line: &str) -> (ActionType, Result<Reply, String>) {
        let action = parse_action(line);
        let kind = action.kind;
        let result = self.dispatch(action).await.map_err(|e| {
            tracing::warn!(?kind, "command failed: {e}");
            describe_failure(kind, &e)
        });
        (kind, result)
    }

    async fn dispatch(&mut self, action: Action) -> OuroborosResult<Reply> {
        let arg = action.argument.as_str();
        let text = match action.kind {
            ActionType::Help => HELP_TEXT.to_string(),
            ActionType::Status => self.status_report().await,
            ActionType::Exit => return Ok(Reply::exit("Goodbye.")),
            ActionType::Ask => {
                let question = require(arg, "ask <question>")?;
                self.ask(question).await?
            }
            ActionType::LearnAbout => self.learn_about(require(arg, "learn about <topic>")?).await?,
            ActionType::Remember => {
                let fact = require(arg, "remember <fact>")?;
                self.memory.remember(fact, "fact").await?;
                "Remembered.".to_string()
            }
            ActionType::Recall => self.recall(require(arg, "recall <query>")?).await?,
            ActionType::SaveThought => {
                let content = require(arg, "save thought <text>")?;
                self.thoughts.save(&Thought::new(ThoughtKind::Note, content)).await?;
                "Thought saved.".to_string()
            }
            ActionType::Thoughts => self.list_thoughts(arg).await?,
            ActionType::ThinkAbout => self.think_about(require(arg, "think about <topic>")?).await?,
            ActionType::Reflect => self.autonomy.context().think_once().await?.content,
            ActionType::Summarize => {
                let body = require(arg, "summarize <text>")?;
                self.ask(&format!("Summarize the following text concisely:\n\n{body}"))
                    .await?
            }
            ActionType::Speak => self.speak(arg).await?,
            ActionType::Listen => self.listen(require(arg, "listen <audio file>")?).await?,
            ActionType::Persona => self.switch_persona(require(arg, "persona <name>")?),
            ActionType::Tools => self.list_tools(),
            ActionType::Tool => self.run_tool(require(arg, "tool <name> [json]")?).await?,
            ActionType::Skills => self.list_skills(),
            ActionType::LearnSkill => self.learn_skill(arg).await?,
            ActionType::Skill => self.run_skill(require(arg, "skill <name> <input>")?).await?,
            ActionType::Push => self.push(arg)?,
            ActionType::Intentions => self.list_intentions(),
            ActionType::Approve => return self.approve(parse_id(arg, "approve <id>")?).await,
            ActionType::Reject => {
                let id = parse_id(arg, "reject <id>")?;
                match self.intentions.reject(id) {
                    Some(intention) => format!("Rejected #{}: {}", intention.id, intention.command),
                    None => format!("No pending intention #{id}."),
                }
            }
            ActionType::History => self.show_history(),
            ActionType::Clear => {
                self.history.clear();
                "Conversation cleared.".to_string()
            }
            ActionType::Chat => self.chat(&action.argument).await?,
        };
        Ok(Reply::text(text))
    }

    fn system_prompt(&self, memories: &[MemoryHit]) -> String {
        build_system_prompt(&self.persona, self.config.culture.as_deref(), memories)
    }

    async fn ask(&self, prompt: &str) -> OuroborosResult<String> {
        ask(self.provider.as_ref(), &self.system_prompt(&[]), prompt, &self.model).await
    }

    async fn chat(&mut self, text: &str) -> OuroborosResult<String> {
        let memories = match self.memory.recall(text, 3).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::debug!("memory recall skipped: {e}");
                Vec::new()
            }
        };
        let system = self.system_prompt(&memories);

        let user = Message::user(text);
        let mut context = self.history.messages();
        context.push(user.clone());

        let chat = ChatLoop::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.tools),
            self.model.clone(),
            self.config.max_turns,
        )
        .with_tools_enabled(self.config.tools_enabled);
        let outcome = chat.run(&system, context).await?;

        self.record(user).await;
        for message in outcome.new_messages {
            self.record(message).await;
        }
        Ok(outcome.reply)
    }

    async fn record(&mut self, message: Message) {
        if let Err(e) = self.history.append(message.clone()).await {
            tracing::warn!("history transcript write failed: {e}");
            self.history.push(message);
        }
    }

    async fn learn_about(&self, topic: &str) -> OuroborosResult<String> {
        let summary = self
            .ask(&format!(
                "Teach me about {topic}. Reply with a concise summary of the key facts \
                 in at most five sentences."
            ))
            .await?;

        if let Err(e) = self.memory.remember(&format!("{topic}: {summary}"), "learning").await {
            tracing::warn!("could not store learning in memory: {e}");
        }
        let thought = Thought::new(ThoughtKind::Learning, summary.clone()).with_tags(vec![topic.to_string()]);
        self.thoughts.save(&thought).await?;
        Ok(summary)
    }

    async fn recall(&self, query: &str) -> OuroborosResult<String> {
        let hits = self.memory.recall(query, 5).await?;
        if hits.is_empty() {
            return Ok("Nothing related in memory.".to_string());
        }
        Ok(hits
            .iter()
            .map(|h| format!("- {} ({:.2})", h.text, h.score))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn list_thoughts(&self, arg: &str) -> OuroborosResult<String> {
        let n = if arg.trim().is_empty() {
            10
        } else {
            arg.trim()
                .parse::<usize>()
                .map_err(|_| OuroborosError::Command("Usage: thoughts [n]".into()))?
        };
        let thoughts = self.thoughts.recent(n).await?;
        if thoughts.is_empty() {
            return Ok("No thoughts yet.".to_string());
        }
        Ok(thoughts
            .iter()
            .map(|t| {
                format!(
                    "- {} [{}] {}",
                    t.created_at.format("%Y-%m-%d %H:%M"),
                    t.kind,
                    t.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn think_about(&self, topic: &str) -> OuroborosResult<String> {
        let insight = self
            .ask(&format!(
                "Think carefully about {topic}. Reply with one or two sentences \
                 capturing your most useful insight."
            ))
            .await?;
        let thought = Thought::new(ThoughtKind::Reflection, insight.clone()).with_tags(vec![topic.to_string()]);
        self.thoughts.save(&thought).await?;
        Ok(insight)
    }

    async fn speak(&self, arg: &str) -> OuroborosResult<String> {
        let voice = self
            .voice
            .as_ref()
            .ok_or_else(|| OuroborosError::Speech("speech output is not configured".into()))?;
        let mut args = parse_speak_args(arg);
        if args.text.is_empty() {
            return Err(OuroborosError::Command(
                "Usage: speak <text>[;voice=<voice>][;speed=<0.25-4.0>]".into(),
            ));
        }
        if args.voice.is_none() {
            args.voice = Some(self.persona.voice.clone());
        }
        let path = voice.speak(&args).await?;
        Ok(format!("Saved speech to {}", path.display()))
    }

    fn speak_in_background(&self, text: &str) {
        if !self.config.voice.enabled || text.trim().is_empty() {
            return;
        }
        let Some(voice) = self.voice.clone() else {
            return;
        };
        let args = SpeakArgs {
            text: text.to_string(),
            voice: Some(self.persona.voice.clone()),
            speed: None,
        };
        let cancel = self.autonomy.child_token();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                result = voice.speak(&args) => {
                    if let Err(e) = result {
                        tracing::warn!("background speech failed: {e}");
                    }
                }
            }
        });
    }

    async fn listen(&mut self, path: &str) -> OuroborosResult<String> {
        let transcriber = self
            .transcriber
            .clone()
            .ok_or_else(|| OuroborosError::Speech("speech input is not configured".into()))?;
        let heard = transcriber.transcribe_file(Path::new(path)).await?;
        if heard.is_empty() {
            return Ok("(no speech detected)".to_string());
        }
        let answer = self.chat(&heard).await?;
        Ok(format!("You said: {heard}\n\n{answer}"))
    }

    fn switch_persona(&mut self, name: &str) -> String {
        self.persona = Persona::resolve(name);
        self.config.persona = self.persona.name.clone();
        tracing::info!(persona = %self.persona.name, "persona switched");
        format!(
            "Persona switched to {} (voice: {}).",
            self.persona.name, self.persona.voice
        )
    }

    fn list_tools(&self) -> String {
        let defs = self.tools.definitions();
        if defs.is_empty() {
            return "No tools available.".to_string();
        }
        defs.iter()
            .map(|d| format!("- {}: {}", d.name, d.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn run_tool(&self, arg: &str) -> OuroborosResult<String> {
        let (name, raw_args) = split_first_word(arg);
        let arguments = if raw_args.is_empty() {
            json!({})
        } else {
            serde_json::from_str(raw_args).map_err(|e| {
                OuroborosError::Command(format!("Tool arguments must be JSON: {e}"))
            })?
        };
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| OuroborosError::Command(format!("Unknown tool: {name}")))?;
        let output = tool.execute("manual", arguments).await?;
        if output.is_error {
            Ok(format!("Tool error: {}", output.content))
        } else {
            Ok(output.content)
        }
    }

    fn list_skills(&self) -> String {
        let defs = self.skills.definitions();
        if defs.is_empty() {
            return "No skills learned yet. Teach one with: learn skill <name>: <template>".to_string();
        }
        defs.iter()
            .map(|s| {
                if s.description.is_empty() {
                    format!("- {}", s.name)
                } else {
                    format!("- {}: {}", s.name, s.description)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn learn_skill(&self, arg: &str) -> OuroborosResult<String> {
        let (name, template) = split_skill_definition(arg).ok_or_else(|| {
            OuroborosError::Command("Usage: learn skill <name>: <template>".into())
        })?;
        let description: String = template
            .lines()
            .next()
            .unwrap_or_default()
            .chars()
            .take(80)
            .collect();
        let skill = self.skills.learn(name, &description, template).await?;
        if self.config.tools_enabled {
            self.tools.register(Arc::new(SkillTool::new(
                skill.clone(),
                Arc::clone(&self.provider),
                self.model.clone(),
            )));
        }
        Ok(format!(
            "Learned skill '{}'. Use it with: skill {} <input>",
            skill.name, skill.name
        ))
    }

    async fn run_skill(&self, arg: &str) -> OuroborosResult<String> {
        let (name, input) = split_first_word(arg);
        let (skill, input) = match self.skills.get(name) {
            Some(skill) => (skill, input),
            None => match self.skills.best_match(arg) {
                Some(skill) => (skill, arg),
                None => {
                    return Err(OuroborosError::Command(format!(
                        "No skill matches '{name}'. Known skills: {}",
                        if self.skills.is_empty() {
                            "none".to_string()
                        } else {
                            self.skills.names().join(", ")
                        }
                    )))
                }
            },
        };
        let prompt = skill.render(input)?;
        self.ask(&prompt).await
    }

    fn push(&self, arg: &str) -> OuroborosResult<String> {
        match arg.trim().to_lowercase().as_str() {
            "on" => {
                self.autonomy.set_push(true);
                Ok("Push mode on. Proposed commands appear under `intentions`.".to_string())
            }
            "off" => {
                self.autonomy.set_push(false);
                Ok("Push mode off.".to_string())
            }
            "" => Ok(format!("Push mode is {}.", on_off(self.autonomy.push_enabled()))),
            _ => Err(OuroborosError::Command("Usage: push on|off".into())),
        }
    }

    fn list_intentions(&self) -> String {
        let pending = self.intentions.pending();
        if pending.is_empty() {
            return "No pending intentions.".to_string();
        }
        pending
            .iter()
            .map(|i| format!("#{} {} ({})", i.id, i.command, i.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn approve(&mut self, id: u64) -> OuroborosResult<Reply> {
        let intention = self
            .intentions
            .approve(id)
            .ok_or_else(|| OuroborosError::Command(format!("No pending intention #{id}.")))?;
        tracing::info!(id, command = %intention.command, "running approved intention");

        let (_, result) = Box::pin(self.execute(&intention.command)).await;
        let reply = result.map_err(OuroborosError::Command)?;
        self.intentions.mark_executed(id);
        Ok(Reply {
            text: format!("#{} {}\n\n{}", id, intention.command, reply.text),
            exit: reply.exit,
        })
    }

    fn show_history(&self) -> String {
        let lines: Vec<String> = self
            .history
            .messages()
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .filter_map(|m| {
                let text = m.text_content();
                if text.trim().is_empty() {
                    return None;
                }
                let who = if m.role == Role::User { "you" } else { self.persona.name.as_str() };
                Some(format!("{who}: {text}"))
            })
            .collect();
        if lines.is_empty() {
            "History is empty.".to_string()
        } else {
            lines.join("\n")
        }
    }

    async fn status_report(&self) -> String {
        let mut lines = vec![
            format!("persona: {} (voice {})", self.persona.name, self.persona.voice),
            format!("model: {} via {}", self.model.id, self.provider.kind()),
        ];
        lines.extend(self.status.iter().map(|s| s.to_string()));

        match self.memory.len().await {
            Ok(n) => lines.push(format!("memory: {n} entries in {}", self.memory.describe())),
            Err(e) => lines.push(format!("memory: unavailable ({e})")),
        }
        match self.thoughts.count().await {
            Ok(n) => lines.push(format!("thoughts: {n}")),
            Err(e) => lines.push(format!("thoughts: unavailable ({e})")),
        }
        lines.push(format!("skills: {}", self.skills.len()));
        lines.push(format!("tools: {}", self.tools.len()));
        lines.push(format!(
            "history: {}/{} messages",
            self.history.len(),
            self.history.limit()
        ));
        lines.push(format!("pending intentions: {}", self.intentions.pending().len()));
        lines.push(format!(
            "thinking: {}, push: {}",
            on_off(self.autonomy.thinking_enabled()),
            on_off(self.autonomy.push_enabled())
        ));
        lines.join("\n")
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProbeResult;
    use crate::types::{StreamDelta, ToolDefinition};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Replies with queued messages, then echoes the last user text.
    struct ScriptedProvider {
        queued: Mutex<Vec<Message>>,
        fail: bool,
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Custom("scripted".into())
        }

        async fn stream(
            &self,
            messages: &[Message],
            _system: &str,
            _tools: &[ToolDefinition],
            _model: &ModelInfo,
            _event_tx: mpsc::UnboundedSender<StreamDelta>,
        ) -> OuroborosResult<Message> {
            if self.fail {
                return Err(OuroborosError::Provider("connection refused".into()));
            }
            let mut queued = self.queued.lock().unwrap();
            if !queued.is_empty() {
                return Ok(queued.remove(0));
            }
            let last = messages.last().map(|m| m.text_content()).unwrap_or_default();
            Ok(Message::assistant(format!("echo: {last}")))
        }

        async fn probe(&self, _model: &ModelInfo) -> OuroborosResult<ProbeResult> {
            Ok(ProbeResult::healthy())
        }
    }

    async fn agent(dir: &Path, fail: bool) -> OuroborosAgent {
        let config = OuroborosConfig {
            data_dir: Some(dir.to_path_buf()),
            ..OuroborosConfig::default()
        };
        let parts = AgentParts {
            provider: Arc::new(ScriptedProvider {
                queued: Mutex::new(Vec::new()),
                fail,
            }),
            memory: Arc::new(SemanticMemory::new(
                Arc::new(HashingEmbedder::default()),
                Arc::new(InMemoryVectorStore::new()),
            )),
            synthesizer: None,
            transcriber: None,
            status: Vec::new(),
        };
        OuroborosAgent::from_parts(config, parts).await.unwrap()
    }

    #[test]
    fn subsystem_status_display() {
        let status = SubsystemStatus::fallback("vector store", "using in-memory store");
        assert_eq!(status.to_string(), "vector store: fallback (using in-memory store)");
        assert_eq!(SubsystemStatus::ready("llm", "").to_string(), "llm: ready");
    }

    #[test]
    fn failures_are_described_by_subsystem() {
        let llm = describe_failure(ActionType::Chat, &OuroborosError::Provider("down".into()));
        assert!(llm.starts_with("LLM unavailable"));
        let mem = describe_failure(ActionType::Remember, &OuroborosError::Memory("down".into()));
        assert!(mem.starts_with("Memory unavailable"));
        let usage = describe_failure(ActionType::Ask, &OuroborosError::Command("Usage: ask <question>".into()));
        assert_eq!(usage, "Usage: ask <question>");
    }

    #[tokio::test]
    async fn chat_uses_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(dir.path(), false).await;

        let reply = agent.process("hello there").await;
        assert_eq!(reply.text, "echo: hello there");
        assert!(!reply.exit);
        assert_eq!(agent.history().len(), 2);
        assert!(agent.config().history_path().exists());
    }

    #[tokio::test]
    async fn provider_failure_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(dir.path(), true).await;

        let reply = agent.process("hello").await;
        assert!(reply.text.starts_with("LLM unavailable"));
        assert!(agent.history().is_empty());

        // Local commands still work
        assert_eq!(agent.process("remember the sky is blue").await.text, "Remembered.");
    }

    #[tokio::test]
    async fn usage_errors_for_missing_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(dir.path(), false).await;
        assert_eq!(agent.process("ask").await.text, "Usage: ask <question>");
        assert_eq!(agent.process("approve x").await.text, "Usage: approve <id>");
        assert_eq!(agent.process("thoughts many").await.text, "Usage: thoughts [n]");
        assert!(agent.process("speak hi").await.text.starts_with("Speech unavailable"));
    }

    #[tokio::test]
    async fn exit_and_help() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(dir.path(), false).await;
        assert!(agent.process("help").await.text.contains("learn skill"));
        let bye = agent.process("bye").await;
        assert!(bye.exit);
        agent.shutdown().await;
        assert!(agent.autonomy().is_shut_down());
    }
}
