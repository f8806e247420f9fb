//! Background autonomy: periodic reflection and push-mode intentions.
//!
//! All background work hangs off one root [`CancellationToken`]. Each task
//! owns a child token, so a single task (push mode) can be stopped on its
//! own while `shutdown` stops everything.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AutonomyConfig;
use crate::error::{OuroborosError, OuroborosResult};
use crate::memory::{Thought, ThoughtKind, ThoughtStore};
use crate::provider::{ask, ChatProvider};
use crate::types::ModelInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentionStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
}

impl std::fmt::Display for IntentionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntentionStatus::Pending => write!(f, "pending"),
            IntentionStatus::Approved => write!(f, "approved"),
            IntentionStatus::Rejected => write!(f, "rejected"),
            IntentionStatus::Executed => write!(f, "executed"),
        }
    }
}

/// A command the agent would like to run, waiting for user approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intention {
    pub id: u64,
    pub description: String,
    pub command: String,
    pub proposed_at: DateTime<Utc>,
    pub status: IntentionStatus,
}

struct QueueState {
    next_id: u64,
    items: Vec<Intention>,
}

/// Thread-safe queue of intentions. At most `max_pending` may be pending.
pub struct IntentionQueue {
    max_pending: usize,
    state: Mutex<QueueState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl IntentionQueue {
    pub fn new(max_pending: usize) -> Self {
        Self {
            max_pending,
            state: Mutex::new(QueueState {
                next_id: 1,
                items: Vec::new(),
            }),
        }
    }

    pub fn propose(
        &self,
        description: impl Into<String>,
        command: impl Into<String>,
    ) -> OuroborosResult<Intention> {
        let mut state = lock(&self.state);
        let pending = state
            .items
            .iter()
            .filter(|i| i.status == IntentionStatus::Pending)
            .count();
        if pending >= self.max_pending {
            return Err(OuroborosError::Command(format!(
                "intention queue is full ({} pending)",
                pending
            )));
        }

        let intention = Intention {
            id: state.next_id,
            description: description.into(),
            command: command.into(),
            proposed_at: Utc::now(),
            status: IntentionStatus::Pending,
        };
        state.next_id += 1;
        state.items.push(intention.clone());
        Ok(intention)
    }

    pub fn pending(&self) -> Vec<Intention> {
        lock(&self.state)
            .items
            .iter()
            .filter(|i| i.status == IntentionStatus::Pending)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Intention> {
        lock(&self.state).items.clone()
    }

    pub fn is_full(&self) -> bool {
        self.pending().len() >= self.max_pending
    }

    /// Approve a pending intention and hand it back for execution.
    pub fn approve(&self, id: u64) -> Option<Intention> {
        self.transition(id, IntentionStatus::Pending, IntentionStatus::Approved)
    }

    pub fn reject(&self, id: u64) -> Option<Intention> {
        self.transition(id, IntentionStatus::Pending, IntentionStatus::Rejected)
    }

    pub fn mark_executed(&self, id: u64) -> Option<Intention> {
        self.transition(id, IntentionStatus::Approved, IntentionStatus::Executed)
    }

    fn transition(&self, id: u64, from: IntentionStatus, to: IntentionStatus) -> Option<Intention> {
        let mut state = lock(&self.state);
        let intention = state
            .items
            .iter_mut()
            .find(|i| i.id == id && i.status == from)?;
        intention.status = to;
        Some(intention.clone())
    }
}

/// What the background loops need from the agent.
pub struct AutonomyContext {
    pub provider: Arc<dyn ChatProvider>,
    pub model: ModelInfo,
    pub thoughts: Arc<ThoughtStore>,
    pub intentions: Arc<IntentionQueue>,
    /// Persona style used as the system prompt.
    pub system_prompt: String,
}

impl AutonomyContext {
    /// Reflect on the most recent thoughts and save the reflection.
    pub async fn think_once(&self) -> OuroborosResult<Thought> {
        let recent = self.thoughts.recent(5).await?;
        let prompt = if recent.is_empty() {
            "You have no recorded thoughts yet. Write one short reflection \
             (one or two sentences) on how you could be more useful to your user."
                .to_string()
        } else {
            let listed: Vec<String> = recent
                .iter()
                .map(|t| format!("- [{}] {}", t.kind, t.content))
                .collect();
            format!(
                "Your most recent thoughts:\n{}\n\nWrite one short new reflection \
                 (one or two sentences) that builds on them.",
                listed.join("\n")
            )
        };

        let reflection = ask(self.provider.as_ref(), &self.system_prompt, &prompt, &self.model).await?;
        if reflection.is_empty() {
            return Err(OuroborosError::Provider("empty reflection".into()));
        }
        let thought = Thought::new(ThoughtKind::Reflection, reflection)
            .with_tags(vec!["autonomous".into()]);
        self.thoughts.save(&thought).await?;
        Ok(thought)
    }

    /// Ask for one next command and queue it. `None` when the queue is full
    /// or the model proposes nothing usable.
    pub async fn propose_once(&self) -> OuroborosResult<Option<Intention>> {
        if self.intentions.is_full() {
            return Ok(None);
        }
        let recent = self.thoughts.recent(3).await?;
        let context: Vec<String> = recent.iter().map(|t| format!("- {}", t.content)).collect();
        let prompt = format!(
            "Recent thoughts:\n{}\n\nPropose exactly one command you would like to run next \
             for your user, on a single line, formatted as: <command> -- <reason>. \
             Commands look like `learn about <topic>`, `summarize <text>` or `think about <topic>`.",
            if context.is_empty() { "(none)".to_string() } else { context.join("\n") }
        );

        let reply = ask(self.provider.as_ref(), &self.system_prompt, &prompt, &self.model).await?;
        let Some((command, reason)) = parse_proposal(&reply) else {
            return Ok(None);
        };
        self.intentions.propose(reason, command).map(Some)
    }
}

/// Parse `<command> -- <reason>` from the first non-empty line.
pub fn parse_proposal(reply: &str) -> Option<(String, String)> {
    let line = reply.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (command, reason) = match line.split_once(" -- ") {
        Some((c, r)) => (c, r.trim()),
        None => (line, ""),
    };
    let command = command
        .trim()
        .trim_matches(|c| c == '`' || c == '"' || c == '\'')
        .trim()
        .to_string();
    if command.is_empty() {
        return None;
    }
    let reason = if reason.is_empty() { command.clone() } else { reason.to_string() };
    Some((command, reason))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    Think,
    Propose,
}

impl Job {
    fn name(self) -> &'static str {
        match self {
            Job::Think => "thinking",
            Job::Propose => "push",
        }
    }
}

struct BackgroundTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Supervises the background loops.
pub struct Autonomy {
    ctx: Arc<AutonomyContext>,
    config: AutonomyConfig,
    root: CancellationToken,
    thinking: Mutex<Option<BackgroundTask>>,
    push: Mutex<Option<BackgroundTask>>,
}

impl Autonomy {
    pub fn new(ctx: Arc<AutonomyContext>, config: AutonomyConfig) -> Self {
        Self {
            ctx,
            config,
            root: CancellationToken::new(),
            thinking: Mutex::new(None),
            push: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &AutonomyContext {
        &self.ctx
    }

    /// Start whichever loops the configuration enables. Must be called
    /// inside a Tokio runtime.
    pub fn start(&self) {
        if self.config.thinking {
            self.set_thinking(true);
        }
        if self.config.push_mode {
            self.set_push(true);
        }
    }

    pub fn set_thinking(&self, enabled: bool) -> bool {
        let period = Duration::from_secs(self.config.thinking_interval_secs);
        self.toggle(&self.thinking, Job::Think, period, enabled)
    }

    /// Turn push mode on or off. Returns true when the state changed.
    pub fn set_push(&self, enabled: bool) -> bool {
        let period = Duration::from_secs(self.config.push_interval_secs);
        self.toggle(&self.push, Job::Propose, period, enabled)
    }

    pub fn thinking_enabled(&self) -> bool {
        is_running(&self.thinking)
    }

    pub fn push_enabled(&self) -> bool {
        is_running(&self.push)
    }

    /// A child of the root token for work outside the loops (e.g. speaking
    /// replies in the background).
    pub fn child_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Cancel every background task and wait for the loops to exit.
    pub async fn shutdown(&self) {
        self.root.cancel();
        let tasks = [lock(&self.thinking).take(), lock(&self.push).take()];
        for task in tasks.into_iter().flatten() {
            let _ = task.handle.await;
        }
        tracing::debug!("autonomy stopped");
    }

    fn toggle(
        &self,
        slot: &Mutex<Option<BackgroundTask>>,
        job: Job,
        period: Duration,
        enabled: bool,
    ) -> bool {
        let mut slot = lock(slot);
        let running = slot.as_ref().is_some_and(|t| !t.handle.is_finished());
        match (enabled, running) {
            (true, false) => {
                if self.root.is_cancelled() {
                    return false;
                }
                let token = self.root.child_token();
                let handle = tokio::spawn(run_job(Arc::clone(&self.ctx), job, period, token.clone()));
                tracing::info!(task = job.name(), every_secs = period.as_secs(), "background task started");
                *slot = Some(BackgroundTask { token, handle });
                true
            }
            (false, true) => {
                if let Some(task) = slot.take() {
                    task.token.cancel();
                }
                tracing::info!(task = job.name(), "background task stopped");
                true
            }
            _ => false,
        }
    }
}

fn is_running(slot: &Mutex<Option<BackgroundTask>>) -> bool {
    lock(slot)
        .as_ref()
        .is_some_and(|t| !t.token.is_cancelled() && !t.handle.is_finished())
}

async fn run_job(ctx: Arc<AutonomyContext>, job: Job, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately; skip it so work starts one period in
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let result = match job {
                    Job::Think => ctx.think_once().await.map(|t| {
                        tracing::info!(thought = %t.id, "autonomous reflection saved");
                    }),
                    Job::Propose => ctx.propose_once().await.map(|i| {
                        if let Some(i) = i {
                            tracing::info!(id = i.id, command = %i.command, "intention proposed");
                        }
                    }),
                };
                if let Err(e) = result {
                    tracing::warn!(task = job.name(), "background task failed: {e}");
                }
            }
        }
    }
    tracing::debug!(task = job.name(), "background task exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProbeResult;
    use crate::types::{Message, ProviderKind, StreamDelta, ToolDefinition};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct ScriptedProvider {
        reply: String,
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Custom("scripted".into())
        }

        async fn stream(
            &self,
            _messages: &[Message],
            _system: &str,
            _tools: &[ToolDefinition],
            _model: &ModelInfo,
            _event_tx: mpsc::UnboundedSender<StreamDelta>,
        ) -> OuroborosResult<Message> {
            Ok(Message::assistant(self.reply.clone()))
        }

        async fn probe(&self, _model: &ModelInfo) -> OuroborosResult<ProbeResult> {
            Ok(ProbeResult::healthy())
        }
    }

    fn context(reply: &str, dir: &std::path::Path, max_pending: usize) -> Arc<AutonomyContext> {
        Arc::new(AutonomyContext {
            provider: Arc::new(ScriptedProvider {
                reply: reply.to_string(),
            }),
            model: ModelInfo::new("test", ProviderKind::Ollama),
            thoughts: Arc::new(ThoughtStore::new(dir)),
            intentions: Arc::new(IntentionQueue::new(max_pending)),
            system_prompt: "You are a test.".into(),
        })
    }

    #[test]
    fn queue_assigns_sequential_ids_and_bounds_pending() {
        let queue = IntentionQueue::new(2);
        assert_eq!(queue.propose("a", "ask a").unwrap().id, 1);
        assert_eq!(queue.propose("b", "ask b").unwrap().id, 2);
        assert!(queue.is_full());
        assert!(queue.propose("c", "ask c").is_err());

        // Rejecting frees a slot; ids keep counting
        queue.reject(1).unwrap();
        assert_eq!(queue.propose("c", "ask c").unwrap().id, 3);
        assert_eq!(queue.pending().len(), 2);
        assert_eq!(queue.all().len(), 3);
    }

    #[test]
    fn approve_and_execute_lifecycle() {
        let queue = IntentionQueue::new(5);
        let proposed = queue.propose("learn", "learn about rust").unwrap();

        let approved = queue.approve(proposed.id).unwrap();
        assert_eq!(approved.status, IntentionStatus::Approved);
        assert_eq!(approved.command, "learn about rust");
        assert!(queue.pending().is_empty());

        // Cannot approve or reject twice
        assert!(queue.approve(proposed.id).is_none());
        assert!(queue.reject(proposed.id).is_none());

        let executed = queue.mark_executed(proposed.id).unwrap();
        assert_eq!(executed.status, IntentionStatus::Executed);
        assert!(queue.approve(99).is_none());
    }

    #[test]
    fn proposal_parsing() {
        assert_eq!(
            parse_proposal("`learn about tokio` -- the user asked about async"),
            Some(("learn about tokio".into(), "the user asked about async".into()))
        );
        assert_eq!(
            parse_proposal("\n  reflect\nextra line"),
            Some(("reflect".into(), "reflect".into()))
        );
        assert_eq!(parse_proposal("   "), None);
        assert_eq!(parse_proposal("\"\" -- nothing"), None);
    }

    #[tokio::test]
    async fn think_once_saves_reflection() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context("I should learn more about the user.", dir.path(), 5);
        let thought = ctx.think_once().await.unwrap();
        assert_eq!(thought.kind, ThoughtKind::Reflection);
        assert_eq!(thought.tags, vec!["autonomous"]);
        assert_eq!(ctx.thoughts.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn propose_once_queues_until_full() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context("think about gardening -- spring is coming", dir.path(), 1);
        let intention = ctx.propose_once().await.unwrap().unwrap();
        assert_eq!(intention.command, "think about gardening");
        assert_eq!(intention.description, "spring is coming");
        assert!(ctx.propose_once().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn push_toggles_independently_and_shutdown_stops_all() {
        let dir = tempfile::tempdir().unwrap();
        let config = AutonomyConfig {
            thinking: true,
            thinking_interval_secs: 3600,
            push_mode: false,
            push_interval_secs: 3600,
            max_pending: 5,
        };
        let autonomy = Autonomy::new(context("reflect", dir.path(), 5), config);
        autonomy.start();
        assert!(autonomy.thinking_enabled());
        assert!(!autonomy.push_enabled());

        assert!(autonomy.set_push(true));
        assert!(!autonomy.set_push(true));
        assert!(autonomy.push_enabled());

        assert!(autonomy.set_push(false));
        assert!(!autonomy.push_enabled());
        assert!(autonomy.thinking_enabled());

        let speaker = autonomy.child_token();
        autonomy.shutdown().await;
        assert!(autonomy.is_shut_down());
        assert!(speaker.is_cancelled());
        assert!(!autonomy.thinking_enabled());
        assert!(!autonomy.set_push(true));
    }

    #[tokio::test]
    async fn push_loop_proposes_on_interval() {
        let dir = tempfile::tempdir().unwrap();
        let config = AutonomyConfig {
            thinking: false,
            thinking_interval_secs: 60,
            push_mode: true,
            push_interval_secs: 1,
            max_pending: 5,
        };
        let ctx = context("recall birthdays -- upcoming dates", dir.path(), 5);
        let autonomy = Autonomy::new(Arc::clone(&ctx), config);
        autonomy.start();

        for _ in 0..50 {
            if !ctx.intentions.pending().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let pending = ctx.intentions.pending();
        assert!(!pending.is_empty());
        assert_eq!(pending[0].command, "recall birthdays");

        autonomy.shutdown().await;
    }
}
