//! Bounded conversation history with an optional JSONL transcript.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::OuroborosResult;
use crate::types::{Message, Role};

/// The last `limit` messages of the conversation, oldest first.
///
/// When a transcript path is set, every appended message is also written as
/// one JSON line; the transcript is never truncated.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    messages: VecDeque<Message>,
    limit: usize,
    transcript: Option<PathBuf>,
}

impl ConversationHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            limit: limit.max(1),
            transcript: None,
        }
    }

    pub fn with_transcript(mut self, path: impl Into<PathBuf>) -> Self {
        self.transcript = Some(path.into());
        self
    }

    /// Restore the tail of an existing transcript. A missing file is an empty
    /// history; corrupt lines are skipped.
    pub async fn load(path: impl Into<PathBuf>, limit: usize) -> OuroborosResult<Self> {
        let path = path.into();
        let mut history = Self::new(limit);
        if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            let mut skipped = 0usize;
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<Message>(line) {
                    Ok(message) => history.push(message),
                    Err(_) => skipped += 1,
                }
            }
            if skipped > 0 {
                tracing::warn!(skipped, ?path, "skipped corrupt history lines");
            }
        }
        history.transcript = Some(path);
        Ok(history)
    }

    /// Add a message in memory only.
    pub fn push(&mut self, message: Message) {
        self.messages.push_back(message);
        while self.messages.len() > self.limit {
            self.messages.pop_front();
        }
        // A tool result whose call was trimmed away is meaningless to providers
        while self
            .messages
            .front()
            .is_some_and(|m| m.role == Role::Tool)
        {
            self.messages.pop_front();
        }
    }

    /// Add a message and write it to the transcript, if any.
    pub async fn append(&mut self, message: Message) -> OuroborosResult<()> {
        if let Some(path) = &self.transcript {
            write_line(path, &message).await?;
        }
        self.push(message);
        Ok(())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.back()
    }

    /// Forget the in-memory conversation. The transcript file is kept.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn transcript(&self) -> Option<&Path> {
        self.transcript.as_deref()
    }
}

async fn write_line(path: &Path, message: &Message) -> OuroborosResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let line = serde_json::to_string(message)? + "\n";
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(history: &ConversationHistory) -> Vec<String> {
        history.messages().iter().map(|m| m.text_content()).collect()
    }

    #[test]
    fn oldest_messages_are_dropped() {
        let mut history = ConversationHistory::new(3);
        for i in 0..5 {
            history.push(Message::user(format!("m{i}")));
        }
        assert_eq!(texts(&history), vec!["m2", "m3", "m4"]);
        assert_eq!(history.last().unwrap().text_content(), "m4");
    }

    #[test]
    fn orphaned_tool_results_are_dropped() {
        let mut history = ConversationHistory::new(2);
        history.push(Message::user("q"));
        history.push(Message::assistant("calling"));
        history.push(Message::tool_result("c1", "42", false));
        history.push(Message::assistant("the answer is 42"));
        // Window is [tool_result, assistant]; the tool result goes
        assert_eq!(history.len(), 1);
        assert_eq!(texts(&history), vec!["the answer is 42"]);
    }

    #[test]
    fn zero_limit_keeps_one() {
        let mut history = ConversationHistory::new(0);
        history.push(Message::user("a"));
        history.push(Message::user("b"));
        assert_eq!(history.limit(), 1);
        assert_eq!(texts(&history), vec!["b"]);
    }

    #[tokio::test]
    async fn transcript_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.jsonl");

        let mut history = ConversationHistory::new(10).with_transcript(&path);
        history.append(Message::user("hello")).await.unwrap();
        history.append(Message::assistant("hi there")).await.unwrap();
        history.clear();
        assert!(history.is_empty());

        let restored = ConversationHistory::load(&path, 10).await.unwrap();
        assert_eq!(texts(&restored), vec!["hello", "hi there"]);
        assert_eq!(restored.transcript(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn load_missing_file_and_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ConversationHistory::load(dir.path().join("none.jsonl"), 5)
            .await
            .unwrap();
        assert!(missing.is_empty());

        let path = dir.path().join("history.jsonl");
        let good = serde_json::to_string(&Message::user("kept")).unwrap();
        tokio::fs::write(&path, format!("{good}\n{{broken\n\n{good}\n"))
            .await
            .unwrap();
        let history = ConversationHistory::load(&path, 5).await.unwrap();
        assert_eq!(texts(&history), vec!["kept", "kept"]);
    }

    #[tokio::test]
    async fn load_keeps_only_the_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let mut history = ConversationHistory::new(100).with_transcript(&path);
        for i in 0..6 {
            history.append(Message::user(format!("m{i}"))).await.unwrap();
        }
        let restored = ConversationHistory::load(&path, 2).await.unwrap();
        assert_eq!(texts(&restored), vec!["m4", "m5"]);
    }
}
