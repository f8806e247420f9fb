//! Persisted thought history, one JSON file per thought.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OuroborosResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtKind {
    Observation,
    Reflection,
    Learning,
    Intention,
    Note,
}

impl std::fmt::Display for ThoughtKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThoughtKind::Observation => write!(f, "observation"),
            ThoughtKind::Reflection => write!(f, "reflection"),
            ThoughtKind::Learning => write!(f, "learning"),
            ThoughtKind::Intention => write!(f, "intention"),
            ThoughtKind::Note => write!(f, "note"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub id: String,
    pub kind: ThoughtKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Thought {
    pub fn new(kind: ThoughtKind, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            content: content.into(),
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    fn file_name(&self) -> String {
        format!("{}-{}.json", self.created_at.timestamp_millis(), self.id)
    }
}

pub struct ThoughtStore {
    dir: PathBuf,
}

impl ThoughtStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn save(&self, thought: &Thought) -> OuroborosResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(thought.file_name());
        let json = serde_json::to_string_pretty(thought)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }

    /// Load every readable thought, oldest first. Unparsable files are skipped.
    pub async fn load_all(&self) -> OuroborosResult<Vec<Thought>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut thoughts = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<Thought>(&content) {
                Ok(thought) => thoughts.push(thought),
                Err(e) => tracing::warn!("Skipping unreadable thought {:?}: {e}", path),
            }
        }
        thoughts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(thoughts)
    }

    /// Newest `n` thoughts, newest first.
    pub async fn recent(&self, n: usize) -> OuroborosResult<Vec<Thought>> {
        let mut all = self.load_all().await?;
        all.reverse();
        all.truncate(n);
        Ok(all)
    }

    /// Case-insensitive substring search over content and tags, newest first.
    pub async fn search(&self, term: &str) -> OuroborosResult<Vec<Thought>> {
        let needle = term.to_lowercase();
        let mut hits: Vec<Thought> = self
            .load_all()
            .await?
            .into_iter()
            .filter(|t| {
                t.content.to_lowercase().contains(&needle)
                    || t.tags.iter().any(|tag| tag.to_lowercase() == needle)
            })
            .collect();
        hits.reverse();
        Ok(hits)
    }

    pub async fn count(&self) -> OuroborosResult<usize> {
        Ok(self.load_all().await?.len())
    }
}
