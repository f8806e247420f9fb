//! Agent memory.
//!
//! Two layers:
//! - [`SemanticMemory`]: embedder + [`VectorStore`] (Qdrant or in-process)
//!   for similarity recall.
//! - [`ThoughtStore`]: durable JSON thought history on disk.

mod qdrant;
mod thoughts;
mod vector;

pub use qdrant::QdrantStore;
pub use thoughts::{Thought, ThoughtKind, ThoughtStore};
pub use vector::{cosine_similarity, InMemoryVectorStore, MemoryPoint, MemoryRecord, ScoredPoint, VectorStore};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::embedding::Embedder;
use crate::error::OuroborosResult;

/// A recalled memory.
#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub text: String,
    pub kind: String,
    pub score: f32,
}

pub struct SemanticMemory {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    collection_ready: AtomicBool,
}

impl SemanticMemory {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store,
            collection_ready: AtomicBool::new(false),
        }
    }

    /// Human-readable backend description, e.g. `qdrant (ollama:nomic-embed-text)`.
    pub fn describe(&self) -> String {
        format!("{} ({})", self.store.name(), self.embedder.name())
    }

    /// Store `text`. Identical text maps to the same point id.
    pub async fn remember(&self, text: &str, kind: &str) -> OuroborosResult<u64> {
        let vector = self.embedder.embed(text).await?;
        if !self.collection_ready.load(Ordering::Acquire) {
            self.store.ensure_collection(vector.len()).await?;
            self.collection_ready.store(true, Ordering::Release);
        }

        let id = point_id(text);
        self.store
            .upsert(vec![MemoryPoint {
                id,
                vector,
                record: MemoryRecord {
                    text: text.to_string(),
                    kind: kind.to_string(),
                    created_at: Utc::now(),
                },
            }])
            .await?;
        tracing::debug!(id, kind, "memory stored");
        Ok(id)
    }

    pub async fn recall(&self, query: &str, limit: usize) -> OuroborosResult<Vec<MemoryHit>> {
        let vector = self.embedder.embed(query).await?;
        let hits = self.store.search(&vector, limit).await?;
        Ok(hits
            .into_iter()
            .filter(|h| h.score > 0.0)
            .map(|h| MemoryHit {
                text: h.record.text,
                kind: h.record.kind,
                score: h.score,
            })
            .collect())
    }

    pub async fn len(&self) -> OuroborosResult<usize> {
        self.store.count().await
    }
}

/// Content-addressed point id: first 8 bytes of SHA-256, big-endian.
pub fn point_id(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}
