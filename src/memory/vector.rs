//! Vector store abstraction and the in-process fallback store.

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{OuroborosError, OuroborosResult};

/// Payload stored alongside every vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub text: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MemoryPoint {
    pub id: u64,
    pub vector: Vec<f32>,
    pub record: MemoryRecord,
}

#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: u64,
    pub score: f32,
    pub record: MemoryRecord,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    /// Create the backing collection if missing.
    async fn ensure_collection(&self, dimension: usize) -> OuroborosResult<()>;

    async fn upsert(&self, points: Vec<MemoryPoint>) -> OuroborosResult<()>;

    /// Nearest neighbours by cosine similarity, best first.
    async fn search(&self, vector: &[f32], limit: usize) -> OuroborosResult<Vec<ScoredPoint>>;

    async fn count(&self) -> OuroborosResult<usize>;
}

/// Cosine similarity; zero when either side has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot / (mag_a * mag_b)
}

/// In-memory vector store used when Qdrant is not configured or unreachable.
pub struct InMemoryVectorStore {
    points: DashMap<u64, MemoryPoint>,
    dimension: std::sync::atomic::AtomicUsize,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            points: DashMap::new(),
            dimension: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn ensure_collection(&self, dimension: usize) -> OuroborosResult<()> {
        use std::sync::atomic::Ordering::Relaxed;
        let current = self.dimension.load(Relaxed);
        if current != 0 && current != dimension {
            return Err(OuroborosError::Memory(format!(
                "dimension mismatch: store has {current}, got {dimension}"
            )));
        }
        self.dimension.store(dimension, Relaxed);
        Ok(())
    }

    async fn upsert(&self, points: Vec<MemoryPoint>) -> OuroborosResult<()> {
        for point in points {
            self.points.insert(point.id, point);
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> OuroborosResult<Vec<ScoredPoint>> {
        let mut scored: Vec<ScoredPoint> = self
            .points
            .iter()
            .map(|entry| ScoredPoint {
                id: entry.id,
                score: cosine_similarity(vector, &entry.vector),
                record: entry.record.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self) -> OuroborosResult<usize> {
        Ok(self.points.len())
    }
}
