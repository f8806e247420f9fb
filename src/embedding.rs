//! Text embedding clients.
//!
//! Remote embedders talk to Ollama (`/api/embed`) or an OpenAI-compatible
//! `/v1/embeddings` endpoint. `HashingEmbedder` is a deterministic local
//! fallback so memory keeps working when no embedding model is reachable.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::error::{OuroborosError, OuroborosResult};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Short label for status output.
    fn name(&self) -> String;

    async fn embed(&self, text: &str) -> OuroborosResult<Vec<f32>>;

    /// Vector dimension; zero until a remote embedder has answered once.
    fn dimension(&self) -> usize;
}

// ─── Ollama ─────────────────────────────────────────────────────────────────

pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimension: AtomicUsize,
}

impl OllamaEmbedder {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimension: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn name(&self) -> String {
        format!("ollama:{}", self.model)
    }

    async fn embed(&self, text: &str) -> OuroborosResult<Vec<f32>> {
        let url = format!("{}/api/embed", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&json!({"model": self.model, "input": text}))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OuroborosError::from_status("ollama-embed", status, &body));
        }

        let body: serde_json::Value = response.json().await?;
        let vector = body
            .get("embeddings")
            .and_then(|v| v.get(0))
            .map(parse_vector)
            .ok_or_else(|| OuroborosError::Memory("embedding response missing 'embeddings'".into()))?;
        self.dimension.store(vector.len(), Ordering::Relaxed);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Relaxed)
    }
}

// ─── OpenAI-compatible ──────────────────────────────────────────────────────

pub struct OpenAIEmbedder {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    dimension: AtomicUsize,
}

impl OpenAIEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            dimension: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn name(&self) -> String {
        format!("openai:{}", self.model)
    }

    async fn embed(&self, text: &str) -> OuroborosResult<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .json(&json!({"model": self.model, "input": text}));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OuroborosError::from_status("openai-embed", status, &body));
        }

        let body: serde_json::Value = response.json().await?;
        let vector = body
            .get("data")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("embedding"))
            .map(parse_vector)
            .ok_or_else(|| OuroborosError::Memory("embedding response missing 'data'".into()))?;
        self.dimension.store(vector.len(), Ordering::Relaxed);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Relaxed)
    }
}

fn parse_vector(value: &serde_json::Value) -> Vec<f32> {
    value
        .as_array()
        .map(|arr| arr.iter().filter_map(|x| x.as_f64()).map(|x| x as f32).collect())
        .unwrap_or_default()
}

// ─── Local fallback ─────────────────────────────────────────────────────────

/// Feature-hashing bag-of-words embedder. Deterministic and offline.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub const DEFAULT_DIMENSION: usize = 256;

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in split_words(text) {
            let hash = fnv1a(word.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            // Sign bit reduces collision bias
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> String {
        format!("hashing:{}", self.dimension)
    }

    async fn embed(&self, text: &str) -> OuroborosResult<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Lowercased alphanumeric words.
pub(crate) fn split_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
