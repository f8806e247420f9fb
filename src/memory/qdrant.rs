//! Qdrant REST client, limited to the calls the agent memory needs.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;

use crate::error::{OuroborosError, OuroborosResult};

use super::vector::{MemoryPoint, MemoryRecord, ScoredPoint, VectorStore};

pub struct QdrantStore {
    client: Client,
    endpoint: String,
    collection: String,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    async fn check(response: reqwest::Response) -> OuroborosResult<serde_json::Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OuroborosError::Memory(format!("qdrant {status}: {body}")));
        }
        Ok(response.json().await?)
    }

    /// Cheap reachability check used during agent start-up.
    pub async fn health(&self) -> OuroborosResult<()> {
        let response = self
            .client
            .get(format!("{}/collections", self.endpoint))
            .send()
            .await?;
        Self::check(response).await.map(|_| ())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn name(&self) -> &str {
        "qdrant"
    }

    async fn ensure_collection(&self, dimension: usize) -> OuroborosResult<()> {
        let response = self.client.get(self.collection_url()).send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Self::check(response).await.map(|_| ());
        }

        tracing::info!(collection = %self.collection, dimension, "creating qdrant collection");
        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({"vectors": {"size": dimension, "distance": "Cosine"}}))
            .send()
            .await?;
        Self::check(response).await.map(|_| ())
    }

    async fn upsert(&self, points: Vec<MemoryPoint>) -> OuroborosResult<()> {
        if points.is_empty() {
            return Ok(());
        }
        let points: Vec<serde_json::Value> = points
            .into_iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "vector": p.vector,
                    "payload": p.record,
                })
            })
            .collect();

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({"points": points}))
            .send()
            .await?;
        Self::check(response).await.map(|_| ())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> OuroborosResult<Vec<ScoredPoint>> {
        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({"vector": vector, "limit": limit, "with_payload": true}))
            .send()
            .await?;
        let body = Self::check(response).await?;

        let hits = body
            .get("result")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let id = hit.get("id")?.as_u64()?;
                let score = hit.get("score")?.as_f64()? as f32;
                let record: MemoryRecord =
                    serde_json::from_value(hit.get("payload")?.clone()).ok()?;
                Some(ScoredPoint { id, score, record })
            })
            .collect())
    }

    async fn count(&self) -> OuroborosResult<usize> {
        let response = self
            .client
            .post(format!("{}/points/count", self.collection_url()))
            .json(&json!({"exact": true}))
            .send()
            .await?;
        let body = Self::check(response).await?;
        Ok(body
            .get("result")
            .and_then(|r| r.get("count"))
            .and_then(|c| c.as_u64())
            .unwrap_or(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn creates_missing_collection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/mem"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/mem"))
            .and(body_partial_json(json!({"vectors": {"size": 3, "distance": "Cosine"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true})))
            .expect(1)
            .mount(&server)
            .await;

        let store = QdrantStore::new(server.uri(), "mem");
        store.ensure_collection(3).await.unwrap();
    }

    #[tokio::test]
    async fn existing_collection_is_left_alone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/mem"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {}})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/mem"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let store = QdrantStore::new(server.uri(), "mem");
        store.ensure_collection(3).await.unwrap();
    }

    #[tokio::test]
    async fn upsert_sends_payload() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/collections/mem/points"))
            .and(query_param("wait", "true"))
            .and(body_partial_json(json!({"points": [{"id": 7, "payload": {"text": "hello"}}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let store = QdrantStore::new(server.uri(), "mem");
        store
            .upsert(vec![MemoryPoint {
                id: 7,
                vector: vec![0.5, 0.5],
                record: MemoryRecord {
                    text: "hello".into(),
                    kind: "note".into(),
                    created_at: Utc::now(),
                },
            }])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn search_parses_hits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/mem/points/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [
                    {"id": 1, "score": 0.93, "payload": {
                        "text": "rust is fast", "kind": "learning",
                        "created_at": "2025-01-01T00:00:00Z"}},
                    {"id": 2, "score": 0.5, "payload": {"garbage": true}}
                ]
            })))
            .mount(&server)
            .await;

        let store = QdrantStore::new(server.uri(), "mem");
        let hits = store.search(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.text, "rust is fast");
        assert!((hits[0].score - 0.93).abs() < 1e-6);
    }

    #[tokio::test]
    async fn count_and_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/mem/points/count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"count": 42}})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/collections"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let store = QdrantStore::new(server.uri(), "mem");
        assert_eq!(store.count().await.unwrap(), 42);
        assert!(matches!(store.health().await, Err(OuroborosError::Memory(_))));
    }
}
