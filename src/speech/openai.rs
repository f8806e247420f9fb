use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::json;

use crate::error::{OuroborosError, OuroborosResult};

use super::{SpeechSynthesizer, Transcriber};

/// OpenAI-compatible `/v1/audio/speech`.
pub struct OpenAISpeech {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAISpeech {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAISpeech {
    async fn synthesize(&self, text: &str, voice: &str, speed: f32) -> OuroborosResult<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(OuroborosError::Speech("Nothing to say".into()));
        }

        let mut request = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .json(&json!({
                "model": self.model,
                "input": text,
                "voice": voice,
                "speed": speed,
                "response_format": "mp3",
            }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OuroborosError::from_status("speech", status, &body));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// OpenAI-compatible `/v1/audio/transcriptions` (multipart upload).
pub struct OpenAITranscriber {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAITranscriber {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Transcriber for OpenAITranscriber {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> OuroborosResult<String> {
        if audio.is_empty() {
            return Err(OuroborosError::Speech("Audio is empty".into()));
        }

        let form = Form::new()
            .part("file", Part::bytes(audio).file_name(file_name.to_string()))
            .text("model", self.model.clone());

        let mut request = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OuroborosError::from_status("transcription", status, &body));
        }

        let body: serde_json::Value = response.json().await?;
        body.get("text")
            .and_then(|t| t.as_str())
            .map(|t| t.trim().to_string())
            .ok_or_else(|| OuroborosError::Speech("Transcription response has no text".into()))
    }
}
