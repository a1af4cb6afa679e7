use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    Binary, EmbeddingCapability, EmbeddingParams, EmbeddingResponse, MediaCapability,
    MediaSource, SearchCapability, SearchResponse,
};
use crate::providers::configs::DEFAULT_TIMEOUT_SECS;
use crate::providers::utils::check_status;

pub const SERVICES_HOST: &str = "https://api.jigsawstack.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceClientConfig {
    pub host: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl ServiceClientConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: SERVICES_HOST.to_string(),
            api_key: api_key.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// HTTP client for the auxiliary services: search, scraping, OCR, speech,
/// image generation and embeddings, all behind one host and API key.
pub struct ServiceClient {
    client: Client,
    config: ServiceClientConfig,
}

impl ServiceClient {
    pub fn new(config: ServiceClientConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(anyhow!("services api_key must not be empty"));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    async fn send(&self, endpoint: &str, payload: &Value) -> Result<Response> {
        let url = format!("{}{}", self.config.host.trim_end_matches('/'), endpoint);
        debug!(target: "triage::services", %endpoint, "service request");
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .json(payload)
            .send()
            .await?;
        check_status(response).await.map_err(|e| {
            warn!(target: "triage::services", %endpoint, error = %e, "service request failed");
            e
        })
    }

    async fn post_json<T: DeserializeOwned>(&self, endpoint: &str, payload: Value) -> Result<T> {
        let body: Value = self.send(endpoint, &payload).await?.json().await?;
        if body.get("success") == Some(&Value::Bool(false)) {
            let message = body["message"].as_str().unwrap_or("unknown service error");
            return Err(anyhow!("{} failed: {}", endpoint, message));
        }
        Ok(serde_json::from_value(body)?)
    }

    async fn post_binary(&self, endpoint: &str, payload: Value, default_mime: &str) -> Result<Binary> {
        let response = self.send(endpoint, &payload).await?;
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| default_mime.to_string());
        let bytes = response.bytes().await?.to_vec();
        Ok(Binary { bytes, mime_type })
    }

    fn source_payload(source: &MediaSource) -> Value {
        json!({ "url": source.as_url() })
    }
}

#[async_trait]
impl SearchCapability for ServiceClient {
    async fn search(&self, query: &str) -> Result<SearchResponse> {
        self.post_json("/v1/web/search", json!({ "query": query })).await
    }
}

#[async_trait]
impl MediaCapability for ServiceClient {
    async fn scrape(&self, url: &str, fields: &[String]) -> Result<Value> {
        let body: Value = self
            .post_json("/v1/ai/scrape", json!({ "url": url, "element_prompts": fields }))
            .await?;
        Ok(body.get("context").cloned().unwrap_or(body))
    }

    async fn ocr(&self, source: &MediaSource, fields: &[String]) -> Result<Value> {
        let mut payload = Self::source_payload(source);
        if !fields.is_empty() {
            payload["prompt"] = json!(fields);
        }
        let body: Value = self.post_json("/v1/vocr", payload).await?;
        Ok(body.get("context").cloned().unwrap_or(body))
    }

    async fn speech_to_text(&self, source: &MediaSource) -> Result<String> {
        let body: Value = self
            .post_json("/v1/ai/transcribe", Self::source_payload(source))
            .await?;
        body["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("transcription response has no text"))
    }

    async fn text_to_speech(&self, text: &str) -> Result<Binary> {
        self.post_binary("/v1/ai/tts", json!({ "text": text }), "audio/mpeg")
            .await
    }

    async fn generate_image(&self, prompt: &str) -> Result<Binary> {
        self.post_binary(
            "/v1/ai/image_generation",
            json!({ "prompt": prompt }),
            "image/png",
        )
        .await
    }
}

#[async_trait]
impl EmbeddingCapability for ServiceClient {
    async fn embed(&self, params: &EmbeddingParams) -> Result<EmbeddingResponse> {
        self.post_json("/v1/embedding", serde_json::to_value(params)?)
            .await
    }
}
