//! Auxiliary capabilities the pipeline and its tools lean on: web search,
//! scraping, OCR, speech, image generation and embeddings.
pub mod client;
pub mod mock;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub snippets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

/// Where a media input lives: a fetchable URL or an inline base64 payload
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    Url(String),
    Inline { data: String, mime_type: String },
}

impl MediaSource {
    /// A single URL string, inlining payloads as data URLs
    pub fn as_url(&self) -> String {
        match self {
            MediaSource::Url(url) => url.clone(),
            MediaSource::Inline { data, mime_type } => {
                format!("data:{};base64,{}", mime_type, data)
            }
        }
    }
}

/// Raw bytes produced by a generating service
#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[async_trait]
pub trait SearchCapability: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchResponse>;
}

#[async_trait]
pub trait MediaCapability: Send + Sync {
    /// Extract the requested fields from a web page
    async fn scrape(&self, url: &str, fields: &[String]) -> Result<Value>;

    /// Read text or the requested fields out of an image or document
    async fn ocr(&self, source: &MediaSource, fields: &[String]) -> Result<Value>;

    async fn speech_to_text(&self, source: &MediaSource) -> Result<String>;

    async fn text_to_speech(&self, text: &str) -> Result<Binary>;

    async fn generate_image(&self, prompt: &str) -> Result<Binary>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingType {
    Text,
    Image,
    Audio,
    Pdf,
    TextOther,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingParams {
    #[serde(rename = "type")]
    pub kind: EmbeddingType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    #[serde(default)]
    pub embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    pub chunks: Vec<String>,
}

#[async_trait]
pub trait EmbeddingCapability: Send + Sync {
    async fn embed(&self, params: &EmbeddingParams) -> Result<EmbeddingResponse>;
}
