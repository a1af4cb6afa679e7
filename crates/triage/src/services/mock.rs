use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Mutex;

use super::{
    Binary, EmbeddingCapability, EmbeddingParams, EmbeddingResponse, MediaCapability,
    MediaSource, SearchCapability, SearchResponse, SearchResult,
};

/// Search double returning fixed results and recording queries
#[derive(Default)]
pub struct MockSearch {
    results: Vec<SearchResult>,
    fail: bool,
    queries: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl SearchCapability for MockSearch {
    async fn search(&self, query: &str) -> Result<SearchResponse> {
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.to_string());
        if self.fail {
            return Err(anyhow!("search unavailable"));
        }
        Ok(SearchResponse {
            results: self.results.clone(),
        })
    }
}

/// One call received by [`MockMedia`]
#[derive(Debug, Clone, PartialEq)]
pub enum MediaCall {
    Scrape { url: String, fields: Vec<String> },
    Ocr { source: MediaSource, fields: Vec<String> },
    SpeechToText { source: MediaSource },
    TextToSpeech { text: String },
    GenerateImage { prompt: String },
}

/// Media double with canned outputs that records every call
pub struct MockMedia {
    ocr_output: Value,
    calls: Mutex<Vec<MediaCall>>,
}

impl Default for MockMedia {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMedia {
    pub fn new() -> Self {
        Self {
            ocr_output: json!({"text": ""}),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_ocr_output(mut self, output: Value) -> Self {
        self.ocr_output = output;
        self
    }

    pub fn calls(&self) -> Vec<MediaCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: MediaCall) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }
}

#[async_trait]
impl MediaCapability for MockMedia {
    async fn scrape(&self, url: &str, fields: &[String]) -> Result<Value> {
        self.record(MediaCall::Scrape {
            url: url.to_string(),
            fields: fields.to_vec(),
        });
        Ok(json!({"url": url, "data": []}))
    }

    async fn ocr(&self, source: &MediaSource, fields: &[String]) -> Result<Value> {
        self.record(MediaCall::Ocr {
            source: source.clone(),
            fields: fields.to_vec(),
        });
        Ok(self.ocr_output.clone())
    }

    async fn speech_to_text(&self, source: &MediaSource) -> Result<String> {
        self.record(MediaCall::SpeechToText {
            source: source.clone(),
        });
        Ok("transcribed audio".to_string())
    }

    async fn text_to_speech(&self, text: &str) -> Result<Binary> {
        self.record(MediaCall::TextToSpeech {
            text: text.to_string(),
        });
        Ok(Binary {
            bytes: b"ID3".to_vec(),
            mime_type: "audio/mpeg".to_string(),
        })
    }

    async fn generate_image(&self, prompt: &str) -> Result<Binary> {
        self.record(MediaCall::GenerateImage {
            prompt: prompt.to_string(),
        });
        Ok(Binary {
            bytes: vec![0x89, b'P', b'N', b'G'],
            mime_type: "image/png".to_string(),
        })
    }
}

/// Embedding double returning one fixed vector per call
#[derive(Default)]
pub struct MockEmbedding;

#[async_trait]
impl EmbeddingCapability for MockEmbedding {
    async fn embed(&self, params: &EmbeddingParams) -> Result<EmbeddingResponse> {
        let chunk = params.text.clone().or_else(|| params.url.clone()).unwrap_or_default();
        Ok(EmbeddingResponse {
            embeddings: vec![vec![0.1, 0.2, 0.3]],
            chunks: vec![chunk],
        })
    }
}
