use anyhow::Result;
use async_trait::async_trait;

use super::base::{Completion, CompletionOptions, Provider, TextStream};
use super::configs::{OllamaProviderConfig, OpenAiProviderConfig};
use super::openai::OpenAiProvider;
use crate::models::message::Message;
use crate::models::tool::Tool;

pub const OLLAMA_HOST: &str = "http://localhost:11434";
pub const OLLAMA_MODEL: &str = "qwen2.5";

/// Local models served by Ollama through its OpenAI compatible endpoint
pub struct OllamaProvider {
    inner: OpenAiProvider,
}

impl OllamaProvider {
    pub fn new(config: OllamaProviderConfig) -> Result<Self> {
        let inner = OpenAiProvider::new(OpenAiProviderConfig {
            host: config.host,
            api_key: None,
            model: config.model,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        })?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        options: &CompletionOptions,
    ) -> Result<Completion> {
        self.inner.complete(system, messages, tools, options).await
    }

    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<TextStream> {
        self.inner.stream(system, messages, options).await
    }
}
