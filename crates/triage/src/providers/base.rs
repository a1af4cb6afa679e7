use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::message::Message;
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// Sampling and output controls for a single completion call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub top_k: Option<u32>,
    pub top_p: Option<f32>,
    /// JSON schema the reply must follow, for providers with structured output
    pub schema: Option<Value>,
    pub max_tokens: Option<i32>,
}

impl CompletionOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// The outcome of one completion call
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub message: Message,
    pub usage: Usage,
    /// Reasoning trace, when the provider returns one separately from the answer
    pub reasoning: Option<String>,
}

impl Completion {
    pub fn new(message: Message, usage: Usage) -> Self {
        Self {
            message,
            usage,
            reasoning: None,
        }
    }

    pub fn with_reasoning<S: Into<String>>(mut self, reasoning: S) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn text(&self) -> String {
        self.message.text()
    }
}

/// Incremental text deltas of a streamed completion
pub type TextStream = BoxStream<'static, Result<String>>;

/// The completion capability every model backend implements (OpenAI, Anthropic, etc).
/// A provider instance is bound to a single model.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The model this provider sends requests to
    fn model(&self) -> &str;

    /// Generate the next message, possibly containing tool requests
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        options: &CompletionOptions,
    ) -> Result<Completion>;

    /// Stream the reply as text deltas. Providers without native streaming
    /// yield the whole completion as one chunk.
    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<TextStream> {
        let completion = self.complete(system, messages, &[], options).await?;
        let text = completion.text();
        Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
    }
}
