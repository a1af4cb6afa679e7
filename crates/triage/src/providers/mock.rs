use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::base::{Completion, CompletionOptions, Provider, TextStream, Usage};
use crate::models::message::Message;
use crate::models::tool::Tool;

/// A request the mock provider received
#[derive(Debug, Clone)]
pub struct MockCall {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
    pub options: CompletionOptions,
}

/// A provider that replays pre-configured responses, for tests and offline runs.
/// Once the script is exhausted every call fails.
pub struct MockProvider {
    model: String,
    responses: Mutex<VecDeque<Result<Completion>>>,
    calls: Mutex<Vec<MockCall>>,
    chunk_size: Option<usize>,
}

impl MockProvider {
    pub fn new<S: Into<String>>(model: S) -> Self {
        Self {
            model: model.into(),
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            chunk_size: None,
        }
    }

    pub fn with_completion(self, completion: Completion) -> Self {
        self.push(Ok(completion));
        self
    }

    pub fn with_message(self, message: Message) -> Self {
        self.with_completion(Completion::new(message, Usage::default()))
    }

    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_message(Message::assistant().with_text(text))
    }

    pub fn with_error<S: Into<String>>(self, error: S) -> Self {
        self.push(Err(anyhow!(error.into())));
        self
    }

    /// Split streamed text into chunks of this many characters
    pub fn with_stream_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    fn push(&self, response: Result<Completion>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn next_response(&self, call: MockCall) -> Result<Completion> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("mock provider '{}' has no scripted response", self.model)))
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        options: &CompletionOptions,
    ) -> Result<Completion> {
        self.next_response(MockCall {
            system: system.to_string(),
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            options: options.clone(),
        })
    }

    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<TextStream> {
        let text = self.complete(system, messages, &[], options).await?.text();
        let chars: Vec<char> = text.chars().collect();
        let chunks: Vec<Result<String>> = match self.chunk_size {
            Some(size) => chars
                .chunks(size)
                .map(|chunk| Ok(chunk.iter().collect()))
                .collect(),
            None => vec![Ok(text)],
        };
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}
