use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::errors::{TriageError, TriageResult};
use crate::pipeline::Augmentation;
use crate::tools::{GeneratedArtifact, ToolInvocation};

/// One item of an incremental result
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// A text delta
    Text(String),
    /// The object parsed so far, each one more complete than the last
    Object(Value),
}

pub type OutputStream = BoxStream<'static, TriageResult<StreamChunk>>;

/// The generated output, eager or incremental
pub enum Output {
    Text(String),
    /// A reply validated against the caller's schema
    Object { text: String, object: Value },
    Stream(OutputStream),
}

/// Where an answer came from: the final model, tools that ran, side outputs
/// and any reasoning text
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Provenance {
    pub model: String,
    pub tool_used: Vec<ToolInvocation>,
    pub generated_artifacts: Vec<GeneratedArtifact>,
    pub reasoning_text: Option<String>,
}

/// The outcome of one `generate` call, assembled once by [`RequestResultBuilder`]
pub struct RequestResult {
    output: Output,
    provenance: Provenance,
}

impl RequestResult {
    pub fn builder<S: Into<String>>(model: S) -> RequestResultBuilder {
        RequestResultBuilder {
            provenance: Provenance {
                model: model.into(),
                ..Default::default()
            },
            output: None,
        }
    }

    pub fn model(&self) -> &str {
        &self.provenance.model
    }

    pub fn text(&self) -> Option<&str> {
        match &self.output {
            Output::Text(text) | Output::Object { text, .. } => Some(text),
            Output::Stream(_) => None,
        }
    }

    pub fn object(&self) -> Option<&Value> {
        match &self.output {
            Output::Object { object, .. } => Some(object),
            _ => None,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.output, Output::Stream(_))
    }

    pub fn tool_used(&self) -> &[ToolInvocation] {
        &self.provenance.tool_used
    }

    pub fn generated_artifacts(&self) -> &[GeneratedArtifact] {
        &self.provenance.generated_artifacts
    }

    pub fn reasoning_text(&self) -> Option<&str> {
        self.provenance.reasoning_text.as_deref()
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn into_parts(self) -> (Output, Provenance) {
        (self.output, self.provenance)
    }

    /// The incremental output, if this result was generated in streaming mode
    pub fn into_stream(self) -> Option<OutputStream> {
        match self.output {
            Output::Stream(stream) => Some(stream),
            _ => None,
        }
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Output::Object { text, object } => f
                .debug_struct("Object")
                .field("text", text)
                .field("object", object)
                .finish(),
            Output::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl fmt::Debug for RequestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let output = match &self.output {
            Output::Text(text) => format!("Text({:?})", text),
            Output::Object { object, .. } => format!("Object({})", object),
            Output::Stream(_) => "Stream(..)".to_string(),
        };
        f.debug_struct("RequestResult")
            .field("output", &output)
            .field("provenance", &self.provenance)
            .finish()
    }
}

pub struct RequestResultBuilder {
    provenance: Provenance,
    output: Option<Output>,
}

impl RequestResultBuilder {
    pub fn augmentation(mut self, augmentation: Augmentation) -> Self {
        self.provenance.tool_used = augmentation.tool_used;
        self.provenance.generated_artifacts = augmentation.generated_artifacts;
        self.provenance.reasoning_text = augmentation.reasoning_text;
        self
    }

    pub fn output(mut self, output: Output) -> Self {
        self.output = Some(output);
        self
    }

    pub fn build(self) -> TriageResult<RequestResult> {
        let output = self
            .output
            .ok_or_else(|| TriageError::Internal("request result has no output".to_string()))?;
        Ok(RequestResult {
            output,
            provenance: self.provenance,
        })
    }
}
