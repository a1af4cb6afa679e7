//! Named side operations a model can call during the tool sub-run.
pub mod media;
pub mod search;
pub mod time;

use async_trait::async_trait;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::errors::{ToolError, ToolResult};
use crate::files::FileReferences;
use crate::models::tool::{Tool, ToolCall};
use crate::services::{Binary, MediaCapability, SearchCapability};

/// A tool with a declared argument schema and an async executor
#[async_trait]
pub trait ToolSpec: Send + Sync {
    fn tool(&self) -> Tool;

    /// Run the tool. `InvalidParameters` goes back to the model, while
    /// `ExecutionError` fails the sub-run.
    async fn call(&self, arguments: Value, context: &ToolContext) -> ToolResult<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationKind {
    /// Called by a model during the tool sub-run
    ExplicitCall,
    /// Run by the pipeline itself to inject context
    ContextInjection,
}

/// Provenance of one tool run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub arguments: Value,
    pub result: String,
    pub kind: InvocationKind,
}

impl ToolInvocation {
    pub fn new<S: Into<String>>(
        tool_name: S,
        arguments: Value,
        result: String,
        kind: InvocationKind,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            result,
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Image,
    Audio,
}

/// Binary output of a side-effecting tool, kept out of the conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedArtifact {
    pub kind: ArtifactKind,
    #[serde(serialize_with = "serialize_base64")]
    pub payload: Vec<u8>,
    pub mime_type: String,
}

impl GeneratedArtifact {
    pub fn new(kind: ArtifactKind, binary: Binary) -> Self {
        Self {
            kind,
            payload: binary.bytes,
            mime_type: binary.mime_type,
        }
    }
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Per-request state shared by the tools of one sub-run
#[derive(Debug, Default)]
pub struct ToolContext {
    pub files: FileReferences,
    artifacts: Mutex<Vec<GeneratedArtifact>>,
}

impl ToolContext {
    pub fn new(files: FileReferences) -> Self {
        Self {
            files,
            artifacts: Mutex::new(Vec::new()),
        }
    }

    pub fn push_artifact(&self, artifact: GeneratedArtifact) {
        self.artifacts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(artifact);
    }

    pub fn take_artifacts(&self) -> Vec<GeneratedArtifact> {
        std::mem::take(&mut *self.artifacts.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// Deserialize tool arguments, reporting problems back to the model
pub fn parse_arguments<T: DeserializeOwned>(arguments: Value) -> ToolResult<T> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidParameters(e.to_string()))
}

/// The tools offered to the sub-run model, looked up by name
#[derive(Clone, Default)]
pub struct Toolbox {
    tools: Vec<Arc<dyn ToolSpec>>,
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in tool backed by the given services
    pub fn builtin(search: Arc<dyn SearchCapability>, media: Arc<dyn MediaCapability>) -> Self {
        Self::new()
            .with_tool(Arc::new(search::WebSearchTool::new(search)))
            .with_tool(Arc::new(search::ScrapeTool::new(media.clone())))
            .with_tool(Arc::new(media::VocrTool::new(media.clone())))
            .with_tool(Arc::new(media::SpeechToTextTool::new(media.clone())))
            .with_tool(Arc::new(media::TextToSpeechTool::new(media.clone())))
            .with_tool(Arc::new(media::ImageGenerationTool::new(media)))
            .with_tool(Arc::new(time::CurrentTimeTool))
    }

    /// Add a tool, replacing any tool with the same name in place
    pub fn with_tool(mut self, tool: Arc<dyn ToolSpec>) -> Self {
        let name = tool.tool().name;
        match self.tools.iter().position(|t| t.tool().name == name) {
            Some(index) => self.tools[index] = tool,
            None => self.tools.push(tool),
        }
        self
    }

    /// A copy of this toolbox with `extra` layered on top
    pub fn extended<I: IntoIterator<Item = Arc<dyn ToolSpec>>>(&self, extra: I) -> Self {
        extra
            .into_iter()
            .fold(self.clone(), |toolbox, tool| toolbox.with_tool(tool))
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.tools.iter().map(|t| t.tool()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.tool().name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolSpec>> {
        self.tools.iter().find(|t| t.tool().name == name)
    }

    pub async fn dispatch(&self, call: &ToolCall, context: &ToolContext) -> ToolResult<String> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::ToolNotFound(call.name.clone()))?;
        tool.call(call.arguments.clone(), context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mock::{MockMedia, MockSearch};
    use serde_json::json;

    struct Echo(&'static str);

    #[async_trait]
    impl ToolSpec for Echo {
        fn tool(&self) -> Tool {
            Tool::new(self.0, "Echo the text back", json!({"type": "object"}))
        }

        async fn call(&self, arguments: Value, _context: &ToolContext) -> ToolResult<String> {
            Ok(format!("{}: {}", self.0, arguments))
        }
    }

    fn builtin() -> Toolbox {
        Toolbox::builtin(Arc::new(MockSearch::default()), Arc::new(MockMedia::new()))
    }

    #[test]
    fn test_builtin_tool_names() {
        assert_eq!(
            builtin().names(),
            vec![
                "web_search",
                "scrape",
                "vocr",
                "speech_to_text",
                "text_to_speech",
                "image_generation",
                "current_time"
            ]
        );
    }

    #[tokio::test]
    async fn test_extra_tools_replace_builtins() {
        let toolbox = builtin().extended([
            Arc::new(Echo("current_time")) as Arc<dyn ToolSpec>,
            Arc::new(Echo("weather")) as Arc<dyn ToolSpec>,
        ]);
        assert_eq!(toolbox.names().len(), 8);
        assert_eq!(toolbox.names().last().map(String::as_str), Some("weather"));

        let output = toolbox
            .dispatch(
                &ToolCall::new("current_time", json!({})),
                &ToolContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(output, "current_time: {}");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool() {
        let err = builtin()
            .dispatch(&ToolCall::new("teleport", json!({})), &ToolContext::default())
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::ToolNotFound("teleport".to_string()));
    }

    #[test]
    fn test_artifact_payload_serializes_as_base64() {
        let artifact = GeneratedArtifact::new(
            ArtifactKind::Audio,
            Binary {
                bytes: b"ID3".to_vec(),
                mime_type: "audio/mpeg".into(),
            },
        );
        let value = serde_json::to_value(&artifact).unwrap();
        assert_eq!(value, json!({"kind": "audio", "payload": "SUQz", "mime_type": "audio/mpeg"}));

        let context = ToolContext::default();
        context.push_artifact(artifact);
        assert_eq!(context.take_artifacts().len(), 1);
        assert!(context.take_artifacts().is_empty());
    }
}
