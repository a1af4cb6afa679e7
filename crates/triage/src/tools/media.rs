use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{parse_arguments, ArtifactKind, GeneratedArtifact, ToolContext, ToolSpec};
use crate::errors::{ToolError, ToolResult};
use crate::models::tool::Tool;
use crate::services::MediaCapability;

fn execution_error(err: anyhow::Error) -> ToolError {
    ToolError::ExecutionError(format!("{:#}", err))
}

pub struct VocrTool {
    media: Arc<dyn MediaCapability>,
}

impl VocrTool {
    pub fn new(media: Arc<dyn MediaCapability>) -> Self {
        Self { media }
    }
}

#[derive(Deserialize)]
struct VocrArgs {
    url: String,
    #[serde(default)]
    prompts: Vec<String>,
}

#[async_trait]
impl ToolSpec for VocrTool {
    fn tool(&self) -> Tool {
        Tool::new(
            "vocr",
            "Read text and structured data from an image or document. Pass an attachment:// uri for attached files.",
            json!({
                "type": "object",
                "required": ["url"],
                "properties": {
                    "url": {"type": "string", "description": "Attachment uri or URL of the image or document"},
                    "prompts": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Fields to extract, e.g. [\"total price\"]. Leave empty for all text."
                    }
                }
            }),
        )
    }

    async fn call(&self, arguments: Value, context: &ToolContext) -> ToolResult<String> {
        let args: VocrArgs = parse_arguments(arguments)?;
        let source = context.files.resolve(&args.url);
        let output = self
            .media
            .ocr(&source, &args.prompts)
            .await
            .map_err(execution_error)?;
        Ok(output.to_string())
    }
}

pub struct SpeechToTextTool {
    media: Arc<dyn MediaCapability>,
}

impl SpeechToTextTool {
    pub fn new(media: Arc<dyn MediaCapability>) -> Self {
        Self { media }
    }
}

#[derive(Deserialize)]
struct SpeechToTextArgs {
    url: String,
}

#[async_trait]
impl ToolSpec for SpeechToTextTool {
    fn tool(&self) -> Tool {
        Tool::new(
            "speech_to_text",
            "Transcribe an audio or video file to text.",
            json!({
                "type": "object",
                "required": ["url"],
                "properties": {
                    "url": {"type": "string", "description": "Attachment uri or URL of the audio"}
                }
            }),
        )
    }

    async fn call(&self, arguments: Value, context: &ToolContext) -> ToolResult<String> {
        let args: SpeechToTextArgs = parse_arguments(arguments)?;
        let source = context.files.resolve(&args.url);
        self.media
            .speech_to_text(&source)
            .await
            .map_err(execution_error)
    }
}

pub struct TextToSpeechTool {
    media: Arc<dyn MediaCapability>,
}

impl TextToSpeechTool {
    pub fn new(media: Arc<dyn MediaCapability>) -> Self {
        Self { media }
    }
}

#[derive(Deserialize)]
struct TextToSpeechArgs {
    text: String,
}

#[async_trait]
impl ToolSpec for TextToSpeechTool {
    fn tool(&self) -> Tool {
        Tool::new(
            "text_to_speech",
            "Convert text to spoken audio. The audio file is returned to the user separately.",
            json!({
                "type": "object",
                "required": ["text"],
                "properties": {
                    "text": {"type": "string", "description": "The text to speak"}
                }
            }),
        )
    }

    async fn call(&self, arguments: Value, context: &ToolContext) -> ToolResult<String> {
        let args: TextToSpeechArgs = parse_arguments(arguments)?;
        let audio = self
            .media
            .text_to_speech(&args.text)
            .await
            .map_err(execution_error)?;
        context.push_artifact(GeneratedArtifact::new(ArtifactKind::Audio, audio));
        Ok("Audio generated and attached to the response.".to_string())
    }
}

pub struct ImageGenerationTool {
    media: Arc<dyn MediaCapability>,
}

impl ImageGenerationTool {
    pub fn new(media: Arc<dyn MediaCapability>) -> Self {
        Self { media }
    }
}

#[derive(Deserialize)]
struct ImageGenerationArgs {
    prompt: String,
}

#[async_trait]
impl ToolSpec for ImageGenerationTool {
    fn tool(&self) -> Tool {
        Tool::new(
            "image_generation",
            "Generate an image from a description. The image is returned to the user separately.",
            json!({
                "type": "object",
                "required": ["prompt"],
                "properties": {
                    "prompt": {"type": "string", "description": "What the image should show"}
                }
            }),
        )
    }

    async fn call(&self, arguments: Value, context: &ToolContext) -> ToolResult<String> {
        let args: ImageGenerationArgs = parse_arguments(arguments)?;
        let image = self
            .media
            .generate_image(&args.prompt)
            .await
            .map_err(execution_error)?;
        context.push_artifact(GeneratedArtifact::new(ArtifactKind::Image, image));
        Ok("Image generated and attached to the response.".to_string())
    }
}
