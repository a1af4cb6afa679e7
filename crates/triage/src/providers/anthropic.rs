use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;

use super::base::{Completion, CompletionOptions, Provider, TextStream, Usage};
use super::configs::AnthropicProviderConfig;
use super::utils::{check_status, sse_data};
use crate::models::content::MediaContent;
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

pub const ANTHROPIC_HOST: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: i32 = 4096;

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn request(&self) -> RequestBuilder {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));
        self.client
            .post(url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }

    fn media_source(media: &MediaContent) -> Value {
        if media.is_url() {
            json!({"type": "url", "url": media.data})
        } else {
            json!({"type": "base64", "media_type": media.mime_type, "data": media.data})
        }
    }

    /// System turns are folded into the top level system prompt, everything
    /// else becomes content blocks
    fn messages_to_anthropic_spec(messages: &[Message]) -> (Vec<String>, Vec<Value>) {
        let mut system_parts = Vec::new();
        let mut anthropic_messages = Vec::new();
        let mut failed_requests = HashSet::new();

        for message in messages {
            if message.role == Role::System {
                system_parts.push(message.text());
                continue;
            }

            let mut blocks = Vec::new();
            for content in &message.content {
                match content {
                    MessageContent::Text(text) if !text.text.is_empty() => {
                        blocks.push(json!({"type": "text", "text": text.text}));
                    }
                    MessageContent::Text(_) => {}
                    MessageContent::Image(image) => {
                        blocks.push(json!({"type": "image", "source": Self::media_source(image)}));
                    }
                    MessageContent::File(file) => {
                        blocks.push(json!({"type": "document", "source": Self::media_source(file)}));
                    }
                    MessageContent::ToolRequest(request) => match &request.tool_call {
                        Ok(call) => blocks.push(json!({
                            "type": "tool_use",
                            "id": request.id,
                            "name": call.name,
                            "input": call.arguments,
                        })),
                        Err(e) => {
                            failed_requests.insert(request.id.clone());
                            blocks.push(json!({
                                "type": "text",
                                "text": format!("Tool call {} could not be used: {}", request.id, e),
                            }));
                        }
                    },
                    MessageContent::ToolResponse(response) => {
                        let (text, is_error) = match &response.tool_result {
                            Ok(text) => (text.clone(), false),
                            Err(e) => (e.to_string(), true),
                        };
                        if failed_requests.contains(&response.id) {
                            blocks.push(json!({"type": "text", "text": text}));
                        } else {
                            blocks.push(json!({
                                "type": "tool_result",
                                "tool_use_id": response.id,
                                "content": text,
                                "is_error": is_error,
                            }));
                        }
                    }
                }
            }

            if !blocks.is_empty() {
                let role = if message.role == Role::Assistant {
                    "assistant"
                } else {
                    "user"
                };
                anthropic_messages.push(json!({"role": role, "content": blocks}));
            }
        }

        (system_parts, anthropic_messages)
    }

    fn payload(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        options: &CompletionOptions,
    ) -> Value {
        let (mut system_parts, anthropic_messages) = Self::messages_to_anthropic_spec(messages);
        if !system.is_empty() {
            system_parts.insert(0, system.to_string());
        }
        // No native structured output, so the schema travels as an instruction
        if let Some(schema) = &options.schema {
            system_parts.push(format!(
                "Respond only with a JSON object that satisfies this JSON schema, without any other text:\n{}",
                schema
            ));
        }

        let mut payload = json!({
            "model": self.config.model,
            "messages": anthropic_messages,
            "max_tokens": options
                .max_tokens
                .or(self.config.max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
        });
        if !system_parts.is_empty() {
            payload["system"] = json!(system_parts.join("\n\n"));
        }
        if !tools.is_empty() {
            payload["tools"] = json!(tools
                .iter()
                .map(|tool| json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.parameters,
                }))
                .collect::<Vec<_>>());
        }
        if let Some(temp) = options.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(top_k) = options.top_k {
            payload["top_k"] = json!(top_k);
        }
        if let Some(top_p) = options.top_p {
            payload["top_p"] = json!(top_p);
        }
        payload
    }

    fn response_to_completion(response: &Value) -> Result<Completion> {
        let blocks = response
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| anyhow!("Invalid response format from Anthropic API"))?;

        let mut message = Message::assistant();
        let mut thinking = Vec::new();
        for block in blocks {
            match block["type"].as_str() {
                Some("text") => {
                    message = message.with_text(block["text"].as_str().unwrap_or_default());
                }
                Some("tool_use") => {
                    let id = block["id"].as_str().unwrap_or_default();
                    let name = block["name"].as_str().unwrap_or_default();
                    message = message.with_tool_request(
                        id,
                        Ok(ToolCall::new(name, block["input"].clone())),
                    );
                }
                Some("thinking") => {
                    if let Some(text) = block["thinking"].as_str() {
                        thinking.push(text.to_string());
                    }
                }
                _ => {}
            }
        }

        let input_tokens = response["usage"]["input_tokens"].as_i64().map(|v| v as i32);
        let output_tokens = response["usage"]["output_tokens"].as_i64().map(|v| v as i32);
        let total_tokens = input_tokens.zip(output_tokens).map(|(i, o)| i + o);
        let completion = Completion::new(message, Usage::new(input_tokens, output_tokens, total_tokens));

        Ok(if thinking.is_empty() {
            completion
        } else {
            completion.with_reasoning(thinking.join("\n"))
        })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        options: &CompletionOptions,
    ) -> Result<Completion> {
        let payload = self.payload(system, messages, tools, options);
        let response = check_status(self.request().json(&payload).send().await?).await?;
        let response: Value = response.json().await?;
        Self::response_to_completion(&response)
    }

    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<TextStream> {
        let mut payload = self.payload(system, messages, &[], options);
        payload["stream"] = json!(true);
        let response = check_status(self.request().json(&payload).send().await?).await?;

        let deltas = sse_data(response)
            .and_then(|data| async move {
                let event: Value = serde_json::from_str(&data)?;
                if event["type"] == "error" {
                    return Err(anyhow!("Anthropic stream error: {}", event["error"]));
                }
                let is_text = event["type"] == "content_block_delta"
                    && event["delta"]["type"] == "text_delta";
                Ok(if is_text {
                    event["delta"]["text"].as_str().unwrap_or_default().to_string()
                } else {
                    String::new()
                })
            })
            .try_filter(|text| futures::future::ready(!text.is_empty()));
        Ok(deltas.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ToolError;
    use crate::providers::configs::DEFAULT_TIMEOUT_SECS;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup_mock_server(response_body: Value) -> (MockServer, AnthropicProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test_api_key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
            .mount(&mock_server)
            .await;

        let provider = AnthropicProvider::new(AnthropicProviderConfig {
            host: mock_server.uri(),
            api_key: "test_api_key".to_string(),
            model: "claude-3-5-sonnet-latest".to_string(),
            max_tokens: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
        .unwrap();
        (mock_server, provider)
    }

    #[tokio::test]
    async fn test_complete_basic() -> Result<()> {
        let (server, provider) = setup_mock_server(json!({
            "id": "msg_123",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "thinking", "thinking": "The user greets me."},
                {"type": "text", "text": "Hello! How can I assist you today?"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 15}
        }))
        .await;

        let completion = provider
            .complete(
                "You are a helpful assistant.",
                &[Message::system().with_text("Be brief."), Message::user().with_text("Hello?")],
                &[],
                &CompletionOptions::default(),
            )
            .await?;

        assert_eq!(completion.text(), "Hello! How can I assist you today?");
        assert_eq!(completion.reasoning.as_deref(), Some("The user greets me."));
        assert_eq!(completion.usage.total_tokens, Some(27));

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body)?;
        assert_eq!(body["system"], "You are a helpful assistant.\n\nBe brief.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_tool_use() -> Result<()> {
        let (_server, provider) = setup_mock_server(json!({
            "content": [{
                "type": "tool_use",
                "id": "toolu_1",
                "name": "vocr",
                "input": {"url": "attachment://files/0", "prompts": ["total price"]}
            }],
            "usage": {"input_tokens": 5, "output_tokens": 5}
        }))
        .await;

        let completion = provider
            .complete("", &[Message::user().with_text("read it")], &[], &CompletionOptions::default())
            .await?;
        let requests = completion.message.tool_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tool_call.as_ref().unwrap().name, "vocr");
        Ok(())
    }

    #[test]
    fn test_failed_tool_requests_become_text() {
        let messages = vec![
            Message::assistant()
                .with_tool_request("bad", Err(ToolError::InvalidParameters("oops".into()))),
            Message::user().with_tool_response(
                "bad",
                Err(ToolError::InvalidParameters("oops".into())),
            ),
        ];
        let (_, spec) = AnthropicProvider::messages_to_anthropic_spec(&messages);
        assert_eq!(spec[0]["content"][0]["type"], "text");
        assert_eq!(spec[1]["content"][0]["type"], "text");
    }

    #[test]
    fn test_url_images_use_url_source() {
        let messages = vec![Message::user().with_image("https://example.com/a.png", "image/png")];
        let (_, spec) = AnthropicProvider::messages_to_anthropic_spec(&messages);
        assert_eq!(spec[0]["content"][0]["source"]["type"], "url");
    }
}
