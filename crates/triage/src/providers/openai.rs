use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Completion, CompletionOptions, Provider, TextStream};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, check_status, messages_to_openai_spec,
    openai_response_format, openai_response_reasoning, openai_response_to_message, openai_usage,
    sse_data, tools_to_openai_spec,
};
use crate::models::message::Message;
use crate::models::tool::Tool;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn request(&self) -> RequestBuilder {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );
        let request = self.client.post(url);
        match &self.config.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    fn payload(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        options: &CompletionOptions,
    ) -> Result<Value> {
        let mut messages_array = Vec::new();
        if !system.is_empty() {
            messages_array.push(json!({"role": "system", "content": system}));
        }
        messages_array.extend(messages_to_openai_spec(messages));

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_array
        });
        let fields = payload
            .as_object_mut()
            .ok_or_else(|| anyhow!("payload is not an object"))?;

        if !tools.is_empty() {
            fields.insert("tools".to_string(), json!(tools_to_openai_spec(tools)?));
        }
        if let Some(temp) = options.temperature {
            fields.insert("temperature".to_string(), json!(temp));
        }
        if let Some(top_p) = options.top_p {
            fields.insert("top_p".to_string(), json!(top_p));
        }
        if let Some(top_k) = options.top_k {
            fields.insert("top_k".to_string(), json!(top_k));
        }
        if let Some(tokens) = options.max_tokens.or(self.config.max_tokens) {
            fields.insert("max_tokens".to_string(), json!(tokens));
        }
        if let Some(schema) = &options.schema {
            fields.insert("response_format".to_string(), openai_response_format(schema));
        }
        Ok(payload)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
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
        let payload = self.payload(system, messages, tools, options)?;
        let response = check_status(self.request().json(&payload).send().await?).await?;
        let response: Value = response.json().await?;

        // Raise specific error if context length is exceeded
        if let Some(error) = response.get("error") {
            if let Some(err) = check_openai_context_length_error(error) {
                return Err(err.into());
            }
            return Err(anyhow!("OpenAI API error: {}", error));
        }

        let message = openai_response_to_message(&response)?;
        let completion = Completion::new(message, openai_usage(&response));
        Ok(match openai_response_reasoning(&response) {
            Some(reasoning) => completion.with_reasoning(reasoning),
            None => completion,
        })
    }

    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<TextStream> {
        let mut payload = self.payload(system, messages, &[], options)?;
        payload["stream"] = json!(true);
        let response = check_status(self.request().json(&payload).send().await?).await?;

        let deltas = sse_data(response)
            .and_then(|data| async move {
                let chunk: Value = serde_json::from_str(&data)?;
                Ok::<_, anyhow::Error>(
                    chunk["choices"][0]["delta"]["content"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                )
            })
            .try_filter(|text| futures::future::ready(!text.is_empty()));
        Ok(deltas.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::MessageContent;
    use crate::providers::configs::DEFAULT_TIMEOUT_SECS;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new(OpenAiProviderConfig {
            host: server.uri(),
            api_key: Some("test_api_key".to_string()),
            model: "gpt-4o-mini".to_string(),
            max_tokens: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_complete_basic() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test_api_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-123",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Hello! How can I assist you today?"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 15, "total_tokens": 27}
            })))
            .mount(&server)
            .await;

        let completion = provider_for(&server)
            .complete(
                "You are a helpful assistant.",
                &[Message::user().with_text("Hello?")],
                &[],
                &CompletionOptions::default(),
            )
            .await?;

        assert_eq!(completion.text(), "Hello! How can I assist you today?");
        assert_eq!(completion.usage.total_tokens, Some(27));
        assert_eq!(completion.reasoning, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_sends_schema_and_sampling() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "temperature": 0.0,
                "response_format": {"type": "json_schema"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "{\"total_price\": 12.5}"}}]
            })))
            .mount(&server)
            .await;

        let options = CompletionOptions::default()
            .with_temperature(0.0)
            .with_schema(json!({"type": "object"}));
        let completion = provider_for(&server)
            .complete("", &[Message::user().with_text("price?")], &[], &options)
            .await?;
        assert_eq!(completion.text(), r#"{"total_price": 12.5}"#);
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_tool_request() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_123",
                            "type": "function",
                            "function": {
                                "name": "web_search",
                                "arguments": "{\"query\":\"weather in Paris\"}"
                            }
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .mount(&server)
            .await;

        let tool = Tool::new(
            "web_search",
            "Search the web",
            json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        );
        let completion = provider_for(&server)
            .complete(
                "",
                &[Message::user().with_text("Weather in Paris?")],
                &[tool],
                &CompletionOptions::default(),
            )
            .await?;

        if let MessageContent::ToolRequest(request) = &completion.message.content[0] {
            let call = request.tool_call.as_ref().unwrap();
            assert_eq!(call.name, "web_search");
            assert_eq!(call.arguments, json!({"query": "weather in Paris"}));
        } else {
            panic!("Expected ToolRequest content");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let result = provider_for(&server)
            .complete("", &[Message::user().with_text("hi")], &[], &CompletionOptions::default())
            .await;
        assert!(result.unwrap_err().to_string().contains("429"));
    }

    #[tokio::test]
    async fn test_stream_yields_deltas() -> Result<()> {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n"
        );
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let chunks: Vec<String> = provider_for(&server)
            .stream("", &[Message::user().with_text("hi")], &CompletionOptions::default())
            .await?
            .try_collect()
            .await?;
        assert_eq!(chunks, vec!["Hel".to_string(), "lo".to_string()]);
        Ok(())
    }
}
