use anyhow::{anyhow, Result};
use async_stream::try_stream;
use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};

use super::base::Usage;
use crate::errors::ToolError;
use crate::models::content::MediaContent;
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    static ref VALID_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

/// Convert internal Message format to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        let mut converted = json!({ "role": role_name(message.role) });
        let mut parts = Vec::new();
        let mut output = Vec::new();

        for content in &message.content {
            match content {
                MessageContent::Text(text) => {
                    if !text.text.is_empty() {
                        parts.push(json!({"type": "text", "text": text.text}));
                    }
                }
                MessageContent::Image(image) => parts.push(convert_image(image)),
                MessageContent::File(file) => parts.push(convert_file(file)),
                MessageContent::ToolRequest(request) => match &request.tool_call {
                    Ok(tool_call) => {
                        let entry = json!({
                            "id": request.id,
                            "type": "function",
                            "function": {
                                "name": sanitize_function_name(&tool_call.name),
                                "arguments": tool_call.arguments.to_string(),
                            }
                        });
                        match converted.get_mut("tool_calls").and_then(Value::as_array_mut) {
                            Some(calls) => calls.push(entry),
                            None => converted["tool_calls"] = json!([entry]),
                        }
                    }
                    Err(e) => {
                        output.push(json!({
                            "role": "tool",
                            "content": format!("Error: {}", e),
                            "tool_call_id": request.id
                        }));
                    }
                },
                MessageContent::ToolResponse(response) => {
                    let content = match &response.tool_result {
                        Ok(text) => text.clone(),
                        // A tool result error is shown as output so the model can interpret it
                        Err(e) => format!("The tool call returned the following error:\n{}", e),
                    };
                    output.push(json!({
                        "role": "tool",
                        "content": content,
                        "tool_call_id": response.id
                    }));
                }
            }
        }

        // Plain text-only messages use the compact string form
        match parts.as_slice() {
            [] => {}
            [single] if single["type"] == "text" => converted["content"] = single["text"].clone(),
            _ => converted["content"] = json!(parts),
        }

        if converted.get("content").is_some() || converted.get("tool_calls").is_some() {
            output.insert(0, converted);
        }
        messages_spec.extend(output);
    }

    messages_spec
}

pub fn convert_image(image: &MediaContent) -> Value {
    json!({
        "type": "image_url",
        "image_url": { "url": image.as_url() }
    })
}

pub fn convert_file(file: &MediaContent) -> Value {
    json!({
        "type": "file",
        "file": { "file_data": file.as_url() }
    })
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: &Value) -> Result<Message> {
    let original = response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| anyhow!("Response has no choices: {}", response))?;
    let mut message = Message::assistant();

    if let Some(text) = original.get("content").and_then(|t| t.as_str()) {
        message = message.with_text(text);
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default().to_string();
            let function_name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            if !is_valid_function_name(&function_name) {
                let error = ToolError::ToolNotFound(format!(
                    "The provided function name '{}' had invalid characters, it must match this regex [a-zA-Z0-9_-]+",
                    function_name
                ));
                message = message.with_tool_request(id, Err(error));
                continue;
            }

            // Some backends send an empty string for calls without arguments
            let parsed = if arguments.trim().is_empty() {
                Ok(json!({}))
            } else {
                serde_json::from_str::<Value>(arguments)
            };
            message = match parsed {
                Ok(params) => message.with_tool_request(id, Ok(ToolCall::new(function_name, params))),
                Err(e) => {
                    let error = ToolError::InvalidParameters(format!(
                        "Could not interpret tool use parameters for id {}: {}",
                        id, e
                    ));
                    message.with_tool_request(id, Err(error))
                }
            };
        }
    }

    Ok(message)
}

/// Reasoning trace returned next to the answer by reasoning models
/// (`reasoning_content` on DeepSeek style endpoints, `reasoning` on Groq/OpenRouter)
pub fn openai_response_reasoning(response: &Value) -> Option<String> {
    let message = response.get("choices")?.get(0)?.get("message")?;
    ["reasoning_content", "reasoning"]
        .iter()
        .filter_map(|key| message.get(*key).and_then(|v| v.as_str()))
        .find(|text| !text.trim().is_empty())
        .map(String::from)
}

pub fn openai_usage(data: &Value) -> Usage {
    let Some(usage) = data.get("usage") else {
        return Usage::default();
    };

    let input_tokens = usage
        .get("prompt_tokens")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32);
    let output_tokens = usage
        .get("completion_tokens")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32);
    let total_tokens = usage
        .get("total_tokens")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32)
        .or_else(|| match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        });

    Usage::new(input_tokens, output_tokens, total_tokens)
}

/// JSON schema response format for OpenAI compatible endpoints
pub fn openai_response_format(schema: &Value) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "response",
            "schema": schema,
            "strict": false
        }
    })
}

fn sanitize_function_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").to_string()
}

fn is_valid_function_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}

/// Map a non-success HTTP status to an error, keeping the body for diagnosis
pub async fn check_status(response: Response) -> Result<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        status if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() => {
            Err(anyhow!("Server error: {}", status))
        }
        status => {
            let body = response.text().await.unwrap_or_default();
            Err(anyhow!("Request failed: {} - {}", status, body))
        }
    }
}

/// The `data:` payloads of a server-sent events body, ending at `[DONE]`
pub fn sse_data(response: Response) -> impl Stream<Item = Result<String>> + Send + 'static {
    let mut events = Box::pin(response.bytes_stream().eventsource());
    try_stream! {
        while let Some(event) = events.next().await {
            let event = event.map_err(|e| anyhow!("Stream error: {}", e))?;
            let data = event.data.trim();
            if data == "[DONE]" {
                break;
            }
            if !data.is_empty() {
                yield data.to_string();
            }
        }
    }
}
