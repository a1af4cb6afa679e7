use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, HeaderName},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use triage::{
    models::message::{Message, Turn},
    result::{Output, Provenance},
    GenerateParams, Prompt, StreamChunk,
};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    messages: Option<Vec<Turn>>,
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    schema: Option<Value>,
    #[serde(default)]
    stream: bool,
    #[serde(default)]
    reasoning: Option<bool>,
    #[serde(default)]
    use_web_search: Option<bool>,
    #[serde(default)]
    auto_tool: Option<bool>,
    #[serde(default)]
    multi_model: Option<bool>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    top_k: Option<u32>,
    #[serde(default)]
    top_p: Option<f32>,
}

impl GenerateRequest {
    fn into_params(self) -> Result<GenerateParams, ApiError> {
        let prompt = match (self.prompt, self.messages) {
            (Some(text), None) => Prompt::Text(text),
            (None, Some(turns)) => Prompt::Messages(turns.into_iter().map(Message::from).collect()),
            _ => {
                return Err(ApiError::bad_request(
                    "exactly one of `prompt` or `messages` is required",
                ))
            }
        };
        let mut params = GenerateParams::new(prompt);
        params.system = self.system;
        params.schema = self.schema;
        params.stream = self.stream;
        params.reasoning = self.reasoning;
        params.use_web_search = self.use_web_search;
        params.auto_tool = self.auto_tool;
        params.multi_model = self.multi_model;
        params.temperature = self.temperature;
        params.top_k = self.top_k;
        params.top_p = self.top_p;
        Ok(params)
    }
}

// SSE body framed like the AI SDK data stream protocol
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        let body = axum::body::Body::from_stream(self);
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
                (HeaderName::from_static("x-vercel-ai-data-stream"), "v1"),
            ],
            body,
        )
            .into_response()
    }
}

struct ProtocolFormatter;

impl ProtocolFormatter {
    fn format_text(text: &str) -> String {
        let encoded_text = serde_json::to_string(text).unwrap_or_default();
        format!("0:{}\n", encoded_text)
    }

    fn format_object(object: &Value) -> String {
        format!("2:{}\n", json!([object]))
    }

    fn format_provenance(provenance: &Provenance) -> String {
        format!("8:{}\n", json!([provenance]))
    }

    fn format_error(message: &str) -> String {
        let encoded = serde_json::to_string(message).unwrap_or_default();
        format!("3:{}\n", encoded)
    }

    fn format_finish(reason: &str) -> String {
        let finish = json!({
            "finishReason": reason,
            "usage": {
                "promptTokens": 0,
                "completionTokens": 0
            }
        });
        format!("d:{}\n", finish)
    }
}

fn json_body(output: Output, provenance: Provenance) -> Value {
    let (text, object) = match output {
        Output::Text(text) => (Some(text), None),
        Output::Object { text, object } => (Some(text), Some(object)),
        Output::Stream(_) => (None, None),
    };
    json!({
        "model": provenance.model,
        "text": text,
        "object": object,
        "tool_used": provenance.tool_used,
        "generated_artifacts": provenance.generated_artifacts,
        "reasoning_text": provenance.reasoning_text,
    })
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Response, ApiError> {
    let params = request.into_params()?;
    let result = state.triage.generate(params).await?;
    let (output, provenance) = result.into_parts();

    let mut stream = match output {
        Output::Stream(stream) => stream,
        eager => return Ok(Json(json_body(eager, provenance)).into_response()),
    };

    let (tx, rx) = mpsc::channel(100);
    tokio::spawn(async move {
        let mut reason = "stop";
        while let Some(chunk) = stream.next().await {
            let frame = match chunk {
                Ok(StreamChunk::Text(text)) => ProtocolFormatter::format_text(&text),
                Ok(StreamChunk::Object(object)) => ProtocolFormatter::format_object(&object),
                Err(e) => {
                    tracing::error!("Error while streaming reply: {}", e);
                    reason = "error";
                    ProtocolFormatter::format_error(&e.to_string())
                }
            };
            if tx.send(frame).await.is_err() {
                tracing::debug!("client disconnected, dropping stream");
                return;
            }
            if reason == "error" {
                break;
            }
        }
        let _ = tx.send(ProtocolFormatter::format_provenance(&provenance)).await;
        let _ = tx.send(ProtocolFormatter::format_finish(reason)).await;
    });

    Ok(SseResponse::new(ReceiverStream::new(rx)).into_response())
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/generate", post(handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::tests::{app, json_request, plan, read_body};
    use axum::http::StatusCode;
    use tower::ServiceExt;
    use triage::providers::mock::MockProvider;

    #[test]
    fn test_protocol_frames() {
        assert_eq!(ProtocolFormatter::format_text("a \"b\"\n"), "0:\"a \\\"b\\\"\\n\"\n");
        assert_eq!(ProtocolFormatter::format_object(&json!({"a": 1})), "2:[{\"a\":1}]\n");
        assert!(ProtocolFormatter::format_finish("stop").starts_with("d:{"));
    }

    #[tokio::test]
    async fn test_generate_json() {
        let app = app(
            MockProvider::new("planner").with_text(plan("fast")),
            MockProvider::new("fast").with_text("4"),
        );
        let response = app
            .oneshot(json_request("/generate", json!({"prompt": "What is 2+2?"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert_eq!(body["model"], "fast");
        assert_eq!(body["text"], "4");
        assert_eq!(body["tool_used"], json!([]));
        assert_eq!(body["reasoning_text"], Value::Null);
    }

    #[tokio::test]
    async fn test_generate_from_messages_with_schema() {
        let app = app(
            MockProvider::new("planner").with_text(plan("fast")),
            MockProvider::new("fast").with_text(r#"{"answer": 4}"#),
        );
        let request = json!({
            "messages": [{"role": "user", "content": [{"type": "text", "text": "2+2?"}]}],
            "schema": {"type": "object", "required": ["answer"]}
        });
        let response = app.oneshot(json_request("/generate", request)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert_eq!(body["object"], json!({"answer": 4}));
    }

    #[tokio::test]
    async fn test_generate_streams_frames() {
        let app = app(
            MockProvider::new("planner").with_text(plan("fast")),
            MockProvider::new("fast")
                .with_text("hello world")
                .with_stream_chunk_size(6),
        );
        let response = app
            .oneshot(json_request("/generate", json!({"prompt": "hi", "stream": true})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");
        let body = read_body(response).await;
        let frames: Vec<&str> = body.lines().collect();
        assert_eq!(frames[0], "0:\"hello \"");
        assert_eq!(frames[1], "0:\"world\"");
        assert!(frames[2].starts_with("8:[{"));
        assert!(frames[2].contains("\"model\":\"fast\""));
        assert!(frames[3].starts_with("d:{\"finishReason\":\"stop\""));
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let app = app(
            MockProvider::new("planner").with_text(plan("ghost")),
            MockProvider::new("fast"),
        );
        let response = app
            .clone()
            .oneshot(json_request("/generate", json!({"prompt": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(json_request("/generate", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let app = app_with_schema_failure();
        let response = app
            .oneshot(json_request(
                "/generate",
                json!({"prompt": "hi", "schema": {"type": "object", "required": ["answer"]}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    fn app_with_schema_failure() -> Router {
        app(
            MockProvider::new("planner").with_text(plan("fast")),
            MockProvider::new("fast").with_text("no json here"),
        )
    }
}
