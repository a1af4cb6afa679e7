//! The final completion, eager or streamed, over the chosen model's fallback chain.
use async_stream::try_stream;
use futures::stream::{StreamExt, TryStreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::errors::{Stage, TriageError, TriageResult};
use crate::fallback::with_fallback;
use crate::models::message::Message;
use crate::partial_json::{parse_partial, parse_reply};
use crate::providers::base::{CompletionOptions, TextStream};
use crate::registry::{ModelDescriptor, ModelRegistry};
use crate::result::{Output, OutputStream, StreamChunk};

/// Compile `schema` and check `instance` against it
pub fn validate_object(schema: &Value, instance: &Value) -> TriageResult<()> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| TriageError::InvalidParameters(format!("Invalid JSON schema: {}", e)))?;
    let errors: Vec<String> = validator
        .iter_errors(instance)
        .take(3)
        .map(|err| format!("{} at {}", err, err.instance_path))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TriageError::SchemaValidationFailed(errors.join("; ")))
    }
}

fn parse_and_validate(schema: &Value, text: &str) -> TriageResult<Value> {
    let object = parse_reply(text).ok_or_else(|| {
        TriageError::SchemaValidationFailed("model reply is not a JSON value".to_string())
    })?;
    validate_object(schema, &object)?;
    Ok(object)
}

/// The final model. When reasoning text is part of the prompt and the planned
/// model cannot take it, `reasoning_default` (or the most capable compatible
/// model) is used instead.
pub fn select_final_model(
    registry: &ModelRegistry,
    planned: &str,
    reasoning_present: bool,
    reasoning_default: Option<&str>,
) -> TriageResult<String> {
    let model = registry.lookup(planned)?;
    if !reasoning_present || model.is_reasoning_compatible() {
        return Ok(model.id.clone());
    }

    let replacement = match reasoning_default {
        Some(id) if registry.lookup(id)?.is_reasoning_compatible() => Some(id.to_string()),
        _ => registry
            .most_capable_reasoning_model()
            .map(|m| m.id.clone()),
    };
    match replacement {
        Some(id) => {
            info!(target: "triage::execution", planned, selected = %id, "planned model cannot take reasoning context");
            Ok(id)
        }
        None => Ok(model.id.clone()),
    }
}

/// Everything the final call needs besides the model
pub struct FinalRequest<'a> {
    pub system: &'a str,
    pub messages: &'a [Message],
    pub options: CompletionOptions,
}

/// Generate the complete reply. Schema validation happens once, after the
/// chain produced a reply, and is not retried on other models.
pub async fn execute_eager(
    chain: &[&ModelDescriptor],
    request: &FinalRequest<'_>,
) -> TriageResult<(String, Output)> {
    let (model, completion) = with_fallback(Stage::Generation, chain, |model| {
        let (id, provider) = (model.id.clone(), Arc::clone(&model.provider));
        async move {
            let completion = provider
                .complete(request.system, request.messages, &[], &request.options)
                .await
                .map_err(TriageError::provider)?;
            Ok((id, completion))
        }
    })
    .await?;

    let text = completion.text();
    let output = match &request.options.schema {
        Some(schema) => {
            let object = parse_and_validate(schema, &text)?;
            Output::Object { text, object }
        }
        None => Output::Text(text),
    };
    Ok((model, output))
}

/// Open a streamed reply. Fallback covers opening the stream only, a failure
/// after the first chunk surfaces as a stream error.
pub async fn execute_stream(
    chain: &[&ModelDescriptor],
    request: &FinalRequest<'_>,
) -> TriageResult<(String, Output)> {
    let (model, deltas) = with_fallback(Stage::Generation, chain, |model| {
        let (id, provider) = (model.id.clone(), Arc::clone(&model.provider));
        async move {
            let deltas = provider
                .stream(request.system, request.messages, &request.options)
                .await
                .map_err(TriageError::provider)?;
            Ok((id, deltas))
        }
    })
    .await?;

    let stream = match request.options.schema.clone() {
        Some(schema) => object_stream(deltas, schema),
        None => deltas
            .map_err(TriageError::provider)
            .map_ok(StreamChunk::Text)
            .boxed(),
    };
    Ok((model, Output::Stream(stream)))
}

/// Partial objects as the reply grows, emitted only when they change. The
/// finished reply is validated against the schema at the end.
fn object_stream(mut deltas: TextStream, schema: Value) -> OutputStream {
    Box::pin(try_stream! {
        let mut buffer = String::new();
        let mut last: Option<Value> = None;

        while let Some(delta) = deltas.next().await {
            let delta = delta.map_err(TriageError::provider)?;
            buffer.push_str(&delta);
            if let Some(partial) = parse_partial(&buffer) {
                if last.as_ref() != Some(&partial) {
                    last = Some(partial.clone());
                    yield StreamChunk::Object(partial);
                }
            }
        }

        let complete = parse_and_validate(&schema, &buffer)?;
        if last.as_ref() != Some(&complete) {
            yield StreamChunk::Object(complete);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;
    use serde_json::json;

    fn price_schema() -> Value {
        json!({
            "type": "object",
            "required": ["total_price"],
            "properties": {"total_price": {"type": "number"}}
        })
    }

    fn registry(first: MockProvider, second: MockProvider) -> ModelRegistry {
        ModelRegistry::new(vec![
            ModelDescriptor::new("small", Arc::new(first))
                .with_context_window(8_000)
                .with_ranks(1, 3)
                .with_fallback("large"),
            ModelDescriptor::new("large", Arc::new(second)).with_ranks(3, 1),
        ])
        .unwrap()
    }

    #[test]
    fn test_validate_object() {
        assert!(validate_object(&price_schema(), &json!({"total_price": 12.5})).is_ok());
        let err = validate_object(&price_schema(), &json!({"total_price": "12"})).unwrap_err();
        assert!(matches!(err, TriageError::SchemaValidationFailed(_)));
        let err = validate_object(&json!({"type": 12}), &json!({})).unwrap_err();
        assert!(matches!(err, TriageError::InvalidParameters(_)));
    }

    #[test]
    fn test_reasoning_compatibility_override() {
        let registry = registry(MockProvider::new("small"), MockProvider::new("large"));
        assert_eq!(select_final_model(&registry, "small", false, None).unwrap(), "small");
        assert_eq!(select_final_model(&registry, "small", true, None).unwrap(), "large");
        assert_eq!(select_final_model(&registry, "large", true, None).unwrap(), "large");
        assert!(matches!(
            select_final_model(&registry, "missing", true, None),
            Err(TriageError::UnknownModel(_))
        ));
    }

    #[tokio::test]
    async fn test_eager_falls_back_along_chain() {
        let registry = registry(
            MockProvider::new("small").with_error("overloaded"),
            MockProvider::new("large").with_text("```json\n{\"total_price\": 42.5}\n```"),
        );
        let chain = registry.fallback_chain("small").unwrap();
        let messages = [Message::user().with_text("total?")];
        let request = FinalRequest {
            system: "",
            messages: &messages,
            options: CompletionOptions::default().with_schema(price_schema()),
        };

        let (model, output) = execute_eager(&chain, &request).await.unwrap();
        assert_eq!(model, "large");
        assert!(matches!(output, Output::Object { object, .. } if object == json!({"total_price": 42.5})));
    }

    #[tokio::test]
    async fn test_eager_schema_failure_is_not_retried() {
        let second = MockProvider::new("large");
        let registry = registry(MockProvider::new("small").with_text("no idea"), second);
        let chain = registry.fallback_chain("small").unwrap();
        let messages = [Message::user().with_text("total?")];
        let request = FinalRequest {
            system: "",
            messages: &messages,
            options: CompletionOptions::default().with_schema(price_schema()),
        };

        let err = execute_eager(&chain, &request).await.unwrap_err();
        assert!(matches!(err, TriageError::SchemaValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_object_stream_emits_growing_partials() {
        let registry = registry(
            MockProvider::new("small")
                .with_text(r#"{"total_price": 42.5, "currency": "EUR"}"#)
                .with_stream_chunk_size(6),
            MockProvider::new("large"),
        );
        let chain = registry.fallback_chain("small").unwrap();
        let messages = [Message::user().with_text("total?")];
        let request = FinalRequest {
            system: "",
            messages: &messages,
            options: CompletionOptions::default().with_schema(price_schema()),
        };

        let (_, output) = execute_stream(&chain, &request).await.unwrap();
        let Output::Stream(stream) = output else {
            panic!("expected a stream");
        };
        let chunks: Vec<StreamChunk> = stream.try_collect().await.unwrap();

        assert!(chunks.len() > 1);
        assert_eq!(
            chunks.last(),
            Some(&StreamChunk::Object(json!({"total_price": 42.5, "currency": "EUR"})))
        );
        for pair in chunks.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[tokio::test]
    async fn test_text_stream_falls_back_on_open() {
        let registry = registry(
            MockProvider::new("small").with_error("unavailable"),
            MockProvider::new("large").with_text("hello there").with_stream_chunk_size(5),
        );
        let chain = registry.fallback_chain("small").unwrap();
        let messages = [Message::user().with_text("hi")];
        let request = FinalRequest {
            system: "",
            messages: &messages,
            options: CompletionOptions::default(),
        };

        let (model, output) = execute_stream(&chain, &request).await.unwrap();
        assert_eq!(model, "large");
        let Output::Stream(stream) = output else {
            panic!("expected a stream");
        };
        let chunks: Vec<StreamChunk> = stream.try_collect().await.unwrap();
        assert_eq!(
            chunks,
            vec![
                StreamChunk::Text("hello".into()),
                StreamChunk::Text(" ther".into()),
                StreamChunk::Text("e".into())
            ]
        );
    }
}
