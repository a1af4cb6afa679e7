use std::sync::Arc;
use tracing::info;

use crate::conversation::Conversation;
use crate::errors::{Stage, TriageError, TriageResult};
use crate::fallback::with_fallback;
use crate::prompt_template::load_prompt_file;
use crate::providers::base::{Completion, CompletionOptions, Provider};

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// The interior of the first `<think>...</think>` span, trimmed. Text without a
/// well formed span comes back unmodified.
pub fn extract_think(raw: &str) -> String {
    let Some(open) = raw.find(THINK_OPEN) else {
        return raw.to_string();
    };
    let inner_start = open + THINK_OPEN.len();
    match raw[inner_start..].find(THINK_CLOSE) {
        Some(len) => raw[inner_start..inner_start + len].trim().to_string(),
        None => raw.to_string(),
    }
}

/// Reasoning from a completion: the provider's trace field when present,
/// otherwise whatever [`extract_think`] finds in the answer
pub fn extract_reasoning(completion: &Completion) -> String {
    match completion.reasoning.as_deref() {
        Some(trace) if !trace.trim().is_empty() => trace.to_string(),
        _ => extract_think(&completion.text()),
    }
}

/// Run the reasoning model over the conversation without attachments
pub async fn run(chain: &[Arc<dyn Provider>], conversation: &Conversation) -> TriageResult<String> {
    let system = load_prompt_file("reasoning.md", &serde_json::json!({}))
        .map_err(|e| TriageError::Internal(e.to_string()))?;
    let messages = conversation.without_media();

    let reasoning = with_fallback(Stage::Reasoning, chain, |provider| {
        let provider = Arc::clone(provider);
        let (system, messages) = (&system, &messages);
        async move {
            let completion = provider
                .complete(system, messages, &[], &CompletionOptions::default())
                .await
                .map_err(TriageError::provider)?;
            Ok(extract_reasoning(&completion))
        }
    })
    .await?;

    info!(target: "triage::pipeline", chars = reasoning.len(), "reasoning extracted");
    Ok(reasoning)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::Message;
    use crate::providers::base::Usage;
    use crate::providers::mock::MockProvider;

    #[test]
    fn test_extract_think_interior() {
        assert_eq!(
            extract_think("<think>\n  2 plus 2 is 4  \n</think>The answer is 4."),
            "2 plus 2 is 4"
        );
        assert_eq!(extract_think("preamble <think>a</think> tail"), "a");
    }

    #[test]
    fn test_missing_or_malformed_delimiters_keep_raw_text() {
        for raw in [
            "  no tags at all  ",
            "<think>never closed",
            "only a closer</think> here",
            "</think>backwards<think>",
            "",
        ] {
            assert_eq!(extract_think(raw), raw);
        }
    }

    #[test]
    fn test_trace_field_wins() {
        let completion = Completion::new(
            Message::assistant().with_text("<think>from text</think>answer"),
            Usage::default(),
        )
        .with_reasoning("from trace");
        assert_eq!(extract_reasoning(&completion), "from trace");

        let blank_trace = Completion::new(
            Message::assistant().with_text("<think>from text</think>answer"),
            Usage::default(),
        )
        .with_reasoning("  ");
        assert_eq!(extract_reasoning(&blank_trace), "from text");
    }

    #[tokio::test]
    async fn test_reasoning_sees_no_media() {
        let model = Arc::new(MockProvider::new("thinker").with_text("<think>look closely</think>ok"));
        let conversation = Conversation::new(vec![Message::user()
            .with_text("why?")
            .with_image("iVBORw0KGgo=", "image/png")]);

        let reasoning = run(&[model.clone() as Arc<dyn Provider>], &conversation)
            .await
            .unwrap();
        assert_eq!(reasoning, "look closely");
        assert!(model.calls()[0].messages.iter().all(|m| !m.has_media()));
    }
}
