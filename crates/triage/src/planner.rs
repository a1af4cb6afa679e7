//! The routing decision: one structured call that picks the final model and
//! which augmentation stages run.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::errors::{Stage, TriageError, TriageResult};
use crate::fallback::with_fallback;
use crate::models::message::{Message, MessageContent};
use crate::partial_json::parse_reply;
use crate::prompt_template::load_prompt_file;
use crate::providers::base::{CompletionOptions, Provider};
use crate::registry::ModelRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDecision {
    pub model: String,
    pub web_search: bool,
    pub reasoning: bool,
    pub tools: bool,
}

impl PlanDecision {
    /// Output schema of the planner call, restricting `model` to registered ids
    pub fn schema(model_ids: &[String]) -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["model", "web_search", "reasoning", "tools"],
            "properties": {
                "model": {"type": "string", "enum": model_ids},
                "web_search": {"type": "boolean"},
                "reasoning": {"type": "boolean"},
                "tools": {"type": "boolean"}
            }
        })
    }

    /// The decision with caller flags applied. `None` keeps the planner's value.
    pub fn with_overrides(mut self, overrides: &PlanOverrides) -> Self {
        self.web_search = overrides.web_search.unwrap_or(self.web_search);
        self.reasoning = overrides.reasoning.unwrap_or(self.reasoning);
        self.tools = overrides.tools.unwrap_or(self.tools);
        self
    }
}

/// Caller supplied flags that take precedence over the planner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOverrides {
    pub web_search: Option<bool>,
    pub reasoning: Option<bool>,
    pub tools: Option<bool>,
}

/// The latest turn as the planner sees it: text verbatim, attachments reduced
/// to their kind and mime type
fn describe_turn(message: &Message) -> Value {
    let content: Vec<Value> = message
        .content
        .iter()
        .filter_map(|content| match content {
            MessageContent::Text(text) => Some(json!({"type": "text", "text": text.text})),
            MessageContent::Image(media) => {
                Some(json!({"type": "image", "mimeType": media.mime_type}))
            }
            MessageContent::File(media) => {
                Some(json!({"type": "file", "mimeType": media.mime_type}))
            }
            _ => None,
        })
        .collect();
    json!({"role": message.role, "content": content})
}

pub struct Planner {
    chain: Vec<Arc<dyn Provider>>,
}

impl Planner {
    /// `chain` is the primary planner model followed by its substitutes
    pub fn new(chain: Vec<Arc<dyn Provider>>) -> Self {
        Self { chain }
    }

    pub fn system_prompt(
        registry: &ModelRegistry,
        tool_names: &[String],
        latest: &Message,
    ) -> TriageResult<String> {
        let models = serde_json::to_string_pretty(&registry.serialize())
            .map_err(|e| TriageError::Internal(e.to_string()))?;
        let context = json!({
            "models": models,
            "tools": tool_names,
            "latest_turn": describe_turn(latest).to_string(),
        });
        load_prompt_file("planner.md", &context).map_err(|e| TriageError::Internal(e.to_string()))
    }

    /// Decide how to handle `latest`. Every planner candidate failing is fatal,
    /// and a decision naming an unregistered model is never substituted.
    pub async fn plan(
        &self,
        registry: &ModelRegistry,
        tool_names: &[String],
        latest: &Message,
    ) -> TriageResult<PlanDecision> {
        let system = Self::system_prompt(registry, tool_names, latest)?;
        let messages = [Message::user().with_text("Decide how to handle the latest user turn.")];
        let options = CompletionOptions::default()
            .with_temperature(0.0)
            .with_schema(PlanDecision::schema(&registry.ids()));

        let decision = with_fallback(Stage::Planning, &self.chain, |provider| {
            let provider = Arc::clone(provider);
            let (system, messages, options) = (&system, &messages, &options);
            async move {
                let completion = provider
                    .complete(system, messages, &[], options)
                    .await
                    .map_err(TriageError::provider)?;
                let text = completion.text();
                parse_reply(&text)
                    .and_then(|value| serde_json::from_value::<PlanDecision>(value).ok())
                    .ok_or_else(|| {
                        TriageError::Provider(format!(
                            "planner model '{}' returned no usable decision: {}",
                            provider.model(),
                            text
                        ))
                    })
            }
        })
        .await
        .map_err(|e| TriageError::PlanningFailed(Box::new(e)))?;

        registry.lookup(&decision.model)?;
        info!(
            target: "triage::planner",
            model = %decision.model,
            web_search = decision.web_search,
            reasoning = decision.reasoning,
            tools = decision.tools,
            "plan decided"
        );
        Ok(decision)
    }
}
