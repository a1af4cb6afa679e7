use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::conversation::Conversation;
use crate::errors::{Stage, ToolError, ToolResult, TriageError, TriageResult};
use crate::fallback::with_fallback;
use crate::files::FileReferences;
use crate::models::message::{Message, ToolRequest};
use crate::prompt_template::load_prompt_file;
use crate::providers::base::{CompletionOptions, Provider};
use crate::tools::{GeneratedArtifact, InvocationKind, ToolContext, ToolInvocation, Toolbox};

/// Model calls allowed in one tool sub-run
pub const MAX_TOOL_STEPS: usize = 5;

/// The result of a successful sub-run attempt
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolRunOutput {
    pub text: String,
    pub records: Vec<ToolInvocation>,
    pub artifacts: Vec<GeneratedArtifact>,
}

fn system_prompt(files: &FileReferences) -> TriageResult<String> {
    let context = json!({
        "files": files.references(),
        "now": Utc::now().to_rfc3339(),
    });
    load_prompt_file("tools.md", &context).map_err(|e| TriageError::Internal(e.to_string()))
}

/// Run the tool-calling loop over `chain`. The model sees the latest text and
/// attachment uris, never the attachment bytes. A failed attempt's records and
/// artifacts are dropped with it.
pub async fn run(
    chain: &[Arc<dyn Provider>],
    toolbox: &Toolbox,
    conversation: &Conversation,
    files: &FileReferences,
) -> TriageResult<ToolRunOutput> {
    let system = system_prompt(files)?;
    let mut request = conversation.latest_text().unwrap_or_default();
    if !files.is_empty() {
        request.push_str(&format!("\n\nAttached files: {}", files.uris().join(", ")));
    }

    let output = with_fallback(Stage::Tools, chain, |provider| {
        let provider = Arc::clone(provider);
        let (system, request) = (&system, &request);
        async move { attempt(provider.as_ref(), system, request, toolbox, files).await }
    })
    .await?;

    info!(
        target: "triage::pipeline",
        calls = output.records.len(),
        artifacts = output.artifacts.len(),
        "tool sub-run finished"
    );
    Ok(output)
}

async fn attempt(
    provider: &dyn Provider,
    system: &str,
    request: &str,
    toolbox: &Toolbox,
    files: &FileReferences,
) -> TriageResult<ToolRunOutput> {
    let context = ToolContext::new(files.clone());
    let tools = toolbox.tools();
    let mut messages = vec![Message::user().with_text(request)];
    let mut records = Vec::new();
    let mut text = String::new();

    for step in 0..MAX_TOOL_STEPS {
        let completion = provider
            .complete(system, &messages, &tools, &CompletionOptions::default())
            .await
            .map_err(TriageError::provider)?;
        text = completion.text();

        let requests: Vec<ToolRequest> = completion
            .message
            .tool_requests()
            .into_iter()
            .cloned()
            .collect();
        messages.push(completion.message);
        if requests.is_empty() {
            break;
        }
        debug!(target: "triage::pipeline", step, calls = requests.len(), "dispatching tool calls");

        let results = join_all(
            requests
                .iter()
                .map(|request| dispatch(toolbox, request, &context)),
        )
        .await;

        let mut response = Message::user();
        for (request, result) in requests.iter().zip(results) {
            let call = request.tool_call.as_ref().ok();
            match result {
                Ok(output) => {
                    if let Some(call) = call {
                        records.push(ToolInvocation::new(
                            &call.name,
                            call.arguments.clone(),
                            output.clone(),
                            InvocationKind::ExplicitCall,
                        ));
                    }
                    response = response.with_tool_response(&request.id, Ok(output));
                }
                Err(ToolError::ExecutionError(message)) => {
                    return Err(TriageError::ToolExecutionFailed {
                        tool: call.map(|c| c.name.clone()).unwrap_or_default(),
                        message,
                    });
                }
                // bad calls go back to the model to correct
                Err(err) => {
                    response = response.with_tool_response(&request.id, Err(err));
                }
            }
        }
        messages.push(response);
    }

    if text.trim().is_empty() && !records.is_empty() {
        text = json!(records.iter().map(|r| &r.result).collect::<Vec<_>>()).to_string();
    }

    Ok(ToolRunOutput {
        text,
        records,
        artifacts: context.take_artifacts(),
    })
}

async fn dispatch(
    toolbox: &Toolbox,
    request: &ToolRequest,
    context: &ToolContext,
) -> ToolResult<String> {
    let call = request.tool_call.clone()?;
    toolbox.dispatch(&call, context).await
}
