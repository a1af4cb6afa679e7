use futures::future::join_all;
use tracing::{info, warn};

use crate::conversation::Conversation;
use crate::providers::base::CompletionOptions;
use crate::registry::ModelRegistry;

/// Ask every registered model concurrently and keep the answers that came
/// back, in registry order. Failed models are dropped, never retried.
pub async fn run(registry: &ModelRegistry, conversation: &Conversation, system: &str) -> Vec<String> {
    let messages = conversation.without_media();
    let options = CompletionOptions::default();

    let calls = registry.iter().map(|model| {
        let (messages, options) = (&messages, &options);
        async move {
            let result = model.provider.complete(system, messages, &[], options).await;
            (model.id.as_str(), result)
        }
    });

    let texts: Vec<String> = join_all(calls)
        .await
        .into_iter()
        .filter_map(|(id, result)| match result {
            Ok(completion) => Some(completion.text()),
            Err(e) => {
                warn!(target: "triage::pipeline", model = id, error = %e, "cross-check model dropped");
                None
            }
        })
        .collect();

    info!(
        target: "triage::pipeline",
        answered = texts.len(),
        asked = registry.len(),
        "cross-check finished"
    );
    texts
}
