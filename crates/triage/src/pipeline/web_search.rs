use serde_json::json;
use tracing::info;

use crate::errors::{Stage, TriageError, TriageResult};
use crate::fallback::with_fallback;
use crate::services::SearchCapability;
use crate::tools::search::{condense_results, MAX_SEARCH_RESULTS};
use crate::tools::{InvocationKind, ToolInvocation};

/// Search for `query` and return the condensed top results as a
/// context-injection record
pub async fn run(search: &dyn SearchCapability, query: &str) -> TriageResult<ToolInvocation> {
    let response = with_fallback(Stage::WebSearch, &[search], |search| {
        let search = *search;
        async move { search.search(query).await.map_err(TriageError::service) }
    })
    .await?;

    let results = condense_results(&response, MAX_SEARCH_RESULTS);
    info!(
        target: "triage::pipeline",
        results = results.as_array().map_or(0, Vec::len),
        "web search injected"
    );
    Ok(ToolInvocation::new(
        "web_search",
        json!({ "query": query }),
        results.to_string(),
        InvocationKind::ContextInjection,
    ))
}
