pub mod embedding;
pub mod generate;
pub mod models;

use crate::state::AppState;
use axum::Router;

pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(generate::routes(state.clone()))
        .merge(embedding::routes(state.clone()))
        .merge(models::routes(state))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, Response},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use triage::{
        providers::{base::Provider, mock::MockProvider},
        registry::{ModelDescriptor, ModelRegistry},
        services::mock::{MockEmbedding, MockMedia, MockSearch},
        Triage,
    };

    pub fn plan(model: &str) -> String {
        json!({"model": model, "web_search": false, "reasoning": false, "tools": false}).to_string()
    }

    /// The full router over a one-model registry named `fast`
    pub fn app(planner: MockProvider, fast: MockProvider) -> Router {
        let registry = ModelRegistry::new(vec![ModelDescriptor::new("fast", Arc::new(fast))
            .with_description("Quick answers")])
        .unwrap();
        let planner: Arc<dyn Provider> = Arc::new(planner);
        let triage = Triage::builder(registry)
            .planner(vec![Arc::clone(&planner)])
            .tool_models(vec![Arc::clone(&planner)])
            .reasoning_models(vec![planner])
            .search(Arc::new(MockSearch::default()))
            .media(Arc::new(MockMedia::new()))
            .embeddings(Arc::new(MockEmbedding))
            .build()
            .unwrap();
        configure(AppState::new(triage))
    }

    pub fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub async fn read_body(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }
}
