use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde_json::Value;

// The registry as the planner sees it
async fn handler(State(state): State<AppState>) -> Json<Value> {
    Json(state.triage.registry().serialize())
}

pub fn routes(state: AppState) -> Router {
    Router::new().route("/models", get(handler)).with_state(state)
}
