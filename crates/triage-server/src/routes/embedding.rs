use crate::error::ApiError;
use crate::state::AppState;
use axum::{extract::State, routing::post, Json, Router};
use triage::services::{EmbeddingParams, EmbeddingResponse};

async fn handler(
    State(state): State<AppState>,
    Json(params): Json<EmbeddingParams>,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    if params.text.is_none() && params.url.is_none() && params.file_content.is_none() {
        return Err(ApiError::bad_request(
            "one of `text`, `url` or `file_content` is required",
        ));
    }
    Ok(Json(state.triage.embedding(params).await?))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/embedding", post(handler))
        .with_state(state)
}
