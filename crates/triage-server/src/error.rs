use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use triage::TriageError;

/// A library failure as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub TriageError);

impl From<TriageError> for ApiError {
    fn from(err: TriageError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self(TriageError::InvalidParameters(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match self.0.root_cause() {
            TriageError::UnknownModel(_)
            | TriageError::InvalidParameters(_)
            | TriageError::ToolNotFound(_) => StatusCode::BAD_REQUEST,
            TriageError::SchemaValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TriageError::Config(_) | TriageError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, "request rejected");
        }
        let body = json!({
            "error": self.0.to_string(),
            "stage": self.0.stage(),
        });
        (status, Json(body)).into_response()
    }
}
