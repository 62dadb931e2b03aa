use axum::{
    response::{IntoResponse, Response, Json},
    http::StatusCode,
};
use serde_json::{json, Value};
use crate::errors::AppError;
use crate::models::ApiResponse;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Duplicate(_) | AppError::Conflict(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// The IntoResponse trait implementation converts AppError into the {message, data} envelope.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body: ApiResponse<Value> = match &self {
            // Store failures are internal server errors and carry a diagnostic
            AppError::Store(e) => {
                tracing::error!("Store failure: {}", e);
                ApiResponse::new("Server Error", json!({ "error": e.to_string() }))
            }

            // Everything else is the caller's fault
            other => {
                tracing::warn!("Rejected request ({}): {}", status, other);
                ApiResponse::new(other.to_string(), json!({}))
            }
        };

        (status, Json(body)).into_response()
    }
}
