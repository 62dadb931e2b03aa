use axum::{
    extract::State,
    response::Json,
};
use serde_json::{json, Value};
use crate::errors::AppError;
use crate::models::ApiResponse;
use crate::routes::AppState;

pub async fn index(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    Json(ApiResponse::ok(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.store.backend(),
        "endpoints": ["/api/users", "/api/tasks"],
    })))
}

// Fallback for anything the router does not know
pub async fn not_found() -> AppError {
    AppError::NotFound("Route not found".into())
}
