use axum::{
    extract::{Path, Query, State, rejection::{JsonRejection, QueryRejection}},
    response::{IntoResponse, Response, Json},
    http::StatusCode,
};
use serde_json::json;
use crate::errors::AppResult;
use crate::models::{ApiResponse, GetParams, ListParams, UserInput};
use crate::routes::AppState;
use super::invalid_request;

pub async fn list_users(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> AppResult<Response> {
    let Query(params) = params.map_err(invalid_request)?;
    tracing::debug!("Listing users with {:?}", params);

    let output = state.users.list(&params).await?;
    Ok(Json(ApiResponse::ok(output)).into_response())
}

pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<UserInput>, JsonRejection>,
) -> AppResult<Response> {
    let Json(input) = payload.map_err(invalid_request)?;

    let user = state.users.create(input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new("User created", user))).into_response())
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    params: Result<Query<GetParams>, QueryRejection>,
) -> AppResult<Response> {
    let Query(params) = params.map_err(invalid_request)?;

    let user = state.users.get(&user_id, &params).await?;
    Ok(Json(ApiResponse::ok(user)).into_response())
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<UserInput>, JsonRejection>,
) -> AppResult<Response> {
    let Json(input) = payload.map_err(invalid_request)?;

    let user = state.users.update(&user_id, input).await?;
    Ok(Json(ApiResponse::new("User updated", user)).into_response())
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Response> {
    state.users.delete(&user_id).await?;
    Ok(Json(ApiResponse::new("User deleted", json!({}))).into_response())
}
