use axum::{
    extract::{Path, Query, State, rejection::{JsonRejection, QueryRejection}},
    response::{IntoResponse, Response, Json},
    http::StatusCode,
};
use serde_json::json;
use crate::errors::AppResult;
use crate::models::{ApiResponse, GetParams, ListParams, TaskInput};
use crate::routes::AppState;
use super::invalid_request;

pub async fn list_tasks(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> AppResult<Response> {
    let Query(params) = params.map_err(invalid_request)?;
    tracing::debug!("Listing tasks with {:?}", params);

    let output = state.tasks.list(&params).await?;
    Ok(Json(ApiResponse::ok(output)).into_response())
}

pub async fn create_task(
    State(state): State<AppState>,
    payload: Result<Json<TaskInput>, JsonRejection>,
) -> AppResult<Response> {
    let Json(input) = payload.map_err(invalid_request)?;

    let task = state.tasks.create(input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new("Task created", task))).into_response())
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    params: Result<Query<GetParams>, QueryRejection>,
) -> AppResult<Response> {
    let Query(params) = params.map_err(invalid_request)?;

    let task = state.tasks.get(&task_id, &params).await?;
    Ok(Json(ApiResponse::ok(task)).into_response())
}

pub async fn update_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    payload: Result<Json<TaskInput>, JsonRejection>,
) -> AppResult<Response> {
    let Json(input) = payload.map_err(invalid_request)?;

    let task = state.tasks.update(&task_id, input).await?;
    Ok(Json(ApiResponse::new("Task updated", task)).into_response())
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Response> {
    state.tasks.delete(&task_id).await?;
    Ok(Json(ApiResponse::new("Task deleted", json!({}))).into_response())
}
