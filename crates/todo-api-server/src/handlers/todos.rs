use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::models::{Todo, TodoFilter, TodoPatch, TodoStats};
use crate::security::AuthSession;
use crate::services::TodoService;
use crate::utils::{ApiError, ApiJson, ApiResponse};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub filter: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateTodoRequest {
    #[serde(default)]
    pub text: String,
}

/// GET /api/todos[?filter=all|active|completed]
pub async fn list_todos(
    State(todos): State<Arc<TodoService>>,
    Extension(auth): Extension<AuthSession>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Todo>>>, ApiError> {
    let filter = query
        .filter
        .as_deref()
        .unwrap_or_default()
        .parse::<TodoFilter>()
        .map_err(ApiError::Validation)?;

    let items = todos.list(auth.user_id(), filter).await?;
    Ok(Json(ApiResponse::success(items)))
}

/// GET /api/todos/stats
pub async fn todo_stats(
    State(todos): State<Arc<TodoService>>,
    Extension(auth): Extension<AuthSession>,
) -> Result<Json<ApiResponse<TodoStats>>, ApiError> {
    let stats = todos.stats(auth.user_id()).await?;
    Ok(Json(ApiResponse::success(stats)))
}

/// POST /api/todos
pub async fn create_todo(
    State(todos): State<Arc<TodoService>>,
    Extension(auth): Extension<AuthSession>,
    ApiJson(payload): ApiJson<CreateTodoRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Todo>>), ApiError> {
    let todo = todos.create(auth.user_id(), &payload.text).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(todo))))
}

/// PUT /api/todos/{id}
///
/// Without a JSON body the todo is returned unchanged.
pub async fn update_todo(
    State(todos): State<Arc<TodoService>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<String>,
    payload: Option<ApiJson<TodoPatch>>,
) -> Result<Json<ApiResponse<Todo>>, ApiError> {
    // No body at all is an empty patch
    let patch = payload.map(|ApiJson(patch)| patch).unwrap_or_default();
    let todo = todos.update(auth.user_id(), &id, patch).await?;
    Ok(Json(ApiResponse::success(todo)))
}

/// DELETE /api/todos/{id}
pub async fn delete_todo(
    State(todos): State<Arc<TodoService>>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    todos.delete(auth.user_id(), &id).await?;
    Ok(Json(ApiResponse::message("Todo deleted")))
}

/// DELETE /api/todos/completed/clear
pub async fn clear_completed(
    State(todos): State<Arc<TodoService>>,
    Extension(auth): Extension<AuthSession>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    todos.clear_completed(auth.user_id()).await?;
    Ok(Json(ApiResponse::message("Completed todos cleared")))
}
