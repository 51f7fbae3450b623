use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};
use tracing::error;

use crate::config::Settings;
use crate::utils::{ApiError, ApiResponse};

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(ApiResponse::<()>::failure(message))).into_response()
}

fn is_api_path(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

/// Unknown `/api` routes get a JSON 404; everything else is served from the
/// static directory with `index.html` as the SPA fallback
pub async fn fallback(State(settings): State<Arc<Settings>>, request: Request) -> Response {
    if is_api_path(request.uri().path()) {
        return not_found("API route not found");
    }

    let Some(dir) = settings.server.static_dir.as_deref() else {
        return not_found("Not found");
    };

    let index = Path::new(dir).join("index.html");
    let serve = ServeDir::new(dir).fallback(ServeFile::new(index));
    match serve.oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            error!("Static file serving failed: {}", e);
            ApiError::InternalError("Internal server error".to_string()).into_response()
        }
    }
}
