use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use std::any::Any;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::error;

use crate::handlers::{self, auth, todos};
use crate::logging::request_logger;
use crate::security::{cors_layer, session_middleware};
use crate::state::AppState;
use crate::utils::ApiResponse;

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::failure("Internal server error")),
    )
        .into_response()
}

/// Full application router: public auth routes, session-guarded todo routes,
/// static/SPA fallback and the shared middleware stack
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout));

    let protected_routes = Router::new()
        .route("/api/todos", get(todos::list_todos).post(todos::create_todo))
        .route("/api/todos/stats", get(todos::todo_stats))
        .route("/api/todos/completed/clear", delete(todos::clear_completed))
        .route(
            "/api/todos/{id}",
            put(todos::update_todo).delete(todos::delete_todo),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(handlers::fallback)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(
            &state.settings.cors,
            &state.settings.session.header_name,
            state.settings.server.is_production(),
        ))
        .layer(middleware::from_fn_with_state(
            state.request_logger.clone(),
            request_logger,
        ))
        .with_state(state)
}
