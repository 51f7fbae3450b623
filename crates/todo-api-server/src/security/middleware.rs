use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

use crate::security::session::{AuthSession, SessionLookupError};
use crate::state::AppState;
use crate::utils::error::ApiError;

/// Trimmed, non-empty session id from the configured header
pub fn session_id_from_headers(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Session middleware - validates the session header against the remote store
/// and attaches [`AuthSession`] to the request
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let session_id = session_id_from_headers(request.headers(), &state.settings.session.header_name)
        .ok_or_else(|| ApiError::Unauthenticated("Authentication required".to_string()))?;

    let session = match state.sessions.lookup(&session_id).await {
        Ok(session) => session,
        Err(SessionLookupError::Invalid) => {
            return Err(ApiError::SessionInvalid(
                "Invalid or expired session".to_string(),
            ))
        }
        Err(SessionLookupError::NotFound) => {
            return Err(ApiError::SessionInvalid("Session not found".to_string()))
        }
        Err(SessionLookupError::Remote(e)) => {
            error!("Session verification error: {}", e);
            return Err(ApiError::SessionInvalid("Invalid session".to_string()));
        }
    };

    debug!("Session {} verified for user {}", session_id, session.user_id);

    // Response never waits on the activity refresh
    state
        .sessions
        .spawn_touch(session_id.clone(), session.clone());

    request
        .extensions_mut()
        .insert(AuthSession { session_id, session });

    Ok(next.run(request).await)
}
