//! Authentication handlers (register, login, logout)
//!
//! Credentials are checked by the remote platform; this server only keeps the
//! session record that maps the `x-session-id` header to a user.

use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};
use validator::{Validate, ValidationError};

use crate::config::Settings;
use crate::security::middleware::session_id_from_headers;
use crate::security::session::SessionLookupError;
use crate::security::SessionManager;
use crate::services::{LoginPayload, RegisterPayload};
use crate::state::AppState;
use crate::utils::{ApiError, ApiJson, ApiResponse};

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Register request payload
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(custom(function = "not_blank"))]
    pub first_name: String,
    #[validate(custom(function = "not_blank"))]
    pub last_name: String,
    #[validate(custom(function = "not_blank"))]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Login request payload
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct LoginRequest {
    #[validate(custom(function = "not_blank"))]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// `user_id` from the platform's data object; some endpoints send it as a number
fn user_id_of(data: &Value) -> Option<String> {
    match data.get("user_id")? {
        Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn with_session_id(mut data: Value, session_id: &str) -> Value {
    if let Value::Object(map) = &mut data {
        map.insert("sessionId".to_string(), Value::String(session_id.to_string()));
    }
    data
}

/// Register handler - POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Value>>), ApiError> {
    payload
        .validate()
        .map_err(|_| ApiError::Validation("All fields are required".to_string()))?;

    let email = payload.email.trim().to_string();
    let data = state
        .store
        .register(RegisterPayload {
            first_name: payload.first_name.trim().to_string(),
            last_name: payload.last_name.trim().to_string(),
            email: email.clone(),
            password: payload.password,
        })
        .await
        .map_err(|e| {
            if e.is_conflict() {
                ApiError::Conflict(e.message().to_string())
            } else {
                ApiError::remote("Registration failed", e)
            }
        })?;

    let Some(user_id) = user_id_of(&data) else {
        warn!("Registration for {} returned no user_id, no session created", email);
        return Ok((StatusCode::CREATED, Json(ApiResponse::success(data))));
    };

    state
        .sessions
        .create(&user_id, &email)
        .await
        .map_err(|e| ApiError::remote("Registration failed", e))?;

    info!("✅ User registered: {}", user_id);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(with_session_id(data, &user_id))),
    ))
}

/// Login handler - POST /api/auth/login
///
/// Every failure past input validation is reported as bad credentials.
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    payload
        .validate()
        .map_err(|_| ApiError::Validation("Email and password are required".to_string()))?;

    let email = payload.email.trim().to_string();
    let data = state
        .store
        .login(LoginPayload {
            email: email.clone(),
            password: payload.password,
        })
        .await
        .map_err(|e| {
            warn!("Login failed for {}: {}", email, e);
            ApiError::InvalidCredentials
        })?;

    let user_id = user_id_of(&data).ok_or_else(|| {
        warn!("Login for {} returned no user_id", email);
        ApiError::InvalidCredentials
    })?;

    state.sessions.create(&user_id, &email).await.map_err(|e| {
        error!("Session creation failed for {}: {}", user_id, e);
        ApiError::InvalidCredentials
    })?;

    info!("User logged in: {}", user_id);
    Ok(Json(ApiResponse::success(with_session_id(data, &user_id))))
}

/// Logout handler - POST /api/auth/logout
///
/// Reads the session header itself so logging out never queues an activity refresh.
pub async fn logout(
    State(settings): State<Arc<Settings>>,
    State(sessions): State<Arc<SessionManager>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let session_id = session_id_from_headers(&headers, &settings.session.header_name)
        .ok_or_else(|| ApiError::Unauthenticated("Authentication required".to_string()))?;

    match sessions.lookup(&session_id).await {
        Ok(_) | Err(SessionLookupError::Invalid) => {}
        Err(SessionLookupError::NotFound) => {
            return Ok(Json(ApiResponse::message("Logged out")));
        }
        Err(SessionLookupError::Remote(e)) => return Err(ApiError::remote("Logout failed", e)),
    }

    sessions
        .destroy(&session_id)
        .await
        .map_err(|e| ApiError::remote("Logout failed", e))?;

    Ok(Json(ApiResponse::message("Logged out")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_id_of() {
        assert_eq!(user_id_of(&json!({ "user_id": "abc" })), Some("abc".into()));
        assert_eq!(user_id_of(&json!({ "user_id": 42 })), Some("42".into()));
        assert_eq!(user_id_of(&json!({ "user_id": "  " })), None);
        assert_eq!(user_id_of(&json!({})), None);
    }

    #[test]
    fn test_register_validation() {
        let valid = RegisterRequest {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            password: "pw".into(),
        };
        assert!(valid.validate().is_ok());

        let blank = RegisterRequest {
            last_name: "   ".into(),
            ..valid
        };
        assert!(blank.validate().is_err());
        assert!(RegisterRequest::default().validate().is_err());
    }

    #[test]
    fn test_login_validation() {
        let missing_password: LoginRequest =
            serde_json::from_value(json!({ "email": "ada@example.com" })).unwrap();
        assert!(missing_password.validate().is_err());
    }

    #[test]
    fn test_session_id_added_to_data() {
        let data = with_session_id(json!({ "user_id": "u1" }), "u1");
        assert_eq!(data["sessionId"], "u1");
    }
}
