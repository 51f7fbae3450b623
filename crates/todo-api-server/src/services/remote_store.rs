//! Client for the remote key-value / account platform.
//!
//! Everything the server persists lives behind [`RemoteStore`]: session records,
//! per-user todo blobs, and the user directory used by register/login.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::RemoteConfig;

#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Remote API error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Remote API unreachable: {0}")]
    Transport(String),

    #[error("Invalid remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }

    /// Duplicate account (or other uniqueness) rejection from the platform
    pub fn is_conflict(&self) -> bool {
        match self {
            RemoteError::Upstream { status, message } => {
                *status == StatusCode::CONFLICT.as_u16()
                    || message.to_lowercase().contains("already exists")
            }
            _ => false,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RemoteError::NotFound(msg)
            | RemoteError::Transport(msg)
            | RemoteError::Decode(msg) => msg,
            RemoteError::Upstream { message, .. } => message,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Seconds until the platform drops the record
    pub ttl: Option<u64>,
}

impl SetOptions {
    pub fn with_ttl(ttl: u64) -> Self {
        Self { ttl: Some(ttl) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// `Ok(None)` when the record exists but carries no value,
    /// `Err(RemoteError::NotFound)` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Value>, RemoteError>;

    async fn set(&self, key: &str, value: Value, options: SetOptions) -> Result<(), RemoteError>;

    async fn delete(&self, key: &str) -> Result<(), RemoteError>;

    /// Returns the platform's `data` object, which carries `user_id`
    async fn register(&self, payload: RegisterPayload) -> Result<Value, RemoteError>;

    async fn login(&self, payload: LoginPayload) -> Result<Value, RemoteError>;
}

/// `{ success, message?, data? }` returned by every platform endpoint
#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    data: Option<Value>,
}

#[derive(Debug, Serialize)]
struct SetRequest<'a> {
    value: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u64>,
}

/// [`RemoteStore`] over the platform's HTTPS API, authenticated with the developer token
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: Url,
    app_id: String,
    developer_token: String,
}

impl HttpRemoteStore {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| RemoteError::Transport(format!("invalid base url: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            app_id: config.app_id.clone(),
            developer_token: config.developer_token.clone(),
        })
    }

    /// `<base>/developers/apps/<app_id>/<segments...>`, each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| RemoteError::Transport("base url cannot carry a path".to_string()))?;
            path.pop_if_empty()
                .extend(["developers", "apps", self.app_id.as_str()])
                .extend(segments);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.developer_token)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Envelope, RemoteError> {
        let response = builder.send().await.map_err(|e| {
            error!("Remote API transport error: {}", e);
            RemoteError::Transport(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let envelope = if body.trim().is_empty() {
            None
        } else {
            match serde_json::from_str::<Envelope>(&body) {
                Ok(envelope) => Some(envelope),
                Err(e) if status.is_success() => return Err(RemoteError::Decode(e.to_string())),
                Err(_) => None,
            }
        };

        if !status.is_success() {
            let message = envelope
                .and_then(|e| e.message)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| format!("Remote API request failed ({})", status));

            if status == StatusCode::NOT_FOUND || message.to_lowercase().contains("not found") {
                debug!("Remote API not found: {}", message);
                return Err(RemoteError::NotFound(message));
            }

            error!("Remote API error ({}): {}", status, message);
            return Err(RemoteError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        Ok(envelope.unwrap_or_default())
    }

    async fn account_call(&self, action: &str, body: Value) -> Result<Value, RemoteError> {
        let url = self.endpoint(&[action])?;
        let envelope = self.send(self.request(Method::POST, url).json(&body)).await?;

        if !envelope.success {
            return Err(RemoteError::Upstream {
                status: StatusCode::OK.as_u16(),
                message: envelope
                    .message
                    .unwrap_or_else(|| format!("Remote {} was not successful", action)),
            });
        }

        Ok(envelope.data.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, RemoteError> {
        debug!("Remote get: {}", key);
        let url = self.endpoint(&["app-data", key])?;
        let envelope = self.send(self.request(Method::GET, url)).await?;

        if !envelope.success {
            return Ok(None);
        }

        Ok(envelope
            .data
            .and_then(|data| data.get("value").cloned())
            .filter(|value| !value.is_null()))
    }

    async fn set(&self, key: &str, value: Value, options: SetOptions) -> Result<(), RemoteError> {
        debug!("Remote set: {} (ttl={:?})", key, options.ttl);
        let url = self.endpoint(&["app-data", key])?;
        let body = SetRequest {
            value: &value,
            ttl: options.ttl,
        };
        self.send(self.request(Method::PUT, url).json(&body)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        debug!("Remote delete: {}", key);
        let url = self.endpoint(&["app-data", key])?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn register(&self, payload: RegisterPayload) -> Result<Value, RemoteError> {
        let body = serde_json::to_value(&payload).map_err(|e| RemoteError::Decode(e.to_string()))?;
        self.account_call("register", body).await
    }

    async fn login(&self, payload: LoginPayload) -> Result<Value, RemoteError> {
        let body = serde_json::to_value(&payload).map_err(|e| RemoteError::Decode(e.to_string()))?;
        self.account_call("login", body).await
    }
}
