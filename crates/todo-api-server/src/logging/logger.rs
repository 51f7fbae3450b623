use axum::{
    body::Body,
    extract::{ConnectInfo, Query, Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::redact::Redactor;
use super::types::{CorrelationId, CorrelationRecord, CORRELATION_HEADER};
use crate::utils::error::ApiError;

/// Bodies larger than this are never buffered for logging
const MAX_LOGGED_BODY_BYTES: usize = 64 * 1024;

/// Request logger configuration
#[derive(Debug, Clone)]
pub struct RequestLogger {
    pub redactor: Redactor,
    /// Log redacted JSON bodies of non-GET requests
    pub log_bodies: bool,
}

impl RequestLogger {
    pub fn new(redactor: Redactor, log_bodies: bool) -> Self {
        Self {
            redactor,
            log_bodies,
        }
    }

    fn wants_body(&self, request: &Request) -> bool {
        if !self.log_bodies || request.method() == Method::GET {
            return false;
        }
        let is_json = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        let small = request
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok())
            .is_some_and(|len| len <= MAX_LOGGED_BODY_BYTES);
        is_json && small
    }

    /// Buffer the body, log a redacted copy and hand the bytes back to the request
    async fn capture_body(&self, request: Request) -> Result<(Request, Option<Value>), ApiError> {
        let (parts, body) = request.into_parts();
        let bytes = axum::body::to_bytes(body, MAX_LOGGED_BODY_BYTES)
            .await
            .map_err(|e| ApiError::Validation(format!("Invalid request body: {}", e)))?;

        let logged = serde_json::from_slice::<Value>(&bytes)
            .ok()
            .map(|v| self.redactor.redact_value(&v));

        Ok((Request::from_parts(parts, Body::from(bytes)), logged))
    }
}

/// Assigns a correlation id, logs the request and its response, and echoes
/// the id in `X-Correlation-ID`
pub async fn request_logger(
    State(logger): State<Arc<RequestLogger>>,
    mut request: Request,
    next: Next,
) -> Response {
    let correlation_id = CorrelationId::generate();
    let started = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let query = Query::<Vec<(String, String)>>::try_from_uri(request.uri())
        .map(|Query(pairs)| logger.redactor.redact_pairs(pairs))
        .unwrap_or_default();
    let headers = logger.redactor.redact_headers(request.headers());
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut body = None;
    if logger.wants_body(&request) {
        match logger.capture_body(request).await {
            Ok((rebuilt, logged)) => {
                request = rebuilt;
                body = logged;
            }
            Err(e) => {
                let mut response = axum::response::IntoResponse::into_response(e);
                attach_correlation_id(&mut response, &correlation_id);
                return response;
            }
        }
    }

    let query = Value::Object(query).to_string();
    let headers = Value::Object(headers).to_string();
    let body = body.map(|b| b.to_string());
    info!(
        correlation_id = %correlation_id,
        method = %method,
        path = %path,
        query = %query,
        headers = %headers,
        ip = ip.as_deref().unwrap_or("-"),
        user_agent = user_agent.as_deref().unwrap_or("-"),
        body = body.as_deref().unwrap_or("-"),
        "HTTP request"
    );

    request.extensions_mut().insert(correlation_id.clone());

    let mut response = next.run(request).await;
    attach_correlation_id(&mut response, &correlation_id);

    let record = CorrelationRecord {
        correlation_id: correlation_id.to_string(),
        method: method.to_string(),
        path,
        status: response.status().as_u16(),
        duration_ms: started.elapsed().as_millis() as u64,
        timestamp: Utc::now(),
    };
    log_response(&record);

    response
}

fn attach_correlation_id(response: &mut Response, correlation_id: &CorrelationId) {
    if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
}

fn log_response(record: &CorrelationRecord) {
    match record.status {
        500..=u16::MAX => error!(
            correlation_id = %record.correlation_id,
            method = %record.method,
            path = %record.path,
            status = record.status,
            duration_ms = record.duration_ms,
            "HTTP response"
        ),
        400..=499 => warn!(
            correlation_id = %record.correlation_id,
            method = %record.method,
            path = %record.path,
            status = record.status,
            duration_ms = record.duration_ms,
            "HTTP response"
        ),
        _ => info!(
            correlation_id = %record.correlation_id,
            method = %record.method,
            path = %record.path,
            status = record.status,
            duration_ms = record.duration_ms,
            "HTTP response"
        ),
    }
}
