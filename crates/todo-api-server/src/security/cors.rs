use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::config::CorsConfig;
use crate::logging::CORRELATION_HEADER;

/// `pattern` is an exact origin or `scheme://*.domain`, which matches any subdomain of `domain`
pub fn origin_matches(pattern: &str, origin: &str) -> bool {
    match pattern.split_once("*.") {
        Some((scheme, domain)) => origin
            .strip_prefix(scheme)
            .and_then(|host| host.strip_suffix(domain))
            .is_some_and(|sub| sub.len() > 1 && sub.ends_with('.') && !sub.contains('/')),
        None => pattern.eq_ignore_ascii_case(origin),
    }
}

/// Empty `allowed_origins` is permissive outside production; in production it
/// allows no cross-origin requests at all
pub fn cors_layer(config: &CorsConfig, session_header: &str, production: bool) -> CorsLayer {
    if config.allowed_origins.is_empty() {
        if production {
            warn!("No CORS origins configured in production; cross-origin requests are refused");
            return CorsLayer::new();
        }
        return CorsLayer::permissive();
    }

    let patterns = config.allowed_origins.clone();
    let mut allowed_headers = vec![header::CONTENT_TYPE, header::AUTHORIZATION];
    match HeaderName::from_bytes(session_header.as_bytes()) {
        Ok(name) => allowed_headers.push(name),
        Err(_) => warn!("Session header '{}' is not a valid header name", session_header),
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|o| patterns.iter().any(|p| origin_matches(p, o)))
                .unwrap_or(false)
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(allowed_headers)
        .expose_headers([HeaderName::from_static(CORRELATION_HEADER)])
        .allow_credentials(true)
}
