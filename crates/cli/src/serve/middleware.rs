//! HTTP middleware: rate limiting and API key authentication.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::state::AppState;
use crate::config::{OAUTH_CALLBACK_PATH, OAUTH_START_PATH, WEBHOOK_PATH};

/// `/api/forms/{id}/<leaf>`
fn is_form_subpath(path: &str, leaf: &str) -> bool {
    path.strip_prefix("/api/forms/")
        .and_then(|rest| rest.strip_suffix(leaf))
        .and_then(|id| id.strip_suffix('/'))
        .is_some_and(|id| !id.is_empty() && !id.contains('/'))
}

fn is_public_submission(method: &Method, path: &str) -> bool {
    method == Method::POST && is_form_subpath(path, "responses")
}

/// Routes reachable without the API key: health checks, upstream
/// notifications, sign-in, and the public form view and submit endpoints.
pub(crate) fn is_public(method: &Method, path: &str) -> bool {
    path == "/health"
        || path == WEBHOOK_PATH
        || path == OAUTH_START_PATH
        || path == OAUTH_CALLBACK_PATH
        || (method == Method::GET && is_form_subpath(path, "view"))
        || is_public_submission(method, path)
}

/// Per-IP rate limit on public submissions. Other routes pass straight
/// through.
pub(crate) async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if !is_public_submission(request.method(), request.uri().path()) {
        return next.run(request).await;
    }
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    match state.rate_limiter.check(ip).await {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            tracing::warn!(%ip, retry_after, "submission rate limit exceeded");
            let body = serde_json::json!({
                "error": "rate limit exceeded",
                "retry_after": retry_after,
            });
            (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
        }
    }
}

/// API key authentication middleware.
///
/// If `FORMSYNC_API_KEY` is set, every non-public request must include
/// either `Authorization: Bearer <key>` or `X-API-Key: <key>`.
pub(crate) async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let expected_key = match &state.api_key {
        Some(k) => k,
        None => return next.run(request).await,
    };

    if is_public(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    if let Some(auth) = auth_header {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            if token == expected_key {
                return next.run(request).await;
            }
            return super::json_error(StatusCode::FORBIDDEN, "invalid API key").into_response();
        }
    }

    let api_key_header = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    if let Some(key) = api_key_header {
        if key == expected_key {
            return next.run(request).await;
        }
        return super::json_error(StatusCode::FORBIDDEN, "invalid API key").into_response();
    }

    super::json_error(StatusCode::UNAUTHORIZED, "authentication required").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_routes() {
        assert!(is_public(&Method::GET, "/health"));
        assert!(is_public(&Method::POST, "/webhooks/airtable"));
        assert!(is_public(&Method::GET, "/api/forms/f1/view"));
        assert!(is_public(&Method::POST, "/api/forms/f1/responses"));
        assert!(is_public(&Method::GET, "/auth/airtable"));
        assert!(is_public(&Method::GET, "/auth/airtable/callback"));
    }

    #[test]
    fn management_routes_are_protected() {
        assert!(!is_public(&Method::GET, "/api/forms/f1/responses"));
        assert!(!is_public(&Method::GET, "/api/forms"));
        assert!(!is_public(&Method::DELETE, "/api/forms/f1"));
        assert!(!is_public(&Method::PUT, "/api/users/u1"));
        assert!(!is_public(&Method::GET, "/api/bases"));
        assert!(!is_public(&Method::GET, "/api/bases/app1/tables/tbl1/fields"));
        assert!(!is_public(&Method::GET, "/api/forms//view"));
        assert!(!is_public(&Method::GET, "/api/forms/a/b/view"));
    }
}
