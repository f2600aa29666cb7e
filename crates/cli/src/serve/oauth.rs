//! Airtable sign-in endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use formsync_storage::now_unix;
use formsync_sync::OAuthError;
use serde::Deserialize;
use serde_json::json;

use super::handlers::storage_error;
use super::json_error;
use super::state::AppState;

fn oauth_error(e: OAuthError) -> Response {
    let status = match e {
        OAuthError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        OAuthError::InvalidState => StatusCode::BAD_REQUEST,
        OAuthError::Storage(e) => return storage_error(e),
        OAuthError::InvalidAuthorizeUrl(_) => {
            tracing::error!(error = %e, "sign-in misconfigured");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        OAuthError::Exchange(_) | OAuthError::Upstream(_) => {
            tracing::error!(error = %e, "sign-in failed");
            StatusCode::BAD_GATEWAY
        }
    };
    json_error(status, &e.to_string()).into_response()
}

/// GET /auth/airtable
pub(crate) async fn handle_authorize(State(state): State<Arc<AppState>>) -> Response {
    match state.oauth.begin(now_unix()).await {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => oauth_error(e),
    }
}

#[derive(Deserialize)]
pub(crate) struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /auth/airtable/callback?code=&state=
pub(crate) async fn handle_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = query.error {
        tracing::warn!(
            error = %error,
            description = query.error_description.as_deref().unwrap_or(""),
            "Airtable denied authorization"
        );
        return json_error(StatusCode::BAD_REQUEST, &error).into_response();
    }
    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return json_error(StatusCode::BAD_REQUEST, "code and state are required").into_response();
    };

    match state.oauth.complete(&oauth_state, &code, now_unix()).await {
        Ok(user) => (StatusCode::OK, Json(json!({ "userId": user.user_id }))).into_response(),
        Err(e) => oauth_error(e),
    }
}
