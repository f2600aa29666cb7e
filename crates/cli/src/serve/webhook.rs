//! Airtable webhook endpoint.
//!
//! Notifications only say "something changed"; the payloads are pulled from
//! upstream and reconciled before acknowledging. Once a notification is
//! well formed the reply is always 200, so upstream never retries a
//! notification we chose to drop.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use formsync_storage::FormStore;
use formsync_sync::{sync_webhook, PayloadFetcher, TokenProvider};
use serde_json::{json, Value};

use super::json_error;
use super::state::AppState;

/// GET /webhooks/airtable?challenge=
pub(crate) async fn handle_verification(
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match params.get("challenge") {
        Some(challenge) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            challenge.clone(),
        )
            .into_response(),
        None => json_error(StatusCode::BAD_REQUEST, "missing challenge").into_response(),
    }
}

/// `(base_id, webhook_id)` from a notification body.
fn notification_ids(body: &Value) -> Option<(&str, &str)> {
    let base_id = body.get("base")?.get("id")?.as_str()?;
    let webhook_id = body.get("webhook")?.get("id")?.as_str()?;
    Some((base_id, webhook_id))
}

fn ignored(reason: &str) -> Response {
    (
        StatusCode::OK,
        Json(json!({"received": true, "processed": false, "reason": reason})),
    )
        .into_response()
}

/// POST /webhooks/airtable
pub(crate) async fn handle_notification(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let body: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "webhook notification is not JSON");
            return json_error(StatusCode::BAD_REQUEST, "invalid notification body").into_response();
        }
    };
    let Some((base_id, webhook_id)) = notification_ids(&body) else {
        tracing::warn!("webhook notification without base.id or webhook.id");
        return json_error(StatusCode::BAD_REQUEST, "missing base.id or webhook.id").into_response();
    };
    tracing::info!(webhook_id, base_id, "received webhook notification");

    let form = match state.store.find_form_by_webhook_id(webhook_id).await {
        Ok(Some(form)) => form,
        Ok(None) => {
            tracing::warn!(webhook_id, base_id, "no form for webhook");
            return ignored("unknown webhook");
        }
        Err(e) => {
            tracing::error!(webhook_id, base_id, error = %e, "form lookup failed");
            return ignored("form lookup failed");
        }
    };

    if form.base_id != base_id {
        tracing::warn!(
            webhook_id,
            base_id,
            form_id = %form.id,
            form_base_id = %form.base_id,
            "notification base does not match form"
        );
        return ignored("base mismatch");
    }

    let token = match state.tokens.access_token(&form.user_id).await {
        Ok(Some(token)) => token,
        Ok(None) => {
            tracing::warn!(webhook_id, form_id = %form.id, user_id = %form.user_id, "form owner has no access token");
            return ignored("no credentials");
        }
        Err(e) => {
            tracing::error!(webhook_id, form_id = %form.id, error = %e, "access token lookup failed");
            return ignored("no credentials");
        }
    };

    let mut fetcher = PayloadFetcher::new(
        state.api.clone(),
        state.tokens.clone(),
        form.user_id.clone(),
        token,
    );
    let report = sync_webhook(&mut fetcher, &state.engine, &form, webhook_id).await;
    tracing::info!(
        webhook_id,
        form_id = %form.id,
        pages = report.pages,
        processed = report.stats.processed,
        not_found = report.stats.not_found,
        errors = report.stats.errors,
        skipped = report.stats.skipped,
        "webhook sync finished"
    );

    (
        StatusCode::OK,
        Json(json!({
            "received": true,
            "processed": true,
            "formId": form.id,
            "report": report,
        })),
    )
        .into_response()
}
