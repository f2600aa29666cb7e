//! `formsync serve` -- the HTTP service.
//!
//! Endpoints:
//! - GET    /health                       - Liveness (public)
//! - GET    /webhooks/airtable            - Endpoint verification challenge (public)
//! - POST   /webhooks/airtable            - Change notification; pulls and reconciles payloads (public)
//! - GET    /api/forms/{id}/view          - Form definition for rendering (public)
//! - POST   /api/forms/{id}/responses     - Submit answers (public, rate limited per IP)
//! - GET    /auth/airtable                - Start Airtable sign-in (public)
//! - GET    /auth/airtable/callback       - Finish sign-in, store credentials (public)
//! - PUT    /api/users/{user_id}          - Import a user's Airtable credentials
//! - GET    /api/forms?userId=            - List forms, newest first
//! - POST   /api/forms                    - Create a form and register its webhook
//! - GET    /api/forms/{id}               - Fetch a form
//! - PUT    /api/forms/{id}               - Rename a form or replace its questions
//! - DELETE /api/forms/{id}               - Delete a form and unregister its webhook
//! - GET    /api/forms/{id}/responses     - List mirrored responses with previews
//! - GET    /api/bases?userId=            - Bases the owner can read
//! - GET    /api/bases/{id}/tables        - Tables of a base, all fields
//! - GET    /api/bases/{id}/tables/{tid}/fields - Fields a question can use
//!
//! When `FORMSYNC_API_KEY` is set the non-public routes require it. Error
//! bodies are `{"error": message}`.

mod catalog;
mod handlers;
mod middleware;
mod oauth;
mod state;
mod webhook;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{middleware as axum_middleware, Json, Router};
use formsync_storage::{now_unix, FormStore, MemoryStore, SeedData};
use formsync_sync::{HttpAirtable, HttpTokenEndpoint, StoreTokenProvider};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use self::catalog::{handle_list_bases, handle_list_fields, handle_list_tables};
use self::handlers::{
    handle_create_form, handle_delete_form, handle_get_form, handle_health, handle_list_forms,
    handle_list_responses, handle_not_found, handle_put_user, handle_submit, handle_update_form,
    handle_view_form,
};
use self::middleware::{auth_middleware, rate_limit_middleware};
use self::oauth::{handle_authorize, handle_callback};
use self::state::AppState;
use self::webhook::{handle_notification, handle_verification};
use crate::config::{Config, OAUTH_CALLBACK_PATH, OAUTH_START_PATH, WEBHOOK_PATH};

/// Maximum request body size: 2 MB.
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Rate limit window duration in seconds (1 minute).
const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// How often expired OAuth state records are purged.
const OAUTH_PURGE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

pub(crate) fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            WEBHOOK_PATH,
            get(handle_verification).post(handle_notification),
        )
        .route(OAUTH_START_PATH, get(handle_authorize))
        .route(OAUTH_CALLBACK_PATH, get(handle_callback))
        .route("/api/users/{user_id}", put(handle_put_user))
        .route("/api/bases", get(handle_list_bases))
        .route("/api/bases/{base_id}/tables", get(handle_list_tables))
        .route(
            "/api/bases/{base_id}/tables/{table_id}/fields",
            get(handle_list_fields),
        )
        .route("/api/forms", get(handle_list_forms).post(handle_create_form))
        .route(
            "/api/forms/{id}",
            get(handle_get_form)
                .put(handle_update_form)
                .delete(handle_delete_form),
        )
        .route("/api/forms/{id}/view", get(handle_view_form))
        .route(
            "/api/forms/{id}/responses",
            get(handle_list_responses).post(handle_submit),
        )
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

fn load_seed(path: &Path) -> Result<SeedData, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading '{}': {}", path.display(), e))?;
    let seed = serde_json::from_str(&text)
        .map_err(|e| format!("error parsing seed '{}': {}", path.display(), e))?;
    Ok(seed)
}

/// Start the HTTP server on the given port, optionally pre-loading the
/// in-memory store from a seed file.
pub(crate) async fn start_server(
    port: u16,
    seed: Option<&Path>,
    config: Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<MemoryStore> = match seed {
        Some(path) => {
            let seed = load_seed(path)?;
            tracing::info!(
                path = %path.display(),
                users = seed.users.len(),
                forms = seed.forms.len(),
                responses = seed.responses.len(),
                "loaded seed data"
            );
            Arc::new(MemoryStore::from_seed(seed))
        }
        None => Arc::new(MemoryStore::new()),
    };
    let store: Arc<dyn FormStore> = store;

    let api = Arc::new(HttpAirtable::new(config.api_url.clone()));
    let grant = Arc::new(HttpTokenEndpoint::new(
        config.token_url.clone(),
        config.client_id.clone(),
        config.client_secret.clone(),
    ));
    let tokens = Arc::new(StoreTokenProvider::new(store.clone(), grant.clone()));

    if config.api_key.is_some() {
        tracing::info!("API key authentication enabled");
    }
    match config.notification_url() {
        Some(url) => tracing::info!(notification_url = %url, "webhook registration enabled"),
        None => tracing::warn!("FORMSYNC_PUBLIC_URL is not an https URL, new forms will not receive webhooks"),
    }
    if config.oauth_settings().is_none() {
        tracing::warn!(
            "Airtable sign-in disabled: set AIRTABLE_CLIENT_ID, AIRTABLE_CLIENT_SECRET and FORMSYNC_PUBLIC_URL"
        );
    }
    tracing::info!(rate_limit = config.rate_limit, "submission rate limit per IP per minute");

    let state = Arc::new(AppState::new(store.clone(), api, tokens, grant, &config));
    tokio::spawn(purge_oauth_states(store));

    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("formsync listening on http://{}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server shut down");
    Ok(())
}

async fn purge_oauth_states(store: Arc<dyn FormStore>) {
    let mut interval = tokio::time::interval(OAUTH_PURGE_INTERVAL);
    loop {
        interval.tick().await;
        match store.purge_expired_oauth_states(now_unix()).await {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(purged, "purged expired OAuth states"),
            Err(e) => tracing::warn!(error = %e, "failed to purge OAuth states"),
        }
    }
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("received shutdown signal");
}

#[cfg(test)]
pub(crate) mod test_support;
