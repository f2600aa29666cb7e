//! Airtable schema browsing for the form builder.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use formsync_sync::CatalogError;
use serde::Deserialize;
use serde_json::json;

use super::json_error;
use super::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OwnerQuery {
    user_id: Option<String>,
}

impl OwnerQuery {
    fn user_id(&self) -> Result<&str, Response> {
        self.user_id
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "userId is required").into_response())
    }
}

fn catalog_error(e: CatalogError) -> Response {
    let status = match &e {
        CatalogError::NoCredentials { .. } | CatalogError::TableNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        CatalogError::Upstream(_) | CatalogError::Token(_) => {
            tracing::error!(error = %e, "schema lookup failed");
            StatusCode::BAD_GATEWAY
        }
    };
    json_error(status, &e.to_string()).into_response()
}

/// GET /api/bases?userId=
pub(crate) async fn handle_list_bases(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OwnerQuery>,
) -> Response {
    let user_id = match query.user_id() {
        Ok(u) => u,
        Err(r) => return r,
    };
    match state.catalog.bases(user_id).await {
        Ok(bases) => (StatusCode::OK, Json(json!({ "bases": bases }))).into_response(),
        Err(e) => catalog_error(e),
    }
}

/// GET /api/bases/{base_id}/tables?userId=
pub(crate) async fn handle_list_tables(
    State(state): State<Arc<AppState>>,
    Path(base_id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> Response {
    let user_id = match query.user_id() {
        Ok(u) => u,
        Err(r) => return r,
    };
    match state.catalog.tables(user_id, &base_id).await {
        Ok(tables) => (StatusCode::OK, Json(json!({ "tables": tables }))).into_response(),
        Err(e) => catalog_error(e),
    }
}

/// GET /api/bases/{base_id}/tables/{table_id}/fields?userId=
///
/// Only fields a question can be bound to.
pub(crate) async fn handle_list_fields(
    State(state): State<Arc<AppState>>,
    Path((base_id, table_id)): Path<(String, String)>,
    Query(query): Query<OwnerQuery>,
) -> Response {
    let user_id = match query.user_id() {
        Ok(u) => u,
        Err(r) => return r,
    };
    match state.catalog.fields(user_id, &base_id, &table_id).await {
        Ok(fields) => (StatusCode::OK, Json(json!({ "fields": fields }))).into_response(),
        Err(e) => catalog_error(e),
    }
}
