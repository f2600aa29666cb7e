//! Route handlers for health, credentials, forms and responses.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use formsync_core::{Answers, Form, Question};
use formsync_storage::{now_rfc3339, FormStore, StorageError, UserRecord};
use formsync_sync::{new_id, SubmissionError};
use serde::Deserialize;
use serde_json::{json, Value};

use super::json_error;
use super::state::AppState;

/// Number of answers shown in a response preview.
const PREVIEW_FIELDS: usize = 3;

/// Longest preview string before truncation.
const PREVIEW_MAX_CHARS: usize = 40;

pub(crate) fn storage_error(e: StorageError) -> Response {
    let status = match &e {
        StorageError::FormNotFound { .. }
        | StorageError::ResponseNotFound { .. }
        | StorageError::UserNotFound { .. } => StatusCode::NOT_FOUND,
        StorageError::FormExists { .. } | StorageError::DuplicateResponse { .. } => {
            StatusCode::CONFLICT
        }
        StorageError::Backend(_) => {
            tracing::error!(error = %e, "storage failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    json_error(status, &e.to_string()).into_response()
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

// ──────────────────────────────────────────────
// Credentials
// ──────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PutUserRequest {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// PUT /api/users/{user_id}
pub(crate) async fn handle_put_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<PutUserRequest>,
) -> Response {
    if body.access_token.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "accessToken must not be empty").into_response();
    }
    let user = UserRecord {
        user_id,
        access_token: body.access_token,
        refresh_token: body.refresh_token.filter(|t| !t.is_empty()),
    };
    match state.store.put_user(user).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => storage_error(e),
    }
}

// ──────────────────────────────────────────────
// Forms
// ──────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListFormsQuery {
    user_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateFormRequest {
    user_id: String,
    form_name: String,
    base_id: String,
    table_id: String,
    questions: Vec<Question>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateFormRequest {
    form_name: Option<String>,
    questions: Option<Vec<Question>>,
}

/// Reject empty or repeated question keys.
fn check_questions(questions: &[Question]) -> Result<(), String> {
    if questions.is_empty() {
        return Err("form should have at least one question".into());
    }
    let mut seen = HashSet::new();
    for q in questions {
        if q.question_key.trim().is_empty() {
            return Err("questionKey must not be empty".into());
        }
        if q.label.trim().is_empty() {
            return Err(format!("question {} has no label", q.question_key));
        }
        if q.airtable_field_id.trim().is_empty() {
            return Err(format!("question {} has no airtableFieldId", q.question_key));
        }
        if !seen.insert(q.question_key.as_str()) {
            return Err(format!("duplicate questionKey {}", q.question_key));
        }
    }
    Ok(())
}

/// Question keys join local answers to upstream fields, so an existing key
/// must keep pointing at the same field.
fn check_keys_stable(existing: &[Question], updated: &[Question]) -> Result<(), String> {
    for q in updated {
        if let Some(old) = existing.iter().find(|o| o.question_key == q.question_key) {
            if old.airtable_field_id != q.airtable_field_id {
                return Err(format!(
                    "question {} cannot move to a different field",
                    q.question_key
                ));
            }
        }
    }
    Ok(())
}

/// GET /api/forms?userId=
pub(crate) async fn handle_list_forms(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListFormsQuery>,
) -> Response {
    match state.store.list_forms(query.user_id.as_deref()).await {
        Ok(forms) => (StatusCode::OK, Json(json!({ "forms": forms }))).into_response(),
        Err(e) => storage_error(e),
    }
}

/// POST /api/forms
///
/// The form is created even when webhook registration fails; it then has
/// no `webhookId` and receives no upstream changes.
pub(crate) async fn handle_create_form(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateFormRequest>,
) -> Response {
    if body.form_name.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "formName must not be empty").into_response();
    }
    if body.base_id.is_empty() || body.table_id.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "baseId and tableId are required")
            .into_response();
    }
    if let Err(msg) = check_questions(&body.questions) {
        return json_error(StatusCode::BAD_REQUEST, &msg).into_response();
    }

    let now = now_rfc3339();
    let mut form = Form {
        id: new_id(),
        user_id: body.user_id,
        form_name: body.form_name,
        base_id: body.base_id,
        table_id: body.table_id,
        webhook_id: None,
        questions: body.questions,
        created_at: now.clone(),
        updated_at: now,
    };
    if let Err(e) = state.store.insert_form(form.clone()).await {
        return storage_error(e);
    }
    tracing::info!(form_id = %form.id, base_id = %form.base_id, "created form");

    if let Some(url) = &state.notification_url {
        match state.subscriptions.register(&form, url).await {
            Ok(webhook_id) => form.webhook_id = Some(webhook_id),
            Err(e) => {
                tracing::error!(form_id = %form.id, base_id = %form.base_id, error = %e, "webhook registration failed");
            }
        }
    }

    (StatusCode::CREATED, Json(form)).into_response()
}

/// GET /api/forms/{id}
pub(crate) async fn handle_get_form(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get_form(&id).await {
        Ok(form) => (StatusCode::OK, Json(form)).into_response(),
        Err(e) => storage_error(e),
    }
}

/// PUT /api/forms/{id}
pub(crate) async fn handle_update_form(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateFormRequest>,
) -> Response {
    let mut form = match state.store.get_form(&id).await {
        Ok(form) => form,
        Err(e) => return storage_error(e),
    };

    if let Some(name) = body.form_name {
        if name.trim().is_empty() {
            return json_error(StatusCode::BAD_REQUEST, "formName must not be empty")
                .into_response();
        }
        form.form_name = name;
    }
    if let Some(questions) = body.questions {
        if let Err(msg) =
            check_questions(&questions).and_then(|()| check_keys_stable(&form.questions, &questions))
        {
            return json_error(StatusCode::BAD_REQUEST, &msg).into_response();
        }
        form.questions = questions;
    }
    form.updated_at = now_rfc3339();

    match state.store.update_form(form.clone()).await {
        Ok(()) => (StatusCode::OK, Json(form)).into_response(),
        Err(e) => storage_error(e),
    }
}

/// DELETE /api/forms/{id}
///
/// Mirrored responses are kept.
pub(crate) async fn handle_delete_form(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let form = match state.store.get_form(&id).await {
        Ok(form) => form,
        Err(e) => return storage_error(e),
    };
    state.subscriptions.unregister(&form).await;
    match state.store.delete_form(&id).await {
        Ok(()) => {
            tracing::info!(form_id = %id, "deleted form");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => storage_error(e),
    }
}

/// GET /api/forms/{id}/view
///
/// Only what a renderer needs; owner and upstream ids stay private.
pub(crate) async fn handle_view_form(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get_form(&id).await {
        Ok(form) => (
            StatusCode::OK,
            Json(json!({
                "id": form.id,
                "formName": form.form_name,
                "questions": form.questions,
            })),
        )
            .into_response(),
        Err(e) => storage_error(e),
    }
}

// ──────────────────────────────────────────────
// Responses
// ──────────────────────────────────────────────

#[derive(Deserialize)]
pub(crate) struct SubmitRequest {
    answers: Answers,
}

/// POST /api/forms/{id}/responses
pub(crate) async fn handle_submit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SubmitRequest>,
) -> Response {
    let form = match state.store.get_form(&id).await {
        Ok(form) => form,
        Err(e) => return storage_error(e),
    };

    match state.submissions.submit(&form, body.answers).await {
        Ok(response) => (
            StatusCode::CREATED,
            Json(json!({
                "id": response.id,
                "airtableRecordId": response.airtable_record_id,
            })),
        )
            .into_response(),
        Err(SubmissionError::Invalid(errors)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "validation failed",
                "details": errors.messages,
            })),
        )
            .into_response(),
        Err(SubmissionError::Storage(e)) => storage_error(e),
        Err(e) => {
            tracing::error!(form_id = %form.id, error = %e, "submission failed");
            let status = match &e {
                SubmissionError::Upstream(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            json_error(status, &e.to_string()).into_response()
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListResponsesQuery {
    #[serde(default)]
    include_deleted: bool,
}

fn preview_value(value: &Value) -> String {
    match value {
        Value::Array(items) => format!("{} items", items.len()),
        Value::String(s) if s.chars().count() > PREVIEW_MAX_CHARS => {
            let head: String = s.chars().take(PREVIEW_MAX_CHARS).collect();
            format!("{head}...")
        }
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// The first few answered questions, in question order.
fn preview(form: &Form, answers: &Answers) -> Vec<Value> {
    form.questions
        .iter()
        .filter_map(|q| {
            answers.get(&q.question_key).map(|v| {
                json!({
                    "questionKey": q.question_key,
                    "label": q.label,
                    "value": preview_value(v),
                })
            })
        })
        .take(PREVIEW_FIELDS)
        .collect()
}

/// GET /api/forms/{id}/responses?includeDeleted=
pub(crate) async fn handle_list_responses(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ListResponsesQuery>,
) -> Response {
    let form = match state.store.get_form(&id).await {
        Ok(form) => form,
        Err(e) => return storage_error(e),
    };
    let responses = match state.store.list_responses(&id, query.include_deleted).await {
        Ok(responses) => responses,
        Err(e) => return storage_error(e),
    };

    let items: Vec<Value> = responses
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "airtableRecordId": r.airtable_record_id,
                "status": "submitted",
                "deletedInAirtable": r.deleted_in_airtable,
                "createdAt": r.created_at,
                "updatedAt": r.updated_at,
                "preview": preview(&form, &r.answers),
                "answers": r.answers,
            })
        })
        .collect();

    (
        StatusCode::OK,
        Json(json!({ "formId": form.id, "responses": items })),
    )
        .into_response()
}
