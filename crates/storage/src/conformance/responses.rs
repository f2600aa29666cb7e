use std::future::Future;

use serde_json::json;

use super::{answers_of, make_response, TestResult};
use crate::{FormStore, StorageError};

pub(super) async fn run_response_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "responses",
            "lookup_is_scoped_by_record_and_form",
            lookup_is_scoped_by_record_and_form(factory).await,
        ),
        TestResult::from_result(
            "responses",
            "duplicate_record_in_same_form_rejected",
            duplicate_record_in_same_form_rejected(factory).await,
        ),
        TestResult::from_result(
            "responses",
            "upsert_merges_only_patched_keys",
            upsert_merges_only_patched_keys(factory).await,
        ),
        TestResult::from_result(
            "responses",
            "upsert_same_patch_twice_is_idempotent",
            upsert_same_patch_twice_is_idempotent(factory).await,
        ),
        TestResult::from_result(
            "responses",
            "mark_deleted_sets_flag_and_hides_from_listing",
            mark_deleted_sets_flag_and_hides_from_listing(factory).await,
        ),
        TestResult::from_result(
            "responses",
            "writes_to_missing_response_not_found",
            writes_to_missing_response_not_found(factory).await,
        ),
    ]
}

async fn lookup_is_scoped_by_record_and_form<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.insert_response(make_response("r1", "formA", "rec1", json!({"email": "a@x"})))
        .await
        .map_err(|e| e.to_string())?;
    s.insert_response(make_response("r2", "formB", "rec1", json!({"email": "b@x"})))
        .await
        .map_err(|e| e.to_string())?;

    let found = s
        .find_response_by_external_record_and_form("rec1", "formB")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("expected a response for formB")?;
    if found.id != "r2" {
        return Err(format!("expected r2, got {}", found.id));
    }

    let missing = s
        .find_response_by_external_record_and_form("rec1", "formC")
        .await
        .map_err(|e| e.to_string())?;
    if missing.is_some() {
        return Err("lookup matched a response from another form".into());
    }
    Ok(())
}

async fn duplicate_record_in_same_form_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.insert_response(make_response("r1", "formA", "rec1", json!({})))
        .await
        .map_err(|e| e.to_string())?;
    match s
        .insert_response(make_response("r2", "formA", "rec1", json!({})))
        .await
    {
        Err(StorageError::DuplicateResponse { .. }) => Ok(()),
        other => Err(format!("expected DuplicateResponse, got {other:?}")),
    }
}

async fn upsert_merges_only_patched_keys<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.insert_response(make_response(
        "r1",
        "formA",
        "rec1",
        json!({"email": "old@x", "color": "Red"}),
    ))
    .await
    .map_err(|e| e.to_string())?;

    let updated = s
        .upsert_response_answers(
            "r1",
            &answers_of(json!({"email": "new@x"})),
            "2025-02-01T00:00:00Z",
        )
        .await
        .map_err(|e| e.to_string())?;

    if updated.answers != answers_of(json!({"email": "new@x", "color": "Red"})) {
        return Err(format!("unexpected answers after merge: {:?}", updated.answers));
    }
    if updated.updated_at != "2025-02-01T00:00:00Z" {
        return Err(format!("updated_at not bumped: {}", updated.updated_at));
    }
    if updated.created_at != "2025-01-01T00:00:00Z" {
        return Err("created_at must not change on merge".into());
    }
    Ok(())
}

async fn upsert_same_patch_twice_is_idempotent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.insert_response(make_response("r1", "formA", "rec1", json!({"color": "Red"})))
        .await
        .map_err(|e| e.to_string())?;
    let patch = answers_of(json!({"email": "x@y"}));

    let first = s
        .upsert_response_answers("r1", &patch, "2025-02-01T00:00:00Z")
        .await
        .map_err(|e| e.to_string())?;
    let second = s
        .upsert_response_answers("r1", &patch, "2025-02-01T00:00:01Z")
        .await
        .map_err(|e| e.to_string())?;
    if first.answers != second.answers {
        return Err("second identical patch changed the answers".into());
    }
    Ok(())
}

async fn mark_deleted_sets_flag_and_hides_from_listing<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.insert_response(make_response("r1", "formA", "rec1", json!({"email": "a@x"})))
        .await
        .map_err(|e| e.to_string())?;
    s.insert_response(make_response("r2", "formA", "rec2", json!({})))
        .await
        .map_err(|e| e.to_string())?;

    let deleted = s
        .mark_response_deleted("r1", "2025-02-01T00:00:00Z")
        .await
        .map_err(|e| e.to_string())?;
    if !deleted.deleted_in_airtable {
        return Err("soft-delete flag not set".into());
    }
    if deleted.answers.is_empty() {
        return Err("soft delete must keep the stored answers".into());
    }

    let visible = s
        .list_responses("formA", false)
        .await
        .map_err(|e| e.to_string())?;
    if visible.len() != 1 || visible[0].id != "r2" {
        return Err(format!("expected only r2 visible, got {visible:?}"));
    }
    let all = s
        .list_responses("formA", true)
        .await
        .map_err(|e| e.to_string())?;
    if all.len() != 2 {
        return Err(format!("expected 2 responses including deleted, got {}", all.len()));
    }
    Ok(())
}

async fn writes_to_missing_response_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s
        .upsert_response_answers("ghost", &answers_of(json!({"a": 1})), "2025-01-01T00:00:00Z")
        .await
    {
        Err(StorageError::ResponseNotFound { response_id }) if response_id == "ghost" => {}
        other => return Err(format!("expected ResponseNotFound on upsert, got {other:?}")),
    }
    match s.mark_response_deleted("ghost", "2025-01-01T00:00:00Z").await {
        Err(StorageError::ResponseNotFound { .. }) => Ok(()),
        other => Err(format!("expected ResponseNotFound on delete, got {other:?}")),
    }
}
