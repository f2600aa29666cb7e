use std::future::Future;

use super::{make_form, TestResult};
use crate::{FormStore, StorageError};

pub(super) async fn run_form_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "forms",
            "insert_then_get_form",
            insert_then_get_form(factory).await,
        ),
        TestResult::from_result(
            "forms",
            "insert_duplicate_form_rejected",
            insert_duplicate_form_rejected(factory).await,
        ),
        TestResult::from_result(
            "forms",
            "get_missing_form_not_found",
            get_missing_form_not_found(factory).await,
        ),
        TestResult::from_result(
            "forms",
            "list_forms_filters_owner_newest_first",
            list_forms_filters_owner_newest_first(factory).await,
        ),
        TestResult::from_result(
            "forms",
            "webhook_id_lookup_follows_set_and_clear",
            webhook_id_lookup_follows_set_and_clear(factory).await,
        ),
        TestResult::from_result(
            "forms",
            "update_form_replaces_document",
            update_form_replaces_document(factory).await,
        ),
        TestResult::from_result(
            "forms",
            "delete_form_removes_it",
            delete_form_removes_it(factory).await,
        ),
    ]
}

async fn insert_then_get_form<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let form = make_form("f1", "u1", "2025-01-01T00:00:00Z");
    s.insert_form(form.clone()).await.map_err(|e| e.to_string())?;
    let stored = s.get_form("f1").await.map_err(|e| e.to_string())?;
    if stored != form {
        return Err(format!("stored form differs: {stored:?}"));
    }
    Ok(())
}

async fn insert_duplicate_form_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let form = make_form("f1", "u1", "2025-01-01T00:00:00Z");
    s.insert_form(form.clone()).await.map_err(|e| e.to_string())?;
    match s.insert_form(form).await {
        Err(StorageError::FormExists { form_id }) if form_id == "f1" => Ok(()),
        other => Err(format!("expected FormExists, got {other:?}")),
    }
}

async fn get_missing_form_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_form("nope").await {
        Err(StorageError::FormNotFound { form_id }) if form_id == "nope" => Ok(()),
        other => Err(format!("expected FormNotFound, got {other:?}")),
    }
}

async fn list_forms_filters_owner_newest_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for (id, user, created) in [
        ("old", "u1", "2025-01-01T00:00:00Z"),
        ("new", "u1", "2025-03-01T00:00:00Z"),
        ("other", "u2", "2025-02-01T00:00:00Z"),
    ] {
        s.insert_form(make_form(id, user, created))
            .await
            .map_err(|e| e.to_string())?;
    }

    let mine: Vec<String> = s
        .list_forms(Some("u1"))
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|f| f.id)
        .collect();
    if mine != ["new", "old"] {
        return Err(format!("expected [new, old], got {mine:?}"));
    }

    let all = s.list_forms(None).await.map_err(|e| e.to_string())?;
    if all.len() != 3 {
        return Err(format!("expected 3 forms, got {}", all.len()));
    }

    let by_base = s
        .list_forms_by_base("appBase")
        .await
        .map_err(|e| e.to_string())?;
    if by_base.len() != 3 {
        return Err(format!("expected 3 forms on base, got {}", by_base.len()));
    }
    Ok(())
}

async fn webhook_id_lookup_follows_set_and_clear<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.insert_form(make_form("f1", "u1", "2025-01-01T00:00:00Z"))
        .await
        .map_err(|e| e.to_string())?;

    if s.find_form_by_webhook_id("ach1")
        .await
        .map_err(|e| e.to_string())?
        .is_some()
    {
        return Err("webhook lookup matched before registration".into());
    }

    s.set_form_webhook("f1", Some("ach1"))
        .await
        .map_err(|e| e.to_string())?;
    let found = s
        .find_form_by_webhook_id("ach1")
        .await
        .map_err(|e| e.to_string())?;
    if found.map(|f| f.id).as_deref() != Some("f1") {
        return Err("webhook lookup did not find f1".into());
    }

    s.set_form_webhook("f1", None)
        .await
        .map_err(|e| e.to_string())?;
    if s.find_form_by_webhook_id("ach1")
        .await
        .map_err(|e| e.to_string())?
        .is_some()
    {
        return Err("webhook lookup matched after clearing".into());
    }
    Ok(())
}

async fn update_form_replaces_document<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut form = make_form("f1", "u1", "2025-01-01T00:00:00Z");
    s.insert_form(form.clone()).await.map_err(|e| e.to_string())?;

    form.form_name = "Renamed".to_string();
    s.update_form(form).await.map_err(|e| e.to_string())?;
    let stored = s.get_form("f1").await.map_err(|e| e.to_string())?;
    if stored.form_name != "Renamed" {
        return Err(format!("expected renamed form, got {}", stored.form_name));
    }

    match s.update_form(make_form("ghost", "u1", "2025-01-01T00:00:00Z")).await {
        Err(StorageError::FormNotFound { .. }) => Ok(()),
        other => Err(format!("expected FormNotFound for ghost, got {other:?}")),
    }
}

async fn delete_form_removes_it<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.insert_form(make_form("f1", "u1", "2025-01-01T00:00:00Z"))
        .await
        .map_err(|e| e.to_string())?;
    s.delete_form("f1").await.map_err(|e| e.to_string())?;
    match s.get_form("f1").await {
        Err(StorageError::FormNotFound { .. }) => Ok(()),
        other => Err(format!("expected FormNotFound after delete, got {other:?}")),
    }
}
