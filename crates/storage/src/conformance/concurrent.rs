use std::future::Future;
use std::sync::Arc;

use serde_json::json;

use super::{answers_of, make_form, make_response, TestResult};
use crate::FormStore;

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "disjoint_patches_to_one_response_all_survive",
            disjoint_patches_to_one_response_all_survive(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "patches_to_different_responses_all_succeed",
            patches_to_different_responses_all_succeed(factory).await,
        ),
    ]
}

// ── Disjoint keys commute ────────────────────────────────────────────────────

/// N tasks each patch a different key of the same response. Every key must be
/// present afterwards: a whole-document replace would lose all but one.
async fn disjoint_patches_to_one_response_all_survive<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    storage
        .insert_response(make_response("r1", "formA", "rec1", json!({"base": true})))
        .await
        .map_err(|e| format!("insert: {e}"))?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let patch = answers_of(json!({ format!("k{i}"): i }));
            s.upsert_response_answers("r1", &patch, "2025-02-01T00:00:00Z")
                .await
                .map(|_| ())
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
    }

    let stored = storage
        .find_response_by_external_record_and_form("rec1", "formA")
        .await
        .map_err(|e| format!("lookup: {e}"))?
        .ok_or("response vanished")?;
    for i in 0..N {
        let key = format!("k{i}");
        if stored.answers.get(&key) != Some(&json!(i)) {
            return Err(format!("patch for {key} was lost: {:?}", stored.answers));
        }
    }
    if stored.answers.get("base") != Some(&json!(true)) {
        return Err("pre-existing key was lost".into());
    }
    Ok(())
}

// ── Independent responses ────────────────────────────────────────────────────

/// N tasks each patch a different response of different forms. All succeed.
async fn patches_to_different_responses_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    for i in 0..N {
        storage
            .insert_form(make_form(&format!("f{i}"), "u1", "2025-01-01T00:00:00Z"))
            .await
            .map_err(|e| format!("insert form: {e}"))?;
        storage
            .insert_response(make_response(
                &format!("r{i}"),
                &format!("f{i}"),
                "recShared",
                json!({}),
            ))
            .await
            .map_err(|e| format!("insert response: {e}"))?;
    }

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let patch = answers_of(json!({"email": format!("user{i}@x")}));
            s.upsert_response_answers(&format!("r{i}"), &patch, "2025-02-01T00:00:00Z")
                .await
                .map(|_| ())
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
    }

    for i in 0..N {
        let stored = storage
            .find_response_by_external_record_and_form("recShared", &format!("f{i}"))
            .await
            .map_err(|e| format!("lookup: {e}"))?
            .ok_or_else(|| format!("response for f{i} vanished"))?;
        if stored.answers.get("email") != Some(&json!(format!("user{i}@x"))) {
            return Err(format!("response r{i} got the wrong patch: {:?}", stored.answers));
        }
    }
    Ok(())
}
