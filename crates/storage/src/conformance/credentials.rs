use std::future::Future;

use super::TestResult;
use crate::{FormStore, OAuthStateRecord, StorageError, UserRecord};

pub(super) async fn run_credential_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "credentials",
            "refresh_keeps_refresh_token_when_not_rotated",
            refresh_keeps_refresh_token_when_not_rotated(factory).await,
        ),
        TestResult::from_result(
            "credentials",
            "update_tokens_for_unknown_user_fails",
            update_tokens_for_unknown_user_fails(factory).await,
        ),
        TestResult::from_result(
            "credentials",
            "oauth_state_is_single_use",
            oauth_state_is_single_use(factory).await,
        ),
        TestResult::from_result(
            "credentials",
            "expired_oauth_state_is_unusable",
            expired_oauth_state_is_unusable(factory).await,
        ),
        TestResult::from_result(
            "credentials",
            "purge_removes_only_expired_states",
            purge_removes_only_expired_states(factory).await,
        ),
    ]
}

fn user(user_id: &str, refresh: Option<&str>) -> UserRecord {
    UserRecord {
        user_id: user_id.to_string(),
        access_token: "access-1".to_string(),
        refresh_token: refresh.map(|r| r.to_string()),
    }
}

async fn refresh_keeps_refresh_token_when_not_rotated<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put_user(user("u1", Some("refresh-1")))
        .await
        .map_err(|e| e.to_string())?;

    s.update_user_tokens("u1", "access-2", None)
        .await
        .map_err(|e| e.to_string())?;
    let stored = s
        .get_user("u1")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("user vanished")?;
    if stored.access_token != "access-2" || stored.refresh_token.as_deref() != Some("refresh-1") {
        return Err(format!("unexpected tokens after refresh: {stored:?}"));
    }

    s.update_user_tokens("u1", "access-3", Some("refresh-2"))
        .await
        .map_err(|e| e.to_string())?;
    let stored = s
        .get_user("u1")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("user vanished")?;
    if stored.refresh_token.as_deref() != Some("refresh-2") {
        return Err("rotated refresh token not stored".into());
    }
    Ok(())
}

async fn update_tokens_for_unknown_user_fails<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.update_user_tokens("ghost", "a", None).await {
        Err(StorageError::UserNotFound { user_id }) if user_id == "ghost" => Ok(()),
        other => Err(format!("expected UserNotFound, got {other:?}")),
    }
}

async fn oauth_state_is_single_use<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = OAuthStateRecord::new("state-1".into(), "verifier-1".into(), 1_000);
    s.put_oauth_state(record.clone())
        .await
        .map_err(|e| e.to_string())?;

    let taken = s
        .take_oauth_state("state-1", 1_001)
        .await
        .map_err(|e| e.to_string())?;
    if taken != Some(record) {
        return Err(format!("expected the stored record, got {taken:?}"));
    }
    let again = s
        .take_oauth_state("state-1", 1_002)
        .await
        .map_err(|e| e.to_string())?;
    if again.is_some() {
        return Err("oauth state consumed twice".into());
    }
    Ok(())
}

async fn expired_oauth_state_is_unusable<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let record = OAuthStateRecord::new("state-1".into(), "verifier-1".into(), 1_000);
    let expiry = record.expires_at;
    s.put_oauth_state(record).await.map_err(|e| e.to_string())?;

    let taken = s
        .take_oauth_state("state-1", expiry)
        .await
        .map_err(|e| e.to_string())?;
    if taken.is_some() {
        return Err("expired oauth state was returned".into());
    }
    Ok(())
}

async fn purge_removes_only_expired_states<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put_oauth_state(OAuthStateRecord::new("old".into(), "v".into(), 0))
        .await
        .map_err(|e| e.to_string())?;
    s.put_oauth_state(OAuthStateRecord::new("fresh".into(), "v".into(), 10_000))
        .await
        .map_err(|e| e.to_string())?;

    let removed = s
        .purge_expired_oauth_states(5_000)
        .await
        .map_err(|e| e.to_string())?;
    if removed != 1 {
        return Err(format!("expected 1 purged state, got {removed}"));
    }
    let fresh = s
        .take_oauth_state("fresh", 5_000)
        .await
        .map_err(|e| e.to_string())?;
    if fresh.is_none() {
        return Err("unexpired state was purged".into());
    }
    Ok(())
}
