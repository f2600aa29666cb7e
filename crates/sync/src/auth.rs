//! Single refresh-and-retry around an upstream call.

use std::future::Future;

use crate::api::ApiError;
use crate::tokens::TokenProvider;

/// Run `call` with `token`. If upstream rejects the token, refresh it once
/// through `tokens`, store the new value in `token` and retry the identical
/// call once. A second rejection propagates.
pub async fn with_token_refresh<T, F, Fut>(
    tokens: &dyn TokenProvider,
    user_id: &str,
    token: &mut String,
    mut call: F,
) -> Result<T, ApiError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    match call(token.clone()).await {
        Err(ApiError::Unauthorized) => {
            tracing::info!(user_id, "access token rejected, refreshing once");
            let fresh = tokens.refresh(user_id).await?;
            *token = fresh.clone();
            call(fresh).await
        }
        other => other,
    }
}
