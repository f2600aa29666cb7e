//! Page-at-a-time retrieval of webhook payloads.

use std::sync::Arc;

use crate::api::{AirtableApi, ApiError, Cursor, PayloadPage};
use crate::auth::with_token_refresh;
use crate::tokens::TokenProvider;

/// Upper bound on pages pulled for one notification.
pub const MAX_PAGES: usize = 100;

/// Fetches payload pages on behalf of one user.
///
/// The fetcher owns the user's current access token. A refresh triggered by
/// one page is kept for every later page.
pub struct PayloadFetcher {
    api: Arc<dyn AirtableApi>,
    tokens: Arc<dyn TokenProvider>,
    user_id: String,
    access_token: String,
}

impl PayloadFetcher {
    pub fn new(
        api: Arc<dyn AirtableApi>,
        tokens: Arc<dyn TokenProvider>,
        user_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        PayloadFetcher {
            api,
            tokens,
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }

    /// Fetch one page. `None` requests the oldest backlog.
    pub async fn fetch(
        &mut self,
        base_id: &str,
        webhook_id: &str,
        cursor: Option<&Cursor>,
    ) -> Result<PayloadPage, ApiError> {
        let api = &self.api;
        with_token_refresh(
            self.tokens.as_ref(),
            &self.user_id,
            &mut self.access_token,
            |token| async move {
                api.fetch_payloads(&token, base_id, webhook_id, cursor)
                    .await
            },
        )
        .await
    }

    /// The token the next request will use.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CountingTokens, ScriptedApi};

    #[tokio::test]
    async fn refreshed_token_is_kept_for_later_pages() {
        let api = Arc::new(ScriptedApi::endless().rejecting_token("stale"));
        let tokens = Arc::new(CountingTokens::new("fresh"));
        let mut fetcher = PayloadFetcher::new(api.clone(), tokens.clone(), "u1", "stale");

        fetcher.fetch("app1", "ach1", None).await.unwrap();
        let next = Cursor::new("1");
        fetcher.fetch("app1", "ach1", Some(&next)).await.unwrap();

        assert_eq!(fetcher.access_token(), "fresh");
        assert_eq!(tokens.refreshes(), 1);
        assert_eq!(api.tokens_seen(), ["stale", "fresh", "fresh"]);
    }

    #[tokio::test]
    async fn first_request_starts_without_cursor() {
        let api = Arc::new(ScriptedApi::endless());
        let tokens = Arc::new(CountingTokens::new("fresh"));
        let mut fetcher = PayloadFetcher::new(api.clone(), tokens, "u1", "tok");

        fetcher.fetch("app1", "ach1", None).await.unwrap();
        assert_eq!(api.cursors_seen(), [None]);
    }

    #[tokio::test]
    async fn failed_refresh_surfaces_as_refresh_error() {
        let api = Arc::new(ScriptedApi::endless().rejecting_token("stale"));
        let tokens = Arc::new(CountingTokens::failing());
        let mut fetcher = PayloadFetcher::new(api, tokens, "u1", "stale");

        let err = fetcher.fetch("app1", "ach1", None).await.unwrap_err();
        assert!(matches!(err, ApiError::Refresh(_)));
    }
}
