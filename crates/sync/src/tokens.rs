//! Access-token lookup and refresh.
//!
//! [`TokenProvider`] is what the pipelines see. [`StoreTokenProvider`] backs
//! it with the credentials in a [`FormStore`] and a [`RefreshGrant`] that
//! exchanges a refresh token for a new access token. [`HttpTokenEndpoint`]
//! also redeems authorization codes for the sign-in flow.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use formsync_storage::{FormStore, StorageError};
use serde::Deserialize;

/// Errors from token lookup or refresh.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("no credentials stored for user {user_id}")]
    UserNotFound { user_id: String },

    #[error("no refresh token stored for user {user_id}")]
    NoRefreshToken { user_id: String },

    #[error("OAuth client credentials are not configured")]
    NotConfigured,

    #[error("token exchange failed: {0}")]
    Exchange(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Supplies and renews a user's Airtable access token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// The user's current access token, if any is on file.
    async fn access_token(&self, user_id: &str) -> Result<Option<String>, TokenError>;

    /// Obtain a new access token. Fails if no refresh credential is on file.
    async fn refresh(&self, user_id: &str) -> Result<String, TokenError>;
}

// ──────────────────────────────────────────────
// Refresh grant
// ──────────────────────────────────────────────

/// Tokens returned by the OAuth token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present only when the server rotates the refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Exchanges a refresh token at the OAuth token endpoint.
#[async_trait]
pub trait RefreshGrant: Send + Sync {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant, TokenError>;
}

/// Redeems an authorization code (PKCE) at the OAuth token endpoint.
#[async_trait]
pub trait CodeGrant: Send + Sync {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, TokenError>;
}

/// The Airtable token endpoint, authenticated with HTTP Basic client
/// credentials. Serves both the refresh and the authorization-code grants.
pub struct HttpTokenEndpoint {
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    agent: ureq::Agent,
}

impl HttpTokenEndpoint {
    pub fn new(
        token_url: impl Into<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        HttpTokenEndpoint {
            token_url: token_url.into(),
            client_id,
            client_secret,
            agent: ureq::Agent::config_builder()
                .http_status_as_error(false)
                .build()
                .into(),
        }
    }

    /// POST `params` form-encoded, with the client credentials attached.
    /// The refresh grant also repeats the secret in the body.
    async fn post_form(
        &self,
        params: Vec<(&'static str, String)>,
        secret_in_body: bool,
    ) -> Result<TokenGrant, TokenError> {
        let (client_id, client_secret) = match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => (id.clone(), secret.clone()),
            _ => return Err(TokenError::NotConfigured),
        };
        let agent = self.agent.clone();
        let url = self.token_url.clone();

        tokio::task::spawn_blocking(move || {
            let authorization = basic_auth(&client_id, &client_secret);
            let mut form: Vec<(&str, &str)> =
                params.iter().map(|(k, v)| (*k, v.as_str())).collect();
            form.push(("client_id", client_id.as_str()));
            if secret_in_body {
                form.push(("client_secret", client_secret.as_str()));
            }
            let mut response = agent
                .post(&url)
                .header("Authorization", &authorization)
                .send_form(form)
                .map_err(|e| TokenError::Exchange(e.to_string()))?;

            let status = response.status().as_u16();
            if !(200..300).contains(&status) {
                let body = response.body_mut().read_to_string().unwrap_or_default();
                return Err(TokenError::Exchange(format!("HTTP {status}: {body}")));
            }
            response
                .body_mut()
                .read_json::<TokenGrant>()
                .map_err(|e| TokenError::Exchange(format!("invalid token response: {e}")))
        })
        .await
        .map_err(|e| TokenError::Exchange(format!("task join error: {e}")))?
    }
}

/// `Basic` authorization value for the given client credentials.
pub fn basic_auth(client_id: &str, client_secret: &str) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{client_id}:{client_secret}"))
    )
}

#[async_trait]
impl RefreshGrant for HttpTokenEndpoint {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant, TokenError> {
        let params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];
        self.post_form(params, true).await
    }
}

#[async_trait]
impl CodeGrant for HttpTokenEndpoint {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, TokenError> {
        let params = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("code_verifier", code_verifier.to_string()),
            ("redirect_uri", redirect_uri.to_string()),
        ];
        self.post_form(params, false).await
    }
}

// ──────────────────────────────────────────────
// StoreTokenProvider
// ──────────────────────────────────────────────

/// Token provider over stored user credentials.
///
/// A successful refresh persists the new access token, and the new refresh
/// token when one is issued.
pub struct StoreTokenProvider {
    store: Arc<dyn FormStore>,
    grant: Arc<dyn RefreshGrant>,
}

impl StoreTokenProvider {
    pub fn new(store: Arc<dyn FormStore>, grant: Arc<dyn RefreshGrant>) -> Self {
        StoreTokenProvider { store, grant }
    }
}

#[async_trait]
impl TokenProvider for StoreTokenProvider {
    async fn access_token(&self, user_id: &str) -> Result<Option<String>, TokenError> {
        Ok(self
            .store
            .get_user(user_id)
            .await?
            .map(|u| u.access_token)
            .filter(|t| !t.is_empty()))
    }

    async fn refresh(&self, user_id: &str) -> Result<String, TokenError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| TokenError::UserNotFound {
                user_id: user_id.to_string(),
            })?;
        let refresh_token = user
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TokenError::NoRefreshToken {
                user_id: user_id.to_string(),
            })?;

        let grant = self.grant.exchange(&refresh_token).await?;
        self.store
            .update_user_tokens(
                user_id,
                &grant.access_token,
                grant.refresh_token.as_deref(),
            )
            .await?;
        tracing::info!(user_id, "refreshed Airtable access token");
        Ok(grant.access_token)
    }
}
