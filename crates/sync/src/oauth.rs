//! Airtable sign-in: OAuth authorization code flow with PKCE.
//!
//! [`OAuthFlow::begin`] stores a fresh state record and returns the
//! authorization URL; [`OAuthFlow::complete`] consumes that record, redeems
//! the code and saves the user's credentials.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use formsync_storage::{FormStore, OAuthStateRecord, StorageError, UserRecord};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::api::{AirtableApi, ApiError};
use crate::tokens::{CodeGrant, TokenError};

/// Default Airtable authorization endpoint.
pub const DEFAULT_AUTHORIZE_URL: &str = "https://airtable.com/oauth2/v1/authorize";

/// Scopes needed to read schemas, write records and manage webhooks.
pub const AIRTABLE_SCOPES: &str =
    "data.records:read data.records:write schema.bases:read webhook:manage";

/// Errors from the sign-in flow.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("OAuth sign-in is not configured")]
    NotConfigured,

    #[error("invalid authorization URL: {0}")]
    InvalidAuthorizeUrl(String),

    #[error("unknown or expired OAuth state")]
    InvalidState,

    #[error("authorization code exchange failed: {0}")]
    Exchange(#[from] TokenError),

    #[error("failed to identify Airtable user: {0}")]
    Upstream(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Client registration details for the authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthSettings {
    pub authorize_url: String,
    pub client_id: String,
    /// Must match the redirect URI registered for the client.
    pub redirect_uri: String,
}

/// 32 random bytes, base64url without padding (43 characters).
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 code challenge for `verifier`.
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[derive(Clone)]
pub struct OAuthFlow {
    store: Arc<dyn FormStore>,
    api: Arc<dyn AirtableApi>,
    grant: Arc<dyn CodeGrant>,
    settings: Option<OAuthSettings>,
}

impl OAuthFlow {
    /// `settings` of `None` leaves sign-in disabled.
    pub fn new(
        store: Arc<dyn FormStore>,
        api: Arc<dyn AirtableApi>,
        grant: Arc<dyn CodeGrant>,
        settings: Option<OAuthSettings>,
    ) -> Self {
        OAuthFlow {
            store,
            api,
            grant,
            settings,
        }
    }

    fn settings(&self) -> Result<&OAuthSettings, OAuthError> {
        self.settings.as_ref().ok_or(OAuthError::NotConfigured)
    }

    /// Start a sign-in. Returns the URL to send the user to.
    pub async fn begin(&self, now_unix: i64) -> Result<String, OAuthError> {
        let settings = self.settings()?;
        let mut url = url::Url::parse(&settings.authorize_url)
            .map_err(|e| OAuthError::InvalidAuthorizeUrl(e.to_string()))?;

        let state = random_token();
        let verifier = random_token();
        let challenge = code_challenge(&verifier);

        url.query_pairs_mut()
            .append_pair("client_id", &settings.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &settings.redirect_uri)
            .append_pair("scope", AIRTABLE_SCOPES)
            .append_pair("state", &state)
            .append_pair("code_challenge", &challenge)
            .append_pair("code_challenge_method", "S256");

        self.store
            .put_oauth_state(OAuthStateRecord::new(state, verifier, now_unix))
            .await?;
        tracing::info!("started Airtable sign-in");
        Ok(url.into())
    }

    /// Finish a sign-in. The state is consumed whether or not the exchange
    /// succeeds.
    pub async fn complete(
        &self,
        state: &str,
        code: &str,
        now_unix: i64,
    ) -> Result<UserRecord, OAuthError> {
        let settings = self.settings()?;
        let record = self
            .store
            .take_oauth_state(state, now_unix)
            .await?
            .ok_or(OAuthError::InvalidState)?;

        let grant = self
            .grant
            .exchange_code(code, &record.code_verifier, &settings.redirect_uri)
            .await?;
        let user_id = self.api.whoami(&grant.access_token).await?;

        let user = UserRecord {
            user_id,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.filter(|t| !t.is_empty()),
        };
        self.store.put_user(user.clone()).await?;
        tracing::info!(user_id = %user.user_id, "completed Airtable sign-in");
        Ok(user)
    }
}
