//! Service configuration read from the environment at startup.

use formsync_sync::{OAuthSettings, DEFAULT_API_URL, DEFAULT_AUTHORIZE_URL};

/// Default rate limit for public submissions: 60 requests per minute per IP.
pub(crate) const DEFAULT_RATE_LIMIT: u64 = 60;

pub(crate) const DEFAULT_TOKEN_URL: &str = "https://airtable.com/oauth2/v1/token";

/// Path the upstream service posts webhook notifications to.
pub(crate) const WEBHOOK_PATH: &str = "/webhooks/airtable";

/// Where the sign-in flow starts and where Airtable redirects back to.
pub(crate) const OAUTH_START_PATH: &str = "/auth/airtable";
pub(crate) const OAUTH_CALLBACK_PATH: &str = "/auth/airtable/callback";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Config {
    /// Required on the management API when set. `None` disables auth.
    pub(crate) api_key: Option<String>,
    pub(crate) rate_limit: u64,
    /// Externally reachable base URL of this service.
    pub(crate) public_url: Option<String>,
    pub(crate) api_url: String,
    pub(crate) token_url: String,
    pub(crate) authorize_url: String,
    pub(crate) client_id: Option<String>,
    pub(crate) client_secret: Option<String>,
}

impl Config {
    pub(crate) fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. Empty values count
    /// as unset.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Config {
            api_key: var("FORMSYNC_API_KEY"),
            rate_limit: var("FORMSYNC_RATE_LIMIT")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_RATE_LIMIT),
            public_url: var("FORMSYNC_PUBLIC_URL").map(|u| u.trim_end_matches('/').to_string()),
            api_url: var("AIRTABLE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            token_url: var("AIRTABLE_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            authorize_url: var("AIRTABLE_AUTHORIZE_URL")
                .unwrap_or_else(|| DEFAULT_AUTHORIZE_URL.to_string()),
            client_id: var("AIRTABLE_CLIENT_ID"),
            client_secret: var("AIRTABLE_CLIENT_SECRET"),
        }
    }

    /// Where upstream should deliver notifications. Airtable only accepts
    /// https endpoints, so anything else disables registration.
    pub(crate) fn notification_url(&self) -> Option<String> {
        self.public_url
            .as_deref()
            .filter(|u| u.starts_with("https://"))
            .map(|u| format!("{u}{WEBHOOK_PATH}"))
    }

    /// Sign-in needs a client id, a client secret and a public URL to
    /// redirect back to.
    pub(crate) fn oauth_settings(&self) -> Option<OAuthSettings> {
        let public_url = self.public_url.as_deref()?;
        self.client_secret.as_ref()?;
        Some(OAuthSettings {
            authorize_url: self.authorize_url.clone(),
            client_id: self.client_id.clone()?,
            redirect_uri: format!("{public_url}{OAUTH_CALLBACK_PATH}"),
        })
    }
}
