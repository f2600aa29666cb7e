use serde::{Deserialize, Serialize};

/// Stored Airtable credentials for one form owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// In-flight OAuth authorization state.
///
/// Keyed by an opaque random `state` token. A record is consumed at most once
/// and is unusable after `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthStateRecord {
    pub state: String,
    pub code_verifier: String,
    /// Unix timestamp (seconds).
    pub expires_at: i64,
}

/// Lifetime of an OAuth state record: 10 minutes.
pub const OAUTH_STATE_TTL_SECS: i64 = 600;

impl OAuthStateRecord {
    pub fn new(state: String, code_verifier: String, now_unix: i64) -> Self {
        Self {
            state,
            code_verifier,
            expires_at: now_unix + OAUTH_STATE_TTL_SECS,
        }
    }

    pub fn is_expired(&self, now_unix: i64) -> bool {
        now_unix >= self.expires_at
    }
}
