//! Upstream Airtable API abstraction.
//!
//! [`AirtableApi`] is the seam between formsync and the Airtable REST API.
//! [`HttpAirtable`](crate::HttpAirtable) talks to the real service; tests
//! plug in scripted implementations.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::tokens::TokenError;

/// Airtable error type returned when a base already carries the maximum
/// number of webhooks for this OAuth integration.
pub const WEBHOOK_LIMIT_ERROR: &str = "TOO_MANY_WEBHOOKS_BY_OAUTH_INTEGRATION_IN_BASE";

// ──────────────────────────────────────────────
// ApiError
// ──────────────────────────────────────────────

/// Errors from an upstream Airtable call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The access token was rejected (HTTP 401).
    #[error("upstream rejected the access token")]
    Unauthorized,

    /// The base already has the maximum number of webhooks.
    #[error("webhook limit reached for base {base_id}")]
    WebhookLimit { base_id: String },

    /// Any other non-success status.
    #[error("upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Connection, TLS or I/O failure.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("failed to decode upstream response: {0}")]
    Decode(String),

    /// Refreshing the access token failed.
    #[error("token refresh failed: {0}")]
    Refresh(#[from] TokenError),
}

// ──────────────────────────────────────────────
// Cursor
// ──────────────────────────────────────────────

/// Opaque pagination position in a webhook payload stream.
///
/// Airtable sends the cursor as a number; it is carried as text so that
/// either encoding round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(raw: impl Into<String>) -> Self {
        Cursor(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(serde_json::Number),
            Text(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Cursor(n.to_string()),
            Raw::Text(s) => Cursor(s),
        })
    }
}

// ──────────────────────────────────────────────
// PayloadPage
// ──────────────────────────────────────────────

/// One page of webhook payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadPage {
    /// Raw payload objects, uninterpreted.
    #[serde(default)]
    pub payloads: Vec<serde_json::Value>,
    #[serde(default)]
    pub cursor: Option<Cursor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub might_have_more: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

impl PayloadPage {
    /// Whether upstream signalled more data under either flag name.
    pub fn more_available(&self) -> bool {
        self.might_have_more.unwrap_or(false) || self.has_more.unwrap_or(false)
    }
}

// ──────────────────────────────────────────────
// Webhooks
// ──────────────────────────────────────────────

/// A webhook registered on a base, as listed by Airtable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookInfo {
    pub id: String,
    #[serde(default)]
    pub notification_url: Option<String>,
}

/// What a new webhook subscription should watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSpec {
    pub notification_url: String,
    /// Record changes outside this table are not reported.
    pub table_id: String,
}

// ──────────────────────────────────────────────
// Schema metadata
// ──────────────────────────────────────────────

/// A base the token can read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_level: Option<String>,
}

/// A table and its full field list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_field_id: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldInfo>,
}

/// A field as described by the schema API. `type` is any Airtable field
/// type, supported or not; `options` is type specific.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

// ──────────────────────────────────────────────
// AirtableApi
// ──────────────────────────────────────────────

/// The Airtable operations formsync depends on.
///
/// Every call takes the bearer token explicitly; refreshing is the caller's
/// job (see [`with_token_refresh`](crate::with_token_refresh)).
#[async_trait]
pub trait AirtableApi: Send + Sync {
    /// Fetch one page of payloads. `None` starts from the oldest backlog.
    async fn fetch_payloads(
        &self,
        token: &str,
        base_id: &str,
        webhook_id: &str,
        cursor: Option<&Cursor>,
    ) -> Result<PayloadPage, ApiError>;

    /// Create a record and return its id.
    async fn create_record(
        &self,
        token: &str,
        base_id: &str,
        table_id: &str,
        fields: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, ApiError>;

    /// Register a webhook and return its id.
    async fn register_webhook(
        &self,
        token: &str,
        base_id: &str,
        spec: &WebhookSpec,
    ) -> Result<String, ApiError>;

    async fn delete_webhook(
        &self,
        token: &str,
        base_id: &str,
        webhook_id: &str,
    ) -> Result<(), ApiError>;

    async fn list_webhooks(&self, token: &str, base_id: &str)
        -> Result<Vec<WebhookInfo>, ApiError>;

    /// Every base the token can read.
    async fn list_bases(&self, token: &str) -> Result<Vec<BaseInfo>, ApiError>;

    /// The tables of a base, fields included.
    async fn list_tables(&self, token: &str, base_id: &str) -> Result<Vec<TableInfo>, ApiError>;

    /// Airtable user id of the token's owner.
    async fn whoami(&self, token: &str) -> Result<String, ApiError>;
}
