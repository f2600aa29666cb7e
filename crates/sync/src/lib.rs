//! formsync-sync: everything that talks to Airtable.
//!
//! - [`api`] / [`http`] -- the upstream API trait and its ureq client
//! - [`tokens`] / [`auth`] -- access tokens and the single refresh-and-retry rule
//! - [`fetcher`] / [`pipeline`] -- paginated payload pulls for one notification
//! - [`changes`] / [`engine`] -- payload normalization and reconciliation
//! - [`subscriptions`] -- webhook registration per form
//! - [`submission`] -- public submissions written upstream and mirrored locally
//! - [`catalog`] -- bases, tables and supported fields for the form builder
//! - [`oauth`] -- PKCE sign-in that stores a user's credentials

pub mod api;
pub mod auth;
pub mod catalog;
pub mod changes;
pub mod engine;
pub mod fetcher;
pub mod http;
pub mod oauth;
pub mod pipeline;
pub mod submission;
pub mod subscriptions;
pub mod tokens;

#[cfg(test)]
mod test_support;

pub use api::{
    AirtableApi, ApiError, BaseInfo, Cursor, FieldInfo, PayloadPage, TableInfo, WebhookInfo,
    WebhookSpec,
};
pub use auth::with_token_refresh;
pub use catalog::{CatalogError, CatalogField, CatalogService};
pub use changes::{normalize_payload, ChangeKind, NormalizedPayload, RecordChange};
pub use engine::{ReconcileStats, ReconciliationEngine};
pub use fetcher::{PayloadFetcher, MAX_PAGES};
pub use http::{HttpAirtable, DEFAULT_API_URL};
pub use oauth::{OAuthError, OAuthFlow, OAuthSettings, DEFAULT_AUTHORIZE_URL};
pub use pipeline::{sync_webhook, SyncReport, SyncStop};
pub use submission::{new_id, SubmissionError, SubmissionService};
pub use subscriptions::{SubscriptionError, SubscriptionManager};
pub use tokens::{
    CodeGrant, HttpTokenEndpoint, RefreshGrant, StoreTokenProvider, TokenError, TokenGrant,
    TokenProvider,
};
