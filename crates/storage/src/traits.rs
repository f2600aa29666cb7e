use async_trait::async_trait;
use formsync_core::{Answers, Form, Response};

use crate::error::StorageError;
use crate::record::{OAuthStateRecord, UserRecord};

/// The persistence trait for formsync backends.
///
/// A `FormStore` holds forms (with their embedded questions), the local
/// mirror of submitted responses, form owners' Airtable credentials and
/// in-flight OAuth state.
///
/// ## Partial updates
///
/// `upsert_response_answers` merges the given keys into the stored answer
/// map instead of replacing the document. Two concurrent patches touching
/// disjoint keys must both survive; for overlapping keys the last write wins.
///
/// ## Lookup scope
///
/// Responses are looked up by `(airtable_record_id, form_id)`. Several forms
/// may be bound to the same base/table, so a record id alone is ambiguous.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be shared as
/// `Arc<dyn FormStore>` in axum application state and across tasks.
#[async_trait]
pub trait FormStore: Send + Sync + 'static {
    // ── Forms ────────────────────────────────────────────────────────────────

    /// Insert a new form.
    ///
    /// Returns `Err(StorageError::FormExists)` if the id is taken.
    async fn insert_form(&self, form: Form) -> Result<(), StorageError>;

    /// Read a form by id.
    ///
    /// Returns `Err(StorageError::FormNotFound)` if it does not exist.
    async fn get_form(&self, form_id: &str) -> Result<Form, StorageError>;

    /// List forms, newest first, optionally restricted to one owner.
    async fn list_forms(&self, user_id: Option<&str>) -> Result<Vec<Form>, StorageError>;

    /// List the forms bound to a base.
    async fn list_forms_by_base(&self, base_id: &str) -> Result<Vec<Form>, StorageError>;

    /// Replace a stored form with `form` (matched by id).
    ///
    /// Returns `Err(StorageError::FormNotFound)` if it does not exist.
    async fn update_form(&self, form: Form) -> Result<(), StorageError>;

    /// Set or clear a form's webhook subscription id.
    async fn set_form_webhook(
        &self,
        form_id: &str,
        webhook_id: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Delete a form. Its responses are kept.
    async fn delete_form(&self, form_id: &str) -> Result<(), StorageError>;

    /// Find the form owning a webhook subscription.
    async fn find_form_by_webhook_id(&self, webhook_id: &str)
        -> Result<Option<Form>, StorageError>;

    // ── Responses ────────────────────────────────────────────────────────────

    /// Insert a new response.
    ///
    /// Returns `Err(StorageError::DuplicateResponse)` if a response already
    /// mirrors the same `(form_id, airtable_record_id)`.
    async fn insert_response(&self, response: Response) -> Result<(), StorageError>;

    /// Find the response mirroring an Airtable record within one form.
    async fn find_response_by_external_record_and_form(
        &self,
        airtable_record_id: &str,
        form_id: &str,
    ) -> Result<Option<Response>, StorageError>;

    /// Merge `patch` into a response's answers and set `updated_at`.
    ///
    /// Keys absent from `patch` are left untouched. Returns the stored
    /// response after the merge.
    async fn upsert_response_answers(
        &self,
        response_id: &str,
        patch: &Answers,
        updated_at: &str,
    ) -> Result<Response, StorageError>;

    /// Set the soft-delete flag on a response and set `updated_at`.
    async fn mark_response_deleted(
        &self,
        response_id: &str,
        updated_at: &str,
    ) -> Result<Response, StorageError>;

    /// List a form's responses, newest first.
    async fn list_responses(
        &self,
        form_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<Response>, StorageError>;

    // ── Credentials ──────────────────────────────────────────────────────────

    /// Insert or replace a user's credentials.
    async fn put_user(&self, user: UserRecord) -> Result<(), StorageError>;

    /// Read a user's credentials.
    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, StorageError>;

    /// Store a refreshed access token. A `None` refresh token keeps the
    /// existing one.
    ///
    /// Returns `Err(StorageError::UserNotFound)` if the user is unknown.
    async fn update_user_tokens(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), StorageError>;

    // ── OAuth state ──────────────────────────────────────────────────────────

    /// Persist an in-flight OAuth state record.
    async fn put_oauth_state(&self, record: OAuthStateRecord) -> Result<(), StorageError>;

    /// Remove and return the record for `state` if it has not expired.
    ///
    /// An expired record is removed and `None` is returned.
    async fn take_oauth_state(
        &self,
        state: &str,
        now_unix: i64,
    ) -> Result<Option<OAuthStateRecord>, StorageError>;

    /// Remove every expired OAuth state record. Returns how many were removed.
    async fn purge_expired_oauth_states(&self, now_unix: i64) -> Result<usize, StorageError>;
}
