//! Public form submission: validate, write upstream, mirror locally.

use std::sync::Arc;

use formsync_core::{
    answers_to_external_fields, validate_submission, Answers, Form, Response, ValidationErrors,
};
use formsync_storage::{now_rfc3339, FormStore, StorageError};

use crate::api::{AirtableApi, ApiError};
use crate::auth::with_token_refresh;
use crate::tokens::{TokenError, TokenProvider};

/// Errors from submitting a response.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Invalid(#[from] ValidationErrors),

    #[error("form owner {user_id} has no Airtable credentials")]
    NoCredentials { user_id: String },

    #[error("failed to create Airtable record: {0}")]
    Upstream(#[from] ApiError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Fresh random identifier for a locally created record.
pub fn new_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Turns validated answers into an Airtable record and a local [`Response`].
#[derive(Clone)]
pub struct SubmissionService {
    api: Arc<dyn AirtableApi>,
    tokens: Arc<dyn TokenProvider>,
    store: Arc<dyn FormStore>,
}

impl SubmissionService {
    pub fn new(
        api: Arc<dyn AirtableApi>,
        tokens: Arc<dyn TokenProvider>,
        store: Arc<dyn FormStore>,
    ) -> Self {
        SubmissionService { api, tokens, store }
    }

    /// Submit `answers` to `form`.
    ///
    /// Answers are validated against the questions visible for these
    /// answers, written to the form's table with the owner's credentials,
    /// and stored locally under the new record id.
    pub async fn submit(&self, form: &Form, answers: Answers) -> Result<Response, SubmissionError> {
        validate_submission(form, &answers)?;

        let mut token = self
            .tokens
            .access_token(&form.user_id)
            .await?
            .ok_or_else(|| SubmissionError::NoCredentials {
                user_id: form.user_id.clone(),
            })?;

        let fields = answers_to_external_fields(&answers, &form.questions);
        let api = &self.api;
        let (base_id, table_id) = (form.base_id.as_str(), form.table_id.as_str());
        let fields_ref = &fields;
        let record_id = with_token_refresh(
            self.tokens.as_ref(),
            &form.user_id,
            &mut token,
            |t| async move { api.create_record(&t, base_id, table_id, fields_ref).await },
        )
        .await?;

        let now = now_rfc3339();
        let response = Response {
            id: new_id(),
            form_id: form.id.clone(),
            airtable_record_id: record_id,
            answers,
            deleted_in_airtable: false,
            created_at: now.clone(),
            updated_at: now,
        };
        self.store.insert_response(response.clone()).await?;
        tracing::info!(
            form_id = %form.id,
            record_id = %response.airtable_record_id,
            "stored submitted response"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_form, CountingTokens, ScriptedApi};
    use formsync_storage::MemoryStore;
    use serde_json::json;

    fn service(api: ScriptedApi) -> (SubmissionService, Arc<ScriptedApi>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let api = Arc::new(api);
        let tokens = Arc::new(CountingTokens::new("fresh"));
        (
            SubmissionService::new(api.clone(), tokens, store.clone()),
            api,
            store,
        )
    }

    fn answers(value: serde_json::Value) -> Answers {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn valid_submission_creates_record_and_response() {
        let (service, api, store) = service(ScriptedApi::endless());
        let form = sample_form();

        let response = service
            .submit(&form, answers(json!({"email": "a@b.c"})))
            .await
            .unwrap();

        assert_eq!(api.created_records(), vec![json!({"fldXYZ": "a@b.c"})]);
        let stored = store
            .find_response_by_external_record_and_form(&response.airtable_record_id, &form.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.answers["email"], json!("a@b.c"));
        assert_eq!(response.id.len(), 32);
    }

    #[tokio::test]
    async fn invalid_submission_never_reaches_upstream() {
        let (service, api, _store) = service(ScriptedApi::endless());
        let err = service
            .submit(&sample_form(), answers(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Invalid(_)));
        assert!(api.created_records().is_empty());
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_for_record_creation() {
        let (service, api, _store) = service(ScriptedApi::endless().rejecting_token("tok"));
        service
            .submit(&sample_form(), answers(json!({"email": "a@b.c"})))
            .await
            .unwrap();
        assert_eq!(api.tokens_seen(), ["tok", "fresh"]);
    }

    #[tokio::test]
    async fn owner_without_credentials_is_rejected() {
        let (service, _api, _store) = service(ScriptedApi::endless());
        let mut form = sample_form();
        form.user_id = "nobody".into();
        let err = service
            .submit(&form, answers(json!({"email": "a@b.c"})))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::NoCredentials { .. }));
    }

    #[test]
    fn ids_are_hex_and_distinct() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
