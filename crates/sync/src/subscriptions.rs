//! Webhook subscription lifecycle for forms.

use std::collections::HashSet;
use std::sync::Arc;

use formsync_core::Form;
use formsync_storage::{FormStore, StorageError};

use crate::api::{AirtableApi, ApiError, WebhookSpec};
use crate::auth::with_token_refresh;
use crate::tokens::{TokenError, TokenProvider};

/// Errors from registering a form's webhook.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("no Airtable credentials for user {user_id}")]
    NoCredentials { user_id: String },

    #[error("webhook limit reached on base {base_id} and no orphaned webhooks could be removed")]
    LimitReached { base_id: String },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Registers and removes Airtable webhooks on behalf of form owners.
#[derive(Clone)]
pub struct SubscriptionManager {
    api: Arc<dyn AirtableApi>,
    tokens: Arc<dyn TokenProvider>,
    store: Arc<dyn FormStore>,
}

impl SubscriptionManager {
    pub fn new(
        api: Arc<dyn AirtableApi>,
        tokens: Arc<dyn TokenProvider>,
        store: Arc<dyn FormStore>,
    ) -> Self {
        SubscriptionManager { api, tokens, store }
    }

    /// Register a webhook for `form` and record its id on the form.
    ///
    /// If the base is at its webhook limit, webhooks on the base that no
    /// stored form references are deleted and registration is retried once.
    pub async fn register(
        &self,
        form: &Form,
        notification_url: &str,
    ) -> Result<String, SubscriptionError> {
        let mut token = self.owner_token(&form.user_id).await?;
        let spec = WebhookSpec {
            notification_url: notification_url.to_string(),
            table_id: form.table_id.clone(),
        };

        let webhook_id = match self.try_register(form, &spec, &mut token).await {
            Err(ApiError::WebhookLimit { base_id }) => {
                tracing::warn!(base_id = %base_id, form_id = %form.id, "webhook limit reached, removing orphaned webhooks");
                let removed = self.cleanup_orphans(form, &mut token).await;
                if removed == 0 {
                    return Err(SubscriptionError::LimitReached { base_id });
                }
                tracing::info!(base_id = %base_id, removed, "retrying webhook registration");
                self.try_register(form, &spec, &mut token).await?
            }
            other => other?,
        };

        self.store
            .set_form_webhook(&form.id, Some(&webhook_id))
            .await?;
        tracing::info!(
            form_id = %form.id,
            base_id = %form.base_id,
            webhook_id = %webhook_id,
            "registered webhook"
        );
        Ok(webhook_id)
    }

    /// Best-effort removal of the form's webhook. The stored id is cleared
    /// whether or not upstream deletion succeeds.
    pub async fn unregister(&self, form: &Form) {
        let Some(webhook_id) = form.webhook_id.as_deref() else {
            return;
        };
        match self.owner_token(&form.user_id).await {
            Ok(mut token) => {
                let api = &self.api;
                let base_id = form.base_id.as_str();
                let result = with_token_refresh(
                    self.tokens.as_ref(),
                    &form.user_id,
                    &mut token,
                    |t| async move { api.delete_webhook(&t, base_id, webhook_id).await },
                )
                .await;
                if let Err(e) = result {
                    tracing::warn!(
                        form_id = %form.id,
                        base_id = %form.base_id,
                        webhook_id,
                        error = %e,
                        "failed to delete webhook, continuing"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(form_id = %form.id, error = %e, "no credentials to delete webhook");
            }
        }
        if let Err(e) = self.store.set_form_webhook(&form.id, None).await {
            tracing::warn!(form_id = %form.id, error = %e, "failed to clear webhook id");
        }
    }

    async fn owner_token(&self, user_id: &str) -> Result<String, SubscriptionError> {
        self.tokens
            .access_token(user_id)
            .await?
            .ok_or_else(|| SubscriptionError::NoCredentials {
                user_id: user_id.to_string(),
            })
    }

    async fn try_register(
        &self,
        form: &Form,
        spec: &WebhookSpec,
        token: &mut String,
    ) -> Result<String, ApiError> {
        let api = &self.api;
        let base_id = form.base_id.as_str();
        with_token_refresh(self.tokens.as_ref(), &form.user_id, token, |t| async move {
            api.register_webhook(&t, base_id, spec).await
        })
        .await
    }

    /// Delete every webhook on the form's base that no stored form points
    /// at. Returns how many were deleted.
    async fn cleanup_orphans(&self, form: &Form, token: &mut String) -> usize {
        let api = &self.api;
        let base_id = form.base_id.as_str();
        let listed = with_token_refresh(self.tokens.as_ref(), &form.user_id, token, |t| async move {
            api.list_webhooks(&t, base_id).await
        })
        .await;
        let webhooks = match listed {
            Ok(webhooks) => webhooks,
            Err(e) => {
                tracing::error!(base_id, error = %e, "failed to list webhooks");
                return 0;
            }
        };
        let active: HashSet<String> = match self.store.list_forms_by_base(base_id).await {
            Ok(forms) => forms.into_iter().filter_map(|f| f.webhook_id).collect(),
            Err(e) => {
                tracing::error!(base_id, error = %e, "failed to list forms for base");
                return 0;
            }
        };

        let mut removed = 0;
        for webhook in webhooks.iter().filter(|w| !active.contains(&w.id)) {
            let hook_id = webhook.id.as_str();
            let deleted = with_token_refresh(self.tokens.as_ref(), &form.user_id, token, |t| async move {
                api.delete_webhook(&t, base_id, hook_id).await
            })
            .await;
            match deleted {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::error!(base_id, webhook_id = hook_id, error = %e, "failed to delete orphaned webhook");
                }
            }
        }
        removed
    }
}
