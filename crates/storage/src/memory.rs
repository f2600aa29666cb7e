//! In-memory `FormStore` backend.
//!
//! All state lives behind one `tokio::sync::RwLock`. Answer patches are
//! merged key by key under the write lock, so concurrent partial updates to
//! disjoint keys of the same response commute.

use std::collections::HashMap;

use async_trait::async_trait;
use formsync_core::{merge_answers, Answers, Form, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::record::{OAuthStateRecord, UserRecord};
use crate::traits::FormStore;

/// Initial contents for a [`MemoryStore`], typically loaded from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedData {
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(default)]
    pub forms: Vec<Form>,
    #[serde(default)]
    pub responses: Vec<Response>,
}

#[derive(Default)]
struct Inner {
    forms: HashMap<String, Form>,
    responses: HashMap<String, Response>,
    users: HashMap<String, UserRecord>,
    oauth_states: HashMap<String, OAuthStateRecord>,
}

/// A process-local `FormStore`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `seed`. Later entries with the same
    /// id replace earlier ones.
    pub fn from_seed(seed: SeedData) -> Self {
        let mut inner = Inner::default();
        for user in seed.users {
            inner.users.insert(user.user_id.clone(), user);
        }
        for form in seed.forms {
            inner.forms.insert(form.id.clone(), form);
        }
        for response in seed.responses {
            inner.responses.insert(response.id.clone(), response);
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Export the current contents in seed form.
    pub async fn export(&self) -> SeedData {
        let inner = self.inner.read().await;
        let mut users: Vec<UserRecord> = inner.users.values().cloned().collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        let mut forms: Vec<Form> = inner.forms.values().cloned().collect();
        forms.sort_by(|a, b| a.id.cmp(&b.id));
        let mut responses: Vec<Response> = inner.responses.values().cloned().collect();
        responses.sort_by(|a, b| a.id.cmp(&b.id));
        SeedData {
            users,
            forms,
            responses,
        }
    }
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (&str, &str)) {
    items.sort_by(|a, b| {
        let (a_created, a_id) = key(a);
        let (b_created, b_id) = key(b);
        b_created.cmp(a_created).then_with(|| a_id.cmp(b_id))
    });
}

#[async_trait]
impl FormStore for MemoryStore {
    async fn insert_form(&self, form: Form) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        if inner.forms.contains_key(&form.id) {
            return Err(StorageError::FormExists { form_id: form.id });
        }
        inner.forms.insert(form.id.clone(), form);
        Ok(())
    }

    async fn get_form(&self, form_id: &str) -> Result<Form, StorageError> {
        let inner = self.inner.read().await;
        inner
            .forms
            .get(form_id)
            .cloned()
            .ok_or_else(|| StorageError::FormNotFound {
                form_id: form_id.to_string(),
            })
    }

    async fn list_forms(&self, user_id: Option<&str>) -> Result<Vec<Form>, StorageError> {
        let inner = self.inner.read().await;
        let mut forms: Vec<Form> = inner
            .forms
            .values()
            .filter(|f| user_id.map_or(true, |u| f.user_id == u))
            .cloned()
            .collect();
        newest_first(&mut forms, |f| (f.created_at.as_str(), f.id.as_str()));
        Ok(forms)
    }

    async fn list_forms_by_base(&self, base_id: &str) -> Result<Vec<Form>, StorageError> {
        let inner = self.inner.read().await;
        let mut forms: Vec<Form> = inner
            .forms
            .values()
            .filter(|f| f.base_id == base_id)
            .cloned()
            .collect();
        newest_first(&mut forms, |f| (f.created_at.as_str(), f.id.as_str()));
        Ok(forms)
    }

    async fn update_form(&self, form: Form) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        match inner.forms.get_mut(&form.id) {
            Some(stored) => {
                *stored = form;
                Ok(())
            }
            None => Err(StorageError::FormNotFound { form_id: form.id }),
        }
    }

    async fn set_form_webhook(
        &self,
        form_id: &str,
        webhook_id: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let form = inner
            .forms
            .get_mut(form_id)
            .ok_or_else(|| StorageError::FormNotFound {
                form_id: form_id.to_string(),
            })?;
        form.webhook_id = webhook_id.map(|w| w.to_string());
        Ok(())
    }

    async fn delete_form(&self, form_id: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        inner
            .forms
            .remove(form_id)
            .map(|_| ())
            .ok_or_else(|| StorageError::FormNotFound {
                form_id: form_id.to_string(),
            })
    }

    async fn find_form_by_webhook_id(
        &self,
        webhook_id: &str,
    ) -> Result<Option<Form>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .forms
            .values()
            .find(|f| f.webhook_id.as_deref() == Some(webhook_id))
            .cloned())
    }

    async fn insert_response(&self, response: Response) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let duplicate = inner.responses.values().any(|r| {
            r.form_id == response.form_id && r.airtable_record_id == response.airtable_record_id
        });
        if duplicate {
            return Err(StorageError::DuplicateResponse {
                form_id: response.form_id,
                airtable_record_id: response.airtable_record_id,
            });
        }
        inner.responses.insert(response.id.clone(), response);
        Ok(())
    }

    async fn find_response_by_external_record_and_form(
        &self,
        airtable_record_id: &str,
        form_id: &str,
    ) -> Result<Option<Response>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .responses
            .values()
            .find(|r| r.airtable_record_id == airtable_record_id && r.form_id == form_id)
            .cloned())
    }

    async fn upsert_response_answers(
        &self,
        response_id: &str,
        patch: &Answers,
        updated_at: &str,
    ) -> Result<Response, StorageError> {
        let mut inner = self.inner.write().await;
        let response =
            inner
                .responses
                .get_mut(response_id)
                .ok_or_else(|| StorageError::ResponseNotFound {
                    response_id: response_id.to_string(),
                })?;
        merge_answers(&mut response.answers, patch);
        response.updated_at = updated_at.to_string();
        Ok(response.clone())
    }

    async fn mark_response_deleted(
        &self,
        response_id: &str,
        updated_at: &str,
    ) -> Result<Response, StorageError> {
        let mut inner = self.inner.write().await;
        let response =
            inner
                .responses
                .get_mut(response_id)
                .ok_or_else(|| StorageError::ResponseNotFound {
                    response_id: response_id.to_string(),
                })?;
        response.deleted_in_airtable = true;
        response.updated_at = updated_at.to_string();
        Ok(response.clone())
    }

    async fn list_responses(
        &self,
        form_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<Response>, StorageError> {
        let inner = self.inner.read().await;
        let mut responses: Vec<Response> = inner
            .responses
            .values()
            .filter(|r| r.form_id == form_id && (include_deleted || !r.deleted_in_airtable))
            .cloned()
            .collect();
        newest_first(&mut responses, |r| (r.created_at.as_str(), r.id.as_str()));
        Ok(responses)
    }

    async fn put_user(&self, user: UserRecord) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        inner.users.insert(user.user_id.clone(), user);
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(user_id).cloned())
    }

    async fn update_user_tokens(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(user_id)
            .ok_or_else(|| StorageError::UserNotFound {
                user_id: user_id.to_string(),
            })?;
        user.access_token = access_token.to_string();
        if let Some(refresh) = refresh_token {
            user.refresh_token = Some(refresh.to_string());
        }
        Ok(())
    }

    async fn put_oauth_state(&self, record: OAuthStateRecord) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        inner.oauth_states.insert(record.state.clone(), record);
        Ok(())
    }

    async fn take_oauth_state(
        &self,
        state: &str,
        now_unix: i64,
    ) -> Result<Option<OAuthStateRecord>, StorageError> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .oauth_states
            .remove(state)
            .filter(|r| !r.is_expired(now_unix)))
    }

    async fn purge_expired_oauth_states(&self, now_unix: i64) -> Result<usize, StorageError> {
        let mut inner = self.inner.write().await;
        let before = inner.oauth_states.len();
        inner.oauth_states.retain(|_, r| !r.is_expired(now_unix));
        Ok(before - inner.oauth_states.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn seed_round_trips_through_export() {
        let seed: SeedData = serde_json::from_value(json!({
            "users": [{"userId": "u1", "accessToken": "tok"}],
            "forms": [{
                "id": "f1", "userId": "u1", "formName": "F", "baseId": "app1",
                "tableId": "tbl1", "webhookId": "ach1", "questions": []
            }],
            "responses": [{
                "id": "r1", "formId": "f1", "airtableRecordId": "rec1",
                "answers": {"email": "a@b.c"}
            }]
        }))
        .unwrap();

        let store = MemoryStore::from_seed(seed);
        let form = store.find_form_by_webhook_id("ach1").await.unwrap();
        assert_eq!(form.map(|f| f.id), Some("f1".to_string()));

        let exported = store.export().await;
        assert_eq!(exported.users.len(), 1);
        assert_eq!(exported.forms.len(), 1);
        assert_eq!(exported.responses[0].answers["email"], json!("a@b.c"));
    }
}
