//! Scripted collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use formsync_core::{Answers, Form, Question, QuestionType, Response};
use formsync_storage::{FormStore, OAuthStateRecord, StorageError, UserRecord};
use serde_json::{json, Map, Value};

use crate::api::{
    AirtableApi, ApiError, BaseInfo, Cursor, PayloadPage, TableInfo, WebhookInfo, WebhookSpec,
};
use crate::tokens::{TokenError, TokenProvider};

pub(crate) fn sample_form() -> Form {
    Form {
        id: "form1".into(),
        user_id: "u1".into(),
        form_name: "Signup".into(),
        base_id: "app1".into(),
        table_id: "tbl1".into(),
        webhook_id: Some("ach1".into()),
        questions: vec![Question {
            question_key: "email".into(),
            airtable_field_id: "fldXYZ".into(),
            label: "Email".into(),
            kind: QuestionType::SingleLineText,
            required: true,
            options: None,
            conditional_logic_rules: None,
        }],
        created_at: "2025-01-01T00:00:00Z".into(),
        updated_at: "2025-01-01T00:00:00Z".into(),
    }
}

pub(crate) fn sample_response(id: &str, form_id: &str, record_id: &str) -> Response {
    let mut answers = Answers::new();
    answers.insert("name".into(), json!("Ada"));
    Response {
        id: id.into(),
        form_id: form_id.into(),
        airtable_record_id: record_id.into(),
        answers,
        deleted_in_airtable: false,
        created_at: "2025-01-01T00:00:00Z".into(),
        updated_at: "2025-01-01T00:00:00Z".into(),
    }
}

// ── Tokens ───────────────────────────────────────────────────────────────────

/// Knows one user, `u1`, whose stored token is `"tok"`. Refresh hands out a
/// fixed token, or fails when built with [`CountingTokens::failing`].
pub(crate) struct CountingTokens {
    fresh: Option<String>,
    refreshes: AtomicUsize,
}

impl CountingTokens {
    pub(crate) fn new(fresh: &str) -> Self {
        CountingTokens {
            fresh: Some(fresh.to_string()),
            refreshes: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        CountingTokens {
            fresh: None,
            refreshes: AtomicUsize::new(0),
        }
    }

    pub(crate) fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for CountingTokens {
    async fn access_token(&self, user_id: &str) -> Result<Option<String>, TokenError> {
        Ok((user_id == "u1").then(|| "tok".to_string()))
    }

    async fn refresh(&self, user_id: &str) -> Result<String, TokenError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.fresh.clone().ok_or_else(|| TokenError::NoRefreshToken {
            user_id: user_id.to_string(),
        })
    }
}

// ── Airtable ─────────────────────────────────────────────────────────────────

enum Pages {
    /// Always more data, cursor advancing by one.
    Endless,
    /// Scripted pages, then a 503.
    Scripted(VecDeque<Value>),
}

/// In-process [`AirtableApi`] with scripted payload pages and recorded calls.
pub(crate) struct ScriptedApi {
    pages: Mutex<Pages>,
    rejected_token: Option<String>,
    webhook_limit: AtomicUsize,
    fail_deletes: bool,
    webhooks: Mutex<Vec<String>>,
    tokens_seen: Mutex<Vec<String>>,
    cursors_seen: Mutex<Vec<Option<String>>>,
    deleted: Mutex<Vec<String>>,
    created: Mutex<Vec<Value>>,
    tables: Vec<TableInfo>,
    counter: AtomicUsize,
}

impl ScriptedApi {
    fn with_pages(pages: Pages) -> Self {
        ScriptedApi {
            pages: Mutex::new(pages),
            rejected_token: None,
            webhook_limit: AtomicUsize::new(0),
            fail_deletes: false,
            webhooks: Mutex::new(Vec::new()),
            tokens_seen: Mutex::new(Vec::new()),
            cursors_seen: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            tables: Vec::new(),
            counter: AtomicUsize::new(0),
        }
    }

    pub(crate) fn endless() -> Self {
        Self::with_pages(Pages::Endless)
    }

    pub(crate) fn pages(pages: Vec<Value>) -> Self {
        Self::with_pages(Pages::Scripted(pages.into()))
    }

    /// Answer 401 to every call made with `token`.
    pub(crate) fn rejecting_token(mut self, token: &str) -> Self {
        self.rejected_token = Some(token.to_string());
        self
    }

    /// Fail the next `times` registrations with the webhook-limit error.
    pub(crate) fn with_webhook_limit(self, times: usize) -> Self {
        self.webhook_limit.store(times, Ordering::SeqCst);
        self
    }

    pub(crate) fn with_existing_webhooks(self, ids: &[&str]) -> Self {
        *self.webhooks.lock().unwrap() = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Schema returned for every base.
    pub(crate) fn with_tables(mut self, tables: Vec<Value>) -> Self {
        self.tables = tables
            .into_iter()
            .map(|t| serde_json::from_value(t).unwrap())
            .collect();
        self
    }

    pub(crate) fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    pub(crate) fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen.lock().unwrap().clone()
    }

    pub(crate) fn cursors_seen(&self) -> Vec<Option<String>> {
        self.cursors_seen.lock().unwrap().clone()
    }

    pub(crate) fn deleted_webhooks(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub(crate) fn created_records(&self) -> Vec<Value> {
        self.created.lock().unwrap().clone()
    }

    fn authorize(&self, token: &str) -> Result<(), ApiError> {
        self.tokens_seen.lock().unwrap().push(token.to_string());
        if self.rejected_token.as_deref() == Some(token) {
            return Err(ApiError::Unauthorized);
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl AirtableApi for ScriptedApi {
    async fn fetch_payloads(
        &self,
        token: &str,
        _base_id: &str,
        _webhook_id: &str,
        cursor: Option<&Cursor>,
    ) -> Result<PayloadPage, ApiError> {
        self.authorize(token)?;
        self.cursors_seen
            .lock()
            .unwrap()
            .push(cursor.map(|c| c.as_str().to_string()));

        let mut pages = self.pages.lock().unwrap();
        match &mut *pages {
            Pages::Endless => {
                let next = cursor
                    .and_then(|c| c.as_str().parse::<u64>().ok())
                    .unwrap_or(1)
                    + 1;
                Ok(PayloadPage {
                    payloads: Vec::new(),
                    cursor: Some(Cursor::new(next.to_string())),
                    might_have_more: Some(true),
                    has_more: None,
                })
            }
            Pages::Scripted(queue) => match queue.pop_front() {
                Some(page) => {
                    serde_json::from_value(page).map_err(|e| ApiError::Decode(e.to_string()))
                }
                None => Err(ApiError::Status {
                    status: 503,
                    message: "no more scripted pages".into(),
                }),
            },
        }
    }

    async fn create_record(
        &self,
        token: &str,
        _base_id: &str,
        _table_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<String, ApiError> {
        self.authorize(token)?;
        self.created
            .lock()
            .unwrap()
            .push(Value::Object(fields.clone()));
        Ok(self.next_id("recNew"))
    }

    async fn register_webhook(
        &self,
        token: &str,
        base_id: &str,
        _spec: &WebhookSpec,
    ) -> Result<String, ApiError> {
        self.authorize(token)?;
        let limited = self
            .webhook_limit
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if limited {
            return Err(ApiError::WebhookLimit {
                base_id: base_id.to_string(),
            });
        }
        let id = self.next_id("achNew");
        self.webhooks.lock().unwrap().push(id.clone());
        Ok(id)
    }

    async fn delete_webhook(
        &self,
        token: &str,
        _base_id: &str,
        webhook_id: &str,
    ) -> Result<(), ApiError> {
        self.authorize(token)?;
        if self.fail_deletes {
            return Err(ApiError::Status {
                status: 500,
                message: "delete failed".into(),
            });
        }
        self.webhooks.lock().unwrap().retain(|w| w != webhook_id);
        self.deleted.lock().unwrap().push(webhook_id.to_string());
        Ok(())
    }

    async fn list_webhooks(&self, token: &str, _base_id: &str) -> Result<Vec<WebhookInfo>, ApiError> {
        self.authorize(token)?;
        Ok(self
            .webhooks
            .lock()
            .unwrap()
            .iter()
            .map(|id| WebhookInfo {
                id: id.clone(),
                notification_url: None,
            })
            .collect())
    }

    async fn list_bases(&self, token: &str) -> Result<Vec<BaseInfo>, ApiError> {
        self.authorize(token)?;
        Ok(vec![BaseInfo {
            id: "app1".into(),
            name: "CRM".into(),
            permission_level: Some("create".into()),
        }])
    }

    async fn list_tables(&self, token: &str, _base_id: &str) -> Result<Vec<TableInfo>, ApiError> {
        self.authorize(token)?;
        Ok(self.tables.clone())
    }

    async fn whoami(&self, token: &str) -> Result<String, ApiError> {
        self.authorize(token)?;
        Ok("usr1".into())
    }
}

// ── Storage ──────────────────────────────────────────────────────────────────

/// A store whose every operation fails.
pub(crate) struct FailingStore;

fn down<T>() -> Result<T, StorageError> {
    Err(StorageError::Backend("store unavailable".into()))
}

#[async_trait]
impl FormStore for FailingStore {
    async fn insert_form(&self, _form: Form) -> Result<(), StorageError> {
        down()
    }
    async fn get_form(&self, _form_id: &str) -> Result<Form, StorageError> {
        down()
    }
    async fn list_forms(&self, _user_id: Option<&str>) -> Result<Vec<Form>, StorageError> {
        down()
    }
    async fn list_forms_by_base(&self, _base_id: &str) -> Result<Vec<Form>, StorageError> {
        down()
    }
    async fn update_form(&self, _form: Form) -> Result<(), StorageError> {
        down()
    }
    async fn set_form_webhook(
        &self,
        _form_id: &str,
        _webhook_id: Option<&str>,
    ) -> Result<(), StorageError> {
        down()
    }
    async fn delete_form(&self, _form_id: &str) -> Result<(), StorageError> {
        down()
    }
    async fn find_form_by_webhook_id(
        &self,
        _webhook_id: &str,
    ) -> Result<Option<Form>, StorageError> {
        down()
    }
    async fn insert_response(&self, _response: Response) -> Result<(), StorageError> {
        down()
    }
    async fn find_response_by_external_record_and_form(
        &self,
        _airtable_record_id: &str,
        _form_id: &str,
    ) -> Result<Option<Response>, StorageError> {
        down()
    }
    async fn upsert_response_answers(
        &self,
        _response_id: &str,
        _patch: &Answers,
        _updated_at: &str,
    ) -> Result<Response, StorageError> {
        down()
    }
    async fn mark_response_deleted(
        &self,
        _response_id: &str,
        _updated_at: &str,
    ) -> Result<Response, StorageError> {
        down()
    }
    async fn list_responses(
        &self,
        _form_id: &str,
        _include_deleted: bool,
    ) -> Result<Vec<Response>, StorageError> {
        down()
    }
    async fn put_user(&self, _user: UserRecord) -> Result<(), StorageError> {
        down()
    }
    async fn get_user(&self, _user_id: &str) -> Result<Option<UserRecord>, StorageError> {
        down()
    }
    async fn update_user_tokens(
        &self,
        _user_id: &str,
        _access_token: &str,
        _refresh_token: Option<&str>,
    ) -> Result<(), StorageError> {
        down()
    }
    async fn put_oauth_state(&self, _record: OAuthStateRecord) -> Result<(), StorageError> {
        down()
    }
    async fn take_oauth_state(
        &self,
        _state: &str,
        _now_unix: i64,
    ) -> Result<Option<OAuthStateRecord>, StorageError> {
        down()
    }
    async fn purge_expired_oauth_states(&self, _now_unix: i64) -> Result<usize, StorageError> {
        down()
    }
}
