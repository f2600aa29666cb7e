//! In-process router harness for handler tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use formsync_storage::{MemoryStore, SeedData};
use formsync_sync::{
    AirtableApi, ApiError, BaseInfo, CodeGrant, Cursor, PayloadPage, RefreshGrant,
    StoreTokenProvider, TableInfo, TokenError, TokenGrant, WebhookInfo, WebhookSpec,
};
use serde_json::{Map, Value};
use tower::ServiceExt;

use super::build_router;
use super::state::AppState;
use crate::config::Config;

/// Upstream stand-in: queued payload pages, recorded writes, a settable
/// table schema. Every token is accepted and belongs to `usrStub`.
#[derive(Default)]
pub(crate) struct StubApi {
    pages: Mutex<VecDeque<PayloadPage>>,
    tables: Mutex<Vec<TableInfo>>,
    fetches: AtomicUsize,
    created: Mutex<Vec<Value>>,
    registered: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
}

impl StubApi {
    /// Queue one page. Fetching past the queue fails with a 503.
    pub(crate) fn push_page(&self, payloads: Vec<Value>, more: bool) {
        let mut pages = self.pages.lock().unwrap();
        let cursor = Cursor::new((pages.len() + 2).to_string());
        pages.push_back(PayloadPage {
            payloads,
            cursor: Some(cursor),
            might_have_more: Some(more),
            has_more: None,
        });
    }

    pub(crate) fn set_tables(&self, tables: Value) {
        *self.tables.lock().unwrap() = serde_json::from_value(tables).unwrap();
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn created_records(&self) -> Vec<Value> {
        self.created.lock().unwrap().clone()
    }

    pub(crate) fn registered(&self) -> Vec<String> {
        self.registered.lock().unwrap().clone()
    }

    pub(crate) fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl AirtableApi for StubApi {
    async fn fetch_payloads(
        &self,
        _token: &str,
        _base_id: &str,
        _webhook_id: &str,
        _cursor: Option<&Cursor>,
    ) -> Result<PayloadPage, ApiError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ApiError::Status {
                status: 503,
                message: "unavailable".into(),
            })
    }

    async fn create_record(
        &self,
        _token: &str,
        _base_id: &str,
        _table_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<String, ApiError> {
        let mut created = self.created.lock().unwrap();
        created.push(Value::Object(fields.clone()));
        Ok(format!("recNew{}", created.len()))
    }

    async fn register_webhook(
        &self,
        _token: &str,
        _base_id: &str,
        spec: &WebhookSpec,
    ) -> Result<String, ApiError> {
        let mut registered = self.registered.lock().unwrap();
        registered.push(spec.notification_url.clone());
        Ok(format!("achNew{}", registered.len()))
    }

    async fn delete_webhook(
        &self,
        _token: &str,
        _base_id: &str,
        webhook_id: &str,
    ) -> Result<(), ApiError> {
        self.deleted.lock().unwrap().push(webhook_id.to_string());
        Ok(())
    }

    async fn list_webhooks(&self, _token: &str, _base_id: &str) -> Result<Vec<WebhookInfo>, ApiError> {
        Ok(Vec::new())
    }

    async fn list_bases(&self, _token: &str) -> Result<Vec<BaseInfo>, ApiError> {
        Ok(vec![BaseInfo {
            id: "appStub".into(),
            name: "Stub base".into(),
            permission_level: None,
        }])
    }

    async fn list_tables(&self, _token: &str, _base_id: &str) -> Result<Vec<TableInfo>, ApiError> {
        Ok(self.tables.lock().unwrap().clone())
    }

    async fn whoami(&self, _token: &str) -> Result<String, ApiError> {
        Ok("usrStub".into())
    }
}

/// Refresh is never available; only the code `good-code` is redeemable.
struct StubGrant;

#[async_trait]
impl RefreshGrant for StubGrant {
    async fn exchange(&self, _refresh_token: &str) -> Result<TokenGrant, TokenError> {
        Err(TokenError::NotConfigured)
    }
}

#[async_trait]
impl CodeGrant for StubGrant {
    async fn exchange_code(
        &self,
        code: &str,
        _code_verifier: &str,
        _redirect_uri: &str,
    ) -> Result<TokenGrant, TokenError> {
        if code != "good-code" {
            return Err(TokenError::Exchange("invalid_grant".into()));
        }
        Ok(TokenGrant {
            access_token: "oauth-access".into(),
            refresh_token: Some("oauth-refresh".into()),
        })
    }
}

pub(crate) struct TestApp {
    pub(crate) router: Router,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) api: Arc<StubApi>,
}

pub(crate) struct TestAppBuilder {
    seed: Value,
    vars: Vec<(&'static str, String)>,
}

impl TestAppBuilder {
    pub(crate) fn api_key(mut self, key: &str) -> Self {
        self.vars.push(("FORMSYNC_API_KEY", key.to_string()));
        self
    }

    pub(crate) fn public_url(mut self, url: &str) -> Self {
        self.vars.push(("FORMSYNC_PUBLIC_URL", url.to_string()));
        self
    }

    pub(crate) fn oauth_client(mut self, client_id: &str, client_secret: &str) -> Self {
        self.vars.push(("AIRTABLE_CLIENT_ID", client_id.to_string()));
        self.vars.push(("AIRTABLE_CLIENT_SECRET", client_secret.to_string()));
        self
    }

    pub(crate) fn rate_limit(mut self, limit: u64) -> Self {
        self.vars.push(("FORMSYNC_RATE_LIMIT", limit.to_string()));
        self
    }

    pub(crate) async fn build(self) -> TestApp {
        let vars = self.vars;
        let config = Config::from_lookup(|key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
        });
        let seed: SeedData = serde_json::from_value(self.seed).unwrap();
        let store = Arc::new(MemoryStore::from_seed(seed));
        let api = Arc::new(StubApi::default());
        let grant = Arc::new(StubGrant);
        let tokens = Arc::new(StoreTokenProvider::new(store.clone(), grant.clone()));
        let state = AppState::new(store.clone(), api.clone(), tokens, grant, &config);
        TestApp {
            router: build_router(Arc::new(state)),
            store,
            api,
        }
    }
}

impl TestApp {
    pub(crate) async fn new(seed: Value) -> TestApp {
        Self::builder(seed).build().await
    }

    pub(crate) fn builder(seed: Value) -> TestAppBuilder {
        TestAppBuilder {
            seed,
            vars: Vec::new(),
        }
    }
}

pub(crate) fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub(crate) async fn send_raw(router: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

/// Send and parse the body as JSON (`null` for an empty body).
pub(crate) async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send_raw(router, request).await;
    if body.is_empty() {
        return (status, Value::Null);
    }
    (status, serde_json::from_str(&body).unwrap())
}

pub(crate) async fn send_json(
    router: &Router,
    method: Method,
    uri: &str,
    body: Value,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, request).await
}
