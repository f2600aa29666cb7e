//! Airtable REST client.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking` to avoid
//! blocking the async runtime. Non-success statuses are decoded from the
//! response body rather than surfaced as transport errors.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use ureq::http::Response;
use ureq::Body;

use crate::api::{
    AirtableApi, ApiError, BaseInfo, Cursor, PayloadPage, TableInfo, WebhookInfo, WebhookSpec,
    WEBHOOK_LIMIT_ERROR,
};

/// Default Airtable REST base URL.
pub const DEFAULT_API_URL: &str = "https://api.airtable.com/v0";

/// [`AirtableApi`] over HTTPS.
#[derive(Clone)]
pub struct HttpAirtable {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpAirtable {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpAirtable {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent: ureq::Agent::config_builder()
                .http_status_as_error(false)
                .build()
                .into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl Default for HttpAirtable {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Run a blocking request on the blocking pool.
async fn blocking<T, F>(call: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| ApiError::Transport(format!("task join error: {}", e)))?
}

/// Classify a finished request: 2xx passes through, everything else becomes
/// an [`ApiError`].
fn check(
    result: Result<Response<Body>, ureq::Error>,
    base_id: &str,
) -> Result<Response<Body>, ApiError> {
    let mut response = result.map_err(|e| ApiError::Transport(e.to_string()))?;
    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(response);
    }
    if status == 401 {
        return Err(ApiError::Unauthorized);
    }
    let body = response.body_mut().read_to_string().unwrap_or_default();
    Err(classify_error(status, &body, base_id))
}

/// Map an error status and body to an [`ApiError`].
///
/// Airtable reports errors as `{"error": {"type", "message"}}`,
/// `{"error": "TYPE"}` or a bare `{"type", "message"}` object.
pub(crate) fn classify_error(status: u16, body: &str, base_id: &str) -> ApiError {
    if status == 401 {
        return ApiError::Unauthorized;
    }
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let detail = match parsed.get("error") {
        Some(Value::Object(obj)) => Some(obj),
        _ => parsed.as_object(),
    };
    let error_type = detail
        .and_then(|d| d.get("type"))
        .and_then(Value::as_str)
        .or_else(|| parsed.get("error").and_then(Value::as_str));

    if error_type == Some(WEBHOOK_LIMIT_ERROR) {
        return ApiError::WebhookLimit {
            base_id: base_id.to_string(),
        };
    }

    let message = detail
        .and_then(|d| d.get("message"))
        .and_then(Value::as_str)
        .or(error_type)
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(200).collect());
    ApiError::Status { status, message }
}

fn decode<T: DeserializeOwned>(mut response: Response<Body>) -> Result<T, ApiError> {
    response
        .body_mut()
        .read_json::<T>()
        .map_err(|e| ApiError::Decode(e.to_string()))
}

#[derive(Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Deserialize)]
struct WebhookList {
    #[serde(default)]
    webhooks: Vec<WebhookInfo>,
}

#[derive(Deserialize)]
struct BaseList {
    #[serde(default)]
    bases: Vec<BaseInfo>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Deserialize)]
struct TableList {
    #[serde(default)]
    tables: Vec<TableInfo>,
}

#[async_trait]
impl AirtableApi for HttpAirtable {
    async fn fetch_payloads(
        &self,
        token: &str,
        base_id: &str,
        webhook_id: &str,
        cursor: Option<&Cursor>,
    ) -> Result<PayloadPage, ApiError> {
        let url = self.url(&format!("bases/{base_id}/webhooks/{webhook_id}/payloads"));
        let agent = self.agent.clone();
        let auth = bearer(token);
        let cursor = cursor.map(|c| c.as_str().to_string());
        let base_id = base_id.to_string();

        blocking(move || {
            let mut request = agent.get(&url).header("Authorization", &auth);
            if let Some(ref cursor) = cursor {
                request = request.query("cursor", cursor);
            }
            decode(check(request.call(), &base_id)?)
        })
        .await
    }

    async fn create_record(
        &self,
        token: &str,
        base_id: &str,
        table_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<String, ApiError> {
        let url = self.url(&format!("{base_id}/{table_id}"));
        let agent = self.agent.clone();
        let auth = bearer(token);
        let body = json!({ "fields": fields });
        let base_id = base_id.to_string();

        blocking(move || {
            let response = agent
                .post(&url)
                .header("Authorization", &auth)
                .send_json(&body);
            decode::<IdOnly>(check(response, &base_id)?).map(|r| r.id)
        })
        .await
    }

    async fn register_webhook(
        &self,
        token: &str,
        base_id: &str,
        spec: &WebhookSpec,
    ) -> Result<String, ApiError> {
        let url = self.url(&format!("bases/{base_id}/webhooks"));
        let agent = self.agent.clone();
        let auth = bearer(token);
        let body = json!({
            "notificationUrl": spec.notification_url,
            "specification": {
                "options": {
                    "filters": {
                        "dataTypes": ["tableData"],
                        "recordChangeScope": spec.table_id,
                    }
                }
            }
        });
        let base_id = base_id.to_string();

        blocking(move || {
            let response = agent
                .post(&url)
                .header("Authorization", &auth)
                .send_json(&body);
            decode::<IdOnly>(check(response, &base_id)?).map(|r| r.id)
        })
        .await
    }

    async fn delete_webhook(
        &self,
        token: &str,
        base_id: &str,
        webhook_id: &str,
    ) -> Result<(), ApiError> {
        let url = self.url(&format!("bases/{base_id}/webhooks/{webhook_id}"));
        let agent = self.agent.clone();
        let auth = bearer(token);
        let base_id = base_id.to_string();

        blocking(move || {
            let response = agent.delete(&url).header("Authorization", &auth).call();
            check(response, &base_id).map(|_| ())
        })
        .await
    }

    async fn list_webhooks(
        &self,
        token: &str,
        base_id: &str,
    ) -> Result<Vec<WebhookInfo>, ApiError> {
        let url = self.url(&format!("bases/{base_id}/webhooks"));
        let agent = self.agent.clone();
        let auth = bearer(token);
        let base_id = base_id.to_string();

        blocking(move || {
            let response = agent.get(&url).header("Authorization", &auth).call();
            decode::<WebhookList>(check(response, &base_id)?).map(|l| l.webhooks)
        })
        .await
    }

    async fn list_bases(&self, token: &str) -> Result<Vec<BaseInfo>, ApiError> {
        let url = self.url("meta/bases");
        let agent = self.agent.clone();
        let auth = bearer(token);

        blocking(move || {
            let mut bases = Vec::new();
            let mut offset: Option<String> = None;
            loop {
                let mut request = agent.get(&url).header("Authorization", &auth);
                if let Some(ref offset) = offset {
                    request = request.query("offset", offset);
                }
                let page = decode::<BaseList>(check(request.call(), "")?)?;
                bases.extend(page.bases);
                match page.offset {
                    Some(next) if Some(&next) != offset.as_ref() => offset = Some(next),
                    _ => return Ok(bases),
                }
            }
        })
        .await
    }

    async fn list_tables(&self, token: &str, base_id: &str) -> Result<Vec<TableInfo>, ApiError> {
        let url = self.url(&format!("meta/bases/{base_id}/tables"));
        let agent = self.agent.clone();
        let auth = bearer(token);
        let base_id = base_id.to_string();

        blocking(move || {
            let response = agent.get(&url).header("Authorization", &auth).call();
            decode::<TableList>(check(response, &base_id)?).map(|l| l.tables)
        })
        .await
    }

    async fn whoami(&self, token: &str) -> Result<String, ApiError> {
        let url = self.url("meta/whoami");
        let agent = self.agent.clone();
        let auth = bearer(token);

        blocking(move || {
            let response = agent.get(&url).header("Authorization", &auth).call();
            decode::<IdOnly>(check(response, "")?).map(|r| r.id)
        })
        .await
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slashes() {
        let api = HttpAirtable::new("https://api.example.com/v0/");
        assert_eq!(
            api.url("/bases/app1/webhooks"),
            "https://api.example.com/v0/bases/app1/webhooks"
        );
    }

    #[test]
    fn nested_webhook_limit_error_is_recognized() {
        let body = r#"{"error":{"type":"TOO_MANY_WEBHOOKS_BY_OAUTH_INTEGRATION_IN_BASE","message":"limit"}}"#;
        assert!(matches!(
            classify_error(422, body, "app1"),
            ApiError::WebhookLimit { base_id } if base_id == "app1"
        ));
    }

    #[test]
    fn flat_webhook_limit_error_is_recognized() {
        let body = r#"{"type":"TOO_MANY_WEBHOOKS_BY_OAUTH_INTEGRATION_IN_BASE"}"#;
        assert!(matches!(
            classify_error(422, body, "app1"),
            ApiError::WebhookLimit { .. }
        ));
    }

    #[test]
    fn string_error_becomes_status_message() {
        match classify_error(404, r#"{"error":"NOT_FOUND"}"#, "app1") {
            ApiError::Status { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "NOT_FOUND");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unauthorized_status_maps_to_unauthorized() {
        assert!(matches!(
            classify_error(401, "", "app1"),
            ApiError::Unauthorized
        ));
    }

    #[test]
    fn non_json_body_is_truncated_into_message() {
        let body = "x".repeat(500);
        match classify_error(502, &body, "app1") {
            ApiError::Status { message, .. } => assert_eq!(message.len(), 200),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
