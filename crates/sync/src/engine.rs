//! Reconciliation of record changes into the local response mirror.

use std::ops::AddAssign;
use std::sync::Arc;

use formsync_core::{map_external_values_to_answers, Form};
use formsync_storage::{now_rfc3339, FormStore, StorageError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::changes::{normalize_payload, ChangeKind, RecordChange};

/// Outcome counters for one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileStats {
    /// Changes applied to a local response.
    pub processed: usize,
    /// Changes for records with no local response in this form.
    pub not_found: usize,
    /// Changes whose lookup or write failed.
    pub errors: usize,
    /// Malformed entries, unknown event types and other tables' records.
    pub skipped: usize,
}

impl AddAssign for ReconcileStats {
    fn add_assign(&mut self, other: Self) {
        self.processed += other.processed;
        self.not_found += other.not_found;
        self.errors += other.errors;
        self.skipped += other.skipped;
    }
}

/// What happened to a single change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    Processed,
    NotFound,
}

/// Applies webhook payloads for one form to the store.
///
/// Changes are applied in the order supplied. A failure on one record is
/// counted and logged; the rest of the batch is still applied.
#[derive(Clone)]
pub struct ReconciliationEngine {
    store: Arc<dyn FormStore>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn FormStore>) -> Self {
        ReconciliationEngine { store }
    }

    /// Normalize and apply every payload.
    pub async fn reconcile(&self, form: &Form, payloads: &[Value]) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        for payload in payloads {
            let normalized = normalize_payload(payload, &form.table_id);
            stats.skipped += normalized.skipped;
            for change in &normalized.changes {
                match self.apply_change(form, change).await {
                    Ok(ChangeOutcome::Processed) => stats.processed += 1,
                    Ok(ChangeOutcome::NotFound) => {
                        tracing::debug!(
                            form_id = %form.id,
                            record_id = %change.record_id,
                            "no local response for record"
                        );
                        stats.not_found += 1;
                    }
                    Err(e) => {
                        tracing::error!(
                            form_id = %form.id,
                            base_id = %form.base_id,
                            record_id = %change.record_id,
                            error = %e,
                            "failed to apply record change"
                        );
                        stats.errors += 1;
                    }
                }
            }
        }
        stats
    }

    /// Apply one change. The response is resolved by record id within this
    /// form only.
    pub async fn apply_change(
        &self,
        form: &Form,
        change: &RecordChange,
    ) -> Result<ChangeOutcome, StorageError> {
        let Some(response) = self
            .store
            .find_response_by_external_record_and_form(&change.record_id, &form.id)
            .await?
        else {
            return Ok(ChangeOutcome::NotFound);
        };

        let now = now_rfc3339();
        match change.kind {
            ChangeKind::Created | ChangeKind::Updated => {
                let patch = change
                    .fields
                    .as_ref()
                    .map(|fields| map_external_values_to_answers(fields, &form.questions))
                    .unwrap_or_default();
                self.store
                    .upsert_response_answers(&response.id, &patch, &now)
                    .await?;
            }
            ChangeKind::Deleted => {
                self.store.mark_response_deleted(&response.id, &now).await?;
            }
        }
        tracing::debug!(
            form_id = %form.id,
            record_id = %change.record_id,
            kind = ?change.kind,
            "applied record change"
        );
        Ok(ChangeOutcome::Processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_form, sample_response, FailingStore};
    use formsync_storage::MemoryStore;
    use serde_json::json;

    async fn engine_with_response() -> (ReconciliationEngine, Arc<MemoryStore>, Form) {
        let store = Arc::new(MemoryStore::new());
        let form = sample_form();
        store.insert_form(form.clone()).await.unwrap();
        store
            .insert_response(sample_response("r1", &form.id, "recXYZ"))
            .await
            .unwrap();
        (ReconciliationEngine::new(store.clone()), store, form)
    }

    fn update_event(record_id: &str, email: &str) -> Value {
        json!({"event": {"type": "record.updated", "record": {
            "id": record_id, "fields": {"fldXYZ": email}
        }}})
    }

    #[tokio::test]
    async fn same_update_twice_is_idempotent() {
        let (engine, store, form) = engine_with_response().await;
        let payload = update_event("recXYZ", "a@b.c");

        let first = engine.reconcile(&form, &[payload.clone()]).await;
        let after_first = store
            .find_response_by_external_record_and_form("recXYZ", &form.id)
            .await
            .unwrap()
            .unwrap();
        let second = engine.reconcile(&form, &[payload]).await;
        let after_second = store
            .find_response_by_external_record_and_form("recXYZ", &form.id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.processed, 1);
        assert_eq!(second.processed, 1);
        assert_eq!(after_first.answers, after_second.answers);
        assert_eq!(after_first.deleted_in_airtable, after_second.deleted_in_airtable);
    }

    #[tokio::test]
    async fn unmatched_record_is_not_found_and_not_written() {
        let (engine, store, form) = engine_with_response().await;
        let before = store.export().await;

        let stats = engine
            .reconcile(&form, &[update_event("recUnknown", "x@y.z")])
            .await;

        assert_eq!(
            stats,
            ReconcileStats {
                not_found: 1,
                ..Default::default()
            }
        );
        assert_eq!(store.export().await.responses, before.responses);
    }

    #[tokio::test]
    async fn record_of_another_form_is_not_touched() {
        let (engine, store, form) = engine_with_response().await;
        let mut other = sample_form();
        other.id = "form-other".into();
        store
            .insert_response(sample_response("r2", &other.id, "recShared"))
            .await
            .unwrap();

        let stats = engine
            .reconcile(&form, &[update_event("recShared", "x@y.z")])
            .await;
        assert_eq!(stats.not_found, 1);

        let untouched = store
            .find_response_by_external_record_and_form("recShared", &other.id)
            .await
            .unwrap()
            .unwrap();
        assert!(untouched.answers.get("email").is_none());
    }

    #[tokio::test]
    async fn mixed_batch_processes_good_and_skips_bad() {
        let (engine, _store, form) = engine_with_response().await;
        let stats = engine
            .reconcile(
                &form,
                &[
                    update_event("recXYZ", "ok@x.y"),
                    json!({"event": {"type": "record.updated"}}),
                ],
            )
            .await;
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.errors, 0);
    }

    #[tokio::test]
    async fn partial_update_keeps_other_answers() {
        let (engine, store, form) = engine_with_response().await;
        store
            .upsert_response_answers(
                "r1",
                json!({"color": "Red"}).as_object().unwrap(),
                "2025-01-02T00:00:00Z",
            )
            .await
            .unwrap();

        engine
            .reconcile(&form, &[update_event("recXYZ", "n@x.y")])
            .await;
        let stored = store
            .find_response_by_external_record_and_form("recXYZ", &form.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.answers["email"], json!("n@x.y"));
        assert_eq!(stored.answers["color"], json!("Red"));
        assert_ne!(stored.updated_at, "2025-01-02T00:00:00Z");
    }

    #[tokio::test]
    async fn delete_event_soft_deletes() {
        let (engine, store, form) = engine_with_response().await;
        let stats = engine
            .reconcile(
                &form,
                &[json!({"event": {"type": "record.deleted", "record": {"id": "recXYZ"}}})],
            )
            .await;
        assert_eq!(stats.processed, 1);
        let stored = store
            .find_response_by_external_record_and_form("recXYZ", &form.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.deleted_in_airtable);
    }

    #[tokio::test]
    async fn storage_failure_is_counted_and_batch_continues() {
        let engine = ReconciliationEngine::new(Arc::new(FailingStore));
        let form = sample_form();
        let stats = engine
            .reconcile(
                &form,
                &[
                    update_event("rec1", "a@b.c"),
                    update_event("rec2", "d@e.f"),
                    json!({"nothing": true}),
                ],
            )
            .await;
        assert_eq!(
            stats,
            ReconcileStats {
                errors: 2,
                skipped: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn stats_serialize_camel_case() {
        let stats = ReconcileStats {
            processed: 1,
            not_found: 2,
            errors: 0,
            skipped: 3,
        };
        assert_eq!(
            serde_json::to_value(stats).unwrap(),
            json!({"processed": 1, "notFound": 2, "errors": 0, "skipped": 3})
        );
    }
}
