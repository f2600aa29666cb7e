//! The webhook sync loop: fetch a page, reconcile it, follow the cursor.

use formsync_core::Form;
use serde::Serialize;

use crate::api::Cursor;
use crate::engine::{ReconcileStats, ReconciliationEngine};
use crate::fetcher::{PayloadFetcher, MAX_PAGES};

/// Why the sync loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum SyncStop {
    /// Upstream reported no more data, or returned no cursor.
    Drained,
    /// [`MAX_PAGES`] pages were consumed while upstream still had more.
    PageLimit,
    /// A page could not be fetched. Earlier pages stay applied.
    FetchFailed { error: String },
}

/// Summary of one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub pages: usize,
    pub stats: ReconcileStats,
    pub stop: SyncStop,
}

/// Pull every pending payload page for `webhook_id` and apply it to `form`.
///
/// Pages are strictly sequential: each page is fully reconciled before the
/// next cursor is requested. The first request carries no cursor.
pub async fn sync_webhook(
    fetcher: &mut PayloadFetcher,
    engine: &ReconciliationEngine,
    form: &Form,
    webhook_id: &str,
) -> SyncReport {
    let mut stats = ReconcileStats::default();
    let mut cursor: Option<Cursor> = None;
    let mut pages = 0;

    while pages < MAX_PAGES {
        let page = match fetcher.fetch(&form.base_id, webhook_id, cursor.as_ref()).await {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(
                    webhook_id,
                    base_id = %form.base_id,
                    form_id = %form.id,
                    cursor = ?cursor.as_ref().map(Cursor::as_str),
                    error = %e,
                    "failed to fetch webhook payloads"
                );
                return SyncReport {
                    pages,
                    stats,
                    stop: SyncStop::FetchFailed {
                        error: e.to_string(),
                    },
                };
            }
        };
        pages += 1;

        stats += engine.reconcile(form, &page.payloads).await;

        let more = page.more_available();
        match page.cursor {
            Some(next) if more => cursor = Some(next),
            _ => {
                return SyncReport {
                    pages,
                    stats,
                    stop: SyncStop::Drained,
                }
            }
        }
    }

    tracing::warn!(
        webhook_id,
        base_id = %form.base_id,
        form_id = %form.id,
        pages,
        "page limit reached while upstream still reports more payloads"
    );
    SyncReport {
        pages,
        stats,
        stop: SyncStop::PageLimit,
    }
}
