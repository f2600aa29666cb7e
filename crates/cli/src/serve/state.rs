//! Application state and rate limiting.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use formsync_storage::FormStore;
use formsync_sync::{
    AirtableApi, CatalogService, CodeGrant, OAuthFlow, ReconciliationEngine, SubmissionService,
    SubscriptionManager, TokenProvider,
};
use tokio::sync::Mutex;

use super::RATE_LIMIT_WINDOW_SECS;
use crate::config::Config;

/// Per-IP request tracker: (request count, window start time).
type IpTracker = HashMap<IpAddr, (u64, Instant)>;

/// In-memory fixed-window per-IP rate limiter.
///
/// Entries whose window has ended are dropped on every check, so the map
/// only holds addresses seen during the current window.
pub(crate) struct RateLimiter {
    tracker: Mutex<IpTracker>,
    window: Duration,
    pub(crate) max_requests: u64,
}

impl RateLimiter {
    pub(crate) fn new(max_requests: u64) -> Self {
        Self::with_window(max_requests, Duration::from_secs(RATE_LIMIT_WINDOW_SECS))
    }

    pub(crate) fn with_window(max_requests: u64, window: Duration) -> Self {
        Self {
            tracker: Mutex::new(HashMap::new()),
            window,
            max_requests,
        }
    }

    /// Record a request from `ip`.
    /// Returns Err(retry_after_secs) once the window's budget is spent.
    pub(crate) async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let mut tracker = self.tracker.lock().await;
        let now = Instant::now();
        let window = self.window;

        tracker.retain(|_, (_, start)| now.duration_since(*start) < window);

        let entry = tracker.entry(ip).or_insert((0, now));
        entry.0 += 1;
        if entry.0 > self.max_requests {
            let remaining = window.saturating_sub(now.duration_since(entry.1));
            Err(remaining.as_secs().max(1))
        } else {
            Ok(())
        }
    }

    #[cfg(test)]
    pub(crate) async fn tracked(&self) -> usize {
        self.tracker.lock().await.len()
    }
}

/// Shared by every request handler.
pub(crate) struct AppState {
    pub(crate) store: Arc<dyn FormStore>,
    pub(crate) api: Arc<dyn AirtableApi>,
    pub(crate) tokens: Arc<dyn TokenProvider>,
    pub(crate) engine: ReconciliationEngine,
    pub(crate) subscriptions: SubscriptionManager,
    pub(crate) submissions: SubmissionService,
    pub(crate) catalog: CatalogService,
    pub(crate) oauth: OAuthFlow,
    pub(crate) rate_limiter: RateLimiter,
    pub(crate) api_key: Option<String>,
    /// Full notification URL for new webhooks; `None` skips registration.
    pub(crate) notification_url: Option<String>,
}

impl AppState {
    pub(crate) fn new(
        store: Arc<dyn FormStore>,
        api: Arc<dyn AirtableApi>,
        tokens: Arc<dyn TokenProvider>,
        grant: Arc<dyn CodeGrant>,
        config: &Config,
    ) -> Self {
        AppState {
            engine: ReconciliationEngine::new(store.clone()),
            subscriptions: SubscriptionManager::new(api.clone(), tokens.clone(), store.clone()),
            submissions: SubmissionService::new(api.clone(), tokens.clone(), store.clone()),
            catalog: CatalogService::new(api.clone(), tokens.clone()),
            oauth: OAuthFlow::new(store.clone(), api.clone(), grant, config.oauth_settings()),
            rate_limiter: RateLimiter::new(config.rate_limit),
            api_key: config.api_key.clone(),
            notification_url: config.notification_url(),
            store,
            api,
            tokens,
        }
    }
}
