//! Fleet loops: the recurring snapshot pass over every active offer, and the
//! on-demand single-offer refresh.
//!
//! Both share the same per-page operation (scrape task + recorder) and the
//! same containment rule: one page's failure — or one offer's — never aborts
//! the rest of the work. Pages are scraped strictly one at a time; the
//! recurring pass additionally jitters a delay between consecutive scrapes
//! to stay under the target site's automation heuristics.

use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::fetch::PageFetcher;
use crate::recorder::record_success;
use crate::store::{SnapshotStore, StoreError};
use crate::task::{scrape_page, ScrapeOutcome};

/// Inter-scrape delay bounds for the recurring pass, in milliseconds.
/// Sampled uniformly in `[min, max)` before every scrape after the first.
#[derive(Debug, Clone, Copy)]
pub struct DelayPolicy {
    min_ms: u64,
    max_ms: u64,
}

impl DelayPolicy {
    pub const DEFAULT_MIN_MS: u64 = 2000;
    pub const DEFAULT_MAX_MS: u64 = 5000;

    #[must_use]
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// No delay; used by the on-demand path where the set is small.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    /// Sample one delay. Degenerates to `min` when the range is empty.
    #[must_use]
    pub fn sample_ms(&self) -> u64 {
        if self.max_ms <= self.min_ms {
            self.min_ms
        } else {
            rand::rng().random_range(self.min_ms..self.max_ms)
        }
    }

    async fn wait(&self) {
        let ms = self.sample_ms();
        if ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        }
    }
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_MS, Self::DEFAULT_MAX_MS)
    }
}

/// Aggregate counters for one recurring pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    pub offers_total: usize,
    pub offers_failed: usize,
    pub pages_attempted: usize,
    pub pages_succeeded: usize,
    pub pages_failed: usize,
}

/// Run one full snapshot pass over every active offer and every associated
/// page, serially, in fetch order.
///
/// Failure containment, per level:
/// - a failed offer (store error listing its pages, or zero pages) is
///   counted and skipped;
/// - a failed page (fetch, extraction, or snapshot insert) is counted and
///   skipped;
/// - a failure listing the offers themselves ends the pass early with
///   whatever was counted so far.
///
/// There are no retries within a pass; a failed page is simply revisited on
/// the next scheduled pass.
pub async fn run_snapshot_pass(
    store: &dyn SnapshotStore,
    fetcher: &dyn PageFetcher,
    delay: DelayPolicy,
) -> PassStats {
    let mut stats = PassStats::default();

    let offers = match store.list_active_offers().await {
        Ok(offers) => offers,
        Err(e) => {
            tracing::error!(error = %e, "snapshot pass: failed to list active offers");
            return stats;
        }
    };
    stats.offers_total = offers.len();
    tracing::info!(offers = offers.len(), "snapshot pass: starting");

    let mut first_scrape = true;

    for offer in &offers {
        let pages = match store.list_pages_for_offer(offer.id).await {
            Ok(pages) => pages,
            Err(e) => {
                tracing::error!(offer = %offer.name, error = %e, "snapshot pass: failed to list pages");
                stats.offers_failed += 1;
                continue;
            }
        };

        if pages.is_empty() {
            tracing::warn!(offer = %offer.name, "snapshot pass: offer has no monitored pages");
            stats.offers_failed += 1;
            continue;
        }

        for page in &pages {
            // The jitter applies between every two consecutive scrapes in the
            // whole pass, including across offer boundaries.
            if !first_scrape {
                delay.wait().await;
            }
            first_scrape = false;

            stats.pages_attempted += 1;
            match scrape_page(fetcher, &page.url).await {
                ScrapeOutcome::Success {
                    creative_count,
                    page_name,
                } => {
                    match record_success(store, offer.id, page, creative_count, page_name.as_deref())
                        .await
                    {
                        Ok(()) => {
                            stats.pages_succeeded += 1;
                            tracing::info!(
                                offer = %offer.name,
                                page_url = %page.url,
                                creative_count,
                                "snapshot pass: page scraped"
                            );
                        }
                        Err(e) => {
                            // An insert failure is scoped to this page: it
                            // counts against pages_failed, not the offer, and
                            // the offer's remaining pages are still attempted.
                            stats.pages_failed += 1;
                            tracing::error!(
                                offer = %offer.name,
                                page_url = %page.url,
                                error = %e,
                                "snapshot pass: snapshot insert failed"
                            );
                        }
                    }
                }
                ScrapeOutcome::Failure { reason } => {
                    stats.pages_failed += 1;
                    tracing::warn!(
                        offer = %offer.name,
                        page_url = %page.url,
                        reason,
                        "snapshot pass: page scrape failed"
                    );
                }
            }
        }
    }

    tracing::info!(
        attempted = stats.pages_attempted,
        succeeded = stats.pages_succeeded,
        failed = stats.pages_failed,
        offers_failed = stats.offers_failed,
        "snapshot pass: complete"
    );
    stats
}

/// Errors from the on-demand refresh path that the request layer maps to a
/// client-visible rejection before any scraping happens.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("offer has no monitored pages")]
    NoPages,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-page entry in the on-demand refresh response.
#[derive(Debug, Clone, Serialize)]
pub struct PageRefreshResult {
    pub page_id: Uuid,
    pub page_name: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creative_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// On-demand refresh response: real per-page outcomes, not just logs.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    /// True when at least one page succeeded.
    pub success: bool,
    pub message: String,
    pub results: Vec<PageRefreshResult>,
}

/// Scrape and record every page of a single offer, sequentially, and return
/// the per-page outcomes. The caller has already resolved and authorized the
/// offer. No inter-page delay is applied on this path.
///
/// # Errors
///
/// Returns [`FleetError::NoPages`] for an offer with no associated pages, or
/// [`FleetError::Store`] if the pages cannot be listed at all. Individual
/// page failures never fail the call; they appear in `results`.
pub async fn refresh_offer(
    store: &dyn SnapshotStore,
    fetcher: &dyn PageFetcher,
    offer_id: i64,
) -> Result<RefreshSummary, FleetError> {
    let pages = store.list_pages_for_offer(offer_id).await?;
    if pages.is_empty() {
        return Err(FleetError::NoPages);
    }

    let total = pages.len();
    let mut results = Vec::with_capacity(total);
    let mut succeeded = 0_usize;

    for page in &pages {
        match scrape_page(fetcher, &page.url).await {
            ScrapeOutcome::Success {
                creative_count,
                page_name,
            } => {
                let recorded =
                    record_success(store, offer_id, page, creative_count, page_name.as_deref())
                        .await;
                match recorded {
                    Ok(()) => {
                        succeeded += 1;
                        results.push(PageRefreshResult {
                            page_id: page.public_id,
                            page_name: page_name.or_else(|| page.page_name.clone()),
                            success: true,
                            creative_count: Some(creative_count),
                            error: None,
                        });
                    }
                    Err(e) => {
                        results.push(PageRefreshResult {
                            page_id: page.public_id,
                            page_name: page_name.or_else(|| page.page_name.clone()),
                            success: false,
                            creative_count: None,
                            error: Some(e.to_string()),
                        });
                    }
                }
            }
            ScrapeOutcome::Failure { reason } => {
                results.push(PageRefreshResult {
                    page_id: page.public_id,
                    page_name: page.page_name.clone(),
                    success: false,
                    creative_count: None,
                    error: Some(reason),
                });
            }
        }
    }

    Ok(RefreshSummary {
        success: succeeded > 0,
        message: format!("scraped {succeeded}/{total} pages"),
        results,
    })
}

// ---------------------------------------------------------------------------
// Test doubles shared with the recorder tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests_support {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::FetchError;
    use crate::fetch::PageFetcher;
    use crate::store::{ActiveOffer, NewSnapshot, OfferPage, SnapshotStore, StoreError};

    /// In-memory [`SnapshotStore`] with scriptable failures.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        offers: Vec<ActiveOffer>,
        pages: HashMap<i64, Vec<OfferPage>>,
        page_list_failures: HashSet<i64>,
        fail_inserts: bool,
        fail_name_updates: bool,
        snapshots: Mutex<Vec<NewSnapshot>>,
        name_updates: Mutex<Vec<(i64, String)>>,
    }

    impl MemoryStore {
        pub(crate) fn with_offer(mut self, id: i64, name: &str, pages: Vec<OfferPage>) -> Self {
            self.offers.push(ActiveOffer {
                id,
                name: name.to_string(),
            });
            self.pages.insert(id, pages);
            self
        }

        /// Make `list_pages_for_offer` fail for the given offer.
        pub(crate) fn failing_pages_for(mut self, offer_id: i64) -> Self {
            self.page_list_failures.insert(offer_id);
            self
        }

        pub(crate) fn failing_inserts(mut self) -> Self {
            self.fail_inserts = true;
            self
        }

        pub(crate) fn failing_name_updates(mut self) -> Self {
            self.fail_name_updates = true;
            self
        }

        pub(crate) fn snapshots(&self) -> Vec<NewSnapshot> {
            self.snapshots.lock().expect("lock").clone()
        }

        pub(crate) fn name_updates(&self) -> Vec<(i64, String)> {
            self.name_updates.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl SnapshotStore for MemoryStore {
        async fn list_active_offers(&self) -> Result<Vec<ActiveOffer>, StoreError> {
            Ok(self.offers.clone())
        }

        async fn list_pages_for_offer(&self, offer_id: i64) -> Result<Vec<OfferPage>, StoreError> {
            if self.page_list_failures.contains(&offer_id) {
                return Err(StoreError::new("connection reset"));
            }
            Ok(self.pages.get(&offer_id).cloned().unwrap_or_default())
        }

        async fn insert_snapshot(&self, snapshot: NewSnapshot) -> Result<(), StoreError> {
            if self.fail_inserts {
                return Err(StoreError::new("insert failed"));
            }
            self.snapshots.lock().expect("lock").push(snapshot);
            Ok(())
        }

        async fn update_page_name(&self, page_id: i64, name: &str) -> Result<(), StoreError> {
            if self.fail_name_updates {
                return Err(StoreError::new("update failed"));
            }
            self.name_updates
                .lock()
                .expect("lock")
                .push((page_id, name.to_string()));
            Ok(())
        }
    }

    /// [`PageFetcher`] that serves canned responses per URL and records the
    /// instant of every call (for delay assertions under a paused clock).
    #[derive(Default)]
    pub(crate) struct ScriptedFetcher {
        responses: HashMap<String, Result<String, String>>,
        calls: Mutex<Vec<(String, tokio::time::Instant)>>,
    }

    impl ScriptedFetcher {
        pub(crate) fn ok(mut self, url: &str, html: &str) -> Self {
            self.responses
                .insert(url.to_string(), Ok(html.to_string()));
            self
        }

        pub(crate) fn err(mut self, url: &str, message: &str) -> Self {
            self.responses
                .insert(url.to_string(), Err(message.to_string()));
            self
        }

        pub(crate) fn call_instants(&self) -> Vec<tokio::time::Instant> {
            self.calls
                .lock()
                .expect("lock")
                .iter()
                .map(|(_, at)| *at)
                .collect()
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.calls
                .lock()
                .expect("lock")
                .push((url.to_string(), tokio::time::Instant::now()));
            match self.responses.get(url) {
                Some(Ok(html)) => Ok(html.clone()),
                Some(Err(message)) => Err(FetchError::Api {
                    status: 500,
                    message: message.clone(),
                }),
                None => Err(FetchError::Api {
                    status: 404,
                    message: format!("no scripted response for {url}"),
                }),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::tests_support::{MemoryStore, ScriptedFetcher};
    use super::*;
    use crate::store::OfferPage;

    fn page(id: i64, url: &str) -> OfferPage {
        OfferPage {
            id,
            public_id: Uuid::new_v4(),
            url: url.to_string(),
            page_name: None,
        }
    }

    fn ads_html(count: u32) -> String {
        format!("<html><body><div>{count} ads</div></body></html>")
    }

    // -----------------------------------------------------------------------
    // Recurring pass
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn pass_counts_partial_failures_without_aborting() {
        // Offer A: zero pages. Offer B: one page succeeds, one fails.
        // Offer C: one page succeeds.
        let store = MemoryStore::default()
            .with_offer(1, "offer-a", vec![])
            .with_offer(
                2,
                "offer-b",
                vec![page(21, "https://t.example/b1"), page(22, "https://t.example/b2")],
            )
            .with_offer(3, "offer-c", vec![page(31, "https://t.example/c1")]);
        let fetcher = ScriptedFetcher::default()
            .ok("https://t.example/b1", &ads_html(10))
            .err("https://t.example/b2", "navigation timeout")
            .ok("https://t.example/c1", &ads_html(30));

        let stats = run_snapshot_pass(&store, &fetcher, DelayPolicy::none()).await;

        assert_eq!(stats.offers_total, 3);
        assert_eq!(stats.offers_failed, 1, "offer A has no pages");
        assert_eq!(stats.pages_attempted, 3);
        assert_eq!(stats.pages_succeeded, 2);
        assert_eq!(stats.pages_failed, 1);

        let snapshots = store.snapshots();
        assert_eq!(snapshots.len(), 2, "exactly one snapshot per success");
        let counts: Vec<u32> = snapshots.iter().map(|s| s.creative_count).collect();
        assert_eq!(counts, vec![10, 30]);
    }

    #[tokio::test]
    async fn pass_survives_offer_level_store_error() {
        let store = MemoryStore::default()
            .with_offer(1, "broken", vec![page(11, "https://t.example/x1")])
            .with_offer(2, "healthy", vec![page(21, "https://t.example/y1")])
            .failing_pages_for(1);
        let fetcher = ScriptedFetcher::default().ok("https://t.example/y1", &ads_html(5));

        let stats = run_snapshot_pass(&store, &fetcher, DelayPolicy::none()).await;

        assert_eq!(stats.offers_failed, 1);
        assert_eq!(stats.pages_succeeded, 1);
        assert_eq!(store.snapshots().len(), 1);
    }

    #[tokio::test]
    async fn insert_failure_counts_page_as_failed() {
        let store = MemoryStore::default()
            .with_offer(1, "offer", vec![page(11, "https://t.example/p1")])
            .failing_inserts();
        let fetcher = ScriptedFetcher::default().ok("https://t.example/p1", &ads_html(5));

        let stats = run_snapshot_pass(&store, &fetcher, DelayPolicy::none()).await;

        assert_eq!(stats.pages_attempted, 1);
        assert_eq!(stats.pages_succeeded, 0);
        assert_eq!(stats.pages_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_elapses_between_scrapes_across_offer_boundaries() {
        let store = MemoryStore::default()
            .with_offer(
                1,
                "offer-a",
                vec![page(11, "https://t.example/a1"), page(12, "https://t.example/a2")],
            )
            .with_offer(2, "offer-b", vec![page(21, "https://t.example/b1")]);
        let fetcher = ScriptedFetcher::default()
            .ok("https://t.example/a1", &ads_html(1))
            .ok("https://t.example/a2", &ads_html(2))
            .ok("https://t.example/b1", &ads_html(3));

        run_snapshot_pass(&store, &fetcher, DelayPolicy::default()).await;

        let instants = fetcher.call_instants();
        assert_eq!(instants.len(), 3);
        for pair in instants.windows(2) {
            let gap = pair[1].duration_since(pair[0]).as_millis();
            assert!(
                (2000..5000).contains(&gap),
                "inter-scrape gap {gap}ms outside [2000, 5000)"
            );
        }
    }

    #[test]
    fn default_delay_samples_within_bounds() {
        let policy = DelayPolicy::default();
        for _ in 0..200 {
            let ms = policy.sample_ms();
            assert!((2000..5000).contains(&ms), "sampled {ms}ms out of range");
        }
    }

    #[test]
    fn empty_delay_range_degenerates_to_min() {
        assert_eq!(DelayPolicy::none().sample_ms(), 0);
        assert_eq!(DelayPolicy::new(300, 300).sample_ms(), 300);
    }

    // -----------------------------------------------------------------------
    // On-demand refresh
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn refresh_reports_per_page_outcomes() {
        let store = MemoryStore::default().with_offer(
            1,
            "offer",
            vec![page(11, "https://t.example/p1"), page(12, "https://t.example/p2")],
        );
        let fetcher = ScriptedFetcher::default()
            .ok("https://t.example/p1", &ads_html(50))
            .err("https://t.example/p2", "navigation timeout");

        let summary = refresh_offer(&store, &fetcher, 1).await.unwrap();

        assert!(summary.success, "one page succeeded");
        assert_eq!(summary.message, "scraped 1/2 pages");
        assert_eq!(summary.results.len(), 2);

        assert!(summary.results[0].success);
        assert_eq!(summary.results[0].creative_count, Some(50));
        assert!(summary.results[0].error.is_none());

        assert!(!summary.results[1].success);
        assert!(summary.results[1].creative_count.is_none());
        assert!(summary.results[1]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("navigation timeout")));

        assert_eq!(store.snapshots().len(), 1);
    }

    #[tokio::test]
    async fn refresh_with_no_pages_is_an_error() {
        let store = MemoryStore::default().with_offer(1, "offer", vec![]);
        let fetcher = ScriptedFetcher::default();

        let result = refresh_offer(&store, &fetcher, 1).await;
        assert!(matches!(result, Err(FleetError::NoPages)));
    }

    #[tokio::test]
    async fn refresh_with_all_failures_reports_not_success() {
        let store = MemoryStore::default().with_offer(
            1,
            "offer",
            vec![page(11, "https://t.example/p1"), page(12, "https://t.example/p2")],
        );
        let fetcher = ScriptedFetcher::default()
            .err("https://t.example/p1", "boom")
            .err("https://t.example/p2", "boom");

        let summary = refresh_offer(&store, &fetcher, 1).await.unwrap();
        assert!(!summary.success);
        assert_eq!(summary.message, "scraped 0/2 pages");
        assert!(store.snapshots().is_empty());
    }

    #[tokio::test]
    async fn refresh_reports_fresh_page_name() {
        let store = MemoryStore::default().with_offer(
            1,
            "offer",
            vec![page(11, "https://t.example/p1")],
        );
        let fetcher = ScriptedFetcher::default().ok(
            "https://t.example/p1",
            r#"<html><body><span data-testid="page-name">Acme</span><div>5 ads</div></body></html>"#,
        );

        let summary = refresh_offer(&store, &fetcher, 1).await.unwrap();
        assert_eq!(summary.results[0].page_name.as_deref(), Some("Acme"));
        assert_eq!(store.name_updates(), vec![(11, "Acme".to_string())]);
    }
}
