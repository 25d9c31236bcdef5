//! Scan cycle orchestration.
//!
//! One cycle fans all enabled adapters out over a bounded worker pool,
//! pushes each successful scan through normalize -> detect -> commit,
//! and hands the surviving events to the notifier. A failing source is
//! recorded and skipped; its previously committed listings stay exactly
//! as they were. At most one cycle runs at a time: a trigger arriving
//! while a cycle is in flight is dropped, not queued.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::watch;

use crate::error::{AppError, Result};
use crate::filter::ListingFilter;
use crate::models::{ChangeEvent, ChangeKind, Config, CycleSummary, SourceReport};
use crate::normalize::normalize;
use crate::notify::Dispatcher;
use crate::pipeline::detect_changes;
use crate::scrapers::{QueryHints, SiteScraper, build_scrapers};
use crate::store::ListingStore;

/// Drives scan cycles over a fixed set of adapters.
///
/// Constructed once at startup and shared; holds no ambient global
/// state.
pub struct Orchestrator {
    config: Arc<Config>,
    filter: ListingFilter,
    scrapers: Vec<Arc<dyn SiteScraper>>,
    store: Arc<dyn ListingStore>,
    dispatcher: Dispatcher,
    cycle_guard: tokio::sync::Mutex<()>,
}

impl Orchestrator {
    pub fn new(config: Arc<Config>, store: Arc<dyn ListingStore>) -> Result<Self> {
        let scrapers = build_scrapers(&config)?;
        let dispatcher = Dispatcher::from_config(&config);
        Ok(Self::with_parts(config, scrapers, store, dispatcher))
    }

    /// Assemble from explicit parts.
    pub fn with_parts(
        config: Arc<Config>,
        scrapers: Vec<Arc<dyn SiteScraper>>,
        store: Arc<dyn ListingStore>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            filter: ListingFilter::from_config(&config.filter),
            config,
            scrapers,
            store,
            dispatcher,
            cycle_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one scan cycle.
    ///
    /// Returns `None` when a cycle is already in flight (the trigger is
    /// coalesced). Honors the shutdown signal promptly: sources not yet
    /// committed when it fires are discarded, and notifications for the
    /// cut-short cycle are skipped.
    pub async fn run_cycle(
        &self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<Option<CycleSummary>> {
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            log::warn!("Scan cycle already in flight, dropping trigger");
            return Ok(None);
        };

        let started_at = Utc::now();
        let cycle_start = Instant::now();
        log::info!("Starting scan cycle across {} sources", self.scrapers.len());

        let hints = QueryHints::from_filter(&self.config.filter);
        let mut shutdown_rx = shutdown.clone();
        let mut shutdown_alive = true;
        let mut cancelled = *shutdown_rx.borrow();

        let mut reports: Vec<SourceReport> = Vec::new();
        let mut events: Vec<ChangeEvent> = Vec::new();

        {
            let scan_futs: Vec<_> = self
                .scrapers
                .iter()
                .cloned()
                .map(|scraper| {
                    let hints = hints.clone();
                    async move { self.scan_source(scraper, hints).await }
                })
                .collect();
            let mut scans = stream::iter(scan_futs)
                .buffer_unordered(self.config.crawler.max_concurrent.max(1));

            while !cancelled {
                tokio::select! {
                    next = scans.next() => match next {
                        Some((report, mut source_events)) => {
                            reports.push(report);
                            events.append(&mut source_events);
                        }
                        None => break,
                    },
                    changed = shutdown_rx.changed(), if shutdown_alive => match changed {
                        Ok(()) => cancelled = *shutdown_rx.borrow(),
                        Err(_) => shutdown_alive = false,
                    },
                }
            }
            // Dropping the stream cancels in-flight scans; none of their
            // work has been committed.
        }

        reports.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        let mut summary = CycleSummary {
            started_at,
            duration_ms: cycle_start.elapsed().as_millis() as u64,
            new: events.iter().filter(|e| e.kind == ChangeKind::New).count(),
            updated: events
                .iter()
                .filter(|e| e.kind == ChangeKind::Updated)
                .count(),
            removed: events
                .iter()
                .filter(|e| e.kind == ChangeKind::Removed)
                .count(),
            undelivered: 0,
            cancelled,
            sources: reports,
        };

        if cancelled {
            log::warn!("Scan cycle cancelled before completion, skipping notifications");
            return Ok(Some(summary));
        }

        let worthy: Vec<ChangeEvent> = events
            .into_iter()
            .filter(|e| self.filter.matches_event(e))
            .collect();
        log::info!(
            "Cycle found {} change(s), {} notification-worthy",
            summary.total_changes(),
            worthy.len()
        );

        self.dispatcher.dispatch(&worthy, &mut summary).await;
        summary.duration_ms = cycle_start.elapsed().as_millis() as u64;
        Ok(Some(summary))
    }

    /// Scan one source end to end: fetch, normalize, detect, commit.
    ///
    /// Every failure path returns before the commit, so the store never
    /// sees a partial scan.
    async fn scan_source(
        &self,
        scraper: Arc<dyn SiteScraper>,
        hints: QueryHints,
    ) -> (SourceReport, Vec<ChangeEvent>) {
        let source_id = scraper.source_id();
        let start = Instant::now();
        let timeout = Duration::from_secs(self.config.crawler.source_timeout_secs);

        let raw = match tokio::time::timeout(timeout, scraper.fetch_listings(&hints)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                if e.is_transient() {
                    log::warn!("Scan of {source_id} failed, will retry next cycle: {e}");
                } else {
                    log::warn!("Scan of {source_id} failed: {e}");
                }
                return (
                    SourceReport::failed(source_id, e.to_string(), elapsed_ms(start)),
                    Vec::new(),
                );
            }
            Err(_) => {
                let e = AppError::fetch(
                    source_id,
                    format!(
                        "scan exceeded {}s timeout",
                        self.config.crawler.source_timeout_secs
                    ),
                );
                log::warn!("Scan of {source_id} failed: {e}");
                return (
                    SourceReport::failed(source_id, e.to_string(), elapsed_ms(start)),
                    Vec::new(),
                );
            }
        };

        let mut rejected = 0;
        let mut batch = Vec::with_capacity(raw.len());
        for candidate in &raw {
            match normalize(candidate) {
                Ok(normalized) => batch.push(normalized),
                Err(reject) => {
                    rejected += 1;
                    log::warn!("{source_id}: rejected candidate: {reject}");
                }
            }
        }

        let mut state = match self.store.load_source(source_id).await {
            Ok(state) => state,
            Err(e) => {
                log::error!("Could not load state for {source_id}: {e}");
                return (
                    SourceReport::failed(source_id, e.to_string(), elapsed_ms(start)),
                    Vec::new(),
                );
            }
        };

        let events = detect_changes(&mut state, batch, Utc::now());

        if let Err(e) = self.store.commit_source(&state, &events).await {
            // The whole batch is discarded; previous state is preserved
            log::error!("Commit failed for {source_id}: {e}");
            return (
                SourceReport::failed(source_id, e.to_string(), elapsed_ms(start)),
                Vec::new(),
            );
        }

        let report = SourceReport {
            source_id: source_id.to_string(),
            success: true,
            error: None,
            new: events.iter().filter(|e| e.kind == ChangeKind::New).count(),
            updated: events
                .iter()
                .filter(|e| e.kind == ChangeKind::Updated)
                .count(),
            removed: events
                .iter()
                .filter(|e| e.kind == ChangeKind::Removed)
                .count(),
            rejected,
            duration_ms: elapsed_ms(start),
        };

        log::info!(
            "Scan of {source_id} done: {} new, {} updated, {} removed, {} rejected",
            report.new,
            report.updated,
            report.removed,
            report.rejected
        );
        (report, events)
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotifyConfig, TelegramConfig};
    use crate::notify::{NotifyChannel, NotifyError};
    use crate::scrapers::RawListing;
    use crate::store::LocalStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct MockScraper {
        id: &'static str,
        batches: Mutex<VecDeque<Result<Vec<RawListing>>>>,
        delay: Duration,
    }

    impl MockScraper {
        fn new(id: &'static str, batches: Vec<Result<Vec<RawListing>>>) -> Arc<Self> {
            Arc::new(Self {
                id,
                batches: Mutex::new(batches.into()),
                delay: Duration::ZERO,
            })
        }

        fn slow(id: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                id,
                batches: Mutex::new(VecDeque::new()),
                delay,
            })
        }
    }

    #[async_trait]
    impl SiteScraper for MockScraper {
        fn source_id(&self) -> &'static str {
            self.id
        }

        async fn fetch_listings(&self, _hints: &QueryHints) -> Result<Vec<RawListing>> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    struct RecordingChannel {
        sent: Mutex<Vec<String>>,
    }

    impl RecordingChannel {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotifyChannel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        fn format_event(&self, event: &ChangeEvent) -> String {
            format!("{:?} {}", event.kind, event.subject().external_id)
        }

        fn format_summary(&self, summary: &CycleSummary) -> String {
            format!("summary {}", summary.total_changes())
        }

        async fn send(&self, text: &str) -> std::result::Result<(), NotifyError> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn raw(id: &str, price: &str) -> RawListing {
        RawListing {
            external_id: Some(id.to_string()),
            url: format!("https://example.nl/aanbod/{id}"),
            address: Some(format!("Straat {id}")),
            city: Some("Rotterdam".to_string()),
            price_text: Some(price.to_string()),
            area_text: Some("80 m\u{b2}".to_string()),
            property_type: None,
        }
    }

    fn test_config() -> Arc<Config> {
        let mut config = Config::default();
        config.filter.min_price = 0;
        config.filter.max_price = None;
        config.crawler.source_timeout_secs = 5;
        Arc::new(config)
    }

    fn orchestrator_with(
        config: Arc<Config>,
        scrapers: Vec<Arc<dyn SiteScraper>>,
        store: Arc<dyn ListingStore>,
        channel: Option<Arc<RecordingChannel>>,
    ) -> Orchestrator {
        let channels: Vec<Arc<dyn NotifyChannel>> = channel
            .into_iter()
            .map(|c| c as Arc<dyn NotifyChannel>)
            .collect();
        let dispatcher = Dispatcher::with_channels(
            channels,
            &TelegramConfig {
                send_summary: false,
                ..TelegramConfig::default()
            },
            &NotifyConfig {
                max_attempts: 1,
                backoff_base_ms: 1,
            },
        );
        Orchestrator::with_parts(config, scrapers, store, dispatcher)
    }

    #[tokio::test]
    async fn test_cycle_commits_and_notifies() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::open(tmp.path()).await.unwrap());
        let channel = RecordingChannel::new();
        let scraper = MockScraper::new("mock", vec![Ok(vec![raw("1", "\u{20ac} 150.000")])]);

        let orchestrator = orchestrator_with(
            test_config(),
            vec![scraper],
            store.clone(),
            Some(channel.clone()),
        );
        let (_tx, rx) = watch::channel(false);

        let summary = orchestrator.run_cycle(&rx).await.unwrap().unwrap();
        assert_eq!(summary.new, 1);
        assert!(summary.sources[0].success);

        let state = store.load_source("mock").await.unwrap();
        assert_eq!(state.get("1").unwrap().price, Some(150_000));
        assert_eq!(channel.sent(), vec!["New 1".to_string()]);
    }

    // A fetch failure must leave the store untouched, emit nothing, and
    // still let sibling sources commit in the same cycle.
    #[tokio::test]
    async fn test_failed_source_is_isolated() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::open(tmp.path()).await.unwrap());
        let channel = RecordingChannel::new();

        let failing = MockScraper::new(
            "failing",
            vec![Err(AppError::fetch("failing", "connection refused"))],
        );
        let healthy = MockScraper::new("healthy", vec![Ok(vec![raw("1", "\u{20ac} 100.000")])]);

        let orchestrator = orchestrator_with(
            test_config(),
            vec![failing, healthy],
            store.clone(),
            Some(channel.clone()),
        );
        let (_tx, rx) = watch::channel(false);

        let summary = orchestrator.run_cycle(&rx).await.unwrap().unwrap();

        let failed: Vec<&SourceReport> = summary.failed_sources().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].source_id, "failing");
        assert!(failed[0].error.as_deref().unwrap().contains("connection refused"));

        assert!(store.load_source("failing").await.unwrap().is_empty());
        assert_eq!(store.load_source("healthy").await.unwrap().len(), 1);
        assert_eq!(channel.sent(), vec!["New 1".to_string()]);
    }

    // A failed scan is not a removal: listings committed earlier survive
    // a cycle in which their source errors out.
    #[tokio::test]
    async fn test_failed_scan_does_not_remove_listings() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::open(tmp.path()).await.unwrap());

        let scraper = MockScraper::new(
            "mock",
            vec![
                Ok(vec![raw("1", "\u{20ac} 150.000")]),
                Err(AppError::parse("mock", "markup changed")),
            ],
        );
        let orchestrator =
            orchestrator_with(test_config(), vec![scraper], store.clone(), None);
        let (_tx, rx) = watch::channel(false);

        orchestrator.run_cycle(&rx).await.unwrap().unwrap();
        let second = orchestrator.run_cycle(&rx).await.unwrap().unwrap();

        assert_eq!(second.removed, 0);
        assert!(!second.sources[0].success);
        let state = store.load_source("mock").await.unwrap();
        assert_eq!(
            state.get("1").unwrap().status,
            crate::models::ListingStatus::Active
        );
    }

    // Filtered-out changes are stored but never dispatched.
    #[tokio::test]
    async fn test_filtered_event_stored_but_not_dispatched() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::open(tmp.path()).await.unwrap());
        let channel = RecordingChannel::new();

        let mut config = Config::default();
        config.filter.min_price = 100_000;
        config.filter.max_price = Some(225_000);
        config.crawler.source_timeout_secs = 5;

        let scraper = MockScraper::new("mock", vec![Ok(vec![raw("cheap", "\u{20ac} 90.000")])]);
        let orchestrator = orchestrator_with(
            Arc::new(config),
            vec![scraper],
            store.clone(),
            Some(channel.clone()),
        );
        let (_tx, rx) = watch::channel(false);

        let summary = orchestrator.run_cycle(&rx).await.unwrap().unwrap();

        // Counted and stored, but no channel traffic
        assert_eq!(summary.new, 1);
        assert_eq!(store.load_source("mock").await.unwrap().len(), 1);
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_candidates_are_counted_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::open(tmp.path()).await.unwrap());

        let malformed = RawListing {
            external_id: None,
            url: String::new(),
            ..RawListing::default()
        };
        let scraper = MockScraper::new(
            "mock",
            vec![Ok(vec![malformed, raw("ok", "\u{20ac} 120.000")])],
        );
        let orchestrator =
            orchestrator_with(test_config(), vec![scraper], store.clone(), None);
        let (_tx, rx) = watch::channel(false);

        let summary = orchestrator.run_cycle(&rx).await.unwrap().unwrap();
        assert!(summary.sources[0].success);
        assert_eq!(summary.sources[0].rejected, 1);
        assert_eq!(summary.new, 1);
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_coalesced() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::open(tmp.path()).await.unwrap());
        let scraper = MockScraper::slow("slow", Duration::from_millis(300));

        let orchestrator = Arc::new(orchestrator_with(
            test_config(),
            vec![scraper],
            store,
            None,
        ));
        let (_tx, rx) = watch::channel(false);

        let a = orchestrator.clone();
        let rx_a = rx.clone();
        let first = tokio::spawn(async move { a.run_cycle(&rx_a).await.unwrap() });

        // Give the first cycle time to take the guard
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = orchestrator.run_cycle(&rx).await.unwrap();
        assert!(second.is_none());

        assert!(first.await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_cycle_without_commit() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::open(tmp.path()).await.unwrap());
        let scraper = MockScraper::slow("slow", Duration::from_secs(3));

        let orchestrator = Arc::new(orchestrator_with(
            test_config(),
            vec![scraper],
            store.clone(),
            None,
        ));
        let (tx, rx) = watch::channel(false);

        let o = orchestrator.clone();
        let handle = tokio::spawn(async move { o.run_cycle(&rx).await.unwrap() });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let summary = handle.await.unwrap().unwrap();
        assert!(summary.cancelled);
        assert!(summary.sources.is_empty());
        assert!(store.load_source("slow").await.unwrap().is_empty());
    }
}
