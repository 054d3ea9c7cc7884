use crate::models::ListingRecord;
use crate::notify::Notifier;
use crate::scrapers::{Extractor, ListingFetcher};
use crate::store::{DedupStore, Snapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Summary of one fetch/extract/filter/notify pass
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub extracted: usize,
    pub new_listings: usize,
    pub chunks_sent: usize,
    pub chunks_failed: usize,
    /// Set when the fetch failed and the tick ended early
    pub fetch_error: Option<String>,
}

/// Drives the pipeline on a fixed interval and on manual triggers
pub struct Scheduler {
    fetcher: Arc<dyn ListingFetcher>,
    extractor: Extractor,
    notifier: Arc<dyn Notifier>,
    store: DedupStore,
    snapshot: Option<Snapshot>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(
        fetcher: Arc<dyn ListingFetcher>,
        extractor: Extractor,
        notifier: Arc<dyn Notifier>,
        store: DedupStore,
        interval: Duration,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            notifier,
            store,
            snapshot: None,
            interval,
        }
    }

    pub fn with_snapshot(mut self, snapshot: Snapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    /// Run forever; a tick never overlaps another
    pub async fn run(mut self, mut triggers: mpsc::Receiver<()>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Polling {} every {}s ({} known addresses)",
            self.fetcher.source_name(),
            self.interval.as_secs(),
            self.store().len()
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                Some(()) = triggers.recv() => {
                    info!("Manual check requested");
                }
            }

            let report = self.tick().await;
            info!(
                "Tick done: {} extracted, {} new, {} chunks sent, {} failed",
                report.extracted, report.new_listings, report.chunks_sent, report.chunks_failed
            );
        }
    }

    /// One pass; every failure is logged and absorbed here
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        let doc = match self.fetcher.fetch().await {
            Ok(doc) => doc,
            Err(e) => {
                error!(status = ?e.status(), "Failed to retrieve data: {}", e);
                report.fetch_error = Some(e.to_string());
                return report;
            }
        };

        let records = self.extractor.extract(&doc);
        report.extracted = records.len();

        let mut fresh = Vec::new();
        for record in &records {
            if self.store.is_known(&record.address) {
                // Still listed, so keep it out of reach of retention
                self.store.touch(&record.address);
            } else {
                fresh.push(record.clone());
            }
        }
        report.new_listings = fresh.len();

        if fresh.is_empty() {
            info!("No new properties found.");
        } else {
            for record in &fresh {
                log_new_listing(record);
            }

            let sent = self.notifier.notify(&fresh).await;
            report.chunks_sent = sent.chunks_sent;
            report.chunks_failed = sent.chunks_failed;
            if sent.chunks_failed > 0 {
                warn!(
                    "{} of {} chunks failed; those listings will not be retried",
                    sent.chunks_failed,
                    sent.chunks()
                );
            }

            // Marked only after the send attempt
            for record in &fresh {
                if let Err(e) = self.store.mark_known(&record.address).await {
                    error!("Failed to persist '{}': {}", record.address, e);
                }
            }
        }

        self.update_snapshot(records).await;
        report
    }

    async fn update_snapshot(&mut self, records: Vec<ListingRecord>) {
        let Some(snapshot) = self.snapshot.as_mut() else {
            return;
        };

        let store = &self.store;
        snapshot.merge(records.into_iter().map(|mut r| {
            if store.is_known(&r.address) {
                r.mark_processed();
            }
            r
        }));

        if let Err(e) = snapshot.save().await {
            warn!("Failed to save snapshot: {}", e);
        }
    }
}

fn log_new_listing(record: &ListingRecord) {
    info!("=== New Property Found ===");
    info!("Address: {}", record.address);
    info!("Price: {}", record.price);
    info!("Features: {:?}", record.details);
    info!("ImageURL: {}", record.image_url);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::notify::embed::MAX_EMBEDS_PER_MESSAGE;
    use crate::notify::{NotifyError, NotifyReport};
    use crate::scrapers::{FetchError, RawDocument};
    use crate::store::temp_path;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    /// Replays queued fetch results; repeats the last one when exhausted
    pub struct FakeFetcher {
        results: Mutex<VecDeque<Result<String, String>>>,
        last: Mutex<Option<Result<String, String>>>,
        pub calls: Mutex<usize>,
    }

    impl FakeFetcher {
        pub fn new(results: Vec<Result<String, String>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                last: Mutex::new(None),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl ListingFetcher for FakeFetcher {
        async fn fetch(&self) -> Result<RawDocument, FetchError> {
            *self.calls.lock().await += 1;
            let next = self.results.lock().await.pop_front();
            let mut last = self.last.lock().await;
            let result = match next {
                Some(r) => {
                    *last = Some(r.clone());
                    r
                }
                None => last.clone().unwrap_or_else(|| Err("no response queued".into())),
            };
            match result {
                Ok(body) => Ok(RawDocument::new("fake://search", body)),
                Err(msg) => Err(FetchError::transport(
                    "fake://search",
                    std::io::Error::new(std::io::ErrorKind::ConnectionRefused, msg),
                )),
            }
        }

        fn source_name(&self) -> &'static str {
            "Fake"
        }
    }

    /// Records every chunk it would have sent
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub chunks: Mutex<Vec<Vec<String>>>,
        pub cleared: Mutex<usize>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, records: &[ListingRecord]) -> NotifyReport {
            let mut chunks = self.chunks.lock().await;
            let mut report = NotifyReport::default();
            for chunk in records.chunks(MAX_EMBEDS_PER_MESSAGE) {
                chunks.push(chunk.iter().map(|r| r.address.clone()).collect());
                report.chunks_sent += 1;
            }
            report
        }

        async fn clear_recent(&self, limit: usize) -> Result<usize, NotifyError> {
            *self.cleared.lock().await += limit;
            Ok(limit)
        }
    }

    fn listing(address: &str, image: Option<&str>) -> String {
        let image = image
            .map(|src| format!(r#"<div data-testid="imageContainer"><img src="{src}"></div>"#))
            .unwrap_or_default();
        format!(
            r#"<li data-testid="result"><div data-tracking="srp_address"><p>{address}</p></div><div data-tracking="srp_price"><p>€180,000</p></div><div data-tracking="srp_meta"><span>3 Bed</span></div>{image}</li>"#
        )
    }

    pub fn three_listing_page() -> String {
        format!(
            "<html><body><ul>{}{}{}</ul></body></html>",
            listing("14 Willow Park, Dublin 15", Some("https://media.daft.ie/14.jpg")),
            listing("2 Church Lane, Ashbourne, Co. Meath", None),
            listing("Site at Ballymacarney, Co. Meath", Some("https://media.daft.ie/s.jpg")),
        )
    }

    async fn scheduler(
        fetcher: Arc<FakeFetcher>,
        notifier: Arc<RecordingNotifier>,
    ) -> (Scheduler, std::path::PathBuf) {
        let path = temp_path("known.txt");
        let store = DedupStore::load(&path, None).await;
        let scheduler = Scheduler::new(
            fetcher,
            Extractor::default(),
            notifier,
            store,
            Duration::from_secs(5),
        );
        (scheduler, path)
    }

    #[tokio::test]
    async fn test_end_to_end_tick() {
        let fetcher = Arc::new(FakeFetcher::new(vec![Ok(three_listing_page())]));
        let notifier = Arc::new(RecordingNotifier::default());
        let (mut scheduler, path) = scheduler(fetcher, notifier.clone()).await;
        let snapshot_path = temp_path("all_properties.json");
        scheduler = scheduler.with_snapshot(Snapshot::load(&snapshot_path).await);

        let report = scheduler.tick().await;

        assert_eq!(report.extracted, 2);
        assert_eq!(report.new_listings, 2);
        assert_eq!(report.chunks_sent, 1);

        let chunks = notifier.chunks.lock().await.clone();
        assert_eq!(
            chunks,
            vec![vec![
                "14 Willow Park, Dublin 15".to_string(),
                "2 Church Lane, Ashbourne, Co. Meath".to_string(),
            ]]
        );

        let reloaded = DedupStore::try_load(&path, None).await.unwrap();
        assert_eq!(reloaded.len(), 2);

        let snapshot = Snapshot::try_load(&snapshot_path).await.unwrap();
        let no_image = snapshot.get("2 Church Lane, Ashbourne, Co. Meath").unwrap();
        assert_eq!(no_image.image_url, "N/A");
        assert!(no_image.processed);
        assert_eq!(snapshot.processed_count(), 2);
    }

    #[tokio::test]
    async fn test_same_page_twice_notifies_once() {
        let fetcher = Arc::new(FakeFetcher::new(vec![Ok(three_listing_page())]));
        let notifier = Arc::new(RecordingNotifier::default());
        let (mut scheduler, _) = scheduler(fetcher, notifier.clone()).await;

        scheduler.tick().await;
        let second = scheduler.tick().await;

        assert_eq!(second.extracted, 2);
        assert_eq!(second.new_listings, 0);
        assert_eq!(notifier.chunks.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_known_addresses_survive_restart() {
        let fetcher = Arc::new(FakeFetcher::new(vec![Ok(three_listing_page())]));
        let notifier = Arc::new(RecordingNotifier::default());
        let (mut first, path) = scheduler(fetcher.clone(), notifier.clone()).await;
        first.tick().await;
        drop(first);

        let store = DedupStore::load(&path, None).await;
        let mut restarted = Scheduler::new(
            fetcher,
            Extractor::default(),
            notifier.clone(),
            store,
            Duration::from_secs(5),
        );
        let report = restarted.tick().await;

        assert_eq!(report.new_listings, 0);
        assert_eq!(notifier.chunks.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_retention_cap_never_reannounces_live_listings() {
        let fetcher = Arc::new(FakeFetcher::new(vec![Ok(three_listing_page())]));
        let notifier = Arc::new(RecordingNotifier::default());
        let path = temp_path("known.txt");
        let mut scheduler = Scheduler::new(
            fetcher,
            Extractor::default(),
            notifier.clone(),
            DedupStore::load(&path, Some(2)).await,
            Duration::from_secs(5),
        );

        let mut new_per_tick = Vec::new();
        for _ in 0..4 {
            new_per_tick.push(scheduler.tick().await.new_listings);
        }

        assert_eq!(new_per_tick, vec![2, 0, 0, 0]);
        assert_eq!(notifier.chunks.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_retention_drops_listings_that_left_the_page() {
        let second_page = format!(
            "<ul>{}{}</ul>",
            listing("14 Willow Park, Dublin 15", None),
            listing("77 New Street, Dublin 7", None),
        );
        let fetcher = Arc::new(FakeFetcher::new(vec![
            Ok(three_listing_page()),
            Ok(second_page),
        ]));
        let notifier = Arc::new(RecordingNotifier::default());
        let path = temp_path("known.txt");
        let mut scheduler = Scheduler::new(
            fetcher,
            Extractor::default(),
            notifier.clone(),
            DedupStore::load(&path, Some(2)).await,
            Duration::from_secs(5),
        );

        scheduler.tick().await;
        let second = scheduler.tick().await;
        let third = scheduler.tick().await;

        assert_eq!(second.new_listings, 1);
        assert_eq!(third.new_listings, 0);
        assert!(scheduler.store().is_known("14 Willow Park, Dublin 15"));
        assert!(!scheduler.store().is_known("2 Church Lane, Ashbourne, Co. Meath"));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_isolated() {
        let fetcher = Arc::new(FakeFetcher::new(vec![
            Err("connection refused".into()),
            Ok(three_listing_page()),
        ]));
        let notifier = Arc::new(RecordingNotifier::default());
        let (mut scheduler, _) = scheduler(fetcher, notifier.clone()).await;

        let failed = scheduler.tick().await;
        assert!(failed.fetch_error.is_some());
        assert_eq!(failed.new_listings, 0);
        assert!(notifier.chunks.lock().await.is_empty());
        assert!(scheduler.store().is_empty());

        let recovered = scheduler.tick().await;
        assert!(recovered.fetch_error.is_none());
        assert_eq!(recovered.new_listings, 2);
    }

    #[tokio::test]
    async fn test_large_page_is_chunked() {
        let cards: String = (0..23)
            .map(|i| listing(&format!("{} Station Road, Dublin 13", i), None))
            .collect();
        let page = format!("<ul>{}</ul>", cards);
        let fetcher = Arc::new(FakeFetcher::new(vec![Ok(page)]));
        let notifier = Arc::new(RecordingNotifier::default());
        let (mut scheduler, _) = scheduler(fetcher, notifier.clone()).await;

        let report = scheduler.tick().await;

        assert_eq!(report.chunks_sent, 3);
        let sizes: Vec<_> = notifier.chunks.lock().await.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_keeps_running_after_failed_tick() {
        let fetcher = Arc::new(FakeFetcher::new(vec![
            Err("dns failure".into()),
            Ok(three_listing_page()),
        ]));
        let notifier = Arc::new(RecordingNotifier::default());
        let (scheduler, _) = scheduler(fetcher.clone(), notifier.clone()).await;
        let (_tx, rx) = mpsc::channel(1);

        let handle = tokio::spawn(scheduler.run(rx));

        let waited = tokio::time::timeout(Duration::from_secs(60), async {
            while notifier.chunks.lock().await.is_empty() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await;
        handle.abort();

        assert!(waited.is_ok());
        assert!(*fetcher.calls.lock().await >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_trigger_runs_a_tick() {
        let fetcher = Arc::new(FakeFetcher::new(vec![Ok("<ul></ul>".into())]));
        let notifier = Arc::new(RecordingNotifier::default());
        let path = temp_path("known.txt");
        let scheduler = Scheduler::new(
            fetcher.clone(),
            Extractor::default(),
            notifier,
            DedupStore::load(&path, None).await,
            Duration::from_secs(3600),
        );
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(scheduler.run(rx));

        // First interval tick fires immediately
        while *fetcher.calls.lock().await < 1 {
            tokio::task::yield_now().await;
        }
        tx.send(()).await.unwrap();
        let waited = tokio::time::timeout(Duration::from_secs(60), async {
            while *fetcher.calls.lock().await < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        handle.abort();

        assert!(waited.is_ok());
    }
}
