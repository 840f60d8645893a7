//! Concurrent multi-source harvest for one coordinate.
//!
//! Fans out to every enabled source in parallel, then:
//! 1. Each source task collects through its own limiter
//! 2. Non-empty results are persisted (with retry) before success is sent
//! 3. The caller returns on the first success, or once every source failed
//!
//! Tasks still running after an early return are not cancelled. They are
//! tracked so [`HarvestOrchestrator::drain`] can wait for them at shutdown.

use std::sync::Arc;
use std::time::Duration;

use han_collectors::{Coordinate, Image, RateLimiter, SourceCollector};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use crate::error::{HanError, Result};
use crate::reporting::{ErrorSink, report};
use crate::store::Store;

/// A collector paired with the limiter that owns its query budget.
#[derive(Clone)]
pub struct HarvestSource {
    pub collector: Arc<dyn SourceCollector>,
    pub limiter: Arc<RateLimiter>,
}

impl HarvestSource {
    /// Wrap `collector` with a fresh limiter.
    pub fn new(collector: Arc<dyn SourceCollector>) -> Self {
        Self {
            collector,
            limiter: Arc::new(RateLimiter::new()),
        }
    }

    pub fn name(&self) -> &str {
        self.collector.name()
    }

    pub fn is_enabled(&self) -> bool {
        self.collector.config().enabled
    }
}

impl std::fmt::Debug for HarvestSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarvestSource")
            .field("name", &self.name())
            .field("quota", &self.limiter.snapshot())
            .finish()
    }
}

/// Why a source did not contribute to a harvest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The limiter denied the first call.
    QuotaExceeded,
    /// The source answered with nothing.
    NoImages,
    /// Transport, auth or parse failure.
    Source(String),
    /// Persistence failed after every retry.
    Store(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub reason: FailureReason,
}

/// Result of one harvest call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestOutcome {
    /// The first source to persist a non-empty result.
    Succeeded { source: String, images: usize },
    /// Every enabled source failed.
    QuorumFailure { failures: Vec<SourceFailure> },
}

impl HarvestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Persistence retry schedule: `attempts` tries, doubling from `base_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

type SourceReport = std::result::Result<(String, usize), SourceFailure>;

/// Fans harvests out to every enabled source.
pub struct HarvestOrchestrator {
    store: Arc<dyn Store>,
    sources: Vec<HarvestSource>,
    sink: Option<Arc<dyn ErrorSink>>,
    retry: RetryPolicy,
    tracker: TaskTracker,
}

impl HarvestOrchestrator {
    pub fn new(store: Arc<dyn Store>, sources: Vec<HarvestSource>, sink: Option<Arc<dyn ErrorSink>>) -> Self {
        Self {
            store,
            sources,
            sink,
            retry: RetryPolicy::default(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn sources(&self) -> &[HarvestSource] {
        &self.sources
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Harvest `coord` with every enabled source, tagging images with
    /// `coord` as their region.
    ///
    /// # Errors
    ///
    /// Returns [`HanError::Config`] when no source is enabled. Source and
    /// store failures are folded into [`HarvestOutcome::QuorumFailure`].
    pub async fn harvest(&self, coord: Coordinate) -> Result<HarvestOutcome> {
        self.harvest_with(coord, &self.sources).await
    }

    /// [`harvest`](Self::harvest) restricted to `sources`.
    pub async fn harvest_with(&self, coord: Coordinate, sources: &[HarvestSource]) -> Result<HarvestOutcome> {
        if !coord.is_valid() {
            return Err(HanError::Validation(format!("invalid coordinate {coord}")));
        }
        let enabled: Vec<HarvestSource> = sources.iter().filter(|s| s.is_enabled()).cloned().collect();
        if enabled.is_empty() {
            return Err(HanError::Config("no enabled image sources".into()));
        }

        tracing::debug!(%coord, sources = enabled.len(), "harvest started");

        // Capacity covers every report so stragglers never block on send.
        let (tx, mut rx) = mpsc::channel::<SourceReport>(enabled.len());
        for source in enabled {
            let tx = tx.clone();
            let store = Arc::clone(&self.store);
            let sink = self.sink.clone();
            let retry = self.retry;
            self.tracker.spawn(async move {
                let report = run_source(source, coord, store, sink, retry).await;
                // The caller may already have returned.
                let _ = tx.send(report).await;
            });
        }
        drop(tx);

        let mut failures = Vec::new();
        while let Some(report) = rx.recv().await {
            match report {
                Ok((source, images)) => {
                    tracing::info!(%coord, %source, images, "harvest succeeded");
                    return Ok(HarvestOutcome::Succeeded { source, images });
                }
                Err(failure) => failures.push(failure),
            }
        }

        tracing::warn!(%coord, failed = failures.len(), "every source failed to harvest");
        Ok(HarvestOutcome::QuorumFailure { failures })
    }

    /// Start [`harvest`](Self::harvest) in a tracked task and return at once.
    /// [`drain`](Self::drain) waits for it along with its source tasks.
    pub fn spawn_harvest(self: &Arc<Self>, coord: Coordinate) {
        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            match this.harvest(coord).await {
                Ok(HarvestOutcome::Succeeded { source, images }) => {
                    tracing::debug!(%coord, %source, images, "background harvest finished");
                }
                Ok(HarvestOutcome::QuorumFailure { .. }) => {
                    tracing::warn!(%coord, "background harvest found no images");
                }
                Err(e) => tracing::warn!(%coord, error = %e, "background harvest failed"),
            }
        });
    }

    /// Number of tracked harvest and source tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every straggling source task to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

async fn run_source(
    source: HarvestSource,
    region: Coordinate,
    store: Arc<dyn Store>,
    sink: Option<Arc<dyn ErrorSink>>,
    retry: RetryPolicy,
) -> SourceReport {
    let name = source.name().to_owned();
    let fail = |reason| SourceFailure {
        source: name.clone(),
        reason,
    };

    let images = match source.collector.get_images(region, &source.limiter).await {
        Ok(images) => images,
        Err(e) if e.is_quota() => {
            tracing::debug!(source = %name, "query budget exhausted");
            return Err(fail(FailureReason::QuotaExceeded));
        }
        Err(e) => {
            tracing::warn!(source = %name, error = %e, "source query failed");
            report(sink.as_ref(), &format!("{name} Error: {e}")).await;
            return Err(fail(FailureReason::Source(e.to_string())));
        }
    };

    if images.is_empty() {
        tracing::debug!(source = %name, %region, "source returned no images");
        return Err(fail(FailureReason::NoImages));
    }

    let count = images.len();
    if let Err(e) = persist(store, images, region, retry).await {
        tracing::error!(source = %name, error = %e, "failed to persist harvested images");
        report(sink.as_ref(), &format!("{name} Error: {e}")).await;
        return Err(fail(FailureReason::Store(e.to_string())));
    }

    tracing::debug!(source = %name, count, "harvested images persisted");
    Ok((name, count))
}

/// Write `images` on the blocking pool, retrying with exponential backoff.
async fn persist(store: Arc<dyn Store>, images: Vec<Image>, region: Coordinate, retry: RetryPolicy) -> Result<()> {
    let images = Arc::new(images);
    let attempts = retry.attempts.max(1);
    let mut delay = retry.base_delay;

    for attempt in 1..=attempts {
        let store = Arc::clone(&store);
        let batch = Arc::clone(&images);
        let result = tokio::task::spawn_blocking(move || store.add_bulk_images(&batch, region))
            .await
            .map_err(|e| HanError::Store(format!("persist task failed: {e}")))
            .and_then(|r| r);

        match result {
            Ok(()) => return Ok(()),
            Err(e) if attempt < attempts => {
                tracing::warn!(attempt, error = %e, "persist failed, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
    Err(HanError::Store("no persist attempts made".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use han_collectors::{CollectError, SourceConfig};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const REGION: Coordinate = Coordinate::new(-35.250327, 149.075300);

    enum Behaviour {
        Images(usize),
        Fail,
    }

    struct MockSource {
        config: SourceConfig,
        delay: Duration,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl SourceCollector for MockSource {
        fn config(&self) -> &SourceConfig {
            &self.config
        }

        async fn get_images(&self, coord: Coordinate, limiter: &RateLimiter) -> std::result::Result<Vec<Image>, CollectError> {
            limiter.try_acquire(&self.config)?;
            tokio::time::sleep(self.delay).await;
            match self.behaviour {
                Behaviour::Images(n) => Ok((0..n)
                    .map(|i| Image::new(format!("{}-{i}", self.config.name), "", 0, coord, self.config.name.clone()))
                    .collect()),
                Behaviour::Fail => Err(CollectError::Http("connection reset".into())),
            }
        }
    }

    fn source(name: &str, delay_ms: u64, behaviour: Behaviour) -> HarvestSource {
        HarvestSource::new(Arc::new(MockSource {
            config: SourceConfig::new(name).enabled(true).with_budget(10, 3600),
            delay: Duration::from_millis(delay_ms),
            behaviour,
        }))
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<String>>);

    #[async_trait]
    impl ErrorSink for RecordingSink {
        async fn log(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_owned());
        }
    }

    /// Fails the first `failures` bulk writes, then delegates.
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicUsize,
    }

    impl Store for FlakyStore {
        fn regions(&self) -> Result<Vec<Coordinate>> {
            self.inner.regions()
        }
        fn add_region(&self, center: Coordinate) -> Result<()> {
            self.inner.add_region(center)
        }
        fn add_image(&self, image: Image) -> Result<()> {
            self.inner.add_image(image)
        }
        fn add_bulk_images(&self, images: &[Image], region: Coordinate) -> Result<()> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(HanError::Store("database is locked".into()));
            }
            self.inner.add_bulk_images(images, region)
        }
        fn query_near(&self, coord: Coordinate, start: usize, end: usize) -> Result<Vec<Image>> {
            self.inner.query_near(coord, start, end)
        }
        fn all_images(&self) -> Result<Vec<Image>> {
            self.inner.all_images()
        }
        fn soft_delete(&self, id: &str, reason: &str) -> Result<bool> {
            self.inner.soft_delete(id, reason)
        }
        fn size(&self) -> Result<usize> {
            self.inner.size()
        }
        fn delete_oldest(&self, n: usize) -> Result<usize> {
            self.inner.delete_oldest(n)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn single_source_success() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = HarvestOrchestrator::new(store.clone(), vec![source("a", 5, Behaviour::Images(3))], None);

        let outcome = orchestrator.harvest(REGION).await.unwrap();
        assert_eq!(
            outcome,
            HarvestOutcome::Succeeded {
                source: "a".into(),
                images: 3
            }
        );
        // Success is only signalled after persistence.
        assert_eq!(store.size().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_denial_counts_toward_quorum_but_is_not_reported() {
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(RecordingSink::default());
        let exhausted = HarvestSource::new(Arc::new(MockSource {
            config: SourceConfig::new("exhausted").enabled(true).with_budget(0, 3600),
            delay: Duration::ZERO,
            behaviour: Behaviour::Images(1),
        }));
        let orchestrator = HarvestOrchestrator::new(
            store.clone(),
            vec![exhausted, source("broken", 1, Behaviour::Fail)],
            Some(recorder.clone() as Arc<dyn ErrorSink>),
        );

        let outcome = orchestrator.harvest(REGION).await.unwrap();
        let HarvestOutcome::QuorumFailure { failures } = outcome else {
            panic!("expected quorum failure");
        };
        assert_eq!(failures.len(), 2);
        assert!(failures.contains(&SourceFailure {
            source: "exhausted".into(),
            reason: FailureReason::QuotaExceeded,
        }));
        assert!(failures.iter().any(|f| f.source == "broken" && matches!(f.reason, FailureReason::Source(_))));

        let messages = recorder.0.lock().unwrap().clone();
        assert_eq!(messages, vec!["broken Error: HTTP error: connection reset".to_owned()]);
        assert_eq!(store.size().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_result_is_failure() {
        let orchestrator = HarvestOrchestrator::new(
            Arc::new(MemoryStore::new()),
            vec![source("empty", 1, Behaviour::Images(0))],
            None,
        );
        let outcome = orchestrator.harvest(REGION).await.unwrap();
        assert_eq!(
            outcome,
            HarvestOutcome::QuorumFailure {
                failures: vec![SourceFailure {
                    source: "empty".into(),
                    reason: FailureReason::NoImages,
                }]
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_harvest_is_awaited_by_drain() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = Arc::new(HarvestOrchestrator::new(
            store.clone(),
            vec![source("slow", 5_000, Behaviour::Images(3))],
            None,
        ));

        orchestrator.spawn_harvest(REGION);
        assert_eq!(store.size().unwrap(), 0);
        assert!(orchestrator.in_flight() >= 1);

        orchestrator.drain().await;
        assert_eq!(orchestrator.in_flight(), 0);
        assert_eq!(store.size().unwrap(), 3);
    }

    #[tokio::test]
    async fn disabled_sources_are_skipped() {
        let disabled = HarvestSource::new(Arc::new(MockSource {
            config: SourceConfig::new("off").with_budget(10, 3600),
            delay: Duration::ZERO,
            behaviour: Behaviour::Images(1),
        }));
        let orchestrator = HarvestOrchestrator::new(Arc::new(MemoryStore::new()), vec![disabled], None);
        let err = orchestrator.harvest(REGION).await.unwrap_err();
        assert!(matches!(err, HanError::Config(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_is_retried() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures: AtomicUsize::new(2),
        });
        let orchestrator = HarvestOrchestrator::new(store.clone(), vec![source("a", 0, Behaviour::Images(2))], None);

        let outcome = orchestrator.harvest(REGION).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(store.size().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_failure_after_retries_is_reported() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures: AtomicUsize::new(usize::MAX),
        });
        let recorder = Arc::new(RecordingSink::default());
        let orchestrator = HarvestOrchestrator::new(
            store,
            vec![source("a", 0, Behaviour::Images(2))],
            Some(recorder.clone() as Arc<dyn ErrorSink>),
        );

        let outcome = orchestrator.harvest(REGION).await.unwrap();
        let HarvestOutcome::QuorumFailure { failures } = outcome else {
            panic!("expected quorum failure");
        };
        assert!(matches!(failures[0].reason, FailureReason::Store(_)));
        let messages = recorder.0.lock().unwrap().clone();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("a Error: store error"));
    }

    #[tokio::test]
    async fn invalid_coordinate_rejected() {
        let orchestrator = HarvestOrchestrator::new(
            Arc::new(MemoryStore::new()),
            vec![source("a", 0, Behaviour::Images(1))],
            None,
        );
        let err = orchestrator.harvest(Coordinate::new(f64::NAN, 0.0)).await.unwrap_err();
        assert!(matches!(err, HanError::Validation(_)));
    }

    #[test]
    fn harvest_source_debug_names_source() {
        let s = source("flickr", 0, Behaviour::Images(0));
        assert!(format!("{s:?}").contains("flickr"));
    }
}
