// src/fetcher.rs
//! Polling loop: owns the accumulated criteria and the interval, and reports
//! one outcome per tick to a caller-supplied sink.

use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::FetcherConfig;
use crate::criteria::{merge, Criteria};
use crate::error::{ClientError, CriteriaMergeError, FetcherError};
use crate::pfclient::types::{Animal, Pagination};
use crate::pfclient::{AnimalSource, PfClient};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("fetcher_ticks_total", "Polling ticks executed.");
        describe_counter!("fetcher_tick_errors_total", "Ticks whose search failed.");
        describe_counter!(
            "fetcher_no_match_ticks_total",
            "Ticks that searched successfully but found nothing."
        );
        describe_counter!("fetcher_animals_found_total", "Animals delivered to the sink.");
        describe_histogram!("fetcher_search_ms", "Search call latency in milliseconds.");
        describe_gauge!("fetcher_last_tick_ts", "Unix ts of the last completed tick.");
    });
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Found {
        animals: Vec<Animal>,
        pagination: Pagination,
    },
    /// The search succeeded but returned an empty page.
    NoMatches { pagination: Pagination },
    Failed(ClientError),
}

impl TickOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Found { .. } => "found",
            Self::NoMatches { .. } => "no_matches",
            Self::Failed(_) => "failed",
        }
    }
}

/// Receives tick outcomes. `deliver` is awaited before the next tick is
/// scheduled, so outcomes arrive strictly in order.
#[async_trait]
pub trait ResultSink: Send + Sync + 'static {
    async fn deliver(&self, outcome: TickOutcome);
}

/// Forwards outcomes into an mpsc channel.
pub struct ChannelSink {
    tx: mpsc::Sender<TickOutcome>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<TickOutcome>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ResultSink for ChannelSink {
    async fn deliver(&self, outcome: TickOutcome) {
        if self.tx.send(outcome).await.is_err() {
            tracing::debug!(target: "fetcher", "sink receiver dropped; outcome discarded");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetcherState {
    Idle,
    Running,
    Stopped,
}

struct Shared {
    criteria: Mutex<Criteria>,
    interval: Mutex<Duration>,
    state: Mutex<FetcherState>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cheap to clone; clones share criteria, interval and lifecycle.
#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn AnimalSource>,
    shared: Arc<Shared>,
}

impl Fetcher {
    pub fn new(
        source: Arc<dyn AnimalSource>,
        criteria: Criteria,
        interval: Duration,
    ) -> Result<Self, FetcherError> {
        if interval.is_zero() {
            return Err(FetcherError::ZeroInterval);
        }
        // Normalizes tokens and rejects values the service would not accept.
        let criteria = merge(&Criteria::default(), &criteria)?;

        Ok(Self {
            source,
            shared: Arc::new(Shared {
                criteria: Mutex::new(criteria),
                interval: Mutex::new(interval),
                state: Mutex::new(FetcherState::Idle),
            }),
        })
    }

    /// Build the Petfinder client from `cfg` and wrap it in a fetcher.
    pub fn connect(cfg: &FetcherConfig) -> Result<Self, FetcherError> {
        let client = PfClient::new(&cfg.api_key, &cfg.api_secret, &cfg.base_url)?
            .with_timeout(cfg.request_timeout_secs);
        Self::new(Arc::new(client), cfg.criteria.clone(), cfg.interval)
    }

    pub fn source(&self) -> Arc<dyn AnimalSource> {
        self.source.clone()
    }

    /// Merge `partial` into the stored criteria. On error nothing changes.
    pub fn add_criteria(&self, partial: &Criteria) -> Result<(), CriteriaMergeError> {
        let mut current = lock(&self.shared.criteria);
        let merged = merge(&current, partial)?;
        *current = merged;
        tracing::info!(target: "fetcher", criteria = ?*current, "criteria updated");
        Ok(())
    }

    /// Replace the interval. Applies from the next wait; the one already
    /// running is not shortened or extended. Zero is ignored.
    pub fn update_interval(&self, interval: Duration) {
        if interval.is_zero() {
            tracing::warn!(target: "fetcher", "ignoring zero polling interval");
            return;
        }
        *lock(&self.shared.interval) = interval;
        tracing::info!(target: "fetcher", interval_secs = interval.as_secs_f64(), "interval updated");
    }

    pub fn criteria(&self) -> Criteria {
        lock(&self.shared.criteria).clone()
    }

    pub fn interval(&self) -> Duration {
        *lock(&self.shared.interval)
    }

    pub fn state(&self) -> FetcherState {
        *lock(&self.shared.state)
    }

    /// Run one search with the current criteria, outside the loop.
    pub async fn search_once(&self) -> TickOutcome {
        let snapshot = self.criteria();
        search_tick(self.source.as_ref(), &snapshot).await
    }

    /// Spawn the polling loop. The first tick runs immediately.
    pub fn start<S: ResultSink>(&self, sink: S) -> Result<FetcherHandle, FetcherError> {
        {
            let mut state = lock(&self.shared.state);
            if *state != FetcherState::Idle {
                return Err(FetcherError::AlreadyStarted);
            }
            *state = FetcherState::Running;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(
            self.source.clone(),
            self.shared.clone(),
            sink,
            cancel.clone(),
        ));
        tracing::info!(target: "fetcher", interval_secs = self.interval().as_secs_f64(), "polling started");
        Ok(FetcherHandle { cancel, task })
    }
}

/// Handle to a running loop.
pub struct FetcherHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl FetcherHandle {
    /// Request a stop without waiting. An in-flight tick still delivers.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Request a stop and wait for the loop to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(target: "fetcher", error = ?e, "polling task ended abnormally");
        }
    }
}

async fn search_tick(source: &dyn AnimalSource, criteria: &Criteria) -> TickOutcome {
    let t0 = std::time::Instant::now();
    let res = source.search_animals(criteria).await;
    histogram!("fetcher_search_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

    match res {
        Ok(page) if page.animals.is_empty() => {
            counter!("fetcher_no_match_ticks_total").increment(1);
            TickOutcome::NoMatches {
                pagination: page.pagination,
            }
        }
        Ok(page) => {
            counter!("fetcher_animals_found_total").increment(page.animals.len() as u64);
            if page.pagination.has_more() {
                tracing::debug!(
                    target: "fetcher",
                    total = page.pagination.total_count,
                    pages = page.pagination.total_pages,
                    "more pages available; only the first is fetched"
                );
            }
            TickOutcome::Found {
                animals: page.animals,
                pagination: page.pagination,
            }
        }
        Err(e) => {
            counter!("fetcher_tick_errors_total").increment(1);
            tracing::warn!(target: "fetcher", error = %e, "search failed; waiting for next tick");
            TickOutcome::Failed(e)
        }
    }
}

/// Runs the search on its own task so a panicking source fails the tick
/// instead of the loop.
async fn isolated_tick(source: Arc<dyn AnimalSource>, criteria: Criteria) -> TickOutcome {
    let task = tokio::spawn(async move { search_tick(source.as_ref(), &criteria).await });
    match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            counter!("fetcher_tick_errors_total").increment(1);
            tracing::error!(target: "fetcher", error = %e, "search task panicked");
            TickOutcome::Failed(ClientError::Internal(e.to_string()))
        }
    }
}

/// Marks the fetcher Stopped when the loop exits, including by unwinding.
struct StoppedOnDrop(Arc<Shared>);

impl Drop for StoppedOnDrop {
    fn drop(&mut self) {
        *lock(&self.0.state) = FetcherState::Stopped;
    }
}

async fn run_loop<S: ResultSink>(
    source: Arc<dyn AnimalSource>,
    shared: Arc<Shared>,
    sink: S,
    cancel: CancellationToken,
) {
    ensure_metrics_described();
    let _stopped = StoppedOnDrop(shared.clone());
    let mut tick: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        tick += 1;

        let snapshot = lock(&shared.criteria).clone();
        let outcome = isolated_tick(source.clone(), snapshot).await;

        counter!("fetcher_ticks_total").increment(1);
        gauge!("fetcher_last_tick_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
        tracing::info!(target: "fetcher", tick, outcome = outcome.kind(), "tick");

        sink.deliver(outcome).await;

        if cancel.is_cancelled() {
            break;
        }
        let wait = *lock(&shared.interval);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    tracing::info!(target: "fetcher", ticks = tick, "polling stopped");
}
