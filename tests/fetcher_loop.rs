// tests/fetcher_loop.rs
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use pet_fetcher::{
    Animal, AnimalPage, AnimalSource, AnimalType, ChannelSink, ClientError, Criteria,
    CriteriaMergeError, Facet, Fetcher, FetcherError, FetcherState, Pagination, ResultSink,
    TickOutcome,
};

fn animal(id: i64) -> Animal {
    serde_json::from_value(serde_json::json!({ "id": id, "name": format!("pet-{id}") })).unwrap()
}

fn page(animals: Vec<Animal>) -> AnimalPage {
    let n = animals.len() as i64;
    AnimalPage {
        animals,
        pagination: Pagination {
            count_per_page: 20,
            total_count: n,
            current_page: 1,
            total_pages: 1,
        },
    }
}

/// Replays a script of responses, repeating the last one; records criteria seen.
struct ScriptedSource {
    script: Vec<Result<AnimalPage, ClientError>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Criteria>>,
}

impl ScriptedSource {
    fn new(script: Vec<Result<AnimalPage, ClientError>>) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl AnimalSource for ScriptedSource {
    async fn search_animals(&self, criteria: &Criteria) -> Result<AnimalPage, ClientError> {
        self.seen.lock().unwrap().push(criteria.clone());
        let i = self.calls.fetch_add(1, Ordering::SeqCst);
        self.script[i.min(self.script.len() - 1)].clone()
    }

    async fn animal_types(&self) -> Result<Vec<AnimalType>, ClientError> {
        Ok(Vec::new())
    }
}

/// Records when each outcome arrived (paused tokio clock).
struct TimedSink {
    tx: mpsc::UnboundedSender<(Instant, TickOutcome)>,
}

#[async_trait]
impl ResultSink for TimedSink {
    async fn deliver(&self, outcome: TickOutcome) {
        let _ = self.tx.send((Instant::now(), outcome));
    }
}

fn fetcher(source: Arc<ScriptedSource>, interval: Duration) -> Fetcher {
    Fetcher::new(source, Criteria::new().with_location("97201"), interval).unwrap()
}

#[tokio::test(start_paused = true)]
async fn failed_tick_does_not_stop_the_loop() {
    let src = ScriptedSource::new(vec![
        Err(ClientError::RemoteRequest {
            status: 503,
            body: "maintenance".into(),
        }),
        Ok(page(vec![animal(7)])),
    ]);
    let f = fetcher(src.clone(), Duration::from_secs(5));
    let (tx, mut rx) = mpsc::channel(8);
    let handle = f.start(ChannelSink::new(tx)).unwrap();

    let first = rx.recv().await.unwrap();
    assert!(matches!(
        first,
        TickOutcome::Failed(ClientError::RemoteRequest { status: 503, .. })
    ));

    let second = rx.recv().await.unwrap();
    match second {
        TickOutcome::Found { animals, .. } => assert_eq!(animals[0].id, 7),
        other => panic!("expected Found, got {other:?}"),
    }

    assert_eq!(f.state(), FetcherState::Running);
    handle.stop().await;
    assert_eq!(f.state(), FetcherState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn empty_page_is_reported_as_no_matches() {
    let src = ScriptedSource::new(vec![Ok(page(vec![]))]);
    let f = fetcher(src, Duration::from_secs(5));
    let (tx, mut rx) = mpsc::channel(8);
    let handle = f.start(ChannelSink::new(tx)).unwrap();

    let out = rx.recv().await.unwrap();
    assert_eq!(
        out,
        TickOutcome::NoMatches {
            pagination: Pagination {
                count_per_page: 20,
                total_count: 0,
                current_page: 1,
                total_pages: 1,
            }
        }
    );
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn interval_change_only_affects_the_following_gap() {
    let src = ScriptedSource::new(vec![Ok(page(vec![animal(1)]))]);
    let f = fetcher(src, Duration::from_secs(10));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let start = Instant::now();
    let handle = f.start(TimedSink { tx }).unwrap();

    let (t1, _) = rx.recv().await.unwrap();
    // The 10s wait is already scheduled when we change the interval.
    f.update_interval(Duration::from_secs(60));
    let (t2, _) = rx.recv().await.unwrap();
    let (t3, _) = rx.recv().await.unwrap();

    assert_eq!(t1 - start, Duration::ZERO);
    assert_eq!(t2 - t1, Duration::from_secs(10));
    assert_eq!(t3 - t2, Duration::from_secs(60));
    assert_eq!(f.interval(), Duration::from_secs(60));
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn criteria_added_while_running_is_used_by_next_tick() {
    let src = ScriptedSource::new(vec![Ok(page(vec![]))]);
    let f = Fetcher::new(
        src.clone(),
        Criteria::new().with_tokens(Facet::Type, ["dog"]),
        Duration::from_secs(5),
    )
    .unwrap();
    let (tx, mut rx) = mpsc::channel(8);
    let handle = f.start(ChannelSink::new(tx)).unwrap();

    rx.recv().await.unwrap();
    f.add_criteria(&Criteria::new().with_tokens(Facet::Type, ["cat"]))
        .unwrap();
    rx.recv().await.unwrap();
    handle.stop().await;

    let seen = src.seen.lock().unwrap();
    assert_eq!(seen[0].animal_type.len(), 1);
    assert!(seen[1].animal_type.contains("cat"));
    assert!(seen[1].animal_type.contains("dog"));
}

#[tokio::test]
async fn rejected_merge_leaves_criteria_untouched() {
    let src = ScriptedSource::new(vec![Ok(page(vec![]))]);
    let f = Fetcher::new(
        src,
        Criteria::new()
            .with_tokens(Facet::Breed, ["Pug"])
            .with_location("97201")
            .with_distance(10),
        Duration::from_secs(5),
    )
    .unwrap();
    let before = f.criteria();

    let bad = Criteria::new()
        .with_tokens(Facet::Breed, ["Beagle"])
        .with_distance(9_999);
    assert_eq!(
        f.add_criteria(&bad),
        Err(CriteriaMergeError::DistanceOutOfRange(9_999))
    );
    assert_eq!(f.criteria(), before);
}

#[tokio::test(start_paused = true)]
async fn stop_during_wait_prevents_further_ticks() {
    let src = ScriptedSource::new(vec![Ok(page(vec![animal(3)]))]);
    let f = fetcher(src.clone(), Duration::from_secs(30));
    let (tx, mut rx) = mpsc::channel(8);
    let handle = f.start(ChannelSink::new(tx)).unwrap();

    rx.recv().await.unwrap();
    handle.stop().await;
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(src.calls.load(Ordering::SeqCst), 1);
    // Sink dropped with the task; channel is closed with nothing buffered.
    assert!(rx.recv().await.is_none());
}

/// Blocks inside the search until released, to cancel mid-flight.
struct GatedSource {
    gate: tokio::sync::Notify,
    entered: tokio::sync::Notify,
    calls: AtomicUsize,
}

#[async_trait]
impl AnimalSource for GatedSource {
    async fn search_animals(&self, _criteria: &Criteria) -> Result<AnimalPage, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(page(vec![animal(9)]))
    }

    async fn animal_types(&self) -> Result<Vec<AnimalType>, ClientError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn cancel_mid_flight_still_delivers_that_tick() {
    let src = Arc::new(GatedSource {
        gate: tokio::sync::Notify::new(),
        entered: tokio::sync::Notify::new(),
        calls: AtomicUsize::new(0),
    });
    let f = Fetcher::new(src.clone(), Criteria::new(), Duration::from_millis(10)).unwrap();
    let (tx, mut rx) = mpsc::channel(8);
    let handle = f.start(ChannelSink::new(tx)).unwrap();

    src.entered.notified().await;
    handle.cancel();
    src.gate.notify_one();

    let out = rx.recv().await.unwrap();
    assert!(matches!(out, TickOutcome::Found { .. }));
    handle.stop().await;
    assert!(rx.recv().await.is_none());
    assert_eq!(src.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn lifecycle_guards() {
    let src = ScriptedSource::new(vec![Ok(page(vec![]))]);
    assert!(matches!(
        Fetcher::new(src.clone(), Criteria::new(), Duration::ZERO),
        Err(FetcherError::ZeroInterval)
    ));
    assert!(matches!(
        Fetcher::new(
            src.clone(),
            Criteria::new().with_tokens(Facet::GoodWith, ["ferrets"]),
            Duration::from_secs(1)
        ),
        Err(FetcherError::InvalidCriteria(_))
    ));

    let f = fetcher(src.clone(), Duration::from_secs(60));
    assert_eq!(f.state(), FetcherState::Idle);
    // Never started: no background searches.
    tokio::task::yield_now().await;
    assert_eq!(src.calls.load(Ordering::SeqCst), 0);

    f.update_interval(Duration::ZERO);
    assert_eq!(f.interval(), Duration::from_secs(60));

    let (tx, _rx) = mpsc::channel(8);
    let handle = f.start(ChannelSink::new(tx.clone())).unwrap();
    assert!(matches!(
        f.start(ChannelSink::new(tx)),
        Err(FetcherError::AlreadyStarted)
    ));
    handle.stop().await;
}

#[tokio::test]
async fn search_once_runs_without_the_loop() {
    let src = ScriptedSource::new(vec![Err(ClientError::Decode("bad".into()))]);
    let f = fetcher(src, Duration::from_secs(60));
    assert_eq!(
        f.search_once().await,
        TickOutcome::Failed(ClientError::Decode("bad".into()))
    );
    assert_eq!(f.state(), FetcherState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_add_criteria_keeps_every_token() {
    const N: usize = 16;
    let src = ScriptedSource::new(vec![Ok(page(vec![]))]);
    let f = fetcher(src, Duration::from_secs(60));

    let tasks: Vec<_> = (0..N)
        .map(|i| {
            let f = f.clone();
            tokio::spawn(async move {
                f.add_criteria(&Criteria::new().with_tokens(Facet::Breed, [format!("breed-{i}")]))
            })
        })
        .collect();
    for t in tasks {
        t.await.unwrap().unwrap();
    }

    let breeds = f.criteria().breed;
    assert_eq!(breeds.len(), N);
    for i in 0..N {
        assert!(breeds.contains(&format!("breed-{i}")), "breed-{i} missing");
    }
    assert_eq!(f.criteria().location.as_deref(), Some("97201"));
}

/// Panics on the first search, then behaves.
struct PanicsOnce {
    calls: AtomicUsize,
}

#[async_trait]
impl AnimalSource for PanicsOnce {
    async fn search_animals(&self, _criteria: &Criteria) -> Result<AnimalPage, ClientError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("source blew up");
        }
        Ok(page(vec![animal(11)]))
    }

    async fn animal_types(&self) -> Result<Vec<AnimalType>, ClientError> {
        Ok(Vec::new())
    }
}

#[tokio::test(start_paused = true)]
async fn panicking_search_fails_only_that_tick() {
    let src = Arc::new(PanicsOnce {
        calls: AtomicUsize::new(0),
    });
    let f = Fetcher::new(src, Criteria::new(), Duration::from_secs(5)).unwrap();
    let (tx, mut rx) = mpsc::channel(8);
    let handle = f.start(ChannelSink::new(tx)).unwrap();

    let first = rx.recv().await.unwrap();
    assert!(
        matches!(first, TickOutcome::Failed(ClientError::Internal(_))),
        "{first:?}"
    );
    let second = rx.recv().await.unwrap();
    assert!(matches!(second, TickOutcome::Found { .. }), "{second:?}");
    assert_eq!(f.state(), FetcherState::Running);

    handle.stop().await;
    assert_eq!(f.state(), FetcherState::Stopped);
}

struct PanickingSink;

#[async_trait]
impl ResultSink for PanickingSink {
    async fn deliver(&self, _outcome: TickOutcome) {
        panic!("sink blew up");
    }
}

#[tokio::test]
async fn loop_dying_by_panic_still_reports_stopped() {
    let src = ScriptedSource::new(vec![Ok(page(vec![animal(1)]))]);
    let f = fetcher(src.clone(), Duration::from_secs(60));
    let handle = f.start(PanickingSink).unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while f.state() == FetcherState::Running {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    assert_eq!(f.state(), FetcherState::Stopped);
    assert_eq!(src.calls.load(Ordering::SeqCst), 1);
    handle.stop().await;
}
