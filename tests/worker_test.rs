//! Worker lifecycle over the in-memory store with a stub renderer.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use uuid::Uuid;

use render_queue::models::format::OutputFormat;
use render_queue::models::job::{InputType, JobSpec, JobState, RenderOptions};
use render_queue::models::job::RenderJob;
use render_queue::services::queue::{JobStore, MemoryJobStore, QueueError};
use render_queue::services::renderer::{DocumentRenderer, RenderError, RenderedDocument};
use render_queue::services::storage::ArtifactStore;
use render_queue::worker::{JobOutcome, RenderWorker};

/// Echoes the job content as the document body. URLs on `.invalid` fail the
/// way an unreachable host does.
struct EchoRenderer {
    delay: Duration,
}

#[async_trait]
impl DocumentRenderer for EchoRenderer {
    async fn render(&self, spec: &JobSpec) -> Result<RenderedDocument, RenderError> {
        tokio::time::sleep(self.delay).await;
        if spec.input_type == InputType::Url && spec.content.contains(".invalid") {
            return Err(RenderError::Load(format!(
                "{}: net::ERR_NAME_NOT_RESOLVED",
                spec.content
            )));
        }
        Ok(RenderedDocument {
            format: OutputFormat::from_options(&spec.options),
            bytes: spec.content.clone().into_bytes(),
        })
    }
}

/// Memory store whose terminal writes fail a set number of times before
/// going through.
struct UnreliableStore {
    inner: MemoryJobStore,
    finish_failures: AtomicUsize,
}

impl UnreliableStore {
    fn new(finish_failures: usize) -> Self {
        Self {
            inner: MemoryJobStore::new(),
            finish_failures: AtomicUsize::new(finish_failures),
        }
    }

    fn outage(&self, id: Uuid) -> Result<(), QueueError> {
        let left = self.finish_failures.load(Ordering::SeqCst);
        if left == 0 {
            return Ok(());
        }
        self.finish_failures.store(left - 1, Ordering::SeqCst);
        Err(QueueError::Corrupt {
            id: id.to_string(),
            reason: "connection reset".to_string(),
        })
    }
}

#[async_trait]
impl JobStore for UnreliableStore {
    async fn enqueue(&self, spec: JobSpec) -> Result<RenderJob, QueueError> {
        self.inner.enqueue(spec).await
    }
    async fn get(&self, id: Uuid) -> Result<Option<RenderJob>, QueueError> {
        self.inner.get(id).await
    }
    async fn claim(&self, worker: &str, lease: Duration) -> Result<Option<RenderJob>, QueueError> {
        self.inner.claim(worker, lease).await
    }
    async fn renew_lease(&self, id: Uuid, worker: &str, lease: Duration) -> Result<bool, QueueError> {
        self.inner.renew_lease(id, worker, lease).await
    }
    async fn complete(&self, id: Uuid, worker: &str, result: &str) -> Result<bool, QueueError> {
        self.outage(id)?;
        self.inner.complete(id, worker, result).await
    }
    async fn fail(&self, id: Uuid, worker: &str, reason: &str) -> Result<bool, QueueError> {
        self.outage(id)?;
        self.inner.fail(id, worker, reason).await
    }
    async fn requeue_stalled(&self) -> Result<Vec<Uuid>, QueueError> {
        self.inner.requeue_stalled().await
    }
    async fn ping(&self) -> Result<(), QueueError> {
        self.inner.ping().await
    }
    async fn queue_depth(&self) -> Result<u64, QueueError> {
        self.inner.queue_depth().await
    }
}

fn unreliable_worker(store: &Arc<UnreliableStore>, output: &TempDir, lease: Duration) -> RenderWorker {
    RenderWorker::new(
        "w1",
        store.clone(),
        Arc::new(EchoRenderer { delay: Duration::ZERO }),
        ArtifactStore::new(output.path()),
        lease,
    )
}

fn html(content: &str, format: Option<&str>) -> JobSpec {
    JobSpec {
        input_type: InputType::Html,
        content: content.to_string(),
        options: RenderOptions {
            format: format.map(str::to_string),
            ..Default::default()
        },
    }
}

fn worker(
    id: &str,
    store: &Arc<MemoryJobStore>,
    output: &TempDir,
    delay: Duration,
    lease: Duration,
) -> RenderWorker {
    RenderWorker::new(
        id,
        store.clone(),
        Arc::new(EchoRenderer { delay }),
        ArtifactStore::new(output.path()),
        lease,
    )
}

#[tokio::test]
async fn test_empty_queue_yields_nothing() {
    let store = Arc::new(MemoryJobStore::new());
    let output = TempDir::new().unwrap();
    let w = worker("w1", &store, &output, Duration::ZERO, Duration::from_secs(30));
    assert!(w.process_next_job().await.unwrap().is_none());
}

#[tokio::test]
async fn test_html_job_completes_with_pdf_reference() {
    let store = Arc::new(MemoryJobStore::new());
    let output = TempDir::new().unwrap();
    let job = store.enqueue(html("<h1>Hi</h1>", None)).await.unwrap();

    let w = worker("w1", &store, &output, Duration::ZERO, Duration::from_secs(30));
    let (id, outcome) = w.process_next_job().await.unwrap().unwrap();
    assert_eq!(id, job.id);

    let JobOutcome::Completed { reference } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert!(reference.ends_with(".pdf"), "{reference}");
    assert!(reference.contains(&job.id.to_string()));
    assert_eq!(std::fs::read_to_string(&reference).unwrap(), "<h1>Hi</h1>");

    let stored = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Completed);
    assert_eq!(stored.result.as_deref(), Some(reference.as_str()));
    assert!(stored.failure_reason.is_none());
}

#[tokio::test]
async fn test_extension_follows_requested_format() {
    let store = Arc::new(MemoryJobStore::new());
    let output = TempDir::new().unwrap();
    let cases = [
        (Some("png"), "png"),
        (Some("DOCX"), "docx"),
        (Some("letter"), "pdf"),
        (Some("bmp"), "pdf"),
        (None, "pdf"),
    ];

    let w = worker("w1", &store, &output, Duration::ZERO, Duration::from_secs(30));
    for (format, extension) in cases {
        let job = store.enqueue(html("<p>x</p>", format)).await.unwrap();
        let (id, outcome) = w.process_next_job().await.unwrap().unwrap();
        assert_eq!(id, job.id);
        match outcome {
            JobOutcome::Completed { reference } => {
                assert!(
                    reference.ends_with(&format!(".{extension}")),
                    "{format:?} -> {reference}"
                );
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_render_error_fails_job_with_reason() {
    let store = Arc::new(MemoryJobStore::new());
    let output = TempDir::new().unwrap();
    let job = store
        .enqueue(JobSpec {
            input_type: InputType::Url,
            content: "https://example.invalid".to_string(),
            options: RenderOptions::default(),
        })
        .await
        .unwrap();

    let w = worker("w1", &store, &output, Duration::ZERO, Duration::from_secs(30));
    let (_, outcome) = w.process_next_job().await.unwrap().unwrap();
    assert!(matches!(outcome, JobOutcome::Failed { .. }));

    let stored = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);
    assert!(stored.result.is_none());
    let reason = stored.failure_reason.unwrap();
    assert!(reason.contains("ERR_NAME_NOT_RESOLVED"), "{reason}");

    // Failed jobs are not retried.
    assert!(w.process_next_job().await.unwrap().is_none());
}

#[tokio::test]
async fn test_failure_does_not_affect_next_job() {
    let store = Arc::new(MemoryJobStore::new());
    let output = TempDir::new().unwrap();
    store
        .enqueue(JobSpec {
            input_type: InputType::Url,
            content: "https://example.invalid".to_string(),
            options: RenderOptions::default(),
        })
        .await
        .unwrap();
    let good = store.enqueue(html("<p>ok</p>", Some("png"))).await.unwrap();

    let w = worker("w1", &store, &output, Duration::ZERO, Duration::from_secs(30));
    w.process_next_job().await.unwrap().unwrap();
    let (id, outcome) = w.process_next_job().await.unwrap().unwrap();
    assert_eq!(id, good.id);
    assert!(matches!(outcome, JobOutcome::Completed { .. }));
}

#[tokio::test]
async fn test_storage_failure_fails_job() {
    let store = Arc::new(MemoryJobStore::new());
    let output = TempDir::new().unwrap();
    // A file where the output directory should be.
    let blocked = output.path().join("artifacts");
    std::fs::write(&blocked, b"").unwrap();
    let job = store.enqueue(html("<p>x</p>", None)).await.unwrap();

    let w = RenderWorker::new(
        "w1",
        store.clone(),
        Arc::new(EchoRenderer { delay: Duration::ZERO }),
        ArtifactStore::new(&blocked),
        Duration::from_secs(30),
    );
    let (_, outcome) = w.process_next_job().await.unwrap().unwrap();
    assert!(matches!(outcome, JobOutcome::Failed { .. }), "{outcome:?}");

    let stored = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);
    assert!(!stored.failure_reason.unwrap().is_empty());
}

#[tokio::test]
async fn test_transient_queue_error_does_not_lose_failure() {
    let store = Arc::new(UnreliableStore::new(2));
    let output = TempDir::new().unwrap();
    let job = store
        .enqueue(JobSpec {
            input_type: InputType::Url,
            content: "https://example.invalid".to_string(),
            options: RenderOptions::default(),
        })
        .await
        .unwrap();

    let w = unreliable_worker(&store, &output, Duration::from_millis(300));
    let (_, outcome) = w.process_next_job().await.unwrap().unwrap();
    assert!(matches!(outcome, JobOutcome::Failed { .. }), "{outcome:?}");

    let stored = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);

    // Failed stays failed: nothing to requeue once the lease would have lapsed.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(store.requeue_stalled().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_transient_queue_error_does_not_lose_completion() {
    let store = Arc::new(UnreliableStore::new(1));
    let output = TempDir::new().unwrap();
    let job = store.enqueue(html("<p>x</p>", None)).await.unwrap();

    let w = unreliable_worker(&store, &output, Duration::from_secs(30));
    let (_, outcome) = w.process_next_job().await.unwrap().unwrap();
    assert!(matches!(outcome, JobOutcome::Completed { .. }), "{outcome:?}");
    assert_eq!(
        store.get(job.id).await.unwrap().unwrap().state,
        JobState::Completed
    );
}

#[tokio::test]
async fn test_persistent_queue_error_leaves_job_for_requeue() {
    let store = Arc::new(UnreliableStore::new(usize::MAX));
    let output = TempDir::new().unwrap();
    let job = store.enqueue(html("<p>x</p>", None)).await.unwrap();

    let w = unreliable_worker(&store, &output, Duration::from_millis(100));
    assert!(w.process_next_job().await.is_err());
    assert_eq!(store.get(job.id).await.unwrap().unwrap().state, JobState::Active);

    // The heartbeat stopped with the attempt, so the claim lapses.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.requeue_stalled().await.unwrap(), vec![job.id]);
}

#[tokio::test]
async fn test_two_workers_never_cross_assign_results() {
    let store = Arc::new(MemoryJobStore::new());
    let output = TempDir::new().unwrap();
    let first = store.enqueue(html("<p>first</p>", None)).await.unwrap();
    let second = store.enqueue(html("<p>second</p>", Some("png"))).await.unwrap();

    let a = worker("worker-a", &store, &output, Duration::from_millis(50), Duration::from_secs(30));
    let b = worker("worker-b", &store, &output, Duration::from_millis(50), Duration::from_secs(30));

    let (ra, rb) = tokio::join!(a.process_next_job(), b.process_next_job());
    let (ida, _) = ra.unwrap().unwrap();
    let (idb, _) = rb.unwrap().unwrap();
    assert_ne!(ida, idb);

    for (job, content, extension) in [(&first, "<p>first</p>", "pdf"), (&second, "<p>second</p>", "png")] {
        let stored = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Completed);
        let reference = stored.result.unwrap();
        assert!(reference.contains(&job.id.to_string()));
        assert!(reference.ends_with(extension));
        assert_eq!(std::fs::read_to_string(&reference).unwrap(), content);
    }

    let mut owners = Vec::new();
    for id in [first.id, second.id] {
        owners.push(store.get(id).await.unwrap().unwrap().worker);
    }
    assert!(owners.contains(&Some("worker-a".to_string())));
    assert!(owners.contains(&Some("worker-b".to_string())));
}

#[tokio::test]
async fn test_worker_pool_processes_each_job_once() {
    let store = Arc::new(MemoryJobStore::new());
    let output = TempDir::new().unwrap();
    let mut ids = Vec::new();
    for n in 0..8 {
        ids.push(store.enqueue(html(&format!("<p>{n}</p>"), None)).await.unwrap().id);
    }

    let workers: Vec<_> = (0..3)
        .map(|n| {
            worker(
                &format!("pool-{n}"),
                &store,
                &output,
                Duration::from_millis(5),
                Duration::from_secs(30),
            )
        })
        .collect();

    let drains = workers.iter().map(|w| async move {
        let mut seen = Vec::new();
        while let Some((id, outcome)) = tokio_test::assert_ok!(w.process_next_job().await) {
            assert!(matches!(outcome, JobOutcome::Completed { .. }));
            seen.push(id);
        }
        seen
    });
    let mut processed: Vec<Uuid> = futures::future::join_all(drains)
        .await
        .into_iter()
        .flatten()
        .collect();

    processed.sort();
    ids.sort();
    assert_eq!(processed, ids);
}

#[tokio::test]
async fn test_heartbeat_keeps_slow_job_claimed() {
    let store = Arc::new(MemoryJobStore::new());
    let output = TempDir::new().unwrap();
    let job = store.enqueue(html("<p>slow</p>", None)).await.unwrap();

    let w = worker("w1", &store, &output, Duration::from_millis(400), Duration::from_millis(150));

    let sweeper = {
        let store = store.clone();
        async move {
            let mut requeued = Vec::new();
            for _ in 0..15 {
                tokio::time::sleep(Duration::from_millis(20)).await;
                requeued.extend(store.requeue_stalled().await.unwrap());
            }
            requeued
        }
    };

    let (processed, requeued) = tokio::join!(w.process_next_job(), sweeper);
    assert!(requeued.is_empty(), "requeued {requeued:?}");
    let (id, outcome) = processed.unwrap().unwrap();
    assert_eq!(id, job.id);
    assert!(matches!(outcome, JobOutcome::Completed { .. }));
}

#[tokio::test]
async fn test_stalled_job_is_picked_up_by_another_worker() {
    let store = Arc::new(MemoryJobStore::new());
    let output = TempDir::new().unwrap();
    let job = store.enqueue(html("<p>orphan</p>", None)).await.unwrap();

    // A worker that claimed the job and then died.
    store
        .claim("crashed-worker", Duration::from_millis(20))
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let w = worker("w2", &store, &output, Duration::ZERO, Duration::from_secs(30));
    let (stop_tx, stop_rx) = watch::channel(false);
    let w = Arc::new(w);
    let handle = tokio::spawn({
        let w = w.clone();
        async move { w.run(Duration::from_millis(10), stop_rx).await }
    });

    let stored = wait_for_terminal(&store, job.id).await;
    assert_eq!(stored.state, JobState::Completed);
    assert_eq!(stored.worker.as_deref(), Some("w2"));

    // The original claimant can no longer record an outcome.
    assert!(!store.complete(job.id, "crashed-worker", "stale").await.unwrap());

    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_run_returns_when_already_stopped() {
    let store = Arc::new(MemoryJobStore::new());
    let output = TempDir::new().unwrap();
    store.enqueue(html("<p>x</p>", None)).await.unwrap();

    let w = worker("w1", &store, &output, Duration::ZERO, Duration::from_secs(30));
    let (_stop_tx, stop_rx) = watch::channel(true);
    w.run(Duration::from_millis(10), stop_rx).await;

    assert_eq!(store.queue_depth().await.unwrap(), 1);
}

async fn wait_for_terminal(store: &MemoryJobStore, id: Uuid) -> render_queue::models::job::RenderJob {
    for _ in 0..200 {
        let job = store.get(id).await.unwrap().unwrap();
        if job.state.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached a terminal state");
}
