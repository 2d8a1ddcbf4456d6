//! Job processing for the worker binary.
//!
//! A worker handles one job at a time. Throughput scales by running more
//! worker processes against the same queue.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::job::{JobState, RenderJob};
use crate::services::queue::{JobStore, QueueError};
use crate::services::renderer::{DocumentRenderer, RenderError};
use crate::services::storage::{ArtifactStore, StorageError};

/// Attempts at writing a job's terminal state before the outcome is given up.
const FINISH_ATTEMPTS: u32 = 3;
const FINISH_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Terminal result of processing one claimed job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed { reference: String },
    Failed { reason: String },
    /// The claim was lost (lease lapsed and the job was requeued) before the
    /// outcome could be recorded.
    Abandoned,
}

#[derive(Debug, thiserror::Error)]
enum JobError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct RenderWorker {
    id: String,
    queue: Arc<dyn JobStore>,
    renderer: Arc<dyn DocumentRenderer>,
    storage: ArtifactStore,
    lease_ttl: Duration,
}

impl RenderWorker {
    pub fn new(
        id: impl Into<String>,
        queue: Arc<dyn JobStore>,
        renderer: Arc<dyn DocumentRenderer>,
        storage: ArtifactStore,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            queue,
            renderer,
            storage,
            lease_ttl,
        }
    }

    /// `<host>-<uuid>`, unique per process.
    pub fn generate_id() -> String {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string());
        format!("{}-{}", host, Uuid::new_v4())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Claim and process the next job.
    /// Returns `Ok(None)` if the queue is empty.
    pub async fn process_next_job(&self) -> Result<Option<(Uuid, JobOutcome)>, QueueError> {
        let job = match self.queue.claim(&self.id, self.lease_ttl).await? {
            Some(j) => j,
            None => return Ok(None),
        };

        tracing::info!(
            job_id = %job.id,
            input_type = %job.spec.input_type,
            worker = %self.id,
            "Processing render job"
        );

        let start = Instant::now();
        let heartbeat = self.spawn_heartbeat(job.id);
        let rendered = self.render_and_store(&job).await;

        let outcome = self.record_outcome(job.id, rendered, start).await;
        // Renewal runs until the outcome is written so retries keep the claim.
        heartbeat.abort();
        let outcome = outcome?;

        metrics::histogram!("render_processing_seconds").record(start.elapsed().as_secs_f64());
        Ok(Some((job.id, outcome)))
    }

    async fn record_outcome(
        &self,
        job_id: Uuid,
        rendered: Result<String, JobError>,
        start: Instant,
    ) -> Result<JobOutcome, QueueError> {
        let outcome = match rendered {
            Ok(reference) => {
                if self.finish(job_id, JobState::Completed, &reference).await? {
                    metrics::counter!("render_jobs_completed").increment(1);
                    tracing::info!(
                        job_id = %job_id,
                        result = %reference,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Job completed"
                    );
                    JobOutcome::Completed { reference }
                } else {
                    tracing::warn!(job_id = %job_id, "Claim lost before completion was recorded");
                    JobOutcome::Abandoned
                }
            }
            Err(e) => {
                let mut reason = e.to_string();
                if reason.trim().is_empty() {
                    reason = "render failed".to_string();
                }
                if self.finish(job_id, JobState::Failed, &reason).await? {
                    metrics::counter!("render_jobs_failed").increment(1);
                    tracing::error!(job_id = %job_id, error = %reason, "Job failed");
                    JobOutcome::Failed { reason }
                } else {
                    tracing::warn!(job_id = %job_id, error = %reason, "Claim lost before failure was recorded");
                    JobOutcome::Abandoned
                }
            }
        };
        Ok(outcome)
    }

    /// Record a terminal state, retrying transient queue errors. If every
    /// attempt fails the job stays `active` until its lease lapses and it is
    /// requeued, so the lost outcome is logged in full.
    async fn finish(&self, job_id: Uuid, state: JobState, value: &str) -> Result<bool, QueueError> {
        let mut attempt = 1;
        loop {
            let written = match state {
                JobState::Completed => self.queue.complete(job_id, &self.id, value).await,
                _ => self.queue.fail(job_id, &self.id, value).await,
            };
            match written {
                Ok(recorded) => return Ok(recorded),
                Err(e) if attempt < FINISH_ATTEMPTS => {
                    tracing::warn!(
                        job_id = %job_id,
                        state = %state,
                        attempt,
                        error = %e,
                        "Failed to record job outcome, retrying"
                    );
                    tokio::time::sleep(FINISH_RETRY_DELAY * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        job_id = %job_id,
                        state = %state,
                        outcome = %value,
                        attempts = attempt,
                        error = %e,
                        "Giving up on recording job outcome; job will be requeued when its lease lapses"
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn render_and_store(&self, job: &RenderJob) -> Result<String, JobError> {
        let document = self.renderer.render(&job.spec).await?;
        tracing::debug!(
            job_id = %job.id,
            content_type = document.format.content_type(),
            bytes = document.bytes.len(),
            "Rendered document"
        );
        let reference = self
            .storage
            .save(job.id, document.format, &document.bytes)
            .await?;
        Ok(reference)
    }

    fn spawn_heartbeat(&self, job_id: Uuid) -> JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let worker = self.id.clone();
        let lease = self.lease_ttl;
        let period = (lease / 3).max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately; the claim itself set the lease.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match queue.renew_lease(job_id, &worker, lease).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(job_id = %job_id, "Lease renewal rejected, claim lost");
                        break;
                    }
                    Err(e) => tracing::warn!(job_id = %job_id, error = %e, "Lease renewal failed"),
                }
            }
        })
    }

    /// Put jobs abandoned by crashed workers back in the queue.
    async fn sweep_stalled(&self) -> Result<(), QueueError> {
        let requeued = self.queue.requeue_stalled().await?;
        if !requeued.is_empty() {
            metrics::counter!("render_jobs_requeued").increment(requeued.len() as u64);
            for id in &requeued {
                tracing::warn!(job_id = %id, "Requeued job whose lease expired");
            }
        }
        Ok(())
    }

    /// Main processing loop. Runs until `shutdown` flips to `true`; a job in
    /// progress is finished before returning.
    pub async fn run(&self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(worker = %self.id, "Worker ready, starting job processing loop");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let step = match self.sweep_stalled().await {
                Ok(()) => self.process_next_job().await,
                Err(e) => Err(e),
            };

            match step {
                Ok(Some(_)) => {
                    tracing::debug!("Job processed, checking for next job");
                    continue;
                }
                Ok(None) => {
                    tracing::trace!("No jobs available, sleeping");
                    if let Ok(depth) = self.queue.queue_depth().await {
                        metrics::gauge!("render_queue_depth").set(depth as f64);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Queue error, will retry");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                changed = shutdown.changed() => {
                    // Sender gone: nobody can signal shutdown anymore.
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(worker = %self.id, "Worker stopped");
    }
}
