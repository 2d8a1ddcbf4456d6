use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use super::{JobStore, QueueError};
use crate::models::job::{JobSpec, JobState, RenderJob};

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, RenderJob>,
    pending: VecDeque<Uuid>,
    leases: HashMap<Uuid, Instant>,
}

impl Inner {
    fn owned_active(&mut self, id: Uuid, worker: &str) -> Option<&mut RenderJob> {
        self.jobs
            .get_mut(&id)
            .filter(|job| job.state == JobState::Active && job.worker.as_deref() == Some(worker))
    }
}

/// In-process job queue with the same claim and lease semantics as the
/// Redis store. Jobs do not survive a restart.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(&self, spec: JobSpec) -> Result<RenderJob, QueueError> {
        let job = RenderJob::new(spec);
        let mut inner = self.inner.lock().await;
        inner.pending.push_back(job.id);
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<Option<RenderJob>, QueueError> {
        Ok(self.inner.lock().await.jobs.get(&id).cloned())
    }

    async fn claim(&self, worker: &str, lease: Duration) -> Result<Option<RenderJob>, QueueError> {
        let mut inner = self.inner.lock().await;
        while let Some(id) = inner.pending.pop_front() {
            let Some(job) = inner.jobs.get_mut(&id) else {
                continue;
            };
            job.state = JobState::Active;
            job.worker = Some(worker.to_string());
            job.updated_at = Utc::now();
            let claimed = job.clone();
            inner.leases.insert(id, Instant::now() + lease);
            return Ok(Some(claimed));
        }
        Ok(None)
    }

    async fn renew_lease(&self, id: Uuid, worker: &str, lease: Duration) -> Result<bool, QueueError> {
        let mut inner = self.inner.lock().await;
        if inner.owned_active(id, worker).is_none() {
            return Ok(false);
        }
        inner.leases.insert(id, Instant::now() + lease);
        Ok(true)
    }

    async fn complete(&self, id: Uuid, worker: &str, result: &str) -> Result<bool, QueueError> {
        let mut inner = self.inner.lock().await;
        let Some(job) = inner.owned_active(id, worker) else {
            return Ok(false);
        };
        job.state = JobState::Completed;
        job.result = Some(result.to_string());
        job.updated_at = Utc::now();
        inner.leases.remove(&id);
        Ok(true)
    }

    async fn fail(&self, id: Uuid, worker: &str, reason: &str) -> Result<bool, QueueError> {
        let mut inner = self.inner.lock().await;
        let Some(job) = inner.owned_active(id, worker) else {
            return Ok(false);
        };
        job.state = JobState::Failed;
        job.failure_reason = Some(reason.to_string());
        job.updated_at = Utc::now();
        inner.leases.remove(&id);
        Ok(true)
    }

    async fn requeue_stalled(&self) -> Result<Vec<Uuid>, QueueError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let expired: Vec<Uuid> = inner
            .leases
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        let mut requeued = Vec::new();
        for id in expired {
            inner.leases.remove(&id);
            let Some(job) = inner.jobs.get_mut(&id) else {
                continue;
            };
            if job.state != JobState::Active {
                continue;
            }
            job.state = JobState::Queued;
            job.worker = None;
            job.updated_at = Utc::now();
            inner.pending.push_front(id);
            requeued.push(id);
        }
        Ok(requeued)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }

    async fn queue_depth(&self) -> Result<u64, QueueError> {
        Ok(self.inner.lock().await.pending.len() as u64)
    }
}
