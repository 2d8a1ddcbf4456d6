//! Durable job queue shared by the gateway and the workers.
//!
//! The gateway only ever enqueues and reads; workers claim, heartbeat and
//! finish. Ownership of an active job is tracked per worker identity so a
//! terminal state is written at most once, by the claim holder.

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{JobSpec, RenderJob};

pub mod memory;
pub mod redis_store;

pub use memory::MemoryJobStore;
pub use redis_store::RedisJobStore;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job in `queued` state and make it claimable.
    async fn enqueue(&self, spec: JobSpec) -> Result<RenderJob, QueueError>;

    /// Look up a job. Never mutates.
    async fn get(&self, id: Uuid) -> Result<Option<RenderJob>, QueueError>;

    /// Claim the next queued job for `worker`, holding it for `lease`.
    async fn claim(&self, worker: &str, lease: Duration) -> Result<Option<RenderJob>, QueueError>;

    /// Extend the claim on an active job. Returns false if the claim was lost.
    async fn renew_lease(&self, id: Uuid, worker: &str, lease: Duration) -> Result<bool, QueueError>;

    /// Mark an active job completed with its artifact reference.
    async fn complete(&self, id: Uuid, worker: &str, result: &str) -> Result<bool, QueueError>;

    /// Mark an active job failed.
    async fn fail(&self, id: Uuid, worker: &str, reason: &str) -> Result<bool, QueueError>;

    /// Put active jobs whose lease lapsed back in the queue.
    async fn requeue_stalled(&self) -> Result<Vec<Uuid>, QueueError>;

    /// Check connectivity.
    async fn ping(&self) -> Result<(), QueueError>;

    /// Number of jobs waiting to be claimed.
    async fn queue_depth(&self) -> Result<u64, QueueError>;
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Corrupt job record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}
