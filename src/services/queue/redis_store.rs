use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::{JobStore, QueueError};
use crate::models::job::{JobSpec, JobState, RenderJob};

const JOB_KEY_PREFIX: &str = "render:job:";
const LEASE_KEY_PREFIX: &str = "render:lease:";
const PENDING_KEY: &str = "render:jobs:pending";
const ACTIVE_KEY: &str = "render:jobs:active";

/// KEYS: pending, active. ARGV: job prefix, worker, now, lease prefix, lease ms.
const CLAIM_SCRIPT: &str = r#"
local id = redis.call('RPOPLPUSH', KEYS[1], KEYS[2])
if not id then
  return false
end
redis.call('HSET', ARGV[1] .. id, 'state', 'active', 'worker', ARGV[2], 'updated_at', ARGV[3])
redis.call('SET', ARGV[4] .. id, ARGV[2], 'PX', ARGV[5])
return id
"#;

/// KEYS: job, lease. ARGV: worker, lease ms.
const RENEW_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'state') ~= 'active' then
  return 0
end
if redis.call('HGET', KEYS[1], 'worker') ~= ARGV[1] then
  return 0
end
redis.call('SET', KEYS[2], ARGV[1], 'PX', ARGV[2])
return 1
"#;

/// KEYS: job, active, lease. ARGV: worker, state, field, value, now, id.
const FINISH_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'state') ~= 'active' then
  return 0
end
if redis.call('HGET', KEYS[1], 'worker') ~= ARGV[1] then
  return 0
end
redis.call('HSET', KEYS[1], 'state', ARGV[2], ARGV[3], ARGV[4], 'updated_at', ARGV[5])
redis.call('LREM', KEYS[2], 1, ARGV[6])
redis.call('DEL', KEYS[3])
return 1
"#;

/// KEYS: job, active, pending, lease. ARGV: id, now.
const REQUEUE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[4]) == 1 then
  return 0
end
if redis.call('LREM', KEYS[2], 1, ARGV[1]) == 0 then
  return 0
end
local state = redis.call('HGET', KEYS[1], 'state')
if state ~= 'active' and state ~= 'queued' then
  return 0
end
redis.call('HSET', KEYS[1], 'state', 'queued', 'updated_at', ARGV[2])
redis.call('HDEL', KEYS[1], 'worker')
redis.call('RPUSH', KEYS[3], ARGV[1])
return 1
"#;

fn job_key(id: impl std::fmt::Display) -> String {
    format!("{JOB_KEY_PREFIX}{id}")
}

fn lease_key(id: impl std::fmt::Display) -> String {
    format!("{LEASE_KEY_PREFIX}{id}")
}

fn lease_ms(lease: Duration) -> u64 {
    (lease.as_millis() as u64).max(1)
}

/// Redis-backed job queue.
///
/// Each job is a hash under `render:job:<id>`. Claimable ids sit in
/// `render:jobs:pending`, claimed ones in `render:jobs:active`, and a claim
/// is held by a `render:lease:<id>` key that expires unless renewed.
pub struct RedisJobStore {
    conn: ConnectionManager,
    claim_script: Script,
    renew_script: Script,
    finish_script: Script,
    requeue_script: Script,
}

impl RedisJobStore {
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            claim_script: Script::new(CLAIM_SCRIPT),
            renew_script: Script::new(RENEW_SCRIPT),
            finish_script: Script::new(FINISH_SCRIPT),
            requeue_script: Script::new(REQUEUE_SCRIPT),
        })
    }

    async fn finish(
        &self,
        id: Uuid,
        worker: &str,
        state: JobState,
        field: &str,
        value: &str,
    ) -> Result<bool, QueueError> {
        let mut conn = self.conn.clone();
        let id = id.to_string();
        let finished: i32 = self
            .finish_script
            .key(job_key(&id))
            .key(ACTIVE_KEY)
            .key(lease_key(&id))
            .arg(worker)
            .arg(state.to_string())
            .arg(field)
            .arg(value)
            .arg(Utc::now().to_rfc3339())
            .arg(&id)
            .invoke_async(&mut conn)
            .await?;
        Ok(finished == 1)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn enqueue(&self, spec: JobSpec) -> Result<RenderJob, QueueError> {
        let job = RenderJob::new(spec);
        let id = job.id.to_string();
        let spec_json = serde_json::to_string(&job.spec)?;
        let created_at = job.created_at.to_rfc3339();
        let state = job.state.to_string();

        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(
                job_key(&id),
                &[
                    ("id", id.as_str()),
                    ("spec", spec_json.as_str()),
                    ("state", state.as_str()),
                    ("created_at", created_at.as_str()),
                    ("updated_at", created_at.as_str()),
                ],
            )
            .ignore()
            .lpush(PENDING_KEY, &id)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<Option<RenderJob>, QueueError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(job_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        job_from_hash(id, fields).map(Some)
    }

    async fn claim(&self, worker: &str, lease: Duration) -> Result<Option<RenderJob>, QueueError> {
        let mut conn = self.conn.clone();
        let claimed: Option<String> = self
            .claim_script
            .key(PENDING_KEY)
            .key(ACTIVE_KEY)
            .arg(JOB_KEY_PREFIX)
            .arg(worker)
            .arg(Utc::now().to_rfc3339())
            .arg(LEASE_KEY_PREFIX)
            .arg(lease_ms(lease))
            .invoke_async(&mut conn)
            .await?;

        let Some(raw_id) = claimed else {
            return Ok(None);
        };
        let id = Uuid::parse_str(&raw_id).map_err(|e| QueueError::Corrupt {
            id: raw_id.clone(),
            reason: e.to_string(),
        })?;
        self.get(id).await
    }

    async fn renew_lease(&self, id: Uuid, worker: &str, lease: Duration) -> Result<bool, QueueError> {
        let mut conn = self.conn.clone();
        let renewed: i32 = self
            .renew_script
            .key(job_key(id))
            .key(lease_key(id))
            .arg(worker)
            .arg(lease_ms(lease))
            .invoke_async(&mut conn)
            .await?;
        Ok(renewed == 1)
    }

    async fn complete(&self, id: Uuid, worker: &str, result: &str) -> Result<bool, QueueError> {
        self.finish(id, worker, JobState::Completed, "result", result).await
    }

    async fn fail(&self, id: Uuid, worker: &str, reason: &str) -> Result<bool, QueueError> {
        self.finish(id, worker, JobState::Failed, "error", reason).await
    }

    async fn requeue_stalled(&self) -> Result<Vec<Uuid>, QueueError> {
        let mut conn = self.conn.clone();
        let active: Vec<String> = conn.lrange(ACTIVE_KEY, 0, -1).await?;

        let mut requeued = Vec::new();
        for raw_id in active {
            let moved: i32 = self
                .requeue_script
                .key(job_key(&raw_id))
                .key(ACTIVE_KEY)
                .key(PENDING_KEY)
                .key(lease_key(&raw_id))
                .arg(&raw_id)
                .arg(Utc::now().to_rfc3339())
                .invoke_async(&mut conn)
                .await?;

            if moved == 1 {
                match Uuid::parse_str(&raw_id) {
                    Ok(id) => requeued.push(id),
                    Err(e) => tracing::warn!(job_id = %raw_id, error = %e, "Requeued job with malformed id"),
                }
            }
        }
        Ok(requeued)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let depth: u64 = conn.llen(PENDING_KEY).await?;
        Ok(depth)
    }
}

fn job_from_hash(id: Uuid, mut fields: HashMap<String, String>) -> Result<RenderJob, QueueError> {
    let corrupt = |reason: String| QueueError::Corrupt {
        id: id.to_string(),
        reason,
    };

    let spec_json = fields
        .remove("spec")
        .ok_or_else(|| corrupt("missing spec".to_string()))?;
    let spec: JobSpec = serde_json::from_str(&spec_json)?;

    let state = fields
        .get("state")
        .ok_or_else(|| corrupt("missing state".to_string()))
        .and_then(|s| JobState::from_str(s).map_err(|e| corrupt(e.to_string())))?;

    let timestamp = |name: &str| -> Result<DateTime<Utc>, QueueError> {
        let raw = fields
            .get(name)
            .ok_or_else(|| corrupt(format!("missing {name}")))?;
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| corrupt(format!("{name}: {e}")))
    };
    let created_at = timestamp("created_at")?;
    let updated_at = timestamp("updated_at")?;

    Ok(RenderJob {
        id,
        spec,
        state,
        result: fields.remove("result"),
        failure_reason: fields.remove("error"),
        worker: fields.remove("worker"),
        created_at,
        updated_at,
    })
}
