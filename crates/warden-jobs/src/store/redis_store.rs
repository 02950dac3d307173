//! Redis-backed task store.
//!
//! Layout under the configured prefix:
//!
//! - `{prefix}:queue:{name}`: list per queue, `LPUSH` in, `RPOPLPUSH` out
//! - `{prefix}:processing:{consumer}`: reserved tasks of one consumer awaiting `LREM`
//! - `{prefix}:consumers`: set of consumers that may own a processing list
//! - `{prefix}:heartbeat:{consumer}`: expiring key refreshed while a consumer runs
//! - `{prefix}:scheduled`: sorted set of delayed retries scored by due time (ms)
//! - `{prefix}:dead`: list of dead-letter entries, newest first
//!
//! A consumer only reclaims its own processing list and the lists of
//! consumers whose heartbeat has expired.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_core::dispatch::TaskQueue;

use super::TaskStore;
use crate::error::JobResult;
use crate::task::{DeadLetter, Reserved, Task};

/// Upper bound on tasks promoted per call.
const PROMOTE_BATCH: usize = 100;

const DEFAULT_HEARTBEAT_TTL: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct RedisTaskStore {
    conn: MultiplexedConnection,
    prefix: String,
    consumer: String,
    heartbeat_ttl: Duration,
}

impl RedisTaskStore {
    pub async fn connect(url: &str, prefix: impl Into<String>) -> JobResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self::with_connection(conn, prefix))
    }

    /// A store with a random consumer name.
    pub fn with_connection(conn: MultiplexedConnection, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
            consumer: Uuid::new_v4().simple().to_string(),
            heartbeat_ttl: DEFAULT_HEARTBEAT_TTL,
        }
    }

    /// Name the processing list this store reserves into. A restarted
    /// worker that keeps its name reclaims its own tasks immediately.
    pub fn with_consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = consumer.into();
        self
    }

    pub fn with_heartbeat_ttl(mut self, ttl: Duration) -> Self {
        self.heartbeat_ttl = ttl.max(Duration::from_secs(1));
        self
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    fn queue_key(&self, queue: TaskQueue) -> String {
        queue_key(&self.prefix, queue)
    }

    fn processing_key(&self) -> String {
        processing_key(&self.prefix, &self.consumer)
    }

    fn consumers_key(&self) -> String {
        format!("{}:consumers", self.prefix)
    }

    fn scheduled_key(&self) -> String {
        format!("{}:scheduled", self.prefix)
    }

    fn dead_key(&self) -> String {
        format!("{}:dead", self.prefix)
    }

    /// Move every task of the processing list at `key` back to the
    /// consuming end of its ready queue.
    async fn requeue(&self, conn: &mut MultiplexedConnection, key: &str) -> JobResult<usize> {
        let mut requeued = 0;
        loop {
            let raw: Option<String> = redis::cmd("RPOP").arg(key).query_async(&mut *conn).await?;
            let Some(raw) = raw else { break };

            let task: Task = match serde_json::from_str(&raw) {
                Ok(task) => task,
                Err(e) => {
                    warn!(error = %e, "Discarding undecodable in-flight task");
                    continue;
                }
            };
            let _: i64 = redis::cmd("RPUSH")
                .arg(self.queue_key(task.queue))
                .arg(&raw)
                .query_async(&mut *conn)
                .await?;
            requeued += 1;
        }
        Ok(requeued)
    }
}

fn queue_key(prefix: &str, queue: TaskQueue) -> String {
    format!("{prefix}:queue:{}", queue.as_str())
}

fn processing_key(prefix: &str, consumer: &str) -> String {
    format!("{prefix}:processing:{consumer}")
}

fn heartbeat_key(prefix: &str, consumer: &str) -> String {
    format!("{prefix}:heartbeat:{consumer}")
}

#[async_trait]
impl TaskStore for RedisTaskStore {
    async fn push(&self, task: &Task) -> JobResult<()> {
        let raw = serde_json::to_string(task)?;
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(self.queue_key(task.queue))
            .arg(raw)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn reserve(&self, queue: TaskQueue) -> JobResult<Option<Reserved>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("RPOPLPUSH")
            .arg(self.queue_key(queue))
            .arg(self.processing_key())
            .query_async(&mut conn)
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str::<Task>(&raw) {
            Ok(task) => Ok(Some(Reserved { task, receipt: raw })),
            Err(e) => {
                // Unreadable entries would be redelivered forever.
                warn!(queue = %queue, error = %e, "Dropping undecodable task");
                let _: i64 = redis::cmd("LREM")
                    .arg(self.processing_key())
                    .arg(1)
                    .arg(&raw)
                    .query_async(&mut conn)
                    .await?;
                let _: i64 = redis::cmd("LPUSH")
                    .arg(self.dead_key())
                    .arg(&raw)
                    .query_async(&mut conn)
                    .await?;
                Err(e.into())
            }
        }
    }

    async fn ack(&self, reserved: &Reserved) -> JobResult<()> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("LREM")
            .arg(self.processing_key())
            .arg(1)
            .arg(&reserved.receipt)
            .query_async(&mut conn)
            .await?;
        if removed == 0 {
            debug!(task_id = %reserved.task.id, "Acknowledged task was not in flight");
        }
        Ok(())
    }

    async fn schedule(&self, task: &Task, run_at: DateTime<Utc>) -> JobResult<()> {
        let raw = serde_json::to_string(task)?;
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("ZADD")
            .arg(self.scheduled_key())
            .arg(run_at.timestamp_millis())
            .arg(raw)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> JobResult<usize> {
        let mut conn = self.conn.clone();
        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.scheduled_key())
            .arg("-inf")
            .arg(now.timestamp_millis())
            .arg("LIMIT")
            .arg(0)
            .arg(PROMOTE_BATCH)
            .query_async(&mut conn)
            .await?;

        let mut promoted = 0;
        for raw in due {
            // Whoever removes the entry owns the promotion.
            let removed: i64 = redis::cmd("ZREM")
                .arg(self.scheduled_key())
                .arg(&raw)
                .query_async(&mut conn)
                .await?;
            if removed == 0 {
                continue;
            }

            let task: Task = serde_json::from_str(&raw)?;
            let _: i64 = redis::cmd("LPUSH")
                .arg(self.queue_key(task.queue))
                .arg(&raw)
                .query_async(&mut conn)
                .await?;
            promoted += 1;
        }
        Ok(promoted)
    }

    async fn dead_letter(&self, entry: &DeadLetter) -> JobResult<()> {
        let raw = serde_json::to_string(entry)?;
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(self.dead_key())
            .arg(raw)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn recover(&self) -> JobResult<usize> {
        self.heartbeat().await?;

        let mut conn = self.conn.clone();
        let consumers: Vec<String> = redis::cmd("SMEMBERS")
            .arg(self.consumers_key())
            .query_async(&mut conn)
            .await?;

        let mut recovered = self.requeue(&mut conn, &self.processing_key()).await?;
        for consumer in consumers.iter().filter(|c| **c != self.consumer) {
            let alive: i64 = redis::cmd("EXISTS")
                .arg(heartbeat_key(&self.prefix, consumer))
                .query_async(&mut conn)
                .await?;
            if alive > 0 {
                continue;
            }

            let reclaimed = self
                .requeue(&mut conn, &processing_key(&self.prefix, consumer))
                .await?;
            let _: i64 = redis::cmd("SREM")
                .arg(self.consumers_key())
                .arg(consumer)
                .query_async(&mut conn)
                .await?;
            if reclaimed > 0 {
                info!(consumer = %consumer, reclaimed, "Reclaimed tasks of a stopped consumer");
            }
            recovered += reclaimed;
        }
        Ok(recovered)
    }

    async fn heartbeat(&self) -> JobResult<()> {
        let mut conn = self.conn.clone();
        let () = redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(self.consumers_key())
            .arg(&self.consumer)
            .ignore()
            .cmd("SET")
            .arg(heartbeat_key(&self.prefix, &self.consumer))
            .arg(Utc::now().timestamp_millis())
            .arg("EX")
            .arg(self.heartbeat_ttl.as_secs())
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn release(&self) -> JobResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(heartbeat_key(&self.prefix, &self.consumer))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn queue_len(&self, queue: TaskQueue) -> JobResult<usize> {
        let mut conn = self.conn.clone();
        let len: usize = redis::cmd("LLEN")
            .arg(self.queue_key(queue))
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    async fn scheduled_len(&self) -> JobResult<usize> {
        let mut conn = self.conn.clone();
        let len: usize = redis::cmd("ZCARD")
            .arg(self.scheduled_key())
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    async fn dead_letters(&self, limit: usize) -> JobResult<Vec<DeadLetter>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(self.dead_key())
            .arg(0)
            .arg(limit - 1)
            .query_async(&mut conn)
            .await?;
        // Undecodable tasks are parked here verbatim, not as entries.
        Ok(raw
            .iter()
            .filter_map(|r| serde_json::from_str(r).ok())
            .collect())
    }
}
