//! Worker, handler and mailer configuration.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum number of tasks processed at once.
    pub concurrency: usize,
    /// Weighted queue list, e.g. `critical:6,default:3,low:1`.
    pub queues: String,
    /// Idle wait between polls when every queue is empty.
    pub poll_interval_ms: u64,
    /// How often the scheduler enqueues the expiry sweep.
    pub expiry_sweep_interval_secs: u64,
    /// Delay before the first retry; doubles on every further retry.
    pub retry_base_delay_ms: u64,
    /// Upper bound for a single retry delay.
    pub retry_max_delay_secs: u64,
    /// Key prefix for the Redis task store.
    pub redis_prefix: String,
    /// Name of this worker's processing list. Random when unset; a stable
    /// name lets a restarted worker reclaim its tasks without waiting for
    /// its old heartbeat to lapse.
    pub consumer_name: Option<String>,
    /// Lifetime of the liveness mark. Other workers reclaim this worker's
    /// in-flight tasks once it has expired.
    pub heartbeat_ttl_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            queues: "critical:6,default:3,low:1".into(),
            poll_interval_ms: 500,
            expiry_sweep_interval_secs: 3600,
            retry_base_delay_ms: 1_000,
            retry_max_delay_secs: 600,
            redis_prefix: "warden:jobs".into(),
            consumer_name: None,
            heartbeat_ttl_secs: 30,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs)
    }

    pub fn heartbeat_ttl(&self) -> Duration {
        Duration::from_secs(self.heartbeat_ttl_secs.max(3))
    }

    /// A third of the TTL, so two missed beats still leave the mark alive.
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_ttl() / 3
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TenantInitConfig {
    /// Base URLs of the services notified when a tenant is initialised.
    pub services: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for TenantInitConfig {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// Delivery backend. Only `log` is built in.
    pub provider: String,
    pub from_address: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            provider: "log".into(),
            from_address: "noreply@warden.local".into(),
        }
    }
}
