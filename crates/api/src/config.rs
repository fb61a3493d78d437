//! Application configuration loaded from environment variables.

use std::time::Duration;

use outbox::{CleanupConfig, PublisherConfig};
use profile::PreconditionPolicy;

/// Server and saga configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `OUTBOX_POLL_INTERVAL_MS` — publisher poll interval (default: `1000`)
/// - `OUTBOX_BATCH_SIZE` — rows fetched per poll (default: `100`)
/// - `OUTBOX_MAX_ATTEMPTS` — poison ceiling (default: `10`)
/// - `OUTBOX_IDLE_BACKOFF_STEP_MS` — idle backoff step (default: `200`)
/// - `OUTBOX_IDLE_BACKOFF_CAP_MS` — idle backoff cap (default: `5000`)
/// - `OUTBOX_CLEANUP_INTERVAL_SECS` — cleanup period (default: `10800`)
/// - `OUTBOX_RETENTION_DAYS` — resolved-row retention (default: `30`)
/// - `OUTBOX_CLEANUP_BATCH_SIZE` — rows purged per batch (default: `2000`)
/// - `SAGA_WAIT_CEILING_SECS` — HTTP wait ceiling (default: `15`)
/// - `BRANCH_CHECK_POLICY` — `fail_closed` or `fail_open` (default: `fail_closed`)
/// - `SEED_BRANCH_IDS` — branches preloaded into the in-memory directory
///   (default: `"1"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub poll_interval: Duration,
    pub batch_size: u32,
    pub max_attempts: i32,
    pub idle_backoff_step: Duration,
    pub idle_backoff_cap: Duration,
    pub cleanup_interval: Duration,
    pub retention_days: i64,
    pub cleanup_batch_size: u32,
    pub wait_ceiling: Duration,
    pub branch_check_policy: PreconditionPolicy,
    pub seed_branches: Vec<i64>,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let policy = std::env::var("BRANCH_CHECK_POLICY")
            .ok()
            .and_then(|v| PreconditionPolicy::parse(&v))
            .unwrap_or_default();

        let seed_branches = std::env::var("SEED_BRANCH_IDS")
            .ok()
            .map(|v| v.split(',').filter_map(|s| s.trim().parse().ok()).collect())
            .unwrap_or_else(|| vec![1]);

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            poll_interval: Duration::from_millis(env_parse("OUTBOX_POLL_INTERVAL_MS", 1000)),
            batch_size: env_parse("OUTBOX_BATCH_SIZE", 100),
            max_attempts: env_parse("OUTBOX_MAX_ATTEMPTS", 10),
            idle_backoff_step: Duration::from_millis(env_parse("OUTBOX_IDLE_BACKOFF_STEP_MS", 200)),
            idle_backoff_cap: Duration::from_millis(env_parse("OUTBOX_IDLE_BACKOFF_CAP_MS", 5000)),
            cleanup_interval: Duration::from_secs(env_parse(
                "OUTBOX_CLEANUP_INTERVAL_SECS",
                10800,
            )),
            retention_days: env_parse("OUTBOX_RETENTION_DAYS", 30),
            cleanup_batch_size: env_parse("OUTBOX_CLEANUP_BATCH_SIZE", 2000),
            wait_ceiling: Duration::from_secs(env_parse("SAGA_WAIT_CEILING_SECS", 15)),
            branch_check_policy: policy,
            seed_branches,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Publisher configuration derived from this config.
    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            poll_interval: self.poll_interval,
            batch_size: self.batch_size,
            max_attempts: self.max_attempts,
            idle_backoff_step: self.idle_backoff_step,
            idle_backoff_cap: self.idle_backoff_cap,
        }
    }

    /// Cleanup configuration derived from this config.
    pub fn cleanup_config(&self) -> CleanupConfig {
        CleanupConfig {
            interval: self.cleanup_interval,
            retention: chrono::Duration::days(self.retention_days),
            batch_size: self.cleanup_batch_size,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            poll_interval: Duration::from_millis(1000),
            batch_size: 100,
            max_attempts: 10,
            idle_backoff_step: Duration::from_millis(200),
            idle_backoff_cap: Duration::from_millis(5000),
            cleanup_interval: Duration::from_secs(10800),
            retention_days: 30,
            cleanup_batch_size: 2000,
            wait_ceiling: Duration::from_secs(15),
            branch_check_policy: PreconditionPolicy::FailClosed,
            seed_branches: vec![1],
        }
    }
}
