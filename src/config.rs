//! Client configuration
//!
//! The full configuration surface is read once when the client is
//! constructed and stays immutable for the client's lifetime. Pool tuning
//! values are carried for the transport implementing the store protocol;
//! the client itself only consumes the key prefix, the entry expiration,
//! and the retry policy.

use crate::codec::FINGERPRINT_LEN;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Hard key-length limit imposed by common store protocols.
const STORE_KEY_LIMIT: usize = 250;

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Namespace prefix prepended to every derived store key.
    pub key_prefix: String,

    /// Entry expiration in seconds; `0` means entries never expire.
    pub expiration_secs: u64,

    /// Store server addresses, `host:port`.
    pub servers: Vec<String>,

    /// Connection pool tuning, consumed by the transport.
    pub pool: PoolConfig,

    /// Retry policy for the optimistic concurrency loops.
    pub retry: RetryPolicy,

    /// Health-check response time above which the store is reported as
    /// degraded rather than healthy, in milliseconds.
    pub degraded_threshold_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            key_prefix: "groupkv:".to_string(),
            // Never expire unless configured otherwise.
            expiration_secs: 0,
            servers: vec!["localhost:11211".to_string()],
            pool: PoolConfig::default(),
            retry: RetryPolicy::default(),
            degraded_threshold_ms: 1000,
        }
    }
}

impl ClientConfig {
    /// Create a new builder for client configuration.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Load configuration from `GROUPKV_*` environment variables, reading
    /// a `.env` file first if one is present. Unset variables keep their
    /// defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();

        if let Some(prefix) = env_string("GROUPKV_KEY_PREFIX") {
            config.key_prefix = prefix;
        }
        if let Some(expiration) = env_parse::<u64>("GROUPKV_EXPIRATION_SECS")? {
            config.expiration_secs = expiration;
        }
        if let Some(servers) = env_string("GROUPKV_SERVERS") {
            config.servers = servers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(max_retries) = env_parse::<u32>("GROUPKV_MAX_RETRIES")? {
            config.retry.max_retries = max_retries;
        }
        if let Some(threshold) = env_parse::<u64>("GROUPKV_DEGRADED_THRESHOLD_MS")? {
            config.degraded_threshold_ms = threshold;
        }

        if let Some(init) = env_parse::<usize>("GROUPKV_INIT_CONN")? {
            config.pool.initial_connections = init;
        }
        if let Some(min) = env_parse::<usize>("GROUPKV_MIN_CONN")? {
            config.pool.min_connections = min;
        }
        if let Some(max) = env_parse::<usize>("GROUPKV_MAX_CONN")? {
            config.pool.max_connections = max;
        }
        if let Some(ms) = env_parse::<u64>("GROUPKV_SOCKET_TIMEOUT_MS")? {
            config.pool.socket_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("GROUPKV_CONNECT_TIMEOUT_MS")? {
            config.pool.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(nagle) = env_parse::<bool>("GROUPKV_NAGLE")? {
            config.pool.nagle = nagle;
        }
        if let Some(failover) = env_parse::<bool>("GROUPKV_FAILOVER")? {
            config.pool.failover = failover;
        }
        if let Some(failback) = env_parse::<bool>("GROUPKV_FAILBACK")? {
            config.pool.failback = failback;
        }
        if let Some(alive) = env_parse::<bool>("GROUPKV_ALIVE_CHECK")? {
            config.pool.alive_check = alive;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.key_prefix.len() + FINGERPRINT_LEN > STORE_KEY_LIMIT {
            return Err(Error::Config(format!(
                "key_prefix of {} chars pushes derived keys past the {}-char store limit",
                self.key_prefix.len(),
                STORE_KEY_LIMIT
            )));
        }
        if self
            .key_prefix
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(Error::Config(
                "key_prefix must not contain whitespace or control characters".to_string(),
            ));
        }
        if self.servers.is_empty() {
            return Err(Error::Config("servers must not be empty".to_string()));
        }
        self.pool.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}

/// Connection pool tuning values.
///
/// These mirror the knobs a pooled store transport exposes; the client
/// passes them through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Connections opened when the pool starts.
    pub initial_connections: usize,

    /// Pool floor.
    pub min_connections: usize,

    /// Pool ceiling.
    pub max_connections: usize,

    /// How long an idle socket may sit in the pool.
    pub max_idle: Duration,

    /// How long a socket may stay checked out.
    pub max_busy: Duration,

    /// Socket read timeout.
    pub socket_timeout: Duration,

    /// Socket connect timeout.
    pub connect_timeout: Duration,

    /// Enable Nagle's algorithm on pool sockets.
    pub nagle: bool,

    /// Route around dead servers.
    pub failover: bool,

    /// Put recovered servers back into rotation; only meaningful with
    /// `failover`.
    pub failback: bool,

    /// Health-check sockets on checkout.
    pub alive_check: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_connections: 10,
            min_connections: 5,
            max_connections: 100,
            // 5 minutes
            max_idle: Duration::from_secs(300),
            max_busy: Duration::from_secs(30),
            socket_timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(3),
            nagle: false,
            failover: true,
            failback: true,
            alive_check: false,
        }
    }
}

impl PoolConfig {
    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config(
                "max_connections must be greater than 0".to_string(),
            ));
        }
        if self.min_connections > self.initial_connections
            || self.initial_connections > self.max_connections
        {
            return Err(Error::Config(format!(
                "pool sizes must satisfy min <= initial <= max, got {}/{}/{}",
                self.min_connections, self.initial_connections, self.max_connections
            )));
        }
        Ok(())
    }
}

/// Retry policy for the optimistic read-modify-conditional-write loops.
///
/// Attempt `n` sleeps for roughly `base_delay * 2^(n-1)`, capped at
/// `max_delay`, with a random jitter factor applied so competing writers
/// fall out of lockstep. Once `max_retries` retries are spent the
/// operation gives up with [`Error::Contended`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Ceiling on the backoff delay.
    pub max_delay: Duration,

    /// Jitter factor (0.0 - 1.0) applied to each delay.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 16,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(500),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self.base_delay.as_secs_f64() * f64::powi(2.0, exponent as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter == 0.0 {
            return Duration::from_secs_f64(capped);
        }

        let spread = capped * self.jitter;
        let jittered = capped - spread + rand::random::<f64>() * 2.0 * spread;
        Duration::from_secs_f64(jittered.max(0.0))
    }

    fn validate(&self) -> Result<()> {
        if self.jitter < 0.0 || self.jitter > 1.0 {
            return Err(Error::Config(
                "jitter must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(Error::Config(
                "base_delay must not exceed max_delay".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for client configuration.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    key_prefix: Option<String>,
    expiration_secs: Option<u64>,
    servers: Option<Vec<String>>,
    pool: Option<PoolConfig>,
    retry: Option<RetryPolicy>,
    degraded_threshold_ms: Option<u64>,
}

impl ClientConfigBuilder {
    /// Set the namespace prefix for derived store keys.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Set the entry expiration in seconds (`0` = never).
    pub fn expiration_secs(mut self, secs: u64) -> Self {
        self.expiration_secs = Some(secs);
        self
    }

    /// Set the store server address list.
    pub fn servers(mut self, servers: Vec<String>) -> Self {
        self.servers = Some(servers);
        self
    }

    /// Set the connection pool tuning values.
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Set the optimistic retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set the degraded-state response time threshold in milliseconds.
    pub fn degraded_threshold_ms(mut self, ms: u64) -> Self {
        self.degraded_threshold_ms = Some(ms);
        self
    }

    /// Build the client configuration.
    pub fn build(self) -> ClientConfig {
        let defaults = ClientConfig::default();

        ClientConfig {
            key_prefix: self.key_prefix.unwrap_or(defaults.key_prefix),
            expiration_secs: self.expiration_secs.unwrap_or(defaults.expiration_secs),
            servers: self.servers.unwrap_or(defaults.servers),
            pool: self.pool.unwrap_or(defaults.pool),
            retry: self.retry.unwrap_or(defaults.retry),
            degraded_threshold_ms: self
                .degraded_threshold_ms
                .unwrap_or(defaults.degraded_threshold_ms),
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid value for {}: {}", name, e))),
    }
}
