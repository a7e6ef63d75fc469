//! Configuration for the billhook notifier service.
//!
//! Layered loading: built-in defaults, then `billhook.toml`, then
//! `BILLHOOK_`-prefixed environment variables (highest priority). The only
//! option without a usable default is the destination endpoint URL.

use std::time::Duration;

use anyhow::{Context, Result};
use billhook_dispatch::{ClientConfig, DispatcherConfig, RetryPolicy};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "billhook.toml";

/// Service configuration with defaults, file, and environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Destination webhook URL. Required.
    ///
    /// Environment variable: `BILLHOOK_ENDPOINT_URL`
    #[serde(default)]
    pub endpoint_url: String,

    /// Maximum delivery attempts per notification, including the first.
    ///
    /// Environment variable: `BILLHOOK_MAX_ATTEMPTS`
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    ///
    /// Environment variable: `BILLHOOK_BASE_DELAY_MS`
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on the retry delay in milliseconds.
    ///
    /// Environment variable: `BILLHOOK_MAX_DELAY_MS`
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter fraction (0.0 to 1.0) applied to retry delays.
    ///
    /// Environment variable: `BILLHOOK_JITTER_FRACTION`
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,

    /// Number of concurrent delivery workers.
    ///
    /// Environment variable: `BILLHOOK_CONCURRENCY_LIMIT`
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Bound on queued notifications before submissions are rejected.
    ///
    /// Environment variable: `BILLHOOK_QUEUE_CAPACITY`
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Per-attempt HTTP timeout in seconds.
    ///
    /// Environment variable: `BILLHOOK_REQUEST_TIMEOUT_SECS`
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Grace period for in-flight deliveries on shutdown, in seconds.
    ///
    /// Environment variable: `BILLHOOK_SHUTDOWN_GRACE_SECS`
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Config {
    /// Loads configuration from defaults, `billhook.toml`, and environment.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("BILLHOOK_"));

        let config: Self = figment.extract().context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Converts to the dispatch crate's configuration.
    pub fn to_dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            endpoint_url: self.endpoint_url.clone(),
            concurrency_limit: self.concurrency_limit,
            queue_capacity: self.queue_capacity,
            client_config: self.to_client_config(),
            retry_policy: self.to_retry_policy(),
            shutdown_timeout: Duration::from_secs(self.shutdown_grace_secs),
            ..Default::default()
        }
    }

    /// Converts to the HTTP client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.request_timeout_secs),
            ..Default::default()
        }
    }

    /// Converts to the retry policy.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter_fraction: self.jitter_fraction,
        }
    }

    /// Validates configuration values.
    fn validate(&self) -> Result<()> {
        if self.endpoint_url.trim().is_empty() {
            anyhow::bail!("endpoint_url is required (set BILLHOOK_ENDPOINT_URL)");
        }

        if self.max_attempts == 0 {
            anyhow::bail!("max_attempts must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            anyhow::bail!("jitter_fraction must be between 0.0 and 1.0");
        }

        if self.concurrency_limit == 0 {
            anyhow::bail!("concurrency_limit must be greater than 0");
        }

        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than 0");
        }

        if self.base_delay_ms > self.max_delay_ms {
            anyhow::bail!("base_delay_ms cannot exceed max_delay_ms");
        }

        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_fraction: default_jitter_fraction(),
            concurrency_limit: default_concurrency_limit(),
            queue_capacity: default_queue_capacity(),
            request_timeout_secs: default_request_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_jitter_fraction() -> f64 {
    0.25
}

fn default_concurrency_limit() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_shutdown_grace_secs() -> u64 {
    20
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, env, sync::Mutex};

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct TestEnvGuard {
        _lock: std::sync::MutexGuard<'static, ()>,
        vars: Vec<String>,
        originals: HashMap<String, Option<String>>,
    }

    impl TestEnvGuard {
        fn new() -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Self { _lock: lock, vars: Vec::new(), originals: HashMap::new() }
        }

        fn set_var(&mut self, key: &str, value: &str) {
            if !self.vars.contains(&key.to_string()) {
                self.originals.insert(key.to_string(), env::var(key).ok());
                self.vars.push(key.to_string());
            }
            env::set_var(key, value);
        }
    }

    impl Drop for TestEnvGuard {
        fn drop(&mut self) {
            for var in &self.vars {
                match self.originals.get(var) {
                    Some(Some(value)) => env::set_var(var, value),
                    Some(None) => env::remove_var(var),
                    None => {},
                }
            }
        }
    }

    #[test]
    fn endpoint_url_is_required() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("BILLHOOK_ENDPOINT_URL"));
    }

    #[test]
    fn defaults_are_valid_once_endpoint_is_set() {
        let config = Config {
            endpoint_url: "https://example.com/webhook".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.concurrency_limit, 4);
        assert_eq!(config.queue_capacity, 1024);
    }

    #[test]
    fn env_overrides_are_applied() {
        let mut guard = TestEnvGuard::new();
        guard.set_var("BILLHOOK_ENDPOINT_URL", "https://env.example.com/hook");
        guard.set_var("BILLHOOK_MAX_ATTEMPTS", "7");
        guard.set_var("BILLHOOK_CONCURRENCY_LIMIT", "2");
        guard.set_var("BILLHOOK_BASE_DELAY_MS", "500");
        guard.set_var("BILLHOOK_JITTER_FRACTION", "0.1");

        let config = Config::load().expect("config should load with env overrides");

        assert_eq!(config.endpoint_url, "https://env.example.com/hook");
        assert_eq!(config.max_attempts, 7);
        assert_eq!(config.concurrency_limit, 2);
        assert_eq!(config.base_delay_ms, 500);
        assert!((config.jitter_fraction - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let valid = Config {
            endpoint_url: "https://example.com/webhook".to_string(),
            ..Default::default()
        };

        let mut config = valid.clone();
        config.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = valid.clone();
        config.jitter_fraction = 1.5;
        assert!(config.validate().is_err());

        let mut config = valid.clone();
        config.concurrency_limit = 0;
        assert!(config.validate().is_err());

        let mut config = valid.clone();
        config.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = valid.clone();
        config.base_delay_ms = 120_000;
        assert!(config.validate().is_err(), "base above cap must be rejected");

        let mut config = valid;
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn conversions_carry_all_options() {
        let config = Config {
            endpoint_url: "https://example.com/webhook".to_string(),
            max_attempts: 8,
            base_delay_ms: 250,
            max_delay_ms: 30_000,
            jitter_fraction: 0.5,
            concurrency_limit: 3,
            queue_capacity: 64,
            request_timeout_secs: 4,
            shutdown_grace_secs: 9,
        };

        let dispatcher = config.to_dispatcher_config();
        assert_eq!(dispatcher.endpoint_url, "https://example.com/webhook");
        assert_eq!(dispatcher.concurrency_limit, 3);
        assert_eq!(dispatcher.queue_capacity, 64);
        assert_eq!(dispatcher.shutdown_timeout, Duration::from_secs(9));

        let retry = config.to_retry_policy();
        assert_eq!(retry.max_attempts, 8);
        assert_eq!(retry.base_delay, Duration::from_millis(250));
        assert_eq!(retry.max_delay, Duration::from_secs(30));

        let client = config.to_client_config();
        assert_eq!(client.timeout, Duration::from_secs(4));
    }
}
