use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stores::MAX_CLEANUP_INTERVAL;

/// Smallest non-zero refill rate accepted: one token every ~17 minutes.
/// Use 0 for a bucket that never refills.
pub const MIN_LIMITER_RPS: f64 = 0.001;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    /// Set to "production" for JSON logging, anything else for human-readable.
    #[serde(default = "default_env")]
    pub env: String,
    /// Sustained requests per second allowed per client address.
    #[serde(default = "default_limiter_rps")]
    pub limiter_rps: f64,
    /// Requests a client may make in a burst before being throttled.
    #[serde(default = "default_limiter_burst")]
    pub limiter_burst: u32,
    #[serde(default = "default_true")]
    pub limiter_enabled: bool,
    /// How often idle client entries are swept. Entries idle for three
    /// intervals are dropped.
    #[serde(default = "default_cleanup_interval_secs")]
    pub limiter_cleanup_interval_secs: u64,
    /// Origins allowed to make cross-origin requests (comma separated).
    #[serde(default)]
    pub cors_trusted_origins: Vec<String>,
    /// SMTP URL for outgoing mail (e.g., smtp://localhost:1025)
    #[serde(default)]
    pub smtp_url: Option<String>,
    #[serde(default = "default_smtp_sender")]
    pub smtp_sender: String,
    /// Sentry DSN for error tracking
    #[serde(default)]
    pub sentry_dsn: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("limiter_rps must be a finite, non-negative number (got {0})")]
    InvalidRate(f64),
    #[error("limiter_rps must be 0 or at least {min} (got {0})", min = MIN_LIMITER_RPS)]
    RateTooSmall(f64),
    #[error("limiter_burst must be at least 1 when the limiter is enabled")]
    ZeroBurst,
    #[error("limiter_cleanup_interval_secs must be at least 1")]
    ZeroCleanupInterval,
    #[error("limiter_cleanup_interval_secs must be at most {max} (got {0})", max = MAX_CLEANUP_INTERVAL.as_secs())]
    CleanupIntervalTooLong(u64),
}

impl Config {
    pub fn is_production(&self) -> bool {
        self.env == "production"
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.limiter_rps.is_finite() || self.limiter_rps < 0.0 {
            return Err(ConfigError::InvalidRate(self.limiter_rps));
        }
        if self.limiter_rps > 0.0 && self.limiter_rps < MIN_LIMITER_RPS {
            return Err(ConfigError::RateTooSmall(self.limiter_rps));
        }
        if self.limiter_enabled && self.limiter_burst == 0 {
            return Err(ConfigError::ZeroBurst);
        }
        if self.limiter_cleanup_interval_secs == 0 {
            return Err(ConfigError::ZeroCleanupInterval);
        }
        if self.limiter_cleanup_interval_secs > MAX_CLEANUP_INTERVAL.as_secs() {
            return Err(ConfigError::CleanupIntervalTooLong(
                self.limiter_cleanup_interval_secs,
            ));
        }
        Ok(())
    }

    pub fn limiter_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.limiter_cleanup_interval_secs)
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    4000
}

fn default_db_max_connections() -> u32 {
    25
}

fn default_env() -> String {
    "development".into()
}

fn default_limiter_rps() -> f64 {
    2.0
}

fn default_limiter_burst() -> u32 {
    4
}

fn default_true() -> bool {
    true
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_smtp_sender() -> String {
    "Greenlight <no-reply@greenlight.local>".into()
}
