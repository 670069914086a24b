//! Registry settings and per-queue options.

use crate::error::ConfigurationError;
use crate::naming::{NamingMode, QueueName};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest batch a single fetch may request
pub const MAX_BATCH_SIZE: u32 = 10;

/// Longest visibility timeout accepted by the managed queue service (12 hours)
pub const MAX_VISIBILITY_TIMEOUT_SECONDS: u64 = 43_200;

/// Process-wide settings shared by every registered queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Visibility timeout used when a queue does not override it
    pub default_visibility_timeout_seconds: u64,

    /// Idle sleep between empty polls
    pub poll_period_seconds: u64,

    /// Maximum number of messages fetched per poll
    pub batch_size: u32,

    /// Non-production mode; queue names are prefixed with `queue_prefix`
    pub debug: bool,

    /// Environment prefix applied to full queue names in debug mode
    pub queue_prefix: Option<String>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            default_visibility_timeout_seconds: 60,
            poll_period_seconds: 10,
            batch_size: MAX_BATCH_SIZE,
            debug: false,
            queue_prefix: None,
        }
    }
}

impl RegistrySettings {
    /// Validate settings, failing on values the queue service would reject
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        validate_visibility_timeout(self.default_visibility_timeout())?;

        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "batch_size must be between 1 and {}, got {}",
                    MAX_BATCH_SIZE, self.batch_size
                ),
            });
        }

        if self.debug {
            match self.queue_prefix.as_deref() {
                None | Some("") => {
                    return Err(ConfigurationError::Missing {
                        key: "queue_prefix".to_string(),
                    })
                }
                Some(prefix) => {
                    QueueName::new(prefix)?;
                }
            }
        }

        Ok(())
    }

    pub fn default_visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.default_visibility_timeout_seconds)
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.poll_period_seconds)
    }

    /// Naming mode implied by the settings
    pub fn naming_mode(&self) -> NamingMode {
        match (&self.queue_prefix, self.debug) {
            (Some(prefix), true) => NamingMode::Prefixed(prefix.clone()),
            _ => NamingMode::Production,
        }
    }
}

pub(crate) fn validate_visibility_timeout(timeout: Duration) -> Result<(), ConfigurationError> {
    if timeout.as_secs() > MAX_VISIBILITY_TIMEOUT_SECONDS {
        return Err(ConfigurationError::Invalid {
            message: format!(
                "visibility timeout must be at most {}s, got {}s",
                MAX_VISIBILITY_TIMEOUT_SECONDS,
                timeout.as_secs()
            ),
        });
    }
    Ok(())
}

/// Per-registration overrides of the registry settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueOptions {
    pub visibility_timeout: Option<Duration>,
    pub poll_period: Option<Duration>,
    /// Abandon a receiver call that runs longer than this
    pub handler_timeout: Option<Duration>,
}

impl QueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = Some(timeout);
        self
    }

    pub fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period = Some(period);
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
