//! Connection manager configuration.

use std::time::Duration;

use crate::config::ClientSettings;

/// Upper bound of the random term added to every reconnect delay.
pub const DEFAULT_JITTER: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Initial reconnect backoff
    pub base_delay: Duration,
    /// Backoff ceiling, before jitter
    pub max_delay: Duration,
    /// Uniform random term in `[0, jitter)` added to each delay
    pub jitter: Duration,
    pub max_reconnect_attempts: u32,
    /// Handshake abandonment deadline
    pub auth_timeout: Duration,
    /// Consecutive `SYS_ERROR`s that force a reconnect
    pub max_server_errors: u32,
    /// Idle period after which the server error count decays
    pub server_error_reset: Duration,
    /// Offline outbox capacity; the oldest message is dropped when full
    pub max_pending_messages: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from(&ClientSettings::default())
    }
}

impl From<&ClientSettings> for ClientConfig {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter: DEFAULT_JITTER,
            max_reconnect_attempts: settings.max_reconnect_attempts,
            auth_timeout: Duration::from_millis(settings.auth_timeout_ms),
            max_server_errors: settings.max_server_errors,
            server_error_reset: Duration::from_millis(settings.server_error_reset_ms),
            max_pending_messages: settings.max_pending_messages,
        }
    }
}

impl ClientConfig {
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn with_max_server_errors(mut self, errors: u32) -> Self {
        self.max_server_errors = errors;
        self
    }

    pub fn with_server_error_reset(mut self, reset: Duration) -> Self {
        self.server_error_reset = reset;
        self
    }

    pub fn with_max_pending_messages(mut self, capacity: usize) -> Self {
        self.max_pending_messages = capacity;
        self
    }
}
