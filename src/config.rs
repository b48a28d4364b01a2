//! Client configuration.
//!
//! The device address is assumed to be known in advance; there is no
//! discovery. Everything here has a sensible default and can be overridden
//! through builder methods or environment variables.

use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::error::{Error, Result};

/// Default device address (host or host:port).
pub const DEFAULT_ADDRESS: &str = "10.72.66.146";

/// Default path of the push channel endpoint.
pub const DEFAULT_PUSH_PATH: &str = "/ws";

/// Default delay between a lost connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Default timeout for point-channel requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Reconnection timing for the push channel.
///
/// With `initial_delay == max_delay` (the default) every retry waits the
/// same fixed delay. A larger `max_delay` enables doubling backoff, which
/// starts over after each successful open. There is no retry limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectConfig {
    /// Always wait the same delay.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
        }
    }

    /// Double the delay after each failed attempt, up to `max_delay`.
    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: max_delay.max(initial_delay),
        }
    }

    /// Delay to wait before reconnection attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Configuration for a [`CupClient`](crate::CupClient).
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Device host, optionally with a port.
    pub address: String,
    /// Path of the push channel endpoint.
    pub push_path: String,
    /// Reconnection timing.
    pub reconnect: ReconnectConfig,
    /// Timeout for point-channel requests.
    pub request_timeout: Duration,
    /// Directory for persisted state. `None` keeps everything in memory.
    pub storage_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            push_path: DEFAULT_PUSH_PATH.to_string(),
            reconnect: ReconnectConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            storage_dir: None,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the device at `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Start from the defaults and apply `SPLASHCUP_*` environment overrides.
    ///
    /// Recognized variables: `SPLASHCUP_ADDRESS`, `SPLASHCUP_STORAGE_DIR`,
    /// `SPLASHCUP_RECONNECT_MS`, `SPLASHCUP_REQUEST_TIMEOUT_MS`. Unparseable
    /// numbers are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(address) = lookup("SPLASHCUP_ADDRESS").filter(|a| !a.is_empty()) {
            config.address = address;
        }
        if let Some(dir) = lookup("SPLASHCUP_STORAGE_DIR").filter(|d| !d.is_empty()) {
            config.storage_dir = Some(PathBuf::from(dir));
        }
        if let Some(ms) = millis_var(&lookup, "SPLASHCUP_RECONNECT_MS") {
            config.reconnect = ReconnectConfig::fixed(ms);
        }
        if let Some(ms) = millis_var(&lookup, "SPLASHCUP_REQUEST_TIMEOUT_MS") {
            config.request_timeout = ms;
        }

        config
    }

    /// Set the push channel path.
    pub fn with_push_path(mut self, path: impl Into<String>) -> Self {
        self.push_path = path.into();
        self
    }

    /// Set the reconnection timing.
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the point-channel request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Persist state under `dir`.
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// URL of the push channel, e.g. `ws://10.72.66.146/ws`.
    pub fn push_url(&self) -> String {
        let path = if self.push_path.starts_with('/') {
            self.push_path.clone()
        } else {
            format!("/{}", self.push_path)
        };
        format!("ws://{}{}", self.address, path)
    }

    /// Base URL of the point channel, e.g. `http://10.72.66.146`.
    pub fn point_base_url(&self) -> String {
        format!("http://{}", self.address)
    }

    /// Check that the address and push path form usable URLs.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |name: &str, value: &str| Error::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
        };

        if self.address.trim().is_empty() || self.address.contains('/') {
            return Err(invalid("address", &self.address));
        }

        let push: Url = self
            .push_url()
            .parse()
            .map_err(|_| invalid("address", &self.address))?;
        if push.host_str().is_none() {
            return Err(invalid("address", &self.address));
        }
        if !push.path().starts_with('/') || push.query().is_some() {
            return Err(invalid("push_path", &self.push_path));
        }

        if self.request_timeout.is_zero() {
            return Err(invalid("request_timeout", "0ms"));
        }

        Ok(())
    }
}

fn millis_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            warn!("Ignoring {}: '{}' is not a number of milliseconds", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert_eq!(config.push_url(), "ws://10.72.66.146/ws");
        assert_eq!(config.point_base_url(), "http://10.72.66.146");
        assert_eq!(config.reconnect.delay_for(0), Duration::from_secs(3));
        assert!(config.storage_dir.is_none());
    }

    #[test]
    fn test_fixed_delay_never_grows() {
        let reconnect = ReconnectConfig::fixed(Duration::from_millis(250));
        for attempt in [0, 1, 5, 40] {
            assert_eq!(reconnect.delay_for(attempt), Duration::from_millis(250));
        }
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let reconnect =
            ReconnectConfig::exponential(Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(reconnect.delay_for(0), Duration::from_secs(1));
        assert_eq!(reconnect.delay_for(1), Duration::from_secs(2));
        assert_eq!(reconnect.delay_for(3), Duration::from_secs(8));
        assert_eq!(reconnect.delay_for(4), Duration::from_secs(10));
        assert_eq!(reconnect.delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_push_path_without_slash() {
        let config = ClientConfig::new("cup.local:8080").with_push_path("events");
        assert_eq!(config.push_url(), "ws://cup.local:8080/events");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SPLASHCUP_ADDRESS", "192.168.4.1"),
            ("SPLASHCUP_RECONNECT_MS", "1500"),
            ("SPLASHCUP_REQUEST_TIMEOUT_MS", "soon"),
            ("SPLASHCUP_STORAGE_DIR", "/tmp/splash"),
        ]
        .into_iter()
        .collect();

        let config = ClientConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.address, "192.168.4.1");
        assert_eq!(config.reconnect, ReconnectConfig::fixed(Duration::from_millis(1500)));
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.storage_dir, Some(PathBuf::from("/tmp/splash")));
    }

    #[test]
    fn test_validate() {
        assert!(ClientConfig::default().validate().is_ok());
        assert!(ClientConfig::new("cup.local:8080").validate().is_ok());

        for address in ["", "bad host", "10.0.0.1/ws"] {
            assert!(
                matches!(
                    ClientConfig::new(address).validate(),
                    Err(Error::InvalidParameter { ref name, .. }) if name == "address"
                ),
                "{:?} should be rejected",
                address
            );
        }

        let no_timeout = ClientConfig::default().with_request_timeout(Duration::ZERO);
        assert!(no_timeout.validate().is_err());
    }
}
