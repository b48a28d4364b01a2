//! On-demand temperature reads and target writes over the point channel.
//!
//! The point channel is independent of the push link: a pending read never
//! blocks the link and the link being down does not stop a read from being
//! attempted. Nothing here retries; the caller decides.

use parking_lot::RwLock;
use reqwest::Client;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::data::TemperatureReading;
use crate::error::{Error, Result};
use crate::protocol::point::{parse_temperature, save_target_form, GET_TEMP_PATH, SAVE_TEMP_PATH};
use crate::protocol::SyncEntry;
use crate::registry::DrinkRegistry;

/// Request/response client for the device's HTTP endpoints.
pub struct TemperatureProbe {
    http: Client,
    base_url: String,
    timeout: Duration,
    registry: Arc<DrinkRegistry>,
    last_reading: RwLock<Option<TemperatureReading>>,
}

impl TemperatureProbe {
    /// Create a probe for the device at `base_url` (e.g. `http://10.72.66.146`).
    ///
    /// `registry` is only read, to resolve drink names for target writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        registry: Arc<DrinkRegistry>,
    ) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("cannot build HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!("Temperature probe using {}", base_url);

        Ok(Self {
            http,
            base_url,
            timeout,
            registry,
            last_reading: RwLock::new(None),
        })
    }

    /// Create a probe from the client configuration.
    pub fn from_config(config: &ClientConfig, registry: Arc<DrinkRegistry>) -> Result<Self> {
        Self::new(config.point_base_url(), config.request_timeout, registry)
    }

    /// Fetch the temperature the device measures right now.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if the device does not answer in time,
    /// [`Error::Request`] for network failures, non-success responses and
    /// unreadable bodies.
    pub async fn read_current(&self) -> Result<TemperatureReading> {
        let url = self.url(GET_TEMP_PATH);

        let body = self
            .bounded(async {
                let response = self.http.get(&url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::Request {
                        reason: format!("device answered {}", status),
                    });
                }
                Ok(response.text().await?)
            })
            .await
            .map_err(|e| {
                warn!("Temperature read failed: {}", e);
                e
            })?;

        let reading = TemperatureReading::now(parse_temperature(&body)?);
        debug!("Read {}", reading.display());

        *self.last_reading.write() = Some(reading);
        Ok(reading)
    }

    /// Ask the device to store a new target for the drink with tag `uid`.
    ///
    /// Returns whatever the device echoed back: parsed JSON if the answer
    /// was JSON, the raw text otherwise, `Null` for an empty body.
    ///
    /// # Errors
    ///
    /// [`Error::DrinkNotFound`] if `uid` is not in the registry,
    /// [`Error::InvalidParameter`] for a negative or non-finite target, and
    /// the same request errors as [`read_current`](Self::read_current).
    pub async fn write_target(&self, uid: &str, target_temperature: f64) -> Result<Value> {
        if !target_temperature.is_finite() || target_temperature < 0.0 {
            return Err(Error::InvalidParameter {
                name: "target_temperature".to_string(),
                value: target_temperature.to_string(),
            });
        }

        let profile = self.registry.get(uid).ok_or_else(|| Error::DrinkNotFound {
            uid: uid.to_string(),
        })?;
        let entry = SyncEntry::from(&profile.with_target(target_temperature));
        let form = save_target_form(&entry)?;
        let url = self.url(SAVE_TEMP_PATH);

        let body = self
            .bounded(async {
                let response = self.http.post(&url).form(&form).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::Request {
                        reason: format!("device answered {}", status),
                    });
                }
                Ok(response.text().await?)
            })
            .await
            .map_err(|e| {
                warn!("Target write for {} failed: {}", uid, e);
                e
            })?;

        info!("Device stored target {:.1}°C for {}", target_temperature, profile.name);
        Ok(echo_value(&body))
    }

    /// The last successful reading, if any.
    pub fn last_reading(&self) -> Option<TemperatureReading> {
        *self.last_reading.read()
    }

    /// Base URL requests go to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn bounded<T>(&self, request: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| Error::Timeout)?
    }
}

fn echo_value(body: &str) -> Value {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

impl std::fmt::Debug for TemperatureProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemperatureProbe")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("last_reading", &self.last_reading())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn probe() -> TemperatureProbe {
        let registry = Arc::new(DrinkRegistry::new(Arc::new(MemoryStore::new())));
        TemperatureProbe::new("http://127.0.0.1:9/", Duration::from_millis(200), registry).unwrap()
    }

    #[test]
    fn test_base_url_is_normalized() {
        let probe = probe();
        assert_eq!(probe.base_url(), "http://127.0.0.1:9");
        assert_eq!(probe.url(GET_TEMP_PATH), "http://127.0.0.1:9/getTemp");
        assert!(probe.last_reading().is_none());
    }

    #[test]
    fn test_endpoints_follow_config_address() {
        let registry = Arc::new(DrinkRegistry::new(Arc::new(MemoryStore::new())));
        let config = ClientConfig::new("cup.local:8080");
        let probe = TemperatureProbe::from_config(&config, registry).unwrap();

        assert_eq!(probe.base_url(), config.point_base_url());
        assert_eq!(probe.url(GET_TEMP_PATH), "http://cup.local:8080/getTemp");
        assert_eq!(probe.url(SAVE_TEMP_PATH), "http://cup.local:8080/saveTemp");
    }

    #[tokio::test]
    async fn test_write_unknown_drink_fails_locally() {
        let result = probe().write_target("NOPE", 50.0).await;
        assert!(matches!(result, Err(Error::DrinkNotFound { ref uid }) if uid == "NOPE"));
    }

    #[tokio::test]
    async fn test_write_rejects_bad_target() {
        let result = probe().write_target("1DACB0060A1080", f64::NAN).await;
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn test_echo_value() {
        assert_eq!(echo_value(""), Value::Null);
        assert_eq!(echo_value(" OK "), Value::String("OK".to_string()));
        assert_eq!(
            echo_value(r#"{"opt_temp":55}"#),
            serde_json::json!({ "opt_temp": 55 })
        );
    }
}
