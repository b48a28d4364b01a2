//! Top-level client tying the cup's components together.
//!
//! [`CupClient`] owns the registry, the push link and the point-channel
//! probe, and wires the sync and alert pipelines between them.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::alerts::{AlertDispatcher, AlertNotice, Detection, Notifier};
use crate::callback::CallbackHandle;
use crate::config::ClientConfig;
use crate::data::{classify, DrinkProfile, Status, TemperatureReading};
use crate::error::{Error, Result};
use crate::link::{ConnectionEvent, ConnectionState, DeviceLink, Transport, WebSocketTransport};
use crate::probe::TemperatureProbe;
use crate::registry::DrinkRegistry;
use crate::storage::{FileStore, MemoryStore, Store};
use crate::sync::SyncCoordinator;

/// Result of [`CupClient::edit_target`].
#[derive(Debug)]
pub enum EditOutcome {
    /// Stored locally and accepted by the device.
    Saved {
        /// Drink list after the edit.
        drinks: Vec<DrinkProfile>,
        /// What the device echoed back.
        echo: Value,
    },
    /// Stored locally, but the device write failed. The local edit stands
    /// and reaches the device with the next sync at the latest.
    DeviceWriteFailed {
        /// Drink list after the edit.
        drinks: Vec<DrinkProfile>,
        /// Why the device write failed.
        error: Error,
    },
}

impl EditOutcome {
    /// Whether the device accepted the write.
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }

    /// Drink list after the edit.
    pub fn drinks(&self) -> &[DrinkProfile] {
        match self {
            Self::Saved { drinks, .. } | Self::DeviceWriteFailed { drinks, .. } => drinks,
        }
    }
}

/// Client for one heated cup.
pub struct CupClient {
    config: ClientConfig,
    registry: Arc<DrinkRegistry>,
    link: Arc<DeviceLink>,
    sync: SyncCoordinator,
    alerts: AlertDispatcher,
    probe: TemperatureProbe,
}

impl CupClient {
    /// Load the drink list and start talking to the device.
    ///
    /// Uses a WebSocket push channel and persists drinks under
    /// `config.storage_dir` (in memory when unset). The link connects in the
    /// background; this returns without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or the HTTP client cannot be
    /// built.
    pub async fn start(config: ClientConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let store: Arc<dyn Store> = match &config.storage_dir {
            Some(dir) => Arc::new(FileStore::new(dir.clone())),
            None => Arc::new(MemoryStore::new()),
        };

        Self::start_with(config, Arc::new(WebSocketTransport::new()), store, notifier).await
    }

    /// Like [`start`](Self::start), with an explicit transport and store.
    pub async fn start_with(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(DrinkRegistry::new(store));
        let drinks = registry.load().await;
        info!("Loaded {} drinks", drinks.len());

        let probe = TemperatureProbe::from_config(&config, registry.clone())?;

        let link = Arc::new(DeviceLink::new(transport, config.reconnect));
        let sync = SyncCoordinator::start(link.clone(), registry.clone());
        let alerts = AlertDispatcher::new(registry.clone(), notifier);
        alerts.attach(&link);

        link.connect(config.push_url());

        Ok(Self {
            config,
            registry,
            link,
            sync,
            alerts,
            probe,
        })
    }

    /// Current drink list.
    pub fn drinks(&self) -> Vec<DrinkProfile> {
        self.registry.all()
    }

    /// Current push link state.
    pub fn connection_state(&self) -> ConnectionState {
        self.link.state()
    }

    /// The drink currently on the cup, if recognized.
    pub fn detected(&self) -> Option<DrinkProfile> {
        self.alerts.detected()
    }

    /// Read the cup's temperature over the point channel.
    pub async fn read_temperature(&self) -> Result<TemperatureReading> {
        self.probe.read_current().await
    }

    /// Compare `reading` with the target of the detected drink.
    ///
    /// `Unknown` when no drink is detected.
    pub fn status_of(&self, reading: &TemperatureReading) -> Status {
        classify(
            reading.value,
            self.detected().map(|drink| drink.target_temperature),
        )
    }

    /// Change a drink's target temperature.
    ///
    /// The edit is committed locally first; the registry change triggers a
    /// full sync if the link is open. The device is then told directly over
    /// the point channel. A failed device write is reported in the outcome,
    /// not as an error.
    ///
    /// # Errors
    ///
    /// [`Error::DrinkNotFound`] for an unknown `uid`, and the errors of
    /// [`DrinkRegistry::update`] when the local edit fails.
    pub async fn edit_target(&self, uid: &str, target_temperature: f64) -> Result<EditOutcome> {
        if self.registry.get(uid).is_none() {
            return Err(Error::DrinkNotFound {
                uid: uid.to_string(),
            });
        }

        let drinks = self.registry.update(uid, target_temperature).await?;

        match self.probe.write_target(uid, target_temperature).await {
            Ok(echo) => Ok(EditOutcome::Saved { drinks, echo }),
            Err(error) => {
                warn!("Target for {} kept locally only: {}", uid, error);
                Ok(EditOutcome::DeviceWriteFailed { drinks, error })
            }
        }
    }

    /// Subscribe to connection state changes.
    pub fn subscribe_state(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.link.subscribe_state()
    }

    /// Register a callback for connection state changes.
    pub fn on_state_change<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(ConnectionEvent) + Send + Sync + 'static,
    {
        self.link.on_state_change(callback)
    }

    /// Subscribe to drink detections.
    pub fn subscribe_detections(&self) -> broadcast::Receiver<Detection> {
        self.alerts.subscribe_detections()
    }

    /// Register a callback for drink detections.
    pub fn on_detection<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(Detection) + Send + Sync + 'static,
    {
        self.alerts.on_detection(callback)
    }

    /// Subscribe to alert notices.
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<AlertNotice> {
        self.alerts.subscribe_alerts()
    }

    /// Register a callback for alert notices.
    pub fn on_alert<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(AlertNotice) + Send + Sync + 'static,
    {
        self.alerts.on_alert(callback)
    }

    /// Subscribe to drink list changes.
    pub fn subscribe_drinks(&self) -> broadcast::Receiver<Vec<DrinkProfile>> {
        self.registry.subscribe()
    }

    /// Register a callback for drink list changes.
    pub fn on_drinks_changed<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(Vec<DrinkProfile>) + Send + Sync + 'static,
    {
        self.registry.on_changed(callback)
    }

    /// The drink registry.
    pub fn registry(&self) -> &Arc<DrinkRegistry> {
        &self.registry
    }

    /// The push link.
    pub fn link(&self) -> &Arc<DeviceLink> {
        &self.link
    }

    /// The point-channel probe.
    pub fn probe(&self) -> &TemperatureProbe {
        &self.probe
    }

    /// Number of full syncs pushed so far.
    pub fn sync_count(&self) -> u64 {
        self.sync.sync_count()
    }

    /// Configuration this client was started with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Stop every background task and close the link.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down cup client");

        self.sync.stop();
        self.alerts.detach();
        self.link.shutdown().await;

        Ok(())
    }
}

impl std::fmt::Debug for CupClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CupClient")
            .field("address", &self.config.address)
            .field("state", &self.connection_state())
            .field("drinks", &self.registry.len())
            .field("detected", &self.detected().map(|d| d.name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::LogNotifier;
    use crate::data::default_drinks;

    #[test]
    fn test_edit_outcome_accessors() {
        let saved = EditOutcome::Saved {
            drinks: default_drinks(),
            echo: Value::Null,
        };
        assert!(saved.is_saved());
        assert_eq!(saved.drinks().len(), 5);

        let failed = EditOutcome::DeviceWriteFailed {
            drinks: vec![],
            error: Error::Timeout,
        };
        assert!(!failed.is_saved());
        assert!(failed.drinks().is_empty());
    }

    #[tokio::test]
    async fn test_status_without_detection_is_unknown() {
        let config = ClientConfig::new("127.0.0.1:9");
        let client = CupClient::start(config, Arc::new(LogNotifier)).await.unwrap();

        assert!(client.detected().is_none());
        assert_eq!(client.status_of(&TemperatureReading::now(60.0)), Status::Unknown);
        assert_eq!(client.drinks().len(), 5);

        client.shutdown().await.unwrap();
        assert_eq!(client.connection_state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_edit_unknown_drink() {
        let config = ClientConfig::new("127.0.0.1:9");
        let client = CupClient::start(config, Arc::new(LogNotifier)).await.unwrap();

        let result = client.edit_target("NOPE", 50.0).await;
        assert!(matches!(result, Err(Error::DrinkNotFound { .. })));

        client.shutdown().await.unwrap();
    }
}
