//! Turns device pushes into drink detections and user notifications.
//!
//! Tag detections are resolved against the registry and published as
//! [`Detection`] events; this is the only writer of the "drink on the cup"
//! state. Alerts become [`NotificationRequest`]s handed to an external
//! [`Notifier`], plus an [`AlertNotice`] for in-app display.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::callback::{spawn_callback, CallbackHandle};
use crate::data::{classify, DrinkProfile, Status};
use crate::link::{ConnectionState, DeviceLink, LinkEvent};
use crate::protocol::{AlertKind, InboundMessage};
use crate::registry::DrinkRegistry;

/// Title of every alert notification.
pub const NOTIFICATION_TITLE: &str = "🫗Splash!";

/// Body used when the device sends an alert without any text.
pub const FALLBACK_ALERT_BODY: &str = "Check your drink";

/// A notification the platform should display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRequest {
    /// Notification title.
    pub title: String,
    /// Notification text.
    pub body: String,
    /// Whether to play the default sound.
    pub sound: bool,
}

impl NotificationRequest {
    /// Build the notification for an alert message.
    pub fn for_alert(message: &str) -> Self {
        let body = if message.trim().is_empty() {
            FALLBACK_ALERT_BODY
        } else {
            message
        };

        Self {
            title: NOTIFICATION_TITLE.to_string(),
            body: body.to_string(),
            sound: true,
        }
    }
}

/// Displays notifications.
///
/// Called on the message dispatch path, so implementations must return
/// quickly and hand slow work off elsewhere. No acknowledgement is expected.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    /// Show `request` to the user.
    fn notify(&self, request: NotificationRequest);
}

/// Notifier that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, request: NotificationRequest) {
        info!("{} {}", request.title, request.body);
    }
}

/// Notifier that forwards requests to a channel for the platform layer.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<NotificationRequest>,
}

impl ChannelNotifier {
    /// Create the notifier and the receiving end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NotificationRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, request: NotificationRequest) {
        if self.tx.send(request).is_err() {
            debug!("Notification dropped: receiver gone");
        }
    }
}

/// What is currently on the cup.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// A known drink was placed on the cup.
    Recognized(DrinkProfile),
    /// A tag the registry does not know was placed on the cup.
    Unrecognized {
        /// The unknown tag uid.
        uid: String,
    },
    /// The connection dropped; nothing is known to be on the cup.
    Cleared,
}

impl Detection {
    /// The recognized profile, if any.
    pub fn profile(&self) -> Option<&DrinkProfile> {
        match self {
            Self::Recognized(profile) => Some(profile),
            _ => None,
        }
    }
}

/// An alert enriched for in-app display.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertNotice {
    /// Alert channel.
    pub kind: AlertKind,
    /// Notification that was sent for this alert.
    pub notification: NotificationRequest,
    /// The drink the alert refers to, if it could be resolved.
    pub drink: Option<DrinkProfile>,
    /// Temperature reported with the alert.
    pub temperature: Option<f64>,
    /// Temperature compared to the drink's target.
    pub status: Status,
}

struct Inner {
    registry: Arc<DrinkRegistry>,
    notifier: Arc<dyn Notifier>,
    detected: RwLock<Option<DrinkProfile>>,
    detection_tx: broadcast::Sender<Detection>,
    alert_tx: broadcast::Sender<AlertNotice>,
}

impl Inner {
    fn handle_message(&self, message: &InboundMessage) {
        match message {
            InboundMessage::SyncAck => debug!("Device acknowledged sync"),
            InboundMessage::TagDetected { uid, drink } => self.handle_tag(uid, drink.as_deref()),
            InboundMessage::Alert {
                kind,
                message,
                drink,
                temperature,
            } => self.handle_alert(*kind, message, drink.as_deref(), *temperature),
        }
    }

    fn handle_tag(&self, uid: &str, reported_name: Option<&str>) {
        let detection = match self.registry.get(uid) {
            Some(profile) => {
                info!("Drink recognized: {} ({})", profile.name, uid);
                *self.detected.write() = Some(profile.clone());
                Detection::Recognized(profile)
            }
            None => {
                info!(
                    "Unknown tag {} (device calls it {})",
                    uid,
                    reported_name.unwrap_or("nothing")
                );
                *self.detected.write() = None;
                Detection::Unrecognized {
                    uid: uid.to_string(),
                }
            }
        };

        let _ = self.detection_tx.send(detection);
    }

    fn handle_alert(&self, kind: AlertKind, message: &str, drink: Option<&str>, temperature: Option<f64>) {
        let notification = NotificationRequest::for_alert(message);
        self.notifier.notify(notification.clone());

        let drink = drink.and_then(|key| {
            let found = self.registry.find(key);
            if found.is_none() {
                warn!("Alert names unknown drink '{}'", key);
            }
            found
        });
        let status = temperature
            .map(|t| classify(t, drink.as_ref().map(|d| d.target_temperature)))
            .unwrap_or_default();

        debug!("Alert {}: {} ({})", kind.as_wire(), notification.body, status);

        let _ = self.alert_tx.send(AlertNotice {
            kind,
            notification,
            drink,
            temperature,
            status,
        });
    }

    fn handle_state(&self, state: ConnectionState) {
        if state != ConnectionState::Closed {
            return;
        }

        if self.detected.write().take().is_some() {
            debug!("Link closed, clearing detected drink");
        }
        let _ = self.detection_tx.send(Detection::Cleared);
    }
}

/// Consumes inbound messages and publishes detections and notifications.
pub struct AlertDispatcher {
    inner: Arc<Inner>,
    task: RwLock<Option<JoinHandle<()>>>,
}

impl AlertDispatcher {
    /// Create a dispatcher resolving drinks in `registry` and sending
    /// notifications to `notifier`.
    pub fn new(registry: Arc<DrinkRegistry>, notifier: Arc<dyn Notifier>) -> Self {
        let (detection_tx, _) = broadcast::channel(32);
        let (alert_tx, _) = broadcast::channel(32);

        Self {
            inner: Arc::new(Inner {
                registry,
                notifier,
                detected: RwLock::new(None),
                detection_tx,
                alert_tx,
            }),
            task: RwLock::new(None),
        }
    }

    /// Process every message and state change from `link`, in arrival order.
    ///
    /// Replaces any previous attachment.
    pub fn attach(&self, link: &DeviceLink) {
        let mut events = link.subscribe_events();
        let inner = self.inner.clone();

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(LinkEvent::Message(message)) => inner.handle_message(&message),
                    Ok(LinkEvent::State(event)) => inner.handle_state(event.state),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Alert dispatcher fell behind, {} link events lost", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        if let Some(previous) = self.task.write().replace(handle) {
            previous.abort();
        }
    }

    /// Handle one inbound message directly.
    pub fn handle(&self, message: &InboundMessage) {
        self.inner.handle_message(message);
    }

    /// React to a link state change directly.
    pub fn handle_state(&self, state: ConnectionState) {
        self.inner.handle_state(state);
    }

    /// The drink currently on the cup, if recognized.
    pub fn detected(&self) -> Option<DrinkProfile> {
        self.inner.detected.read().clone()
    }

    /// Subscribe to detection events.
    pub fn subscribe_detections(&self) -> broadcast::Receiver<Detection> {
        self.inner.detection_tx.subscribe()
    }

    /// Register a callback for detection events.
    pub fn on_detection<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(Detection) + Send + Sync + 'static,
    {
        spawn_callback(self.inner.detection_tx.subscribe(), callback)
    }

    /// Subscribe to alert notices.
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<AlertNotice> {
        self.inner.alert_tx.subscribe()
    }

    /// Register a callback for alert notices.
    pub fn on_alert<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(AlertNotice) + Send + Sync + 'static,
    {
        spawn_callback(self.inner.alert_tx.subscribe(), callback)
    }

    /// Stop processing link events.
    pub fn detach(&self) {
        if let Some(handle) = self.task.write().take() {
            handle.abort();
        }
    }
}

impl Drop for AlertDispatcher {
    fn drop(&mut self) {
        self.detach();
    }
}
