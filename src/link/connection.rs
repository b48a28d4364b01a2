//! Push channel connection management.
//!
//! Keeps a single connection to the device alive forever. The state
//! machine runs in a background task:
//!
//! ```text
//! Connecting -> Open -> Closed -> (delay) -> Reconnecting -> Connecting -> ...
//!          \__________/^
//!         (open failed)
//! ```
//!
//! There is no terminal state; the link retries until shut down.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::callback::{spawn_callback, CallbackHandle};
use crate::config::ReconnectConfig;
use crate::error::{Error, Result};
use crate::link::transport::{Session, Transport};
use crate::protocol::{InboundMessage, OutboundMessage};

/// Capacity of the inbound message channel.
const MESSAGE_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the state change channel.
const STATE_CHANNEL_CAPACITY: usize = 64;

/// Connection state of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Attempting to open the connection.
    Connecting,
    /// Connected; messages can be sent.
    Open,
    /// Not connected. Also the state before `connect` is first called.
    #[default]
    Closed,
    /// Backoff elapsed; about to try again.
    Reconnecting,
}

impl ConnectionState {
    /// Check if the link is open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Closed => write!(f, "Closed"),
            Self::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

/// Event for connection state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionEvent {
    /// State before the change.
    pub previous: ConnectionState,
    /// The new connection state.
    pub state: ConnectionState,
}

/// Everything the link reports, on one channel in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// The connection state changed.
    State(ConnectionEvent),
    /// A message was received.
    Message(InboundMessage),
}

/// State shared between the link handle and its background task.
struct Shared {
    state: RwLock<ConnectionState>,
    /// Outbound frame queue of the current session. `Some` only while open.
    outbound: RwLock<Option<mpsc::UnboundedSender<String>>>,
    state_tx: broadcast::Sender<ConnectionEvent>,
    message_tx: broadcast::Sender<InboundMessage>,
    event_tx: broadcast::Sender<LinkEvent>,
}

impl Shared {
    /// Update the connection state and emit an event.
    fn set_state(&self, new_state: ConnectionState) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            *state = new_state;
            old
        };

        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);

            let event = ConnectionEvent {
                previous: old_state,
                state: new_state,
            };
            let _ = self.event_tx.send(LinkEvent::State(event));
            let _ = self.state_tx.send(event);
        }
    }

    /// Decode one inbound frame and hand it to observers.
    fn dispatch(&self, text: &str) {
        match InboundMessage::decode(text) {
            Ok(message) => {
                trace!("Received {} message", message.kind());
                let _ = self.event_tx.send(LinkEvent::Message(message.clone()));
                let _ = self.message_tx.send(message);
            }
            Err(e) => {
                warn!("Dropping malformed message ({}): {:.120}", e, text);
            }
        }
    }
}

/// Persistent connection to the device's push channel.
pub struct DeviceLink {
    transport: Arc<dyn Transport>,
    reconnect: ReconnectConfig,
    shared: Arc<Shared>,
    task: RwLock<Option<JoinHandle<()>>>,
}

impl DeviceLink {
    /// Create a link that opens connections through `transport`.
    pub fn new(transport: Arc<dyn Transport>, reconnect: ReconnectConfig) -> Self {
        let (state_tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        let (message_tx, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        let (event_tx, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY + STATE_CHANNEL_CAPACITY);

        Self {
            transport,
            reconnect,
            shared: Arc::new(Shared {
                state: RwLock::new(ConnectionState::Closed),
                outbound: RwLock::new(None),
                state_tx,
                message_tx,
                event_tx,
            }),
            task: RwLock::new(None),
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    /// Check if open.
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Check if the background connection loop is running.
    pub fn is_running(&self) -> bool {
        self.task
            .read()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Start maintaining a connection to `url`.
    ///
    /// Returns immediately; progress is reported through state events.
    /// Calling this while the link is already running does nothing.
    pub fn connect(&self, url: impl Into<String>) {
        let mut task = self.task.write();
        if task.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            debug!("Link already running");
            return;
        }

        let url = url.into();
        info!("Starting device link to {}", url);

        let shared = self.shared.clone();
        let transport = self.transport.clone();
        let reconnect = self.reconnect;

        *task = Some(tokio::spawn(async move {
            Self::run(shared, transport, url, reconnect).await;
        }));
    }

    /// Send a message to the device.
    ///
    /// Only succeeds while the link is open. Messages are never queued
    /// across reconnects; callers resend current state on the next `Open`.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] if the link is not open.
    pub fn send(&self, message: &OutboundMessage) -> Result<()> {
        let state = self.state();
        if !state.is_open() {
            warn!("Dropping {} message: link is {}", message.kind(), state);
            return Err(Error::NotConnected);
        }

        let text = message.encode()?;

        let outbound = self.shared.outbound.read();
        let sender = outbound.as_ref().ok_or(Error::NotConnected)?;
        sender.send(text).map_err(|_| {
            warn!("Dropping {} message: session ended", message.kind());
            Error::NotConnected
        })?;

        debug!("Queued {} message", message.kind());
        Ok(())
    }

    /// Subscribe to connection state changes.
    pub fn subscribe_state(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.state_tx.subscribe()
    }

    /// Register a callback for connection state changes.
    pub fn on_state_change<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(ConnectionEvent) + Send + Sync + 'static,
    {
        spawn_callback(self.shared.state_tx.subscribe(), callback)
    }

    /// Subscribe to decoded inbound messages, in arrival order.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<InboundMessage> {
        self.shared.message_tx.subscribe()
    }

    /// Register a callback for decoded inbound messages.
    pub fn on_message<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(InboundMessage) + Send + Sync + 'static,
    {
        spawn_callback(self.shared.message_tx.subscribe(), callback)
    }

    /// Subscribe to state changes and messages as one stream.
    ///
    /// Events come in the order the link produced them, so a message
    /// received just before a disconnect is always seen before the `Closed`
    /// state that follows it.
    pub fn subscribe_events(&self) -> broadcast::Receiver<LinkEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Stop the connection loop and drop any open connection.
    ///
    /// Normal operation never needs this; it exists for clean teardown.
    /// `connect` may be called again afterwards.
    pub async fn shutdown(&self) {
        let handle = self.task.write().take();
        if let Some(handle) = handle {
            info!("Shutting down device link");
            handle.abort();
            let _ = handle.await;
        }

        *self.shared.outbound.write() = None;
        self.shared.set_state(ConnectionState::Closed);
    }

    /// Connection loop: connect, pump frames until the session ends, wait,
    /// and go again.
    async fn run(
        shared: Arc<Shared>,
        transport: Arc<dyn Transport>,
        url: String,
        reconnect: ReconnectConfig,
    ) {
        let mut attempt: u32 = 0;

        loop {
            shared.set_state(ConnectionState::Connecting);

            match transport.open(&url).await {
                Ok(session) => {
                    info!("Connected to device at {}", url);
                    attempt = 0;

                    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                    *shared.outbound.write() = Some(outbound_tx);
                    shared.set_state(ConnectionState::Open);

                    let result = Self::pump(&shared, session, outbound_rx).await;
                    *shared.outbound.write() = None;

                    match result {
                        Ok(()) => info!("Device closed the connection"),
                        Err(e) => warn!("Connection to device lost: {}", e),
                    }
                }
                Err(e) => {
                    warn!("Could not connect to {}: {}", url, e);
                }
            }

            shared.set_state(ConnectionState::Closed);

            let delay = reconnect.delay_for(attempt);
            attempt = attempt.saturating_add(1);
            debug!("Reconnecting in {:?} (attempt {})", delay, attempt);
            tokio::time::sleep(delay).await;

            shared.set_state(ConnectionState::Reconnecting);
        }
    }

    /// Move frames in both directions until the session ends.
    async fn pump(
        shared: &Shared,
        mut session: Box<dyn Session>,
        mut outbound_rx: mpsc::UnboundedReceiver<String>,
    ) -> Result<()> {
        let result = loop {
            tokio::select! {
                frame = session.recv() => match frame {
                    Some(Ok(text)) => shared.dispatch(&text),
                    Some(Err(e)) => break Err(e),
                    None => break Ok(()),
                },
                Some(text) = outbound_rx.recv() => {
                    if let Err(e) = session.send(text).await {
                        break Err(e);
                    }
                }
            }
        };

        if result.is_err() {
            session.close().await;
        }
        result
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        if let Some(handle) = self.task.write().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLink")
            .field("state", &self.state())
            .field("reconnect", &self.reconnect)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Closed.is_open());
        assert!(!ConnectionState::Connecting.is_open());

        assert!(ConnectionState::Connecting.is_transitioning());
        assert!(ConnectionState::Reconnecting.is_transitioning());
        assert!(!ConnectionState::Open.is_transitioning());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(format!("{}", ConnectionState::Open), "Open");
        assert_eq!(format!("{}", ConnectionState::Reconnecting), "Reconnecting");
    }

    fn shared(state: ConnectionState) -> Shared {
        Shared {
            state: RwLock::new(state),
            outbound: RwLock::new(None),
            state_tx: broadcast::channel(4).0,
            message_tx: broadcast::channel(4).0,
            event_tx: broadcast::channel(8).0,
        }
    }

    #[test]
    fn test_dispatch_drops_malformed_frames() {
        let shared = shared(ConnectionState::Open);
        let mut message_rx = shared.message_tx.subscribe();

        shared.dispatch("{ not json");
        shared.dispatch(r#"{"type":"mystery"}"#);
        shared.dispatch(r#"{"type":"nfc","uid":"X","drink":"Coffee"}"#);

        assert!(matches!(
            message_rx.try_recv().unwrap(),
            InboundMessage::TagDetected { ref uid, .. } if uid == "X"
        ));
        assert!(message_rx.try_recv().is_err());
    }

    #[test]
    fn test_events_keep_arrival_order() {
        let shared = shared(ConnectionState::Connecting);
        let mut events = shared.event_tx.subscribe();

        shared.set_state(ConnectionState::Open);
        shared.dispatch(r#"{"type":"nfc","uid":"X"}"#);
        shared.set_state(ConnectionState::Closed);
        shared.set_state(ConnectionState::Closed);

        assert!(matches!(
            events.try_recv().unwrap(),
            LinkEvent::State(ConnectionEvent { state: ConnectionState::Open, .. })
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            LinkEvent::Message(InboundMessage::TagDetected { .. })
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            LinkEvent::State(ConnectionEvent { state: ConnectionState::Closed, .. })
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_while_closed_is_rejected() {
        struct NeverTransport;

        #[async_trait::async_trait]
        impl Transport for NeverTransport {
            async fn open(&self, _url: &str) -> Result<Box<dyn Session>> {
                Err(Error::Transport {
                    reason: "unreachable".to_string(),
                })
            }
        }

        let link = DeviceLink::new(Arc::new(NeverTransport), ReconnectConfig::default());
        let message = OutboundMessage::sync_from(&crate::data::default_drinks());

        assert_eq!(link.state(), ConnectionState::Closed);
        assert!(matches!(link.send(&message), Err(Error::NotConnected)));
    }
}
