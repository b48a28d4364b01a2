//! Push channel transports.
//!
//! [`DeviceLink`](super::DeviceLink) talks to the device through the
//! [`Transport`] and [`Session`] traits so the state machine does not care
//! whether frames travel over a real WebSocket or an in-process fake.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use crate::error::Result;

/// Opens push channel sessions.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a session to `url`. Returns once the handshake completed.
    async fn open(&self, url: &str) -> Result<Box<dyn Session>>;
}

/// One open push channel connection.
#[async_trait]
pub trait Session: Send {
    /// Send one text frame.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Wait for the next inbound text frame.
    ///
    /// Returns `None` once the peer closed the connection. Must be
    /// cancellation safe: dropping the future must not lose a frame.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close the connection politely.
    async fn close(&mut self);
}

/// WebSocket transport backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create the transport.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn Session>> {
        debug!("Opening WebSocket to {}", url);
        let (stream, response) = tokio_tungstenite::connect_async(url).await?;
        trace!("WebSocket handshake answered {}", response.status());
        Ok(Box::new(WebSocketSession { stream }))
    }
}

struct WebSocketSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Session for WebSocketSession {
    async fn send(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => warn!("Ignoring {} byte binary frame", data.len()),
                },
                Ok(Message::Close(frame)) => {
                    debug!("WebSocket close frame received: {:?}", frame);
                    return None;
                }
                // tungstenite answers pings on its own
                Ok(_) => trace!("WebSocket control frame"),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Error while closing WebSocket: {}", e);
        }
    }
}
