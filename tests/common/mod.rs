//! In-process stand-in for the cup's push channel.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use splashcup_link::link::{Session, Transport};
use splashcup_link::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const COFFEE_UID: &str = "1DACB0060A1080";
pub const TEA_UID: &str = "1DABB0060A1080";

/// Install a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Transport whose sessions are driven by the test through [`FakeDevice`]s.
pub struct FakeTransport {
    refuse: AtomicBool,
    attempts: AtomicUsize,
    devices: mpsc::UnboundedSender<FakeDevice>,
}

impl FakeTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeDevice>) {
        let (devices, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            refuse: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            devices,
        });
        (transport, rx)
    }

    /// Make subsequent opens fail (or succeed again).
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of open attempts so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, _url: &str) -> Result<Box<dyn Session>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::Transport {
                reason: "connection refused".to_string(),
            });
        }

        let (to_client, from_device) = mpsc::unbounded_channel();
        let (to_device, from_client) = mpsc::unbounded_channel();

        let _ = self.devices.send(FakeDevice {
            to_client,
            from_client,
        });

        Ok(Box::new(FakeSession {
            from_device,
            to_device,
        }))
    }
}

struct FakeSession {
    from_device: mpsc::UnboundedReceiver<String>,
    to_device: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Session for FakeSession {
    async fn send(&mut self, text: String) -> Result<()> {
        self.to_device.send(text).map_err(|_| Error::ConnectionLost)
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        self.from_device.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.from_device.close();
    }
}

/// The device end of one open session. Dropping it closes the session.
pub struct FakeDevice {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl FakeDevice {
    /// Push a raw text frame to the client.
    pub fn push(&self, text: &str) {
        let _ = self.to_client.send(text.to_string());
    }

    /// Push a JSON frame to the client.
    pub fn push_json(&self, value: Value) {
        self.push(&value.to_string());
    }

    /// Next frame the client sent, parsed as JSON.
    pub async fn next_frame(&mut self) -> Option<Value> {
        let text = self.from_client.recv().await?;
        serde_json::from_str(&text).ok()
    }

    /// Next frame, or `None` if nothing arrives within `wait`.
    pub async fn next_frame_within(&mut self, wait: Duration) -> Option<Value> {
        tokio::time::timeout(wait, self.next_frame())
            .await
            .ok()
            .flatten()
    }
}

/// Target the device was told for `uid` in a sync frame.
pub fn synced_target(frame: &Value, uid: &str) -> Option<f64> {
    frame["db"]
        .as_array()?
        .iter()
        .find(|entry| entry["uid"] == uid)
        .and_then(|entry| entry["opt_temp"].as_f64())
}
