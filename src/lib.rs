//! # splashcup-link
//!
//! Client library for the Splash heated cup: keeps the cup's drink database
//! in sync, turns its tag detections and alerts into events, and reads its
//! temperature on demand.
//!
//! The cup is reached over two channels at a known address:
//!
//! - a **push channel** (WebSocket) kept open forever, over which the client
//!   sends full drink syncs and the cup pushes NFC detections and alerts
//! - a **point channel** (HTTP) for one-off temperature reads and target
//!   writes
//!
//! ## Features
//!
//! - **Drink Registry**: Persisted drink profiles with built-in defaults and
//!   self-repair of corrupted storage
//! - **Auto Reconnect**: The push link never gives up; a full sync is sent
//!   on every (re)connect
//! - **Drink Detection**: Tags placed on the cup are resolved to profiles
//! - **Alerts**: Device alerts become platform notifications
//! - **Status**: Readings classified against the detected drink's target
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use splashcup_link::{ClientConfig, CupClient, LogNotifier, Result};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = CupClient::start(ClientConfig::from_env(), Arc::new(LogNotifier)).await?;
//!
//!     // Follow what lands on the cup
//!     let _detections = client.on_detection(|detection| {
//!         println!("On the cup: {:?}", detection);
//!     });
//!
//!     // Read the temperature once
//!     let reading = client.read_temperature().await?;
//!     println!("{} ({})", reading.display(), client.status_of(&reading));
//!
//!     // Raise the coffee target
//!     let outcome = client.edit_target("1DACB0060A1080", 62.0).await?;
//!     println!("Saved on device: {}", outcome.is_saved());
//!
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! The library logs through `tracing` and never installs a subscriber.

// Public modules
pub mod alerts;
pub mod callback;
pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod link;
pub mod probe;
pub mod protocol;
pub mod registry;
pub mod storage;
pub mod sync;
pub mod utils;

// Re-exports for convenience
pub use alerts::{
    AlertDispatcher, AlertNotice, ChannelNotifier, Detection, LogNotifier, NotificationRequest,
    Notifier, NOTIFICATION_TITLE,
};
pub use callback::CallbackHandle;
pub use client::{CupClient, EditOutcome};
pub use config::{ClientConfig, ReconnectConfig};
pub use error::{Error, Result};
pub use probe::TemperatureProbe;
pub use registry::{DrinkRegistry, LoadSource};
pub use storage::{FileStore, MemoryStore, Store};
pub use sync::SyncCoordinator;
pub use utils::{celsius_to_fahrenheit, format_celsius};

// Re-export commonly used types from submodules
pub use data::{
    classify, default_drinks, DrinkProfile, Status, TemperatureReading, READING_DISPLAY_WINDOW,
};
pub use link::{
    ConnectionEvent, ConnectionState, DeviceLink, LinkEvent, Transport, WebSocketTransport,
};
pub use protocol::{AlertKind, InboundMessage, OutboundMessage};
