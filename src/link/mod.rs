//! Push channel link to the device.
//!
//! This module provides the long-lived connection over which the client
//! sends full database syncs and the device pushes tag detections and
//! alerts.

pub mod connection;
pub mod transport;

pub use connection::{ConnectionEvent, ConnectionState, DeviceLink, LinkEvent};
pub use transport::{Session, Transport, WebSocketTransport};
