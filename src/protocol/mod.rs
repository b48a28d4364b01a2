//! Protocol module for encoding and decoding device messages.
//!
//! This module contains:
//! - Push channel messages (sync, tag detection, alerts)
//! - Point channel request/response bodies (temperature read, target write)

pub mod messages;
pub mod point;

pub use messages::{AlertKind, InboundMessage, OutboundMessage, SyncEntry};
