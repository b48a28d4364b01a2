//! Push channel message types and JSON encoding.
//!
//! Every frame on the push channel is a JSON object with a `type` field:
//!
//! - Outbound `sync`: `{ "type": "sync", "db": [{ "uid", "drink", "opt_temp" }, ...] }`
//! - Inbound `nfc`: `{ "type": "nfc", "uid", "drink" }`
//! - Inbound alerts: `{ "type": "notification_1" | "notification_2", "message", "drink"?, "temperature"? }`
//! - Inbound `sync_ack`: `{ "type": "sync_ack" }`
//!
//! Field names are fixed by the device firmware.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::DrinkProfile;
use crate::error::{Error, Result};
use crate::utils::temperature_from_json;

/// Wire value of the `type` field for a tag detection.
pub const TYPE_NFC: &str = "nfc";
/// Wire value of the `type` field for a primary alert.
pub const TYPE_NOTIFICATION_1: &str = "notification_1";
/// Wire value of the `type` field for a secondary alert.
pub const TYPE_NOTIFICATION_2: &str = "notification_2";
/// Wire value of the `type` field for a sync acknowledgement.
pub const TYPE_SYNC_ACK: &str = "sync_ack";

/// One drink as the device sees it. The image is never transmitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEntry {
    /// Tag identifier.
    pub uid: String,
    /// Drink name.
    pub drink: String,
    /// Target temperature in Celsius.
    pub opt_temp: f64,
}

impl From<&DrinkProfile> for SyncEntry {
    fn from(profile: &DrinkProfile) -> Self {
        Self {
            uid: profile.uid.clone(),
            drink: profile.name.clone(),
            opt_temp: profile.target_temperature,
        }
    }
}

/// Messages sent from the client to the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Replace the device's whole drink database.
    Sync {
        /// Every drink in the registry, in registry order.
        #[serde(rename = "db")]
        entries: Vec<SyncEntry>,
    },
}

impl OutboundMessage {
    /// Build a full sync request from a registry snapshot.
    pub fn sync_from(profiles: &[DrinkProfile]) -> Self {
        Self::Sync {
            entries: profiles.iter().map(SyncEntry::from).collect(),
        }
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Internal(e.to_string()))
    }

    /// Parse a JSON text frame previously produced by [`encode`](Self::encode).
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sync { .. } => "sync",
        }
    }
}

/// Which of the device's two alert channels raised an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    /// `notification_1`.
    Primary,
    /// `notification_2`.
    Secondary,
}

impl AlertKind {
    /// Wire value of the `type` field.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Primary => TYPE_NOTIFICATION_1,
            Self::Secondary => TYPE_NOTIFICATION_2,
        }
    }
}

/// Messages pushed by the device.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// The device acknowledged a sync.
    SyncAck,
    /// A tag was placed on the cup.
    TagDetected {
        /// Tag identifier, empty if the device could not read one.
        uid: String,
        /// Drink name the device associates with the tag, if it sent one.
        drink: Option<String>,
    },
    /// A threshold alert.
    Alert {
        /// Alert channel.
        kind: AlertKind,
        /// Text to show the user. Empty if the device sent none.
        message: String,
        /// Drink the alert refers to (uid or name), if any.
        drink: Option<String>,
        /// Temperature that triggered the alert, if any.
        temperature: Option<f64>,
    },
}

impl InboundMessage {
    /// Decode a JSON text frame.
    ///
    /// Returns [`Error::Decode`] for anything that is not a recognizable
    /// message. Optional alert fields that are present but malformed are
    /// treated as absent rather than failing the whole message.
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    /// Decode an already-parsed JSON value.
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| Error::Decode {
            context: "message is not a JSON object".to_string(),
        })?;

        let kind = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Decode {
                context: "message has no string 'type' field".to_string(),
            })?;

        match kind {
            TYPE_SYNC_ACK => Ok(Self::SyncAck),
            TYPE_NFC => {
                // An unreadable tag still replaces whatever was on the cup.
                Ok(Self::TagDetected {
                    uid: optional_string(object.get("uid")).unwrap_or_default(),
                    drink: optional_string(object.get("drink")),
                })
            }
            TYPE_NOTIFICATION_1 | TYPE_NOTIFICATION_2 => {
                let kind = if kind == TYPE_NOTIFICATION_1 {
                    AlertKind::Primary
                } else {
                    AlertKind::Secondary
                };

                Ok(Self::Alert {
                    kind,
                    message: optional_string(object.get("message")).unwrap_or_default(),
                    drink: optional_string(object.get("drink")),
                    temperature: object.get("temperature").and_then(temperature_from_json),
                })
            }
            other => Err(Error::Decode {
                context: format!("unknown message type '{}'", other),
            }),
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SyncAck => TYPE_SYNC_ACK,
            Self::TagDetected { .. } => TYPE_NFC,
            Self::Alert { kind, .. } => kind.as_wire(),
        }
    }
}

fn optional_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
