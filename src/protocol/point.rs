//! Point channel request and response bodies.
//!
//! The point channel is plain HTTP on the device:
//!
//! - `GET /getTemp` answers `{ "temp": <number> }`.
//! - `POST /saveTemp` takes a form body with a single `body` field holding
//!   the JSON `{ "uid", "drink", "opt_temp" }`, and echoes the accepted state.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::protocol::messages::SyncEntry;
use crate::utils::temperature_from_json;

/// Path of the temperature read endpoint.
pub const GET_TEMP_PATH: &str = "/getTemp";
/// Path of the target write endpoint.
pub const SAVE_TEMP_PATH: &str = "/saveTemp";
/// Name of the form field carrying the JSON payload on `/saveTemp`.
pub const SAVE_TEMP_FIELD: &str = "body";

#[derive(Debug, Deserialize)]
struct TempBody {
    temp: Value,
}

/// Extract the measured temperature from a `/getTemp` response body.
///
/// Some firmware builds send the value as a string; both forms are accepted.
pub fn parse_temperature(body: &str) -> Result<f64> {
    let parsed: TempBody = serde_json::from_str(body).map_err(|e| Error::Request {
        reason: format!("device sent an unreadable temperature ({})", e),
    })?;

    temperature_from_json(&parsed.temp).ok_or_else(|| Error::Request {
        reason: format!("device sent a non-numeric temperature: {}", parsed.temp),
    })
}

/// Encode the form body for `/saveTemp`.
pub fn save_target_form(entry: &SyncEntry) -> Result<[(&'static str, String); 1]> {
    let payload = serde_json::to_string(entry).map_err(|e| Error::Internal(e.to_string()))?;
    Ok([(SAVE_TEMP_FIELD, payload)])
}
