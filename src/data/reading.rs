//! On-demand temperature readings.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::utils::{celsius_to_fahrenheit, format_celsius};

/// How long a reading stays on screen after it was taken.
pub const READING_DISPLAY_WINDOW: Duration = Duration::from_secs(3);

/// A temperature measured by the cup, stamped with the time it arrived.
///
/// Readings are ephemeral; they are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureReading {
    /// Measured temperature in Celsius.
    pub value: f64,
    /// When the reading was received.
    pub observed_at: DateTime<Utc>,
}

impl TemperatureReading {
    /// Create a reading observed now.
    pub fn now(value: f64) -> Self {
        Self::at(value, Utc::now())
    }

    /// Create a reading observed at a specific time.
    pub fn at(value: f64, observed_at: DateTime<Utc>) -> Self {
        Self { value, observed_at }
    }

    /// Temperature in Fahrenheit.
    pub fn fahrenheit(&self) -> f64 {
        celsius_to_fahrenheit(self.value)
    }

    /// Display string, e.g. `61.5°C`.
    pub fn display(&self) -> String {
        format_celsius(self.value)
    }

    /// Whether the reading is younger than `window` at time `now`.
    pub fn is_fresh_at(&self, window: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.observed_at);
        match age.to_std() {
            Ok(age) => age < window,
            // Observed "in the future" (clock skew); treat as fresh.
            Err(_) => true,
        }
    }

    /// Whether the reading is younger than `window`.
    pub fn is_fresh(&self, window: Duration) -> bool {
        self.is_fresh_at(window, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_display() {
        let reading = TemperatureReading::now(58.26);
        assert_eq!(reading.display(), "58.3°C");
        assert!((reading.fahrenheit() - 136.868).abs() < 0.001);
    }

    #[test]
    fn test_freshness_window() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let reading = TemperatureReading::at(60.0, t0);

        let later = t0 + chrono::Duration::milliseconds(2_999);
        assert!(reading.is_fresh_at(READING_DISPLAY_WINDOW, later));

        let expired = t0 + chrono::Duration::seconds(3);
        assert!(!reading.is_fresh_at(READING_DISPLAY_WINDOW, expired));

        let earlier = t0 - chrono::Duration::seconds(1);
        assert!(reading.is_fresh_at(READING_DISPLAY_WINDOW, earlier));
    }

    #[test]
    fn test_serializes_for_display_layer() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let json = serde_json::to_value(TemperatureReading::at(61.5, t0)).unwrap();
        assert_eq!(json["value"], 61.5);
        assert_eq!(json["observedAt"], "2024-05-01T12:00:00Z");
    }
}
