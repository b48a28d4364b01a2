//! Temperature helpers shared by readings, alerts and the demo.

/// Convert Celsius to Fahrenheit.
///
/// # Example
///
/// ```
/// use splashcup_link::celsius_to_fahrenheit;
///
/// assert!((celsius_to_fahrenheit(60.0) - 140.0).abs() < 0.001);
/// ```
#[inline]
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Format a Celsius value the way the cup display shows it: one decimal
/// followed by the unit.
///
/// Non-finite values render as `--.-°C`.
///
/// # Example
///
/// ```
/// use splashcup_link::format_celsius;
///
/// assert_eq!(format_celsius(61.54), "61.5°C");
/// assert_eq!(format_celsius(f64::NAN), "--.-°C");
/// ```
pub fn format_celsius(celsius: f64) -> String {
    if celsius.is_finite() {
        format!("{:.1}°C", celsius)
    } else {
        "--.-°C".to_string()
    }
}

/// Parse a temperature sent either as a JSON number or as a numeric string.
/// Non-finite values are not temperatures.
pub(crate) fn temperature_from_json(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|t| t.is_finite())
}
