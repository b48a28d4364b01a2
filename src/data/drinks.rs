//! Drink profile data structures.
//!
//! A profile ties a physical tag (identified by its uid) to a drink name,
//! an icon and the temperature the cup should hold it at.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Target temperature used when a stored profile does not carry one.
pub const DEFAULT_TARGET_TEMPERATURE: f64 = 60.0;

/// A drink known to the cup.
///
/// Serialized in the persisted form `{ uid, name, image, defaultTemp }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrinkProfile {
    /// Tag identifier reported by the device. Unique within a registry.
    pub uid: String,
    /// Display name, also sent to the device as `drink`.
    pub name: String,
    /// Icon reference, usually a URL string. Stored as found and never sent
    /// to the device; `Null` when the profile has none.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub image: Value,
    /// Temperature the cup should hold, in Celsius.
    #[serde(rename = "defaultTemp", default = "default_target")]
    pub target_temperature: f64,
}

fn default_target() -> f64 {
    DEFAULT_TARGET_TEMPERATURE
}

impl DrinkProfile {
    /// Create a new profile.
    pub fn new(
        uid: impl Into<String>,
        name: impl Into<String>,
        image: impl Into<Value>,
        target_temperature: f64,
    ) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            image: image.into(),
            target_temperature,
        }
    }

    /// The icon URL, if the image is a non-empty string.
    pub fn image_url(&self) -> Option<&str> {
        self.image.as_str().filter(|url| !url.is_empty())
    }

    /// Copy of this profile with a different target temperature.
    pub fn with_target(&self, target_temperature: f64) -> Self {
        Self {
            target_temperature,
            ..self.clone()
        }
    }
}

/// The built-in drink set installed on first run and after corruption.
pub fn default_drinks() -> Vec<DrinkProfile> {
    vec![
        DrinkProfile::new(
            "1DACB0060A1080",
            "Coffee",
            "https://img.icons8.com/ios-filled/100/espresso-cup.png",
            60.0,
        ),
        DrinkProfile::new(
            "1DAAB0060A1080",
            "Milk",
            "https://img.icons8.com/ios-filled/100/milk-bottle.png",
            50.0,
        ),
        DrinkProfile::new(
            "1DABB0060A1080",
            "Tea",
            "https://img.icons8.com/ios-filled/100/tea.png",
            65.0,
        ),
        DrinkProfile::new(
            "1DA9B0060A1080",
            "BabyBottle",
            "https://img.icons8.com/sf-regular-filled/100/baby-bottle.png",
            37.0,
        ),
        DrinkProfile::new(
            "FFFFFFFFFFFFFF",
            "Chocolate",
            "https://img.icons8.com/ios-filled/100/coffee.png",
            55.0,
        ),
    ]
}
