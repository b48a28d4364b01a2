//! The persisted drink registry.
//!
//! Owns the list of drink profiles. The list is loaded once at startup,
//! repaired if the stored copy is unusable, and written back in full after
//! every edit. Every load and edit is announced on a broadcast channel so
//! the sync coordinator can push the new state to the device.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::callback::{spawn_callback, CallbackHandle};
use crate::data::{default_drinks, DrinkProfile, DEFAULT_TARGET_TEMPERATURE};
use crate::error::{Error, Result};
use crate::storage::Store;
use crate::utils::temperature_from_json;

/// Storage key holding the serialized drink list.
pub const DRINKS_KEY: &str = "@drinks";

/// Where the registry contents came from on the last load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadSource {
    /// The stored list was valid and used as-is.
    Stored,
    /// Nothing was stored; defaults were installed and persisted.
    FirstRun,
    /// The stored list was corrupt; defaults were installed and persisted.
    Repaired,
    /// Storage could not be read; defaults are held in memory only.
    Fallback,
}

/// The durable list of drink profiles.
pub struct DrinkRegistry {
    /// Backing store.
    store: Arc<dyn Store>,
    /// In-memory copy, insertion order preserved.
    drinks: RwLock<Vec<DrinkProfile>>,
    /// Outcome of the last load.
    load_source: RwLock<Option<LoadSource>>,
    /// Serializes loads and updates against each other.
    write_lock: Mutex<()>,
    /// Registry-changed channel.
    changed_tx: broadcast::Sender<Vec<DrinkProfile>>,
}

impl DrinkRegistry {
    /// Create a registry on top of `store`.
    ///
    /// Until [`load`](Self::load) runs, the registry holds the built-in
    /// defaults in memory.
    pub fn new(store: Arc<dyn Store>) -> Self {
        let (changed_tx, _) = broadcast::channel(16);

        Self {
            store,
            drinks: RwLock::new(default_drinks()),
            load_source: RwLock::new(None),
            write_lock: Mutex::new(()),
            changed_tx,
        }
    }

    /// Load the persisted list, installing or restoring defaults as needed.
    ///
    /// Never fails: corrupt data is replaced by the defaults (and the
    /// defaults are persisted), and an unreadable store leaves the defaults
    /// in memory without touching storage.
    pub async fn load(&self) -> Vec<DrinkProfile> {
        let _guard = self.write_lock.lock().await;

        let (drinks, source) = match self.store.get(DRINKS_KEY).await {
            Ok(Some(raw)) => match validate(&raw) {
                Ok(drinks) => {
                    debug!("Loaded {} drinks from storage", drinks.len());
                    (drinks, LoadSource::Stored)
                }
                Err(e) => {
                    warn!("Stored drinks are corrupt ({}), restoring defaults", e);
                    (self.install_defaults().await, LoadSource::Repaired)
                }
            },
            Ok(None) => {
                info!("No stored drinks, installing defaults");
                (self.install_defaults().await, LoadSource::FirstRun)
            }
            Err(e) => {
                error!("Cannot read stored drinks ({}), using defaults in memory", e);
                (default_drinks(), LoadSource::Fallback)
            }
        };

        *self.drinks.write() = drinks.clone();
        *self.load_source.write() = Some(source);
        let _ = self.changed_tx.send(drinks.clone());

        drinks
    }

    /// Set the target temperature of the drink with tag `uid`.
    ///
    /// The full list is persisted before the change becomes visible. An
    /// unknown `uid` leaves everything untouched and returns the current
    /// list.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] for a negative or non-finite target, or
    /// [`Error::Storage`] if the list could not be persisted (in which case
    /// the in-memory list is unchanged too).
    pub async fn update(&self, uid: &str, target_temperature: f64) -> Result<Vec<DrinkProfile>> {
        if !target_temperature.is_finite() || target_temperature < 0.0 {
            return Err(Error::InvalidParameter {
                name: "target_temperature".to_string(),
                value: target_temperature.to_string(),
            });
        }

        let _guard = self.write_lock.lock().await;

        let mut updated = self.drinks.read().clone();
        let Some(drink) = updated.iter_mut().find(|d| d.uid == uid) else {
            debug!("Update for unknown drink {} ignored", uid);
            return Ok(updated);
        };
        drink.target_temperature = target_temperature;

        self.persist(&updated).await?;

        info!("Target for {} set to {:.1}°C", uid, target_temperature);
        *self.drinks.write() = updated.clone();
        let _ = self.changed_tx.send(updated.clone());

        Ok(updated)
    }

    /// Current list, in insertion order.
    pub fn all(&self) -> Vec<DrinkProfile> {
        self.drinks.read().clone()
    }

    /// Look up a drink by tag uid.
    pub fn get(&self, uid: &str) -> Option<DrinkProfile> {
        self.drinks.read().iter().find(|d| d.uid == uid).cloned()
    }

    /// Look up a drink by uid, falling back to a name match.
    pub fn find(&self, uid_or_name: &str) -> Option<DrinkProfile> {
        let drinks = self.drinks.read();
        drinks
            .iter()
            .find(|d| d.uid == uid_or_name)
            .or_else(|| drinks.iter().find(|d| d.name == uid_or_name))
            .cloned()
    }

    /// Number of drinks.
    pub fn len(&self) -> usize {
        self.drinks.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.drinks.read().is_empty()
    }

    /// Outcome of the last load, if one has run.
    pub fn load_source(&self) -> Option<LoadSource> {
        *self.load_source.read()
    }

    /// Subscribe to registry changes. Each event carries the full new list.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<DrinkProfile>> {
        self.changed_tx.subscribe()
    }

    /// Register a callback for registry changes.
    pub fn on_changed<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(Vec<DrinkProfile>) + Send + Sync + 'static,
    {
        spawn_callback(self.changed_tx.subscribe(), callback)
    }

    async fn install_defaults(&self) -> Vec<DrinkProfile> {
        let defaults = default_drinks();
        if let Err(e) = self.persist(&defaults).await {
            error!("Failed to persist default drinks: {}", e);
        }
        defaults
    }

    async fn persist(&self, drinks: &[DrinkProfile]) -> Result<()> {
        let raw = serde_json::to_string(drinks).map_err(|e| Error::Internal(e.to_string()))?;
        self.store.set(DRINKS_KEY, &raw).await
    }
}

impl std::fmt::Debug for DrinkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrinkRegistry")
            .field("drinks", &self.len())
            .field("load_source", &self.load_source())
            .finish()
    }
}

/// Check a stored drink list and turn it into profiles.
///
/// The list must be a JSON array whose entries all carry non-empty string
/// `uid` and `name` fields, with no uid repeated. `image` and `defaultTemp`
/// are optional. The image is carried through untouched whatever its type;
/// a missing, unreadable or non-finite target falls back to
/// [`DEFAULT_TARGET_TEMPERATURE`].
pub fn validate(raw: &str) -> Result<Vec<DrinkProfile>> {
    let value: Value = serde_json::from_str(raw).map_err(|e| Error::Validation {
        context: format!("not JSON: {}", e),
    })?;

    let entries = value.as_array().ok_or_else(|| Error::Validation {
        context: "not an array".to_string(),
    })?;

    let mut seen = HashSet::new();
    let mut drinks = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let field = |name: &str| {
            entry
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| Error::Validation {
                    context: format!("entry {} has no usable '{}'", index, name),
                })
        };

        let uid = field("uid")?;
        let name = field("name")?;

        if !seen.insert(uid.to_string()) {
            return Err(Error::Validation {
                context: format!("uid {} appears more than once", uid),
            });
        }

        let image = entry.get("image").cloned().unwrap_or(Value::Null);
        let target = entry
            .get("defaultTemp")
            .and_then(temperature_from_json)
            .unwrap_or(DEFAULT_TARGET_TEMPERATURE);

        drinks.push(DrinkProfile::new(uid, name, image, target));
    }

    Ok(drinks)
}
