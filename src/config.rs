//! Persisted controller configuration.
//!
//! An ordered key → typed-value mapping, small enough to live in a single
//! postcard blob. Insertion order is preserved so the serialised form is
//! stable across boots. The dirty flag is deliberately *not* part of the
//! store — it belongs to the control core, which sets it on every mutation
//! and clears it only after a successful persistence flush.

use log::warn;
use serde::{Deserialize, Serialize};

/// Maximum number of entries the store can hold.
const MAX_ENTRIES: usize = 16;

/// Maximum key length in bytes.
const MAX_KEY: usize = 24;

/// Maximum text value length in bytes.
pub const MAX_TEXT: usize = 64;

/// Well-known configuration keys.
pub mod keys {
    /// Broker host name or IP. Empty text means "not configured".
    pub const ENDPOINT: &str = "mqttServer";
    pub const PORT: &str = "mqttPort";
    pub const USERNAME: &str = "mqttUsername";
    pub const PASSWORD: &str = "mqttPassword";
    /// Client identity presented to the broker.
    pub const CLIENT_ID: &str = "mqttClientID";
    /// Root of every topic this device publishes or subscribes under.
    pub const BASE_TOPIC: &str = "mqttBaseTopic";
    /// Whether the physical ringer is allowed to sound.
    pub const RINGER_ON: &str = "ringerOn";
    /// Maximum ring duration per press, in milliseconds.
    pub const MAX_RING_TIME: &str = "maxRingTime";
}

/// A tagged configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Text(heapless::String<MAX_TEXT>),
}

impl Value {
    /// Build a text value, truncating at [`MAX_TEXT`] bytes.
    pub fn text(s: &str) -> Self {
        let mut out = heapless::String::new();
        for ch in s.chars() {
            if out.push(ch).is_err() {
                warn!("config: text value truncated");
                break;
            }
        }
        Self::Text(out)
    }
}

/// Ordered key → [`Value`] mapping with default-injection support.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigStore {
    entries: heapless::Vec<(heapless::String<MAX_KEY>, Value), MAX_ENTRIES>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, overwriting any existing entry.
    /// Returns `false` (and logs) only if the store is full.
    pub fn put(&mut self, key: &str, value: Value) -> bool {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
            return true;
        }
        let Ok(k) = heapless::String::try_from(key) else {
            warn!("config: key '{}' too long, dropped", key);
            return false;
        };
        if self.entries.push((k, value)).is_err() {
            warn!("config: store full, '{}' dropped", key);
            return false;
        }
        true
    }

    /// Store `value` only when `key` is missing.
    /// Returns whether a write actually happened.
    pub fn put_if_absent(&mut self, key: &str, value: Value) -> bool {
        if self.contains(key) {
            return false;
        }
        self.put(key, value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key) {
            Some(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(Value::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(Value::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Inject factory defaults for every key the firmware relies on.
///
/// Existing values (loaded from storage or set via the portal) are never
/// overwritten. Returns `true` when anything was written, which the caller
/// ORs into its dirty flag so first-boot defaults get persisted.
pub fn inject_defaults(store: &mut ConfigStore, client_id: &str) -> bool {
    let mut wrote = false;
    wrote |= store.put_if_absent(keys::CLIENT_ID, Value::text(client_id));
    wrote |= store.put_if_absent(keys::BASE_TOPIC, Value::text("DOORBELL"));
    wrote |= store.put_if_absent(keys::ENDPOINT, Value::text(""));
    wrote |= store.put_if_absent(keys::USERNAME, Value::text(""));
    wrote |= store.put_if_absent(keys::PASSWORD, Value::text(""));
    wrote |= store.put_if_absent(keys::PORT, Value::Int(1883));
    wrote |= store.put_if_absent(keys::RINGER_ON, Value::Bool(true));
    wrote |= store.put_if_absent(keys::MAX_RING_TIME, Value::Int(5000));
    wrote
}

/// Whether a broker endpoint is configured and non-empty.
pub fn endpoint_configured(store: &ConfigStore) -> bool {
    store
        .get_text(keys::ENDPOINT)
        .is_some_and(|s| !s.is_empty())
}
