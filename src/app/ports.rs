//! Port traits — the boundary between the control core and its external
//! collaborators.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ DoorbellService (domain)
//! ```
//!
//! The wireless link, the pub/sub client, persistent storage, the config
//! portal, and GPIO each sit behind a narrow trait. The control core
//! consumes them via generics, so every frame scenario can run against
//! recording mocks on the host.

use crate::config::ConfigStore;
use crate::error::{Error, StorageError};

// ───────────────────────────────────────────────────────────────
// GPIO port (button sample in, ringer/indicator out)
// ───────────────────────────────────────────────────────────────

pub trait GpioPort {
    /// Configure pin directions. Called once at boot.
    fn init(&mut self) -> Result<(), Error>;

    /// Raw (un-debounced, un-inverted) button sample.
    fn read_button_raw(&mut self) -> bool;

    /// Drive the ringer output. Output polarity is the adapter's concern.
    fn set_ringer(&mut self, on: bool);

    /// Drive the indicator LED.
    fn set_indicator(&mut self, on: bool);
}

// ───────────────────────────────────────────────────────────────
// Messaging transport (pub/sub client)
// ───────────────────────────────────────────────────────────────

/// Everything the connect handshake needs, including the last-will
/// registration the broker publishes on unclean disconnect.
pub struct ConnectOptions<'a> {
    pub endpoint: &'a str,
    pub port: u16,
    pub client_id: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub last_will_topic: &'a str,
    pub last_will_qos: u8,
    pub last_will_retain: bool,
    pub last_will_payload: &'a [u8],
}

/// Non-blocking pub/sub client. Failures are reported as `false`, never
/// as errors — the connection sequencer recovers by looping through its
/// fixed-delay retry state.
pub trait TransportPort {
    fn connect(&mut self, opts: &ConnectOptions<'_>) -> bool;
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> bool;
    fn subscribe(&mut self, filter: &str, qos: u8) -> bool;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;

    /// Service the client's internal I/O once. Inbound messages are
    /// delivered to `on_message` as `(topic, payload)`; at most one
    /// invocation per pending message, never blocking.
    fn service(&mut self, on_message: &mut dyn FnMut(&str, &[u8]));
}

// ───────────────────────────────────────────────────────────────
// Wireless link
// ───────────────────────────────────────────────────────────────

pub trait LinkPort {
    /// Whether the station link is associated and has an address.
    fn is_up(&self) -> bool;

    /// Force station-only operating mode (drops any lingering soft-AP).
    fn force_station_mode(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Persistent configuration storage
// ───────────────────────────────────────────────────────────────

pub trait StoragePort {
    /// Load the persisted config blob. `Ok(None)` on first boot.
    fn load(&self) -> Result<Option<ConfigStore>, StorageError>;

    /// Persist the config blob atomically.
    fn save(&mut self, store: &ConfigStore) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Configuration portal
// ───────────────────────────────────────────────────────────────

/// Broker parameters captured by the portal's parameter page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalUpdate {
    pub endpoint: heapless::String<64>,
    pub port: u16,
    pub username: heapless::String<32>,
    pub password: heapless::String<32>,
}

pub trait PortalPort {
    /// Service the portal once. Returns captured broker parameters when
    /// the user saved the parameter page since the last call.
    fn process(&mut self) -> Option<PortalUpdate>;
}
