//! Integration tests: DoorbellService → ports, full-frame scenarios.
//!
//! Drives the control loop at its real 20 ms frame cadence against
//! recording mocks, covering the reconnect retry rhythm, remote command
//! handling with persistence, debounce behavior under contact bounce,
//! and the press → single report path.

use std::collections::VecDeque;

use doorbell::app::ports::{
    ConnectOptions, GpioPort, LinkPort, PortalPort, PortalUpdate, StoragePort, TransportPort,
};
use doorbell::app::service::{DoorbellService, RESTART_GRACE_MS};
use doorbell::config::{self, keys, ConfigStore, Value};
use doorbell::conn::DELAY_DWELL_MS;
use doorbell::error::StorageError;

// ── Mock implementations ──────────────────────────────────────

struct MockIo {
    raw_button: bool,
    ringer: bool,
    indicator: bool,
    ringer_trace: Vec<bool>,
}

impl MockIo {
    fn new() -> Self {
        Self {
            // Idle level of the active-low button.
            raw_button: true,
            ringer: false,
            indicator: false,
            ringer_trace: Vec::new(),
        }
    }
}

impl GpioPort for MockIo {
    fn init(&mut self) -> Result<(), doorbell::error::Error> {
        Ok(())
    }
    fn read_button_raw(&mut self) -> bool {
        self.raw_button
    }
    fn set_ringer(&mut self, on: bool) {
        self.ringer = on;
        self.ringer_trace.push(on);
    }
    fn set_indicator(&mut self, on: bool) {
        self.indicator = on;
    }
}

struct MockTransport {
    connected: bool,
    /// Scripted connect outcomes, front first. Empty = succeed.
    connect_results: VecDeque<bool>,
    /// Timestamp of every connect attempt (rig keeps `now_ms` current).
    connect_times: Vec<u32>,
    now_ms: u32,
    published: Vec<(String, Vec<u8>, bool)>,
    subscribed: Vec<(String, u8)>,
    inbound: VecDeque<(String, Vec<u8>)>,
    disconnects: u32,
}

impl MockTransport {
    fn new() -> Self {
        Self {
            connected: false,
            connect_results: VecDeque::new(),
            connect_times: Vec::new(),
            now_ms: 0,
            published: Vec::new(),
            subscribed: Vec::new(),
            inbound: VecDeque::new(),
            disconnects: 0,
        }
    }

    fn status_payloads(&self) -> Vec<String> {
        self.published
            .iter()
            .filter(|(topic, _, _)| topic.ends_with("/status"))
            .map(|(_, payload, _)| String::from_utf8_lossy(payload).into_owned())
            .collect()
    }
}

impl TransportPort for MockTransport {
    fn connect(&mut self, _opts: &ConnectOptions<'_>) -> bool {
        self.connect_times.push(self.now_ms);
        let ok = self.connect_results.pop_front().unwrap_or(true);
        self.connected = ok;
        ok
    }
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> bool {
        self.published
            .push((topic.to_owned(), payload.to_vec(), retain));
        self.connected
    }
    fn subscribe(&mut self, filter: &str, qos: u8) -> bool {
        self.subscribed.push((filter.to_owned(), qos));
        self.connected
    }
    fn disconnect(&mut self) {
        self.connected = false;
        self.disconnects += 1;
        self.inbound.clear();
    }
    fn is_connected(&self) -> bool {
        self.connected
    }
    fn service(&mut self, on_message: &mut dyn FnMut(&str, &[u8])) {
        while let Some((topic, payload)) = self.inbound.pop_front() {
            on_message(&topic, &payload);
        }
    }
}

struct MockLink {
    up: bool,
}

impl LinkPort for MockLink {
    fn is_up(&self) -> bool {
        self.up
    }
    fn force_station_mode(&mut self) {}
}

struct MockStorage {
    saved: Vec<ConfigStore>,
    attempts: u32,
    fail_next: u32,
}

impl MockStorage {
    fn new() -> Self {
        Self {
            saved: Vec::new(),
            attempts: 0,
            fail_next: 0,
        }
    }
}

impl StoragePort for MockStorage {
    fn load(&self) -> Result<Option<ConfigStore>, StorageError> {
        Ok(None)
    }
    fn save(&mut self, store: &ConfigStore) -> Result<(), StorageError> {
        self.attempts += 1;
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(StorageError::IoError);
        }
        self.saved.push(store.clone());
        Ok(())
    }
}

struct MockPortal {
    updates: VecDeque<PortalUpdate>,
}

impl PortalPort for MockPortal {
    fn process(&mut self) -> Option<PortalUpdate> {
        self.updates.pop_front()
    }
}

// ── Test rig ──────────────────────────────────────────────────

struct Rig {
    service: DoorbellService,
    io: MockIo,
    transport: MockTransport,
    link: MockLink,
    storage: MockStorage,
    portal: MockPortal,
    now_ms: u32,
}

impl Rig {
    fn new(config: ConfigStore) -> Self {
        let mut service = DoorbellService::new(config, "BELL-TEST01");
        service.start(0);
        Self {
            service,
            io: MockIo::new(),
            transport: MockTransport::new(),
            link: MockLink { up: true },
            storage: MockStorage::new(),
            portal: MockPortal {
                updates: VecDeque::new(),
            },
            now_ms: 0,
        }
    }

    /// Run `n` frames at the 20 ms cadence.
    fn run_frames(&mut self, n: u32) {
        for _ in 0..n {
            self.transport.now_ms = self.now_ms;
            self.service.frame(
                self.now_ms,
                &mut self.io,
                &mut self.transport,
                &mut self.link,
                &mut self.storage,
                &mut self.portal,
            );
            self.now_ms += 20;
        }
    }
}

/// Config with defaults already injected and a broker endpoint set, so
/// the service starts clean (not dirty).
fn provisioned_config() -> ConfigStore {
    let mut store = ConfigStore::new();
    config::inject_defaults(&mut store, "BELL-TEST01");
    store.put(keys::ENDPOINT, Value::text("broker.local"));
    store
}

// ── Reconnect rhythm ──────────────────────────────────────────

#[test]
fn failed_connects_retry_at_a_fixed_cadence() {
    let mut rig = Rig::new(provisioned_config());
    rig.transport.connect_results = VecDeque::from(vec![false; 10]);

    rig.run_frames(250);

    let times = &rig.transport.connect_times;
    assert!(times.len() >= 3, "expected 3+ attempts, got {:?}", times);
    let gaps: Vec<u32> = times.windows(2).map(|w| w[1] - w[0]).collect();
    // Constant spacing, never an increasing backoff.
    assert!(gaps.iter().all(|g| *g == gaps[0]), "gaps {:?}", gaps);
    assert!(gaps[0] >= DELAY_DWELL_MS);
    assert!(!rig.service.conn_parked());
}

#[test]
fn successful_connect_publishes_online_and_subscribes() {
    let mut rig = Rig::new(provisioned_config());

    rig.run_frames(60);

    let online: Vec<_> = rig
        .transport
        .published
        .iter()
        .filter(|(topic, payload, retain)| {
            topic == "DOORBELL/lastwill" && payload == b"online" && *retain
        })
        .collect();
    assert_eq!(online.len(), 1);
    assert_eq!(
        rig.transport.subscribed,
        [("DOORBELL/+".to_owned(), 0)]
    );
    assert_eq!(rig.service.conn_state_name(), "WAIT");
}

#[test]
fn quiet_system_heartbeats_once_then_stays_silent() {
    let mut rig = Rig::new(provisioned_config());

    // Long enough for several WAIT expiries (3 s apart).
    rig.run_frames(600);

    // Only the first heartbeat passes the change gate.
    assert_eq!(rig.transport.status_payloads(), ["en=1 ri=0"]);
}

// ── Remote commands ───────────────────────────────────────────

#[test]
fn ringer_disable_command_persists_and_reports() {
    let mut rig = Rig::new(provisioned_config());
    rig.transport
        .inbound
        .push_back(("DOORBELL/config".to_owned(), b"en=0".to_vec()));

    rig.run_frames(30);

    assert!(!rig.service.is_dirty());
    let saved = rig.storage.saved.last().expect("config persisted");
    assert_eq!(saved.get_bool(keys::RINGER_ON), Some(false));
    assert_eq!(rig.transport.status_payloads(), ["en=0 ri=0"]);
}

#[test]
fn persist_failure_keeps_retrying_until_storage_recovers() {
    let mut rig = Rig::new(provisioned_config());
    rig.storage.fail_next = 2;
    rig.transport
        .inbound
        .push_back(("DOORBELL/config".to_owned(), b"en=0".to_vec()));

    rig.run_frames(50);

    assert_eq!(rig.storage.attempts, 3);
    assert_eq!(rig.storage.saved.len(), 1);
    assert!(!rig.service.is_dirty());
    // In-memory config stayed authoritative through the failures.
    assert_eq!(
        rig.service.config().get_bool(keys::RINGER_ON),
        Some(false)
    );
}

#[test]
fn restart_command_honored_after_grace_delay() {
    let mut rig = Rig::new(provisioned_config());
    rig.transport
        .inbound
        .push_back(("DOORBELL/reset".to_owned(), b"1".to_vec()));

    // Request lands on the first frame; grace has not elapsed yet.
    rig.run_frames(RESTART_GRACE_MS / 20 - 10);
    assert!(!rig.service.take_restart());

    rig.run_frames(20);
    assert!(rig.service.take_restart());
    // One-shot: the flag does not re-arm.
    rig.run_frames(20);
    assert!(!rig.service.take_restart());
}

// ── Button path ───────────────────────────────────────────────

#[test]
fn contact_bounce_yields_no_reports() {
    let mut rig = Rig::new(provisioned_config());
    rig.link.up = false; // keep the sequencer out of the picture

    for i in 0..40 {
        rig.io.raw_button = i % 2 == 0;
        rig.run_frames(1);
    }

    assert!(rig.transport.status_payloads().is_empty());
    assert!(!rig.service.pressed());
    assert!(!rig.io.ringer);
}

#[test]
fn held_press_reports_exactly_once_and_rings() {
    let mut rig = Rig::new(provisioned_config());
    rig.link.up = false;

    rig.run_frames(10);
    rig.io.raw_button = false; // press (active low)
    rig.run_frames(30);

    assert!(rig.service.pressed());
    assert!(rig.io.ringer);
    assert!(rig.io.indicator);
    assert_eq!(rig.transport.status_payloads(), ["en=1 ri=1"]);

    rig.io.raw_button = true; // release
    rig.run_frames(30);

    assert!(!rig.service.pressed());
    assert!(!rig.io.ringer);
    assert_eq!(
        rig.transport.status_payloads(),
        ["en=1 ri=1", "en=1 ri=0"]
    );
}

#[test]
fn ring_window_caps_a_stuck_button() {
    let mut config = provisioned_config();
    config.put(keys::MAX_RING_TIME, Value::Int(200));
    let mut rig = Rig::new(config);
    rig.link.up = false;

    rig.io.raw_button = false;
    rig.run_frames(60); // held for 1.2 s against a 200 ms window

    assert!(rig.service.pressed());
    // Rang at first, then the window expired while still pressed.
    assert!(rig.io.ringer_trace.iter().any(|on| *on));
    assert!(!rig.io.ringer);
}

#[test]
fn disabled_ringer_still_reports_but_stays_silent() {
    let mut config = provisioned_config();
    config.put(keys::RINGER_ON, Value::Bool(false));
    let mut rig = Rig::new(config);
    rig.link.up = false;

    rig.io.raw_button = false;
    rig.run_frames(30);

    assert!(rig.service.pressed());
    assert!(!rig.io.ringer);
    assert!(rig.io.indicator); // indicator mirrors the press regardless
    assert_eq!(rig.transport.status_payloads(), ["en=0 ri=1"]);
}

// ── Portal ────────────────────────────────────────────────────

#[test]
fn portal_save_rewrites_endpoint_and_forces_reconnect() {
    let mut rig = Rig::new(provisioned_config());
    rig.run_frames(60); // connected
    assert!(rig.transport.is_connected());

    let mut update = PortalUpdate {
        endpoint: heapless::String::new(),
        port: 8883,
        username: heapless::String::new(),
        password: heapless::String::new(),
    };
    update.endpoint.push_str("10.0.0.9").unwrap();
    update.username.push_str("bell").unwrap();
    rig.portal.updates.push_back(update);

    // Long enough to cross the next WAIT expiry and reconnect.
    rig.run_frames(300);

    assert_eq!(
        rig.service.config().get_text(keys::ENDPOINT),
        Some("10.0.0.9")
    );
    assert_eq!(rig.service.config().get_int(keys::PORT), Some(8883));
    assert!(rig.transport.disconnects >= 1);
    let saved = rig.storage.saved.last().expect("new endpoint persisted");
    assert_eq!(saved.get_text(keys::ENDPOINT), Some("10.0.0.9"));
    // Sequencer reconnected with the new values.
    assert!(rig.transport.connect_times.len() >= 2);
}

// ── First boot ────────────────────────────────────────────────

#[test]
fn first_boot_injects_and_persists_defaults() {
    let mut rig = Rig::new(ConfigStore::new());
    rig.link.up = false;

    rig.run_frames(10);

    let saved = rig.storage.saved.last().expect("defaults persisted");
    assert_eq!(saved.get_bool(keys::RINGER_ON), Some(true));
    assert_eq!(saved.get_int(keys::PORT), Some(1883));
    assert_eq!(saved.get_int(keys::MAX_RING_TIME), Some(5000));
    assert_eq!(saved.get_text(keys::CLIENT_ID), Some("BELL-TEST01"));
    assert!(!rig.service.is_dirty());
}
