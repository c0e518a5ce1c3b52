//! Doorbell control service — the per-frame orchestration core.
//!
//! Runs at a fixed 50 frames/second. Every frame services the
//! time-critical path (debounce → actuation → edge-gated reporting),
//! then exactly one round-robin *maintenance slot*, so slow work like a
//! connect handshake or a storage flush can never delay the button:
//!
//! ```text
//! frame:  debounce ─ ringer/LED ─ edge report ─┬─ slot 0: sequencer tick
//!                                              ├─ slot 1: transport service
//!                                              ├─ slot 2: persistence flush
//!                                              ├─ slot 3: portal service
//!                                              └─ slots 4–9: restart check
//! ```
//!
//! All mutable state (config store, dirty flag, restart request, change
//! gate) is owned here and touched only from the control thread.

use log::{info, warn};

use crate::app::commands::{self, Command};
use crate::app::ports::{
    ConnectOptions, GpioPort, LinkPort, PortalPort, StoragePort, TransportPort,
};
use crate::config::{self, keys, ConfigStore, Value};
use crate::conn::{self, ConnEnv, ConnMachine};
use crate::drivers::debounce::{DebouncedInput, DEFAULT_SETTLE_MS};
use crate::report::{self, ChangeGate};

/// Frames per second of the control loop.
pub const FRAMES_PER_SECOND: u32 = 50;
/// Frame period in milliseconds.
pub const FRAME_PERIOD_MS: u32 = 1000 / FRAMES_PER_SECOND;
/// Grace delay between a restart request and honoring it, so in-flight
/// reporting can flush.
pub const RESTART_GRACE_MS: u32 = 5000;

/// One round-robin maintenance task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Maintenance {
    /// Advance the connection sequencer one state.
    Sequencer,
    /// Service transport I/O and dispatch inbound commands.
    Transport,
    /// Flush the config store when dirty.
    Persist,
    /// Collect portal parameter saves.
    Portal,
    /// Honor a pending restart request after its grace delay.
    RestartCheck,
}

/// Maintenance policy as data: the slot assignment within one cycle.
/// One entry runs per frame, so each heavyweight task gets at most one
/// 20 ms frame in ten and the button path is never crowded out.
const MAINTENANCE_SCHEDULE: [Maintenance; 10] = [
    Maintenance::Sequencer,
    Maintenance::Transport,
    Maintenance::Persist,
    Maintenance::Portal,
    Maintenance::RestartCheck,
    Maintenance::RestartCheck,
    Maintenance::RestartCheck,
    Maintenance::RestartCheck,
    Maintenance::RestartCheck,
    Maintenance::RestartCheck,
];

pub struct DoorbellService {
    config: ConfigStore,
    /// Set on any config mutation, cleared only after a successful save.
    config_dirty: bool,
    input: DebouncedInput,
    gate: ChangeGate,
    machine: ConnMachine,
    frame_counter: u32,
    /// Timestamp of the last committed press edge, for the ring window.
    bell_start_ms: u32,
    /// Timestamp of a pending restart request, if any.
    restart_requested_at: Option<u32>,
    restart_due: bool,
}

impl DoorbellService {
    /// Build the service around a loaded (or empty) config store.
    ///
    /// Injects factory defaults for missing keys; when that writes
    /// anything the dirty flag starts set so first-boot defaults persist
    /// on the first flush slot.
    pub fn new(mut config: ConfigStore, client_id: &str) -> Self {
        let wrote = config::inject_defaults(&mut config, client_id);
        if wrote {
            info!("service: defaults injected, scheduling persist");
        }
        Self {
            config,
            config_dirty: wrote,
            input: DebouncedInput::new(crate::pins::INVERT_INPUT, DEFAULT_SETTLE_MS),
            gate: ChangeGate::new(),
            machine: conn::build_conn_machine(),
            frame_counter: 0,
            bell_start_ms: 0,
            restart_due: false,
            restart_requested_at: None,
        }
    }

    /// Start the connection sequencer. Call once before the first frame.
    pub fn start(&mut self, now_ms: u32) {
        self.machine.start(now_ms);
    }

    /// Run one fixed-rate control frame.
    pub fn frame(
        &mut self,
        now_ms: u32,
        io: &mut impl GpioPort,
        transport: &mut impl TransportPort,
        link: &mut impl LinkPort,
        storage: &mut impl StoragePort,
        portal: &mut impl PortalPort,
    ) {
        self.frame_counter = self.frame_counter.wrapping_add(1);

        // ── Time-critical path, every frame ───────────────────
        self.input.handle(io.read_button_raw());

        if self.input.is_edge_up() {
            self.bell_start_ms = now_ms;
        }

        io.set_indicator(self.input.current());

        let ringer_on = self.config.get_bool(keys::RINGER_ON).unwrap_or(false);
        let max_ring_ms = self.config.get_int(keys::MAX_RING_TIME).unwrap_or(0) as u32;
        let within_window = now_ms.wrapping_sub(self.bell_start_ms) < max_ring_ms;
        io.set_ringer(ringer_on && within_window && self.input.current());

        if self.input.is_edge_up() || self.input.is_edge_down() {
            // Edges always report, bypassing the gate (which still
            // records the payload so the next gated publish compares
            // against what actually went out).
            self.publish_status(transport, true);
        }

        // ── One maintenance slot per frame ────────────────────
        let slot = self.frame_counter as usize % MAINTENANCE_SCHEDULE.len();
        match MAINTENANCE_SCHEDULE[slot] {
            Maintenance::Sequencer => self.slot_sequencer(now_ms, transport, link),
            Maintenance::Transport => self.slot_transport(now_ms, transport),
            Maintenance::Persist => self.slot_persist(transport, storage),
            Maintenance::Portal => self.slot_portal(transport, portal),
            Maintenance::RestartCheck => self.slot_restart_check(now_ms),
        }
    }

    /// Whether a requested restart's grace delay has elapsed. Clears the
    /// flag, so the caller restarts at most once per request.
    pub fn take_restart(&mut self) -> bool {
        core::mem::take(&mut self.restart_due)
    }

    // ── Maintenance slots ─────────────────────────────────────

    fn slot_sequencer(
        &mut self,
        now_ms: u32,
        transport: &mut impl TransportPort,
        link: &mut impl LinkPort,
    ) {
        let pressed = self.input.current();
        let mut env = LinkEnv {
            transport,
            link,
            config: &self.config,
            gate: &mut self.gate,
            pressed,
        };
        self.machine.tick(now_ms, &mut env);
    }

    fn slot_transport(&mut self, now_ms: u32, transport: &mut impl TransportPort) {
        let config = &mut self.config;
        let dirty = &mut self.config_dirty;
        let restart_at = &mut self.restart_requested_at;
        transport.service(&mut |topic, payload| {
            match commands::parse(topic, payload) {
                Some(Command::SetRinger(on)) => {
                    info!("cmd: ringer {}", if on { "enabled" } else { "disabled" });
                    let _ = config.put(keys::RINGER_ON, Value::Bool(on));
                    *dirty = true;
                }
                Some(Command::RequestRestart) => {
                    info!("cmd: restart requested");
                    *restart_at = Some(now_ms);
                }
                None => {}
            }
        });
    }

    fn slot_persist(&mut self, transport: &mut impl TransportPort, storage: &mut impl StoragePort) {
        if !self.config_dirty {
            return;
        }
        // Re-emit status so subscribers see command effects promptly.
        self.publish_status(transport, false);
        match storage.save(&self.config) {
            Ok(()) => {
                self.config_dirty = false;
                info!("config: persisted");
            }
            Err(e) => {
                // In-memory config stays authoritative; the flag stays
                // set so the next flush slot retries.
                warn!("config: persist failed ({}), will retry", e);
            }
        }
    }

    fn slot_portal(&mut self, transport: &mut impl TransportPort, portal: &mut impl PortalPort) {
        let Some(update) = portal.process() else {
            return;
        };
        if update.endpoint.is_empty() {
            return;
        }
        info!("portal: broker parameters updated");
        let _ = self.config.put(keys::ENDPOINT, Value::text(&update.endpoint));
        let _ = self
            .config
            .put(keys::PORT, Value::Int(i64::from(update.port)));
        let _ = self.config.put(keys::USERNAME, Value::text(&update.username));
        let _ = self.config.put(keys::PASSWORD, Value::text(&update.password));
        self.config_dirty = true;
        // Drop the session so the sequencer reconnects with new values.
        transport.disconnect();
    }

    fn slot_restart_check(&mut self, now_ms: u32) {
        if let Some(requested_at) = self.restart_requested_at {
            if now_ms.wrapping_sub(requested_at) >= RESTART_GRACE_MS {
                self.restart_requested_at = None;
                self.restart_due = true;
            }
        }
    }

    // ── Reporting ─────────────────────────────────────────────

    fn publish_status(&mut self, transport: &mut impl TransportPort, force: bool) {
        let ringer_on = self.config.get_bool(keys::RINGER_ON).unwrap_or(false);
        let payload = report::format_status(ringer_on, self.input.current());
        let changed = self.gate.should_emit(payload.as_bytes());
        if !(changed || force) {
            return;
        }
        let base = self.config.get_text(keys::BASE_TOPIC).unwrap_or("DOORBELL");
        let topic = report::topic_join(base, report::STATUS_TOPIC);
        if !transport.publish(&topic, payload.as_bytes(), true) {
            warn!("report: status publish failed");
        }
    }

    // ── Accessors (tests, main loop) ──────────────────────────

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn is_dirty(&self) -> bool {
        self.config_dirty
    }

    pub fn pressed(&self) -> bool {
        self.input.current()
    }

    pub fn conn_state_name(&self) -> &'static str {
        self.machine.current_name()
    }

    pub fn conn_parked(&self) -> bool {
        self.machine.is_parked()
    }
}

// ───────────────────────────────────────────────────────────────
// Sequencer environment
// ───────────────────────────────────────────────────────────────

/// Per-tick view the connection graph runs against, borrowing disjoint
/// pieces of the service and its ports.
struct LinkEnv<'a, T: TransportPort, L: LinkPort> {
    transport: &'a mut T,
    link: &'a mut L,
    config: &'a ConfigStore,
    gate: &'a mut ChangeGate,
    pressed: bool,
}

impl<T: TransportPort, L: LinkPort> ConnEnv for LinkEnv<'_, T, L> {
    fn endpoint_configured(&self) -> bool {
        config::endpoint_configured(self.config)
    }

    fn transport_connected(&self) -> bool {
        self.transport.is_connected()
    }

    fn link_up(&self) -> bool {
        self.link.is_up()
    }

    fn force_station_mode(&mut self) {
        self.link.force_station_mode();
    }

    fn connect(&mut self) -> bool {
        let base = self.config.get_text(keys::BASE_TOPIC).unwrap_or("DOORBELL");
        let last_will = report::topic_join(base, report::LASTWILL_TOPIC);
        let opts = ConnectOptions {
            endpoint: self.config.get_text(keys::ENDPOINT).unwrap_or(""),
            port: self.config.get_int(keys::PORT).unwrap_or(1883) as u16,
            client_id: self.config.get_text(keys::CLIENT_ID).unwrap_or("DOORBELL"),
            username: self.config.get_text(keys::USERNAME).unwrap_or(""),
            password: self.config.get_text(keys::PASSWORD).unwrap_or(""),
            last_will_topic: &last_will,
            last_will_qos: 0,
            last_will_retain: true,
            last_will_payload: report::LASTWILL_OFFLINE,
        };
        self.transport.connect(&opts)
    }

    fn publish_online(&mut self) -> bool {
        let base = self.config.get_text(keys::BASE_TOPIC).unwrap_or("DOORBELL");
        let topic = report::topic_join(base, report::LASTWILL_TOPIC);
        self.transport
            .publish(&topic, report::LASTWILL_ONLINE, true)
    }

    fn subscribe_commands(&mut self) -> bool {
        let base = self.config.get_text(keys::BASE_TOPIC).unwrap_or("DOORBELL");
        let filter = report::topic_join(base, "+");
        self.transport.subscribe(&filter, 0)
    }

    fn disconnect(&mut self) {
        self.transport.disconnect();
    }

    fn heartbeat(&mut self) {
        // Change-gated status on the WAIT cadence, so a quiet system
        // stays quiet on the wire.
        let ringer_on = self.config.get_bool(keys::RINGER_ON).unwrap_or(false);
        let payload = report::format_status(ringer_on, self.pressed);
        if self.gate.should_emit(payload.as_bytes()) {
            let base = self.config.get_text(keys::BASE_TOPIC).unwrap_or("DOORBELL");
            let topic = report::topic_join(base, report::STATUS_TOPIC);
            if !self.transport.publish(&topic, payload.as_bytes(), true) {
                warn!("report: heartbeat publish failed");
            }
        }
    }
}
