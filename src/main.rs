//! Doorbell Firmware — Main Entry Point
//!
//! Hexagonal architecture around a fixed-rate control loop.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   Adapters (outer ring)                  │
//! │                                                          │
//! │  GpioAdapter   MqttAdapter   WifiAdapter                 │
//! │  (GpioPort)    (Transport)   (LinkPort)                  │
//! │  NvsAdapter    PortalAdapter TimeAdapter                 │
//! │  (StoragePort) (PortalPort)  (clock)                     │
//! │                                                          │
//! │  ───────────── Port Trait Boundary ─────────────────     │
//! │                                                          │
//! │  ┌────────────────────────────────────────────────┐      │
//! │  │        DoorbellService (pure logic)            │      │
//! │  │  debounce · ring window · reporting · conn FSM │      │
//! │  └────────────────────────────────────────────────┘      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The loop runs at 50 frames/second; every frame handles the button
//! path and exactly one maintenance slot.

#![deny(unused_must_use)]

use anyhow::Result;
use log::{info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{Configuration, EspWifi};

use doorbell::adapters::device_id;
use doorbell::adapters::gpio::GpioAdapter;
use doorbell::adapters::mqtt::MqttAdapter;
use doorbell::adapters::nvs::NvsAdapter;
use doorbell::adapters::portal::PortalAdapter;
use doorbell::adapters::time::TimeAdapter;
use doorbell::adapters::wifi::WifiAdapter;
use doorbell::app::ports::{GpioPort, StoragePort};
use doorbell::app::service::{DoorbellService, FRAME_PERIOD_MS, FRAMES_PER_SECOND};
use doorbell::config::ConfigStore;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Doorbell v{}                     ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Persistent storage + config ────────────────────────
    let mut nvs = NvsAdapter::new()?;
    let config = match nvs.load() {
        Ok(Some(store)) => {
            info!("Config loaded from NVS ({} entries)", store.len());
            store
        }
        Ok(None) => {
            info!("First boot, starting with empty config");
            ConfigStore::new()
        }
        Err(e) => {
            warn!("Config load failed ({}), starting fresh", e);
            ConfigStore::new()
        }
    };

    // ── 3. Device identity ────────────────────────────────────
    let mac = device_id::read_mac();
    let dev_id = device_id::device_id(&mac);
    info!("Device ID: {}", dev_id);

    // ── 4. WiFi bring-up (credentials persisted in flash) ─────
    let peripherals = esp_idf_svc::hal::peripherals::Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let mut wifi = EspWifi::new(peripherals.modem, sysloop, Some(nvs_partition))?;
    wifi.start()?;
    match wifi.get_configuration()? {
        Configuration::Client(client) if !client.ssid.is_empty() => {
            info!("WiFi: connecting to '{}'", client.ssid);
            if let Err(e) = wifi.connect() {
                warn!("WiFi: connect failed ({}), sequencer will retry", e);
            }
        }
        _ => warn!("WiFi: no stored credentials, link stays down"),
    }

    // ── 5. Adapters ───────────────────────────────────────────
    let mut gpio = GpioAdapter::new();
    gpio.init()?;

    let mut mqtt = MqttAdapter::new();
    let mut link = WifiAdapter::new();
    let mut portal = PortalAdapter::new();
    portal.start()?;
    let time = TimeAdapter::new();

    // ── 6. Control service ────────────────────────────────────
    let mut service = DoorbellService::new(config, &dev_id);
    service.start(time.now_ms());

    info!("System ready. Control loop at {} Hz.", FRAMES_PER_SECOND);

    // ── 7. Control loop ───────────────────────────────────────
    loop {
        let frame_start = time.now_ms();

        service.frame(
            frame_start,
            &mut gpio,
            &mut mqtt,
            &mut link,
            &mut nvs,
            &mut portal,
        );

        if service.take_restart() {
            info!("Restarting now");
            // SAFETY: esp_restart never returns; all state is persisted
            // (or deliberately dropped) by this point.
            unsafe { esp_idf_svc::sys::esp_restart() };
        }

        // Sleep out the remainder of the 20 ms frame.
        let elapsed = time.now_ms().wrapping_sub(frame_start);
        if elapsed < FRAME_PERIOD_MS {
            std::thread::sleep(std::time::Duration::from_millis(
                u64::from(FRAME_PERIOD_MS - elapsed),
            ));
        }
    }
}
