//! WiFi station-link adapter.
//!
//! Implements [`LinkPort`] — the narrow view the connection sequencer has
//! of the wireless link. Driver bring-up (netif, event loop, credentials)
//! happens once in `main.rs`; this adapter only answers "is the station
//! link usable" and forces station-only mode before a broker connect, so
//! a soft-AP left over from provisioning gets dropped.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: raw `esp_wifi_*` sys calls against the
//!   already-started global driver.
//! - **all other targets**: scripted simulation state for host tests.

use crate::app::ports::LinkPort;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

pub struct WifiAdapter {
    #[cfg(not(target_os = "espidf"))]
    sim_up: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_station_forced: u32,
}

impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            sim_up: false,
            #[cfg(not(target_os = "espidf"))]
            sim_station_forced: 0,
        }
    }

    /// Simulation only: script link availability.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_up(&mut self, up: bool) {
        self.sim_up = up;
    }

    /// Simulation only: how many times station mode was forced.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_station_forced(&self) -> u32 {
        self.sim_station_forced
    }
}

impl LinkPort for WifiAdapter {
    #[cfg(target_os = "espidf")]
    fn is_up(&self) -> bool {
        let mut ap_info: wifi_ap_record_t = unsafe { core::mem::zeroed() };
        // SAFETY: esp_wifi_sta_get_ap_info only reads driver state; the
        // driver was started in main() before the control loop.
        unsafe { esp_wifi_sta_get_ap_info(&mut ap_info) == ESP_OK }
    }

    #[cfg(not(target_os = "espidf"))]
    fn is_up(&self) -> bool {
        self.sim_up
    }

    #[cfg(target_os = "espidf")]
    fn force_station_mode(&mut self) {
        // SAFETY: mode switch on the started driver; drops any lingering
        // provisioning soft-AP before the broker connect.
        let ret = unsafe { esp_wifi_set_mode(wifi_mode_t_WIFI_MODE_STA) };
        if ret != ESP_OK {
            log::warn!("wifi: set STA mode failed (rc={})", ret);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn force_station_mode(&mut self) {
        self.sim_station_forced += 1;
    }
}
