//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements    | Connects to                    |
//! |-------------|---------------|--------------------------------|
//! | `gpio`      | GpioPort      | button, ringer, indicator pins |
//! | `mqtt`      | TransportPort | ESP-IDF MQTT client            |
//! | `wifi`      | LinkPort      | ESP-IDF WiFi STA               |
//! | `nvs`       | StoragePort   | NVS / in-memory store          |
//! | `portal`    | PortalPort    | HTTP parameter page            |
//! | `time`      | —             | ESP32 system timer             |
//! | `device_id` | —             | factory MAC eFuse              |

pub mod device_id;
pub mod gpio;
pub mod mqtt;
pub mod nvs;
pub mod portal;
pub mod time;
pub mod wifi;
