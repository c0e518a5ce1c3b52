//! Doorbell firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod conn;
pub mod drivers;
pub mod error;
pub mod fsm;
pub mod report;

pub mod pins;

// ESPidf-only code is guarded by cfg attributes inside each adapter, so
// the crate compiles and tests on the host.
pub mod adapters;
