//! Application core: port traits, inbound commands, and the per-frame
//! control service.

pub mod commands;
pub mod ports;
pub mod service;
