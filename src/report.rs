//! Change-gated status reporting.
//!
//! The status payload is tiny ASCII (`en=<0|1> ri=<0|1>`), so instead of
//! diffing fields the gate checksums the rendered payload and suppresses
//! re-emission while the checksum is unchanged. A checksum collision is an
//! accepted low-probability missed report, not a correctness bug.

use core::fmt::Write as _;

/// Topic leaf for the status payload.
pub const STATUS_TOPIC: &str = "status";
/// Topic leaf registered as the broker last-will.
pub const LASTWILL_TOPIC: &str = "lastwill";
pub const LASTWILL_ONLINE: &[u8] = b"online";
pub const LASTWILL_OFFLINE: &[u8] = b"offline";

/// Maximum rendered topic length (`<base>/<leaf>`).
pub const MAX_TOPIC: usize = 64;

/// CRC-16/CCITT-FALSE over `data` (poly 0x1021, init 0xFFFF).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Suppresses redundant re-emission of an outbound payload.
///
/// Pure aside from updating its own stored checksum.
#[derive(Debug, Default)]
pub struct ChangeGate {
    last_crc: Option<u16>,
}

impl ChangeGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` — updating the stored checksum — iff `payload`
    /// checksums differently from the previously stored value. The first
    /// call always returns `true`.
    pub fn should_emit(&mut self, payload: &[u8]) -> bool {
        let crc = crc16(payload);
        if self.last_crc == Some(crc) {
            return false;
        }
        self.last_crc = Some(crc);
        true
    }
}

/// Render the status payload: ringer-enabled and button-pressed flags.
pub fn format_status(ringer_on: bool, pressed: bool) -> heapless::String<16> {
    let mut out = heapless::String::new();
    // Payload always fits in 16 bytes.
    let _ = write!(out, "en={} ri={}", u8::from(ringer_on), u8::from(pressed));
    out
}

/// Join `<base>/<leaf>`, truncating if the base topic is oversized.
pub fn topic_join(base: &str, leaf: &str) -> heapless::String<MAX_TOPIC> {
    let mut out = heapless::String::new();
    let _ = out.push_str(base);
    let _ = out.push('/');
    let _ = out.push_str(leaf);
    out
}
