//! Fuzz target: inbound command parsing.
//!
//! Feeds arbitrary `(topic, payload)` pairs through `commands::parse` and
//! checks the parser never panics and honors its drop rules.
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - Payloads at or beyond the receive buffer size never parse
//! - A command only ever comes from a `/config` or `/reset` topic
//!
//! cargo fuzz run fuzz_cmd_parser

#![no_main]

use doorbell::app::commands::{self, Command, MAX_PAYLOAD};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte splits the input into topic and payload.
    let split = (data[0] as usize) % data.len();
    let (topic_bytes, payload) = data[1..].split_at(split.min(data.len() - 1));
    let Ok(topic) = core::str::from_utf8(topic_bytes) else {
        return;
    };

    let result = commands::parse(topic, payload);

    if payload.len() >= MAX_PAYLOAD {
        assert!(result.is_none(), "oversized payload must be dropped");
    }

    match result {
        Some(Command::SetRinger(_)) => {
            assert!(topic.ends_with("/config"));
        }
        Some(Command::RequestRestart) => {
            assert!(topic.ends_with("/reset"));
        }
        None => {}
    }
});
