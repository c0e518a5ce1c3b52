//! Inbound command parsing.
//!
//! Remote commands arrive on the subscribed `<base>/+` wildcard as short
//! `key=value` token payloads:
//!
//! | Topic suffix | Payload token | Effect                              |
//! |--------------|---------------|-------------------------------------|
//! | `/config`    | `en=<0\|1>`   | enable/disable the ringer           |
//! | `/reset`     | `1`           | restart after a fixed grace delay   |
//!
//! Payloads at or beyond the receive buffer size are dropped silently, as
//! are non-UTF-8 payloads and unknown topics.

/// Receive buffer size; payloads of this length or longer are dropped.
pub const MAX_PAYLOAD: usize = 64;

/// A parsed remote command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Set whether the physical ringer may sound.
    SetRinger(bool),
    /// Schedule a process restart (honored after the grace delay).
    RequestRestart,
}

/// Iterate `key[=value]` tokens separated by whitespace.
fn tokens(payload: &str) -> impl Iterator<Item = (&str, Option<&str>)> {
    payload.split_whitespace().map(|t| match t.split_once('=') {
        Some((k, v)) => (k, Some(v)),
        None => (t, None),
    })
}

/// Parse an inbound `(topic, payload)` pair into a command, if any.
pub fn parse(topic: &str, payload: &[u8]) -> Option<Command> {
    if payload.len() >= MAX_PAYLOAD {
        return None;
    }
    let payload = core::str::from_utf8(payload).ok()?;

    if topic.ends_with("/config") {
        for (key, value) in tokens(payload) {
            if key == "en" {
                let n: i32 = value?.parse().ok()?;
                return Some(Command::SetRinger(n != 0));
            }
        }
        return None;
    }

    if topic.ends_with("/reset") {
        for (key, _) in tokens(payload) {
            if key == "1" {
                return Some(Command::RequestRestart);
            }
        }
    }

    None
}
