//! Configuration portal adapter.
//!
//! Implements [`PortalPort`]. On ESP-IDF a minimal HTTP endpoint
//! (`POST /broker`, urlencoded form body) captures broker parameters;
//! the handler runs on the httpd task and parks the parsed update in a
//! shared slot, which the control loop collects from `process()` on the
//! portal maintenance slot. There is no UI — provisioning tools post the
//! form directly.
//!
//! The form parser is target-independent and tested on the host.

use std::sync::{Arc, Mutex};

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::{PortalPort, PortalUpdate};

#[cfg(target_os = "espidf")]
use esp_idf_svc::http::server::{Configuration as HttpConfiguration, EspHttpServer};
#[cfg(target_os = "espidf")]
use esp_idf_svc::http::Method;
#[cfg(target_os = "espidf")]
use esp_idf_svc::io::{Read as _, Write as _};

/// Largest accepted form body.
#[cfg(target_os = "espidf")]
const MAX_FORM_BODY: usize = 256;

// ───────────────────────────────────────────────────────────────
// Form parsing (host-testable)
// ───────────────────────────────────────────────────────────────

/// Percent-decode `src` into `out`, truncating at capacity. `+` decodes
/// to a space per the urlencoded convention.
fn decode_into<const N: usize>(out: &mut heapless::String<N>, src: &str) {
    let bytes = src.as_bytes();
    let mut decoded = heapless::Vec::<u8, N>::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = match bytes[i] {
            b'+' => b' ',
            b'%' => {
                let hex = bytes.get(i + 1..i + 3).and_then(|h| {
                    let s = core::str::from_utf8(h).ok()?;
                    u8::from_str_radix(s, 16).ok()
                });
                match hex {
                    Some(v) => {
                        i += 2;
                        v
                    }
                    None => b'%',
                }
            }
            other => other,
        };
        if decoded.push(b).is_err() {
            break;
        }
        i += 1;
    }
    if let Ok(s) = core::str::from_utf8(&decoded) {
        for ch in s.chars() {
            if out.push(ch).is_err() {
                break;
            }
        }
    }
}

/// Parse an urlencoded `server=..&port=..&user=..&pass=..` body.
/// Returns `None` unless a non-empty `server` field is present.
fn parse_form(body: &str) -> Option<PortalUpdate> {
    let mut update = PortalUpdate {
        endpoint: heapless::String::new(),
        port: 1883,
        username: heapless::String::new(),
        password: heapless::String::new(),
    };
    for pair in body.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key {
            "server" => decode_into(&mut update.endpoint, value),
            "port" => {
                if let Ok(p) = value.parse::<u16>() {
                    update.port = p;
                }
            }
            "user" => decode_into(&mut update.username, value),
            "pass" => decode_into(&mut update.password, value),
            _ => {}
        }
    }
    if update.endpoint.is_empty() {
        return None;
    }
    Some(update)
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

pub struct PortalAdapter {
    /// Written by the httpd task (or sim scripting), taken by `process()`.
    pending: Arc<Mutex<Option<PortalUpdate>>>,
    #[cfg(target_os = "espidf")]
    server: Option<EspHttpServer<'static>>,
}

impl Default for PortalAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl PortalAdapter {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(None)),
            #[cfg(target_os = "espidf")]
            server: None,
        }
    }

    /// Start the capture endpoint. Idempotent on the simulation backend.
    #[cfg(target_os = "espidf")]
    pub fn start(&mut self) -> anyhow::Result<()> {
        let mut server = EspHttpServer::new(&HttpConfiguration::default())?;
        let pending = Arc::clone(&self.pending);

        server.fn_handler::<anyhow::Error, _>("/broker", Method::Post, move |mut req| {
            let mut body = [0u8; MAX_FORM_BODY];
            let mut len = 0;
            loop {
                let n = req.read(&mut body[len..])?;
                if n == 0 {
                    break;
                }
                len += n;
                if len == body.len() {
                    break;
                }
            }
            let parsed = core::str::from_utf8(&body[..len])
                .ok()
                .and_then(parse_form);
            let status = match parsed {
                Some(update) => match pending.lock() {
                    Ok(mut slot) => {
                        info!("portal: broker parameters received");
                        *slot = Some(update);
                        "saved\n"
                    }
                    Err(_) => "error\n",
                },
                None => {
                    warn!("portal: rejected malformed parameter post");
                    "rejected\n"
                }
            };
            req.into_ok_response()?.write_all(status.as_bytes())?;
            Ok(())
        })?;

        info!("portal: parameter endpoint listening on /broker");
        self.server = Some(server);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn start(&mut self) -> anyhow::Result<()> {
        info!("portal(sim): no endpoint, updates are scripted");
        Ok(())
    }

    /// Simulation only: script a captured parameter save.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_post_form(&self, body: &str) {
        if let Some(update) = parse_form(body) {
            if let Ok(mut slot) = self.pending.lock() {
                *slot = Some(update);
            }
        }
    }
}

impl PortalPort for PortalAdapter {
    fn process(&mut self) -> Option<PortalUpdate> {
        self.pending.lock().ok()?.take()
    }
}
