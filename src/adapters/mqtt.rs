//! MQTT transport adapter.
//!
//! Implements [`TransportPort`] over `esp_idf_svc::mqtt::client`. The
//! ESP-IDF client is callback-driven; inbound messages and connection
//! events land in a shared [`Inbox`] from the client task, and the
//! control loop drains it from `service()` on its own cadence. Nothing
//! here blocks the 50 Hz frame.
//!
//! On non-espidf targets the adapter is a scripted in-memory double so
//! the sequencer and command path run in host tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::app::ports::{ConnectOptions, TransportPort};

#[cfg(target_os = "espidf")]
use esp_idf_svc::mqtt::client::{
    EspMqttClient, EventPayload, LwtConfiguration, MqttClientConfiguration, QoS,
};

/// Most messages the inbox buffers between two `service()` calls.
const INBOX_DEPTH: usize = 8;
/// Inbound payloads larger than this are dropped at the adapter edge.
const MAX_INBOUND_PAYLOAD: usize = 256;

/// Shared between the client's event callback and the control loop.
struct Inbox {
    connected: AtomicBool,
    queue: Mutex<VecDeque<(String, Vec<u8>)>>,
}

impl Inbox {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    fn push(&self, topic: &str, payload: &[u8]) {
        if payload.len() > MAX_INBOUND_PAYLOAD {
            warn!("mqtt: dropping oversized inbound payload ({} bytes)", payload.len());
            return;
        }
        let Ok(mut queue) = self.queue.lock() else {
            return;
        };
        if queue.len() >= INBOX_DEPTH {
            warn!("mqtt: inbox full, dropping message");
            return;
        }
        queue.push_back((topic.to_owned(), payload.to_vec()));
    }

    fn clear(&self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }
}

pub struct MqttAdapter {
    inbox: Arc<Inbox>,
    #[cfg(target_os = "espidf")]
    client: Option<EspMqttClient<'static>>,
    #[cfg(not(target_os = "espidf"))]
    sim_published: Vec<(String, Vec<u8>, bool)>,
    #[cfg(not(target_os = "espidf"))]
    sim_subscriptions: Vec<String>,
}

impl Default for MqttAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttAdapter {
    pub fn new() -> Self {
        Self {
            inbox: Arc::new(Inbox::new()),
            #[cfg(target_os = "espidf")]
            client: None,
            #[cfg(not(target_os = "espidf"))]
            sim_published: Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_subscriptions: Vec::new(),
        }
    }

    #[cfg(target_os = "espidf")]
    fn qos(level: u8) -> QoS {
        match level {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce,
        }
    }

    /// Simulation only: inject an inbound message for the next `service()`.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_push_message(&self, topic: &str, payload: &[u8]) {
        self.inbox.push(topic, payload);
    }

    /// Simulation only: everything published so far as `(topic, payload, retain)`.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_published(&self) -> &[(String, Vec<u8>, bool)] {
        &self.sim_published
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_subscriptions(&self) -> &[String] {
        &self.sim_subscriptions
    }
}

impl TransportPort for MqttAdapter {
    #[cfg(target_os = "espidf")]
    fn connect(&mut self, opts: &ConnectOptions<'_>) -> bool {
        use core::fmt::Write;

        // Drop any previous session first.
        self.disconnect();

        let mut url = heapless::String::<96>::new();
        if write!(url, "mqtt://{}:{}", opts.endpoint, opts.port).is_err() {
            warn!("mqtt: broker URL too long");
            return false;
        }

        let conf = MqttClientConfiguration {
            client_id: Some(opts.client_id),
            username: (!opts.username.is_empty()).then_some(opts.username),
            password: (!opts.password.is_empty()).then_some(opts.password),
            lwt: Some(LwtConfiguration {
                topic: opts.last_will_topic,
                payload: opts.last_will_payload,
                qos: Self::qos(opts.last_will_qos),
                retain: opts.last_will_retain,
            }),
            ..Default::default()
        };

        let inbox = Arc::clone(&self.inbox);
        let result = EspMqttClient::new_cb(&url, &conf, move |event| match event.payload() {
            EventPayload::Connected(_) => inbox.connected.store(true, Ordering::Release),
            EventPayload::Disconnected => inbox.connected.store(false, Ordering::Release),
            EventPayload::Received {
                topic: Some(topic),
                data,
                ..
            } => inbox.push(topic, data),
            _ => {}
        });

        match result {
            Ok(client) => {
                info!("mqtt: session opened to {}", url);
                self.client = Some(client);
                true
            }
            Err(e) => {
                warn!("mqtt: connect failed ({})", e);
                false
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn connect(&mut self, opts: &ConnectOptions<'_>) -> bool {
        if opts.endpoint.is_empty() {
            return false;
        }
        self.inbox.connected.store(true, Ordering::Release);
        info!("mqtt(sim): connected to {}:{}", opts.endpoint, opts.port);
        true
    }

    #[cfg(target_os = "espidf")]
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> bool {
        let Some(client) = self.client.as_mut() else {
            return false;
        };
        match client.publish(topic, QoS::AtMostOnce, retain, payload) {
            Ok(_) => true,
            Err(e) => {
                warn!("mqtt: publish to '{}' failed ({})", topic, e);
                false
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.sim_published
            .push((topic.to_owned(), payload.to_vec(), retain));
        true
    }

    #[cfg(target_os = "espidf")]
    fn subscribe(&mut self, filter: &str, qos: u8) -> bool {
        let Some(client) = self.client.as_mut() else {
            return false;
        };
        match client.subscribe(filter, Self::qos(qos)) {
            Ok(_) => true,
            Err(e) => {
                warn!("mqtt: subscribe '{}' failed ({})", filter, e);
                false
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn subscribe(&mut self, filter: &str, _qos: u8) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.sim_subscriptions.push(filter.to_owned());
        true
    }

    fn disconnect(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            // Dropping the client closes the session; the broker then
            // publishes the registered last-will.
            self.client = None;
        }
        self.inbox.connected.store(false, Ordering::Release);
        self.inbox.clear();
    }

    #[cfg(target_os = "espidf")]
    fn is_connected(&self) -> bool {
        self.client.is_some() && self.inbox.connected.load(Ordering::Acquire)
    }

    #[cfg(not(target_os = "espidf"))]
    fn is_connected(&self) -> bool {
        self.inbox.connected.load(Ordering::Acquire)
    }

    fn service(&mut self, on_message: &mut dyn FnMut(&str, &[u8])) {
        loop {
            let next = {
                let Ok(mut queue) = self.inbox.queue.lock() else {
                    return;
                };
                queue.pop_front()
            };
            let Some((topic, payload)) = next else {
                return;
            };
            on_message(&topic, &payload);
        }
    }
}
