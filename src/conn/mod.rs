//! Connection sequencing protocol.
//!
//! A fixed cyclic graph over the [`fsm`](crate::fsm) engine that sequences
//! the broker connect/reconnect handshake without ever blocking a frame:
//!
//! ```text
//!  START ──▶ TEST ──ok──▶ CONNECT ──▶ PUBLISH_ONLINE ──▶ SUBSCRIBE
//!             ▲ │                │                            │
//!             │ └──link down────┐│fail                        │fail
//!             │                 ▼▼                            ▼
//!           WAIT ◀──────────── DELAY ◀────────────────────────┘
//!           (3 s)              (1.5 s, fixed — not exponential)
//! ```
//!
//! The graph is built once at boot and advanced one tick per maintenance
//! slot. All side effects flow through the [`ConnEnv`] trait so the graph
//! can be driven with a scripted environment in tests.

use crate::fsm::{CtxFamily, State, StateMachine, StateRef, Transition};

pub const START: StateRef = StateRef(0);
pub const DELAY: StateRef = StateRef(1);
pub const TEST: StateRef = StateRef(2);
pub const CONNECT: StateRef = StateRef(3);
pub const PUBLISH_ONLINE: StateRef = StateRef(4);
pub const SUBSCRIBE: StateRef = StateRef(5);
pub const WAIT: StateRef = StateRef(6);

pub const STATE_COUNT: usize = 7;

/// Fixed retry delay between reconnect attempts.
pub const DELAY_DWELL_MS: u32 = 1500;
/// Liveness re-check cadence while connected.
pub const WAIT_DWELL_MS: u32 = 3000;

/// Environment the sequencing graph runs against: the narrow slice of
/// transport, link, and configuration the seven states need.
pub trait ConnEnv {
    /// Whether a broker endpoint is configured and non-empty.
    fn endpoint_configured(&self) -> bool;
    /// Whether the transport currently reports a live session.
    fn transport_connected(&self) -> bool;
    /// Whether the wireless link is up.
    fn link_up(&self) -> bool;
    /// Force station-only operating mode (drops a lingering soft-AP).
    fn force_station_mode(&mut self);
    /// Attempt the broker handshake, registering the last-will.
    fn connect(&mut self) -> bool;
    /// Publish the `online` marker on the last-will topic.
    fn publish_online(&mut self) -> bool;
    /// Subscribe to the command-topic wildcard.
    fn subscribe_commands(&mut self) -> bool;
    fn disconnect(&mut self);
    /// Periodic status heartbeat emitted when WAIT expires.
    fn heartbeat(&mut self);
}

impl CtxFamily for dyn ConnEnv {
    type Of<'a> = dyn ConnEnv + 'a;
}

pub type ConnMachine = StateMachine<dyn ConnEnv, STATE_COUNT>;

/// Build the connection sequencing machine. Call [`ConnMachine::start`]
/// before the first tick.
pub fn build_conn_machine() -> ConnMachine {
    StateMachine::new(
        [
            State { name: "START", dwell_ms: None, run: run_start },
            State { name: "DELAY", dwell_ms: Some(DELAY_DWELL_MS), run: run_delay },
            State { name: "TEST", dwell_ms: None, run: run_test },
            State { name: "CONNECT", dwell_ms: None, run: run_connect },
            State { name: "PUBLISH_ONLINE", dwell_ms: None, run: run_publish_online },
            State { name: "SUBSCRIBE", dwell_ms: None, run: run_subscribe },
            State { name: "WAIT", dwell_ms: Some(WAIT_DWELL_MS), run: run_wait },
        ],
        START,
    )
}

fn run_start(_env: &mut dyn ConnEnv) -> Transition {
    Transition::To(TEST)
}

fn run_delay(env: &mut dyn ConnEnv) -> Transition {
    if env.endpoint_configured() {
        Transition::To(TEST)
    } else {
        // Route back through the graph so re-entry re-arms the dwell
        // timer — another full delay before the next config check.
        Transition::To(DELAY)
    }
}

fn run_test(env: &mut dyn ConnEnv) -> Transition {
    if env.transport_connected() {
        if !env.link_up() {
            // Session outlived the link: drop it and retry later.
            env.disconnect();
            return Transition::To(DELAY);
        }
        return Transition::Stay;
    }

    if env.link_up() {
        env.force_station_mode();
        Transition::To(CONNECT)
    } else {
        Transition::Stay
    }
}

fn run_connect(env: &mut dyn ConnEnv) -> Transition {
    if env.connect() {
        Transition::To(PUBLISH_ONLINE)
    } else {
        Transition::To(DELAY)
    }
}

fn run_publish_online(env: &mut dyn ConnEnv) -> Transition {
    let _ = env.publish_online();
    Transition::To(SUBSCRIBE)
}

fn run_subscribe(env: &mut dyn ConnEnv) -> Transition {
    if env.subscribe_commands() {
        Transition::To(WAIT)
    } else {
        env.disconnect();
        Transition::To(DELAY)
    }
}

fn run_wait(env: &mut dyn ConnEnv) -> Transition {
    env.heartbeat();
    Transition::To(TEST)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted environment recording every side effect.
    #[derive(Default)]
    struct MockEnv {
        endpoint_configured: bool,
        connected: bool,
        link_up: bool,
        connect_ok: bool,
        subscribe_ok: bool,
        calls: Vec<&'static str>,
    }

    impl ConnEnv for MockEnv {
        fn endpoint_configured(&self) -> bool {
            self.endpoint_configured
        }
        fn transport_connected(&self) -> bool {
            self.connected
        }
        fn link_up(&self) -> bool {
            self.link_up
        }
        fn force_station_mode(&mut self) {
            self.calls.push("force_station_mode");
        }
        fn connect(&mut self) -> bool {
            self.calls.push("connect");
            self.connected = self.connect_ok;
            self.connect_ok
        }
        fn publish_online(&mut self) -> bool {
            self.calls.push("publish_online");
            true
        }
        fn subscribe_commands(&mut self) -> bool {
            self.calls.push("subscribe");
            self.subscribe_ok
        }
        fn disconnect(&mut self) {
            self.calls.push("disconnect");
            self.connected = false;
        }
        fn heartbeat(&mut self) {
            self.calls.push("heartbeat");
        }
    }

    /// Tick at the 20 ms frame cadence from `from_ms` for `n` ticks,
    /// returning the final timestamp.
    fn run(m: &mut ConnMachine, env: &mut MockEnv, from_ms: u32, n: u32) -> u32 {
        let mut t = from_ms;
        for _ in 0..n {
            m.tick(t, env);
            t += 20;
        }
        t
    }

    #[test]
    fn happy_path_reaches_wait() {
        let mut m = build_conn_machine();
        let mut env = MockEnv {
            endpoint_configured: true,
            link_up: true,
            connect_ok: true,
            subscribe_ok: true,
            ..Default::default()
        };
        m.start(0);
        run(&mut m, &mut env, 0, 5);
        assert_eq!(m.current(), WAIT);
        assert_eq!(
            env.calls,
            ["force_station_mode", "connect", "publish_online", "subscribe"]
        );
    }

    #[test]
    fn wait_expiry_loops_to_test_with_heartbeat() {
        let mut m = build_conn_machine();
        let mut env = MockEnv {
            endpoint_configured: true,
            link_up: true,
            connect_ok: true,
            subscribe_ok: true,
            ..Default::default()
        };
        m.start(0);
        let t = run(&mut m, &mut env, 0, 5);
        assert_eq!(m.current(), WAIT);
        env.calls.clear();

        // Before the 3 s dwell nothing runs.
        let t = run(&mut m, &mut env, t, 10);
        assert!(env.calls.is_empty());

        m.tick(t + WAIT_DWELL_MS, &mut env);
        assert_eq!(env.calls, ["heartbeat"]);
        assert_eq!(m.current(), TEST);
    }

    #[test]
    fn connected_and_link_up_stays_in_test() {
        let mut m = build_conn_machine();
        let mut env = MockEnv {
            endpoint_configured: true,
            link_up: true,
            connected: true,
            ..Default::default()
        };
        m.start(0);
        m.tick(0, &mut env); // START -> TEST
        run(&mut m, &mut env, 20, 10);
        assert_eq!(m.current(), TEST);
        assert!(env.calls.is_empty());
    }

    #[test]
    fn link_loss_with_live_session_disconnects_then_delays() {
        let mut m = build_conn_machine();
        let mut env = MockEnv {
            endpoint_configured: true,
            link_up: false,
            connected: true,
            ..Default::default()
        };
        m.start(0);
        m.tick(0, &mut env); // START -> TEST
        m.tick(20, &mut env);
        assert_eq!(env.calls, ["disconnect"]);
        assert_eq!(m.current(), DELAY);
    }

    #[test]
    fn link_down_holds_in_test_without_side_effects() {
        let mut m = build_conn_machine();
        let mut env = MockEnv {
            endpoint_configured: true,
            ..Default::default()
        };
        m.start(0);
        run(&mut m, &mut env, 0, 20);
        assert_eq!(m.current(), TEST);
        assert!(env.calls.is_empty());
    }

    #[test]
    fn unconfigured_endpoint_cycles_delay_with_full_dwell() {
        let mut m = build_conn_machine();
        let mut env = MockEnv {
            connected: true,
            link_up: false,
            ..Default::default()
        };
        m.start(0);
        m.tick(0, &mut env); // START -> TEST
        m.tick(20, &mut env); // disconnect -> DELAY at t=20
        assert_eq!(m.current(), DELAY);

        // DELAY holds for its full dwell, then self-routes (re-arming).
        run(&mut m, &mut env, 40, 10);
        assert_eq!(m.current(), DELAY);
        m.tick(20 + DELAY_DWELL_MS, &mut env);
        assert_eq!(m.current(), DELAY);
        // Immediately after re-entry it is dwelling again.
        m.tick(40 + DELAY_DWELL_MS, &mut env);
        assert_eq!(m.current(), DELAY);

        // Configure the endpoint: next expiry routes to TEST.
        env.endpoint_configured = true;
        m.tick(20 + 2 * DELAY_DWELL_MS, &mut env);
        assert_eq!(m.current(), TEST);
    }

    #[test]
    fn failed_connects_retry_at_fixed_delay() {
        let mut m = build_conn_machine();
        let mut env = MockEnv {
            endpoint_configured: true,
            link_up: true,
            connect_ok: false,
            ..Default::default()
        };
        m.start(0);

        let mut t = 0;
        let mut attempt_times = Vec::new();
        // Drive for long enough to observe three attempts.
        for _ in 0..600 {
            let before = env.calls.iter().filter(|c| **c == "connect").count();
            m.tick(t, &mut env);
            let after = env.calls.iter().filter(|c| **c == "connect").count();
            if after > before {
                attempt_times.push(t);
            }
            t += 20;
        }

        assert!(attempt_times.len() >= 3, "got {:?}", attempt_times);
        // Fixed delay between attempts: DELAY dwell plus the two frames
        // spent crossing DELAY and TEST. Crucially, constant — never an
        // increasing backoff.
        let gaps: Vec<u32> = attempt_times.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps.iter().all(|g| *g == gaps[0]), "gaps {:?}", gaps);
        assert_eq!(gaps[0], DELAY_DWELL_MS + 40);
    }

    #[test]
    fn failed_subscribe_disconnects_and_delays() {
        let mut m = build_conn_machine();
        let mut env = MockEnv {
            endpoint_configured: true,
            link_up: true,
            connect_ok: true,
            subscribe_ok: false,
            ..Default::default()
        };
        m.start(0);
        run(&mut m, &mut env, 0, 5);
        assert_eq!(m.current(), DELAY);
        assert_eq!(
            env.calls,
            [
                "force_station_mode",
                "connect",
                "publish_online",
                "subscribe",
                "disconnect"
            ]
        );
    }

    #[test]
    fn publish_online_is_unconditional() {
        // Even if the online publish fails the graph proceeds to
        // SUBSCRIBE; a broken session surfaces there or at next TEST.
        struct FailingPublish(MockEnv);
        impl ConnEnv for FailingPublish {
            fn endpoint_configured(&self) -> bool {
                true
            }
            fn transport_connected(&self) -> bool {
                self.0.connected
            }
            fn link_up(&self) -> bool {
                true
            }
            fn force_station_mode(&mut self) {}
            fn connect(&mut self) -> bool {
                self.0.connected = true;
                true
            }
            fn publish_online(&mut self) -> bool {
                false
            }
            fn subscribe_commands(&mut self) -> bool {
                true
            }
            fn disconnect(&mut self) {}
            fn heartbeat(&mut self) {}
        }

        let mut m = build_conn_machine();
        let mut env = FailingPublish(MockEnv::default());
        m.start(0);
        for t in 0..5 {
            m.tick(t * 20, &mut env);
        }
        assert_eq!(m.current(), WAIT);
    }
}
