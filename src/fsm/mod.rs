//! Table-driven finite state machine engine with timed-wait states.
//!
//! Classic embedded FSM pattern:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │  State table (fixed, built once)                      │
//! │  ┌─────┬──────────┬──────────┬────────────────────┐   │
//! │  │ idx │ name     │ dwell_ms │ run                │   │
//! │  ├─────┼──────────┼──────────┼────────────────────┤   │
//! │  │  0  │ START    │    —     │ fn(ctx)→Transition │   │
//! │  │  1  │ DELAY    │  1500    │ fn(ctx)→Transition │   │
//! │  │ ... │          │          │                    │   │
//! │  └─────┴──────────┴──────────┴────────────────────┘   │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! Each `tick()` invokes `run` for the **current** state. Returning
//! [`Transition::Stay`] leaves the current pointer untouched; returning
//! [`Transition::To`] replaces it immediately — the new state runs on the
//! very next tick. There is no terminal state: graphs are cyclic and run
//! for the process lifetime.
//!
//! A state with `dwell_ms: Some(d)` is a *timed* state: for `d`
//! milliseconds after it most recently became current, `tick()` reports
//! stay without invoking `run` at all. The dwell timer is re-armed on
//! every entry, including a transition from a state to itself — which is
//! how a timed state loops "via the graph" rather than merely repeating.
//!
//! The engine is invoked once per scheduling frame, strictly serially
//! with the rest of the control loop. No internal locking.

use log::{error, info};

/// Index of a state in the machine's fixed table.
///
/// States reference each other through indices rather than inter-linked
/// references, so a graph can be built as plain `const` data and unit
/// tested without the rest of the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateRef(pub usize);

/// Outcome of a transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Remain in the current state. For a timed state this does *not*
    /// re-arm the dwell timer.
    Stay,
    /// Move to the referenced state. Targeting the current state re-enters
    /// it, re-arming its dwell timer.
    To(StateRef),
}

/// Maps each borrow lifetime to the context type transition functions
/// receive, so a machine keyed on a trait object (`dyn Trait`) can be
/// ticked with environments that borrow shorter than `'static`.
///
/// Sized context types get this for free (`Of<'a> = Self`); a trait
/// object context provides `Of<'a> = dyn Trait + 'a`.
pub trait CtxFamily {
    type Of<'a>: ?Sized;
}

impl<T> CtxFamily for T {
    type Of<'a> = T;
}

/// One row of the state table.
///
/// Plain and timed states share one record with an optional dwell field
/// and a uniform transition-function signature — no subtype dispatch.
pub struct State<Ctx: ?Sized + CtxFamily> {
    pub name: &'static str,
    /// Minimum dwell after entry before `run` executes, in milliseconds.
    /// `None` makes this a plain state whose `run` executes every tick.
    pub dwell_ms: Option<u32>,
    /// Guard + action: inspects `Ctx`, performs side effects through it,
    /// and returns where the machine goes next.
    pub run: for<'a> fn(&'a mut Ctx::Of<'a>) -> Transition,
}

/// Generic cyclic state driver. One step per `tick()` invocation.
///
/// `Ctx` may be unsized (`dyn Trait`) so graphs can be written against a
/// narrow environment trait and driven with mock environments in tests.
pub struct StateMachine<Ctx: ?Sized + CtxFamily, const N: usize> {
    table: [State<Ctx>; N],
    entry: usize,
    current: usize,
    /// Millisecond timestamp of the most recent entry into `current`.
    entered_at_ms: u32,
    started: bool,
    /// Set when a transition function returned an out-of-table target.
    /// A parked machine ignores every further tick; recovery is a full
    /// process restart from the external watchdog.
    parked: bool,
}

impl<Ctx: ?Sized + CtxFamily, const N: usize> StateMachine<Ctx, N> {
    /// Construct a machine over a fixed table. No side effects; the
    /// machine is not running until [`start`](Self::start) is called.
    pub fn new(table: [State<Ctx>; N], entry: StateRef) -> Self {
        debug_assert!(entry.0 < N, "entry state out of table");
        Self {
            table,
            entry: entry.0,
            current: entry.0,
            entered_at_ms: 0,
            started: false,
            parked: false,
        }
    }

    /// Set current = entry and stamp its dwell timer.
    pub fn start(&mut self, now_ms: u32) {
        self.current = self.entry;
        self.entered_at_ms = now_ms;
        self.started = true;
        info!("fsm: started in {}", self.table[self.current].name);
    }

    /// Advance the machine by one step.
    ///
    /// For a timed state whose dwell has not yet elapsed this returns
    /// without invoking the transition function at all. Otherwise the
    /// function runs exactly once, and a returned target replaces the
    /// current pointer immediately — no two-phase commit, no entry/exit
    /// hooks beyond what the function itself performs.
    pub fn tick<'a>(&mut self, now_ms: u32, ctx: &'a mut Ctx::Of<'a>) {
        if !self.started || self.parked {
            return;
        }

        let state = &self.table[self.current];
        if let Some(dwell) = state.dwell_ms {
            if now_ms.wrapping_sub(self.entered_at_ms) < dwell {
                return;
            }
        }

        match (state.run)(ctx) {
            Transition::Stay => {}
            Transition::To(target) => {
                if target.0 >= N {
                    // Programming error in the graph: park and wait for
                    // the watchdog to restart the process.
                    error!(
                        "fsm: state {} returned invalid target {}, parking",
                        state.name, target.0
                    );
                    self.parked = true;
                    return;
                }
                if target.0 != self.current {
                    info!(
                        "fsm: {} -> {}",
                        self.table[self.current].name, self.table[target.0].name
                    );
                }
                self.current = target.0;
                self.entered_at_ms = now_ms;
            }
        }
    }

    /// Index of the current state.
    pub fn current(&self) -> StateRef {
        StateRef(self.current)
    }

    /// Name of the current state.
    pub fn current_name(&self) -> &'static str {
        self.table[self.current].name
    }

    /// Whether an invalid transition has permanently parked the machine.
    pub fn is_parked(&self) -> bool {
        self.parked
    }
}
