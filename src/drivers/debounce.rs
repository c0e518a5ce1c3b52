//! Debounced digital-input edge detector.
//!
//! Turns a noisy raw sample, polled at the fixed control-loop rate
//! (50 polls/second), into a committed level plus one-shot edge events.
//! Settling is counted in *samples*, not wall-clock time, so scheduler
//! jitter cannot shorten the effective debounce window.
//!
//! Edge flags are true for exactly the one [`handle`](DebouncedInput::handle)
//! call in which the commit occurred and are cleared at the start of the
//! next call — the caller must consume them within the same frame.

/// Control-loop poll rate the settle conversion assumes.
pub const POLL_HZ: u32 = 50;

/// Default settle window in milliseconds.
pub const DEFAULT_SETTLE_MS: u32 = 110;

pub struct DebouncedInput {
    /// Invert the raw sample before evaluation (active-low wiring).
    invert: bool,
    /// Consecutive differing samples required to commit a new level.
    settle_samples: u16,
    /// Last committed level.
    level: bool,
    /// Consecutive samples seen that differ from `level`.
    counter: u16,
    edge_up: bool,
    edge_down: bool,
}

impl DebouncedInput {
    /// `settle_ms` is converted to a sample count at [`POLL_HZ`], with a
    /// floor of one sample.
    pub fn new(invert: bool, settle_ms: u32) -> Self {
        let samples = (settle_ms * POLL_HZ).div_ceil(1000).max(1);
        Self {
            invert,
            settle_samples: samples as u16,
            level: false,
            counter: 0,
            edge_up: false,
            edge_down: false,
        }
    }

    /// Feed one raw pin sample. Call exactly once per poll frame.
    ///
    /// A sample run shorter than the settle window that reverts to the
    /// committed level resets the counter, so glitches never commit.
    pub fn handle(&mut self, raw: bool) {
        self.edge_up = false;
        self.edge_down = false;

        let sample = raw ^ self.invert;
        if sample == self.level {
            self.counter = 0;
            return;
        }

        self.counter += 1;
        if self.counter >= self.settle_samples {
            self.level = sample;
            self.counter = 0;
            self.edge_up = sample;
            self.edge_down = !sample;
        }
    }

    /// Last committed level (true = pressed after polarity inversion).
    pub fn current(&self) -> bool {
        self.level
    }

    /// True only during the `handle()` call that committed a low→high edge.
    pub fn is_edge_up(&self) -> bool {
        self.edge_up
    }

    /// True only during the `handle()` call that committed a high→low edge.
    pub fn is_edge_down(&self) -> bool {
        self.edge_down
    }

    /// Settle window expressed in samples (for tests and diagnostics).
    pub fn settle_samples(&self) -> u16 {
        self.settle_samples
    }
}
