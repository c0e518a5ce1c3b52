//! GPIO / peripheral pin assignments for the doorbell main board.
//!
//! Single source of truth — every adapter references this module rather
//! than hard-coding pin numbers.

/// Momentary doorbell button. External pull-up, reads LOW when pressed.
pub const BUTTON_GPIO: i32 = 12;

/// Ringer relay / solenoid driver (active HIGH unless [`INVERT_OUTPUT`]).
pub const RINGER_GPIO: i32 = 14;

/// Indicator LED mirroring the debounced button level.
pub const LED_GPIO: i32 = 2;

/// Button is wired active-low, so the raw sample is inverted before debounce.
pub const INVERT_INPUT: bool = true;

/// Ringer output polarity. `false` = drive HIGH to ring.
pub const INVERT_OUTPUT: bool = false;
