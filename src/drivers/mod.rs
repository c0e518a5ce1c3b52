//! Pure-logic input drivers. Hardware access stays in `adapters`.

pub mod debounce;
