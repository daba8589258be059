//! Deterministic logic shared by the control loop.
//!
//! Core modules are free of world I/O. Time and randomness are injected, so
//! every decision here is reproducible in tests.

pub mod clock;
pub mod detector;
pub mod governor;
pub mod stats;
pub mod task;
pub mod transition;
pub mod types;
