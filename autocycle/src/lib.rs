//! Paced gather / process / resupply session runner.
//!
//! One control loop made of three cooperating parts:
//!
//! - **[`orchestrator`]**: the per-tick state machine that sequences the
//!   cycle's phases and routes transient failures through recovery.
//! - **[`core::governor`]**: human-like pacing, break cadence, session limits
//!   and latched emergency stops.
//! - **[`core::detector`]**: a statistical audit of the loop's own action,
//!   timing and movement history.
//!
//! Everything under [`core`] is deterministic: time comes from an injected
//! clock and randomness from one seeded generator. The world the agent acts
//! in is reached only through the traits in [`io::world`], and the
//! [`handlers`] turn those calls into typed outcomes.

pub mod core;
pub mod exit_codes;
pub mod handlers;
pub mod io;
pub mod logging;
pub mod looping;
pub mod orchestrator;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
