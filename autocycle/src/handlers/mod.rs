//! One logical attempt per call for each phase that touches the world.
//!
//! Handlers never loop across attempts and never fail with an error: every
//! return is a typed outcome and leaves the world safe to re-check from the
//! top. Retrying is the orchestrator's job.

pub mod dialog;
pub mod init;
pub mod process;
pub mod resupply;
pub mod travel;

use crate::core::clock::Clock;
use crate::io::config::{ActionLabels, WaitConfig};

/// Read-only inputs shared by every handler.
pub struct HandlerContext<'a> {
    pub clock: &'a dyn Clock,
    pub waits: &'a WaitConfig,
    pub actions: &'a ActionLabels,
}
