//! Drive an orchestrator to completion against a world.

use tracing::debug;

use crate::core::stats::SessionSummary;
use crate::io::world::World;
use crate::orchestrator::{Orchestrator, TickReport};

/// Reason why `run_session` stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopStop {
    /// The orchestrator reached `Stopping` and produced its summary.
    Stopped(SessionSummary),
    /// The tick limit ran out first.
    TickLimit { max_ticks: u64 },
}

/// Summary of a driver invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub ticks: u64,
    pub stop: LoopStop,
}

/// Tick `orchestrator` until it stops or `max_ticks` is reached, pausing the
/// world for each tick's delay in between.
///
/// The driver owns the cadence; the orchestrator only reports how long to wait.
pub fn run_session<W: World + ?Sized, F: FnMut(&TickReport)>(
    orchestrator: &mut Orchestrator,
    world: &mut W,
    max_ticks: Option<u64>,
    mut on_tick: F,
) -> LoopOutcome {
    let mut ticks = 0u64;
    loop {
        if let Some(summary) = orchestrator.summary() {
            return LoopOutcome {
                ticks,
                stop: LoopStop::Stopped(summary.clone()),
            };
        }
        if let Some(max_ticks) = max_ticks
            && ticks >= max_ticks
        {
            debug!(max_ticks, "tick limit reached");
            return LoopOutcome {
                ticks,
                stop: LoopStop::TickLimit { max_ticks },
            };
        }

        let report = orchestrator.tick(world);
        ticks += 1;
        on_tick(&report);
        if !report.delay.is_zero() {
            world.pause(report.delay);
        }
    }
}
