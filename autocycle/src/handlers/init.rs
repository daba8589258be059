//! Classify the current task when (re)entering the cycle.

use tracing::debug;

use crate::core::task::TaskQueue;
use crate::core::types::InitOutcome;
use crate::io::world::World;

pub fn classify<W: World + ?Sized>(
    world: &W,
    queue: &TaskQueue,
    resource_always_present: bool,
) -> InitOutcome {
    if !world.is_agent_ready() {
        return InitOutcome::Error;
    }
    let Some(task) = queue.current() else {
        return InitOutcome::QueueComplete;
    };
    let outcome = if resource_always_present
        || (world.has_resource(task.resource()) && !world.is_container_full())
    {
        InitOutcome::ReadyToWork
    } else {
        InitOutcome::NeedsSupply
    };
    debug!(task = %task, ?outcome, "classified task");
    outcome
}
