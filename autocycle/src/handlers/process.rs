//! One processing batch at the worksite.

use tracing::debug;

use crate::core::task::Task;
use crate::core::types::{Destination, ProcessOutcome, Target};
use crate::handlers::HandlerContext;
use crate::io::wait::wait_until;
use crate::io::world::World;

/// Start a batch on `task`'s resource, wait for it to finish and credit the
/// consumed units to `task`.
pub fn attempt<W: World + ?Sized>(
    world: &mut W,
    ctx: &HandlerContext<'_>,
    task: &mut Task,
) -> ProcessOutcome {
    if !world.is_at(Destination::Worksite) {
        return ProcessOutcome::NeedToWalk;
    }
    if world.is_dialog_open() {
        return ProcessOutcome::DialogPending;
    }
    let resource = task.resource().to_string();
    if !world.has_resource(&resource) || world.is_container_full() {
        return ProcessOutcome::NeedToBank;
    }

    let before = world.count_resource(&resource);
    if !world.attempt_interaction(Target::Worksite, &ctx.actions.process) {
        debug!(%resource, "worksite interaction refused");
        return ProcessOutcome::Failed;
    }

    let started = wait_until(
        world,
        ctx.clock,
        ctx.waits.interaction_timeout(),
        ctx.waits.poll(),
        |w| w.is_dialog_open() || w.is_busy() || w.count_resource(&resource) < before,
    );
    if !started {
        debug!(%resource, "batch never started");
        return ProcessOutcome::Failed;
    }

    if world.is_dialog_open() {
        if !world.attempt_interaction(Target::Dialog, &ctx.actions.confirm) {
            return ProcessOutcome::Failed;
        }
        wait_until(
            world,
            ctx.clock,
            ctx.waits.interaction_timeout(),
            ctx.waits.poll(),
            |w| w.is_busy() || w.count_resource(&resource) < before,
        );
    }

    let units = settle_batch(world, ctx, &resource, before);
    if units == 0 {
        debug!(%resource, "batch consumed nothing");
        return ProcessOutcome::Failed;
    }
    task.increment_completed(units);
    debug!(task = %task, units, "batch processed");
    ProcessOutcome::Success { units }
}

/// Wait for the running batch to end and return how many units it consumed.
pub(crate) fn settle_batch<W: World + ?Sized>(
    world: &mut W,
    ctx: &HandlerContext<'_>,
    resource: &str,
    before: u32,
) -> u32 {
    wait_until(
        world,
        ctx.clock,
        ctx.waits.processing_timeout(),
        ctx.waits.poll(),
        |w| !w.is_busy() || !w.has_resource(resource) || w.is_container_full(),
    );
    before.saturating_sub(world.count_resource(resource))
}
