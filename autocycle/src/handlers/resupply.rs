//! Restock the current task's resource at the supply.

use tracing::debug;

use crate::core::task::Task;
use crate::core::types::{ResupplyOutcome, Target};
use crate::handlers::HandlerContext;
use crate::io::wait::wait_until;
use crate::io::world::World;

pub fn attempt<W: World + ?Sized>(
    world: &mut W,
    ctx: &HandlerContext<'_>,
    task: Option<&Task>,
) -> ResupplyOutcome {
    let Some(task) = task else {
        return ResupplyOutcome::NothingAcquired;
    };
    let resource = task.resource();
    if !world.attempt_interaction(Target::Supply, &ctx.actions.supply) {
        debug!(%resource, "supply interaction refused");
        return ResupplyOutcome::Failed;
    }
    let acquired = wait_until(
        world,
        ctx.clock,
        ctx.waits.interaction_timeout(),
        ctx.waits.poll(),
        |w| w.has_resource(resource),
    );
    if acquired {
        debug!(%resource, units = world.count_resource(resource), "resupplied");
        ResupplyOutcome::Acquired
    } else {
        ResupplyOutcome::NothingAcquired
    }
}
