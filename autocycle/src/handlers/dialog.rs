//! Clear a sub-dialog left open by an earlier processing attempt.

use tracing::debug;

use crate::core::task::Task;
use crate::core::types::{DialogOutcome, Target};
use crate::handlers::HandlerContext;
use crate::handlers::process::settle_batch;
use crate::io::wait::wait_until;
use crate::io::world::World;

/// Confirm the open dialog and credit whatever the resulting batch consumed.
///
/// A dialog that already closed counts as cleared with no units.
pub fn attempt<W: World + ?Sized>(
    world: &mut W,
    ctx: &HandlerContext<'_>,
    task: Option<&mut Task>,
) -> DialogOutcome {
    if !world.is_dialog_open() {
        return DialogOutcome::Cleared { units: 0 };
    }
    let resource = task.as_ref().map(|t| t.resource().to_string());
    let before = resource
        .as_deref()
        .map_or(0, |resource| world.count_resource(resource));

    if !world.attempt_interaction(Target::Dialog, &ctx.actions.confirm) {
        debug!("dialog confirm refused");
        return DialogOutcome::Failed;
    }
    let closed = wait_until(
        world,
        ctx.clock,
        ctx.waits.interaction_timeout(),
        ctx.waits.poll(),
        |w| !w.is_dialog_open(),
    );
    if !closed {
        debug!("dialog stayed open");
        return DialogOutcome::Failed;
    }

    let (Some(task), Some(resource)) = (task, resource) else {
        return DialogOutcome::Cleared { units: 0 };
    };
    let units = settle_batch(world, ctx, &resource, before);
    task.increment_completed(units);
    DialogOutcome::Cleared { units }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::TaskQueue;
    use crate::core::types::Destination;
    use crate::test_support::{HandlerFixture, ScriptedWorld};

    #[test]
    fn closed_dialog_is_already_cleared() {
        let mut world = ScriptedWorld::new();
        let fixture = HandlerFixture::new(&world);
        assert_eq!(
            attempt(&mut world, &fixture.ctx(), None),
            DialogOutcome::Cleared { units: 0 }
        );
    }

    #[test]
    fn confirming_credits_the_batch() {
        let mut world = ScriptedWorld::new();
        world.place_at(Destination::Worksite);
        world.set_resource("ore", 4);
        world.set_units_per_batch(4);
        world.set_dialog_open(true);
        let fixture = HandlerFixture::new(&world);
        let mut queue = TaskQueue::new();
        queue.enqueue("ore", 4).expect("enqueue");

        let outcome = attempt(&mut world, &fixture.ctx(), queue.current_mut());
        assert_eq!(outcome, DialogOutcome::Cleared { units: 4 });
        assert!(queue.is_complete());
    }
}
