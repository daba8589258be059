//! Move to one of the cycle's anchors.

use tracing::debug;

use crate::core::types::{Destination, TravelOutcome};
use crate::handlers::HandlerContext;
use crate::io::wait::wait_until;
use crate::io::world::World;

pub fn attempt<W: World + ?Sized>(
    world: &mut W,
    ctx: &HandlerContext<'_>,
    destination: Destination,
) -> TravelOutcome {
    if world.is_at(destination) {
        return TravelOutcome::Arrived;
    }
    if !world.travel_to(destination) {
        debug!(?destination, "travel refused");
        return TravelOutcome::Failed;
    }
    let arrived = wait_until(
        world,
        ctx.clock,
        ctx.waits.travel_timeout(),
        ctx.waits.poll(),
        |w| w.is_at(destination),
    );
    if arrived {
        TravelOutcome::Arrived
    } else {
        debug!(?destination, "travel timed out");
        TravelOutcome::Failed
    }
}
