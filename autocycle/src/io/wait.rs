//! Bounded wait-until: the single suspension point of the loop.

use std::time::Duration;

use crate::core::clock::{Clock, as_millis};
use crate::io::world::Interaction;

/// Poll `predicate` until it holds or `timeout` elapses.
///
/// Checks once up front, then alternates `world.pause(poll)` and re-checks.
/// Time is read from `clock`, so a world whose `pause` advances a manual
/// clock is enough to drive this deterministically.
pub fn wait_until<W, F>(
    world: &mut W,
    clock: &dyn Clock,
    timeout: Duration,
    poll: Duration,
    mut predicate: F,
) -> bool
where
    W: Interaction + ?Sized,
    F: FnMut(&mut W) -> bool,
{
    if predicate(world) {
        return true;
    }
    let deadline = clock.now().saturating_add(as_millis(timeout));
    let poll = poll.max(Duration::from_millis(1));
    loop {
        let now = clock.now();
        if now >= deadline {
            return false;
        }
        let remaining = Duration::from_millis(deadline.saturating_sub(now));
        world.pause(poll.min(remaining));
        if predicate(world) {
            return true;
        }
    }
}
