//! Simulated world for dry runs of the control loop.
//!
//! Time only moves when the loop pauses, so a whole session runs in
//! milliseconds of wall time and is reproducible from its seed.

use std::rc::Rc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::clock::{Clock, ManualClock, Millis};
use crate::core::governor::MsRange;
use crate::core::types::{Destination, Position, Target};
use crate::io::world::{AgentContext, Interaction, Inventory, Navigator};

const SUPPLY_ANCHOR: Position = Position { x: 3_182, y: 3_441 };
const WORKSITE_ANCHOR: Position = Position { x: 3_209, y: 3_432 };

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Slots in the carried container.
    pub capacity: u32,
    pub travel_ms: MsRange,
    /// Time to process one unit once a batch is confirmed.
    pub unit_ms: MsRange,
    /// Chance that any single interaction is refused.
    pub failure_chance: f64,
    /// Stock available at the supply, in withdrawal order.
    ///
    /// The supply behaves like a saved preset: it does not know which task
    /// is current and hands over the first non-empty entry. List entries in
    /// queue order. Once a task's own entry runs dry, its next resupply
    /// acquires nothing for it and the session stops as supply exhausted,
    /// even if later entries still hold stock.
    pub stock: Vec<(String, u32)>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            capacity: 28,
            travel_ms: MsRange::new(4_000, 9_000),
            unit_ms: MsRange::new(1_700, 2_000),
            failure_chance: 0.0,
            stock: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    At(Destination),
    Traveling {
        to: Destination,
        from: Destination,
        arrives_at: Millis,
    },
}

#[derive(Debug, Clone)]
struct Batch {
    resource: String,
    started_at: Millis,
    unit_ms: Millis,
    units: u32,
}

impl Batch {
    fn consumed(&self, now: Millis) -> u32 {
        let done = now.saturating_sub(self.started_at) / self.unit_ms.max(1);
        u32::try_from(done).unwrap_or(u32::MAX).min(self.units)
    }
}

pub struct SimWorld {
    config: SimConfig,
    clock: Rc<ManualClock>,
    rng: StdRng,
    location: Location,
    /// Raw resource carried before the running batch.
    carried: Option<(String, u32)>,
    products: u32,
    dialog_open: bool,
    batch: Option<Batch>,
    in_hazard: bool,
    ready: bool,
}

impl SimWorld {
    pub fn new(config: SimConfig, clock: Rc<ManualClock>, seed: u64) -> Self {
        Self {
            config,
            clock,
            rng: StdRng::seed_from_u64(seed),
            location: Location::At(Destination::Worksite),
            carried: None,
            products: 0,
            dialog_open: false,
            batch: None,
            in_hazard: false,
            ready: true,
        }
    }

    pub fn set_in_hazard(&mut self, in_hazard: bool) {
        self.in_hazard = in_hazard;
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn remaining_stock(&self) -> u32 {
        self.config.stock.iter().map(|(_, units)| units).sum()
    }

    fn now(&self) -> Millis {
        self.clock.now()
    }

    fn refused(&mut self) -> bool {
        self.config.failure_chance > 0.0 && self.rng.gen_bool(self.config.failure_chance)
    }

    /// Fold a finished batch into the carried counts.
    fn settle(&mut self) {
        let now = self.now();
        if let Location::Traveling { to, arrives_at, .. } = self.location {
            if now >= arrives_at {
                self.location = Location::At(to);
            }
        }
        let finished = self
            .batch
            .as_ref()
            .is_some_and(|batch| batch.consumed(now) >= batch.units);
        if finished {
            self.finish_batch(now);
        }
    }

    fn finish_batch(&mut self, now: Millis) {
        let Some(batch) = self.batch.take() else {
            return;
        };
        let consumed = batch.consumed(now);
        self.products += consumed;
        if let Some((_, units)) = self.carried.as_mut() {
            *units -= consumed.min(*units);
        }
        if self.carried.as_ref().is_some_and(|(_, units)| *units == 0) {
            self.carried = None;
        }
        debug!(resource = %batch.resource, consumed, "sim batch finished");
    }

    fn live_count(&self, kind: &str) -> u32 {
        match &self.carried {
            Some((resource, units)) if resource == kind => {
                let consumed = self
                    .batch
                    .as_ref()
                    .map_or(0, |batch| batch.consumed(self.now()));
                units.saturating_sub(consumed)
            }
            _ => 0,
        }
    }

    /// Take up to `capacity` units of the first non-empty stock entry.
    fn withdraw(&mut self) -> bool {
        self.products = 0;
        if self.carried.is_some() {
            return true;
        }
        let capacity = self.config.capacity;
        let Some((resource, stock)) = self
            .config
            .stock
            .iter_mut()
            .find(|(_, units)| *units > 0)
        else {
            return true;
        };
        let units = (*stock).min(capacity);
        *stock -= units;
        self.carried = Some((resource.clone(), units));
        true
    }

    fn start_batch(&mut self) -> bool {
        let Some((resource, units)) = self.carried.clone() else {
            return false;
        };
        let unit_ms = self.config.unit_ms.sample(&mut self.rng).as_millis();
        self.batch = Some(Batch {
            resource,
            started_at: self.now(),
            unit_ms: u64::try_from(unit_ms).unwrap_or(u64::MAX),
            units,
        });
        self.dialog_open = false;
        true
    }
}

impl AgentContext for SimWorld {
    fn is_agent_ready(&self) -> bool {
        self.ready
    }

    fn is_agent_in_hazard(&self) -> bool {
        self.in_hazard
    }

    fn current_position(&self) -> Option<Position> {
        let anchor = |destination: Destination| match destination {
            Destination::Supply => SUPPLY_ANCHOR,
            Destination::Worksite => WORKSITE_ANCHOR,
        };
        Some(match self.location {
            Location::At(destination) => anchor(destination),
            Location::Traveling { to, arrives_at, .. } if self.now() >= arrives_at => anchor(to),
            Location::Traveling { from, .. } => anchor(from),
        })
    }
}

impl Interaction for SimWorld {
    fn attempt_interaction(&mut self, target: Target, _action: &str) -> bool {
        self.settle();
        if self.refused() {
            debug!(?target, "sim refused interaction");
            return false;
        }
        match target {
            Target::Supply => self.is_at(Destination::Supply) && self.withdraw(),
            Target::Worksite => {
                if !self.is_at(Destination::Worksite) || self.batch.is_some() {
                    return false;
                }
                if self.carried.is_none() {
                    return false;
                }
                self.dialog_open = true;
                true
            }
            Target::Dialog => self.dialog_open && self.start_batch(),
        }
    }

    fn is_dialog_open(&self) -> bool {
        self.dialog_open
    }

    fn is_busy(&self) -> bool {
        self.batch
            .as_ref()
            .is_some_and(|batch| batch.consumed(self.now()) < batch.units)
    }

    fn pause(&mut self, duration: Duration) {
        self.clock.advance(duration);
        self.settle();
    }
}

impl Inventory for SimWorld {
    fn has_resource(&self, kind: &str) -> bool {
        self.live_count(kind) > 0
    }

    fn count_resource(&self, kind: &str) -> u32 {
        self.live_count(kind)
    }

    fn is_container_full(&self) -> bool {
        let raw = self.carried.as_ref().map_or(0, |(_, units)| *units);
        raw + self.products >= self.config.capacity && self.products * 5 > self.config.capacity * 4
    }
}

impl Navigator for SimWorld {
    fn is_at(&self, destination: Destination) -> bool {
        match self.location {
            Location::At(at) => at == destination,
            Location::Traveling { to, arrives_at, .. } => {
                to == destination && self.now() >= arrives_at
            }
        }
    }

    fn travel_to(&mut self, destination: Destination) -> bool {
        self.settle();
        if self.is_at(destination) {
            return true;
        }
        if self.refused() {
            return false;
        }
        let from = match self.location {
            Location::At(at) => at,
            Location::Traveling { from, .. } => from,
        };
        let travel = self.config.travel_ms.sample(&mut self.rng);
        self.location = Location::Traveling {
            to: destination,
            from,
            arrives_at: self
                .now()
                .saturating_add(u64::try_from(travel.as_millis()).unwrap_or(u64::MAX)),
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim(stock: u32) -> (SimWorld, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new(0));
        let config = SimConfig {
            stock: vec![("raw shark".to_string(), stock)],
            ..SimConfig::default()
        };
        (SimWorld::new(config, clock.clone(), 3), clock)
    }

    #[test]
    fn travel_arrives_after_pause() {
        let (mut world, _clock) = sim(0);
        assert!(world.is_at(Destination::Worksite));
        assert!(world.travel_to(Destination::Supply));
        assert!(!world.is_at(Destination::Supply));
        world.pause(Duration::from_secs(10));
        assert!(world.is_at(Destination::Supply));
        assert_eq!(world.current_position(), Some(SUPPLY_ANCHOR));
    }

    #[test]
    fn supply_withdraws_up_to_capacity() {
        let (mut world, _clock) = sim(30);
        world.travel_to(Destination::Supply);
        world.pause(Duration::from_secs(10));
        assert!(world.attempt_interaction(Target::Supply, "Load"));
        assert_eq!(world.count_resource("raw shark"), 28);
        assert_eq!(world.remaining_stock(), 2);
    }

    #[test]
    fn confirmed_batch_consumes_units_over_time() {
        let (mut world, _clock) = sim(5);
        world.travel_to(Destination::Supply);
        world.pause(Duration::from_secs(10));
        world.attempt_interaction(Target::Supply, "Load");
        world.travel_to(Destination::Worksite);
        world.pause(Duration::from_secs(10));

        assert!(world.attempt_interaction(Target::Worksite, "Cook"));
        assert!(world.is_dialog_open());
        assert!(world.attempt_interaction(Target::Dialog, "Confirm"));
        assert!(world.is_busy());
        world.pause(Duration::from_secs(30));
        assert!(!world.is_busy());
        assert_eq!(world.count_resource("raw shark"), 0);
        assert!(!world.has_resource("raw shark"));
    }

    #[test]
    fn dry_entry_hands_over_the_next_resource_instead() {
        let clock = Rc::new(ManualClock::new(0));
        let config = SimConfig {
            stock: vec![("raw shark".to_string(), 0), ("raw trout".to_string(), 5)],
            ..SimConfig::default()
        };
        let mut world = SimWorld::new(config, clock, 3);
        world.travel_to(Destination::Supply);
        world.pause(Duration::from_secs(10));

        assert!(world.attempt_interaction(Target::Supply, "Load"));
        assert!(!world.has_resource("raw shark"));
        assert_eq!(world.count_resource("raw trout"), 5);
        assert_eq!(world.remaining_stock(), 0);
    }
}
