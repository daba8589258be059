//! Test-only doubles for the world seams and telemetry.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::core::clock::{Clock, ManualClock, Millis, SharedClock};
use crate::core::types::{Destination, Position, Target};
use crate::handlers::HandlerContext;
use crate::io::config::{ActionLabels, RunnerConfig, WaitConfig};
use crate::io::telemetry::{TelemetryEvent, TelemetrySink};
use crate::io::world::{AgentContext, Interaction, Inventory, Navigator};
use crate::orchestrator::Orchestrator;

/// Deterministic world driven by a shared manual clock.
///
/// Travel takes `travel_ms` of paused time (instant when zero). The supply
/// hands over its whole stock of the first non-empty resource. Each
/// processing batch consumes `units_per_batch` units at once, optionally
/// behind a confirmation dialog.
pub struct ScriptedWorld {
    clock: Rc<ManualClock>,
    ready: bool,
    in_hazard: bool,
    location: Option<Destination>,
    pending: Option<(Destination, Millis)>,
    travel_ms: Millis,
    refuse_travel: bool,
    travel_calls: u32,
    inventory: BTreeMap<String, u32>,
    container_full: bool,
    stock: Vec<(String, u32)>,
    refuse_supply: bool,
    units_per_batch: u32,
    opens_dialog: bool,
    dialog_open: bool,
    refuse_process: u32,
    interactions: Vec<(Target, String)>,
}

impl Default for ScriptedWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedWorld {
    pub fn new() -> Self {
        Self {
            clock: Rc::new(ManualClock::new(0)),
            ready: true,
            in_hazard: false,
            location: None,
            pending: None,
            travel_ms: 0,
            refuse_travel: false,
            travel_calls: 0,
            inventory: BTreeMap::new(),
            container_full: false,
            stock: Vec::new(),
            refuse_supply: false,
            units_per_batch: 1,
            opens_dialog: false,
            dialog_open: false,
            refuse_process: 0,
            interactions: Vec::new(),
        }
    }

    pub fn clock(&self) -> Rc<ManualClock> {
        self.clock.clone()
    }

    pub fn shared_clock(&self) -> SharedClock {
        self.clock.clone()
    }

    pub fn now(&self) -> Millis {
        self.clock.now()
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn set_in_hazard(&mut self, in_hazard: bool) {
        self.in_hazard = in_hazard;
    }

    pub fn place_at(&mut self, destination: Destination) {
        self.location = Some(destination);
        self.pending = None;
    }

    pub fn set_travel_ms(&mut self, travel_ms: Millis) {
        self.travel_ms = travel_ms;
    }

    pub fn refuse_travel(&mut self, refuse: bool) {
        self.refuse_travel = refuse;
    }

    pub fn travel_calls(&self) -> u32 {
        self.travel_calls
    }

    pub fn set_resource(&mut self, kind: &str, units: u32) {
        self.inventory.insert(kind.to_string(), units);
    }

    pub fn set_container_full(&mut self, full: bool) {
        self.container_full = full;
    }

    pub fn add_stock(&mut self, kind: &str, units: u32) {
        self.stock.push((kind.to_string(), units));
    }

    pub fn refuse_supply(&mut self, refuse: bool) {
        self.refuse_supply = refuse;
    }

    pub fn set_units_per_batch(&mut self, units: u32) {
        self.units_per_batch = units;
    }

    pub fn set_opens_dialog(&mut self, opens: bool) {
        self.opens_dialog = opens;
    }

    pub fn set_dialog_open(&mut self, open: bool) {
        self.dialog_open = open;
    }

    /// Refuse the next `count` worksite interactions.
    pub fn refuse_process(&mut self, count: u32) {
        self.refuse_process = count;
    }

    pub fn interactions(&self) -> &[(Target, String)] {
        &self.interactions
    }

    fn settle(&mut self) {
        if let Some((destination, arrives_at)) = self.pending {
            if self.clock.now() >= arrives_at {
                self.location = Some(destination);
                self.pending = None;
            }
        }
    }

    fn consume_batch(&mut self) {
        let Some(units) = self.inventory.values_mut().find(|units| **units > 0) else {
            return;
        };
        *units = units.saturating_sub(self.units_per_batch);
    }
}

impl AgentContext for ScriptedWorld {
    fn is_agent_ready(&self) -> bool {
        self.ready
    }

    fn is_agent_in_hazard(&self) -> bool {
        self.in_hazard
    }

    fn current_position(&self) -> Option<Position> {
        match self.location? {
            Destination::Supply => Some(Position::new(0, 0)),
            Destination::Worksite => Some(Position::new(10, 10)),
        }
    }
}

impl Interaction for ScriptedWorld {
    fn attempt_interaction(&mut self, target: Target, action: &str) -> bool {
        self.settle();
        self.interactions.push((target, action.to_string()));
        match target {
            Target::Supply => {
                if self.refuse_supply || self.location != Some(Destination::Supply) {
                    return false;
                }
                if let Some((kind, units)) = self.stock.iter_mut().find(|(_, units)| *units > 0) {
                    *self.inventory.entry(kind.clone()).or_default() += *units;
                    *units = 0;
                }
                true
            }
            Target::Worksite => {
                if self.refuse_process > 0 {
                    self.refuse_process -= 1;
                    return false;
                }
                if self.location != Some(Destination::Worksite) {
                    return false;
                }
                if self.opens_dialog {
                    self.dialog_open = true;
                } else {
                    self.consume_batch();
                }
                true
            }
            Target::Dialog => {
                if !self.dialog_open {
                    return false;
                }
                self.dialog_open = false;
                self.consume_batch();
                true
            }
        }
    }

    fn is_dialog_open(&self) -> bool {
        self.dialog_open
    }

    fn is_busy(&self) -> bool {
        false
    }

    fn pause(&mut self, duration: Duration) {
        self.clock.advance(duration);
        self.settle();
    }
}

impl Inventory for ScriptedWorld {
    fn has_resource(&self, kind: &str) -> bool {
        self.count_resource(kind) > 0
    }

    fn count_resource(&self, kind: &str) -> u32 {
        self.inventory.get(kind).copied().unwrap_or(0)
    }

    fn is_container_full(&self) -> bool {
        self.container_full
    }
}

impl Navigator for ScriptedWorld {
    fn is_at(&self, destination: Destination) -> bool {
        self.location == Some(destination)
            || self
                .pending
                .is_some_and(|(to, at)| to == destination && self.clock.now() >= at)
    }

    fn travel_to(&mut self, destination: Destination) -> bool {
        self.travel_calls += 1;
        if self.refuse_travel {
            return false;
        }
        if self.travel_ms == 0 {
            self.place_at(destination);
        } else {
            self.location = None;
            self.pending = Some((destination, self.clock.now() + self.travel_ms));
        }
        true
    }
}

/// Owns what a [`HandlerContext`] borrows, so tests can build one without
/// holding a borrow of the world.
pub struct HandlerFixture {
    pub clock: Rc<ManualClock>,
    pub waits: WaitConfig,
    pub actions: ActionLabels,
}

impl HandlerFixture {
    pub fn new(world: &ScriptedWorld) -> Self {
        Self {
            clock: world.clock(),
            waits: WaitConfig::default(),
            actions: ActionLabels::default(),
        }
    }

    pub fn ctx(&self) -> HandlerContext<'_> {
        HandlerContext {
            clock: self.clock.as_ref(),
            waits: &self.waits,
            actions: &self.actions,
        }
    }
}

/// Sink that keeps every event for later assertions.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Rc<RefCell<Vec<TelemetryEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.borrow().clone()
    }
}

impl TelemetrySink for RecordingSink {
    fn record(&mut self, event: &TelemetryEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

/// Config with breaks, distractions and micro-breaks switched off.
pub fn quiet_config() -> RunnerConfig {
    let mut config = RunnerConfig::default();
    config.breaks.enabled = false;
    config.pacing.distraction_chance = 0.0;
    config.pacing.micro_break_chance = 0.0;
    config.tasks.clear();
    config
}

/// Orchestrator sharing `world`'s clock, with a fixed seed and a recording sink.
pub fn orchestrator_for(
    world: &ScriptedWorld,
    config: RunnerConfig,
) -> (Orchestrator, RecordingSink) {
    let sink = RecordingSink::new();
    let orchestrator = Orchestrator::new(
        config,
        world.shared_clock(),
        StdRng::seed_from_u64(11),
        Box::new(sink.clone()),
    );
    (orchestrator, sink)
}
