//! Narrow seams to the world the agent acts in.
//!
//! The core never queries game state directly. Handlers see the world only
//! through these traits, and tests substitute scripted implementations.

use std::time::Duration;

use crate::core::types::{AgentSnapshot, Destination, Position, Target};

/// Agent liveness and location.
pub trait AgentContext {
    fn is_agent_ready(&self) -> bool;
    fn is_agent_in_hazard(&self) -> bool;
    fn current_position(&self) -> Option<Position>;

    fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            ready: self.is_agent_ready(),
            in_hazard: self.is_agent_in_hazard(),
        }
    }
}

/// Interaction with world objects and dialogs.
pub trait Interaction {
    /// Fire one interaction. `false` means the world refused it outright.
    fn attempt_interaction(&mut self, target: Target, action: &str) -> bool;
    fn is_dialog_open(&self) -> bool;
    /// True while a started batch is still in progress.
    fn is_busy(&self) -> bool;
    /// Yield to the driver for `duration`. The only way the core lets time pass.
    fn pause(&mut self, duration: Duration);
}

/// Read-only view of carried resources.
pub trait Inventory {
    fn has_resource(&self, kind: &str) -> bool;
    fn count_resource(&self, kind: &str) -> u32;
    /// No room left for processing output.
    fn is_container_full(&self) -> bool;
}

/// Movement between the two anchors of the cycle.
pub trait Navigator {
    fn is_at(&self, destination: Destination) -> bool;
    /// Issue one travel step toward `destination`. `false` when no route
    /// could be started.
    fn travel_to(&mut self, destination: Destination) -> bool;
}

/// Everything a handler may touch.
pub trait World: AgentContext + Interaction + Inventory + Navigator {}

impl<T: AgentContext + Interaction + Inventory + Navigator + ?Sized> World for T {}
