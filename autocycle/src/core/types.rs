//! Shared deterministic types for the control loop.
//!
//! Outcomes carry no behavior: every policy decision about what an outcome
//! means lives in [`crate::core::transition`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// The orchestrator's current discrete state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Initializing,
    TravelingToSupply,
    Resupplying,
    TravelingToWorksite,
    Processing,
    HandlingSubDialog,
    Recovering,
    OnBreak,
    Stopping,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Initializing => "initializing",
            Phase::TravelingToSupply => "traveling_to_supply",
            Phase::Resupplying => "resupplying",
            Phase::TravelingToWorksite => "traveling_to_worksite",
            Phase::Processing => "processing",
            Phase::HandlingSubDialog => "handling_sub_dialog",
            Phase::Recovering => "recovering",
            Phase::OnBreak => "on_break",
            Phase::Stopping => "stopping",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Stopping
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the agent can be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Supply,
    Worksite,
}

/// What an interaction is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Bank booth, chest or banker.
    Supply,
    /// The object the repetitive processing action is performed on.
    Worksite,
    /// A quantity/confirmation dialog opened by the worksite.
    Dialog,
}

/// World coordinates of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Point-in-time view of the agent used by the emergency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSnapshot {
    /// Agent exists and is usable (logged in, context valid).
    pub ready: bool,
    /// Agent is in danger (e.g. under attack).
    pub in_hazard: bool,
}

/// Result of classifying the current task on entering `Initializing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitOutcome {
    NeedsSupply,
    ReadyToWork,
    QueueComplete,
    Error,
}

/// Result of one travel attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelOutcome {
    Arrived,
    Failed,
}

/// Result of one resupply attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResupplyOutcome {
    Acquired,
    NothingAcquired,
    Failed,
}

/// Result of one processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessOutcome {
    Success { units: u32 },
    NeedToWalk,
    NeedToBank,
    Failed,
    /// A sub-dialog from an earlier attempt is still open.
    DialogPending,
}

/// Result of clearing a leftover sub-dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogOutcome {
    Cleared { units: u32 },
    Failed,
}

/// Input to the transition table: the outcome of one tick, already
/// classified by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    Configured,
    NotConfigured,
    NeedsSupply,
    ReadyToWork,
    QueueComplete,
    InitFailed,
    Arrived,
    TravelFailed,
    Resupplied,
    NothingAcquired,
    ResupplyFailed,
    /// Processed a batch and the resource is still on hand.
    Processed,
    /// Processed a batch and now needs to resupply.
    ProcessedNeedsResupply,
    NeedToWalk,
    NeedToBank,
    ProcessFailed,
    DialogPending,
    DialogCleared,
    DialogFailed,
    RetryAllowed,
    FailureCeiling,
    BreakComplete,
    BreakOngoing,
    /// The governor wants a break before the next action.
    BreakDue,
    /// The governor latched an emergency stop.
    EmergencyStop,
    /// The operator disabled the session.
    Paused,
}

impl Event {
    /// Transient action failures; each one bumps the failure counter.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Event::InitFailed
                | Event::TravelFailed
                | Event::ResupplyFailed
                | Event::ProcessFailed
                | Event::DialogFailed
        )
    }

    /// Completed world actions; each one resets the failure counter.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            Event::Arrived
                | Event::Resupplied
                | Event::Processed
                | Event::ProcessedNeedsResupply
                | Event::DialogCleared
        )
    }
}

impl From<InitOutcome> for Event {
    fn from(outcome: InitOutcome) -> Self {
        match outcome {
            InitOutcome::NeedsSupply => Event::NeedsSupply,
            InitOutcome::ReadyToWork => Event::ReadyToWork,
            InitOutcome::QueueComplete => Event::QueueComplete,
            InitOutcome::Error => Event::InitFailed,
        }
    }
}

impl From<TravelOutcome> for Event {
    fn from(outcome: TravelOutcome) -> Self {
        match outcome {
            TravelOutcome::Arrived => Event::Arrived,
            TravelOutcome::Failed => Event::TravelFailed,
        }
    }
}

impl From<ResupplyOutcome> for Event {
    fn from(outcome: ResupplyOutcome) -> Self {
        match outcome {
            ResupplyOutcome::Acquired => Event::Resupplied,
            ResupplyOutcome::NothingAcquired => Event::NothingAcquired,
            ResupplyOutcome::Failed => Event::ResupplyFailed,
        }
    }
}

impl From<DialogOutcome> for Event {
    fn from(outcome: DialogOutcome) -> Self {
        match outcome {
            DialogOutcome::Cleared { .. } => Event::DialogCleared,
            DialogOutcome::Failed => Event::DialogFailed,
        }
    }
}

/// Why the governor latched an emergency stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyReason {
    AgentUnavailable,
    AgentInHazard,
    SessionLimit,
    Idle,
    FailureCeiling,
}

impl fmt::Display for EmergencyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EmergencyReason::AgentUnavailable => "agent unavailable",
            EmergencyReason::AgentInHazard => "agent in hazard",
            EmergencyReason::SessionLimit => "maximum session time reached",
            EmergencyReason::Idle => "idle for too long",
            EmergencyReason::FailureCeiling => "too many consecutive failures",
        };
        f.write_str(text)
    }
}

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    QueueComplete,
    SupplyExhausted,
    FailureCeiling,
    Emergency(EmergencyReason),
}

impl StopReason {
    /// Stops that protect the session rather than finish it.
    pub fn is_safety_halt(self) -> bool {
        matches!(self, StopReason::FailureCeiling | StopReason::Emergency(_))
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::QueueComplete => f.write_str("queue complete"),
            StopReason::SupplyExhausted => f.write_str("supply exhausted"),
            StopReason::FailureCeiling => f.write_str("too many consecutive failures"),
            StopReason::Emergency(reason) => write!(f, "emergency stop: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_and_success_events_are_disjoint() {
        let all = [
            Event::Configured,
            Event::NotConfigured,
            Event::NeedsSupply,
            Event::ReadyToWork,
            Event::QueueComplete,
            Event::InitFailed,
            Event::Arrived,
            Event::TravelFailed,
            Event::Resupplied,
            Event::NothingAcquired,
            Event::ResupplyFailed,
            Event::Processed,
            Event::ProcessedNeedsResupply,
            Event::NeedToWalk,
            Event::NeedToBank,
            Event::ProcessFailed,
            Event::DialogPending,
            Event::DialogCleared,
            Event::DialogFailed,
            Event::RetryAllowed,
            Event::FailureCeiling,
            Event::BreakComplete,
            Event::BreakOngoing,
            Event::BreakDue,
            Event::EmergencyStop,
            Event::Paused,
        ];
        for event in all {
            assert!(!(event.is_failure() && event.is_success()), "{event:?}");
        }
    }

    #[test]
    fn stop_reason_display() {
        assert_eq!(StopReason::QueueComplete.to_string(), "queue complete");
        assert_eq!(
            StopReason::Emergency(EmergencyReason::AgentInHazard).to_string(),
            "emergency stop: agent in hazard"
        );
        assert!(StopReason::FailureCeiling.is_safety_halt());
        assert!(!StopReason::SupplyExhausted.is_safety_halt());
    }
}
