//! Deterministic transition table: `(phase, event) -> next phase`.
//!
//! This is a pure function of its inputs. History, counters and timers are
//! folded into the [`Event`] by the orchestrator before it gets here.

use crate::core::types::{Event, Phase};

/// Next phase for `event` observed while in `phase`.
///
/// Returns `None` when the event cannot occur in that phase, which the
/// orchestrator treats as a recoverable fault. `Stopping` is terminal and
/// absorbs every event.
pub fn next_phase(phase: Phase, event: Event) -> Option<Phase> {
    let next = match (phase, event) {
        (Phase::Stopping, _) => Phase::Stopping,
        (_, Event::EmergencyStop) => Phase::Stopping,
        (_, Event::Paused) => Phase::Idle,
        (Phase::Idle, Event::BreakDue) => return None,
        (_, Event::BreakDue) => Phase::OnBreak,

        (Phase::Idle, Event::Configured) => Phase::Initializing,
        (Phase::Idle, Event::NotConfigured) => Phase::Idle,

        (Phase::Initializing, Event::NeedsSupply) => Phase::TravelingToSupply,
        (Phase::Initializing, Event::ReadyToWork) => Phase::TravelingToWorksite,
        (Phase::Initializing, Event::QueueComplete) => Phase::Stopping,
        (Phase::Initializing, Event::InitFailed) => Phase::Recovering,

        (Phase::TravelingToSupply, Event::Arrived) => Phase::Resupplying,
        (Phase::TravelingToSupply, Event::TravelFailed) => Phase::Recovering,

        (Phase::Resupplying, Event::Resupplied) => Phase::TravelingToWorksite,
        (Phase::Resupplying, Event::NothingAcquired) => Phase::Stopping,
        (Phase::Resupplying, Event::ResupplyFailed) => Phase::Recovering,

        (Phase::TravelingToWorksite, Event::Arrived) => Phase::Processing,
        (Phase::TravelingToWorksite, Event::TravelFailed) => Phase::Recovering,

        (Phase::Processing, Event::Processed) => Phase::Processing,
        (Phase::Processing, Event::ProcessedNeedsResupply) => Phase::TravelingToSupply,
        (Phase::Processing, Event::NeedToWalk) => Phase::TravelingToWorksite,
        (Phase::Processing, Event::NeedToBank) => Phase::TravelingToSupply,
        (Phase::Processing, Event::ProcessFailed) => Phase::Recovering,
        (Phase::Processing, Event::DialogPending) => Phase::HandlingSubDialog,

        (Phase::HandlingSubDialog, Event::DialogCleared) => Phase::Processing,
        (Phase::HandlingSubDialog, Event::DialogFailed) => Phase::Recovering,

        (Phase::Recovering, Event::RetryAllowed) => Phase::Initializing,
        (Phase::Recovering, Event::FailureCeiling) => Phase::Stopping,

        (Phase::OnBreak, Event::BreakComplete) => Phase::Initializing,
        (Phase::OnBreak, Event::BreakOngoing) => Phase::OnBreak,

        _ => return None,
    };
    Some(next)
}
