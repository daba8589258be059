//! The per-tick control loop.
//!
//! [`Orchestrator::tick`] runs at most one handler attempt, folds its outcome
//! into an [`Event`], and moves the phase with [`next_phase`]. It never
//! sleeps between ticks: the returned [`TickReport::delay`] is the pacing the
//! driver should pause for before calling again.

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::clock::{Millis, SharedClock, as_millis};
use crate::core::detector::{AntiPatternDetector, RiskAssessment};
use crate::core::governor::SafetyGovernor;
use crate::core::stats::{SessionStats, SessionSummary};
use crate::core::task::{Task, TaskQueue};
use crate::core::transition::next_phase;
use crate::core::types::{
    Destination, DialogOutcome, EmergencyReason, Event, Phase, ProcessOutcome, StopReason,
};
use crate::handlers::{self, HandlerContext};
use crate::io::config::RunnerConfig;
use crate::io::telemetry::{TelemetryEvent, TelemetrySink};
use crate::io::world::World;

const TRANSITION_LOG_LEN: usize = 32;

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub phase: Phase,
    pub next: Phase,
    /// `None` when the tick was a no-op in `Stopping`.
    pub event: Option<Event>,
    /// Pause before the next tick.
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransitionRecord {
    pub at: Millis,
    pub from: Phase,
    pub to: Phase,
    pub event: Event,
}

pub struct Orchestrator {
    config: RunnerConfig,
    clock: SharedClock,
    phase: Phase,
    enabled: bool,
    started: bool,
    queue: TaskQueue,
    governor: SafetyGovernor,
    detector: AntiPatternDetector,
    sink: Box<dyn TelemetrySink>,
    stats: SessionStats,
    transitions: VecDeque<TransitionRecord>,
    last_assessment: RiskAssessment,
    summary: Option<SessionSummary>,
}

impl Orchestrator {
    /// Build an idle orchestrator with an empty queue.
    pub fn new(
        config: RunnerConfig,
        clock: SharedClock,
        rng: StdRng,
        sink: Box<dyn TelemetrySink>,
    ) -> Self {
        let governor = SafetyGovernor::new(config.governor_config(), clock.clone(), rng);
        let detector = AntiPatternDetector::new(config.detector.clone());
        Self {
            config,
            clock,
            phase: Phase::Idle,
            enabled: false,
            started: false,
            queue: TaskQueue::new(),
            governor,
            detector,
            sink,
            stats: SessionStats::default(),
            transitions: VecDeque::with_capacity(TRANSITION_LOG_LEN),
            last_assessment: RiskAssessment::default(),
            summary: None,
        }
    }

    /// Validate `config` and preload its `[[tasks]]`.
    pub fn from_config(
        config: RunnerConfig,
        clock: SharedClock,
        rng: StdRng,
        sink: Box<dyn TelemetrySink>,
    ) -> Result<Self> {
        config.validate().context("validate config")?;
        let queue = config.task_queue()?;
        let mut orchestrator = Self::new(config, clock, rng, sink);
        orchestrator.queue = queue;
        Ok(orchestrator)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn governor(&self) -> &SafetyGovernor {
        &self.governor
    }

    pub fn detector(&self) -> &AntiPatternDetector {
        &self.detector
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Set once, when the session enters `Stopping`.
    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.summary.as_ref().map(|summary| summary.stop_reason)
    }

    /// Most recent transitions, oldest first.
    pub fn transitions(&self) -> impl Iterator<Item = &TransitionRecord> + '_ {
        self.transitions.iter()
    }

    pub fn last_assessment(&self) -> RiskAssessment {
        self.last_assessment
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable the session. The first start also resets the session clock.
    pub fn start(&mut self) -> Result<()> {
        if self.phase.is_terminal() {
            return Err(anyhow!("session already stopped"));
        }
        if !self.started {
            self.governor.reset_session();
            self.started = true;
        }
        self.enabled = true;
        info!(tasks = self.queue.len(), "session started");
        Ok(())
    }

    /// Disable the session; the next tick parks it in `Idle`.
    pub fn pause(&mut self) {
        self.enabled = false;
        info!("session paused");
    }

    pub fn enqueue(&mut self, resource: &str, quantity: i64) -> Result<(), String> {
        self.queue.enqueue(resource, quantity)
    }

    pub fn remove_task(&mut self, index: usize) -> Option<Task> {
        self.queue.remove(index)
    }

    pub fn clear_tasks(&mut self) {
        self.queue.clear();
    }

    /// One-line status for an operator display.
    pub fn status_line(&self) -> String {
        if let Some(summary) = &self.summary {
            return format!("Stopped: {}", summary.stop_reason);
        }
        if self.phase == Phase::OnBreak {
            return format!(
                "On break: {}s left",
                self.governor.remaining_break().as_secs()
            );
        }
        if !self.enabled {
            return if self.started { "Paused" } else { "Idle" }.to_string();
        }
        match self.queue.current() {
            Some(task) => format!("Running: {task}"),
            None => "Running".to_string(),
        }
    }

    /// Advance the session by one step.
    pub fn tick<W: World + ?Sized>(&mut self, world: &mut W) -> TickReport {
        let phase = self.phase;
        if phase.is_terminal() {
            return TickReport {
                phase,
                next: phase,
                event: None,
                delay: Duration::ZERO,
            };
        }

        if self.governor.should_emergency_stop(world.snapshot()) {
            let reason = self
                .governor
                .emergency_reason()
                .unwrap_or(EmergencyReason::FailureCeiling);
            self.emit(TelemetryEvent::EmergencyStop {
                at: self.clock.now(),
                reason,
            });
            return self.apply(phase, Event::EmergencyStop, Duration::ZERO);
        }

        if !self.enabled && phase != Phase::Idle {
            let delay = self.governor.generate_idle_delay();
            return self.apply(phase, Event::Paused, delay);
        }

        if phase != Phase::Idle && phase != Phase::OnBreak && self.break_due() {
            // A break interrupted by a pause resumes rather than restarting.
            let resuming = self.governor.is_on_break();
            let duration = self.governor.start_break();
            if !resuming {
                self.stats.breaks_taken += 1;
                self.emit(TelemetryEvent::BreakStarted {
                    at: self.clock.now(),
                    duration_ms: as_millis(duration),
                });
            }
            let delay = self.governor.break_poll_delay();
            return self.apply(phase, Event::BreakDue, delay);
        }

        let event = self.dispatch(phase, world);

        if event.is_failure() {
            self.governor.record_failed_action();
        } else if event.is_success() {
            self.governor.record_successful_action();
        }

        let assessment = self.detector.analyze_patterns(self.clock.now());
        if assessment != self.last_assessment {
            let recommendations = self.detector.recommendations(&assessment);
            self.emit(TelemetryEvent::RiskAssessed {
                at: self.clock.now(),
                assessment,
                recommendations,
            });
            self.last_assessment = assessment;
        }

        let delay = self.pacing(phase, event);
        self.apply(phase, event, delay)
    }

    fn break_due(&mut self) -> bool {
        if self.governor.is_time_for_break() {
            return true;
        }
        let Some(threshold) = self.config.detector.risk_break_threshold else {
            return false;
        };
        if self.last_assessment.risk_score < threshold {
            return false;
        }
        info!(
            risk = self.last_assessment.risk_score,
            threshold, "risk threshold reached, taking an early break"
        );
        self.detector.clear_history();
        self.last_assessment = RiskAssessment::default();
        true
    }

    fn dispatch<W: World + ?Sized>(&mut self, phase: Phase, world: &mut W) -> Event {
        let ctx = HandlerContext {
            clock: &*self.clock,
            waits: &self.config.waits,
            actions: &self.config.actions,
        };
        match phase {
            Phase::Idle => {
                self.governor.mark_active();
                if self.enabled && !self.queue.is_empty() {
                    Event::Configured
                } else {
                    Event::NotConfigured
                }
            }
            Phase::Initializing => handlers::init::classify(
                world,
                &self.queue,
                self.config.resource_always_present,
            )
            .into(),
            Phase::TravelingToSupply | Phase::TravelingToWorksite => {
                let destination = if phase == Phase::TravelingToSupply {
                    Destination::Supply
                } else {
                    Destination::Worksite
                };
                let event: Event = handlers::travel::attempt(world, &ctx, destination).into();
                self.stats.travel_actions += 1;
                if let Some(position) = world.current_position() {
                    self.detector
                        .record_location(position.x, position.y, self.clock.now());
                }
                self.observe(phase, event);
                event
            }
            Phase::Resupplying => {
                let event: Event =
                    handlers::resupply::attempt(world, &ctx, self.queue.current()).into();
                if event == Event::Resupplied {
                    self.stats.resupply_trips += 1;
                }
                self.observe(phase, event);
                event
            }
            Phase::Processing => {
                let current = self.queue.current_index();
                let outcome = current
                    .and_then(|index| self.queue.get_mut(index))
                    .map(|task| handlers::process::attempt(world, &ctx, task));
                let event = match (current, outcome) {
                    (Some(index), Some(ProcessOutcome::Success { units })) => {
                        self.credit(index, units);
                        let needs_resupply = self.queue.get(index).is_none_or(|task| {
                            task.is_done() || !world.has_resource(task.resource())
                        });
                        if needs_resupply {
                            Event::ProcessedNeedsResupply
                        } else {
                            Event::Processed
                        }
                    }
                    (_, Some(ProcessOutcome::NeedToWalk)) => Event::NeedToWalk,
                    (_, Some(ProcessOutcome::Failed)) => Event::ProcessFailed,
                    (_, Some(ProcessOutcome::DialogPending)) => Event::DialogPending,
                    _ => Event::NeedToBank,
                };
                self.observe(phase, event);
                event
            }
            Phase::HandlingSubDialog => {
                let current = self.queue.current_index();
                let task = current.and_then(|index| self.queue.get_mut(index));
                let outcome = handlers::dialog::attempt(world, &ctx, task);
                if let (DialogOutcome::Cleared { units }, Some(index)) = (outcome, current) {
                    self.credit(index, units);
                }
                let event = outcome.into();
                self.observe(phase, event);
                event
            }
            Phase::Recovering => {
                if self.governor.consecutive_failures() >= self.governor.max_failures() {
                    Event::FailureCeiling
                } else {
                    self.stats.recoveries += 1;
                    Event::RetryAllowed
                }
            }
            Phase::OnBreak => {
                if self.governor.is_break_complete() {
                    self.emit(TelemetryEvent::BreakEnded {
                        at: self.clock.now(),
                    });
                    Event::BreakComplete
                } else {
                    Event::BreakOngoing
                }
            }
            Phase::Stopping => Event::EmergencyStop,
        }
    }

    /// Count `units` toward the task at `index` in the session stats.
    fn credit(&mut self, index: usize, units: u32) {
        if units == 0 {
            return;
        }
        let Some(task) = self.queue.get(index) else {
            return;
        };
        let event = TelemetryEvent::TaskProgress {
            at: self.clock.now(),
            resource: task.resource().to_string(),
            completed: task.completed(),
            target: task.target(),
        };
        self.stats.record_units(task.resource(), units);
        self.stats.process_actions += 1;
        self.emit(event);
    }

    fn observe(&mut self, phase: Phase, event: Event) {
        let at = self.clock.now();
        let detail = format!("{event:?}");
        self.detector.record_action(phase.as_str(), &detail, at);
        self.emit(TelemetryEvent::ActionRecorded {
            at,
            kind: phase.as_str().to_string(),
            detail,
        });
    }

    fn pacing(&mut self, phase: Phase, event: Event) -> Duration {
        match event {
            Event::NotConfigured => self.governor.generate_idle_delay(),
            Event::BreakOngoing => self.governor.break_poll_delay(),
            Event::RetryAllowed => self.governor.generate_backoff_delay(),
            Event::Processed => {
                let mut delay = self.governor.generate_random_delay();
                if self.governor.should_take_micro_break() {
                    let pause = self.governor.generate_micro_break();
                    debug!(pause_ms = as_millis(pause), "micro-break");
                    delay += pause;
                }
                delay
            }
            _ if phase == Phase::Idle => Duration::ZERO,
            _ => self.governor.generate_random_delay(),
        }
    }

    fn apply(&mut self, from: Phase, event: Event, delay: Duration) -> TickReport {
        let at = self.clock.now();
        let to = match next_phase(from, event) {
            Some(to) => to,
            None => {
                warn!(%from, ?event, "no transition for event, recovering");
                Phase::Recovering
            }
        };

        if self.transitions.len() == TRANSITION_LOG_LEN {
            self.transitions.pop_front();
        }
        self.transitions.push_back(TransitionRecord {
            at,
            from,
            to,
            event,
        });
        if from != to {
            self.emit(TelemetryEvent::PhaseChanged {
                at,
                from,
                to,
                event,
            });
        }
        self.phase = to;

        let delay = if to.is_terminal() {
            self.finish(event);
            Duration::ZERO
        } else {
            delay
        };
        debug!(%from, %to, ?event, delay_ms = as_millis(delay), "tick");
        TickReport {
            phase: from,
            next: to,
            event: Some(event),
            delay,
        }
    }

    fn finish(&mut self, event: Event) {
        if self.summary.is_some() {
            return;
        }
        let reason = match event {
            Event::QueueComplete => StopReason::QueueComplete,
            Event::NothingAcquired if self.queue.is_complete() => StopReason::QueueComplete,
            Event::NothingAcquired => StopReason::SupplyExhausted,
            Event::FailureCeiling => StopReason::FailureCeiling,
            _ => match self.governor.emergency_reason() {
                Some(EmergencyReason::FailureCeiling) | None => StopReason::FailureCeiling,
                Some(reason) => StopReason::Emergency(reason),
            },
        };
        let summary = SessionSummary::new(
            &self.stats,
            self.governor.session_elapsed(),
            self.governor.total_failures(),
            reason,
        );
        info!(%reason, units = summary.units_processed, "session stopping");
        self.emit(TelemetryEvent::SessionEnded {
            at: self.clock.now(),
            summary: summary.clone(),
        });
        self.summary = Some(summary);
    }

    fn emit(&mut self, event: TelemetryEvent) {
        self.sink.record(&event);
    }
}
