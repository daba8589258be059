//! Safety governor: pacing, break cadence, session limits and emergency halts.
//!
//! The governor is time-driven but owns no timers. Every decision is made on
//! demand against the injected [`SharedClock`], and every random draw comes
//! from the one [`StdRng`] it owns, so a fixed seed and a manual clock make
//! it fully reproducible.

use std::time::Duration;

use anyhow::{Result, anyhow};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::clock::{Millis, SharedClock, as_millis};
use crate::core::types::{AgentSnapshot, EmergencyReason};

/// Inclusive millisecond range sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsRange {
    pub min: u64,
    pub max: u64,
}

impl MsRange {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn sample(&self, rng: &mut StdRng) -> Duration {
        Duration::from_millis(rng.gen_range(self.min..=self.max))
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if self.min > self.max {
            return Err(anyhow!(
                "{name}: min ({}) must be <= max ({})",
                self.min,
                self.max
            ));
        }
        Ok(())
    }
}

/// Work/break cadence. Lengths are drawn fresh for every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakConfig {
    pub enabled: bool,
    pub min_work_secs: u64,
    pub max_work_secs: u64,
    pub min_break_secs: u64,
    pub max_break_secs: u64,
}

impl Default for BreakConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_work_secs: 30 * 60,
            max_work_secs: 90 * 60,
            min_break_secs: 2 * 60,
            max_break_secs: 10 * 60,
        }
    }
}

impl BreakConfig {
    fn work_range(&self) -> MsRange {
        MsRange::new(
            self.min_work_secs.saturating_mul(1000),
            self.max_work_secs.saturating_mul(1000),
        )
    }

    fn break_range(&self) -> MsRange {
        MsRange::new(
            self.min_break_secs.saturating_mul(1000),
            self.max_break_secs.saturating_mul(1000),
        )
    }

    pub fn validate(&self) -> Result<()> {
        for (name, secs) in [
            ("breaks.min_work_secs", self.min_work_secs),
            ("breaks.max_work_secs", self.max_work_secs),
            ("breaks.min_break_secs", self.min_break_secs),
            ("breaks.max_break_secs", self.max_break_secs),
        ] {
            checked_millis(name, secs, 1000)?;
        }
        self.work_range().validate("breaks.work_secs")?;
        self.break_range().validate("breaks.break_secs")?;
        if self.enabled && self.min_work_secs == 0 {
            return Err(anyhow!("breaks.min_work_secs must be > 0 when breaks are enabled"));
        }
        Ok(())
    }
}

/// `value` in `unit`-millisecond steps, rejecting values that overflow.
fn checked_millis(name: &str, value: u64, unit: u64) -> Result<Millis> {
    value
        .checked_mul(unit)
        .ok_or_else(|| anyhow!("{name} is too large ({value})"))
}

/// Hard session ceilings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session cap in minutes; `None` or `0` means unlimited.
    pub max_session_minutes: Option<u64>,
    /// Longest tolerated gap between recorded actions.
    pub idle_ceiling_secs: u64,
    /// Consecutive failures that end the session.
    pub max_consecutive_failures: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_session_minutes: None,
            idle_ceiling_secs: 5 * 60,
            max_consecutive_failures: 5,
        }
    }
}

impl SessionConfig {
    fn session_limit(&self) -> Option<Millis> {
        self.max_session_minutes
            .filter(|minutes| *minutes > 0)
            .map(|minutes| minutes.saturating_mul(60_000))
    }

    fn idle_ceiling(&self) -> Millis {
        self.idle_ceiling_secs.saturating_mul(1000)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(minutes) = self.max_session_minutes {
            checked_millis("session.max_session_minutes", minutes, 60_000)?;
        }
        checked_millis("session.idle_ceiling_secs", self.idle_ceiling_secs, 1000)?;
        if self.idle_ceiling_secs == 0 {
            return Err(anyhow!("session.idle_ceiling_secs must be > 0"));
        }
        if self.max_consecutive_failures == 0 {
            return Err(anyhow!("session.max_consecutive_failures must be > 0"));
        }
        Ok(())
    }
}

/// Human-like pacing knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Base inter-action delay.
    pub base_delay_ms: MsRange,
    /// Added to the base delay while failures are outstanding.
    pub failure_extra_ms: MsRange,
    /// Probability of a longer "distracted" pause.
    pub distraction_chance: f64,
    pub distraction_extra_ms: MsRange,
    /// Pause before retrying from `Initializing` after a failure.
    pub backoff_ms: MsRange,
    /// Poll interval while waiting for the operator.
    pub idle_poll_ms: MsRange,
    /// Longest single wait while on break.
    pub break_poll_max_ms: u64,
    /// Probability of a short pause between processing batches.
    pub micro_break_chance: f64,
    pub micro_break_ms: MsRange,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: MsRange::new(600, 1_199),
            failure_extra_ms: MsRange::new(500, 1_499),
            distraction_chance: 0.05,
            distraction_extra_ms: MsRange::new(1_000, 2_999),
            backoff_ms: MsRange::new(5_000, 10_000),
            idle_poll_ms: MsRange::new(1_000, 2_000),
            break_poll_max_ms: 5_000,
            micro_break_chance: 0.02,
            micro_break_ms: MsRange::new(1_000, 3_999),
        }
    }
}

impl PacingConfig {
    pub fn validate(&self) -> Result<()> {
        self.base_delay_ms.validate("pacing.base_delay_ms")?;
        self.failure_extra_ms.validate("pacing.failure_extra_ms")?;
        self.distraction_extra_ms
            .validate("pacing.distraction_extra_ms")?;
        self.backoff_ms.validate("pacing.backoff_ms")?;
        self.idle_poll_ms.validate("pacing.idle_poll_ms")?;
        self.micro_break_ms.validate("pacing.micro_break_ms")?;
        for (name, chance) in [
            ("pacing.distraction_chance", self.distraction_chance),
            ("pacing.micro_break_chance", self.micro_break_chance),
        ] {
            if !(0.0..=1.0).contains(&chance) {
                return Err(anyhow!("{name} must be within [0, 1] (got {chance})"));
            }
        }
        if self.break_poll_max_ms == 0 {
            return Err(anyhow!("pacing.break_poll_max_ms must be > 0"));
        }
        Ok(())
    }
}

/// Everything the governor needs, assembled from the runner config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernorConfig {
    pub session: SessionConfig,
    pub breaks: BreakConfig,
    pub pacing: PacingConfig,
}

impl GovernorConfig {
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        self.breaks.validate()?;
        self.pacing.validate()
    }
}

/// Owns the session clock, failure counter and emergency latch.
pub struct SafetyGovernor {
    config: GovernorConfig,
    clock: SharedClock,
    rng: StdRng,
    session_started_at: Millis,
    next_break_at: Option<Millis>,
    on_break: bool,
    break_started_at: Millis,
    break_duration: Millis,
    last_activity_at: Millis,
    consecutive_failures: u32,
    total_failures: u32,
    emergency: Option<EmergencyReason>,
}

impl SafetyGovernor {
    pub fn new(config: GovernorConfig, clock: SharedClock, rng: StdRng) -> Self {
        let now = clock.now();
        let mut governor = Self {
            config,
            clock,
            rng,
            session_started_at: now,
            next_break_at: None,
            on_break: false,
            break_started_at: 0,
            break_duration: 0,
            last_activity_at: now,
            consecutive_failures: 0,
            total_failures: 0,
            emergency: None,
        };
        governor.schedule_next_break();
        governor
    }

    /// Evaluate the halt conditions in priority order and latch the first hit.
    ///
    /// Once latched, returns true with the original reason until
    /// [`reset_session`](Self::reset_session).
    pub fn should_emergency_stop(&mut self, agent: AgentSnapshot) -> bool {
        if self.emergency.is_some() {
            return true;
        }
        let now = self.clock.now();
        let reason = if !agent.ready {
            Some(EmergencyReason::AgentUnavailable)
        } else if agent.in_hazard {
            Some(EmergencyReason::AgentInHazard)
        } else if self
            .config
            .session
            .session_limit()
            .is_some_and(|limit| now.saturating_sub(self.session_started_at) >= limit)
        {
            Some(EmergencyReason::SessionLimit)
        } else if !self.on_break
            && now.saturating_sub(self.last_activity_at)
                > self.config.session.idle_ceiling()
        {
            Some(EmergencyReason::Idle)
        } else if self.consecutive_failures >= self.config.session.max_consecutive_failures {
            Some(EmergencyReason::FailureCeiling)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                warn!(%reason, "emergency stop latched");
                self.emergency = Some(reason);
                true
            }
            None => false,
        }
    }

    pub fn emergency_reason(&self) -> Option<EmergencyReason> {
        self.emergency
    }

    /// True while on break, or once the scheduled work stretch has elapsed.
    pub fn is_time_for_break(&self) -> bool {
        if !self.config.breaks.enabled {
            return false;
        }
        if self.on_break {
            return true;
        }
        self.next_break_at
            .is_some_and(|at| self.clock.now() >= at)
    }

    /// Begin a break with a freshly drawn length. No-op while already on break.
    pub fn start_break(&mut self) -> Duration {
        if self.on_break {
            return self.remaining_break();
        }
        let duration = self.config.breaks.break_range().sample(&mut self.rng);
        self.on_break = true;
        self.break_started_at = self.clock.now();
        self.break_duration = as_millis(duration);
        info!(break_secs = duration.as_secs(), "starting break");
        duration
    }

    /// True when not on break. Ends the break (and schedules the next one)
    /// once its full length has elapsed.
    pub fn is_break_complete(&mut self) -> bool {
        if !self.on_break {
            return true;
        }
        let now = self.clock.now();
        if now.saturating_sub(self.break_started_at) < self.break_duration {
            return false;
        }
        self.on_break = false;
        self.last_activity_at = now;
        self.schedule_next_break();
        info!("break complete");
        true
    }

    pub fn is_on_break(&self) -> bool {
        self.on_break
    }

    pub fn remaining_break(&self) -> Duration {
        if !self.on_break {
            return Duration::ZERO;
        }
        let elapsed = self.clock.now().saturating_sub(self.break_started_at);
        Duration::from_millis(self.break_duration.saturating_sub(elapsed))
    }

    /// `None` when breaks are disabled or one is in progress.
    pub fn time_until_next_break(&self) -> Option<Duration> {
        if !self.config.breaks.enabled || self.on_break {
            return None;
        }
        let at = self.next_break_at?;
        Some(Duration::from_millis(at.saturating_sub(self.clock.now())))
    }

    /// `None` when the session is unlimited.
    pub fn remaining_session(&self) -> Option<Duration> {
        let limit = self.config.session.session_limit()?;
        let elapsed = self.clock.now().saturating_sub(self.session_started_at);
        Some(Duration::from_millis(limit.saturating_sub(elapsed)))
    }

    pub fn session_elapsed(&self) -> Duration {
        Duration::from_millis(self.clock.now().saturating_sub(self.session_started_at))
    }

    /// Delay before the next action.
    pub fn generate_random_delay(&mut self) -> Duration {
        let pacing = &self.config.pacing;
        let mut delay = pacing.base_delay_ms.sample(&mut self.rng);
        if self.consecutive_failures > 0 {
            delay += pacing.failure_extra_ms.sample(&mut self.rng);
        }
        if self.rng.gen_bool(pacing.distraction_chance) {
            delay += pacing.distraction_extra_ms.sample(&mut self.rng);
        }
        delay
    }

    /// Pause taken by `Recovering` before retrying.
    pub fn generate_backoff_delay(&mut self) -> Duration {
        self.config.pacing.backoff_ms.sample(&mut self.rng)
    }

    /// Poll interval while idle and waiting for the operator.
    pub fn generate_idle_delay(&mut self) -> Duration {
        self.config.pacing.idle_poll_ms.sample(&mut self.rng)
    }

    /// Next wait while on break: the remaining time, capped.
    pub fn break_poll_delay(&self) -> Duration {
        self.remaining_break()
            .min(Duration::from_millis(self.config.pacing.break_poll_max_ms))
    }

    pub fn should_take_micro_break(&mut self) -> bool {
        self.rng.gen_bool(self.config.pacing.micro_break_chance)
    }

    pub fn generate_micro_break(&mut self) -> Duration {
        self.config.pacing.micro_break_ms.sample(&mut self.rng)
    }

    pub fn record_successful_action(&mut self) {
        self.last_activity_at = self.clock.now();
        self.consecutive_failures = 0;
    }

    pub fn record_failed_action(&mut self) {
        self.last_activity_at = self.clock.now();
        self.consecutive_failures += 1;
        self.total_failures += 1;
        debug!(
            consecutive = self.consecutive_failures,
            "action failed"
        );
    }

    /// Note that the loop is alive without touching the failure counter.
    pub fn mark_active(&mut self) {
        self.last_activity_at = self.clock.now();
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn total_failures(&self) -> u32 {
        self.total_failures
    }

    pub fn max_failures(&self) -> u32 {
        self.config.session.max_consecutive_failures
    }

    /// Start a fresh session: clock, break schedule, counters and latch.
    pub fn reset_session(&mut self) {
        let now = self.clock.now();
        self.session_started_at = now;
        self.last_activity_at = now;
        self.on_break = false;
        self.break_started_at = 0;
        self.break_duration = 0;
        self.consecutive_failures = 0;
        self.total_failures = 0;
        self.emergency = None;
        self.schedule_next_break();
    }

    fn schedule_next_break(&mut self) {
        if !self.config.breaks.enabled {
            self.next_break_at = None;
            return;
        }
        let work = self.config.breaks.work_range().sample(&mut self.rng);
        self.next_break_at = Some(self.clock.now().saturating_add(as_millis(work)));
        debug!(work_secs = work.as_secs(), "next break scheduled");
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use rand::SeedableRng;

    use super::*;
    use crate::core::clock::ManualClock;

    const READY: AgentSnapshot = AgentSnapshot {
        ready: true,
        in_hazard: false,
    };

    fn governor_with(config: GovernorConfig) -> (SafetyGovernor, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new(0));
        let governor = SafetyGovernor::new(config, clock.clone(), StdRng::seed_from_u64(7));
        (governor, clock)
    }

    fn short_breaks() -> GovernorConfig {
        GovernorConfig {
            breaks: BreakConfig {
                enabled: true,
                min_work_secs: 60,
                max_work_secs: 120,
                min_break_secs: 10,
                max_break_secs: 20,
            },
            ..GovernorConfig::default()
        }
    }

    #[test]
    fn failure_ceiling_latches_even_after_success() {
        let (mut governor, _clock) = governor_with(GovernorConfig::default());
        for _ in 0..governor.max_failures() {
            assert!(!governor.should_emergency_stop(READY));
            governor.record_failed_action();
        }
        assert!(governor.should_emergency_stop(READY));
        assert_eq!(
            governor.emergency_reason(),
            Some(EmergencyReason::FailureCeiling)
        );

        governor.record_successful_action();
        assert_eq!(governor.consecutive_failures(), 0);
        assert!(governor.should_emergency_stop(READY));
        assert_eq!(
            governor.emergency_reason(),
            Some(EmergencyReason::FailureCeiling)
        );
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let (mut governor, _clock) = governor_with(GovernorConfig::default());
        governor.record_failed_action();
        governor.record_failed_action();
        governor.record_successful_action();
        assert_eq!(governor.consecutive_failures(), 0);
        assert_eq!(governor.total_failures(), 2);
        assert!(!governor.should_emergency_stop(READY));
    }

    #[test]
    fn checks_run_in_priority_order() {
        let (mut governor, _clock) = governor_with(GovernorConfig::default());
        let stop = governor.should_emergency_stop(AgentSnapshot {
            ready: false,
            in_hazard: true,
        });
        assert!(stop);
        assert_eq!(
            governor.emergency_reason(),
            Some(EmergencyReason::AgentUnavailable)
        );

        let (mut governor, _clock) = governor_with(GovernorConfig::default());
        assert!(governor.should_emergency_stop(AgentSnapshot {
            ready: true,
            in_hazard: true,
        }));
        assert_eq!(
            governor.emergency_reason(),
            Some(EmergencyReason::AgentInHazard)
        );
    }

    #[test]
    fn session_cap_and_idle_ceiling() {
        let mut config = GovernorConfig::default();
        config.breaks.enabled = false;
        config.session.max_session_minutes = Some(1);
        let (mut governor, clock) = governor_with(config);

        clock.advance(Duration::from_secs(59));
        governor.mark_active();
        assert!(!governor.should_emergency_stop(READY));
        assert_eq!(governor.remaining_session(), Some(Duration::from_secs(1)));
        clock.advance(Duration::from_secs(1));
        assert!(governor.should_emergency_stop(READY));
        assert_eq!(
            governor.emergency_reason(),
            Some(EmergencyReason::SessionLimit)
        );

        let mut config = GovernorConfig::default();
        config.breaks.enabled = false;
        let (mut governor, clock) = governor_with(config);
        clock.advance(Duration::from_secs(300));
        assert!(!governor.should_emergency_stop(READY));
        clock.advance(Duration::from_millis(1));
        assert!(governor.should_emergency_stop(READY));
        assert_eq!(governor.emergency_reason(), Some(EmergencyReason::Idle));
    }

    #[test]
    fn reset_session_clears_latch() {
        let (mut governor, _clock) = governor_with(GovernorConfig::default());
        assert!(governor.should_emergency_stop(AgentSnapshot {
            ready: false,
            in_hazard: false,
        }));
        governor.reset_session();
        assert!(governor.emergency_reason().is_none());
        assert!(!governor.should_emergency_stop(READY));
    }

    #[test]
    fn break_duration_is_drawn_from_range_and_completes_on_time() {
        let (mut governor, clock) = governor_with(short_breaks());
        let duration = governor.start_break();
        assert!(duration >= Duration::from_secs(10));
        assert!(duration <= Duration::from_secs(20));
        assert!(governor.is_on_break());

        clock.advance(duration - Duration::from_millis(1));
        assert!(!governor.is_break_complete());
        assert_eq!(governor.remaining_break(), Duration::from_millis(1));

        clock.advance(Duration::from_millis(1));
        assert!(governor.is_break_complete());
        assert!(!governor.is_on_break());
        assert!(governor.is_break_complete());
    }

    #[test]
    fn break_becomes_due_after_work_stretch() {
        let (mut governor, clock) = governor_with(short_breaks());
        assert!(!governor.is_time_for_break());
        let until = governor.time_until_next_break().expect("scheduled");
        assert!(until >= Duration::from_secs(60) && until <= Duration::from_secs(120));

        clock.advance(until);
        assert!(governor.is_time_for_break());
        governor.start_break();
        assert!(governor.is_time_for_break());
        assert!(governor.time_until_next_break().is_none());
    }

    #[test]
    fn idle_is_not_checked_during_breaks() {
        let (mut governor, clock) = governor_with(short_breaks());
        governor.start_break();
        clock.advance(Duration::from_secs(600));
        assert!(!governor.should_emergency_stop(READY));
        assert!(governor.is_break_complete());
        assert!(!governor.should_emergency_stop(READY));
    }

    #[test]
    fn disabled_breaks_never_fire() {
        let mut config = short_breaks();
        config.breaks.enabled = false;
        let (governor, clock) = governor_with(config);
        clock.advance(Duration::from_secs(10_000));
        assert!(!governor.is_time_for_break());
        assert!(governor.time_until_next_break().is_none());
    }

    #[test]
    fn delays_widen_after_failures() {
        let mut config = GovernorConfig::default();
        config.pacing.distraction_chance = 0.0;
        let (mut governor, _clock) = governor_with(config);

        for _ in 0..50 {
            let delay = governor.generate_random_delay();
            assert!(delay >= Duration::from_millis(600) && delay < Duration::from_millis(1_200));
        }
        governor.record_failed_action();
        for _ in 0..50 {
            let delay = governor.generate_random_delay();
            assert!(delay >= Duration::from_millis(1_100) && delay < Duration::from_millis(2_700));
        }
    }

    #[test]
    fn distraction_inflates_delay() {
        let mut config = GovernorConfig::default();
        config.pacing.distraction_chance = 1.0;
        let (mut governor, _clock) = governor_with(config);
        let delay = governor.generate_random_delay();
        assert!(delay >= Duration::from_millis(1_600));
    }

    #[test]
    fn break_poll_is_capped() {
        let mut config = short_breaks();
        config.pacing.break_poll_max_ms = 5_000;
        let (mut governor, _clock) = governor_with(config);
        governor.start_break();
        assert_eq!(governor.break_poll_delay(), Duration::from_secs(5));
    }

    #[test]
    fn validate_rejects_inverted_ranges() {
        let mut config = GovernorConfig::default();
        config.pacing.backoff_ms = MsRange::new(10, 1);
        assert!(config.validate().is_err());

        let mut config = GovernorConfig::default();
        config.breaks.min_break_secs = 100;
        config.breaks.max_break_secs = 50;
        assert!(config.validate().is_err());

        assert!(GovernorConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_limits_that_overflow_milliseconds() {
        let mut config = GovernorConfig::default();
        config.session.max_session_minutes = Some(u64::MAX / 1000);
        let err = config.validate().expect_err("oversized session cap");
        assert!(err.to_string().contains("max_session_minutes"));

        let mut config = GovernorConfig::default();
        config.breaks.max_work_secs = 18_446_744_073_709_552;
        let err = config.validate().expect_err("oversized work stretch");
        assert!(err.to_string().contains("max_work_secs"));
    }

    #[test]
    fn oversized_limits_saturate_while_ticking() {
        let mut config = GovernorConfig::default();
        config.session.max_session_minutes = Some(u64::MAX / 1000);
        config.session.idle_ceiling_secs = u64::MAX;
        config.breaks.min_work_secs = u64::MAX / 10;
        config.breaks.max_work_secs = u64::MAX;
        let (mut governor, clock) = governor_with(config);
        clock.advance(Duration::from_secs(3600));

        assert!(!governor.should_emergency_stop(READY));
        assert!(!governor.is_time_for_break());
        assert!(governor.remaining_session().is_some());
    }
}
