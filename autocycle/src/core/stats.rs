//! Running session counters and the terminal summary.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::types::StopReason;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub units_processed: u64,
    pub per_resource: BTreeMap<String, u64>,
    pub process_actions: u64,
    pub resupply_trips: u64,
    pub travel_actions: u64,
    pub breaks_taken: u32,
    pub recoveries: u32,
}

impl SessionStats {
    pub fn record_units(&mut self, resource: &str, units: u32) {
        self.units_processed += u64::from(units);
        *self.per_resource.entry(resource.to_string()).or_default() += u64::from(units);
    }

    /// Units per hour over `elapsed`; zero before any time has passed.
    pub fn units_per_hour(&self, elapsed: Duration) -> f64 {
        let hours = elapsed.as_secs_f64() / 3600.0;
        if hours <= 0.0 {
            return 0.0;
        }
        self.units_processed as f64 / hours
    }
}

/// Produced exactly once, when the session enters `Stopping`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub duration_ms: u64,
    pub units_processed: u64,
    pub units_per_hour: f64,
    pub failures: u32,
    pub stop_reason: StopReason,
    pub per_resource: BTreeMap<String, u64>,
    pub breaks_taken: u32,
    pub resupply_trips: u64,
}

impl SessionSummary {
    pub fn new(stats: &SessionStats, elapsed: Duration, failures: u32, reason: StopReason) -> Self {
        Self {
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            units_processed: stats.units_processed,
            units_per_hour: stats.units_per_hour(elapsed),
            failures,
            stop_reason: reason,
            per_resource: stats.per_resource.clone(),
            breaks_taken: stats.breaks_taken,
            resupply_trips: stats.resupply_trips,
        }
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.duration_ms / 1000;
        writeln!(f, "stop reason: {}", self.stop_reason)?;
        writeln!(
            f,
            "duration: {:02}:{:02}:{:02}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60
        )?;
        writeln!(
            f,
            "units processed: {} ({:.1}/h)",
            self.units_processed, self.units_per_hour
        )?;
        writeln!(f, "failures: {}", self.failures)?;
        writeln!(
            f,
            "breaks: {}  resupply trips: {}",
            self.breaks_taken, self.resupply_trips
        )?;
        for (resource, units) in &self.per_resource {
            writeln!(f, "  {resource}: {units}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_accumulate_per_resource() {
        let mut stats = SessionStats::default();
        stats.record_units("ore", 3);
        stats.record_units("ore", 2);
        stats.record_units("fish", 1);
        assert_eq!(stats.units_processed, 6);
        assert_eq!(stats.per_resource.get("ore"), Some(&5));
        assert_eq!(stats.units_per_hour(Duration::ZERO), 0.0);
        assert_eq!(stats.units_per_hour(Duration::from_secs(1800)), 12.0);
    }

    #[test]
    fn summary_renders_reason_and_duration() {
        let mut stats = SessionStats::default();
        stats.record_units("ore", 10);
        let summary = SessionSummary::new(
            &stats,
            Duration::from_secs(3_725),
            2,
            StopReason::QueueComplete,
        );
        let text = summary.to_string();
        assert!(text.contains("stop reason: queue complete"));
        assert!(text.contains("duration: 01:02:05"));
        assert!(text.contains("units processed: 10"));
        assert!(text.contains("  ore: 10"));
    }
}
