//! Statistical self-audit over the loop's own action, timing and movement
//! history.
//!
//! Every assessment is recomputed from the bounded histories on demand and
//! is advisory only. Nothing here gates a transition.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::Hash;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::clock::Millis;
use crate::core::types::Position;

const ACTION_WINDOWS: std::ops::RangeInclusive<usize> = 3..=5;
const MOVEMENT_WINDOW: usize = 3;

const WEIGHT_ACTIONS: f64 = 0.30;
const WEIGHT_TIMING: f64 = 0.25;
const WEIGHT_MOVEMENT: f64 = 0.20;
const WEIGHT_FREQUENCY: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub action_capacity: usize,
    pub interval_capacity: usize,
    pub location_capacity: usize,
    /// Occurrences of one action loop that count as repetitive.
    pub action_repeat_threshold: usize,
    /// Occurrences of one movement loop that count as repetitive.
    pub movement_repeat_threshold: usize,
    pub min_actions: usize,
    pub min_intervals: usize,
    pub min_locations: usize,
    /// Intervals with a coefficient of variation below this look scripted.
    pub timing_cv_threshold: f64,
    pub max_actions_per_window: usize,
    pub frequency_window_ms: Millis,
    /// Start an early break once the risk score reaches this. Off when unset.
    pub risk_break_threshold: Option<f64>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            action_capacity: 50,
            interval_capacity: 20,
            location_capacity: 30,
            action_repeat_threshold: 5,
            movement_repeat_threshold: 3,
            min_actions: 10,
            min_intervals: 10,
            min_locations: 15,
            timing_cv_threshold: 0.1,
            max_actions_per_window: 60,
            frequency_window_ms: 60_000,
            risk_break_threshold: None,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.action_capacity < *ACTION_WINDOWS.end() {
            return Err(anyhow!(
                "detector.action_capacity must be >= {}",
                ACTION_WINDOWS.end()
            ));
        }
        if self.location_capacity < MOVEMENT_WINDOW {
            return Err(anyhow!(
                "detector.location_capacity must be >= {MOVEMENT_WINDOW}"
            ));
        }
        if self.interval_capacity < 2 {
            return Err(anyhow!("detector.interval_capacity must be >= 2"));
        }
        if self.action_repeat_threshold == 0 || self.movement_repeat_threshold == 0 {
            return Err(anyhow!("detector repeat thresholds must be > 0"));
        }
        if self.frequency_window_ms == 0 {
            return Err(anyhow!("detector.frequency_window_ms must be > 0"));
        }
        if let Some(threshold) = self.risk_break_threshold {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(anyhow!(
                    "detector.risk_break_threshold must be within (0, 1] (got {threshold})"
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub kind: String,
    pub detail: String,
    pub timestamp: Millis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub position: Position,
    pub timestamp: Millis,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub repetitive_actions: bool,
    pub suspicious_timing: bool,
    pub repetitive_movement: bool,
    pub excessive_frequency: bool,
    pub risk_score: f64,
}

impl RiskAssessment {
    fn from_flags(
        repetitive_actions: bool,
        suspicious_timing: bool,
        repetitive_movement: bool,
        excessive_frequency: bool,
    ) -> Self {
        let score = [
            (repetitive_actions, WEIGHT_ACTIONS),
            (suspicious_timing, WEIGHT_TIMING),
            (repetitive_movement, WEIGHT_MOVEMENT),
            (excessive_frequency, WEIGHT_FREQUENCY),
        ]
        .iter()
        .filter(|(flag, _)| *flag)
        .map(|(_, weight)| weight)
        .sum::<f64>();
        Self {
            repetitive_actions,
            suspicious_timing,
            repetitive_movement,
            excessive_frequency,
            risk_score: score.clamp(0.0, 1.0),
        }
    }

    pub fn has_any_pattern(&self) -> bool {
        self.repetitive_actions
            || self.suspicious_timing
            || self.repetitive_movement
            || self.excessive_frequency
    }
}

/// Snapshot of what the detector has seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorStats {
    pub recorded_actions: usize,
    pub action_counts: BTreeMap<String, u64>,
    pub mean_interval_ms: f64,
    pub recorded_locations: usize,
    pub assessment: RiskAssessment,
}

pub struct AntiPatternDetector {
    config: DetectorConfig,
    actions: VecDeque<ActionRecord>,
    intervals: VecDeque<Millis>,
    locations: VecDeque<LocationRecord>,
    recent: VecDeque<Millis>,
    last_seen: HashMap<String, Millis>,
    action_counts: BTreeMap<String, u64>,
}

impl AntiPatternDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            actions: VecDeque::new(),
            intervals: VecDeque::new(),
            locations: VecDeque::new(),
            recent: VecDeque::new(),
            last_seen: HashMap::new(),
            action_counts: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Append an action. The gap since the previous action of the same kind
    /// feeds the timing history.
    pub fn record_action(&mut self, kind: &str, detail: &str, timestamp: Millis) {
        push_bounded(
            &mut self.actions,
            ActionRecord {
                kind: kind.to_string(),
                detail: detail.to_string(),
                timestamp,
            },
            self.config.action_capacity,
        );
        *self.action_counts.entry(kind.to_string()).or_default() += 1;

        if let Some(previous) = self.last_seen.insert(kind.to_string(), timestamp) {
            push_bounded(
                &mut self.intervals,
                timestamp.saturating_sub(previous),
                self.config.interval_capacity,
            );
        }

        self.recent.push_back(timestamp);
        self.prune_recent(timestamp);
        while self.recent.len() > self.config.max_actions_per_window + 1 {
            self.recent.pop_front();
        }
    }

    pub fn record_location(&mut self, x: i32, y: i32, timestamp: Millis) {
        push_bounded(
            &mut self.locations,
            LocationRecord {
                position: Position::new(x, y),
                timestamp,
            },
            self.config.location_capacity,
        );
    }

    pub fn analyze_patterns(&self, now: Millis) -> RiskAssessment {
        let assessment = RiskAssessment::from_flags(
            self.detect_repetitive_actions(),
            self.detect_suspicious_timing(),
            self.detect_repetitive_movement(),
            self.detect_excessive_frequency(now),
        );
        if assessment.has_any_pattern() {
            debug!(
                risk = assessment.risk_score,
                actions = assessment.repetitive_actions,
                timing = assessment.suspicious_timing,
                movement = assessment.repetitive_movement,
                frequency = assessment.excessive_frequency,
                "mechanical pattern detected"
            );
        }
        assessment
    }

    pub fn recommendations(&self, assessment: &RiskAssessment) -> Vec<String> {
        let mut out = Vec::new();
        if assessment.repetitive_actions {
            out.push("vary action sequences with occasional pauses or detours".to_string());
        }
        if assessment.suspicious_timing {
            out.push("widen the delay range between actions".to_string());
        }
        if assessment.repetitive_movement {
            out.push("vary movement paths".to_string());
        }
        if assessment.excessive_frequency {
            out.push("slow down: too many actions per minute".to_string());
        }
        if assessment.risk_score > 0.7 {
            out.push("high risk: take a long break or stop the session".to_string());
        } else if assessment.risk_score > 0.4 {
            out.push("medium risk: increase randomization and break more often".to_string());
        }
        out
    }

    pub fn statistics(&self, now: Millis) -> DetectorStats {
        DetectorStats {
            recorded_actions: self.actions.len(),
            action_counts: self.action_counts.clone(),
            mean_interval_ms: mean(&self.intervals).unwrap_or(0.0),
            recorded_locations: self.locations.len(),
            assessment: self.analyze_patterns(now),
        }
    }

    pub fn clear_history(&mut self) {
        self.actions.clear();
        self.intervals.clear();
        self.locations.clear();
        self.recent.clear();
        self.last_seen.clear();
        self.action_counts.clear();
    }

    fn detect_repetitive_actions(&self) -> bool {
        if self.actions.len() < self.config.min_actions {
            return false;
        }
        let kinds: Vec<&str> = self.actions.iter().map(|a| a.kind.as_str()).collect();
        ACTION_WINDOWS
            .clone()
            .any(|len| max_loop_occurrences(&kinds, len) >= self.config.action_repeat_threshold)
    }

    fn detect_suspicious_timing(&self) -> bool {
        if self.intervals.len() < self.config.min_intervals {
            return false;
        }
        coefficient_of_variation(&self.intervals)
            .is_some_and(|cv| cv < self.config.timing_cv_threshold)
    }

    fn detect_repetitive_movement(&self) -> bool {
        if self.locations.len() < self.config.min_locations {
            return false;
        }
        let points: Vec<Position> = self.locations.iter().map(|l| l.position).collect();
        max_loop_occurrences(&points, MOVEMENT_WINDOW) >= self.config.movement_repeat_threshold
    }

    fn detect_excessive_frequency(&self, now: Millis) -> bool {
        let since = now.saturating_sub(self.config.frequency_window_ms);
        let count = self.recent.iter().filter(|ts| **ts > since).count();
        count > self.config.max_actions_per_window
    }

    fn prune_recent(&mut self, now: Millis) {
        let since = now.saturating_sub(self.config.frequency_window_ms);
        while self.recent.front().is_some_and(|ts| *ts <= since) {
            self.recent.pop_front();
        }
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, value: T, capacity: usize) {
    buffer.push_back(value);
    while buffer.len() > capacity {
        buffer.pop_front();
    }
}

/// Most frequent contiguous window of `len` items, counting rotations of the
/// same cycle (`ABC`, `BCA`, `CAB`) as one loop.
fn max_loop_occurrences<T: Clone + Ord + Hash>(items: &[T], len: usize) -> usize {
    if len == 0 || items.len() < len {
        return 0;
    }
    let mut counts: HashMap<Vec<T>, usize> = HashMap::new();
    for window in items.windows(len) {
        *counts.entry(canonical_rotation(window)).or_default() += 1;
    }
    counts.into_values().max().unwrap_or(0)
}

fn canonical_rotation<T: Clone + Ord>(window: &[T]) -> Vec<T> {
    (0..window.len())
        .map(|shift| {
            let mut rotated = window.to_vec();
            rotated.rotate_left(shift);
            rotated
        })
        .min()
        .unwrap_or_default()
}

fn mean(values: &VecDeque<Millis>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().map(|v| *v as f64).sum();
    Some(sum / values.len() as f64)
}

/// Population standard deviation over mean. `None` for an all-zero history.
fn coefficient_of_variation(values: &VecDeque<Millis>) -> Option<f64> {
    let mean = mean(values)?;
    if mean == 0.0 {
        return None;
    }
    let variance = values
        .iter()
        .map(|v| (*v as f64 - mean).powi(2))
        .sum::<f64>()
        / values.len() as f64;
    Some(variance.sqrt() / mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> AntiPatternDetector {
        AntiPatternDetector::new(DetectorConfig::default())
    }

    fn record_kinds(detector: &mut AntiPatternDetector, kinds: &[&str], gaps: &[Millis]) {
        let mut ts = 0;
        for (i, kind) in kinds.iter().enumerate() {
            ts += gaps[i % gaps.len()];
            detector.record_action(kind, "", ts);
        }
    }

    #[test]
    fn repeating_three_action_loop_is_flagged() {
        let mut detector = fresh();
        let kinds = ["A", "B", "C", "A", "B", "C", "A", "B", "C", "A", "B", "C", "A"];
        record_kinds(&mut detector, &kinds, &[700, 1900, 1100, 2600]);

        let assessment = detector.analyze_patterns(20_000);
        assert!(assessment.repetitive_actions);
    }

    #[test]
    fn short_or_varied_action_history_is_not_flagged() {
        let mut detector = fresh();
        record_kinds(&mut detector, &["A", "B", "C", "A", "B", "C"], &[1000]);
        assert!(!detector.analyze_patterns(10_000).repetitive_actions);

        let mut detector = fresh();
        let kinds = ["A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L"];
        record_kinds(&mut detector, &kinds, &[1000]);
        assert!(!detector.analyze_patterns(20_000).repetitive_actions);
    }

    #[test]
    fn varying_intervals_are_not_suspicious() {
        let mut detector = fresh();
        let mut ts = 0;
        for i in 0..21 {
            ts += 500 + (i % 5) * 400;
            detector.record_action("process", "", ts);
        }
        let assessment = detector.analyze_patterns(ts);
        assert!(!assessment.suspicious_timing);
        let cv = coefficient_of_variation(&detector.intervals).expect("cv");
        assert!(cv > 0.1, "cv = {cv}");
    }

    #[test]
    fn metronomic_intervals_are_suspicious() {
        let mut detector = fresh();
        let mut ts = 0;
        for i in 0..15 {
            ts += 1000 + (i % 2) * 10;
            detector.record_action("process", "", ts);
        }
        assert!(detector.analyze_patterns(ts).suspicious_timing);
    }

    #[test]
    fn intervals_are_per_kind() {
        let mut detector = fresh();
        detector.record_action("travel", "", 1_000);
        detector.record_action("process", "", 1_500);
        detector.record_action("travel", "", 4_000);
        assert_eq!(detector.intervals.iter().copied().collect::<Vec<_>>(), vec![3_000]);
    }

    #[test]
    fn movement_loop_is_flagged() {
        let mut detector = fresh();
        let route = [(10, 10), (20, 20), (30, 30)];
        for i in 0..15 {
            let (x, y) = route[i % route.len()];
            detector.record_location(x, y, i as Millis * 1000);
        }
        assert!(detector.analyze_patterns(15_000).repetitive_movement);

        let mut detector = fresh();
        for i in 0..15 {
            detector.record_location(i, i * 2, i as Millis * 1000);
        }
        assert!(!detector.analyze_patterns(15_000).repetitive_movement);
    }

    #[test]
    fn excessive_frequency_counts_trailing_window_only() {
        let mut detector = fresh();
        for i in 0..61 {
            detector.record_action(&format!("k{i}"), "", 1_000 + i * 500);
        }
        assert!(detector.analyze_patterns(31_000).excessive_frequency);
        assert!(!detector.analyze_patterns(200_000).excessive_frequency);

        let mut detector = fresh();
        for i in 0..60 {
            detector.record_action(&format!("k{i}"), "", 1_000 + i * 500);
        }
        assert!(!detector.analyze_patterns(31_000).excessive_frequency);
    }

    #[test]
    fn risk_score_is_weighted_and_clamped() {
        let none = RiskAssessment::from_flags(false, false, false, false);
        assert_eq!(none.risk_score, 0.0);
        assert!(!none.has_any_pattern());

        let actions_only = RiskAssessment::from_flags(true, false, false, false);
        assert!((actions_only.risk_score - 0.30).abs() < 1e-9);

        let movement_and_timing = RiskAssessment::from_flags(false, true, true, false);
        assert!((movement_and_timing.risk_score - 0.45).abs() < 1e-9);

        let all = RiskAssessment::from_flags(true, true, true, true);
        assert!((all.risk_score - 1.0).abs() < 1e-9);
        assert!(all.risk_score <= 1.0);
    }

    #[test]
    fn recommendations_follow_flags_and_score() {
        let detector = fresh();
        let all = RiskAssessment::from_flags(true, true, true, true);
        let recs = detector.recommendations(&all);
        assert_eq!(recs.len(), 5);
        assert!(recs.last().expect("risk line").starts_with("high risk"));

        let medium = RiskAssessment::from_flags(true, true, false, false);
        let recs = detector.recommendations(&medium);
        assert!(recs.iter().any(|r| r.starts_with("medium risk")));

        assert!(detector.recommendations(&RiskAssessment::default()).is_empty());
    }

    #[test]
    fn histories_are_bounded_and_clearable() {
        let mut detector = fresh();
        for i in 0..80 {
            detector.record_action("process", "cook", i * 1_000);
            detector.record_location(i as i32, 0, i * 1_000);
        }
        let stats = detector.statistics(80_000);
        assert_eq!(stats.recorded_actions, 50);
        assert_eq!(stats.recorded_locations, 30);
        assert_eq!(stats.action_counts.get("process"), Some(&80));
        assert_eq!(stats.mean_interval_ms, 1_000.0);

        detector.clear_history();
        let stats = detector.statistics(80_000);
        assert_eq!(stats.recorded_actions, 0);
        assert!(stats.action_counts.is_empty());
        assert_eq!(stats.assessment, RiskAssessment::default());
    }

    #[test]
    fn rotations_collapse_to_one_loop() {
        let items = ["B", "C", "A"];
        assert_eq!(canonical_rotation(&items), vec!["A", "B", "C"]);
        assert_eq!(max_loop_occurrences(&["A", "B", "C", "A"], 3), 2);
        assert_eq!(max_loop_occurrences(&["A", "B"], 3), 0);
    }

    #[test]
    fn validate_rejects_out_of_range_risk_threshold() {
        let config = DetectorConfig {
            risk_break_threshold: Some(1.5),
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(DetectorConfig::default().validate().is_ok());
    }
}
