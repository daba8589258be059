//! Fire-and-forget telemetry.
//!
//! Sinks return nothing. A sink that fails logs the failure and carries on,
//! so observability can never change what the loop does next.

use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::clock::Millis;
use crate::core::detector::RiskAssessment;
use crate::core::stats::SessionSummary;
use crate::core::types::{EmergencyReason, Event, Phase};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    PhaseChanged {
        at: Millis,
        from: Phase,
        to: Phase,
        event: Event,
    },
    ActionRecorded {
        at: Millis,
        kind: String,
        detail: String,
    },
    RiskAssessed {
        at: Millis,
        assessment: RiskAssessment,
        recommendations: Vec<String>,
    },
    BreakStarted {
        at: Millis,
        duration_ms: Millis,
    },
    BreakEnded {
        at: Millis,
    },
    EmergencyStop {
        at: Millis,
        reason: EmergencyReason,
    },
    TaskProgress {
        at: Millis,
        resource: String,
        completed: u32,
        target: u32,
    },
    SessionEnded {
        at: Millis,
        summary: SessionSummary,
    },
}

pub trait TelemetrySink {
    fn record(&mut self, event: &TelemetryEvent);
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&mut self, _event: &TelemetryEvent) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::PhaseChanged { from, to, event, .. } => {
                info!(%from, %to, ?event, "phase changed");
            }
            TelemetryEvent::RiskAssessed { assessment, .. } if assessment.has_any_pattern() => {
                warn!(risk = assessment.risk_score, "mechanical pattern risk");
            }
            TelemetryEvent::BreakStarted { duration_ms, .. } => {
                info!(duration_ms, "break started");
            }
            TelemetryEvent::BreakEnded { .. } => info!("break ended"),
            TelemetryEvent::EmergencyStop { reason, .. } => {
                warn!(%reason, "emergency stop");
            }
            TelemetryEvent::TaskProgress {
                resource,
                completed,
                target,
                ..
            } => {
                info!(%resource, completed, target, "task progress");
            }
            TelemetryEvent::SessionEnded { summary, .. } => {
                info!(
                    reason = %summary.stop_reason,
                    units = summary.units_processed,
                    failures = summary.failures,
                    "session ended"
                );
            }
            TelemetryEvent::ActionRecorded { .. } | TelemetryEvent::RiskAssessed { .. } => {}
        }
    }
}

/// One JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_event(&mut self, event: &TelemetryEvent) -> Result<()> {
        let line = serde_json::to_string(event).context("serialize telemetry event")?;
        writeln!(self.writer, "{line}").context("write telemetry line")?;
        self.writer.flush().context("flush telemetry")?;
        Ok(())
    }
}

impl<W: Write> TelemetrySink for JsonLinesSink<W> {
    fn record(&mut self, event: &TelemetryEvent) {
        if let Err(err) = self.write_event(event) {
            warn!(error = %format!("{err:#}"), "telemetry write failed");
        }
    }
}

/// Fan out to several sinks.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn TelemetrySink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Box<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl TelemetrySink for MultiSink {
    fn record(&mut self, event: &TelemetryEvent) {
        for sink in &mut self.sinks {
            sink.record(event);
        }
    }
}
