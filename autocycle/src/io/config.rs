//! Session configuration stored in `autocycle.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::detector::DetectorConfig;
use crate::core::governor::{BreakConfig, GovernorConfig, PacingConfig, SessionConfig};
use crate::core::task::TaskQueue;

pub const DEFAULT_CONFIG_FILE: &str = "autocycle.toml";

/// Runner configuration (TOML).
///
/// Edited by humans. Every field has a default, so a partial file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Skip supply trips at classification time; the resource is assumed on hand.
    pub resource_always_present: bool,

    /// Seed for the session PRNG. Drawn from entropy when unset.
    pub seed: Option<u64>,

    pub session: SessionConfig,
    pub breaks: BreakConfig,
    pub pacing: PacingConfig,
    pub detector: DetectorConfig,
    pub waits: WaitConfig,
    pub actions: ActionLabels,
    pub tasks: Vec<TaskSpec>,
}

/// Bounds for every wait a handler performs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WaitConfig {
    pub poll_ms: u64,
    /// How long an interaction may take to show an effect.
    pub interaction_timeout_ms: u64,
    /// How long one processing batch may run.
    pub processing_timeout_ms: u64,
    pub travel_timeout_ms: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_ms: 100,
            interaction_timeout_ms: 5_000,
            processing_timeout_ms: 60_000,
            travel_timeout_ms: 30_000,
        }
    }
}

impl WaitConfig {
    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn interaction_timeout(&self) -> Duration {
        Duration::from_millis(self.interaction_timeout_ms)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_millis(self.processing_timeout_ms)
    }

    pub fn travel_timeout(&self) -> Duration {
        Duration::from_millis(self.travel_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("waits.poll_ms", self.poll_ms),
            ("waits.interaction_timeout_ms", self.interaction_timeout_ms),
            ("waits.processing_timeout_ms", self.processing_timeout_ms),
            ("waits.travel_timeout_ms", self.travel_timeout_ms),
        ] {
            if value == 0 {
                return Err(anyhow!("{name} must be > 0"));
            }
        }
        if self.poll_ms > self.interaction_timeout_ms {
            return Err(anyhow!(
                "waits.poll_ms must be <= waits.interaction_timeout_ms"
            ));
        }
        Ok(())
    }
}

/// Labels passed to the interaction layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ActionLabels {
    pub supply: String,
    pub process: String,
    pub confirm: String,
}

impl Default for ActionLabels {
    fn default() -> Self {
        Self {
            supply: "Load Last Preset from".to_string(),
            process: "Cook".to_string(),
            confirm: "Confirm".to_string(),
        }
    }
}

impl ActionLabels {
    fn validate(&self) -> Result<()> {
        for (name, label) in [
            ("actions.supply", &self.supply),
            ("actions.process", &self.process),
            ("actions.confirm", &self.confirm),
        ] {
            if label.trim().is_empty() {
                return Err(anyhow!("{name} must not be empty"));
            }
        }
        Ok(())
    }
}

/// One `[[tasks]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSpec {
    pub resource: String,
    pub quantity: i64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            resource_always_present: false,
            seed: None,
            session: SessionConfig::default(),
            breaks: BreakConfig::default(),
            pacing: PacingConfig::default(),
            detector: DetectorConfig::default(),
            waits: WaitConfig::default(),
            actions: ActionLabels::default(),
            tasks: vec![TaskSpec {
                resource: "raw shark".to_string(),
                quantity: 28,
            }],
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        self.governor_config().validate()?;
        self.detector.validate()?;
        self.waits.validate()?;
        self.actions.validate()?;
        self.task_queue()?;
        Ok(())
    }

    pub fn governor_config(&self) -> GovernorConfig {
        GovernorConfig {
            session: self.session.clone(),
            breaks: self.breaks.clone(),
            pacing: self.pacing.clone(),
        }
    }

    /// Build the initial queue from `[[tasks]]`, rejecting bad entries.
    pub fn task_queue(&self) -> Result<TaskQueue> {
        let mut queue = TaskQueue::new();
        for (index, task) in self.tasks.iter().enumerate() {
            queue
                .enqueue(&task.resource, task.quantity)
                .map_err(|err| anyhow!("tasks[{index}]: {err}"))?;
        }
        Ok(queue)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = RunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunnerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
