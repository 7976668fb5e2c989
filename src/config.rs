//! Engine configuration.
//!
//! Settings load from an optional `scrutiny.toml` and are overridden by CLI
//! flags. Everything has a sensible default so the engine runs with no file
//! present.
//!
//! ```toml
//! tick_interval_ms = 1000
//! mode = "auto"
//! step_timeout_secs = 120
//! event_capacity = 256
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "scrutiny.toml";

/// Progression mode for the pipeline.
///
/// | Mode     | Behavior                                            |
/// |----------|-----------------------------------------------------|
/// | `Auto`   | Steps advance as soon as the previous one completes |
/// | `Manual` | Every transition waits for operator approval        |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    #[default]
    Auto,
    Manual,
}

impl PipelineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Milliseconds between scheduler ticks. `0` disables the ticker
    /// entirely; the embedder drives cycles by calling `tick()` directly.
    pub tick_interval_ms: u64,
    /// Initial progression mode.
    pub mode: PipelineMode,
    /// Optional bound on each external call. Absent by default: a stalled
    /// call stalls the pipeline, which operators observe and act on.
    pub step_timeout_secs: Option<u64>,
    /// Broadcast buffer size for the event bus.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            mode: PipelineMode::Auto,
            step_timeout_secs: None,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load `scrutiny.toml` from `dir` if present, defaults otherwise.
    pub fn load_or_default(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "config file unreadable, using defaults");
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }
}
