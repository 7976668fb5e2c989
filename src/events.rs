//! Engine event stream.
//!
//! The driver owns a single broadcast bus carrying tagged events; any number
//! of presentation subscribers can attach without the last-writer-wins
//! hazard of callback registration. Domain log entries are first-class data:
//! they are appended to the run journal in emission order and mirrored onto
//! the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::accumulator::AnalysisReport;
use crate::step::{StepKind, StepStatus};

/// Which part of the engine a log entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    /// Driver-level bookkeeping: starts, advances, halts, completion.
    System,
    /// Per-step progress emitted around processor execution.
    Step,
    /// Detail surfaced from an external service call.
    Service,
}

/// Severity attached to a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Info,
    Success,
    Warning,
    Error,
}

/// A human-readable journal entry, timestamped at emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub entry_type: LogType,
    pub title: String,
    pub description: String,
    pub status: LogStatus,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(
        entry_type: LogType,
        title: impl Into<String>,
        description: impl Into<String>,
        status: LogStatus,
    ) -> Self {
        Self {
            entry_type,
            title: title.into(),
            description: description.into(),
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn system(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(LogType::System, title, description, LogStatus::Info)
    }

    pub fn warning(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(LogType::System, title, description, LogStatus::Warning)
    }

    pub fn step(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(LogType::Step, title, description, LogStatus::Info)
    }

    pub fn step_success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(LogType::Step, title, description, LogStatus::Success)
    }

    pub fn step_error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(LogType::Step, title, description, LogStatus::Error)
    }
}

/// Tagged events broadcast to presentation subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EngineEvent {
    StepStatusChanged {
        kind: StepKind,
        status: StepStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    Log {
        entry: LogEntry,
    },
    PipelineCompleted {
        report: Option<AnalysisReport>,
        logs: Vec<LogEntry>,
    },
}

/// Clonable handle over the broadcast channel.
///
/// Emission never fails: with no subscribers attached the event is dropped,
/// which is the correct behavior for an engine that must run headless.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn emit_log(&self, entry: LogEntry) {
        self.emit(EngineEvent::Log { entry });
    }

    pub fn emit_status(&self, kind: StepKind, status: StepStatus, result: Option<Value>) {
        self.emit(EngineEvent::StepStatusChanged {
            kind,
            status,
            result,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
