//! The result a processor hands back from one execution attempt.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::accumulator::AnalysisAccumulator;
use crate::events::LogEntry;

/// What the pipeline should do after the current step settles.
///
/// `Jump` is honored by the driver (clamped to the step range) but unused by
/// the shipped processors; default sequencing never emits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Continuation {
    Continue,
    Halt,
    Jump(usize),
}

/// Outcome of a single step execution.
///
/// `success` and `continuation` are orthogonal: a gate rejection is a
/// successful execution that halts (`success: true`, `Halt`), while a
/// service failure is `success: false`, `Halt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub continuation: Continuation,
    /// Log entries the registry flushes after the status transition.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<LogEntry>,
    /// Accumulator with this step's key merged in; the driver folds it into
    /// the running record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<AnalysisAccumulator>,
}

impl ExecutionResult {
    /// Successful execution, pipeline continues.
    pub fn completed(result: Value, updated: AnalysisAccumulator) -> Self {
        Self {
            success: true,
            result,
            error: None,
            continuation: Continuation::Continue,
            logs: Vec::new(),
            updated: Some(updated),
        }
    }

    /// Successful execution that deliberately halts the pipeline (a gate).
    pub fn halted(result: Value, updated: AnalysisAccumulator) -> Self {
        Self {
            success: true,
            result,
            error: None,
            continuation: Continuation::Halt,
            logs: Vec::new(),
            updated: Some(updated),
        }
    }

    /// Failed execution; always halts.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: Value::Null,
            error: Some(error.into()),
            continuation: Continuation::Halt,
            logs: Vec::new(),
            updated: None,
        }
    }

    pub fn with_logs(mut self, logs: Vec<LogEntry>) -> Self {
        self.logs = logs;
        self
    }

    /// A failure caused by a deliberate gate is distinguished from a service
    /// failure by `success`.
    pub fn is_gate_halt(&self) -> bool {
        self.success && self.continuation == Continuation::Halt
    }
}
