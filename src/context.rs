//! Execution inputs: the subject entity, the active agent, and the per-step
//! and per-attempt context records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::accumulator::AnalysisAccumulator;

/// The business entity under analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessEntity {
    pub id: Uuid,
    pub name: String,
    /// The challenge statement the pipeline analyzes.
    pub challenge: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    /// Opaque entity profile handed through to the analysis service.
    #[serde(default)]
    pub profile: Value,
}

impl BusinessEntity {
    pub fn new(name: &str, challenge: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            challenge: challenge.to_string(),
            industry: None,
            profile: Value::Null,
        }
    }

    pub fn with_industry(mut self, industry: &str) -> Self {
        self.industry = Some(industry.to_string());
        self
    }

    pub fn with_profile(mut self, profile: Value) -> Self {
        self.profile = profile;
        self
    }
}

/// The agent identity a pipeline run executes under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl AgentProfile {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            role: None,
        }
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }
}

/// Per-index retry and approval state.
///
/// Created lazily on first need, keyed by step index, and cleared only by a
/// full reset. `manual_approval` is tri-state: `None` means the gate was
/// never armed, `Some(false)` means the step awaits approval, `Some(true)`
/// means the operator approved it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_approval: Option<bool>,
    #[serde(default)]
    pub retry_count: u32,
}

impl StepContext {
    pub fn awaiting_approval(&self) -> bool {
        self.manual_approval == Some(false)
    }
}

/// Everything a processor sees for one execution attempt.
///
/// Constructed fresh per attempt from the driver's current state and
/// discarded when the call returns; never persisted.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub subject: Option<BusinessEntity>,
    pub agent: Option<AgentProfile>,
    pub accumulator: AnalysisAccumulator,
    pub step_context: StepContext,
    pub step_index: usize,
}

impl ExecutionContext {
    pub fn new(
        subject: Option<BusinessEntity>,
        agent: Option<AgentProfile>,
        accumulator: AnalysisAccumulator,
        step_context: StepContext,
        step_index: usize,
    ) -> Self {
        Self {
            subject,
            agent,
            accumulator,
            step_context,
            step_index,
        }
    }
}
