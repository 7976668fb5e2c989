//! Step definitions for the analysis pipeline.
//!
//! This module provides:
//! - `StepKind` enum covering the closed set of pipeline stages
//! - `StepStatus` for the per-step state machine
//! - `Step` and `SubStep` live pipeline entries with ordered children
//! - `pipeline_template()` producing the canonical six-step sequence

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of pipeline stages, in canonical execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    JudgeChallenge,
    QueryHistory,
    QueryKnowledgeBase,
    BuildSimulation,
    AnswerChallenge,
    GenerateReport,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JudgeChallenge => "judge_challenge",
            Self::QueryHistory => "query_history",
            Self::QueryKnowledgeBase => "query_knowledge_base",
            Self::BuildSimulation => "build_simulation",
            Self::AnswerChallenge => "answer_challenge",
            Self::GenerateReport => "generate_report",
        }
    }

    /// All kinds in canonical execution order.
    pub fn ordered() -> [StepKind; 6] {
        [
            Self::JudgeChallenge,
            Self::QueryHistory,
            Self::QueryKnowledgeBase,
            Self::BuildSimulation,
            Self::AnswerChallenge,
            Self::GenerateReport,
        ]
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "judge_challenge" => Ok(Self::JudgeChallenge),
            "query_history" => Ok(Self::QueryHistory),
            "query_knowledge_base" => Ok(Self::QueryKnowledgeBase),
            "build_simulation" => Ok(Self::BuildSimulation),
            "answer_challenge" => Ok(Self::AnswerChallenge),
            "generate_report" => Ok(Self::GenerateReport),
            _ => Err(format!("Invalid step kind: {}", s)),
        }
    }
}

/// Per-step status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Terminal statuses end a step's lifecycle until a rerun or reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A nested sub-phase under a parent step.
///
/// Only the simulation stage carries sub-steps; each child extracts its own
/// slice of the parent's result payload, keyed by `result_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubStep {
    pub name: String,
    pub title: String,
    /// Key looked up in the parent's result payload on completion.
    pub result_key: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl SubStep {
    pub fn new(name: &str, title: &str, result_key: &str) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            result_key: result_key.to_string(),
            status: StepStatus::Pending,
            result: None,
        }
    }

    pub fn reset(&mut self) {
        self.status = StepStatus::Pending;
        self.result = None;
    }
}

/// A live pipeline stage entry.
///
/// `result` is present if and only if `status` is completed or error; the
/// transitions in the registry maintain that invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub kind: StepKind,
    pub title: String,
    pub description: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_steps: Vec<SubStep>,
}

impl Step {
    pub fn new(kind: StepKind, title: &str, description: &str) -> Self {
        Self {
            kind,
            title: title.to_string(),
            description: description.to_string(),
            status: StepStatus::Pending,
            result: None,
            sub_steps: Vec::new(),
        }
    }

    pub fn with_sub_steps(mut self, sub_steps: Vec<SubStep>) -> Self {
        self.sub_steps = sub_steps;
        self
    }

    pub fn has_sub_steps(&self) -> bool {
        !self.sub_steps.is_empty()
    }

    /// Restore the step (and its children) to the pristine pending state.
    pub fn reset(&mut self) {
        self.status = StepStatus::Pending;
        self.result = None;
        for sub in &mut self.sub_steps {
            sub.reset();
        }
    }

    /// Mark the step completed with its result payload.
    ///
    /// For a parent with sub-steps, each child first claims its slice of the
    /// payload, then the parent's status is derived: completed iff all
    /// children completed, otherwise in-progress while any child has a
    /// result.
    pub fn complete(&mut self, payload: Value) {
        if self.has_sub_steps() {
            for sub in &mut self.sub_steps {
                if let Some(slice) = payload.get(&sub.result_key) {
                    sub.result = Some(slice.clone());
                    sub.status = StepStatus::Completed;
                }
            }
            self.result = Some(payload);
            self.status = self.derived_status();
        } else {
            self.result = Some(payload);
            self.status = StepStatus::Completed;
        }
    }

    /// Mark the step errored with an error payload.
    pub fn fail(&mut self, payload: Value) {
        self.result = Some(payload);
        self.status = StepStatus::Error;
    }

    /// Mark the step in progress. Any stale result is dropped so the
    /// result-presence invariant holds.
    pub fn begin(&mut self) {
        self.result = None;
        self.status = StepStatus::InProgress;
    }

    fn derived_status(&self) -> StepStatus {
        if self.sub_steps.iter().all(|s| s.status == StepStatus::Completed) {
            StepStatus::Completed
        } else if self.sub_steps.iter().any(|s| s.result.is_some()) {
            StepStatus::InProgress
        } else {
            self.status
        }
    }
}

/// The canonical six-step pipeline template.
///
/// The live step list is instantiated from this at every (re)start and
/// restored verbatim by a full reset.
pub fn pipeline_template() -> Vec<Step> {
    vec![
        Step::new(
            StepKind::JudgeChallenge,
            "Judge challenge",
            "Assess whether the entity's challenge is suitable for automated analysis",
        ),
        Step::new(
            StepKind::QueryHistory,
            "Query history",
            "Retrieve prior analysis runs and outcomes for the entity",
        ),
        Step::new(
            StepKind::QueryKnowledgeBase,
            "Query knowledge base",
            "Pull domain knowledge relevant to the entity's industry and challenge",
        ),
        Step::new(
            StepKind::BuildSimulation,
            "Build simulation",
            "Construct the problem/hypothesis/metric simulation for the challenge",
        )
        .with_sub_steps(vec![
            SubStep::new("frame_problems", "Frame problems", "problems"),
            SubStep::new("draft_hypotheses", "Draft hypotheses", "hypotheses"),
            SubStep::new("bind_metrics", "Bind metrics", "metrics"),
        ]),
        Step::new(
            StepKind::AnswerChallenge,
            "Answer challenge",
            "Resolve the challenge against the simulation",
        ),
        Step::new(
            StepKind::GenerateReport,
            "Generate report",
            "Produce the final analysis report with findings and recommendations",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_kind_round_trip() {
        for kind in StepKind::ordered() {
            let parsed: StepKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_step_kind_rejects_unknown() {
        assert!("launch_rocket".parse::<StepKind>().is_err());
    }

    #[test]
    fn test_template_order_matches_canonical() {
        let template = pipeline_template();
        let kinds: Vec<StepKind> = template.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, StepKind::ordered().to_vec());
        assert!(template.iter().all(|s| s.status == StepStatus::Pending));
        assert!(template.iter().all(|s| s.result.is_none()));
    }

    #[test]
    fn test_only_simulation_has_sub_steps() {
        for step in pipeline_template() {
            assert_eq!(
                step.has_sub_steps(),
                step.kind == StepKind::BuildSimulation,
                "unexpected sub-steps on {}",
                step.kind
            );
        }
    }

    #[test]
    fn test_complete_without_children_is_direct() {
        let mut step = Step::new(StepKind::QueryHistory, "t", "d");
        step.complete(json!({"rows": []}));
        assert_eq!(step.status, StepStatus::Completed);
        assert!(step.result.is_some());
    }

    #[test]
    fn test_parent_completes_when_all_children_claim_results() {
        let mut step = pipeline_template().remove(3);
        step.complete(json!({
            "problems": [{"id": "p1"}],
            "hypotheses": [{"id": "h1"}],
            "metrics": [{"id": "m1"}],
        }));
        assert_eq!(step.status, StepStatus::Completed);
        assert!(step.sub_steps.iter().all(|s| s.status == StepStatus::Completed));
    }

    #[test]
    fn test_parent_stays_in_progress_with_partial_children() {
        let mut step = pipeline_template().remove(3);
        step.complete(json!({
            "problems": [{"id": "p1"}],
            "hypotheses": [{"id": "h1"}],
        }));
        assert_eq!(step.status, StepStatus::InProgress);
        assert_eq!(
            step.sub_steps.iter().filter(|s| s.result.is_some()).count(),
            2
        );
    }

    #[test]
    fn test_begin_drops_stale_result() {
        let mut step = Step::new(StepKind::JudgeChallenge, "t", "d");
        step.complete(json!({"ok": true}));
        step.begin();
        assert_eq!(step.status, StepStatus::InProgress);
        assert!(step.result.is_none());
    }

    #[test]
    fn test_reset_restores_children() {
        let mut step = pipeline_template().remove(3);
        step.complete(json!({
            "problems": [], "hypotheses": [], "metrics": [],
        }));
        step.reset();
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.result.is_none());
        assert!(step.sub_steps.iter().all(|s| s.result.is_none()));
    }
}
