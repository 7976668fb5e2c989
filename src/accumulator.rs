//! The monotonically growing analysis record passed forward through the
//! pipeline, plus the values derived from it (simulation stats, the final
//! report).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::context::BusinessEntity;
use crate::step::StepKind;

/// Confidence assumed when the service omits a score.
pub const DEFAULT_CONFIDENCE: f64 = 75.0;

/// The running record of all stage results.
///
/// Invariant: once a stage key is populated by a success, later stages may
/// read it but never erase it; a stage replaces only its own key via a
/// shallow overlay of the prior value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisAccumulator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<BusinessEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_challenge_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_history_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_knowledge_base_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_report_result: Option<Value>,
}

impl AnalysisAccumulator {
    /// A fresh accumulator carrying only the subject reference, the shape a
    /// full reset re-seeds.
    pub fn seeded(subject: Option<BusinessEntity>) -> Self {
        Self {
            subject,
            ..Self::default()
        }
    }

    /// Read a stage's populated result, if any.
    pub fn stage_result(&self, kind: StepKind) -> Option<&Value> {
        match kind {
            StepKind::JudgeChallenge => self.judge_challenge_result.as_ref(),
            StepKind::QueryHistory => self.query_history_result.as_ref(),
            StepKind::QueryKnowledgeBase => self.query_knowledge_base_result.as_ref(),
            StepKind::BuildSimulation | StepKind::AnswerChallenge => {
                self.simulation_result.as_ref()
            }
            StepKind::GenerateReport => self.generate_report_result.as_ref(),
        }
    }

    /// Return a copy with `kind`'s own key replaced by a shallow overlay of
    /// the prior value and `patch`. All other keys are carried unchanged.
    pub fn overlaid(&self, kind: StepKind, patch: Value) -> Self {
        let mut next = self.clone();
        let slot = match kind {
            StepKind::JudgeChallenge => &mut next.judge_challenge_result,
            StepKind::QueryHistory => &mut next.query_history_result,
            StepKind::QueryKnowledgeBase => &mut next.query_knowledge_base_result,
            StepKind::BuildSimulation | StepKind::AnswerChallenge => {
                &mut next.simulation_result
            }
            StepKind::GenerateReport => &mut next.generate_report_result,
        };
        *slot = Some(match slot.take() {
            Some(prior) => shallow_overlay(&prior, &patch),
            None => patch,
        });
        next
    }

    /// Fold another accumulator's populated keys into this one. Keys the
    /// other side left empty are untouched, so the merge is monotonic.
    pub fn merge_from(&mut self, other: AnalysisAccumulator) {
        if other.subject.is_some() {
            self.subject = other.subject;
        }
        for (slot, incoming) in [
            (&mut self.judge_challenge_result, other.judge_challenge_result),
            (&mut self.query_history_result, other.query_history_result),
            (
                &mut self.query_knowledge_base_result,
                other.query_knowledge_base_result,
            ),
            (&mut self.simulation_result, other.simulation_result),
            (&mut self.generate_report_result, other.generate_report_result),
        ] {
            if incoming.is_some() {
                *slot = incoming;
            }
        }
    }
}

/// Shallow JSON-object overlay: `patch` keys win, `base` keys survive.
/// Non-object inputs resolve to `patch`.
pub fn shallow_overlay(base: &Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            let mut merged: Map<String, Value> = base.clone();
            for (k, v) in patch {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        _ => patch.clone(),
    }
}

/// Counts derived from a simulation payload on build success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStats {
    pub problem_count: usize,
    pub hypothesis_count: usize,
    pub metric_count: usize,
    pub insight_count: usize,
    pub recommendation_count: usize,
    pub next_step_count: usize,
    pub status_summary: String,
}

impl SimulationStats {
    pub fn from_payload(payload: &Value) -> Self {
        let count = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0)
        };
        let problem_count = count("problems");
        let hypothesis_count = count("hypotheses");
        let metric_count = count("metrics");
        let insight_count = count("insights");
        let recommendation_count = count("recommendations");
        let next_step_count = count("next_steps");
        let status_summary = format!(
            "{} problems, {} hypotheses, {} metrics, {} insights, {} recommendations, {} next steps",
            problem_count,
            hypothesis_count,
            metric_count,
            insight_count,
            recommendation_count,
            next_step_count
        );
        Self {
            problem_count,
            hypothesis_count,
            metric_count,
            insight_count,
            recommendation_count,
            next_step_count,
            status_summary,
        }
    }

    pub fn to_value(&self) -> Value {
        json!(self)
    }
}

/// The final analysis report derived from the report stage's payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub confidence_score: f64,
    pub is_logical: bool,
}

impl AnalysisReport {
    /// Derive the report, defaulting an absent confidence to
    /// [`DEFAULT_CONFIDENCE`]. `is_logical` is a strict comparison, so a
    /// defaulted score is never considered logical.
    pub fn from_payload(payload: &Value) -> Self {
        let confidence_score = payload
            .get("confidence_score")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_CONFIDENCE);
        let strings = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };
        Self {
            summary: payload
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            findings: strings("findings"),
            recommendations: strings("recommendations"),
            confidence_score,
            is_logical: confidence_score > DEFAULT_CONFIDENCE,
        }
    }
}
