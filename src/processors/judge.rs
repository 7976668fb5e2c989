//! Suitability judgment: the entry gate of the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::errors::StepError;
use crate::events::LogEntry;
use crate::outcome::ExecutionResult;
use crate::service::AnalysisService;
use crate::step::StepKind;

use super::StepProcessor;

pub struct JudgeChallengeProcessor {
    service: Arc<dyn AnalysisService>,
}

impl JudgeChallengeProcessor {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl StepProcessor for JudgeChallengeProcessor {
    fn kind(&self) -> StepKind {
        StepKind::JudgeChallenge
    }

    async fn execute(&self, ctx: &ExecutionContext) -> ExecutionResult {
        let Some(subject) = ctx.subject.as_ref() else {
            return ExecutionResult::failed("subject entity missing from execution context");
        };
        match self.service.judge_challenge(subject).await {
            Ok(payload) => {
                // Absent verdict counts as suitable; only an explicit false gates.
                let suitable = payload
                    .get("verification_pass")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                let updated = ctx.accumulator.overlaid(self.kind(), payload.clone());
                if suitable {
                    ExecutionResult::completed(payload, updated).with_logs(vec![
                        LogEntry::step_success(
                            "Challenge judged suitable",
                            format!("'{}' passed the suitability check", subject.challenge),
                        ),
                    ])
                } else {
                    let reason = payload
                        .get("reason")
                        .and_then(Value::as_str)
                        .unwrap_or("entity unsuitable for analysis")
                        .to_string();
                    // A deliberate business decision, not a failure: the step
                    // did useful work and the pipeline stops here.
                    ExecutionResult::halted(payload, updated).with_logs(vec![
                        LogEntry::step(
                            "Challenge judged unsuitable",
                            format!("Pipeline gated: {}", reason),
                        ),
                    ])
                }
            }
            Err(err) => {
                tracing::warn!(step = %self.kind(), error = %err, "judge call failed");
                ExecutionResult::failed(StepError::ServiceCall(err.to_string()).to_string())
            }
        }
    }
}
