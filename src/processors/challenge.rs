//! Challenge resolution against the built simulation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::errors::StepError;
use crate::events::LogEntry;
use crate::outcome::ExecutionResult;
use crate::service::AnalysisService;
use crate::step::StepKind;

use super::StepProcessor;

/// Overlays the challenge answer onto the existing simulation result.
pub struct AnswerChallengeProcessor {
    service: Arc<dyn AnalysisService>,
}

impl AnswerChallengeProcessor {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl StepProcessor for AnswerChallengeProcessor {
    fn kind(&self) -> StepKind {
        StepKind::AnswerChallenge
    }

    async fn execute(&self, ctx: &ExecutionContext) -> ExecutionResult {
        let Some(subject) = ctx.subject.as_ref() else {
            return ExecutionResult::failed("subject entity missing from execution context");
        };
        // The simulation must exist before the challenge can be answered.
        let Some(simulation) = ctx.accumulator.simulation_result.clone() else {
            return ExecutionResult::failed(StepError::NoSimulationResult.to_string());
        };
        match self.service.answer_challenge(subject, &simulation).await {
            Ok(payload) => {
                // Shallow overlay onto the simulation key: the answer fields
                // join the simulation, nothing is erased.
                let updated = ctx.accumulator.overlaid(self.kind(), payload.clone());
                ExecutionResult::completed(payload, updated).with_logs(vec![
                    LogEntry::step_success(
                        "Challenge answered",
                        format!("Resolved '{}' against the simulation", subject.challenge),
                    ),
                ])
            }
            Err(err) => {
                tracing::warn!(step = %self.kind(), error = %err, "answer call failed");
                ExecutionResult::failed(StepError::ServiceCall(err.to_string()).to_string())
            }
        }
    }
}
