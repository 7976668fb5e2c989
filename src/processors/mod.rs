//! Step processors: the executable behavior bound to each pipeline stage.
//!
//! Every processor is a state-free transformer with the same shape: call the
//! analysis service once, normalize the payload, overlay it into the
//! accumulator, emit log entries, and decide whether the pipeline continues.
//! Service failures are caught here and normalized into `ExecutionResult`;
//! nothing propagates to the registry as an error.

mod challenge;
mod history;
mod judge;
mod knowledge;
mod report;
mod simulation;

pub use challenge::AnswerChallengeProcessor;
pub use history::QueryHistoryProcessor;
pub use judge::JudgeChallengeProcessor;
pub use knowledge::QueryKnowledgeBaseProcessor;
pub use report::GenerateReportProcessor;
pub use simulation::BuildSimulationProcessor;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::outcome::ExecutionResult;
use crate::step::StepKind;

/// The contract every pipeline stage implements.
#[async_trait]
pub trait StepProcessor: Send + Sync {
    /// The stage this processor executes.
    fn kind(&self) -> StepKind;

    /// Precondition check. The default requires the subject entity and the
    /// active agent; stages with extra requirements override and extend it.
    /// A `false` here means the service is never called.
    fn can_execute(&self, ctx: &ExecutionContext) -> bool {
        ctx.subject.is_some() && ctx.agent.is_some()
    }

    /// Perform exactly one external call and fold the outcome into an
    /// `ExecutionResult`. Must not return early with a panic or error —
    /// failures are normalized into the result.
    async fn execute(&self, ctx: &ExecutionContext) -> ExecutionResult;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::accumulator::AnalysisAccumulator;
    use crate::canned::{CannedAnalysisService, sample_entity};
    use crate::context::{AgentProfile, StepContext};

    fn ctx_with(accumulator: AnalysisAccumulator) -> ExecutionContext {
        ExecutionContext::new(
            Some(sample_entity()),
            Some(AgentProfile::new("analyst")),
            accumulator,
            StepContext::default(),
            0,
        )
    }

    #[test]
    fn test_default_precondition_requires_subject_and_agent() {
        let service = Arc::new(CannedAnalysisService::new());
        let processor = QueryHistoryProcessor::new(service);

        let mut ctx = ctx_with(AnalysisAccumulator::default());
        assert!(processor.can_execute(&ctx));

        ctx.agent = None;
        assert!(!processor.can_execute(&ctx));

        ctx.agent = Some(AgentProfile::new("analyst"));
        ctx.subject = None;
        assert!(!processor.can_execute(&ctx));
    }

    #[test]
    fn test_report_precondition_also_requires_simulation() {
        let service = Arc::new(CannedAnalysisService::new());
        let processor = GenerateReportProcessor::new(service);

        let ctx = ctx_with(AnalysisAccumulator::default());
        assert!(!processor.can_execute(&ctx));

        let mut acc = AnalysisAccumulator::default();
        acc.simulation_result = Some(json!({"problems": []}));
        let ctx = ctx_with(acc);
        assert!(processor.can_execute(&ctx));
    }
}
