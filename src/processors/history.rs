use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::errors::StepError;
use crate::events::LogEntry;
use crate::outcome::ExecutionResult;
use crate::service::AnalysisService;
use crate::step::StepKind;

use super::StepProcessor;

/// Retrieves prior analysis runs for the entity.
pub struct QueryHistoryProcessor {
    service: Arc<dyn AnalysisService>,
}

impl QueryHistoryProcessor {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl StepProcessor for QueryHistoryProcessor {
    fn kind(&self) -> StepKind {
        StepKind::QueryHistory
    }

    async fn execute(&self, ctx: &ExecutionContext) -> ExecutionResult {
        let Some(subject) = ctx.subject.as_ref() else {
            return ExecutionResult::failed("subject entity missing from execution context");
        };
        match self.service.query_history(subject).await {
            Ok(payload) => {
                let updated = ctx.accumulator.overlaid(self.kind(), payload.clone());
                ExecutionResult::completed(payload, updated).with_logs(vec![
                    LogEntry::step_success(
                        "History retrieved",
                        format!("Collected prior analysis runs for {}", subject.name),
                    ),
                ])
            }
            Err(err) => {
                tracing::warn!(step = %self.kind(), error = %err, "history call failed");
                ExecutionResult::failed(StepError::ServiceCall(err.to_string()).to_string())
            }
        }
    }
}
