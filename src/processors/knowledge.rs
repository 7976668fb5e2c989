use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::errors::StepError;
use crate::events::LogEntry;
use crate::outcome::ExecutionResult;
use crate::service::AnalysisService;
use crate::step::StepKind;

use super::StepProcessor;

/// Pulls domain knowledge relevant to the entity's industry and challenge.
pub struct QueryKnowledgeBaseProcessor {
    service: Arc<dyn AnalysisService>,
}

impl QueryKnowledgeBaseProcessor {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl StepProcessor for QueryKnowledgeBaseProcessor {
    fn kind(&self) -> StepKind {
        StepKind::QueryKnowledgeBase
    }

    async fn execute(&self, ctx: &ExecutionContext) -> ExecutionResult {
        let Some(subject) = ctx.subject.as_ref() else {
            return ExecutionResult::failed("subject entity missing from execution context");
        };
        match self.service.query_knowledge_base(subject).await {
            Ok(payload) => {
                let updated = ctx.accumulator.overlaid(self.kind(), payload.clone());
                ExecutionResult::completed(payload, updated).with_logs(vec![
                    LogEntry::step_success(
                        "Knowledge base queried",
                        format!(
                            "Collected domain knowledge for the {} challenge",
                            subject.industry.as_deref().unwrap_or("general")
                        ),
                    ),
                ])
            }
            Err(err) => {
                tracing::warn!(step = %self.kind(), error = %err, "knowledge base call failed");
                ExecutionResult::failed(StepError::ServiceCall(err.to_string()).to_string())
            }
        }
    }
}
