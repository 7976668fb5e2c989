//! Step registry: resolves a step kind to its processor and wraps execution
//! with preconditions, status transitions, and log flushing.
//!
//! The registry is explicitly constructed and injected into the driver, no
//! global state. The live step list is mutated only here, through the status
//! transitions, and every transition is mirrored onto the event bus for
//! presentation subscribers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::context::ExecutionContext;
use crate::errors::StepError;
use crate::events::{EventBus, LogEntry};
use crate::outcome::ExecutionResult;
use crate::processors::{
    AnswerChallengeProcessor, BuildSimulationProcessor, GenerateReportProcessor,
    JudgeChallengeProcessor, QueryHistoryProcessor, QueryKnowledgeBaseProcessor, StepProcessor,
};
use crate::service::AnalysisService;
use crate::step::{Step, StepKind, StepStatus};

pub struct StepRegistry {
    processors: HashMap<StepKind, Arc<dyn StepProcessor>>,
    bus: EventBus,
    /// Optional hardening: bound the external call. `None` preserves the
    /// unbounded-call behavior, where a stalled call stalls the pipeline.
    step_timeout: Option<Duration>,
}

impl StepRegistry {
    pub fn new(bus: EventBus) -> Self {
        Self {
            processors: HashMap::new(),
            bus,
            step_timeout: None,
        }
    }

    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Idempotent upsert: a later registration for the same kind replaces
    /// the earlier one.
    pub fn register_processor(&mut self, processor: Arc<dyn StepProcessor>) {
        let kind = processor.kind();
        self.processors.insert(kind, processor);
        tracing::debug!(step = %kind, "registered processor");
    }

    /// Register the six standard processors against one service.
    pub fn register_default_processors(&mut self, service: Arc<dyn AnalysisService>) {
        self.register_processor(Arc::new(JudgeChallengeProcessor::new(service.clone())));
        self.register_processor(Arc::new(QueryHistoryProcessor::new(service.clone())));
        self.register_processor(Arc::new(QueryKnowledgeBaseProcessor::new(service.clone())));
        self.register_processor(Arc::new(BuildSimulationProcessor::new(service.clone())));
        self.register_processor(Arc::new(AnswerChallengeProcessor::new(service.clone())));
        self.register_processor(Arc::new(GenerateReportProcessor::new(service)));
    }

    pub fn has_processor(&self, kind: StepKind) -> bool {
        self.processors.contains_key(&kind)
    }

    /// Execute one step against the live step list.
    ///
    /// The protocol, in order:
    /// 1. Unresolvable kind → system log, failed result, no status mutation.
    /// 2. Failed precondition → warning log, failed result, no status
    ///    mutation; the step is never marked in-progress and the service is
    ///    never called.
    /// 3. Mark in-progress, log the start (with any operator hint), execute.
    /// 4. Success → mark completed with the payload, flush the result logs.
    /// 5. Failure → mark errored with the error payload, flush logs.
    /// 6. The result is returned unchanged in every case.
    pub async fn execute_step(
        &self,
        kind: StepKind,
        ctx: &ExecutionContext,
        steps: &mut [Step],
        journal: &mut Vec<LogEntry>,
    ) -> ExecutionResult {
        let Some(processor) = self.processors.get(&kind) else {
            self.log(
                journal,
                LogEntry::warning(
                    "Unknown step",
                    format!("No processor registered for '{}'", kind),
                ),
            );
            return ExecutionResult::failed(StepError::UnknownStep(kind).to_string());
        };

        if !processor.can_execute(ctx) {
            self.log(
                journal,
                LogEntry::warning(
                    "Step blocked",
                    format!("'{}' preconditions not met; not executing", kind),
                ),
            );
            return ExecutionResult::failed(
                StepError::Blocked {
                    kind,
                    reason: "preconditions not met".to_string(),
                }
                .to_string(),
            );
        }

        self.transition_in_progress(steps, kind);
        let started = match ctx.step_context.additional_info.as_deref() {
            Some(hint) => format!("Executing '{}' (operator hint: {})", kind, hint),
            None => format!("Executing '{}'", kind),
        };
        self.log(journal, LogEntry::step("Step started", started));

        let result = match self.step_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, processor.execute(ctx)).await {
                Ok(result) => result,
                Err(_) => ExecutionResult::failed(
                    StepError::ServiceTimeout {
                        seconds: timeout.as_secs(),
                    }
                    .to_string(),
                ),
            },
            None => processor.execute(ctx).await,
        };

        if result.success {
            self.transition_completed(steps, kind, &result);
        } else {
            self.transition_errored(steps, kind, &result);
        }
        for entry in &result.logs {
            self.log(journal, entry.clone());
        }

        result
    }

    fn log(&self, journal: &mut Vec<LogEntry>, entry: LogEntry) {
        journal.push(entry.clone());
        self.bus.emit_log(entry);
    }

    fn transition_in_progress(&self, steps: &mut [Step], kind: StepKind) {
        if let Some(step) = steps.iter_mut().find(|s| s.kind == kind) {
            step.begin();
            self.bus.emit_status(kind, StepStatus::InProgress, None);
        }
    }

    fn transition_completed(&self, steps: &mut [Step], kind: StepKind, result: &ExecutionResult) {
        if let Some(step) = steps.iter_mut().find(|s| s.kind == kind) {
            step.complete(result.result.clone());
            self.bus.emit_status(kind, step.status, step.result.clone());
        }
    }

    fn transition_errored(&self, steps: &mut [Step], kind: StepKind, result: &ExecutionResult) {
        if let Some(step) = steps.iter_mut().find(|s| s.kind == kind) {
            let payload = json!({
                "error": result.error.clone().unwrap_or_else(|| "unknown error".to_string()),
            });
            step.fail(payload);
            self.bus.emit_status(kind, StepStatus::Error, step.result.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::accumulator::AnalysisAccumulator;
    use crate::canned::{CannedAnalysisService, sample_entity};
    use crate::context::{AgentProfile, StepContext};
    use crate::step::pipeline_template;

    fn full_ctx() -> ExecutionContext {
        ExecutionContext::new(
            Some(sample_entity()),
            Some(AgentProfile::new("analyst")),
            AnalysisAccumulator::default(),
            StepContext::default(),
            0,
        )
    }

    #[test]
    fn test_register_processor_is_idempotent_upsert() {
        let service: Arc<dyn AnalysisService> = Arc::new(CannedAnalysisService::new());
        let mut registry = StepRegistry::new(EventBus::default());
        registry.register_processor(Arc::new(QueryHistoryProcessor::new(service.clone())));
        registry.register_processor(Arc::new(QueryHistoryProcessor::new(service)));
        assert_eq!(registry.processors.len(), 1);
        assert!(registry.has_processor(StepKind::QueryHistory));
    }

    #[tokio::test]
    async fn test_unknown_step_fails_without_status_mutation() {
        let registry = StepRegistry::new(EventBus::default());
        let mut steps = pipeline_template();
        let mut journal = Vec::new();

        let result = registry
            .execute_step(StepKind::QueryHistory, &full_ctx(), &mut steps, &mut journal)
            .await;

        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("query_history"));
        assert!(steps.iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(journal.len(), 1);
    }

    #[tokio::test]
    async fn test_blocked_precondition_never_marks_in_progress() {
        let mut registry = StepRegistry::new(EventBus::default());
        registry.register_default_processors(Arc::new(CannedAnalysisService::new()));
        let mut steps = pipeline_template();
        let mut journal = Vec::new();

        let mut ctx = full_ctx();
        ctx.agent = None;
        let result = registry
            .execute_step(StepKind::JudgeChallenge, &ctx, &mut steps, &mut journal)
            .await;

        assert!(!result.success);
        assert_eq!(steps[0].status, StepStatus::Pending);
        assert!(steps[0].result.is_none());
    }

    #[tokio::test]
    async fn test_success_marks_completed_and_flushes_logs() {
        let mut registry = StepRegistry::new(EventBus::default());
        registry.register_default_processors(Arc::new(CannedAnalysisService::new()));
        let mut steps = pipeline_template();
        let mut journal = Vec::new();

        let result = registry
            .execute_step(StepKind::JudgeChallenge, &full_ctx(), &mut steps, &mut journal)
            .await;

        assert!(result.success);
        assert_eq!(steps[0].status, StepStatus::Completed);
        assert!(steps[0].result.is_some());
        // Start log plus the processor's own entry.
        assert!(journal.len() >= 2);
    }

    #[tokio::test]
    async fn test_operator_hint_lands_in_start_log() {
        let mut registry = StepRegistry::new(EventBus::default());
        registry.register_default_processors(Arc::new(CannedAnalysisService::new()));
        let mut steps = pipeline_template();
        let mut journal = Vec::new();

        let mut ctx = full_ctx();
        ctx.step_context.additional_info = Some("focus on churn".to_string());
        registry
            .execute_step(StepKind::JudgeChallenge, &ctx, &mut steps, &mut journal)
            .await;

        assert!(
            journal
                .iter()
                .any(|e| e.description.contains("focus on churn"))
        );
    }
}
