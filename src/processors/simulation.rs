//! Simulation construction, the only stage with nested sub-phases.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::accumulator::{SimulationStats, shallow_overlay};
use crate::context::ExecutionContext;
use crate::errors::StepError;
use crate::events::LogEntry;
use crate::outcome::ExecutionResult;
use crate::service::AnalysisService;
use crate::step::StepKind;

use super::StepProcessor;

/// Builds the problem/hypothesis/metric simulation and derives its counts.
pub struct BuildSimulationProcessor {
    service: Arc<dyn AnalysisService>,
}

impl BuildSimulationProcessor {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl StepProcessor for BuildSimulationProcessor {
    fn kind(&self) -> StepKind {
        StepKind::BuildSimulation
    }

    async fn execute(&self, ctx: &ExecutionContext) -> ExecutionResult {
        let Some(subject) = ctx.subject.as_ref() else {
            return ExecutionResult::failed("subject entity missing from execution context");
        };
        match self.service.build_simulation(subject).await {
            Ok(payload) => {
                let stats = SimulationStats::from_payload(&payload);
                let enriched = shallow_overlay(&payload, &json!({"stats": stats.to_value()}));
                let updated = ctx.accumulator.overlaid(self.kind(), enriched.clone());
                ExecutionResult::completed(enriched, updated).with_logs(vec![
                    LogEntry::step_success(
                        "Simulation built",
                        stats.status_summary.clone(),
                    ),
                ])
            }
            Err(err) => {
                tracing::warn!(step = %self.kind(), error = %err, "simulation call failed");
                ExecutionResult::failed(StepError::ServiceCall(err.to_string()).to_string())
            }
        }
    }
}
