//! Final report generation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::accumulator::{AnalysisReport, shallow_overlay};
use crate::context::ExecutionContext;
use crate::errors::StepError;
use crate::events::LogEntry;
use crate::outcome::ExecutionResult;
use crate::service::AnalysisService;
use crate::step::StepKind;

use super::StepProcessor;

/// Produces the report payload and the derived `AnalysisReport` object.
pub struct GenerateReportProcessor {
    service: Arc<dyn AnalysisService>,
}

impl GenerateReportProcessor {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl StepProcessor for GenerateReportProcessor {
    fn kind(&self) -> StepKind {
        StepKind::GenerateReport
    }

    fn can_execute(&self, ctx: &ExecutionContext) -> bool {
        ctx.subject.is_some()
            && ctx.agent.is_some()
            && ctx.accumulator.simulation_result.is_some()
    }

    async fn execute(&self, ctx: &ExecutionContext) -> ExecutionResult {
        let Some(subject) = ctx.subject.as_ref() else {
            return ExecutionResult::failed("subject entity missing from execution context");
        };
        let Some(simulation) = ctx.accumulator.simulation_result.clone() else {
            return ExecutionResult::failed(StepError::NoSimulationResult.to_string());
        };
        match self.service.generate_report(subject, &simulation).await {
            Ok(payload) => {
                let report = AnalysisReport::from_payload(&payload);
                let enriched = shallow_overlay(
                    &payload,
                    &json!({"report": serde_json::to_value(&report).unwrap_or_default()}),
                );
                let updated = ctx.accumulator.overlaid(self.kind(), enriched.clone());
                ExecutionResult::completed(enriched, updated).with_logs(vec![
                    LogEntry::step_success(
                        "Report generated",
                        format!(
                            "Confidence {:.0}, {}",
                            report.confidence_score,
                            if report.is_logical {
                                "conclusions hold together"
                            } else {
                                "conclusions need review"
                            }
                        ),
                    ),
                ])
            }
            Err(err) => {
                tracing::warn!(step = %self.kind(), error = %err, "report call failed");
                ExecutionResult::failed(StepError::ServiceCall(err.to_string()).to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::accumulator::AnalysisAccumulator;
    use crate::canned::{CannedAnalysisService, sample_entity};
    use crate::context::{AgentProfile, StepContext};

    #[tokio::test]
    async fn test_report_result_embeds_derived_report() {
        let processor = GenerateReportProcessor::new(Arc::new(CannedAnalysisService::new()));
        let mut acc = AnalysisAccumulator::default();
        acc.simulation_result = Some(json!({"recommendations": [{"statement": "do x"}]}));
        let ctx = ExecutionContext::new(
            Some(sample_entity()),
            Some(AgentProfile::new("analyst")),
            acc,
            StepContext::default(),
            5,
        );

        let result = processor.execute(&ctx).await;
        assert!(result.success);
        let report = &result.result["report"];
        assert_eq!(report["confidence_score"], json!(82.0));
        assert_eq!(report["is_logical"], json!(true));

        let updated = result.updated.unwrap();
        assert!(updated.generate_report_result.is_some());
        // The simulation key is untouched by the report merge.
        assert!(updated.simulation_result.is_some());
    }
}
