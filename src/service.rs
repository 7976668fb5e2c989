//! Seams to the external collaborators.
//!
//! The engine treats the analysis backend as an opaque async collaborator:
//! six operations, JSON in, JSON out, failures surfaced as errors and caught
//! at the processor boundary. Report persistence is a second, narrower seam
//! the presentation layer drives after completion.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::accumulator::AnalysisReport;
use crate::context::BusinessEntity;

/// The external analysis backend, one operation per pipeline stage.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Assess whether the entity's challenge is suitable for analysis.
    /// The payload's `verification_pass` field drives the judge gate.
    async fn judge_challenge(&self, subject: &BusinessEntity) -> Result<Value>;

    /// Retrieve prior analysis runs for the entity.
    async fn query_history(&self, subject: &BusinessEntity) -> Result<Value>;

    /// Pull domain knowledge relevant to the entity.
    async fn query_knowledge_base(&self, subject: &BusinessEntity) -> Result<Value>;

    /// Construct the problem/hypothesis/metric simulation.
    async fn build_simulation(&self, subject: &BusinessEntity) -> Result<Value>;

    /// Resolve the challenge against an existing simulation.
    async fn answer_challenge(
        &self,
        subject: &BusinessEntity,
        simulation: &Value,
    ) -> Result<Value>;

    /// Produce the final report payload from the simulation.
    async fn generate_report(
        &self,
        subject: &BusinessEntity,
        simulation: &Value,
    ) -> Result<Value>;
}

/// External report persistence. Returns an opaque storage key the caller is
/// responsible for retaining; the engine itself never invokes this.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn save_report(&self, report: &AnalysisReport) -> Result<String>;
}
