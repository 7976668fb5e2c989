//! Deterministic collaborator implementations for demos and tests.
//!
//! `CannedAnalysisService` produces realistic fixture payloads for every
//! stage so the full pipeline can run without a live backend. The
//! `unsuitable` toggle exercises the judge gate.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::accumulator::AnalysisReport;
use crate::context::BusinessEntity;
use crate::service::{AnalysisService, ReportStore};

/// Scripted analysis backend with deterministic payloads.
#[derive(Debug, Default)]
pub struct CannedAnalysisService {
    /// When set, the judge verdict fails the suitability check.
    unsuitable: bool,
}

impl CannedAnalysisService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unsuitable(mut self) -> Self {
        self.unsuitable = true;
        self
    }
}

#[async_trait]
impl AnalysisService for CannedAnalysisService {
    async fn judge_challenge(&self, subject: &BusinessEntity) -> Result<Value> {
        Ok(json!({
            "verification_pass": !self.unsuitable,
            "challenge": subject.challenge,
            "reason": if self.unsuitable {
                "Challenge statement lacks a measurable outcome"
            } else {
                "Challenge is specific and measurable"
            },
        }))
    }

    async fn query_history(&self, subject: &BusinessEntity) -> Result<Value> {
        Ok(json!({
            "entity": subject.name,
            "runs": [
                {"period": "2025-Q4", "outcome": "revenue flat, churn rising"},
                {"period": "2026-Q1", "outcome": "pricing experiment inconclusive"},
            ],
        }))
    }

    async fn query_knowledge_base(&self, subject: &BusinessEntity) -> Result<Value> {
        Ok(json!({
            "industry": subject.industry,
            "snippets": [
                "Retention decays fastest in the first 30 days after onboarding",
                "Discount-led acquisition depresses repeat purchase rates",
            ],
        }))
    }

    async fn build_simulation(&self, subject: &BusinessEntity) -> Result<Value> {
        Ok(json!({
            "entity": subject.name,
            "problems": [
                {"id": "p1", "statement": "New-customer retention is below segment baseline"},
                {"id": "p2", "statement": "Repeat purchase frequency declined two quarters running"},
            ],
            "hypotheses": [
                {"id": "h1", "problem": "p1", "statement": "Onboarding friction drives early churn"},
                {"id": "h2", "problem": "p2", "statement": "Discount dependence eroded perceived value"},
            ],
            "metrics": [
                {"id": "m1", "hypothesis": "h1", "name": "d30_retention"},
                {"id": "m2", "hypothesis": "h2", "name": "repeat_rate"},
            ],
            "insights": [
                {"id": "i1", "statement": "Churn concentrates in self-serve signups"},
            ],
            "recommendations": [
                {"id": "r1", "statement": "Add guided onboarding for self-serve accounts"},
            ],
            "next_steps": [
                {"id": "n1", "statement": "Re-run cohort analysis after onboarding change"},
            ],
        }))
    }

    async fn answer_challenge(
        &self,
        _subject: &BusinessEntity,
        simulation: &Value,
    ) -> Result<Value> {
        let hypothesis_count = simulation
            .get("hypotheses")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        Ok(json!({
            "challenge_answer": "Flat revenue traces to early-lifecycle churn, not acquisition volume",
            "supported_by_hypotheses": hypothesis_count,
        }))
    }

    async fn generate_report(
        &self,
        subject: &BusinessEntity,
        simulation: &Value,
    ) -> Result<Value> {
        let recommendations: Vec<Value> = simulation
            .get("recommendations")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|r| r.get("statement"))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(json!({
            "summary": format!(
                "{}: revenue stagnation is driven by early-lifecycle churn",
                subject.name
            ),
            "findings": [
                "Day-30 retention sits below the segment baseline",
                "Repeat purchase frequency declined two quarters running",
            ],
            "recommendations": recommendations,
            "confidence_score": 82.0,
        }))
    }
}

/// In-memory report store; hands back a fresh storage key per save.
#[derive(Debug, Default)]
pub struct MemoryReportStore {
    saved: Mutex<Vec<(String, AnalysisReport)>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn saved_count(&self) -> usize {
        self.saved.lock().await.len()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn save_report(&self, report: &AnalysisReport) -> Result<String> {
        let key = format!("report-{}", Uuid::new_v4());
        self.saved.lock().await.push((key.clone(), report.clone()));
        Ok(key)
    }
}

/// A sample entity for the demo binary.
pub fn sample_entity() -> BusinessEntity {
    BusinessEntity::new("Acme Retail", "Quarterly revenue has been flat for a year")
        .with_industry("retail")
        .with_profile(json!({
            "employees": 120,
            "channels": ["web", "stores"],
            "arr_musd": 14.5,
        }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_judge_verdict_follows_toggle() {
        let entity = sample_entity();
        let suitable = CannedAnalysisService::new();
        let verdict = suitable.judge_challenge(&entity).await.unwrap();
        assert_eq!(verdict["verification_pass"], json!(true));

        let unsuitable = CannedAnalysisService::new().unsuitable();
        let verdict = unsuitable.judge_challenge(&entity).await.unwrap();
        assert_eq!(verdict["verification_pass"], json!(false));
    }

    #[tokio::test]
    async fn test_simulation_payload_covers_all_sub_step_keys() {
        let entity = sample_entity();
        let sim = CannedAnalysisService::new()
            .build_simulation(&entity)
            .await
            .unwrap();
        for key in ["problems", "hypotheses", "metrics", "insights", "recommendations", "next_steps"] {
            assert!(sim[key].is_array(), "missing {}", key);
        }
    }

    #[tokio::test]
    async fn test_report_store_returns_distinct_keys() {
        let store = MemoryReportStore::new();
        let report = AnalysisReport::from_payload(&json!({"summary": "s"}));
        let a = store.save_report(&report).await.unwrap();
        let b = store.save_report(&report).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.saved_count().await, 2);
    }
}
