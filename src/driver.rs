//! Pipeline driver: the sense → decide → act cycle.
//!
//! The driver owns the ordered step list, the current index, the run flag,
//! the execution lock, the progression mode, and the per-step retry
//! contexts. One `tokio::sync::Mutex<DriverState>` is both the state lock
//! and the execution lock: `tick()` takes it with `try_lock()` (a held lock
//! means a step is in flight, so the cycle returns immediately) and holds
//! the guard across the single awaited service call. User operations that
//! are only valid while no call is in flight use `try_lock()` too and fail
//! with `ExecutionInFlight`. The guard drop is the unconditional release on
//! every exit path.
//!
//! The polling loop is an explicit spawned task: a `tokio::time::interval`
//! raced against a `CancellationToken`, so `pause()` deterministically stops
//! future ticks instead of relying on checks inside the tick body.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, broadcast};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::accumulator::{AnalysisAccumulator, AnalysisReport};
use crate::config::{EngineConfig, PipelineMode};
use crate::context::{AgentProfile, BusinessEntity, ExecutionContext, StepContext};
use crate::errors::EngineError;
use crate::events::{EngineEvent, EventBus, LogEntry};
use crate::outcome::Continuation;
use crate::registry::StepRegistry;
use crate::step::{Step, StepKind, StepStatus, pipeline_template};

/// What one cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A step execution is already in flight; the cycle returned at once.
    Busy,
    /// The driver is not running.
    Idle,
    /// Subject entity or active agent unavailable; nothing executed.
    MissingCollaborators,
    /// The pipeline is past its last step.
    Finished,
    /// Manual mode is holding at the current step for operator approval.
    AwaitingApproval,
    /// The current step had already completed; the index advanced.
    Advanced,
    /// The current step is mid-flight.
    InFlight,
    /// A step executed this cycle.
    Executed { kind: StepKind, success: bool },
}

/// Read-only view of the pipeline between cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub steps: Vec<Step>,
    pub current_index: usize,
    pub is_running: bool,
    pub mode: PipelineMode,
    pub completed: bool,
    /// Index holding for approval, when manual mode has armed a gate.
    pub awaiting_approval: Option<usize>,
    pub last_log: Option<LogEntry>,
}

struct DriverState {
    steps: Vec<Step>,
    current_index: usize,
    is_running: bool,
    mode: PipelineMode,
    step_contexts: HashMap<usize, StepContext>,
    accumulator: AnalysisAccumulator,
    journal: Vec<LogEntry>,
    report: Option<AnalysisReport>,
    completion_emitted: bool,
    subject: Option<BusinessEntity>,
    agent: Option<AgentProfile>,
}

pub struct PipelineDriver {
    registry: StepRegistry,
    bus: EventBus,
    config: EngineConfig,
    state: Mutex<DriverState>,
    ticker: StdMutex<Option<CancellationToken>>,
}

impl PipelineDriver {
    pub fn new(registry: StepRegistry, bus: EventBus, config: EngineConfig) -> Self {
        let mode = config.mode;
        Self {
            registry,
            bus,
            config,
            state: Mutex::new(DriverState {
                steps: pipeline_template(),
                current_index: 0,
                is_running: false,
                mode,
                step_contexts: HashMap::new(),
                accumulator: AnalysisAccumulator::default(),
                journal: Vec::new(),
                report: None,
                completion_emitted: false,
                subject: None,
                agent: None,
            }),
            ticker: StdMutex::new(None),
        }
    }

    pub fn with_subject(mut self, subject: BusinessEntity) -> Self {
        let st = self.state.get_mut();
        st.accumulator.subject = Some(subject.clone());
        st.subject = Some(subject);
        self
    }

    pub fn with_agent(mut self, agent: AgentProfile) -> Self {
        self.state.get_mut().agent = Some(agent);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_running
    }

    pub async fn snapshot(&self) -> PipelineSnapshot {
        let st = self.state.lock().await;
        let awaiting_approval = (st.mode == PipelineMode::Manual)
            .then(|| st.current_index)
            .filter(|idx| {
                st.step_contexts
                    .get(idx)
                    .is_some_and(StepContext::awaiting_approval)
            });
        PipelineSnapshot {
            steps: st.steps.clone(),
            current_index: st.current_index,
            is_running: st.is_running,
            mode: st.mode,
            completed: st.completion_emitted,
            awaiting_approval,
            last_log: st.journal.last().cloned(),
        }
    }

    pub async fn journal(&self) -> Vec<LogEntry> {
        self.state.lock().await.journal.clone()
    }

    pub async fn accumulator(&self) -> AnalysisAccumulator {
        self.state.lock().await.accumulator.clone()
    }

    pub async fn report(&self) -> Option<AnalysisReport> {
        self.state.lock().await.report.clone()
    }

    pub async fn retry_count(&self, index: usize) -> u32 {
        self.state
            .lock()
            .await
            .step_contexts
            .get(&index)
            .map(|c| c.retry_count)
            .unwrap_or(0)
    }

    /// Begin (or resume) progression and drive one cycle immediately.
    ///
    /// If the pipeline had already finished, the step list and index are
    /// restored from the template first.
    pub async fn start(self: &Arc<Self>) -> TickOutcome {
        {
            let mut st = self.state.lock().await;
            if st.current_index >= st.steps.len() {
                st.steps = pipeline_template();
                st.current_index = 0;
                st.completion_emitted = false;
            }
            st.is_running = true;
            self.log_state(&mut st, LogEntry::system("Pipeline started", "Progression enabled"));
        }
        self.spawn_ticker();
        self.tick().await
    }

    /// Stop future cycles. Cooperative: an in-flight call is not aborted,
    /// and its result is still applied when it lands.
    pub async fn pause(&self) {
        self.cancel_ticker();
        let mut st = self.state.lock().await;
        st.is_running = false;
        self.log_state(&mut st, LogEntry::system("Pipeline paused", "Progression disabled"));
    }

    pub async fn set_mode(&self, mode: PipelineMode) {
        let mut st = self.state.lock().await;
        st.mode = mode;
        self.log_state(
            &mut st,
            LogEntry::system("Mode changed", format!("Progression mode is now {}", mode.as_str())),
        );
    }

    /// Attach an operator hint to a step, surfaced in its next start log.
    pub async fn set_additional_info(
        &self,
        index: usize,
        info: impl Into<String>,
    ) -> Result<(), EngineError> {
        let mut st = self.try_state()?;
        Self::check_index(&st, index)?;
        st.step_contexts.entry(index).or_default().additional_info = Some(info.into());
        Ok(())
    }

    /// Mark a step approved. Idempotent when the step already completed.
    /// In manual mode this resumes progression; in auto mode it advances
    /// the index past the approved step.
    pub async fn approve(self: &Arc<Self>, index: usize) -> Result<(), EngineError> {
        let mut st = self.try_state()?;
        Self::check_index(&st, index)?;

        // Idempotent for a completed step. A pending step in manual mode is
        // left alone so the resumed cycle executes it; anything else is
        // finalized as completed by the operator's decision.
        let finalize = match st.steps[index].status {
            StepStatus::Completed => false,
            StepStatus::Pending if st.mode == PipelineMode::Manual => false,
            _ => true,
        };
        if finalize {
            let payload = st.steps[index]
                .result
                .take()
                .unwrap_or_else(|| json!({"manual_approval": true}));
            let step = &mut st.steps[index];
            step.result = Some(payload);
            step.status = StepStatus::Completed;
            let (kind, result) = (step.kind, step.result.clone());
            self.bus.emit_status(kind, StepStatus::Completed, result);
        }
        st.step_contexts.entry(index).or_default().manual_approval = Some(true);

        let title = st.steps[index].title.clone();
        match st.mode {
            PipelineMode::Manual => {
                st.is_running = true;
                self.log_state(
                    &mut st,
                    LogEntry::system("Step approved", format!("'{}' approved; resuming", title)),
                );
                drop(st);
                self.spawn_ticker();
            }
            PipelineMode::Auto => {
                st.current_index = index + 1;
                self.log_state(
                    &mut st,
                    LogEntry::system("Step approved", format!("'{}' approved; advancing", title)),
                );
            }
        }
        Ok(())
    }

    /// Mark a step rejected and halt the pipeline.
    pub async fn reject(&self, index: usize) -> Result<(), EngineError> {
        let mut st = self.try_state()?;
        Self::check_index(&st, index)?;
        self.cancel_ticker();

        let step = &mut st.steps[index];
        step.fail(json!({"rejected": true, "reason": "rejected by operator"}));
        let (kind, result) = (step.kind, step.result.clone());
        self.bus.emit_status(kind, StepStatus::Error, result);

        // The rejection consumes any armed approval gate.
        if let Some(ctx) = st.step_contexts.get_mut(&index) {
            ctx.manual_approval = None;
        }
        st.is_running = false;
        let title = st.steps[index].title.clone();
        self.log_state(
            &mut st,
            LogEntry::step_error("Step rejected", format!("'{}' rejected by operator", title)),
        );
        Ok(())
    }

    /// Reset one step to pending and resume from it. The only action that
    /// increments the step's retry count.
    pub async fn rerun(self: &Arc<Self>, index: usize) -> Result<(), EngineError> {
        {
            let mut st = self.try_state()?;
            Self::check_index(&st, index)?;

            st.steps[index].reset();
            let kind = st.steps[index].kind;
            self.bus.emit_status(kind, StepStatus::Pending, None);

            let ctx = st.step_contexts.entry(index).or_default();
            ctx.retry_count += 1;
            ctx.manual_approval = None;
            let attempt = ctx.retry_count;

            st.current_index = index;
            st.is_running = true;
            st.completion_emitted = false;
            let title = st.steps[index].title.clone();
            self.log_state(
                &mut st,
                LogEntry::system(
                    "Step rerun",
                    format!("'{}' reset for retry attempt {}", title, attempt),
                ),
            );
        }
        self.spawn_ticker();
        Ok(())
    }

    /// Restore the step template verbatim, clear the per-step contexts and
    /// the derived report, and re-seed the accumulator preserving only the
    /// subject reference.
    pub async fn reset_all(self: &Arc<Self>) -> Result<(), EngineError> {
        {
            let mut st = self.try_state()?;
            st.steps = pipeline_template();
            st.step_contexts.clear();
            st.report = None;
            st.completion_emitted = false;
            st.accumulator = AnalysisAccumulator::seeded(st.subject.clone());
            st.current_index = 0;
            st.is_running = true;
            self.log_state(
                &mut st,
                LogEntry::system("Pipeline reset", "All steps restored to pending"),
            );
        }
        self.spawn_ticker();
        Ok(())
    }

    /// One sense → decide → act cycle.
    pub async fn tick(&self) -> TickOutcome {
        // Re-entrancy guard: a held lock means a step is in flight.
        let Ok(mut st) = self.state.try_lock() else {
            return TickOutcome::Busy;
        };
        if !st.is_running {
            return TickOutcome::Idle;
        }
        if st.subject.is_none() || st.agent.is_none() {
            self.log_state(
                &mut st,
                LogEntry::warning(
                    "Pipeline waiting",
                    "Subject entity or active agent unavailable",
                ),
            );
            return TickOutcome::MissingCollaborators;
        }
        if st.current_index >= st.steps.len() {
            st.is_running = false;
            self.log_state(
                &mut st,
                LogEntry::system("Pipeline completed", "All steps have finished"),
            );
            self.emit_completion(&mut st);
            return TickOutcome::Finished;
        }

        let idx = st.current_index;
        if st.mode == PipelineMode::Manual
            && idx > 0
            && st
                .step_contexts
                .get(&idx)
                .is_some_and(StepContext::awaiting_approval)
        {
            st.is_running = false;
            let title = st.steps[idx].title.clone();
            self.log_state(
                &mut st,
                LogEntry::system(
                    "Waiting for approval",
                    format!("'{}' requires operator approval before it runs", title),
                ),
            );
            return TickOutcome::AwaitingApproval;
        }

        match st.steps[idx].status {
            StepStatus::Completed => {
                // Advance only; the next step runs on the next cycle.
                if idx + 1 < st.steps.len() {
                    st.current_index = idx + 1;
                    let title = st.steps[idx + 1].title.clone();
                    self.log_state(
                        &mut st,
                        LogEntry::system("Advancing", format!("Next step: '{}'", title)),
                    );
                } else {
                    st.current_index = st.steps.len();
                }
                return TickOutcome::Advanced;
            }
            StepStatus::InProgress => return TickOutcome::InFlight,
            StepStatus::Pending | StepStatus::Error => {}
        }

        let kind = st.steps[idx].kind;
        let ctx = ExecutionContext::new(
            st.subject.clone(),
            st.agent.clone(),
            st.accumulator.clone(),
            st.step_contexts.entry(idx).or_default().clone(),
            idx,
        );
        tracing::debug!(step = %kind, index = idx, "executing step");
        let result = {
            let DriverState { steps, journal, .. } = &mut *st;
            self.registry.execute_step(kind, &ctx, steps, journal).await
        };

        if let Some(updated) = result.updated.clone() {
            st.accumulator.merge_from(updated);
        }
        if result.success && kind == StepKind::GenerateReport {
            st.report = st
                .accumulator
                .generate_report_result
                .as_ref()
                .and_then(|v| v.get("report"))
                .and_then(|v| serde_json::from_value(v.clone()).ok());
        }

        let success = result.success;
        match result.continuation {
            Continuation::Halt => {
                st.is_running = false;
                let entry = if result.is_gate_halt() {
                    LogEntry::system(
                        "Pipeline halted",
                        format!("'{}' gated further analysis; awaiting operator action", kind),
                    )
                } else {
                    LogEntry::step_error(
                        "Pipeline halted",
                        format!(
                            "'{}' failed: {}",
                            kind,
                            result.error.clone().unwrap_or_else(|| "unknown error".into())
                        ),
                    )
                };
                self.log_state(&mut st, entry);
            }
            Continuation::Jump(target) => {
                let clamped = target.min(st.steps.len());
                st.current_index = clamped;
                self.log_state(
                    &mut st,
                    LogEntry::system("Jump", format!("Continuing from step index {}", clamped)),
                );
            }
            Continuation::Continue => {
                if idx + 1 >= st.steps.len() {
                    st.is_running = false;
                    st.current_index = st.steps.len();
                    self.log_state(
                        &mut st,
                        LogEntry::system("Pipeline completed", "All steps have finished"),
                    );
                    self.emit_completion(&mut st);
                } else {
                    match st.mode {
                        PipelineMode::Auto => {
                            st.current_index = idx + 1;
                            let title = st.steps[idx + 1].title.clone();
                            self.log_state(
                                &mut st,
                                LogEntry::system("Advancing", format!("Next step: '{}'", title)),
                            );
                        }
                        PipelineMode::Manual => {
                            st.step_contexts
                                .entry(idx + 1)
                                .or_default()
                                .manual_approval = Some(false);
                            st.current_index = idx + 1;
                            st.is_running = false;
                            let title = st.steps[idx + 1].title.clone();
                            self.log_state(
                                &mut st,
                                LogEntry::system(
                                    "Awaiting approval",
                                    format!("'{}' is gated behind operator approval", title),
                                ),
                            );
                        }
                    }
                }
            }
        }
        TickOutcome::Executed { kind, success }
    }

    fn try_state(&self) -> Result<tokio::sync::MutexGuard<'_, DriverState>, EngineError> {
        self.state
            .try_lock()
            .map_err(|_| EngineError::ExecutionInFlight)
    }

    fn check_index(st: &DriverState, index: usize) -> Result<(), EngineError> {
        if index >= st.steps.len() {
            return Err(EngineError::StepOutOfRange {
                index,
                len: st.steps.len(),
            });
        }
        Ok(())
    }

    fn log_state(&self, st: &mut DriverState, entry: LogEntry) {
        st.journal.push(entry.clone());
        self.bus.emit_log(entry);
    }

    fn emit_completion(&self, st: &mut DriverState) {
        if st.completion_emitted {
            return;
        }
        st.completion_emitted = true;
        self.bus.emit(EngineEvent::PipelineCompleted {
            report: st.report.clone(),
            logs: st.journal.clone(),
        });
    }

    /// Spawn the ticker task, replacing (and cancelling) any previous one.
    /// A zero interval disables the ticker; the embedder calls `tick()`.
    fn spawn_ticker(self: &Arc<Self>) {
        if self.config.tick_interval_ms == 0 {
            return;
        }
        let token = CancellationToken::new();
        {
            let mut guard = self.ticker.lock().expect("ticker lock");
            if let Some(prev) = guard.replace(token.clone()) {
                prev.cancel();
            }
        }
        let driver = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(driver.config.tick_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        driver.tick().await;
                        if !driver.is_running().await {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn cancel_ticker(&self) {
        if let Some(token) = self.ticker.lock().expect("ticker lock").take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::canned::{CannedAnalysisService, sample_entity};

    fn manual_tick_driver() -> Arc<PipelineDriver> {
        let bus = EventBus::default();
        let mut registry = StepRegistry::new(bus.clone());
        registry.register_default_processors(Arc::new(CannedAnalysisService::new()));
        let config = EngineConfig {
            tick_interval_ms: 0,
            ..EngineConfig::default()
        };
        Arc::new(
            PipelineDriver::new(registry, bus, config)
                .with_subject(sample_entity())
                .with_agent(AgentProfile::new("analyst")),
        )
    }

    #[tokio::test]
    async fn test_tick_without_start_is_idle() {
        let driver = manual_tick_driver();
        assert_eq!(driver.tick().await, TickOutcome::Idle);
    }

    #[tokio::test]
    async fn test_missing_agent_blocks_cycle() {
        let bus = EventBus::default();
        let mut registry = StepRegistry::new(bus.clone());
        registry.register_default_processors(Arc::new(CannedAnalysisService::new()));
        let config = EngineConfig {
            tick_interval_ms: 0,
            ..EngineConfig::default()
        };
        let driver = Arc::new(
            PipelineDriver::new(registry, bus, config).with_subject(sample_entity()),
        );

        assert_eq!(driver.start().await, TickOutcome::MissingCollaborators);
        let snapshot = driver.snapshot().await;
        assert!(snapshot.steps.iter().all(|s| s.status == StepStatus::Pending));
    }

    #[tokio::test]
    async fn test_start_after_finish_restores_template() {
        let driver = manual_tick_driver();
        driver.start().await;
        // Drive to completion: each step needs an execute cycle and an
        // advance cycle.
        for _ in 0..16 {
            driver.tick().await;
        }
        let snapshot = driver.snapshot().await;
        assert!(snapshot.completed);
        assert!(!snapshot.is_running);

        driver.start().await;
        let snapshot = driver.snapshot().await;
        assert_eq!(snapshot.current_index, 0);
        // Step 0 re-executed on the direct start cycle.
        assert_eq!(snapshot.steps[0].status, StepStatus::Completed);
        assert!(snapshot.steps[1..].iter().all(|s| s.status == StepStatus::Pending));
    }

    #[tokio::test]
    async fn test_set_additional_info_out_of_range() {
        let driver = manual_tick_driver();
        let err = driver.set_additional_info(9, "hint").await.unwrap_err();
        assert!(matches!(err, EngineError::StepOutOfRange { index: 9, len: 6 }));
    }
}
