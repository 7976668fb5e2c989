//! scrutiny: a step-pipeline orchestration engine for automated business
//! analysis.
//!
//! A fixed, ordered sequence of analysis steps is driven over a business
//! entity: each step delegates to an external analysis service, folds its
//! result into a monotonically growing accumulator, and decides whether the
//! pipeline continues, halts, or waits for an operator. The driver enforces
//! one in-flight execution at a time, supports automatic and manually gated
//! progression, per-step retries with operator hints, and publishes status
//! and log events on a broadcast bus the presentation layer subscribes to.

pub mod accumulator;
pub mod canned;
pub mod config;
pub mod context;
pub mod driver;
pub mod errors;
pub mod events;
pub mod outcome;
pub mod processors;
pub mod registry;
pub mod service;
pub mod step;

pub use accumulator::{AnalysisAccumulator, AnalysisReport, SimulationStats};
pub use config::{EngineConfig, PipelineMode};
pub use context::{AgentProfile, BusinessEntity, ExecutionContext, StepContext};
pub use driver::{PipelineDriver, PipelineSnapshot, TickOutcome};
pub use errors::{EngineError, StepError};
pub use events::{EngineEvent, EventBus, LogEntry, LogStatus, LogType};
pub use outcome::{Continuation, ExecutionResult};
pub use processors::StepProcessor;
pub use registry::StepRegistry;
pub use service::{AnalysisService, ReportStore};
pub use step::{Step, StepKind, StepStatus, SubStep, pipeline_template};
