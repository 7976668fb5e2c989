//! Typed error hierarchy for the scrutiny engine.
//!
//! Two top-level enums cover the two subsystems:
//! - `EngineError` — driver-level operation failures
//! - `StepError` — per-step execution failures
//!
//! Processor-level failures never escape as errors: the registry and the
//! processors normalize them into `ExecutionResult`, so `StepError` mostly
//! travels as the `error` string of a failed result.

use thiserror::Error;

use crate::step::StepKind;

/// Errors from the pipeline driver's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("A step execution is in flight; retry once it settles")]
    ExecutionInFlight,

    #[error("Step index {index} is out of range (pipeline has {len} steps)")]
    StepOutOfRange { index: usize, len: usize },

    #[error("No subject entity is attached to the pipeline")]
    MissingSubject,

    #[error("No active agent is attached to the pipeline")]
    MissingAgent,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from a single step execution.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("No processor registered for step '{0}'")]
    UnknownStep(StepKind),

    #[error("Step '{kind}' blocked: {reason}")]
    Blocked { kind: StepKind, reason: String },

    #[error("No simulation result found in context")]
    NoSimulationResult,

    #[error("Analysis service call failed: {0}")]
    ServiceCall(String),

    #[error("Analysis service call timed out after {seconds}s")]
    ServiceTimeout { seconds: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_execution_in_flight_is_matchable() {
        let err = EngineError::ExecutionInFlight;
        assert!(matches!(err, EngineError::ExecutionInFlight));
    }

    #[test]
    fn engine_error_step_out_of_range_carries_bounds() {
        let err = EngineError::StepOutOfRange { index: 9, len: 6 };
        match &err {
            EngineError::StepOutOfRange { index, len } => {
                assert_eq!(*index, 9);
                assert_eq!(*len, 6);
            }
            _ => panic!("Expected StepOutOfRange"),
        }
        assert!(err.to_string().contains('9'));
    }

    #[test]
    fn step_error_unknown_step_names_the_kind() {
        let err = StepError::UnknownStep(StepKind::BuildSimulation);
        assert!(err.to_string().contains("build_simulation"));
    }

    #[test]
    fn step_error_no_simulation_message_is_stable() {
        // The driver's halt log and scenario assertions rely on this text.
        assert_eq!(
            StepError::NoSimulationResult.to_string(),
            "No simulation result found in context"
        );
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&EngineError::MissingSubject);
        assert_std_error(&StepError::ServiceTimeout { seconds: 30 });
    }
}
