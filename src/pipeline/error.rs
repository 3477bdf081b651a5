//! Per-request error types.
//!
//! Every variant is reported to the caller as [`super::Outcome::Failed`];
//! none of them crosses the orchestration boundary as a panic.

use std::fmt;

use thiserror::Error;

use super::orchestrator::RequestState;

/// How a failed request should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The oracle was unreachable, slow, or malformed. A new request may work.
    Transient,
    /// A contract inside the pipeline was broken. Retrying will not help.
    Internal,
}

/// Pipeline stage that talks to the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Routing,
    Validating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Routing => "routing",
            Stage::Validating => "validating",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("classification failed during {stage}: {message}")]
    Classification { stage: Stage, message: String },

    #[error("oracle call timed out during {stage}")]
    Timeout { stage: Stage },

    #[error("capability '{capability}' invoked while disabled for this context")]
    GatingViolation { capability: String },

    #[error("no handler registered for route '{route}'")]
    MissingHandler { route: String },

    #[error("illegal lifecycle transition {from:?} -> {to:?}")]
    IllegalTransition { from: RequestState, to: RequestState },
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Classification { .. } | PipelineError::Timeout { .. } => {
                FailureKind::Transient
            }
            PipelineError::GatingViolation { .. }
            | PipelineError::MissingHandler { .. }
            | PipelineError::IllegalTransition { .. } => FailureKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_failures_are_transient() {
        let e = PipelineError::Classification {
            stage: Stage::Routing,
            message: "connection refused".into(),
        };
        assert_eq!(e.kind(), FailureKind::Transient);
        assert!(e.to_string().contains("during routing"));

        let e = PipelineError::Timeout { stage: Stage::Validating };
        assert_eq!(e.kind(), FailureKind::Transient);
        assert!(e.to_string().contains("validating"));
    }

    #[test]
    fn contract_breaks_are_internal() {
        let e = PipelineError::GatingViolation { capability: "refund".into() };
        assert_eq!(e.kind(), FailureKind::Internal);
        assert!(e.to_string().contains("refund"));

        let e = PipelineError::IllegalTransition {
            from: RequestState::Released,
            to: RequestState::Routing,
        };
        assert_eq!(e.kind(), FailureKind::Internal);
    }
}
