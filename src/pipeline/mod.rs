//! Triage pipeline.
//!
//! A request flows `Router → Handler → Capability → Guardrail`, driven by the
//! [`Orchestrator`]. Only capabilities write user-facing text; only the
//! guardrail decides whether it may be released.

pub mod capabilities;
pub mod context;
pub mod error;
pub mod guardrail;
pub mod handlers;
pub mod orchestrator;
pub mod router;

pub use capabilities::Capability;
pub use context::{Context, IssueCategory};
pub use error::{FailureKind, PipelineError, Stage};
pub use guardrail::{Guardrail, GuardrailPolicy, GuardrailVerdict};
pub use handlers::{CandidateResponse, Handler, SpecialistHandler};
pub use orchestrator::{Orchestrator, Outcome, RequestReport, RequestState};
pub use router::{DispatchTable, OUT_OF_SCOPE_REPLY, Route, RouteDecision, Router};
