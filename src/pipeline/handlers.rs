//! Specialised responders that own a closed set of capabilities.
//!
//! A handler never writes the answer itself: it returns the artifact of the
//! first capability enabled for the context, or its own deterministic
//! fallback when none is. It never hands the query to another handler.

use std::sync::Arc;

use tracing::debug;

use super::capabilities::{self, Capability, GeneralInfo, Refund, RestartService};
use super::context::Context;
use super::error::PipelineError;

/// Text that will go through the guardrail, plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateResponse {
    pub text: String,
    /// Handler that produced the text; `None` for the out-of-scope literal.
    pub handler: Option<String>,
    /// Capability whose artifact this is; `None` for fallbacks and literals.
    pub capability: Option<String>,
}

/// A responder for one routing category.
pub trait Handler: Send + Sync {
    fn id(&self) -> &str;

    fn capabilities(&self) -> &[Arc<dyn Capability>];

    /// Answer an in-domain query for `ctx`.
    fn respond(&self, ctx: &Context, query: &str) -> Result<CandidateResponse, PipelineError>;
}

/// Renders the fallback message for a context.
pub type FallbackFn = fn(&Context) -> String;

/// Handler that tries its capabilities in registration order.
pub struct SpecialistHandler {
    id: String,
    capabilities: Vec<Arc<dyn Capability>>,
    fallback: FallbackFn,
}

impl SpecialistHandler {
    pub fn new(
        id: impl Into<String>,
        capabilities: Vec<Arc<dyn Capability>>,
        fallback: FallbackFn,
    ) -> Self {
        Self { id: id.into(), capabilities, fallback }
    }

    /// Billing desk: refunds for premium subjects.
    pub fn billing() -> Self {
        Self::new("billing", vec![Arc::new(Refund)], billing_fallback)
    }

    /// Technical desk: service restarts for technical sessions.
    pub fn technical() -> Self {
        Self::new("technical", vec![Arc::new(RestartService)], technical_fallback)
    }

    /// General desk: service overview.
    pub fn general() -> Self {
        Self::new("general", vec![Arc::new(GeneralInfo)], general_fallback)
    }
}

impl Handler for SpecialistHandler {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> &[Arc<dyn Capability>] {
        &self.capabilities
    }

    fn respond(&self, ctx: &Context, query: &str) -> Result<CandidateResponse, PipelineError> {
        let selected = self.capabilities.iter().find(|c| c.is_enabled(ctx));

        match selected {
            Some(capability) => {
                debug!(
                    handler = %self.id,
                    capability = capability.id(),
                    query_len = query.len(),
                    "invoking capability"
                );
                let text = capabilities::invoke(capability.as_ref(), ctx)?;
                Ok(CandidateResponse {
                    text,
                    handler: Some(self.id.clone()),
                    capability: Some(capability.id().to_string()),
                })
            }
            None => {
                debug!(handler = %self.id, "no capability enabled; using fallback");
                Ok(CandidateResponse {
                    text: (self.fallback)(ctx),
                    handler: Some(self.id.clone()),
                    capability: None,
                })
            }
        }
    }
}

fn billing_fallback(ctx: &Context) -> String {
    format!(
        "Hello {},\n\n\
         Thank you for your patience. Refunds through this channel are available to **premium members** only, \
         so we're unable to process one for your account here. \
         Our billing team can review your case if you reach out through the account portal.",
        ctx.subject()
    )
}

fn technical_fallback(ctx: &Context) -> String {
    format!(
        "Hi {},\n\n\
         Service restarts can only be requested from a session opened for a **technical** issue. \
         Please start a new session and choose the technical issue type so we can help.",
        ctx.subject()
    )
}

fn general_fallback(ctx: &Context) -> String {
    format!(
        "Hello {},\n\n\
         Service information is unavailable right now. Please try again shortly.",
        ctx.subject()
    )
}
