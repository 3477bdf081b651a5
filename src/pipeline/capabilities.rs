//! Gated, pre-authored response producers.
//!
//! A [`Capability`] is the only place user-facing text is written. Its
//! predicate is a pure function of [`Context`]; its artifact is a fixed
//! template with the subject's name filled in. Callers go through [`invoke`],
//! which refuses to render a disabled capability.

use tracing::error;

use super::context::{Context, IssueCategory};
use super::error::PipelineError;

/// A named, context-gated action.
///
/// Implementations are stateless and registered once at startup; handlers
/// share them behind `Arc`.
pub trait Capability: Send + Sync {
    fn id(&self) -> &str;

    /// Whether this capability may run for `ctx`. Must not perform I/O.
    fn is_enabled(&self, ctx: &Context) -> bool;

    /// Produce the artifact. Only reached through [`invoke`].
    fn render(&self, ctx: &Context) -> String;
}

/// Render `capability` for `ctx`, failing fast when it is disabled.
///
/// A disabled invocation means the calling handler skipped its enablement
/// check; the request must fail closed.
pub fn invoke(capability: &dyn Capability, ctx: &Context) -> Result<String, PipelineError> {
    if !capability.is_enabled(ctx) {
        error!(capability = capability.id(), "capability invoked while disabled");
        return Err(PipelineError::GatingViolation {
            capability: capability.id().to_string(),
        });
    }
    Ok(capability.render(ctx))
}

// ── Built-ins ─────────────────────────────────────────────────────────────────

/// Premium-only refund confirmation.
pub struct Refund;

impl Capability for Refund {
    fn id(&self) -> &str {
        "refund"
    }

    fn is_enabled(&self, ctx: &Context) -> bool {
        ctx.is_premium()
    }

    fn render(&self, ctx: &Context) -> String {
        format!(
            "Hello {},\n\n\
             We've reviewed your account and your refund has been **successfully initiated** ✅. \
             You can expect the amount to be credited back to your original payment method within **3-5 business days**. \
             If you have any further questions, feel free to reach out — we're here to help!",
            ctx.subject()
        )
    }
}

/// Service restart, available when the session declared a technical issue.
pub struct RestartService;

impl Capability for RestartService {
    fn id(&self) -> &str {
        "restart_service"
    }

    fn is_enabled(&self, ctx: &Context) -> bool {
        *ctx.issue() == IssueCategory::Technical
    }

    fn render(&self, ctx: &Context) -> String {
        format!(
            "Hi {},\n\n\
             Your service restart request has been received and is now **in progress** 🔄. \
             Please allow a few moments for the changes to take effect. \
             You will receive a confirmation once everything is back online.",
            ctx.subject()
        )
    }
}

/// Service overview. Always enabled.
pub struct GeneralInfo;

impl Capability for GeneralInfo {
    fn id(&self) -> &str {
        "general_info"
    }

    fn is_enabled(&self, _ctx: &Context) -> bool {
        true
    }

    fn render(&self, ctx: &Context) -> String {
        format!(
            "Hello {},\n\n\
             Here's some quick info about our services:\n\
             - **24/7 Customer Support** 🕑\n\
             - **Fast & Secure Transactions** 🔐\n\
             - **Premium Members** enjoy priority handling\n\n\
             If you'd like details about a specific service, let me know!",
            ctx.subject()
        )
    }
}
