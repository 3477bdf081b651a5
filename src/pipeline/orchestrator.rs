//! Orchestrator: owns the request lifecycle.
//!
//! ```text
//! ROUTING ──► DISPATCHED ──► VALIDATING ──► RELEASED
//!    │            │              ├────────► BLOCKED
//!    └────────────┴──────────────┴────────► FAILED | CANCELLED
//! ```
//!
//! Each request produces exactly one [`Outcome`]. Candidate text leaves the
//! pipeline only after the guardrail has cleared it.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::llm::{LlmProvider, providers};

use super::context::Context;
use super::error::PipelineError;
use super::guardrail::{Guardrail, GuardrailPolicy, GuardrailVerdict};
use super::router::{DispatchTable, Route, Router};

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Routing,
    Dispatched,
    Validating,
    Released,
    Blocked,
    Failed,
    Cancelled,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Released
                | RequestState::Blocked
                | RequestState::Failed
                | RequestState::Cancelled
        )
    }

    /// Forward-only transition table.
    pub fn can_advance_to(self, next: RequestState) -> bool {
        use RequestState::*;
        match (self, next) {
            (Routing, Dispatched) | (Dispatched, Validating) => true,
            (Validating, Released) | (Validating, Blocked) => true,
            (from, Failed) | (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Final result of one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Guardrail-cleared text, safe to show the user.
    Released(String),
    /// The tripwire fired. The candidate was suppressed.
    Blocked(GuardrailVerdict),
    Failed(PipelineError),
    Cancelled,
}

impl Outcome {
    pub fn state(&self) -> RequestState {
        match self {
            Outcome::Released(_) => RequestState::Released,
            Outcome::Blocked(_) => RequestState::Blocked,
            Outcome::Failed(_) => RequestState::Failed,
            Outcome::Cancelled => RequestState::Cancelled,
        }
    }

    /// Released text, if any. `None` for every other outcome.
    pub fn text(&self) -> Option<&str> {
        match self {
            Outcome::Released(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_released(&self) -> bool {
        matches!(self, Outcome::Released(_))
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Outcome::Blocked(_))
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            Outcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Decision trail for one request.
#[derive(Debug, Clone)]
pub struct RequestReport {
    pub request_id: Uuid,
    pub route: Option<Route>,
    pub handler: Option<String>,
    pub capability: Option<String>,
    /// Every state visited, in order, starting with `Routing`.
    pub states: Vec<RequestState>,
    pub outcome: Outcome,
}

struct Trail {
    request_id: Uuid,
    route: Option<Route>,
    handler: Option<String>,
    capability: Option<String>,
    states: Vec<RequestState>,
}

impl Trail {
    fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            route: None,
            handler: None,
            capability: None,
            states: vec![RequestState::Routing],
        }
    }

    fn current(&self) -> RequestState {
        self.states.last().copied().unwrap_or(RequestState::Routing)
    }

    fn advance(&mut self, next: RequestState) -> Result<(), PipelineError> {
        let from = self.current();
        if !from.can_advance_to(next) {
            return Err(PipelineError::IllegalTransition { from, to: next });
        }
        debug!(?from, to = ?next, "state transition");
        self.states.push(next);
        Ok(())
    }

    fn conclude(mut self, result: Result<Outcome, PipelineError>) -> RequestReport {
        let mut outcome = result.unwrap_or_else(Outcome::Failed);
        if let Err(e) = self.advance(outcome.state()) {
            error!(error = %e, "cannot reach terminal state");
            if !self.current().is_terminal() {
                self.states.push(RequestState::Failed);
            }
            outcome = Outcome::Failed(e);
        }
        RequestReport {
            request_id: self.request_id,
            route: self.route,
            handler: self.handler,
            capability: self.capability,
            states: self.states,
            outcome,
        }
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

struct Inner {
    router: Router,
    guardrail: Guardrail,
}

/// Cheap to clone; clones share the same router and guardrail.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(router: Router, guardrail: Guardrail) -> Self {
        Self { inner: Arc::new(Inner { router, guardrail }) }
    }

    /// Build the oracle client from `config.llm` and wire the built-in desks.
    ///
    /// An unknown provider or a missing API key is a configuration error.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let provider = providers::build(&config.llm, config.llm_api_key.clone())?;
        Ok(Self::with_provider(config, provider))
    }

    /// Same as [`Orchestrator::from_config`] with an already-built oracle client.
    pub fn with_provider(config: &Config, provider: LlmProvider) -> Self {
        info!(provider = provider.name(), "oracle client ready");
        let router = Router::new(
            provider.clone(),
            DispatchTable::support_desk(),
            config.pipeline.router_timeout,
        );
        let guardrail = Guardrail::new(
            provider,
            GuardrailPolicy::from(&config.guardrail),
            config.pipeline.guardrail_timeout,
        );
        Self::new(router, guardrail)
    }

    pub async fn handle_request(&self, ctx: &Context, query: &str) -> Outcome {
        self.handle_request_with_cancel(ctx, query, &CancellationToken::new()).await
    }

    pub async fn handle_request_with_cancel(
        &self,
        ctx: &Context,
        query: &str,
        cancel: &CancellationToken,
    ) -> Outcome {
        self.run(ctx, query, cancel).await.outcome
    }

    /// Process one request and return its full decision trail.
    pub async fn run(
        &self,
        ctx: &Context,
        query: &str,
        cancel: &CancellationToken,
    ) -> RequestReport {
        let request_id = Uuid::now_v7();
        let span = info_span!(
            "request",
            %request_id,
            issue = %ctx.issue(),
            premium = ctx.is_premium()
        );

        async move {
            let mut trail = Trail::new(request_id);
            let result = self.execute(&mut trail, ctx, query, cancel).await;
            let report = trail.conclude(result);
            log_outcome(&report);
            report
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        trail: &mut Trail,
        ctx: &Context,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Outcome, PipelineError> {
        let Some(decision) = or_cancel(cancel, self.inner.router.route(ctx, query)).await else {
            return Ok(Outcome::Cancelled);
        };
        let decision = decision?;
        trail.route = Some(decision.route);

        trail.advance(RequestState::Dispatched)?;
        let candidate = self.inner.router.dispatch(&decision, ctx, query)?;
        trail.handler = candidate.handler.clone();
        trail.capability = candidate.capability.clone();
        trace!(candidate = %candidate.text, "candidate response");

        trail.advance(RequestState::Validating)?;
        let validation = self.inner.guardrail.validate(&candidate.text);
        let Some(verdict) = or_cancel(cancel, validation).await else {
            return Ok(Outcome::Cancelled);
        };
        let verdict = verdict?;

        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        if verdict.violates_policy {
            warn!(
                route = %decision.route,
                handler = ?candidate.handler,
                "guardrail tripwire triggered"
            );
            return Ok(Outcome::Blocked(verdict));
        }
        Ok(Outcome::Released(candidate.text))
    }
}

/// Await `fut` unless `cancel` fires first.
async fn or_cancel<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

fn log_outcome(report: &RequestReport) {
    let route = report.route.map(|r| r.as_str()).unwrap_or("-");
    match &report.outcome {
        Outcome::Released(_) => info!(
            route,
            handler = report.handler.as_deref().unwrap_or("-"),
            capability = report.capability.as_deref().unwrap_or("-"),
            "response released"
        ),
        Outcome::Blocked(verdict) => {
            info!(route, diagnostic = %verdict.diagnostic, "response blocked")
        }
        Outcome::Failed(e) => error!(route, kind = ?e.kind(), error = %e, "request failed"),
        Outcome::Cancelled => info!(route, "request cancelled"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::llm::providers::scripted::{ScriptedProvider, ScriptedReply};
    use crate::pipeline::error::FailureKind;

    fn orchestrator(provider: ScriptedProvider) -> Orchestrator {
        let provider: LlmProvider = provider.into();
        Orchestrator::new(
            Router::new(provider.clone(), DispatchTable::support_desk(), Duration::from_secs(5)),
            Guardrail::new(provider, GuardrailPolicy::default(), Duration::from_secs(5)),
        )
    }

    fn desk() -> ScriptedProvider {
        ScriptedProvider::support_desk(&GuardrailPolicy::default().terms)
    }

    #[test]
    fn transitions_are_forward_only() {
        use RequestState::*;
        assert!(Routing.can_advance_to(Dispatched));
        assert!(Dispatched.can_advance_to(Validating));
        assert!(Validating.can_advance_to(Released));
        assert!(Validating.can_advance_to(Blocked));
        assert!(Routing.can_advance_to(Failed));
        assert!(Dispatched.can_advance_to(Cancelled));

        assert!(!Routing.can_advance_to(Validating));
        assert!(!Dispatched.can_advance_to(Released));
        assert!(!Validating.can_advance_to(Routing));
        assert!(!Released.can_advance_to(Failed));
        assert!(!Blocked.can_advance_to(Released));
        assert!(!Cancelled.can_advance_to(Cancelled));
    }

    #[test]
    fn illegal_advance_is_internal_failure() {
        let mut trail = Trail::new(Uuid::now_v7());
        let err = trail.advance(RequestState::Released).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Internal);
        assert_eq!(trail.states, vec![RequestState::Routing]);
    }

    #[test]
    fn conclude_from_wrong_state_fails_closed() {
        let trail = Trail::new(Uuid::now_v7());
        let report = trail.conclude(Ok(Outcome::Released("leak".into())));
        assert!(matches!(report.outcome, Outcome::Failed(PipelineError::IllegalTransition { .. })));
        assert_eq!(report.outcome.text(), None);
        assert_eq!(report.states, vec![RequestState::Routing, RequestState::Failed]);
    }

    #[tokio::test]
    async fn released_request_visits_every_state() {
        let o = orchestrator(desk());
        let ctx = Context::new("Ana", true, "billing");
        let report = o.run(&ctx, "I need a refund", &CancellationToken::new()).await;
        assert_eq!(
            report.states,
            vec![
                RequestState::Routing,
                RequestState::Dispatched,
                RequestState::Validating,
                RequestState::Released,
            ]
        );
        assert_eq!(report.route, Some(Route::Billing));
        assert_eq!(report.handler.as_deref(), Some("billing"));
        assert_eq!(report.capability.as_deref(), Some("refund"));
        assert_eq!(report.request_id.get_version_num(), 7);
    }

    #[tokio::test]
    async fn routing_failure_stops_before_dispatch() {
        let o = orchestrator(ScriptedProvider::new(ScriptedReply::Fail("down".into())));
        let report = o
            .run(&Context::new("Ana", true, "billing"), "refund", &CancellationToken::new())
            .await;
        assert_eq!(report.states, vec![RequestState::Routing, RequestState::Failed]);
        assert_eq!(report.outcome.error().map(|e| e.kind()), Some(FailureKind::Transient));
        assert_eq!(report.handler, None);
    }

    #[tokio::test]
    async fn cancelled_token_yields_cancelled() {
        let o = orchestrator(desk());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = o.run(&Context::new("Ana", true, "billing"), "refund", &cancel).await;
        assert_eq!(report.outcome, Outcome::Cancelled);
        assert_eq!(report.states.last(), Some(&RequestState::Cancelled));
    }

    #[tokio::test]
    async fn clones_share_pipeline() {
        let provider = desk();
        let o = orchestrator(provider.clone());
        let clone = o.clone();
        let ctx = Context::new("Ana", false, "general");
        clone.handle_request(&ctx, "what are your support hours").await;
        o.handle_request(&ctx, "what are your support hours").await;
        assert_eq!(provider.calls(), 4);
    }
}
