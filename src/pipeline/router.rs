//! Router: classifies a query into the fixed taxonomy and dispatches it.
//!
//! Classification is the only oracle call here. Dispatch is a pure lookup in
//! a [`DispatchTable`] built at startup. The router never answers a query:
//! in-scope queries go to exactly one handler, everything else gets
//! [`OUT_OF_SCOPE_REPLY`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::llm::{LlmProvider, LlmRequest, ProviderError, strip_code_fence};

use super::context::Context;
use super::error::{PipelineError, Stage};
use super::handlers::{CandidateResponse, Handler, SpecialistHandler};

/// Literal candidate for queries outside the taxonomy.
pub const OUT_OF_SCOPE_REPLY: &str = "This query is out of scope.";

const ROUTER_INSTRUCTIONS: &str = "\
You are the query routing specialist for a customer support desk.
Classify the user's message into exactly one category:
- billing: refunds, payments, invoices, charges
- technical: errors, outages, service restarts
- general: questions about features, plans, working hours, our services
- out_of_scope: anything unrelated to our support desk
Reply with the category label only. Never answer the message yourself.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Billing,
    Technical,
    General,
    OutOfScope,
}

impl Route {
    /// Categories that must have a handler.
    pub const IN_SCOPE: [Route; 3] = [Route::Billing, Route::Technical, Route::General];

    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Billing => "billing",
            Route::Technical => "technical",
            Route::General => "general",
            Route::OutOfScope => "out_of_scope",
        }
    }

    /// Map an oracle label onto the taxonomy. Total: anything that is not a
    /// known in-scope label is `OutOfScope`.
    pub fn from_label(label: &str) -> Route {
        let unfenced = strip_code_fence(label);
        let label = unfenced.as_deref().unwrap_or(label);
        let normalized: String = label
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '.' | '!' | ':'))
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();

        match normalized.as_str() {
            "billing" => Route::Billing,
            "technical" => Route::Technical,
            "general" => Route::General,
            _ => Route::OutOfScope,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification result for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub route: Route,
    /// Oracle reply as received, for diagnostics.
    pub raw_label: String,
}

// ── DispatchTable ─────────────────────────────────────────────────────────────

/// Category → handler lookup. Read-only after construction.
#[derive(Clone)]
pub struct DispatchTable {
    handlers: HashMap<Route, Arc<dyn Handler>>,
}

impl DispatchTable {
    /// Build a table, requiring exactly one handler per in-scope category and
    /// none for `OutOfScope`.
    pub fn new<I>(entries: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = (Route, Arc<dyn Handler>)>,
    {
        let mut handlers = HashMap::new();
        for (route, handler) in entries {
            if route == Route::OutOfScope {
                return Err(AppError::Config(
                    "out_of_scope cannot be bound to a handler".into(),
                ));
            }
            if handlers.insert(route, handler).is_some() {
                return Err(AppError::Config(format!(
                    "duplicate handler for route '{route}'"
                )));
            }
        }

        if let Some(missing) = Route::IN_SCOPE.iter().find(|r| !handlers.contains_key(*r)) {
            return Err(AppError::Config(format!("no handler for route '{missing}'")));
        }

        Ok(Self { handlers })
    }

    /// Built-in billing / technical / general desks.
    pub fn support_desk() -> Self {
        let mut handlers: HashMap<Route, Arc<dyn Handler>> = HashMap::new();
        handlers.insert(Route::Billing, Arc::new(SpecialistHandler::billing()));
        handlers.insert(Route::Technical, Arc::new(SpecialistHandler::technical()));
        handlers.insert(Route::General, Arc::new(SpecialistHandler::general()));
        Self { handlers }
    }

    pub fn handler(&self, route: Route) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(&route)
    }

    /// Hand the query to the handler for `decision`, or short-circuit to the
    /// out-of-scope literal without touching any handler.
    pub fn dispatch(
        &self,
        decision: &RouteDecision,
        ctx: &Context,
        query: &str,
    ) -> Result<CandidateResponse, PipelineError> {
        if decision.route == Route::OutOfScope {
            return Ok(CandidateResponse {
                text: OUT_OF_SCOPE_REPLY.to_string(),
                handler: None,
                capability: None,
            });
        }

        let handler = self.handler(decision.route).ok_or_else(|| PipelineError::MissingHandler {
            route: decision.route.to_string(),
        })?;
        debug!(route = %decision.route, handler = handler.id(), "dispatching");
        handler.respond(ctx, query)
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

pub struct Router {
    provider: LlmProvider,
    table: DispatchTable,
    timeout: Duration,
}

impl Router {
    /// `provider` is the process-wide oracle client; `timeout` bounds each
    /// classification call.
    pub fn new(provider: LlmProvider, table: DispatchTable, timeout: Duration) -> Self {
        Self { provider, table, timeout }
    }

    /// Classify `query`. Session attributes are not sent to the oracle; they
    /// only matter to capability predicates.
    pub async fn route(&self, ctx: &Context, query: &str) -> Result<RouteDecision, PipelineError> {
        debug!(issue = %ctx.issue(), premium = ctx.is_premium(), "classifying query");
        let request = LlmRequest::new(query).with_system(ROUTER_INSTRUCTIONS);

        let response = match timeout(self.timeout, self.provider.complete(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(ProviderError::Timeout(msg))) => {
                warn!(provider = self.provider.name(), %msg, "routing oracle timed out");
                return Err(PipelineError::Timeout { stage: Stage::Routing });
            }
            Ok(Err(e)) => {
                warn!(provider = self.provider.name(), error = %e, "routing oracle failed");
                return Err(PipelineError::Classification {
                    stage: Stage::Routing,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "routing oracle deadline elapsed"
                );
                return Err(PipelineError::Timeout { stage: Stage::Routing });
            }
        };

        if let Some(usage) = &response.usage {
            debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "routing oracle usage"
            );
        }
        let route = Route::from_label(&response.text);
        info!(%route, raw_label = %response.text, "query classified");
        Ok(RouteDecision { route, raw_label: response.text })
    }

    pub fn dispatch(
        &self,
        decision: &RouteDecision,
        ctx: &Context,
        query: &str,
    ) -> Result<CandidateResponse, PipelineError> {
        self.table.dispatch(decision, ctx, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::scripted::{ScriptedProvider, ScriptedReply};

    fn decision(route: Route) -> RouteDecision {
        RouteDecision { route, raw_label: route.to_string() }
    }

    fn entry(route: Route, handler: SpecialistHandler) -> (Route, Arc<dyn Handler>) {
        (route, Arc::new(handler))
    }

    fn router(provider: ScriptedProvider) -> Router {
        Router::new(provider.into(), DispatchTable::support_desk(), Duration::from_secs(5))
    }

    #[test]
    fn labels_map_onto_taxonomy() {
        assert_eq!(Route::from_label("billing"), Route::Billing);
        assert_eq!(Route::from_label("  Technical.\n"), Route::Technical);
        assert_eq!(Route::from_label("\"general\""), Route::General);
        assert_eq!(Route::from_label("**BILLING**"), Route::Billing);
        assert_eq!(Route::from_label("```\ntechnical\n```"), Route::Technical);
    }

    #[test]
    fn unknown_labels_are_out_of_scope() {
        for label in [
            "",
            "weather",
            "billing and technical",
            "out of scope",
            "Out-Of-Scope",
            "handoff: BillingAgent",
        ] {
            assert_eq!(Route::from_label(label), Route::OutOfScope, "label={label:?}");
        }
    }

    #[test]
    fn table_requires_every_in_scope_route() {
        let err = DispatchTable::new([entry(Route::Billing, SpecialistHandler::billing())])
            .err()
            .unwrap();
        assert!(err.to_string().contains("technical"));
    }

    #[test]
    fn table_rejects_out_of_scope_binding() {
        let entries = [
            entry(Route::Billing, SpecialistHandler::billing()),
            entry(Route::Technical, SpecialistHandler::technical()),
            entry(Route::General, SpecialistHandler::general()),
            entry(Route::OutOfScope, SpecialistHandler::general()),
        ];
        assert!(DispatchTable::new(entries).is_err());
    }

    #[test]
    fn table_rejects_duplicates() {
        let entries = [
            entry(Route::Billing, SpecialistHandler::billing()),
            entry(Route::Billing, SpecialistHandler::billing()),
        ];
        let err = DispatchTable::new(entries).err().unwrap();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn out_of_scope_short_circuits() {
        let ctx = Context::new("Jo", true, "billing");
        let resp = DispatchTable::support_desk()
            .dispatch(&decision(Route::OutOfScope), &ctx, "refund")
            .unwrap();
        assert_eq!(resp.text, OUT_OF_SCOPE_REPLY);
        assert_eq!(resp.handler, None);
    }

    #[test]
    fn in_scope_routes_reach_their_handler() {
        let ctx = Context::new("Jo", true, "technical");
        let table = DispatchTable::support_desk();
        for route in Route::IN_SCOPE {
            let resp = table.dispatch(&decision(route), &ctx, "q").unwrap();
            assert_eq!(resp.handler.as_deref(), Some(route.as_str()));
        }
    }

    #[tokio::test]
    async fn route_uses_oracle_label() {
        let r = router(ScriptedProvider::always("Billing"));
        let d = r.route(&Context::new("Jo", false, "billing"), "I want a refund").await.unwrap();
        assert_eq!(d.route, Route::Billing);
        assert_eq!(d.raw_label, "Billing");
    }

    #[tokio::test]
    async fn oracle_failure_is_classification_error() {
        let r = router(ScriptedProvider::new(ScriptedReply::Fail("503".into())));
        let err = r.route(&Context::new("Jo", false, "general"), "hi").await.unwrap_err();
        assert!(matches!(err, PipelineError::Classification { stage: Stage::Routing, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_oracle_times_out() {
        let r = router(ScriptedProvider::new(ScriptedReply::Stall));
        let err = r.route(&Context::new("Jo", false, "general"), "hi").await.unwrap_err();
        assert_eq!(err, PipelineError::Timeout { stage: Stage::Routing });
    }

    #[test]
    fn instructions_do_not_mention_the_guardrail() {
        assert!(ROUTER_INSTRUCTIONS.contains("routing"));
        assert!(!ROUTER_INSTRUCTIONS.to_lowercase().contains("guardrail"));
    }
}
