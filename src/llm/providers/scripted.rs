//! Scripted provider: deterministic, offline replies chosen by keyword rules.
//!
//! Rules are checked in order; the first one whose conditions hold supplies
//! the reply. Matching is case-insensitive: `any_of` is a substring test,
//! `any_word_of` compares whole words. Used for offline runs
//! (`[llm] default = "scripted"`) and as the oracle stub in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

use crate::llm::{LlmRequest, LlmResponse, ProviderError};

/// What a matched rule answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    Text(String),
    /// Fail the call with [`ProviderError::Request`].
    Fail(String),
    /// Never resolve. Lets callers exercise their own timeouts.
    Stall,
}

/// Condition on the user content.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ContentMatch {
    Any,
    Substring(Vec<String>),
    /// Each term as its lowercase word sequence.
    Words(Vec<Vec<String>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedRule {
    system_contains: Option<String>,
    content: ContentMatch,
    reply: ScriptedReply,
}

impl ScriptedRule {
    /// A rule that matches every request until narrowed.
    pub fn new(reply: ScriptedReply) -> Self {
        Self { system_contains: None, content: ContentMatch::Any, reply }
    }

    pub fn text(reply: impl Into<String>) -> Self {
        Self::new(ScriptedReply::Text(reply.into()))
    }

    /// Only match when the system instruction contains `needle`.
    pub fn when_system(mut self, needle: impl Into<String>) -> Self {
        self.system_contains = Some(needle.into().to_lowercase());
        self
    }

    /// Only match when the user content contains at least one of `terms`
    /// anywhere, including inside a longer word. No terms, no match.
    pub fn any_of<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = terms.into_iter().map(|t| t.as_ref().to_lowercase()).collect();
        self.content = ContentMatch::Substring(terms);
        self
    }

    /// Only match when the user content contains at least one of `terms` as
    /// whole words: "hate" matches "I hate this" but not "whatever". A
    /// multi-word term must appear as consecutive words. No terms, no match.
    pub fn any_word_of<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = terms
            .into_iter()
            .map(|t| words(t.as_ref()))
            .filter(|w| !w.is_empty())
            .collect();
        self.content = ContentMatch::Words(terms);
        self
    }

    fn matches(&self, request: &LlmRequest) -> bool {
        if let Some(needle) = &self.system_contains {
            let system = request.system.as_deref().unwrap_or_default().to_lowercase();
            if !system.contains(needle.as_str()) {
                return false;
            }
        }
        match &self.content {
            ContentMatch::Any => true,
            ContentMatch::Substring(terms) => {
                let content = request.content.to_lowercase();
                terms.iter().any(|term| content.contains(term.as_str()))
            }
            ContentMatch::Words(terms) => {
                let content = words(&request.content);
                terms.iter().any(|term| content.windows(term.len()).any(|w| w == term.as_slice()))
            }
        }
    }
}

/// Lowercase words of `text`, split on anything that is not alphanumeric.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    rules: Arc<Vec<ScriptedRule>>,
    fallback: ScriptedReply,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    /// A provider with no rules that answers every request with `fallback`.
    pub fn new(fallback: ScriptedReply) -> Self {
        Self {
            rules: Arc::new(Vec::new()),
            fallback,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shorthand for a provider that always answers `text`.
    pub fn always(text: impl Into<String>) -> Self {
        Self::new(ScriptedReply::Text(text.into()))
    }

    /// Append a rule. Rules added earlier win.
    pub fn rule(mut self, rule: ScriptedRule) -> Self {
        Arc::make_mut(&mut self.rules).push(rule);
        self
    }

    /// Offline support-desk script: keyword routing for the triage prompt and
    /// a whole-word `denylist` scan for the guardrail prompt. An empty
    /// denylist flags nothing.
    pub fn support_desk(denylist: &[String]) -> Self {
        let desk = Self::new(ScriptedReply::Fail("no scripted reply for this prompt".into()))
            .rule(
                ScriptedRule::text("billing")
                    .when_system("routing")
                    .any_of(["refund", "payment", "billing", "invoice", "charged", "bill "]),
            )
            .rule(
                ScriptedRule::text("technical")
                    .when_system("routing")
                    .any_of(["restart", "error", "down", "crash", "bug", "not working"]),
            )
            .rule(
                ScriptedRule::text("general")
                    .when_system("routing")
                    .any_of(["hours", "feature", "service", "support", "plan", "premium"]),
            )
            .rule(ScriptedRule::text("out_of_scope").when_system("routing"));

        let desk = if denylist.iter().any(|t| !t.trim().is_empty()) {
            desk.rule(
                ScriptedRule::text(r#"{"violates_policy": true}"#)
                    .when_system("guardrail")
                    .any_word_of(denylist),
            )
        } else {
            desk
        };
        desk.rule(ScriptedRule::text(r#"{"violates_policy": false}"#).when_system("guardrail"))
    }

    /// Number of `complete` calls served so far, across all clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let reply = self
            .rules
            .iter()
            .position(|r| r.matches(request))
            .map(|i| {
                trace!(rule = i, "scripted rule matched");
                &self.rules[i].reply
            })
            .unwrap_or(&self.fallback);

        match reply {
            ScriptedReply::Text(text) => Ok(LlmResponse { text: text.clone(), usage: None }),
            ScriptedReply::Fail(msg) => Err(ProviderError::Request(msg.clone())),
            ScriptedReply::Stall => {
                std::future::pending::<Result<LlmResponse, ProviderError>>().await
            }
        }
    }
}
