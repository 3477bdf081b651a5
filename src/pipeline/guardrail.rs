//! A narrow, independent policy check over candidate text.
//!
//! The guardrail sees only the text. It asks the oracle for a strict JSON
//! object `{"violates_policy": <bool>}` and rejects anything else as a
//! classification failure. A positive verdict is the tripwire: the
//! orchestrator then suppresses the candidate entirely.

use std::time::Duration;

use serde::Deserialize;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::config::GuardrailConfig;
use crate::llm::{LlmProvider, LlmRequest, OutputSchema, ProviderError, strip_code_fence};

use super::error::{PipelineError, Stage};

/// What the guardrail looks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardrailPolicy {
    /// Plain-language description, e.g. "offensive or rude language".
    pub concept: String,
    /// Example terms named in the instruction.
    pub terms: Vec<String>,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self {
            concept: "offensive or rude language".to_string(),
            terms: ["stupid", "idiot", "hate", "useless"].map(String::from).to_vec(),
        }
    }
}

impl From<&GuardrailConfig> for GuardrailPolicy {
    fn from(config: &GuardrailConfig) -> Self {
        Self { concept: config.concept.clone(), terms: config.terms.clone() }
    }
}

impl GuardrailPolicy {
    fn instructions(&self) -> String {
        let examples = if self.terms.is_empty() {
            String::new()
        } else {
            let quoted: Vec<String> = self.terms.iter().map(|t| format!("\"{t}\"")).collect();
            format!(" such as {}", quoted.join(", "))
        };
        format!(
            "You are a guardrail. Check whether the text contains any {}{examples}.\n\
             Return a JSON object with a single boolean field: \
             {{\"violates_policy\": true}} if it does, otherwise {{\"violates_policy\": false}}.",
            self.concept
        )
    }
}

/// Result of one guardrail check.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardrailVerdict {
    pub violates_policy: bool,
    /// Parsed oracle object, kept for diagnostics. Never contains the
    /// candidate text itself.
    pub diagnostic: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VerdictWire {
    violates_policy: bool,
}

pub struct Guardrail {
    provider: LlmProvider,
    instructions: String,
    timeout: Duration,
}

impl Guardrail {
    pub fn new(provider: LlmProvider, policy: GuardrailPolicy, timeout: Duration) -> Self {
        Self { provider, instructions: policy.instructions(), timeout }
    }

    /// Strict output schema sent with every check.
    pub fn schema() -> OutputSchema {
        OutputSchema {
            name: "guardrail_verdict".to_string(),
            schema: serde_json::json!({
                "type": "object",
                "properties": { "violates_policy": { "type": "boolean" } },
                "required": ["violates_policy"],
                "additionalProperties": false
            }),
        }
    }

    pub async fn validate(&self, candidate: &str) -> Result<GuardrailVerdict, PipelineError> {
        let request = LlmRequest::new(candidate)
            .with_system(self.instructions.clone())
            .with_schema(Self::schema());

        let response = match timeout(self.timeout, self.provider.complete(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(ProviderError::Timeout(msg))) => {
                warn!(provider = self.provider.name(), %msg, "guardrail oracle timed out");
                return Err(PipelineError::Timeout { stage: Stage::Validating });
            }
            Ok(Err(e)) => {
                warn!(provider = self.provider.name(), error = %e, "guardrail oracle failed");
                return Err(PipelineError::Classification {
                    stage: Stage::Validating,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "guardrail oracle deadline elapsed"
                );
                return Err(PipelineError::Timeout { stage: Stage::Validating });
            }
        };

        trace!(reply = %response.text, "guardrail oracle reply");
        if let Some(usage) = &response.usage {
            debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "guardrail oracle usage"
            );
        }
        let verdict = parse_verdict(&response.text).map_err(|message| {
            warn!(%message, "guardrail reply does not match schema");
            PipelineError::Classification { stage: Stage::Validating, message }
        })?;
        debug!(violates_policy = verdict.violates_policy, "guardrail verdict");
        Ok(verdict)
    }
}

fn parse_verdict(text: &str) -> Result<GuardrailVerdict, String> {
    let unfenced = strip_code_fence(text);
    let body = unfenced.as_deref().unwrap_or(text).trim();
    if body.is_empty() {
        return Err("empty guardrail reply".to_string());
    }

    let diagnostic: serde_json::Value =
        serde_json::from_str(body).map_err(|e| format!("guardrail reply is not JSON: {e}"))?;
    let wire: VerdictWire = serde_json::from_value(diagnostic.clone())
        .map_err(|e| format!("guardrail reply violates schema: {e}"))?;

    Ok(GuardrailVerdict { violates_policy: wire.violates_policy, diagnostic })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::scripted::{ScriptedProvider, ScriptedReply, ScriptedRule};

    fn guardrail(provider: ScriptedProvider) -> Guardrail {
        Guardrail::new(provider.into(), GuardrailPolicy::default(), Duration::from_secs(5))
    }

    fn denylist_oracle() -> ScriptedProvider {
        ScriptedProvider::always(r#"{"violates_policy": false}"#).rule(
            ScriptedRule::text(r#"{"violates_policy": true}"#)
                .any_word_of(GuardrailPolicy::default().terms),
        )
    }

    #[test]
    fn parses_plain_and_fenced_verdicts() {
        assert!(parse_verdict(r#"{"violates_policy": true}"#).unwrap().violates_policy);
        let fenced = "```json\n{\"violates_policy\": false}\n```";
        assert!(!parse_verdict(fenced).unwrap().violates_policy);
    }

    #[test]
    fn rejects_non_conforming_replies() {
        for reply in [
            "",
            "no",
            "true",
            r#"{"violates_policy": "yes"}"#,
            r#"{"contains_offensive": true}"#,
            r#"{"violates_policy": true, "reason": "rude"}"#,
        ] {
            assert!(parse_verdict(reply).is_err(), "reply={reply:?}");
        }
    }

    #[test]
    fn instructions_name_concept_and_terms() {
        let text = GuardrailPolicy::default().instructions();
        assert!(text.contains("guardrail"));
        assert!(text.contains("offensive or rude language"));
        assert!(text.contains("\"idiot\""));
        assert!(!text.contains("routing"));
    }

    #[test]
    fn schema_is_single_boolean_field() {
        let schema = Guardrail::schema().schema;
        assert_eq!(schema["required"], serde_json::json!(["violates_policy"]));
        assert_eq!(schema["additionalProperties"], false);
    }

    #[tokio::test]
    async fn flags_denylisted_text() {
        let g = guardrail(denylist_oracle());
        let v = g.validate("Only an idiot would ask that").await.unwrap();
        assert!(v.violates_policy);
        assert_eq!(v.diagnostic, serde_json::json!({"violates_policy": true}));
    }

    #[tokio::test]
    async fn passes_clean_text() {
        let g = guardrail(denylist_oracle());
        let v = g.validate("Your refund is on its way.").await.unwrap();
        assert!(!v.violates_policy);
    }

    #[tokio::test]
    async fn names_containing_a_term_pass() {
        let g = guardrail(denylist_oracle());
        let v = g.validate("Hello Shatera, your refund has been processed.").await.unwrap();
        assert!(!v.violates_policy);
    }

    #[tokio::test]
    async fn same_text_same_verdict() {
        let g = guardrail(denylist_oracle());
        for text in ["you are useless", "have a great day"] {
            let first = g.validate(text).await.unwrap();
            let second = g.validate(text).await.unwrap();
            assert_eq!(first, second);
        }
    }

    #[tokio::test]
    async fn malformed_reply_is_classification_failure() {
        let g = guardrail(ScriptedProvider::always("looks fine to me"));
        let err = g.validate("hello").await.unwrap_err();
        assert!(matches!(err, PipelineError::Classification { stage: Stage::Validating, .. }));
    }

    #[tokio::test]
    async fn provider_error_is_classification_failure() {
        let g = guardrail(ScriptedProvider::new(ScriptedReply::Fail("x".into())));
        assert!(matches!(
            g.validate("hello").await.unwrap_err(),
            PipelineError::Classification { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_oracle_times_out() {
        let g = guardrail(ScriptedProvider::new(ScriptedReply::Stall));
        let err = g.validate("hello").await.unwrap_err();
        assert_eq!(err, PipelineError::Timeout { stage: Stage::Validating });
    }
}
