//! Oracle provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared and immutable. Clone them freely.
//! The router and the guardrail each hold a clone; nothing mutates a provider
//! after startup.

pub mod providers;

use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider '{0}' requires LLM_API_KEY")]
    MissingApiKey(String),
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider request timed out: {0}")]
    Timeout(String),
}

// ── Request / response ────────────────────────────────────────────────────────

/// JSON schema a structured reply must conform to.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    /// Schema name sent to backends that require one.
    pub name: String,
    pub schema: serde_json::Value,
}

/// One oracle round-trip: optional system instruction, user content, and an
/// optional structured-output schema.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub content: String,
    pub schema: Option<OutputSchema>,
}

impl LlmRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            system: None,
            content: content.into(),
            schema: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_schema(mut self, schema: OutputSchema) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Token counts reported by the provider, when available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LlmUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Option<LlmUsage>,
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Enum dispatch avoids `dyn` trait objects and the `async-trait` dependency.
/// Adding a backend = new module + new variant + new `complete` arm.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
    Scripted(providers::scripted::ScriptedProvider),
}

impl LlmProvider {
    /// Send `request` to the provider and return its text reply.
    pub async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        match self {
            LlmProvider::OpenAiCompatible(p) => p.complete(request).await,
            LlmProvider::Scripted(p) => p.complete(request).await,
        }
    }

    /// Short backend name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::OpenAiCompatible(_) => "openai-compatible",
            LlmProvider::Scripted(_) => "scripted",
        }
    }
}

impl From<providers::scripted::ScriptedProvider> for LlmProvider {
    fn from(p: providers::scripted::ScriptedProvider) -> Self {
        LlmProvider::Scripted(p)
    }
}

/// Return the body of a fenced block (```json … ```), or `None` when `text`
/// is not fenced.
pub fn strip_code_fence(text: &str) -> Option<String> {
    let text = text.trim();
    if !text.starts_with("```") {
        return None;
    }

    let mut lines = text.lines();
    let _first = lines.next()?;
    let mut body = Vec::new();
    for line in lines {
        if line.trim_start().starts_with("```") {
            break;
        }
        body.push(line);
    }
    Some(body.join("\n"))
}
