//! Oracle provider implementations.
//!
//! `build(config, api_key)` is the factory, called once at startup.
//! Adding a new backend = new module + new match arm.

pub mod openai_compatible;
pub mod scripted;

use tracing::debug;

use crate::config::LlmConfig;
use crate::llm::{LlmProvider, ProviderError};

/// Construct a `LlmProvider` from config and an optional API key.
///
/// `api_key` is sourced from `LLM_API_KEY` env (never TOML). Keyed backends
/// refuse to start without it.
pub fn build(config: &LlmConfig, api_key: Option<String>) -> Result<LlmProvider, ProviderError> {
    match config.provider.as_str() {
        "scripted" => {
            debug!(denylist = ?config.scripted.denylist, "building scripted provider");
            Ok(LlmProvider::Scripted(scripted::ScriptedProvider::support_desk(
                &config.scripted.denylist,
            )))
        }
        "openai" | "openai-compatible" => {
            let api_key = api_key
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| ProviderError::MissingApiKey(config.provider.clone()))?;
            let oai = &config.openai;
            debug!(
                model = %oai.model,
                endpoint = %oai.endpoint,
                "building openai-compatible provider"
            );
            let p = openai_compatible::OpenAiCompatibleProvider::new(
                oai.endpoint.clone(),
                oai.model.clone(),
                oai.temperature,
                oai.request_timeout,
                Some(api_key),
            )?;
            Ok(LlmProvider::OpenAiCompatible(p))
        }
        _ => Err(ProviderError::UnknownProvider(config.provider.clone())),
    }
}
