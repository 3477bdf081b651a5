//! Configuration: TOML file + environment.
//!
//! The file is `config/default.toml` under the working directory unless
//! `-f/--config` names another. A missing default file means built-in
//! defaults; a missing explicit file is an error. `SUPPORT_TRIAGE_LOG_LEVEL`
//! overrides `[app] log_level`. The oracle key comes only from `LLM_API_KEY`.

use std::{env, fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::debug;

use crate::error::AppError;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

const LOG_LEVEL_ENV: &str = "SUPPORT_TRIAGE_LOG_LEVEL";
const API_KEY_ENV: &str = "LLM_API_KEY";

/// `[llm.openai]`: any `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub endpoint: String,
    pub model: String,
    /// Dropped from the payload for models that reject it.
    pub temperature: f32,
    /// HTTP-level deadline; the stage timeouts in [`PipelineConfig`] still apply.
    pub request_timeout: Duration,
}

/// `[llm.scripted]`: offline keyword oracle.
#[derive(Debug, Clone)]
pub struct ScriptedConfig {
    /// Terms the scripted guardrail flags.
    pub denylist: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// `[llm] default`: `"scripted"`, `"openai"` or `"openai-compatible"`.
    pub provider: String,
    pub openai: OpenAiConfig,
    pub scripted: ScriptedConfig,
}

/// Deadlines for the two oracle-backed stages.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub router_timeout: Duration,
    pub guardrail_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct GuardrailConfig {
    pub concept: String,
    pub terms: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    pub log_level: String,
    pub llm: LlmConfig,
    /// `None` is fine for the scripted provider.
    pub llm_api_key: Option<String>,
    pub pipeline: PipelineConfig,
    pub guardrail: GuardrailConfig,
}

// ── TOML shape ────────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    app: AppSection,
    llm: LlmSection,
    pipeline: PipelineSection,
    guardrail: GuardrailSection,
}

#[derive(Deserialize)]
#[serde(default)]
struct AppSection {
    name: String,
    log_level: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self { name: "support-triage".into(), log_level: "info".into() }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct LlmSection {
    #[serde(rename = "default")]
    provider: String,
    openai: OpenAiSection,
    scripted: ScriptedSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "scripted".into(),
            openai: OpenAiSection::default(),
            scripted: ScriptedSection::default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct OpenAiSection {
    api_base_url: String,
    model: String,
    temperature: f32,
    timeout_seconds: u64,
}

impl Default for OpenAiSection {
    fn default() -> Self {
        Self {
            api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
                .into(),
            model: "gemini-2.0-flash".into(),
            temperature: 0.0,
            timeout_seconds: 30,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ScriptedSection {
    /// Falls back to `[guardrail] terms`.
    denylist: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(default)]
struct PipelineSection {
    router_timeout_ms: u64,
    guardrail_timeout_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self { router_timeout_ms: 30_000, guardrail_timeout_ms: 30_000 }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct GuardrailSection {
    concept: String,
    terms: Vec<String>,
}

impl Default for GuardrailSection {
    fn default() -> Self {
        Self {
            concept: "offensive or rude language".into(),
            terms: ["stupid", "idiot", "hate", "useless"].map(String::from).to_vec(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load from `path` (or [`DEFAULT_CONFIG_PATH`]) and apply env overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let log_level = env::var(LOG_LEVEL_ENV).ok();
    let api_key = env::var(API_KEY_ENV).ok();

    let path = match path {
        Some(p) => Path::new(p),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Path::new(DEFAULT_CONFIG_PATH),
        None => {
            debug!("{DEFAULT_CONFIG_PATH} not found; using built-in defaults");
            return resolve(FileConfig::default(), log_level.as_deref(), api_key);
        }
    };
    load_from(path, log_level.as_deref(), api_key)
}

/// Load `path` with explicit overrides instead of reading the environment.
pub fn load_from(
    path: &Path,
    log_level_override: Option<&str>,
    api_key: Option<String>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    from_toml_str(&raw, log_level_override, api_key).map_err(|e| match e {
        AppError::Config(msg) => AppError::Config(format!("{}: {msg}", path.display())),
        other => other,
    })
}

pub fn from_toml_str(
    raw: &str,
    log_level_override: Option<&str>,
    api_key: Option<String>,
) -> Result<Config, AppError> {
    let file: FileConfig =
        toml::from_str(raw).map_err(|e| AppError::Config(format!("parse error: {e}")))?;
    resolve(file, log_level_override, api_key)
}

fn resolve(
    file: FileConfig,
    log_level_override: Option<&str>,
    api_key: Option<String>,
) -> Result<Config, AppError> {
    let FileConfig { app, llm, pipeline, guardrail } = file;

    if pipeline.router_timeout_ms == 0 || pipeline.guardrail_timeout_ms == 0 {
        return Err(AppError::Config("pipeline timeouts must be greater than zero".into()));
    }
    if guardrail.concept.trim().is_empty() {
        return Err(AppError::Config("guardrail.concept must not be empty".into()));
    }
    if blank_terms(&guardrail.terms) {
        return Err(AppError::Config("guardrail.terms must name at least one term".into()));
    }
    if llm.scripted.denylist.as_deref().is_some_and(blank_terms) {
        return Err(AppError::Config("llm.scripted.denylist must name at least one term".into()));
    }

    Ok(Config {
        app_name: app.name,
        log_level: log_level_override.map_or(app.log_level, str::to_string),
        llm: LlmConfig {
            provider: llm.provider,
            openai: OpenAiConfig {
                endpoint: llm.openai.api_base_url,
                model: llm.openai.model,
                temperature: llm.openai.temperature,
                request_timeout: Duration::from_secs(llm.openai.timeout_seconds),
            },
            scripted: ScriptedConfig {
                denylist: llm.scripted.denylist.unwrap_or_else(|| guardrail.terms.clone()),
            },
        },
        llm_api_key: api_key,
        pipeline: PipelineConfig {
            router_timeout: Duration::from_millis(pipeline.router_timeout_ms),
            guardrail_timeout: Duration::from_millis(pipeline.guardrail_timeout_ms),
        },
        guardrail: GuardrailConfig { concept: guardrail.concept, terms: guardrail.terms },
    })
}

fn blank_terms(terms: &[String]) -> bool {
    terms.iter().all(|t| t.trim().is_empty())
}
