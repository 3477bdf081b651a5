//! Tests for the shipped config/default.toml

use std::path::Path;
use std::time::Duration;

use support_triage::config;
use support_triage::error::AppError;
use support_triage::pipeline::{Context, Orchestrator};

#[test]
fn test_default_config_parses() {
    let cfg = config::load_from(Path::new(config::DEFAULT_CONFIG_PATH), None, None).unwrap();
    assert_eq!(cfg.app_name, "support-triage");
    assert_eq!(cfg.llm.provider, "scripted");
    assert_eq!(cfg.guardrail.concept, "offensive or rude language");
    assert_eq!(cfg.llm.scripted.denylist, cfg.guardrail.terms);
    assert_eq!(cfg.pipeline.router_timeout, Duration::from_secs(30));
}

#[tokio::test]
async fn test_default_config_runs_offline() {
    let cfg = config::load_from(Path::new(config::DEFAULT_CONFIG_PATH), None, None).unwrap();
    let o = Orchestrator::from_config(&cfg).unwrap();

    let outcome = o
        .handle_request(&Context::new("Ana", true, "billing"), "I want a refund")
        .await;
    assert!(outcome.text().unwrap_or_default().contains("3-5 business days"));

    let outcome = o
        .handle_request(&Context::new("Idiot", false, "general"), "what plans do you offer")
        .await;
    assert!(outcome.is_blocked());
}

#[tokio::test]
async fn test_default_config_releases_names_containing_a_denylisted_fragment() {
    let cfg = config::load_from(Path::new(config::DEFAULT_CONFIG_PATH), None, None).unwrap();
    let o = Orchestrator::from_config(&cfg).unwrap();

    let outcome = o
        .handle_request(&Context::new("Shatera", true, "billing"), "I want a refund")
        .await;
    assert!(outcome.is_released(), "{outcome:?}");
    assert!(outcome.text().unwrap_or_default().starts_with("Hello Shatera,"));
}

#[test]
fn test_empty_guardrail_terms_are_a_config_error() {
    let err = config::from_toml_str("[guardrail]\nterms = []\n", None, None).unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_keyed_provider_without_key_is_config_error() {
    let cfg = config::from_toml_str("[llm]\ndefault = \"openai\"\n", None, None).unwrap();
    let err = Orchestrator::from_config(&cfg).err().unwrap();
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().contains("LLM_API_KEY"));
}

#[test]
fn test_unknown_provider_is_config_error() {
    let cfg = config::from_toml_str("[llm]\ndefault = \"carrier-pigeon\"\n", None, None).unwrap();
    let err = Orchestrator::from_config(&cfg).err().unwrap();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn test_keyed_provider_with_key_builds() {
    let cfg =
        config::from_toml_str("[llm]\ndefault = \"openai\"\n", None, Some("sk-test".into()))
            .unwrap();
    assert!(Orchestrator::from_config(&cfg).is_ok());
}
