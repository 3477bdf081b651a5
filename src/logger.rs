//! Tracing setup for the console binary and tests.
//!
//! Logs go to stderr; stdout carries only the prompts and the released reply.
//! A bare level (`"debug"`) applies to this crate and keeps the HTTP stack
//! behind the oracle client at `warn`, so `-vvvv` shows pipeline payloads
//! without connection-pool noise. Full `EnvFilter` directives pass through
//! unchanged.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Crates under the oracle HTTP client, held at `warn` for bare levels.
const QUIET_DEPS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "h2"];

/// Pick the level to log at. A CLI level always wins and also takes
/// precedence over `RUST_LOG`; otherwise the configured level is the
/// fallback for `RUST_LOG`.
///
/// Returns `(level, prefer_level)` ready for [`init`].
pub fn effective_level<'a>(cli_level: Option<&'a str>, configured: &'a str) -> (&'a str, bool) {
    match cli_level {
        Some(level) => (level, true),
        None => (configured, false),
    }
}

/// Expand `level` into filter directives.
fn directives(level: &str) -> String {
    match parse_level(level) {
        Ok(_) => {
            let mut out = level.to_ascii_lowercase();
            for dep in QUIET_DEPS {
                out.push_str(&format!(",{dep}=warn"));
            }
            out
        }
        Err(_) => level.to_string(),
    }
}

/// Install the global subscriber.
///
/// With `prefer_level`, `level` is used and `RUST_LOG` is only consulted when
/// `level` does not parse. Without it, `RUST_LOG` wins when set.
pub fn init(level: &str, prefer_level: bool) -> Result<(), AppError> {
    let from_level = || {
        EnvFilter::try_new(directives(level))
            .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))
    };

    let filter = if prefer_level {
        from_level().or_else(|level_err| {
            EnvFilter::try_from_default_env()
                .map_err(|env_err| AppError::Logger(format!("{level_err}; RUST_LOG: {env_err}")))
        })?
    } else {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => from_level()?,
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))
}

/// Parse a bare level name.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.trim().is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_levels_parse() {
        for l in ["error", "warn", "info", "debug", "trace", "OFF"] {
            assert!(parse_level(l).is_ok(), "expected '{l}' to be valid");
        }
        assert!(parse_level("verbose").is_err());
        assert!(parse_level(" ").is_err());
    }

    #[test]
    fn bare_level_quiets_http_stack() {
        let d = directives("Trace");
        assert!(d.starts_with("trace,"));
        assert!(d.contains("reqwest=warn"));
        assert!(d.contains("hyper=warn"));
    }

    #[test]
    fn directives_pass_through() {
        assert_eq!(directives("support_triage=debug"), "support_triage=debug");
    }

    #[test]
    fn cli_level_wins() {
        assert_eq!(effective_level(Some("trace"), "info"), ("trace", true));
        assert_eq!(effective_level(None, "warn"), ("warn", false));
    }

    #[test]
    fn init_succeeds_or_already_init() {
        match init("info", true) {
            Ok(()) => {}
            Err(AppError::Logger(msg)) if msg.contains("set subscriber") => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
