//! Startup errors.
//!
//! Everything here aborts the process before the first request. Per-request
//! failures are [`crate::pipeline::PipelineError`] values carried inside an
//! [`crate::pipeline::Outcome`] and never become an `AppError`.

use thiserror::Error;

use crate::llm::ProviderError;

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or invalid configuration, including an unknown oracle
    /// provider or a keyed provider started without `LLM_API_KEY`.
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    /// The oracle client could not be constructed.
    #[error("provider error: {0}")]
    Provider(ProviderError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::UnknownProvider(_) | ProviderError::MissingApiKey(_) => {
                AppError::Config(e.to_string())
            }
            other => AppError::Provider(other),
        }
    }
}

impl AppError {
    /// Process exit status for the console binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 2,
            _ => 1,
        }
    }
}
