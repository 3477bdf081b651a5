//! Support triage: route a customer query to a specialist desk, answer it
//! from gated capabilities, and release the answer only past a guardrail.

pub mod config;
pub mod error;
pub mod llm;
pub mod logger;
pub mod pipeline;
