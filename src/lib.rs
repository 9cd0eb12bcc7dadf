//! Intake Assist: a staged, LLM-driven intake interview.

pub mod config;
pub mod error;
pub mod intake;
pub mod llm;
