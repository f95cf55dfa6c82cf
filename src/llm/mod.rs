//! LLM integration for cleaning up hard-to-parse addresses.

mod client;
mod config;
mod prompts;

pub use client::{LlmClient, LlmError};
pub use config::{LlmConfig, LlmProvider};
pub use prompts::DEFAULT_ADDRESS_PROMPT;
