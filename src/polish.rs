//! Last-resort address cleanup by an LLM.
//!
//! The extraction stages are synchronous; the LLM client is async. The
//! [`LlmPolisher`] bridges the two on the current tokio runtime, so it must be
//! called from a blocking context (`spawn_blocking` or a plain thread that
//! holds a runtime handle).

use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tracing::debug;

use crate::llm::{LlmClient, LlmConfig, LlmError};

#[derive(Debug, Error)]
pub enum PolishError {
    #[error("Address polishing is disabled")]
    Disabled,

    #[error("Address polishing unavailable: {0}")]
    Unavailable(String),

    #[error("Address polishing timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Turns a noisy candidate (or a whole page of text) into one address line.
///
/// `Ok("")` means the polisher looked and found no address.
pub trait AddressPolisher: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_enabled(&self) -> bool;

    fn polish(&self, candidate: &str) -> Result<String, PolishError>;
}

/// Polisher used when no LLM is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPolisher;

impl AddressPolisher for NoopPolisher {
    fn name(&self) -> &'static str {
        "none"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn polish(&self, _candidate: &str) -> Result<String, PolishError> {
        Err(PolishError::Disabled)
    }
}

pub struct LlmPolisher {
    client: LlmClient,
    timeout: Duration,
}

impl LlmPolisher {
    pub fn new(client: LlmClient) -> Self {
        let timeout = Duration::from_secs(client.config().timeout_secs.max(1));
        Self { client, timeout }
    }

    pub fn from_config(config: LlmConfig) -> Result<Self, LlmError> {
        Ok(Self::new(LlmClient::new(config)?))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn client(&self) -> &LlmClient {
        &self.client
    }
}

impl AddressPolisher for LlmPolisher {
    fn name(&self) -> &'static str {
        "llm"
    }

    fn is_enabled(&self) -> bool {
        self.client.config().enabled && self.client.config().has_credentials()
    }

    fn polish(&self, candidate: &str) -> Result<String, PolishError> {
        if !self.is_enabled() {
            return Err(PolishError::Disabled);
        }
        let handle = Handle::try_current().map_err(|_| {
            PolishError::Unavailable("No tokio runtime available for address polishing".to_string())
        })?;

        let started = std::time::Instant::now();
        let result = handle.block_on(async {
            tokio::time::timeout(self.timeout, self.client.polish_address(candidate)).await
        });
        debug!("LLM polish took {:?}", started.elapsed());

        match result {
            Ok(response) => Ok(response?),
            Err(_) => Err(PolishError::Timeout(self.timeout)),
        }
    }
}
