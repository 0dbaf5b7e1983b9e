//! Inference client abstraction.
//!
//! A single call that sends a prompt to the inference server and returns the
//! reply text or a classified failure. Retrying is left to the caller.

pub mod ollama;

use async_trait::async_trait;
use thiserror::Error;

pub use ollama::OllamaClient;

/// Failure of a single inference call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InferenceError {
    /// Connection refused, DNS failure or otherwise unreachable server.
    #[error("network error: {0}")]
    Network(String),

    /// No response within the configured window.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// The server signalled it is overloaded or still starting (HTTP 503).
    #[error("service unavailable: {0}")]
    ServerUnavailable(String),

    /// The call succeeded but the reply was blank.
    #[error("Empty response received from model")]
    EmptyResponse,

    /// Anything else, with the message kept for display.
    #[error("{0}")]
    Other(String),
}

/// Sends one prompt to the model.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Send a prompt and return the model's reply.
    ///
    /// A blank reply is reported as [`InferenceError::EmptyResponse`].
    async fn send(&self, prompt: &str) -> Result<String, InferenceError>;

    /// Human readable location of the server, used in guidance messages.
    fn endpoint(&self) -> &str;
}

/// Turn a raw reply into the final text, rejecting blank bodies.
pub(crate) fn non_empty_reply(text: &str) -> Result<String, InferenceError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(InferenceError::EmptyResponse)
    } else {
        Ok(trimmed.to_string())
    }
}
