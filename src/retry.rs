//! Retry policy around a single inference call.
//!
//! Failures are classified into a backoff step: exponential for an overloaded
//! server, linear for timeouts and everything else. Once the attempts run out
//! the failure becomes a message the user can read, so a turn only ever ends
//! with text or with cancellation.

use crate::inference::{InferenceClient, InferenceError};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

const UNAVAILABLE_MESSAGE: &str = "❌ Service is currently unavailable. Please try again later.";
const TIMEOUT_MESSAGE: &str =
    "❌ Request timed out. The model might be processing a complex query. Please try a simpler question.";

/// The turn was interrupted before it produced a reply.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Operation was cancelled by user")]
pub struct Cancelled;

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Sleep, then try again.
    Wait(Duration),
    /// No attempts left; show this message.
    GiveUp(String),
}

/// Text shown for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Calls made to the inference client.
    pub attempts: u32,
    /// Whether `text` came from the model rather than a failure.
    pub succeeded: bool,
}

/// Bounded retries with classified backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

impl RetryPolicy {
    /// `max_retries` counts every attempt; values below 1 are raised to 1.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decide what follows a failed `attempt` (1-based).
    pub fn next_step(&self, failure: &InferenceError, attempt: u32) -> Step {
        let last = attempt >= self.max_retries;
        match failure {
            InferenceError::ServerUnavailable(_) if last => {
                Step::GiveUp(UNAVAILABLE_MESSAGE.to_string())
            }
            InferenceError::ServerUnavailable(_) => {
                Step::Wait(Duration::from_secs(2u64.saturating_pow(attempt)))
            }
            InferenceError::Timeout(_) if last => Step::GiveUp(TIMEOUT_MESSAGE.to_string()),
            _ if last => Step::GiveUp(format!("❌ Sorry, I encountered an error: {}", failure)),
            _ => Step::Wait(Duration::from_secs(u64::from(attempt))),
        }
    }

    /// Ask the model, retrying according to [`RetryPolicy::next_step`].
    ///
    /// Returns `Err(Cancelled)` as soon as `cancel` fires, whether the policy
    /// is waiting on the server or sleeping between attempts.
    pub async fn invoke<C>(
        &self,
        client: &C,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Reply, Cancelled>
    where
        C: InferenceClient + ?Sized,
    {
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Cancelled),
                result = client.send(prompt) => result,
            };

            let failure = match result {
                Ok(text) => {
                    return Ok(Reply {
                        text,
                        attempts: attempt,
                        succeeded: true,
                    })
                }
                Err(failure) => failure,
            };

            match &failure {
                InferenceError::ServerUnavailable(_) => {
                    warn!(attempt, "Service unavailable");
                }
                InferenceError::Timeout(_) => {
                    warn!(attempt, "Request timeout");
                }
                other => {
                    error!(attempt, error = %other, "Inference request failed");
                }
            }

            match self.next_step(&failure, attempt) {
                Step::GiveUp(text) => {
                    return Ok(Reply {
                        text,
                        attempts: attempt,
                        succeeded: false,
                    })
                }
                Step::Wait(delay) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
            attempt += 1;
        }
    }
}
