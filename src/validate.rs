//! Preflight check run before the conversation starts.

use crate::inference::{InferenceClient, InferenceError};
use std::io::{self, Write};
use tracing::error;

const PROBE_PROMPT: &str = "Hello";

/// Send one probe prompt and report whether the server answered.
///
/// There are no retries here: a server that cannot answer a greeting is
/// reported straight away with guidance for the user.
pub async fn validate<C, W>(client: &C, out: &mut W) -> io::Result<bool>
where
    C: InferenceClient + ?Sized,
    W: Write,
{
    match client.send(PROBE_PROMPT).await {
        Ok(reply) => Ok(!reply.trim().is_empty()),
        Err(InferenceError::Network(reason)) => {
            error!(%reason, "HTTP connection error during validation");
            writeln!(out, "❌ Connection error: Unable to reach Ollama server.")?;
            writeln!(out, "   Please ensure Ollama is running on {}", client.endpoint())?;
            Ok(false)
        }
        Err(InferenceError::Timeout(secs)) => {
            error!(secs, "Connection timeout during validation");
            writeln!(out, "❌ Connection timeout: Ollama server is not responding.")?;
            Ok(false)
        }
        Err(other) => {
            error!(error = %other, "Unexpected error during connection validation");
            writeln!(out, "❌ Validation error: {}", other)?;
            Ok(false)
        }
    }
}
