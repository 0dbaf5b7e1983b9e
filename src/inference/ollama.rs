//! Ollama HTTP client.
//!
//! Talks to the `/api/generate` endpoint of a local Ollama server with
//! streaming disabled, so every call yields the full reply at once.

use super::{non_empty_reply, InferenceClient, InferenceError};
use crate::config::ServerConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Client for a single Ollama model.
pub struct OllamaClient {
    model: String,
    host: String,
    system: Option<String>,
    temperature: Option<f32>,
    timeout: Duration,
    client: Client,
}

impl OllamaClient {
    /// Create a new client; every request is bounded by `timeout`.
    pub fn new(server: &ServerConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            model: server.model.clone(),
            host: server.host.trim_end_matches('/').to_string(),
            system: server.system.clone(),
            temperature: server.temperature,
            timeout,
            client,
        })
    }

    /// The model requests are sent to.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn classify(&self, err: reqwest::Error) -> InferenceError {
        if err.is_timeout() {
            InferenceError::Timeout(self.timeout.as_secs())
        } else if err.is_connect() {
            InferenceError::Network(format!("failed to connect to {}: {}", self.host, err))
        } else if err.is_decode() {
            InferenceError::Other(format!("Failed to parse Ollama response: {}", err))
        } else {
            InferenceError::Other(err.to_string())
        }
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn send(&self, prompt: &str) -> Result<String, InferenceError> {
        let url = format!("{}/api/generate", self.host);

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            system: self.system.as_deref(),
            stream: false,
            options: self.temperature.map(|temperature| GenerateOptions { temperature }),
        };

        debug!(model = %self.model, "sending prompt to ollama");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let generated: GenerateResponse = response.json().await.map_err(|e| self.classify(e))?;
        non_empty_reply(&generated.response)
    }

    fn endpoint(&self) -> &str {
        &self.host
    }
}

/// Map a non-success HTTP status to a failure kind.
fn status_error(status: StatusCode, body: &str) -> InferenceError {
    let detail = extract_error(body).unwrap_or_else(|| body.trim().to_string());
    if status == StatusCode::SERVICE_UNAVAILABLE {
        InferenceError::ServerUnavailable(format!("{} {}", status, detail).trim().to_string())
    } else {
        InferenceError::Other(
            format!("Ollama request failed with status {}: {}", status, detail)
                .trim()
                .to_string(),
        )
    }
}

/// Ollama reports failures as `{"error": "..."}`.
fn extract_error(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .map(|e| e.error)
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn server(host: String) -> ServerConfig {
        ServerConfig {
            host,
            ..ServerConfig::default()
        }
    }

    /// Read one full HTTP request so the client never sees a reset.
    async fn read_request(stream: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    /// Serve a single canned HTTP response and return the base URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_request(&mut stream).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_status_503_is_unavailable() {
        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(matches!(err, InferenceError::ServerUnavailable(_)));
    }

    #[test]
    fn test_other_status_keeps_ollama_message() {
        let err = status_error(StatusCode::NOT_FOUND, r#"{"error":"model 'x' not found"}"#);
        assert_eq!(
            err,
            InferenceError::Other(
                "Ollama request failed with status 404 Not Found: model 'x' not found".to_string()
            )
        );
    }

    #[test]
    fn test_request_omits_unset_options() {
        let request = GenerateRequest {
            model: "m",
            prompt: "p",
            system: None,
            stream: false,
            options: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"model": "m", "prompt": "p", "stream": false}));
    }

    #[test]
    fn test_host_trailing_slash_is_trimmed() {
        let client =
            OllamaClient::new(&server("http://localhost:11434/".to_string()), Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434");
        assert_eq!(client.model(), "deepseek-r1:1.5b");
    }

    #[tokio::test]
    async fn test_send_returns_reply() {
        let url = serve_once("200 OK", r#"{"response":"  Hello!  ","done":true}"#).await;
        let client = OllamaClient::new(&server(url), Duration::from_secs(5)).unwrap();
        assert_eq!(client.send("Hello").await.unwrap(), "Hello!");
    }

    #[tokio::test]
    async fn test_send_blank_reply_is_empty_response() {
        let url = serve_once("200 OK", r#"{"response":"   ","done":true}"#).await;
        let client = OllamaClient::new(&server(url), Duration::from_secs(5)).unwrap();
        assert_eq!(client.send("Hello").await, Err(InferenceError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_send_503_is_unavailable() {
        let url = serve_once("503 Service Unavailable", r#"{"error":"server busy"}"#).await;
        let client = OllamaClient::new(&server(url), Duration::from_secs(5)).unwrap();
        assert!(matches!(
            client.send("Hello").await,
            Err(InferenceError::ServerUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_send_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            OllamaClient::new(&server(format!("http://{}", addr)), Duration::from_secs(5)).unwrap();
        assert!(matches!(
            client.send("Hello").await,
            Err(InferenceError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_send_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_request(&mut stream).await;
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let client =
            OllamaClient::new(&server(format!("http://{}", addr)), Duration::from_millis(200))
                .unwrap();
        assert!(matches!(
            client.send("Hello").await,
            Err(InferenceError::Timeout(_))
        ));
    }
}
