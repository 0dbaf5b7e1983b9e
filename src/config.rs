//! Configuration management for llmchat.
//!
//! Configuration is loaded from `~/.config/llmchat/config.toml`. Every value
//! is fixed once the session starts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Inference server connection.
    #[serde(default)]
    pub server: ServerConfig,
    /// Conversation behaviour.
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Connection parameters for the Ollama server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Ollama host URL (default: http://localhost:11434).
    #[serde(default = "default_host")]
    pub host: String,
    /// Model name (default: deepseek-r1:1.5b).
    #[serde(default = "default_model")]
    pub model: String,
    /// Optional system prompt sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Optional sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            model: default_model(),
            system: None,
            temperature: None,
        }
    }
}

fn default_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "deepseek-r1:1.5b".to_string()
}

/// Retry, timeout and display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Attempts per prompt, including the first one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Name the assistant is shown under.
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            assistant_name: default_assistant_name(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_assistant_name() -> String {
    "DeepSeek".to_string()
}

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_retries must be at least 1")]
    NoAttempts,
    #[error("timeout_secs must be greater than 0")]
    ZeroTimeout,
    #[error("server host must not be empty")]
    EmptyHost,
    #[error("model name must not be empty")]
    EmptyModel,
}

impl Config {
    /// Get the config directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("llmchat"))
            .context("Could not determine config directory")
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, using defaults if not found.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Check the invariants the session relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chat.max_retries < 1 {
            return Err(ConfigError::NoAttempts);
        }
        if self.chat.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.server.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        Ok(())
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.chat.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "http://localhost:11434");
        assert_eq!(config.server.model, "deepseek-r1:1.5b");
        assert_eq!(config.chat.max_retries, 3);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("deepseek-r1:1.5b"));
        assert!(!toml.contains("system"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
[server]
model = "llama3.2:3b"
temperature = 0.2

[chat]
max_retries = 5
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.model, "llama3.2:3b");
        assert_eq!(config.server.host, "http://localhost:11434");
        assert_eq!(config.server.temperature, Some(0.2));
        assert_eq!(config.chat.max_retries, 5);
        assert_eq!(config.chat.timeout_secs, 30);
        assert_eq!(config.chat.assistant_name, "DeepSeek");
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let mut config = Config::default();
        config.chat.max_retries = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoAttempts));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.chat.timeout_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn test_validate_rejects_blank_model() {
        let mut config = Config::default();
        config.server.model = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::EmptyModel));
    }

    #[test]
    fn test_validate_rejects_blank_host() {
        let mut config = Config::default();
        config.server.host = String::new();
        assert_eq!(config.validate(), Err(ConfigError::EmptyHost));
    }
}
