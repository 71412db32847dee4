//! TOML configuration.
//!
//! The whole service is driven by one explicitly constructed [`Config`],
//! loaded once at startup and shared as `Arc<Config>`. Nothing reads
//! configuration from process-global state after loading.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Maximum evidence chunks handed to the answer generator (N).
    #[serde(default = "default_chunk_limit")]
    pub chunk_limit: usize,
    /// Questions shorter than this (after trimming) are rejected.
    #[serde(default = "default_min_question_length")]
    pub min_question_length: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_limit: default_chunk_limit(),
            min_question_length: default_min_question_length(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_chunk_limit() -> usize {
    6
}
fn default_min_question_length() -> usize {
    3
}
fn default_snippet_chars() -> usize {
    800
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    pub primary_model: String,
    #[serde(default)]
    pub fallback_model: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_web_search")]
    pub web_search: bool,
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/responses".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_output_tokens() -> u32 {
    900
}
fn default_web_search() -> bool {
    true
}

impl LlmConfig {
    /// Attempts per model, clamped to `1..=5`.
    pub fn attempts_per_model(&self) -> u32 {
        self.max_attempts.clamp(1, 5)
    }

    /// Ordered, deduplicated model list: primary first, then fallback.
    pub fn models(&self) -> Vec<String> {
        let mut models = vec![self.primary_model.trim().to_string()];
        if let Some(fallback) = self.fallback_model.as_deref().map(str::trim) {
            if !fallback.is_empty() && fallback != models[0] {
                models.push(fallback.to_string());
            }
        }
        models
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Turns loaded from the session before sanitising into prompt history.
    #[serde(default = "default_history_limit")]
    pub history_limit: i64,
    /// HMAC key used to hash client IP addresses before storage.
    #[serde(default)]
    pub ip_salt: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            ip_salt: String::new(),
        }
    }
}

fn default_history_limit() -> i64 {
    12
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.retrieval.chunk_limit < 1 {
        anyhow::bail!("retrieval.chunk_limit must be >= 1");
    }

    if config.retrieval.min_question_length < 1 {
        anyhow::bail!("retrieval.min_question_length must be >= 1");
    }

    if config.retrieval.snippet_chars < 1 {
        anyhow::bail!("retrieval.snippet_chars must be >= 1");
    }

    if config.llm.primary_model.trim().is_empty() {
        anyhow::bail!("llm.primary_model must not be empty");
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    if config.session.history_limit < 0 {
        anyhow::bail!("session.history_limit must be >= 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "/tmp/archive.sqlite"

[llm]
primary_model = "gpt-4.1-mini"
"#;

    #[test]
    fn test_defaults_applied() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.retrieval.chunk_limit, 6);
        assert_eq!(config.retrieval.min_question_length, 3);
        assert_eq!(config.llm.attempts_per_model(), 3);
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.session.history_limit, 12);
        assert_eq!(config.llm.models(), vec!["gpt-4.1-mini".to_string()]);
    }

    #[test]
    fn test_max_attempts_clamped() {
        let mut config = parse_config(MINIMAL).unwrap();
        config.llm.max_attempts = 0;
        assert_eq!(config.llm.attempts_per_model(), 1);
        config.llm.max_attempts = 42;
        assert_eq!(config.llm.attempts_per_model(), 5);
    }

    #[test]
    fn test_models_deduplicated() {
        let mut config = parse_config(MINIMAL).unwrap();
        config.llm.fallback_model = Some("gpt-4.1-mini".to_string());
        assert_eq!(config.llm.models().len(), 1);
        config.llm.fallback_model = Some("gpt-4o-mini".to_string());
        assert_eq!(
            config.llm.models(),
            vec!["gpt-4.1-mini".to_string(), "gpt-4o-mini".to_string()]
        );
    }

    #[test]
    fn test_rejects_zero_chunk_limit() {
        let text = format!("{}\n[retrieval]\nchunk_limit = 0\n", MINIMAL);
        assert!(parse_config(&text).is_err());
    }
}
