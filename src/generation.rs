//! HTTP text generation providers.
//!
//! - **Gemini**: `POST {base}/models/{model}:generateContent`
//! - **OpenAI-compatible** (Groq, OpenAI): `POST {base}/chat/completions`

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use repolens_core::error::UpstreamError;
use repolens_core::generation::GenerationProvider;
use repolens_core::keyring::KeyRotationManager;

use crate::config::GenerationConfig;
use crate::upstream::{call_with_rotation, read_json, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Gemini,
    OpenAi,
}

pub struct HttpGenerator {
    flavor: Flavor,
    model: String,
    base_url: String,
    client: reqwest::Client,
    keys: Arc<KeyRotationManager>,
    policy: RetryPolicy,
}

impl HttpGenerator {
    pub fn new(config: &GenerationConfig, keys: Arc<KeyRotationManager>) -> Result<Self> {
        let flavor = match config.provider.as_str() {
            "gemini" => Flavor::Gemini,
            "openai" => Flavor::OpenAi,
            other => bail!("No HTTP generation provider named '{}'", other),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            flavor,
            model: config.model.clone(),
            base_url: config.api_base().trim_end_matches('/').to_string(),
            client,
            keys,
            policy: RetryPolicy::new(config.max_retries, &config.keys),
        })
    }

    async fn generate_once(&self, api_key: &str, prompt: &str) -> Result<String, UpstreamError> {
        let request = match self.flavor {
            Flavor::Gemini => self
                .client
                .post(format!(
                    "{}/models/{}:generateContent",
                    self.base_url, self.model
                ))
                .header("x-goog-api-key", api_key)
                .json(&json!({ "contents": [{ "parts": [{ "text": prompt }] }] })),
            Flavor::OpenAi => self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(api_key)
                .json(&json!({
                    "model": self.model,
                    "messages": [{ "role": "user", "content": prompt }],
                })),
        };

        let json = read_json(request.send().await).await?;
        let text = match self.flavor {
            Flavor::Gemini => parse_gemini_text(&json),
            Flavor::OpenAi => parse_chat_text(&json),
        };
        text.ok_or_else(|| UpstreamError::Transient("generation response missing text".into()))
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError> {
        call_with_rotation(&self.keys, &self.policy, |cred| async move {
            self.generate_once(cred.secret(), prompt).await
        })
        .await
    }
}

/// Used when `[generation] provider = "disabled"`.
pub struct DisabledGenerator;

#[async_trait]
impl GenerationProvider for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, UpstreamError> {
        Err(UpstreamError::Rejected {
            status: 0,
            message: "generation is disabled; set [generation] provider in the config".into(),
        })
    }
}

pub fn create_generator(
    config: &GenerationConfig,
    keys: Arc<KeyRotationManager>,
) -> Result<Arc<dyn GenerationProvider>> {
    if !config.is_enabled() {
        return Ok(Arc::new(DisabledGenerator));
    }
    Ok(Arc::new(HttpGenerator::new(config, keys)?))
}

/// Concatenated text parts of the first candidate.
fn parse_gemini_text(json: &Value) -> Option<String> {
    let parts = json
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    Some(text)
}

fn parse_chat_text(json: &Value) -> Option<String> {
    json.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gemini_candidates() {
        let json = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Hello, " }, { "text": "world" }] } }]
        });
        assert_eq!(parse_gemini_text(&json).as_deref(), Some("Hello, world"));
        assert_eq!(parse_gemini_text(&json!({ "candidates": [] })), None);
    }

    #[test]
    fn parses_chat_completion() {
        let json = json!({ "choices": [{ "message": { "role": "assistant", "content": "42" } }] });
        assert_eq!(parse_chat_text(&json).as_deref(), Some("42"));
        assert_eq!(parse_chat_text(&json!({})), None);
    }

    #[tokio::test]
    async fn disabled_generator_rejects() {
        let keys = Arc::new(KeyRotationManager::new(vec![], None));
        let generator = create_generator(&GenerationConfig::default(), keys).unwrap();
        assert!(generator.generate("hi").await.is_err());
    }
}
