//! HTTP embedding providers.
//!
//! - **Gemini**: `POST {base}/models/{model}:embedContent`
//! - **OpenAI-compatible**: `POST {base}/embeddings`
//!
//! Both draw API keys from a shared [`KeyRotationManager`] through
//! [`call_with_rotation`], so a rate-limited key is benched and the next
//! one is tried.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use repolens_core::embedding::EmbeddingProvider;
use repolens_core::error::UpstreamError;
use repolens_core::keyring::KeyRotationManager;

use crate::config::EmbeddingConfig;
use crate::upstream::{call_with_rotation, read_json, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Gemini,
    OpenAi,
}

/// Embedding provider backed by a hosted API.
pub struct HttpEmbedder {
    flavor: Flavor,
    model: String,
    dims: usize,
    base_url: String,
    client: reqwest::Client,
    keys: Arc<KeyRotationManager>,
    policy: RetryPolicy,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig, keys: Arc<KeyRotationManager>) -> Result<Self> {
        let flavor = match config.provider.as_str() {
            "gemini" => Flavor::Gemini,
            "openai" => Flavor::OpenAi,
            other => bail!("No HTTP embedding provider named '{}'", other),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            flavor,
            model: config.model.clone(),
            dims: config.dims,
            base_url: config.api_base().trim_end_matches('/').to_string(),
            client,
            keys,
            policy: RetryPolicy::new(config.max_retries, &config.keys),
        })
    }

    async fn embed_once(&self, api_key: &str, text: &str) -> Result<Vec<f32>, UpstreamError> {
        let json = match self.flavor {
            Flavor::Gemini => {
                let url = format!("{}/models/{}:embedContent", self.base_url, self.model);
                let body = json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [{ "text": text }] },
                });
                let resp = self
                    .client
                    .post(url)
                    .header("x-goog-api-key", api_key)
                    .json(&body)
                    .send()
                    .await;
                read_json(resp).await?
            }
            Flavor::OpenAi => {
                let url = format!("{}/embeddings", self.base_url);
                let body = json!({ "model": self.model, "input": text });
                let resp = self
                    .client
                    .post(url)
                    .bearer_auth(api_key)
                    .json(&body)
                    .send()
                    .await;
                read_json(resp).await?
            }
        };

        let vector = match self.flavor {
            Flavor::Gemini => parse_gemini_embedding(&json),
            Flavor::OpenAi => parse_openai_embedding(&json),
        }
        .ok_or_else(|| UpstreamError::Transient("embedding response missing vector".into()))?;

        if vector.len() != self.dims {
            return Err(UpstreamError::Rejected {
                status: 200,
                message: format!(
                    "model {} returned {} dimensions, expected {}",
                    self.model,
                    vector.len(),
                    self.dims
                ),
            });
        }
        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        call_with_rotation(&self.keys, &self.policy, |cred| async move {
            self.embed_once(cred.secret(), text).await
        })
        .await
    }
}

/// Used when `[embedding] provider = "disabled"`.
pub struct DisabledEmbedder;

#[async_trait]
impl EmbeddingProvider for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, UpstreamError> {
        Err(UpstreamError::Rejected {
            status: 0,
            message: "embeddings are disabled; set [embedding] provider in the config".into(),
        })
    }
}

/// Instantiate the provider named in the config.
pub fn create_embedder(
    config: &EmbeddingConfig,
    keys: Arc<KeyRotationManager>,
) -> Result<Arc<dyn EmbeddingProvider>> {
    if !config.is_enabled() {
        return Ok(Arc::new(DisabledEmbedder));
    }
    Ok(Arc::new(HttpEmbedder::new(config, keys)?))
}

/// `{"embedding": {"values": [...]}}`
fn parse_gemini_embedding(json: &Value) -> Option<Vec<f32>> {
    to_f32_vec(json.get("embedding")?.get("values")?)
}

/// `{"data": [{"embedding": [...]}]}`
fn parse_openai_embedding(json: &Value) -> Option<Vec<f32>> {
    to_f32_vec(json.get("data")?.get(0)?.get("embedding")?)
}

fn to_f32_vec(values: &Value) -> Option<Vec<f32>> {
    values
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gemini_response() {
        let json = json!({ "embedding": { "values": [0.5, -1.0, 2.0] } });
        assert_eq!(parse_gemini_embedding(&json), Some(vec![0.5, -1.0, 2.0]));
        assert_eq!(parse_gemini_embedding(&json!({ "error": {} })), None);
    }

    #[test]
    fn parses_openai_response() {
        let json = json!({ "data": [{ "index": 0, "embedding": [0.25, 0.75] }] });
        assert_eq!(parse_openai_embedding(&json), Some(vec![0.25, 0.75]));
        assert_eq!(parse_openai_embedding(&json!({ "data": [] })), None);
    }

    #[test]
    fn non_numeric_values_rejected() {
        assert_eq!(to_f32_vec(&json!([1.0, "x"])), None);
    }

    #[tokio::test]
    async fn disabled_embedder_rejects() {
        let config = EmbeddingConfig::default();
        let keys = Arc::new(KeyRotationManager::new(vec![], None));
        let embedder = create_embedder(&config, keys).unwrap();
        assert_eq!(embedder.model_name(), "disabled");
        let err = embedder.embed("hi").await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
