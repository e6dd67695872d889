//! Calls to rate-limited upstream providers.
//!
//! Every embedding and generation request goes through
//! [`call_with_rotation`], which draws a key from the provider's
//! [`KeyRotationManager`] before each attempt.
//!
//! # Retry Strategy
//!
//! - HTTP 429 → report the key (it cools down), retry at once with the next key
//! - HTTP 5xx / 408 / network error → retry with exponential backoff
//!   (1s, 2s, 4s, ... capped at 2^5)
//! - other HTTP 4xx → fail immediately
//! - pool exhausted → sleep until the earliest key is ready if that fits in
//!   `max_wait_secs`, otherwise fail with `QuotaExhausted`

use std::future::Future;
use std::time::Duration;

use repolens_core::error::UpstreamError;
use repolens_core::keyring::{Credential, FailureKind, KeyRotationManager};

use crate::config::{KeyPoolConfig, MAX_COOLDOWN_SECS, MAX_THROTTLE_MS};

/// Build a key pool from the environment variables named by `cfg`.
pub fn pool_from_env(cfg: &KeyPoolConfig) -> KeyRotationManager {
    pool_from_lookup(cfg, |name| std::env::var(name).ok())
}

/// Build a key pool, resolving variable names through `lookup`.
pub fn pool_from_lookup<F>(cfg: &KeyPoolConfig, lookup: F) -> KeyRotationManager
where
    F: Fn(&str) -> Option<String>,
{
    let keys: Vec<String> = (1..=cfg.max_keys)
        .filter_map(|i| lookup(&format!("{}{}", cfg.env_prefix, i)))
        .collect();
    let fallback = cfg.fallback_env.as_deref().and_then(&lookup);

    let pool = KeyRotationManager::new(keys, fallback)
        .with_cooldown(chrono::Duration::seconds(
            cfg.cooldown_secs.min(MAX_COOLDOWN_SECS) as i64,
        ))
        .with_throttle(chrono::Duration::milliseconds(
            cfg.throttle_ms.min(MAX_THROTTLE_MS) as i64,
        ));

    tracing::debug!(
        prefix = %cfg.env_prefix,
        pool_size = pool.len(),
        has_fallback = pool.has_fallback(),
        "loaded API key pool"
    );
    pool
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Total time a call may spend waiting for an exhausted pool.
    pub max_wait: Duration,
    /// First backoff delay for transient failures; doubles per attempt.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, keys: &KeyPoolConfig) -> Self {
        Self {
            max_retries,
            max_wait: Duration::from_secs(keys.max_wait_secs),
            backoff_base: Duration::from_secs(1),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * (1u32 << attempt.saturating_sub(1).min(5))
    }
}

/// Run `call` with a key from `keys`, rotating and retrying per the
/// module-level strategy.
pub async fn call_with_rotation<T, F, Fut>(
    keys: &KeyRotationManager,
    policy: &RetryPolicy,
    mut call: F,
) -> Result<T, UpstreamError>
where
    F: FnMut(Credential) -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let mut attempt = 0u32;
    let mut waited = Duration::ZERO;
    let mut last_err = UpstreamError::QuotaExhausted;

    while attempt <= policy.max_retries {
        let credential = match keys.acquire() {
            Ok(c) => c,
            Err(UpstreamError::QuotaExhausted) => {
                let wait = keys
                    .next_ready_in()
                    .map(|d| d.max(Duration::from_millis(10)));
                match wait {
                    Some(d) if waited + d <= policy.max_wait => {
                        tracing::info!(wait_ms = d.as_millis() as u64, "waiting for an API key");
                        tokio::time::sleep(d).await;
                        waited += d;
                        continue;
                    }
                    _ => return Err(UpstreamError::QuotaExhausted),
                }
            }
            Err(e) => return Err(e),
        };

        match call(credential.clone()).await {
            Ok(value) => return Ok(value),
            Err(e @ UpstreamError::RateLimited { .. }) => {
                keys.report(&credential, FailureKind::RateLimited);
                last_err = e;
            }
            Err(e @ UpstreamError::Transient(_)) => {
                tracing::warn!(attempt, key = %credential, error = %e, "transient upstream failure");
                last_err = e;
                if attempt < policy.max_retries {
                    tokio::time::sleep(policy.backoff(attempt + 1)).await;
                }
            }
            Err(e) => return Err(e),
        }
        attempt += 1;
    }

    Err(last_err)
}

/// Map a finished HTTP exchange to JSON or a classified failure.
pub async fn read_json(
    resp: Result<reqwest::Response, reqwest::Error>,
) -> Result<serde_json::Value, UpstreamError> {
    let response = resp.map_err(|e| UpstreamError::Transient(e.to_string()))?;
    let status = response.status();

    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| UpstreamError::Transient(format!("invalid JSON response: {}", e)));
    }

    let body = response.text().await.unwrap_or_default();
    Err(UpstreamError::from_status(status.as_u16(), body))
}
