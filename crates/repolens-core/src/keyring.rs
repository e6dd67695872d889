//! API-key rotation with per-key throttle spacing and rate-limit cooldown.
//!
//! A [`KeyRotationManager`] owns the credentials for one rate-limited
//! upstream provider. Every outbound call first asks for a key with
//! [`acquire`](KeyRotationManager::acquire); when the provider answers with
//! a rate-limit error the caller hands the key back through
//! [`report_failure`](KeyRotationManager::report_failure) and the key is
//! benched for the cooldown period.
//!
//! # Selection
//!
//! ```text
//!   cursor
//!     │
//!     ▼
//!   [K1] [K2] [K3] ... [Kn]      scan from cursor, wrapping once
//!     │
//!     ├─ usable?  now >= cooldown_until && now - last_used_at >= throttle
//!     │     yes → stamp last_used_at, cursor = slot + 1, return slot
//!     │
//!     └─ none usable → fallback key (never throttled, never cooled down)
//!                      └─ no fallback → UpstreamError::QuotaExhausted
//! ```
//!
//! All slot state sits behind one mutex, so two concurrent callers can
//! never both be handed the same slot inside one throttle window.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::Duration;
//! use repolens_core::clock::ManualClock;
//! use repolens_core::keyring::{FailureKind, KeyRotationManager};
//!
//! let clock = Arc::new(ManualClock::at_epoch());
//! let keys = KeyRotationManager::new(vec!["k1".into(), "k2".into()], None)
//!     .with_clock(clock.clone());
//!
//! assert_eq!(keys.acquire().unwrap().secret(), "k1");
//! assert_eq!(keys.acquire().unwrap().secret(), "k2");
//!
//! keys.report_failure("k1", Some(FailureKind::RateLimited));
//! clock.advance(Duration::seconds(2));
//! assert_eq!(keys.acquire().unwrap().secret(), "k2");
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::error::UpstreamError;

/// Cooldown applied to a key after a rate-limit rejection.
pub const DEFAULT_COOLDOWN_SECS: i64 = 60;
/// Minimum spacing between two uses of the same key.
pub const DEFAULT_THROTTLE_MS: i64 = 1_000;

/// Upstream failure classification passed to
/// [`KeyRotationManager::report_failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// HTTP 429 / quota exhausted. Puts the key on cooldown.
    RateLimited,
    /// Anything else. Not recorded.
    Other,
}

impl FailureKind {
    pub fn from_status(status: u16) -> Self {
        if status == 429 {
            FailureKind::RateLimited
        } else {
            FailureKind::Other
        }
    }
}

/// Where an issued credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialOrigin {
    /// Index into the rotation pool.
    Pool(usize),
    Fallback,
}

/// A key handed out by [`KeyRotationManager::acquire`].
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    secret: String,
    origin: CredentialOrigin,
}

impl Credential {
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn origin(&self) -> CredentialOrigin {
        self.origin
    }

    pub fn is_fallback(&self) -> bool {
        self.origin == CredentialOrigin::Fallback
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("origin", &self.origin)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            CredentialOrigin::Pool(i) => write!(f, "key #{}", i + 1),
            CredentialOrigin::Fallback => write!(f, "fallback key"),
        }
    }
}

/// `at + delta`, pinned to the representable range instead of overflowing.
fn saturating_add(at: DateTime<Utc>, delta: Duration) -> DateTime<Utc> {
    at.checked_add_signed(delta).unwrap_or(if delta < Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

struct CredentialSlot {
    secret: String,
    cooldown_until: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
}

impl CredentialSlot {
    fn new(secret: String) -> Self {
        Self {
            secret,
            cooldown_until: None,
            last_used_at: None,
        }
    }

    /// Earliest instant at which this slot passes both checks.
    fn ready_at(&self, throttle: Duration) -> Option<DateTime<Utc>> {
        let throttle_clear = self.last_used_at.map(|t| saturating_add(t, throttle));
        match (self.cooldown_until, throttle_clear) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    fn is_usable(&self, now: DateTime<Utc>, throttle: Duration) -> bool {
        let cooled = self.cooldown_until.map_or(true, |until| now >= until);
        let spaced = self
            .last_used_at
            .map_or(true, |used| now >= saturating_add(used, throttle));
        cooled && spaced
    }

    fn mark_used(&mut self, now: DateTime<Utc>) {
        self.last_used_at = Some(self.last_used_at.map_or(now, |prev| prev.max(now)));
    }

    fn cool_down(&mut self, until: DateTime<Utc>) {
        self.cooldown_until = Some(self.cooldown_until.map_or(until, |prev| prev.max(until)));
    }
}

struct PoolState {
    slots: Vec<CredentialSlot>,
    /// Always in `[0, slots.len())`, or 0 for an empty pool.
    cursor: usize,
}

/// Point-in-time view of a pool, safe to log or serve.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PoolStatus {
    pub pool_size: usize,
    pub usable: usize,
    pub cooling_down: usize,
    pub has_fallback: bool,
}

/// Round-robin credential pool for one rate-limited provider.
pub struct KeyRotationManager {
    state: Mutex<PoolState>,
    fallback: Option<String>,
    cooldown: Duration,
    throttle: Duration,
    clock: Arc<dyn Clock>,
}

impl KeyRotationManager {
    /// Build a pool from `keys` (rotation order) and an optional fallback.
    ///
    /// Empty strings are ignored; a key listed twice keeps its first
    /// position. A fallback equal to a pool key is still kept separately.
    pub fn new(keys: Vec<String>, fallback: Option<String>) -> Self {
        let mut slots: Vec<CredentialSlot> = Vec::with_capacity(keys.len());
        for key in keys {
            let key = key.trim().to_string();
            if key.is_empty() || slots.iter().any(|s| s.secret == key) {
                continue;
            }
            slots.push(CredentialSlot::new(key));
        }

        Self {
            state: Mutex::new(PoolState { slots, cursor: 0 }),
            fallback: fallback
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty()),
            cooldown: Duration::seconds(DEFAULT_COOLDOWN_SECS),
            throttle: Duration::milliseconds(DEFAULT_THROTTLE_MS),
            clock: Arc::new(SystemClock),
        }
    }

    /// Negative durations are treated as zero.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown.max(Duration::zero());
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle.max(Duration::zero());
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Hand out the next usable key.
    ///
    /// Scans the pool once, starting at the rotation cursor. The first
    /// slot that is past its cooldown and outside its throttle window is
    /// stamped as used and returned, and the cursor moves to the slot after
    /// it. When no pool slot qualifies the fallback key is returned; when
    /// there is no fallback either, [`UpstreamError::QuotaExhausted`] is
    /// returned and the caller must not contact the provider.
    pub fn acquire(&self) -> Result<Credential, UpstreamError> {
        let now = self.clock.now();
        let mut state = self.lock();
        let len = state.slots.len();

        for offset in 0..len {
            let idx = (state.cursor + offset) % len;
            if state.slots[idx].is_usable(now, self.throttle) {
                state.slots[idx].mark_used(now);
                state.cursor = (idx + 1) % len;
                return Ok(Credential {
                    secret: state.slots[idx].secret.clone(),
                    origin: CredentialOrigin::Pool(idx),
                });
            }
        }
        drop(state);

        match &self.fallback {
            Some(secret) => {
                tracing::warn!(pool_size = len, "all pool keys unavailable, using fallback key");
                Ok(Credential {
                    secret: secret.clone(),
                    origin: CredentialOrigin::Fallback,
                })
            }
            None => {
                tracing::error!(pool_size = len, "all API keys are on cooldown or throttled");
                Err(UpstreamError::QuotaExhausted)
            }
        }
    }

    /// Record that a call made with `secret` failed.
    ///
    /// Only [`FailureKind::RateLimited`] has an effect: the matching pool
    /// slot is benched until `now + cooldown`. The fallback key and keys
    /// not in the pool are ignored.
    pub fn report_failure(&self, secret: &str, kind: Option<FailureKind>) {
        if kind != Some(FailureKind::RateLimited) {
            return;
        }

        let until = saturating_add(self.clock.now(), self.cooldown);
        let mut state = self.lock();
        if let Some((idx, slot)) = state
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.secret == secret)
        {
            slot.cool_down(until);
            tracing::warn!(
                key = idx + 1,
                cooldown_secs = self.cooldown.num_seconds(),
                "API key rate limited, cooling down"
            );
        }
    }

    /// Convenience wrapper around [`report_failure`](Self::report_failure).
    pub fn report(&self, credential: &Credential, kind: FailureKind) {
        self.report_failure(credential.secret(), Some(kind));
    }

    /// Time until the earliest pool slot becomes usable.
    ///
    /// `Some(Duration::ZERO)` when a slot is usable right now, `None` for an
    /// empty pool.
    pub fn next_ready_in(&self) -> Option<std::time::Duration> {
        let now = self.clock.now();
        let state = self.lock();
        state
            .slots
            .iter()
            .map(|s| match s.ready_at(self.throttle) {
                Some(at) if at > now => (at - now).to_std().unwrap_or_default(),
                _ => std::time::Duration::ZERO,
            })
            .min()
    }

    pub fn status(&self) -> PoolStatus {
        let now = self.clock.now();
        let state = self.lock();
        PoolStatus {
            pool_size: state.slots.len(),
            usable: state
                .slots
                .iter()
                .filter(|s| s.is_usable(now, self.throttle))
                .count(),
            cooling_down: state
                .slots
                .iter()
                .filter(|s| s.cooldown_until.is_some_and(|until| now < until))
                .count(),
            has_fallback: self.fallback.is_some(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for KeyRotationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRotationManager")
            .field("status", &self.status())
            .field("cooldown", &self.cooldown)
            .field("throttle", &self.throttle)
            .finish()
    }
}
