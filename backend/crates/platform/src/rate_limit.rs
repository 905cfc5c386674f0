//! Rate Limiting Infrastructure
//!
//! Token buckets keyed by an arbitrary string (client IP, account, ...).
//! Buckets are refilled lazily from elapsed wall-clock time on access; there
//! is no background timer. Each bucket has its own mutex so contention on one
//! key never blocks another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Token bucket configuration
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Bucket size: the largest burst allowed
    pub capacity: u32,
    /// Tokens added per second
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_per_sec: 0.5,
        }
    }
}

impl RateLimitConfig {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
        }
    }
}

/// Rate limit check result
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    /// Whole tokens left after this request
    pub remaining: u32,
    /// How long until one token is available (zero when allowed)
    pub retry_after: Duration,
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit backend error: {0}")]
    Backend(String),
}

/// Trait for rate limit storage backends
#[trait_variant::make(RateLimitStore: Send)]
pub trait LocalRateLimitStore {
    /// Take one token from the bucket for `key`
    async fn acquire(&self, key: &str) -> Result<RateLimitResult, RateLimitError>;
}

// ============================================================================
// Token bucket
// ============================================================================

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl TokenBucket {
    fn full(config: &RateLimitConfig, now: Instant) -> Self {
        Self {
            tokens: f64::from(config.capacity),
            last_refill: now,
            last_seen: now,
        }
    }

    fn refill(&mut self, config: &RateLimitConfig, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.refill_per_sec).min(f64::from(config.capacity));
        self.last_refill = now;
    }

    fn try_take(&mut self, config: &RateLimitConfig, now: Instant) -> RateLimitResult {
        self.refill(config, now);
        self.last_seen = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return RateLimitResult {
                allowed: true,
                remaining: self.tokens.floor() as u32,
                retry_after: Duration::ZERO,
            };
        }

        let missing = 1.0 - self.tokens;
        let retry_after = if config.refill_per_sec > 0.0 {
            Duration::from_secs_f64(missing / config.refill_per_sec)
        } else {
            Duration::MAX
        };

        RateLimitResult {
            allowed: false,
            remaining: 0,
            retry_after,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// In-process bucket registry.
///
/// Owned by the server and shared with handlers through an `Arc`; dropping
/// the last reference releases every bucket. Multi-instance deployments need
/// a shared `RateLimitStore` implementation instead.
#[derive(Debug)]
pub struct BucketRegistry {
    config: RateLimitConfig,
    buckets: RwLock<HashMap<String, Arc<Mutex<TokenBucket>>>>,
}

impl BucketRegistry {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn bucket(&self, key: &str, now: Instant) -> Arc<Mutex<TokenBucket>> {
        {
            let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(bucket) = buckets.get(key) {
                return Arc::clone(bucket);
            }
        }

        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            buckets
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::full(&self.config, now)))),
        )
    }

    /// Take one token for `key` at `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitResult {
        let bucket = self.bucket(key, now);
        let mut bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.try_take(&self.config, now)
    }

    /// Drop buckets untouched for at least `max_idle`. Returns how many were removed.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        let before = buckets.len();
        buckets.retain(|_, bucket| match bucket.try_lock() {
            Ok(bucket) => now.saturating_duration_since(bucket.last_seen) < max_idle,
            // In use right now, so not idle.
            Err(_) => true,
        });
        before - buckets.len()
    }

    pub fn len(&self) -> usize {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RateLimitStore for BucketRegistry {
    async fn acquire(&self, key: &str) -> Result<RateLimitResult, RateLimitError> {
        Ok(self.check_at(key, Instant::now()))
    }
}
