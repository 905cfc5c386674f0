//! Account Lockout Guard
//!
//! Unlocked -> (failures >= threshold) -> Locked -> (lock passes, or
//! explicit unlock) -> Unlocked.
//!
//! The counter lives in the store and is only ever changed with atomic
//! primitives, so a burst of concurrent failures cannot lose increments.

use std::time::Duration;

use chrono::{DateTime, Utc};
use kernel::id::UserId;

use crate::application::config::to_chrono;
use crate::domain::repository::AuthRepository;
use crate::error::{AuthError, AuthResult};

/// Result of [`LockoutGuard::register_failure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    pub failed_attempts: u32,
    /// Set when this failure tripped the lock
    pub locked_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct LockoutGuard<R> {
    repo: R,
    threshold: u32,
    duration: Duration,
}

impl<R: AuthRepository> LockoutGuard<R> {
    pub fn new(repo: R, threshold: u32, duration: Duration) -> Self {
        Self {
            repo,
            threshold,
            duration,
        }
    }

    /// Increment the failure counter. Returns the new count.
    pub async fn record_failure(&self, user_id: &UserId) -> AuthResult<u32> {
        self.repo.increment_failed_attempts(user_id, Utc::now()).await
    }

    pub async fn should_lock(&self, user_id: &UserId, max_attempts: u32) -> AuthResult<bool> {
        let auth = self
            .repo
            .find_auth(user_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        Ok(auth.login_failed_count >= max_attempts)
    }

    /// Lock for `duration` from now. Returns the lock end.
    pub async fn lock(&self, user_id: &UserId, duration: Duration) -> AuthResult<DateTime<Utc>> {
        if duration.is_zero() {
            return Err(AuthError::Configuration(
                "lockout duration must be positive".into(),
            ));
        }
        let until = Utc::now() + to_chrono(duration);
        self.repo.lock_until(user_id, until).await?;
        Ok(until)
    }

    /// True iff a lock is set and has not yet passed
    pub async fn is_locked(&self, user_id: &UserId) -> AuthResult<bool> {
        Ok(self
            .repo
            .find_auth(user_id)
            .await?
            .is_some_and(|auth| auth.is_locked_at(Utc::now())))
    }

    /// Clear both the lock and the counter
    pub async fn unlock(&self, user_id: &UserId) -> AuthResult<()> {
        self.repo.unlock(user_id).await
    }

    /// Record a failure and lock with the configured policy once the
    /// threshold is reached.
    pub async fn register_failure(&self, user_id: &UserId) -> AuthResult<FailureOutcome> {
        let failed_attempts = self.record_failure(user_id).await?;

        let locked_until = if failed_attempts >= self.threshold {
            let until = self.lock(user_id, self.duration).await?;
            tracing::warn!(
                user_id = %user_id,
                failed_attempts,
                locked_until = %until,
                "Account locked after repeated failures"
            );
            Some(until)
        } else {
            None
        };

        Ok(FailureOutcome {
            failed_attempts,
            locked_until,
        })
    }
}
