//! Auth Entity
//!
//! Credentials and lockout state for an identity, kept apart from the
//! profile so that profile reads never load the password hash.
//!
//! The failure counter and lock are mutated only through the atomic
//! repository primitives; the methods here are read-side predicates.

use chrono::{DateTime, Utc};
use kernel::id::UserId;
use platform::password::HashedPassword;

use crate::domain::value_object::two_factor_method::TwoFactorMethod;

#[derive(Debug, Clone)]
pub struct Auth {
    pub user_id: UserId,
    pub password_hash: HashedPassword,
    pub two_factor_enabled: bool,
    /// Meaningful only while `two_factor_enabled`
    pub two_factor_method: TwoFactorMethod,
    /// Consecutive failed credential or code checks
    pub login_failed_count: u32,
    pub last_failed_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Auth {
    pub fn new(user_id: UserId, password_hash: HashedPassword, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            password_hash,
            two_factor_enabled: false,
            two_factor_method: TwoFactorMethod::default(),
            login_failed_count: 0,
            last_failed_at: None,
            locked_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Locked iff `locked_until` is set and still ahead of `now`.
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    /// A lock was set but its window has passed. The counter is still
    /// whatever it was when the lock was applied.
    pub fn lock_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now >= until)
    }

    pub fn requires_two_factor(&self) -> bool {
        self.two_factor_enabled
    }
}
