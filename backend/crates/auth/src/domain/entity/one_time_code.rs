//! One-Time Code Entity
//!
//! Only a keyed digest of a code is kept. The plaintext exists in memory
//! between generation and dispatch.

use chrono::{DateTime, Duration, Utc};
use kernel::id::{OneTimeCodeId, UserId};
use platform::crypto::constant_time_eq;

use crate::domain::value_object::otp_purpose::OtpPurpose;

#[derive(Debug, Clone)]
pub struct OneTimeCode {
    pub id: OneTimeCodeId,
    pub user_id: UserId,
    pub purpose: OtpPurpose,
    pub code_hash: Vec<u8>,
    /// Digest of the pending-login handle this code answers, if any
    pub challenge_hash: Option<Vec<u8>>,
    pub expires_at: DateTime<Utc>,
    /// Set exactly once, on successful verification
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OneTimeCode {
    pub fn new(
        user_id: UserId,
        purpose: OtpPurpose,
        code_hash: Vec<u8>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OneTimeCodeId::new(),
            user_id,
            purpose,
            code_hash,
            challenge_hash: None,
            expires_at: now + ttl,
            used_at: None,
            created_at: now,
        }
    }

    pub fn with_challenge(mut self, challenge_hash: Option<Vec<u8>>) -> Self {
        self.challenge_hash = challenge_hash;
        self
    }

    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && now < self.expires_at
    }

    pub fn matches(&self, code_hash: &[u8]) -> bool {
        constant_time_eq(&self.code_hash, code_hash)
    }

    /// `None` accepts any code; `Some` requires the same bound handle.
    pub fn answers(&self, challenge_hash: Option<&[u8]>) -> bool {
        match (challenge_hash, self.challenge_hash.as_deref()) {
            (None, _) => true,
            (Some(wanted), Some(bound)) => constant_time_eq(bound, wanted),
            (Some(_), None) => false,
        }
    }
}
