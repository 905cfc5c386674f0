//! One-Time Code Service
//!
//! Issue and verify single-use, time-boxed numeric codes.
//!
//! Issuing overwrites: a new code for `(user, purpose)` replaces any unused
//! one, so there is never doubt about which code is current. Verification
//! fails closed and is decided by one conditional update in the store.
//!
//! Stored digests are HMAC-SHA256 under the server secret, bound to the
//! owner and purpose. A leaked table cannot be brute-forced offline without
//! the secret.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kernel::id::UserId;
use platform::code::{generate_numeric_code, is_well_formed};
use platform::crypto::{hmac_sha256, random_token};

use crate::application::config::to_chrono;
use crate::application::lockout::LockoutGuard;
use crate::domain::entity::one_time_code::OneTimeCode;
use crate::domain::repository::{AuthRepository, OneTimeCodeRepository};
use crate::domain::value_object::otp_purpose::OtpPurpose;
use crate::error::{AuthError, AuthResult};

const CODE_LABEL: &[u8] = b"one-time-code\0";
const CHALLENGE_LABEL: &[u8] = b"two-factor-challenge\0";

/// 256 bits; base64url encodes it as 43 characters
const CHALLENGE_BYTES: usize = 32;

/// A code that was just stored. The plaintext must go straight to the
/// delivery channel.
#[derive(Debug)]
pub struct IssuedCode {
    pub record: OneTimeCode,
    pub code: String,
}

/// Handle for a login waiting on its second factor. The client holds
/// `token`; the store only ever sees `digest`.
#[derive(Debug)]
pub struct PendingChallenge {
    pub token: String,
    pub digest: Vec<u8>,
}

#[derive(Clone)]
pub struct OtpService<R> {
    repo: R,
    lockout: LockoutGuard<R>,
    length: usize,
    key: Arc<[u8]>,
}

impl<R> fmt::Debug for OtpService<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtpService")
            .field("length", &self.length)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl<R> OtpService<R>
where
    R: OneTimeCodeRepository + AuthRepository + Clone,
{
    /// `key` is the server secret the stored digests are keyed with.
    pub fn new(repo: R, lockout: LockoutGuard<R>, length: usize, key: &[u8]) -> Self {
        Self {
            repo,
            lockout,
            length,
            key: Arc::from(key),
        }
    }

    fn keyed(&self, parts: &[&[u8]]) -> AuthResult<Vec<u8>> {
        hmac_sha256(&self.key, parts)
            .map(|mac| mac.to_vec())
            .map_err(|e| AuthError::Internal(format!("Code digest failed: {e}")))
    }

    /// Digest stored for `code`. The owner and purpose are part of the
    /// input, so equal codes never share a digest.
    pub fn code_digest(
        &self,
        user_id: &UserId,
        purpose: OtpPurpose,
        code: &str,
    ) -> AuthResult<Vec<u8>> {
        self.keyed(&[
            CODE_LABEL,
            user_id.as_uuid().as_bytes(),
            &purpose.id().to_be_bytes(),
            code.as_bytes(),
        ])
    }

    pub fn challenge_digest(&self, token: &str) -> AuthResult<Vec<u8>> {
        self.keyed(&[CHALLENGE_LABEL, token.as_bytes()])
    }

    /// Fresh opaque handle for a pending two-factor login
    pub fn new_challenge(&self) -> AuthResult<PendingChallenge> {
        let token = random_token(CHALLENGE_BYTES)
            .map_err(|e| AuthError::Internal(format!("Challenge generation failed: {e}")))?;
        let digest = self.challenge_digest(&token)?;
        Ok(PendingChallenge { token, digest })
    }

    /// Owner of the live two-factor code bound to `token`
    pub async fn find_challenge(&self, token: &str) -> AuthResult<Option<UserId>> {
        let digest = self.challenge_digest(token)?;
        self.repo.find_challenge(&digest, Utc::now()).await
    }

    /// Uniformly random decimal string of exactly `length` digits
    pub fn generate(&self, length: usize) -> AuthResult<String> {
        Ok(generate_numeric_code(length)?)
    }

    /// Store a fresh code, replacing any outstanding one for the same
    /// purpose. A `challenge` digest binds the code to a pending login.
    pub async fn issue(
        &self,
        user_id: &UserId,
        purpose: OtpPurpose,
        ttl: Duration,
        challenge: Option<&[u8]>,
    ) -> AuthResult<IssuedCode> {
        let code = self.generate(self.length)?;
        let digest = self.code_digest(user_id, purpose, &code)?;
        let record = OneTimeCode::new(*user_id, purpose, digest, to_chrono(ttl), Utc::now())
            .with_challenge(challenge.map(<[u8]>::to_vec));
        self.repo.replace_code(&record).await?;

        tracing::debug!(user_id = %user_id, purpose = %purpose, "One-time code issued");
        Ok(IssuedCode { record, code })
    }

    /// Consume `submitted` if it is the current, unused, unexpired code
    /// (and, given `challenge`, bound to that handle).
    ///
    /// Every failure (malformed, wrong, used, expired, missing) increments
    /// the identity's failure counter and may lock the account. Success
    /// resets the counter.
    pub async fn verify(
        &self,
        user_id: &UserId,
        purpose: OtpPurpose,
        submitted: &str,
        challenge: Option<&[u8]>,
    ) -> AuthResult<bool> {
        let consumed = is_well_formed(submitted, self.length) && {
            let digest = self.code_digest(user_id, purpose, submitted)?;
            self.repo
                .consume_code(user_id, purpose, &digest, challenge, Utc::now())
                .await?
        };

        if consumed {
            self.repo.reset_failed_attempts(user_id).await?;
            tracing::debug!(user_id = %user_id, purpose = %purpose, "One-time code consumed");
        } else {
            let outcome = self.lockout.register_failure(user_id).await?;
            tracing::warn!(
                user_id = %user_id,
                purpose = %purpose,
                failed_attempts = outcome.failed_attempts,
                "One-time code rejected"
            );
        }

        Ok(consumed)
    }

    /// Delete used and expired codes. Returns how many were removed.
    pub async fn sweep(&self) -> AuthResult<u64> {
        self.repo.delete_stale_codes(Utc::now()).await
    }
}
