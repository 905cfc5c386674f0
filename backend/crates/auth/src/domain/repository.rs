//! Repository Traits
//!
//! Interfaces for data persistence. Implementations are in the
//! infrastructure layer.
//!
//! Every method that guards a security invariant is a single atomic store
//! operation: counters are incremented in place, codes are consumed with a
//! conditional update. Callers never read-modify-write security state.

use chrono::{DateTime, Utc};
use kernel::id::UserId;
use platform::password::HashedPassword;

use crate::domain::entity::{
    auth::Auth, auth_session::AuthSession, one_time_code::OneTimeCode, user::User,
};
use crate::domain::value_object::{
    email::Email, otp_purpose::OtpPurpose, two_factor_method::TwoFactorMethod,
    user_name::UserName,
};
use crate::error::AuthResult;

/// User repository trait
#[trait_variant::make(UserRepository: Send)]
pub trait LocalUserRepository {
    /// Insert the profile and credential rows together.
    ///
    /// Fails with `DuplicateEmail` / `DuplicateUserName` when either unique
    /// key is taken, even if a concurrent registration won the race after
    /// the caller's existence checks.
    async fn create_user(&self, user: &User, auth: &Auth) -> AuthResult<()>;

    async fn find_user(&self, user_id: &UserId) -> AuthResult<Option<User>>;

    async fn find_user_by_email(&self, email: &Email) -> AuthResult<Option<User>>;

    async fn exists_by_email(&self, email: &Email) -> AuthResult<bool>;

    /// Compared on the canonical (lowercase) form
    async fn exists_by_user_name(&self, user_name: &UserName) -> AuthResult<bool>;

    /// Update mutable profile fields (verification flag, phone, last login)
    async fn update_user(&self, user: &User) -> AuthResult<()>;
}

/// Auth credentials repository trait
#[trait_variant::make(AuthRepository: Send)]
pub trait LocalAuthRepository {
    async fn find_auth(&self, user_id: &UserId) -> AuthResult<Option<Auth>>;

    async fn update_password(
        &self,
        user_id: &UserId,
        hash: &HashedPassword,
        now: DateTime<Utc>,
    ) -> AuthResult<()>;

    async fn set_two_factor(
        &self,
        user_id: &UserId,
        enabled: bool,
        method: TwoFactorMethod,
        now: DateTime<Utc>,
    ) -> AuthResult<()>;

    /// Atomically add one to the failure counter. Returns the new value.
    async fn increment_failed_attempts(&self, user_id: &UserId, now: DateTime<Utc>)
    -> AuthResult<u32>;

    async fn lock_until(&self, user_id: &UserId, until: DateTime<Utc>) -> AuthResult<()>;

    /// Zero the counter, leaving any lock in place
    async fn reset_failed_attempts(&self, user_id: &UserId) -> AuthResult<()>;

    /// Zero the counter and clear the lock
    async fn unlock(&self, user_id: &UserId) -> AuthResult<()>;
}

/// Auth session repository trait
#[trait_variant::make(AuthSessionRepository: Send)]
pub trait LocalAuthSessionRepository {
    async fn create_session(&self, session: &AuthSession) -> AuthResult<()>;

    async fn find_session(&self, session_id: &str) -> AuthResult<Option<AuthSession>>;

    /// Best effort last-seen update
    async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> AuthResult<()>;

    /// Move expiry of an active session. Returns false if the session is
    /// missing or inactive.
    async fn extend_session(&self, session_id: &str, expires_at: DateTime<Utc>)
    -> AuthResult<bool>;

    /// Returns false if the session was missing or already inactive
    async fn deactivate_session(&self, session_id: &str) -> AuthResult<bool>;

    /// Deactivate every active session of `user_id` except `except`
    async fn deactivate_user_sessions(
        &self,
        user_id: &UserId,
        except: Option<&str>,
    ) -> AuthResult<u64>;

    /// Active, unexpired sessions, most recently seen first
    async fn find_active_sessions(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<AuthSession>>;

    /// Delete sessions that are inactive or expired
    async fn delete_stale_sessions(&self, now: DateTime<Utc>) -> AuthResult<u64>;
}

/// One-time code repository trait
#[trait_variant::make(OneTimeCodeRepository: Send)]
pub trait LocalOneTimeCodeRepository {
    /// Drop every unused code for `(user, purpose)` and insert `code`, as
    /// one atomic step. At most one outstanding code per pair.
    async fn replace_code(&self, code: &OneTimeCode) -> AuthResult<()>;

    /// Mark the matching unused, unexpired code as used. Conditional
    /// update: of any number of concurrent callers, only one gets `true`.
    /// With `challenge_hash`, the code must also be bound to that handle.
    async fn consume_code(
        &self,
        user_id: &UserId,
        purpose: OtpPurpose,
        code_hash: &[u8],
        challenge_hash: Option<&[u8]>,
        now: DateTime<Utc>,
    ) -> AuthResult<bool>;

    /// Owner of the unused, unexpired two-factor code bound to
    /// `challenge_hash`
    async fn find_challenge(
        &self,
        challenge_hash: &[u8],
        now: DateTime<Utc>,
    ) -> AuthResult<Option<UserId>>;

    /// Delete codes that are used or expired
    async fn delete_stale_codes(&self, now: DateTime<Utc>) -> AuthResult<u64>;
}

/// Everything the auth services need from storage.
pub trait AuthStore:
    UserRepository
    + AuthRepository
    + AuthSessionRepository
    + OneTimeCodeRepository
    + Clone
    + Send
    + Sync
    + 'static
{
}

impl<T> AuthStore for T where
    T: UserRepository
        + AuthRepository
        + AuthSessionRepository
        + OneTimeCodeRepository
        + Clone
        + Send
        + Sync
        + 'static
{
}
