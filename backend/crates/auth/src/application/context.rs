//! Shared collaborators for the auth use cases
//!
//! Built once at startup and shared behind an `Arc`. Everything in here is
//! either immutable (config, signing keys, hasher parameters) or a handle to
//! a store whose own primitives are atomic.

use std::sync::Arc;

use chrono::Utc;
use platform::client::ClientInfo;
use platform::password::{ClearTextPassword, HashedPassword, PasswordHasher};
use serde_json::Value;

use crate::application::config::AuthConfig;
use crate::application::lockout::LockoutGuard;
use crate::application::otp::OtpService;
use crate::application::session::SessionStore;
use crate::application::token::{IssuedToken, TokenCodec};
use crate::domain::audit::{AuditAction, AuditEvent, AuditSink};
use crate::domain::entity::{auth::Auth, user::User};
use crate::domain::notifier::{OtpDestination, OtpSender};
use crate::domain::repository::AuthStore;
use crate::domain::value_object::{otp_purpose::OtpPurpose, two_factor_method::TwoFactorMethod};
use crate::error::{AuthError, AuthResult};
use kernel::id::UserId;

/// Successful authentication: who, and the credentials they now hold
#[derive(Debug, Clone)]
pub struct AuthSuccess {
    pub user: User,
    pub token: IssuedToken,
    /// Present when session tracking is enabled
    pub session_id: Option<String>,
}

pub struct AuthContext<R, N> {
    pub repo: R,
    pub notifier: Arc<N>,
    pub audit: Arc<dyn AuditSink>,
    pub hasher: Arc<PasswordHasher>,
    pub codec: TokenCodec,
    pub config: Arc<AuthConfig>,
    pub sessions: SessionStore<R>,
    pub lockout: LockoutGuard<R>,
    pub otp: OtpService<R>,
}

impl<R, N> AuthContext<R, N>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    /// Wire the services together. Validates `config` first.
    pub fn new(
        repo: R,
        notifier: N,
        audit: Arc<dyn AuditSink>,
        config: AuthConfig,
    ) -> AuthResult<Self> {
        config.validate()?;

        let hasher = PasswordHasher::new(config.hash_cost, config.password_pepper.clone())?;
        let codec = TokenCodec::new(&config);
        let lockout = LockoutGuard::new(
            repo.clone(),
            config.lockout_threshold,
            config.lockout_duration,
        );
        let otp = OtpService::new(
            repo.clone(),
            lockout.clone(),
            config.otp_length,
            config.jwt_secret.as_bytes(),
        );
        let sessions = SessionStore::new(repo.clone(), config.session_ttl);

        Ok(Self {
            repo,
            notifier: Arc::new(notifier),
            audit,
            hasher: Arc::new(hasher),
            codec,
            config: Arc::new(config),
            sessions,
            lockout,
            otp,
        })
    }

    // ========================================================================
    // Password work (CPU-bound, off the async workers)
    // ========================================================================

    pub async fn hash_password(&self, password: ClearTextPassword) -> AuthResult<HashedPassword> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("Hashing task failed: {e}")))?
            .map_err(AuthError::from)
    }

    /// Returns the verdict and hands the password back for a possible rehash.
    pub async fn verify_password(
        &self,
        password: ClearTextPassword,
        hash: HashedPassword,
    ) -> AuthResult<(bool, ClearTextPassword)> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || {
            let ok = hasher.verify(&password, &hash);
            (ok, password)
        })
        .await
        .map_err(|e| AuthError::Internal(format!("Verification task failed: {e}")))
    }

    /// Spend one verification on the dummy hash so that unknown and
    /// inactive accounts cost the same as real ones.
    pub async fn burn_verification(&self, password: ClearTextPassword) {
        let hasher = Arc::clone(&self.hasher);
        let _ = tokio::task::spawn_blocking(move || hasher.verify_dummy(&password)).await;
    }

    // ========================================================================
    // Sessions and tokens
    // ========================================================================

    /// Create a session (when tracked) and issue a token bound to it.
    pub async fn establish(&self, user: User, client: &ClientInfo) -> AuthResult<AuthSuccess> {
        let session_id = if self.config.track_sessions {
            Some(self.sessions.create(&user.user_id, client).await?.session_id)
        } else {
            None
        };

        let token = self
            .codec
            .issue(&user, self.config.token_ttl, session_id.clone())?;

        Ok(AuthSuccess {
            user,
            token,
            session_id,
        })
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Credentials row for an existing user. Its absence is a data fault.
    pub async fn credentials(&self, user_id: &UserId) -> AuthResult<Auth> {
        self.repo
            .find_auth(user_id)
            .await?
            .ok_or_else(|| AuthError::Internal(format!("Missing credentials for {user_id}")))
    }

    // ========================================================================
    // Code delivery
    // ========================================================================

    /// Where a code for `purpose` goes. Two-factor codes follow the
    /// identity's chosen method; everything else goes to email.
    pub fn destination(
        &self,
        user: &User,
        purpose: OtpPurpose,
        method: TwoFactorMethod,
    ) -> AuthResult<OtpDestination> {
        match (purpose, method) {
            (OtpPurpose::TwoFactor, TwoFactorMethod::Sms) => user
                .phone_number
                .clone()
                .map(OtpDestination::Phone)
                .ok_or_else(|| {
                    AuthError::TwoFactorUnavailable("No phone number on file".into())
                }),
            _ => Ok(OtpDestination::Email(user.email.as_str().to_string())),
        }
    }

    /// Issue a fresh code for `purpose` and hand it to the delivery channel.
    /// `challenge` binds a two-factor code to its pending login.
    pub async fn send_code(
        &self,
        user: &User,
        purpose: OtpPurpose,
        method: TwoFactorMethod,
        challenge: Option<&[u8]>,
    ) -> AuthResult<chrono::DateTime<Utc>> {
        let destination = self.destination(user, purpose, method)?;
        let issued = self
            .otp
            .issue(&user.user_id, purpose, self.config.otp_ttl, challenge)
            .await?;
        self.notifier
            .send_otp(&destination, purpose, &issued.code)
            .await?;

        tracing::info!(
            user_id = %user.user_id,
            purpose = %purpose,
            destination = %destination,
            "One-time code dispatched"
        );
        Ok(issued.record.expires_at)
    }

    // ========================================================================
    // Audit
    // ========================================================================

    pub fn audit(&self, actor: Option<UserId>, action: AuditAction, metadata: Value) {
        self.audit.record(AuditEvent::new(actor, action, metadata));
    }
}
