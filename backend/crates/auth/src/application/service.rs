//! Auth Service
//!
//! Single entry point for the HTTP layer and the binary. Each method is a
//! thin delegation to a use case over the shared [`AuthContext`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kernel::id::UserId;
use platform::client::ClientInfo;
use serde_json::json;

use crate::application::check_session::{CheckSessionUseCase, CurrentUser};
use crate::application::config::AuthConfig;
use crate::application::context::{AuthContext, AuthSuccess};
use crate::application::email_verification::EmailVerificationUseCase;
use crate::application::password::PasswordUseCase;
use crate::application::refresh::RefreshUseCase;
use crate::application::sign_in::{SignInInput, SignInOutcome, SignInUseCase};
use crate::application::sign_out::SignOutUseCase;
use crate::application::sign_up::{SignUpInput, SignUpUseCase};
use crate::application::token::IssuedToken;
use crate::application::two_factor::TwoFactorUseCase;
use crate::domain::audit::{AuditAction, AuditSink};
use crate::domain::entity::{auth_session::SessionInfo, user::User};
use crate::domain::notifier::OtpSender;
use crate::domain::policy::{require_owner_or_admin, require_role};
use crate::domain::repository::AuthStore;
use crate::domain::value_object::{two_factor_method::TwoFactorMethod, user_role::UserRole};
use crate::error::{AuthError, AuthResult};

/// Counts from one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions: u64,
    pub codes: u64,
}

pub struct AuthService<R, N> {
    ctx: Arc<AuthContext<R, N>>,
}

impl<R, N> Clone for AuthService<R, N> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
        }
    }
}

impl<R, N> AuthService<R, N>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    pub fn new(
        repo: R,
        notifier: N,
        audit: Arc<dyn AuditSink>,
        config: AuthConfig,
    ) -> AuthResult<Self> {
        Ok(Self {
            ctx: Arc::new(AuthContext::new(repo, notifier, audit, config)?),
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.ctx.config
    }

    pub fn context(&self) -> &Arc<AuthContext<R, N>> {
        &self.ctx
    }

    // ========================================================================
    // Credentials
    // ========================================================================

    pub async fn register(
        &self,
        input: SignUpInput,
        actor_role: Option<UserRole>,
        client: &ClientInfo,
    ) -> AuthResult<AuthSuccess> {
        SignUpUseCase::new(Arc::clone(&self.ctx))
            .execute(input, actor_role, client)
            .await
    }

    pub async fn login(&self, input: SignInInput, client: &ClientInfo) -> AuthResult<SignInOutcome> {
        SignInUseCase::new(Arc::clone(&self.ctx))
            .execute(input, client)
            .await
    }

    /// Complete a pending login with the challenge handed out by `login`
    pub async fn verify_two_factor(
        &self,
        challenge_id: &str,
        code: &str,
        client: &ClientInfo,
    ) -> AuthResult<AuthSuccess> {
        TwoFactorUseCase::new(Arc::clone(&self.ctx))
            .verify(challenge_id, code, client)
            .await
    }

    pub async fn resend_two_factor(&self, challenge_id: &str) -> AuthResult<DateTime<Utc>> {
        TwoFactorUseCase::new(Arc::clone(&self.ctx))
            .resend(challenge_id)
            .await
    }

    // ========================================================================
    // Tokens and sessions
    // ========================================================================

    /// Resolve a bearer token to its caller (signature, expiry, session)
    pub async fn authenticate(&self, token: &str) -> AuthResult<CurrentUser> {
        CheckSessionUseCase::new(Arc::clone(&self.ctx))
            .execute(token)
            .await
    }

    pub async fn refresh_token(&self, token: &str) -> AuthResult<IssuedToken> {
        RefreshUseCase::new(Arc::clone(&self.ctx)).execute(token).await
    }

    pub async fn logout(&self, session_id: &str, actor: Option<UserId>) -> AuthResult<()> {
        SignOutUseCase::new(Arc::clone(&self.ctx))
            .execute(session_id, actor)
            .await
    }

    pub async fn logout_all(&self, user_id: &UserId, keep: Option<&str>) -> AuthResult<u64> {
        SignOutUseCase::new(Arc::clone(&self.ctx))
            .execute_all(user_id, keep)
            .await
    }

    pub async fn me(&self, caller: &CurrentUser) -> AuthResult<User> {
        self.ctx
            .repo
            .find_user(&caller.user_id)
            .await?
            .ok_or(AuthError::SessionInvalid)
    }

    pub async fn list_sessions(
        &self,
        user_id: &UserId,
        current: Option<&str>,
    ) -> AuthResult<Vec<SessionInfo>> {
        self.ctx.sessions.list_active(user_id, current).await
    }

    /// Sessions of `owner`, visible to the owner or an Admin
    pub async fn list_sessions_of(
        &self,
        caller: &CurrentUser,
        owner: &UserId,
    ) -> AuthResult<Vec<SessionInfo>> {
        require_owner_or_admin(caller.role, &caller.user_id, owner)?;
        let current = (caller.user_id == *owner)
            .then_some(caller.session_id.as_deref())
            .flatten();
        self.ctx.sessions.list_active(owner, current).await
    }

    // ========================================================================
    // Account maintenance
    // ========================================================================

    pub async fn change_password(
        &self,
        caller: &CurrentUser,
        current: String,
        new: String,
    ) -> AuthResult<()> {
        PasswordUseCase::new(Arc::clone(&self.ctx))
            .change(&caller.user_id, current, new, caller.session_id.as_deref())
            .await
    }

    pub async fn request_password_reset(&self, email: String) -> AuthResult<()> {
        PasswordUseCase::new(Arc::clone(&self.ctx))
            .request_reset(email)
            .await
    }

    pub async fn reset_password(&self, email: String, code: &str, new: String) -> AuthResult<()> {
        PasswordUseCase::new(Arc::clone(&self.ctx))
            .reset(email, code, new)
            .await
    }

    pub async fn request_email_verification(
        &self,
        user_id: &UserId,
    ) -> AuthResult<Option<DateTime<Utc>>> {
        EmailVerificationUseCase::new(Arc::clone(&self.ctx))
            .request(user_id)
            .await
    }

    pub async fn verify_email(&self, user_id: &UserId, code: &str) -> AuthResult<()> {
        EmailVerificationUseCase::new(Arc::clone(&self.ctx))
            .verify(user_id, code)
            .await
    }

    pub async fn enable_two_factor(
        &self,
        user_id: &UserId,
        method: TwoFactorMethod,
        phone_number: Option<String>,
    ) -> AuthResult<()> {
        TwoFactorUseCase::new(Arc::clone(&self.ctx))
            .enable(user_id, method, phone_number)
            .await
    }

    pub async fn disable_two_factor(&self, user_id: &UserId, password: String) -> AuthResult<()> {
        TwoFactorUseCase::new(Arc::clone(&self.ctx))
            .disable(user_id, password)
            .await
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// Clear a lock and its counter before the lock would expire
    pub async fn admin_unlock(&self, caller: &CurrentUser, user_id: &UserId) -> AuthResult<()> {
        require_role(caller.role, UserRole::Admin)?;
        self.ctx
            .repo
            .find_user(user_id)
            .await?
            .ok_or_else(|| AuthError::Validation("Unknown user".into()))?;

        self.ctx.lockout.unlock(user_id).await?;

        tracing::info!(admin = %caller.user_id, user_id = %user_id, "Account unlocked by admin");
        self.ctx.audit(
            Some(caller.user_id),
            AuditAction::AccountUnlocked,
            json!({ "target": user_id.to_string() }),
        );
        Ok(())
    }

    /// Revoke every session of `user_id`
    pub async fn admin_logout_all(&self, caller: &CurrentUser, user_id: &UserId) -> AuthResult<u64> {
        require_role(caller.role, UserRole::Admin)?;
        let revoked = self.ctx.sessions.invalidate_all(user_id).await?;

        tracing::info!(admin = %caller.user_id, user_id = %user_id, revoked, "Forced logout");
        self.ctx.audit(
            Some(caller.user_id),
            AuditAction::LogoutAll,
            json!({ "target": user_id.to_string(), "sessions_revoked": revoked }),
        );
        Ok(revoked)
    }

    // ========================================================================
    // Housekeeping
    // ========================================================================

    /// Delete stale sessions and codes. Not on any request path.
    pub async fn sweep_expired(&self) -> AuthResult<SweepReport> {
        let sessions = self.ctx.sessions.sweep().await?;
        let codes = self.ctx.otp.sweep().await?;
        Ok(SweepReport { sessions, codes })
    }
}
