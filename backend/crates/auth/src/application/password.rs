//! Password Use Cases
//!
//! Change (authenticated) and reset (by emailed code). Both revoke
//! sessions so a stolen session does not outlive the old password.

use std::sync::Arc;

use chrono::Utc;
use kernel::id::UserId;
use serde_json::json;

use crate::application::context::AuthContext;
use crate::domain::audit::AuditAction;
use crate::domain::notifier::OtpSender;
use crate::domain::repository::AuthStore;
use crate::domain::value_object::{
    email::Email, otp_purpose::OtpPurpose, two_factor_method::TwoFactorMethod,
    user_password::{NewPassword, SubmittedPassword},
};
use crate::error::{AuthError, AuthResult};

/// Password use case
pub struct PasswordUseCase<R, N> {
    ctx: Arc<AuthContext<R, N>>,
}

impl<R, N> PasswordUseCase<R, N>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    pub fn new(ctx: Arc<AuthContext<R, N>>) -> Self {
        Self { ctx }
    }

    /// Verify `current`, store `new`, and revoke every other session.
    pub async fn change(
        &self,
        user_id: &UserId,
        current: String,
        new: String,
        keep_session: Option<&str>,
    ) -> AuthResult<()> {
        let new = NewPassword::new(new)?;
        let auth = self.ctx.credentials(user_id).await?;

        let (valid, _) = self
            .ctx
            .verify_password(
                SubmittedPassword::new(current).into_clear_text(),
                auth.password_hash.clone(),
            )
            .await?;
        if !valid {
            self.ctx.lockout.register_failure(user_id).await?;
            return Err(AuthError::InvalidCredentials);
        }

        let hash = self.ctx.hash_password(new.into_clear_text()).await?;
        self.ctx
            .repo
            .update_password(user_id, &hash, Utc::now())
            .await?;

        let revoked = match keep_session {
            Some(keep) => self.ctx.sessions.invalidate_all_except(user_id, keep).await?,
            None => self.ctx.sessions.invalidate_all(user_id).await?,
        };

        tracing::info!(user_id = %user_id, revoked, "Password changed");
        self.ctx.audit(
            Some(*user_id),
            AuditAction::PasswordChanged,
            json!({ "sessions_revoked": revoked }),
        );
        Ok(())
    }

    /// Email a reset code. Always succeeds from the caller's view so the
    /// endpoint cannot be used to discover accounts.
    pub async fn request_reset(&self, email: String) -> AuthResult<()> {
        let Ok(email) = Email::new(email) else {
            return Ok(());
        };
        let Some(user) = self.ctx.repo.find_user_by_email(&email).await? else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };
        if !user.can_login() {
            return Ok(());
        }

        self.ctx
            .send_code(&user, OtpPurpose::PasswordReset, TwoFactorMethod::Email, None)
            .await?;
        self.ctx.audit(
            Some(user.user_id),
            AuditAction::PasswordResetRequested,
            json!({}),
        );
        Ok(())
    }

    /// Consume the reset code, store the new password, clear any lock and
    /// revoke every session.
    pub async fn reset(&self, email: String, code: &str, new: String) -> AuthResult<()> {
        let new = NewPassword::new(new)?;
        let email = Email::new(email).map_err(|_| AuthError::OtpInvalidOrExpired)?;
        let user = self
            .ctx
            .repo
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::OtpInvalidOrExpired)?;

        if !self
            .ctx
            .otp
            .verify(&user.user_id, OtpPurpose::PasswordReset, code, None)
            .await?
        {
            return Err(AuthError::OtpInvalidOrExpired);
        }

        let hash = self.ctx.hash_password(new.into_clear_text()).await?;
        self.ctx
            .repo
            .update_password(&user.user_id, &hash, Utc::now())
            .await?;
        self.ctx.lockout.unlock(&user.user_id).await?;
        let revoked = self.ctx.sessions.invalidate_all(&user.user_id).await?;

        tracing::info!(user_id = %user.user_id, revoked, "Password reset");
        self.ctx.audit(
            Some(user.user_id),
            AuditAction::PasswordReset,
            json!({ "sessions_revoked": revoked }),
        );
        Ok(())
    }
}
