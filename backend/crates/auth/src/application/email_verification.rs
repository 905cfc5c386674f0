//! Email Verification Use Case

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kernel::id::UserId;
use serde_json::json;

use crate::application::context::AuthContext;
use crate::domain::audit::AuditAction;
use crate::domain::notifier::OtpSender;
use crate::domain::repository::AuthStore;
use crate::domain::value_object::{otp_purpose::OtpPurpose, two_factor_method::TwoFactorMethod};
use crate::error::{AuthError, AuthResult};

pub struct EmailVerificationUseCase<R, N> {
    ctx: Arc<AuthContext<R, N>>,
}

impl<R, N> EmailVerificationUseCase<R, N>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    pub fn new(ctx: Arc<AuthContext<R, N>>) -> Self {
        Self { ctx }
    }

    /// Send a verification code. Returns `None` if the address is already
    /// verified (nothing sent).
    pub async fn request(&self, user_id: &UserId) -> AuthResult<Option<DateTime<Utc>>> {
        let user = self
            .ctx
            .repo
            .find_user(user_id)
            .await?
            .ok_or(AuthError::SessionInvalid)?;
        if user.email_verified {
            return Ok(None);
        }

        let expires_at = self
            .ctx
            .send_code(&user, OtpPurpose::EmailVerification, TwoFactorMethod::Email, None)
            .await?;
        Ok(Some(expires_at))
    }

    pub async fn verify(&self, user_id: &UserId, code: &str) -> AuthResult<()> {
        let mut user = self
            .ctx
            .repo
            .find_user(user_id)
            .await?
            .ok_or(AuthError::SessionInvalid)?;

        if !self
            .ctx
            .otp
            .verify(user_id, OtpPurpose::EmailVerification, code, None)
            .await?
        {
            return Err(AuthError::OtpInvalidOrExpired);
        }

        user.mark_email_verified(Utc::now());
        self.ctx.repo.update_user(&user).await?;

        tracing::info!(user_id = %user_id, "Email verified");
        self.ctx
            .audit(Some(*user_id), AuditAction::EmailVerified, json!({}));
        Ok(())
    }
}
