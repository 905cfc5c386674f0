//! Two-Factor Use Cases
//!
//! Completing a pending login, resending its code, and turning the second
//! factor on or off.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kernel::id::UserId;
use platform::client::ClientInfo;
use serde_json::json;

use crate::application::context::{AuthContext, AuthSuccess};
use crate::application::sign_in::finish_sign_in;
use crate::domain::audit::AuditAction;
use crate::domain::notifier::OtpSender;
use crate::domain::repository::AuthStore;
use crate::domain::value_object::{
    otp_purpose::OtpPurpose, two_factor_method::TwoFactorMethod, user_password::SubmittedPassword,
};
use crate::error::{AuthError, AuthResult};

/// Two-factor use case
pub struct TwoFactorUseCase<R, N> {
    ctx: Arc<AuthContext<R, N>>,
}

impl<R, N> TwoFactorUseCase<R, N>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    pub fn new(ctx: Arc<AuthContext<R, N>>) -> Self {
        Self { ctx }
    }

    /// Finish a login that stopped at "pending". Credentials are issued
    /// only if the code bound to `challenge_id` is consumed within its TTL.
    pub async fn verify(
        &self,
        challenge_id: &str,
        code: &str,
        client: &ClientInfo,
    ) -> AuthResult<AuthSuccess> {
        let Some(owner) = self.ctx.otp.find_challenge(challenge_id).await? else {
            tracing::warn!("Two-factor verification with unknown challenge");
            return Err(AuthError::OtpInvalidOrExpired);
        };
        let user_id = &owner;

        let user = self
            .ctx
            .repo
            .find_user(user_id)
            .await?
            .ok_or(AuthError::OtpInvalidOrExpired)?;
        if !user.can_login() {
            return Err(AuthError::AccountDisabled);
        }

        let auth = self.ctx.credentials(user_id).await?;
        if auth.is_locked_at(Utc::now()) {
            return Err(AuthError::AccountLocked);
        }
        if !auth.requires_two_factor() {
            return Err(AuthError::OtpInvalidOrExpired);
        }

        let challenge = self.ctx.otp.challenge_digest(challenge_id)?;
        let consumed = self
            .ctx
            .otp
            .verify(user_id, OtpPurpose::TwoFactor, code, Some(challenge.as_slice()))
            .await?;
        if !consumed {
            self.ctx
                .audit(Some(*user_id), AuditAction::TwoFactorFailed, json!({}));
            return Err(AuthError::OtpInvalidOrExpired);
        }

        self.ctx
            .audit(Some(*user_id), AuditAction::TwoFactorVerified, json!({}));
        finish_sign_in(&self.ctx, user, client).await
    }

    /// Replace the pending code with a new one under the same challenge.
    /// Unknown or spent challenges and inactive, locked or non-2FA
    /// identities all get the same generic rejection.
    pub async fn resend(&self, challenge_id: &str) -> AuthResult<DateTime<Utc>> {
        let Some(user_id) = self.ctx.otp.find_challenge(challenge_id).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        let Some(user) = self.ctx.repo.find_user(&user_id).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        let Some(auth) = self.ctx.repo.find_auth(&user_id).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        if !user.can_login() || auth.is_locked_at(Utc::now()) || !auth.requires_two_factor() {
            return Err(AuthError::InvalidCredentials);
        }

        let challenge = self.ctx.otp.challenge_digest(challenge_id)?;
        self.ctx
            .send_code(
                &user,
                OtpPurpose::TwoFactor,
                auth.two_factor_method,
                Some(challenge.as_slice()),
            )
            .await
    }

    /// Turn on the second factor. SMS needs a phone number, either given
    /// here or already on file.
    pub async fn enable(
        &self,
        user_id: &UserId,
        method: TwoFactorMethod,
        phone_number: Option<String>,
    ) -> AuthResult<()> {
        let mut user = self
            .ctx
            .repo
            .find_user(user_id)
            .await?
            .ok_or(AuthError::SessionInvalid)?;

        if let Some(phone) = phone_number {
            let phone = normalize_phone(&phone)?;
            user.set_phone_number(Some(phone), Utc::now());
            self.ctx.repo.update_user(&user).await?;
        }

        if method == TwoFactorMethod::Sms && user.phone_number.is_none() {
            return Err(AuthError::TwoFactorUnavailable(
                "SMS two-factor requires a phone number".into(),
            ));
        }

        self.ctx
            .repo
            .set_two_factor(user_id, true, method, Utc::now())
            .await?;

        tracing::info!(user_id = %user_id, method = %method, "Two-factor enabled");
        self.ctx.audit(
            Some(*user_id),
            AuditAction::TwoFactorEnabled,
            json!({ "method": method.code() }),
        );
        Ok(())
    }

    /// Turn off the second factor. Requires the current password.
    pub async fn disable(&self, user_id: &UserId, password: String) -> AuthResult<()> {
        let auth = self.ctx.credentials(user_id).await?;
        if !auth.requires_two_factor() {
            return Err(AuthError::TwoFactorNotEnabled);
        }

        let (valid, _) = self
            .ctx
            .verify_password(
                SubmittedPassword::new(password).into_clear_text(),
                auth.password_hash.clone(),
            )
            .await?;
        if !valid {
            self.ctx.lockout.register_failure(user_id).await?;
            return Err(AuthError::InvalidCredentials);
        }

        self.ctx
            .repo
            .set_two_factor(user_id, false, TwoFactorMethod::default(), Utc::now())
            .await?;

        tracing::info!(user_id = %user_id, "Two-factor disabled");
        self.ctx
            .audit(Some(*user_id), AuditAction::TwoFactorDisabled, json!({}));
        Ok(())
    }
}

/// E.164-ish: optional leading `+`, then 7..=15 digits. Spaces, dashes and
/// parentheses are dropped.
fn normalize_phone(raw: &str) -> AuthResult<String> {
    let trimmed = raw.trim();
    let (plus, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", trimmed),
    };
    let digits: String = rest
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();

    if !(7..=15).contains(&digits.len()) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AuthError::Validation("Invalid phone number".into()));
    }
    Ok(format!("{plus}{digits}"))
}
