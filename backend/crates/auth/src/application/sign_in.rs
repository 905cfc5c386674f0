//! Sign In Use Case
//!
//! Email + password login. Every rejection (unknown email, inactive,
//! locked, wrong password) is a distinct internal error but renders the
//! same to the client.
//!
//! ## Order of checks
//! 1. Unknown email or inactive account: one dummy verification, reject
//! 2. Lock still running: reject without hashing
//! 3. Lock already passed: clear it and the counter, then continue
//! 4. Wrong password: count the failure (may lock), reject
//! 5. Two-factor enabled: send a code and stop at "pending"
//! 6. Otherwise: clear the counter, record the login, issue credentials

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kernel::id::UserId;
use platform::client::ClientInfo;
use serde_json::json;

use crate::application::context::{AuthContext, AuthSuccess};
use crate::domain::audit::AuditAction;
use crate::domain::entity::user::User;
use crate::domain::notifier::OtpSender;
use crate::domain::repository::AuthStore;
use crate::domain::value_object::{
    email::Email, otp_purpose::OtpPurpose, two_factor_method::TwoFactorMethod,
    user_password::SubmittedPassword,
};
use crate::error::{AuthError, AuthResult};

/// Sign in input
#[derive(Debug)]
pub struct SignInInput {
    pub email: String,
    pub password: String,
}

/// Password accepted; a second factor is still owed.
///
/// `challenge_id` is the only handle that can resend or complete the
/// login. It lives exactly as long as the code it was issued with.
#[derive(Debug, Clone)]
pub struct TwoFactorChallenge {
    pub challenge_id: String,
    pub user_id: UserId,
    pub method: TwoFactorMethod,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum SignInOutcome {
    Authenticated(AuthSuccess),
    TwoFactorPending(TwoFactorChallenge),
}

/// Sign in use case
pub struct SignInUseCase<R, N> {
    ctx: Arc<AuthContext<R, N>>,
}

impl<R, N> SignInUseCase<R, N>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    pub fn new(ctx: Arc<AuthContext<R, N>>) -> Self {
        Self { ctx }
    }

    pub async fn execute(&self, input: SignInInput, client: &ClientInfo) -> AuthResult<SignInOutcome> {
        let password = SubmittedPassword::new(input.password).into_clear_text();

        let user = match Email::new(input.email) {
            Ok(email) => self.ctx.repo.find_user_by_email(&email).await?,
            Err(_) => None,
        };

        let Some(user) = user else {
            self.ctx.burn_verification(password).await;
            self.ctx
                .audit(None, AuditAction::LoginFailed, json!({ "reason": "unknown_email" }));
            return Err(AuthError::InvalidCredentials);
        };

        if !user.can_login() {
            self.ctx.burn_verification(password).await;
            self.reject(&user, "inactive");
            return Err(AuthError::AccountDisabled);
        }

        let mut auth = self.ctx.credentials(&user.user_id).await?;
        let now = Utc::now();

        if auth.is_locked_at(now) {
            self.reject(&user, "locked");
            return Err(AuthError::AccountLocked);
        }

        if auth.lock_expired_at(now) {
            self.ctx.lockout.unlock(&user.user_id).await?;
            auth.locked_until = None;
            auth.login_failed_count = 0;
            tracing::info!(user_id = %user.user_id, "Expired lock cleared");
        }

        let (valid, password) = self
            .ctx
            .verify_password(password, auth.password_hash.clone())
            .await?;

        if !valid {
            let outcome = self.ctx.lockout.register_failure(&user.user_id).await?;
            self.reject(&user, "wrong_password");
            if let Some(until) = outcome.locked_until {
                self.ctx.audit(
                    Some(user.user_id),
                    AuditAction::AccountLocked,
                    json!({ "failed_attempts": outcome.failed_attempts, "locked_until": until }),
                );
            }
            return Err(AuthError::InvalidCredentials);
        }

        if self.ctx.hasher.needs_rehash(&auth.password_hash) {
            let rehashed = self.ctx.hash_password(password).await?;
            self.ctx
                .repo
                .update_password(&user.user_id, &rehashed, Utc::now())
                .await?;
            tracing::info!(user_id = %user.user_id, "Password hash upgraded");
        }

        if auth.requires_two_factor() {
            // The counter is left alone until the second factor succeeds
            let method = auth.two_factor_method;
            let challenge = self.ctx.otp.new_challenge()?;
            let expires_at = self
                .ctx
                .send_code(
                    &user,
                    OtpPurpose::TwoFactor,
                    method,
                    Some(challenge.digest.as_slice()),
                )
                .await?;
            self.ctx.audit(
                Some(user.user_id),
                AuditAction::TwoFactorChallenged,
                json!({ "method": method.code() }),
            );
            return Ok(SignInOutcome::TwoFactorPending(TwoFactorChallenge {
                challenge_id: challenge.token,
                user_id: user.user_id,
                method,
                expires_at,
            }));
        }

        let success = finish_sign_in(&self.ctx, user, client).await?;
        Ok(SignInOutcome::Authenticated(success))
    }

    fn reject(&self, user: &User, reason: &str) {
        tracing::warn!(user_id = %user.user_id, reason, "Login rejected");
        self.ctx.audit(
            Some(user.user_id),
            AuditAction::LoginFailed,
            json!({ "reason": reason }),
        );
    }
}

/// Final step of every successful login, with or without a second factor.
pub(crate) async fn finish_sign_in<R, N>(
    ctx: &AuthContext<R, N>,
    mut user: User,
    client: &ClientInfo,
) -> AuthResult<AuthSuccess>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    ctx.lockout.unlock(&user.user_id).await?;

    user.record_login(Utc::now());
    ctx.repo.update_user(&user).await?;

    let success = ctx.establish(user, client).await?;

    tracing::info!(
        user_id = %success.user.user_id,
        tracked = success.session_id.is_some(),
        "User signed in"
    );
    ctx.audit(
        Some(success.user.user_id),
        AuditAction::LoginSucceeded,
        json!({ "ip": client.ip_string() }),
    );

    Ok(success)
}
