//! Refresh Token Use Case
//!
//! Chains off a still-valid token: no separate refresh-token type. The old
//! token is not revoked; revocation belongs to the session.

use std::sync::Arc;

use serde_json::json;

use crate::application::context::AuthContext;
use crate::application::token::IssuedToken;
use crate::domain::audit::AuditAction;
use crate::domain::notifier::OtpSender;
use crate::domain::repository::AuthStore;
use crate::error::{AuthError, AuthResult};

pub struct RefreshUseCase<R, N> {
    ctx: Arc<AuthContext<R, N>>,
}

impl<R, N> RefreshUseCase<R, N>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    pub fn new(ctx: Arc<AuthContext<R, N>>) -> Self {
        Self { ctx }
    }

    pub async fn execute(&self, token: &str) -> AuthResult<IssuedToken> {
        let claims = self.ctx.codec.verify(token)?;
        let user_id = claims.user_id()?;

        // A disabled identity cannot extend its access
        let user = self
            .ctx
            .repo
            .find_user(&user_id)
            .await?
            .ok_or(AuthError::SessionInvalid)?;
        if !user.can_login() {
            return Err(AuthError::SessionInvalid);
        }

        if self.ctx.config.track_sessions {
            if let Some(sid) = claims.sid.as_deref() {
                let session = self.ctx.sessions.validate(sid).await?;
                if session.user_id != user_id {
                    return Err(AuthError::SessionInvalid);
                }
                self.ctx.sessions.refresh(sid).await?;
            }
        }

        let refreshed = self.ctx.codec.refresh(token, self.ctx.config.token_ttl)?;

        tracing::debug!(user_id = %user_id, "Token refreshed");
        self.ctx
            .audit(Some(user_id), AuditAction::TokenRefreshed, json!({}));
        Ok(refreshed)
    }
}
