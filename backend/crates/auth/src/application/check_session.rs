//! Check Session Use Case
//!
//! Turns a bearer token into the caller's identity for protected routes.
//! Signature and expiry are checked first; when the token is bound to a
//! session and tracking is on, the session must also be live, so logout and
//! forced logout take effect immediately.

use std::sync::Arc;

use kernel::id::UserId;

use crate::application::context::AuthContext;
use crate::application::token::Claims;
use crate::domain::notifier::OtpSender;
use crate::domain::repository::AuthStore;
use crate::domain::value_object::user_role::UserRole;
use crate::error::{AuthError, AuthResult};

/// Authenticated caller, as inserted into request extensions
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: UserId,
    pub role: UserRole,
    pub session_id: Option<String>,
    pub claims: Claims,
}

/// Check session use case
pub struct CheckSessionUseCase<R, N> {
    ctx: Arc<AuthContext<R, N>>,
}

impl<R, N> CheckSessionUseCase<R, N>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    pub fn new(ctx: Arc<AuthContext<R, N>>) -> Self {
        Self { ctx }
    }

    pub async fn execute(&self, token: &str) -> AuthResult<CurrentUser> {
        let claims = self.ctx.codec.verify(token)?;
        let user_id = claims.user_id()?;

        if self.ctx.config.track_sessions {
            if let Some(sid) = claims.sid.as_deref() {
                let session = self.ctx.sessions.validate(sid).await?;
                if session.user_id != user_id {
                    tracing::warn!(user_id = %user_id, "Token bound to another identity's session");
                    return Err(AuthError::SessionInvalid);
                }
            }
        }

        Ok(CurrentUser {
            user_id,
            role: claims.role,
            session_id: claims.sid.clone(),
            claims,
        })
    }
}
