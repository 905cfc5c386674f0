//! Sign Out Use Case
//!
//! Deactivates sessions. Bearer tokens themselves stay cryptographically
//! valid until expiry; with session tracking on, the request path rejects
//! them as soon as their session is inactive.

use std::sync::Arc;

use kernel::id::UserId;
use serde_json::json;

use crate::application::context::AuthContext;
use crate::domain::audit::AuditAction;
use crate::domain::notifier::OtpSender;
use crate::domain::repository::AuthStore;
use crate::error::AuthResult;

/// Sign out use case
pub struct SignOutUseCase<R, N> {
    ctx: Arc<AuthContext<R, N>>,
}

impl<R, N> SignOutUseCase<R, N>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    pub fn new(ctx: Arc<AuthContext<R, N>>) -> Self {
        Self { ctx }
    }

    /// Sign out from one session. Idempotent.
    pub async fn execute(&self, session_id: &str, actor: Option<UserId>) -> AuthResult<()> {
        let was_active = self.ctx.sessions.invalidate(session_id).await?;

        tracing::info!(was_active, "User signed out");
        self.ctx.audit(actor, AuditAction::Logout, json!({ "was_active": was_active }));
        Ok(())
    }

    /// Sign out everywhere, optionally keeping one session (the caller's).
    pub async fn execute_all(&self, user_id: &UserId, keep: Option<&str>) -> AuthResult<u64> {
        let revoked = match keep {
            Some(keep) => self.ctx.sessions.invalidate_all_except(user_id, keep).await?,
            None => self.ctx.sessions.invalidate_all(user_id).await?,
        };

        self.ctx.audit(
            Some(*user_id),
            AuditAction::LogoutAll,
            json!({ "sessions_revoked": revoked, "kept_current": keep.is_some() }),
        );
        Ok(revoked)
    }
}
