//! Session Store
//!
//! Server-side record of active logins. Sessions are what make logout and
//! admin-forced logout take effect before a bearer token expires.

use std::time::Duration;

use chrono::Utc;
use kernel::id::UserId;
use platform::client::ClientInfo;

use crate::application::config::to_chrono;
use crate::domain::entity::auth_session::{AuthSession, SessionInfo};
use crate::domain::repository::AuthSessionRepository;
use crate::error::{AuthError, AuthResult};

/// Random bytes per session ID (256 bits)
const SESSION_ID_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct SessionStore<R> {
    repo: R,
    ttl: Duration,
}

impl<R> SessionStore<R>
where
    R: AuthSessionRepository + Clone + Send + Sync + 'static,
{
    pub fn new(repo: R, ttl: Duration) -> Self {
        Self { repo, ttl }
    }

    /// Start a session that expires `ttl` from now.
    pub async fn create(&self, user_id: &UserId, client: &ClientInfo) -> AuthResult<AuthSession> {
        let session_id = platform::crypto::random_token(SESSION_ID_BYTES)
            .map_err(|e| AuthError::Internal(format!("Session ID generation failed: {e}")))?;

        let session = AuthSession::new(session_id, *user_id, client, to_chrono(self.ttl), Utc::now());
        self.repo.create_session(&session).await?;

        tracing::info!(
            user_id = %user_id,
            client_ip = session.client_ip.as_deref().unwrap_or("-"),
            "Session created"
        );
        Ok(session)
    }

    /// Return the session if it is active and unexpired.
    ///
    /// Unknown, expired and revoked sessions all fail with the same
    /// `SessionInvalid`. The last-seen update runs on its own task and
    /// never delays or fails the caller.
    pub async fn validate(&self, session_id: &str) -> AuthResult<AuthSession> {
        let now = Utc::now();
        let session = self
            .repo
            .find_session(session_id)
            .await?
            .filter(|s| s.is_valid_at(now))
            .ok_or(AuthError::SessionInvalid)?;

        let repo = self.repo.clone();
        let id = session.session_id.clone();
        tokio::spawn(async move {
            if let Err(e) = repo.touch_session(&id, now).await {
                tracing::debug!(error = %e, "Session touch failed");
            }
        });

        Ok(session)
    }

    /// Push expiry to `ttl` from now. No-op for inactive sessions.
    pub async fn refresh(&self, session_id: &str) -> AuthResult<()> {
        let expires_at = Utc::now() + to_chrono(self.ttl);
        if !self.repo.extend_session(session_id, expires_at).await? {
            tracing::debug!("Refresh skipped for inactive session");
        }
        Ok(())
    }

    pub async fn invalidate(&self, session_id: &str) -> AuthResult<bool> {
        self.repo.deactivate_session(session_id).await
    }

    pub async fn invalidate_all(&self, user_id: &UserId) -> AuthResult<u64> {
        let count = self.repo.deactivate_user_sessions(user_id, None).await?;
        tracing::info!(user_id = %user_id, count, "All sessions invalidated");
        Ok(count)
    }

    pub async fn invalidate_all_except(&self, user_id: &UserId, keep: &str) -> AuthResult<u64> {
        let count = self.repo.deactivate_user_sessions(user_id, Some(keep)).await?;
        tracing::info!(user_id = %user_id, count, "Other sessions invalidated");
        Ok(count)
    }

    /// Active sessions, most recently seen first, with `current` flagged
    pub async fn list_active(
        &self,
        user_id: &UserId,
        current: Option<&str>,
    ) -> AuthResult<Vec<SessionInfo>> {
        let sessions = self.repo.find_active_sessions(user_id, Utc::now()).await?;
        Ok(sessions
            .iter()
            .map(|s| SessionInfo::from_session(s, current))
            .collect())
    }

    /// Delete expired and inactive sessions
    pub async fn sweep(&self) -> AuthResult<u64> {
        self.repo.delete_stale_sessions(Utc::now()).await
    }
}
