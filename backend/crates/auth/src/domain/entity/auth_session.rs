//! Auth Session Entity
//!
//! Server-side record of one login. A single identity may hold many.

use chrono::{DateTime, Duration, Utc};
use kernel::id::UserId;
use platform::client::ClientInfo;

#[derive(Debug, Clone)]
pub struct AuthSession {
    /// Unguessable random token (256 bits, base64url)
    pub session_id: String,
    pub user_id: UserId,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    /// TTL comes from config; the caller guarantees it is positive so
    /// `expires_at` is in the future.
    pub fn new(
        session_id: String,
        user_id: UserId,
        client: &ClientInfo,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            user_id,
            client_ip: client.ip_string(),
            user_agent: client.user_agent.clone(),
            is_active: true,
            created_at: now,
            last_seen_at: now,
            expires_at: now + ttl,
        }
    }

    /// Active and unexpired. An inactive session is never valid.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expires_at
    }
}

/// Session summary for listings (no raw session ID)
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Short non-secret handle for display
    pub handle: String,
    pub user_agent: Option<String>,
    pub client_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_current: bool,
}

impl SessionInfo {
    pub fn from_session(session: &AuthSession, current: Option<&str>) -> Self {
        Self {
            handle: session.session_id.chars().take(8).collect(),
            user_agent: session.user_agent.clone(),
            client_ip: session.client_ip.clone(),
            created_at: session.created_at,
            last_seen_at: session.last_seen_at,
            expires_at: session.expires_at,
            is_current: current == Some(session.session_id.as_str()),
        }
    }
}
