//! In-Memory Implementations
//!
//! A process-local store with the same observable semantics as the Postgres
//! repository, plus a capturing code sender and audit sink. Used by tests and
//! by single-process setups without a database.
//!
//! All state sits behind one mutex that is never held across an `.await`,
//! so each repository call is atomic with respect to every other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use kernel::id::UserId;
use platform::password::HashedPassword;

use crate::domain::audit::{AuditAction, AuditEvent, AuditSink};
use crate::domain::entity::{
    auth::Auth, auth_session::AuthSession, one_time_code::OneTimeCode, user::User,
};
use crate::domain::notifier::{OtpDestination, OtpSender};
use crate::domain::repository::{
    AuthRepository, AuthSessionRepository, OneTimeCodeRepository, UserRepository,
};
use crate::domain::value_object::{
    email::Email, otp_purpose::OtpPurpose, two_factor_method::TwoFactorMethod,
    user_name::UserName,
};
use crate::error::{AuthError, AuthResult};

#[derive(Default)]
struct State {
    users: HashMap<UserId, User>,
    auths: HashMap<UserId, Auth>,
    sessions: HashMap<String, AuthSession>,
    codes: Vec<OneTimeCode>,
}

#[derive(Clone, Default)]
pub struct InMemoryAuthStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored codes, used or not
    pub fn code_count(&self) -> usize {
        self.lock().codes.len()
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }
}

// ============================================================================
// User Repository Implementation
// ============================================================================

impl UserRepository for InMemoryAuthStore {
    async fn create_user(&self, user: &User, auth: &Auth) -> AuthResult<()> {
        let mut state = self.lock();
        if state.users.values().any(|u| u.email == user.email) {
            return Err(AuthError::DuplicateEmail);
        }
        if state.users.values().any(|u| u.user_name == user.user_name) {
            return Err(AuthError::DuplicateUserName);
        }
        state.users.insert(user.user_id, user.clone());
        state.auths.insert(auth.user_id, auth.clone());
        Ok(())
    }

    async fn find_user(&self, user_id: &UserId) -> AuthResult<Option<User>> {
        Ok(self.lock().users.get(user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| &u.email == email)
            .cloned())
    }

    async fn exists_by_email(&self, email: &Email) -> AuthResult<bool> {
        Ok(self.lock().users.values().any(|u| &u.email == email))
    }

    async fn exists_by_user_name(&self, user_name: &UserName) -> AuthResult<bool> {
        Ok(self.lock().users.values().any(|u| &u.user_name == user_name))
    }

    async fn update_user(&self, user: &User) -> AuthResult<()> {
        if let Some(stored) = self.lock().users.get_mut(&user.user_id) {
            *stored = user.clone();
        }
        Ok(())
    }
}

// ============================================================================
// Auth Repository Implementation
// ============================================================================

impl AuthRepository for InMemoryAuthStore {
    async fn find_auth(&self, user_id: &UserId) -> AuthResult<Option<Auth>> {
        Ok(self.lock().auths.get(user_id).cloned())
    }

    async fn update_password(
        &self,
        user_id: &UserId,
        hash: &HashedPassword,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        if let Some(auth) = self.lock().auths.get_mut(user_id) {
            auth.password_hash = hash.clone();
            auth.updated_at = now;
        }
        Ok(())
    }

    async fn set_two_factor(
        &self,
        user_id: &UserId,
        enabled: bool,
        method: TwoFactorMethod,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        if let Some(auth) = self.lock().auths.get_mut(user_id) {
            auth.two_factor_enabled = enabled;
            auth.two_factor_method = method;
            auth.updated_at = now;
        }
        Ok(())
    }

    async fn increment_failed_attempts(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AuthResult<u32> {
        let mut state = self.lock();
        let auth = state
            .auths
            .get_mut(user_id)
            .ok_or(AuthError::InvalidCredentials)?;
        auth.login_failed_count = auth.login_failed_count.saturating_add(1);
        auth.last_failed_at = Some(now);
        auth.updated_at = now;
        Ok(auth.login_failed_count)
    }

    async fn lock_until(&self, user_id: &UserId, until: DateTime<Utc>) -> AuthResult<()> {
        if let Some(auth) = self.lock().auths.get_mut(user_id) {
            auth.locked_until = Some(until);
        }
        Ok(())
    }

    async fn reset_failed_attempts(&self, user_id: &UserId) -> AuthResult<()> {
        if let Some(auth) = self.lock().auths.get_mut(user_id) {
            auth.login_failed_count = 0;
            auth.last_failed_at = None;
        }
        Ok(())
    }

    async fn unlock(&self, user_id: &UserId) -> AuthResult<()> {
        if let Some(auth) = self.lock().auths.get_mut(user_id) {
            auth.login_failed_count = 0;
            auth.last_failed_at = None;
            auth.locked_until = None;
        }
        Ok(())
    }
}

// ============================================================================
// Auth Session Repository Implementation
// ============================================================================

impl AuthSessionRepository for InMemoryAuthStore {
    async fn create_session(&self, session: &AuthSession) -> AuthResult<()> {
        self.lock()
            .sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn find_session(&self, session_id: &str) -> AuthResult<Option<AuthSession>> {
        Ok(self.lock().sessions.get(session_id).cloned())
    }

    async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> AuthResult<()> {
        if let Some(session) = self.lock().sessions.get_mut(session_id) {
            if session.is_active {
                session.last_seen_at = now;
            }
        }
        Ok(())
    }

    async fn extend_session(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<bool> {
        match self.lock().sessions.get_mut(session_id) {
            Some(session) if session.is_active => {
                session.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deactivate_session(&self, session_id: &str) -> AuthResult<bool> {
        match self.lock().sessions.get_mut(session_id) {
            Some(session) if session.is_active => {
                session.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deactivate_user_sessions(
        &self,
        user_id: &UserId,
        except: Option<&str>,
    ) -> AuthResult<u64> {
        let mut revoked = 0;
        for session in self.lock().sessions.values_mut() {
            if session.user_id == *user_id
                && session.is_active
                && except != Some(session.session_id.as_str())
            {
                session.is_active = false;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn find_active_sessions(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<AuthSession>> {
        let mut sessions: Vec<AuthSession> = self
            .lock()
            .sessions
            .values()
            .filter(|s| s.user_id == *user_id && s.is_valid_at(now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        Ok(sessions)
    }

    async fn delete_stale_sessions(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let mut state = self.lock();
        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.is_valid_at(now));
        Ok((before - state.sessions.len()) as u64)
    }
}

// ============================================================================
// One-Time Code Repository Implementation
// ============================================================================

impl OneTimeCodeRepository for InMemoryAuthStore {
    async fn replace_code(&self, code: &OneTimeCode) -> AuthResult<()> {
        let mut state = self.lock();
        state.codes.retain(|c| {
            !(c.user_id == code.user_id && c.purpose == code.purpose && c.used_at.is_none())
        });
        state.codes.push(code.clone());
        Ok(())
    }

    async fn consume_code(
        &self,
        user_id: &UserId,
        purpose: OtpPurpose,
        code_hash: &[u8],
        challenge_hash: Option<&[u8]>,
        now: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let mut state = self.lock();
        let candidate = state.codes.iter_mut().find(|c| {
            c.user_id == *user_id && c.purpose == purpose && c.is_usable_at(now)
        });

        match candidate {
            Some(code) if code.matches(code_hash) && code.answers(challenge_hash) => {
                code.used_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_challenge(
        &self,
        challenge_hash: &[u8],
        now: DateTime<Utc>,
    ) -> AuthResult<Option<UserId>> {
        let state = self.lock();
        Ok(state
            .codes
            .iter()
            .find(|c| {
                c.purpose == OtpPurpose::TwoFactor
                    && c.is_usable_at(now)
                    && c.answers(Some(challenge_hash))
            })
            .map(|c| c.user_id))
    }

    async fn delete_stale_codes(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let mut state = self.lock();
        let before = state.codes.len();
        state.codes.retain(|c| c.is_usable_at(now));
        Ok((before - state.codes.len()) as u64)
    }
}

// ============================================================================
// Capturing code sender
// ============================================================================

#[derive(Debug, Clone)]
pub struct SentOtp {
    pub destination: OtpDestination,
    pub purpose: OtpPurpose,
    pub code: String,
}

/// Records every code instead of delivering it
#[derive(Clone, Default)]
pub struct OtpOutbox {
    sent: Arc<Mutex<Vec<SentOtp>>>,
}

impl OtpOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentOtp> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Most recent code sent for `purpose`
    pub fn last_code(&self, purpose: OtpPurpose) -> Option<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|s| s.purpose == purpose)
            .map(|s| s.code.clone())
    }
}

impl OtpSender for OtpOutbox {
    async fn send_otp(
        &self,
        destination: &OtpDestination,
        purpose: OtpPurpose,
        code: &str,
    ) -> AuthResult<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentOtp {
                destination: destination.clone(),
                purpose,
                code: code.to_string(),
            });
        Ok(())
    }
}

// ============================================================================
// Capturing audit sink
// ============================================================================

#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn actions(&self) -> Vec<AuditAction> {
        self.events().into_iter().map(|e| e.action).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
