//! Audit trail
//!
//! Security-relevant outcomes are reported to an [`AuditSink`]. Recording is
//! synchronous and infallible from the caller's view: a sink that cannot
//! persist an event must log the failure itself.

use chrono::{DateTime, Utc};
use derive_more::Display;
use kernel::id::UserId;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AuditAction {
    #[display("user.registered")]
    Registered,
    #[display("login.succeeded")]
    LoginSucceeded,
    #[display("login.failed")]
    LoginFailed,
    #[display("account.locked")]
    AccountLocked,
    #[display("account.unlocked")]
    AccountUnlocked,
    #[display("two_factor.challenged")]
    TwoFactorChallenged,
    #[display("two_factor.verified")]
    TwoFactorVerified,
    #[display("two_factor.failed")]
    TwoFactorFailed,
    #[display("two_factor.enabled")]
    TwoFactorEnabled,
    #[display("two_factor.disabled")]
    TwoFactorDisabled,
    #[display("token.refreshed")]
    TokenRefreshed,
    #[display("session.logout")]
    Logout,
    #[display("session.logout_all")]
    LogoutAll,
    #[display("password.changed")]
    PasswordChanged,
    #[display("password.reset_requested")]
    PasswordResetRequested,
    #[display("password.reset")]
    PasswordReset,
    #[display("email.verified")]
    EmailVerified,
}

#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// `None` when the actor is unknown (e.g. login for a nonexistent email)
    pub actor: Option<UserId>,
    pub action: AuditAction,
    pub metadata: Value,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(actor: Option<UserId>, action: AuditAction, metadata: Value) -> Self {
        Self {
            actor,
            action,
            metadata,
            at: Utc::now(),
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}
