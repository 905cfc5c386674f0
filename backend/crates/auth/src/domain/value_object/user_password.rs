//! User Password Value Objects
//!
//! Two wrappers over `platform::password::ClearTextPassword`:
//! - [`NewPassword`] is a password being set (registration, change, reset)
//!   and must pass the policy.
//! - [`SubmittedPassword`] is a password being checked at login. It is only
//!   normalized, so a policy-violating guess still costs one verification
//!   and counts as a failed attempt.
//!
//! Both zeroize on drop and redact `Debug`.

use platform::password::{ClearTextPassword, PasswordPolicyError};
use std::fmt;

use crate::error::{AuthError, AuthResult};

// ============================================================================
// New Password
// ============================================================================

pub struct NewPassword(ClearTextPassword);

impl NewPassword {
    pub fn new(raw: String) -> AuthResult<Self> {
        ClearTextPassword::new(raw)
            .map(Self)
            .map_err(policy_error)
    }

    pub fn as_clear_text(&self) -> &ClearTextPassword {
        &self.0
    }

    pub fn into_clear_text(self) -> ClearTextPassword {
        self.0
    }
}

fn policy_error(err: PasswordPolicyError) -> AuthError {
    AuthError::Validation(err.to_string())
}

impl fmt::Debug for NewPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NewPassword([REDACTED])")
    }
}

// ============================================================================
// Submitted Password
// ============================================================================

pub struct SubmittedPassword(ClearTextPassword);

impl SubmittedPassword {
    pub fn new(raw: String) -> Self {
        Self(ClearTextPassword::for_verification(raw))
    }

    pub fn as_clear_text(&self) -> &ClearTextPassword {
        &self.0
    }

    pub fn into_clear_text(self) -> ClearTextPassword {
        self.0
    }
}

impl fmt::Debug for SubmittedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SubmittedPassword([REDACTED])")
    }
}
