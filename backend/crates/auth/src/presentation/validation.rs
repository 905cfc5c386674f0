//! Request validation
//!
//! Each request type declares a static table of `field -> checks` and a
//! lookup from field name to value. Checks are shape-only (presence, length,
//! character class); domain rules such as the password policy or username
//! grammar stay in the value objects.

use crate::domain::value_object::email::is_valid_format;
use crate::error::{AuthError, AuthResult};
use crate::presentation::dto::{
    ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RegisterRequest,
    ResetPasswordRequest, TwoFactorDisableRequest, TwoFactorEnableRequest,
    TwoFactorResendRequest, TwoFactorVerifyRequest, VerifyEmailRequest,
};

/// Upper bound on any free-text field, before domain parsing
const MAX_FIELD_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Required,
    MinLen(usize),
    MaxLen(usize),
    Email,
    Digits,
    OneOf(&'static [&'static str]),
}

impl Check {
    /// `None` when the value passes
    fn violation(&self, value: Option<&str>) -> Option<String> {
        let Some(value) = value else {
            return match self {
                Check::Required => Some("is required".into()),
                _ => None,
            };
        };

        match *self {
            Check::Required if value.trim().is_empty() => Some("is required".into()),
            Check::MinLen(n) if value.chars().count() < n => {
                Some(format!("must be at least {n} characters"))
            }
            Check::MaxLen(n) if value.chars().count() > n => {
                Some(format!("must be at most {n} characters"))
            }
            Check::Email if !is_valid_format(value.trim()) => Some("must be an email address".into()),
            Check::Digits if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) => {
                Some("must contain only digits".into())
            }
            Check::OneOf(allowed) if !allowed.iter().any(|a| a.eq_ignore_ascii_case(value)) => {
                Some(format!("must be one of: {}", allowed.join(", ")))
            }
            _ => None,
        }
    }
}

pub type Rules = &'static [(&'static str, &'static [Check])];

pub trait Validate {
    const RULES: Rules;

    /// Value of a field named in `RULES`; `None` when absent
    fn field(&self, name: &str) -> Option<&str>;

    fn validate(&self) -> AuthResult<()> {
        let problems: Vec<String> = Self::RULES
            .iter()
            .flat_map(|(name, checks)| {
                let value = self.field(name);
                checks
                    .iter()
                    .filter_map(move |check| check.violation(value))
                    .map(move |msg| format!("{name} {msg}"))
            })
            .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Validation(problems.join("; ")))
        }
    }
}

// ============================================================================
// Rule tables
// ============================================================================

const EMAIL: &[Check] = &[Check::Required, Check::MaxLen(MAX_FIELD_LEN), Check::Email];
const PASSWORD: &[Check] = &[Check::Required, Check::MaxLen(MAX_FIELD_LEN)];
const CODE: &[Check] = &[Check::Required, Check::Digits, Check::MaxLen(10)];
/// base64url of 32 random bytes is 43 characters
const CHALLENGE_ID: &[Check] = &[Check::Required, Check::MinLen(43), Check::MaxLen(64)];
const NAME: &[Check] = &[Check::Required, Check::MaxLen(100)];

impl Validate for RegisterRequest {
    const RULES: Rules = &[
        ("email", EMAIL),
        ("userName", &[Check::Required, Check::MinLen(3), Check::MaxLen(50)]),
        ("password", PASSWORD),
        ("firstName", NAME),
        ("lastName", NAME),
        ("role", &[Check::OneOf(&["user", "moderator", "admin"])]),
    ];

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "email" => Some(&self.email),
            "userName" => Some(&self.user_name),
            "password" => Some(&self.password),
            "firstName" => Some(&self.first_name),
            "lastName" => Some(&self.last_name),
            "role" => self.role.as_deref(),
            _ => None,
        }
    }
}

impl Validate for LoginRequest {
    const RULES: Rules = &[("email", EMAIL), ("password", PASSWORD)];

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "email" => Some(&self.email),
            "password" => Some(&self.password),
            _ => None,
        }
    }
}

impl Validate for TwoFactorVerifyRequest {
    const RULES: Rules = &[("challengeId", CHALLENGE_ID), ("code", CODE)];

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "challengeId" => Some(&self.challenge_id),
            "code" => Some(&self.code),
            _ => None,
        }
    }
}

impl Validate for TwoFactorResendRequest {
    const RULES: Rules = &[("challengeId", CHALLENGE_ID)];

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "challengeId" => Some(&self.challenge_id),
            _ => None,
        }
    }
}

impl Validate for TwoFactorEnableRequest {
    const RULES: Rules = &[
        ("method", &[Check::Required, Check::OneOf(&["email", "sms"])]),
        ("phoneNumber", &[Check::MinLen(7), Check::MaxLen(20)]),
    ];

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "method" => Some(&self.method),
            "phoneNumber" => self.phone_number.as_deref(),
            _ => None,
        }
    }
}

impl Validate for TwoFactorDisableRequest {
    const RULES: Rules = &[("password", PASSWORD)];

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "password" => Some(&self.password),
            _ => None,
        }
    }
}

impl Validate for ChangePasswordRequest {
    const RULES: Rules = &[("currentPassword", PASSWORD), ("newPassword", PASSWORD)];

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "currentPassword" => Some(&self.current_password),
            "newPassword" => Some(&self.new_password),
            _ => None,
        }
    }
}

impl Validate for ForgotPasswordRequest {
    const RULES: Rules = &[("email", EMAIL)];

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "email" => Some(&self.email),
            _ => None,
        }
    }
}

impl Validate for ResetPasswordRequest {
    const RULES: Rules = &[("email", EMAIL), ("code", CODE), ("newPassword", PASSWORD)];

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "email" => Some(&self.email),
            "code" => Some(&self.code),
            "newPassword" => Some(&self.new_password),
            _ => None,
        }
    }
}

impl Validate for VerifyEmailRequest {
    const RULES: Rules = &[("code", CODE)];

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "code" => Some(&self.code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register() -> RegisterRequest {
        RegisterRequest {
            email: "alice@example.com".into(),
            user_name: "alice".into(),
            password: "correct horse battery".into(),
            first_name: "Alice".into(),
            last_name: "Liddell".into(),
            role: None,
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(register().validate().is_ok());
    }

    #[test]
    fn test_reports_every_violation() {
        let req = RegisterRequest {
            email: "not-an-email".into(),
            user_name: "ab".into(),
            role: Some("root".into()),
            ..register()
        };
        let Err(AuthError::Validation(msg)) = req.validate() else {
            panic!("expected validation error");
        };
        assert!(msg.contains("email must be an email address"));
        assert!(msg.contains("userName must be at least 3 characters"));
        assert!(msg.contains("role must be one of"));
    }

    #[test]
    fn test_optional_fields_skip_checks_when_absent() {
        let req = TwoFactorEnableRequest {
            method: "SMS".into(),
            phone_number: None,
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_challenge_id_must_look_like_a_token() {
        let req = TwoFactorResendRequest {
            challenge_id: "0192d4a8-7b3c-7def-8000-000000000001".into(),
        };
        let Err(AuthError::Validation(msg)) = req.validate() else {
            panic!("expected validation error");
        };
        assert!(msg.contains("challengeId must be at least 43 characters"));

        let req = TwoFactorResendRequest {
            challenge_id: "A".repeat(43),
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_code_must_be_digits() {
        let req = VerifyEmailRequest { code: "12a456".into() };
        assert!(req.validate().is_err());
        let req = VerifyEmailRequest { code: "".into() };
        assert!(req.validate().is_err());
    }
}
