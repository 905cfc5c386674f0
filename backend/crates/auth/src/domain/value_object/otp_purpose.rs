use serde::{Deserialize, Serialize};
use std::fmt;

/// What a one-time code proves. Codes for one purpose never satisfy another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum OtpPurpose {
    EmailVerification = 0,
    PasswordReset = 1,
    TwoFactor = 2,
}

impl OtpPurpose {
    #[inline]
    pub const fn id(&self) -> i16 {
        *self as i16
    }

    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EmailVerification => "email_verification",
            Self::PasswordReset => "password_reset",
            Self::TwoFactor => "two_factor",
        }
    }

    #[inline]
    pub const fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(Self::EmailVerification),
            1 => Some(Self::PasswordReset),
            2 => Some(Self::TwoFactor),
            _ => None,
        }
    }
}

impl fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
