use serde::{Deserialize, Serialize};
use std::fmt;

/// Out-of-band channel used to deliver two-factor codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum TwoFactorMethod {
    #[default]
    Email = 0,
    Sms = 1,
}

impl TwoFactorMethod {
    #[inline]
    pub const fn id(&self) -> i16 {
        *self as i16
    }

    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }

    #[inline]
    pub const fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(Self::Email),
            1 => Some(Self::Sms),
            _ => None,
        }
    }
}

impl fmt::Display for TwoFactorMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
