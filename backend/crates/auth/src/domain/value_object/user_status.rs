//! User Status Value Object
//!
//! The identity's active flag. Kept as an enum rather than a bool so the
//! stored representation matches the other small-integer code columns.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum UserStatus {
    /// Normal account, may sign in
    #[default]
    Active = 0,

    /// Deactivated by an administrator, cannot sign in
    Disabled = 1,
}

impl UserStatus {
    #[inline]
    pub const fn id(&self) -> i16 {
        *self as i16
    }

    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }

    #[inline]
    pub const fn can_login(&self) -> bool {
        matches!(self, Self::Active)
    }

    #[inline]
    pub const fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(Self::Active),
            1 => Some(Self::Disabled),
            _ => None,
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
