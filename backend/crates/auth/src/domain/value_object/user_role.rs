use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AuthError;

/// Closed set of roles, ranked `User < Moderator < Admin` by `id()`.
///
/// Comparisons go through [`crate::domain::policy::has_role`]; the enum
/// deliberately has no `Ord` so call sites cannot invent their own checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum UserRole {
    #[default]
    User = 0,
    Moderator = 1,
    Admin = 2,
}

impl UserRole {
    pub const ALL: [UserRole; 3] = [UserRole::User, UserRole::Moderator, UserRole::Admin];

    #[inline]
    pub const fn id(&self) -> i16 {
        *self as i16
    }

    #[inline]
    pub const fn code(&self) -> &'static str {
        use UserRole::*;
        match self {
            User => "user",
            Moderator => "moderator",
            Admin => "admin",
        }
    }

    #[inline]
    pub const fn from_id(id: i16) -> Option<Self> {
        use UserRole::*;
        match id {
            0 => Some(User),
            1 => Some(Moderator),
            2 => Some(Admin),
            _ => None,
        }
    }

    #[inline]
    pub fn from_code(code: &str) -> Option<Self> {
        use UserRole::*;
        match code {
            "user" => Some(User),
            "moderator" => Some(Moderator),
            "admin" => Some(Admin),
            _ => None,
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for UserRole {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UserRole::from_code(&s.to_ascii_lowercase())
            .ok_or_else(|| AuthError::Validation(format!("Unknown role '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_role_from_id() {
        assert_eq!(UserRole::from_id(0), Some(UserRole::User));
        assert_eq!(UserRole::from_id(1), Some(UserRole::Moderator));
        assert_eq!(UserRole::from_id(2), Some(UserRole::Admin));
        assert_eq!(UserRole::from_id(3), None);
        assert_eq!(UserRole::from_id(-1), None);
    }

    #[test]
    fn test_user_role_code_round_trip() {
        for role in UserRole::ALL {
            assert_eq!(UserRole::from_code(role.code()), Some(role));
            assert_eq!(role.to_string().parse::<UserRole>().unwrap(), role);
        }
        assert!("root".parse::<UserRole>().is_err());
        assert_eq!("ADMIN".parse::<UserRole>().unwrap(), UserRole::Admin);
    }

    #[test]
    fn test_user_role_serde_lowercase() {
        assert_eq!(serde_json::to_string(&UserRole::Moderator).unwrap(), "\"moderator\"");
        let role: UserRole = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, UserRole::Admin);
    }

    #[test]
    fn test_default_is_user() {
        assert_eq!(UserRole::default(), UserRole::User);
    }
}
