//! User Name Value Object
//!
//! A public handle. The original spelling is kept for display; uniqueness is
//! enforced on the lowercase canonical form.
//!
//! ## Invariants
//! - 3..=50 characters after NFKC normalization
//! - ASCII letters, digits and `_ . -`
//! - Starts with a letter or digit
//! - No `..`

use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

use crate::error::{AuthError, AuthResult};

// ============================================================================
// Constants
// ============================================================================

pub const USER_NAME_MIN_LENGTH: usize = 3;
pub const USER_NAME_MAX_LENGTH: usize = 50;

const ALLOWED_SPECIAL_CHARS: &[char] = &['_', '.', '-'];

// ============================================================================
// UserName
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserName {
    original: String,
    canonical: String,
}

impl UserName {
    pub fn new(raw: impl AsRef<str>) -> AuthResult<Self> {
        let normalized: String = raw.as_ref().trim().nfkc().collect();
        validate(&normalized)?;
        let canonical = normalized.to_ascii_lowercase();
        Ok(Self {
            original: normalized,
            canonical,
        })
    }

    /// Rebuild from stored columns (validated on insert)
    pub fn from_db(original: impl Into<String>, canonical: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            canonical: canonical.into(),
        }
    }

    /// Spelling as the user typed it
    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Lowercase form used for uniqueness
    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

fn validate(name: &str) -> AuthResult<()> {
    let len = name.chars().count();
    if len < USER_NAME_MIN_LENGTH || len > USER_NAME_MAX_LENGTH {
        return Err(AuthError::Validation(format!(
            "Username must be {USER_NAME_MIN_LENGTH}-{USER_NAME_MAX_LENGTH} characters"
        )));
    }

    if let Some(bad) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !ALLOWED_SPECIAL_CHARS.contains(c))
    {
        return Err(AuthError::Validation(format!(
            "Username contains invalid character '{bad}'"
        )));
    }

    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(AuthError::Validation(
            "Username must start with a letter or digit".into(),
        ));
    }

    if name.contains("..") {
        return Err(AuthError::Validation(
            "Username cannot contain consecutive dots".into(),
        ));
    }

    Ok(())
}

impl PartialEq for UserName {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for UserName {}

impl std::hash::Hash for UserName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl TryFrom<String> for UserName {
    type Error = AuthError;

    fn try_from(value: String) -> AuthResult<Self> {
        UserName::new(value)
    }
}

impl From<UserName> for String {
    fn from(name: UserName) -> Self {
        name.original
    }
}

impl fmt::Display for UserName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["alice", "Bob_99", "a.b-c", "x12", "0day"] {
            assert!(UserName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["ab", "_alice", ".alice", "al ice", "al..ice", "ali$e", "ユーザー"] {
            assert!(UserName::new(name).is_err(), "{name} should be invalid");
        }
        assert!(UserName::new("a".repeat(51)).is_err());
        assert!(UserName::new("a".repeat(50)).is_ok());
    }

    #[test]
    fn test_canonical_is_lowercase_and_drives_equality() {
        let a = UserName::new("Alice").unwrap();
        let b = UserName::new("alice").unwrap();
        assert_eq!(a.as_str(), "Alice");
        assert_eq!(a.canonical(), "alice");
        assert_eq!(a, b);
    }

    #[test]
    fn test_fullwidth_input_is_normalized() {
        // NFKC folds fullwidth letters to ASCII
        let name = UserName::new("\u{FF41}lice").unwrap();
        assert_eq!(name.as_str(), "alice");
    }
}
