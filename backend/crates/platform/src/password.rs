//! Password Hashing and Verification
//!
//! Argon2id with a per-hash random salt embedded in the PHC string.
//!
//! ## Security Features
//! - Memory-hard hashing (OWASP parameters by default)
//! - Zeroization of clear text and peppered buffers
//! - Constant-time hash comparison (inside `argon2`)
//! - Optional application-wide pepper

use std::fmt;

use argon2::password_hash::{
    PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

// ============================================================================
// Constants
// ============================================================================

/// Minimum password length (NIST SP 800-63B: at least 8)
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Passwords rejected outright at registration / change
const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "password123",
    "12345678",
    "123456789",
    "1234567890",
    "qwertyuiop",
    "qwerty123",
    "iloveyou",
    "letmein1",
    "welcome1",
    "admin123",
    "abc12345",
    "11111111",
    "00000000",
];

// ============================================================================
// Error Types
// ============================================================================

/// Password policy violation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordPolicyError {
    #[error("Password must be at least {min} characters (got {actual})")]
    TooShort { min: usize, actual: usize },

    #[error("Password must be at most {max} characters (got {actual})")]
    TooLong { max: usize, actual: usize },

    #[error("Password cannot be empty or contain only whitespace")]
    EmptyOrWhitespace,

    #[error("Password contains invalid control characters")]
    InvalidCharacter,

    #[error("Password is too common")]
    Common,
}

/// Password hashing/verification errors
#[derive(Debug, Error)]
pub enum PasswordHashError {
    #[error("Invalid Argon2 parameters: {0}")]
    InvalidParams(String),

    #[error("Password hashing failed: {0}")]
    HashingFailed(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,
}

// ============================================================================
// Clear Text Password (Zeroized on drop)
// ============================================================================

/// Clear text password, NFKC-normalized and zeroized on drop.
///
/// Does not implement `Clone`; `Debug` output is redacted.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ClearTextPassword(String);

impl ClearTextPassword {
    /// Accept a new password (registration, change, reset) after policy checks:
    /// 8..=128 code points, not blank, no control characters, not a
    /// well-known password.
    pub fn new(raw: String) -> Result<Self, PasswordPolicyError> {
        let password = Self::for_verification(raw);
        let normalized = password.0.as_str();

        if normalized.trim().is_empty() {
            return Err(PasswordPolicyError::EmptyOrWhitespace);
        }

        let char_count = normalized.chars().count();
        if char_count < MIN_PASSWORD_LENGTH {
            return Err(PasswordPolicyError::TooShort {
                min: MIN_PASSWORD_LENGTH,
                actual: char_count,
            });
        }
        if char_count > MAX_PASSWORD_LENGTH {
            return Err(PasswordPolicyError::TooLong {
                max: MAX_PASSWORD_LENGTH,
                actual: char_count,
            });
        }

        if normalized
            .chars()
            .any(|ch| ch.is_control() && ch != '\t' && ch != '\n')
        {
            return Err(PasswordPolicyError::InvalidCharacter);
        }

        let lowered = normalized.to_lowercase();
        if COMMON_PASSWORDS.contains(&lowered.as_str()) {
            return Err(PasswordPolicyError::Common);
        }

        Ok(password)
    }

    /// Wrap a submitted password for comparison only.
    ///
    /// No policy is applied: a login attempt with a short or otherwise
    /// invalid password must still reach verification and count as a
    /// failed attempt.
    pub fn for_verification(raw: String) -> Self {
        let mut raw = raw;
        let normalized: String = raw.nfkc().collect();
        raw.zeroize();
        Self(normalized)
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for ClearTextPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClearTextPassword")
            .field(&"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Hashed Password (Safe to store)
// ============================================================================

/// Argon2id hash in PHC string format (algorithm, version, params, salt, hash)
#[derive(Clone, PartialEq, Eq)]
pub struct HashedPassword {
    hash: String,
}

impl HashedPassword {
    /// Create from PHC string (e.g., from database)
    pub fn from_phc_string(s: impl Into<String>) -> Result<Self, PasswordHashError> {
        let hash = s.into();
        PasswordHash::new(&hash).map_err(|_| PasswordHashError::InvalidHashFormat)?;
        Ok(Self { hash })
    }

    pub fn as_phc_string(&self) -> &str {
        &self.hash
    }
}

impl fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HashedPassword").field(&"[PHC]").finish()
    }
}

// ============================================================================
// Hasher
// ============================================================================

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    /// OWASP recommendation: m=19456 (19 MiB), t=2, p=1
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl HashCost {
    /// Smallest cost Argon2 accepts. Tests and local tooling only.
    pub const fn minimal() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// One-way password hasher.
///
/// Holds a precomputed hash of a random password so that credential checks
/// for unknown accounts can spend the same work as real ones.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    pepper: Option<Zeroizing<Vec<u8>>>,
    dummy: HashedPassword,
}

impl PasswordHasher {
    pub fn new(cost: HashCost, pepper: Option<Vec<u8>>) -> Result<Self, PasswordHashError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| PasswordHashError::InvalidParams(e.to_string()))?;

        let mut hasher = Self {
            params,
            pepper: pepper.map(Zeroizing::new),
            dummy: HashedPassword {
                hash: String::new(),
            },
        };

        let filler = crate::crypto::random_token(24)
            .map_err(|e| PasswordHashError::HashingFailed(e.to_string()))?;
        hasher.dummy = hasher.hash(&ClearTextPassword::for_verification(filler))?;

        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    fn peppered(&self, password: &ClearTextPassword) -> Zeroizing<Vec<u8>> {
        let mut bytes = Zeroizing::new(password.as_bytes().to_vec());
        if let Some(pepper) = &self.pepper {
            bytes.extend_from_slice(pepper);
        }
        bytes
    }

    /// Hash with a fresh 128-bit salt.
    ///
    /// Any failure (including the salt's entropy source) is returned; there
    /// is no fallback.
    pub fn hash(&self, password: &ClearTextPassword) -> Result<HashedPassword, PasswordHashError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(&self.peppered(password), &salt)
            .map_err(|e| PasswordHashError::HashingFailed(e.to_string()))?;

        Ok(HashedPassword {
            hash: hash.to_string(),
        })
    }

    /// Verify a password. Never errors on mismatch: a malformed stored hash
    /// is reported as `false`.
    pub fn verify(&self, password: &ClearTextPassword, hashed: &HashedPassword) -> bool {
        let Ok(parsed) = PasswordHash::new(&hashed.hash) else {
            return false;
        };

        self.argon2()
            .verify_password(&self.peppered(password), &parsed)
            .is_ok()
    }

    /// Burn one verification worth of work against the internal dummy hash.
    /// Always returns `false`.
    pub fn verify_dummy(&self, password: &ClearTextPassword) -> bool {
        let _ = self.verify(password, &self.dummy);
        false
    }

    /// True if `hashed` was produced with different parameters than the
    /// current ones.
    pub fn needs_rehash(&self, hashed: &HashedPassword) -> bool {
        let Ok(parsed) = PasswordHash::new(&hashed.hash) else {
            return true;
        };

        match Params::try_from(&parsed) {
            Ok(params) => {
                params.m_cost() != self.params.m_cost()
                    || params.t_cost() != self.params.t_cost()
                    || params.p_cost() != self.params.p_cost()
            }
            Err(_) => true,
        }
    }
}

impl fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("m_cost", &self.params.m_cost())
            .field("t_cost", &self.params.t_cost())
            .field("p_cost", &self.params.p_cost())
            .field("pepper", &self.pepper.is_some())
            .finish()
    }
}
