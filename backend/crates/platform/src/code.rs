//! Numeric one-time code generation
//!
//! Codes are drawn digit by digit from the OS CSPRNG. A random byte is only
//! accepted when it falls below the largest multiple of 10 that fits in a
//! byte (250); anything above is discarded and redrawn, so every digit is
//! exactly uniform over `0..=9`.

use rand::{RngCore, rngs::OsRng};
use thiserror::Error;

/// Shortest code we will issue
pub const MIN_CODE_LENGTH: usize = 4;
/// Longest code we will issue
pub const MAX_CODE_LENGTH: usize = 10;

/// Bytes at or above this bound are rejected (250 = 25 * 10)
const REJECTION_BOUND: u8 = 250;

#[derive(Debug, Error)]
pub enum CodeError {
    #[error("Code length must be between {MIN_CODE_LENGTH} and {MAX_CODE_LENGTH} (got {0})")]
    InvalidLength(usize),

    #[error("Entropy source failed: {0}")]
    Entropy(#[from] rand::Error),
}

/// Generate a uniformly random decimal code of exactly `length` digits.
///
/// Leading zeros are kept (`"004217"` is a valid 6 digit code).
///
/// ## Returns
/// * `Ok(String)` - `length` ASCII digits
/// * `Err(CodeError)` - invalid length, or the entropy source failed
pub fn generate_numeric_code(length: usize) -> Result<String, CodeError> {
    if !(MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&length) {
        return Err(CodeError::InvalidLength(length));
    }

    let mut code = String::with_capacity(length);
    // Expected rejection rate is 6/256, so one extra batch almost always suffices.
    let mut buf = [0u8; 16];

    while code.len() < length {
        OsRng.try_fill_bytes(&mut buf)?;
        for &byte in &buf {
            if byte >= REJECTION_BOUND {
                continue;
            }
            code.push(char::from(b'0' + byte % 10));
            if code.len() == length {
                break;
            }
        }
    }

    Ok(code)
}

/// True when `code` has exactly `length` ASCII digits.
pub fn is_well_formed(code: &str, length: usize) -> bool {
    code.len() == length && code.bytes().all(|b| b.is_ascii_digit())
}
