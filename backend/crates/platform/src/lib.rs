//! Platform Crate - Technical Infrastructure
//!
//! Shared technical foundations with no auth domain knowledge:
//! - Cryptographic utilities (CSPRNG tokens, SHA-256, constant-time compare)
//! - Password hashing (Argon2id)
//! - Unbiased numeric one-time codes
//! - Token-bucket rate limiting
//! - Client metadata extraction from HTTP headers

pub mod client;
pub mod code;
pub mod crypto;
pub mod password;
pub mod rate_limit;
