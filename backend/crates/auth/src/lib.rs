//! Auth (Authentication & Authorization) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, access policy, ports
//! - `application/` - Use cases, token codec, sessions, OTP, lockout
//! - `infra/` - Postgres and in-memory stores, log-backed adapters
//! - `presentation/` - HTTP handlers, DTOs, validation, router
//!
//! ## Features
//! - Registration and email + password login
//! - HS256 bearer tokens, optionally bound to a server-side session
//! - Email/SMS one-time codes for 2FA, email verification and password reset
//! - Account lockout after repeated failures
//! - Role-based access (User, Moderator, Admin)
//!
//! ## Security Model
//! - Passwords hashed with Argon2id, optional pepper
//! - One-time codes stored as SHA-256 digests, consumed atomically
//! - Externally, every credential failure looks the same

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use application::config::{AuthConfig, Environment};
pub use application::service::{AuthService, SweepReport};
pub use application::sweeper::{SweeperHandle, spawn_sweeper};
pub use error::{AuthError, AuthResult};
pub use infra::postgres::PgAuthRepository;
pub use presentation::router::auth_router;

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};
