//! Domain Layer
//!
//! Entities, value objects, access policy and the ports the application
//! layer depends on (repositories, code delivery, audit).

pub mod audit;
pub mod entity;
pub mod notifier;
pub mod policy;
pub mod repository;
pub mod value_object;

// Re-exports
pub use audit::{AuditAction, AuditEvent, AuditSink};
pub use entity::{Auth, AuthSession, OneTimeCode, SessionInfo, User};
pub use notifier::{OtpDestination, OtpSender};
pub use repository::{
    AuthRepository, AuthSessionRepository, AuthStore, OneTimeCodeRepository, UserRepository,
};
