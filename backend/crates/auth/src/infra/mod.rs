//! Infrastructure Layer
//!
//! Repository implementations (Postgres, in-memory) and the log-backed
//! delivery and audit adapters.

pub mod memory;
pub mod notifier;
pub mod postgres;

pub use memory::{InMemoryAuthStore, MemoryAuditSink, OtpOutbox};
pub use notifier::{LogOtpSender, TracingAuditSink};
pub use postgres::PgAuthRepository;
