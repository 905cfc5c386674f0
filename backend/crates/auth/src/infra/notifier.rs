//! Log-backed delivery and audit
//!
//! Stand-ins for a real mail/SMS gateway and audit store. The code itself is
//! only emitted at debug level so it never reaches production logs at the
//! default filter.

use crate::domain::audit::{AuditEvent, AuditSink};
use crate::domain::notifier::{OtpDestination, OtpSender};
use crate::domain::value_object::otp_purpose::OtpPurpose;
use crate::error::AuthResult;

#[derive(Debug, Clone, Default)]
pub struct LogOtpSender;

impl OtpSender for LogOtpSender {
    async fn send_otp(
        &self,
        destination: &OtpDestination,
        purpose: OtpPurpose,
        code: &str,
    ) -> AuthResult<()> {
        tracing::info!(destination = %destination, purpose = %purpose, "One-time code dispatched");
        tracing::debug!(destination = %destination, purpose = %purpose, code, "One-time code");
        Ok(())
    }
}

/// Writes audit events as structured records under the `audit` target
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let actor = event.actor.map(|id| id.to_string());
        tracing::info!(
            target: "audit",
            action = %event.action,
            actor = actor.as_deref().unwrap_or("-"),
            at = %event.at.to_rfc3339(),
            metadata = %event.metadata,
            "audit"
        );
    }
}
