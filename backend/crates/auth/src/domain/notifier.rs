//! Outbound code delivery (email / SMS)

use std::fmt;

use crate::domain::value_object::otp_purpose::OtpPurpose;
use crate::error::AuthResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpDestination {
    Email(String),
    Phone(String),
}

impl fmt::Display for OtpDestination {
    /// Masked: only the last few characters are shown
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, value) = match self {
            OtpDestination::Email(v) => ("email", v),
            OtpDestination::Phone(v) => ("phone", v),
        };
        let tail: String = value
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        write!(f, "{kind}:***{tail}")
    }
}

/// Delivery channel for one-time codes
#[trait_variant::make(OtpSender: Send)]
pub trait LocalOtpSender {
    /// Deliver `code` out of band. A failure aborts the calling flow.
    async fn send_otp(
        &self,
        destination: &OtpDestination,
        purpose: OtpPurpose,
        code: &str,
    ) -> AuthResult<()>;
}
