//! Auth Error Types
//!
//! `AuthError` keeps the full internal taxonomy for logging and tests.
//! At the HTTP boundary every variant collapses to a small set of generic
//! messages (see [`AuthError::to_app_error`]) so a response never reveals
//! which check failed.

use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

/// Auth-specific result type alias
pub type AuthResult<T> = Result<T, AuthError>;

const MSG_INVALID_CREDENTIALS: &str = "Invalid email or password";
const MSG_AUTH_REQUIRED: &str = "Authentication required";
const MSG_INVALID_CODE: &str = "Invalid or expired code";
const MSG_FORBIDDEN: &str = "Insufficient privileges";
const MSG_INTERNAL: &str = "Internal server error";

/// Auth-specific error variants
#[derive(Debug, Error)]
pub enum AuthError {
    // ------------------------------------------------------------------
    // Credential checks (all render as "invalid credentials")
    // ------------------------------------------------------------------
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is temporarily locked")]
    AccountLocked,

    #[error("Account is disabled")]
    AccountDisabled,

    // ------------------------------------------------------------------
    // Bearer token / session (all render as "authentication required")
    // ------------------------------------------------------------------
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token is malformed")]
    TokenMalformed,

    #[error("Token signature or algorithm is invalid")]
    TokenSignatureInvalid,

    #[error("Token is not valid yet")]
    TokenNotYetValid,

    #[error("Session not found, expired or revoked")]
    SessionInvalid,

    // ------------------------------------------------------------------
    // One-time codes / two-factor
    // ------------------------------------------------------------------
    #[error("One-time code is invalid, used or expired")]
    OtpInvalidOrExpired,

    #[error("Two-factor authentication is not enabled")]
    TwoFactorNotEnabled,

    #[error("Two-factor method unavailable: {0}")]
    TwoFactorUnavailable(String),

    // ------------------------------------------------------------------
    // Authorization
    // ------------------------------------------------------------------
    #[error("Role is insufficient for this action")]
    InsufficientRole,

    #[error("Caller does not own this resource")]
    NotResourceOwner,

    // ------------------------------------------------------------------
    // Registration / input
    // ------------------------------------------------------------------
    #[error("Email is already registered")]
    DuplicateEmail,

    #[error("Username is already taken")]
    DuplicateUserName,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    // ------------------------------------------------------------------
    // Infrastructure
    // ------------------------------------------------------------------
    #[error("Code delivery failed: {0}")]
    Delivery(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidCredentials
            | AuthError::AccountLocked
            | AuthError::AccountDisabled
            | AuthError::MissingToken
            | AuthError::TokenExpired
            | AuthError::TokenMalformed
            | AuthError::TokenSignatureInvalid
            | AuthError::TokenNotYetValid
            | AuthError::SessionInvalid
            | AuthError::OtpInvalidOrExpired => ErrorKind::Unauthorized,
            AuthError::InsufficientRole | AuthError::NotResourceOwner => ErrorKind::Forbidden,
            AuthError::DuplicateEmail | AuthError::DuplicateUserName => ErrorKind::Conflict,
            AuthError::Validation(_) => ErrorKind::BadRequest,
            AuthError::TwoFactorNotEnabled | AuthError::TwoFactorUnavailable(_) => {
                ErrorKind::UnprocessableEntity
            }
            AuthError::RateLimited { .. } => ErrorKind::TooManyRequests,
            AuthError::Delivery(_) => ErrorKind::ServiceUnavailable,
            AuthError::Configuration(_) | AuthError::Database(_) | AuthError::Internal(_) => {
                ErrorKind::InternalServerError
            }
        }
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Client-facing error. Internal details never leave this function.
    pub fn to_app_error(&self) -> AppError {
        match self {
            AuthError::InvalidCredentials | AuthError::AccountLocked | AuthError::AccountDisabled => {
                AppError::unauthorized(MSG_INVALID_CREDENTIALS)
            }
            AuthError::MissingToken
            | AuthError::TokenExpired
            | AuthError::TokenMalformed
            | AuthError::TokenSignatureInvalid
            | AuthError::TokenNotYetValid
            | AuthError::SessionInvalid => AppError::unauthorized(MSG_AUTH_REQUIRED),
            AuthError::OtpInvalidOrExpired => AppError::unauthorized(MSG_INVALID_CODE),
            AuthError::InsufficientRole | AuthError::NotResourceOwner => {
                AppError::forbidden(MSG_FORBIDDEN)
            }
            AuthError::DuplicateEmail => AppError::conflict("Email is already registered"),
            AuthError::DuplicateUserName => AppError::conflict("Username is already taken"),
            AuthError::Validation(msg) => AppError::bad_request(msg.clone()),
            AuthError::TwoFactorNotEnabled => {
                AppError::unprocessable("Two-factor authentication is not enabled")
            }
            AuthError::TwoFactorUnavailable(msg) => AppError::unprocessable(msg.clone()),
            AuthError::RateLimited { retry_after_secs } => {
                AppError::too_many_requests("Too many requests").with_retry_after(*retry_after_secs)
            }
            AuthError::Delivery(_) => AppError::service_unavailable("Could not deliver code")
                .with_action("Try again later"),
            AuthError::Configuration(_) | AuthError::Database(_) | AuthError::Internal(_) => {
                AppError::internal(MSG_INTERNAL)
            }
        }
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Auth database error");
            }
            AuthError::Internal(msg) | AuthError::Configuration(msg) => {
                tracing::error!(message = %msg, "Auth internal error");
            }
            AuthError::Delivery(msg) => {
                tracing::error!(message = %msg, "OTP delivery failed");
            }
            AuthError::AccountLocked => {
                tracing::warn!("Rejected request for locked account");
            }
            AuthError::TokenSignatureInvalid => {
                tracing::warn!("Rejected token with invalid signature or algorithm");
            }
            AuthError::InsufficientRole | AuthError::NotResourceOwner => {
                tracing::warn!(error = %self, "Authorization denied");
            }
            AuthError::RateLimited { retry_after_secs } => {
                tracing::warn!(retry_after_secs, "Rate limit exceeded");
            }
            _ => {
                tracing::debug!(error = %self, "Auth error");
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}

impl From<platform::password::PasswordPolicyError> for AuthError {
    fn from(err: platform::password::PasswordPolicyError) -> Self {
        AuthError::Validation(err.to_string())
    }
}

impl From<platform::password::PasswordHashError> for AuthError {
    fn from(err: platform::password::PasswordHashError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<platform::code::CodeError> for AuthError {
    fn from(err: platform::code::CodeError) -> Self {
        AuthError::Internal(err.to_string())
    }
}
