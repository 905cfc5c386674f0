//! API DTOs (Data Transfer Objects)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::context::AuthSuccess;
use crate::application::sign_in::TwoFactorChallenge;
use crate::application::token::IssuedToken;
use crate::domain::entity::{auth_session::SessionInfo, user::User};
use crate::domain::value_object::{two_factor_method::TwoFactorMethod, user_role::UserRole};

// ============================================================================
// Register / Login
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub user_name: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    /// Requires an Admin bearer token when above `user`
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Issued bearer token
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
}

impl From<IssuedToken> for TokenResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            access_token: issued.token,
            token_type: "Bearer",
            expires_at: issued.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserResponse,
    #[serde(flatten)]
    pub token: TokenResponse,
}

impl From<AuthSuccess> for AuthResponse {
    fn from(success: AuthSuccess) -> Self {
        Self {
            user: UserResponse::from(&success.user),
            token: TokenResponse::from(success.token),
        }
    }
}

/// Login answer: either a token, or a pending second factor
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginResponse {
    Authenticated(AuthResponse),
    TwoFactorRequired(TwoFactorChallengeResponse),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorChallengeResponse {
    /// Opaque handle for `/2fa/verify` and `/2fa/resend`
    pub challenge_id: String,
    pub method: TwoFactorMethod,
    pub expires_at: DateTime<Utc>,
}

impl From<TwoFactorChallenge> for TwoFactorChallengeResponse {
    fn from(challenge: TwoFactorChallenge) -> Self {
        Self {
            challenge_id: challenge.challenge_id,
            method: challenge.method,
            expires_at: challenge.expires_at,
        }
    }
}

// ============================================================================
// Two-factor
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorVerifyRequest {
    pub challenge_id: String,
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorResendRequest {
    pub challenge_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorEnableRequest {
    pub method: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorDisableRequest {
    pub password: String,
}

/// When a freshly dispatched code stops being accepted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSentResponse {
    pub expires_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Password / email
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailRequest {
    pub code: String,
}

// ============================================================================
// Identity / sessions
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub user_id: String,
    pub email: String,
    pub email_verified: bool,
    pub user_name: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id.to_string(),
            email: user.email.as_str().to_string(),
            email_verified: user.email_verified,
            user_name: user.user_name.as_str().to_string(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.user_role,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    /// Short prefix of the session id; the full id is never returned
    pub handle: String,
    pub user_agent: Option<String>,
    pub client_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub current: bool,
}

impl From<SessionInfo> for SessionResponse {
    fn from(info: SessionInfo) -> Self {
        Self {
            handle: info.handle,
            user_agent: info.user_agent,
            client_ip: info.client_ip,
            created_at: info.created_at,
            last_seen_at: info.last_seen_at,
            expires_at: info.expires_at,
            current: info.is_current,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokedResponse {
    pub sessions_revoked: u64,
}
