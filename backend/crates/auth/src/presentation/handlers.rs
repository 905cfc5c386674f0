//! HTTP Handlers
//!
//! Thin adapters: extract, validate, call [`AuthService`], map to DTOs.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, Extension, FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use kernel::id::UserId;
use platform::client::{ClientInfo, TrustedProxies, extract_bearer_token, extract_client_info};

use crate::application::check_session::CurrentUser;
use crate::application::service::AuthService;
use crate::application::sign_in::{SignInInput, SignInOutcome};
use crate::application::sign_up::SignUpInput;
use crate::domain::notifier::OtpSender;
use crate::domain::repository::AuthStore;
use crate::domain::value_object::{two_factor_method::TwoFactorMethod, user_role::UserRole};
use crate::error::{AuthError, AuthResult};
use crate::presentation::dto::{
    AuthResponse, ChangePasswordRequest, CodeSentResponse, ForgotPasswordRequest,
    LoginRequest, LoginResponse, RegisterRequest, ResetPasswordRequest, RevokedResponse,
    SessionResponse, TokenResponse, TwoFactorDisableRequest, TwoFactorEnableRequest,
    TwoFactorResendRequest, TwoFactorVerifyRequest, UserResponse, VerifyEmailRequest,
};
use crate::presentation::middleware::ensure_owner_or_admin;
use crate::presentation::validation::Validate;

/// Shared state for auth handlers
pub struct AuthAppState<R, N> {
    pub auth: AuthService<R, N>,
    pub proxies: TrustedProxies,
}

impl<R, N> Clone for AuthAppState<R, N> {
    fn clone(&self) -> Self {
        Self {
            auth: self.auth.clone(),
            proxies: self.proxies.clone(),
        }
    }
}

/// Caller IP and user agent. Works with or without `ConnectInfo`.
pub struct Client(pub ClientInfo);

impl<R, N> FromRequestParts<AuthAppState<R, N>> for Client
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AuthAppState<R, N>,
    ) -> Result<Self, Self::Rejection> {
        let direct_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip());
        Ok(Client(extract_client_info(
            &parts.headers,
            direct_ip,
            &state.proxies,
        )))
    }
}

fn parse_user_id(raw: &str, on_error: AuthError) -> AuthResult<UserId> {
    UserId::parse_str(raw.trim()).map_err(|_| on_error)
}

fn parse_method(raw: &str) -> AuthResult<TwoFactorMethod> {
    match raw.to_ascii_lowercase().as_str() {
        "email" => Ok(TwoFactorMethod::Email),
        "sms" => Ok(TwoFactorMethod::Sms),
        other => Err(AuthError::Validation(format!("Unknown 2FA method: {other}"))),
    }
}

// ============================================================================
// Register / Login
// ============================================================================

/// POST /api/auth/register
pub async fn register<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Client(client): Client,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> AuthResult<impl IntoResponse>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    req.validate()?;

    // Anonymous registration is allowed; a bearer, if sent, must be valid
    let actor_role = match extract_bearer_token(&headers) {
        Some(token) => Some(state.auth.authenticate(token).await?.role),
        None => None,
    };

    let role = req
        .role
        .as_deref()
        .map(|r| {
            r.parse::<UserRole>()
                .map_err(|_| AuthError::Validation(format!("Unknown role: {r}")))
        })
        .transpose()?;

    let input = SignUpInput {
        email: req.email,
        user_name: req.user_name,
        password: req.password,
        first_name: req.first_name,
        last_name: req.last_name,
        role,
    };

    let success = state.auth.register(input, actor_role, &client).await?;
    Ok((StatusCode::CREATED, Json(AuthResponse::from(success))))
}

/// POST /api/auth/login
pub async fn login<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Client(client): Client,
    Json(req): Json<LoginRequest>,
) -> AuthResult<Json<LoginResponse>>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    req.validate()?;

    let input = SignInInput {
        email: req.email,
        password: req.password,
    };

    let response = match state.auth.login(input, &client).await? {
        SignInOutcome::Authenticated(success) => {
            LoginResponse::Authenticated(AuthResponse::from(success))
        }
        SignInOutcome::TwoFactorPending(challenge) => {
            LoginResponse::TwoFactorRequired(challenge.into())
        }
    };

    Ok(Json(response))
}

// ============================================================================
// Two-factor
// ============================================================================

/// POST /api/auth/2fa/verify
pub async fn verify_two_factor<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Client(client): Client,
    Json(req): Json<TwoFactorVerifyRequest>,
) -> AuthResult<Json<AuthResponse>>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    req.validate()?;

    let success = state
        .auth
        .verify_two_factor(req.challenge_id.trim(), &req.code, &client)
        .await?;
    Ok(Json(AuthResponse::from(success)))
}

/// POST /api/auth/2fa/resend
pub async fn resend_two_factor<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Json(req): Json<TwoFactorResendRequest>,
) -> AuthResult<Json<CodeSentResponse>>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    req.validate()?;

    let expires_at = state
        .auth
        .resend_two_factor(req.challenge_id.trim())
        .await?;
    Ok(Json(CodeSentResponse {
        expires_at: Some(expires_at),
    }))
}

/// POST /api/auth/2fa/enable
pub async fn enable_two_factor<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<TwoFactorEnableRequest>,
) -> AuthResult<StatusCode>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    req.validate()?;
    let method = parse_method(&req.method)?;

    state
        .auth
        .enable_two_factor(&current.user_id, method, req.phone_number)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/auth/2fa/disable
pub async fn disable_two_factor<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<TwoFactorDisableRequest>,
) -> AuthResult<StatusCode>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    req.validate()?;
    state
        .auth
        .disable_two_factor(&current.user_id, req.password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Tokens and sessions (requires authentication)
// ============================================================================

/// POST /api/auth/refresh
pub async fn refresh<R, N>(
    State(state): State<AuthAppState<R, N>>,
    headers: HeaderMap,
) -> AuthResult<Json<TokenResponse>>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    let token = extract_bearer_token(&headers).ok_or(AuthError::MissingToken)?;
    let issued = state.auth.refresh_token(token).await?;
    Ok(Json(TokenResponse::from(issued)))
}

/// POST /api/auth/logout
pub async fn logout<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Extension(current): Extension<CurrentUser>,
) -> AuthResult<StatusCode>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    // Tokens issued without a session have nothing to deactivate
    if let Some(session_id) = current.session_id.as_deref() {
        state.auth.logout(session_id, Some(current.user_id)).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/auth/logout-all
pub async fn logout_all<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Extension(current): Extension<CurrentUser>,
) -> AuthResult<Json<RevokedResponse>>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    let sessions_revoked = state
        .auth
        .logout_all(&current.user_id, current.session_id.as_deref())
        .await?;
    Ok(Json(RevokedResponse { sessions_revoked }))
}

/// GET /api/auth/me
pub async fn me<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Extension(current): Extension<CurrentUser>,
) -> AuthResult<Json<UserResponse>>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    let user = state.auth.me(&current).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// GET /api/auth/sessions
pub async fn list_sessions<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Extension(current): Extension<CurrentUser>,
) -> AuthResult<Json<Vec<SessionResponse>>>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    let sessions = state
        .auth
        .list_sessions(&current.user_id, current.session_id.as_deref())
        .await?;
    Ok(Json(sessions.into_iter().map(SessionResponse::from).collect()))
}

/// GET /api/auth/users/{id}/sessions
pub async fn list_user_sessions<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Extension(current): Extension<CurrentUser>,
    Path(owner): Path<String>,
) -> AuthResult<Json<Vec<SessionResponse>>>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    // Unknown and unparseable ids look the same as someone else's
    let owner = parse_user_id(&owner, AuthError::NotResourceOwner)?;
    ensure_owner_or_admin(&current, &owner)?;

    let sessions = state.auth.list_sessions_of(&current, &owner).await?;
    Ok(Json(sessions.into_iter().map(SessionResponse::from).collect()))
}

// ============================================================================
// Password / email
// ============================================================================

/// POST /api/auth/password/change
pub async fn change_password<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> AuthResult<StatusCode>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    req.validate()?;
    state
        .auth
        .change_password(&current, req.current_password, req.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/auth/password/forgot
pub async fn forgot_password<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> AuthResult<StatusCode>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    req.validate()?;
    state.auth.request_password_reset(req.email).await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/auth/password/reset
pub async fn reset_password<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Json(req): Json<ResetPasswordRequest>,
) -> AuthResult<StatusCode>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    req.validate()?;
    state
        .auth
        .reset_password(req.email, &req.code, req.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/auth/email/verify/request
pub async fn request_email_verification<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Extension(current): Extension<CurrentUser>,
) -> AuthResult<Json<CodeSentResponse>>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    let expires_at = state
        .auth
        .request_email_verification(&current.user_id)
        .await?;
    Ok(Json(CodeSentResponse { expires_at }))
}

/// POST /api/auth/email/verify
pub async fn verify_email<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<VerifyEmailRequest>,
) -> AuthResult<StatusCode>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    req.validate()?;
    state.auth.verify_email(&current.user_id, &req.code).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Administration (requires Admin)
// ============================================================================

/// POST /api/auth/admin/users/{id}/unlock
pub async fn admin_unlock<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<String>,
) -> AuthResult<StatusCode>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    let user_id = parse_user_id(&user_id, AuthError::Validation("Invalid user id".into()))?;
    state.auth.admin_unlock(&current, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/auth/admin/users/{id}/logout-all
pub async fn admin_logout_all<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<String>,
) -> AuthResult<Json<RevokedResponse>>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    let user_id = parse_user_id(&user_id, AuthError::Validation("Invalid user id".into()))?;
    let sessions_revoked = state.auth.admin_logout_all(&current, &user_id).await?;
    Ok(Json(RevokedResponse { sessions_revoked }))
}
