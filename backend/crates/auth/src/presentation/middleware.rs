//! Auth Middleware
//!
//! `require_auth` resolves the bearer token into a [`CurrentUser`] request
//! extension; `require_role` and `rate_limit` layer on top of it.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use kernel::id::UserId;
use platform::client::{TrustedProxies, extract_bearer_token, extract_client_ip};
use platform::rate_limit::{BucketRegistry, RateLimitStore};

use crate::application::check_session::CurrentUser;
use crate::domain::notifier::OtpSender;
use crate::domain::policy::require_owner_or_admin;
use crate::domain::repository::AuthStore;
use crate::domain::value_object::user_role::UserRole;
use crate::error::{AuthError, AuthResult};
use crate::presentation::handlers::AuthAppState;

/// Reject the request unless it carries a valid bearer token (and, when the
/// token is bound to a session, that session is still live).
pub async fn require_auth<R, N>(
    State(state): State<AuthAppState<R, N>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    let token = extract_bearer_token(req.headers()).ok_or(AuthError::MissingToken)?;
    let current = state.auth.authenticate(token).await?;

    req.extensions_mut().insert(current);
    Ok(next.run(req).await)
}

/// Gate on a minimum role. Must run inside `require_auth`.
///
/// ```ignore
/// router.layer(from_fn_with_state(UserRole::Admin, require_role))
/// ```
pub async fn require_role(
    State(required): State<UserRole>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let current = req
        .extensions()
        .get::<CurrentUser>()
        .ok_or(AuthError::MissingToken)?;

    if let Err(e) = crate::domain::policy::require_role(current.role, required) {
        tracing::warn!(
            user_id = %current.user_id,
            role = %current.role,
            required = %required,
            "Role check failed"
        );
        return Err(e);
    }

    Ok(next.run(req).await)
}

/// Owner-or-admin check for handlers serving a resource owned by `owner`
pub fn ensure_owner_or_admin(current: &CurrentUser, owner: &UserId) -> AuthResult<()> {
    require_owner_or_admin(current.role, &current.user_id, owner)
}

/// Buckets plus the proxies allowed to name the client
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<BucketRegistry>,
    pub proxies: TrustedProxies,
}

/// Per-IP token bucket in front of unauthenticated endpoints. Keyed on the
/// socket peer, or the forwarded client when the peer is a trusted proxy.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let direct_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());
    let key = extract_client_ip(req.headers(), direct_ip, &state.proxies)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match state.limiter.acquire(&key).await {
        Ok(result) if result.allowed => next.run(req).await,
        Ok(result) => {
            let retry_after_secs = result.retry_after.as_secs_f64().ceil().min(3600.0) as u64;
            AuthError::RateLimited {
                retry_after_secs: retry_after_secs.max(1),
            }
            .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Rate limiter unavailable");
            next.run(req).await
        }
    }
}
