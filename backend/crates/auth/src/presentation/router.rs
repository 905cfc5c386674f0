//! Auth Router

use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use platform::client::TrustedProxies;
use platform::rate_limit::BucketRegistry;

use crate::application::service::AuthService;
use crate::domain::notifier::OtpSender;
use crate::domain::repository::AuthStore;
use crate::domain::value_object::user_role::UserRole;
use crate::presentation::handlers::{self, AuthAppState};
use crate::presentation::middleware::{RateLimitState, rate_limit, require_auth, require_role};

/// Build the auth router, to be nested under `/api/auth`.
///
/// ## Arguments
/// * `auth` - service facade shared by every handler
/// * `limiter` - per-IP buckets for the unauthenticated endpoints
/// * `proxies` - peers whose `X-Forwarded-For` names the client
pub fn auth_router<R, N>(
    auth: AuthService<R, N>,
    limiter: Arc<BucketRegistry>,
    proxies: TrustedProxies,
) -> Router
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    let state = AuthAppState {
        auth,
        proxies: proxies.clone(),
    };
    let limits = RateLimitState { limiter, proxies };

    let public = Router::new()
        .route("/register", post(handlers::register::<R, N>))
        .route("/login", post(handlers::login::<R, N>))
        .route("/2fa/verify", post(handlers::verify_two_factor::<R, N>))
        .route("/2fa/resend", post(handlers::resend_two_factor::<R, N>))
        .route("/password/forgot", post(handlers::forgot_password::<R, N>))
        .route("/password/reset", post(handlers::reset_password::<R, N>))
        .route_layer(from_fn_with_state(limits, rate_limit));

    let protected = Router::new()
        .route("/refresh", post(handlers::refresh::<R, N>))
        .route("/logout", post(handlers::logout::<R, N>))
        .route("/logout-all", post(handlers::logout_all::<R, N>))
        .route("/me", get(handlers::me::<R, N>))
        .route("/sessions", get(handlers::list_sessions::<R, N>))
        .route("/users/{id}/sessions", get(handlers::list_user_sessions::<R, N>))
        .route("/password/change", post(handlers::change_password::<R, N>))
        .route(
            "/email/verify/request",
            post(handlers::request_email_verification::<R, N>),
        )
        .route("/email/verify", post(handlers::verify_email::<R, N>))
        .route("/2fa/enable", post(handlers::enable_two_factor::<R, N>))
        .route("/2fa/disable", post(handlers::disable_two_factor::<R, N>))
        .route_layer(from_fn_with_state(state.clone(), require_auth::<R, N>));

    // Layers run outermost-last: authenticate, then check the role
    let admin = Router::new()
        .route("/admin/users/{id}/unlock", post(handlers::admin_unlock::<R, N>))
        .route(
            "/admin/users/{id}/logout-all",
            post(handlers::admin_logout_all::<R, N>),
        )
        .route_layer(from_fn_with_state(UserRole::Admin, require_role))
        .route_layer(from_fn_with_state(state.clone(), require_auth::<R, N>));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(admin)
        .with_state(state)
}
