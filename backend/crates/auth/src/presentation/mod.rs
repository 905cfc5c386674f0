//! Presentation Layer
//!
//! HTTP handlers, DTOs, request validation, router, and middleware.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod validation;

pub use handlers::{AuthAppState, Client};
pub use middleware::{
    RateLimitState, ensure_owner_or_admin, rate_limit, require_auth, require_role,
};
pub use router::auth_router;
pub use validation::{Check, Validate};
