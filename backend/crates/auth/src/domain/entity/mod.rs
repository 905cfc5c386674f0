//! Entity Module

pub mod auth;
pub mod auth_session;
pub mod one_time_code;
pub mod user;

pub use auth::Auth;
pub use auth_session::{AuthSession, SessionInfo};
pub use one_time_code::OneTimeCode;
pub use user::User;
