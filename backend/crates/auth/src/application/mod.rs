//! Application Layer
//!
//! Use cases, the services they share, and the facade that exposes them.

pub mod check_session;
pub mod config;
pub mod context;
pub mod email_verification;
pub mod lockout;
pub mod otp;
pub mod password;
pub mod refresh;
pub mod service;
pub mod session;
pub mod sign_in;
pub mod sign_out;
pub mod sign_up;
pub mod sweeper;
pub mod token;
pub mod two_factor;

// Re-exports
pub use check_session::{CheckSessionUseCase, CurrentUser};
pub use config::{AuthConfig, Environment};
pub use context::{AuthContext, AuthSuccess};
pub use email_verification::EmailVerificationUseCase;
pub use lockout::{FailureOutcome, LockoutGuard};
pub use otp::{IssuedCode, OtpService, PendingChallenge};
pub use password::PasswordUseCase;
pub use refresh::RefreshUseCase;
pub use service::{AuthService, SweepReport};
pub use session::SessionStore;
pub use sign_in::{SignInInput, SignInOutcome, SignInUseCase, TwoFactorChallenge};
pub use sign_out::SignOutUseCase;
pub use sign_up::{SignUpInput, SignUpUseCase};
pub use sweeper::{SweeperHandle, spawn_sweeper};
pub use token::{Claims, IssuedToken, TokenCodec};
pub use two_factor::TwoFactorUseCase;
