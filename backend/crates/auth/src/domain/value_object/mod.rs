//! Value Object Module

pub mod email;
pub mod otp_purpose;
pub mod two_factor_method;
pub mod user_name;
pub mod user_password;
pub mod user_role;
pub mod user_status;

pub use email::Email;
pub use otp_purpose::OtpPurpose;
pub use two_factor_method::TwoFactorMethod;
pub use user_name::UserName;
pub use user_password::{NewPassword, SubmittedPassword};
pub use user_role::UserRole;
pub use user_status::UserStatus;
