//! Sign Up Use Case
//!
//! Registers a new identity and signs it in.

use std::sync::Arc;

use chrono::Utc;
use platform::client::ClientInfo;
use serde_json::json;

use crate::application::context::{AuthContext, AuthSuccess};
use crate::domain::audit::AuditAction;
use crate::domain::entity::{auth::Auth, user::User};
use crate::domain::notifier::OtpSender;
use crate::domain::policy::require_role;
use crate::domain::repository::AuthStore;
use crate::domain::value_object::{
    email::Email, user_name::UserName, user_password::NewPassword, user_role::UserRole,
};
use crate::error::{AuthError, AuthResult};

/// Longest first/last name accepted
const NAME_MAX_LENGTH: usize = 100;

/// Sign up input
#[derive(Debug, Clone)]
pub struct SignUpInput {
    pub email: String,
    pub user_name: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    /// Defaults to `User`. Anything higher needs an Admin actor.
    pub role: Option<UserRole>,
}

/// Sign up use case
pub struct SignUpUseCase<R, N> {
    ctx: Arc<AuthContext<R, N>>,
}

impl<R, N> SignUpUseCase<R, N>
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    pub fn new(ctx: Arc<AuthContext<R, N>>) -> Self {
        Self { ctx }
    }

    /// ## Arguments
    /// * `input` - Registration fields
    /// * `actor_role` - Role of the authenticated caller, if any
    /// * `client` - Request origin, recorded on the new session
    pub async fn execute(
        &self,
        input: SignUpInput,
        actor_role: Option<UserRole>,
        client: &ClientInfo,
    ) -> AuthResult<AuthSuccess> {
        let role = input.role.unwrap_or_default();
        if role != UserRole::User {
            // Elevated accounts are created by administrators only
            require_role(
                actor_role.ok_or(AuthError::InsufficientRole)?,
                UserRole::Admin,
            )?;
        }

        let email = Email::new(input.email)?;
        let user_name = UserName::new(&input.user_name)?;
        let first_name = clean_name(&input.first_name, "First name")?;
        let last_name = clean_name(&input.last_name, "Last name")?;
        let password = NewPassword::new(input.password)?;

        if self.ctx.repo.exists_by_email(&email).await? {
            return Err(AuthError::DuplicateEmail);
        }
        if self.ctx.repo.exists_by_user_name(&user_name).await? {
            return Err(AuthError::DuplicateUserName);
        }

        let password_hash = self.ctx.hash_password(password.into_clear_text()).await?;

        let now = Utc::now();
        let user = User::new(email, user_name, first_name, last_name, role, now);
        let auth = Auth::new(user.user_id, password_hash, now);

        // The store re-checks uniqueness; a concurrent winner surfaces here
        self.ctx.repo.create_user(&user, &auth).await?;

        tracing::info!(
            user_id = %user.user_id,
            email = %user.email.masked(),
            role = %user.user_role,
            "User registered"
        );
        self.ctx.audit(
            Some(user.user_id),
            AuditAction::Registered,
            json!({ "role": user.user_role.code() }),
        );

        self.ctx.establish(user, client).await
    }
}

fn clean_name(raw: &str, field: &str) -> AuthResult<String> {
    let name = raw.trim();
    if name.chars().count() > NAME_MAX_LENGTH {
        return Err(AuthError::Validation(format!(
            "{field} must be at most {NAME_MAX_LENGTH} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(AuthError::Validation(format!(
            "{field} contains invalid characters"
        )));
    }
    Ok(name.to_string())
}
