//! User Entity
//!
//! Profile and authorization data for an identity. Credentials and lockout
//! state live in [`super::auth::Auth`].

use chrono::{DateTime, Utc};
use kernel::id::UserId;

use crate::domain::value_object::{
    email::Email, user_name::UserName, user_role::UserRole, user_status::UserStatus,
};

#[derive(Debug, Clone)]
pub struct User {
    pub user_id: UserId,
    /// Lowercased, unique
    pub email: Email,
    pub email_verified: bool,
    /// Unique on its canonical (lowercase) form
    pub user_name: UserName,
    pub first_name: String,
    pub last_name: String,
    /// Required before SMS two-factor can be enabled
    pub phone_number: Option<String>,
    pub user_role: UserRole,
    pub user_status: UserStatus,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        email: Email,
        user_name: UserName,
        first_name: String,
        last_name: String,
        user_role: UserRole,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: UserId::new(),
            email,
            email_verified: false,
            user_name,
            first_name,
            last_name,
            phone_number: None,
            user_role,
            user_status: UserStatus::default(),
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_login(&self) -> bool {
        self.user_status.can_login()
    }

    pub fn record_login(&mut self, now: DateTime<Utc>) {
        self.last_login_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_email_verified(&mut self, now: DateTime<Utc>) {
        self.email_verified = true;
        self.updated_at = now;
    }

    pub fn set_phone_number(&mut self, phone: Option<String>, now: DateTime<Utc>) {
        self.phone_number = phone;
        self.updated_at = now;
    }
}
