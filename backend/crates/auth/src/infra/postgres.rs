//! PostgreSQL Repository Implementations
//!
//! Every state transition that must not race (failure counting, code
//! consumption, session deactivation) is a single conditional statement, so
//! concurrent requests serialize on the row instead of in application code.

use chrono::{DateTime, Utc};
use kernel::error::conversions::unique_violation_constraint;
use kernel::id::UserId;
use platform::password::HashedPassword;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::{
    auth::Auth, auth_session::AuthSession, one_time_code::OneTimeCode, user::User,
};
use crate::domain::repository::{
    AuthRepository, AuthSessionRepository, OneTimeCodeRepository, UserRepository,
};
use crate::domain::value_object::{
    email::Email, otp_purpose::OtpPurpose, two_factor_method::TwoFactorMethod,
    user_name::UserName, user_role::UserRole, user_status::UserStatus,
};
use crate::error::{AuthError, AuthResult};

const USERS_EMAIL_KEY: &str = "users_email_key";
const USERS_USER_NAME_KEY: &str = "users_user_name_canonical_key";

/// PostgreSQL-backed auth repository
#[derive(Clone)]
pub struct PgAuthRepository {
    pool: PgPool,
}

impl PgAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Turn a lost check-then-insert race into the matching duplicate error.
fn map_insert_error(err: sqlx::Error) -> AuthError {
    match unique_violation_constraint(&err).as_deref() {
        Some(USERS_EMAIL_KEY) => AuthError::DuplicateEmail,
        Some(USERS_USER_NAME_KEY) => AuthError::DuplicateUserName,
        _ => AuthError::Database(err),
    }
}

// ============================================================================
// User Repository Implementation
// ============================================================================

impl UserRepository for PgAuthRepository {
    async fn create_user(&self, user: &User, auth: &Auth) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (
                user_id,
                email,
                email_verified,
                user_name,
                user_name_canonical,
                first_name,
                last_name,
                phone_number,
                user_role,
                user_status,
                last_login_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(user.user_id.as_uuid())
        .bind(user.email.as_str())
        .bind(user.email_verified)
        .bind(user.user_name.as_str())
        .bind(user.user_name.canonical())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone_number)
        .bind(user.user_role.id())
        .bind(user.user_status.id())
        .bind(user.last_login_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        sqlx::query(
            r#"
            INSERT INTO auth_credentials (
                user_id,
                password_hash,
                two_factor_enabled,
                two_factor_method,
                login_failed_count,
                last_failed_at,
                locked_until,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(auth.user_id.as_uuid())
        .bind(auth.password_hash.as_phc_string())
        .bind(auth.two_factor_enabled)
        .bind(auth.two_factor_method.id())
        .bind(i32::try_from(auth.login_failed_count).unwrap_or(i32::MAX))
        .bind(auth.last_failed_at)
        .bind(auth.locked_until)
        .bind(auth.created_at)
        .bind(auth.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_user(&self, user_id: &UserId) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_user).transpose()
    }

    async fn find_user_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_user).transpose()
    }

    async fn exists_by_email(&self, email: &Email) -> AuthResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn exists_by_user_name(&self, user_name: &UserName) -> AuthResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE user_name_canonical = $1)",
        )
        .bind(user_name.canonical())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn update_user(&self, user: &User) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE users SET
                email_verified = $2,
                first_name = $3,
                last_name = $4,
                phone_number = $5,
                user_role = $6,
                user_status = $7,
                last_login_at = $8,
                updated_at = $9
            WHERE user_id = $1
            "#,
        )
        .bind(user.user_id.as_uuid())
        .bind(user.email_verified)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone_number)
        .bind(user.user_role.id())
        .bind(user.user_status.id())
        .bind(user.last_login_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// Auth Repository Implementation
// ============================================================================

impl AuthRepository for PgAuthRepository {
    async fn find_auth(&self, user_id: &UserId) -> AuthResult<Option<Auth>> {
        let row = sqlx::query_as::<_, AuthRow>(
            r#"
            SELECT
                user_id,
                password_hash,
                two_factor_enabled,
                two_factor_method,
                login_failed_count,
                last_failed_at,
                locked_until,
                created_at,
                updated_at
            FROM auth_credentials
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(AuthRow::into_auth).transpose()
    }

    async fn update_password(
        &self,
        user_id: &UserId,
        hash: &HashedPassword,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        sqlx::query(
            "UPDATE auth_credentials SET password_hash = $2, updated_at = $3 WHERE user_id = $1",
        )
        .bind(user_id.as_uuid())
        .bind(hash.as_phc_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_two_factor(
        &self,
        user_id: &UserId,
        enabled: bool,
        method: TwoFactorMethod,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE auth_credentials SET
                two_factor_enabled = $2,
                two_factor_method = $3,
                updated_at = $4
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(enabled)
        .bind(method.id())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn increment_failed_attempts(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AuthResult<u32> {
        let count = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE auth_credentials SET
                login_failed_count = login_failed_count + 1,
                last_failed_at = $2,
                updated_at = $2
            WHERE user_id = $1
            RETURNING login_failed_count
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

        Ok(u32::try_from(count).unwrap_or(0))
    }

    async fn lock_until(&self, user_id: &UserId, until: DateTime<Utc>) -> AuthResult<()> {
        sqlx::query("UPDATE auth_credentials SET locked_until = $2 WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .bind(until)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn reset_failed_attempts(&self, user_id: &UserId) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE auth_credentials SET
                login_failed_count = 0,
                last_failed_at = NULL
            WHERE user_id = $1 AND login_failed_count <> 0
            "#,
        )
        .bind(user_id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn unlock(&self, user_id: &UserId) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE auth_credentials SET
                login_failed_count = 0,
                last_failed_at = NULL,
                locked_until = NULL
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// Auth Session Repository Implementation
// ============================================================================

impl AuthSessionRepository for PgAuthRepository {
    async fn create_session(&self, session: &AuthSession) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO auth_sessions (
                session_id,
                user_id,
                client_ip,
                user_agent,
                is_active,
                created_at,
                last_seen_at,
                expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&session.session_id)
        .bind(session.user_id.as_uuid())
        .bind(&session.client_ip)
        .bind(&session.user_agent)
        .bind(session.is_active)
        .bind(session.created_at)
        .bind(session.last_seen_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_session(&self, session_id: &str) -> AuthResult<Option<AuthSession>> {
        let row = sqlx::query_as::<_, AuthSessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM auth_sessions WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(AuthSessionRow::into_session))
    }

    async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> AuthResult<()> {
        sqlx::query(
            "UPDATE auth_sessions SET last_seen_at = $2 WHERE session_id = $1 AND is_active",
        )
        .bind(session_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn extend_session(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let updated = sqlx::query(
            "UPDATE auth_sessions SET expires_at = $2 WHERE session_id = $1 AND is_active",
        )
        .bind(session_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn deactivate_session(&self, session_id: &str) -> AuthResult<bool> {
        let updated = sqlx::query(
            "UPDATE auth_sessions SET is_active = FALSE WHERE session_id = $1 AND is_active",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn deactivate_user_sessions(
        &self,
        user_id: &UserId,
        except: Option<&str>,
    ) -> AuthResult<u64> {
        let updated = sqlx::query(
            r#"
            UPDATE auth_sessions SET is_active = FALSE
            WHERE user_id = $1
              AND is_active
              AND ($2::TEXT IS NULL OR session_id <> $2)
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(except)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated)
    }

    async fn find_active_sessions(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<AuthSession>> {
        let rows = sqlx::query_as::<_, AuthSessionRow>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM auth_sessions
            WHERE user_id = $1 AND is_active AND expires_at > $2
            ORDER BY last_seen_at DESC
            "#
        ))
        .bind(user_id.as_uuid())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AuthSessionRow::into_session).collect())
    }

    async fn delete_stale_sessions(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let deleted =
            sqlx::query("DELETE FROM auth_sessions WHERE expires_at <= $1 OR NOT is_active")
                .bind(now)
                .execute(&self.pool)
                .await?
                .rows_affected();

        Ok(deleted)
    }
}

// ============================================================================
// One-Time Code Repository Implementation
// ============================================================================

impl OneTimeCodeRepository for PgAuthRepository {
    async fn replace_code(&self, code: &OneTimeCode) -> AuthResult<()> {
        // At most one unused code per (user, purpose): the partial unique
        // index makes a reissue overwrite the outstanding row in place.
        sqlx::query(
            r#"
            INSERT INTO one_time_codes (
                id,
                user_id,
                purpose,
                code_hash,
                challenge_hash,
                expires_at,
                used_at,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, NULL, $7)
            ON CONFLICT (user_id, purpose) WHERE used_at IS NULL
            DO UPDATE SET
                id = EXCLUDED.id,
                code_hash = EXCLUDED.code_hash,
                challenge_hash = EXCLUDED.challenge_hash,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(code.id.as_uuid())
        .bind(code.user_id.as_uuid())
        .bind(code.purpose.id())
        .bind(&code.code_hash)
        .bind(code.challenge_hash.as_deref())
        .bind(code.expires_at)
        .bind(code.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn consume_code(
        &self,
        user_id: &UserId,
        purpose: OtpPurpose,
        code_hash: &[u8],
        challenge_hash: Option<&[u8]>,
        now: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let consumed = sqlx::query(
            r#"
            UPDATE one_time_codes SET used_at = $4
            WHERE user_id = $1
              AND purpose = $2
              AND code_hash = $3
              AND ($5::BYTEA IS NULL OR challenge_hash = $5)
              AND used_at IS NULL
              AND expires_at > $4
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(purpose.id())
        .bind(code_hash)
        .bind(now)
        .bind(challenge_hash)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(consumed == 1)
    }

    async fn find_challenge(
        &self,
        challenge_hash: &[u8],
        now: DateTime<Utc>,
    ) -> AuthResult<Option<UserId>> {
        let owner: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT user_id FROM one_time_codes
            WHERE challenge_hash = $1
              AND purpose = $2
              AND used_at IS NULL
              AND expires_at > $3
            "#,
        )
        .bind(challenge_hash)
        .bind(OtpPurpose::TwoFactor.id())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(owner.map(UserId::from))
    }

    async fn delete_stale_codes(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let deleted = sqlx::query(
            "DELETE FROM one_time_codes WHERE expires_at <= $1 OR used_at IS NOT NULL",
        )
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(deleted)
    }
}

// ============================================================================
// Row Types for sqlx mapping
// ============================================================================

const USER_COLUMNS: &str = "user_id, email, email_verified, user_name, user_name_canonical, \
     first_name, last_name, phone_number, user_role, user_status, last_login_at, \
     created_at, updated_at";

const SESSION_COLUMNS: &str =
    "session_id, user_id, client_ip, user_agent, is_active, created_at, last_seen_at, expires_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: Uuid,
    email: String,
    email_verified: bool,
    user_name: String,
    user_name_canonical: String,
    first_name: String,
    last_name: String,
    phone_number: Option<String>,
    user_role: i16,
    user_status: i16,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> AuthResult<User> {
        let user_role = UserRole::from_id(self.user_role)
            .ok_or_else(|| AuthError::Internal(format!("Unknown user_role {}", self.user_role)))?;
        let user_status = UserStatus::from_id(self.user_status).ok_or_else(|| {
            AuthError::Internal(format!("Unknown user_status {}", self.user_status))
        })?;

        Ok(User {
            user_id: UserId::from(self.user_id),
            email: Email::from_db(self.email),
            email_verified: self.email_verified,
            user_name: UserName::from_db(self.user_name, self.user_name_canonical),
            first_name: self.first_name,
            last_name: self.last_name,
            phone_number: self.phone_number,
            user_role,
            user_status,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AuthRow {
    user_id: Uuid,
    password_hash: String,
    two_factor_enabled: bool,
    two_factor_method: i16,
    login_failed_count: i32,
    last_failed_at: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AuthRow {
    fn into_auth(self) -> AuthResult<Auth> {
        let two_factor_method = TwoFactorMethod::from_id(self.two_factor_method).ok_or_else(|| {
            AuthError::Internal(format!(
                "Unknown two_factor_method {}",
                self.two_factor_method
            ))
        })?;

        Ok(Auth {
            user_id: UserId::from(self.user_id),
            password_hash: HashedPassword::from_phc_string(self.password_hash)?,
            two_factor_enabled: self.two_factor_enabled,
            two_factor_method,
            login_failed_count: u32::try_from(self.login_failed_count).unwrap_or(0),
            last_failed_at: self.last_failed_at,
            locked_until: self.locked_until,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AuthSessionRow {
    session_id: String,
    user_id: Uuid,
    client_ip: Option<String>,
    user_agent: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl AuthSessionRow {
    fn into_session(self) -> AuthSession {
        AuthSession {
            session_id: self.session_id,
            user_id: UserId::from(self.user_id),
            client_ip: self.client_ip,
            user_agent: self.user_agent,
            is_active: self.is_active,
            created_at: self.created_at,
            last_seen_at: self.last_seen_at,
            expires_at: self.expires_at,
        }
    }
}
