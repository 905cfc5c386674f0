//! Application Configuration
//!
//! Configuration for the Auth application layer. Loaded once at startup and
//! shared read-only (`Arc<AuthConfig>`) by every request.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use platform::code::{MAX_CODE_LENGTH, MIN_CODE_LENGTH};
use platform::password::HashCost;

use crate::error::{AuthError, AuthResult};

/// Placeholder secret shipped in sample env files. Refused in production.
pub const DEFAULT_JWT_SECRET: &str = "your-super-secret-jwt-key";

/// Minimum signing secret length in bytes (HS256 key size)
pub const MIN_SECRET_LENGTH: usize = 32;

pub const DEFAULT_ISSUER: &str = "auth-service";

// ============================================================================
// Environment
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" | "local" | "test" => Ok(Environment::Development),
            other => Err(AuthError::Configuration(format!(
                "Unknown environment '{other}'"
            ))),
        }
    }
}

// ============================================================================
// AuthConfig
// ============================================================================

/// Auth application configuration
#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 signing secret
    pub jwt_secret: String,
    /// `iss` claim written and required on verification
    pub jwt_issuer: String,
    /// Bearer token lifetime
    pub token_ttl: Duration,
    /// Tolerance applied to `nbf` only; expiry is strict
    pub clock_skew_leeway: Duration,
    pub otp_ttl: Duration,
    /// Digits per one-time code
    pub otp_length: usize,
    /// Consecutive failures that trigger a lock
    pub lockout_threshold: u32,
    pub lockout_duration: Duration,
    pub session_ttl: Duration,
    /// Create a server-side session per login and check it on every request
    pub track_sessions: bool,
    /// Password pepper (optional, application-wide secret)
    pub password_pepper: Option<Vec<u8>>,
    pub hash_cost: HashCost,
    pub environment: Environment,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            jwt_issuer: DEFAULT_ISSUER.to_string(),
            token_ttl: Duration::from_secs(24 * 3600),
            clock_skew_leeway: Duration::from_secs(30),
            otp_ttl: Duration::from_secs(10 * 60),
            otp_length: 6,
            lockout_threshold: 5,
            lockout_duration: Duration::from_secs(15 * 60),
            session_ttl: Duration::from_secs(24 * 3600),
            track_sessions: true,
            password_pepper: None,
            hash_cost: HashCost::default(),
            environment: Environment::Development,
        }
    }
}

impl AuthConfig {
    /// Default config with a freshly generated signing secret (development)
    pub fn with_random_secret() -> AuthResult<Self> {
        let secret = platform::crypto::random_token(48)
            .map_err(|e| AuthError::Configuration(format!("Secret generation failed: {e}")))?;
        Ok(Self {
            jwt_secret: secret,
            ..Default::default()
        })
    }

    /// Get password pepper as slice
    pub fn pepper(&self) -> Option<&[u8]> {
        self.password_pepper.as_deref()
    }

    /// Check the config before the server starts.
    ///
    /// Structural problems (zero durations, unusable code length) are always
    /// errors. Weak secrets are errors in production and warnings otherwise.
    pub fn validate(&self) -> AuthResult<()> {
        let mut problems = Vec::new();

        if self.token_ttl.is_zero() {
            problems.push("token TTL must be positive".to_string());
        }
        if self.otp_ttl.is_zero() {
            problems.push("OTP TTL must be positive".to_string());
        }
        if self.session_ttl.is_zero() {
            problems.push("session TTL must be positive".to_string());
        }
        if self.lockout_threshold == 0 {
            problems.push("lockout threshold must be at least 1".to_string());
        }
        if self.lockout_duration.is_zero() {
            problems.push("lockout duration must be positive".to_string());
        }
        if !(MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&self.otp_length) {
            problems.push(format!(
                "OTP length must be between {MIN_CODE_LENGTH} and {MAX_CODE_LENGTH}"
            ));
        }
        if self.jwt_issuer.trim().is_empty() {
            problems.push("issuer must not be empty".to_string());
        }

        let mut weak = Vec::new();
        if self.jwt_secret == DEFAULT_JWT_SECRET {
            weak.push("signing secret is the built-in default".to_string());
        }
        if self.jwt_secret.len() < MIN_SECRET_LENGTH {
            weak.push(format!(
                "signing secret must be at least {MIN_SECRET_LENGTH} bytes"
            ));
        }

        if self.environment.is_production() {
            problems.extend(weak);
        } else {
            for warning in &weak {
                tracing::warn!(problem = %warning, "Insecure auth configuration (development only)");
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Configuration(problems.join("; ")))
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("token_ttl", &self.token_ttl)
            .field("clock_skew_leeway", &self.clock_skew_leeway)
            .field("otp_ttl", &self.otp_ttl)
            .field("otp_length", &self.otp_length)
            .field("lockout_threshold", &self.lockout_threshold)
            .field("lockout_duration", &self.lockout_duration)
            .field("session_ttl", &self.session_ttl)
            .field("track_sessions", &self.track_sessions)
            .field("password_pepper", &self.password_pepper.is_some())
            .field("hash_cost", &self.hash_cost)
            .field("environment", &self.environment)
            .finish()
    }
}

/// `std` to `chrono` duration, saturating at chrono's maximum
pub fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn production() -> AuthConfig {
        AuthConfig {
            jwt_secret: "k".repeat(MIN_SECRET_LENGTH),
            environment: Environment::Production,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.otp_ttl, Duration::from_secs(600));
        assert_eq!(config.session_ttl, Duration::from_secs(86_400));
        assert_eq!(config.lockout_threshold, 5);
        assert_eq!(config.jwt_issuer, "auth-service");
        assert!(config.track_sessions);
    }

    #[test]
    fn test_production_rejects_default_secret() {
        let config = AuthConfig {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            ..production()
        };
        assert!(matches!(config.validate(), Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_production_rejects_short_secret() {
        let config = AuthConfig {
            jwt_secret: "short-secret".to_string(),
            ..production()
        };
        assert!(config.validate().is_err());
        assert!(production().validate().is_ok());
    }

    #[test]
    fn test_development_tolerates_default_secret() {
        assert!(AuthConfig::default().validate().is_ok());
    }

    #[test]
    fn test_structural_problems_rejected_everywhere() {
        let config = AuthConfig {
            otp_length: 12,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AuthConfig {
            lockout_threshold: 0,
            ..production()
        };
        assert!(config.validate().is_err());

        let config = AuthConfig {
            token_ttl: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_random_secret_is_long_enough() {
        let config = AuthConfig::with_random_secret().unwrap();
        assert!(config.jwt_secret.len() >= MIN_SECRET_LENGTH);
        assert_ne!(config.jwt_secret, DEFAULT_JWT_SECRET);
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!("production".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("Dev".parse::<Environment>().unwrap(), Environment::Development);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        assert!(!format!("{:?}", production()).contains(&"k".repeat(MIN_SECRET_LENGTH)));
    }
}
