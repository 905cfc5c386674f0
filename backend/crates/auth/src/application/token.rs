//! Bearer Token Codec
//!
//! Compact JWS tokens signed with HS256 and a process-wide secret.
//!
//! ## Verification order
//! 1. The header `alg` must be exactly `HS256`. Anything else (`none`,
//!    `HS512`, `RS256`, ...) is rejected as an invalid signature before any
//!    key material is touched.
//! 2. Signature, issuer and presence of every registered claim.
//! 3. Expiry is strict: a token is expired once `now >= exp`. Only `nbf`
//!    gets the configured clock skew leeway.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use kernel::id::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::config::AuthConfig;
use crate::domain::entity::user::User;
use crate::domain::value_object::user_role::UserRole;
use crate::error::{AuthError, AuthResult};

const ALGORITHM: Algorithm = Algorithm::HS256;
const ALGORITHM_NAME: &str = "HS256";

// ============================================================================
// Claims
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity UUID
    pub sub: String,
    pub email: String,
    pub username: String,
    pub role: UserRole,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub iss: String,
    /// Unique per issuance
    pub jti: String,
    /// Server-side session bound to this token, when sessions are tracked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

impl Claims {
    pub fn user_id(&self) -> AuthResult<UserId> {
        UserId::parse_str(&self.sub).map_err(|_| AuthError::TokenMalformed)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// A freshly signed token with the claims it carries
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Codec
// ============================================================================

#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    leeway_secs: i64,
}

impl TokenCodec {
    pub fn new(config: &AuthConfig) -> Self {
        Self::from_secret(
            config.jwt_secret.as_bytes(),
            &config.jwt_issuer,
            config.clock_skew_leeway,
        )
    }

    pub fn from_secret(secret: &[u8], issuer: &str, leeway: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.to_string(),
            leeway_secs: secs(leeway),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Issue a token for `user` valid for `ttl` from now.
    pub fn issue(&self, user: &User, ttl: Duration, sid: Option<String>) -> AuthResult<IssuedToken> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.user_id.to_string(),
            email: user.email.as_str().to_string(),
            username: user.user_name.as_str().to_string(),
            role: user.user_role,
            iat: now,
            nbf: now,
            exp: now.saturating_add(secs(ttl)),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
            sid,
        };
        self.issued(claims)
    }

    /// Sign arbitrary claims with the configured key.
    pub fn sign(&self, claims: &Claims) -> AuthResult<String> {
        encode(&Header::new(ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Token signing failed: {e}")))
    }

    fn issued(&self, claims: Claims) -> AuthResult<IssuedToken> {
        let token = self.sign(&claims)?;
        Ok(IssuedToken {
            token,
            expires_at: claims.expires_at(),
            claims,
        })
    }

    /// Verify signature, algorithm, issuer and time window.
    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        check_header_algorithm(token)?;

        let mut validation = Validation::new(ALGORITHM);
        // Time checks are done below so expiry can be strict while nbf gets leeway
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iat", "iss", "sub"]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| map_jwt_error(e.kind()))?
            .claims;

        let now = Utc::now().timestamp();
        if now >= claims.exp {
            return Err(AuthError::TokenExpired);
        }
        if claims.nbf > now.saturating_add(self.leeway_secs) {
            return Err(AuthError::TokenNotYetValid);
        }

        Ok(claims)
    }

    /// Verify `token`, then issue a new one with the same subject claims
    /// (and session binding) and a fresh window. The old token is not
    /// revoked here.
    pub fn refresh(&self, token: &str, ttl: Duration) -> AuthResult<IssuedToken> {
        let old = self.verify(token)?;
        let now = Utc::now().timestamp();
        self.issued(Claims {
            iat: now,
            nbf: now,
            exp: now.saturating_add(secs(ttl)),
            jti: Uuid::new_v4().to_string(),
            ..old
        })
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &ALGORITHM_NAME)
            .field("issuer", &self.issuer)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

fn secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

/// Reject any token whose header does not advertise exactly HS256.
///
/// Read from the raw header JSON so that algorithms the JWT library cannot
/// even represent (`none`) are classified as a signature problem, not a
/// parse problem.
fn check_header_algorithm(token: &str) -> AuthResult<()> {
    let header_segment = token.split('.').next().ok_or(AuthError::TokenMalformed)?;
    let header_bytes =
        platform::crypto::from_base64url(header_segment).map_err(|_| AuthError::TokenMalformed)?;
    let header: serde_json::Value =
        serde_json::from_slice(&header_bytes).map_err(|_| AuthError::TokenMalformed)?;

    match header.get("alg").and_then(|alg| alg.as_str()) {
        Some(ALGORITHM_NAME) => Ok(()),
        Some(_) => Err(AuthError::TokenSignatureInvalid),
        None => Err(AuthError::TokenMalformed),
    }
}

fn map_jwt_error(kind: &JwtErrorKind) -> AuthError {
    match kind {
        JwtErrorKind::InvalidSignature
        | JwtErrorKind::InvalidAlgorithm
        | JwtErrorKind::InvalidAlgorithmName
        | JwtErrorKind::InvalidKeyFormat => AuthError::TokenSignatureInvalid,
        JwtErrorKind::ExpiredSignature => AuthError::TokenExpired,
        JwtErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
        _ => AuthError::TokenMalformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_object::{email::Email, user_name::UserName};
    use platform::crypto::to_base64url;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn codec() -> TokenCodec {
        TokenCodec::from_secret(SECRET, "auth-service", Duration::from_secs(30))
    }

    fn user(role: UserRole) -> User {
        User::new(
            Email::new("a@x.com").unwrap(),
            UserName::new("alice").unwrap(),
            "Alice".into(),
            "Liddell".into(),
            role,
            Utc::now(),
        )
    }

    fn forge(header: &str, claims: &Claims) -> String {
        let payload = serde_json::to_vec(claims).unwrap();
        format!(
            "{}.{}.{}",
            to_base64url(header.as_bytes()),
            to_base64url(&payload),
            to_base64url(b"not-a-signature")
        )
    }

    #[test]
    fn test_round_trip_preserves_claims() {
        let codec = codec();
        let user = user(UserRole::Moderator);
        let issued = codec.issue(&user, Duration::from_secs(3600), None).unwrap();

        let claims = codec.verify(&issued.token).unwrap();
        assert_eq!(claims, issued.claims);
        assert_eq!(claims.user_id().unwrap(), user.user_id);
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, UserRole::Moderator);
        assert_eq!(claims.iss, "auth-service");
        assert_eq!(claims.nbf, claims.iat);
        assert_eq!(claims.exp - claims.iat, 3600);
        assert!(claims.sid.is_none());
    }

    #[test]
    fn test_zero_ttl_is_expired() {
        let codec = codec();
        let issued = codec.issue(&user(UserRole::User), Duration::ZERO, None).unwrap();
        assert!(matches!(codec.verify(&issued.token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_past_expiry_is_expired() {
        let codec = codec();
        let mut claims = codec
            .issue(&user(UserRole::User), Duration::from_secs(60), None)
            .unwrap()
            .claims;
        claims.exp = Utc::now().timestamp() - 10;
        let token = codec.sign(&claims).unwrap();
        assert!(matches!(codec.verify(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_not_before_respects_leeway() {
        let codec = codec();
        let mut claims = codec
            .issue(&user(UserRole::User), Duration::from_secs(3600), None)
            .unwrap()
            .claims;

        claims.nbf = Utc::now().timestamp() + 10;
        let within_leeway = codec.sign(&claims).unwrap();
        assert!(codec.verify(&within_leeway).is_ok());

        claims.nbf = Utc::now().timestamp() + 600;
        let too_early = codec.sign(&claims).unwrap();
        assert!(matches!(codec.verify(&too_early), Err(AuthError::TokenNotYetValid)));
    }

    #[test]
    fn test_wrong_secret_is_signature_invalid() {
        let issued = codec()
            .issue(&user(UserRole::User), Duration::from_secs(60), None)
            .unwrap();
        let other = TokenCodec::from_secret(b"another-secret-another-secret-xx", "auth-service", Duration::ZERO);
        assert!(matches!(
            other.verify(&issued.token),
            Err(AuthError::TokenSignatureInvalid)
        ));
    }

    #[test]
    fn test_none_algorithm_is_rejected() {
        let codec = codec();
        let claims = codec
            .issue(&user(UserRole::Admin), Duration::from_secs(60), None)
            .unwrap()
            .claims;
        let token = forge(r#"{"alg":"none","typ":"JWT"}"#, &claims);
        assert!(matches!(codec.verify(&token), Err(AuthError::TokenSignatureInvalid)));

        // Unsigned form with an empty signature segment
        let unsigned = format!(
            "{}.{}.",
            to_base64url(br#"{"alg":"none"}"#),
            to_base64url(&serde_json::to_vec(&claims).unwrap())
        );
        assert!(matches!(codec.verify(&unsigned), Err(AuthError::TokenSignatureInvalid)));
    }

    #[test]
    fn test_other_algorithms_are_rejected() {
        let codec = codec();
        let claims = codec
            .issue(&user(UserRole::User), Duration::from_secs(60), None)
            .unwrap()
            .claims;

        // Validly signed with the same secret, but HS512
        let hs512 = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        assert!(matches!(codec.verify(&hs512), Err(AuthError::TokenSignatureInvalid)));

        let rs256 = forge(r#"{"alg":"RS256","typ":"JWT"}"#, &claims);
        assert!(matches!(codec.verify(&rs256), Err(AuthError::TokenSignatureInvalid)));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let codec = codec();
        let issued = codec
            .issue(&user(UserRole::User), Duration::from_secs(60), None)
            .unwrap();
        let mut parts: Vec<&str> = issued.token.split('.').collect();
        let mut elevated = issued.claims.clone();
        elevated.role = UserRole::Admin;
        let payload = to_base64url(&serde_json::to_vec(&elevated).unwrap());
        parts[1] = &payload;
        assert!(matches!(
            codec.verify(&parts.join(".")),
            Err(AuthError::TokenSignatureInvalid)
        ));
    }

    #[test]
    fn test_malformed_tokens() {
        let codec = codec();
        for token in ["", "abc", "a.b.c", "!!!.???.###"] {
            assert!(
                matches!(codec.verify(token), Err(AuthError::TokenMalformed)),
                "{token:?}"
            );
        }
    }

    #[test]
    fn test_wrong_issuer_is_rejected() {
        let other = TokenCodec::from_secret(SECRET, "someone-else", Duration::ZERO);
        let issued = other
            .issue(&user(UserRole::User), Duration::from_secs(60), None)
            .unwrap();
        assert!(matches!(codec().verify(&issued.token), Err(AuthError::TokenMalformed)));
    }

    #[test]
    fn test_refresh_keeps_subject_and_session() {
        let codec = codec();
        let issued = codec
            .issue(&user(UserRole::User), Duration::from_secs(60), Some("sid-1".into()))
            .unwrap();
        let refreshed = codec.refresh(&issued.token, Duration::from_secs(7200)).unwrap();

        assert_ne!(refreshed.token, issued.token);
        assert_ne!(refreshed.claims.jti, issued.claims.jti);
        assert_eq!(refreshed.claims.sub, issued.claims.sub);
        assert_eq!(refreshed.claims.role, issued.claims.role);
        assert_eq!(refreshed.claims.sid.as_deref(), Some("sid-1"));
        assert_eq!(refreshed.claims.exp - refreshed.claims.iat, 7200);
        // The old token stays valid until it expires
        assert!(codec.verify(&issued.token).is_ok());
    }

    #[test]
    fn test_refresh_requires_valid_token() {
        let codec = codec();
        let expired = codec
            .issue(&user(UserRole::User), Duration::ZERO, None)
            .unwrap();
        assert!(matches!(
            codec.refresh(&expired.token, Duration::from_secs(60)),
            Err(AuthError::TokenExpired)
        ));
    }
}
