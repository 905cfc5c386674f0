//! Cross-module flow tests over the in-memory store

use std::sync::Arc;
use std::time::Duration;

use platform::client::ClientInfo;
use platform::password::HashCost;

use crate::application::check_session::CurrentUser;
use crate::application::config::AuthConfig;
use crate::application::context::AuthSuccess;
use crate::application::service::AuthService;
use crate::application::sign_in::{SignInInput, SignInOutcome, TwoFactorChallenge};
use crate::application::sign_up::SignUpInput;
use crate::domain::audit::AuditAction;
use crate::domain::value_object::{
    otp_purpose::OtpPurpose, two_factor_method::TwoFactorMethod, user_role::UserRole,
};
use crate::error::AuthError;
use crate::infra::memory::{InMemoryAuthStore, MemoryAuditSink, OtpOutbox};

const PASSWORD: &str = "correct horse battery";

type TestService = AuthService<InMemoryAuthStore, OtpOutbox>;

struct Harness {
    service: TestService,
    store: InMemoryAuthStore,
    outbox: OtpOutbox,
    audit: Arc<MemoryAuditSink>,
}

fn test_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: "test-secret-that-is-long-enough-for-hs256!!".to_string(),
        hash_cost: HashCost::minimal(),
        lockout_threshold: 3,
        ..AuthConfig::default()
    }
}

fn harness_with(config: AuthConfig) -> Harness {
    let store = InMemoryAuthStore::new();
    let outbox = OtpOutbox::new();
    let audit = Arc::new(MemoryAuditSink::new());
    let service = AuthService::new(store.clone(), outbox.clone(), audit.clone(), config)
        .expect("valid test config");
    Harness {
        service,
        store,
        outbox,
        audit,
    }
}

fn harness() -> Harness {
    harness_with(test_config())
}

fn client() -> ClientInfo {
    ClientInfo::new("127.0.0.1".parse().ok(), Some("flow-test".into()))
}

fn sign_up(email: &str, user_name: &str, role: Option<UserRole>) -> SignUpInput {
    SignUpInput {
        email: email.to_string(),
        user_name: user_name.to_string(),
        password: PASSWORD.to_string(),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        role,
    }
}

fn sign_in(email: &str, password: &str) -> SignInInput {
    SignInInput {
        email: email.to_string(),
        password: password.to_string(),
    }
}

impl Harness {
    async fn register(&self, email: &str, user_name: &str) -> AuthSuccess {
        self.service
            .register(sign_up(email, user_name, None), None, &client())
            .await
            .expect("registration succeeds")
    }

    async fn register_admin(&self, email: &str, user_name: &str) -> AuthSuccess {
        self.service
            .register(
                sign_up(email, user_name, Some(UserRole::Admin)),
                Some(UserRole::Admin),
                &client(),
            )
            .await
            .expect("admin registration succeeds")
    }

    async fn login(&self, email: &str, password: &str) -> Result<SignInOutcome, AuthError> {
        self.service.login(sign_in(email, password), &client()).await
    }

    async fn login_ok(&self, email: &str) -> AuthSuccess {
        match self.login(email, PASSWORD).await {
            Ok(SignInOutcome::Authenticated(success)) => success,
            other => panic!("expected token, got {other:?}"),
        }
    }

    async fn login_pending(&self, email: &str) -> TwoFactorChallenge {
        match self.login(email, PASSWORD).await {
            Ok(SignInOutcome::TwoFactorPending(challenge)) => challenge,
            other => panic!("expected 2FA challenge, got {other:?}"),
        }
    }

    async fn caller(&self, success: &AuthSuccess) -> CurrentUser {
        self.service
            .authenticate(&success.token.token)
            .await
            .expect("fresh token authenticates")
    }
}

mod register_tests {
    use super::*;

    #[tokio::test]
    async fn test_register_then_login() {
        let h = harness();
        let registered = h.register("Alice@Example.com", "alice").await;
        assert_eq!(registered.user.email.as_str(), "alice@example.com");
        assert_eq!(registered.user.user_role, UserRole::User);
        assert!(registered.session_id.is_some());

        let success = h.login_ok("alice@example.com").await;
        assert_eq!(success.user.user_id, registered.user.user_id);
        assert!(success.user.last_login_at.is_some());

        let claims = &success.token.claims;
        assert_eq!(claims.sub, registered.user.user_id.to_string());
        assert_eq!(claims.role, UserRole::User);
        assert_eq!(claims.sid, success.session_id);
        assert!(h.audit.actions().contains(&AuditAction::LoginSucceeded));
    }

    #[tokio::test]
    async fn test_duplicates_are_rejected_case_insensitively() {
        let h = harness();
        h.register("bob@example.com", "bob").await;

        let err = h
            .service
            .register(sign_up("BOB@example.com", "bobby", None), None, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));

        let err = h
            .service
            .register(sign_up("other@example.com", "BOB", None), None, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateUserName));
    }

    #[tokio::test]
    async fn test_weak_password_is_rejected() {
        let h = harness();
        let mut input = sign_up("weak@example.com", "weak", None);
        input.password = "short".to_string();

        let err = h.service.register(input, None, &client()).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn test_elevated_role_requires_admin_actor() {
        let h = harness();
        let input = sign_up("mod@example.com", "moddy", Some(UserRole::Moderator));

        let err = h
            .service
            .register(input.clone(), None, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InsufficientRole));

        let err = h
            .service
            .register(input.clone(), Some(UserRole::Moderator), &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InsufficientRole));

        let created = h
            .service
            .register(input, Some(UserRole::Admin), &client())
            .await
            .unwrap();
        assert_eq!(created.user.user_role, UserRole::Moderator);
    }
}

mod lockout_tests {
    use super::*;
    use crate::domain::repository::UserRepository;
    use crate::domain::value_object::user_status::UserStatus;

    #[tokio::test]
    async fn test_lockout_then_recovery_after_duration() {
        let h = harness_with(AuthConfig {
            lockout_duration: Duration::from_secs(1),
            ..test_config()
        });
        h.register("carol@example.com", "carol").await;

        for _ in 0..3 {
            let err = h.login("carol@example.com", "wrong password").await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
        }

        // Locked: even the right password is refused, with the same outward error
        let err = h.login("carol@example.com", PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountLocked));
        assert_eq!(
            err.to_app_error().message(),
            AuthError::InvalidCredentials.to_app_error().message()
        );
        assert!(h.audit.actions().contains(&AuditAction::AccountLocked));

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let success = h.login_ok("carol@example.com").await;
        let auth = h
            .service
            .context()
            .credentials(&success.user.user_id)
            .await
            .unwrap();
        assert_eq!(auth.login_failed_count, 0);
        assert!(auth.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_default_threshold_locks_after_five_failures() {
        let defaults = AuthConfig::default();
        assert_eq!(defaults.lockout_threshold, 5);
        let h = harness_with(AuthConfig {
            jwt_secret: test_config().jwt_secret,
            hash_cost: HashCost::minimal(),
            lockout_duration: Duration::from_secs(1),
            ..defaults
        });

        let input = SignUpInput {
            password: "pw123456".to_string(),
            ..sign_up("a@x.com", "alice", None)
        };
        let registered = h.service.register(input, None, &client()).await.unwrap();
        assert_eq!(registered.token.claims.role, UserRole::User);

        for _ in 0..5 {
            let err = h.login("a@x.com", "wrong-password").await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
        }
        let err = h.login("a@x.com", "pw123456").await.unwrap_err();
        assert!(matches!(err, AuthError::AccountLocked));

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let outcome = h.login("a@x.com", "pw123456").await.unwrap();
        assert!(matches!(outcome, SignInOutcome::Authenticated(_)));
        let auth = h
            .service
            .context()
            .credentials(&registered.user.user_id)
            .await
            .unwrap();
        assert_eq!(auth.login_failed_count, 0);
    }

    #[tokio::test]
    async fn test_disabled_account_looks_like_wrong_password() {
        let h = harness();
        let registered = h.register("erin@example.com", "erin").await;

        let mut user = registered.user.clone();
        user.user_status = UserStatus::Disabled;
        h.store.update_user(&user).await.unwrap();

        let err = h.login("erin@example.com", PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountDisabled));
        assert_eq!(
            err.to_app_error().message(),
            AuthError::InvalidCredentials.to_app_error().message()
        );
        assert_eq!(
            err.to_app_error().status_code(),
            AuthError::InvalidCredentials.to_app_error().status_code()
        );
    }

    #[tokio::test]
    async fn test_success_resets_failure_counter() {
        let h = harness();
        h.register("dave@example.com", "dave").await;

        h.login("dave@example.com", "nope nope").await.unwrap_err();
        h.login("dave@example.com", "nope nope").await.unwrap_err();
        let success = h.login_ok("dave@example.com").await;

        // Two more failures stay under the threshold of three
        h.login("dave@example.com", "nope nope").await.unwrap_err();
        h.login("dave@example.com", "nope nope").await.unwrap_err();
        let auth = h
            .service
            .context()
            .credentials(&success.user.user_id)
            .await
            .unwrap();
        assert_eq!(auth.login_failed_count, 2);
        assert!(auth.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_unknown_email_looks_like_wrong_password() {
        let h = harness();
        let err = h.login("nobody@example.com", PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let err = h.login("not an email", PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }
}

mod session_tests {
    use super::*;

    #[tokio::test]
    async fn test_logout_all_revokes_every_token() {
        let h = harness();
        h.register("erin@example.com", "erin").await;
        let first = h.login_ok("erin@example.com").await;
        let second = h.login_ok("erin@example.com").await;
        h.caller(&first).await;

        let revoked = h
            .service
            .logout_all(&first.user.user_id, None)
            .await
            .unwrap();
        // Registration opened a third session
        assert_eq!(revoked, 3);

        for token in [&first.token.token, &second.token.token] {
            let err = h.service.authenticate(token).await.unwrap_err();
            assert!(matches!(err, AuthError::SessionInvalid));
        }
    }

    #[tokio::test]
    async fn test_logout_is_immediate_and_idempotent() {
        let h = harness();
        h.register("frank@example.com", "frank").await;
        let success = h.login_ok("frank@example.com").await;
        let caller = h.caller(&success).await;
        let sid = caller.session_id.clone().unwrap();

        h.service.logout(&sid, Some(caller.user_id)).await.unwrap();
        h.service.logout(&sid, Some(caller.user_id)).await.unwrap();

        let err = h.service.authenticate(&success.token.token).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionInvalid));
        let err = h.service.refresh_token(&success.token.token).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionInvalid));
    }

    #[tokio::test]
    async fn test_untracked_tokens_survive_logout_all() {
        let h = harness_with(AuthConfig {
            track_sessions: false,
            ..test_config()
        });
        h.register("gina@example.com", "gina").await;
        let success = h.login_ok("gina@example.com").await;
        assert!(success.session_id.is_none());
        assert!(success.token.claims.sid.is_none());

        h.service.logout_all(&success.user.user_id, None).await.unwrap();
        assert!(h.service.authenticate(&success.token.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_sessions_marks_current() {
        let h = harness();
        h.register("hank@example.com", "hank").await;
        let success = h.login_ok("hank@example.com").await;
        let caller = h.caller(&success).await;

        let sessions = h
            .service
            .list_sessions(&caller.user_id, caller.session_id.as_deref())
            .await
            .unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions.iter().filter(|s| s.is_current).count(), 1);
        assert!(sessions.iter().all(|s| s.handle.len() == 8));
    }

    #[tokio::test]
    async fn test_refresh_issues_new_token_for_same_subject() {
        let h = harness();
        h.register("ivy@example.com", "ivy").await;
        let success = h.login_ok("ivy@example.com").await;

        let refreshed = h.service.refresh_token(&success.token.token).await.unwrap();
        assert_ne!(refreshed.token, success.token.token);
        assert_eq!(refreshed.claims.sub, success.token.claims.sub);
        assert_eq!(refreshed.claims.sid, success.token.claims.sid);
        assert!(h.service.authenticate(&refreshed.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_change_password_keeps_only_current_session() {
        let h = harness();
        h.register("jack@example.com", "jack").await;
        let current = h.login_ok("jack@example.com").await;
        let other = h.login_ok("jack@example.com").await;
        let caller = h.caller(&current).await;

        let err = h
            .service
            .change_password(&caller, "wrong password".into(), "brand new secret".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        h.service
            .change_password(&caller, PASSWORD.into(), "brand new secret".into())
            .await
            .unwrap();

        assert!(h.service.authenticate(&current.token.token).await.is_ok());
        assert!(h.service.authenticate(&other.token.token).await.is_err());
        assert!(h.login("jack@example.com", PASSWORD).await.is_err());
        assert!(h.login("jack@example.com", "brand new secret").await.is_ok());
    }

    #[tokio::test]
    async fn test_sweep_removes_revoked_sessions() {
        let h = harness();
        let success = h.register("kate@example.com", "kate").await;
        h.login_ok("kate@example.com").await;
        assert_eq!(h.store.session_count(), 2);

        h.service.logout_all(&success.user.user_id, None).await.unwrap();
        let report = h.service.sweep_expired().await.unwrap();
        assert_eq!(report.sessions, 2);
        assert_eq!(h.store.session_count(), 0);
    }
}

mod otp_tests {
    use super::*;

    async fn with_two_factor(h: &Harness, email: &str, user_name: &str) -> AuthSuccess {
        let registered = h.register(email, user_name).await;
        h.service
            .enable_two_factor(&registered.user.user_id, TwoFactorMethod::Email, None)
            .await
            .unwrap();
        registered
    }

    #[tokio::test]
    async fn test_two_factor_login_flow() {
        let h = harness();
        with_two_factor(&h, "liam@example.com", "liam").await;

        let challenge = h.login_pending("liam@example.com").await;
        assert_eq!(challenge.method, TwoFactorMethod::Email);
        let code = h.outbox.last_code(OtpPurpose::TwoFactor).unwrap();
        assert_eq!(code.len(), 6);

        let wrong = if code == "000000" { "111111" } else { "000000" };
        let err = h
            .service
            .verify_two_factor(&challenge.challenge_id, wrong, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::OtpInvalidOrExpired));

        let success = h
            .service
            .verify_two_factor(&challenge.challenge_id, &code, &client())
            .await
            .unwrap();
        assert_eq!(success.user.user_id, challenge.user_id);
        assert!(h.audit.actions().contains(&AuditAction::TwoFactorVerified));

        // Single use
        let err = h
            .service
            .verify_two_factor(&challenge.challenge_id, &code, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::OtpInvalidOrExpired));
    }

    #[tokio::test]
    async fn test_two_factor_cannot_skip_the_password_step() {
        let h = harness();
        let registered = with_two_factor(&h, "kate@example.com", "kate").await;
        let user_id = registered.user.user_id;
        let guessed = "A".repeat(43);

        // Nothing but the user id is known: no code goes out
        for handle in [user_id.to_string(), guessed.clone()] {
            let err = h.service.resend_two_factor(&handle).await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
        }
        assert_eq!(h.outbox.last_code(OtpPurpose::TwoFactor), None);

        for handle in [user_id.to_string(), guessed] {
            let err = h
                .service
                .verify_two_factor(&handle, "123456", &client())
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::OtpInvalidOrExpired));
        }
        let auth = h.service.context().credentials(&user_id).await.unwrap();
        assert_eq!(auth.login_failed_count, 0);

        // A real code is still useless without the handle from this login
        let stale = h.login_pending("kate@example.com").await;
        let current = h.login_pending("kate@example.com").await;
        assert_ne!(stale.challenge_id, current.challenge_id);
        let code = h.outbox.last_code(OtpPurpose::TwoFactor).unwrap();

        let err = h
            .service
            .verify_two_factor(&user_id.to_string(), &code, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::OtpInvalidOrExpired));
        let err = h.service.resend_two_factor(&stale.challenge_id).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        let err = h
            .service
            .verify_two_factor(&stale.challenge_id, &code, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::OtpInvalidOrExpired));

        let success = h
            .service
            .verify_two_factor(&current.challenge_id, &code, &client())
            .await
            .unwrap();
        assert_eq!(success.user.user_id, user_id);

        // Consumed together with the code
        let err = h.service.resend_two_factor(&current.challenge_id).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_concurrent_consumption_succeeds_once() {
        let h = harness();
        with_two_factor(&h, "mia@example.com", "mia").await;
        let challenge = h.login_pending("mia@example.com").await;
        let code = h.outbox.last_code(OtpPurpose::TwoFactor).unwrap();

        let c = client();
        let (a, b) = tokio::join!(
            h.service.verify_two_factor(&challenge.challenge_id, &code, &c),
            h.service.verify_two_factor(&challenge.challenge_id, &code, &c),
        );
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    }

    #[tokio::test]
    async fn test_code_expires() {
        let h = harness_with(AuthConfig {
            otp_ttl: Duration::from_secs(1),
            ..test_config()
        });
        with_two_factor(&h, "noah@example.com", "noah").await;
        let challenge = h.login_pending("noah@example.com").await;
        let code = h.outbox.last_code(OtpPurpose::TwoFactor).unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let err = h
            .service
            .verify_two_factor(&challenge.challenge_id, &code, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::OtpInvalidOrExpired));
    }

    #[tokio::test]
    async fn test_resend_replaces_pending_code() {
        let h = harness();
        with_two_factor(&h, "olga@example.com", "olga").await;
        let challenge = h.login_pending("olga@example.com").await;
        let first = h.outbox.last_code(OtpPurpose::TwoFactor).unwrap();

        h.service.resend_two_factor(&challenge.challenge_id).await.unwrap();
        let second = h.outbox.last_code(OtpPurpose::TwoFactor).unwrap();

        if first != second {
            assert!(
                h.service
                    .verify_two_factor(&challenge.challenge_id, &first, &client())
                    .await
                    .is_err()
            );
        }
        assert!(
            h.service
                .verify_two_factor(&challenge.challenge_id, &second, &client())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_failed_codes_count_toward_lockout() {
        let h = harness();
        with_two_factor(&h, "pete@example.com", "pete").await;
        let challenge = h.login_pending("pete@example.com").await;

        for _ in 0..3 {
            let _ = h
                .service
                .verify_two_factor(&challenge.challenge_id, "12345x", &client())
                .await;
        }

        let code = h.outbox.last_code(OtpPurpose::TwoFactor).unwrap();
        let err = h
            .service
            .verify_two_factor(&challenge.challenge_id, &code, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountLocked));
    }

    #[tokio::test]
    async fn test_sms_requires_phone_number() {
        let h = harness();
        let registered = h.register("quinn@example.com", "quinn").await;
        let user_id = registered.user.user_id;

        let err = h
            .service
            .enable_two_factor(&user_id, TwoFactorMethod::Sms, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TwoFactorUnavailable(_)));

        h.service
            .enable_two_factor(&user_id, TwoFactorMethod::Sms, Some("+1 555 010 0199".into()))
            .await
            .unwrap();
        h.login_pending("quinn@example.com").await;

        let sent = h.outbox.sent();
        let last = sent.last().unwrap();
        assert_eq!(
            last.destination,
            crate::domain::notifier::OtpDestination::Phone("+15550100199".into())
        );
    }

    #[tokio::test]
    async fn test_disable_requires_password() {
        let h = harness();
        let registered = with_two_factor(&h, "rosa@example.com", "rosa").await;
        let user_id = registered.user.user_id;

        let err = h
            .service
            .disable_two_factor(&user_id, "not it at all".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        h.service
            .disable_two_factor(&user_id, PASSWORD.into())
            .await
            .unwrap();
        h.login_ok("rosa@example.com").await;

        let err = h
            .service
            .disable_two_factor(&user_id, PASSWORD.into())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TwoFactorNotEnabled));
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let h = harness();
        h.register("sam@example.com", "sam").await;
        let before = h.login_ok("sam@example.com").await;

        // Unknown addresses are accepted silently
        h.service
            .request_password_reset("ghost@example.com".into())
            .await
            .unwrap();
        assert!(h.outbox.last_code(OtpPurpose::PasswordReset).is_none());

        h.service
            .request_password_reset("SAM@example.com".into())
            .await
            .unwrap();
        let code = h.outbox.last_code(OtpPurpose::PasswordReset).unwrap();

        h.service
            .reset_password("sam@example.com".into(), &code, "a fresh passphrase".into())
            .await
            .unwrap();

        assert!(h.service.authenticate(&before.token.token).await.is_err());
        assert!(h.login("sam@example.com", "a fresh passphrase").await.is_ok());

        let err = h
            .service
            .reset_password("sam@example.com".into(), &code, "another passphrase".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::OtpInvalidOrExpired));
    }

    #[tokio::test]
    async fn test_email_verification() {
        let h = harness();
        let registered = h.register("tina@example.com", "tina").await;
        let user_id = registered.user.user_id;
        assert!(!registered.user.email_verified);

        let expires = h.service.request_email_verification(&user_id).await.unwrap();
        assert!(expires.is_some());
        let code = h.outbox.last_code(OtpPurpose::EmailVerification).unwrap();

        h.service.verify_email(&user_id, &code).await.unwrap();
        let caller = h.caller(&registered).await;
        assert!(h.service.me(&caller).await.unwrap().email_verified);

        // Nothing to send once verified
        assert!(
            h.service
                .request_email_verification(&user_id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_sweep_removes_used_codes() {
        let h = harness();
        let registered = h.register("uma@example.com", "uma").await;
        h.service
            .request_email_verification(&registered.user.user_id)
            .await
            .unwrap();
        let code = h.outbox.last_code(OtpPurpose::EmailVerification).unwrap();
        h.service
            .verify_email(&registered.user.user_id, &code)
            .await
            .unwrap();
        assert_eq!(h.store.code_count(), 1);

        let report = h.service.sweep_expired().await.unwrap();
        assert_eq!(report.codes, 1);
        assert_eq!(h.store.code_count(), 0);
    }
}

mod rbac_tests {
    use super::*;

    #[tokio::test]
    async fn test_admin_unlock_clears_lock() {
        let h = harness();
        let admin = h.register_admin("root@example.com", "root").await;
        let target = h.register("vic@example.com", "vic").await;
        for _ in 0..3 {
            h.login("vic@example.com", "wrong password").await.unwrap_err();
        }
        assert!(matches!(
            h.login("vic@example.com", PASSWORD).await.unwrap_err(),
            AuthError::AccountLocked
        ));

        let user = h.caller(&target).await;
        let err = h
            .service
            .admin_unlock(&user, &target.user.user_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InsufficientRole));

        let admin = h.caller(&admin).await;
        h.service
            .admin_unlock(&admin, &target.user.user_id)
            .await
            .unwrap();
        h.login_ok("vic@example.com").await;
        assert!(h.audit.actions().contains(&AuditAction::AccountUnlocked));
    }

    #[tokio::test]
    async fn test_session_listing_is_owner_or_admin() {
        let h = harness();
        let admin = h.register_admin("boss@example.com", "boss").await;
        let wendy = h.register("wendy@example.com", "wendy").await;
        let xavier = h.register("xavier@example.com", "xavier").await;

        let as_xavier = h.caller(&xavier).await;
        let err = h
            .service
            .list_sessions_of(&as_xavier, &wendy.user.user_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotResourceOwner));

        let as_wendy = h.caller(&wendy).await;
        let own = h
            .service
            .list_sessions_of(&as_wendy, &wendy.user.user_id)
            .await
            .unwrap();
        assert!(own.iter().any(|s| s.is_current));

        let as_admin = h.caller(&admin).await;
        let seen = h
            .service
            .list_sessions_of(&as_admin, &wendy.user.user_id)
            .await
            .unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].is_current);
    }

    #[tokio::test]
    async fn test_admin_forced_logout() {
        let h = harness();
        let admin = h.register_admin("chief@example.com", "chief").await;
        let yara = h.register("yara@example.com", "yara").await;

        let as_admin = h.caller(&admin).await;
        let revoked = h
            .service
            .admin_logout_all(&as_admin, &yara.user.user_id)
            .await
            .unwrap();
        assert_eq!(revoked, 1);
        assert!(h.service.authenticate(&yara.token.token).await.is_err());
        assert!(h.service.authenticate(&admin.token.token).await.is_ok());
    }
}

mod router_tests {
    use super::*;
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use axum::extract::ConnectInfo;
    use platform::client::TrustedProxies;
    use platform::rate_limit::{BucketRegistry, RateLimitConfig};
    use serde_json::{Value, json};
    use std::net::SocketAddr;
    use tower::ServiceExt;

    use crate::presentation::router::auth_router;

    fn app(h: &Harness, limit: RateLimitConfig) -> Router {
        app_behind(h, limit, TrustedProxies::default())
    }

    fn app_behind(h: &Harness, limit: RateLimitConfig, proxies: TrustedProxies) -> Router {
        auth_router(h.service.clone(), Arc::new(BucketRegistry::new(limit)), proxies)
    }

    /// `request` as if it arrived on a socket from `peer`, carrying `xff`
    fn from_peer(mut request: Request<Body>, peer: &str, xff: &str) -> Request<Body> {
        let addr: SocketAddr = format!("{peer}:40000").parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
            .headers_mut()
            .insert("x-forwarded-for", xff.parse().unwrap());
        request
    }

    fn post(uri: &str, body: Value, bearer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn register_body(email: &str, user_name: &str) -> Value {
        json!({
            "email": email,
            "userName": user_name,
            "password": PASSWORD,
            "firstName": "Zed",
            "lastName": "Router",
        })
    }

    #[tokio::test]
    async fn test_register_login_me() {
        let h = harness();
        let app = app(&h, RateLimitConfig::default());

        let response = app
            .clone()
            .oneshot(post("/register", register_body("zed@example.com", "zed"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(post(
                "/login",
                json!({ "email": "zed@example.com", "password": PASSWORD }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "authenticated");
        assert_eq!(body["tokenType"], "Bearer");
        let token = body["accessToken"].as_str().unwrap().to_string();

        let response = app.clone().oneshot(get("/me", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["email"], "zed@example.com");
        assert_eq!(body["role"], "user");
    }

    #[tokio::test]
    async fn test_two_factor_login_over_http() {
        let h = harness();
        let app = app(&h, RateLimitConfig::default());
        let registered = h.register("yara@example.com", "yara").await;
        h.service
            .enable_two_factor(&registered.user.user_id, TwoFactorMethod::Email, None)
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(post(
                "/login",
                json!({ "email": "yara@example.com", "password": PASSWORD }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "two_factor_required");
        assert!(body.get("userId").is_none());
        let challenge_id = body["challengeId"].as_str().unwrap().to_string();
        let code = h.outbox.last_code(OtpPurpose::TwoFactor).unwrap();

        // The account id is not a handle
        let response = app
            .clone()
            .oneshot(post(
                "/2fa/verify",
                json!({ "challengeId": registered.user.user_id.to_string(), "code": code }),
                None,
            ))
            .await
            .unwrap();
        assert!(response.status().is_client_error());

        let response = app
            .oneshot(post(
                "/2fa/verify",
                json!({ "challengeId": challenge_id, "code": code }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["tokenType"], "Bearer");
    }

    #[tokio::test]
    async fn test_protected_routes_require_bearer() {
        let h = harness();
        let app = app(&h, RateLimitConfig::default());

        let response = app.clone().oneshot(get("/me", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(get("/me", Some("not.a.token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["detail"], "Authentication required");
    }

    #[tokio::test]
    async fn test_failed_login_is_generic() {
        let h = harness();
        h.register("amy@example.com", "amy").await;
        let app = app(&h, RateLimitConfig::default());

        let wrong_password = app
            .clone()
            .oneshot(post(
                "/login",
                json!({ "email": "amy@example.com", "password": "bad password" }),
                None,
            ))
            .await
            .unwrap();
        let unknown = app
            .oneshot(post(
                "/login",
                json!({ "email": "who@example.com", "password": "bad password" }),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(wrong_password).await, json_body(unknown).await);
    }

    #[tokio::test]
    async fn test_admin_routes_require_admin_role() {
        let h = harness();
        let admin = h.register_admin("ada@example.com", "ada").await;
        let user = h.register("ben@example.com", "ben").await;
        let app = app(&h, RateLimitConfig::default());
        let uri = format!("/admin/users/{}/logout-all", user.user.user_id);

        let response = app
            .clone()
            .oneshot(post(&uri, json!({}), Some(&user.token.token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(post(&uri, json!({}), Some(&admin.token.token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["sessionsRevoked"], 1);
    }

    #[tokio::test]
    async fn test_validation_errors_are_bad_request() {
        let h = harness();
        let app = app(&h, RateLimitConfig::default());

        let response = app
            .oneshot(post(
                "/register",
                json!({
                    "email": "nope",
                    "userName": "x",
                    "password": PASSWORD,
                    "firstName": "A",
                    "lastName": "B",
                }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rate_limit_per_ip() {
        let h = harness();
        let app = app(&h, RateLimitConfig::new(2, 0.0));
        let body = json!({ "email": "ghost@example.com" });

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(post("/password/forgot", body.clone(), None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::ACCEPTED);
        }

        let response = app
            .oneshot(post("/password/forgot", body, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn test_rate_limit_ignores_spoofed_forwarded_for() {
        let h = harness();
        let app = app(&h, RateLimitConfig::new(2, 0.0));
        let body = json!({ "email": "ghost@example.com" });

        let mut statuses = Vec::new();
        for i in 0..20 {
            let request = from_peer(
                post("/password/forgot", body.clone(), None),
                "203.0.113.5",
                &format!("10.0.0.{i}"),
            );
            statuses.push(app.clone().oneshot(request).await.unwrap().status());
        }

        assert_eq!(&statuses[..2], &[StatusCode::ACCEPTED, StatusCode::ACCEPTED]);
        assert!(statuses[2..].iter().all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
    }

    #[tokio::test]
    async fn test_rate_limit_keys_on_forwarded_client_behind_trusted_proxy() {
        let h = harness();
        let proxies = TrustedProxies::new(["127.0.0.1".parse().unwrap()]);
        let app = app_behind(&h, RateLimitConfig::new(2, 0.0), proxies);
        let body = json!({ "email": "ghost@example.com" });

        for i in 0..5 {
            let request = from_peer(
                post("/password/forgot", body.clone(), None),
                "127.0.0.1",
                &format!("198.51.100.{i}"),
            );
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::ACCEPTED);
        }

        // The first forwarded client has one token left
        let mut statuses = Vec::new();
        for _ in 0..2 {
            let request = from_peer(
                post("/password/forgot", body.clone(), None),
                "127.0.0.1",
                "198.51.100.0",
            );
            statuses.push(app.clone().oneshot(request).await.unwrap().status());
        }
        assert_eq!(statuses, [StatusCode::ACCEPTED, StatusCode::TOO_MANY_REQUESTS]);
    }
}
