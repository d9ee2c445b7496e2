use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;

use jobportal_server::auth::{AuthService, Registration};
use jobportal_server::db::{
    MemoryCredentialStore, MemoryOtpLedger, MemorySessionRegistry, OtpLedger, Role,
};
use jobportal_server::error::AppError;
use jobportal_server::notify::{Notifier, OutboundMail};

/// Captures outbound mail so tests can read the delivered OTP codes.
#[derive(Default)]
struct RecordingNotifier {
    mails: Mutex<Vec<OutboundMail>>,
}

impl RecordingNotifier {
    async fn sent(&self) -> Vec<OutboundMail> {
        self.mails.lock().await.clone()
    }

    async fn last_code(&self) -> String {
        let mails = self.mails.lock().await;
        let mail = mails.last().expect("no mail was sent");
        mail.text
            .rsplit_once(": ")
            .expect("mail body carries no code")
            .1
            .to_string()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, mail: &OutboundMail) -> Result<(), AppError> {
        self.mails.lock().await.push(mail.clone());
        Ok(())
    }
}

struct Harness {
    otps: Arc<MemoryOtpLedger>,
    notifier: Arc<RecordingNotifier>,
    service: AuthService,
}

fn harness() -> Harness {
    let accounts = Arc::new(MemoryCredentialStore::new());
    let otps = Arc::new(MemoryOtpLedger::new());
    let sessions = Arc::new(MemorySessionRegistry::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let service = AuthService::new(
        accounts,
        otps.clone(),
        sessions,
        notifier.clone(),
        "test_secret".into(),
        60,
        5,
    );

    Harness { otps, notifier, service }
}

fn registration(email: &str, phone: &str, role: Role) -> Registration {
    Registration {
        email: email.into(),
        password: "Passw0rd!".into(),
        name: "Test Person".into(),
        phone: phone.into(),
        role,
    }
}

#[tokio::test]
async fn test_registration_issues_one_otp_and_leaves_account_inactive() {
    let h = harness();
    h.service
        .register(registration("a@x.com", "9876543210", Role::User))
        .await
        .unwrap();

    // Exactly one outstanding code, exactly one mail
    assert!(h.otps.outstanding_code("a@x.com").await.is_some());
    assert_eq!(h.notifier.sent().await.len(), 1);
    assert_eq!(h.notifier.sent().await[0].subject, "Email Verification");

    // Unverified accounts cannot log in, and the failure is NotFound
    let err = h.service.login("a@x.com", "Passw0rd!").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_verification_is_single_use() {
    let h = harness();
    h.service
        .register(registration("a@x.com", "9876543210", Role::User))
        .await
        .unwrap();
    let code = h.notifier.last_code().await;

    let err = h.service.verify_email("a@x.com", "000000").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCode));

    let account = h.service.verify_email("a@x.com", &code).await.unwrap();
    assert_eq!(account.email, "a@x.com");
    assert!(h.otps.outstanding_code("a@x.com").await.is_none());

    // Replaying the consumed code fails as invalid, not as expired
    let err = h.service.verify_email("a@x.com", &code).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCode));
}

#[tokio::test]
async fn test_verification_after_expiry_window() {
    let h = harness();
    h.service
        .register(registration("a@x.com", "9876543210", Role::User))
        .await
        .unwrap();
    let code = h.notifier.last_code().await;

    // Age the record past its window without purging it
    h.otps
        .upsert_for_email("a@x.com", &code, Utc::now() - Duration::seconds(1))
        .await
        .unwrap();

    let err = h.service.verify_email("a@x.com", &code).await.unwrap_err();
    assert!(matches!(err, AppError::Expired));
}

#[tokio::test]
async fn test_login_failures() {
    let h = harness();
    h.service
        .register(registration("a@x.com", "9876543210", Role::User))
        .await
        .unwrap();
    let code = h.notifier.last_code().await;
    h.service.verify_email("a@x.com", &code).await.unwrap();

    let err = h.service.login("a@x.com", "WrongPass1!").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredential));

    let err = h.service.login("ghost@x.com", "Passw0rd!").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_full_lifecycle_with_logout_revocation() {
    let h = harness();
    h.service
        .register(registration("a@x.com", "9876543210", Role::User))
        .await
        .unwrap();
    let code = h.notifier.last_code().await;
    h.service.verify_email("a@x.com", &code).await.unwrap();

    let (token, profile) = h.service.login("a@x.com", "Passw0rd!").await.unwrap();
    assert_eq!(profile.role, Role::User);

    let account = h.service.authorize(&token, Role::User).await.unwrap();
    assert_eq!(account.id, profile.id);

    h.service.logout(&token).await.unwrap();

    // The token is still within its cryptographic lifetime; the registry
    // deletion alone must kill it
    let err = h.service.authorize(&token, Role::User).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated(_)));

    // Logout of an already-deleted token stays silent
    h.service.logout(&token).await.unwrap();
}

#[tokio::test]
async fn test_role_mismatch_is_forbidden() {
    let h = harness();
    h.service
        .register(registration("a@x.com", "9876543210", Role::User))
        .await
        .unwrap();
    let code = h.notifier.last_code().await;
    h.service.verify_email("a@x.com", &code).await.unwrap();
    let (token, _) = h.service.login("a@x.com", "Passw0rd!").await.unwrap();

    let err = h.service.authorize(&token, Role::Employer).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_single_active_admin() {
    let h = harness();
    h.service
        .register(registration("root@x.com", "9876543210", Role::Admin))
        .await
        .unwrap();

    // Admins skip the OTP step entirely: active at once, no mail
    assert_eq!(h.notifier.sent().await.len(), 0);
    assert!(h.otps.outstanding_code("root@x.com").await.is_none());
    let (_, profile) = h.service.login("root@x.com", "Passw0rd!").await.unwrap();
    assert_eq!(profile.role, Role::Admin);

    let err = h
        .service
        .register(registration("other@x.com", "9876543211", Role::Admin))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_duplicate_active_account_conflicts() {
    let h = harness();
    h.service
        .register(registration("a@x.com", "9876543210", Role::User))
        .await
        .unwrap();
    let code = h.notifier.last_code().await;
    h.service.verify_email("a@x.com", &code).await.unwrap();

    // Same email
    let err = h
        .service
        .register(registration("a@x.com", "9876543299", Role::User))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Same phone, different email
    let err = h
        .service
        .register(registration("b@x.com", "9876543210", Role::User))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_forgot_password_requires_verified_account() {
    let h = harness();
    h.service
        .register(registration("a@x.com", "9876543210", Role::User))
        .await
        .unwrap();

    let err = h.service.forgot_password("a@x.com").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_password_reset_flow() {
    let h = harness();
    h.service
        .register(registration("a@x.com", "9876543210", Role::User))
        .await
        .unwrap();
    let code = h.notifier.last_code().await;
    h.service.verify_email("a@x.com", &code).await.unwrap();

    h.service.forgot_password("a@x.com").await.unwrap();
    let mails = h.notifier.sent().await;
    assert_eq!(mails.last().unwrap().subject, "Password Reset OTP");
    let reset_code = h.notifier.last_code().await;

    let err = h
        .service
        .reset_password("a@x.com", "000000", "NewPass1!")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidCode));

    h.service
        .reset_password("a@x.com", &reset_code, "NewPass1!")
        .await
        .unwrap();

    let err = h.service.login("a@x.com", "Passw0rd!").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredential));
    h.service.login("a@x.com", "NewPass1!").await.unwrap();

    // The reset code was consumed
    let err = h
        .service
        .reset_password("a@x.com", &reset_code, "OtherPass1!")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidCode));
}

#[tokio::test]
async fn test_repeated_registration_last_write_wins() {
    let h = harness();

    // Two registrations for the same not-yet-verified email both succeed;
    // the later one overwrites the account fields and the outstanding code
    let (first, second) = tokio::join!(
        h.service.register(registration("a@x.com", "9876543210", Role::User)),
        h.service.register(registration("a@x.com", "9876543211", Role::User)),
    );
    first.unwrap();
    second.unwrap();

    h.service
        .register(registration("a@x.com", "9876543212", Role::User))
        .await
        .unwrap();
    assert_eq!(h.notifier.sent().await.len(), 3);

    // Only the most recently issued code is outstanding
    let winning = h.otps.outstanding_code("a@x.com").await.unwrap();
    assert_eq!(winning, h.notifier.last_code().await);

    let account = h.service.verify_email("a@x.com", &winning).await.unwrap();
    assert_eq!(account.phone, "9876543212");
}

#[tokio::test]
async fn test_self_delete_revokes_all_sessions() {
    let h = harness();
    h.service
        .register(registration("a@x.com", "9876543210", Role::User))
        .await
        .unwrap();
    let code = h.notifier.last_code().await;
    h.service.verify_email("a@x.com", &code).await.unwrap();

    // Two concurrent sessions are allowed
    let (first_token, profile) = h.service.login("a@x.com", "Passw0rd!").await.unwrap();
    let (second_token, _) = h.service.login("a@x.com", "Passw0rd!").await.unwrap();
    assert_ne!(first_token, second_token);

    h.service.delete_account(profile.id).await.unwrap();

    for token in [first_token, second_token] {
        let err = h.service.authorize(&token, Role::User).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    // Soft-deleted: login is gone too
    let err = h.service.login("a@x.com", "Passw0rd!").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_validation_runs_before_any_persistence() {
    let h = harness();

    assert!(matches!(
        h.service
            .register(registration("not-an-email", "9876543210", Role::User))
            .await
            .unwrap_err(),
        AppError::Validation(_)
    ));

    let weak_password = Registration {
        password: "short".into(),
        ..registration("a@x.com", "9876543210", Role::User)
    };
    assert!(matches!(
        h.service.register(weak_password).await.unwrap_err(),
        AppError::Validation(_)
    ));

    // Nothing was persisted or sent
    assert!(h.otps.outstanding_code("a@x.com").await.is_none());
    assert!(h.notifier.sent().await.is_empty());
}
