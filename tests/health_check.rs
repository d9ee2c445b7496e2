use std::sync::Arc;

use actix_web::{test, web, App};
use chrono::DateTime;

use jobportal_server::auth::AuthService;
use jobportal_server::db::{MemoryCredentialStore, MemoryOtpLedger, MemorySessionRegistry};
use jobportal_server::notify::NoopNotifier;
use jobportal_server::{AppState, Settings};

#[actix_web::test]
async fn test_health_check() {
    let config = Settings::new_for_test().expect("Failed to load test config");
    let auth_service = Arc::new(AuthService::new(
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(MemoryOtpLedger::new()),
        Arc::new(MemorySessionRegistry::new()),
        Arc::new(NoopNotifier),
        config.auth.jwt_secret.clone(),
        config.auth.token_ttl_minutes,
        config.auth.otp_ttl_minutes,
    ));
    let state = web::Data::new(AppState::with_service(config, auth_service));

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(jobportal_server::health_check)),
    )
    .await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());

    let body = test::read_body(resp).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["status"], "healthy");
    assert!(DateTime::parse_from_rfc3339(json["timestamp"].as_str().unwrap()).is_ok());
}
