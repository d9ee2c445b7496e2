pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod notify;

use std::sync::Arc;
use std::time::Duration;

use actix_web::HttpResponse;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::AuthService;
pub use db::{Account, PgStore, PublicAccount, Role};
use notify::{HttpMailer, NoopNotifier, Notifier};

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub auth_service: Arc<AuthService>,
}

impl AppState {
    /// Production wiring: Postgres-backed stores plus the HTTP mailer
    /// (or the no-op notifier when no mail API key is configured).
    pub async fn new(config: Settings) -> Result<Self> {
        let store = Arc::new(
            PgStore::connect(
                &config.database.url,
                config.database.max_connections,
                Duration::from_secs(5),
            )
            .await?,
        );
        store.migrate().await?;

        let notifier: Arc<dyn Notifier> = if config.email.api_key.is_empty() {
            Arc::new(NoopNotifier)
        } else {
            Arc::new(HttpMailer::new(
                config.email.api_base_url.clone(),
                config.email.api_key.clone(),
                config.email.from.clone(),
            ))
        };

        let auth_service = Arc::new(AuthService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            notifier,
            config.auth.jwt_secret.clone(),
            config.auth.token_ttl_minutes,
            config.auth.otp_ttl_minutes,
        ));

        Ok(Self {
            config: Arc::new(config),
            auth_service,
        })
    }

    /// Wire the state around an already-built auth service; used by tests
    /// and by runs over the in-memory stores.
    pub fn with_service(config: Settings, auth_service: Arc<AuthService>) -> Self {
        Self {
            config: Arc::new(config),
            auth_service,
        }
    }
}
