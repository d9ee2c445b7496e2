use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use jobportal_server::auth::handlers::{
    admin_profile, delete_employer_account, delete_user_account, employer_profile,
    forgot_password, login, logout, register, reset_password, update_user_profile, user_profile,
    verify_email,
};
use jobportal_server::{health_check, AppError, AppState, Settings};
use std::net::TcpListener;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[actix_web::main]
async fn main() -> jobportal_server::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    // Load configuration
    let config = Settings::new()?;
    info!("Configuration loaded successfully");

    info!("Starting server at {}:{}", config.server.host, config.server.port);

    // Initialize application state
    let state = AppState::new(config.clone()).await?;
    let state = web::Data::new(state);

    // Periodic sweep of expired OTP rows and stale session-token records.
    // Expiry is always re-checked at read time; this only reclaims storage.
    let sweep_state = state.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            match sweep_state.auth_service.sweep_expired().await {
                Ok((otps, sessions)) if otps + sessions > 0 => {
                    info!("Swept {} expired OTP(s) and {} stale session(s)", otps, sessions);
                }
                Ok(_) => {}
                Err(e) => warn!("Expiry sweep failed: {}", e),
            }
        }
    });

    // Create and bind TCP listener
    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;

    let workers = config.server.workers as usize;
    let cors_settings = config.cors.clone();

    // Start HTTP server
    HttpServer::new(move || {
        let cors = if cors_settings.enabled {
            let cors_config = Cors::default();

            // Apply specific CORS rules based on configuration
            let cors_config = if cors_settings.allow_any_origin {
                cors_config
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .expose_any_header()
            } else {
                // More restrictive CORS for production use
                cors_config
                    .allowed_origin("http://localhost:8080")
                    .allowed_origin("http://127.0.0.1:8080")
                    .allowed_methods(vec!["GET", "POST", "PUT"])
                    .allowed_headers(vec!["Authorization", "Content-Type"])
                    .supports_credentials()
            };

            // Set max age
            cors_config.max_age(cors_settings.max_age as usize)
        } else {
            // CORS disabled - use most restrictive settings
            Cors::default()
        };

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .route("/health", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/verify-email", web::post().to(verify_email))
            .route("/auth/login", web::post().to(login))
            .route("/auth/forgot-password", web::post().to(forgot_password))
            .route("/auth/reset-password", web::post().to(reset_password))
            .route("/auth/logout", web::post().to(logout))
            .route("/user/profile", web::get().to(user_profile))
            .route("/user/profile", web::put().to(update_user_profile))
            .route("/user/delete-account", web::post().to(delete_user_account))
            .route("/employer/profile", web::get().to(employer_profile))
            .route("/employer/delete-account", web::post().to(delete_employer_account))
            .route("/admin/profile", web::get().to(admin_profile))
    })
    .listen(listener)?
    .workers(workers)
    .run()
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(())
}
