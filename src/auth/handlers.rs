use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::auth::gate::{bearer_token, AdminOnly, Authenticated, EmployerOnly, UserOnly};
use crate::auth::service::Registration;
use crate::db::models::{Account, PublicAccount, Role};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub account: PublicAccount,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: String,
    pub phone: String,
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received registration request for email: {}", req.email);

    let role: Role = req.role.parse()?;
    let input = Registration {
        email: req.email.clone(),
        password: req.password.clone(),
        name: req.name.clone(),
        phone: req.phone.clone(),
        role,
    };

    match state.auth_service.register(input).await {
        Ok(()) => {
            let message = match role {
                Role::Admin => "Admin registered successfully",
                Role::Employer | Role::User => {
                    "Registered successfully. Please verify your email with the OTP sent to your email address."
                }
            };
            Ok(HttpResponse::Created().json(json!({
                "status": true,
                "message": message
            })))
        }
        Err(e) => {
            error!("Registration failed for email: {}: {}", req.email, e);
            Err(e)
        }
    }
}

pub async fn verify_email(
    req: web::Json<VerifyEmailRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let account = state
        .auth_service
        .verify_email(&req.email, &req.otp)
        .await
        .map_err(|e| {
            error!("Email verification failed for {}: {}", req.email, e);
            e
        })?;

    Ok(HttpResponse::Ok().json(json!({
        "status": true,
        "message": "Email verified successfully",
        "data": account
    })))
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request for email: {}", req.email);
    match state.auth_service.login(&req.email, &req.password).await {
        Ok((token, account)) => {
            info!("Login successful for email: {}", req.email);
            Ok(HttpResponse::Ok().json(LoginResponse { token, account }))
        }
        Err(e) => {
            error!("Login failed for email: {}: {}", req.email, e);
            Err(e)
        }
    }
}

pub async fn forgot_password(
    req: web::Json<ForgotPasswordRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.auth_service.forgot_password(&req.email).await?;

    Ok(HttpResponse::Ok().json(json!({
        "status": true,
        "message": "OTP sent to your email for password reset"
    })))
}

pub async fn reset_password(
    req: web::Json<ResetPasswordRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state
        .auth_service
        .reset_password(&req.email, &req.otp, &req.new_password)
        .await
        .map_err(|e| {
            error!("Password reset failed for {}: {}", req.email, e);
            e
        })?;

    Ok(HttpResponse::Ok().json(json!({
        "status": true,
        "message": "Password reset successfully"
    })))
}

pub async fn logout(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    // Get token from Authorization header
    let token = bearer_token(&req)
        .ok_or_else(|| AppError::Unauthenticated("No authorization token provided".into()))?;

    state.auth_service.logout(token).await?;

    Ok(HttpResponse::Ok().json(json!({
        "status": true,
        "message": "Logout successful"
    })))
}

pub async fn user_profile(auth: Authenticated<UserOnly>) -> Result<HttpResponse, AppError> {
    profile_response(&auth.account)
}

pub async fn employer_profile(
    auth: Authenticated<EmployerOnly>,
) -> Result<HttpResponse, AppError> {
    profile_response(&auth.account)
}

pub async fn admin_profile(auth: Authenticated<AdminOnly>) -> Result<HttpResponse, AppError> {
    profile_response(&auth.account)
}

pub async fn update_user_profile(
    auth: Authenticated<UserOnly>,
    req: web::Json<UpdateProfileRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let account = state
        .auth_service
        .update_profile(auth.account.id, &req.name, &req.phone)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "status": true,
        "message": "Profile updated successfully",
        "data": account
    })))
}

pub async fn delete_user_account(
    auth: Authenticated<UserOnly>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    delete_account(&auth.account, &state).await
}

pub async fn delete_employer_account(
    auth: Authenticated<EmployerOnly>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    delete_account(&auth.account, &state).await
}

fn profile_response(account: &Account) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(json!({
        "status": true,
        "data": PublicAccount::from(account)
    })))
}

async fn delete_account(
    account: &Account,
    state: &web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.auth_service.delete_account(account.id).await?;
    info!("Account soft-deleted for {}", account.email);

    Ok(HttpResponse::Ok().json(json!({
        "status": true,
        "message": "Account deleted (soft delete) successfully"
    })))
}
