//! Role-gated request extractor
//!
//! Protected routes take `Authenticated<R>` as an argument; extraction runs
//! the full token check (registry record, signature, live account, role)
//! before any handler logic. One transport convention for every role: the
//! `Authorization: Bearer` header.

use std::marker::PhantomData;

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;

use crate::db::models::{Account, Role};
use crate::error::AppError;
use crate::AppState;

pub trait RequiredRole: 'static {
    const ROLE: Role;
}

pub struct AdminOnly;
pub struct EmployerOnly;
pub struct UserOnly;

impl RequiredRole for AdminOnly {
    const ROLE: Role = Role::Admin;
}

impl RequiredRole for EmployerOnly {
    const ROLE: Role = Role::Employer;
}

impl RequiredRole for UserOnly {
    const ROLE: Role = Role::User;
}

pub struct Authenticated<R: RequiredRole> {
    pub account: Account,
    _required: PhantomData<R>,
}

/// Bearer token from the Authorization header, if present.
pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

impl<R: RequiredRole> FromRequest for Authenticated<R> {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let token = bearer_token(req).map(str::to_owned);
        let state = req.app_data::<web::Data<AppState>>().cloned();

        Box::pin(async move {
            let state = state
                .ok_or_else(|| AppError::Internal("application state not configured".into()))?;
            let token =
                token.ok_or_else(|| AppError::Unauthenticated("Invalid token".into()))?;

            let account = state.auth_service.authorize(&token, R::ROLE).await?;
            Ok(Self {
                account,
                _required: PhantomData,
            })
        })
    }
}
