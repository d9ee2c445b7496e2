//! In-memory store implementations backed by `RwLock<HashMap>`.
//!
//! Used by the test suite and for running the server without Postgres.
//! The whole-map write lock gives each mutation the same atomicity the
//! Postgres implementation gets from single-statement upserts.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::{Account, OtpRecord, Role, SessionToken};
use crate::db::{CredentialStore, OtpLedger, SessionTokenRegistry};
use crate::error::AppError;

#[derive(Default)]
pub struct MemoryCredentialStore {
    accounts: RwLock<HashMap<Uuid, Account>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn find_active_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| a.email == email && a.active)
            .cloned())
    }

    async fn find_active_by_email_or_phone(
        &self,
        email: &str,
        phone: &str,
    ) -> Result<Option<Account>, AppError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| a.active && (a.email == email || a.phone == phone))
            .cloned())
    }

    async fn upsert_registration(&self, account: &Account) -> Result<Option<Account>, AppError> {
        let mut accounts = self.accounts.write().await;
        match accounts.values_mut().find(|a| a.email == account.email) {
            Some(existing) if existing.active => Ok(None),
            Some(existing) => {
                // Resume an incomplete registration: overwrite in place,
                // keeping the original id.
                existing.password_hash = account.password_hash.clone();
                existing.name = account.name.clone();
                existing.phone = account.phone.clone();
                existing.role = account.role;
                existing.updated_at = account.updated_at;
                Ok(Some(existing.clone()))
            }
            None => {
                accounts.insert(account.id, account.clone());
                Ok(Some(account.clone()))
            }
        }
    }

    async fn create_admin(&self, account: &Account) -> Result<Account, AppError> {
        let mut accounts = self.accounts.write().await;
        if accounts.values().any(|a| a.role == Role::Admin && a.active) {
            return Err(AppError::Conflict(
                "Admin already registered. Only one admin allowed.".into(),
            ));
        }
        match accounts.values_mut().find(|a| a.email == account.email) {
            Some(existing) if existing.active => {
                Err(AppError::Conflict("Account already exists".into()))
            }
            Some(existing) => {
                existing.password_hash = account.password_hash.clone();
                existing.name = account.name.clone();
                existing.phone = account.phone.clone();
                existing.role = Role::Admin;
                existing.active = true;
                existing.updated_at = account.updated_at;
                Ok(existing.clone())
            }
            None => {
                let mut admin = account.clone();
                admin.active = true;
                accounts.insert(admin.id, admin.clone());
                Ok(admin)
            }
        }
    }

    async fn count_active_by_role(&self, role: Role) -> Result<i64, AppError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().filter(|a| a.role == role && a.active).count() as i64)
    }

    async fn set_active(&self, email: &str) -> Result<Account, AppError> {
        let mut accounts = self.accounts.write().await;
        match accounts.values_mut().find(|a| a.email == email) {
            Some(account) => {
                account.active = true;
                account.updated_at = Utc::now();
                Ok(account.clone())
            }
            None => Err(AppError::NotFound("Account not found".into())),
        }
    }

    async fn set_password_hash(&self, email: &str, hash: &str) -> Result<(), AppError> {
        let mut accounts = self.accounts.write().await;
        match accounts.values_mut().find(|a| a.email == email) {
            Some(account) => {
                account.password_hash = hash.to_string();
                account.updated_at = Utc::now();
                Ok(())
            }
            None => Err(AppError::NotFound("Account not found".into())),
        }
    }

    async fn update_profile(
        &self,
        id: Uuid,
        name: &str,
        phone: &str,
    ) -> Result<Account, AppError> {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(&id) {
            Some(account) => {
                account.name = name.to_string();
                account.phone = phone.to_string();
                account.updated_at = Utc::now();
                Ok(account.clone())
            }
            None => Err(AppError::NotFound("Account not found".into())),
        }
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(&id) {
            Some(account) => {
                account.active = false;
                account.updated_at = Utc::now();
                Ok(())
            }
            None => Err(AppError::NotFound("Account not found".into())),
        }
    }
}

#[derive(Default)]
pub struct MemoryOtpLedger {
    codes: RwLock<HashMap<String, OtpRecord>>,
}

impl MemoryOtpLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The code currently outstanding for an email, if any.
    pub async fn outstanding_code(&self, email: &str) -> Option<String> {
        self.codes.read().await.get(email).map(|r| r.code.clone())
    }
}

#[async_trait]
impl OtpLedger for MemoryOtpLedger {
    async fn upsert_for_email(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut codes = self.codes.write().await;
        codes.insert(
            email.to_string(),
            OtpRecord {
                email: email.to_string(),
                code: code.to_string(),
                expires_at,
                issued_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn find_by_email_and_code(
        &self,
        email: &str,
        code: &str,
    ) -> Result<Option<OtpRecord>, AppError> {
        let codes = self.codes.read().await;
        Ok(codes.get(email).filter(|r| r.code == code).cloned())
    }

    async fn delete_for_email(&self, email: &str) -> Result<(), AppError> {
        self.codes.write().await.remove(email);
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut codes = self.codes.write().await;
        let before = codes.len();
        codes.retain(|_, record| !record.is_expired(now));
        Ok((before - codes.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemorySessionRegistry {
    tokens: RwLock<HashMap<String, SessionToken>>,
}

impl MemorySessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionTokenRegistry for MemorySessionRegistry {
    async fn create(&self, token: &str, account_id: Uuid) -> Result<(), AppError> {
        let mut tokens = self.tokens.write().await;
        tokens.insert(
            token.to_string(),
            SessionToken {
                token: token.to_string(),
                account_id,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<SessionToken>, AppError> {
        Ok(self.tokens.read().await.get(token).cloned())
    }

    async fn delete_by_token(&self, token: &str) -> Result<(), AppError> {
        self.tokens.write().await.remove(token);
        Ok(())
    }

    async fn delete_by_account(&self, account_id: Uuid) -> Result<u64, AppError> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.account_id != account_id);
        Ok((before - tokens.len()) as u64)
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.created_at >= cutoff);
        Ok((before - tokens.len()) as u64)
    }
}
