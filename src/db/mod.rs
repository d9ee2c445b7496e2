//! Persistence layer for the job portal server
//!
//! Defines the store seams the auth service depends on, with a Postgres
//! implementation for production and an in-memory implementation for
//! tests and local runs without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::{MemoryCredentialStore, MemoryOtpLedger, MemorySessionRegistry};
pub use models::{Account, OtpRecord, PublicAccount, Role, SessionToken};
pub use postgres::PgStore;

/// Persisted account records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError>;

    async fn find_active_by_email(&self, email: &str) -> Result<Option<Account>, AppError>;

    /// Conflict probe for registration: any active account holding either
    /// the email or the phone.
    async fn find_active_by_email_or_phone(
        &self,
        email: &str,
        phone: &str,
    ) -> Result<Option<Account>, AppError>;

    /// Insert a new inactive account, or overwrite an existing inactive
    /// account with the same email in place (an incomplete registration
    /// being resumed). Returns `None` when an active account holds the
    /// email; the caller treats that as a conflict.
    async fn upsert_registration(&self, account: &Account) -> Result<Option<Account>, AppError>;

    /// Create the singleton active admin. The at-most-one-active-admin
    /// check is a compare-and-set in the same write, not a separate read.
    async fn create_admin(&self, account: &Account) -> Result<Account, AppError>;

    async fn count_active_by_role(&self, role: Role) -> Result<i64, AppError>;

    async fn set_active(&self, email: &str) -> Result<Account, AppError>;

    async fn set_password_hash(&self, email: &str, hash: &str) -> Result<(), AppError>;

    async fn update_profile(&self, id: Uuid, name: &str, phone: &str)
        -> Result<Account, AppError>;

    /// Soft delete: the row stays, the active flag drops.
    async fn soft_delete(&self, id: Uuid) -> Result<(), AppError>;
}

/// Short-lived one-time codes, one outstanding per email.
#[async_trait]
pub trait OtpLedger: Send + Sync {
    async fn upsert_for_email(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn find_by_email_and_code(
        &self,
        email: &str,
        code: &str,
    ) -> Result<Option<OtpRecord>, AppError>;

    async fn delete_for_email(&self, email: &str) -> Result<(), AppError>;

    /// Physical sweep of rows past their expiry. Validity checks never
    /// rely on this having run.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Server-side record of issued bearer tokens, enabling revocation of an
/// otherwise stateless signed token.
#[async_trait]
pub trait SessionTokenRegistry: Send + Sync {
    async fn create(&self, token: &str, account_id: Uuid) -> Result<(), AppError>;

    async fn find_by_token(&self, token: &str) -> Result<Option<SessionToken>, AppError>;

    /// Idempotent: deleting an absent token is not an error.
    async fn delete_by_token(&self, token: &str) -> Result<(), AppError>;

    async fn delete_by_account(&self, account_id: Uuid) -> Result<u64, AppError>;

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
}
