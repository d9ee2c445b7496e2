use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::db::models::{Account, OtpRecord, Role, SessionToken};
use crate::db::{CredentialStore, OtpLedger, SessionTokenRegistry};
use crate::error::{AppError, DatabaseError};

const ACCOUNT_COLUMNS: &str =
    "id, email, password_hash, name, phone, role, active, created_at, updated_at";

/// Postgres-backed implementation of all three stores.
pub struct PgStore {
    pool: Arc<PgPool>,
}

/// Raw row shape; `role` is converted to the closed enum on the way out.
#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    password_hash: String,
    name: String,
    phone: String,
    role: String,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = AppError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|_| DatabaseError::QueryError(format!("unknown role '{}'", row.role)))?;
        Ok(Account {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            phone: row.phone,
            role,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(self.pool.as_ref())
            .await
            .map_err(|e| AppError::Database(DatabaseError::QueryError(e.to_string())))
    }

    fn map_unique_violation(err: sqlx::Error) -> AppError {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.code().as_deref() == Some("23505") {
                return if db_err.constraint() == Some("accounts_single_active_admin") {
                    AppError::Conflict("Admin already registered. Only one admin allowed.".into())
                } else {
                    AppError::Conflict("Account already exists".into())
                };
            }
        }
        err.into()
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Account::try_from).transpose()
    }

    async fn find_active_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM accounts WHERE email = $1 AND active",
            ACCOUNT_COLUMNS
        ))
        .bind(email)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Account::try_from).transpose()
    }

    async fn find_active_by_email_or_phone(
        &self,
        email: &str,
        phone: &str,
    ) -> Result<Option<Account>, AppError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM accounts WHERE (email = $1 OR phone = $2) AND active LIMIT 1",
            ACCOUNT_COLUMNS
        ))
        .bind(email)
        .bind(phone)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Account::try_from).transpose()
    }

    async fn upsert_registration(&self, account: &Account) -> Result<Option<Account>, AppError> {
        // Single-statement upsert: an inactive row with this email is
        // overwritten in place, an active row blocks the update and the
        // insert, and the caller sees `None`.
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            INSERT INTO accounts (id, email, password_hash, name, phone, role, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (email) DO UPDATE
            SET password_hash = EXCLUDED.password_hash,
                name = EXCLUDED.name,
                phone = EXCLUDED.phone,
                role = EXCLUDED.role,
                updated_at = EXCLUDED.updated_at
            WHERE accounts.active = FALSE
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.name)
        .bind(&account.phone)
        .bind(account.role.as_str())
        .bind(account.active)
        .bind(account.created_at)
        .bind(account.updated_at)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Account::try_from).transpose()
    }

    async fn create_admin(&self, account: &Account) -> Result<Account, AppError> {
        // The partial unique index on active admin rows turns a lost race
        // into a unique violation instead of a duplicate admin.
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            INSERT INTO accounts (id, email, password_hash, name, phone, role, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7, $8)
            ON CONFLICT (email) DO UPDATE
            SET password_hash = EXCLUDED.password_hash,
                name = EXCLUDED.name,
                phone = EXCLUDED.phone,
                role = EXCLUDED.role,
                active = TRUE,
                updated_at = EXCLUDED.updated_at
            WHERE accounts.active = FALSE
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.name)
        .bind(&account.phone)
        .bind(account.role.as_str())
        .bind(account.created_at)
        .bind(account.updated_at)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(Self::map_unique_violation)?;

        match row {
            Some(row) => Account::try_from(row),
            None => Err(AppError::Conflict("Account already exists".into())),
        }
    }

    async fn count_active_by_role(&self, role: Role) -> Result<i64, AppError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE role = $1 AND active")
                .bind(role.as_str())
                .fetch_one(self.pool.as_ref())
                .await?;

        Ok(count)
    }

    async fn set_active(&self, email: &str) -> Result<Account, AppError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "UPDATE accounts SET active = TRUE, updated_at = $2 WHERE email = $1 RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(email)
        .bind(Utc::now())
        .fetch_optional(self.pool.as_ref())
        .await?;

        match row {
            Some(row) => Account::try_from(row),
            None => Err(AppError::NotFound("Account not found".into())),
        }
    }

    async fn set_password_hash(&self, email: &str, hash: &str) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE accounts SET password_hash = $2, updated_at = $3 WHERE email = $1")
                .bind(email)
                .bind(hash)
                .bind(Utc::now())
                .execute(self.pool.as_ref())
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Account not found".into()));
        }
        Ok(())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        name: &str,
        phone: &str,
    ) -> Result<Account, AppError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "UPDATE accounts SET name = $2, phone = $3, updated_at = $4 WHERE id = $1 RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .bind(name)
        .bind(phone)
        .bind(Utc::now())
        .fetch_optional(self.pool.as_ref())
        .await?;

        match row {
            Some(row) => Account::try_from(row),
            None => Err(AppError::NotFound("Account not found".into())),
        }
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE accounts SET active = FALSE, updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(self.pool.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Account not found".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl OtpLedger for PgStore {
    async fn upsert_for_email(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO otp_codes (email, code, expires_at, issued_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE
            SET code = EXCLUDED.code,
                expires_at = EXCLUDED.expires_at,
                issued_at = EXCLUDED.issued_at
            "#,
        )
        .bind(email)
        .bind(code)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn find_by_email_and_code(
        &self,
        email: &str,
        code: &str,
    ) -> Result<Option<OtpRecord>, AppError> {
        let record = sqlx::query_as::<_, OtpRecord>(
            "SELECT email, code, expires_at, issued_at FROM otp_codes WHERE email = $1 AND code = $2",
        )
        .bind(email)
        .bind(code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(record)
    }

    async fn delete_for_email(&self, email: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM otp_codes WHERE email = $1")
            .bind(email)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM otp_codes WHERE expires_at < $1")
            .bind(now)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionTokenRegistry for PgStore {
    async fn create(&self, token: &str, account_id: Uuid) -> Result<(), AppError> {
        sqlx::query("INSERT INTO session_tokens (token, account_id, created_at) VALUES ($1, $2, $3)")
            .bind(token)
            .bind(account_id)
            .bind(Utc::now())
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<SessionToken>, AppError> {
        let record = sqlx::query_as::<_, SessionToken>(
            "SELECT token, account_id, created_at FROM session_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(record)
    }

    async fn delete_by_token(&self, token: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM session_tokens WHERE token = $1")
            .bind(token)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn delete_by_account(&self, account_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM session_tokens WHERE account_id = $1")
            .bind(account_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM session_tokens WHERE created_at < $1")
            .bind(cutoff)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}
