use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::password;
use crate::auth::validation;
use crate::db::models::{Account, PublicAccount, Role};
use crate::db::{CredentialStore, OtpLedger, SessionTokenRegistry};
use crate::error::AppError;
use crate::notify::{Notifier, OutboundMail};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Account ID
    pub role: Role,
    pub jti: String, // Unique per login, so concurrent sessions get distinct tokens
    pub exp: i64,    // Expiration time
    pub iat: i64,    // Issued at
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: String,
    pub role: Role,
}

pub struct AuthService {
    accounts: Arc<dyn CredentialStore>,
    otps: Arc<dyn OtpLedger>,
    sessions: Arc<dyn SessionTokenRegistry>,
    notifier: Arc<dyn Notifier>,
    jwt_secret: String,
    token_ttl: Duration,
    otp_ttl: Duration,
}

impl AuthService {
    pub fn new(
        accounts: Arc<dyn CredentialStore>,
        otps: Arc<dyn OtpLedger>,
        sessions: Arc<dyn SessionTokenRegistry>,
        notifier: Arc<dyn Notifier>,
        jwt_secret: String,
        token_ttl_minutes: i64,
        otp_ttl_minutes: i64,
    ) -> Self {
        Self {
            accounts,
            otps,
            sessions,
            notifier,
            jwt_secret,
            token_ttl: Duration::minutes(token_ttl_minutes),
            otp_ttl: Duration::minutes(otp_ttl_minutes),
        }
    }

    /// Register an account. Employers and users start inactive and receive
    /// an OTP mail; the singleton admin is created active with no OTP step.
    pub async fn register(&self, input: Registration) -> Result<(), AppError> {
        validation::validate_registration(
            &input.email,
            &input.password,
            &input.name,
            &input.phone,
        )?;

        if self
            .accounts
            .find_active_by_email_or_phone(&input.email, &input.phone)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("Account already exists".into()));
        }

        let hash = password::hash_password(&input.password)?;
        let account = Account::new(
            input.email.clone(),
            hash,
            input.name.clone(),
            input.phone.clone(),
            input.role,
            false,
        );

        match input.role {
            Role::Admin => {
                if self.accounts.count_active_by_role(Role::Admin).await? > 0 {
                    return Err(AppError::Conflict(
                        "Admin already registered. Only one admin allowed.".into(),
                    ));
                }
                // The count check alone is racy; active-admin uniqueness is
                // also a compare-and-set inside the store write, so a racing
                // second registration loses there.
                self.accounts.create_admin(&account).await?;
                info!("Admin account registered for {}", input.email);
                Ok(())
            }
            Role::Employer | Role::User => {
                self.accounts
                    .upsert_registration(&account)
                    .await?
                    .ok_or_else(|| AppError::Conflict("Account already exists".into()))?;

                self.issue_otp(&input.email, "Email Verification", "Your OTP is: ")
                    .await?;
                info!("Account registered for {}, verification pending", input.email);
                Ok(())
            }
        }
    }

    /// Consume an OTP and activate the account. The code is single-use:
    /// the record is deleted on success, so a replay fails as invalid.
    pub async fn verify_email(&self, email: &str, code: &str) -> Result<PublicAccount, AppError> {
        let record = self
            .otps
            .find_by_email_and_code(email, code)
            .await?
            .ok_or(AppError::InvalidCode)?;

        // Logical expiry against the clock, whether or not the sweep has
        // physically removed the row yet
        if record.is_expired(Utc::now()) {
            return Err(AppError::Expired);
        }

        let account = self.accounts.set_active(email).await?;
        self.otps.delete_for_email(email).await?;
        info!("Email verified for {}", email);

        Ok(PublicAccount::from(&account))
    }

    /// Verify credentials and mint a session. Unverified accounts are
    /// reported as not found, never as a credential mismatch.
    pub async fn login(&self, email: &str, pass: &str) -> Result<(String, PublicAccount), AppError> {
        let account = self
            .accounts
            .find_active_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found or not verified".into()))?;

        if !password::verify_password(pass, &account.password_hash)? {
            return Err(AppError::InvalidCredential);
        }

        let token = self.generate_token(&account)?;
        self.sessions.create(&token, account.id).await?;
        info!("Login successful for {}", email);

        Ok((token, PublicAccount::from(&account)))
    }

    pub async fn forgot_password(&self, email: &str) -> Result<(), AppError> {
        validation::validate_email(email)?;

        self.accounts
            .find_active_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found or not verified".into()))?;

        self.issue_otp(email, "Password Reset OTP", "Your OTP for password reset is: ")
            .await
    }

    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        validation::validate_password(new_password)?;

        let record = self
            .otps
            .find_by_email_and_code(email, code)
            .await?
            .ok_or(AppError::InvalidCode)?;

        if record.is_expired(Utc::now()) {
            return Err(AppError::Expired);
        }

        let hash = password::hash_password(new_password)?;
        self.accounts.set_password_hash(email, &hash).await?;
        self.otps.delete_for_email(email).await?;
        info!("Password reset for {}", email);

        Ok(())
    }

    /// Drop the registry record for this token. The signed token itself
    /// stays cryptographically valid until its natural expiry, which is why
    /// the registry deletion is the load-bearing half of revocation.
    pub async fn logout(&self, token: &str) -> Result<(), AppError> {
        self.sessions.delete_by_token(token).await
    }

    /// Soft-delete the account and revoke every session it holds.
    pub async fn delete_account(&self, id: Uuid) -> Result<(), AppError> {
        self.accounts.soft_delete(id).await?;
        let revoked = self.sessions.delete_by_account(id).await?;
        info!("Account {} soft-deleted, {} session(s) revoked", id, revoked);
        Ok(())
    }

    pub async fn update_profile(
        &self,
        id: Uuid,
        name: &str,
        phone: &str,
    ) -> Result<PublicAccount, AppError> {
        validation::validate_name(name)?;
        validation::validate_phone(phone)?;

        let account = self.accounts.update_profile(id, name, phone).await?;
        Ok(PublicAccount::from(&account))
    }

    /// Full gate check for a bearer token: registry record AND signed-token
    /// validity AND live account AND role match. Each layer failing alone is
    /// enough to reject.
    pub async fn authorize(&self, token: &str, required: Role) -> Result<Account, AppError> {
        // Registry first: a logged-out token is dead even while the
        // signature is still valid
        let record = self
            .sessions
            .find_by_token(token)
            .await?
            .ok_or_else(|| AppError::Unauthenticated("Token expired or invalid".into()))?;

        let claims = self.decode_token(token)?;
        let account_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthenticated("Invalid token".into()))?;

        if record.account_id != account_id {
            return Err(AppError::Unauthenticated("Invalid token".into()));
        }

        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .filter(|a| a.active)
            .ok_or_else(|| AppError::Unauthenticated("Account not found".into()))?;

        if account.role != required {
            let message = match required {
                Role::Admin => "Admin only",
                Role::Employer => "Employers only",
                Role::User => "User only",
            };
            return Err(AppError::Forbidden(message.into()));
        }

        Ok(account)
    }

    /// Physically purge expired OTP rows and registry rows older than the
    /// token lifetime. Validity never depends on this running.
    pub async fn sweep_expired(&self) -> Result<(u64, u64), AppError> {
        let now = Utc::now();
        let otps = self.otps.delete_expired(now).await?;
        let sessions = self.sessions.delete_created_before(now - self.token_ttl).await?;
        Ok((otps, sessions))
    }

    async fn issue_otp(
        &self,
        email: &str,
        subject: &str,
        body_prefix: &str,
    ) -> Result<(), AppError> {
        let code = Self::generate_code();
        let expires_at = Utc::now() + self.otp_ttl;
        self.otps.upsert_for_email(email, &code, expires_at).await?;

        // The OTP row is committed; a delivery failure must not undo that
        let mail = OutboundMail::text(email, subject, &format!("{}{}", body_prefix, code));
        if let Err(e) = self.notifier.send(&mail).await {
            warn!("Failed to send OTP mail to {}: {}", email, e);
        }

        Ok(())
    }

    fn generate_code() -> String {
        format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
    }

    fn generate_token(&self, account: &Account) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: account.id.to_string(),
            role: account.role,
            jti: Uuid::new_v4().to_string(),
            exp: (now + self.token_ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("token encoding failed: {}", e)))
    }

    fn decode_token(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|_| AppError::Unauthenticated("Token expired or invalid".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryCredentialStore, MemoryOtpLedger, MemorySessionRegistry};
    use crate::notify::NoopNotifier;

    fn service(token_ttl_minutes: i64) -> AuthService {
        AuthService::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemoryOtpLedger::new()),
            Arc::new(MemorySessionRegistry::new()),
            Arc::new(NoopNotifier),
            "test_secret".into(),
            token_ttl_minutes,
            5,
        )
    }

    fn account() -> Account {
        Account::new(
            "a@x.com".into(),
            "$argon2id$hash".into(),
            "Alice".into(),
            "9876543210".into(),
            Role::User,
            true,
        )
    }

    #[test]
    fn test_token_round_trip() {
        let svc = service(60);
        let account = account();
        let token = svc.generate_token(&account).unwrap();
        let claims = svc.decode_token(&token).unwrap();

        assert_eq!(claims.sub, account.id.to_string());
        assert_eq!(claims.role, Role::User);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_expired_token_rejected() {
        // Past the decoder's default leeway
        let svc = service(-2);
        let token = svc.generate_token(&account()).unwrap();
        assert!(matches!(
            svc.decode_token(&token),
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let minter = service(60);
        let token = minter.generate_token(&account()).unwrap();

        let verifier = AuthService::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemoryOtpLedger::new()),
            Arc::new(MemorySessionRegistry::new()),
            Arc::new(NoopNotifier),
            "different_secret".into(),
            60,
            5,
        );
        assert!(verifier.decode_token(&token).is_err());
    }

    #[test]
    fn test_generated_codes_are_six_digits() {
        for _ in 0..32 {
            let code = AuthService::generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
