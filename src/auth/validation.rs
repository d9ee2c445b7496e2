//! Field-level input validation
//!
//! Every auth operation validates request shape before touching any store.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::AppError;

const PASSWORD_SYMBOLS: &str = "@$!%*?#&";

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap())
}

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z\s]{2,}$").unwrap())
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[6-9]\d{9}$").unwrap())
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    if !email_regex().is_match(email) {
        return Err(AppError::Validation("Invalid email format".into()));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), AppError> {
    if !name_regex().is_match(name) {
        return Err(AppError::Validation(
            "Name must be at least 2 characters long and contain only letters and spaces".into(),
        ));
    }
    Ok(())
}

pub fn validate_phone(phone: &str) -> Result<(), AppError> {
    if !phone_regex().is_match(phone) {
        return Err(AppError::Validation(
            "Phone number must be a 10-digit number starting with 6, 7, 8, or 9".into(),
        ));
    }
    Ok(())
}

/// Composed complexity policy: minimum length, at least one lowercase, one
/// uppercase, one digit and one symbol, drawn only from the allowed classes.
pub fn validate_password(password: &str) -> Result<(), AppError> {
    let allowed =
        |c: char| c.is_ascii_alphanumeric() || PASSWORD_SYMBOLS.contains(c);

    let strong = password.len() >= 6
        && password.chars().all(allowed)
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SYMBOLS.contains(c));

    if !strong {
        return Err(AppError::Validation(
            "Password must be at least 6 characters long, contain at least one uppercase letter, \
             one lowercase letter, one number, and one special character"
                .into(),
        ));
    }
    Ok(())
}

pub fn validate_registration(
    email: &str,
    password: &str,
    name: &str,
    phone: &str,
) -> Result<(), AppError> {
    validate_email(email)?;
    validate_name(name)?;
    validate_phone(phone)?;
    validate_password(password)?;
    Ok(())
}
